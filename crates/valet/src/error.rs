// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Timeouts shorter than this are treated as permanent when they fail.
///
/// Retrying an operation that was bounded this tightly only amplifies a latency
/// spike; the caller opted into a fast answer, not into repeated slow ones.
pub(crate) const RETRY_TIMEOUT_FLOOR: Duration = Duration::from_secs(1);

/// Classifies a failure reported through [`ExecutionReport`][crate::ExecutionReport].
///
/// Codes are stable strings (`SCREAMING_SNAKE_CASE`) so callers can match on them
/// across process and serialization boundaries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    /// Input or configuration failed validation.
    ValidationError,

    /// A required dependency is unhealthy.
    DependencyError,

    /// The operation exceeded its time bound.
    TimeoutError,

    /// The backend handler failed, or the adapter could not accept the call.
    OperationError,

    /// The operation name is not part of the adapter's dispatch table.
    UnsupportedOperation,
}

impl ErrorCode {
    /// The stable string form of the code.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::ValidationError => "VALIDATION_ERROR",
            Self::DependencyError => "DEPENDENCY_ERROR",
            Self::TimeoutError => "TIMEOUT_ERROR",
            Self::OperationError => "OPERATION_ERROR",
            Self::UnsupportedOperation => "UNSUPPORTED_OPERATION",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A structured operation failure.
///
/// Failures cross the `execute` boundary as data, never as a raised error: the adapter
/// converts every handler failure, timeout or readiness violation into a `Failure`
/// inside a `success: false` report.
///
/// A failure also carries its *transience*: whether retrying the operation might
/// produce a different outcome. Transience drives the retry executor and is not
/// serialized; it is an in-process classification, in the spirit of marking errors
/// recoverable rather than matching on message text.
///
/// # Examples
///
/// ```
/// use valet::{ErrorCode, Failure};
///
/// let failure = Failure::operation("backend unavailable");
/// assert_eq!(failure.code, ErrorCode::OperationError);
/// assert!(failure.is_transient());
///
/// let rejected = Failure::validation("negative page size");
/// assert!(!rejected.is_transient());
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Failure {
    /// The failure class.
    pub code: ErrorCode,

    /// Human-readable description.
    pub message: String,

    /// Optional structured context (e.g. the offending parameter, the timeout bound).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,

    #[serde(skip)]
    transient: bool,
}

impl Failure {
    /// A backend handler failure. Transient by default; use [`permanent`][Self::permanent]
    /// for failures that retrying cannot fix.
    #[must_use]
    pub fn operation(message: impl Into<String>) -> Self {
        Self {
            code: ErrorCode::OperationError,
            message: message.into(),
            details: None,
            transient: true,
        }
    }

    /// A validation failure. Never transient.
    #[must_use]
    pub fn validation(message: impl Into<String>) -> Self {
        Self {
            code: ErrorCode::ValidationError,
            message: message.into(),
            details: None,
            transient: false,
        }
    }

    /// A dependency failure. Never transient; the dependency registry owns re-probing.
    #[must_use]
    pub fn dependency(message: impl Into<String>) -> Self {
        Self {
            code: ErrorCode::DependencyError,
            message: message.into(),
            details: None,
            transient: false,
        }
    }

    /// A timeout failure for an operation bounded by `limit`.
    ///
    /// Transient only when the bound was at least the retry floor (1s): a failure
    /// under a tighter bound is classified permanent so retries don't amplify a
    /// latency spike.
    #[must_use]
    pub fn timeout(limit: Duration) -> Self {
        Self {
            code: ErrorCode::TimeoutError,
            message: format!("operation timed out after {}ms", limit.as_millis()),
            details: Some(serde_json::json!({
                "timeout_ms": u64::try_from(limit.as_millis()).unwrap_or(u64::MAX),
            })),
            transient: limit >= RETRY_TIMEOUT_FLOOR,
        }
    }

    /// An unknown-operation failure.
    #[must_use]
    pub fn unsupported(operation: &str) -> Self {
        Self {
            code: ErrorCode::UnsupportedOperation,
            message: format!("operation '{operation}' is not supported by this adapter"),
            details: None,
            transient: false,
        }
    }

    /// Attaches structured context to the failure.
    #[must_use]
    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }

    /// Marks the failure as permanent: retrying will not change the outcome.
    #[must_use]
    pub fn permanent(mut self) -> Self {
        self.transient = false;
        self
    }

    /// Marks the failure as transient: retrying may succeed.
    #[must_use]
    pub fn transient(mut self) -> Self {
        self.transient = true;
        self
    }

    /// Whether retrying the failed operation might produce a different outcome.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        self.transient
    }
}

impl fmt::Display for Failure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl std::error::Error for Failure {}

/// An error raised by the adapter's lifecycle API.
///
/// Unlike [`Failure`], which travels inside execution reports, `AdapterError` is
/// returned from `initialize`/`start`/`stop`/`destroy` and the registry, where the
/// caller is the operator wiring the adapter rather than an operation client.
#[derive(Debug, thiserror::Error)]
pub enum AdapterError {
    /// The requested lifecycle transition is not allowed from the current state.
    #[error("invalid lifecycle transition: {from} -> {to}")]
    InvalidTransition {
        /// The state the adapter was in.
        from: crate::LifecycleState,
        /// The state that was requested.
        to: crate::LifecycleState,
    },

    /// The configuration failed validation.
    #[error("configuration rejected")]
    Config(#[from] crate::ConfigError),

    /// A required dependency failed its health probe during `start`.
    #[error("required dependency '{name}' failed its health probe")]
    Dependency {
        /// The dependency that failed.
        name: String,
    },

    /// A sub-service failed to initialize.
    #[error("sub-service '{name}' failed to initialize")]
    SubService {
        /// The sub-service that failed.
        name: String,
        /// The failure it reported.
        #[source]
        source: Failure,
    },

    /// An adapter with the same name is already registered and not destroyed.
    #[error("an adapter named '{0}' is already registered")]
    DuplicateName(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    static_assertions::assert_impl_all!(Failure: Send, Sync, Clone);
    static_assertions::assert_impl_all!(AdapterError: Send, Sync, std::error::Error);

    #[test]
    fn codes_are_stable_strings() {
        assert_eq!(ErrorCode::ValidationError.as_str(), "VALIDATION_ERROR");
        assert_eq!(ErrorCode::DependencyError.as_str(), "DEPENDENCY_ERROR");
        assert_eq!(ErrorCode::TimeoutError.as_str(), "TIMEOUT_ERROR");
        assert_eq!(ErrorCode::OperationError.as_str(), "OPERATION_ERROR");
        assert_eq!(ErrorCode::UnsupportedOperation.as_str(), "UNSUPPORTED_OPERATION");
    }

    #[test]
    fn code_serializes_as_screaming_snake() {
        let json = serde_json::to_string(&ErrorCode::TimeoutError).expect("serializable");
        assert_eq!(json, "\"TIMEOUT_ERROR\"");
    }

    #[test]
    fn transience_by_constructor() {
        assert!(Failure::operation("x").is_transient());
        assert!(!Failure::validation("x").is_transient());
        assert!(!Failure::dependency("x").is_transient());
        assert!(!Failure::unsupported("x").is_transient());
    }

    #[test]
    fn timeout_transience_respects_floor() {
        assert!(Failure::timeout(Duration::from_secs(5)).is_transient());
        assert!(Failure::timeout(RETRY_TIMEOUT_FLOOR).is_transient());
        assert!(!Failure::timeout(Duration::from_millis(200)).is_transient());
    }

    #[test]
    fn transience_overrides() {
        assert!(!Failure::operation("x").permanent().is_transient());
        assert!(Failure::validation("x").transient().is_transient());
    }

    #[test]
    fn display_includes_code_and_message() {
        let failure = Failure::operation("backend exploded");
        assert_eq!(failure.to_string(), "OPERATION_ERROR: backend exploded");
    }

    #[test]
    fn details_round_trip() {
        let failure = Failure::operation("x").with_details(serde_json::json!({ "attempt": 2 }));
        let json = serde_json::to_value(&failure).expect("serializable");
        assert_eq!(json["details"]["attempt"], 2);
        assert_eq!(json["code"], "OPERATION_ERROR");
    }
}
