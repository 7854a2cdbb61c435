// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::time::{Duration, SystemTime};

use serde::Serialize;
use serde_json::Value;

use crate::Failure;

/// Timing and identity metadata attached to every execution report.
#[derive(Debug, Clone, Serialize)]
pub struct CallMetadata {
    /// Wall time of the call as observed by the caller, backoff delays included.
    pub duration: Duration,

    /// When the call started.
    pub timestamp: SystemTime,

    /// The call's unique id.
    pub operation_id: String,

    /// Backend attempts made on behalf of this caller's flight; 0 when the result
    /// came from the cache or the call never reached a backend.
    pub attempts: u32,

    /// Whether the result was served from the cache.
    pub cache_hit: bool,
}

/// The outcome of one `execute` call.
///
/// Reports are data, not errors: `execute` returns one for every call, successful or
/// not, and never panics or raises across the boundary. Exactly one of `data` and
/// `error` is populated, matching `success`.
#[derive(Debug, Clone, Serialize)]
pub struct ExecutionReport {
    /// Whether the call produced a result.
    pub success: bool,

    /// The operation's result when `success` is true.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,

    /// The failure when `success` is false.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<Failure>,

    /// Timing and identity of the call.
    pub metadata: CallMetadata,
}

impl ExecutionReport {
    pub(crate) fn succeeded(data: Value, metadata: CallMetadata) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
            metadata,
        }
    }

    pub(crate) fn failed(failure: Failure, metadata: CallMetadata) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(failure),
            metadata,
        }
    }

    /// The error code of a failed report, if any.
    #[must_use]
    pub fn error_code(&self) -> Option<crate::ErrorCode> {
        self.error.as_ref().map(|e| e.code)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn metadata() -> CallMetadata {
        CallMetadata {
            duration: Duration::from_millis(5),
            timestamp: SystemTime::UNIX_EPOCH,
            operation_id: "fetch-1".to_owned(),
            attempts: 1,
            cache_hit: false,
        }
    }

    #[test]
    fn success_report_shape() {
        let report = ExecutionReport::succeeded(json!({ "x": 1 }), metadata());

        assert!(report.success);
        assert_eq!(report.data.as_ref().map(|d| d["x"].clone()), Some(json!(1)));
        assert!(report.error.is_none());
        assert_eq!(report.error_code(), None);
    }

    #[test]
    fn failure_report_shape() {
        let report = ExecutionReport::failed(Failure::unsupported("nope"), metadata());

        assert!(!report.success);
        assert!(report.data.is_none());
        assert_eq!(report.error_code(), Some(crate::ErrorCode::UnsupportedOperation));
    }

    #[test]
    fn serializes_without_empty_fields() {
        let report = ExecutionReport::succeeded(json!(1), metadata());
        let json = serde_json::to_value(&report).expect("serializable");

        assert!(json.get("error").is_none());
        assert_eq!(json["metadata"]["operation_id"], "fetch-1");
    }
}
