// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::fmt;

use serde::Serialize;

/// The lifecycle of a [`ServiceAdapter`][crate::ServiceAdapter].
///
/// Transitions are strictly forward:
///
/// ```text
/// Uninitialized -> Initializing -> Initialized -> Starting -> Running
///                                                                |
///                                   Destroyed <- Stopped <- Stopping
/// ```
///
/// `Error` is reachable from any transition that fails. There is no restart: once
/// `Stopped`, only `Destroyed` remains, and a fresh adapter instance must be built to
/// serve again. `destroy` is accepted from every state except `Destroyed` itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LifecycleState {
    /// Built but not yet initialized.
    Uninitialized,
    /// Validating configuration and wiring sub-services.
    Initializing,
    /// Ready to start.
    Initialized,
    /// Verifying dependencies before serving.
    Starting,
    /// Serving operations; the only state in which `execute` is valid.
    Running,
    /// Draining in-flight work and shutting sub-services down.
    Stopping,
    /// Fully stopped; only destruction remains.
    Stopped,
    /// All owned resources released. Terminal.
    Destroyed,
    /// A lifecycle transition failed. Terminal except for destruction.
    Error,
}

impl LifecycleState {
    /// Whether the state machine permits moving from `self` to `next`.
    #[must_use]
    pub fn can_transition_to(self, next: Self) -> bool {
        match (self, next) {
            // Anything that is not yet destroyed can fail or be torn down.
            (Self::Destroyed, _) => false,
            (_, Self::Error) | (_, Self::Destroyed) => true,

            (Self::Uninitialized, Self::Initializing)
            | (Self::Initializing, Self::Initialized)
            | (Self::Initialized, Self::Starting)
            | (Self::Starting, Self::Running)
            | (Self::Running, Self::Stopping)
            | (Self::Stopping, Self::Stopped) => true,

            _ => false,
        }
    }

    /// Whether `execute` calls are accepted in this state.
    #[must_use]
    pub const fn accepts_operations(self) -> bool {
        matches!(self, Self::Running)
    }

    /// Whether the adapter can never serve again from this state.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Stopped | Self::Destroyed | Self::Error)
    }
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Uninitialized => "uninitialized",
            Self::Initializing => "initializing",
            Self::Initialized => "initialized",
            Self::Starting => "starting",
            Self::Running => "running",
            Self::Stopping => "stopping",
            Self::Stopped => "stopped",
            Self::Destroyed => "destroyed",
            Self::Error => "error",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn forward_path_is_allowed() {
        use LifecycleState::{Initialized, Initializing, Running, Starting, Stopped, Stopping, Uninitialized};

        let path = [Uninitialized, Initializing, Initialized, Starting, Running, Stopping, Stopped];
        for pair in path.windows(2) {
            assert!(pair[0].can_transition_to(pair[1]), "{} -> {}", pair[0], pair[1]);
        }
    }

    #[test]
    fn no_restart_after_stop() {
        assert!(!LifecycleState::Stopped.can_transition_to(LifecycleState::Starting));
        assert!(!LifecycleState::Stopped.can_transition_to(LifecycleState::Running));
        assert!(LifecycleState::Stopped.can_transition_to(LifecycleState::Destroyed));
    }

    #[test]
    fn error_reachable_from_transitions() {
        assert!(LifecycleState::Initializing.can_transition_to(LifecycleState::Error));
        assert!(LifecycleState::Starting.can_transition_to(LifecycleState::Error));
        assert!(LifecycleState::Running.can_transition_to(LifecycleState::Error));
    }

    #[test]
    fn destroyed_is_final() {
        for next in [
            LifecycleState::Uninitialized,
            LifecycleState::Initializing,
            LifecycleState::Running,
            LifecycleState::Error,
            LifecycleState::Destroyed,
        ] {
            assert!(!LifecycleState::Destroyed.can_transition_to(next));
        }
    }

    #[test]
    fn destroy_accepted_from_any_live_state() {
        for from in [
            LifecycleState::Uninitialized,
            LifecycleState::Initialized,
            LifecycleState::Running,
            LifecycleState::Stopped,
            LifecycleState::Error,
        ] {
            assert!(from.can_transition_to(LifecycleState::Destroyed));
        }
    }

    #[test]
    fn no_skipping_states() {
        assert!(!LifecycleState::Uninitialized.can_transition_to(LifecycleState::Running));
        assert!(!LifecycleState::Initialized.can_transition_to(LifecycleState::Running));
        assert!(!LifecycleState::Running.can_transition_to(LifecycleState::Stopped));
    }

    #[test]
    fn only_running_accepts_operations() {
        assert!(LifecycleState::Running.accepts_operations());
        assert!(!LifecycleState::Initialized.accepts_operations());
        assert!(!LifecycleState::Stopped.accepts_operations());
    }

    #[test]
    fn display_is_lowercase() {
        assert_eq!(LifecycleState::Running.to_string(), "running");
        assert_eq!(LifecycleState::Uninitialized.to_string(), "uninitialized");
    }
}
