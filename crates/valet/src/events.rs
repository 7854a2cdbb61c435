// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::fmt;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

/// A lifecycle milestone announced by an adapter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecyclePhase {
    /// Initialization began.
    Initializing,
    /// Initialization completed.
    Initialized,
    /// Startup began.
    Starting,
    /// The adapter is running.
    Started,
    /// Shutdown began.
    Stopping,
    /// The adapter stopped.
    Stopped,
    /// A lifecycle transition failed.
    Error,
}

impl fmt::Display for LifecyclePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Initializing => "initializing",
            Self::Initialized => "initialized",
            Self::Starting => "starting",
            Self::Started => "started",
            Self::Stopping => "stopping",
            Self::Stopped => "stopped",
            Self::Error => "error",
        };
        f.write_str(name)
    }
}

/// An event observed on an adapter.
#[derive(Debug, Clone)]
pub enum AdapterEvent {
    /// A lifecycle milestone.
    Lifecycle {
        /// The adapter's name.
        adapter: String,
        /// The milestone reached.
        phase: LifecyclePhase,
    },

    /// A completed `execute` call, one event per caller.
    Operation {
        /// The adapter's name.
        adapter: String,
        /// The call's unique id, matching the report's metadata.
        operation_id: String,
        /// The operation name.
        operation: String,
        /// Whether the call succeeded.
        success: bool,
        /// The call's wall time as observed by the caller.
        duration: Duration,
    },
}

type Subscriber = Arc<dyn Fn(&AdapterEvent) + Send + Sync>;

/// Delivers [`AdapterEvent`]s to any number of subscribers.
///
/// Each subscriber is invoked independently and behind a panic boundary: a panicking
/// subscriber is logged and skipped, and can affect neither adapter state nor the
/// other subscribers.
#[derive(Default)]
pub(crate) struct EventHub {
    subscribers: Mutex<Vec<Subscriber>>,
}

impl EventHub {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn subscribe<F>(&self, subscriber: F)
    where
        F: Fn(&AdapterEvent) + Send + Sync + 'static,
    {
        self.subscribers.lock().push(Arc::new(subscriber));
    }

    pub(crate) fn emit(&self, event: &AdapterEvent) {
        // Snapshot under the lock, invoke outside of it: a subscriber may subscribe
        // or emit reentrantly.
        let subscribers: Vec<Subscriber> = self.subscribers.lock().clone();

        for subscriber in subscribers {
            if catch_unwind(AssertUnwindSafe(|| subscriber(event))).is_err() {
                tracing::warn!(event = ?event, "event subscriber panicked; continuing");
            }
        }
    }

    pub(crate) fn clear(&self) {
        self.subscribers.lock().clear();
    }

    #[cfg(test)]
    pub(crate) fn subscriber_count(&self) -> usize {
        self.subscribers.lock().len()
    }
}

impl fmt::Debug for EventHub {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventHub")
            .field("subscribers", &self.subscribers.lock().len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use super::*;

    fn lifecycle_event(phase: LifecyclePhase) -> AdapterEvent {
        AdapterEvent::Lifecycle {
            adapter: "test".to_owned(),
            phase,
        }
    }

    #[test]
    fn every_subscriber_sees_the_event() {
        let hub = EventHub::new();
        let count = Arc::new(AtomicU32::new(0));

        for _ in 0..3 {
            let count = Arc::clone(&count);
            hub.subscribe(move |_| {
                count.fetch_add(1, Ordering::SeqCst);
            });
        }

        hub.emit(&lifecycle_event(LifecyclePhase::Started));

        assert_eq!(count.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn panicking_subscriber_does_not_stop_delivery() {
        let hub = EventHub::new();
        let delivered = Arc::new(AtomicU32::new(0));

        hub.subscribe(|_| panic!("boom"));
        {
            let delivered = Arc::clone(&delivered);
            hub.subscribe(move |_| {
                delivered.fetch_add(1, Ordering::SeqCst);
            });
        }

        hub.emit(&lifecycle_event(LifecyclePhase::Stopped));
        hub.emit(&lifecycle_event(LifecyclePhase::Stopped));

        assert_eq!(delivered.load(Ordering::SeqCst), 2);
        assert_eq!(hub.subscriber_count(), 2);
    }

    #[test]
    fn subscriber_may_subscribe_reentrantly() {
        let hub = Arc::new(EventHub::new());
        let hub_inner = Arc::clone(&hub);

        hub.subscribe(move |_| {
            hub_inner.subscribe(|_| {});
        });

        hub.emit(&lifecycle_event(LifecyclePhase::Started));

        assert_eq!(hub.subscriber_count(), 2);
    }

    #[test]
    fn clear_removes_subscribers() {
        let hub = EventHub::new();
        hub.subscribe(|_| {});
        hub.clear();

        assert_eq!(hub.subscriber_count(), 0);
    }

    #[test]
    fn phases_display_as_event_names() {
        assert_eq!(LifecyclePhase::Initializing.to_string(), "initializing");
        assert_eq!(LifecyclePhase::Started.to_string(), "started");
        assert_eq!(LifecyclePhase::Error.to_string(), "error");
    }
}
