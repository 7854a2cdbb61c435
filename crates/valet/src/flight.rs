// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use futures_util::FutureExt as _;
use futures_util::future::{BoxFuture, Shared};
use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use crate::Failure;
use crate::key::CacheKey;

/// The settled outcome of one backend flight, observed identically by every caller
/// that joined it.
#[derive(Debug, Clone)]
pub(crate) struct FlightOutcome {
    pub(crate) result: Result<Value, Failure>,
    /// Attempts the flight made, including the first.
    pub(crate) attempts: u32,
}

/// A cloneable handle on a flight's eventual outcome.
pub(crate) type SharedFlight = Shared<BoxFuture<'static, FlightOutcome>>;

/// Tracks in-flight backend invocations by cache key so that concurrent identical
/// calls share a single execution.
///
/// The first caller for a key becomes the leader and launches the backend work as a
/// *detached* task; everyone else joins the pending entry and awaits the same shared
/// outcome. Detachment is the load-bearing property: a caller that times out and drops
/// its handle does not cancel the work, so the backend call can still complete and
/// populate the cache for later callers.
///
/// The pending entry is removed exactly once, when the flight settles, regardless of
/// how many callers joined or abandoned it in the meantime.
#[derive(Debug)]
pub(crate) struct FlightDeck {
    pending: Arc<Mutex<HashMap<CacheKey, PendingFlight>>>,
    /// Flights launched (deduplicated groups).
    led: AtomicU64,
    /// Callers that attached to an existing flight.
    joined: AtomicU64,
}

#[derive(Debug)]
struct PendingFlight {
    handle: SharedFlight,
    task: JoinHandle<()>,
    started_at: Instant,
    joined: u32,
}

impl FlightDeck {
    pub(crate) fn new() -> Self {
        Self {
            pending: Arc::new(Mutex::new(HashMap::new())),
            led: AtomicU64::new(0),
            joined: AtomicU64::new(0),
        }
    }

    /// Joins the pending flight for `key`, or launches a new one via `launch`.
    ///
    /// `launch` receives the [`FlightSettlement`] the new flight must resolve and
    /// returns the handle of the spawned task. Returns the shared outcome handle and
    /// whether this caller led (`true`) or joined (`false`).
    pub(crate) fn join_or_lead<F>(&self, key: &CacheKey, started_at: Instant, launch: F) -> (SharedFlight, bool)
    where
        F: FnOnce(FlightSettlement) -> JoinHandle<()>,
    {
        let mut pending = self.pending.lock();

        if let Some(flight) = pending.get_mut(key) {
            flight.joined += 1;
            self.joined.fetch_add(1, Ordering::Relaxed);
            tracing::trace!(key = %key, joined = flight.joined, "caller joined pending flight");
            return (flight.handle.clone(), false);
        }

        let (tx, rx) = oneshot::channel::<FlightOutcome>();
        let handle: SharedFlight = rx
            .map(|settled| {
                settled.unwrap_or_else(|_| FlightOutcome {
                    result: Err(Failure::operation("flight abandoned before settling")),
                    attempts: 0,
                })
            })
            .boxed()
            .shared();

        let settlement = FlightSettlement {
            key: key.clone(),
            pending: Arc::clone(&self.pending),
            tx: Some(tx),
        };

        let task = launch(settlement);

        pending.insert(
            key.clone(),
            PendingFlight {
                handle: handle.clone(),
                task,
                started_at,
                joined: 0,
            },
        );
        self.led.fetch_add(1, Ordering::Relaxed);

        (handle, true)
    }

    /// Aborts every pending flight and forgets the entries.
    ///
    /// Joined callers observe an "abandoned" failure; the settlements of aborted
    /// tasks find their entries already gone, which is fine.
    pub(crate) fn abort_all(&self) {
        let drained: Vec<PendingFlight> = self.pending.lock().drain().map(|(_, flight)| flight).collect();
        for flight in drained {
            flight.task.abort();
        }
    }

    pub(crate) fn pending_len(&self) -> usize {
        self.pending.lock().len()
    }

    /// `(led, joined)` lifetime counters, feeding the deduplication-rate metric.
    pub(crate) fn stats(&self) -> (u64, u64) {
        (self.led.load(Ordering::Relaxed), self.joined.load(Ordering::Relaxed))
    }

    /// How long the oldest pending flight has been running, if any.
    pub(crate) fn oldest_started_at(&self) -> Option<Instant> {
        self.pending.lock().values().map(|flight| flight.started_at).min()
    }
}

/// Resolves one flight: broadcasts the outcome and retires the pending entry.
///
/// Exactly one of `settle` or `Drop` retires the entry. Dropping an unsettled
/// settlement (the flight task panicked or was aborted mid-way) still removes the
/// entry, so a poisoned key can never wedge future calls.
#[derive(Debug)]
pub(crate) struct FlightSettlement {
    key: CacheKey,
    pending: Arc<Mutex<HashMap<CacheKey, PendingFlight>>>,
    tx: Option<oneshot::Sender<FlightOutcome>>,
}

impl FlightSettlement {
    pub(crate) fn settle(mut self, outcome: FlightOutcome) {
        if let Some(tx) = self.tx.take() {
            drop(self.pending.lock().remove(&self.key));
            drop(tx.send(outcome));
        }
    }
}

impl Drop for FlightSettlement {
    fn drop(&mut self) {
        if self.tx.is_some() {
            drop(self.pending.lock().remove(&self.key));
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn key(n: u32) -> CacheKey {
        CacheKey::compute("t", "op", &json!({ "n": n }))
    }

    fn ok_outcome(value: Value, attempts: u32) -> FlightOutcome {
        FlightOutcome {
            result: Ok(value),
            attempts,
        }
    }

    #[tokio::test]
    async fn followers_share_the_leader_outcome() {
        let deck = FlightDeck::new();
        let now = Instant::now();

        let (leader, led) = deck.join_or_lead(&key(1), now, |settlement| {
            tokio::spawn(async move {
                settlement.settle(ok_outcome(json!(42), 1));
            })
        });
        assert!(led);

        let (follower, led) = deck.join_or_lead(&key(1), now, |_| unreachable!("must join the pending flight"));
        assert!(!led);

        let a = leader.await;
        let b = follower.await;

        assert_eq!(a.result.expect("leader outcome"), json!(42));
        assert_eq!(b.result.expect("follower outcome"), json!(42));
        assert_eq!(deck.stats(), (1, 1));
    }

    #[tokio::test]
    async fn entry_removed_after_settlement() {
        let deck = FlightDeck::new();

        let (handle, _) = deck.join_or_lead(&key(1), Instant::now(), |settlement| {
            tokio::spawn(async move {
                settlement.settle(ok_outcome(json!(1), 1));
            })
        });

        let _ = handle.await;
        assert_eq!(deck.pending_len(), 0);
    }

    #[tokio::test]
    async fn distinct_keys_fly_independently() {
        let deck = FlightDeck::new();
        let now = Instant::now();

        let (a, led_a) = deck.join_or_lead(&key(1), now, |s| {
            tokio::spawn(async move { s.settle(ok_outcome(json!(1), 1)) })
        });
        let (b, led_b) = deck.join_or_lead(&key(2), now, |s| {
            tokio::spawn(async move { s.settle(ok_outcome(json!(2), 1)) })
        });

        assert!(led_a && led_b);
        assert_eq!(a.await.result.expect("a"), json!(1));
        assert_eq!(b.await.result.expect("b"), json!(2));
        assert_eq!(deck.stats(), (2, 0));
    }

    #[tokio::test]
    async fn dropped_settlement_unblocks_followers() {
        let deck = FlightDeck::new();

        let (handle, _) = deck.join_or_lead(&key(1), Instant::now(), |settlement| {
            tokio::spawn(async move {
                // Simulates a flight dying before it settles.
                drop(settlement);
            })
        });

        let outcome = handle.await;
        let failure = outcome.result.expect_err("abandoned flight fails");
        assert_eq!(failure.code, crate::ErrorCode::OperationError);
        assert_eq!(deck.pending_len(), 0);
    }

    #[tokio::test]
    async fn abort_all_clears_pending() {
        let deck = FlightDeck::new();

        let (handle, _) = deck.join_or_lead(&key(1), Instant::now(), |settlement| {
            tokio::spawn(async move {
                // Hold the settlement until aborted.
                let () = std::future::pending().await;
                drop(settlement);
            })
        });

        deck.abort_all();
        assert_eq!(deck.pending_len(), 0);

        let outcome = handle.await;
        assert!(outcome.result.is_err());
    }

    #[tokio::test]
    async fn new_flight_possible_after_settlement() {
        let deck = FlightDeck::new();
        let k = key(1);

        let (first, _) = deck.join_or_lead(&k, Instant::now(), |s| {
            tokio::spawn(async move { s.settle(ok_outcome(json!(1), 1)) })
        });
        let _ = first.await;

        let (second, led) = deck.join_or_lead(&k, Instant::now(), |s| {
            tokio::spawn(async move { s.settle(ok_outcome(json!(2), 1)) })
        });

        assert!(led, "settled key admits a fresh flight");
        assert_eq!(second.await.result.expect("second"), json!(2));
        assert_eq!(deck.stats(), (2, 0));
    }
}
