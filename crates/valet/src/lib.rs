// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! One `execute` contract over heterogeneous backends.
//!
//! Systems that wrap several backend services (a coordination engine here, a session
//! store there, a document database behind them) tend to re-implement the same
//! wrapper over and over: a lifecycle state machine, result caching, suppression of
//! duplicate in-flight calls, retry with backoff, timeouts, health checks, metrics.
//! This crate implements that wrapper once, as a [`ServiceAdapter`]: backends
//! register named operations, callers invoke them through a single
//! [`execute`][ServiceAdapter::execute] entry point, and the adapter composes the
//! shared machinery around every call.
//!
//! # What a call goes through
//!
//! 1. **Readiness**: only a `Running` adapter dispatches; everything else is
//!    rejected with a structured report, never a panic.
//! 2. **Dispatch**: the name is looked up in a closed table validated at
//!    initialization; unknown names fail with `UNSUPPORTED_OPERATION`.
//! 3. **Cache**: cacheable operations are served from a TTL'd, scored-eviction
//!    cache keyed by a canonical, order-independent serialization of the call.
//! 4. **Coalescing**: concurrent identical calls share one backend flight; the
//!    first caller launches it, the rest join its outcome.
//! 5. **Retry**: transient failures of retryable operations are retried with
//!    exponential backoff, each attempt individually measured.
//! 6. **Timeout**: the caller races the flight against a per-call or default
//!    bound. A timed-out caller detaches; the flight keeps running and still
//!    populates the cache, so completed backend work is never thrown away.
//! 7. **Metrics**: every attempt lands in a rolling window from which
//!    [`metrics`][ServiceAdapter::metrics] computes aggregates on demand.
//!
//! # Example
//!
//! ```no_run
//! use pulse::Clock;
//! use serde_json::json;
//! use valet::{CallOptions, Dependency, Operation, ServiceAdapter};
//!
//! # async fn example() -> Result<(), valet::AdapterError> {
//! let clock = Clock::new_tokio();
//!
//! let adapter = ServiceAdapter::builder("document-store", &clock)
//!     .capability("documents")
//!     .operation(
//!         Operation::query("fetch", |params, _ctx| async move {
//!             Ok(json!({ "id": params["id"], "body": "..." }))
//!         })
//!         .cacheable(true),
//!     )
//!     .operation(Operation::mutation("put", |params, _ctx| async move {
//!         Ok(json!({ "stored": params }))
//!     }))
//!     .dependency(Dependency::new("blob-store", || async { true }))
//!     .build();
//!
//! adapter.initialize(Default::default()).await?;
//! adapter.start().await?;
//!
//! let report = adapter.execute("fetch", json!({ "id": 7 }), CallOptions::default()).await;
//! assert!(report.success);
//!
//! adapter.stop().await?;
//! adapter.destroy().await?;
//! # Ok(())
//! # }
//! ```
//!
//! # Time and testing
//!
//! Every time-dependent behavior (timeouts, backoff delays, cache TTLs, the metrics
//! window, background maintenance) runs on a [`pulse::Clock`]. Tests construct the
//! adapter from a `pulse::TimeControl` clock and advance time deterministically; no
//! test ever sleeps.

mod adapter;
mod cache;
mod config;
mod deps;
mod error;
mod events;
mod flight;
mod key;
mod lifecycle;
mod metrics;
mod operation;
mod registry;
mod report;
mod retry;
mod subservice;

pub use adapter::{AdapterBuilder, AdapterStatus, HealthState, ServiceAdapter, StatusMetadata};
pub use config::{AdapterConfig, CachePolicy, ConfigError, ConfigUpdate, RetryPolicy};
pub use deps::{Dependency, DependencyHealth, ProbeFn};
pub use error::{AdapterError, ErrorCode, Failure};
pub use events::{AdapterEvent, LifecyclePhase};
pub use lifecycle::LifecycleState;
pub use metrics::{MetricsSnapshot, OperationSample};
pub use operation::{CallContext, CallOptions, Operation, OperationKind};
pub use registry::AdapterRegistry;
pub use report::{CallMetadata, ExecutionReport};
pub use subservice::SubService;
