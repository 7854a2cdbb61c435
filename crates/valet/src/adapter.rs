// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::time::{Duration, Instant, SystemTime};

use futures_util::FutureExt as _;
use futures_util::StreamExt as _;
use parking_lot::{Mutex, RwLock};
use pulse::{Clock, FutureExt as _, PeriodicTimer};
use serde::Serialize;
use serde_json::Value;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;

use crate::cache::OperationCache;
use crate::config::{AdapterConfig, CachePolicy, ConfigError, ConfigUpdate, RetryPolicy};
use crate::deps::{Dependency, DependencyHealth, DependencyRegistry};
use crate::error::{AdapterError, Failure};
use crate::events::{AdapterEvent, EventHub, LifecyclePhase};
use crate::flight::{FlightDeck, FlightOutcome};
use crate::key::CacheKey;
use crate::lifecycle::LifecycleState;
use crate::metrics::{MetricsCollector, MetricsSnapshot};
use crate::operation::{CallContext, CallOptions, Operation, OperationTable};
use crate::report::{CallMetadata, ExecutionReport};
use crate::retry::run_with_retry;
use crate::subservice::SubService;

/// Health classification derived from recent behavior.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthState {
    /// No failures and recent operations look clean.
    Healthy,
    /// Elevated error rate or a short run of failed health checks.
    Degraded,
    /// More than five consecutive failed health checks.
    Unhealthy,
    /// Nothing observed yet.
    Unknown,
}

impl fmt::Display for HealthState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Healthy => "healthy",
            Self::Degraded => "degraded",
            Self::Unhealthy => "unhealthy",
            Self::Unknown => "unknown",
        };
        f.write_str(name)
    }
}

/// Descriptive fields of [`AdapterStatus`].
#[derive(Debug, Clone, Serialize)]
pub struct StatusMetadata {
    /// The adapter's name.
    pub name: String,

    /// Declared capability tags.
    pub capabilities: Vec<String>,

    /// Operations in the dispatch table.
    pub operations: usize,

    /// Entries currently cached.
    pub cached_entries: usize,

    /// Flights currently pending.
    pub pending_flights: usize,

    /// Consecutive failed health checks.
    pub consecutive_failures: u32,
}

/// A point-in-time view of an adapter's lifecycle and health.
#[derive(Debug, Clone, Serialize)]
pub struct AdapterStatus {
    /// The lifecycle state.
    pub lifecycle: LifecycleState,

    /// The derived health classification.
    pub health: HealthState,

    /// Time since `start()` completed; zero if never started.
    pub uptime: Duration,

    /// Failed calls observed over the adapter's lifetime.
    pub error_count: u64,

    /// Fraction of failed samples in the metrics window.
    pub error_rate: f64,

    /// Latest known health per registered dependency.
    pub dependencies: Vec<DependencyHealth>,

    /// Descriptive counters.
    pub metadata: StatusMetadata,
}

/// Builds a [`ServiceAdapter`] from configuration, operations, sub-services,
/// dependencies and subscribers.
///
/// Obtained from [`ServiceAdapter::builder`]. Building is infallible; validation of
/// the assembled configuration and operation table happens in
/// [`initialize`][ServiceAdapter::initialize].
pub struct AdapterBuilder {
    config: AdapterConfig,
    operations: Vec<Operation>,
    sub_services: Vec<Arc<dyn SubService>>,
    dependencies: Vec<Dependency>,
    clock: Clock,
}

impl AdapterBuilder {
    /// Adds a capability tag.
    #[must_use]
    pub fn capability(mut self, capability: impl Into<String>) -> Self {
        self.config.capabilities.push(capability.into());
        self
    }

    /// Replaces the caching policy.
    #[must_use]
    pub fn cache(mut self, cache: CachePolicy) -> Self {
        self.config.cache = cache;
        self
    }

    /// Replaces the retry policy.
    #[must_use]
    pub fn retry(mut self, retry: RetryPolicy) -> Self {
        self.config.retry = retry;
        self
    }

    /// Sets the concurrency limit.
    #[must_use]
    pub fn concurrency_limit(mut self, limit: usize) -> Self {
        self.config.concurrency_limit = limit;
        self
    }

    /// Sets the default operation timeout.
    #[must_use]
    pub fn default_timeout(mut self, timeout: Duration) -> Self {
        self.config.default_timeout = timeout;
        self
    }

    /// Sets the cadence of the cache sweep and metrics pruning task.
    #[must_use]
    pub fn maintenance_interval(mut self, interval: Duration) -> Self {
        self.config.maintenance_interval = interval;
        self
    }

    /// Sets the cadence of the periodic dependency probe.
    #[must_use]
    pub fn dependency_probe_interval(mut self, interval: Duration) -> Self {
        self.config.dependency_probe_interval = interval;
        self
    }

    /// Declares an operation.
    #[must_use]
    pub fn operation(mut self, operation: Operation) -> Self {
        self.operations.push(operation);
        self
    }

    /// Attaches a backend sub-service.
    #[must_use]
    pub fn sub_service(mut self, service: Arc<dyn SubService>) -> Self {
        self.sub_services.push(service);
        self
    }

    /// Declares a dependency to be registered at initialization.
    #[must_use]
    pub fn dependency(mut self, dependency: Dependency) -> Self {
        self.dependencies.push(dependency);
        self
    }

    /// Builds the adapter in the `Uninitialized` state.
    #[must_use]
    pub fn build(self) -> ServiceAdapter {
        let limiter = Arc::new(Semaphore::new(self.config.concurrency_limit));

        ServiceAdapter {
            inner: Arc::new(AdapterInner {
                cache: OperationCache::new(&self.clock),
                metrics: MetricsCollector::new(&self.clock, MetricsCollector::DEFAULT_WINDOW),
                dependencies: DependencyRegistry::new(&self.clock),
                flights: FlightDeck::new(),
                events: EventHub::new(),
                limiter: Mutex::new(limiter),
                config: RwLock::new(self.config),
                state: Mutex::new(LifecycleState::Uninitialized),
                pending_operations: Mutex::new(self.operations),
                operations: RwLock::new(OperationTable::default()),
                sub_services: self.sub_services,
                pending_dependencies: Mutex::new(self.dependencies),
                started_at: Mutex::new(None),
                consecutive_failures: AtomicU32::new(0),
                error_count: AtomicU64::new(0),
                op_seq: AtomicU64::new(0),
                maintenance: Mutex::new(Vec::new()),
                clock: self.clock,
            }),
        }
    }
}

impl fmt::Debug for AdapterBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AdapterBuilder")
            .field("name", &self.config.name)
            .field("operations", &self.operations.len())
            .field("sub_services", &self.sub_services.len())
            .field("dependencies", &self.dependencies.len())
            .finish_non_exhaustive()
    }
}

/// One `execute` contract over heterogeneous backends.
///
/// A `ServiceAdapter` owns a lifecycle state machine and a closed dispatch table of
/// named operations, and composes a result cache, in-flight request coalescing, a
/// retry executor, a rolling metrics window and a dependency registry around every
/// dispatched call.
///
/// Cloning an adapter is an `Arc` clone; clones share every component.
///
/// # Lifecycle
///
/// `builder(..).build()` → [`initialize`][Self::initialize] → [`start`][Self::start]
/// → serve [`execute`][Self::execute] → [`stop`][Self::stop] →
/// [`destroy`][Self::destroy]. There is no restart: a stopped adapter can only be
/// destroyed, and a fresh instance must be built to serve again.
///
/// # Example
///
/// ```no_run
/// use pulse::Clock;
/// use serde_json::json;
/// use valet::{CallOptions, Operation, ServiceAdapter};
///
/// # async fn example() -> Result<(), valet::AdapterError> {
/// let clock = Clock::new_tokio();
///
/// let adapter = ServiceAdapter::builder("document-store", &clock)
///     .operation(
///         Operation::query("fetch", |params, _ctx| async move {
///             Ok(json!({ "id": params["id"], "body": "..." }))
///         })
///         .cacheable(true),
///     )
///     .build();
///
/// adapter.initialize(Default::default()).await?;
/// adapter.start().await?;
///
/// let report = adapter.execute("fetch", json!({ "id": 7 }), CallOptions::default()).await;
/// assert!(report.success);
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct ServiceAdapter {
    inner: Arc<AdapterInner>,
}

struct AdapterInner {
    clock: Clock,
    config: RwLock<AdapterConfig>,
    state: Mutex<LifecycleState>,
    pending_operations: Mutex<Vec<Operation>>,
    operations: RwLock<OperationTable>,
    sub_services: Vec<Arc<dyn SubService>>,
    pending_dependencies: Mutex<Vec<Dependency>>,
    dependencies: DependencyRegistry,
    cache: OperationCache,
    flights: FlightDeck,
    metrics: MetricsCollector,
    events: EventHub,
    limiter: Mutex<Arc<Semaphore>>,
    started_at: Mutex<Option<(SystemTime, Instant)>>,
    consecutive_failures: AtomicU32,
    error_count: AtomicU64,
    op_seq: AtomicU64,
    maintenance: Mutex<Vec<JoinHandle<()>>>,
}

impl ServiceAdapter {
    /// Starts building an adapter with the given unique name, telling time through
    /// `clock`.
    #[must_use]
    pub fn builder(name: impl Into<String>, clock: &Clock) -> AdapterBuilder {
        AdapterBuilder {
            config: AdapterConfig::new(name),
            operations: Vec::new(),
            sub_services: Vec::new(),
            dependencies: Vec::new(),
            clock: clock.clone(),
        }
    }

    /// The adapter's name.
    #[must_use]
    pub fn name(&self) -> String {
        self.inner.config.read().name.clone()
    }

    /// The current lifecycle state.
    #[must_use]
    pub fn lifecycle(&self) -> LifecycleState {
        self.inner.state()
    }

    /// A snapshot of the current configuration.
    #[must_use]
    pub fn config(&self) -> AdapterConfig {
        self.inner.config.read().clone()
    }

    /// Registers an event subscriber.
    ///
    /// Subscribers are invoked for lifecycle milestones and per-call operation
    /// events; a panicking subscriber is isolated and cannot affect adapter state.
    pub fn subscribe<F>(&self, subscriber: F)
    where
        F: Fn(&AdapterEvent) + Send + Sync + 'static,
    {
        self.inner.events.subscribe(subscriber);
    }

    /// Validates configuration and declared operations, wires sub-services and
    /// registers dependencies.
    ///
    /// Valid only from `Uninitialized`. Emits the `initializing`/`initialized` event
    /// pair; any failure transitions to `Error` and is returned.
    pub async fn initialize(&self, overrides: ConfigUpdate) -> Result<(), AdapterError> {
        self.inner.transition(LifecycleState::Initializing)?;
        self.inner.emit_phase(LifecyclePhase::Initializing);

        match self.initialize_core(overrides).await {
            Ok(()) => {
                self.inner.transition(LifecycleState::Initialized)?;
                self.inner.emit_phase(LifecyclePhase::Initialized);
                Ok(())
            }
            Err(err) => {
                self.inner.fail();
                Err(err)
            }
        }
    }

    async fn initialize_core(&self, overrides: ConfigUpdate) -> Result<(), AdapterError> {
        let merged = self.inner.config.read().merged(&overrides);
        merged.validate()?;

        let declared = std::mem::take(&mut *self.inner.pending_operations.lock());
        let table = OperationTable::build(declared)?;

        tracing::debug!(
            adapter = %merged.name,
            operations = table.len(),
            "operation table validated"
        );

        *self.inner.operations.write() = table;
        *self.inner.limiter.lock() = Arc::new(Semaphore::new(merged.concurrency_limit));
        *self.inner.config.write() = merged;

        let declared_dependencies = std::mem::take(&mut *self.inner.pending_dependencies.lock());
        for dependency in declared_dependencies {
            self.inner.dependencies.add(dependency);
        }

        for service in &self.inner.sub_services {
            service.initialize().await.map_err(|source| AdapterError::SubService {
                name: service.name().to_owned(),
                source,
            })?;
        }

        Ok(())
    }

    /// Verifies every required dependency, then begins serving.
    ///
    /// Valid only from `Initialized`. A failed required dependency aborts the start
    /// and transitions to `Error`. On success, background maintenance (cache sweep,
    /// metrics pruning, periodic dependency probing) begins and the adapter is
    /// `Running`.
    pub async fn start(&self) -> Result<(), AdapterError> {
        self.inner.transition(LifecycleState::Starting)?;
        self.inner.emit_phase(LifecyclePhase::Starting);

        let report = self.inner.dependencies.check_all().await;
        if let Some(name) = report.first_required_failure() {
            let name = name.to_owned();
            self.inner.fail();
            return Err(AdapterError::Dependency { name });
        }

        *self.inner.started_at.lock() = Some((self.inner.clock.system_time(), self.inner.clock.instant()));
        self.spawn_maintenance();

        self.inner.transition(LifecycleState::Running)?;
        self.inner.emit_phase(LifecyclePhase::Started);
        Ok(())
    }

    /// Dispatches a named operation.
    ///
    /// Valid only while `Running`; in any other state the call is rejected with a
    /// `success: false` report; `execute` never panics and never raises.
    ///
    /// The call is cached (for cacheable operations), coalesced with concurrent
    /// identical calls, retried per policy, bounded by `options.timeout` or the
    /// adapter default, and measured into the metrics window.
    ///
    /// # Timeouts and pending flights
    ///
    /// A caller that times out detaches with a `TIMEOUT_ERROR`, but the underlying
    /// backend flight keeps running: remaining joiners still get its outcome, and a
    /// successful result still populates the cache for later callers. Completed
    /// backend work is deliberately never thrown away on a caller timeout.
    pub async fn execute(&self, operation: &str, params: Value, options: CallOptions) -> ExecutionReport {
        let inner = &self.inner;
        let stopwatch = inner.clock.stopwatch();
        let timestamp = inner.clock.system_time();
        let operation_id = inner.next_operation_id(operation);

        let state = inner.state();
        if !state.accepts_operations() {
            let message = format!("adapter '{}' is {state}; operations require the running state", inner.name());
            return ExecutionReport::failed(
                Failure::operation(message).permanent(),
                call_metadata(&stopwatch, timestamp, operation_id, 0, false),
            );
        }

        let Some(op) = inner.operations.read().get(operation).cloned() else {
            // Unknown names produce no samples and no events.
            return ExecutionReport::failed(
                Failure::unsupported(operation),
                call_metadata(&stopwatch, timestamp, operation_id, 0, false),
            );
        };

        let config = inner.config.read().clone();
        let timeout = options.timeout.unwrap_or(config.default_timeout);
        let key = CacheKey::compute(&config.cache.key_prefix, operation, &params);
        let cacheable = config.cache.enabled && op.is_cacheable();

        if cacheable {
            if let Some(value) = inner.cache.get(&key) {
                let duration = stopwatch.elapsed();
                inner.metrics.record(operation, duration, true, true, 0);
                inner.emit_operation(&operation_id, operation, true, duration);
                return ExecutionReport::succeeded(value, call_metadata(&stopwatch, timestamp, operation_id, 0, true));
            }
        }

        let limiter = Arc::clone(&*inner.limiter.lock());
        let started = inner.clock.instant();

        let (handle, _led) = inner.flights.join_or_lead(&key, started, |settlement| {
            let inner = Arc::clone(&self.inner);
            let op = op.clone();
            let params = params.clone();
            let op_name = operation.to_owned();
            let key = key.clone();
            let policy = config.retry.clone();
            let retryable = config.retry.covers(operation);
            let cache_ttl = config.cache.default_ttl;
            let cache_max = config.cache.max_entries;
            let flight_id = operation_id.clone();

            tokio::spawn(async move {
                let _permit = limiter.acquire_owned().await.ok();

                let handler = op.handler();
                let (result, attempts) = run_with_retry(
                    &inner.clock,
                    &policy,
                    retryable,
                    move |attempt| {
                        let handler = Arc::clone(&handler);
                        let params = params.clone();
                        let ctx = CallContext {
                            timeout,
                            attempt,
                            operation_id: flight_id.clone(),
                        };
                        async move {
                            match AssertUnwindSafe(handler(params, ctx)).catch_unwind().await {
                                Ok(outcome) => outcome,
                                Err(_panic) => Err(Failure::operation("operation handler panicked").permanent()),
                            }
                        }
                    },
                    |attempt, outcome, duration| {
                        inner.metrics.record(&op_name, duration, outcome.is_ok(), false, attempt.number());
                    },
                )
                .await;

                if cacheable {
                    if let Ok(value) = &result {
                        inner.cache.insert(key, value.clone(), cache_ttl, cache_max);
                    }
                }

                settlement.settle(FlightOutcome { result, attempts });
            })
        });

        match handle.timeout(&inner.clock, timeout).await {
            Ok(outcome) => {
                let duration = stopwatch.elapsed();
                match outcome.result {
                    Ok(value) => {
                        inner.emit_operation(&operation_id, operation, true, duration);
                        ExecutionReport::succeeded(
                            value,
                            call_metadata(&stopwatch, timestamp, operation_id, outcome.attempts, false),
                        )
                    }
                    Err(failure) => {
                        inner.error_count.fetch_add(1, Ordering::Relaxed);
                        inner.emit_operation(&operation_id, operation, false, duration);
                        ExecutionReport::failed(
                            failure,
                            call_metadata(&stopwatch, timestamp, operation_id, outcome.attempts, false),
                        )
                    }
                }
            }
            Err(_elapsed) => {
                let duration = stopwatch.elapsed();
                inner.error_count.fetch_add(1, Ordering::Relaxed);
                inner.metrics.record(operation, duration, false, false, 0);
                inner.emit_operation(&operation_id, operation, false, duration);

                // The flight stays pending on purpose; see the method docs.
                ExecutionReport::failed(
                    Failure::timeout(timeout),
                    call_metadata(&stopwatch, timestamp, operation_id, 0, false),
                )
            }
        }
    }

    /// Re-probes dependencies and sub-services, updating the consecutive-failure
    /// counter used by [`status`][Self::status].
    pub async fn health_check(&self) -> bool {
        self.inner.run_health_check().await
    }

    /// A point-in-time view of lifecycle, health, uptime and dependencies.
    #[must_use]
    pub fn status(&self) -> AdapterStatus {
        let inner = &self.inner;
        let config = inner.config.read().clone();
        let failures = inner.consecutive_failures.load(Ordering::Relaxed);

        let uptime = inner
            .started_at
            .lock()
            .map_or(Duration::ZERO, |(_, instant)| inner.clock.instant().saturating_duration_since(instant));

        AdapterStatus {
            lifecycle: inner.state(),
            health: inner.classify_health(failures),
            uptime,
            error_count: inner.error_count.load(Ordering::Relaxed),
            error_rate: inner.metrics.error_rate(),
            dependencies: inner.dependencies.latest(),
            metadata: StatusMetadata {
                name: config.name,
                capabilities: config.capabilities,
                operations: inner.operations.read().len(),
                cached_entries: inner.cache.len(),
                pending_flights: inner.flights.pending_len(),
                consecutive_failures: failures,
            },
        }
    }

    /// Aggregates computed from the rolling metrics window.
    #[must_use]
    pub fn metrics(&self) -> MetricsSnapshot {
        self.inner.metrics.snapshot(self.inner.flights.stats())
    }

    /// Sets a named custom gauge surfaced through [`metrics`][Self::metrics].
    pub fn set_custom_metric(&self, name: &str, value: f64) {
        self.inner.metrics.set_custom(name, value);
    }

    /// Applies a partial configuration update atomically.
    ///
    /// The merged configuration is validated first; on rejection nothing changes.
    /// Applied changes take effect for subsequent calls without a restart. The
    /// maintenance cadences are read when maintenance starts, so changing them
    /// affects only adapters that have not started yet.
    pub fn update_config(&self, update: ConfigUpdate) -> Result<(), ConfigError> {
        let merged = self.inner.config.read().merged(&update);
        merged.validate()?;

        if merged.concurrency_limit != self.inner.config.read().concurrency_limit {
            *self.inner.limiter.lock() = Arc::new(Semaphore::new(merged.concurrency_limit));
        }

        *self.inner.config.write() = merged;
        Ok(())
    }

    /// Registers an additional dependency at runtime.
    pub fn add_dependency(&self, dependency: Dependency) {
        self.inner.dependencies.add(dependency);
    }

    /// Removes a dependency; returns whether it existed.
    pub fn remove_dependency(&self, name: &str) -> bool {
        self.inner.dependencies.remove(name)
    }

    /// Stops serving: halts maintenance, cancels in-flight work, shuts sub-services
    /// down and clears the cache.
    ///
    /// Valid only from `Running`. A stopped adapter cannot be restarted.
    pub async fn stop(&self) -> Result<(), AdapterError> {
        self.inner.transition(LifecycleState::Stopping)?;
        self.inner.emit_phase(LifecyclePhase::Stopping);

        self.inner.halt_maintenance();

        let pending = self.inner.flights.pending_len();
        if pending > 0 {
            tracing::debug!(
                pending,
                oldest_started_at = ?self.inner.flights.oldest_started_at(),
                "cancelling in-flight work"
            );
        }
        self.inner.flights.abort_all();

        for service in &self.inner.sub_services {
            service.shutdown().await;
        }

        self.inner.cache.clear();

        self.inner.transition(LifecycleState::Stopped)?;
        self.inner.emit_phase(LifecyclePhase::Stopped);
        Ok(())
    }

    /// Releases everything the adapter owns. Irreversible.
    ///
    /// Stops first when still `Running`. Valid from every state except `Destroyed`.
    pub async fn destroy(&self) -> Result<(), AdapterError> {
        if self.inner.state() == LifecycleState::Destroyed {
            return Err(AdapterError::InvalidTransition {
                from: LifecycleState::Destroyed,
                to: LifecycleState::Destroyed,
            });
        }

        if self.inner.state() == LifecycleState::Running {
            if let Err(err) = self.stop().await {
                tracing::warn!(error = %err, "stop during destroy failed; releasing resources anyway");
            }
        }

        self.inner.halt_maintenance();
        self.inner.flights.abort_all();
        self.inner.cache.clear();
        self.inner.metrics.clear();
        self.inner.dependencies.clear();
        self.inner.events.clear();

        self.inner.transition(LifecycleState::Destroyed)
    }

    fn spawn_maintenance(&self) {
        let config = self.inner.config.read().clone();
        let mut tasks = self.inner.maintenance.lock();

        {
            let inner = Arc::clone(&self.inner);
            let mut timer = PeriodicTimer::new(&inner.clock, config.maintenance_interval);
            tasks.push(tokio::spawn(async move {
                while timer.next().await.is_some() {
                    let swept = inner.cache.sweep();
                    let pruned = inner.metrics.prune();
                    if swept > 0 || pruned > 0 {
                        tracing::debug!(swept, pruned, "maintenance pass");
                    }
                }
            }));
        }

        {
            let inner = Arc::clone(&self.inner);
            let mut timer = PeriodicTimer::new(&inner.clock, config.dependency_probe_interval);
            tasks.push(tokio::spawn(async move {
                while timer.next().await.is_some() {
                    if !inner.run_health_check().await {
                        tracing::warn!("periodic health check failed");
                    }
                }
            }));
        }
    }
}

impl AdapterInner {
    fn state(&self) -> LifecycleState {
        *self.state.lock()
    }

    fn name(&self) -> String {
        self.config.read().name.clone()
    }

    fn transition(&self, to: LifecycleState) -> Result<(), AdapterError> {
        let mut state = self.state.lock();
        if !state.can_transition_to(to) {
            return Err(AdapterError::InvalidTransition { from: *state, to });
        }
        *state = to;
        Ok(())
    }

    /// Absorbs a lifecycle failure into the `Error` state.
    fn fail(&self) {
        {
            let mut state = self.state.lock();
            if state.can_transition_to(LifecycleState::Error) {
                *state = LifecycleState::Error;
            }
        }
        self.emit_phase(LifecyclePhase::Error);
    }

    fn emit_phase(&self, phase: LifecyclePhase) {
        self.events.emit(&AdapterEvent::Lifecycle {
            adapter: self.name(),
            phase,
        });
    }

    fn emit_operation(&self, operation_id: &str, operation: &str, success: bool, duration: Duration) {
        self.events.emit(&AdapterEvent::Operation {
            adapter: self.name(),
            operation_id: operation_id.to_owned(),
            operation: operation.to_owned(),
            success,
            duration,
        });
    }

    fn next_operation_id(&self, operation: &str) -> String {
        let seq = self.op_seq.fetch_add(1, Ordering::Relaxed) + 1;
        format!("{}-{operation}-{seq}", self.config.read().name)
    }

    async fn run_health_check(&self) -> bool {
        let report = self.dependencies.check_all().await;
        let mut healthy = report.all_required_healthy();

        for service in &self.sub_services {
            if !service.health_check().await {
                tracing::warn!(sub_service = service.name(), "sub-service probed unhealthy");
                healthy = false;
            }
        }

        if healthy {
            self.consecutive_failures.store(0, Ordering::Relaxed);
        } else {
            self.consecutive_failures.fetch_add(1, Ordering::Relaxed);
        }

        healthy
    }

    fn classify_health(&self, consecutive_failures: u32) -> HealthState {
        if consecutive_failures == 0 && self.metrics.sample_count() == 0 {
            return HealthState::Unknown;
        }

        if consecutive_failures > 5 {
            return HealthState::Unhealthy;
        }

        if consecutive_failures >= 1 || self.metrics.error_rate() > 0.10 {
            return HealthState::Degraded;
        }

        HealthState::Healthy
    }

    fn halt_maintenance(&self) {
        for task in self.maintenance.lock().drain(..) {
            task.abort();
        }
    }
}

fn call_metadata(
    stopwatch: &pulse::Stopwatch,
    timestamp: SystemTime,
    operation_id: String,
    attempts: u32,
    cache_hit: bool,
) -> CallMetadata {
    CallMetadata {
        duration: stopwatch.elapsed(),
        timestamp,
        operation_id,
        attempts,
        cache_hit,
    }
}

impl fmt::Debug for ServiceAdapter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceAdapter")
            .field("name", &self.inner.name())
            .field("state", &self.inner.state())
            .finish_non_exhaustive()
    }
}
