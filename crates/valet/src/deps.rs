// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use futures_util::future::{BoxFuture, join_all};
use parking_lot::Mutex;
use pulse::{Clock, FutureExt as _};
use serde::Serialize;

/// An async probe reporting whether a dependency is healthy.
pub type ProbeFn = Arc<dyn Fn() -> BoxFuture<'static, bool> + Send + Sync>;

/// A named external collaborator whose health gates the adapter.
///
/// A **required** dependency that probes unhealthy fails `start()` and the aggregate
/// health check. An **optional** dependency that fails is logged and otherwise
/// ignored. Each probe run is bounded by its own `timeout` and retried up to
/// `retries` extra times before being declared unhealthy.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
///
/// use valet::Dependency;
///
/// let dep = Dependency::new("session-store", || async { true })
///     .required(true)
///     .timeout(Duration::from_secs(2))
///     .retries(1);
/// assert_eq!(dep.name(), "session-store");
/// ```
#[derive(Clone)]
pub struct Dependency {
    name: String,
    required: bool,
    health_check: bool,
    timeout: Duration,
    retries: u32,
    probe: ProbeFn,
}

impl Dependency {
    /// Creates a required dependency probed by `probe`, with a 5s probe timeout and
    /// no probe retries.
    #[must_use]
    pub fn new<F, Fut>(name: impl Into<String>, probe: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = bool> + Send + 'static,
    {
        Self {
            name: name.into(),
            required: true,
            health_check: true,
            timeout: Duration::from_secs(5),
            retries: 0,
            probe: Arc::new(move || -> BoxFuture<'static, bool> { Box::pin(probe()) }),
        }
    }

    /// Marks the dependency required or optional.
    #[must_use]
    pub fn required(mut self, required: bool) -> Self {
        self.required = required;
        self
    }

    /// Enables or disables probing. A disabled probe always reports healthy.
    #[must_use]
    pub fn health_check(mut self, enabled: bool) -> Self {
        self.health_check = enabled;
        self
    }

    /// Bounds each probe run.
    #[must_use]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Extra probe runs before the dependency is declared unhealthy.
    #[must_use]
    pub fn retries(mut self, retries: u32) -> Self {
        self.retries = retries;
        self
    }

    /// The dependency's name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether a failed probe fails the aggregate check.
    #[must_use]
    pub fn is_required(&self) -> bool {
        self.required
    }

    async fn probe_once(&self, clock: &Clock) -> bool {
        match (self.probe)().timeout(clock, self.timeout).await {
            Ok(healthy) => healthy,
            Err(_elapsed) => false,
        }
    }

    async fn probe(&self, clock: &Clock) -> bool {
        if !self.health_check {
            return true;
        }

        for _ in 0..=self.retries {
            if self.probe_once(clock).await {
                return true;
            }
        }

        false
    }
}

impl fmt::Debug for Dependency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dependency")
            .field("name", &self.name)
            .field("required", &self.required)
            .field("health_check", &self.health_check)
            .field("timeout", &self.timeout)
            .field("retries", &self.retries)
            .finish_non_exhaustive()
    }
}

/// The health of one dependency as of its latest probe.
#[derive(Debug, Clone, Serialize)]
pub struct DependencyHealth {
    /// The dependency's name.
    pub name: String,

    /// Whether it is required.
    pub required: bool,

    /// The latest probe verdict.
    pub healthy: bool,

    /// When the probe ran.
    pub checked_at: SystemTime,
}

/// The outcome of probing every registered dependency.
#[derive(Debug, Clone)]
pub(crate) struct DependencyReport {
    pub(crate) results: Vec<DependencyHealth>,
}

impl DependencyReport {
    /// `true` iff every required dependency probed healthy.
    pub(crate) fn all_required_healthy(&self) -> bool {
        self.results.iter().all(|r| r.healthy || !r.required)
    }

    /// The first failed required dependency, if any.
    pub(crate) fn first_required_failure(&self) -> Option<&str> {
        self.results
            .iter()
            .find(|r| r.required && !r.healthy)
            .map(|r| r.name.as_str())
    }
}

/// Registered dependencies with their latest probe results.
#[derive(Debug)]
pub(crate) struct DependencyRegistry {
    clock: Clock,
    inner: Mutex<HashMap<String, DependencyState>>,
}

#[derive(Debug)]
struct DependencyState {
    dependency: Dependency,
    last_check: Option<SystemTime>,
    last_healthy: Option<bool>,
}

impl DependencyRegistry {
    pub(crate) fn new(clock: &Clock) -> Self {
        Self {
            clock: clock.clone(),
            inner: Mutex::new(HashMap::new()),
        }
    }

    /// Registers a dependency, replacing any previous one with the same name.
    pub(crate) fn add(&self, dependency: Dependency) {
        let mut inner = self.inner.lock();
        let _ = inner.insert(
            dependency.name().to_owned(),
            DependencyState {
                dependency,
                last_check: None,
                last_healthy: None,
            },
        );
    }

    /// Removes a dependency; returns whether it existed.
    pub(crate) fn remove(&self, name: &str) -> bool {
        self.inner.lock().remove(name).is_some()
    }

    /// Probes every registered dependency concurrently.
    ///
    /// Each probe is independently bounded by its own timeout; a slow probe cannot
    /// starve the others. Optional-dependency failures are logged but do not fail
    /// the aggregate.
    pub(crate) async fn check_all(&self) -> DependencyReport {
        let dependencies: Vec<Dependency> = self.inner.lock().values().map(|s| s.dependency.clone()).collect();

        let clock = self.clock.clone();
        let checks = dependencies.iter().map(|dep| {
            let clock = clock.clone();
            async move { (dep.name().to_owned(), dep.is_required(), dep.probe(&clock).await) }
        });

        let outcomes = join_all(checks).await;
        let checked_at = self.clock.system_time();

        let mut results = Vec::with_capacity(outcomes.len());
        {
            let mut inner = self.inner.lock();
            for (name, required, healthy) in outcomes {
                if let Some(state) = inner.get_mut(&name) {
                    state.last_check = Some(checked_at);
                    state.last_healthy = Some(healthy);
                }

                if !healthy && !required {
                    tracing::warn!(dependency = %name, "optional dependency probed unhealthy");
                }

                results.push(DependencyHealth {
                    name,
                    required,
                    healthy,
                    checked_at,
                });
            }
        }

        DependencyReport { results }
    }

    /// The latest known health per dependency, without re-probing.
    pub(crate) fn latest(&self) -> Vec<DependencyHealth> {
        self.inner
            .lock()
            .values()
            .map(|state| DependencyHealth {
                name: state.dependency.name().to_owned(),
                required: state.dependency.is_required(),
                healthy: state.last_healthy.unwrap_or(true),
                checked_at: state.last_check.unwrap_or(SystemTime::UNIX_EPOCH),
            })
            .collect()
    }

    pub(crate) fn clear(&self) {
        self.inner.lock().clear();
    }
}
