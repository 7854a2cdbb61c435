// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::collections::BTreeSet;
use std::time::Duration;

use serde::Serialize;

/// An error produced when configuration fails validation.
///
/// Validation is all-or-nothing: a rejected configuration (or partial update) leaves
/// the previously applied configuration untouched.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConfigError {
    /// The adapter name is empty.
    #[error("adapter name must not be empty")]
    EmptyName,

    /// The default operation timeout is below the minimum bound.
    #[error("default timeout must be at least 1s, got {0:?}")]
    TimeoutTooShort(Duration),

    /// The concurrency limit is zero.
    #[error("concurrency limit must be at least 1")]
    ZeroConcurrency,

    /// Retry is enabled with zero attempts.
    #[error("retry is enabled but max_attempts is 0")]
    ZeroAttempts,

    /// The backoff multiplier shrinks delays.
    #[error("backoff multiplier must be at least 1.0, got {0}")]
    MultiplierTooSmall(f64),

    /// The cache is enabled with zero capacity.
    #[error("cache is enabled but max_entries is 0")]
    ZeroCacheCapacity,

    /// The cache is enabled with a zero TTL.
    #[error("cache is enabled but default_ttl is zero")]
    ZeroCacheTtl,

    /// A mutating operation was declared cacheable.
    #[error("operation '{0}' is mutating and must not be cacheable")]
    CacheableMutation(String),

    /// Two operations share a name.
    #[error("duplicate operation '{0}'")]
    DuplicateOperation(String),
}

/// Caching policy for an adapter.
#[derive(Debug, Clone, Serialize)]
pub struct CachePolicy {
    /// Whether results of cacheable operations are memoized at all.
    pub enabled: bool,

    /// Time-to-live applied to cached entries.
    pub default_ttl: Duration,

    /// Entry count that triggers eviction.
    pub max_entries: usize,

    /// Prefix prepended to every cache key, separating adapters that share a
    /// key naming scheme.
    pub key_prefix: String,
}

impl Default for CachePolicy {
    fn default() -> Self {
        Self {
            enabled: true,
            default_ttl: Duration::from_secs(300),
            max_entries: 1000,
            key_prefix: "valet".to_owned(),
        }
    }
}

/// Retry policy for an adapter.
///
/// Delay before attempt `n + 1` is `backoff_multiplier^(n-1) * base_delay`, optionally
/// clamped to `max_delay` and jittered by ±25%. Only operations listed in
/// `retryable_operations` are ever retried, and only for transient failures.
#[derive(Debug, Clone, Serialize)]
pub struct RetryPolicy {
    /// Master switch; disabling it turns every operation into single-shot.
    pub enabled: bool,

    /// Total attempts, including the first.
    pub max_attempts: u32,

    /// Base unit for backoff delays.
    pub base_delay: Duration,

    /// Growth factor between consecutive delays.
    pub backoff_multiplier: f64,

    /// Upper bound on any single delay.
    pub max_delay: Option<Duration>,

    /// Adds ±25% of randomization to each delay to spread synchronized retries.
    pub jitter: bool,

    /// Names of operations eligible for retry.
    pub retryable_operations: BTreeSet<String>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            enabled: true,
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
            backoff_multiplier: 2.0,
            max_delay: None,
            jitter: false,
            retryable_operations: BTreeSet::new(),
        }
    }
}

impl RetryPolicy {
    /// Whether the named operation may be retried under this policy.
    #[must_use]
    pub fn covers(&self, operation: &str) -> bool {
        self.enabled && self.retryable_operations.contains(operation)
    }
}

/// Configuration of a [`ServiceAdapter`][crate::ServiceAdapter].
///
/// Immutable once applied, except through
/// [`update_config`][crate::ServiceAdapter::update_config], which re-validates the
/// merged whole before swapping it in. The `name` is fixed for the adapter's lifetime;
/// it anchors the uniqueness invariant enforced by
/// [`AdapterRegistry`][crate::AdapterRegistry].
#[derive(Debug, Clone, Serialize)]
pub struct AdapterConfig {
    /// Unique adapter name.
    pub name: String,

    /// Free-form capability tags surfaced through `status()`.
    pub capabilities: Vec<String>,

    /// Caching policy.
    pub cache: CachePolicy,

    /// Retry policy.
    pub retry: RetryPolicy,

    /// Maximum number of concurrently executing backend flights.
    pub concurrency_limit: usize,

    /// Time bound applied to `execute` calls that carry no explicit override.
    pub default_timeout: Duration,

    /// Cadence of the cache sweep and metrics pruning task.
    pub maintenance_interval: Duration,

    /// Cadence of the periodic dependency health probe.
    pub dependency_probe_interval: Duration,
}

impl AdapterConfig {
    /// Creates a configuration with defaults for everything but the name.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            capabilities: Vec::new(),
            cache: CachePolicy::default(),
            retry: RetryPolicy::default(),
            concurrency_limit: 10,
            default_timeout: Duration::from_secs(30),
            maintenance_interval: Duration::from_secs(30),
            dependency_probe_interval: Duration::from_secs(60),
        }
    }

    /// Validates every bound. Returns the first violation found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.name.trim().is_empty() {
            return Err(ConfigError::EmptyName);
        }

        if self.default_timeout < Duration::from_secs(1) {
            return Err(ConfigError::TimeoutTooShort(self.default_timeout));
        }

        if self.concurrency_limit == 0 {
            return Err(ConfigError::ZeroConcurrency);
        }

        if self.retry.enabled {
            if self.retry.max_attempts == 0 {
                return Err(ConfigError::ZeroAttempts);
            }
            if self.retry.backoff_multiplier < 1.0 {
                return Err(ConfigError::MultiplierTooSmall(self.retry.backoff_multiplier));
            }
        }

        if self.cache.enabled {
            if self.cache.max_entries == 0 {
                return Err(ConfigError::ZeroCacheCapacity);
            }
            if self.cache.default_ttl.is_zero() {
                return Err(ConfigError::ZeroCacheTtl);
            }
        }

        Ok(())
    }

    /// Produces the configuration that would result from applying `update`.
    ///
    /// The caller validates the result before committing it; `merged` itself never
    /// mutates the current configuration.
    #[must_use]
    pub(crate) fn merged(&self, update: &ConfigUpdate) -> Self {
        let mut next = self.clone();

        if let Some(capabilities) = &update.capabilities {
            next.capabilities = capabilities.clone();
        }
        if let Some(cache) = &update.cache {
            next.cache = cache.clone();
        }
        if let Some(retry) = &update.retry {
            next.retry = retry.clone();
        }
        if let Some(limit) = update.concurrency_limit {
            next.concurrency_limit = limit;
        }
        if let Some(timeout) = update.default_timeout {
            next.default_timeout = timeout;
        }
        if let Some(interval) = update.maintenance_interval {
            next.maintenance_interval = interval;
        }
        if let Some(interval) = update.dependency_probe_interval {
            next.dependency_probe_interval = interval;
        }

        next
    }
}

/// A partial configuration update.
///
/// Fields left as `None` keep their current value. The adapter name is deliberately
/// absent: it cannot change after construction.
#[derive(Debug, Clone, Default)]
pub struct ConfigUpdate {
    /// Replaces the capability tags.
    pub capabilities: Option<Vec<String>>,

    /// Replaces the caching policy.
    pub cache: Option<CachePolicy>,

    /// Replaces the retry policy.
    pub retry: Option<RetryPolicy>,

    /// Replaces the concurrency limit.
    pub concurrency_limit: Option<usize>,

    /// Replaces the default operation timeout.
    pub default_timeout: Option<Duration>,

    /// Replaces the maintenance cadence.
    pub maintenance_interval: Option<Duration>,

    /// Replaces the dependency probe cadence.
    pub dependency_probe_interval: Option<Duration>,
}
