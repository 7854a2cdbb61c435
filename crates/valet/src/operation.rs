// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use futures_util::future::BoxFuture;
use serde_json::Value;

use crate::config::ConfigError;
use crate::Failure;

/// What a handler learns about the call it is serving.
///
/// Handlers receive the context alongside their parameters and must not reach into
/// adapter-internal state; everything they are entitled to know travels here.
#[derive(Debug, Clone)]
pub struct CallContext {
    /// The time bound the caller is waiting under.
    pub timeout: Duration,

    /// 1-based attempt number of this invocation.
    pub attempt: u32,

    /// The call's unique id, matching the report's metadata and operation events.
    pub operation_id: String,
}

/// Per-call options accepted by [`execute`][crate::ServiceAdapter::execute].
#[derive(Debug, Clone, Default)]
pub struct CallOptions {
    /// Overrides the adapter's default timeout for this call.
    pub timeout: Option<Duration>,
}

impl CallOptions {
    /// Options with a per-call timeout override.
    #[must_use]
    pub fn with_timeout(timeout: Duration) -> Self {
        Self { timeout: Some(timeout) }
    }
}

/// Whether an operation reads or writes backend state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationKind {
    /// Reads state; may be cacheable.
    Query,
    /// Creates, updates or deletes state; never cacheable.
    Mutation,
}

pub(crate) type HandlerFn = Arc<dyn Fn(Value, CallContext) -> BoxFuture<'static, Result<Value, Failure>> + Send + Sync>;

/// A named unit of work dispatched through the adapter.
///
/// The adapter is oblivious to what an operation does; it only knows the name, the
/// kind, the cacheability flag, and the handler to invoke. Handlers receive
/// `(params, context)` and report failures as [`Failure`] values rather than panics.
///
/// # Examples
///
/// ```
/// use serde_json::json;
/// use valet::Operation;
///
/// let fetch = Operation::query("fetch_document", |params, _ctx| async move {
///     let id = params["id"].as_u64().unwrap_or(0);
///     Ok(json!({ "id": id, "body": "..." }))
/// })
/// .cacheable(true);
///
/// assert_eq!(fetch.name(), "fetch_document");
/// assert!(fetch.is_cacheable());
/// ```
#[derive(Clone)]
pub struct Operation {
    name: String,
    kind: OperationKind,
    cacheable: bool,
    handler: HandlerFn,
}

impl Operation {
    /// Declares a read operation. Not cacheable until marked so.
    #[must_use]
    pub fn query<F, Fut>(name: impl Into<String>, handler: F) -> Self
    where
        F: Fn(Value, CallContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value, Failure>> + Send + 'static,
    {
        Self::new(name, OperationKind::Query, handler)
    }

    /// Declares a write operation. Mutations can never be cacheable.
    #[must_use]
    pub fn mutation<F, Fut>(name: impl Into<String>, handler: F) -> Self
    where
        F: Fn(Value, CallContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value, Failure>> + Send + 'static,
    {
        Self::new(name, OperationKind::Mutation, handler)
    }

    fn new<F, Fut>(name: impl Into<String>, kind: OperationKind, handler: F) -> Self
    where
        F: Fn(Value, CallContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value, Failure>> + Send + 'static,
    {
        Self {
            name: name.into(),
            kind,
            cacheable: false,
            handler: Arc::new(move |params, ctx| -> BoxFuture<'static, Result<Value, Failure>> {
                Box::pin(handler(params, ctx))
            }),
        }
    }

    /// Marks the operation's results as memoizable.
    ///
    /// Cacheability of a mutation is rejected when the operation table is built.
    #[must_use]
    pub fn cacheable(mut self, cacheable: bool) -> Self {
        self.cacheable = cacheable;
        self
    }

    /// The operation's name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The operation's kind.
    #[must_use]
    pub fn kind(&self) -> OperationKind {
        self.kind
    }

    /// Whether results may be served from the cache.
    #[must_use]
    pub fn is_cacheable(&self) -> bool {
        self.cacheable
    }

    pub(crate) fn handler(&self) -> HandlerFn {
        Arc::clone(&self.handler)
    }
}

impl fmt::Debug for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Operation")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("cacheable", &self.cacheable)
            .finish_non_exhaustive()
    }
}

/// The closed dispatch table built at initialization.
///
/// Names outside the table are rejected at the `execute` boundary; nothing is
/// dispatched on a string that was not validated here first.
#[derive(Debug, Default)]
pub(crate) struct OperationTable {
    operations: HashMap<String, Operation>,
}

impl OperationTable {
    /// Builds the table, rejecting duplicate names and cacheable mutations.
    pub(crate) fn build(declared: Vec<Operation>) -> Result<Self, ConfigError> {
        let mut operations = HashMap::with_capacity(declared.len());

        for operation in declared {
            if operation.kind() == OperationKind::Mutation && operation.is_cacheable() {
                return Err(ConfigError::CacheableMutation(operation.name().to_owned()));
            }

            let name = operation.name().to_owned();
            if operations.insert(name.clone(), operation).is_some() {
                return Err(ConfigError::DuplicateOperation(name));
            }
        }

        Ok(Self { operations })
    }

    pub(crate) fn get(&self, name: &str) -> Option<&Operation> {
        self.operations.get(name)
    }

    pub(crate) fn len(&self) -> usize {
        self.operations.len()
    }
}
