// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use futures_util::future::BoxFuture;

use crate::Failure;

/// The narrow capability contract a backend unit satisfies.
///
/// The adapter treats each sub-service as opaque: it is initialized during
/// `initialize()`, consulted during health checks, and shut down during `stop()`.
/// Operation handlers typically hold an `Arc` to the sub-service they front and call
/// into it directly; the adapter itself never routes payloads through this trait.
///
/// Methods return boxed futures so the trait stays object-safe; implementations
/// usually wrap an async block:
///
/// ```
/// use futures_util::future::BoxFuture;
/// use valet::{Failure, SubService};
///
/// struct DocumentStore;
///
/// impl SubService for DocumentStore {
///     fn name(&self) -> &str {
///         "document-store"
///     }
///
///     fn initialize(&self) -> BoxFuture<'_, Result<(), Failure>> {
///         Box::pin(async { Ok(()) })
///     }
///
///     fn shutdown(&self) -> BoxFuture<'_, ()> {
///         Box::pin(async {})
///     }
/// }
/// ```
pub trait SubService: Send + Sync {
    /// The sub-service's name, used in errors and logs.
    fn name(&self) -> &str;

    /// Establishes connections or otherwise readies the backend.
    fn initialize(&self) -> BoxFuture<'_, Result<(), Failure>>;

    /// Reports whether the backend is currently usable. Defaults to healthy.
    fn health_check(&self) -> BoxFuture<'_, bool> {
        Box::pin(async { true })
    }

    /// Closes connections and releases backend resources.
    fn shutdown(&self) -> BoxFuture<'_, ()>;
}
