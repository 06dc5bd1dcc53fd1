//! The native invocation contract.

use std::sync::Arc;

use async_trait::async_trait;

use sqlbridge_common::{NativeResult, Value};

/// A capability that forwards a method call to a native SQLite binding.
///
/// Implementations must run every call for a given connection on the same
/// thread; the bundled [`crate::LocalGateway`] does so through a
/// [`crate::Worker`].
#[async_trait]
pub trait NativeGateway: Send + Sync {
    /// Invokes `method` with `args` and waits for the decoded reply.
    async fn invoke(&self, method: &str, args: Value) -> NativeResult<Value>;
}

#[async_trait]
impl<G: NativeGateway + ?Sized> NativeGateway for Arc<G> {
    async fn invoke(&self, method: &str, args: Value) -> NativeResult<Value> {
        (**self).invoke(method, args).await
    }
}
