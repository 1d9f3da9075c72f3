//! Counter store port.

use async_trait::async_trait;

use crate::domain::{Decision, Policy};
use crate::error::BackendError;

/// Counter backend trait - abstraction over fixed-window counter stores
/// (Redis, in-memory).
#[async_trait]
pub trait CounterBackend: Send + Sync {
    /// Record one attempt for `identifier` and report the resulting decision.
    ///
    /// The identifier is an opaque key; backends must not interpret it.
    async fn check(&self, identifier: &str, policy: &Policy) -> Result<Decision, BackendError>;

    /// Drop any counter held for `identifier`. Absent keys are a no-op.
    async fn reset(&self, identifier: &str) -> Result<(), BackendError>;

    /// Probe the store. Stores without a remote side are always reachable.
    async fn ping(&self) -> Result<(), BackendError> {
        Ok(())
    }

    /// Short backend name for logs.
    fn name(&self) -> &'static str;
}
