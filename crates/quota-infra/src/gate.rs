//! Quota gate - the single entry point callers use to bound request rates.

use std::sync::Arc;

use quota_core::ports::CounterBackend;
use quota_core::{Decision, Policy};

use crate::rate_limit::LocalCounterBackend;

/// Reachability of the shared counter store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SharedStatus {
    /// No shared store configured; every call uses local counters.
    Disabled,
    Up,
    Down,
}

impl SharedStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SharedStatus::Disabled => "disabled",
            SharedStatus::Up => "up",
            SharedStatus::Down => "down",
        }
    }
}

/// Chooses a counter store per call.
///
/// The shared store is tried first on every call; any error sends that one
/// call to the local counters. Nothing about an outage is remembered, so the
/// shared store is used again as soon as it answers.
pub struct QuotaGate {
    local: Arc<LocalCounterBackend>,
    shared: Option<Arc<dyn CounterBackend>>,
}

impl QuotaGate {
    pub fn new(local: Arc<LocalCounterBackend>, shared: Option<Arc<dyn CounterBackend>>) -> Self {
        Self { local, shared }
    }

    /// Gate that only ever uses process-local counters.
    pub fn local_only(local: Arc<LocalCounterBackend>) -> Self {
        Self::new(local, None)
    }

    /// Record one attempt for `identifier` under `policy`.
    ///
    /// Never fails: store outages degrade to per-process counting.
    pub async fn check(&self, identifier: &str, policy: &Policy) -> Decision {
        if let Some(shared) = &self.shared {
            match shared.check(identifier, policy).await {
                Ok(decision) => return decision,
                Err(e) => {
                    tracing::warn!(
                        backend = shared.name(),
                        error = %e,
                        "Shared counter store failed, using local counters"
                    );
                }
            }
        }

        self.local.record(identifier, policy).await
    }

    /// Clear `identifier` in both stores, whichever served earlier calls.
    pub async fn reset(&self, identifier: &str) {
        if let Some(shared) = &self.shared {
            if let Err(e) = shared.reset(identifier).await {
                tracing::error!(
                    backend = shared.name(),
                    error = %e,
                    "Failed to reset shared counter"
                );
            }
        }

        self.local.clear(identifier).await;
    }

    /// Probe the shared store.
    pub async fn shared_status(&self) -> SharedStatus {
        match &self.shared {
            None => SharedStatus::Disabled,
            Some(shared) => match shared.ping().await {
                Ok(()) => SharedStatus::Up,
                Err(e) => {
                    tracing::warn!(backend = shared.name(), error = %e, "Shared counter store unreachable");
                    SharedStatus::Down
                }
            },
        }
    }

    pub fn local(&self) -> &Arc<LocalCounterBackend> {
        &self.local
    }
}
