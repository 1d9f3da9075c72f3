//! Application state - shared across all handlers.

use std::sync::Arc;

use quota_core::{Clock, SystemClock};
use quota_infra::{LocalCounterBackend, QuotaGate};

#[cfg(feature = "redis")]
use quota_core::ports::CounterBackend;
#[cfg(feature = "redis")]
use quota_infra::SharedCounterBackend;

use crate::config::{AppConfig, ScopePolicies};

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub gate: Arc<QuotaGate>,
    pub clock: Arc<dyn Clock>,
    pub scopes: ScopePolicies,
}

impl AppState {
    /// Build the application state on the system clock.
    pub fn new(config: &AppConfig) -> Self {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    /// Build the application state with appropriate counter stores.
    pub fn with_clock(config: &AppConfig, clock: Arc<dyn Clock>) -> Self {
        let local = Arc::new(LocalCounterBackend::new(config.local.clone(), clock.clone()));

        #[cfg(feature = "redis")]
        let shared: Option<Arc<dyn CounterBackend>> = match &config.redis {
            Some(redis) => match SharedCounterBackend::new(redis.clone(), clock.clone()) {
                Ok(backend) => {
                    tracing::info!(key_prefix = %redis.key_prefix, "Shared counter store configured");
                    Some(Arc::new(backend))
                }
                Err(e) => {
                    tracing::error!(
                        "Invalid Redis configuration: {}. Using local counters only.",
                        e
                    );
                    None
                }
            },
            None => {
                tracing::warn!("REDIS_URL not set. Quota counters are per-process (local mode).");
                None
            }
        };

        #[cfg(not(feature = "redis"))]
        let shared = {
            tracing::info!("Running without redis feature - using local counters only");
            None
        };

        tracing::info!("Application state initialized");

        Self {
            gate: Arc::new(QuotaGate::new(local, shared)),
            clock,
            scopes: config.scopes,
        }
    }
}
