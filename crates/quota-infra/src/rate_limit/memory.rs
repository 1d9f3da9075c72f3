//! In-memory fixed-window counters - used when Redis is unavailable.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;

use quota_core::ports::CounterBackend;
use quota_core::{BackendError, Clock, CounterRecord, Decision, Policy};

/// In-memory backend configuration.
#[derive(Debug, Clone)]
pub struct LocalBackendConfig {
    /// Run the expiry sweep on roughly one call out of this many, chosen at
    /// random. `1` sweeps on every call; `0` disables the inline sweep (e.g.
    /// when a scheduler drives [`LocalCounterBackend::sweep`]).
    pub sweep_every: u32,
}

impl Default for LocalBackendConfig {
    fn default() -> Self {
        Self { sweep_every: 100 }
    }
}

impl LocalBackendConfig {
    pub fn from_env() -> Self {
        Self {
            sweep_every: std::env::var("QUOTA_SWEEP_EVERY")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(100),
        }
    }
}

/// Process-local fixed-window counters behind a single async mutex.
///
/// This is the fallback when the shared store is absent or failing.
/// Note: Counts are per-process and never reconciled with the shared store.
pub struct LocalCounterBackend {
    store: Mutex<HashMap<String, CounterRecord>>,
    clock: Arc<dyn Clock>,
    config: LocalBackendConfig,
}

impl LocalCounterBackend {
    pub fn new(config: LocalBackendConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            store: Mutex::new(HashMap::new()),
            clock,
            config,
        }
    }

    /// Count one attempt. Never fails.
    ///
    /// Once a window is saturated the record is left untouched, so the
    /// stored count stops at `max_attempts`.
    pub async fn record(&self, identifier: &str, policy: &Policy) -> Decision {
        let now = self.clock.now();
        let mut store = self.store.lock().await;

        if self.sweep_due() {
            let evicted = Self::evict_expired(&mut store, now);
            tracing::debug!(evicted, "Swept expired local counters");
        }

        if let Some(record) = store
            .get_mut(identifier)
            .filter(|record| !record.is_expired(now))
        {
            if record.count >= policy.max_attempts() {
                return record.decision(policy, false);
            }
            record.count += 1;
            return record.decision(policy, true);
        }

        let record = CounterRecord::fresh(now, policy);
        store.insert(identifier.to_string(), record);
        record.decision(policy, true)
    }

    /// Forget the counter for `identifier`, if any.
    pub async fn clear(&self, identifier: &str) {
        self.store.lock().await.remove(identifier);
    }

    /// Drop every record whose window has ended. Returns the number removed.
    pub async fn sweep(&self) -> usize {
        let now = self.clock.now();
        let mut store = self.store.lock().await;
        Self::evict_expired(&mut store, now)
    }

    /// Number of records currently held, expired or not.
    pub async fn len(&self) -> usize {
        self.store.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    fn sweep_due(&self) -> bool {
        match self.config.sweep_every {
            0 => false,
            every => rand::random_ratio(1, every),
        }
    }

    fn evict_expired(store: &mut HashMap<String, CounterRecord>, now: DateTime<Utc>) -> usize {
        let before = store.len();
        store.retain(|_, record| !record.is_expired(now));
        before - store.len()
    }
}

#[async_trait]
impl CounterBackend for LocalCounterBackend {
    async fn check(&self, identifier: &str, policy: &Policy) -> Result<Decision, BackendError> {
        Ok(self.record(identifier, policy).await)
    }

    async fn reset(&self, identifier: &str) -> Result<(), BackendError> {
        self.clear(identifier).await;
        Ok(())
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}
