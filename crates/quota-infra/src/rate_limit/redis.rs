//! Redis fixed-window counters shared by every process.
//!
//! One check is `INCR`, then `PEXPIRE` when that increment created the key,
//! then `PTTL`. The increment is the only step that has to be atomic. If the
//! expiry is never attached the counter simply lives until it is reset.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeDelta, Utc};
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client, RedisResult};
use tokio::sync::{Mutex, OnceCell};

use quota_core::ports::CounterBackend;
use quota_core::{BackendError, Clock, Decision, Policy};

/// Redis counter store configuration.
#[derive(Debug, Clone)]
pub struct RedisConfig {
    /// Redis URL (e.g., redis://localhost:6379)
    pub url: String,
    /// Bound on establishing the connection
    pub connect_timeout: Duration,
    /// Bound on every individual command
    pub command_timeout: Duration,
    /// Prefix isolating quota keys from other users of the store
    pub key_prefix: String,
}

impl RedisConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            connect_timeout: Duration::from_millis(2000),
            command_timeout: Duration::from_millis(500),
            key_prefix: "ratelimit:".to_string(),
        }
    }

    /// Load configuration from environment variables.
    ///
    /// Returns `None` when `REDIS_URL` is unset: running without a shared
    /// store is a supported mode, not an error.
    pub fn from_env() -> Option<Self> {
        let url = std::env::var("REDIS_URL").ok().filter(|u| !u.is_empty())?;
        let defaults = Self::new(url);

        Some(Self {
            connect_timeout: env_millis("REDIS_CONNECT_TIMEOUT_MS")
                .unwrap_or(defaults.connect_timeout),
            command_timeout: env_millis("REDIS_COMMAND_TIMEOUT_MS")
                .unwrap_or(defaults.command_timeout),
            key_prefix: std::env::var("QUOTA_KEY_PREFIX").unwrap_or(defaults.key_prefix.clone()),
            ..defaults
        })
    }
}

fn env_millis(name: &str) -> Option<Duration> {
    std::env::var(name)
        .ok()
        .and_then(|s| s.parse().ok())
        .map(Duration::from_millis)
}

/// Redis-backed fixed-window counters.
///
/// The connection is opened on first use. A failed attempt is reported for
/// that call only and retried on the next one, so a store that comes up
/// after the process started is picked up without a restart. Once
/// established, the connection manager reconnects on its own.
///
/// At most one connect attempt is in flight. Calls arriving meanwhile fail
/// fast instead of queueing, so no call waits longer than one
/// `connect_timeout`.
pub struct SharedCounterBackend {
    client: Client,
    conn: OnceCell<ConnectionManager>,
    connecting: Mutex<()>,
    config: RedisConfig,
    clock: Arc<dyn Clock>,
}

impl SharedCounterBackend {
    pub fn new(config: RedisConfig, clock: Arc<dyn Clock>) -> Result<Self, BackendError> {
        let client = Client::open(config.url.as_str())
            .map_err(|e| BackendError::Connection(e.to_string()))?;

        Ok(Self {
            client,
            conn: OnceCell::new(),
            connecting: Mutex::new(()),
            config,
            clock,
        })
    }

    fn make_key(&self, identifier: &str) -> String {
        format!("{}{}", self.config.key_prefix, identifier)
    }

    async fn connection(&self) -> Result<ConnectionManager, BackendError> {
        if let Some(conn) = self.conn.get() {
            return Ok(conn.clone());
        }

        let _attempt = self.connecting.try_lock().map_err(|_| {
            BackendError::Connection("connection attempt already in progress".to_string())
        })?;

        // Another caller may have finished connecting between the two checks.
        if let Some(conn) = self.conn.get() {
            return Ok(conn.clone());
        }

        let timeout = self.config.connect_timeout;
        let conn = tokio::time::timeout(timeout, ConnectionManager::new(self.client.clone()))
            .await
            .map_err(|_| BackendError::Timeout(timeout))?
            .map_err(|e| BackendError::Connection(e.to_string()))?;

        tracing::info!(key_prefix = %self.config.key_prefix, "Connected to Redis counter store");
        Ok(self.conn.get_or_init(|| async { conn }).await.clone())
    }

    /// Await one command under the configured command timeout.
    async fn run<T, F>(&self, command: F) -> Result<T, BackendError>
    where
        F: Future<Output = RedisResult<T>>,
    {
        let timeout = self.config.command_timeout;
        tokio::time::timeout(timeout, command)
            .await
            .map_err(|_| BackendError::Timeout(timeout))?
            .map_err(|e| BackendError::Operation(e.to_string()))
    }
}

#[async_trait]
impl CounterBackend for SharedCounterBackend {
    async fn check(&self, identifier: &str, policy: &Policy) -> Result<Decision, BackendError> {
        let key = self.make_key(identifier);
        let now = self.clock.now();
        let mut conn = self.connection().await?;

        let count: i64 = self.run(conn.incr(&key, 1)).await?;

        if count == 1 {
            let window_ms = i64::try_from(policy.window().as_millis()).unwrap_or(i64::MAX);
            if let Err(e) = self.run::<(), _>(conn.pexpire(&key, window_ms)).await {
                tracing::warn!(
                    error = %e,
                    "Failed to attach window expiry; counter persists until reset"
                );
            }
        }

        let ttl_ms: i64 = self.run(conn.pttl(&key)).await?;

        Ok(decide(count, ttl_ms, policy, now))
    }

    async fn reset(&self, identifier: &str) -> Result<(), BackendError> {
        let key = self.make_key(identifier);
        let mut conn = self.connection().await?;
        self.run::<(), _>(conn.del(&key)).await
    }

    async fn ping(&self) -> Result<(), BackendError> {
        let mut conn = self.connection().await?;
        let _pong: String = self.run(redis::cmd("PING").query_async(&mut conn)).await?;
        Ok(())
    }

    fn name(&self) -> &'static str {
        "redis"
    }
}

/// Turn a post-increment count and remaining TTL into a decision.
///
/// A missing or non-positive TTL (`-1` no expiry, `-2` already gone) means
/// the expiry has not landed yet, so the window is assumed to start now.
fn decide(count: i64, ttl_ms: i64, policy: &Policy, now: DateTime<Utc>) -> Decision {
    let count = u64::try_from(count).unwrap_or(0);
    let remaining_window = if ttl_ms > 0 {
        TimeDelta::milliseconds(ttl_ms)
    } else {
        policy.window_delta()
    };

    Decision {
        allowed: count <= u64::from(policy.max_attempts()),
        remaining: policy.remaining_after(count),
        reset_at: now
            .checked_add_signed(remaining_window)
            .unwrap_or(DateTime::<Utc>::MAX_UTC),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quota_core::SystemClock;

    #[test]
    fn test_decide_uses_ttl_when_present() {
        let now = Utc::now();
        let decision = decide(3, 42_000, &Policy::default(), now);

        assert!(decision.allowed);
        assert_eq!(decision.remaining, 2);
        assert_eq!(decision.reset_at, now + TimeDelta::seconds(42));
    }

    #[test]
    fn test_decide_falls_back_to_full_window_without_ttl() {
        let now = Utc::now();
        let policy = Policy::default();

        for ttl in [-1, -2, 0] {
            let decision = decide(1, ttl, &policy, now);
            assert_eq!(decision.reset_at, now + TimeDelta::minutes(15));
        }
    }

    #[test]
    fn test_decide_blocks_past_limit() {
        let now = Utc::now();
        let policy = Policy::default();

        let at_limit = decide(5, 1_000, &policy, now);
        assert!(at_limit.allowed);
        assert_eq!(at_limit.remaining, 0);

        let over = decide(9, 1_000, &policy, now);
        assert!(!over.allowed);
        assert_eq!(over.remaining, 0);
    }

    #[test]
    fn test_decide_without_expiry_still_answers() {
        // INCR landed but PEXPIRE did not: PTTL reports -1 from then on.
        let now = Utc::now();
        let policy = Policy::default();

        let decision = decide(7, -1, &policy, now);

        assert!(!decision.allowed);
        assert_eq!(decision.remaining, 0);
        assert_eq!(decision.reset_at, now + policy.window_delta());
    }

    #[test]
    fn test_config_defaults() {
        let config = RedisConfig::new("redis://localhost:6379");
        assert_eq!(config.key_prefix, "ratelimit:");
        assert_eq!(config.command_timeout, Duration::from_millis(500));
    }

    async fn get_test_backend() -> Option<SharedCounterBackend> {
        let mut config = RedisConfig::new(
            std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://localhost:6389".to_string()),
        );
        config.connect_timeout = Duration::from_secs(1);
        config.key_prefix = "test_ratelimit:".to_string();

        let backend = SharedCounterBackend::new(config, Arc::new(SystemClock)).ok()?;
        backend.ping().await.ok()?;
        Some(backend)
    }

    #[tokio::test]
    async fn test_redis_counter_window() {
        let backend = match get_test_backend().await {
            Some(b) => b,
            None => return,
        };
        let policy = Policy::new(2, Duration::from_secs(1)).unwrap();
        let key = "test_user_1";
        backend.reset(key).await.unwrap();

        let first = backend.check(key, &policy).await.unwrap();
        assert!(first.allowed);
        assert_eq!(first.remaining, 1);

        let second = backend.check(key, &policy).await.unwrap();
        assert!(second.allowed);
        assert_eq!(second.remaining, 0);

        let third = backend.check(key, &policy).await.unwrap();
        assert!(!third.allowed);

        // Wait for the key to expire
        tokio::time::sleep(Duration::from_millis(1500)).await;

        let fourth = backend.check(key, &policy).await.unwrap();
        assert!(fourth.allowed);
        assert_eq!(fourth.remaining, 1);
    }

    #[tokio::test]
    async fn test_redis_reset_clears_counter() {
        let backend = match get_test_backend().await {
            Some(b) => b,
            None => return,
        };
        let policy = Policy::default();
        let key = "test_user_reset";
        backend.reset(key).await.unwrap();

        for _ in 0..6 {
            backend.check(key, &policy).await.unwrap();
        }
        backend.reset(key).await.unwrap();
        backend.reset(key).await.unwrap();

        let decision = backend.check(key, &policy).await.unwrap();
        assert!(decision.allowed);
        assert_eq!(decision.remaining, 4);
        backend.reset(key).await.unwrap();
    }

    #[tokio::test]
    async fn test_unreachable_store_is_a_backend_error() {
        let mut config = RedisConfig::new("redis://127.0.0.1:1");
        config.connect_timeout = Duration::from_millis(200);
        let backend = SharedCounterBackend::new(config, Arc::new(SystemClock)).unwrap();

        let result = backend.check("anyone", &Policy::default()).await;
        assert!(matches!(
            result,
            Err(BackendError::Connection(_) | BackendError::Timeout(_))
        ));
    }

    async fn silent_listener() -> (String, tokio::task::JoinHandle<()>) {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let handle = tokio::spawn(async move {
            let mut held = Vec::new();
            while let Ok((socket, _)) = listener.accept().await {
                held.push(socket);
            }
        });
        (format!("redis://{}", addr), handle)
    }

    #[tokio::test]
    async fn test_concurrent_calls_do_not_queue_behind_a_hanging_connect() {
        let (url, listener) = silent_listener().await;
        let mut config = RedisConfig::new(url);
        config.connect_timeout = Duration::from_millis(300);
        config.command_timeout = Duration::from_millis(300);
        let backend = SharedCounterBackend::new(config, Arc::new(SystemClock)).unwrap();
        let policy = Policy::default();

        let backend = &backend;
        let policy = &policy;
        let calls = (0..8).map(|i| async move {
            let started = std::time::Instant::now();
            let result = backend.check(&format!("user-{i}"), policy).await;
            (result, started.elapsed())
        });
        let outcomes = futures::future::join_all(calls).await;

        for (result, elapsed) in outcomes {
            assert!(matches!(
                result,
                Err(BackendError::Connection(_) | BackendError::Timeout(_))
            ));
            assert!(elapsed < Duration::from_millis(600), "call took {elapsed:?}");
        }
        listener.abort();
    }

    #[tokio::test]
    async fn test_redis_counter_without_expiry_is_tolerated() {
        let backend = match get_test_backend().await {
            Some(b) => b,
            None => return,
        };
        let policy = Policy::default();
        let key = "test_user_no_expiry";
        backend.reset(key).await.unwrap();

        // Leave a counter behind as if PEXPIRE had failed after INCR.
        let mut conn = backend.connection().await.unwrap();
        let _: i64 = conn.incr(backend.make_key(key), 1).await.unwrap();

        let now = Utc::now();
        let decision = backend.check(key, &policy).await.unwrap();
        assert!(decision.allowed);
        assert_eq!(decision.remaining, 3);
        assert!(decision.reset_at >= now + policy.window_delta());

        let ttl: i64 = conn.pttl(backend.make_key(key)).await.unwrap();
        assert_eq!(ttl, -1);

        backend.reset(key).await.unwrap();
    }
}
