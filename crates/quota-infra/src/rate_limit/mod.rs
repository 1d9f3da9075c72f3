//! Fixed-window counter stores - Redis and in-memory fallback.

mod memory;

pub use memory::{LocalBackendConfig, LocalCounterBackend};

#[cfg(feature = "redis")]
mod redis;
#[cfg(feature = "redis")]
pub use self::redis::{RedisConfig, SharedCounterBackend};
