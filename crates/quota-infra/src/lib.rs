//! # Quota Infrastructure
//!
//! Concrete implementations of the counter ports defined in `quota-core`,
//! and the [`QuotaGate`] that picks between them on every call.
//!
//! ## Feature Flags
//!
//! - `full` (default) - All features enabled
//! - `minimal` - No external dependencies, local counters only
//! - `redis` - Redis-backed shared counters

pub mod gate;
pub mod rate_limit;

pub use gate::{QuotaGate, SharedStatus};
pub use rate_limit::{LocalBackendConfig, LocalCounterBackend};

#[cfg(feature = "redis")]
pub use rate_limit::{RedisConfig, SharedCounterBackend};
