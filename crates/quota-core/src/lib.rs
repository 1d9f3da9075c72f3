//! # Quota Core
//!
//! The domain layer of the quota service.
//! This crate contains the fixed-window quota model and the ports that
//! counter stores must implement. It performs no I/O.

pub mod clock;
pub mod domain;
pub mod error;
pub mod ports;

pub use clock::{Clock, ManualClock, SystemClock};
pub use domain::{CounterRecord, Decision, Policy};
pub use error::{BackendError, PolicyError};
