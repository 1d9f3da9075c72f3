//! Ports - trait definitions for counter stores.
//! These are the "interfaces" that infrastructure must implement.

mod counter;

pub use counter::CounterBackend;
