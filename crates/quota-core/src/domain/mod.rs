//! Domain entities - policies, counter records and decisions.

mod decision;
mod policy;
mod record;

pub use decision::Decision;
pub use policy::{DEFAULT_MAX_ATTEMPTS, DEFAULT_WINDOW, Policy};
pub use record::CounterRecord;
