//! Background jobs.

mod scheduler;

pub use scheduler::{SchedulerConfig, start_local_sweeper};
