//! Cron-style job scheduler using tokio-cron-scheduler.

use std::sync::Arc;

use tokio_cron_scheduler::{Job, JobScheduler, JobSchedulerError};

use quota_infra::QuotaGate;

/// Scheduler configuration.
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Enable scheduler.
    pub enabled: bool,
    /// Cron expression (with seconds) for the local counter sweep.
    pub sweep_schedule: String,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            sweep_schedule: "0 * * * * *".to_string(),
        }
    }
}

impl SchedulerConfig {
    pub fn from_env() -> Self {
        Self {
            enabled: std::env::var("SCHEDULER_ENABLED")
                .map(|v| v != "false" && v != "0")
                .unwrap_or(true),
            sweep_schedule: std::env::var("QUOTA_SWEEP_SCHEDULE")
                .unwrap_or_else(|_| "0 * * * * *".to_string()),
        }
    }
}

/// Cron job scheduler wrapper.
pub struct Scheduler {
    inner: JobScheduler,
    config: SchedulerConfig,
}

impl Scheduler {
    /// Create a new scheduler.
    pub async fn new(config: SchedulerConfig) -> Result<Self, JobSchedulerError> {
        let inner = JobScheduler::new().await?;
        Ok(Self { inner, config })
    }

    /// Add a cron job.
    pub async fn add_cron<F, Fut>(
        &self,
        schedule: &str,
        task: F,
    ) -> Result<uuid::Uuid, JobSchedulerError>
    where
        F: Fn() -> Fut + Send + Sync + Clone + 'static,
        Fut: std::future::Future<Output = ()> + Send + 'static,
    {
        let job = Job::new_async(schedule, move |_uuid, _lock| {
            let task = task.clone();
            Box::pin(async move {
                task().await;
            })
        })?;

        let id = self.inner.add(job).await?;
        tracing::info!(schedule = %schedule, job_id = %id, "Cron job registered");
        Ok(id)
    }

    /// Start the scheduler.
    pub async fn start(&self) -> Result<(), JobSchedulerError> {
        if !self.config.enabled {
            tracing::info!("Scheduler disabled");
            return Ok(());
        }

        self.inner.start().await?;
        tracing::info!("Scheduler started");
        Ok(())
    }

    /// Stop the scheduler.
    pub async fn shutdown(&mut self) -> Result<(), JobSchedulerError> {
        self.inner.shutdown().await?;
        tracing::info!("Scheduler stopped");
        Ok(())
    }
}

/// Start a scheduler that sweeps expired local counters on a timer.
///
/// Runs alongside the inline sweep; either one alone keeps memory bounded.
pub async fn start_local_sweeper(
    config: SchedulerConfig,
    gate: Arc<QuotaGate>,
) -> Result<Scheduler, JobSchedulerError> {
    let schedule = config.sweep_schedule.clone();
    let scheduler = Scheduler::new(config).await?;

    scheduler
        .add_cron(&schedule, move || {
            let gate = gate.clone();
            async move {
                let evicted = gate.local().sweep().await;
                tracing::debug!(evicted, "Scheduled local counter sweep");
            }
        })
        .await?;

    scheduler.start().await?;
    Ok(scheduler)
}
