use std::{collections::HashMap, sync::Arc, time::Duration};

use async_trait::async_trait;
use tokio::time::sleep;
use tracing::{error, info, warn};

use crate::{
    jobs::{requeue_stale_jobs, reserve_job, settle_job, JobQueueError, Settlement},
    models::Job,
    state::AppState,
};

pub mod escalation;
pub mod notifications;

/// Jobs still `processing` after this long belong to a worker that went away.
const STALE_AFTER: Duration = Duration::from_secs(15 * 60);

#[derive(Debug)]
pub enum JobExecution {
    Success,
    Retry { delay: Duration, error: String },
    Failed { error: String },
}

#[async_trait]
pub trait JobHandler: Send + Sync {
    fn job_type(&self) -> &'static str;
    async fn handle(&self, state: Arc<AppState>, job: Job) -> JobExecution;
}

pub struct Worker {
    state: Arc<AppState>,
    handlers: HashMap<&'static str, Arc<dyn JobHandler>>,
    poll_interval: Duration,
}

impl Worker {
    pub fn new(
        state: Arc<AppState>,
        handlers: Vec<Arc<dyn JobHandler>>,
        poll_interval: Duration,
    ) -> Self {
        let map = handlers
            .into_iter()
            .map(|handler| (handler.job_type(), handler))
            .collect();
        Self {
            state,
            handlers: map,
            poll_interval,
        }
    }

    pub async fn run(&self) {
        info!(job_types = ?self.handlers.keys().collect::<Vec<_>>(), "worker started");
        self.requeue_stale();
        loop {
            match self.tick().await {
                Ok(true) => {}
                Ok(false) => sleep(self.poll_interval).await,
                Err(err) => {
                    error!(error = %err, "worker tick failed");
                    sleep(self.poll_interval).await;
                }
            }
        }
    }

    /// Processes at most one job. Returns `Ok(true)` when a job was handled.
    pub async fn tick(&self) -> Result<bool, JobQueueError> {
        let job_types: Vec<&str> = self.handlers.keys().copied().collect();
        if job_types.is_empty() {
            return Ok(false);
        }

        let reserved = match self.state.db() {
            Ok(mut conn) => reserve_job(&mut conn, &job_types)?,
            Err(err) => {
                error!(?err, "worker could not reserve a job");
                return Ok(false);
            }
        };
        let Some(job) = reserved else {
            return Ok(false);
        };

        let outcome = match self.handlers.get(job.job_type.as_str()) {
            Some(handler) => handler.handle(self.state.clone(), job.clone()).await,
            None => JobExecution::Failed {
                error: format!("no handler registered for job type {}", job.job_type),
            },
        };
        self.settle(&job, outcome)?;
        Ok(true)
    }

    fn requeue_stale(&self) {
        let requeued = self
            .state
            .db()
            .map_err(|err| format!("{err:?}"))
            .and_then(|mut conn| {
                requeue_stale_jobs(&mut conn, STALE_AFTER).map_err(|err| err.to_string())
            });
        match requeued {
            Ok(0) => {}
            Ok(count) => warn!(count, "requeued jobs abandoned in processing"),
            Err(err) => error!(error = %err, "could not requeue stale jobs"),
        }
    }

    fn settle(&self, job: &Job, outcome: JobExecution) -> Result<(), JobQueueError> {
        let mut conn = match self.state.db() {
            Ok(conn) => conn,
            Err(err) => {
                error!(job_id = %job.id, ?err, "job outcome lost to pool error; it stays processing");
                return Ok(());
            }
        };
        let settlement = match &outcome {
            JobExecution::Success => {
                info!(job_id = %job.id, job_type = %job.job_type, attempts = job.attempts, "job succeeded");
                Settlement::Succeeded
            }
            JobExecution::Retry { delay, error } => {
                warn!(
                    job_id = %job.id,
                    job_type = %job.job_type,
                    retry_in_secs = delay.as_secs(),
                    %error,
                    "job will retry"
                );
                Settlement::RetryAfter {
                    delay: *delay,
                    error,
                }
            }
            JobExecution::Failed { error } => {
                error!(job_id = %job.id, job_type = %job.job_type, %error, "job failed");
                Settlement::Failed { error }
            }
        };
        settle_job(&mut conn, job.id, settlement)?;
        Ok(())
    }
}

pub fn default_handlers() -> Vec<Arc<dyn JobHandler>> {
    vec![Arc::new(notifications::SendNotificationJob::new())]
}
