use std::sync::Arc;

use async_trait::async_trait;
use tokio::task;
use tracing::{error, info, warn};

use crate::{
    jobs::{backoff_delay, JOB_SEND_NOTIFICATION},
    models::Job,
    services::{
        completion::mark_feedback_request_sent,
        notifications::{record_delivery, NotificationPayload, EVENT_FEEDBACK_REQUEST},
    },
    state::AppState,
    utils::time::now,
};

use super::{JobExecution, JobHandler};

/// Delivers queued notifications through the configured [`crate::notify::Notifier`]
/// and records every final outcome in `notification_logs`.
pub struct SendNotificationJob;

impl SendNotificationJob {
    pub fn new() -> Self {
        Self
    }
}

impl Default for SendNotificationJob {
    fn default() -> Self {
        Self::new()
    }
}

fn record_outcome(
    state: &AppState,
    payload: &NotificationPayload,
    job_id: uuid::Uuid,
    error: Option<String>,
) -> Result<(), String> {
    let mut conn = state.db().map_err(|err| format!("{err:?}"))?;
    let delivered = error.is_none();
    record_delivery(&mut conn, payload, Some(job_id), error).map_err(|err| err.to_string())?;

    if delivered && payload.event_type == EVENT_FEEDBACK_REQUEST {
        if let Some(record_id) = payload.completion_record_id {
            mark_feedback_request_sent(&mut conn, record_id, now())
                .map_err(|err| err.to_string())?;
        }
    }
    Ok(())
}

#[async_trait]
impl JobHandler for SendNotificationJob {
    fn job_type(&self) -> &'static str {
        JOB_SEND_NOTIFICATION
    }

    async fn handle(&self, state: Arc<AppState>, job: Job) -> JobExecution {
        let payload: NotificationPayload = match serde_json::from_value(job.payload.clone()) {
            Ok(p) => p,
            Err(err) => {
                return JobExecution::Failed {
                    error: format!("invalid notification payload: {err}"),
                }
            }
        };

        let outcome = state
            .notifier
            .send(&payload.event_type, &payload.recipient, &payload.data)
            .await;

        let error = match outcome {
            Ok(()) => None,
            Err(err) => {
                let message = format!("{err:#}");
                if job.attempts < state.config.notification_max_attempts {
                    warn!(
                        job_id = %job.id,
                        event_type = %payload.event_type,
                        attempts = job.attempts,
                        error = %message,
                        "notification delivery failed, will retry"
                    );
                    return JobExecution::Retry {
                        delay: backoff_delay(job.attempts),
                        error: message,
                    };
                }
                Some(message)
            }
        };

        let failed = error.clone();
        let job_id = job.id;
        let state_clone = state.clone();
        let payload_clone = payload.clone();
        match task::spawn_blocking(move || {
            record_outcome(&state_clone, &payload_clone, job_id, error)
        })
        .await
        {
            Ok(Ok(())) => {}
            Ok(Err(err)) => {
                error!(job_id = %job.id, error = %err, "failed to record notification outcome");
            }
            Err(join_err) => {
                error!(job_id = %job.id, error = %join_err, "notification bookkeeping panicked");
            }
        }

        match failed {
            None => {
                info!(
                    job_id = %job.id,
                    event_type = %payload.event_type,
                    organization_id = %payload.organization_id,
                    "notification delivered"
                );
                JobExecution::Success
            }
            Some(error) => JobExecution::Failed { error },
        }
    }
}
