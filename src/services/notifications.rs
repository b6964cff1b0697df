use chrono::NaiveDateTime;
use diesel::pg::PgConnection;
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::{
    jobs::{enqueue_job, JOB_SEND_NOTIFICATION},
    models::{Job, NewNotificationLog, NotificationLog},
    schema::notification_logs,
};

use super::{Page, ServiceResult};

pub const EVENT_FEEDBACK_REQUEST: &str = "feedback_request";
pub const EVENT_SLA_ESCALATED: &str = "sla_escalated";

pub const LOG_STATUS_SENT: &str = "sent";
pub const LOG_STATUS_FAILED: &str = "failed";

/// Outbox payload stored on a `send-notification` job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationPayload {
    pub organization_id: Uuid,
    pub event_type: String,
    pub recipient: String,
    #[serde(default)]
    pub data: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completion_record_id: Option<Uuid>,
}

/// Queues a notification inside the caller's transaction. Nothing is sent
/// until the worker picks the job up after commit.
pub fn publish(
    conn: &mut PgConnection,
    payload: &NotificationPayload,
    run_after: Option<NaiveDateTime>,
) -> ServiceResult<Job> {
    let value = serde_json::to_value(payload)?;
    let job = enqueue_job(conn, JOB_SEND_NOTIFICATION, value, run_after)?;
    tracing::debug!(
        job_id = %job.id,
        event_type = %payload.event_type,
        organization_id = %payload.organization_id,
        "notification queued"
    );
    Ok(job)
}

pub fn record_delivery(
    conn: &mut PgConnection,
    payload: &NotificationPayload,
    job_id: Option<Uuid>,
    error: Option<String>,
) -> ServiceResult<NotificationLog> {
    let status = if error.is_some() {
        LOG_STATUS_FAILED
    } else {
        LOG_STATUS_SENT
    };
    let row = NewNotificationLog {
        id: Uuid::new_v4(),
        organization_id: payload.organization_id,
        event_type: payload.event_type.clone(),
        recipient: payload.recipient.clone(),
        payload: payload.data.clone(),
        status: status.to_string(),
        error,
        job_id,
    };

    let log = diesel::insert_into(notification_logs::table)
        .values(&row)
        .get_result(conn)?;
    Ok(log)
}

/// Delivery attempts for one organization, newest first, optionally narrowed
/// to one event type.
pub fn list_logs(
    conn: &mut PgConnection,
    organization_id: Uuid,
    event_type: Option<&str>,
    page: Page,
) -> ServiceResult<Vec<NotificationLog>> {
    let mut query = notification_logs::table
        .filter(notification_logs::organization_id.eq(organization_id))
        .into_boxed();
    if let Some(event_type) = event_type {
        query = query.filter(notification_logs::event_type.eq(event_type.to_string()));
    }
    let rows = query
        .order((notification_logs::created_at.desc(), notification_logs::id.desc()))
        .offset(page.skip)
        .limit(page.limit)
        .load(conn)?;
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn payload_omits_missing_completion_record() {
        let payload = NotificationPayload {
            organization_id: Uuid::nil(),
            event_type: EVENT_SLA_ESCALATED.to_string(),
            recipient: "ops@example.com".to_string(),
            data: json!({ "ticket_number": "TKT/2425/00001" }),
            completion_record_id: None,
        };
        let value = serde_json::to_value(&payload).unwrap();
        assert!(value.get("completion_record_id").is_none());
        let parsed: NotificationPayload = serde_json::from_value(value).unwrap();
        assert_eq!(parsed, payload);
    }

    #[test]
    fn payload_tolerates_missing_data() {
        let parsed: NotificationPayload = serde_json::from_value(json!({
            "organization_id": Uuid::nil(),
            "event_type": "feedback_request",
            "recipient": "customer@example.com"
        }))
        .unwrap();
        assert_eq!(parsed.data, Value::Null);
        assert_eq!(parsed.completion_record_id, None);
    }
}
