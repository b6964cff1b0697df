use chrono::{NaiveDateTime, Utc};
use diesel::pg::PgConnection;
use diesel::prelude::*;
use serde_json::json;
use uuid::Uuid;

use crate::{
    models::{CompletionRecord, Customer, InstallationJob, NewCompletionRecord},
    schema::{completion_records, customers},
    status::JobStatus,
};

use super::{
    installation::{get_job, lock_job, transition_job},
    invalid, notifications, require_text, stored, Actor, ServiceError, ServiceResult,
};

#[derive(Debug, Clone)]
pub struct RecordCompletion {
    pub completed_by_id: Uuid,
    pub completed_at: Option<NaiveDateTime>,
    pub actual_duration_hours: Option<f64>,
    pub work_performed: String,
    pub issues_encountered: Option<String>,
    pub quality_check_passed: bool,
    pub customer_present: bool,
    pub customer_signature_received: bool,
    pub follow_up_required: bool,
    pub follow_up_date: Option<NaiveDateTime>,
    pub follow_up_notes: Option<String>,
}

/// Checks that a completion may be recorded against `job` by `completed_by`.
pub fn check_completable(job: &InstallationJob, completed_by: Uuid) -> ServiceResult<JobStatus> {
    let status: JobStatus = stored(&job.status)?;
    if !matches!(status, JobStatus::InProgress | JobStatus::Completed) {
        return Err(invalid(format!(
            "Installation job must be in_progress or completed to record completion, not {status}"
        )));
    }
    if job.assigned_technician_id != Some(completed_by) {
        return Err(invalid(
            "Completion can only be recorded by the assigned technician",
        ));
    }
    Ok(status)
}

fn feedback_recipient(customer: &Customer) -> String {
    customer
        .email
        .clone()
        .unwrap_or_else(|| format!("customer:{}", customer.id))
}

/// Records the completion, completes an in-progress job and queues the
/// customer feedback request, all in one transaction.
pub fn record_completion(
    conn: &mut PgConnection,
    actor: Actor,
    job_id: Uuid,
    input: RecordCompletion,
    now: NaiveDateTime,
) -> ServiceResult<CompletionRecord> {
    let work_performed = require_text("work_performed", &input.work_performed)?;
    if let Some(hours) = input.actual_duration_hours {
        if !hours.is_finite() || hours < 0.0 {
            return Err(invalid("actual_duration_hours must not be negative"));
        }
    }

    conn.transaction::<_, ServiceError, _>(|conn| {
        let job = lock_job(conn, actor.organization_id, job_id)?;
        let status = check_completable(&job, input.completed_by_id)?;

        let existing: Option<Uuid> = completion_records::table
            .filter(completion_records::installation_job_id.eq(job.id))
            .select(completion_records::id)
            .first(conn)
            .optional()?;
        if existing.is_some() {
            return Err(invalid(
                "Completion record already exists for this installation job",
            ));
        }

        let completed_at = input.completed_at.unwrap_or(now);
        let record: CompletionRecord = diesel::insert_into(completion_records::table)
            .values(&NewCompletionRecord {
                id: Uuid::new_v4(),
                organization_id: actor.organization_id,
                installation_job_id: job.id,
                completed_by_id: input.completed_by_id,
                completed_at,
                actual_duration_hours: input.actual_duration_hours,
                work_performed,
                issues_encountered: input.issues_encountered,
                quality_check_passed: input.quality_check_passed,
                customer_present: input.customer_present,
                customer_signature_received: input.customer_signature_received,
                follow_up_required: input.follow_up_required,
                follow_up_date: input.follow_up_date,
                follow_up_notes: input.follow_up_notes,
            })
            .get_result(conn)?;

        let job = if status == JobStatus::InProgress {
            transition_job(conn, actor, job, JobStatus::Completed, completed_at)?
        } else {
            job
        };

        let customer: Customer = customers::table
            .filter(customers::organization_id.eq(actor.organization_id))
            .filter(customers::id.eq(job.customer_id))
            .first(conn)
            .optional()?
            .ok_or_else(|| ServiceError::Integrity(format!("customer missing for job {}", job.id)))?;

        notifications::publish(
            conn,
            &notifications::NotificationPayload {
                organization_id: actor.organization_id,
                event_type: notifications::EVENT_FEEDBACK_REQUEST.to_string(),
                recipient: feedback_recipient(&customer),
                data: json!({
                    "job_number": job.job_number,
                    "installation_job_id": job.id,
                    "customer_name": customer.name,
                    "completed_at": completed_at,
                }),
                completion_record_id: Some(record.id),
            },
            None,
        )?;

        tracing::info!(
            job_id = %job.id,
            completion_record_id = %record.id,
            completed_by = %record.completed_by_id,
            "installation completion recorded"
        );
        Ok(record)
    })
}

pub fn get_completion(
    conn: &mut PgConnection,
    organization_id: Uuid,
    job_id: Uuid,
) -> ServiceResult<CompletionRecord> {
    let job = get_job(conn, organization_id, job_id)?;
    completion_for_job(conn, organization_id, job.id)?
        .ok_or(ServiceError::NotFound("Completion record"))
}

pub(crate) fn completion_for_job(
    conn: &mut PgConnection,
    organization_id: Uuid,
    job_id: Uuid,
) -> ServiceResult<Option<CompletionRecord>> {
    let record = completion_records::table
        .filter(completion_records::organization_id.eq(organization_id))
        .filter(completion_records::installation_job_id.eq(job_id))
        .first(conn)
        .optional()?;
    Ok(record)
}

/// Called by the notification worker once the feedback request went out.
pub fn mark_feedback_request_sent(
    conn: &mut PgConnection,
    record_id: Uuid,
    sent_at: NaiveDateTime,
) -> ServiceResult<()> {
    diesel::update(
        completion_records::table
            .filter(completion_records::id.eq(record_id))
            .filter(completion_records::feedback_request_sent.eq(false)),
    )
    .set((
        completion_records::feedback_request_sent.eq(true),
        completion_records::feedback_request_sent_at.eq(Some(sent_at)),
        completion_records::updated_at.eq(Utc::now().naive_utc()),
    ))
    .execute(conn)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn job(status: JobStatus, technician: Option<Uuid>) -> InstallationJob {
        let now = Utc::now().naive_utc();
        InstallationJob {
            id: Uuid::new_v4(),
            organization_id: Uuid::new_v4(),
            job_number: "IJ/2425/00001".into(),
            dispatch_order_id: Uuid::new_v4(),
            customer_id: Uuid::new_v4(),
            ticket_id: None,
            status: status.to_string(),
            priority: "medium".into(),
            scheduled_date: None,
            estimated_duration_hours: None,
            actual_start_time: None,
            actual_end_time: None,
            installation_address: "12 Harbour Road".into(),
            contact_person: None,
            contact_number: None,
            installation_notes: None,
            completion_notes: None,
            assigned_technician_id: technician,
            created_by_id: None,
            updated_by_id: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn scheduled_jobs_cannot_be_completed() {
        let tech = Uuid::new_v4();
        let err = check_completable(&job(JobStatus::Scheduled, Some(tech)), tech).unwrap_err();
        assert!(err.to_string().contains("in_progress or completed"));
    }

    #[test]
    fn only_the_assigned_technician_may_complete() {
        let tech = Uuid::new_v4();
        assert!(check_completable(&job(JobStatus::InProgress, Some(tech)), Uuid::new_v4()).is_err());
        assert!(check_completable(&job(JobStatus::InProgress, None), tech).is_err());
        assert_eq!(
            check_completable(&job(JobStatus::InProgress, Some(tech)), tech).unwrap(),
            JobStatus::InProgress
        );
        assert_eq!(
            check_completable(&job(JobStatus::Completed, Some(tech)), tech).unwrap(),
            JobStatus::Completed
        );
    }

    #[test]
    fn recipient_falls_back_to_customer_reference() {
        let now = Utc::now().naive_utc();
        let mut customer = Customer {
            id: Uuid::nil(),
            organization_id: Uuid::nil(),
            name: "Acme".into(),
            email: Some("ops@acme.test".into()),
            phone: None,
            tier: None,
            created_at: now,
            updated_at: now,
        };
        assert_eq!(feedback_recipient(&customer), "ops@acme.test");
        customer.email = None;
        assert_eq!(
            feedback_recipient(&customer),
            "customer:00000000-0000-0000-0000-000000000000"
        );
    }
}
