use chrono::{NaiveDateTime, Utc};
use diesel::pg::PgConnection;
use diesel::prelude::*;
use uuid::Uuid;

use crate::{
    models::{CustomerFeedback, NewCustomerFeedback},
    schema::{customer_feedback, service_closures},
    status::{FeedbackStatus, SatisfactionLevel},
};

use super::{
    check_rating, check_transition, completion::completion_for_job, installation::get_job,
    invalid, require_text, stored, Actor, ServiceError, ServiceResult,
};

#[derive(Debug, Clone)]
pub struct SubmitFeedback {
    pub overall_rating: i32,
    pub service_quality_rating: Option<i32>,
    pub technician_rating: Option<i32>,
    pub timeliness_rating: Option<i32>,
    pub communication_rating: Option<i32>,
    pub comments: Option<String>,
    pub would_recommend: Option<bool>,
    pub satisfaction_level: Option<SatisfactionLevel>,
}

impl SubmitFeedback {
    fn validate(&self) -> ServiceResult<()> {
        check_rating("overall_rating", Some(self.overall_rating))?;
        check_rating("service_quality_rating", self.service_quality_rating)?;
        check_rating("technician_rating", self.technician_rating)?;
        check_rating("timeliness_rating", self.timeliness_rating)?;
        check_rating("communication_rating", self.communication_rating)
    }
}

/// Stores customer feedback for a completed job and flags the job's closure
/// (if one exists) as having received feedback.
pub fn submit_feedback(
    conn: &mut PgConnection,
    actor: Actor,
    job_id: Uuid,
    input: SubmitFeedback,
) -> ServiceResult<CustomerFeedback> {
    input.validate()?;

    conn.transaction::<_, ServiceError, _>(|conn| {
        let job = get_job(conn, actor.organization_id, job_id)?;
        let record = completion_for_job(conn, actor.organization_id, job.id)?
            .ok_or_else(|| invalid("Feedback requires a completion record for the job"))?;

        let feedback: CustomerFeedback = diesel::insert_into(customer_feedback::table)
            .values(&NewCustomerFeedback {
                id: Uuid::new_v4(),
                organization_id: actor.organization_id,
                installation_job_id: job.id,
                completion_record_id: Some(record.id),
                customer_id: job.customer_id,
                overall_rating: input.overall_rating,
                service_quality_rating: input.service_quality_rating,
                technician_rating: input.technician_rating,
                timeliness_rating: input.timeliness_rating,
                communication_rating: input.communication_rating,
                comments: input.comments,
                would_recommend: input.would_recommend,
                satisfaction_level: input.satisfaction_level.map(|level| level.to_string()),
                feedback_status: FeedbackStatus::Submitted.to_string(),
            })
            .get_result(conn)?;

        diesel::update(
            service_closures::table
                .filter(service_closures::organization_id.eq(actor.organization_id))
                .filter(service_closures::installation_job_id.eq(job.id)),
        )
        .set((
            service_closures::feedback_received.eq(true),
            service_closures::updated_at.eq(Utc::now().naive_utc()),
        ))
        .execute(conn)?;

        tracing::info!(
            job_id = %job.id,
            feedback_id = %feedback.id,
            overall_rating = feedback.overall_rating,
            "customer feedback submitted"
        );
        Ok(feedback)
    })
}

pub fn list_feedback(
    conn: &mut PgConnection,
    organization_id: Uuid,
    job_id: Uuid,
) -> ServiceResult<Vec<CustomerFeedback>> {
    let job = get_job(conn, organization_id, job_id)?;
    let rows = customer_feedback::table
        .filter(customer_feedback::organization_id.eq(organization_id))
        .filter(customer_feedback::installation_job_id.eq(job.id))
        .order(customer_feedback::created_at.desc())
        .load(conn)?;
    Ok(rows)
}

pub(crate) fn has_feedback(
    conn: &mut PgConnection,
    organization_id: Uuid,
    job_id: Uuid,
) -> ServiceResult<bool> {
    let count: i64 = customer_feedback::table
        .filter(customer_feedback::organization_id.eq(organization_id))
        .filter(customer_feedback::installation_job_id.eq(job_id))
        .count()
        .get_result(conn)?;
    Ok(count > 0)
}

fn lock_feedback(
    conn: &mut PgConnection,
    organization_id: Uuid,
    feedback_id: Uuid,
) -> ServiceResult<CustomerFeedback> {
    customer_feedback::table
        .filter(customer_feedback::organization_id.eq(organization_id))
        .filter(customer_feedback::id.eq(feedback_id))
        .for_update()
        .first(conn)
        .optional()?
        .ok_or(ServiceError::NotFound("Customer feedback"))
}

fn advance(
    conn: &mut PgConnection,
    actor: Actor,
    feedback_id: Uuid,
    next: FeedbackStatus,
    response_text: Option<String>,
    now: NaiveDateTime,
) -> ServiceResult<CustomerFeedback> {
    conn.transaction::<_, ServiceError, _>(|conn| {
        let feedback = lock_feedback(conn, actor.organization_id, feedback_id)?;
        let current: FeedbackStatus = stored(&feedback.feedback_status)?;
        if !check_transition(current, next)? {
            return Ok(feedback);
        }

        let (reviewed_by_id, reviewed_at) = match next {
            FeedbackStatus::Reviewed => (Some(actor.user_id), Some(now)),
            _ => (feedback.reviewed_by_id, feedback.reviewed_at),
        };
        let (responded_by_id, responded_at, response_text) = match next {
            FeedbackStatus::Responded => (Some(actor.user_id), Some(now), response_text),
            _ => (
                feedback.responded_by_id,
                feedback.responded_at,
                feedback.response_text.clone(),
            ),
        };

        let updated = diesel::update(customer_feedback::table.find(feedback.id))
            .set((
                customer_feedback::feedback_status.eq(next.as_str()),
                customer_feedback::reviewed_by_id.eq(reviewed_by_id),
                customer_feedback::reviewed_at.eq(reviewed_at),
                customer_feedback::responded_by_id.eq(responded_by_id),
                customer_feedback::responded_at.eq(responded_at),
                customer_feedback::response_text.eq(response_text),
                customer_feedback::updated_at.eq(Utc::now().naive_utc()),
            ))
            .get_result(conn)?;
        tracing::info!(feedback_id = %feedback.id, from = %current, to = %next, "feedback status updated");
        Ok(updated)
    })
}

pub fn review_feedback(
    conn: &mut PgConnection,
    actor: Actor,
    feedback_id: Uuid,
    now: NaiveDateTime,
) -> ServiceResult<CustomerFeedback> {
    advance(conn, actor, feedback_id, FeedbackStatus::Reviewed, None, now)
}

pub fn respond_to_feedback(
    conn: &mut PgConnection,
    actor: Actor,
    feedback_id: Uuid,
    response_text: &str,
    now: NaiveDateTime,
) -> ServiceResult<CustomerFeedback> {
    let text = require_text("response_text", response_text)?;
    advance(
        conn,
        actor,
        feedback_id,
        FeedbackStatus::Responded,
        Some(text),
        now,
    )
}

pub fn close_feedback(
    conn: &mut PgConnection,
    actor: Actor,
    feedback_id: Uuid,
    now: NaiveDateTime,
) -> ServiceResult<CustomerFeedback> {
    advance(conn, actor, feedback_id, FeedbackStatus::Closed, None, now)
}
