//! Closure gate for installation jobs.
//!
//! A closure moves `pending -> approved -> closed` (or straight to `closed`
//! when no manager approval is required) and can be reopened, which puts it
//! back to `pending` with the approval cleared.

use chrono::{NaiveDateTime, Utc};
use diesel::pg::PgConnection;
use diesel::prelude::*;
use diesel::result::{DatabaseErrorKind, Error as DieselError};
use uuid::Uuid;

use crate::{
    models::{NewServiceClosure, ServiceClosure},
    schema::service_closures,
    status::{ClosureStatus, StateMachine},
};

use super::{
    completion::completion_for_job,
    feedback::has_feedback,
    installation::{get_job, lock_job},
    invalid,
    organizations::get_organization,
    require_text, stored, Actor, ServiceError, ServiceResult,
};

#[derive(Debug, Clone, Default)]
pub struct CreateClosure {
    pub requires_manager_approval: Option<bool>,
    pub closure_notes: Option<String>,
}

pub fn check_approve(closure: &ServiceClosure) -> ServiceResult<()> {
    let status: ClosureStatus = stored(&closure.closure_status)?;
    if !closure.requires_manager_approval {
        return Err(invalid("This closure does not require manager approval"));
    }
    if status != ClosureStatus::Pending {
        return Err(invalid(format!(
            "Only pending closures can be approved, not {status}"
        )));
    }
    Ok(())
}

/// `feedback_required` is the organization's feedback-before-closure setting.
pub fn check_close(closure: &ServiceClosure, feedback_required: bool) -> ServiceResult<()> {
    let status: ClosureStatus = stored(&closure.closure_status)?;
    match status {
        ClosureStatus::Approved => {}
        ClosureStatus::Pending if !closure.requires_manager_approval => {}
        ClosureStatus::Pending => {
            return Err(invalid("Manager approval is required before closure"));
        }
        other => {
            return Err(ServiceError::InvalidTransition {
                entity: ClosureStatus::ENTITY,
                from: other.to_string(),
                to: ClosureStatus::Closed.to_string(),
            })
        }
    }
    if closure.requires_manager_approval && closure.approved_at.is_none() {
        return Err(invalid("Manager approval is required before closure"));
    }
    if feedback_required && !closure.feedback_received {
        return Err(invalid("Customer feedback is required before closure"));
    }
    Ok(())
}

pub fn check_reopen(closure: &ServiceClosure, reason: &str) -> ServiceResult<String> {
    let status: ClosureStatus = stored(&closure.closure_status)?;
    if status != ClosureStatus::Closed {
        return Err(invalid(format!(
            "Only closed services can be reopened, not {status}"
        )));
    }
    require_text("reopen_reason", reason)
}

fn closure_exists() -> ServiceError {
    ServiceError::Conflict("Service closure already exists for this installation job".to_string())
}

pub fn create_closure(
    conn: &mut PgConnection,
    actor: Actor,
    job_id: Uuid,
    input: CreateClosure,
) -> ServiceResult<ServiceClosure> {
    conn.transaction::<_, ServiceError, _>(|conn| {
        let job = lock_job(conn, actor.organization_id, job_id)?;
        if completion_for_job(conn, actor.organization_id, job.id)?.is_none() {
            return Err(invalid(
                "Installation job must have a completion record before closure",
            ));
        }
        let existing: Option<Uuid> = service_closures::table
            .filter(service_closures::installation_job_id.eq(job.id))
            .select(service_closures::id)
            .first(conn)
            .optional()?;
        if existing.is_some() {
            return Err(closure_exists());
        }

        let org = get_organization(conn, actor.organization_id)?;
        let feedback_received = has_feedback(conn, actor.organization_id, job.id)?;
        let closure: ServiceClosure = diesel::insert_into(service_closures::table)
            .values(&NewServiceClosure {
                id: Uuid::new_v4(),
                organization_id: actor.organization_id,
                installation_job_id: job.id,
                closure_status: ClosureStatus::Pending.to_string(),
                requires_manager_approval: input
                    .requires_manager_approval
                    .unwrap_or(org.require_manager_approval),
                feedback_received,
                closure_notes: input.closure_notes,
            })
            .get_result(conn)
            .map_err(|err| match err {
                DieselError::DatabaseError(DatabaseErrorKind::UniqueViolation, _) => closure_exists(),
                other => ServiceError::Database(other),
            })?;

        tracing::info!(
            job_id = %job.id,
            closure_id = %closure.id,
            requires_manager_approval = closure.requires_manager_approval,
            "service closure created"
        );
        Ok(closure)
    })
}

pub fn get_closure(
    conn: &mut PgConnection,
    organization_id: Uuid,
    job_id: Uuid,
) -> ServiceResult<ServiceClosure> {
    let job = get_job(conn, organization_id, job_id)?;
    service_closures::table
        .filter(service_closures::organization_id.eq(organization_id))
        .filter(service_closures::installation_job_id.eq(job.id))
        .first(conn)
        .optional()?
        .ok_or(ServiceError::NotFound("Service closure"))
}

fn lock_closure(
    conn: &mut PgConnection,
    organization_id: Uuid,
    job_id: Uuid,
) -> ServiceResult<ServiceClosure> {
    let job = get_job(conn, organization_id, job_id)?;
    service_closures::table
        .filter(service_closures::organization_id.eq(organization_id))
        .filter(service_closures::installation_job_id.eq(job.id))
        .for_update()
        .first(conn)
        .optional()?
        .ok_or(ServiceError::NotFound("Service closure"))
}

pub fn approve_closure(
    conn: &mut PgConnection,
    actor: Actor,
    job_id: Uuid,
    now: NaiveDateTime,
) -> ServiceResult<ServiceClosure> {
    conn.transaction::<_, ServiceError, _>(|conn| {
        let closure = lock_closure(conn, actor.organization_id, job_id)?;
        check_approve(&closure)?;

        let updated = diesel::update(service_closures::table.find(closure.id))
            .set((
                service_closures::closure_status.eq(ClosureStatus::Approved.as_str()),
                service_closures::approved_by_id.eq(Some(actor.user_id)),
                service_closures::approved_at.eq(Some(now)),
                service_closures::updated_at.eq(Utc::now().naive_utc()),
            ))
            .get_result(conn)?;
        tracing::info!(closure_id = %closure.id, approved_by = %actor.user_id, "service closure approved");
        Ok(updated)
    })
}

pub fn close_service(
    conn: &mut PgConnection,
    actor: Actor,
    job_id: Uuid,
    closure_notes: Option<String>,
    now: NaiveDateTime,
) -> ServiceResult<ServiceClosure> {
    conn.transaction::<_, ServiceError, _>(|conn| {
        let closure = lock_closure(conn, actor.organization_id, job_id)?;
        let org = get_organization(conn, actor.organization_id)?;
        check_close(&closure, org.require_feedback_before_closure)?;

        let notes = closure_notes.or_else(|| closure.closure_notes.clone());
        let updated = diesel::update(service_closures::table.find(closure.id))
            .set((
                service_closures::closure_status.eq(ClosureStatus::Closed.as_str()),
                service_closures::closed_by_id.eq(Some(actor.user_id)),
                service_closures::closed_at.eq(Some(now)),
                service_closures::closure_notes.eq(notes),
                service_closures::updated_at.eq(Utc::now().naive_utc()),
            ))
            .get_result(conn)?;
        tracing::info!(closure_id = %closure.id, closed_by = %actor.user_id, "service closed");
        Ok(updated)
    })
}

/// Reopens a closed service. The closure returns to `pending` with approval
/// and closure stamps cleared, so the full gate applies again.
pub fn reopen_service(
    conn: &mut PgConnection,
    actor: Actor,
    job_id: Uuid,
    reason: &str,
    now: NaiveDateTime,
) -> ServiceResult<ServiceClosure> {
    conn.transaction::<_, ServiceError, _>(|conn| {
        let closure = lock_closure(conn, actor.organization_id, job_id)?;
        let reason = check_reopen(&closure, reason)?;

        let updated = diesel::update(service_closures::table.find(closure.id))
            .set((
                service_closures::closure_status.eq(ClosureStatus::Pending.as_str()),
                service_closures::reopened_count.eq(closure.reopened_count + 1),
                service_closures::last_reopened_at.eq(Some(now)),
                service_closures::last_reopened_by_id.eq(Some(actor.user_id)),
                service_closures::last_reopen_reason.eq(Some(reason)),
                service_closures::approved_by_id.eq(None::<Uuid>),
                service_closures::approved_at.eq(None::<NaiveDateTime>),
                service_closures::closed_by_id.eq(None::<Uuid>),
                service_closures::closed_at.eq(None::<NaiveDateTime>),
                service_closures::updated_at.eq(Utc::now().naive_utc()),
            ))
            .get_result(conn)?;
        tracing::info!(
            closure_id = %closure.id,
            reopened_count = closure.reopened_count + 1,
            "service reopened"
        );
        Ok(updated)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn closure(status: ClosureStatus, requires_approval: bool) -> ServiceClosure {
        let now = Utc::now().naive_utc();
        ServiceClosure {
            id: Uuid::new_v4(),
            organization_id: Uuid::new_v4(),
            installation_job_id: Uuid::new_v4(),
            closure_status: status.to_string(),
            requires_manager_approval: requires_approval,
            feedback_received: false,
            approved_by_id: None,
            approved_at: None,
            closed_by_id: None,
            closed_at: None,
            closure_notes: None,
            reopened_count: 0,
            last_reopened_at: None,
            last_reopened_by_id: None,
            last_reopen_reason: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn approval_only_when_required_and_pending() {
        assert!(check_approve(&closure(ClosureStatus::Pending, true)).is_ok());
        assert!(check_approve(&closure(ClosureStatus::Pending, false)).is_err());
        assert!(check_approve(&closure(ClosureStatus::Approved, true)).is_err());
    }

    #[test]
    fn close_blocked_until_approved() {
        let pending = closure(ClosureStatus::Pending, true);
        let err = check_close(&pending, false).unwrap_err();
        assert_eq!(err.to_string(), "Manager approval is required before closure");

        let mut approved = closure(ClosureStatus::Approved, true);
        approved.approved_at = Some(Utc::now().naive_utc());
        assert!(check_close(&approved, false).is_ok());
    }

    #[test]
    fn approved_status_without_stamp_still_blocks() {
        let approved = closure(ClosureStatus::Approved, true);
        assert!(check_close(&approved, false).is_err());
    }

    #[test]
    fn pending_closes_directly_without_approval_requirement() {
        assert!(check_close(&closure(ClosureStatus::Pending, false), false).is_ok());
    }

    #[test]
    fn feedback_gate_applies_when_organization_requires_it() {
        let mut pending = closure(ClosureStatus::Pending, false);
        let err = check_close(&pending, true).unwrap_err();
        assert_eq!(err.to_string(), "Customer feedback is required before closure");
        pending.feedback_received = true;
        assert!(check_close(&pending, true).is_ok());
    }

    #[test]
    fn closed_cannot_close_again() {
        assert!(matches!(
            check_close(&closure(ClosureStatus::Closed, false), false),
            Err(ServiceError::InvalidTransition { .. })
        ));
    }

    #[test]
    fn reopen_needs_closed_status_and_reason() {
        let closed = closure(ClosureStatus::Closed, false);
        assert_eq!(check_reopen(&closed, " faulty valve ").unwrap(), "faulty valve");
        assert!(check_reopen(&closed, "   ").is_err());
        assert!(check_reopen(&closure(ClosureStatus::Pending, false), "x").is_err());
    }
}
