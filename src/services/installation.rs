use chrono::{NaiveDateTime, Utc};
use diesel::pg::PgConnection;
use diesel::prelude::*;
use uuid::Uuid;

use crate::{
    models::{
        DispatchOrder, InstallationJob, InstallationTask, NewInstallationJob, NewInstallationTask,
    },
    numbering::{self, INSTALLATION_JOB_PREFIX},
    schema::{customers, dispatch_orders, installation_jobs, installation_tasks, tickets},
    status::{JobStatus, Priority, TaskStatus},
};

use super::{
    check_transition, invalid, require_text, stored, tickets::ensure_org_user, Actor, Page,
    ServiceError, ServiceResult,
};

const TECHNICIAN_NOT_FOUND: &str = "Technician not found in organization";

#[derive(Debug, Clone)]
pub struct CreateInstallationJob {
    pub dispatch_order_id: Uuid,
    pub customer_id: Uuid,
    pub ticket_id: Option<Uuid>,
    pub priority: Option<Priority>,
    pub scheduled_date: Option<NaiveDateTime>,
    pub estimated_duration_hours: Option<f64>,
    pub installation_address: String,
    pub contact_person: Option<String>,
    pub contact_number: Option<String>,
    pub installation_notes: Option<String>,
    pub assigned_technician_id: Option<Uuid>,
}

#[derive(Debug, Clone, Default)]
pub struct UpdateInstallationJob {
    pub status: Option<JobStatus>,
    pub priority: Option<Priority>,
    pub scheduled_date: Option<Option<NaiveDateTime>>,
    pub estimated_duration_hours: Option<Option<f64>>,
    pub installation_address: Option<String>,
    pub contact_person: Option<Option<String>>,
    pub contact_number: Option<Option<String>>,
    pub installation_notes: Option<Option<String>>,
    pub completion_notes: Option<Option<String>>,
    pub assigned_technician_id: Option<Uuid>,
}

#[derive(AsChangeset)]
#[diesel(table_name = installation_jobs)]
struct InstallationJobChangeset {
    priority: Option<String>,
    scheduled_date: Option<Option<NaiveDateTime>>,
    estimated_duration_hours: Option<Option<f64>>,
    installation_address: Option<String>,
    contact_person: Option<Option<String>>,
    contact_number: Option<Option<String>>,
    installation_notes: Option<Option<String>>,
    completion_notes: Option<Option<String>>,
    updated_by_id: Option<Uuid>,
    updated_at: NaiveDateTime,
}

#[derive(Debug, Clone, Default)]
pub struct InstallationJobFilter {
    pub status: Option<JobStatus>,
    pub priority: Option<Priority>,
    pub customer_id: Option<Uuid>,
    pub assigned_technician_id: Option<Uuid>,
    pub dispatch_order_id: Option<Uuid>,
    pub from_date: Option<NaiveDateTime>,
    pub to_date: Option<NaiveDateTime>,
}

/// Answer to the "schedule an installation?" prompt shown after a dispatch
/// order is raised.
#[derive(Debug, Clone)]
pub struct SchedulePrompt {
    pub create_installation_schedule: bool,
    pub installation_job: Option<CreateInstallationJob>,
}

#[derive(Debug, Clone)]
pub struct CreateTask {
    pub title: String,
    pub description: Option<String>,
    pub sequence_order: i32,
    pub depends_on_task_id: Option<Uuid>,
}

#[derive(Debug, Clone, Default)]
pub struct UpdateTask {
    pub title: Option<String>,
    pub description: Option<Option<String>>,
    pub sequence_order: Option<i32>,
    pub status: Option<TaskStatus>,
}

fn check_duration(value: Option<f64>) -> ServiceResult<()> {
    match value {
        Some(hours) if !hours.is_finite() || hours <= 0.0 => {
            Err(invalid("estimated_duration_hours must be greater than 0"))
        }
        _ => Ok(()),
    }
}

fn org_dispatch_order(
    conn: &mut PgConnection,
    organization_id: Uuid,
    order_id: Uuid,
) -> ServiceResult<DispatchOrder> {
    dispatch_orders::table
        .filter(dispatch_orders::organization_id.eq(organization_id))
        .filter(dispatch_orders::id.eq(order_id))
        .first(conn)
        .optional()?
        .ok_or(ServiceError::NotFound("Dispatch order"))
}

fn ensure_customer(conn: &mut PgConnection, organization_id: Uuid, id: Uuid) -> ServiceResult<()> {
    let found: Option<Uuid> = customers::table
        .filter(customers::organization_id.eq(organization_id))
        .filter(customers::id.eq(id))
        .select(customers::id)
        .first(conn)
        .optional()?;
    found.map(|_| ()).ok_or(ServiceError::NotFound("Customer"))
}

pub fn create_job(
    conn: &mut PgConnection,
    actor: Actor,
    input: CreateInstallationJob,
    now: NaiveDateTime,
) -> ServiceResult<InstallationJob> {
    let installation_address = require_text("installation_address", &input.installation_address)?;
    check_duration(input.estimated_duration_hours)?;

    conn.transaction::<_, ServiceError, _>(|conn| {
        let order = org_dispatch_order(conn, actor.organization_id, input.dispatch_order_id)?;
        ensure_customer(conn, actor.organization_id, input.customer_id)?;
        if let Some(ticket_id) = input.ticket_id {
            let found: Option<Uuid> = tickets::table
                .filter(tickets::organization_id.eq(actor.organization_id))
                .filter(tickets::id.eq(ticket_id))
                .select(tickets::id)
                .first(conn)
                .optional()?;
            found.ok_or(ServiceError::NotFound("Ticket"))?;
        }
        if let Some(technician_id) = input.assigned_technician_id {
            ensure_org_user(conn, actor.organization_id, technician_id, TECHNICIAN_NOT_FOUND)?;
        }

        let job_number =
            numbering::next_number(conn, INSTALLATION_JOB_PREFIX, actor.organization_id, now)?;
        let job: InstallationJob = diesel::insert_into(installation_jobs::table)
            .values(&NewInstallationJob {
                id: Uuid::new_v4(),
                organization_id: actor.organization_id,
                job_number,
                dispatch_order_id: order.id,
                customer_id: input.customer_id,
                ticket_id: input.ticket_id,
                status: JobStatus::Scheduled.to_string(),
                priority: input.priority.unwrap_or_default().to_string(),
                scheduled_date: input.scheduled_date,
                estimated_duration_hours: input.estimated_duration_hours,
                installation_address,
                contact_person: input.contact_person,
                contact_number: input.contact_number,
                installation_notes: input.installation_notes,
                assigned_technician_id: input.assigned_technician_id,
                created_by_id: Some(actor.user_id),
            })
            .get_result(conn)?;

        tracing::info!(
            job_id = %job.id,
            job_number = %job.job_number,
            dispatch_order = %order.order_number,
            user_id = %actor.user_id,
            "installation job created"
        );
        Ok(job)
    })
}

/// Creates a job from the post-dispatch prompt, or rejects the answer when
/// no job was requested.
pub fn schedule_from_prompt(
    conn: &mut PgConnection,
    actor: Actor,
    prompt: SchedulePrompt,
    now: NaiveDateTime,
) -> ServiceResult<InstallationJob> {
    if !prompt.create_installation_schedule {
        return Err(invalid("Installation schedule creation not requested"));
    }
    let input = prompt
        .installation_job
        .ok_or_else(|| invalid("Installation job details required"))?;
    create_job(conn, actor, input, now)
}

pub fn list_jobs(
    conn: &mut PgConnection,
    organization_id: Uuid,
    filter: &InstallationJobFilter,
    page: Page,
) -> ServiceResult<Vec<InstallationJob>> {
    let mut query = installation_jobs::table
        .filter(installation_jobs::organization_id.eq(organization_id))
        .into_boxed();
    if let Some(status) = filter.status {
        query = query.filter(installation_jobs::status.eq(status.as_str()));
    }
    if let Some(priority) = filter.priority {
        query = query.filter(installation_jobs::priority.eq(priority.as_str()));
    }
    if let Some(customer_id) = filter.customer_id {
        query = query.filter(installation_jobs::customer_id.eq(customer_id));
    }
    if let Some(technician_id) = filter.assigned_technician_id {
        query = query.filter(installation_jobs::assigned_technician_id.eq(technician_id));
    }
    if let Some(order_id) = filter.dispatch_order_id {
        query = query.filter(installation_jobs::dispatch_order_id.eq(order_id));
    }
    if let Some(from) = filter.from_date {
        query = query.filter(installation_jobs::scheduled_date.ge(from));
    }
    if let Some(to) = filter.to_date {
        query = query.filter(installation_jobs::scheduled_date.le(to));
    }

    let rows = query
        .order(installation_jobs::created_at.desc())
        .offset(page.skip)
        .limit(page.limit)
        .load(conn)?;
    Ok(rows)
}

pub fn get_job(
    conn: &mut PgConnection,
    organization_id: Uuid,
    job_id: Uuid,
) -> ServiceResult<InstallationJob> {
    installation_jobs::table
        .filter(installation_jobs::organization_id.eq(organization_id))
        .filter(installation_jobs::id.eq(job_id))
        .first(conn)
        .optional()?
        .ok_or(ServiceError::NotFound("Installation job"))
}

pub(crate) fn lock_job(
    conn: &mut PgConnection,
    organization_id: Uuid,
    job_id: Uuid,
) -> ServiceResult<InstallationJob> {
    installation_jobs::table
        .filter(installation_jobs::organization_id.eq(organization_id))
        .filter(installation_jobs::id.eq(job_id))
        .for_update()
        .first(conn)
        .optional()?
        .ok_or(ServiceError::NotFound("Installation job"))
}

pub fn assign_technician(
    conn: &mut PgConnection,
    actor: Actor,
    job_id: Uuid,
    technician_id: Uuid,
) -> ServiceResult<InstallationJob> {
    conn.transaction::<_, ServiceError, _>(|conn| {
        let job = lock_job(conn, actor.organization_id, job_id)?;
        ensure_org_user(conn, actor.organization_id, technician_id, TECHNICIAN_NOT_FOUND)?;

        let updated: InstallationJob = diesel::update(installation_jobs::table.find(job.id))
            .set((
                installation_jobs::assigned_technician_id.eq(Some(technician_id)),
                installation_jobs::updated_by_id.eq(Some(actor.user_id)),
                installation_jobs::updated_at.eq(Utc::now().naive_utc()),
            ))
            .get_result(conn)?;
        tracing::info!(job_id = %job.id, technician_id = %technician_id, "technician assigned");
        Ok(updated)
    })
}

/// Moves the job through its lifecycle. `actual_start_time` and
/// `actual_end_time` are stamped on entry and never overwritten.
pub fn update_job_status(
    conn: &mut PgConnection,
    actor: Actor,
    job_id: Uuid,
    status: JobStatus,
    now: NaiveDateTime,
) -> ServiceResult<InstallationJob> {
    conn.transaction::<_, ServiceError, _>(|conn| {
        let job = lock_job(conn, actor.organization_id, job_id)?;
        transition_job(conn, actor, job, status, now)
    })
}

/// Applies a transition to an already locked job.
pub(crate) fn transition_job(
    conn: &mut PgConnection,
    actor: Actor,
    job: InstallationJob,
    status: JobStatus,
    now: NaiveDateTime,
) -> ServiceResult<InstallationJob> {
    let current: JobStatus = stored(&job.status)?;
    if !check_transition(current, status)? {
        return Ok(job);
    }

    let actual_start_time = match status {
        JobStatus::InProgress => Some(job.actual_start_time.unwrap_or(now)),
        _ => job.actual_start_time,
    };
    let actual_end_time = match status {
        JobStatus::Completed => Some(job.actual_end_time.unwrap_or(now)),
        _ => job.actual_end_time,
    };

    let updated: InstallationJob = diesel::update(installation_jobs::table.find(job.id))
        .set((
            installation_jobs::status.eq(status.as_str()),
            installation_jobs::actual_start_time.eq(actual_start_time),
            installation_jobs::actual_end_time.eq(actual_end_time),
            installation_jobs::updated_by_id.eq(Some(actor.user_id)),
            installation_jobs::updated_at.eq(Utc::now().naive_utc()),
        ))
        .get_result(conn)?;

    tracing::info!(job_id = %job.id, from = %current, to = %status, "installation job status updated");
    Ok(updated)
}

pub fn update_job(
    conn: &mut PgConnection,
    actor: Actor,
    job_id: Uuid,
    update: UpdateInstallationJob,
    now: NaiveDateTime,
) -> ServiceResult<InstallationJob> {
    if let Some(hours) = update.estimated_duration_hours {
        check_duration(hours)?;
    }
    let installation_address = update
        .installation_address
        .as_deref()
        .map(|value| require_text("installation_address", value))
        .transpose()?;

    conn.transaction::<_, ServiceError, _>(|conn| {
        let job = lock_job(conn, actor.organization_id, job_id)?;
        let changes = InstallationJobChangeset {
            priority: update.priority.map(|p| p.to_string()),
            scheduled_date: update.scheduled_date,
            estimated_duration_hours: update.estimated_duration_hours,
            installation_address,
            contact_person: update.contact_person,
            contact_number: update.contact_number,
            installation_notes: update.installation_notes,
            completion_notes: update.completion_notes,
            updated_by_id: Some(actor.user_id),
            updated_at: Utc::now().naive_utc(),
        };
        let mut job: InstallationJob = diesel::update(installation_jobs::table.find(job.id))
            .set(&changes)
            .get_result(conn)?;

        if let Some(technician_id) = update.assigned_technician_id {
            ensure_org_user(conn, actor.organization_id, technician_id, TECHNICIAN_NOT_FOUND)?;
            job = diesel::update(installation_jobs::table.find(job.id))
                .set(installation_jobs::assigned_technician_id.eq(Some(technician_id)))
                .get_result(conn)?;
        }
        if let Some(status) = update.status {
            job = transition_job(conn, actor, job, status, now)?;
        }
        Ok(job)
    })
}

/// Only jobs that never started (or were abandoned) can be removed.
pub fn delete_job(conn: &mut PgConnection, actor: Actor, job_id: Uuid) -> ServiceResult<()> {
    conn.transaction::<_, ServiceError, _>(|conn| {
        let job = lock_job(conn, actor.organization_id, job_id)?;
        match stored::<JobStatus>(&job.status)? {
            JobStatus::Scheduled | JobStatus::Cancelled => {}
            _ => {
                return Err(invalid(
                    "Can only delete installation jobs in scheduled or cancelled status",
                ))
            }
        }
        diesel::delete(installation_jobs::table.find(job.id)).execute(conn)?;
        tracing::info!(job_id = %job.id, user_id = %actor.user_id, "installation job deleted");
        Ok(())
    })
}

pub fn create_task(
    conn: &mut PgConnection,
    actor: Actor,
    job_id: Uuid,
    input: CreateTask,
) -> ServiceResult<InstallationTask> {
    let title = require_text("title", &input.title)?;
    conn.transaction::<_, ServiceError, _>(|conn| {
        let job = get_job(conn, actor.organization_id, job_id)?;
        if let Some(dependency) = input.depends_on_task_id {
            find_task(conn, actor.organization_id, job.id, dependency)
                .map_err(|_| invalid("Task dependency must belong to the same installation job"))?;
        }
        let task = diesel::insert_into(installation_tasks::table)
            .values(&NewInstallationTask {
                id: Uuid::new_v4(),
                organization_id: actor.organization_id,
                installation_job_id: job.id,
                title,
                description: input.description,
                sequence_order: input.sequence_order,
                depends_on_task_id: input.depends_on_task_id,
                status: TaskStatus::Pending.to_string(),
            })
            .get_result(conn)?;
        Ok(task)
    })
}

pub fn list_tasks(
    conn: &mut PgConnection,
    organization_id: Uuid,
    job_id: Uuid,
) -> ServiceResult<Vec<InstallationTask>> {
    let job = get_job(conn, organization_id, job_id)?;
    let rows = installation_tasks::table
        .filter(installation_tasks::organization_id.eq(organization_id))
        .filter(installation_tasks::installation_job_id.eq(job.id))
        .order((
            installation_tasks::sequence_order.asc(),
            installation_tasks::created_at.asc(),
        ))
        .load(conn)?;
    Ok(rows)
}

fn find_task(
    conn: &mut PgConnection,
    organization_id: Uuid,
    job_id: Uuid,
    task_id: Uuid,
) -> ServiceResult<InstallationTask> {
    installation_tasks::table
        .filter(installation_tasks::organization_id.eq(organization_id))
        .filter(installation_tasks::installation_job_id.eq(job_id))
        .filter(installation_tasks::id.eq(task_id))
        .first(conn)
        .optional()?
        .ok_or(ServiceError::NotFound("Installation task"))
}

pub fn update_task(
    conn: &mut PgConnection,
    actor: Actor,
    job_id: Uuid,
    task_id: Uuid,
    update: UpdateTask,
    now: NaiveDateTime,
) -> ServiceResult<InstallationTask> {
    let title = update
        .title
        .as_deref()
        .map(|value| require_text("title", value))
        .transpose()?;

    conn.transaction::<_, ServiceError, _>(|conn| {
        let job = get_job(conn, actor.organization_id, job_id)?;
        let task = find_task(conn, actor.organization_id, job.id, task_id)?;

        let mut status = None;
        let mut started_at = task.started_at;
        let mut completed_at = task.completed_at;
        if let Some(next) = update.status {
            let current: TaskStatus = stored(&task.status)?;
            if check_transition(current, next)? {
                if next == TaskStatus::InProgress {
                    if let Some(dependency) = task.depends_on_task_id {
                        let blocker = find_task(conn, actor.organization_id, job.id, dependency)?;
                        if stored::<TaskStatus>(&blocker.status)? != TaskStatus::Completed {
                            return Err(invalid(format!(
                                "Task depends on '{}' which is not completed",
                                blocker.title
                            )));
                        }
                    }
                    started_at = started_at.or(Some(now));
                }
                if next == TaskStatus::Completed {
                    completed_at = completed_at.or(Some(now));
                }
                status = Some(next.to_string());
            }
        }

        let updated = diesel::update(installation_tasks::table.find(task.id))
            .set((
                title.map(|t| installation_tasks::title.eq(t)),
                update.description.map(|d| installation_tasks::description.eq(d)),
                update
                    .sequence_order
                    .map(|s| installation_tasks::sequence_order.eq(s)),
                status.map(|s| installation_tasks::status.eq(s)),
                installation_tasks::started_at.eq(started_at),
                installation_tasks::completed_at.eq(completed_at),
                installation_tasks::updated_at.eq(Utc::now().naive_utc()),
            ))
            .get_result(conn)?;
        Ok(updated)
    })
}
