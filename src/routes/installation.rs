use axum::{extract::State, http::StatusCode, Json};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    auth::{permissions::ServicePermission, AuthenticatedUser},
    error::AppResult,
    extract::{ApiJson, ApiPath, ApiQuery},
    models::{InstallationJob, InstallationTask},
    services::installation::{
        self, CreateInstallationJob, CreateTask, InstallationJobFilter, SchedulePrompt,
        UpdateInstallationJob, UpdateTask,
    },
    state::AppState,
    status::{JobStatus, Priority, TaskStatus},
    utils::{
        json::nullable,
        time::{naive, now, opt_iso, to_iso},
    },
};

use super::page;

#[derive(Deserialize)]
pub struct CreateJobRequest {
    pub dispatch_order_id: Uuid,
    pub customer_id: Uuid,
    pub ticket_id: Option<Uuid>,
    pub priority: Option<Priority>,
    pub scheduled_date: Option<DateTime<Utc>>,
    pub estimated_duration_hours: Option<f64>,
    pub installation_address: String,
    pub contact_person: Option<String>,
    pub contact_number: Option<String>,
    pub installation_notes: Option<String>,
    pub assigned_technician_id: Option<Uuid>,
}

impl From<CreateJobRequest> for CreateInstallationJob {
    fn from(request: CreateJobRequest) -> Self {
        Self {
            dispatch_order_id: request.dispatch_order_id,
            customer_id: request.customer_id,
            ticket_id: request.ticket_id,
            priority: request.priority,
            scheduled_date: naive(request.scheduled_date),
            estimated_duration_hours: request.estimated_duration_hours,
            installation_address: request.installation_address,
            contact_person: request.contact_person,
            contact_number: request.contact_number,
            installation_notes: request.installation_notes,
            assigned_technician_id: request.assigned_technician_id,
        }
    }
}

#[derive(Deserialize)]
pub struct UpdateJobRequest {
    pub status: Option<JobStatus>,
    pub priority: Option<Priority>,
    #[serde(default, deserialize_with = "nullable")]
    pub scheduled_date: Option<Option<DateTime<Utc>>>,
    #[serde(default, deserialize_with = "nullable")]
    pub estimated_duration_hours: Option<Option<f64>>,
    pub installation_address: Option<String>,
    #[serde(default, deserialize_with = "nullable")]
    pub contact_person: Option<Option<String>>,
    #[serde(default, deserialize_with = "nullable")]
    pub contact_number: Option<Option<String>>,
    #[serde(default, deserialize_with = "nullable")]
    pub installation_notes: Option<Option<String>>,
    #[serde(default, deserialize_with = "nullable")]
    pub completion_notes: Option<Option<String>>,
    pub assigned_technician_id: Option<Uuid>,
}

#[derive(Deserialize, Default)]
pub struct JobListParams {
    pub status: Option<JobStatus>,
    pub priority: Option<Priority>,
    pub customer_id: Option<Uuid>,
    pub assigned_technician_id: Option<Uuid>,
    pub dispatch_order_id: Option<Uuid>,
    pub from_date: Option<DateTime<Utc>>,
    pub to_date: Option<DateTime<Utc>>,
    pub skip: Option<i64>,
    pub limit: Option<i64>,
}

#[derive(Deserialize)]
pub struct SchedulePromptRequest {
    pub create_installation_schedule: bool,
    pub installation_job: Option<CreateJobRequest>,
}

#[derive(Deserialize)]
pub struct CreateTaskRequest {
    pub title: String,
    pub description: Option<String>,
    #[serde(default)]
    pub sequence_order: i32,
    pub depends_on_task_id: Option<Uuid>,
}

#[derive(Deserialize)]
pub struct UpdateTaskRequest {
    pub title: Option<String>,
    #[serde(default, deserialize_with = "nullable")]
    pub description: Option<Option<String>>,
    pub sequence_order: Option<i32>,
    pub status: Option<TaskStatus>,
}

#[derive(Serialize)]
pub struct JobResponse {
    pub id: Uuid,
    pub job_number: String,
    pub dispatch_order_id: Uuid,
    pub customer_id: Uuid,
    pub ticket_id: Option<Uuid>,
    pub status: String,
    pub priority: String,
    pub scheduled_date: Option<String>,
    pub estimated_duration_hours: Option<f64>,
    pub actual_start_time: Option<String>,
    pub actual_end_time: Option<String>,
    pub installation_address: String,
    pub contact_person: Option<String>,
    pub contact_number: Option<String>,
    pub installation_notes: Option<String>,
    pub completion_notes: Option<String>,
    pub assigned_technician_id: Option<Uuid>,
    pub created_by_id: Option<Uuid>,
    pub updated_by_id: Option<Uuid>,
    pub created_at: String,
    pub updated_at: String,
}

impl From<InstallationJob> for JobResponse {
    fn from(job: InstallationJob) -> Self {
        Self {
            id: job.id,
            job_number: job.job_number,
            dispatch_order_id: job.dispatch_order_id,
            customer_id: job.customer_id,
            ticket_id: job.ticket_id,
            status: job.status,
            priority: job.priority,
            scheduled_date: opt_iso(job.scheduled_date),
            estimated_duration_hours: job.estimated_duration_hours,
            actual_start_time: opt_iso(job.actual_start_time),
            actual_end_time: opt_iso(job.actual_end_time),
            installation_address: job.installation_address,
            contact_person: job.contact_person,
            contact_number: job.contact_number,
            installation_notes: job.installation_notes,
            completion_notes: job.completion_notes,
            assigned_technician_id: job.assigned_technician_id,
            created_by_id: job.created_by_id,
            updated_by_id: job.updated_by_id,
            created_at: to_iso(job.created_at),
            updated_at: to_iso(job.updated_at),
        }
    }
}

#[derive(Serialize)]
pub struct TaskResponse {
    pub id: Uuid,
    pub installation_job_id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub sequence_order: i32,
    pub depends_on_task_id: Option<Uuid>,
    pub status: String,
    pub started_at: Option<String>,
    pub completed_at: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl From<InstallationTask> for TaskResponse {
    fn from(task: InstallationTask) -> Self {
        Self {
            id: task.id,
            installation_job_id: task.installation_job_id,
            title: task.title,
            description: task.description,
            sequence_order: task.sequence_order,
            depends_on_task_id: task.depends_on_task_id,
            status: task.status,
            started_at: opt_iso(task.started_at),
            completed_at: opt_iso(task.completed_at),
            created_at: to_iso(task.created_at),
            updated_at: to_iso(task.updated_at),
        }
    }
}

pub async fn create_job(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    ApiJson(payload): ApiJson<CreateJobRequest>,
) -> AppResult<(StatusCode, Json<JobResponse>)> {
    let actor = user.require(ServicePermission::InstallationCreate)?;
    let mut conn = state.db()?;
    let job = installation::create_job(&mut conn, actor, payload.into(), now())?;
    Ok((StatusCode::CREATED, Json(job.into())))
}

/// Answer to the installation prompt raised after a dispatch order.
pub async fn schedule_prompt(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    ApiJson(payload): ApiJson<SchedulePromptRequest>,
) -> AppResult<(StatusCode, Json<JobResponse>)> {
    let actor = user.require(ServicePermission::InstallationCreate)?;
    let prompt = SchedulePrompt {
        create_installation_schedule: payload.create_installation_schedule,
        installation_job: payload.installation_job.map(Into::into),
    };
    let mut conn = state.db()?;
    let job = installation::schedule_from_prompt(&mut conn, actor, prompt, now())?;
    tracing::info!(job_number = %job.job_number, "installation job created from prompt");
    Ok((StatusCode::CREATED, Json(job.into())))
}

pub async fn list_jobs(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    ApiQuery(params): ApiQuery<JobListParams>,
) -> AppResult<Json<Vec<JobResponse>>> {
    user.require(ServicePermission::InstallationRead)?;
    let page = page(params.skip, params.limit)?;
    let filter = InstallationJobFilter {
        status: params.status,
        priority: params.priority,
        customer_id: params.customer_id,
        assigned_technician_id: params.assigned_technician_id,
        dispatch_order_id: params.dispatch_order_id,
        from_date: naive(params.from_date),
        to_date: naive(params.to_date),
    };
    let mut conn = state.db()?;
    let rows = installation::list_jobs(&mut conn, user.organization_id, &filter, page)?;
    Ok(Json(rows.into_iter().map(JobResponse::from).collect()))
}

pub async fn get_job(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    ApiPath(job_id): ApiPath<Uuid>,
) -> AppResult<Json<JobResponse>> {
    user.require(ServicePermission::InstallationRead)?;
    let mut conn = state.db()?;
    let job = installation::get_job(&mut conn, user.organization_id, job_id)?;
    Ok(Json(job.into()))
}

pub async fn update_job(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    ApiPath(job_id): ApiPath<Uuid>,
    ApiJson(payload): ApiJson<UpdateJobRequest>,
) -> AppResult<Json<JobResponse>> {
    let actor = user.require(ServicePermission::InstallationUpdate)?;
    let update = UpdateInstallationJob {
        status: payload.status,
        priority: payload.priority,
        scheduled_date: payload.scheduled_date.map(naive),
        estimated_duration_hours: payload.estimated_duration_hours,
        installation_address: payload.installation_address,
        contact_person: payload.contact_person,
        contact_number: payload.contact_number,
        installation_notes: payload.installation_notes,
        completion_notes: payload.completion_notes,
        assigned_technician_id: payload.assigned_technician_id,
    };
    let mut conn = state.db()?;
    let job = installation::update_job(&mut conn, actor, job_id, update, now())?;
    Ok(Json(job.into()))
}

pub async fn delete_job(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    ApiPath(job_id): ApiPath<Uuid>,
) -> AppResult<StatusCode> {
    let actor = user.require(ServicePermission::InstallationDelete)?;
    let mut conn = state.db()?;
    installation::delete_job(&mut conn, actor, job_id)?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn list_tasks(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    ApiPath(job_id): ApiPath<Uuid>,
) -> AppResult<Json<Vec<TaskResponse>>> {
    user.require(ServicePermission::InstallationRead)?;
    let mut conn = state.db()?;
    let rows = installation::list_tasks(&mut conn, user.organization_id, job_id)?;
    Ok(Json(rows.into_iter().map(TaskResponse::from).collect()))
}

pub async fn create_task(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    ApiPath(job_id): ApiPath<Uuid>,
    ApiJson(payload): ApiJson<CreateTaskRequest>,
) -> AppResult<(StatusCode, Json<TaskResponse>)> {
    let actor = user.require(ServicePermission::InstallationUpdate)?;
    let mut conn = state.db()?;
    let task = installation::create_task(
        &mut conn,
        actor,
        job_id,
        CreateTask {
            title: payload.title,
            description: payload.description,
            sequence_order: payload.sequence_order,
            depends_on_task_id: payload.depends_on_task_id,
        },
    )?;
    Ok((StatusCode::CREATED, Json(task.into())))
}

pub async fn update_task(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    ApiPath((job_id, task_id)): ApiPath<(Uuid, Uuid)>,
    ApiJson(payload): ApiJson<UpdateTaskRequest>,
) -> AppResult<Json<TaskResponse>> {
    let actor = user.require(ServicePermission::InstallationUpdate)?;
    let mut conn = state.db()?;
    let task = installation::update_task(
        &mut conn,
        actor,
        job_id,
        task_id,
        UpdateTask {
            title: payload.title,
            description: payload.description,
            sequence_order: payload.sequence_order,
            status: payload.status,
        },
        now(),
    )?;
    Ok(Json(task.into()))
}

#[derive(Deserialize)]
pub struct AssignTechnicianRequest {
    pub technician_id: Uuid,
}

pub async fn assign_technician(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    ApiPath(job_id): ApiPath<Uuid>,
    ApiJson(payload): ApiJson<AssignTechnicianRequest>,
) -> AppResult<Json<JobResponse>> {
    let actor = user.require(ServicePermission::InstallationUpdate)?;
    let mut conn = state.db()?;
    let job = installation::assign_technician(&mut conn, actor, job_id, payload.technician_id)?;
    Ok(Json(job.into()))
}
