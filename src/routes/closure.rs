use axum::{extract::State, http::StatusCode, Json};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    auth::{permissions::ServicePermission, AuthenticatedUser},
    error::AppResult,
    extract::{ApiJson, ApiPath},
    models::{CompletionRecord, CustomerFeedback, ServiceClosure},
    services::{
        closure::{self, CreateClosure},
        completion::{self, RecordCompletion},
        feedback::{self, SubmitFeedback},
    },
    state::AppState,
    status::SatisfactionLevel,
    utils::time::{naive, now, opt_iso, to_iso},
};

#[derive(Deserialize)]
pub struct CompletionRequest {
    pub completed_by_id: Uuid,
    pub completed_at: Option<DateTime<Utc>>,
    pub actual_duration_hours: Option<f64>,
    pub work_performed: String,
    pub issues_encountered: Option<String>,
    #[serde(default)]
    pub quality_check_passed: bool,
    #[serde(default)]
    pub customer_present: bool,
    #[serde(default)]
    pub customer_signature_received: bool,
    #[serde(default)]
    pub follow_up_required: bool,
    pub follow_up_date: Option<DateTime<Utc>>,
    pub follow_up_notes: Option<String>,
}

#[derive(Serialize)]
pub struct CompletionResponse {
    pub id: Uuid,
    pub installation_job_id: Uuid,
    pub completed_by_id: Uuid,
    pub completed_at: String,
    pub actual_duration_hours: Option<f64>,
    pub work_performed: String,
    pub issues_encountered: Option<String>,
    pub quality_check_passed: bool,
    pub customer_present: bool,
    pub customer_signature_received: bool,
    pub follow_up_required: bool,
    pub follow_up_date: Option<String>,
    pub follow_up_notes: Option<String>,
    pub feedback_request_sent: bool,
    pub feedback_request_sent_at: Option<String>,
    pub created_at: String,
}

impl From<CompletionRecord> for CompletionResponse {
    fn from(record: CompletionRecord) -> Self {
        Self {
            id: record.id,
            installation_job_id: record.installation_job_id,
            completed_by_id: record.completed_by_id,
            completed_at: to_iso(record.completed_at),
            actual_duration_hours: record.actual_duration_hours,
            work_performed: record.work_performed,
            issues_encountered: record.issues_encountered,
            quality_check_passed: record.quality_check_passed,
            customer_present: record.customer_present,
            customer_signature_received: record.customer_signature_received,
            follow_up_required: record.follow_up_required,
            follow_up_date: opt_iso(record.follow_up_date),
            follow_up_notes: record.follow_up_notes,
            feedback_request_sent: record.feedback_request_sent,
            feedback_request_sent_at: opt_iso(record.feedback_request_sent_at),
            created_at: to_iso(record.created_at),
        }
    }
}

#[derive(Deserialize)]
pub struct FeedbackRequest {
    pub overall_rating: i32,
    pub service_quality_rating: Option<i32>,
    pub technician_rating: Option<i32>,
    pub timeliness_rating: Option<i32>,
    pub communication_rating: Option<i32>,
    pub comments: Option<String>,
    pub would_recommend: Option<bool>,
    pub satisfaction_level: Option<SatisfactionLevel>,
}

#[derive(Deserialize)]
pub struct FeedbackReplyRequest {
    pub response_text: String,
}

#[derive(Serialize)]
pub struct FeedbackResponse {
    pub id: Uuid,
    pub installation_job_id: Uuid,
    pub completion_record_id: Option<Uuid>,
    pub customer_id: Uuid,
    pub overall_rating: i32,
    pub service_quality_rating: Option<i32>,
    pub technician_rating: Option<i32>,
    pub timeliness_rating: Option<i32>,
    pub communication_rating: Option<i32>,
    pub comments: Option<String>,
    pub would_recommend: Option<bool>,
    pub satisfaction_level: Option<String>,
    pub feedback_status: String,
    pub reviewed_by_id: Option<Uuid>,
    pub reviewed_at: Option<String>,
    pub response_text: Option<String>,
    pub responded_by_id: Option<Uuid>,
    pub responded_at: Option<String>,
    pub created_at: String,
}

impl From<CustomerFeedback> for FeedbackResponse {
    fn from(feedback: CustomerFeedback) -> Self {
        Self {
            id: feedback.id,
            installation_job_id: feedback.installation_job_id,
            completion_record_id: feedback.completion_record_id,
            customer_id: feedback.customer_id,
            overall_rating: feedback.overall_rating,
            service_quality_rating: feedback.service_quality_rating,
            technician_rating: feedback.technician_rating,
            timeliness_rating: feedback.timeliness_rating,
            communication_rating: feedback.communication_rating,
            comments: feedback.comments,
            would_recommend: feedback.would_recommend,
            satisfaction_level: feedback.satisfaction_level,
            feedback_status: feedback.feedback_status,
            reviewed_by_id: feedback.reviewed_by_id,
            reviewed_at: opt_iso(feedback.reviewed_at),
            response_text: feedback.response_text,
            responded_by_id: feedback.responded_by_id,
            responded_at: opt_iso(feedback.responded_at),
            created_at: to_iso(feedback.created_at),
        }
    }
}

#[derive(Deserialize, Default)]
pub struct CreateClosureRequest {
    pub requires_manager_approval: Option<bool>,
    pub closure_notes: Option<String>,
}

#[derive(Deserialize, Default)]
pub struct CloseRequest {
    pub closure_notes: Option<String>,
}

#[derive(Deserialize)]
pub struct ReopenRequest {
    pub reason: String,
}

#[derive(Serialize)]
pub struct ClosureResponse {
    pub id: Uuid,
    pub installation_job_id: Uuid,
    pub closure_status: String,
    pub requires_manager_approval: bool,
    pub feedback_received: bool,
    pub approved_by_id: Option<Uuid>,
    pub approved_at: Option<String>,
    pub closed_by_id: Option<Uuid>,
    pub closed_at: Option<String>,
    pub closure_notes: Option<String>,
    pub reopened_count: i32,
    pub last_reopened_at: Option<String>,
    pub last_reopened_by_id: Option<Uuid>,
    pub last_reopen_reason: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl From<ServiceClosure> for ClosureResponse {
    fn from(closure: ServiceClosure) -> Self {
        Self {
            id: closure.id,
            installation_job_id: closure.installation_job_id,
            closure_status: closure.closure_status,
            requires_manager_approval: closure.requires_manager_approval,
            feedback_received: closure.feedback_received,
            approved_by_id: closure.approved_by_id,
            approved_at: opt_iso(closure.approved_at),
            closed_by_id: closure.closed_by_id,
            closed_at: opt_iso(closure.closed_at),
            closure_notes: closure.closure_notes,
            reopened_count: closure.reopened_count,
            last_reopened_at: opt_iso(closure.last_reopened_at),
            last_reopened_by_id: closure.last_reopened_by_id,
            last_reopen_reason: closure.last_reopen_reason,
            created_at: to_iso(closure.created_at),
            updated_at: to_iso(closure.updated_at),
        }
    }
}

pub async fn record_completion(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    ApiPath(job_id): ApiPath<Uuid>,
    ApiJson(payload): ApiJson<CompletionRequest>,
) -> AppResult<(StatusCode, Json<CompletionResponse>)> {
    let actor = user.require(ServicePermission::InstallationUpdate)?;
    let input = RecordCompletion {
        completed_by_id: payload.completed_by_id,
        completed_at: naive(payload.completed_at),
        actual_duration_hours: payload.actual_duration_hours,
        work_performed: payload.work_performed,
        issues_encountered: payload.issues_encountered,
        quality_check_passed: payload.quality_check_passed,
        customer_present: payload.customer_present,
        customer_signature_received: payload.customer_signature_received,
        follow_up_required: payload.follow_up_required,
        follow_up_date: naive(payload.follow_up_date),
        follow_up_notes: payload.follow_up_notes,
    };
    let mut conn = state.db()?;
    let record = completion::record_completion(&mut conn, actor, job_id, input, now())?;
    Ok((StatusCode::CREATED, Json(record.into())))
}

pub async fn get_completion(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    ApiPath(job_id): ApiPath<Uuid>,
) -> AppResult<Json<CompletionResponse>> {
    user.require(ServicePermission::InstallationRead)?;
    let mut conn = state.db()?;
    let record = completion::get_completion(&mut conn, user.organization_id, job_id)?;
    Ok(Json(record.into()))
}

pub async fn submit_feedback(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    ApiPath(job_id): ApiPath<Uuid>,
    ApiJson(payload): ApiJson<FeedbackRequest>,
) -> AppResult<(StatusCode, Json<FeedbackResponse>)> {
    let actor = user.require(ServicePermission::InstallationUpdate)?;
    let input = SubmitFeedback {
        overall_rating: payload.overall_rating,
        service_quality_rating: payload.service_quality_rating,
        technician_rating: payload.technician_rating,
        timeliness_rating: payload.timeliness_rating,
        communication_rating: payload.communication_rating,
        comments: payload.comments,
        would_recommend: payload.would_recommend,
        satisfaction_level: payload.satisfaction_level,
    };
    let mut conn = state.db()?;
    let feedback = feedback::submit_feedback(&mut conn, actor, job_id, input)?;
    Ok((StatusCode::CREATED, Json(feedback.into())))
}

pub async fn list_feedback(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    ApiPath(job_id): ApiPath<Uuid>,
) -> AppResult<Json<Vec<FeedbackResponse>>> {
    user.require(ServicePermission::InstallationRead)?;
    let mut conn = state.db()?;
    let rows = feedback::list_feedback(&mut conn, user.organization_id, job_id)?;
    Ok(Json(rows.into_iter().map(FeedbackResponse::from).collect()))
}

pub async fn review_feedback(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    ApiPath(feedback_id): ApiPath<Uuid>,
) -> AppResult<Json<FeedbackResponse>> {
    let actor = user.require(ServicePermission::InstallationUpdate)?;
    let mut conn = state.db()?;
    let feedback = feedback::review_feedback(&mut conn, actor, feedback_id, now())?;
    Ok(Json(feedback.into()))
}

pub async fn respond_to_feedback(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    ApiPath(feedback_id): ApiPath<Uuid>,
    ApiJson(payload): ApiJson<FeedbackReplyRequest>,
) -> AppResult<Json<FeedbackResponse>> {
    let actor = user.require(ServicePermission::InstallationUpdate)?;
    let mut conn = state.db()?;
    let feedback =
        feedback::respond_to_feedback(&mut conn, actor, feedback_id, &payload.response_text, now())?;
    Ok(Json(feedback.into()))
}

pub async fn close_feedback(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    ApiPath(feedback_id): ApiPath<Uuid>,
) -> AppResult<Json<FeedbackResponse>> {
    let actor = user.require(ServicePermission::InstallationUpdate)?;
    let mut conn = state.db()?;
    let feedback = feedback::close_feedback(&mut conn, actor, feedback_id, now())?;
    Ok(Json(feedback.into()))
}

pub async fn create_closure(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    ApiPath(job_id): ApiPath<Uuid>,
    ApiJson(payload): ApiJson<CreateClosureRequest>,
) -> AppResult<(StatusCode, Json<ClosureResponse>)> {
    let actor = user.require(ServicePermission::InstallationUpdate)?;
    let mut conn = state.db()?;
    let closure = closure::create_closure(
        &mut conn,
        actor,
        job_id,
        CreateClosure {
            requires_manager_approval: payload.requires_manager_approval,
            closure_notes: payload.closure_notes,
        },
    )?;
    Ok((StatusCode::CREATED, Json(closure.into())))
}

pub async fn get_closure(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    ApiPath(job_id): ApiPath<Uuid>,
) -> AppResult<Json<ClosureResponse>> {
    user.require(ServicePermission::InstallationRead)?;
    let mut conn = state.db()?;
    let closure = closure::get_closure(&mut conn, user.organization_id, job_id)?;
    Ok(Json(closure.into()))
}

/// Manager sign-off for closures created with `requires_manager_approval`.
pub async fn approve_closure(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    ApiPath(job_id): ApiPath<Uuid>,
) -> AppResult<Json<ClosureResponse>> {
    let actor = user.require(ServicePermission::InstallationUpdate)?;
    let mut conn = state.db()?;
    let closure = closure::approve_closure(&mut conn, actor, job_id, now())?;
    Ok(Json(closure.into()))
}

pub async fn close_service(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    ApiPath(job_id): ApiPath<Uuid>,
    body: Option<ApiJson<CloseRequest>>,
) -> AppResult<Json<ClosureResponse>> {
    let actor = user.require(ServicePermission::InstallationUpdate)?;
    let notes = body.and_then(|ApiJson(request)| request.closure_notes);
    let mut conn = state.db()?;
    let closure = closure::close_service(&mut conn, actor, job_id, notes, now())?;
    Ok(Json(closure.into()))
}

pub async fn reopen_service(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    ApiPath(job_id): ApiPath<Uuid>,
    ApiJson(payload): ApiJson<ReopenRequest>,
) -> AppResult<Json<ClosureResponse>> {
    let actor = user.require(ServicePermission::InstallationUpdate)?;
    let mut conn = state.db()?;
    let closure = closure::reopen_service(&mut conn, actor, job_id, &payload.reason, now())?;
    Ok(Json(closure.into()))
}
