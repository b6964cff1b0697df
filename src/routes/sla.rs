use axum::{extract::State, http::StatusCode, Json};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    auth::{permissions::ServicePermission, AuthenticatedUser},
    error::AppResult,
    extract::{ApiJson, ApiPath, ApiQuery},
    models::{SlaPolicy, SlaTracking},
    services::sla::{self, PolicyInput, PolicyUpdate},
    state::AppState,
    status::Priority,
    utils::{
        json::nullable,
        time::{now, opt_iso, to_iso},
    },
};

const DEFAULT_THRESHOLD_PERCENT: f64 = 80.0;

fn default_true() -> bool {
    true
}

fn default_threshold() -> f64 {
    DEFAULT_THRESHOLD_PERCENT
}

#[derive(Deserialize)]
pub struct CreatePolicyRequest {
    pub name: String,
    pub description: Option<String>,
    pub priority: Option<Priority>,
    pub ticket_type: Option<String>,
    pub customer_tier: Option<String>,
    pub response_time_hours: f64,
    pub resolution_time_hours: f64,
    #[serde(default = "default_true")]
    pub escalation_enabled: bool,
    #[serde(default = "default_threshold")]
    pub escalation_threshold_percent: f64,
    #[serde(default = "default_true")]
    pub is_active: bool,
    #[serde(default)]
    pub is_default: bool,
}

#[derive(Deserialize)]
pub struct UpdatePolicyRequest {
    pub name: Option<String>,
    #[serde(default, deserialize_with = "nullable")]
    pub description: Option<Option<String>>,
    #[serde(default, deserialize_with = "nullable")]
    pub priority: Option<Option<Priority>>,
    #[serde(default, deserialize_with = "nullable")]
    pub ticket_type: Option<Option<String>>,
    #[serde(default, deserialize_with = "nullable")]
    pub customer_tier: Option<Option<String>>,
    pub response_time_hours: Option<f64>,
    pub resolution_time_hours: Option<f64>,
    pub escalation_enabled: Option<bool>,
    pub escalation_threshold_percent: Option<f64>,
    pub is_active: Option<bool>,
    pub is_default: Option<bool>,
}

#[derive(Deserialize, Default)]
pub struct PolicyListParams {
    #[serde(default)]
    pub active_only: bool,
}

#[derive(Serialize)]
pub struct PolicyResponse {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub priority: Option<String>,
    pub ticket_type: Option<String>,
    pub customer_tier: Option<String>,
    pub response_time_hours: f64,
    pub resolution_time_hours: f64,
    pub escalation_enabled: bool,
    pub escalation_threshold_percent: f64,
    pub is_active: bool,
    pub is_default: bool,
    pub created_at: String,
    pub updated_at: String,
}

impl From<SlaPolicy> for PolicyResponse {
    fn from(policy: SlaPolicy) -> Self {
        Self {
            id: policy.id,
            name: policy.name,
            description: policy.description,
            priority: policy.priority,
            ticket_type: policy.ticket_type,
            customer_tier: policy.customer_tier,
            response_time_hours: policy.response_time_hours,
            resolution_time_hours: policy.resolution_time_hours,
            escalation_enabled: policy.escalation_enabled,
            escalation_threshold_percent: policy.escalation_threshold_percent,
            is_active: policy.is_active,
            is_default: policy.is_default,
            created_at: to_iso(policy.created_at),
            updated_at: to_iso(policy.updated_at),
        }
    }
}

#[derive(Serialize)]
pub struct TrackingResponse {
    pub id: Uuid,
    pub ticket_id: Uuid,
    pub policy_id: Uuid,
    pub started_at: String,
    pub response_deadline: String,
    pub resolution_deadline: String,
    pub first_response_at: Option<String>,
    pub resolved_at: Option<String>,
    pub response_status: String,
    pub resolution_status: String,
    pub response_breach_hours: Option<f64>,
    pub resolution_breach_hours: Option<f64>,
    pub escalation_triggered: bool,
    pub escalation_triggered_at: Option<String>,
    pub escalation_level: i32,
}

impl From<SlaTracking> for TrackingResponse {
    fn from(tracking: SlaTracking) -> Self {
        Self {
            id: tracking.id,
            ticket_id: tracking.ticket_id,
            policy_id: tracking.policy_id,
            started_at: to_iso(tracking.started_at),
            response_deadline: to_iso(tracking.response_deadline),
            resolution_deadline: to_iso(tracking.resolution_deadline),
            first_response_at: opt_iso(tracking.first_response_at),
            resolved_at: opt_iso(tracking.resolved_at),
            response_status: tracking.response_status,
            resolution_status: tracking.resolution_status,
            response_breach_hours: tracking.response_breach_hours,
            resolution_breach_hours: tracking.resolution_breach_hours,
            escalation_triggered: tracking.escalation_triggered,
            escalation_triggered_at: opt_iso(tracking.escalation_triggered_at),
            escalation_level: tracking.escalation_level,
        }
    }
}

#[derive(Serialize)]
pub struct EscalationCheckResponse {
    pub escalated_ticket_ids: Vec<Uuid>,
}

pub async fn list_policies(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    ApiQuery(params): ApiQuery<PolicyListParams>,
) -> AppResult<Json<Vec<PolicyResponse>>> {
    user.require(ServicePermission::SlaRead)?;
    let mut conn = state.db()?;
    let rows = sla::list_policies(&mut conn, user.organization_id, params.active_only)?;
    Ok(Json(rows.into_iter().map(PolicyResponse::from).collect()))
}

pub async fn create_policy(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    ApiJson(payload): ApiJson<CreatePolicyRequest>,
) -> AppResult<(StatusCode, Json<PolicyResponse>)> {
    let actor = user.require(ServicePermission::SlaCreate)?;
    let mut conn = state.db()?;
    let policy = sla::create_policy(
        &mut conn,
        actor,
        PolicyInput {
            name: payload.name,
            description: payload.description,
            priority: payload.priority,
            ticket_type: payload.ticket_type,
            customer_tier: payload.customer_tier,
            response_time_hours: payload.response_time_hours,
            resolution_time_hours: payload.resolution_time_hours,
            escalation_enabled: payload.escalation_enabled,
            escalation_threshold_percent: payload.escalation_threshold_percent,
            is_active: payload.is_active,
            is_default: payload.is_default,
        },
    )?;
    Ok((StatusCode::CREATED, Json(policy.into())))
}

pub async fn get_policy(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    ApiPath(policy_id): ApiPath<Uuid>,
) -> AppResult<Json<PolicyResponse>> {
    user.require(ServicePermission::SlaRead)?;
    let mut conn = state.db()?;
    let policy = sla::get_policy(&mut conn, user.organization_id, policy_id)?;
    Ok(Json(policy.into()))
}

pub async fn update_policy(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    ApiPath(policy_id): ApiPath<Uuid>,
    ApiJson(payload): ApiJson<UpdatePolicyRequest>,
) -> AppResult<Json<PolicyResponse>> {
    let actor = user.require(ServicePermission::SlaUpdate)?;
    let mut conn = state.db()?;
    let policy = sla::update_policy(
        &mut conn,
        actor,
        policy_id,
        PolicyUpdate {
            name: payload.name,
            description: payload.description,
            priority: payload.priority,
            ticket_type: payload.ticket_type,
            customer_tier: payload.customer_tier,
            response_time_hours: payload.response_time_hours,
            resolution_time_hours: payload.resolution_time_hours,
            escalation_enabled: payload.escalation_enabled,
            escalation_threshold_percent: payload.escalation_threshold_percent,
            is_active: payload.is_active,
            is_default: payload.is_default,
        },
    )?;
    Ok(Json(policy.into()))
}

pub async fn delete_policy(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    ApiPath(policy_id): ApiPath<Uuid>,
) -> AppResult<StatusCode> {
    let actor = user.require(ServicePermission::SlaDelete)?;
    let mut conn = state.db()?;
    sla::delete_policy(&mut conn, actor, policy_id)?;
    Ok(StatusCode::NO_CONTENT)
}

/// Runs the escalation sweep for the caller's organization right away.
pub async fn check_escalations(
    State(state): State<AppState>,
    user: AuthenticatedUser,
) -> AppResult<Json<EscalationCheckResponse>> {
    let actor = user.require(ServicePermission::SlaEscalate)?;
    let mut conn = state.db()?;
    let escalated = sla::sweep_escalations(&mut conn, Some(actor.organization_id), now())?;
    Ok(Json(EscalationCheckResponse {
        escalated_ticket_ids: escalated,
    }))
}
