use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    auth::{permissions::ServicePermission, AuthenticatedUser},
    error::AppResult,
    extract::{ApiJson, ApiQuery},
    models::{NotificationLog, Organization},
    services::{
        notifications,
        organizations::{self, SettingsUpdate},
    },
    state::AppState,
    utils::time::to_iso,
};

use super::page;

#[derive(Deserialize)]
pub struct UpdateSettingsRequest {
    pub require_feedback_before_closure: Option<bool>,
    pub require_manager_approval: Option<bool>,
}

#[derive(Serialize)]
pub struct SettingsResponse {
    pub organization_id: Uuid,
    pub name: String,
    pub require_feedback_before_closure: bool,
    pub require_manager_approval: bool,
    pub updated_at: String,
}

impl From<Organization> for SettingsResponse {
    fn from(org: Organization) -> Self {
        Self {
            organization_id: org.id,
            name: org.name,
            require_feedback_before_closure: org.require_feedback_before_closure,
            require_manager_approval: org.require_manager_approval,
            updated_at: to_iso(org.updated_at),
        }
    }
}

#[derive(Debug, Deserialize, Default)]
pub struct LogListParams {
    pub event_type: Option<String>,
    pub skip: Option<i64>,
    pub limit: Option<i64>,
}

#[derive(Serialize)]
pub struct NotificationLogResponse {
    pub id: Uuid,
    pub event_type: String,
    pub recipient: String,
    pub payload: serde_json::Value,
    pub status: String,
    pub error: Option<String>,
    pub job_id: Option<Uuid>,
    pub created_at: String,
}

impl From<NotificationLog> for NotificationLogResponse {
    fn from(log: NotificationLog) -> Self {
        Self {
            id: log.id,
            event_type: log.event_type,
            recipient: log.recipient,
            payload: log.payload,
            status: log.status,
            error: log.error,
            job_id: log.job_id,
            created_at: to_iso(log.created_at),
        }
    }
}

pub async fn get_settings(
    State(state): State<AppState>,
    user: AuthenticatedUser,
) -> AppResult<Json<SettingsResponse>> {
    user.require(ServicePermission::CrmSettings)?;
    let mut conn = state.db()?;
    let org = organizations::get_organization(&mut conn, user.organization_id)?;
    Ok(Json(org.into()))
}

pub async fn update_settings(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    ApiJson(payload): ApiJson<UpdateSettingsRequest>,
) -> AppResult<Json<SettingsResponse>> {
    let actor = user.require(ServicePermission::CrmSettings)?;
    let mut conn = state.db()?;
    let org = organizations::update_settings(
        &mut conn,
        actor,
        SettingsUpdate {
            require_feedback_before_closure: payload.require_feedback_before_closure,
            require_manager_approval: payload.require_manager_approval,
        },
    )?;
    Ok(Json(org.into()))
}

pub async fn list_notification_logs(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    ApiQuery(params): ApiQuery<LogListParams>,
) -> AppResult<Json<Vec<NotificationLogResponse>>> {
    user.require(ServicePermission::CrmAdmin)?;
    let page = page(params.skip, params.limit)?;
    let mut conn = state.db()?;
    let event_type = params
        .event_type
        .as_deref()
        .map(str::trim)
        .filter(|value| !value.is_empty());
    let rows = notifications::list_logs(&mut conn, user.organization_id, event_type, page)?;
    Ok(Json(rows.into_iter().map(NotificationLogResponse::from).collect()))
}
