use axum::{extract::State, http::StatusCode, Json};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    auth::{permissions::ServicePermission, AuthenticatedUser},
    error::AppResult,
    extract::{ApiJson, ApiPath, ApiQuery},
    models::{Ticket, TicketHistory},
    services::{
        sla,
        tickets::{self, CreateTicket, StatusChange, TicketFilter},
    },
    state::AppState,
    status::{Priority, TicketStatus},
    utils::time::{now, opt_iso, to_iso},
};

use super::{page, sla::TrackingResponse};

#[derive(Deserialize)]
pub struct CreateTicketRequest {
    pub customer_id: Uuid,
    pub title: String,
    pub description: Option<String>,
    #[serde(default)]
    pub priority: Priority,
    pub ticket_type: Option<String>,
    pub assigned_to_id: Option<Uuid>,
}

#[derive(Deserialize, Default)]
pub struct TicketListParams {
    pub status: Option<TicketStatus>,
    pub priority: Option<Priority>,
    pub assigned_to_id: Option<Uuid>,
    pub customer_id: Option<Uuid>,
    pub skip: Option<i64>,
    pub limit: Option<i64>,
}

#[derive(Deserialize)]
pub struct AssignTicketRequest {
    pub assigned_to_id: Uuid,
}

#[derive(Deserialize)]
pub struct TicketStatusRequest {
    pub status: TicketStatus,
    pub resolution: Option<String>,
    pub comment: Option<String>,
}

#[derive(Deserialize)]
pub struct TicketResponseRequest {
    pub message: String,
}

#[derive(Deserialize)]
pub struct RateTicketRequest {
    pub rating: i32,
    pub feedback: Option<String>,
}

#[derive(Serialize)]
pub struct TicketResponse {
    pub id: Uuid,
    pub ticket_number: String,
    pub customer_id: Uuid,
    pub assigned_to_id: Option<Uuid>,
    pub created_by_id: Option<Uuid>,
    pub title: String,
    pub description: Option<String>,
    pub status: String,
    pub priority: String,
    pub ticket_type: String,
    pub resolution: Option<String>,
    pub resolved_at: Option<String>,
    pub closed_at: Option<String>,
    pub due_date: Option<String>,
    pub customer_rating: Option<i32>,
    pub customer_feedback: Option<String>,
    pub created_at: String,
    pub updated_at: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sla: Option<TrackingResponse>,
}

impl From<Ticket> for TicketResponse {
    fn from(ticket: Ticket) -> Self {
        Self {
            id: ticket.id,
            ticket_number: ticket.ticket_number,
            customer_id: ticket.customer_id,
            assigned_to_id: ticket.assigned_to_id,
            created_by_id: ticket.created_by_id,
            title: ticket.title,
            description: ticket.description,
            status: ticket.status,
            priority: ticket.priority,
            ticket_type: ticket.ticket_type,
            resolution: ticket.resolution,
            resolved_at: opt_iso(ticket.resolved_at),
            closed_at: opt_iso(ticket.closed_at),
            due_date: opt_iso(ticket.due_date),
            customer_rating: ticket.customer_rating,
            customer_feedback: ticket.customer_feedback,
            created_at: to_iso(ticket.created_at),
            updated_at: to_iso(ticket.updated_at),
            sla: None,
        }
    }
}

#[derive(Serialize)]
pub struct HistoryResponse {
    pub id: Uuid,
    pub action: String,
    pub field_changed: Option<String>,
    pub old_value: Option<String>,
    pub new_value: Option<String>,
    pub comment: Option<String>,
    pub changed_by_id: Option<Uuid>,
    pub created_at: String,
}

impl From<TicketHistory> for HistoryResponse {
    fn from(entry: TicketHistory) -> Self {
        Self {
            id: entry.id,
            action: entry.action,
            field_changed: entry.field_changed,
            old_value: entry.old_value,
            new_value: entry.new_value,
            comment: entry.comment,
            changed_by_id: entry.changed_by_id,
            created_at: to_iso(entry.created_at),
        }
    }
}

pub async fn create_ticket(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    ApiJson(payload): ApiJson<CreateTicketRequest>,
) -> AppResult<(StatusCode, Json<TicketResponse>)> {
    let actor = user.require(ServicePermission::TicketCreate)?;
    let mut conn = state.db()?;
    let (ticket, tracking) = tickets::create_ticket(
        &mut conn,
        actor,
        CreateTicket {
            customer_id: payload.customer_id,
            title: payload.title,
            description: payload.description,
            priority: payload.priority,
            ticket_type: payload.ticket_type,
            assigned_to_id: payload.assigned_to_id,
        },
        now(),
    )?;
    let mut response = TicketResponse::from(ticket);
    response.sla = Some(tracking.into());
    Ok((StatusCode::CREATED, Json(response)))
}

pub async fn list_tickets(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    ApiQuery(params): ApiQuery<TicketListParams>,
) -> AppResult<Json<Vec<TicketResponse>>> {
    user.require(ServicePermission::TicketRead)?;
    let page = page(params.skip, params.limit)?;
    let filter = TicketFilter {
        status: params.status,
        priority: params.priority,
        assigned_to_id: params.assigned_to_id,
        customer_id: params.customer_id,
    };
    let mut conn = state.db()?;
    let rows = tickets::list_tickets(&mut conn, user.organization_id, &filter, page)?;
    Ok(Json(rows.into_iter().map(TicketResponse::from).collect()))
}

pub async fn get_ticket(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    ApiPath(ticket_id): ApiPath<Uuid>,
) -> AppResult<Json<TicketResponse>> {
    user.require(ServicePermission::TicketRead)?;
    let mut conn = state.db()?;
    let ticket = tickets::get_ticket(&mut conn, user.organization_id, ticket_id)?;
    let tracking = sla::tracking_for_ticket(&mut conn, user.organization_id, ticket.id)?;
    let mut response = TicketResponse::from(ticket);
    response.sla = Some(tracking.into());
    Ok(Json(response))
}

pub async fn assign_ticket(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    ApiPath(ticket_id): ApiPath<Uuid>,
    ApiJson(payload): ApiJson<AssignTicketRequest>,
) -> AppResult<Json<TicketResponse>> {
    let actor = user.require(ServicePermission::TicketUpdate)?;
    let mut conn = state.db()?;
    let ticket = tickets::assign_ticket(&mut conn, actor, ticket_id, payload.assigned_to_id)?;
    Ok(Json(ticket.into()))
}

pub async fn update_status(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    ApiPath(ticket_id): ApiPath<Uuid>,
    ApiJson(payload): ApiJson<TicketStatusRequest>,
) -> AppResult<Json<TicketResponse>> {
    let actor = user.require(ServicePermission::TicketUpdate)?;
    let mut conn = state.db()?;
    let ticket = tickets::update_ticket_status(
        &mut conn,
        actor,
        ticket_id,
        StatusChange {
            status: payload.status,
            resolution: payload.resolution,
            comment: payload.comment,
        },
        now(),
    )?;
    Ok(Json(ticket.into()))
}

/// Records an agent response; the first one stamps the SLA response time.
pub async fn add_response(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    ApiPath(ticket_id): ApiPath<Uuid>,
    ApiJson(payload): ApiJson<TicketResponseRequest>,
) -> AppResult<(StatusCode, Json<TrackingResponse>)> {
    let actor = user.require(ServicePermission::TicketUpdate)?;
    let mut conn = state.db()?;
    let tracking = tickets::add_response(&mut conn, actor, ticket_id, &payload.message, now())?;
    Ok((StatusCode::CREATED, Json(tracking.into())))
}

pub async fn rate_ticket(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    ApiPath(ticket_id): ApiPath<Uuid>,
    ApiJson(payload): ApiJson<RateTicketRequest>,
) -> AppResult<Json<TicketResponse>> {
    let actor = user.require(ServicePermission::TicketUpdate)?;
    let mut conn = state.db()?;
    let ticket =
        tickets::rate_ticket(&mut conn, actor, ticket_id, payload.rating, payload.feedback)?;
    Ok(Json(ticket.into()))
}

pub async fn get_ticket_sla(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    ApiPath(ticket_id): ApiPath<Uuid>,
) -> AppResult<Json<TrackingResponse>> {
    user.require(ServicePermission::SlaRead)?;
    let mut conn = state.db()?;
    let ticket = tickets::get_ticket(&mut conn, user.organization_id, ticket_id)?;
    let tracking = sla::tracking_for_ticket(&mut conn, user.organization_id, ticket.id)?;
    Ok(Json(tracking.into()))
}

pub async fn ticket_history(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    ApiPath(ticket_id): ApiPath<Uuid>,
) -> AppResult<Json<Vec<HistoryResponse>>> {
    user.require(ServicePermission::TicketRead)?;
    let mut conn = state.db()?;
    let rows = tickets::list_history(&mut conn, user.organization_id, ticket_id)?;
    Ok(Json(rows.into_iter().map(HistoryResponse::from).collect()))
}
