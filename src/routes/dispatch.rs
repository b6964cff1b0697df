use axum::{extract::State, http::StatusCode, Json};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    auth::{permissions::ServicePermission, AuthenticatedUser},
    error::AppResult,
    extract::{ApiJson, ApiPath, ApiQuery},
    models::{DispatchItem, DispatchOrder},
    services::dispatch::{
        self, CreateDispatchOrder, DispatchItemInput, DispatchOrderFilter, UpdateDispatchItem,
        UpdateDispatchOrder,
    },
    state::AppState,
    status::{DispatchItemStatus, DispatchStatus},
    utils::{
        json::nullable,
        time::{naive, now, opt_iso, to_iso},
    },
};

use super::page;

#[derive(Deserialize)]
pub struct DispatchItemRequest {
    pub product_id: Uuid,
    pub quantity: f64,
    pub unit: String,
    pub description: Option<String>,
    pub serial_numbers: Option<String>,
    pub batch_numbers: Option<String>,
}

#[derive(Deserialize)]
pub struct CreateOrderRequest {
    pub customer_id: Uuid,
    pub ticket_id: Option<Uuid>,
    pub delivery_address: String,
    pub delivery_contact_person: Option<String>,
    pub delivery_contact_number: Option<String>,
    pub expected_delivery_date: Option<DateTime<Utc>>,
    pub notes: Option<String>,
    pub tracking_number: Option<String>,
    pub courier_name: Option<String>,
    #[serde(default)]
    pub items: Vec<DispatchItemRequest>,
}

#[derive(Deserialize)]
pub struct UpdateOrderRequest {
    pub status: Option<DispatchStatus>,
    pub delivery_address: Option<String>,
    #[serde(default, deserialize_with = "nullable")]
    pub delivery_contact_person: Option<Option<String>>,
    #[serde(default, deserialize_with = "nullable")]
    pub delivery_contact_number: Option<Option<String>>,
    #[serde(default, deserialize_with = "nullable")]
    pub expected_delivery_date: Option<Option<DateTime<Utc>>>,
    #[serde(default, deserialize_with = "nullable")]
    pub notes: Option<Option<String>>,
    #[serde(default, deserialize_with = "nullable")]
    pub tracking_number: Option<Option<String>>,
    #[serde(default, deserialize_with = "nullable")]
    pub courier_name: Option<Option<String>>,
}

#[derive(Deserialize)]
pub struct UpdateItemRequest {
    pub status: Option<DispatchItemStatus>,
    pub quantity: Option<f64>,
    #[serde(default, deserialize_with = "nullable")]
    pub serial_numbers: Option<Option<String>>,
    #[serde(default, deserialize_with = "nullable")]
    pub batch_numbers: Option<Option<String>>,
}

#[derive(Deserialize, Default)]
pub struct OrderListParams {
    pub status: Option<DispatchStatus>,
    pub customer_id: Option<Uuid>,
    pub ticket_id: Option<Uuid>,
    pub from_date: Option<DateTime<Utc>>,
    pub to_date: Option<DateTime<Utc>>,
    pub skip: Option<i64>,
    pub limit: Option<i64>,
}

#[derive(Serialize)]
pub struct ItemResponse {
    pub id: Uuid,
    pub product_id: Uuid,
    pub quantity: f64,
    pub unit: String,
    pub description: Option<String>,
    pub serial_numbers: Option<String>,
    pub batch_numbers: Option<String>,
    pub status: String,
    pub created_at: String,
    pub updated_at: String,
}

impl From<DispatchItem> for ItemResponse {
    fn from(item: DispatchItem) -> Self {
        Self {
            id: item.id,
            product_id: item.product_id,
            quantity: item.quantity,
            unit: item.unit,
            description: item.description,
            serial_numbers: item.serial_numbers,
            batch_numbers: item.batch_numbers,
            status: item.status,
            created_at: to_iso(item.created_at),
            updated_at: to_iso(item.updated_at),
        }
    }
}

#[derive(Serialize)]
pub struct OrderResponse {
    pub id: Uuid,
    pub order_number: String,
    pub customer_id: Uuid,
    pub ticket_id: Option<Uuid>,
    pub status: String,
    pub dispatch_date: Option<String>,
    pub expected_delivery_date: Option<String>,
    pub actual_delivery_date: Option<String>,
    pub delivery_address: String,
    pub delivery_contact_person: Option<String>,
    pub delivery_contact_number: Option<String>,
    pub notes: Option<String>,
    pub tracking_number: Option<String>,
    pub courier_name: Option<String>,
    pub created_by_id: Option<Uuid>,
    pub updated_by_id: Option<Uuid>,
    pub created_at: String,
    pub updated_at: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub items: Option<Vec<ItemResponse>>,
}

impl OrderResponse {
    fn with_items(order: DispatchOrder, items: Vec<DispatchItem>) -> Self {
        let mut response = Self::from(order);
        response.items = Some(items.into_iter().map(ItemResponse::from).collect());
        response
    }
}

impl From<DispatchOrder> for OrderResponse {
    fn from(order: DispatchOrder) -> Self {
        Self {
            id: order.id,
            order_number: order.order_number,
            customer_id: order.customer_id,
            ticket_id: order.ticket_id,
            status: order.status,
            dispatch_date: opt_iso(order.dispatch_date),
            expected_delivery_date: opt_iso(order.expected_delivery_date),
            actual_delivery_date: opt_iso(order.actual_delivery_date),
            delivery_address: order.delivery_address,
            delivery_contact_person: order.delivery_contact_person,
            delivery_contact_number: order.delivery_contact_number,
            notes: order.notes,
            tracking_number: order.tracking_number,
            courier_name: order.courier_name,
            created_by_id: order.created_by_id,
            updated_by_id: order.updated_by_id,
            created_at: to_iso(order.created_at),
            updated_at: to_iso(order.updated_at),
            items: None,
        }
    }
}

pub async fn create_order(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    ApiJson(payload): ApiJson<CreateOrderRequest>,
) -> AppResult<(StatusCode, Json<OrderResponse>)> {
    let actor = user.require(ServicePermission::DispatchCreate)?;
    let input = CreateDispatchOrder {
        customer_id: payload.customer_id,
        ticket_id: payload.ticket_id,
        delivery_address: payload.delivery_address,
        delivery_contact_person: payload.delivery_contact_person,
        delivery_contact_number: payload.delivery_contact_number,
        expected_delivery_date: naive(payload.expected_delivery_date),
        notes: payload.notes,
        tracking_number: payload.tracking_number,
        courier_name: payload.courier_name,
        items: payload
            .items
            .into_iter()
            .map(|item| DispatchItemInput {
                product_id: item.product_id,
                quantity: item.quantity,
                unit: item.unit,
                description: item.description,
                serial_numbers: item.serial_numbers,
                batch_numbers: item.batch_numbers,
            })
            .collect(),
    };

    let mut conn = state.db()?;
    let (order, items) = dispatch::create_order(&mut conn, actor, input, now())?;
    Ok((StatusCode::CREATED, Json(OrderResponse::with_items(order, items))))
}

pub async fn list_orders(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    ApiQuery(params): ApiQuery<OrderListParams>,
) -> AppResult<Json<Vec<OrderResponse>>> {
    user.require(ServicePermission::DispatchRead)?;
    let page = page(params.skip, params.limit)?;
    let filter = DispatchOrderFilter {
        status: params.status,
        customer_id: params.customer_id,
        ticket_id: params.ticket_id,
        from_date: naive(params.from_date),
        to_date: naive(params.to_date),
    };
    let mut conn = state.db()?;
    let rows = dispatch::list_orders(&mut conn, user.organization_id, &filter, page)?;
    Ok(Json(rows.into_iter().map(OrderResponse::from).collect()))
}

pub async fn get_order(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    ApiPath(order_id): ApiPath<Uuid>,
) -> AppResult<Json<OrderResponse>> {
    user.require(ServicePermission::DispatchRead)?;
    let mut conn = state.db()?;
    let order = dispatch::get_order(&mut conn, user.organization_id, order_id)?;
    let items = dispatch::order_items(&mut conn, user.organization_id, order.id)?;
    Ok(Json(OrderResponse::with_items(order, items)))
}

pub async fn update_order(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    ApiPath(order_id): ApiPath<Uuid>,
    ApiJson(payload): ApiJson<UpdateOrderRequest>,
) -> AppResult<Json<OrderResponse>> {
    let actor = user.require(ServicePermission::DispatchUpdate)?;
    let update = UpdateDispatchOrder {
        status: payload.status,
        delivery_address: payload.delivery_address,
        delivery_contact_person: payload.delivery_contact_person,
        delivery_contact_number: payload.delivery_contact_number,
        expected_delivery_date: payload.expected_delivery_date.map(naive),
        notes: payload.notes,
        tracking_number: payload.tracking_number,
        courier_name: payload.courier_name,
    };
    let mut conn = state.db()?;
    let order = dispatch::update_order(&mut conn, actor, order_id, update, now())?;
    let items = dispatch::order_items(&mut conn, user.organization_id, order.id)?;
    Ok(Json(OrderResponse::with_items(order, items)))
}

pub async fn update_item(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    ApiPath((order_id, item_id)): ApiPath<(Uuid, Uuid)>,
    ApiJson(payload): ApiJson<UpdateItemRequest>,
) -> AppResult<Json<ItemResponse>> {
    let actor = user.require(ServicePermission::DispatchUpdate)?;
    let mut conn = state.db()?;
    let item = dispatch::update_item(
        &mut conn,
        actor,
        order_id,
        item_id,
        UpdateDispatchItem {
            status: payload.status,
            quantity: payload.quantity,
            serial_numbers: payload.serial_numbers,
            batch_numbers: payload.batch_numbers,
        },
    )?;
    Ok(Json(item.into()))
}

pub async fn delete_order(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    ApiPath(order_id): ApiPath<Uuid>,
) -> AppResult<StatusCode> {
    let actor = user.require(ServicePermission::DispatchDelete)?;
    let mut conn = state.db()?;
    dispatch::delete_order(&mut conn, actor, order_id)?;
    Ok(StatusCode::NO_CONTENT)
}
