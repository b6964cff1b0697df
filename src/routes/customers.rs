use axum::{extract::State, http::StatusCode, Json};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    auth::{permissions::ServicePermission, AuthenticatedUser},
    error::AppResult,
    extract::{ApiJson, ApiPath, ApiQuery},
    models::{Customer, Product},
    services::customers::{self, CustomerInput, CustomerUpdate},
    state::AppState,
    utils::{json::nullable, time::to_iso},
};

use super::PageParams;

#[derive(Deserialize)]
pub struct CreateCustomerRequest {
    pub name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub tier: Option<String>,
}

#[derive(Deserialize)]
pub struct UpdateCustomerRequest {
    pub name: Option<String>,
    #[serde(default, deserialize_with = "nullable")]
    pub email: Option<Option<String>>,
    #[serde(default, deserialize_with = "nullable")]
    pub phone: Option<Option<String>>,
    #[serde(default, deserialize_with = "nullable")]
    pub tier: Option<Option<String>>,
}

#[derive(Serialize)]
pub struct CustomerResponse {
    pub id: Uuid,
    pub name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub tier: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl From<Customer> for CustomerResponse {
    fn from(customer: Customer) -> Self {
        Self {
            id: customer.id,
            name: customer.name,
            email: customer.email,
            phone: customer.phone,
            tier: customer.tier,
            created_at: to_iso(customer.created_at),
            updated_at: to_iso(customer.updated_at),
        }
    }
}

#[derive(Deserialize)]
pub struct CreateProductRequest {
    pub name: String,
    pub unit: String,
}

#[derive(Serialize)]
pub struct ProductResponse {
    pub id: Uuid,
    pub name: String,
    pub unit: String,
    pub created_at: String,
}

impl From<Product> for ProductResponse {
    fn from(product: Product) -> Self {
        Self {
            id: product.id,
            name: product.name,
            unit: product.unit,
            created_at: to_iso(product.created_at),
        }
    }
}

pub async fn list_customers(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    ApiQuery(params): ApiQuery<PageParams>,
) -> AppResult<Json<Vec<CustomerResponse>>> {
    user.require(ServicePermission::CustomerServiceRead)?;
    let page = params.page()?;
    let mut conn = state.db()?;
    let rows = customers::list_customers(&mut conn, user.organization_id, page)?;
    Ok(Json(rows.into_iter().map(CustomerResponse::from).collect()))
}

pub async fn create_customer(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    ApiJson(payload): ApiJson<CreateCustomerRequest>,
) -> AppResult<(StatusCode, Json<CustomerResponse>)> {
    let actor = user.require(ServicePermission::CustomerServiceCreate)?;
    let mut conn = state.db()?;
    let customer = customers::create_customer(
        &mut conn,
        actor,
        CustomerInput {
            name: payload.name,
            email: payload.email,
            phone: payload.phone,
            tier: payload.tier,
        },
    )?;
    Ok((StatusCode::CREATED, Json(customer.into())))
}

pub async fn get_customer(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    ApiPath(customer_id): ApiPath<Uuid>,
) -> AppResult<Json<CustomerResponse>> {
    user.require(ServicePermission::CustomerServiceRead)?;
    let mut conn = state.db()?;
    let customer = customers::get_customer(&mut conn, user.organization_id, customer_id)?;
    Ok(Json(customer.into()))
}

pub async fn update_customer(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    ApiPath(customer_id): ApiPath<Uuid>,
    ApiJson(payload): ApiJson<UpdateCustomerRequest>,
) -> AppResult<Json<CustomerResponse>> {
    let actor = user.require(ServicePermission::CustomerServiceCreate)?;
    let mut conn = state.db()?;
    let customer = customers::update_customer(
        &mut conn,
        actor,
        customer_id,
        CustomerUpdate {
            name: payload.name,
            email: payload.email,
            phone: payload.phone,
            tier: payload.tier,
        },
    )?;
    Ok(Json(customer.into()))
}

pub async fn list_products(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    ApiQuery(params): ApiQuery<PageParams>,
) -> AppResult<Json<Vec<ProductResponse>>> {
    user.require(ServicePermission::CustomerServiceRead)?;
    let page = params.page()?;
    let mut conn = state.db()?;
    let rows = customers::list_products(&mut conn, user.organization_id, page)?;
    Ok(Json(rows.into_iter().map(ProductResponse::from).collect()))
}

pub async fn create_product(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    ApiJson(payload): ApiJson<CreateProductRequest>,
) -> AppResult<(StatusCode, Json<ProductResponse>)> {
    let actor = user.require(ServicePermission::CustomerServiceCreate)?;
    let mut conn = state.db()?;
    let product = customers::create_product(&mut conn, actor, &payload.name, &payload.unit)?;
    Ok((StatusCode::CREATED, Json(product.into())))
}
