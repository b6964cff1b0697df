use chrono::Utc;
use diesel::pg::PgConnection;
use diesel::prelude::*;
use uuid::Uuid;

use crate::{
    models::{Customer, NewCustomer, NewProduct, Product},
    schema::{customers, products},
};

use super::{require_text, Actor, Page, ServiceError, ServiceResult};

#[derive(Debug, Clone)]
pub struct CustomerInput {
    pub name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub tier: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct CustomerUpdate {
    pub name: Option<String>,
    pub email: Option<Option<String>>,
    pub phone: Option<Option<String>>,
    pub tier: Option<Option<String>>,
}

#[derive(AsChangeset)]
#[diesel(table_name = customers)]
struct CustomerChangeset {
    name: Option<String>,
    email: Option<Option<String>>,
    phone: Option<Option<String>>,
    tier: Option<Option<String>>,
    updated_at: chrono::NaiveDateTime,
}

fn optional_text(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

pub fn create_customer(
    conn: &mut PgConnection,
    actor: Actor,
    input: CustomerInput,
) -> ServiceResult<Customer> {
    let row = NewCustomer {
        id: Uuid::new_v4(),
        organization_id: actor.organization_id,
        name: require_text("name", &input.name)?,
        email: optional_text(input.email),
        phone: optional_text(input.phone),
        tier: optional_text(input.tier),
    };
    let customer = diesel::insert_into(customers::table)
        .values(&row)
        .get_result(conn)?;
    Ok(customer)
}

pub fn list_customers(
    conn: &mut PgConnection,
    organization_id: Uuid,
    page: Page,
) -> ServiceResult<Vec<Customer>> {
    let rows = customers::table
        .filter(customers::organization_id.eq(organization_id))
        .order(customers::name.asc())
        .offset(page.skip)
        .limit(page.limit)
        .load(conn)?;
    Ok(rows)
}

pub fn get_customer(
    conn: &mut PgConnection,
    organization_id: Uuid,
    customer_id: Uuid,
) -> ServiceResult<Customer> {
    customers::table
        .filter(customers::organization_id.eq(organization_id))
        .filter(customers::id.eq(customer_id))
        .first(conn)
        .optional()?
        .ok_or(ServiceError::NotFound("Customer"))
}

pub fn update_customer(
    conn: &mut PgConnection,
    actor: Actor,
    customer_id: Uuid,
    update: CustomerUpdate,
) -> ServiceResult<Customer> {
    let existing = get_customer(conn, actor.organization_id, customer_id)?;
    let changes = CustomerChangeset {
        name: update
            .name
            .as_deref()
            .map(|name| require_text("name", name))
            .transpose()?,
        email: update.email.map(optional_text),
        phone: update.phone.map(optional_text),
        tier: update.tier.map(optional_text),
        updated_at: Utc::now().naive_utc(),
    };
    let customer = diesel::update(customers::table.find(existing.id))
        .set(&changes)
        .get_result(conn)?;
    Ok(customer)
}

pub fn create_product(
    conn: &mut PgConnection,
    actor: Actor,
    name: &str,
    unit: &str,
) -> ServiceResult<Product> {
    let row = NewProduct {
        id: Uuid::new_v4(),
        organization_id: actor.organization_id,
        name: require_text("name", name)?,
        unit: require_text("unit", unit)?,
    };
    let product = diesel::insert_into(products::table)
        .values(&row)
        .get_result(conn)?;
    Ok(product)
}

pub fn list_products(
    conn: &mut PgConnection,
    organization_id: Uuid,
    page: Page,
) -> ServiceResult<Vec<Product>> {
    let rows = products::table
        .filter(products::organization_id.eq(organization_id))
        .order(products::name.asc())
        .offset(page.skip)
        .limit(page.limit)
        .load(conn)?;
    Ok(rows)
}

pub fn get_product(
    conn: &mut PgConnection,
    organization_id: Uuid,
    product_id: Uuid,
) -> ServiceResult<Product> {
    products::table
        .filter(products::organization_id.eq(organization_id))
        .filter(products::id.eq(product_id))
        .first(conn)
        .optional()?
        .ok_or(ServiceError::NotFound("Product"))
}
