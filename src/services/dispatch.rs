use chrono::{NaiveDateTime, Utc};
use diesel::pg::PgConnection;
use diesel::prelude::*;
use uuid::Uuid;

use crate::{
    models::{DispatchItem, DispatchOrder, NewDispatchItem, NewDispatchOrder},
    numbering::{self, DISPATCH_ORDER_PREFIX},
    schema::{customers, dispatch_items, dispatch_orders, installation_jobs, products, tickets},
    status::{DispatchItemStatus, DispatchStatus},
};

use super::{
    check_transition, invalid, require_text, stored, Actor, Page, ServiceError, ServiceResult,
};

#[derive(Debug, Clone)]
pub struct DispatchItemInput {
    pub product_id: Uuid,
    pub quantity: f64,
    pub unit: String,
    pub description: Option<String>,
    pub serial_numbers: Option<String>,
    pub batch_numbers: Option<String>,
}

#[derive(Debug, Clone)]
pub struct CreateDispatchOrder {
    pub customer_id: Uuid,
    pub ticket_id: Option<Uuid>,
    pub delivery_address: String,
    pub delivery_contact_person: Option<String>,
    pub delivery_contact_number: Option<String>,
    pub expected_delivery_date: Option<NaiveDateTime>,
    pub notes: Option<String>,
    pub tracking_number: Option<String>,
    pub courier_name: Option<String>,
    pub items: Vec<DispatchItemInput>,
}

#[derive(Debug, Clone, Default)]
pub struct UpdateDispatchOrder {
    pub status: Option<DispatchStatus>,
    pub delivery_address: Option<String>,
    pub delivery_contact_person: Option<Option<String>>,
    pub delivery_contact_number: Option<Option<String>>,
    pub expected_delivery_date: Option<Option<NaiveDateTime>>,
    pub notes: Option<Option<String>>,
    pub tracking_number: Option<Option<String>>,
    pub courier_name: Option<Option<String>>,
}

#[derive(AsChangeset)]
#[diesel(table_name = dispatch_orders)]
struct DispatchOrderChangeset {
    delivery_address: Option<String>,
    delivery_contact_person: Option<Option<String>>,
    delivery_contact_number: Option<Option<String>>,
    expected_delivery_date: Option<Option<NaiveDateTime>>,
    notes: Option<Option<String>>,
    tracking_number: Option<Option<String>>,
    courier_name: Option<Option<String>>,
    updated_by_id: Option<Uuid>,
    updated_at: NaiveDateTime,
}

#[derive(Debug, Clone, Default)]
pub struct UpdateDispatchItem {
    pub status: Option<DispatchItemStatus>,
    pub quantity: Option<f64>,
    pub serial_numbers: Option<Option<String>>,
    pub batch_numbers: Option<Option<String>>,
}

#[derive(AsChangeset)]
#[diesel(table_name = dispatch_items)]
struct DispatchItemChangeset {
    status: Option<String>,
    quantity: Option<f64>,
    serial_numbers: Option<Option<String>>,
    batch_numbers: Option<Option<String>>,
    updated_at: NaiveDateTime,
}

#[derive(Debug, Clone, Default)]
pub struct DispatchOrderFilter {
    pub status: Option<DispatchStatus>,
    pub customer_id: Option<Uuid>,
    pub ticket_id: Option<Uuid>,
    pub from_date: Option<NaiveDateTime>,
    pub to_date: Option<NaiveDateTime>,
}

fn check_quantity(quantity: f64) -> ServiceResult<()> {
    if !quantity.is_finite() || quantity <= 0.0 {
        return Err(invalid("Item quantity must be greater than 0"));
    }
    Ok(())
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

fn ensure_ticket(conn: &mut PgConnection, organization_id: Uuid, id: Uuid) -> ServiceResult<()> {
    let found: Option<Uuid> = tickets::table
        .filter(tickets::organization_id.eq(organization_id))
        .filter(tickets::id.eq(id))
        .select(tickets::id)
        .first(conn)
        .optional()?;
    found.map(|_| ()).ok_or(ServiceError::NotFound("Ticket"))
}

fn ensure_products(
    conn: &mut PgConnection,
    organization_id: Uuid,
    items: &[DispatchItemInput],
) -> ServiceResult<()> {
    let mut wanted: Vec<Uuid> = items.iter().map(|item| item.product_id).collect();
    wanted.sort();
    wanted.dedup();

    let found: i64 = products::table
        .filter(products::organization_id.eq(organization_id))
        .filter(products::id.eq_any(&wanted))
        .count()
        .get_result(conn)?;
    if found as usize != wanted.len() {
        return Err(ServiceError::NotFound("Product"));
    }
    Ok(())
}

/// Creates an order with its items and a fresh `DO/{FY}/{seq}` number in
/// a single transaction.
pub fn create_order(
    conn: &mut PgConnection,
    actor: Actor,
    input: CreateDispatchOrder,
    now: NaiveDateTime,
) -> ServiceResult<(DispatchOrder, Vec<DispatchItem>)> {
    if input.items.is_empty() {
        return Err(invalid("At least one item is required"));
    }
    let delivery_address = require_text("delivery_address", &input.delivery_address)?;
    for item in &input.items {
        check_quantity(item.quantity)?;
        require_text("unit", &item.unit)?;
    }

    conn.transaction::<_, ServiceError, _>(|conn| {
        ensure_customer(conn, actor.organization_id, input.customer_id)?;
        if let Some(ticket_id) = input.ticket_id {
            ensure_ticket(conn, actor.organization_id, ticket_id)?;
        }
        ensure_products(conn, actor.organization_id, &input.items)?;

        let order_number =
            numbering::next_number(conn, DISPATCH_ORDER_PREFIX, actor.organization_id, now)?;
        let order: DispatchOrder = diesel::insert_into(dispatch_orders::table)
            .values(&NewDispatchOrder {
                id: Uuid::new_v4(),
                organization_id: actor.organization_id,
                order_number,
                customer_id: input.customer_id,
                ticket_id: input.ticket_id,
                status: DispatchStatus::Pending.to_string(),
                expected_delivery_date: input.expected_delivery_date,
                delivery_address,
                delivery_contact_person: input.delivery_contact_person,
                delivery_contact_number: input.delivery_contact_number,
                notes: input.notes,
                tracking_number: input.tracking_number,
                courier_name: input.courier_name,
                created_by_id: Some(actor.user_id),
            })
            .get_result(conn)?;

        let rows: Vec<NewDispatchItem> = input
            .items
            .into_iter()
            .map(|item| NewDispatchItem {
                id: Uuid::new_v4(),
                organization_id: actor.organization_id,
                dispatch_order_id: order.id,
                product_id: item.product_id,
                quantity: item.quantity,
                unit: item.unit.trim().to_string(),
                description: item.description,
                serial_numbers: item.serial_numbers,
                batch_numbers: item.batch_numbers,
                status: DispatchItemStatus::Pending.to_string(),
            })
            .collect();
        let items: Vec<DispatchItem> = diesel::insert_into(dispatch_items::table)
            .values(&rows)
            .get_results(conn)?;

        tracing::info!(
            order_id = %order.id,
            order_number = %order.order_number,
            items = items.len(),
            user_id = %actor.user_id,
            "dispatch order created"
        );
        Ok((order, items))
    })
}

pub fn list_orders(
    conn: &mut PgConnection,
    organization_id: Uuid,
    filter: &DispatchOrderFilter,
    page: Page,
) -> ServiceResult<Vec<DispatchOrder>> {
    let mut query = dispatch_orders::table
        .filter(dispatch_orders::organization_id.eq(organization_id))
        .into_boxed();
    if let Some(status) = filter.status {
        query = query.filter(dispatch_orders::status.eq(status.as_str()));
    }
    if let Some(customer_id) = filter.customer_id {
        query = query.filter(dispatch_orders::customer_id.eq(customer_id));
    }
    if let Some(ticket_id) = filter.ticket_id {
        query = query.filter(dispatch_orders::ticket_id.eq(ticket_id));
    }
    if let Some(from) = filter.from_date {
        query = query.filter(dispatch_orders::created_at.ge(from));
    }
    if let Some(to) = filter.to_date {
        query = query.filter(dispatch_orders::created_at.le(to));
    }

    let rows = query
        .order(dispatch_orders::created_at.desc())
        .offset(page.skip)
        .limit(page.limit)
        .load(conn)?;
    Ok(rows)
}

pub fn get_order(
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

fn lock_order(
    conn: &mut PgConnection,
    organization_id: Uuid,
    order_id: Uuid,
) -> ServiceResult<DispatchOrder> {
    dispatch_orders::table
        .filter(dispatch_orders::organization_id.eq(organization_id))
        .filter(dispatch_orders::id.eq(order_id))
        .for_update()
        .first(conn)
        .optional()?
        .ok_or(ServiceError::NotFound("Dispatch order"))
}

pub fn order_items(
    conn: &mut PgConnection,
    organization_id: Uuid,
    order_id: Uuid,
) -> ServiceResult<Vec<DispatchItem>> {
    let rows = dispatch_items::table
        .filter(dispatch_items::organization_id.eq(organization_id))
        .filter(dispatch_items::dispatch_order_id.eq(order_id))
        .order(dispatch_items::created_at.asc())
        .load(conn)?;
    Ok(rows)
}

/// Applies a status change. Entering `in_transit` stamps `dispatch_date` and
/// entering `delivered` stamps `actual_delivery_date`, each only if unset.
pub fn update_dispatch_status(
    conn: &mut PgConnection,
    actor: Actor,
    order_id: Uuid,
    status: DispatchStatus,
    now: NaiveDateTime,
) -> ServiceResult<DispatchOrder> {
    conn.transaction::<_, ServiceError, _>(|conn| {
        let order = lock_order(conn, actor.organization_id, order_id)?;
        let current: DispatchStatus = stored(&order.status)?;
        if !check_transition(current, status)? {
            return Ok(order);
        }

        let dispatch_date = match status {
            DispatchStatus::InTransit => Some(order.dispatch_date.unwrap_or(now)),
            _ => order.dispatch_date,
        };
        let actual_delivery_date = match status {
            DispatchStatus::Delivered => Some(order.actual_delivery_date.unwrap_or(now)),
            _ => order.actual_delivery_date,
        };

        let updated: DispatchOrder = diesel::update(dispatch_orders::table.find(order.id))
            .set((
                dispatch_orders::status.eq(status.as_str()),
                dispatch_orders::dispatch_date.eq(dispatch_date),
                dispatch_orders::actual_delivery_date.eq(actual_delivery_date),
                dispatch_orders::updated_by_id.eq(Some(actor.user_id)),
                dispatch_orders::updated_at.eq(Utc::now().naive_utc()),
            ))
            .get_result(conn)?;

        tracing::info!(
            order_id = %order.id,
            from = %current,
            to = %status,
            "dispatch order status updated"
        );
        Ok(updated)
    })
}

pub fn update_order(
    conn: &mut PgConnection,
    actor: Actor,
    order_id: Uuid,
    update: UpdateDispatchOrder,
    now: NaiveDateTime,
) -> ServiceResult<DispatchOrder> {
    conn.transaction::<_, ServiceError, _>(|conn| {
        let order = lock_order(conn, actor.organization_id, order_id)?;

        let delivery_address = update
            .delivery_address
            .as_deref()
            .map(|value| require_text("delivery_address", value))
            .transpose()?;
        let changes = DispatchOrderChangeset {
            delivery_address,
            delivery_contact_person: update.delivery_contact_person,
            delivery_contact_number: update.delivery_contact_number,
            expected_delivery_date: update.expected_delivery_date,
            notes: update.notes,
            tracking_number: update.tracking_number,
            courier_name: update.courier_name,
            updated_by_id: Some(actor.user_id),
            updated_at: Utc::now().naive_utc(),
        };
        let updated: DispatchOrder = diesel::update(dispatch_orders::table.find(order.id))
            .set(&changes)
            .get_result(conn)?;

        match update.status {
            Some(status) => update_dispatch_status(conn, actor, order_id, status, now),
            None => Ok(updated),
        }
    })
}

pub fn update_item(
    conn: &mut PgConnection,
    actor: Actor,
    order_id: Uuid,
    item_id: Uuid,
    update: UpdateDispatchItem,
) -> ServiceResult<DispatchItem> {
    conn.transaction::<_, ServiceError, _>(|conn| {
        let order = lock_order(conn, actor.organization_id, order_id)?;
        let item: DispatchItem = dispatch_items::table
            .filter(dispatch_items::organization_id.eq(actor.organization_id))
            .filter(dispatch_items::dispatch_order_id.eq(order.id))
            .filter(dispatch_items::id.eq(item_id))
            .first(conn)
            .optional()?
            .ok_or(ServiceError::NotFound("Dispatch item"))?;

        if let Some(quantity) = update.quantity {
            check_quantity(quantity)?;
            if stored::<DispatchStatus>(&order.status)? != DispatchStatus::Pending {
                return Err(invalid(
                    "Item quantity can only change while the order is pending",
                ));
            }
        }

        let status = match update.status {
            Some(next) => {
                let current: DispatchItemStatus = stored(&item.status)?;
                check_transition(current, next)?.then(|| next.to_string())
            }
            None => None,
        };

        let changes = DispatchItemChangeset {
            status,
            quantity: update.quantity,
            serial_numbers: update.serial_numbers,
            batch_numbers: update.batch_numbers,
            updated_at: Utc::now().naive_utc(),
        };
        let updated = diesel::update(dispatch_items::table.find(item.id))
            .set(&changes)
            .get_result(conn)?;
        Ok(updated)
    })
}

/// Only pending orders without installation jobs can be removed.
pub fn delete_order(conn: &mut PgConnection, actor: Actor, order_id: Uuid) -> ServiceResult<()> {
    conn.transaction::<_, ServiceError, _>(|conn| {
        let order = lock_order(conn, actor.organization_id, order_id)?;
        if stored::<DispatchStatus>(&order.status)? != DispatchStatus::Pending {
            return Err(invalid("Can only delete dispatch orders in pending status"));
        }
        let jobs: i64 = installation_jobs::table
            .filter(installation_jobs::dispatch_order_id.eq(order.id))
            .count()
            .get_result(conn)?;
        if jobs > 0 {
            return Err(invalid(
                "Cannot delete a dispatch order that has installation jobs",
            ));
        }

        diesel::delete(dispatch_orders::table.find(order.id)).execute(conn)?;
        tracing::info!(order_id = %order.id, user_id = %actor.user_id, "dispatch order deleted");
        Ok(())
    })
}
