use chrono::{NaiveDateTime, Utc};
use diesel::pg::PgConnection;
use diesel::prelude::*;
use uuid::Uuid;

use crate::{
    models::{NewTicket, NewTicketHistory, SlaTracking, Ticket, TicketHistory},
    numbering::{self, TICKET_PREFIX},
    schema::{ticket_history, tickets, users},
    status::{Priority, TicketStatus},
};

use super::{
    check_rating, check_transition, invalid, require_text,
    sla::{self, TicketAttributes},
    stored, Actor, Page, ServiceError, ServiceResult,
};

pub const DEFAULT_TICKET_TYPE: &str = "support";

#[derive(Debug, Clone)]
pub struct CreateTicket {
    pub customer_id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub priority: Priority,
    pub ticket_type: Option<String>,
    pub assigned_to_id: Option<Uuid>,
}

#[derive(Debug, Clone, Default)]
pub struct TicketFilter {
    pub status: Option<TicketStatus>,
    pub priority: Option<Priority>,
    pub assigned_to_id: Option<Uuid>,
    pub customer_id: Option<Uuid>,
}

struct HistoryEntry<'a> {
    action: &'a str,
    field: Option<&'a str>,
    old_value: Option<String>,
    new_value: Option<String>,
    comment: Option<String>,
}

fn write_history(
    conn: &mut PgConnection,
    actor: Actor,
    ticket_id: Uuid,
    entry: HistoryEntry<'_>,
) -> ServiceResult<()> {
    diesel::insert_into(ticket_history::table)
        .values(&NewTicketHistory {
            id: Uuid::new_v4(),
            organization_id: actor.organization_id,
            ticket_id,
            action: entry.action.to_string(),
            field_changed: entry.field.map(str::to_string),
            old_value: entry.old_value,
            new_value: entry.new_value,
            comment: entry.comment,
            changed_by_id: Some(actor.user_id),
        })
        .execute(conn)?;
    Ok(())
}

/// Fails unless `user_id` is an active user of the organization.
pub fn ensure_org_user(
    conn: &mut PgConnection,
    organization_id: Uuid,
    user_id: Uuid,
    message: &str,
) -> ServiceResult<()> {
    let exists: Option<Uuid> = users::table
        .filter(users::id.eq(user_id))
        .filter(users::organization_id.eq(organization_id))
        .filter(users::is_active.eq(true))
        .select(users::id)
        .first(conn)
        .optional()?;
    match exists {
        Some(_) => Ok(()),
        None => Err(invalid(message)),
    }
}

/// Creates the ticket and its SLA tracking row in one transaction.
pub fn create_ticket(
    conn: &mut PgConnection,
    actor: Actor,
    input: CreateTicket,
    now: NaiveDateTime,
) -> ServiceResult<(Ticket, SlaTracking)> {
    let title = require_text("title", &input.title)?;
    let ticket_type = input
        .ticket_type
        .as_deref()
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .unwrap_or(DEFAULT_TICKET_TYPE)
        .to_string();

    conn.transaction::<_, ServiceError, _>(|conn| {
        let tier = sla::customer_tier(conn, actor.organization_id, input.customer_id)?;
        if let Some(assignee) = input.assigned_to_id {
            ensure_org_user(
                conn,
                actor.organization_id,
                assignee,
                "Assignee not found in organization",
            )?;
        }

        let policy = sla::resolve_policy(
            conn,
            actor.organization_id,
            &TicketAttributes {
                priority: input.priority,
                ticket_type: &ticket_type,
                customer_tier: tier.as_deref(),
            },
        )?;
        let (_, resolution_deadline) = sla::compute_deadlines(
            now,
            policy.response_time_hours,
            policy.resolution_time_hours,
        )?;

        let ticket_number =
            numbering::next_number(conn, TICKET_PREFIX, actor.organization_id, now)?;
        let row = NewTicket {
            id: Uuid::new_v4(),
            organization_id: actor.organization_id,
            ticket_number,
            customer_id: input.customer_id,
            assigned_to_id: input.assigned_to_id,
            created_by_id: Some(actor.user_id),
            title,
            description: input.description,
            status: TicketStatus::Open.to_string(),
            priority: input.priority.to_string(),
            ticket_type,
            due_date: Some(resolution_deadline),
            created_at: now,
        };
        let ticket: Ticket = diesel::insert_into(tickets::table)
            .values(&row)
            .get_result(conn)?;

        let tracking = sla::attach_tracking(conn, &ticket, &policy)?;
        write_history(
            conn,
            actor,
            ticket.id,
            HistoryEntry {
                action: "created",
                field: None,
                old_value: None,
                new_value: Some(ticket.ticket_number.clone()),
                comment: Some(format!("SLA policy {}", policy.name)),
            },
        )?;

        tracing::info!(
            ticket_id = %ticket.id,
            ticket_number = %ticket.ticket_number,
            policy_id = %policy.id,
            "ticket created"
        );
        Ok((ticket, tracking))
    })
}

pub fn list_tickets(
    conn: &mut PgConnection,
    organization_id: Uuid,
    filter: &TicketFilter,
    page: Page,
) -> ServiceResult<Vec<Ticket>> {
    let mut query = tickets::table
        .filter(tickets::organization_id.eq(organization_id))
        .into_boxed();
    if let Some(status) = filter.status {
        query = query.filter(tickets::status.eq(status.as_str()));
    }
    if let Some(priority) = filter.priority {
        query = query.filter(tickets::priority.eq(priority.as_str()));
    }
    if let Some(assignee) = filter.assigned_to_id {
        query = query.filter(tickets::assigned_to_id.eq(assignee));
    }
    if let Some(customer) = filter.customer_id {
        query = query.filter(tickets::customer_id.eq(customer));
    }

    let rows = query
        .order(tickets::created_at.desc())
        .offset(page.skip)
        .limit(page.limit)
        .load(conn)?;
    Ok(rows)
}

pub fn get_ticket(
    conn: &mut PgConnection,
    organization_id: Uuid,
    ticket_id: Uuid,
) -> ServiceResult<Ticket> {
    tickets::table
        .filter(tickets::organization_id.eq(organization_id))
        .filter(tickets::id.eq(ticket_id))
        .first(conn)
        .optional()?
        .ok_or(ServiceError::NotFound("Ticket"))
}

fn lock_ticket(
    conn: &mut PgConnection,
    organization_id: Uuid,
    ticket_id: Uuid,
) -> ServiceResult<Ticket> {
    tickets::table
        .filter(tickets::organization_id.eq(organization_id))
        .filter(tickets::id.eq(ticket_id))
        .for_update()
        .first(conn)
        .optional()?
        .ok_or(ServiceError::NotFound("Ticket"))
}

pub fn assign_ticket(
    conn: &mut PgConnection,
    actor: Actor,
    ticket_id: Uuid,
    assignee_id: Uuid,
) -> ServiceResult<Ticket> {
    conn.transaction::<_, ServiceError, _>(|conn| {
        let ticket = lock_ticket(conn, actor.organization_id, ticket_id)?;
        let status: TicketStatus = stored(&ticket.status)?;
        if matches!(status, TicketStatus::Closed | TicketStatus::Cancelled) {
            return Err(invalid(format!("Cannot assign a {status} ticket")));
        }
        ensure_org_user(
            conn,
            actor.organization_id,
            assignee_id,
            "Assignee not found in organization",
        )?;

        let updated: Ticket = diesel::update(tickets::table.find(ticket.id))
            .set((
                tickets::assigned_to_id.eq(Some(assignee_id)),
                tickets::updated_at.eq(Utc::now().naive_utc()),
            ))
            .get_result(conn)?;

        write_history(
            conn,
            actor,
            ticket.id,
            HistoryEntry {
                action: "assigned",
                field: Some("assigned_to_id"),
                old_value: ticket.assigned_to_id.map(|id| id.to_string()),
                new_value: Some(assignee_id.to_string()),
                comment: None,
            },
        )?;
        Ok(updated)
    })
}

#[derive(Debug, Clone)]
pub struct StatusChange {
    pub status: TicketStatus,
    pub resolution: Option<String>,
    pub comment: Option<String>,
}

/// Moves the ticket through its lifecycle. Resolving records the SLA
/// resolution and reopening a resolved ticket clears it again, so the
/// resolution clock keeps running against the original deadline. Every
/// change re-evaluates escalation.
pub fn update_ticket_status(
    conn: &mut PgConnection,
    actor: Actor,
    ticket_id: Uuid,
    change: StatusChange,
    now: NaiveDateTime,
) -> ServiceResult<Ticket> {
    let ticket = conn.transaction::<_, ServiceError, _>(|conn| {
        let ticket = lock_ticket(conn, actor.organization_id, ticket_id)?;
        let current: TicketStatus = stored(&ticket.status)?;
        if !check_transition(current, change.status)? {
            return Ok(ticket);
        }

        let resolution = change
            .resolution
            .as_deref()
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .map(str::to_string);

        let reopened = current == TicketStatus::Resolved && change.status == TicketStatus::InProgress;
        let resolved_at = match change.status {
            TicketStatus::Resolved => Some(ticket.resolved_at.unwrap_or(now)),
            _ if reopened => None,
            _ => ticket.resolved_at,
        };
        let closed_at = match change.status {
            TicketStatus::Closed | TicketStatus::Cancelled => Some(ticket.closed_at.unwrap_or(now)),
            _ => ticket.closed_at,
        };

        let updated: Ticket = diesel::update(tickets::table.find(ticket.id))
            .set((
                tickets::status.eq(change.status.as_str()),
                tickets::resolution.eq(resolution.or(ticket.resolution.clone())),
                tickets::resolved_at.eq(resolved_at),
                tickets::closed_at.eq(closed_at),
                tickets::updated_at.eq(Utc::now().naive_utc()),
            ))
            .get_result(conn)?;

        if change.status == TicketStatus::Resolved {
            sla::record_resolution(conn, actor.organization_id, ticket.id, now)?;
        } else if reopened {
            sla::reopen_resolution(conn, actor.organization_id, ticket.id)?;
        }

        write_history(
            conn,
            actor,
            ticket.id,
            HistoryEntry {
                action: "status_changed",
                field: Some("status"),
                old_value: Some(current.to_string()),
                new_value: Some(change.status.to_string()),
                comment: change.comment,
            },
        )?;
        Ok(updated)
    })?;

    sla::check_escalation(conn, actor.organization_id, ticket.id, now)?;
    Ok(ticket)
}

/// Logs an agent response and records the SLA first response.
pub fn add_response(
    conn: &mut PgConnection,
    actor: Actor,
    ticket_id: Uuid,
    message: &str,
    now: NaiveDateTime,
) -> ServiceResult<SlaTracking> {
    let message = require_text("message", message)?;
    let tracking = conn.transaction::<_, ServiceError, _>(|conn| {
        let ticket = get_ticket(conn, actor.organization_id, ticket_id)?;
        let status: TicketStatus = stored(&ticket.status)?;
        if matches!(status, TicketStatus::Closed | TicketStatus::Cancelled) {
            return Err(invalid(format!("Cannot respond to a {status} ticket")));
        }
        let tracking = sla::record_first_response(conn, actor.organization_id, ticket.id, now)?;
        write_history(
            conn,
            actor,
            ticket.id,
            HistoryEntry {
                action: "responded",
                field: None,
                old_value: None,
                new_value: None,
                comment: Some(message),
            },
        )?;
        Ok(tracking)
    })?;

    let escalated = sla::check_escalation(conn, actor.organization_id, ticket_id, now)?;
    Ok(escalated.unwrap_or(tracking))
}

pub fn rate_ticket(
    conn: &mut PgConnection,
    actor: Actor,
    ticket_id: Uuid,
    rating: i32,
    feedback: Option<String>,
) -> ServiceResult<Ticket> {
    check_rating("rating", Some(rating))?;
    conn.transaction::<_, ServiceError, _>(|conn| {
        let ticket = lock_ticket(conn, actor.organization_id, ticket_id)?;
        let status: TicketStatus = stored(&ticket.status)?;
        if !matches!(status, TicketStatus::Resolved | TicketStatus::Closed) {
            return Err(invalid("Only resolved or closed tickets can be rated"));
        }

        let updated: Ticket = diesel::update(tickets::table.find(ticket.id))
            .set((
                tickets::customer_rating.eq(Some(rating)),
                tickets::customer_feedback.eq(feedback.clone()),
                tickets::updated_at.eq(Utc::now().naive_utc()),
            ))
            .get_result(conn)?;

        write_history(
            conn,
            actor,
            ticket.id,
            HistoryEntry {
                action: "rated",
                field: Some("customer_rating"),
                old_value: ticket.customer_rating.map(|r| r.to_string()),
                new_value: Some(rating.to_string()),
                comment: feedback,
            },
        )?;
        Ok(updated)
    })
}

pub fn list_history(
    conn: &mut PgConnection,
    organization_id: Uuid,
    ticket_id: Uuid,
) -> ServiceResult<Vec<TicketHistory>> {
    let ticket = get_ticket(conn, organization_id, ticket_id)?;
    let rows = ticket_history::table
        .filter(ticket_history::organization_id.eq(organization_id))
        .filter(ticket_history::ticket_id.eq(ticket.id))
        .order(ticket_history::created_at.asc())
        .load(conn)?;
    Ok(rows)
}
