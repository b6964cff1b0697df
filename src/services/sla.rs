//! SLA tracker: deadline computation, breach evaluation, escalation and
//! policy management.

use std::cmp::Reverse;

use chrono::{Duration, NaiveDateTime, Utc};
use diesel::pg::PgConnection;
use diesel::prelude::*;
use diesel::result::{DatabaseErrorKind, Error as DieselError};
use serde_json::json;
use uuid::Uuid;

use crate::{
    models::{
        NewSlaPolicy, NewSlaTracking, NewTicketHistory, SlaPolicy, SlaTracking, Ticket,
    },
    schema::{customers, sla_policies, sla_tracking, ticket_history, tickets, users},
    status::{Priority, SlaStatus, TicketStatus},
};

use super::{
    invalid,
    notifications::{self, NotificationPayload, EVENT_SLA_ESCALATED},
    require_text, Actor, ServiceError, ServiceResult,
};

const MILLIS_PER_HOUR: f64 = 3_600_000.0;

/// Upper bound for policy response and resolution windows (ten years).
pub const MAX_SLA_HOURS: f64 = 87_600.0;

/// `None` when `value` hours cannot be represented as a duration.
pub fn hours(value: f64) -> Option<Duration> {
    let millis = (value * MILLIS_PER_HOUR).round();
    if !millis.is_finite() || millis.abs() >= i64::MAX as f64 {
        return None;
    }
    Duration::try_milliseconds(millis as i64)
}

/// Signed number of hours from `from` to `to`.
pub fn hours_between(from: NaiveDateTime, to: NaiveDateTime) -> f64 {
    (to - from).num_milliseconds() as f64 / MILLIS_PER_HOUR
}

fn deadline_after(started_at: NaiveDateTime, window_hours: f64) -> ServiceResult<NaiveDateTime> {
    hours(window_hours)
        .and_then(|window| started_at.checked_add_signed(window))
        .ok_or_else(|| invalid(format!("SLA window of {window_hours} hours is out of range")))
}

pub fn compute_deadlines(
    started_at: NaiveDateTime,
    response_time_hours: f64,
    resolution_time_hours: f64,
) -> ServiceResult<(NaiveDateTime, NaiveDateTime)> {
    Ok((
        deadline_after(started_at, response_time_hours)?,
        deadline_after(started_at, resolution_time_hours)?,
    ))
}

/// Breach hours are `actual - deadline`; zero or negative means the deadline
/// was met.
pub fn evaluate(actual: NaiveDateTime, deadline: NaiveDateTime) -> (f64, SlaStatus) {
    let breach = hours_between(deadline, actual);
    let status = if breach <= 0.0 {
        SlaStatus::Met
    } else {
        SlaStatus::Breached
    };
    (breach, status)
}

pub fn elapsed_percent(
    started_at: NaiveDateTime,
    now: NaiveDateTime,
    resolution_time_hours: f64,
) -> f64 {
    if resolution_time_hours <= 0.0 {
        return 100.0;
    }
    hours_between(started_at, now) / resolution_time_hours * 100.0
}

pub fn should_escalate(policy: &SlaPolicy, tracking: &SlaTracking, now: NaiveDateTime) -> bool {
    policy.escalation_enabled
        && !tracking.escalation_triggered
        && tracking.resolved_at.is_none()
        && elapsed_percent(tracking.started_at, now, policy.resolution_time_hours)
            >= policy.escalation_threshold_percent
}

/// Ticket attributes that SLA policy filters are matched against.
#[derive(Debug, Clone, Copy)]
pub struct TicketAttributes<'a> {
    pub priority: Priority,
    pub ticket_type: &'a str,
    pub customer_tier: Option<&'a str>,
}

fn filter_matches(filter: Option<&str>, value: Option<&str>) -> bool {
    match filter {
        None => true,
        Some(expected) => value == Some(expected),
    }
}

fn specificity(policy: &SlaPolicy) -> usize {
    [
        policy.priority.is_some(),
        policy.ticket_type.is_some(),
        policy.customer_tier.is_some(),
    ]
    .iter()
    .filter(|set| **set)
    .count()
}

pub fn policy_matches(policy: &SlaPolicy, attrs: &TicketAttributes<'_>) -> bool {
    filter_matches(policy.priority.as_deref(), Some(attrs.priority.as_str()))
        && filter_matches(policy.ticket_type.as_deref(), Some(attrs.ticket_type))
        && filter_matches(policy.customer_tier.as_deref(), attrs.customer_tier)
}

/// Picks the policy for a ticket.
///
/// Among active policies whose every set filter matches, the one with the
/// most filters wins. Ties prefer the default policy, then the oldest, then
/// the lowest id. Without any match the active default applies.
pub fn select_policy<'a>(
    policies: &'a [SlaPolicy],
    attrs: &TicketAttributes<'_>,
) -> Option<&'a SlaPolicy> {
    policies
        .iter()
        .filter(|policy| policy.is_active && policy_matches(policy, attrs))
        .min_by_key(|policy| {
            (
                Reverse(specificity(policy)),
                !policy.is_default,
                policy.created_at,
                policy.id,
            )
        })
        .or_else(|| {
            policies
                .iter()
                .find(|policy| policy.is_active && policy.is_default)
        })
}

pub fn resolve_policy(
    conn: &mut PgConnection,
    organization_id: Uuid,
    attrs: &TicketAttributes<'_>,
) -> ServiceResult<SlaPolicy> {
    let policies: Vec<SlaPolicy> = sla_policies::table
        .filter(sla_policies::organization_id.eq(organization_id))
        .filter(sla_policies::is_active.eq(true))
        .load(conn)?;

    select_policy(&policies, attrs)
        .cloned()
        .ok_or_else(|| invalid("No applicable SLA policy"))
}

/// Creates the tracking row for a freshly inserted ticket. Deadlines are
/// anchored on the ticket's creation time and never change afterwards.
pub fn attach_tracking(
    conn: &mut PgConnection,
    ticket: &Ticket,
    policy: &SlaPolicy,
) -> ServiceResult<SlaTracking> {
    let (response_deadline, resolution_deadline) = compute_deadlines(
        ticket.created_at,
        policy.response_time_hours,
        policy.resolution_time_hours,
    )?;

    let row = NewSlaTracking {
        id: Uuid::new_v4(),
        organization_id: ticket.organization_id,
        ticket_id: ticket.id,
        policy_id: policy.id,
        started_at: ticket.created_at,
        response_deadline,
        resolution_deadline,
        response_status: SlaStatus::Pending.to_string(),
        resolution_status: SlaStatus::Pending.to_string(),
    };

    let tracking = diesel::insert_into(sla_tracking::table)
        .values(&row)
        .get_result(conn)?;
    Ok(tracking)
}

pub fn tracking_for_ticket(
    conn: &mut PgConnection,
    organization_id: Uuid,
    ticket_id: Uuid,
) -> ServiceResult<SlaTracking> {
    sla_tracking::table
        .filter(sla_tracking::organization_id.eq(organization_id))
        .filter(sla_tracking::ticket_id.eq(ticket_id))
        .first(conn)
        .optional()?
        .ok_or_else(|| ServiceError::Integrity(format!("ticket {ticket_id} has no SLA tracking")))
}

fn lock_tracking(
    conn: &mut PgConnection,
    organization_id: Uuid,
    ticket_id: Uuid,
) -> ServiceResult<SlaTracking> {
    sla_tracking::table
        .filter(sla_tracking::organization_id.eq(organization_id))
        .filter(sla_tracking::ticket_id.eq(ticket_id))
        .for_update()
        .first(conn)
        .optional()?
        .ok_or_else(|| ServiceError::Integrity(format!("ticket {ticket_id} has no SLA tracking")))
}

/// Records the first agent response. A second call leaves the stored
/// response untouched.
pub fn record_first_response(
    conn: &mut PgConnection,
    organization_id: Uuid,
    ticket_id: Uuid,
    responded_at: NaiveDateTime,
) -> ServiceResult<SlaTracking> {
    conn.transaction::<_, ServiceError, _>(|conn| {
        let tracking = lock_tracking(conn, organization_id, ticket_id)?;
        if tracking.first_response_at.is_some() {
            return Ok(tracking);
        }

        let (breach, status) = evaluate(responded_at, tracking.response_deadline);
        let updated = diesel::update(sla_tracking::table.find(tracking.id))
            .set((
                sla_tracking::first_response_at.eq(Some(responded_at)),
                sla_tracking::response_breach_hours.eq(Some(breach)),
                sla_tracking::response_status.eq(status.as_str()),
                sla_tracking::updated_at.eq(Utc::now().naive_utc()),
            ))
            .get_result(conn)?;
        Ok(updated)
    })
}

pub fn record_resolution(
    conn: &mut PgConnection,
    organization_id: Uuid,
    ticket_id: Uuid,
    resolved_at: NaiveDateTime,
) -> ServiceResult<SlaTracking> {
    conn.transaction::<_, ServiceError, _>(|conn| {
        let tracking = lock_tracking(conn, organization_id, ticket_id)?;
        if tracking.resolved_at.is_some() {
            return Ok(tracking);
        }

        let (breach, status) = evaluate(resolved_at, tracking.resolution_deadline);
        let updated = diesel::update(sla_tracking::table.find(tracking.id))
            .set((
                sla_tracking::resolved_at.eq(Some(resolved_at)),
                sla_tracking::resolution_breach_hours.eq(Some(breach)),
                sla_tracking::resolution_status.eq(status.as_str()),
                sla_tracking::updated_at.eq(Utc::now().naive_utc()),
            ))
            .get_result(conn)?;
        Ok(updated)
    })
}

/// Clears a recorded resolution after the ticket was reopened. Deadlines and
/// escalation state stay as they were.
pub fn reopen_resolution(
    conn: &mut PgConnection,
    organization_id: Uuid,
    ticket_id: Uuid,
) -> ServiceResult<SlaTracking> {
    conn.transaction::<_, ServiceError, _>(|conn| {
        let tracking = lock_tracking(conn, organization_id, ticket_id)?;
        if tracking.resolved_at.is_none() {
            return Ok(tracking);
        }

        let updated = diesel::update(sla_tracking::table.find(tracking.id))
            .set((
                sla_tracking::resolved_at.eq(None::<NaiveDateTime>),
                sla_tracking::resolution_breach_hours.eq(None::<f64>),
                sla_tracking::resolution_status.eq(SlaStatus::Pending.as_str()),
                sla_tracking::updated_at.eq(Utc::now().naive_utc()),
            ))
            .get_result(conn)?;
        Ok(updated)
    })
}

/// Flags the ticket for escalation when its elapsed share of the resolution
/// window crossed the policy threshold. Returns the updated row only when
/// this call triggered the escalation.
pub fn check_escalation(
    conn: &mut PgConnection,
    organization_id: Uuid,
    ticket_id: Uuid,
    now: NaiveDateTime,
) -> ServiceResult<Option<SlaTracking>> {
    conn.transaction::<_, ServiceError, _>(|conn| {
        let tracking = lock_tracking(conn, organization_id, ticket_id)?;
        let policy: SlaPolicy = sla_policies::table
            .find(tracking.policy_id)
            .first(conn)
            .optional()?
            .ok_or_else(|| {
                ServiceError::Integrity(format!(
                    "SLA tracking {} references a missing policy",
                    tracking.id
                ))
            })?;

        let ticket: Ticket = tickets::table.find(ticket_id).first(conn)?;
        if is_terminal(&ticket.status) || !should_escalate(&policy, &tracking, now) {
            return Ok(None);
        }

        let percent = elapsed_percent(tracking.started_at, now, policy.resolution_time_hours);

        let updated: SlaTracking = diesel::update(sla_tracking::table.find(tracking.id))
            .set((
                sla_tracking::escalation_triggered.eq(true),
                sla_tracking::escalation_triggered_at.eq(Some(now)),
                sla_tracking::escalation_level.eq(tracking.escalation_level + 1),
                sla_tracking::updated_at.eq(Utc::now().naive_utc()),
            ))
            .get_result(conn)?;

        diesel::insert_into(ticket_history::table)
            .values(&NewTicketHistory {
                id: Uuid::new_v4(),
                organization_id,
                ticket_id,
                action: "escalated".to_string(),
                field_changed: Some("escalation_level".to_string()),
                old_value: Some(tracking.escalation_level.to_string()),
                new_value: Some(updated.escalation_level.to_string()),
                comment: Some(format!(
                    "{percent:.1}% of resolution time elapsed (threshold {}%)",
                    policy.escalation_threshold_percent
                )),
                changed_by_id: None,
            })
            .execute(conn)?;

        let recipient = escalation_recipient(conn, &ticket)?;
        notifications::publish(
            conn,
            &NotificationPayload {
                organization_id,
                event_type: EVENT_SLA_ESCALATED.to_string(),
                recipient,
                data: json!({
                    "ticket_id": ticket.id,
                    "ticket_number": ticket.ticket_number,
                    "title": ticket.title,
                    "priority": ticket.priority,
                    "escalation_level": updated.escalation_level,
                    "elapsed_percent": percent,
                    "resolution_deadline": updated.resolution_deadline,
                }),
                completion_record_id: None,
            },
            None,
        )?;

        tracing::info!(
            ticket_id = %ticket_id,
            organization_id = %organization_id,
            elapsed_percent = percent,
            "SLA escalation triggered"
        );
        Ok(Some(updated))
    })
}

const TERMINAL_TICKET_STATUSES: [TicketStatus; 2] = [TicketStatus::Closed, TicketStatus::Cancelled];

fn is_terminal(status: &str) -> bool {
    TERMINAL_TICKET_STATUSES
        .iter()
        .any(|terminal| terminal.as_str() == status)
}

fn escalation_recipient(conn: &mut PgConnection, ticket: &Ticket) -> ServiceResult<String> {
    if let Some(assignee) = ticket.assigned_to_id {
        let username: Option<String> = users::table
            .find(assignee)
            .select(users::username)
            .first(conn)
            .optional()?;
        if let Some(username) = username {
            return Ok(username);
        }
    }
    Ok(format!("organization:{}", ticket.organization_id))
}

/// Evaluates every unresolved, not yet escalated tracking row whose ticket is
/// still live, optionally limited to one organization. Returns the ids of
/// tickets escalated by this pass.
pub fn sweep_escalations(
    conn: &mut PgConnection,
    organization_id: Option<Uuid>,
    now: NaiveDateTime,
) -> ServiceResult<Vec<Uuid>> {
    let terminal: Vec<&str> = TERMINAL_TICKET_STATUSES.iter().map(|s| s.as_str()).collect();
    let mut query = sla_tracking::table
        .inner_join(sla_policies::table)
        .inner_join(tickets::table)
        .filter(sla_tracking::escalation_triggered.eq(false))
        .filter(sla_tracking::resolved_at.is_null())
        .filter(sla_policies::escalation_enabled.eq(true))
        .filter(tickets::status.ne_all(terminal))
        .select((sla_tracking::organization_id, sla_tracking::ticket_id))
        .into_boxed();
    if let Some(organization_id) = organization_id {
        query = query.filter(sla_tracking::organization_id.eq(organization_id));
    }
    let candidates: Vec<(Uuid, Uuid)> = query.load(conn)?;

    let mut escalated = Vec::new();
    for (org, ticket_id) in candidates {
        match check_escalation(conn, org, ticket_id, now) {
            Ok(Some(_)) => escalated.push(ticket_id),
            Ok(None) => {}
            Err(err) => {
                tracing::error!(ticket_id = %ticket_id, error = %err, "escalation check failed");
            }
        }
    }
    Ok(escalated)
}

#[derive(Debug, Clone)]
pub struct PolicyInput {
    pub name: String,
    pub description: Option<String>,
    pub priority: Option<Priority>,
    pub ticket_type: Option<String>,
    pub customer_tier: Option<String>,
    pub response_time_hours: f64,
    pub resolution_time_hours: f64,
    pub escalation_enabled: bool,
    pub escalation_threshold_percent: f64,
    pub is_active: bool,
    pub is_default: bool,
}

/// Partial update. The outer `Option` is "leave unchanged"; for nullable
/// filters the inner `None` clears the filter.
#[derive(Debug, Clone, Default)]
pub struct PolicyUpdate {
    pub name: Option<String>,
    pub description: Option<Option<String>>,
    pub priority: Option<Option<Priority>>,
    pub ticket_type: Option<Option<String>>,
    pub customer_tier: Option<Option<String>>,
    pub response_time_hours: Option<f64>,
    pub resolution_time_hours: Option<f64>,
    pub escalation_enabled: Option<bool>,
    pub escalation_threshold_percent: Option<f64>,
    pub is_active: Option<bool>,
    pub is_default: Option<bool>,
}

#[derive(AsChangeset)]
#[diesel(table_name = sla_policies)]
struct PolicyChangeset {
    name: Option<String>,
    description: Option<Option<String>>,
    priority: Option<Option<String>>,
    ticket_type: Option<Option<String>>,
    customer_tier: Option<Option<String>>,
    response_time_hours: Option<f64>,
    resolution_time_hours: Option<f64>,
    escalation_enabled: Option<bool>,
    escalation_threshold_percent: Option<f64>,
    is_active: Option<bool>,
    is_default: Option<bool>,
    updated_at: NaiveDateTime,
}

fn check_hours(field: &str, value: f64) -> ServiceResult<()> {
    if !value.is_finite() || value <= 0.0 {
        return Err(invalid(format!("{field} must be greater than 0")));
    }
    if value > MAX_SLA_HOURS {
        return Err(invalid(format!("{field} must not exceed {MAX_SLA_HOURS} hours")));
    }
    Ok(())
}

fn check_threshold(value: f64) -> ServiceResult<()> {
    if !(1.0..=100.0).contains(&value) {
        return Err(invalid(
            "escalation_threshold_percent must be between 1 and 100",
        ));
    }
    Ok(())
}

fn clean_filter(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn map_policy_conflict(err: DieselError) -> ServiceError {
    match err {
        DieselError::DatabaseError(DatabaseErrorKind::UniqueViolation, _) => {
            ServiceError::Conflict("SLA policy name already exists".to_string())
        }
        other => ServiceError::Database(other),
    }
}

fn clear_default(
    conn: &mut PgConnection,
    organization_id: Uuid,
    keep: Uuid,
) -> ServiceResult<()> {
    diesel::update(
        sla_policies::table
            .filter(sla_policies::organization_id.eq(organization_id))
            .filter(sla_policies::is_default.eq(true))
            .filter(sla_policies::id.ne(keep)),
    )
    .set((
        sla_policies::is_default.eq(false),
        sla_policies::updated_at.eq(Utc::now().naive_utc()),
    ))
    .execute(conn)?;
    Ok(())
}

pub fn create_policy(
    conn: &mut PgConnection,
    actor: Actor,
    input: PolicyInput,
) -> ServiceResult<SlaPolicy> {
    let name = require_text("name", &input.name)?;
    check_hours("response_time_hours", input.response_time_hours)?;
    check_hours("resolution_time_hours", input.resolution_time_hours)?;
    check_threshold(input.escalation_threshold_percent)?;

    let row = NewSlaPolicy {
        id: Uuid::new_v4(),
        organization_id: actor.organization_id,
        name,
        description: input.description,
        priority: input.priority.map(|p| p.to_string()),
        ticket_type: clean_filter(input.ticket_type),
        customer_tier: clean_filter(input.customer_tier),
        response_time_hours: input.response_time_hours,
        resolution_time_hours: input.resolution_time_hours,
        escalation_enabled: input.escalation_enabled,
        escalation_threshold_percent: input.escalation_threshold_percent,
        is_active: input.is_active,
        is_default: input.is_default,
        created_by_id: Some(actor.user_id),
    };

    conn.transaction::<_, ServiceError, _>(|conn| {
        if row.is_default {
            clear_default(conn, actor.organization_id, row.id)?;
        }
        let policy = diesel::insert_into(sla_policies::table)
            .values(&row)
            .get_result(conn)
            .map_err(map_policy_conflict)?;
        Ok(policy)
    })
}

pub fn list_policies(
    conn: &mut PgConnection,
    organization_id: Uuid,
    active_only: bool,
) -> ServiceResult<Vec<SlaPolicy>> {
    let mut query = sla_policies::table
        .filter(sla_policies::organization_id.eq(organization_id))
        .order((sla_policies::is_default.desc(), sla_policies::created_at.asc()))
        .into_boxed();
    if active_only {
        query = query.filter(sla_policies::is_active.eq(true));
    }
    Ok(query.load(conn)?)
}

pub fn get_policy(
    conn: &mut PgConnection,
    organization_id: Uuid,
    policy_id: Uuid,
) -> ServiceResult<SlaPolicy> {
    sla_policies::table
        .filter(sla_policies::organization_id.eq(organization_id))
        .filter(sla_policies::id.eq(policy_id))
        .first(conn)
        .optional()?
        .ok_or(ServiceError::NotFound("SLA policy"))
}

pub fn update_policy(
    conn: &mut PgConnection,
    actor: Actor,
    policy_id: Uuid,
    update: PolicyUpdate,
) -> ServiceResult<SlaPolicy> {
    conn.transaction::<_, ServiceError, _>(|conn| {
        let existing = get_policy(conn, actor.organization_id, policy_id)?;

        let name = update
            .name
            .as_deref()
            .map(|value| require_text("name", value))
            .transpose()?;
        let response = update.response_time_hours.unwrap_or(existing.response_time_hours);
        let resolution = update
            .resolution_time_hours
            .unwrap_or(existing.resolution_time_hours);
        check_hours("response_time_hours", response)?;
        check_hours("resolution_time_hours", resolution)?;
        if let Some(threshold) = update.escalation_threshold_percent {
            check_threshold(threshold)?;
        }

        if update.is_default == Some(true) {
            clear_default(conn, actor.organization_id, policy_id)?;
        }

        let changes = PolicyChangeset {
            name,
            description: update.description,
            priority: update.priority.map(|p| p.map(|p| p.to_string())),
            ticket_type: update.ticket_type.map(clean_filter),
            customer_tier: update.customer_tier.map(clean_filter),
            response_time_hours: update.response_time_hours,
            resolution_time_hours: update.resolution_time_hours,
            escalation_enabled: update.escalation_enabled,
            escalation_threshold_percent: update.escalation_threshold_percent,
            is_active: update.is_active,
            is_default: update.is_default,
            updated_at: Utc::now().naive_utc(),
        };

        let policy = diesel::update(sla_policies::table.find(existing.id))
            .set(&changes)
            .get_result(conn)
            .map_err(map_policy_conflict)?;
        Ok(policy)
    })
}

/// Deletes an unused policy. Policies that already drive tracking rows must
/// be deactivated instead so existing deadlines keep their source.
pub fn delete_policy(
    conn: &mut PgConnection,
    actor: Actor,
    policy_id: Uuid,
) -> ServiceResult<()> {
    conn.transaction::<_, ServiceError, _>(|conn| {
        let policy = get_policy(conn, actor.organization_id, policy_id)?;
        let in_use: i64 = sla_tracking::table
            .filter(sla_tracking::policy_id.eq(policy.id))
            .count()
            .get_result(conn)?;
        if in_use > 0 {
            return Err(invalid(
                "SLA policy is referenced by tickets; deactivate it instead",
            ));
        }
        diesel::delete(sla_policies::table.find(policy.id)).execute(conn)?;
        Ok(())
    })
}

/// Tier of the ticket's customer, used for policy matching.
pub fn customer_tier(
    conn: &mut PgConnection,
    organization_id: Uuid,
    customer_id: Uuid,
) -> ServiceResult<Option<String>> {
    let tier: Option<Option<String>> = customers::table
        .filter(customers::organization_id.eq(organization_id))
        .filter(customers::id.eq(customer_id))
        .select(customers::tier)
        .first(conn)
        .optional()?;
    tier.ok_or(ServiceError::NotFound("Customer"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn at(y: i32, m: u32, d: u32, h: u32, min: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d)
            .unwrap()
            .and_hms_opt(h, min, 0)
            .unwrap()
    }

    fn policy(name: &str) -> SlaPolicy {
        SlaPolicy {
            id: Uuid::new_v4(),
            organization_id: Uuid::nil(),
            name: name.to_string(),
            description: None,
            priority: None,
            ticket_type: None,
            customer_tier: None,
            response_time_hours: 4.0,
            resolution_time_hours: 24.0,
            escalation_enabled: true,
            escalation_threshold_percent: 80.0,
            is_active: true,
            is_default: false,
            created_by_id: None,
            created_at: at(2024, 1, 1, 0, 0),
            updated_at: at(2024, 1, 1, 0, 0),
        }
    }

    fn tracking(started_at: NaiveDateTime) -> SlaTracking {
        let (response_deadline, resolution_deadline) =
            compute_deadlines(started_at, 4.0, 24.0).unwrap();
        SlaTracking {
            id: Uuid::new_v4(),
            organization_id: Uuid::nil(),
            ticket_id: Uuid::new_v4(),
            policy_id: Uuid::new_v4(),
            started_at,
            response_deadline,
            resolution_deadline,
            first_response_at: None,
            resolved_at: None,
            response_status: "pending".to_string(),
            resolution_status: "pending".to_string(),
            response_breach_hours: None,
            resolution_breach_hours: None,
            escalation_triggered: false,
            escalation_triggered_at: None,
            escalation_level: 0,
            created_at: started_at,
            updated_at: started_at,
        }
    }

    fn attrs(priority: Priority, tier: Option<&'static str>) -> TicketAttributes<'static> {
        TicketAttributes {
            priority,
            ticket_type: "support",
            customer_tier: tier,
        }
    }

    #[test]
    fn deadlines_offset_from_creation() {
        let created = at(2024, 1, 1, 0, 0);
        let (response, resolution) = compute_deadlines(created, 4.0, 24.0).unwrap();
        assert_eq!(response, at(2024, 1, 1, 4, 0));
        assert_eq!(resolution, at(2024, 1, 2, 0, 0));
    }

    #[test]
    fn fractional_hours_are_exact_to_the_minute() {
        let created = at(2024, 1, 1, 0, 0);
        let (response, _) = compute_deadlines(created, 0.5, 1.25).unwrap();
        assert_eq!(response, at(2024, 1, 1, 0, 30));
    }

    #[test]
    fn oversized_windows_are_errors_not_panics() {
        let created = at(2024, 1, 1, 0, 0);
        assert!(compute_deadlines(created, 1e12, 1e12).is_err());
        assert!(compute_deadlines(created, 4.0, f64::MAX).is_err());
        assert!(hours(f64::NAN).is_none());
    }

    #[test]
    fn only_closed_and_cancelled_tickets_are_terminal() {
        assert!(is_terminal("closed"));
        assert!(is_terminal("cancelled"));
        assert!(!is_terminal("resolved"));
        assert!(!is_terminal("open"));
    }

    #[test]
    fn policy_hours_are_bounded() {
        assert!(check_hours("response_time_hours", 0.25).is_ok());
        assert!(check_hours("response_time_hours", MAX_SLA_HOURS).is_ok());
        let err = check_hours("response_time_hours", 1e12).unwrap_err();
        assert_eq!(
            err.to_string(),
            "response_time_hours must not exceed 87600 hours"
        );
        assert!(check_hours("response_time_hours", 0.0).is_err());
        assert!(check_hours("response_time_hours", f64::INFINITY).is_err());
    }

    #[test]
    fn late_response_is_breached() {
        let deadline = at(2024, 1, 1, 4, 0);
        let (breach, status) = evaluate(at(2024, 1, 1, 5, 0), deadline);
        assert_eq!(breach, 1.0);
        assert_eq!(status, SlaStatus::Breached);
    }

    #[test]
    fn on_time_or_early_response_is_met() {
        let deadline = at(2024, 1, 1, 4, 0);
        assert_eq!(evaluate(deadline, deadline), (0.0, SlaStatus::Met));
        let (breach, status) = evaluate(at(2024, 1, 1, 2, 30), deadline);
        assert_eq!(breach, -1.5);
        assert_eq!(status, SlaStatus::Met);
    }

    #[test]
    fn escalates_once_threshold_crossed() {
        let policy = policy("standard");
        let row = tracking(at(2024, 1, 1, 0, 0));
        // 80% of 24h is 19h12m
        assert!(!should_escalate(&policy, &row, at(2024, 1, 1, 19, 0)));
        assert!(should_escalate(&policy, &row, at(2024, 1, 1, 19, 13)));
    }

    #[test]
    fn escalation_never_repeats_or_fires_when_disabled() {
        let mut policy = policy("standard");
        let mut row = tracking(at(2024, 1, 1, 0, 0));
        let late = at(2024, 1, 3, 0, 0);

        row.escalation_triggered = true;
        assert!(!should_escalate(&policy, &row, late));

        row.escalation_triggered = false;
        row.resolved_at = Some(at(2024, 1, 1, 10, 0));
        assert!(!should_escalate(&policy, &row, late));

        row.resolved_at = None;
        policy.escalation_enabled = false;
        assert!(!should_escalate(&policy, &row, late));
    }

    #[test]
    fn most_specific_policy_wins() {
        let general = policy("general");
        let mut high = policy("high");
        high.priority = Some("high".to_string());
        let mut high_gold = policy("high-gold");
        high_gold.priority = Some("high".to_string());
        high_gold.customer_tier = Some("gold".to_string());

        let policies = vec![general.clone(), high.clone(), high_gold.clone()];

        let chosen = select_policy(&policies, &attrs(Priority::High, Some("gold"))).unwrap();
        assert_eq!(chosen.id, high_gold.id);

        let chosen = select_policy(&policies, &attrs(Priority::High, None)).unwrap();
        assert_eq!(chosen.id, high.id);

        let chosen = select_policy(&policies, &attrs(Priority::Low, Some("gold"))).unwrap();
        assert_eq!(chosen.id, general.id);
    }

    #[test]
    fn ties_prefer_default_then_oldest() {
        let mut older = policy("older");
        older.priority = Some("urgent".to_string());
        let mut newer = policy("newer");
        newer.priority = Some("urgent".to_string());
        newer.created_at = at(2024, 2, 1, 0, 0);

        let policies = vec![newer.clone(), older.clone()];
        let chosen = select_policy(&policies, &attrs(Priority::Urgent, None)).unwrap();
        assert_eq!(chosen.id, older.id);

        newer.is_default = true;
        let policies = vec![older.clone(), newer.clone()];
        let chosen = select_policy(&policies, &attrs(Priority::Urgent, None)).unwrap();
        assert_eq!(chosen.id, newer.id);
    }

    #[test]
    fn falls_back_to_default_when_nothing_matches() {
        let mut filtered = policy("only-gold");
        filtered.customer_tier = Some("gold".to_string());
        let mut default = policy("default");
        default.customer_tier = Some("platinum".to_string());
        default.is_default = true;

        let policies = vec![filtered, default.clone()];
        let chosen = select_policy(&policies, &attrs(Priority::Medium, Some("bronze"))).unwrap();
        assert_eq!(chosen.id, default.id);
    }

    #[test]
    fn inactive_policies_are_ignored() {
        let mut inactive = policy("inactive");
        inactive.is_active = false;
        inactive.is_default = true;
        assert!(select_policy(&[inactive], &attrs(Priority::Medium, None)).is_none());
    }
}
