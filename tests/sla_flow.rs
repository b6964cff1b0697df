mod common;

use anyhow::{anyhow, Result};
use axum::http::StatusCode;
use common::{acquire_db_lock, expect_error, read_json, TestApp};
use diesel::RunQueryDsl;
use serde::Deserialize;
use serde_json::json;
use servicecrm::jobs::{JOB_SEND_NOTIFICATION, STATUS_SUCCEEDED};
use servicecrm::services::sla::check_escalation;
use servicecrm::utils::time::now;
use uuid::Uuid;

#[derive(Deserialize)]
struct Created {
    id: Uuid,
}

#[derive(Debug, Deserialize)]
struct Tracking {
    policy_id: Uuid,
    started_at: String,
    response_deadline: String,
    resolution_deadline: String,
    first_response_at: Option<String>,
    resolved_at: Option<String>,
    response_status: String,
    resolution_status: String,
    response_breach_hours: Option<f64>,
    resolution_breach_hours: Option<f64>,
    escalation_triggered: bool,
    escalation_level: i32,
}

#[derive(Deserialize)]
struct Ticket {
    id: Uuid,
    ticket_number: String,
    status: String,
    due_date: Option<String>,
    sla: Option<Tracking>,
}

#[derive(Deserialize)]
struct EscalationCheck {
    escalated_ticket_ids: Vec<Uuid>,
}

#[derive(Deserialize)]
struct History {
    action: String,
}

fn parse(ts: &str) -> chrono::DateTime<chrono::Utc> {
    chrono::DateTime::parse_from_rfc3339(ts)
        .expect("timestamp")
        .with_timezone(&chrono::Utc)
}

async fn create_customer(app: &TestApp, token: &str, tier: Option<&str>) -> Result<Uuid> {
    let response = app
        .post_json(
            "/api/customers",
            &json!({ "name": "Globex", "email": "ops@globex.test", "tier": tier }),
            Some(token),
        )
        .await?;
    assert_eq!(response.status(), StatusCode::CREATED);
    Ok(read_json::<Created>(response).await?.id)
}

async fn create_policy(app: &TestApp, token: &str, body: serde_json::Value) -> Result<Uuid> {
    let response = app.post_json("/api/sla/policies", &body, Some(token)).await?;
    assert_eq!(response.status(), StatusCode::CREATED);
    Ok(read_json::<Created>(response).await?.id)
}

#[tokio::test]
async fn ticket_gets_deadlines_from_the_most_specific_policy() -> Result<()> {
    let _lock = acquire_db_lock().await;
    let Some(app) = TestApp::new().await? else {
        return Ok(());
    };
    let (_, _, token) = app.admin_session("Acme").await?;

    let customer = create_customer(&app, &token, Some("gold")).await?;
    create_policy(
        &app,
        &token,
        json!({
            "name": "Default",
            "response_time_hours": 8.0,
            "resolution_time_hours": 48.0,
            "is_default": true
        }),
    )
    .await?;
    let urgent_gold = create_policy(
        &app,
        &token,
        json!({
            "name": "Urgent gold",
            "priority": "urgent",
            "customer_tier": "gold",
            "response_time_hours": 1.0,
            "resolution_time_hours": 4.0
        }),
    )
    .await?;

    let response = app
        .post_json(
            "/api/tickets",
            &json!({ "customer_id": customer, "title": "Line down", "priority": "urgent" }),
            Some(&token),
        )
        .await?;
    assert_eq!(response.status(), StatusCode::CREATED);
    let ticket: Ticket = read_json(response).await?;
    assert!(ticket.ticket_number.starts_with("TKT/"));
    assert!(ticket.ticket_number.ends_with("/00001"));
    assert_eq!(ticket.status, "open");

    let sla = ticket.sla.expect("ticket carries its SLA");
    assert_eq!(sla.policy_id, urgent_gold);
    let started = parse(&sla.started_at);
    assert_eq!(parse(&sla.response_deadline) - started, chrono::Duration::hours(1));
    assert_eq!(parse(&sla.resolution_deadline) - started, chrono::Duration::hours(4));
    assert_eq!(ticket.due_date.as_deref(), Some(sla.resolution_deadline.as_str()));
    assert_eq!(sla.response_status, "pending");
    assert_eq!(sla.resolution_status, "pending");

    // Not urgent: falls back to the default policy.
    let response = app
        .post_json(
            "/api/tickets",
            &json!({ "customer_id": customer, "title": "Question", "priority": "low" }),
            Some(&token),
        )
        .await?;
    let low: Ticket = read_json(response).await?;
    assert!(low.ticket_number.ends_with("/00002"));
    let low_sla = low.sla.expect("sla");
    assert_eq!(
        parse(&low_sla.resolution_deadline) - parse(&low_sla.started_at),
        chrono::Duration::hours(48)
    );

    app.cleanup().await?;
    Ok(())
}

#[tokio::test]
async fn ticket_without_applicable_policy_is_rejected() -> Result<()> {
    let _lock = acquire_db_lock().await;
    let Some(app) = TestApp::new().await? else {
        return Ok(());
    };
    let (_, _, token) = app.admin_session("Acme").await?;
    let customer = create_customer(&app, &token, None).await?;

    let response = app
        .post_json(
            "/api/tickets",
            &json!({ "customer_id": customer, "title": "Nothing matches" }),
            Some(&token),
        )
        .await?;
    let message = expect_error(response, StatusCode::BAD_REQUEST).await?;
    assert_eq!(message, "No applicable SLA policy");

    let response = app.get("/api/tickets", Some(&token)).await?;
    let tickets: Vec<Ticket> = read_json(response).await?;
    assert!(tickets.is_empty());

    app.cleanup().await?;
    Ok(())
}

#[tokio::test]
async fn first_response_is_recorded_once_and_resolution_is_met() -> Result<()> {
    let _lock = acquire_db_lock().await;
    let Some(app) = TestApp::new().await? else {
        return Ok(());
    };
    let (_, _, token) = app.admin_session("Acme").await?;
    let customer = create_customer(&app, &token, None).await?;
    create_policy(
        &app,
        &token,
        json!({
            "name": "Default",
            "response_time_hours": 4.0,
            "resolution_time_hours": 24.0,
            "is_default": true
        }),
    )
    .await?;

    let response = app
        .post_json(
            "/api/tickets",
            &json!({ "customer_id": customer, "title": "Printer jam" }),
            Some(&token),
        )
        .await?;
    let ticket: Ticket = read_json(response).await?;
    let path = format!("/api/tickets/{}", ticket.id);

    let response = app
        .post_json(
            &format!("{path}/responses"),
            &json!({ "message": "Looking into it" }),
            Some(&token),
        )
        .await?;
    assert_eq!(response.status(), StatusCode::CREATED);
    let first: Tracking = read_json(response).await?;
    assert_eq!(first.response_status, "met");
    let first_at = first.first_response_at.clone().expect("first response");
    assert!(first.response_breach_hours.expect("breach") < 0.0);

    let response = app
        .post_json(
            &format!("{path}/responses"),
            &json!({ "message": "Still on it" }),
            Some(&token),
        )
        .await?;
    let second: Tracking = read_json(response).await?;
    assert_eq!(second.first_response_at.as_deref(), Some(first_at.as_str()));

    let response = app
        .put_json(
            &format!("{path}/status"),
            &json!({ "status": "resolved", "resolution": "Cleared the jam" }),
            Some(&token),
        )
        .await?;
    assert_eq!(response.status(), StatusCode::OK);
    let resolved: Ticket = read_json(response).await?;
    assert_eq!(resolved.status, "resolved");

    let response = app.get(&format!("{path}/sla"), Some(&token)).await?;
    let sla: Tracking = read_json(response).await?;
    assert_eq!(sla.resolution_status, "met");
    assert!(sla.resolution_breach_hours.expect("breach") < 0.0);

    // Illegal jump back to open from resolved.
    let response = app
        .put_json(&format!("{path}/status"), &json!({ "status": "open" }), Some(&token))
        .await?;
    expect_error(response, StatusCode::BAD_REQUEST).await?;

    let response = app.get(&format!("{path}/history"), Some(&token)).await?;
    let history: Vec<History> = read_json(response).await?;
    let actions: Vec<&str> = history.iter().map(|h| h.action.as_str()).collect();
    assert!(actions.contains(&"created"));
    assert!(actions.contains(&"responded"));
    assert!(actions.contains(&"status_changed"));

    app.cleanup().await?;
    Ok(())
}

#[tokio::test]
async fn overdue_ticket_escalates_once_and_notifies() -> Result<()> {
    let _lock = acquire_db_lock().await;
    let Some(app) = TestApp::new().await? else {
        return Ok(());
    };
    let (_, _, token) = app.admin_session("Acme").await?;
    let customer = create_customer(&app, &token, None).await?;
    create_policy(
        &app,
        &token,
        json!({
            "name": "Default",
            "response_time_hours": 1.0,
            "resolution_time_hours": 10.0,
            "escalation_threshold_percent": 80.0,
            "is_default": true
        }),
    )
    .await?;

    let response = app
        .post_json(
            "/api/tickets",
            &json!({ "customer_id": customer, "title": "Outage" }),
            Some(&token),
        )
        .await?;
    let ticket: Ticket = read_json(response).await?;

    let response = app
        .post_json("/api/sla/escalations/check", &json!({}), Some(&token))
        .await?;
    let check: EscalationCheck = read_json(response).await?;
    assert!(check.escalated_ticket_ids.is_empty());

    app.age_sla(ticket.id, 9).await?;

    let response = app
        .post_json("/api/sla/escalations/check", &json!({}), Some(&token))
        .await?;
    let check: EscalationCheck = read_json(response).await?;
    assert_eq!(check.escalated_ticket_ids, vec![ticket.id]);

    let response = app
        .post_json("/api/sla/escalations/check", &json!({}), Some(&token))
        .await?;
    let again: EscalationCheck = read_json(response).await?;
    assert!(again.escalated_ticket_ids.is_empty());

    let response = app
        .get(&format!("/api/tickets/{}/sla", ticket.id), Some(&token))
        .await?;
    let sla: Tracking = read_json(response).await?;
    assert!(sla.escalation_triggered);
    assert_eq!(sla.escalation_level, 1);

    assert!(app.run_worker_once().await?);
    let sent = app.notifier().sent().await;
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].event_type, "sla_escalated");
    assert_eq!(sent[0].payload["ticket_id"], json!(ticket.id));

    let jobs = app.jobs_by_type(JOB_SEND_NOTIFICATION).await?;
    assert_eq!(jobs.len(), 1);
    assert_eq!(jobs[0].status, STATUS_SUCCEEDED);

    app.cleanup().await?;
    Ok(())
}

#[tokio::test]
async fn other_organizations_cannot_see_tickets_or_policies() -> Result<()> {
    let _lock = acquire_db_lock().await;
    let Some(app) = TestApp::new().await? else {
        return Ok(());
    };
    let (_, _, token) = app.admin_session("Acme").await?;
    let (_, _, rival) = app.admin_session("Rival").await?;
    let customer = create_customer(&app, &token, None).await?;
    let policy = create_policy(
        &app,
        &token,
        json!({
            "name": "Default",
            "response_time_hours": 2.0,
            "resolution_time_hours": 8.0,
            "is_default": true
        }),
    )
    .await?;
    let response = app
        .post_json(
            "/api/tickets",
            &json!({ "customer_id": customer, "title": "Private" }),
            Some(&token),
        )
        .await?;
    let ticket: Ticket = read_json(response).await?;

    let response = app
        .get(&format!("/api/tickets/{}", ticket.id), Some(&rival))
        .await?;
    assert_eq!(
        expect_error(response, StatusCode::NOT_FOUND).await?,
        "Ticket not found"
    );

    let response = app
        .get(&format!("/api/sla/policies/{policy}"), Some(&rival))
        .await?;
    expect_error(response, StatusCode::NOT_FOUND).await?;

    // Rival's customer list and ticket list are empty.
    let response = app.get("/api/tickets", Some(&rival)).await?;
    let tickets: Vec<Ticket> = read_json(response).await?;
    assert!(tickets.is_empty());

    // A ticket for someone else's customer is a 404 too.
    let response = app
        .post_json(
            "/api/tickets",
            &json!({ "customer_id": customer, "title": "Sneaky" }),
            Some(&rival),
        )
        .await?;
    expect_error(response, StatusCode::NOT_FOUND).await?;

    app.cleanup().await?;
    Ok(())
}

#[tokio::test]
async fn policy_windows_beyond_ten_years_are_rejected() -> Result<()> {
    let _lock = acquire_db_lock().await;
    let Some(app) = TestApp::new().await? else {
        return Ok(());
    };
    let (_, _, token) = app.admin_session("Acme").await?;

    let response = app
        .post_json(
            "/api/sla/policies",
            &json!({
                "name": "Forever",
                "response_time_hours": 1e12,
                "resolution_time_hours": 1e12,
                "is_default": true
            }),
            Some(&token),
        )
        .await?;
    assert_eq!(
        expect_error(response, StatusCode::BAD_REQUEST).await?,
        "response_time_hours must not exceed 87600 hours"
    );

    let policy = create_policy(
        &app,
        &token,
        json!({
            "name": "Default",
            "response_time_hours": 4.0,
            "resolution_time_hours": 87600.0,
            "is_default": true
        }),
    )
    .await?;
    let response = app
        .put_json(
            &format!("/api/sla/policies/{policy}"),
            &json!({ "resolution_time_hours": 1e12 }),
            Some(&token),
        )
        .await?;
    assert_eq!(
        expect_error(response, StatusCode::BAD_REQUEST).await?,
        "resolution_time_hours must not exceed 87600 hours"
    );

    // The server is still healthy and the capped policy still applies.
    let customer = create_customer(&app, &token, None).await?;
    let response = app
        .post_json(
            "/api/tickets",
            &json!({ "customer_id": customer, "title": "Long haul" }),
            Some(&token),
        )
        .await?;
    assert_eq!(response.status(), StatusCode::CREATED);
    let ticket: Ticket = read_json(response).await?;
    let sla = ticket.sla.expect("sla");
    assert_eq!(
        parse(&sla.resolution_deadline) - parse(&sla.started_at),
        chrono::Duration::hours(87_600)
    );

    app.cleanup().await?;
    Ok(())
}

#[tokio::test]
async fn cancelled_and_closed_tickets_never_escalate() -> Result<()> {
    let _lock = acquire_db_lock().await;
    let Some(app) = TestApp::new().await? else {
        return Ok(());
    };
    let (org, _, token) = app.admin_session("Acme").await?;
    let customer = create_customer(&app, &token, None).await?;
    create_policy(
        &app,
        &token,
        json!({
            "name": "Default",
            "response_time_hours": 1.0,
            "resolution_time_hours": 10.0,
            "escalation_threshold_percent": 80.0,
            "is_default": true
        }),
    )
    .await?;

    let mut ids = Vec::new();
    for title in ["Withdrawn", "Done"] {
        let response = app
            .post_json(
                "/api/tickets",
                &json!({ "customer_id": customer, "title": title }),
                Some(&token),
            )
            .await?;
        ids.push(read_json::<Ticket>(response).await?.id);
    }
    let (cancelled, closed) = (ids[0], ids[1]);

    let response = app
        .put_json(
            &format!("/api/tickets/{cancelled}/status"),
            &json!({ "status": "cancelled" }),
            Some(&token),
        )
        .await?;
    assert_eq!(response.status(), StatusCode::OK);

    for status in ["resolved", "closed"] {
        let response = app
            .put_json(
                &format!("/api/tickets/{closed}/status"),
                &json!({ "status": status }),
                Some(&token),
            )
            .await?;
        assert_eq!(response.status(), StatusCode::OK);
    }

    app.age_sla(cancelled, 9).await?;
    app.age_sla(closed, 9).await?;

    let mut conn = app.state.db().map_err(|err| anyhow!("{err:?}"))?;
    // Even with the resolution cleared, a closed ticket stays quiet.
    diesel::sql_query(format!(
        "UPDATE sla_tracking SET resolved_at = NULL WHERE ticket_id = '{closed}'"
    ))
    .execute(&mut *conn)?;
    for id in [cancelled, closed] {
        assert!(check_escalation(&mut conn, org, id, now())?.is_none());
    }
    drop(conn);

    let response = app
        .post_json("/api/sla/escalations/check", &json!({}), Some(&token))
        .await?;
    let check: EscalationCheck = read_json(response).await?;
    assert!(check.escalated_ticket_ids.is_empty());

    for id in [cancelled, closed] {
        let response = app.get(&format!("/api/tickets/{id}/sla"), Some(&token)).await?;
        let sla: Tracking = read_json(response).await?;
        assert!(!sla.escalation_triggered);
        assert_eq!(sla.escalation_level, 0);
    }

    assert!(!app.run_worker_once().await?);
    assert!(app.notifier().sent().await.is_empty());

    app.cleanup().await?;
    Ok(())
}

#[tokio::test]
async fn reopening_a_resolved_ticket_clears_its_resolution() -> Result<()> {
    let _lock = acquire_db_lock().await;
    let Some(app) = TestApp::new().await? else {
        return Ok(());
    };
    let (_, _, token) = app.admin_session("Acme").await?;
    let customer = create_customer(&app, &token, None).await?;
    create_policy(
        &app,
        &token,
        json!({
            "name": "Default",
            "response_time_hours": 2.0,
            "resolution_time_hours": 8.0,
            "is_default": true
        }),
    )
    .await?;

    let response = app
        .post_json(
            "/api/tickets",
            &json!({ "customer_id": customer, "title": "Flaky sensor" }),
            Some(&token),
        )
        .await?;
    let ticket: Ticket = read_json(response).await?;
    let path = format!("/api/tickets/{}", ticket.id);

    let response = app
        .put_json(&format!("{path}/status"), &json!({ "status": "resolved" }), Some(&token))
        .await?;
    assert_eq!(response.status(), StatusCode::OK);
    let response = app.get(&format!("{path}/sla"), Some(&token)).await?;
    let sla: Tracking = read_json(response).await?;
    assert_eq!(sla.resolution_status, "met");
    assert!(sla.resolved_at.is_some());

    let response = app
        .put_json(
            &format!("{path}/status"),
            &json!({ "status": "in_progress", "comment": "Came back" }),
            Some(&token),
        )
        .await?;
    assert_eq!(response.status(), StatusCode::OK);
    let reopened: Ticket = read_json(response).await?;
    assert_eq!(reopened.status, "in_progress");

    let response = app.get(&format!("{path}/sla"), Some(&token)).await?;
    let sla: Tracking = read_json(response).await?;
    assert_eq!(sla.resolution_status, "pending");
    assert!(sla.resolved_at.is_none());
    assert!(sla.resolution_breach_hours.is_none());

    // Resolved again past the deadline: breached this time.
    app.age_sla(ticket.id, 9).await?;
    let response = app
        .put_json(&format!("{path}/status"), &json!({ "status": "resolved" }), Some(&token))
        .await?;
    assert_eq!(response.status(), StatusCode::OK);
    let response = app.get(&format!("{path}/sla"), Some(&token)).await?;
    let sla: Tracking = read_json(response).await?;
    assert_eq!(sla.resolution_status, "breached");
    assert!(sla.resolution_breach_hours.expect("breach") > 0.0);

    app.cleanup().await?;
    Ok(())
}
