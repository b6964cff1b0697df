use axum::http::{HeaderValue, Request};
use axum::{
    body::Body,
    extract::DefaultBodyLimit,
    middleware,
    routing::{get, post, put},
    Router,
};
use serde::Deserialize;
use tower_http::{
    cors::{AllowHeaders, AllowMethods, AllowOrigin, CorsLayer},
    trace::TraceLayer,
};

use crate::{
    auth::AuthenticatedUser,
    error::AppResult,
    services::Page,
    state::AppState,
};

pub mod auth;
pub mod closure;
pub mod customers;
pub mod dispatch;
pub mod health;
pub mod installation;
pub mod organizations;
pub mod sla;
pub mod tickets;

const MAX_BODY_BYTES: usize = 2 * 1024 * 1024;

/// `skip`/`limit` query parameters shared by the list endpoints.
#[derive(Debug, Deserialize, Default)]
pub struct PageParams {
    pub skip: Option<i64>,
    pub limit: Option<i64>,
}

impl PageParams {
    pub fn page(&self) -> AppResult<Page> {
        page(self.skip, self.limit)
    }
}

pub fn page(skip: Option<i64>, limit: Option<i64>) -> AppResult<Page> {
    Ok(Page::new(skip, limit)?)
}

/// Root span for every request. `user_id` and `organization_id` stay empty
/// until the auth extractor records the verified caller.
pub fn request_span(request: &Request<Body>) -> tracing::Span {
    tracing::info_span!(
        "request",
        method = %request.method(),
        uri = %request.uri(),
        user_id = tracing::field::Empty,
        organization_id = tracing::field::Empty,
    )
}

fn cors_layer(allowed: Option<&str>) -> CorsLayer {
    let allow_origin = match allowed {
        Some(origins) => {
            let headers: Vec<HeaderValue> = origins
                .split(',')
                .map(str::trim)
                .filter(|value| !value.is_empty())
                .filter_map(|value| match value.parse::<HeaderValue>() {
                    Ok(header) => Some(header),
                    Err(_) => {
                        tracing::warn!(origin = value, "ignoring invalid CORS origin");
                        None
                    }
                })
                .collect();
            AllowOrigin::list(headers)
        }
        None => AllowOrigin::mirror_request(),
    };

    CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods(AllowMethods::mirror_request())
        .allow_headers(AllowHeaders::mirror_request())
        .allow_credentials(true)
}

pub fn create_router(state: AppState) -> Router<()> {
    let cors = cors_layer(state.config.cors_allowed_origin.as_deref());

    let auth_routes = Router::new()
        .route("/login", post(auth::login))
        .route("/refresh", post(auth::refresh))
        .route("/logout", post(auth::logout))
        .route("/me", get(auth::me));

    let customer_routes = Router::new()
        .route(
            "/",
            get(customers::list_customers).post(customers::create_customer),
        )
        .route(
            "/:id",
            get(customers::get_customer).put(customers::update_customer),
        );

    let product_routes = Router::new().route(
        "/",
        get(customers::list_products).post(customers::create_product),
    );

    let sla_routes = Router::new()
        .route("/policies", get(sla::list_policies).post(sla::create_policy))
        .route(
            "/policies/:id",
            get(sla::get_policy)
                .put(sla::update_policy)
                .delete(sla::delete_policy),
        )
        .route("/escalations/check", post(sla::check_escalations));

    let ticket_routes = Router::new()
        .route("/", get(tickets::list_tickets).post(tickets::create_ticket))
        .route("/:id", get(tickets::get_ticket))
        .route("/:id/assign", put(tickets::assign_ticket))
        .route("/:id/status", put(tickets::update_status))
        .route("/:id/responses", post(tickets::add_response))
        .route("/:id/rating", put(tickets::rate_ticket))
        .route("/:id/sla", get(tickets::get_ticket_sla))
        .route("/:id/history", get(tickets::ticket_history));

    let settings_routes = Router::new().route(
        "/organization",
        get(organizations::get_settings).put(organizations::update_settings),
    );

    let notification_routes =
        Router::new().route("/logs", get(organizations::list_notification_logs));

    let dispatch_routes = Router::new()
        .route(
            "/orders",
            get(dispatch::list_orders).post(dispatch::create_order),
        )
        .route(
            "/orders/:id",
            get(dispatch::get_order)
                .put(dispatch::update_order)
                .delete(dispatch::delete_order),
        )
        .route("/orders/:id/items/:item_id", put(dispatch::update_item))
        .route(
            "/installation-jobs",
            get(installation::list_jobs).post(installation::create_job),
        )
        .route(
            "/installation-jobs/:id",
            get(installation::get_job)
                .put(installation::update_job)
                .delete(installation::delete_job),
        )
        .route(
            "/installation-jobs/:id/assign",
            put(installation::assign_technician),
        )
        .route(
            "/installation-jobs/:id/tasks",
            get(installation::list_tasks).post(installation::create_task),
        )
        .route(
            "/installation-jobs/:id/tasks/:task_id",
            put(installation::update_task),
        )
        .route(
            "/installation-jobs/:id/completion",
            get(closure::get_completion).post(closure::record_completion),
        )
        .route(
            "/installation-jobs/:id/feedback",
            get(closure::list_feedback).post(closure::submit_feedback),
        )
        .route(
            "/installation-jobs/:id/closure",
            get(closure::get_closure).post(closure::create_closure),
        )
        .route(
            "/installation-jobs/:id/closure/approve",
            post(closure::approve_closure),
        )
        .route(
            "/installation-jobs/:id/closure/close",
            post(closure::close_service),
        )
        .route(
            "/installation-jobs/:id/closure/reopen",
            post(closure::reopen_service),
        )
        .route("/feedback/:id/review", post(closure::review_feedback))
        .route("/feedback/:id/respond", post(closure::respond_to_feedback))
        .route("/feedback/:id/close", post(closure::close_feedback))
        .route(
            "/installation-schedule-prompt",
            post(installation::schedule_prompt),
        );

    let protected_state = state.clone();
    let protected_routes = Router::new()
        .nest("/api/customers", customer_routes)
        .nest("/api/products", product_routes)
        .nest("/api/sla", sla_routes)
        .nest("/api/tickets", ticket_routes)
        .nest("/api/dispatch", dispatch_routes)
        .nest("/api/settings", settings_routes)
        .nest("/api/notifications", notification_routes)
        .layer(middleware::from_extractor_with_state::<AuthenticatedUser, _>(protected_state));

    Router::new()
        .merge(protected_routes)
        .nest("/api/auth", auth_routes)
        .route("/api/health", get(health::health_check))
        .with_state(state)
        .layer(TraceLayer::new_for_http().make_span_with(request_span))
        .layer(cors)
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
}

#[cfg(test)]
mod tests {
    use std::io;
    use std::sync::{Arc, Mutex};

    use axum::http::StatusCode;
    use uuid::Uuid;

    use super::*;
    use crate::{auth::permissions::Role, error::AppError, services::ServiceError};

    #[derive(Clone, Default)]
    struct Captured(Arc<Mutex<Vec<u8>>>);

    impl io::Write for Captured {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn internal_errors_are_logged_with_caller_and_resource() {
        let captured = Captured::default();
        let writer = captured.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_ansi(false)
            .with_writer(move || writer.clone())
            .finish();

        let user = AuthenticatedUser {
            user_id: Uuid::new_v4(),
            organization_id: Uuid::new_v4(),
            username: "dispatcher".into(),
            role: Role::Manager,
            is_super_admin: false,
            permissions: Vec::new(),
        };
        let ticket = Uuid::new_v4();
        let request = Request::builder()
            .method("PUT")
            .uri(format!("/api/tickets/{ticket}/status"))
            .body(Body::empty())
            .unwrap();

        let err = tracing::subscriber::with_default(subscriber, || {
            let span = request_span(&request);
            let _entered = span.enter();
            user.record_on(&span);
            AppError::from(ServiceError::Integrity(format!(
                "ticket {ticket} has no SLA tracking"
            )))
        });
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(err.message(), "internal server error");

        let output = String::from_utf8(captured.0.lock().unwrap().clone()).unwrap();
        assert!(output.contains("internal error"), "{output}");
        assert!(output.contains(&format!("user_id={}", user.user_id)), "{output}");
        assert!(
            output.contains(&format!("organization_id={}", user.organization_id)),
            "{output}"
        );
        assert!(output.contains(&format!("/api/tickets/{ticket}/status")), "{output}");
        assert!(output.contains("method=PUT"), "{output}");
    }
}
