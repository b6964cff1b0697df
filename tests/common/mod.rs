use std::env;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, ensure, Context, Result};
use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Method, Request, StatusCode};
use axum::Router;
use diesel::connection::SimpleConnection;
use diesel::prelude::*;
use diesel::PgConnection;
use http_body_util::BodyExt;
use once_cell::sync::Lazy;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use servicecrm::auth::jwt::JwtService;
use servicecrm::auth::password::hash_password;
use servicecrm::config::AppConfig;
use servicecrm::db::{self, PgPool};
use servicecrm::models::{Job, NewOrganization, NewUser};
use servicecrm::notify::Notifier;
use servicecrm::state::AppState;
use servicecrm::{default_handlers, routes, run_migrations, Worker};
use tokio::sync::Mutex;
use tower::util::ServiceExt;
use uuid::Uuid;

static DB_LOCK: Lazy<Mutex<()>> = Lazy::new(|| Mutex::new(()));

#[allow(dead_code)]
#[derive(Debug, Clone)]
pub struct SentNotification {
    pub event_type: String,
    pub recipient: String,
    pub payload: Value,
}

/// Records every notification; fails the next `fail_next` sends.
#[derive(Default)]
pub struct FakeNotifier {
    sent: Mutex<Vec<SentNotification>>,
    fail_next: Mutex<u32>,
}

#[async_trait]
impl Notifier for FakeNotifier {
    async fn send(&self, event_type: &str, recipient: &str, payload: &Value) -> Result<()> {
        let mut failures = self.fail_next.lock().await;
        if *failures > 0 {
            *failures -= 1;
            return Err(anyhow!("simulated delivery failure"));
        }
        self.sent.lock().await.push(SentNotification {
            event_type: event_type.to_string(),
            recipient: recipient.to_string(),
            payload: payload.clone(),
        });
        Ok(())
    }
}

impl FakeNotifier {
    #[allow(dead_code)]
    pub async fn sent(&self) -> Vec<SentNotification> {
        self.sent.lock().await.clone()
    }

    #[allow(dead_code)]
    pub async fn fail_next(&self, count: u32) {
        *self.fail_next.lock().await = count;
    }
}

pub struct TestApp {
    pub state: AppState,
    router: Router,
    notifier: Arc<FakeNotifier>,
}

impl TestApp {
    /// Returns `None` when `TEST_DATABASE_URL` is unset so the suite can run
    /// without Postgres.
    pub async fn new() -> Result<Option<Self>> {
        let Ok(database_url) = env::var("TEST_DATABASE_URL") else {
            eprintln!("TEST_DATABASE_URL not set; skipping integration test");
            return Ok(None);
        };

        let config = AppConfig {
            database_url,
            database_max_pool_size: 4,
            server_host: "127.0.0.1".to_string(),
            server_port: 0,
            jwt_secret: "test-secret".to_string(),
            jwt_issuer: "test-issuer".to_string(),
            jwt_audience: "test-audience".to_string(),
            jwt_expiry_minutes: 60,
            refresh_token_expiry_days: 30,
            refresh_cookie_secure: false,
            refresh_cookie_domain: None,
            cors_allowed_origin: None,
            notification_webhook_url: None,
            notification_max_attempts: 2,
            sla_sweep_interval_seconds: 60,
            worker_poll_interval_seconds: 1,
        };

        let pool = db::init_pool_with_size(&config.database_url, config.database_max_pool_size)?;
        prepare_database(&pool).await?;

        let notifier = Arc::new(FakeNotifier::default());
        let notifier_for_state: Arc<dyn Notifier> = notifier.clone();
        let jwt = JwtService::from_config(&config)?;
        let state = AppState::new(pool, config, notifier_for_state, jwt);
        let router = routes::create_router(state.clone());

        Ok(Some(Self {
            state,
            router,
            notifier,
        }))
    }

    pub async fn cleanup(&self) -> Result<()> {
        self.with_conn(truncate_all).await
    }

    #[allow(dead_code)]
    pub fn notifier(&self) -> Arc<FakeNotifier> {
        self.notifier.clone()
    }

    pub async fn insert_organization(
        &self,
        name: &str,
        require_feedback_before_closure: bool,
        require_manager_approval: bool,
    ) -> Result<Uuid> {
        let organization = NewOrganization {
            id: Uuid::new_v4(),
            name: name.to_string(),
            require_feedback_before_closure,
            require_manager_approval,
        };
        self.with_conn(move |conn| {
            diesel::insert_into(servicecrm::schema::organizations::table)
                .values(&organization)
                .execute(conn)
                .context("failed to insert organization")?;
            Ok(organization.id)
        })
        .await
    }

    pub async fn insert_user(
        &self,
        organization_id: Uuid,
        username: &str,
        password: &str,
        role: &str,
        permissions: &[&str],
    ) -> Result<Uuid> {
        let user = NewUser {
            id: Uuid::new_v4(),
            organization_id,
            username: username.to_string(),
            password_hash: hash_password(password)?,
            role: role.to_string(),
            is_super_admin: false,
            service_permissions: permissions.iter().map(|p| p.to_string()).collect(),
        };
        self.with_conn(move |conn| {
            diesel::insert_into(servicecrm::schema::users::table)
                .values(&user)
                .execute(conn)
                .context("failed to insert user")?;
            Ok(user.id)
        })
        .await
    }

    /// Creates an organization with one admin and returns `(org_id, user_id, token)`.
    #[allow(dead_code)]
    pub async fn admin_session(&self, name: &str) -> Result<(Uuid, Uuid, String)> {
        let org = self.insert_organization(name, false, false).await?;
        let username = format!("{}-admin", name.to_lowercase().replace(' ', "-"));
        let user = self.insert_user(org, &username, "adminpass", "admin", &[]).await?;
        let token = self.login_token(&username, "adminpass").await?;
        Ok((org, user, token))
    }

    pub async fn login_token(&self, username: &str, password: &str) -> Result<String> {
        #[derive(Serialize)]
        struct LoginPayload<'a> {
            username: &'a str,
            password: &'a str,
        }

        let response = self
            .send_json(
                Method::POST,
                "/api/auth/login",
                &LoginPayload { username, password },
                None,
            )
            .await?;

        ensure!(
            response.status() == StatusCode::OK,
            "login failed with status {}",
            response.status()
        );

        #[derive(serde::Deserialize)]
        struct LoginResponse {
            access_token: String,
        }
        let parsed: LoginResponse = read_json(response).await?;
        Ok(parsed.access_token)
    }

    /// Runs one worker iteration with the default handlers.
    #[allow(dead_code)]
    pub async fn run_worker_once(&self) -> Result<bool> {
        let worker = Worker::new(
            Arc::new(self.state.clone()),
            default_handlers(),
            Duration::from_millis(10),
        );
        worker.tick().await.map_err(|err| anyhow!("{err}"))
    }

    #[allow(dead_code)]
    pub async fn jobs_by_type(&self, ty: &str) -> Result<Vec<Job>> {
        let ty = ty.to_string();
        self.with_conn(move |conn| {
            use servicecrm::schema::jobs;
            let rows = jobs::table
                .filter(jobs::job_type.eq(&ty))
                .order(jobs::created_at.asc())
                .load::<Job>(conn)
                .context("failed to load jobs")?;
            Ok(rows)
        })
        .await
    }

    /// Makes every queued job eligible to run now.
    #[allow(dead_code)]
    pub async fn release_jobs(&self) -> Result<()> {
        self.with_conn(|conn| {
            conn.batch_execute("UPDATE jobs SET run_after = NOW() - INTERVAL '1 second' WHERE status = 'queued';")
                .context("failed to release jobs")?;
            Ok(())
        })
        .await
    }

    /// Moves an SLA clock into the past so deadlines are already due.
    #[allow(dead_code)]
    pub async fn age_sla(&self, ticket_id: Uuid, hours: i64) -> Result<()> {
        self.with_conn(move |conn| {
            conn.batch_execute(&format!(
                "UPDATE sla_tracking SET started_at = started_at - INTERVAL '{hours} hours', \
                 response_deadline = response_deadline - INTERVAL '{hours} hours', \
                 resolution_deadline = resolution_deadline - INTERVAL '{hours} hours' \
                 WHERE ticket_id = '{ticket_id}';"
            ))
            .context("failed to age sla tracking")?;
            Ok(())
        })
        .await
    }

    pub async fn send_json<T: Serialize + ?Sized>(
        &self,
        method: Method,
        path: &str,
        payload: &T,
        token: Option<&str>,
    ) -> Result<hyper::Response<Body>> {
        let body = serde_json::to_vec(payload)?;
        let mut builder = Request::builder()
            .method(method)
            .uri(path)
            .header("content-type", "application/json");
        if let Some(token) = token {
            builder = builder.header("authorization", format!("Bearer {token}"));
        }
        let request = builder.body(Body::from(body))?;
        Ok(self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("infallible response"))
    }

    #[allow(dead_code)]
    pub async fn post_json<T: Serialize + ?Sized>(
        &self,
        path: &str,
        payload: &T,
        token: Option<&str>,
    ) -> Result<hyper::Response<Body>> {
        self.send_json(Method::POST, path, payload, token).await
    }

    #[allow(dead_code)]
    pub async fn put_json<T: Serialize + ?Sized>(
        &self,
        path: &str,
        payload: &T,
        token: Option<&str>,
    ) -> Result<hyper::Response<Body>> {
        self.send_json(Method::PUT, path, payload, token).await
    }

    #[allow(dead_code)]
    pub async fn request(
        &self,
        method: Method,
        path: &str,
        token: Option<&str>,
        cookie: Option<&str>,
    ) -> Result<hyper::Response<Body>> {
        let mut builder = Request::builder().method(method).uri(path);
        if let Some(token) = token {
            builder = builder.header("authorization", format!("Bearer {token}"));
        }
        if let Some(cookie) = cookie {
            builder = builder.header("cookie", cookie);
        }
        let request = builder.body(Body::empty())?;
        Ok(self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("infallible response"))
    }

    pub async fn get(&self, path: &str, token: Option<&str>) -> Result<hyper::Response<Body>> {
        self.request(Method::GET, path, token, None).await
    }

    #[allow(dead_code)]
    pub async fn delete(&self, path: &str, token: Option<&str>) -> Result<hyper::Response<Body>> {
        self.request(Method::DELETE, path, token, None).await
    }

    async fn with_conn<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut PgConnection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let pool = self.state.pool.clone();
        tokio::task::spawn_blocking(move || {
            let mut conn = pool
                .get()
                .map_err(|err| anyhow!("failed to get database connection: {err}"))?;
            f(&mut conn)
        })
        .await
        .context("connection task panicked")?
    }
}

pub async fn acquire_db_lock() -> tokio::sync::MutexGuard<'static, ()> {
    DB_LOCK.lock().await
}

pub async fn body_to_vec(body: Body) -> Result<Vec<u8>> {
    let collected = body
        .collect()
        .await
        .map_err(|err| anyhow!("failed to read response body: {err}"))?;
    Ok(collected.to_bytes().to_vec())
}

pub async fn read_json<T: DeserializeOwned>(response: hyper::Response<Body>) -> Result<T> {
    let body = body_to_vec(response.into_body()).await?;
    serde_json::from_slice(&body).with_context(|| {
        format!(
            "unexpected response body: {}",
            String::from_utf8_lossy(&body)
        )
    })
}

/// Asserts the status and returns the `error` message of an error response.
#[allow(dead_code)]
pub async fn expect_error(response: hyper::Response<Body>, status: StatusCode) -> Result<String> {
    ensure!(
        response.status() == status,
        "expected {status}, got {}",
        response.status()
    );
    let body: Value = read_json(response).await?;
    body.get("error")
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| anyhow!("error body missing message: {body}"))
}

async fn prepare_database(pool: &PgPool) -> Result<()> {
    let pool = pool.clone();
    tokio::task::spawn_blocking(move || -> Result<()> {
        let mut conn = pool
            .get()
            .map_err(|err| anyhow!("failed to acquire connection: {err}"))?;
        run_migrations(&mut conn)?;
        truncate_all(&mut conn)?;
        Ok(())
    })
    .await
    .context("migration task panicked")?
}

fn truncate_all(conn: &mut PgConnection) -> Result<()> {
    conn.batch_execute(
        "TRUNCATE TABLE notification_logs, jobs, service_closures, customer_feedback, \
         completion_records, installation_tasks, installation_jobs, dispatch_items, \
         dispatch_orders, sla_tracking, sla_policies, ticket_history, tickets, \
         document_sequences, products, customers, refresh_tokens, users, organizations \
         RESTART IDENTITY CASCADE;",
    )
    .context("failed to truncate tables")?;
    Ok(())
}
