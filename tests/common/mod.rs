#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use reqwest::{Client, StatusCode};
use serde_json::{json, Value};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use uuid::Uuid;

use webhook_queue::config::Config;
use webhook_queue::handlers::{HandlerError, HandlerRegistry, WebhookHandler};
use webhook_queue::models::{JobStatus, QueueStats, WebhookJob};
use webhook_queue::queue::{
    JobStore, ManualClock, MemoryJobStore, PgJobStore, QueueSettings, StoreError, WebhookQueue,
};

pub fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap()
}

// ── Handlers ────────────────────────────────────────────────────

pub enum Behavior {
    Succeed,
    Fail(String),
    /// Fail the first n calls, then succeed.
    FailTimes(usize, String),
    Sleep(Duration),
    Panic,
}

/// Handler that records how often it ran and behaves as scripted.
pub struct ScriptedHandler {
    webhook_type: String,
    behavior: Behavior,
    calls: AtomicUsize,
}

impl ScriptedHandler {
    pub fn new(webhook_type: &str, behavior: Behavior) -> Arc<Self> {
        Arc::new(Self {
            webhook_type: webhook_type.to_string(),
            behavior,
            calls: AtomicUsize::new(0),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl WebhookHandler for ScriptedHandler {
    fn webhook_type(&self) -> &str {
        &self.webhook_type
    }

    async fn handle(&self, _payload: &Value) -> Result<(), HandlerError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        match &self.behavior {
            Behavior::Succeed => Ok(()),
            Behavior::Fail(msg) => Err(HandlerError::from(msg.as_str())),
            Behavior::FailTimes(n, msg) if call < *n => Err(HandlerError::from(msg.as_str())),
            Behavior::FailTimes(..) => Ok(()),
            Behavior::Sleep(d) => {
                tokio::time::sleep(*d).await;
                Ok(())
            }
            Behavior::Panic => panic!("handler blew up"),
        }
    }
}

pub fn registry(handlers: &[Arc<ScriptedHandler>]) -> HandlerRegistry {
    let mut registry = HandlerRegistry::new();
    for handler in handlers {
        registry.register(handler.clone());
    }
    registry
}

// ── Queue harness ───────────────────────────────────────────────

pub struct Harness {
    pub queue: Arc<WebhookQueue>,
    pub store: Arc<MemoryJobStore>,
    pub clock: Arc<ManualClock>,
}

impl Harness {
    pub async fn job(&self, id: Uuid) -> WebhookJob {
        self.queue
            .get_status(id)
            .await
            .expect("get_status failed")
            .expect("job missing")
    }

    pub async fn stats(&self) -> QueueStats {
        self.queue.stats().await.expect("stats failed")
    }
}

pub fn harness(handlers: HandlerRegistry) -> Harness {
    harness_with(handlers, QueueSettings::default())
}

pub fn harness_with(handlers: HandlerRegistry, settings: QueueSettings) -> Harness {
    let store = Arc::new(MemoryJobStore::new());
    let clock = Arc::new(ManualClock::new(t0()));
    let queue = WebhookQueue::new(store.clone(), handlers, settings).with_clock(clock.clone());

    Harness {
        queue: Arc::new(queue),
        store,
        clock,
    }
}

// ── Postgres harness ────────────────────────────────────────────

/// Queue over a fresh temporary Postgres database.
pub struct PgHarness {
    pub queue: Arc<WebhookQueue>,
    pub store: Arc<PgJobStore>,
    pub clock: Arc<ManualClock>,
    pub pool: PgPool,
    db_name: String,
}

impl PgHarness {
    pub async fn job(&self, id: Uuid) -> WebhookJob {
        self.queue
            .get_status(id)
            .await
            .expect("get_status failed")
            .expect("job missing")
    }

    /// Drop the test database.
    pub async fn cleanup(self) {
        let db_name = self.db_name.clone();
        drop(self.queue);
        drop(self.store);
        self.pool.close().await;

        let Some(base_url) = database_url() else {
            return;
        };
        let admin_pool = PgPoolOptions::new()
            .max_connections(2)
            .connect(&swap_database(&base_url, "postgres"))
            .await
            .expect("Failed to connect for cleanup");

        let _ = sqlx::query(&format!("DROP DATABASE IF EXISTS \"{db_name}\" WITH (FORCE)"))
            .execute(&admin_pool)
            .await;

        admin_pool.close().await;
    }
}

fn database_url() -> Option<String> {
    let _ = dotenvy::dotenv();
    std::env::var("DATABASE_URL").ok().filter(|url| !url.is_empty())
}

fn swap_database(url: &str, db_name: &str) -> String {
    url.rsplit_once('/')
        .map(|(base, _)| format!("{base}/{db_name}"))
        .unwrap_or_else(|| url.to_string())
}

/// Create a migrated test database. Returns None, and the calling test is
/// skipped, when `DATABASE_URL` is not set.
pub async fn pg_harness(handlers: HandlerRegistry) -> Option<PgHarness> {
    pg_harness_with(handlers, QueueSettings::default()).await
}

pub async fn pg_harness_with(handlers: HandlerRegistry, settings: QueueSettings) -> Option<PgHarness> {
    let Some(base_url) = database_url() else {
        eprintln!("DATABASE_URL not set, skipping Postgres test");
        return None;
    };

    let db_name = format!("webhook_queue_test_{}", Uuid::now_v7().simple());

    let admin_pool = PgPoolOptions::new()
        .max_connections(2)
        .connect(&swap_database(&base_url, "postgres"))
        .await
        .expect("Failed to connect to postgres for test DB creation");

    sqlx::query(&format!("CREATE DATABASE \"{db_name}\""))
        .execute(&admin_pool)
        .await
        .expect("Failed to create test database");

    admin_pool.close().await;

    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&swap_database(&base_url, &db_name))
        .await
        .expect("Failed to connect to test database");

    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .expect("Failed to run migrations on test database");

    let store = Arc::new(PgJobStore::new(pool.clone()));
    let clock = Arc::new(ManualClock::new(t0()));
    let queue = WebhookQueue::new(store.clone(), handlers, settings).with_clock(clock.clone());

    Some(PgHarness {
        queue: Arc::new(queue),
        store,
        clock,
        pool,
        db_name,
    })
}

/// Store whose every operation fails, standing in for an unreachable database.
pub struct UnavailableStore;

fn unavailable<T>() -> Result<T, StoreError> {
    Err(StoreError::Unavailable("connection refused".to_string()))
}

#[async_trait]
impl JobStore for UnavailableStore {
    async fn insert(&self, _: &str, _: &Value, _: DateTime<Utc>) -> Result<WebhookJob, StoreError> {
        unavailable()
    }

    async fn find_by_id(&self, _: Uuid) -> Result<Option<WebhookJob>, StoreError> {
        unavailable()
    }

    async fn list_pending(&self, _: i64) -> Result<Vec<WebhookJob>, StoreError> {
        unavailable()
    }

    async fn claim(&self, _: Uuid, _: DateTime<Utc>) -> Result<Option<WebhookJob>, StoreError> {
        unavailable()
    }

    async fn mark_completed(&self, _: Uuid, _: DateTime<Utc>) -> Result<bool, StoreError> {
        unavailable()
    }

    async fn record_failure(
        &self,
        _: Uuid,
        _: JobStatus,
        _: i32,
        _: &str,
        _: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        unavailable()
    }

    async fn reset_failed(&self, _: Uuid, _: DateTime<Utc>) -> Result<Option<WebhookJob>, StoreError> {
        unavailable()
    }

    async fn requeue_stale(&self, _: DateTime<Utc>, _: i32, _: &str, _: DateTime<Utc>) -> Result<u64, StoreError> {
        unavailable()
    }

    async fn delete_completed_before(&self, _: DateTime<Utc>) -> Result<u64, StoreError> {
        unavailable()
    }

    async fn stats(&self) -> Result<QueueStats, StoreError> {
        unavailable()
    }

    async fn list(&self, _: Option<JobStatus>, _: i64, _: i64) -> Result<Vec<WebhookJob>, StoreError> {
        unavailable()
    }

    async fn count(&self, _: Option<JobStatus>) -> Result<i64, StoreError> {
        unavailable()
    }
}

// ── HTTP app ────────────────────────────────────────────────────

/// A running test server backed by an in-memory store.
pub struct TestApp {
    pub addr: SocketAddr,
    pub queue: Arc<WebhookQueue>,
    pub client: Client,
}

impl TestApp {
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    /// POST a raw body to the webhook receiver.
    pub async fn deliver(&self, webhook_type: &str, body: &str) -> (Value, StatusCode) {
        let resp = self
            .client
            .post(self.url(&format!("/webhooks/{webhook_type}")))
            .header("content-type", "application/json")
            .body(body.to_string())
            .send()
            .await
            .expect("deliver request failed");
        let status = resp.status();
        let body: Value = resp.json().await.unwrap_or(json!(null));
        (body, status)
    }

    pub async fn get_auth(&self, path: &str, token: &str) -> (Value, StatusCode) {
        let resp = self
            .client
            .get(self.url(path))
            .bearer_auth(token)
            .send()
            .await
            .expect("get request failed");
        let status = resp.status();
        let body: Value = resp.json().await.unwrap_or(json!(null));
        (body, status)
    }

    pub async fn post_auth(&self, path: &str, token: &str, body: Option<&Value>) -> (Value, StatusCode) {
        let mut req = self.client.post(self.url(path)).bearer_auth(token);
        if let Some(body) = body {
            req = req.json(body);
        }
        let resp = req.send().await.expect("post request failed");
        let status = resp.status();
        let body: Value = resp.json().await.unwrap_or(json!(null));
        (body, status)
    }
}

pub const ADMIN_TOKEN: &str = "test-admin-token";

pub fn test_config(admin_token: Option<&str>) -> Config {
    Config {
        database_url: "postgres://unused".to_string(),
        host: "127.0.0.1".parse().unwrap(),
        port: 0,
        max_body_size: 64 * 1024,
        log_level: "warn".to_string(),
        admin_token: admin_token.map(str::to_string),
        poll_interval: Duration::from_secs(30),
        batch_size: 10,
        max_retries: 3,
        handler_timeout: Duration::from_secs(30),
        stale_after: Duration::from_secs(300),
        retention_days: 30,
        cleanup_interval: Duration::from_secs(86400),
    }
}

/// Spawn the app with the built-in handlers over an in-memory store.
pub async fn spawn_app() -> TestApp {
    spawn_app_with(Arc::new(MemoryJobStore::new())).await
}

pub async fn spawn_app_with(store: Arc<dyn JobStore>) -> TestApp {
    let config = test_config(Some(ADMIN_TOKEN));
    let queue = webhook_queue::build_queue(store, &config);
    let (app, _state) = webhook_queue::build_app(queue.clone(), config);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind to random port");
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        axum::serve(listener, app).await.expect("Server failed");
    });

    TestApp {
        addr,
        queue,
        client: Client::new(),
    }
}
