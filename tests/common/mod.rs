#![allow(dead_code)]

use async_trait::async_trait;
use improve_city::{
    config::{notification::NotificationConfig, rate_limit::RateLimitConfig, storage::StorageConfig},
    handlers::push::PushPublicKey,
    models::{issue, user, IssueStatus, UserRole},
    services::{
        email::{EmailMessage, EmailTemplates, Mailer},
        notification::NotificationDispatcher,
        push::{PushOutcome, PushSender},
        storage::StorageService,
    },
};
use reqwest::Client;
use sea_orm::{ActiveModelTrait, ConnectionTrait, DatabaseConnection, Statement};
use sea_orm_migration::MigratorTrait;
use std::net::SocketAddr;
use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc, Mutex, Once,
};
use std::time::Duration;
use tokio::sync::OnceCell;

static INIT: Once = Once::new();
static MIGRATIONS: OnceCell<()> = OnceCell::const_new();
static USER_COUNTER: AtomicUsize = AtomicUsize::new(0);

/// Tests share one database; hold this for the whole test.
static DB_LOCK: tokio::sync::Mutex<()> = tokio::sync::Mutex::const_new(());

pub const TEST_PASSWORD: &str = "test_password_123";

fn init_env() {
    INIT.call_once(|| {
        dotenv::dotenv().ok();
        std::env::set_var(
            "JWT_SECRET",
            "integration_test_secret_that_is_at_least_32_characters_long",
        );
        let config = improve_city::config::jwt::JwtConfig::from_env().unwrap();
        let _ = improve_city::utils::jwt::init_jwt_config(config);
    });
}

/// Records outgoing mail instead of sending it.
#[derive(Clone, Default)]
pub struct RecordingMailer {
    pub sent: Arc<Mutex<Vec<EmailMessage>>>,
}

#[async_trait]
impl Mailer for RecordingMailer {
    async fn send(&self, message: &EmailMessage) -> anyhow::Result<()> {
        self.sent.lock().unwrap().push(message.clone());
        Ok(())
    }
}

#[derive(Clone, Default)]
pub struct RecordingPush {
    pub endpoints: Arc<Mutex<Vec<String>>>,
}

#[async_trait]
impl PushSender for RecordingPush {
    async fn send(&self, endpoint: &str) -> anyhow::Result<PushOutcome> {
        self.endpoints.lock().unwrap().push(endpoint.to_string());
        Ok(PushOutcome::Delivered)
    }
}

pub struct TestApp {
    pub addr: String,
    pub db: DatabaseConnection,
    pub client: Client,
    pub mailer: RecordingMailer,
    pub push: RecordingPush,
    _guard: tokio::sync::MutexGuard<'static, ()>,
}

impl TestApp {
    pub fn url(&self, path: &str) -> String {
        format!("{}/api/v1{}", self.addr, path)
    }

    /// Poll until a mail to `to` arrives or the timeout elapses.
    pub async fn wait_for_mail(&self, to: &str) -> Option<EmailMessage> {
        for _ in 0..50 {
            let found = self
                .mailer
                .sent
                .lock()
                .unwrap()
                .iter()
                .find(|m| m.to.eq_ignore_ascii_case(to))
                .cloned();
            if found.is_some() {
                return found;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        None
    }

    pub fn mails_to(&self, to: &str) -> Vec<EmailMessage> {
        self.mailer
            .sent
            .lock()
            .unwrap()
            .iter()
            .filter(|m| m.to.eq_ignore_ascii_case(to))
            .cloned()
            .collect()
    }

    pub async fn set_settings(&self, sql_assignments: &str) {
        // Make sure the row exists before updating it.
        self.client
            .get(self.url("/public/settings"))
            .send()
            .await
            .unwrap();
        self.db
            .execute(Statement::from_string(
                sea_orm::DatabaseBackend::Postgres,
                format!("UPDATE app_settings SET {}", sql_assignments),
            ))
            .await
            .unwrap();
    }
}

pub async fn spawn_app() -> TestApp {
    let guard = DB_LOCK.lock().await;
    init_env();

    let database_url = std::env::var("TEST_DATABASE_URL")
        .unwrap_or_else(|_| std::env::var("DATABASE_URL").expect("DATABASE_URL must be set"));

    let db = sea_orm::Database::connect(&database_url)
        .await
        .expect("Failed to connect to test database");

    MIGRATIONS
        .get_or_init(|| async {
            improve_city::migration::Migrator::up(&db, None)
                .await
                .expect("Failed to run migrations");
        })
        .await;

    cleanup_tables(&db).await;

    let mailer = RecordingMailer::default();
    let push = RecordingPush::default();
    let notifier = NotificationDispatcher::start(
        db.clone(),
        Arc::new(mailer.clone()),
        Arc::new(push.clone()),
        EmailTemplates::new("http://localhost:5173"),
        NotificationConfig {
            initial_backoff: Duration::from_millis(10),
            ..NotificationConfig::default()
        },
    );
    let storage = StorageService::new(StorageConfig::Local {
        upload_dir: "./test_uploads".to_string(),
    });
    let rate_limits = RateLimitConfig {
        enabled: false,
        ..RateLimitConfig::default()
    };

    let app = axum::Router::new()
        .route("/health", axum::routing::get(|| async { "ok" }))
        .merge(improve_city::routes::create_routes_with(rate_limits))
        .layer(axum::middleware::from_fn(
            improve_city::middleware::security::security_headers_middleware,
        ))
        .layer(axum::extract::Extension(db.clone()))
        .layer(axum::extract::Extension(notifier))
        .layer(axum::extract::Extension(storage))
        .layer(axum::extract::Extension(PushPublicKey(Some(
            "BTestPublicKey".to_string(),
        ))));

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind random port");
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .await
        .unwrap();
    });

    TestApp {
        addr: format!("http://{}", addr),
        db,
        client: Client::new(),
        mailer,
        push,
        _guard: guard,
    }
}

async fn cleanup_tables(db: &DatabaseConnection) {
    let tables = [
        "refresh_tokens",
        "push_subscriptions",
        "issue_comments",
        "issue_activity",
        "issue_attachments",
        "issues",
        "staff_regions",
        "issue_types",
        "app_settings",
        "users",
    ];

    for table in tables {
        let sql = format!("TRUNCATE TABLE {} RESTART IDENTITY CASCADE", table);
        let _ = db
            .execute(Statement::from_string(
                sea_orm::DatabaseBackend::Postgres,
                sql,
            ))
            .await;
    }
}

/// Register a citizen through the API and return (user_id, access_token).
pub async fn register_citizen(app: &TestApp, prefix: &str) -> (i32, String) {
    let n = USER_COUNTER.fetch_add(1, Ordering::SeqCst);
    let email = format!("{}_{}@test.com", prefix, n);

    let resp = app
        .client
        .post(app.url("/auth/register"))
        .json(&serde_json::json!({
            "name": format!("{} {}", prefix, n),
            "email": email,
            "password": TEST_PASSWORD,
        }))
        .send()
        .await
        .expect("Failed to register user");

    let status = resp.status();
    let body: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(status, 201, "register failed: {}", body);

    let user_id = body["data"]["user"]["id"].as_i64().unwrap() as i32;
    let token = body["data"]["access_token"].as_str().unwrap().to_string();
    (user_id, token)
}

/// Insert a verified account with `role` directly and mint an access token.
pub async fn create_user_with_role(app: &TestApp, prefix: &str, role: UserRole) -> (i32, String) {
    let n = USER_COUNTER.fetch_add(1, Ordering::SeqCst);
    let user = user::ActiveModel {
        email: sea_orm::ActiveValue::Set(format!("{}_{}@test.com", prefix, n)),
        hashed_password: sea_orm::ActiveValue::Set(
            improve_city::utils::hash_password(TEST_PASSWORD).unwrap(),
        ),
        name: sea_orm::ActiveValue::Set(format!("{} {}", prefix, n)),
        mobile: sea_orm::ActiveValue::Set(None),
        role: sea_orm::ActiveValue::Set(role),
        is_active: sea_orm::ActiveValue::Set(true),
        is_verified: sea_orm::ActiveValue::Set(true),
        email_verify_code: sea_orm::ActiveValue::Set(None),
        email_verify_expires_at: sea_orm::ActiveValue::Set(None),
        last_login: sea_orm::ActiveValue::Set(None),
        created_at: sea_orm::ActiveValue::Set(chrono::Utc::now().naive_utc()),
        ..Default::default()
    }
    .insert(&app.db)
    .await
    .expect("Failed to insert user");

    let token = improve_city::utils::encode_access_token(user.id, role).unwrap();
    (user.id, token)
}

pub async fn email_of(app: &TestApp, user_id: i32) -> String {
    use sea_orm::EntityTrait;
    improve_city::models::User::find_by_id(user_id)
        .one(&app.db)
        .await
        .unwrap()
        .unwrap()
        .email
}

pub async fn add_region(app: &TestApp, user_id: i32, state_code: &str) {
    improve_city::models::staff_region::ActiveModel {
        user_id: sea_orm::ActiveValue::Set(user_id),
        state_code: sea_orm::ActiveValue::Set(state_code.to_string()),
        ..Default::default()
    }
    .insert(&app.db)
    .await
    .unwrap();
}

/// Multipart report form with the given coordinates.
pub fn issue_form(title: &str, category: &str, lat: f64, lng: f64) -> reqwest::multipart::Form {
    reqwest::multipart::Form::new()
        .text("title", title.to_string())
        .text("description", "Reported from an integration test")
        .text("category", category.to_string())
        .text("lat", lat.to_string())
        .text("lng", lng.to_string())
        .text("country", "IN")
        .text("state_code", "KA")
}

/// Submit a report through the API and return its id.
pub async fn create_issue(app: &TestApp, token: &str, title: &str, lat: f64, lng: f64) -> i32 {
    let resp = app
        .client
        .post(app.url("/issues"))
        .bearer_auth(token)
        .multipart(issue_form(title, "Pothole", lat, lng).text("bypass_duplicate_check", "true"))
        .send()
        .await
        .expect("Failed to create issue");
    let status = resp.status();
    let body: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(status, 201, "create issue failed: {}", body);
    body["data"]["id"].as_i64().unwrap() as i32
}

/// Insert an issue row directly, for tests that need control over timestamps.
pub async fn insert_issue(
    app: &TestApp,
    creator: Option<i32>,
    status: IssueStatus,
    created_at: chrono::NaiveDateTime,
    resolved_at: Option<chrono::NaiveDateTime>,
) -> i32 {
    issue::ActiveModel {
        title: sea_orm::ActiveValue::Set("Seeded issue".to_string()),
        description: sea_orm::ActiveValue::Set(None),
        category: sea_orm::ActiveValue::Set(Some("Garbage".to_string())),
        status: sea_orm::ActiveValue::Set(status),
        lat: sea_orm::ActiveValue::Set(Some(12.9716)),
        lng: sea_orm::ActiveValue::Set(Some(77.5946)),
        address: sea_orm::ActiveValue::Set(None),
        country: sea_orm::ActiveValue::Set(Some("IN".to_string())),
        state_code: sea_orm::ActiveValue::Set(Some("KA".to_string())),
        created_by_id: sea_orm::ActiveValue::Set(creator),
        assigned_to_id: sea_orm::ActiveValue::Set(None),
        created_at: sea_orm::ActiveValue::Set(created_at),
        updated_at: sea_orm::ActiveValue::Set(None),
        in_progress_at: sea_orm::ActiveValue::Set(None),
        resolved_at: sea_orm::ActiveValue::Set(resolved_at),
        ..Default::default()
    }
    .insert(&app.db)
    .await
    .unwrap()
    .id
}

/// Seed `count` open issues already owned by `assignee`.
pub async fn seed_open_issues(app: &TestApp, assignee: i32, count: usize) {
    for _ in 0..count {
        let id = insert_issue(
            app,
            None,
            IssueStatus::Pending,
            chrono::Utc::now().naive_utc(),
            None,
        )
        .await;
        app.db
            .execute(Statement::from_sql_and_values(
                sea_orm::DatabaseBackend::Postgres,
                "UPDATE issues SET assigned_to_id = $1 WHERE id = $2",
                [assignee.into(), id.into()],
            ))
            .await
            .unwrap();
    }
}

pub async fn json(resp: reqwest::Response) -> (u16, serde_json::Value) {
    let status = resp.status().as_u16();
    let body = resp.json().await.unwrap_or(serde_json::Value::Null);
    (status, body)
}
