mod config;
mod error;
mod handlers;
mod middleware;
mod migration;
mod models;
mod response;
mod routes;
mod services;
mod utils;

use axum::{extract::Extension, response::IntoResponse, routing::get, Json, Router};
use handlers::push::PushPublicKey;
use sea_orm::{ConnectionTrait, DatabaseConnection, Statement};
use sea_orm_migration::MigratorTrait;
use serde_json::json;
use services::email::{build_mailer, EmailTemplates};
use services::notification::NotificationDispatcher;
use services::push::build_push_sender;
use services::storage::StorageService;
use std::env;
use std::net::SocketAddr;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

#[derive(OpenApi)]
#[openapi(
    paths(
        health_check,
        // Auth
        crate::handlers::register,
        crate::handlers::login,
        crate::handlers::auth::refresh_token,
        crate::handlers::auth::logout,
        crate::handlers::get_current_user,
        crate::handlers::update_profile,
        crate::handlers::change_password,
        crate::handlers::verify_email,
        crate::handlers::verify_code,
        crate::handlers::send_verification,
        crate::handlers::forgot_password,
        crate::handlers::reset_password,
        // Issues
        crate::handlers::issue::create_issue,
        crate::handlers::issue::list_issues,
        crate::handlers::issue::get_issue,
        crate::handlers::issue::update_status,
        crate::handlers::issue::reassign_issue,
        crate::handlers::issue::get_activity,
        crate::handlers::issue::get_related,
        crate::handlers::issue::bulk_update,
        // Comments
        crate::handlers::comment::list_comments,
        crate::handlers::comment::create_comment,
        // Stats
        crate::handlers::stats::summary,
        crate::handlers::stats::by_type,
        crate::handlers::stats::by_state,
        crate::handlers::stats::avg_resolve_time,
        crate::handlers::stats::sla,
        crate::handlers::stats::trend,
        crate::handlers::stats::top_contributors,
        crate::handlers::stats::recent_activity,
        // Issue types
        crate::handlers::issue_type::list_active,
        crate::handlers::issue_type::list_all,
        crate::handlers::issue_type::create,
        crate::handlers::issue_type::update,
        crate::handlers::issue_type::delete,
        crate::handlers::issue_type::stats,
        // Settings
        crate::handlers::settings::get_public_settings,
        crate::handlers::settings::get_settings,
        crate::handlers::settings::update_settings,
        // Push
        crate::handlers::push::public_key,
        crate::handlers::push::subscribe,
        crate::handlers::push::unsubscribe,
        // Admin
        crate::handlers::admin::list_users,
        crate::handlers::admin::create_user,
        crate::handlers::admin::update_user,
        crate::handlers::admin::delete_user,
        crate::handlers::admin::send_password_reset,
        crate::handlers::admin::user_stats,
        crate::handlers::admin::list_regions,
        crate::handlers::admin::add_region,
        crate::handlers::admin::remove_region,
    ),
    components(
        schemas(
            crate::response::ApiResponse<serde_json::Value>,
            crate::response::PaginatedResponse<serde_json::Value>,
            crate::error::AppError,
            crate::models::UserRole,
            crate::models::IssueStatus,
            // Auth
            crate::handlers::auth::RegisterRequest,
            crate::handlers::auth::LoginRequest,
            crate::handlers::auth::RefreshTokenRequest,
            crate::handlers::auth::AuthResponse,
            crate::handlers::auth::TokenResponse,
            crate::handlers::auth::UserResponse,
            crate::handlers::auth::MessageResponse,
            crate::handlers::auth::UpdateProfileRequest,
            crate::handlers::auth::ChangePasswordRequest,
            crate::handlers::auth::VerifyEmailRequest,
            crate::handlers::auth::VerifyCodeRequest,
            crate::handlers::auth::EmailRequest,
            crate::handlers::auth::ResetPasswordRequest,
            // Issues
            crate::handlers::issue::CreateIssueForm,
            crate::handlers::issue::UpdateStatusRequest,
            crate::handlers::issue::ReassignRequest,
            crate::handlers::issue::BulkRequest,
            crate::services::issue::IssueView,
            crate::services::issue::RelatedIssue,
            crate::services::issue::BulkAction,
            crate::services::issue::BulkOutcome,
            crate::services::issue::BulkFailure,
            crate::models::IssueActivityModel,
            // Comments
            crate::handlers::comment::CreateCommentRequest,
            crate::services::comment::CommentView,
            // Stats
            crate::services::stats::StatusSummary,
            crate::services::stats::TypeCount,
            crate::services::stats::StateCount,
            crate::services::stats::ResolveTime,
            crate::services::stats::SlaCompliance,
            crate::services::stats::TrendPoint,
            crate::services::stats::Contributor,
            crate::services::stats::RecentActivity,
            crate::services::stats::UserStats,
            // Issue types
            crate::handlers::issue_type::IssueTypeRequest,
            crate::services::issue_type::IssueTypeWithCount,
            crate::services::issue_type::IssueTypeStats,
            crate::models::IssueTypeModel,
            // Settings
            crate::services::settings::Settings,
            crate::services::settings::SettingsPatch,
            crate::handlers::settings::PublicSettings,
            // Push
            crate::handlers::push::SubscribeRequest,
            crate::handlers::push::SubscriptionKeys,
            crate::handlers::push::UnsubscribeRequest,
            crate::handlers::push::PublicKeyResponse,
            // Admin
            crate::services::admin::AdminUserView,
            crate::handlers::admin::CreateUserRequest,
            crate::handlers::admin::UpdateUserRequest,
            crate::handlers::admin::AddRegionRequest,
            crate::models::StaffRegionModel,
        )
    ),
    tags(
        (name = "auth", description = "Registration, login and account recovery"),
        (name = "issues", description = "Reporting and tracking civic issues"),
        (name = "comments", description = "Discussion on issues"),
        (name = "stats", description = "Aggregate reporting"),
        (name = "issue-types", description = "Category catalogue"),
        (name = "settings", description = "Runtime settings"),
        (name = "push", description = "Web Push subscriptions"),
        (name = "admin", description = "User and region administration"),
    )
)]
struct ApiDoc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "improve_city=debug,tower_http=debug,axum=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Validate configuration before doing anything else
    let jwt_config = validate_config()?;
    utils::jwt::init_jwt_config(jwt_config)?;

    tracing::info!("Starting Improve My City API v{}...", env!("CARGO_PKG_VERSION"));

    let db = config::database::get_database().await?;
    tracing::info!("Database connected successfully");

    migration::Migrator::up(&db, None).await?;
    tracing::info!("Database migrations applied successfully");

    services::bootstrap_admin::ensure_bootstrap_super_admin(&db).await?;

    let email_config = config::email::EmailConfig::from_env();
    let push_config = config::push::PushConfig::from_env();
    if push_config.is_none() {
        tracing::warn!("VAPID keys not configured, push notifications disabled");
    }
    let notifier = NotificationDispatcher::start(
        db.clone(),
        build_mailer(&email_config),
        build_push_sender(push_config.as_ref()),
        EmailTemplates::new(email_config.frontend_url.clone()),
        config::notification::NotificationConfig::from_env(),
    );
    let push_key = PushPublicKey(push_config.map(|c| c.public_key));

    let storage_config = config::storage::StorageConfig::from_env();
    let upload_dir = storage_config.local_dir().map(str::to_string);
    let storage = StorageService::new(storage_config);

    let app = create_app(upload_dir.as_deref())
        .layer(Extension(db))
        .layer(Extension(notifier))
        .layer(Extension(storage))
        .layer(Extension(push_key));

    let host = env::var("HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
    let port = env::var("PORT").unwrap_or_else(|_| "3000".to_string());
    let addr = format!("{}:{}", host, port);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Listening on http://{}", addr);
    tracing::info!("Swagger UI available at http://{}/swagger-ui/", addr);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    tracing::info!("Server shut down gracefully");
    Ok(())
}

/// Fail fast on missing required configuration.
fn validate_config() -> anyhow::Result<config::jwt::JwtConfig> {
    let jwt_config = config::jwt::JwtConfig::from_env()?;

    if env::var("DATABASE_URL").is_err() {
        return Err(anyhow::anyhow!(
            "DATABASE_URL environment variable must be set"
        ));
    }

    if let Some(dir) = config::storage::StorageConfig::from_env().local_dir() {
        std::fs::create_dir_all(dir)
            .map_err(|e| anyhow::anyhow!("Failed to create upload directory '{}': {}", dir, e))?;
    }

    Ok(jwt_config)
}

fn build_cors_layer() -> CorsLayer {
    use axum::http::{header, HeaderValue, Method};

    let origins_str = env::var("CORS_ORIGINS").unwrap_or_else(|_| "*".to_string());

    let cors = CorsLayer::new()
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::PATCH,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE]);

    if origins_str == "*" {
        cors.allow_origin(tower_http::cors::Any)
    } else {
        let origins: Vec<HeaderValue> = origins_str
            .split(',')
            .filter_map(|s| s.trim().parse().ok())
            .collect();
        cors.allow_origin(origins)
    }
}

fn create_app(upload_dir: Option<&str>) -> Router {
    let mut app = Router::new()
        .route("/health", get(health_check))
        .merge(routes::create_routes())
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()));

    if let Some(dir) = upload_dir {
        app = app.nest_service("/uploads", ServeDir::new(dir));
    }

    app.layer(
        ServiceBuilder::new()
            .layer(TraceLayer::new_for_http())
            .layer(build_cors_layer())
            .layer(axum::middleware::from_fn(
                middleware::security_headers_middleware,
            )),
    )
}

#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "Health check successful", body = serde_json::Value)
    )
)]
async fn health_check(Extension(db): Extension<DatabaseConnection>) -> impl IntoResponse {
    let db_ok = db
        .query_one(Statement::from_string(
            sea_orm::DatabaseBackend::Postgres,
            "SELECT 1".to_string(),
        ))
        .await
        .is_ok();

    let status = if db_ok { "ok" } else { "degraded" };

    Json(json!({
        "status": status,
        "service": "Improve My City API",
        "version": env!("CARGO_PKG_VERSION"),
        "database": db_ok,
    }))
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received, gracefully shutting down...");
}
