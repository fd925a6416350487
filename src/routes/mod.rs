use crate::config::rate_limit::{RateLimitConfig, RateLimitRule};
use crate::handlers;
use crate::middleware::{auth_middleware, optional_auth_middleware};
use axum::{extract::DefaultBodyLimit, middleware, routing, Router};
use tower_governor::{governor::GovernorConfigBuilder, GovernorLayer};

/// Ten 2 MB photos plus the text fields and multipart framing.
const SUBMIT_BODY_LIMIT: usize = 24 * 1024 * 1024;

pub fn create_routes() -> Router {
    create_routes_with(RateLimitConfig::from_env())
}

pub fn create_routes_with(rate_limit_config: RateLimitConfig) -> Router {
    Router::new().nest("/api/v1", api_routes(&rate_limit_config))
}

fn api_routes(config: &RateLimitConfig) -> Router {
    let auth = auth_routes(config);
    let public_read = public_read_routes(config);
    let optional = optional_auth_routes(config).layer(middleware::from_fn(optional_auth_middleware));
    let submit = submit_routes(config).layer(middleware::from_fn(optional_auth_middleware));
    let protected = protected_routes(config).layer(middleware::from_fn(auth_middleware));

    auth.merge(public_read)
        .merge(optional)
        .merge(submit)
        .merge(protected)
}

/// Account creation, login and token redemption.
fn auth_routes(config: &RateLimitConfig) -> Router {
    let router = Router::new()
        .route("/auth/register", routing::post(handlers::register))
        .route("/auth/login", routing::post(handlers::login))
        .route("/auth/refresh", routing::post(handlers::auth::refresh_token))
        .route("/auth/verify-email", routing::post(handlers::verify_email))
        .route("/auth/verify-code", routing::post(handlers::verify_code))
        .route(
            "/auth/send-verify",
            routing::post(handlers::send_verification),
        )
        .route("/auth/forgot", routing::post(handlers::forgot_password))
        .route("/auth/reset", routing::post(handlers::reset_password));

    with_optional_rate_limit(router, config.enabled, config.auth)
}

/// Anonymous reads.
fn public_read_routes(config: &RateLimitConfig) -> Router {
    let router = Router::new()
        // Issues
        .route("/issues/{id}", routing::get(handlers::issue::get_issue))
        .route(
            "/issues/{id}/activity",
            routing::get(handlers::issue::get_activity),
        )
        .route(
            "/issues/{id}/related",
            routing::get(handlers::issue::get_related),
        )
        .route(
            "/issues/{id}/comments",
            routing::get(handlers::comment::list_comments),
        )
        // Stats
        .route("/issues/stats", routing::get(handlers::stats::summary))
        .route("/issues/stats/by-type", routing::get(handlers::stats::by_type))
        .route(
            "/issues/stats/by-state",
            routing::get(handlers::stats::by_state),
        )
        .route(
            "/issues/stats/avg-resolve-time",
            routing::get(handlers::stats::avg_resolve_time),
        )
        .route("/issues/stats/sla", routing::get(handlers::stats::sla))
        .route("/issues/stats/trend", routing::get(handlers::stats::trend))
        .route(
            "/issues/stats/top-contributors",
            routing::get(handlers::stats::top_contributors),
        )
        .route(
            "/issues/stats/recent-activity",
            routing::get(handlers::stats::recent_activity),
        )
        // Catalogue and settings
        .route(
            "/issue-types",
            routing::get(handlers::issue_type::list_active),
        )
        .route(
            "/public/settings",
            routing::get(handlers::settings::get_public_settings),
        )
        .route("/push/public-key", routing::get(handlers::push::public_key));

    with_optional_rate_limit(router, config.enabled, config.public_read)
}

/// Reads whose result depends on who is asking (`mine=true`).
fn optional_auth_routes(config: &RateLimitConfig) -> Router {
    let router = Router::new().route("/issues", routing::get(handlers::issue::list_issues));

    with_optional_rate_limit(router, config.enabled, config.public_read)
}

/// Issue submission. Anonymous callers are let through and checked
/// against the settings by the handler.
fn submit_routes(config: &RateLimitConfig) -> Router {
    let router = Router::new()
        .route("/issues", routing::post(handlers::issue::create_issue))
        .layer(DefaultBodyLimit::max(SUBMIT_BODY_LIMIT));

    with_optional_rate_limit(router, config.enabled, config.submit)
}

/// Everything that needs a logged-in user.
fn protected_routes(config: &RateLimitConfig) -> Router {
    let router = Router::new()
        // Auth
        .route("/auth/me", routing::get(handlers::get_current_user))
        .route("/auth/logout", routing::post(handlers::logout))
        .route("/auth/profile", routing::put(handlers::update_profile))
        .route("/auth/password", routing::put(handlers::change_password))
        // Issues
        .route(
            "/issues/{id}",
            routing::patch(handlers::issue::reassign_issue),
        )
        .route(
            "/issues/{id}/status",
            routing::patch(handlers::issue::update_status),
        )
        .route(
            "/issues/{id}/comments",
            routing::post(handlers::comment::create_comment),
        )
        .route("/issues/bulk", routing::post(handlers::issue::bulk_update))
        // Push
        .route("/push/subscribe", routing::post(handlers::push::subscribe))
        .route(
            "/push/unsubscribe",
            routing::post(handlers::push::unsubscribe),
        )
        // Admin: users
        .route(
            "/admin/users",
            routing::get(handlers::admin::list_users).post(handlers::admin::create_user),
        )
        .route(
            "/admin/users/{id}",
            routing::put(handlers::admin::update_user).delete(handlers::admin::delete_user),
        )
        .route(
            "/admin/users/{id}/reset-password",
            routing::post(handlers::admin::send_password_reset),
        )
        .route(
            "/admin/users/{id}/stats",
            routing::get(handlers::admin::user_stats),
        )
        // Admin: regions
        .route(
            "/admin/users/{id}/regions",
            routing::get(handlers::admin::list_regions).post(handlers::admin::add_region),
        )
        .route(
            "/admin/regions/{id}",
            routing::delete(handlers::admin::remove_region),
        )
        // Admin: settings
        .route(
            "/admin/settings",
            routing::get(handlers::settings::get_settings)
                .put(handlers::settings::update_settings),
        )
        // Admin: issue types
        .route(
            "/admin/issue-types",
            routing::get(handlers::issue_type::list_all).post(handlers::issue_type::create),
        )
        .route(
            "/admin/issue-types/{id}",
            routing::put(handlers::issue_type::update).delete(handlers::issue_type::delete),
        )
        .route(
            "/admin/issue-types/{id}/stats",
            routing::get(handlers::issue_type::stats),
        );

    with_optional_rate_limit(router, config.enabled, config.protected)
}

fn with_optional_rate_limit(router: Router, enabled: bool, rule: RateLimitRule) -> Router {
    if !enabled {
        return router;
    }

    let governor_conf = GovernorConfigBuilder::default()
        .per_second(rule.replenish_secs)
        .burst_size(rule.burst_size)
        .finish();

    match governor_conf {
        Some(conf) => router.layer(GovernorLayer::new(conf)),
        None => {
            tracing::error!(?rule, "Invalid rate limit rule, leaving routes unlimited");
            router
        }
    }
}
