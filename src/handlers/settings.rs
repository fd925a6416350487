use crate::error::{AppError, AppResult};
use crate::middleware::AuthUser;
use crate::response::ApiResponse;
use crate::services::settings::{Settings, SettingsPatch, SettingsService};
use axum::{response::IntoResponse, Extension, Json};
use sea_orm::DatabaseConnection;
use serde::Serialize;
use utoipa::ToSchema;

/// Subset of the settings that the reporting frontend needs before login.
#[derive(Debug, Serialize, ToSchema)]
pub struct PublicSettings {
    pub allow_anonymous_reporting: bool,
    pub require_email_verification: bool,
    #[schema(value_type = Object)]
    pub features: serde_json::Value,
    pub sla_hours: i32,
    pub city_logo_url: Option<String>,
    pub support_email: Option<String>,
    pub website_url: Option<String>,
}

impl From<Settings> for PublicSettings {
    fn from(s: Settings) -> Self {
        Self {
            allow_anonymous_reporting: s.allow_anonymous_reporting,
            require_email_verification: s.require_email_verification,
            features: s.features,
            sla_hours: s.sla_hours,
            city_logo_url: s.city_logo_url,
            support_email: s.support_email,
            website_url: s.website_url,
        }
    }
}

#[utoipa::path(
    get,
    path = "/api/v1/public/settings",
    responses((status = 200, description = "Public settings", body = PublicSettings)),
    tag = "settings"
)]
pub async fn get_public_settings(
    Extension(db): Extension<DatabaseConnection>,
) -> AppResult<impl IntoResponse> {
    let settings = SettingsService::new(db).load().await?;
    Ok(ApiResponse::ok(PublicSettings::from(settings)))
}

#[utoipa::path(
    get,
    path = "/api/v1/admin/settings",
    security(("jwt_token" = [])),
    responses(
        (status = 200, description = "All settings", body = Settings),
        (status = 403, description = "Admin only", body = AppError),
    ),
    tag = "settings"
)]
pub async fn get_settings(
    Extension(db): Extension<DatabaseConnection>,
    auth_user: AuthUser,
) -> AppResult<impl IntoResponse> {
    auth_user.require_admin()?;
    Ok(ApiResponse::ok(SettingsService::new(db).load().await?))
}

#[utoipa::path(
    put,
    path = "/api/v1/admin/settings",
    security(("jwt_token" = [])),
    request_body = SettingsPatch,
    responses(
        (status = 200, description = "Updated settings", body = Settings),
        (status = 400, description = "Validation error", body = AppError),
        (status = 403, description = "Super admin only", body = AppError),
    ),
    tag = "settings"
)]
pub async fn update_settings(
    Extension(db): Extension<DatabaseConnection>,
    auth_user: AuthUser,
    Json(patch): Json<SettingsPatch>,
) -> AppResult<impl IntoResponse> {
    auth_user.require_super_admin()?;
    let settings = SettingsService::new(db).update(patch).await?;
    tracing::info!(actor = auth_user.user_id, "Settings updated");
    Ok(ApiResponse::ok(settings))
}
