use crate::error::{AppError, AppResult};
use crate::handlers::auth::{validate_payload, MessageResponse};
use crate::middleware::AuthUser;
use crate::models::{StaffRegionModel, UserRole};
use crate::response::ApiResponse;
use crate::services::admin::{AdminService, AdminUserView, NewStaffUser, UserFilter, UserUpdate};
use crate::services::notification::NotificationDispatcher;
use crate::services::region::RegionService;
use crate::services::stats::{StatsService, UserStats};
use axum::{extract::Path, extract::Query, response::IntoResponse, Extension, Json};
use sea_orm::DatabaseConnection;
use serde::Deserialize;
use utoipa::ToSchema;
use validator::Validate;

#[derive(Debug, Default, Deserialize)]
pub struct UserListQuery {
    pub q: Option<String>,
    pub role: Option<String>,
    pub is_active: Option<bool>,
    pub is_verified: Option<bool>,
}

impl UserListQuery {
    fn into_filter(self) -> AppResult<UserFilter> {
        let role = match self.role.as_deref().map(str::trim).filter(|r| !r.is_empty()) {
            Some(raw) => Some(
                UserRole::parse(raw).ok_or_else(|| AppError::validation("Unknown role"))?,
            ),
            None => None,
        };
        Ok(UserFilter {
            q: self.q,
            role,
            is_active: self.is_active,
            is_verified: self.is_verified,
        })
    }
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct CreateUserRequest {
    #[validate(email(message = "Invalid email address"))]
    pub email: String,
    #[validate(length(min = 1, max = 100))]
    pub name: String,
    /// `staff` or `admin`
    pub role: UserRole,
    /// Optional initial region (state code)
    pub region: Option<String>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct UpdateUserRequest {
    pub role: Option<UserRole>,
    pub is_active: Option<bool>,
    pub name: Option<String>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct AddRegionRequest {
    pub state_code: String,
}

#[utoipa::path(
    get,
    path = "/api/v1/admin/users",
    security(("jwt_token" = [])),
    params(
        ("q" = Option<String>, Query, description = "Matches name or email"),
        ("role" = Option<String>, Query, description = "citizen, staff, admin or super_admin"),
        ("is_active" = Option<bool>, Query, description = "Filter by active flag"),
        ("is_verified" = Option<bool>, Query, description = "Filter by verified flag"),
    ),
    responses(
        (status = 200, description = "Accounts, newest first", body = Vec<AdminUserView>),
        (status = 403, description = "Admin only", body = AppError),
    ),
    tag = "admin"
)]
pub async fn list_users(
    Extension(db): Extension<DatabaseConnection>,
    auth_user: AuthUser,
    Query(query): Query<UserListQuery>,
) -> AppResult<impl IntoResponse> {
    auth_user.require_admin()?;
    let filter = query.into_filter()?;
    Ok(ApiResponse::ok(AdminService::new(db).list_users(&filter).await?))
}

#[utoipa::path(
    post,
    path = "/api/v1/admin/users",
    security(("jwt_token" = [])),
    request_body = CreateUserRequest,
    responses(
        (status = 201, description = "Staff or admin account created", body = AdminUserView),
        (status = 400, description = "Validation error or email taken", body = AppError),
        (status = 403, description = "Super admin only", body = AppError),
    ),
    tag = "admin"
)]
pub async fn create_user(
    Extension(db): Extension<DatabaseConnection>,
    Extension(notifier): Extension<NotificationDispatcher>,
    auth_user: AuthUser,
    Json(payload): Json<CreateUserRequest>,
) -> AppResult<impl IntoResponse> {
    validate_payload(&payload)?;
    let input = NewStaffUser {
        email: payload.email,
        name: payload.name,
        role: payload.role,
        region: payload.region,
    };
    let user = AdminService::new(db)
        .create_user(&auth_user, input, &notifier)
        .await?;
    Ok(ApiResponse::created(user))
}

#[utoipa::path(
    put,
    path = "/api/v1/admin/users/{id}",
    security(("jwt_token" = [])),
    params(("id" = i32, Path, description = "User ID")),
    request_body = UpdateUserRequest,
    responses(
        (status = 200, description = "Account updated", body = AdminUserView),
        (status = 400, description = "Rejected change", body = AppError),
        (status = 403, description = "Insufficient role", body = AppError),
        (status = 404, description = "User not found", body = AppError),
    ),
    tag = "admin"
)]
pub async fn update_user(
    Extension(db): Extension<DatabaseConnection>,
    auth_user: AuthUser,
    Path(user_id): Path<i32>,
    Json(payload): Json<UpdateUserRequest>,
) -> AppResult<impl IntoResponse> {
    let update = UserUpdate {
        role: payload.role,
        is_active: payload.is_active,
        name: payload.name,
    };
    let user = AdminService::new(db)
        .update_user(&auth_user, user_id, update)
        .await?;
    Ok(ApiResponse::ok(user))
}

#[utoipa::path(
    delete,
    path = "/api/v1/admin/users/{id}",
    security(("jwt_token" = [])),
    params(("id" = i32, Path, description = "User ID")),
    responses(
        (status = 200, description = "Account deleted", body = MessageResponse),
        (status = 400, description = "Account cannot be deleted", body = AppError),
        (status = 403, description = "Super admin only", body = AppError),
        (status = 404, description = "User not found", body = AppError),
    ),
    tag = "admin"
)]
pub async fn delete_user(
    Extension(db): Extension<DatabaseConnection>,
    auth_user: AuthUser,
    Path(user_id): Path<i32>,
) -> AppResult<impl IntoResponse> {
    AdminService::new(db).delete_user(&auth_user, user_id).await?;
    Ok(ApiResponse::ok(MessageResponse::new("User deleted")))
}

#[utoipa::path(
    post,
    path = "/api/v1/admin/users/{id}/reset-password",
    security(("jwt_token" = [])),
    params(("id" = i32, Path, description = "User ID")),
    responses(
        (status = 200, description = "Reset link queued", body = MessageResponse),
        (status = 403, description = "Admin only", body = AppError),
        (status = 404, description = "User not found", body = AppError),
    ),
    tag = "admin"
)]
pub async fn send_password_reset(
    Extension(db): Extension<DatabaseConnection>,
    Extension(notifier): Extension<NotificationDispatcher>,
    auth_user: AuthUser,
    Path(user_id): Path<i32>,
) -> AppResult<impl IntoResponse> {
    auth_user.require_admin()?;
    AdminService::new(db)
        .send_password_reset(user_id, &notifier)
        .await?;
    Ok(ApiResponse::ok(MessageResponse::new("Password reset email sent")))
}

#[utoipa::path(
    get,
    path = "/api/v1/admin/users/{id}/stats",
    security(("jwt_token" = [])),
    params(("id" = i32, Path, description = "User ID")),
    responses(
        (status = 200, description = "Per-user workload", body = UserStats),
        (status = 403, description = "Admin only", body = AppError),
        (status = 404, description = "User not found", body = AppError),
    ),
    tag = "admin"
)]
pub async fn user_stats(
    Extension(db): Extension<DatabaseConnection>,
    auth_user: AuthUser,
    Path(user_id): Path<i32>,
) -> AppResult<impl IntoResponse> {
    auth_user.require_admin()?;
    Ok(ApiResponse::ok(StatsService::new(db).user_stats(user_id).await?))
}

#[utoipa::path(
    get,
    path = "/api/v1/admin/users/{id}/regions",
    security(("jwt_token" = [])),
    params(("id" = i32, Path, description = "User ID")),
    responses(
        (status = 200, description = "Regions assigned to the user", body = Vec<StaffRegionModel>),
        (status = 403, description = "Admin only", body = AppError),
    ),
    tag = "admin"
)]
pub async fn list_regions(
    Extension(db): Extension<DatabaseConnection>,
    auth_user: AuthUser,
    Path(user_id): Path<i32>,
) -> AppResult<impl IntoResponse> {
    auth_user.require_admin()?;
    Ok(ApiResponse::ok(RegionService::new(db).list(user_id).await?))
}

#[utoipa::path(
    post,
    path = "/api/v1/admin/users/{id}/regions",
    security(("jwt_token" = [])),
    params(("id" = i32, Path, description = "User ID")),
    request_body = AddRegionRequest,
    responses(
        (status = 201, description = "Region assigned", body = StaffRegionModel),
        (status = 400, description = "Bad state code or already assigned", body = AppError),
        (status = 403, description = "Admin only", body = AppError),
        (status = 404, description = "User not found", body = AppError),
    ),
    tag = "admin"
)]
pub async fn add_region(
    Extension(db): Extension<DatabaseConnection>,
    auth_user: AuthUser,
    Path(user_id): Path<i32>,
    Json(payload): Json<AddRegionRequest>,
) -> AppResult<impl IntoResponse> {
    auth_user.require_admin()?;
    let region = RegionService::new(db)
        .add(user_id, &payload.state_code)
        .await?;
    Ok(ApiResponse::created(region))
}

#[utoipa::path(
    delete,
    path = "/api/v1/admin/regions/{id}",
    security(("jwt_token" = [])),
    params(("id" = i32, Path, description = "Region assignment ID")),
    responses(
        (status = 200, description = "Region removed", body = MessageResponse),
        (status = 403, description = "Admin only", body = AppError),
        (status = 404, description = "Not found", body = AppError),
    ),
    tag = "admin"
)]
pub async fn remove_region(
    Extension(db): Extension<DatabaseConnection>,
    auth_user: AuthUser,
    Path(region_id): Path<i32>,
) -> AppResult<impl IntoResponse> {
    auth_user.require_admin()?;
    RegionService::new(db).remove(region_id).await?;
    Ok(ApiResponse::ok(MessageResponse::new("Region removed")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_filter_is_parsed() {
        let query = UserListQuery {
            role: Some("staff".to_string()),
            ..Default::default()
        };
        assert_eq!(query.into_filter().unwrap().role, Some(UserRole::Staff));
    }

    #[test]
    fn blank_role_filter_is_ignored() {
        let query = UserListQuery {
            role: Some("  ".to_string()),
            ..Default::default()
        };
        assert!(query.into_filter().unwrap().role.is_none());
    }

    #[test]
    fn unknown_role_filter_is_rejected() {
        let query = UserListQuery {
            role: Some("mayor".to_string()),
            ..Default::default()
        };
        assert!(matches!(query.into_filter(), Err(AppError::Validation(_))));
    }
}
