use crate::error::{AppError, AppResult};
use crate::handlers::auth::MessageResponse;
use crate::middleware::AuthUser;
use crate::models::IssueTypeModel;
use crate::response::ApiResponse;
use crate::services::issue_type::{
    IssueTypeInput, IssueTypeService, IssueTypeStats, IssueTypeWithCount,
};
use axum::{extract::Path, response::IntoResponse, Extension, Json};
use sea_orm::DatabaseConnection;
use serde::Deserialize;
use utoipa::ToSchema;

#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct IssueTypeRequest {
    /// 3-40 characters, unique ignoring case
    pub name: Option<String>,
    pub description: Option<String>,
    /// Hex color such as `#4f46e5`
    pub color: Option<String>,
    pub display_order: Option<i32>,
    pub is_active: Option<bool>,
}

impl From<IssueTypeRequest> for IssueTypeInput {
    fn from(r: IssueTypeRequest) -> Self {
        Self {
            name: r.name,
            description: r.description,
            color: r.color,
            display_order: r.display_order,
            is_active: r.is_active,
        }
    }
}

#[utoipa::path(
    get,
    path = "/api/v1/issue-types",
    responses((status = 200, description = "Active categories in display order", body = Vec<IssueTypeModel>)),
    tag = "issue-types"
)]
pub async fn list_active(
    Extension(db): Extension<DatabaseConnection>,
) -> AppResult<impl IntoResponse> {
    Ok(ApiResponse::ok(IssueTypeService::new(db).list_active().await?))
}

#[utoipa::path(
    get,
    path = "/api/v1/admin/issue-types",
    security(("jwt_token" = [])),
    responses(
        (status = 200, description = "All categories with usage counts", body = Vec<IssueTypeWithCount>),
        (status = 403, description = "Admin only", body = AppError),
    ),
    tag = "issue-types"
)]
pub async fn list_all(
    Extension(db): Extension<DatabaseConnection>,
    auth_user: AuthUser,
) -> AppResult<impl IntoResponse> {
    auth_user.require_admin()?;
    Ok(ApiResponse::ok(
        IssueTypeService::new(db).list_with_counts().await?,
    ))
}

#[utoipa::path(
    post,
    path = "/api/v1/admin/issue-types",
    security(("jwt_token" = [])),
    request_body = IssueTypeRequest,
    responses(
        (status = 201, description = "Category created", body = IssueTypeModel),
        (status = 400, description = "Invalid or duplicate name", body = AppError),
        (status = 403, description = "Admin only", body = AppError),
    ),
    tag = "issue-types"
)]
pub async fn create(
    Extension(db): Extension<DatabaseConnection>,
    auth_user: AuthUser,
    Json(payload): Json<IssueTypeRequest>,
) -> AppResult<impl IntoResponse> {
    auth_user.require_admin()?;
    let created = IssueTypeService::new(db).create(payload.into()).await?;
    Ok(ApiResponse::created(created))
}

#[utoipa::path(
    put,
    path = "/api/v1/admin/issue-types/{id}",
    security(("jwt_token" = [])),
    params(("id" = i32, Path, description = "Issue type ID")),
    request_body = IssueTypeRequest,
    responses(
        (status = 200, description = "Category updated", body = IssueTypeModel),
        (status = 400, description = "Invalid or duplicate name", body = AppError),
        (status = 403, description = "Admin only", body = AppError),
        (status = 404, description = "Not found", body = AppError),
    ),
    tag = "issue-types"
)]
pub async fn update(
    Extension(db): Extension<DatabaseConnection>,
    auth_user: AuthUser,
    Path(id): Path<i32>,
    Json(payload): Json<IssueTypeRequest>,
) -> AppResult<impl IntoResponse> {
    auth_user.require_admin()?;
    let updated = IssueTypeService::new(db).update(id, payload.into()).await?;
    Ok(ApiResponse::ok(updated))
}

#[utoipa::path(
    delete,
    path = "/api/v1/admin/issue-types/{id}",
    security(("jwt_token" = [])),
    params(("id" = i32, Path, description = "Issue type ID")),
    responses(
        (status = 200, description = "Category deleted", body = MessageResponse),
        (status = 400, description = "Category still in use", body = AppError),
        (status = 403, description = "Admin only", body = AppError),
        (status = 404, description = "Not found", body = AppError),
    ),
    tag = "issue-types"
)]
pub async fn delete(
    Extension(db): Extension<DatabaseConnection>,
    auth_user: AuthUser,
    Path(id): Path<i32>,
) -> AppResult<impl IntoResponse> {
    auth_user.require_admin()?;
    IssueTypeService::new(db).delete(id).await?;
    Ok(ApiResponse::ok(MessageResponse::new("Issue type deleted")))
}

#[utoipa::path(
    get,
    path = "/api/v1/admin/issue-types/{id}/stats",
    security(("jwt_token" = [])),
    params(("id" = i32, Path, description = "Issue type ID")),
    responses(
        (status = 200, description = "Usage of one category", body = IssueTypeStats),
        (status = 403, description = "Admin only", body = AppError),
        (status = 404, description = "Not found", body = AppError),
    ),
    tag = "issue-types"
)]
pub async fn stats(
    Extension(db): Extension<DatabaseConnection>,
    auth_user: AuthUser,
    Path(id): Path<i32>,
) -> AppResult<impl IntoResponse> {
    auth_user.require_admin()?;
    Ok(ApiResponse::ok(IssueTypeService::new(db).stats(id).await?))
}
