use crate::error::{AppError, AppResult};
use crate::middleware::AuthUser;
use crate::response::ApiResponse;
use crate::services::comment::{CommentService, CommentView};
use crate::services::notification::NotificationDispatcher;
use axum::{extract::Path, response::IntoResponse, Extension, Json};
use sea_orm::DatabaseConnection;
use serde::Deserialize;
use utoipa::ToSchema;

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateCommentRequest {
    /// Plain text, 1-2000 characters
    pub body: String,
}

#[utoipa::path(
    get,
    path = "/api/v1/issues/{id}/comments",
    params(("id" = i32, Path, description = "Issue ID")),
    responses(
        (status = 200, description = "Comments, newest first", body = Vec<CommentView>),
        (status = 404, description = "Issue not found", body = AppError),
    ),
    tag = "comments"
)]
pub async fn list_comments(
    Extension(db): Extension<DatabaseConnection>,
    Path(issue_id): Path<i32>,
) -> AppResult<impl IntoResponse> {
    Ok(ApiResponse::ok(CommentService::new(db).list(issue_id).await?))
}

#[utoipa::path(
    post,
    path = "/api/v1/issues/{id}/comments",
    security(("jwt_token" = [])),
    params(("id" = i32, Path, description = "Issue ID")),
    request_body = CreateCommentRequest,
    responses(
        (status = 201, description = "Comment added", body = CommentView),
        (status = 400, description = "Empty or too long", body = AppError),
        (status = 401, description = "Unauthorized", body = AppError),
        (status = 404, description = "Issue not found", body = AppError),
    ),
    tag = "comments"
)]
pub async fn create_comment(
    Extension(db): Extension<DatabaseConnection>,
    Extension(notifier): Extension<NotificationDispatcher>,
    auth_user: AuthUser,
    Path(issue_id): Path<i32>,
    Json(payload): Json<CreateCommentRequest>,
) -> AppResult<impl IntoResponse> {
    let comment = CommentService::new(db)
        .add(issue_id, auth_user.user_id, &payload.body, &notifier)
        .await?;
    Ok(ApiResponse::created(comment))
}
