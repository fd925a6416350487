use crate::error::{AppError, AppResult};
use crate::middleware::{AuthUser, MaybeAuthUser};
use crate::models::{IssueActivityModel, IssueStatus};
use crate::response::{ApiResponse, PaginatedResponse};
use crate::services::issue::{
    BulkAction, BulkCommand, BulkOutcome, IssueService, IssueView, NewIssue, RelatedIssue,
};
use crate::services::notification::NotificationDispatcher;
use crate::services::query::{IssueFilter, IssueQueryService};
use crate::services::storage::{PhotoUpload, StorageService, MAX_FILES};
use axum::{
    extract::{multipart::MultipartError, Multipart, Path, Query},
    http::StatusCode,
    response::IntoResponse,
    Extension, Json,
};
use sea_orm::DatabaseConnection;
use serde::Deserialize;
use utoipa::ToSchema;
use validator::Validate;

/// Multipart fields accepted by `POST /issues`.
#[derive(Debug, ToSchema)]
#[allow(dead_code)]
pub struct CreateIssueForm {
    /// 3-200 characters
    pub title: String,
    pub description: Option<String>,
    pub category: Option<String>,
    pub lat: Option<f64>,
    pub lng: Option<f64>,
    pub address: Option<String>,
    /// Only `IN` is accepted
    pub country: Option<String>,
    pub state_code: Option<String>,
    pub bypass_duplicate_check: Option<bool>,
    /// Up to 10 images, 2 MB each (jpeg, png, webp, gif)
    #[schema(value_type = Vec<String>, format = Binary)]
    pub files: Vec<Vec<u8>>,
}

fn parse_coordinate(name: &str, raw: &str) -> AppResult<Option<f64>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Ok(None);
    }
    raw.parse::<f64>()
        .map(Some)
        .map_err(|_| AppError::Validation(format!("{} must be a number", name)))
}

fn parse_bool(raw: &str) -> bool {
    matches!(
        raw.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

/// Multipart read failures; a body over the route limit is a 413.
fn upload_error(what: &str, e: MultipartError) -> AppError {
    let msg = format!("Failed to read {}: {}", what, e.body_text());
    if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
        AppError::PayloadTooLarge(msg)
    } else {
        AppError::Validation(msg)
    }
}

/// Read the report form. Photos are only collected here; they are
/// validated together with the text fields by the service.
async fn read_issue_form(mut multipart: Multipart) -> AppResult<(NewIssue, Vec<PhotoUpload>)> {
    let mut input = NewIssue::default();
    let mut photos = Vec::new();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| upload_error("upload", e))?
    {
        let name = field.name().unwrap_or_default().to_string();
        if matches!(name.as_str(), "files" | "files[]" | "file") {
            // One past the limit is enough for validation to reject.
            if photos.len() > MAX_FILES {
                continue;
            }
            let content_type = field
                .content_type()
                .unwrap_or("application/octet-stream")
                .to_string();
            let data = field
                .bytes()
                .await
                .map_err(|e| upload_error("file data", e))?;
            if data.is_empty() {
                continue;
            }
            photos.push(PhotoUpload {
                content_type,
                data: data.to_vec(),
            });
            continue;
        }

        let value = field
            .text()
            .await
            .map_err(|e| upload_error(&format!("field {}", name), e))?;
        match name.as_str() {
            "title" => input.title = value,
            "description" => input.description = Some(value),
            "category" => input.category = Some(value),
            "lat" => input.lat = parse_coordinate("lat", &value)?,
            "lng" => input.lng = parse_coordinate("lng", &value)?,
            "address" => input.address = Some(value),
            "country" => input.country = Some(value),
            "state_code" => input.state_code = Some(value),
            "bypass_duplicate_check" => input.bypass_duplicate_check = parse_bool(&value),
            other => tracing::debug!("Ignoring unknown form field '{}'", other),
        }
    }

    Ok((input, photos))
}

#[utoipa::path(
    post,
    path = "/api/v1/issues",
    request_body(content = CreateIssueForm, content_type = "multipart/form-data"),
    responses(
        (status = 201, description = "Issue reported", body = IssueView),
        (status = 400, description = "Validation error or possible duplicate", body = AppError),
        (status = 401, description = "Anonymous reporting is disabled", body = AppError),
        (status = 413, description = "Photo or request body too large", body = AppError),
    ),
    tag = "issues"
)]
pub async fn create_issue(
    Extension(db): Extension<DatabaseConnection>,
    Extension(storage): Extension<StorageService>,
    Extension(notifier): Extension<NotificationDispatcher>,
    MaybeAuthUser(user): MaybeAuthUser,
    multipart: Multipart,
) -> AppResult<impl IntoResponse> {
    let (input, photos) = read_issue_form(multipart).await?;
    let issue = IssueService::new(db)
        .create(user, input, photos, &storage, &notifier)
        .await?;
    Ok(ApiResponse::created(issue))
}

#[utoipa::path(
    get,
    path = "/api/v1/issues",
    params(
        ("status" = Option<String>, Query, description = "Status or comma-separated statuses"),
        ("category" = Option<String>, Query, description = "Category name"),
        ("state_code" = Option<String>, Query, description = "State code"),
        ("bbox" = Option<String>, Query, description = "min_lng,min_lat,max_lng,max_lat"),
        ("mine" = Option<bool>, Query, description = "Only issues reported by the caller"),
        ("assigned_to" = Option<i32>, Query, description = "Assignee id, 0 for unassigned"),
        ("q" = Option<String>, Query, description = "Text or #id search"),
        ("overdue" = Option<bool>, Query, description = "Open for more than 7 days"),
        ("needs_attention" = Option<bool>, Query, description = "Open and unassigned"),
        ("limit" = Option<u64>, Query, description = "Page size (1-100, default 20)"),
        ("offset" = Option<u64>, Query, description = "Items to skip"),
    ),
    responses(
        (status = 200, description = "Issues, newest first", body = PaginatedResponse<IssueView>),
        (status = 400, description = "Invalid filter", body = AppError),
    ),
    tag = "issues"
)]
pub async fn list_issues(
    Extension(db): Extension<DatabaseConnection>,
    MaybeAuthUser(user): MaybeAuthUser,
    Query(filter): Query<IssueFilter>,
) -> AppResult<impl IntoResponse> {
    let page = IssueQueryService::new(db)
        .list(&filter, user.as_ref())
        .await?;
    Ok(ApiResponse::ok(page))
}

#[utoipa::path(
    get,
    path = "/api/v1/issues/{id}",
    params(("id" = i32, Path, description = "Issue ID")),
    responses(
        (status = 200, description = "Issue with photos and people", body = IssueView),
        (status = 404, description = "Issue not found", body = AppError),
    ),
    tag = "issues"
)]
pub async fn get_issue(
    Extension(db): Extension<DatabaseConnection>,
    Path(id): Path<i32>,
) -> AppResult<impl IntoResponse> {
    Ok(ApiResponse::ok(IssueService::new(db).get(id).await?))
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct UpdateStatusRequest {
    pub status: IssueStatus,
    /// Required except when re-confirming a resolved issue
    #[validate(length(max = 2000))]
    pub comment: Option<String>,
}

#[utoipa::path(
    patch,
    path = "/api/v1/issues/{id}/status",
    security(("jwt_token" = [])),
    params(("id" = i32, Path, description = "Issue ID")),
    request_body = UpdateStatusRequest,
    responses(
        (status = 200, description = "Status updated", body = IssueView),
        (status = 400, description = "Missing comment or unassigned issue", body = AppError),
        (status = 403, description = "Not allowed to change this issue", body = AppError),
        (status = 404, description = "Issue not found", body = AppError),
    ),
    tag = "issues"
)]
pub async fn update_status(
    Extension(db): Extension<DatabaseConnection>,
    Extension(notifier): Extension<NotificationDispatcher>,
    auth_user: AuthUser,
    Path(id): Path<i32>,
    Json(payload): Json<UpdateStatusRequest>,
) -> AppResult<impl IntoResponse> {
    crate::handlers::auth::validate_payload(&payload)?;
    let issue = IssueService::new(db)
        .update_status(
            &auth_user,
            id,
            payload.status,
            payload.comment.as_deref(),
            &notifier,
        )
        .await?;
    Ok(ApiResponse::ok(issue))
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct ReassignRequest {
    /// `null` unassigns (admins only)
    pub assigned_to_id: Option<i32>,
}

#[utoipa::path(
    patch,
    path = "/api/v1/issues/{id}",
    security(("jwt_token" = [])),
    params(("id" = i32, Path, description = "Issue ID")),
    request_body = ReassignRequest,
    responses(
        (status = 200, description = "Assignee updated", body = IssueView),
        (status = 400, description = "Assignee not eligible", body = AppError),
        (status = 403, description = "Not allowed to reassign", body = AppError),
        (status = 404, description = "Issue not found", body = AppError),
    ),
    tag = "issues"
)]
pub async fn reassign_issue(
    Extension(db): Extension<DatabaseConnection>,
    Extension(notifier): Extension<NotificationDispatcher>,
    auth_user: AuthUser,
    Path(id): Path<i32>,
    Json(payload): Json<ReassignRequest>,
) -> AppResult<impl IntoResponse> {
    let issue = IssueService::new(db)
        .reassign(&auth_user, id, payload.assigned_to_id, &notifier)
        .await?;
    Ok(ApiResponse::ok(issue))
}

#[utoipa::path(
    get,
    path = "/api/v1/issues/{id}/activity",
    params(("id" = i32, Path, description = "Issue ID")),
    responses(
        (status = 200, description = "Timeline, oldest first", body = Vec<IssueActivityModel>),
        (status = 404, description = "Issue not found", body = AppError),
    ),
    tag = "issues"
)]
pub async fn get_activity(
    Extension(db): Extension<DatabaseConnection>,
    Path(id): Path<i32>,
) -> AppResult<impl IntoResponse> {
    Ok(ApiResponse::ok(IssueService::new(db).activity(id).await?))
}

#[utoipa::path(
    get,
    path = "/api/v1/issues/{id}/related",
    params(("id" = i32, Path, description = "Issue ID")),
    responses(
        (status = 200, description = "Up to 10 issues within 500 m, nearest first", body = Vec<RelatedIssue>),
        (status = 404, description = "Issue not found", body = AppError),
    ),
    tag = "issues"
)]
pub async fn get_related(
    Extension(db): Extension<DatabaseConnection>,
    Path(id): Path<i32>,
) -> AppResult<impl IntoResponse> {
    Ok(ApiResponse::ok(IssueService::new(db).related(id).await?))
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct BulkRequest {
    pub action: BulkAction,
    /// 1-100 issue ids
    pub issue_ids: Vec<i32>,
    pub assigned_to_id: Option<i32>,
    pub status: Option<IssueStatus>,
    #[validate(length(max = 2000))]
    pub comment: Option<String>,
}

#[utoipa::path(
    post,
    path = "/api/v1/issues/bulk",
    security(("jwt_token" = [])),
    request_body = BulkRequest,
    responses(
        (status = 200, description = "Per-issue outcome", body = BulkOutcome),
        (status = 400, description = "Validation error", body = AppError),
        (status = 403, description = "Admin only", body = AppError),
    ),
    tag = "issues"
)]
pub async fn bulk_update(
    Extension(db): Extension<DatabaseConnection>,
    Extension(notifier): Extension<NotificationDispatcher>,
    auth_user: AuthUser,
    Json(payload): Json<BulkRequest>,
) -> AppResult<impl IntoResponse> {
    crate::handlers::auth::validate_payload(&payload)?;

    let outcome = IssueService::new(db)
        .bulk(
            &auth_user,
            BulkCommand {
                action: payload.action,
                issue_ids: payload.issue_ids,
                assigned_to_id: payload.assigned_to_id,
                status: payload.status,
                comment: payload.comment,
            },
            &notifier,
        )
        .await?;
    Ok(ApiResponse::ok(outcome))
}
