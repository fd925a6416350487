use crate::error::{AppError, AppResult};
use crate::response::ApiResponse;
use crate::services::stats::{
    Contributor, RecentActivity, ResolveTime, SlaCompliance, StateCount, StatsRange,
    StatsService, StatusSummary, TrendPoint, TypeCount,
};
use axum::{extract::Query, response::IntoResponse, Extension};
use sea_orm::DatabaseConnection;
use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct RangeQuery {
    pub range: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct TrendQuery {
    pub days: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct LimitQuery {
    pub limit: Option<u64>,
}

#[utoipa::path(
    get,
    path = "/api/v1/issues/stats",
    params(("range" = Option<String>, Query, description = "today, 7d (default), 15d, 30d or all")),
    responses(
        (status = 200, description = "Counts by status", body = StatusSummary),
        (status = 400, description = "Unknown range", body = AppError),
    ),
    tag = "stats"
)]
pub async fn summary(
    Extension(db): Extension<DatabaseConnection>,
    Query(q): Query<RangeQuery>,
) -> AppResult<impl IntoResponse> {
    let range = StatsRange::parse(q.range.as_deref())?;
    Ok(ApiResponse::ok(StatsService::new(db).summary(range).await?))
}

#[utoipa::path(
    get,
    path = "/api/v1/issues/stats/by-type",
    params(("range" = Option<String>, Query, description = "today, 7d (default), 15d, 30d or all")),
    responses((status = 200, description = "Counts by category, largest first", body = Vec<TypeCount>)),
    tag = "stats"
)]
pub async fn by_type(
    Extension(db): Extension<DatabaseConnection>,
    Query(q): Query<RangeQuery>,
) -> AppResult<impl IntoResponse> {
    let range = StatsRange::parse(q.range.as_deref())?;
    Ok(ApiResponse::ok(StatsService::new(db).by_type(range).await?))
}

#[utoipa::path(
    get,
    path = "/api/v1/issues/stats/by-state",
    params(("range" = Option<String>, Query, description = "today, 7d (default), 15d, 30d or all")),
    responses((status = 200, description = "Counts by state code, largest first", body = Vec<StateCount>)),
    tag = "stats"
)]
pub async fn by_state(
    Extension(db): Extension<DatabaseConnection>,
    Query(q): Query<RangeQuery>,
) -> AppResult<impl IntoResponse> {
    let range = StatsRange::parse(q.range.as_deref())?;
    Ok(ApiResponse::ok(StatsService::new(db).by_state(range).await?))
}

#[utoipa::path(
    get,
    path = "/api/v1/issues/stats/avg-resolve-time",
    params(("range" = Option<String>, Query, description = "Resolution window; all by default")),
    responses((status = 200, description = "Mean time to resolve", body = ResolveTime)),
    tag = "stats"
)]
pub async fn avg_resolve_time(
    Extension(db): Extension<DatabaseConnection>,
    Query(q): Query<RangeQuery>,
) -> AppResult<impl IntoResponse> {
    let range = StatsRange::parse(Some(q.range.as_deref().unwrap_or("all")))?;
    Ok(ApiResponse::ok(
        StatsService::new(db).avg_resolve_time(range).await?,
    ))
}

#[utoipa::path(
    get,
    path = "/api/v1/issues/stats/sla",
    params(("range" = Option<String>, Query, description = "Resolution window; all by default")),
    responses((status = 200, description = "Share of issues resolved within the SLA", body = SlaCompliance)),
    tag = "stats"
)]
pub async fn sla(
    Extension(db): Extension<DatabaseConnection>,
    Query(q): Query<RangeQuery>,
) -> AppResult<impl IntoResponse> {
    let range = StatsRange::parse(Some(q.range.as_deref().unwrap_or("all")))?;
    Ok(ApiResponse::ok(StatsService::new(db).sla(range).await?))
}

#[utoipa::path(
    get,
    path = "/api/v1/issues/stats/trend",
    params(("days" = Option<i64>, Query, description = "1-90, default 30")),
    responses(
        (status = 200, description = "Daily created/resolved counts, oldest first", body = Vec<TrendPoint>),
        (status = 400, description = "days out of range", body = AppError),
    ),
    tag = "stats"
)]
pub async fn trend(
    Extension(db): Extension<DatabaseConnection>,
    Query(q): Query<TrendQuery>,
) -> AppResult<impl IntoResponse> {
    Ok(ApiResponse::ok(StatsService::new(db).trend(q.days).await?))
}

#[utoipa::path(
    get,
    path = "/api/v1/issues/stats/top-contributors",
    params(("limit" = Option<u64>, Query, description = "Default 10")),
    responses((status = 200, description = "Citizens with the most reports", body = Vec<Contributor>)),
    tag = "stats"
)]
pub async fn top_contributors(
    Extension(db): Extension<DatabaseConnection>,
    Query(q): Query<LimitQuery>,
) -> AppResult<impl IntoResponse> {
    Ok(ApiResponse::ok(
        StatsService::new(db)
            .top_contributors(q.limit.unwrap_or(10))
            .await?,
    ))
}

#[utoipa::path(
    get,
    path = "/api/v1/issues/stats/recent-activity",
    params(("limit" = Option<u64>, Query, description = "Default 20")),
    responses((status = 200, description = "Latest timeline entries across all issues", body = Vec<RecentActivity>)),
    tag = "stats"
)]
pub async fn recent_activity(
    Extension(db): Extension<DatabaseConnection>,
    Query(q): Query<LimitQuery>,
) -> AppResult<impl IntoResponse> {
    Ok(ApiResponse::ok(
        StatsService::new(db)
            .recent_activity(q.limit.unwrap_or(20))
            .await?,
    ))
}
