use crate::{
    error::{AppError, AppResult},
    models::{issue, Issue, IssueStatus, User},
    services::settings::SettingsService,
};
use chrono::{NaiveDate, NaiveDateTime};
use sea_orm::{
    sea_query::Expr, ColumnTrait, DatabaseBackend, DatabaseConnection, EntityTrait,
    FromQueryResult, PaginatorTrait, QueryFilter, QueryOrder, QuerySelect, Statement, Value,
};
use serde::Serialize;
use std::collections::HashMap;
use utoipa::ToSchema;

pub const DEFAULT_TREND_DAYS: i64 = 30;
pub const MAX_TREND_DAYS: i64 = 90;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatsRange {
    Today,
    Days(i64),
    All,
}

impl StatsRange {
    /// `today`, `7d`, `15d`, `30d` or `all`; defaults to `7d`.
    pub fn parse(raw: Option<&str>) -> AppResult<Self> {
        match raw.map(str::trim).unwrap_or("7d") {
            "today" => Ok(Self::Today),
            "7d" => Ok(Self::Days(7)),
            "15d" => Ok(Self::Days(15)),
            "30d" => Ok(Self::Days(30)),
            "all" => Ok(Self::All),
            other => Err(AppError::Validation(format!(
                "Unknown range '{}', expected today, 7d, 15d, 30d or all",
                other
            ))),
        }
    }

    pub fn since(&self, now: NaiveDateTime) -> Option<NaiveDateTime> {
        match self {
            Self::Today => now.date().and_hms_opt(0, 0, 0),
            Self::Days(days) => Some(now - chrono::Duration::days(*days)),
            Self::All => None,
        }
    }
}

#[derive(Debug, Default, Serialize, ToSchema)]
pub struct StatusSummary {
    pub total: i64,
    pub pending: i64,
    pub in_progress: i64,
    pub resolved: i64,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct TypeCount {
    #[serde(rename = "type")]
    pub category: String,
    pub count: i64,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct StateCount {
    pub state_code: String,
    pub count: i64,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ResolveTime {
    pub resolved_count: i64,
    pub avg_seconds: f64,
    pub avg_hours: f64,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct SlaCompliance {
    pub sla_hours: i32,
    pub resolved_total: i64,
    pub within_sla: i64,
    pub compliance_pct: f64,
}

#[derive(Debug, PartialEq, Serialize, ToSchema)]
pub struct TrendPoint {
    pub date: NaiveDate,
    pub created: i64,
    pub resolved: i64,
}

#[derive(Debug, Serialize, ToSchema, FromQueryResult)]
pub struct Contributor {
    pub user_id: i32,
    pub name: String,
    pub count: i64,
}

#[derive(Debug, Serialize, ToSchema, FromQueryResult)]
pub struct RecentActivity {
    pub issue_id: i32,
    pub kind: String,
    pub at: NaiveDateTime,
    pub title: String,
    pub status: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct UserStats {
    pub user_id: i32,
    pub issues_handled: u64,
    pub issues_created: u64,
    pub issues_resolved: u64,
    pub recent_activity: Vec<RecentActivity>,
}

#[derive(Debug, FromQueryResult)]
struct DayCount {
    day: NaiveDate,
    count: i64,
}

#[derive(Debug, FromQueryResult)]
struct AvgRow {
    resolved_count: i64,
    avg_seconds: Option<f64>,
}

#[derive(Debug, FromQueryResult)]
struct SlaRow {
    resolved_total: i64,
    within_sla: i64,
}

pub fn compliance_pct(resolved_total: i64, within_sla: i64) -> f64 {
    if resolved_total == 0 {
        return 100.0;
    }
    let pct = within_sla as f64 * 100.0 / resolved_total as f64;
    (pct * 10.0).round() / 10.0
}

/// One point per day from `start`, missing days counted as zero.
pub fn zero_fill(
    start: NaiveDate,
    days: i64,
    created: &HashMap<NaiveDate, i64>,
    resolved: &HashMap<NaiveDate, i64>,
) -> Vec<TrendPoint> {
    (0..days)
        .map(|offset| {
            let date = start + chrono::Duration::days(offset);
            TrendPoint {
                date,
                created: created.get(&date).copied().unwrap_or(0),
                resolved: resolved.get(&date).copied().unwrap_or(0),
            }
        })
        .collect()
}

/// `AND <column> >= $n` when the range is bounded.
fn since_clause(column: &str, since: Option<NaiveDateTime>, values: &mut Vec<Value>) -> String {
    match since {
        Some(t) => {
            values.push(t.into());
            format!(" AND {} >= ${}", column, values.len())
        }
        None => String::new(),
    }
}

const RECENT_ACTIVITY_SQL: &str = r#"
    SELECT ia.issue_id, ia.kind, ia.at, i.title, i.status
    FROM issue_activity ia
    JOIN issues i ON i.id = ia.issue_id
"#;

pub struct StatsService {
    db: DatabaseConnection,
}

impl StatsService {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    fn issues_since(since: Option<NaiveDateTime>) -> sea_orm::Select<Issue> {
        let mut q = Issue::find();
        if let Some(t) = since {
            q = q.filter(issue::Column::CreatedAt.gte(t));
        }
        q
    }

    pub async fn summary(&self, range: StatsRange) -> AppResult<StatusSummary> {
        let since = range.since(chrono::Utc::now().naive_utc());
        let rows: Vec<(IssueStatus, i64)> = Self::issues_since(since)
            .select_only()
            .column(issue::Column::Status)
            .column_as(Expr::col(issue::Column::Id).count(), "count")
            .group_by(issue::Column::Status)
            .into_tuple()
            .all(&self.db)
            .await?;

        let mut summary = StatusSummary::default();
        for (status, count) in rows {
            summary.total += count;
            match status {
                IssueStatus::Pending => summary.pending = count,
                IssueStatus::InProgress => summary.in_progress = count,
                IssueStatus::Resolved => summary.resolved = count,
            }
        }
        Ok(summary)
    }

    /// Largest first; issues without a category count as `unknown`.
    pub async fn by_type(&self, range: StatsRange) -> AppResult<Vec<TypeCount>> {
        let since = range.since(chrono::Utc::now().naive_utc());
        let rows: Vec<(Option<String>, i64)> = Self::issues_since(since)
            .select_only()
            .column(issue::Column::Category)
            .column_as(Expr::col(issue::Column::Id).count(), "count")
            .group_by(issue::Column::Category)
            .order_by_desc(Expr::col(issue::Column::Id).count())
            .into_tuple()
            .all(&self.db)
            .await?;

        Ok(rows
            .into_iter()
            .map(|(category, count)| TypeCount {
                category: category.unwrap_or_else(|| "unknown".to_string()),
                count,
            })
            .collect())
    }

    pub async fn by_state(&self, range: StatsRange) -> AppResult<Vec<StateCount>> {
        let since = range.since(chrono::Utc::now().naive_utc());
        let rows: Vec<(Option<String>, i64)> = Self::issues_since(since)
            .select_only()
            .column(issue::Column::StateCode)
            .column_as(Expr::col(issue::Column::Id).count(), "count")
            .group_by(issue::Column::StateCode)
            .order_by_desc(Expr::col(issue::Column::Id).count())
            .into_tuple()
            .all(&self.db)
            .await?;

        Ok(rows
            .into_iter()
            .map(|(state, count)| StateCount {
                state_code: state.unwrap_or_else(|| "unknown".to_string()),
                count,
            })
            .collect())
    }

    /// Mean creation-to-resolution time of issues resolved in the range.
    pub async fn avg_resolve_time(&self, range: StatsRange) -> AppResult<ResolveTime> {
        let mut values = Vec::new();
        let clause = since_clause(
            "resolved_at",
            range.since(chrono::Utc::now().naive_utc()),
            &mut values,
        );
        let sql = format!(
            "SELECT COUNT(*) AS resolved_count, \
             AVG(EXTRACT(EPOCH FROM (resolved_at - created_at)))::float8 AS avg_seconds \
             FROM issues WHERE status = 'resolved' AND resolved_at IS NOT NULL{}",
            clause
        );

        let row = AvgRow::find_by_statement(Statement::from_sql_and_values(
            DatabaseBackend::Postgres,
            sql,
            values,
        ))
        .one(&self.db)
        .await?;

        let (resolved_count, avg_seconds) = row
            .map(|r| (r.resolved_count, r.avg_seconds.unwrap_or(0.0)))
            .unwrap_or((0, 0.0));
        Ok(ResolveTime {
            resolved_count,
            avg_seconds,
            avg_hours: avg_seconds / 3600.0,
        })
    }

    pub async fn sla(&self, range: StatsRange) -> AppResult<SlaCompliance> {
        let sla_hours = SettingsService::new(self.db.clone()).load().await?.sla_hours;

        let mut values: Vec<Value> = vec![sla_hours.into()];
        let clause = since_clause(
            "resolved_at",
            range.since(chrono::Utc::now().naive_utc()),
            &mut values,
        );
        let sql = format!(
            "SELECT COUNT(*) AS resolved_total, \
             COUNT(*) FILTER (WHERE resolved_at - created_at <= make_interval(hours => $1)) AS within_sla \
             FROM issues WHERE status = 'resolved' AND resolved_at IS NOT NULL{}",
            clause
        );

        let row = SlaRow::find_by_statement(Statement::from_sql_and_values(
            DatabaseBackend::Postgres,
            sql,
            values,
        ))
        .one(&self.db)
        .await?;

        let (resolved_total, within_sla) = row
            .map(|r| (r.resolved_total, r.within_sla))
            .unwrap_or((0, 0));
        Ok(SlaCompliance {
            sla_hours,
            resolved_total,
            within_sla,
            compliance_pct: compliance_pct(resolved_total, within_sla),
        })
    }

    /// Daily created/resolved counts for the last `days` days, today included.
    pub async fn trend(&self, days: Option<i64>) -> AppResult<Vec<TrendPoint>> {
        let days = days.unwrap_or(DEFAULT_TREND_DAYS);
        if !(1..=MAX_TREND_DAYS).contains(&days) {
            return Err(AppError::Validation(format!(
                "days must be between 1 and {}",
                MAX_TREND_DAYS
            )));
        }

        let today = chrono::Utc::now().date_naive();
        let start = today - chrono::Duration::days(days - 1);
        let since = start.and_hms_opt(0, 0, 0).unwrap_or_default();

        let created = self.daily_counts("created_at", since).await?;
        let resolved = self.daily_counts("resolved_at", since).await?;
        Ok(zero_fill(start, days, &created, &resolved))
    }

    async fn daily_counts(
        &self,
        column: &str,
        since: NaiveDateTime,
    ) -> AppResult<HashMap<NaiveDate, i64>> {
        let sql = format!(
            "SELECT {col}::date AS day, COUNT(*) AS count FROM issues \
             WHERE {col} IS NOT NULL AND {col} >= $1 GROUP BY 1",
            col = column
        );
        let rows = DayCount::find_by_statement(Statement::from_sql_and_values(
            DatabaseBackend::Postgres,
            sql,
            [since.into()],
        ))
        .all(&self.db)
        .await?;
        Ok(rows.into_iter().map(|r| (r.day, r.count)).collect())
    }

    pub async fn top_contributors(&self, limit: u64) -> AppResult<Vec<Contributor>> {
        let limit = limit.clamp(1, 100) as i64;
        Ok(Contributor::find_by_statement(Statement::from_sql_and_values(
            DatabaseBackend::Postgres,
            r#"
                SELECT u.id AS user_id, u.name, COUNT(i.id) AS count
                FROM users u
                JOIN issues i ON i.created_by_id = u.id
                GROUP BY u.id, u.name
                ORDER BY count DESC, u.id
                LIMIT $1
            "#,
            [limit.into()],
        ))
        .all(&self.db)
        .await?)
    }

    pub async fn recent_activity(&self, limit: u64) -> AppResult<Vec<RecentActivity>> {
        let limit = limit.clamp(1, 100) as i64;
        Ok(RecentActivity::find_by_statement(Statement::from_sql_and_values(
            DatabaseBackend::Postgres,
            format!("{} ORDER BY ia.at DESC, ia.id DESC LIMIT $1", RECENT_ACTIVITY_SQL),
            [limit.into()],
        ))
        .all(&self.db)
        .await?)
    }

    pub async fn user_stats(&self, user_id: i32) -> AppResult<UserStats> {
        User::find_by_id(user_id)
            .one(&self.db)
            .await?
            .ok_or(AppError::NotFound)?;

        let issues_handled = Issue::find()
            .filter(issue::Column::AssignedToId.eq(user_id))
            .count(&self.db)
            .await?;
        let issues_created = Issue::find()
            .filter(issue::Column::CreatedById.eq(user_id))
            .count(&self.db)
            .await?;
        let issues_resolved = Issue::find()
            .filter(issue::Column::AssignedToId.eq(user_id))
            .filter(issue::Column::Status.eq(IssueStatus::Resolved))
            .count(&self.db)
            .await?;

        let recent_activity = RecentActivity::find_by_statement(Statement::from_sql_and_values(
            DatabaseBackend::Postgres,
            format!(
                "{} WHERE i.assigned_to_id = $1 ORDER BY ia.at DESC, ia.id DESC LIMIT 10",
                RECENT_ACTIVITY_SQL
            ),
            [user_id.into()],
        ))
        .all(&self.db)
        .await?;

        Ok(UserStats {
            user_id,
            issues_handled,
            issues_created,
            issues_resolved,
            recent_activity,
        })
    }
}
