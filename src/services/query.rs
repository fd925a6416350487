use crate::{
    error::{AppError, AppResult},
    middleware::AuthUser,
    models::{issue, Issue, IssueStatus},
    response::PaginatedResponse,
    services::issue::{hydrate, IssueView},
    utils::geo::BoundingBox,
};
use chrono::NaiveDateTime;
use sea_orm::{
    sea_query::{Expr, Func, LikeExpr},
    ColumnTrait, Condition, DatabaseConnection, EntityTrait, PaginatorTrait, QueryFilter,
    QueryOrder, QuerySelect,
};
use serde::Deserialize;

/// Open issues older than this are overdue.
pub const OVERDUE_DAYS: i64 = 7;

/// `GET /issues` query string.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct IssueFilter {
    /// One status or a comma-separated set.
    pub status: Option<String>,
    pub category: Option<String>,
    pub state_code: Option<String>,
    /// `min_lng,min_lat,max_lng,max_lat`
    pub bbox: Option<String>,
    #[serde(default)]
    pub mine: bool,
    /// `0` selects unassigned issues.
    pub assigned_to: Option<i32>,
    pub q: Option<String>,
    #[serde(default)]
    pub overdue: bool,
    #[serde(default)]
    pub needs_attention: bool,
    pub limit: Option<u64>,
    pub offset: Option<u64>,
}

pub fn parse_statuses(raw: &str) -> AppResult<Vec<IssueStatus>> {
    let statuses = raw
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            IssueStatus::parse(s)
                .ok_or_else(|| AppError::Validation(format!("Unknown status '{}'", s)))
        })
        .collect::<AppResult<Vec<_>>>()?;
    if statuses.is_empty() {
        return Err(AppError::validation("status must not be empty"));
    }
    Ok(statuses)
}

/// `#42` and `42` both search by id as well as by text.
fn id_in_query(q: &str) -> Option<i32> {
    q.strip_prefix('#').unwrap_or(q).parse().ok()
}

fn like_pattern(q: &str) -> String {
    let escaped = q
        .to_lowercase()
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");
    format!("%{}%", escaped)
}

fn open_statuses() -> [IssueStatus; 2] {
    [IssueStatus::Pending, IssueStatus::InProgress]
}

impl IssueFilter {
    pub fn condition(&self, viewer: Option<&AuthUser>, now: NaiveDateTime) -> AppResult<Condition> {
        let mut cond = Condition::all();

        if let Some(raw) = self.status.as_deref().filter(|s| !s.trim().is_empty()) {
            cond = cond.add(issue::Column::Status.is_in(parse_statuses(raw)?));
        }
        if let Some(category) = self.category.as_deref().map(str::trim).filter(|c| !c.is_empty()) {
            cond = cond.add(issue::Column::Category.eq(category));
        }
        if let Some(state) = self.state_code.as_deref().map(str::trim).filter(|c| !c.is_empty()) {
            cond = cond.add(issue::Column::StateCode.eq(state.to_ascii_uppercase()));
        }
        if let Some(raw) = self.bbox.as_deref() {
            let bbox = BoundingBox::parse(raw).map_err(AppError::Validation)?;
            cond = cond
                .add(issue::Column::Lat.between(bbox.min_lat, bbox.max_lat))
                .add(issue::Column::Lng.between(bbox.min_lng, bbox.max_lng));
        }
        if self.mine {
            let viewer = viewer.ok_or(AppError::Unauthorized)?;
            cond = cond.add(issue::Column::CreatedById.eq(viewer.user_id));
        }
        match self.assigned_to {
            Some(0) => cond = cond.add(issue::Column::AssignedToId.is_null()),
            Some(id) => cond = cond.add(issue::Column::AssignedToId.eq(id)),
            None => {}
        }
        if let Some(q) = self.q.as_deref().map(str::trim).filter(|q| !q.is_empty()) {
            let pattern = like_pattern(q);
            let text = |col: issue::Column| {
                Expr::expr(Func::lower(Expr::col(col)))
                    .like(LikeExpr::new(pattern.clone()).escape('\\'))
            };
            let mut any = Condition::any()
                .add(text(issue::Column::Title))
                .add(text(issue::Column::Description))
                .add(text(issue::Column::Address));
            if let Some(id) = id_in_query(q) {
                any = any.add(issue::Column::Id.eq(id));
            }
            cond = cond.add(any);
        }
        if self.overdue {
            cond = cond
                .add(issue::Column::Status.is_in(open_statuses()))
                .add(issue::Column::CreatedAt.lt(now - chrono::Duration::days(OVERDUE_DAYS)));
        }
        if self.needs_attention {
            cond = cond
                .add(issue::Column::Status.is_in(open_statuses()))
                .add(issue::Column::AssignedToId.is_null());
        }

        Ok(cond)
    }

    pub fn page(&self) -> (u64, u64) {
        crate::response::PaginationQuery {
            limit: self.limit,
            offset: self.offset,
        }
        .resolve()
    }
}

pub struct IssueQueryService {
    db: DatabaseConnection,
}

impl IssueQueryService {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    /// Newest first.
    pub async fn list(
        &self,
        filter: &IssueFilter,
        viewer: Option<&AuthUser>,
    ) -> AppResult<PaginatedResponse<IssueView>> {
        let now = chrono::Utc::now().naive_utc();
        let cond = filter.condition(viewer, now)?;
        let (offset, limit) = filter.page();

        let total = Issue::find().filter(cond.clone()).count(&self.db).await?;
        let issues = Issue::find()
            .filter(cond)
            .order_by_desc(issue::Column::CreatedAt)
            .order_by_desc(issue::Column::Id)
            .offset(offset)
            .limit(limit)
            .all(&self.db)
            .await?;

        let items = hydrate(&self.db, issues).await?;
        Ok(PaginatedResponse::new(items, total, offset, limit))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_set_parses() {
        assert_eq!(
            parse_statuses("pending, in_progress").unwrap(),
            vec![IssueStatus::Pending, IssueStatus::InProgress]
        );
        assert!(parse_statuses("closed").is_err());
        assert!(parse_statuses(" , ").is_err());
    }

    #[test]
    fn hash_prefixed_id_is_searchable() {
        assert_eq!(id_in_query("#42"), Some(42));
        assert_eq!(id_in_query("42"), Some(42));
        assert_eq!(id_in_query("pothole"), None);
    }

    #[test]
    fn like_wildcards_are_escaped() {
        assert_eq!(like_pattern("50%_Off"), "%50\\%\\_off%");
    }

    #[test]
    fn mine_requires_login() {
        let filter = IssueFilter {
            mine: true,
            ..Default::default()
        };
        let now = chrono::Utc::now().naive_utc();
        assert!(matches!(
            filter.condition(None, now),
            Err(AppError::Unauthorized)
        ));
    }

    #[test]
    fn bad_bbox_is_a_validation_error() {
        let filter = IssueFilter {
            bbox: Some("1,2,3".into()),
            ..Default::default()
        };
        let now = chrono::Utc::now().naive_utc();
        assert!(matches!(
            filter.condition(None, now),
            Err(AppError::Validation(_))
        ));
    }
}
