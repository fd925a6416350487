use crate::{
    error::{AppError, AppResult},
    middleware::AuthUser,
    models::{
        issue, issue_activity, issue_attachment, user, ActivityKind, Issue, IssueActivity,
        IssueActivityModel, IssueAttachment, IssueStatus, User,
    },
    services::{
        assignment,
        comment::insert_comment,
        duplicate,
        notification::{NotificationDispatcher, NotificationJob},
        settings::SettingsService,
        storage::{validate_photos, PhotoUpload, StorageService},
        tracker::{self, TransitionPlan},
    },
    utils::{geo, text},
};
use chrono::NaiveDateTime;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait, QueryFilter,
    QueryOrder, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use utoipa::ToSchema;

pub const RELATED_RADIUS_M: f64 = 500.0;
pub const RELATED_LIMIT: usize = 10;
pub const BULK_MAX_IDS: usize = 100;

const TITLE_LEN: std::ops::RangeInclusive<usize> = 3..=200;
const MAX_DESCRIPTION_LEN: usize = 4000;
const MAX_ADDRESS_LEN: usize = 300;
const MAX_CATEGORY_LEN: usize = 120;

/// Submitted report fields, before normalisation.
#[derive(Debug, Clone, Default)]
pub struct NewIssue {
    pub title: String,
    pub description: Option<String>,
    pub category: Option<String>,
    pub lat: Option<f64>,
    pub lng: Option<f64>,
    pub address: Option<String>,
    pub country: Option<String>,
    pub state_code: Option<String>,
    pub bypass_duplicate_check: bool,
}

impl NewIssue {
    /// Trim and upper-case fields, then enforce lengths, the coordinate pair
    /// and the India-only service area.
    pub fn normalize(self) -> AppResult<Self> {
        let title = text::sanitize_plain(&self.title);
        if !TITLE_LEN.contains(&title.chars().count()) {
            return Err(AppError::validation("Title must be 3-200 characters"));
        }

        let description = text::non_blank(self.description.as_deref()).map(|d| text::sanitize_plain(&d));
        if description
            .as_ref()
            .is_some_and(|d| d.chars().count() > MAX_DESCRIPTION_LEN)
        {
            return Err(AppError::validation("Description is too long"));
        }

        let category = text::non_blank(self.category.as_deref());
        if category
            .as_ref()
            .is_some_and(|c| c.chars().count() > MAX_CATEGORY_LEN)
        {
            return Err(AppError::validation("Category is too long"));
        }

        let address = text::non_blank(self.address.as_deref()).map(|a| text::sanitize_plain(&a));
        if address
            .as_ref()
            .is_some_and(|a| a.chars().count() > MAX_ADDRESS_LEN)
        {
            return Err(AppError::validation("Address is too long"));
        }

        match (self.lat, self.lng) {
            (Some(lat), Some(lng)) => {
                if !lat.is_finite() || !lng.is_finite() || !geo::within_india(lat, lng) {
                    return Err(AppError::validation(
                        "Location must be within India's service area",
                    ));
                }
            }
            (None, None) => {}
            _ => {
                return Err(AppError::validation(
                    "Latitude and longitude must be provided together",
                ))
            }
        }

        let country = text::non_blank(self.country.as_deref())
            .map(|c| c.to_ascii_uppercase())
            .unwrap_or_else(|| "IN".to_string());
        if country != "IN" {
            return Err(AppError::validation("Only India is supported"));
        }

        let state_code = text::non_blank(self.state_code.as_deref()).map(|s| s.to_ascii_uppercase());
        if let Some(code) = &state_code {
            if !(2..=3).contains(&code.len()) || !code.chars().all(|c| c.is_ascii_alphanumeric()) {
                return Err(AppError::validation("Invalid state code"));
            }
        }

        Ok(Self {
            title,
            description,
            category,
            lat: self.lat,
            lng: self.lng,
            address,
            country: Some(country),
            state_code,
            bypass_duplicate_check: self.bypass_duplicate_check,
        })
    }
}

/// Issue with photos and the display names of its creator and assignee.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct IssueView {
    pub id: i32,
    pub title: String,
    pub description: Option<String>,
    pub category: Option<String>,
    pub status: IssueStatus,
    pub lat: Option<f64>,
    pub lng: Option<f64>,
    pub address: Option<String>,
    pub country: Option<String>,
    pub state_code: Option<String>,
    pub created_by_id: Option<i32>,
    pub creator_name: Option<String>,
    pub assigned_to_id: Option<i32>,
    pub assignee_name: Option<String>,
    pub created_at: NaiveDateTime,
    pub updated_at: Option<NaiveDateTime>,
    pub in_progress_at: Option<NaiveDateTime>,
    pub resolved_at: Option<NaiveDateTime>,
    pub photos: Vec<String>,
}

impl IssueView {
    fn build(i: issue::Model, names: &HashMap<i32, String>, photos: Vec<String>) -> Self {
        let name_of = |id: Option<i32>| id.and_then(|id| names.get(&id).cloned());
        Self {
            creator_name: name_of(i.created_by_id),
            assignee_name: name_of(i.assigned_to_id),
            id: i.id,
            title: i.title,
            description: i.description,
            category: i.category,
            status: i.status,
            lat: i.lat,
            lng: i.lng,
            address: i.address,
            country: i.country,
            state_code: i.state_code,
            created_by_id: i.created_by_id,
            assigned_to_id: i.assigned_to_id,
            created_at: i.created_at,
            updated_at: i.updated_at,
            in_progress_at: i.in_progress_at,
            resolved_at: i.resolved_at,
            photos,
        }
    }
}

/// Attach names and photo URLs to a page of issues with two batched queries.
pub async fn hydrate<C: ConnectionTrait>(
    conn: &C,
    issues: Vec<issue::Model>,
) -> AppResult<Vec<IssueView>> {
    if issues.is_empty() {
        return Ok(Vec::new());
    }

    let issue_ids: Vec<i32> = issues.iter().map(|i| i.id).collect();
    let user_ids: HashSet<i32> = issues
        .iter()
        .flat_map(|i| [i.created_by_id, i.assigned_to_id])
        .flatten()
        .collect();

    let names: HashMap<i32, String> = if user_ids.is_empty() {
        HashMap::new()
    } else {
        User::find()
            .filter(user::Column::Id.is_in(user_ids))
            .all(conn)
            .await?
            .into_iter()
            .map(|u| (u.id, u.name))
            .collect()
    };

    let mut photos: HashMap<i32, Vec<String>> = HashMap::new();
    for a in IssueAttachment::find()
        .filter(issue_attachment::Column::IssueId.is_in(issue_ids))
        .order_by_asc(issue_attachment::Column::Id)
        .all(conn)
        .await?
    {
        photos.entry(a.issue_id).or_default().push(a.url);
    }

    Ok(issues
        .into_iter()
        .map(|i| {
            let urls = photos.remove(&i.id).unwrap_or_default();
            IssueView::build(i, &names, urls)
        })
        .collect())
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct RelatedIssue {
    pub id: i32,
    pub title: String,
    pub category: Option<String>,
    pub status: IssueStatus,
    pub distance_m: f64,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum BulkAction {
    Assign,
    Status,
    Delete,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct BulkFailure {
    pub id: i32,
    pub error: String,
}

#[derive(Debug, Default, Serialize, ToSchema)]
pub struct BulkOutcome {
    pub succeeded: Vec<i32>,
    pub failed: Vec<BulkFailure>,
}

/// Fields of a bulk request that apply to every listed issue.
#[derive(Debug, Clone)]
pub struct BulkCommand {
    pub action: BulkAction,
    pub issue_ids: Vec<i32>,
    pub assigned_to_id: Option<i32>,
    pub status: Option<IssueStatus>,
    pub comment: Option<String>,
}

/// Message reported per failed item of a bulk request.
fn bulk_error_message(err: &AppError) -> String {
    match err {
        AppError::Validation(msg) | AppError::Conflict(msg) => msg.clone(),
        AppError::NotFound => "Issue not found".to_string(),
        AppError::Forbidden => "Forbidden".to_string(),
        other => {
            tracing::error!("Bulk item failed: {:?}", other);
            "Internal error".to_string()
        }
    }
}

async fn record_activity<C: ConnectionTrait>(
    conn: &C,
    issue_id: i32,
    kind: ActivityKind,
    at: NaiveDateTime,
) -> AppResult<()> {
    issue_activity::ActiveModel {
        issue_id: sea_orm::ActiveValue::Set(issue_id),
        kind: sea_orm::ActiveValue::Set(kind),
        at: sea_orm::ActiveValue::Set(at),
        ..Default::default()
    }
    .insert(conn)
    .await?;
    Ok(())
}

/// Write a planned status change: row timestamps, activity and comment.
async fn apply_transition<C: ConnectionTrait>(
    conn: &C,
    issue: issue::Model,
    plan: &TransitionPlan,
    actor_id: i32,
    now: NaiveDateTime,
) -> AppResult<issue::Model> {
    let issue_id = issue.id;
    let issue = if plan.changed() {
        let mut active: issue::ActiveModel = issue.into();
        active.status = sea_orm::ActiveValue::Set(plan.to);
        active.updated_at = sea_orm::ActiveValue::Set(Some(now));
        if plan.set_in_progress_at {
            active.in_progress_at = sea_orm::ActiveValue::Set(Some(now));
        }
        if plan.set_resolved_at {
            active.resolved_at = sea_orm::ActiveValue::Set(Some(now));
        }
        active.update(conn).await?
    } else {
        issue
    };

    if let Some(kind) = plan.activity {
        record_activity(conn, issue_id, kind, now).await?;
    }
    if let Some(body) = &plan.comment {
        insert_comment(conn, issue_id, Some(actor_id), body, now).await?;
    }
    Ok(issue)
}

pub struct IssueService {
    db: DatabaseConnection,
}

impl IssueService {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    async fn find(&self, id: i32) -> AppResult<issue::Model> {
        Issue::find_by_id(id)
            .one(&self.db)
            .await?
            .ok_or(AppError::NotFound)
    }

    pub async fn get(&self, id: i32) -> AppResult<IssueView> {
        let issue = self.find(id).await?;
        self.view(issue).await
    }

    async fn view(&self, issue: issue::Model) -> AppResult<IssueView> {
        hydrate(&self.db, vec![issue])
            .await?
            .pop()
            .ok_or(AppError::NotFound)
    }

    /// Validate, de-duplicate, insert, auto-assign and store photos.
    pub async fn create(
        &self,
        creator: Option<AuthUser>,
        input: NewIssue,
        photos: Vec<PhotoUpload>,
        storage: &StorageService,
        notifier: &NotificationDispatcher,
    ) -> AppResult<IssueView> {
        let settings = SettingsService::new(self.db.clone()).load().await?;
        if creator.is_none() && !settings.allow_anonymous_reporting {
            return Err(AppError::Unauthorized);
        }

        let input = input.normalize()?;
        validate_photos(&photos)?;
        let now = chrono::Utc::now().naive_utc();

        if !input.bypass_duplicate_check {
            if let (Some(category), Some(lat), Some(lng)) =
                (input.category.as_deref(), input.lat, input.lng)
            {
                if let Some(m) = duplicate::find_duplicate(&self.db, category, lat, lng, now).await? {
                    tracing::info!(
                        existing_issue_id = m.issue_id,
                        distance_m = m.distance_m,
                        "Duplicate report rejected"
                    );
                    return Err(AppError::Duplicate {
                        existing_issue_id: m.issue_id,
                        message: format!(
                            "A similar issue (#{}) was reported {:.0} m away in the last {} hours",
                            m.issue_id,
                            m.distance_m,
                            duplicate::DUPLICATE_WINDOW_HOURS
                        ),
                    });
                }
            }
        }

        let txn = self.db.begin().await?;
        let mut issue = issue::ActiveModel {
            title: sea_orm::ActiveValue::Set(input.title),
            description: sea_orm::ActiveValue::Set(input.description),
            category: sea_orm::ActiveValue::Set(input.category),
            status: sea_orm::ActiveValue::Set(IssueStatus::Pending),
            lat: sea_orm::ActiveValue::Set(input.lat),
            lng: sea_orm::ActiveValue::Set(input.lng),
            address: sea_orm::ActiveValue::Set(input.address),
            country: sea_orm::ActiveValue::Set(input.country),
            state_code: sea_orm::ActiveValue::Set(input.state_code),
            created_by_id: sea_orm::ActiveValue::Set(creator.map(|c| c.user_id)),
            assigned_to_id: sea_orm::ActiveValue::Set(None),
            created_at: sea_orm::ActiveValue::Set(now),
            updated_at: sea_orm::ActiveValue::Set(None),
            in_progress_at: sea_orm::ActiveValue::Set(None),
            resolved_at: sea_orm::ActiveValue::Set(None),
            ..Default::default()
        }
        .insert(&txn)
        .await?;
        record_activity(&txn, issue.id, ActivityKind::Created, now).await?;

        let mut assigned = None;
        if settings.auto_assign_issues {
            if let Some(user_id) =
                assignment::auto_assign_target(&txn, issue.state_code.as_deref()).await?
            {
                let mut active: issue::ActiveModel = issue.into();
                active.assigned_to_id = sea_orm::ActiveValue::Set(Some(user_id));
                issue = active.update(&txn).await?;
                record_activity(&txn, issue.id, ActivityKind::Assigned, now).await?;
                assigned = Some(user_id);
            }
        }
        txn.commit().await?;

        // Storage outages must not lose the report itself.
        for photo in &photos {
            match storage.store(issue.id, photo).await {
                Ok(url) => {
                    issue_attachment::ActiveModel {
                        issue_id: sea_orm::ActiveValue::Set(issue.id),
                        url: sea_orm::ActiveValue::Set(url),
                        content_type: sea_orm::ActiveValue::Set(photo.content_type.clone()),
                        size: sea_orm::ActiveValue::Set(photo.data.len() as i32),
                        ..Default::default()
                    }
                    .insert(&self.db)
                    .await?;
                }
                Err(e) => {
                    tracing::warn!("Photo upload for issue {} failed, skipping: {:#}", issue.id, e)
                }
            }
        }

        tracing::info!(
            issue_id = issue.id,
            anonymous = creator.is_none(),
            assigned_to = ?assigned,
            "Issue reported"
        );

        if creator.is_some() {
            notifier.dispatch(NotificationJob::ReportConfirmation { issue_id: issue.id });
        }
        if let Some(assignee_id) = assigned {
            notifier.dispatch(NotificationJob::Assigned {
                issue_id: issue.id,
                assignee_id,
            });
        }

        self.view(issue).await
    }

    pub async fn update_status(
        &self,
        actor: &AuthUser,
        id: i32,
        to: IssueStatus,
        comment: Option<&str>,
        notifier: &NotificationDispatcher,
    ) -> AppResult<IssueView> {
        let now = chrono::Utc::now().naive_utc();
        let txn = self.db.begin().await?;
        let issue = Issue::find_by_id(id)
            .one(&txn)
            .await?
            .ok_or(AppError::NotFound)?;

        let plan = tracker::plan_transition(actor, &issue, to, comment)?;
        let issue = apply_transition(&txn, issue, &plan, actor.user_id, now).await?;
        txn.commit().await?;

        if plan.changed() {
            tracing::info!(
                issue_id = id,
                from = plan.from.as_str(),
                to = plan.to.as_str(),
                actor = actor.user_id,
                "Issue status changed"
            );
            notifier.dispatch(NotificationJob::StatusChanged {
                issue_id: id,
                status: plan.to,
                actor_id: actor.user_id,
                comment: plan.comment.clone(),
            });
        }

        self.view(issue).await
    }

    /// Manual assignment. `None` unassigns.
    pub async fn reassign(
        &self,
        actor: &AuthUser,
        id: i32,
        target: Option<i32>,
        notifier: &NotificationDispatcher,
    ) -> AppResult<IssueView> {
        let issue = self.find(id).await?;
        let regions = if actor.is_admin_or_above() {
            Vec::new()
        } else {
            assignment::regions_of(&self.db, actor.user_id).await?
        };
        assignment::authorize_reassignment(actor, &issue, &regions, target)?;

        if issue.assigned_to_id == target {
            return self.view(issue).await;
        }
        if let Some(user_id) = target {
            assignment::ensure_assignable(&self.db, user_id).await?;
        }

        let now = chrono::Utc::now().naive_utc();
        let txn = self.db.begin().await?;
        let mut active: issue::ActiveModel = issue.into();
        active.assigned_to_id = sea_orm::ActiveValue::Set(target);
        active.updated_at = sea_orm::ActiveValue::Set(Some(now));
        let issue = active.update(&txn).await?;
        if target.is_some() {
            record_activity(&txn, id, ActivityKind::Assigned, now).await?;
        }
        txn.commit().await?;

        tracing::info!(issue_id = id, assigned_to = ?target, actor = actor.user_id, "Issue reassigned");
        if let Some(assignee_id) = target {
            notifier.dispatch(NotificationJob::Assigned {
                issue_id: id,
                assignee_id,
            });
        }

        self.view(issue).await
    }

    pub async fn activity(&self, id: i32) -> AppResult<Vec<IssueActivityModel>> {
        self.find(id).await?;
        Ok(IssueActivity::find()
            .filter(issue_activity::Column::IssueId.eq(id))
            .order_by_asc(issue_activity::Column::At)
            .order_by_asc(issue_activity::Column::Id)
            .all(&self.db)
            .await?)
    }

    /// Other issues within 500 m, nearest first.
    pub async fn related(&self, id: i32) -> AppResult<Vec<RelatedIssue>> {
        let issue = self.find(id).await?;
        let Some((lat, lng)) = issue.coordinates() else {
            return Ok(Vec::new());
        };

        // Coarse box first, exact distance after.
        let lat_delta = RELATED_RADIUS_M / 111_320.0;
        let lng_delta = lat_delta / lat.to_radians().cos().max(0.01);
        let nearby = Issue::find()
            .filter(issue::Column::Id.ne(id))
            .filter(issue::Column::Lat.between(lat - lat_delta, lat + lat_delta))
            .filter(issue::Column::Lng.between(lng - lng_delta, lng + lng_delta))
            .all(&self.db)
            .await?;

        let mut related: Vec<RelatedIssue> = nearby
            .into_iter()
            .filter_map(|i| {
                let (i_lat, i_lng) = i.coordinates()?;
                let distance_m = geo::haversine_m(lat, lng, i_lat, i_lng);
                (distance_m <= RELATED_RADIUS_M).then(|| RelatedIssue {
                    id: i.id,
                    title: i.title,
                    category: i.category,
                    status: i.status,
                    distance_m,
                    created_at: i.created_at,
                })
            })
            .collect();

        related.sort_by(|a, b| {
            a.distance_m
                .total_cmp(&b.distance_m)
                .then(a.id.cmp(&b.id))
        });
        related.truncate(RELATED_LIMIT);
        Ok(related)
    }

    pub async fn bulk(
        &self,
        actor: &AuthUser,
        command: BulkCommand,
        notifier: &NotificationDispatcher,
    ) -> AppResult<BulkOutcome> {
        actor.require_admin()?;

        let mut seen = HashSet::new();
        let ids: Vec<i32> = command
            .issue_ids
            .iter()
            .copied()
            .filter(|id| seen.insert(*id))
            .collect();
        if ids.is_empty() || ids.len() > BULK_MAX_IDS {
            return Err(AppError::Validation(format!(
                "issue_ids must contain 1-{} ids",
                BULK_MAX_IDS
            )));
        }
        if command.action == BulkAction::Status && command.status.is_none() {
            return Err(AppError::validation("status is required for bulk status updates"));
        }

        let mut outcome = BulkOutcome::default();
        for id in ids {
            let result = match (command.action, command.status) {
                (BulkAction::Assign, _) => self
                    .reassign(actor, id, command.assigned_to_id, notifier)
                    .await
                    .map(|_| ()),
                (BulkAction::Status, Some(status)) => self
                    .update_status(actor, id, status, command.comment.as_deref(), notifier)
                    .await
                    .map(|_| ()),
                (BulkAction::Status, None) => Err(AppError::validation("status is required")),
                (BulkAction::Delete, _) => self.delete(id).await,
            };
            match result {
                Ok(()) => outcome.succeeded.push(id),
                Err(e) => outcome.failed.push(BulkFailure {
                    id,
                    error: bulk_error_message(&e),
                }),
            }
        }

        tracing::info!(
            action = ?command.action,
            succeeded = outcome.succeeded.len(),
            failed = outcome.failed.len(),
            actor = actor.user_id,
            "Bulk issue operation"
        );
        Ok(outcome)
    }

    /// Hard delete; attachments, activity and comments cascade.
    async fn delete(&self, id: i32) -> AppResult<()> {
        let result = Issue::delete_by_id(id).exec(&self.db).await?;
        if result.rows_affected == 0 {
            return Err(AppError::NotFound);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid() -> NewIssue {
        NewIssue {
            title: "Broken streetlight".into(),
            category: Some("Lighting".into()),
            lat: Some(12.9716),
            lng: Some(77.5946),
            state_code: Some(" ka ".into()),
            ..Default::default()
        }
    }

    #[test]
    fn normalize_fills_defaults() {
        let n = valid().normalize().unwrap();
        assert_eq!(n.country.as_deref(), Some("IN"));
        assert_eq!(n.state_code.as_deref(), Some("KA"));
        assert_eq!(n.description, None);
    }

    #[test]
    fn coordinates_outside_india_rejected() {
        let mut n = valid();
        n.lat = Some(51.5072);
        n.lng = Some(-0.1276);
        assert!(matches!(n.normalize(), Err(AppError::Validation(_))));
    }

    #[test]
    fn half_a_coordinate_rejected() {
        let mut n = valid();
        n.lng = None;
        assert!(n.normalize().is_err());
    }

    #[test]
    fn non_india_country_rejected() {
        let mut n = valid();
        n.country = Some("np".into());
        assert!(n.normalize().is_err());
    }

    #[test]
    fn short_title_rejected() {
        let mut n = valid();
        n.title = " ab ".into();
        assert!(n.normalize().is_err());
    }

    #[test]
    fn markup_is_stripped_from_text_fields() {
        let mut n = valid();
        n.description = Some("<b>deep</b> pothole".into());
        assert_eq!(n.normalize().unwrap().description.as_deref(), Some("deep pothole"));
    }

    #[test]
    fn bulk_errors_are_readable() {
        assert_eq!(bulk_error_message(&AppError::NotFound), "Issue not found");
        assert_eq!(
            bulk_error_message(&AppError::validation("A comment is required")),
            "A comment is required"
        );
    }
}
