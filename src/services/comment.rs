use crate::{
    error::{AppError, AppResult},
    models::{issue_comment, user, Issue, IssueComment, IssueCommentModel, User},
    services::notification::{NotificationDispatcher, NotificationJob},
    utils::text,
};
use chrono::NaiveDateTime;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait, QueryFilter,
    QueryOrder,
};
use serde::Serialize;
use std::collections::HashMap;
use utoipa::ToSchema;

pub const MAX_COMMENT_LEN: usize = 2000;

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct CommentView {
    pub id: i32,
    pub issue_id: i32,
    pub user_id: Option<i32>,
    pub author_name: Option<String>,
    pub body: String,
    pub created_at: NaiveDateTime,
}

/// Insert a timeline comment. Shared by status updates, which write the
/// change and its explanation in one transaction.
pub async fn insert_comment<C: ConnectionTrait>(
    conn: &C,
    issue_id: i32,
    user_id: Option<i32>,
    body: &str,
    now: NaiveDateTime,
) -> AppResult<IssueCommentModel> {
    let comment = issue_comment::ActiveModel {
        issue_id: sea_orm::ActiveValue::Set(issue_id),
        user_id: sea_orm::ActiveValue::Set(user_id),
        body: sea_orm::ActiveValue::Set(text::sanitize_plain(body)),
        created_at: sea_orm::ActiveValue::Set(now),
        ..Default::default()
    }
    .insert(conn)
    .await?;
    Ok(comment)
}

/// Sanitized comment text, `None` when nothing is left once markup is
/// stripped. Errors only on over-long text.
pub fn clean_optional(raw: Option<&str>) -> AppResult<Option<String>> {
    let body = match raw.map(text::sanitize_plain) {
        Some(body) if !body.is_empty() => body,
        _ => return Ok(None),
    };
    if body.chars().count() > MAX_COMMENT_LEN {
        return Err(AppError::Validation(format!(
            "Comment must be at most {} characters",
            MAX_COMMENT_LEN
        )));
    }
    Ok(Some(body))
}

pub fn clean_body(raw: &str) -> AppResult<String> {
    clean_optional(Some(raw))?.ok_or_else(|| AppError::validation("Comment cannot be empty"))
}

pub struct CommentService {
    db: DatabaseConnection,
}

impl CommentService {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    /// Newest first.
    pub async fn list(&self, issue_id: i32) -> AppResult<Vec<CommentView>> {
        self.ensure_issue(issue_id).await?;

        let comments = IssueComment::find()
            .filter(issue_comment::Column::IssueId.eq(issue_id))
            .order_by_desc(issue_comment::Column::CreatedAt)
            .order_by_desc(issue_comment::Column::Id)
            .all(&self.db)
            .await?;

        let author_ids: Vec<i32> = comments.iter().filter_map(|c| c.user_id).collect();
        let names: HashMap<i32, String> = if author_ids.is_empty() {
            HashMap::new()
        } else {
            User::find()
                .filter(user::Column::Id.is_in(author_ids))
                .all(&self.db)
                .await?
                .into_iter()
                .map(|u| (u.id, u.name))
                .collect()
        };

        Ok(comments
            .into_iter()
            .map(|c| CommentView {
                author_name: c.user_id.and_then(|id| names.get(&id).cloned()),
                id: c.id,
                issue_id: c.issue_id,
                user_id: c.user_id,
                body: c.body,
                created_at: c.created_at,
            })
            .collect())
    }

    pub async fn add(
        &self,
        issue_id: i32,
        author_id: i32,
        body: &str,
        notifier: &NotificationDispatcher,
    ) -> AppResult<CommentView> {
        let body = clean_body(body)?;
        self.ensure_issue(issue_id).await?;

        let now = chrono::Utc::now().naive_utc();
        let comment = insert_comment(&self.db, issue_id, Some(author_id), &body, now).await?;
        let author_name = User::find_by_id(author_id)
            .one(&self.db)
            .await?
            .map(|u| u.name);

        tracing::info!(issue_id, comment_id = comment.id, author_id, "Comment added");
        notifier.dispatch(NotificationJob::CommentAdded {
            issue_id,
            author_id,
            body: comment.body.clone(),
        });

        Ok(CommentView {
            id: comment.id,
            issue_id,
            user_id: comment.user_id,
            author_name,
            body: comment.body,
            created_at: comment.created_at,
        })
    }

    async fn ensure_issue(&self, issue_id: i32) -> AppResult<()> {
        Issue::find_by_id(issue_id)
            .one(&self.db)
            .await?
            .map(|_| ())
            .ok_or(AppError::NotFound)
    }
}
