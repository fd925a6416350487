//! Best-effort email and push delivery.
//!
//! Handlers enqueue a [`NotificationJob`] after their write has committed;
//! a small pool of workers resolves recipients, renders messages and
//! delivers them with bounded retries. Nothing here can fail a request.

use crate::{
    config::notification::NotificationConfig,
    models::{issue, push_subscription, user, Issue, IssueStatus, PushSubscription, User, UserRole},
    services::{
        email::{EmailMessage, EmailTemplates, Mailer},
        push::{PushOutcome, PushSender},
        settings::{Settings, SettingsService},
    },
};
use sea_orm::{ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder};
use std::{collections::HashSet, future::Future, sync::Arc, time::Duration};
use tokio::sync::{mpsc, Mutex};

#[derive(Debug, Clone)]
pub enum NotificationJob {
    VerifyEmail {
        email: String,
        name: String,
        code: String,
        token: String,
    },
    PasswordReset {
        email: String,
        token: String,
    },
    AccountCreated {
        email: String,
        name: String,
        role: UserRole,
        token: String,
    },
    ReportConfirmation {
        issue_id: i32,
    },
    StatusChanged {
        issue_id: i32,
        status: IssueStatus,
        actor_id: i32,
        comment: Option<String>,
    },
    CommentAdded {
        issue_id: i32,
        author_id: i32,
        body: String,
    },
    Assigned {
        issue_id: i32,
        assignee_id: i32,
    },
}

impl NotificationJob {
    fn kind(&self) -> &'static str {
        match self {
            Self::VerifyEmail { .. } => "verify_email",
            Self::PasswordReset { .. } => "password_reset",
            Self::AccountCreated { .. } => "account_created",
            Self::ReportConfirmation { .. } => "report_confirmation",
            Self::StatusChanged { .. } => "status_changed",
            Self::CommentAdded { .. } => "comment_added",
            Self::Assigned { .. } => "assigned",
        }
    }
}

/// Handle used by request handlers. Cloning is cheap.
#[derive(Clone)]
pub struct NotificationDispatcher {
    tx: mpsc::Sender<NotificationJob>,
}

impl NotificationDispatcher {
    /// Spawn the worker pool on the current tokio runtime.
    pub fn start(
        db: DatabaseConnection,
        mailer: Arc<dyn Mailer>,
        push: Arc<dyn PushSender>,
        templates: EmailTemplates,
        config: NotificationConfig,
    ) -> Self {
        let (tx, rx) = mpsc::channel(config.queue_size);
        let rx = Arc::new(Mutex::new(rx));
        let worker = Arc::new(Worker {
            db,
            mailer,
            push,
            templates,
            retry: RetryPolicy {
                max_attempts: config.max_attempts,
                initial_backoff: config.initial_backoff,
            },
        });

        for id in 0..config.workers {
            tokio::spawn(run_worker(id, rx.clone(), worker.clone()));
        }
        tracing::info!(
            workers = config.workers,
            queue = config.queue_size,
            "Notification dispatcher started"
        );

        Self { tx }
    }

    /// Enqueue without waiting. A full or closed queue drops the job.
    pub fn dispatch(&self, job: NotificationJob) {
        let kind = job.kind();
        match self.tx.try_send(job) {
            Ok(()) => tracing::debug!("Queued {} notification", kind),
            Err(mpsc::error::TrySendError::Full(_)) => {
                tracing::warn!("Notification queue full, dropping {} notification", kind)
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                tracing::error!("Notification workers stopped, dropping {} notification", kind)
            }
        }
    }
}

async fn run_worker(
    id: usize,
    rx: Arc<Mutex<mpsc::Receiver<NotificationJob>>>,
    worker: Arc<Worker>,
) {
    loop {
        let job = { rx.lock().await.recv().await };
        match job {
            Some(job) => worker.handle(job).await,
            None => break,
        }
    }
    tracing::debug!("Notification worker {} exiting", id);
}

#[derive(Debug, Clone, Copy)]
struct RetryPolicy {
    max_attempts: u32,
    initial_backoff: Duration,
}

/// Run `op` until it succeeds or attempts run out, doubling the delay
/// between attempts. Returns `None` once the job is given up.
async fn with_retry<T, F, Fut>(policy: RetryPolicy, label: &str, mut op: F) -> Option<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = anyhow::Result<T>>,
{
    let mut backoff = policy.initial_backoff;
    for attempt in 1..=policy.max_attempts {
        match op().await {
            Ok(value) => return Some(value),
            Err(e) if attempt < policy.max_attempts => {
                tracing::debug!("{} failed (attempt {}): {:#}, retrying", label, attempt, e);
                tokio::time::sleep(backoff).await;
                backoff = backoff.saturating_mul(2);
            }
            Err(e) => {
                tracing::warn!("{} failed after {} attempts: {:#}", label, attempt, e);
            }
        }
    }
    None
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Recipient {
    pub user_id: i32,
    pub email: String,
    pub name: String,
}

impl From<user::Model> for Recipient {
    fn from(u: user::Model) -> Self {
        Self {
            user_id: u.id,
            email: u.email,
            name: u.name,
        }
    }
}

/// The creator always hears about a status change; the assignee only when
/// someone else made it.
pub fn status_recipients(
    creator: Option<Recipient>,
    assignee: Option<Recipient>,
    actor_id: i32,
) -> Vec<Recipient> {
    let assignee = assignee.filter(|a| a.user_id != actor_id);
    dedupe(creator.into_iter().chain(assignee))
}

/// Creator, assignee and every admin, minus the comment author.
pub fn comment_recipients(
    creator: Option<Recipient>,
    assignee: Option<Recipient>,
    admins: Vec<Recipient>,
    author_id: i32,
) -> Vec<Recipient> {
    dedupe(
        creator
            .into_iter()
            .chain(assignee)
            .chain(admins)
            .filter(|r| r.user_id != author_id),
    )
}

/// One entry per email address, first occurrence wins.
fn dedupe(candidates: impl Iterator<Item = Recipient>) -> Vec<Recipient> {
    let mut seen = HashSet::new();
    candidates
        .filter(|r| seen.insert(r.email.to_ascii_lowercase()))
        .collect()
}

struct Worker {
    db: DatabaseConnection,
    mailer: Arc<dyn Mailer>,
    push: Arc<dyn PushSender>,
    templates: EmailTemplates,
    retry: RetryPolicy,
}

impl Worker {
    async fn handle(&self, job: NotificationJob) {
        let kind = job.kind();
        if let Err(e) = self.deliver(job).await {
            tracing::warn!("Dropping {} notification: {:#}", kind, e);
        }
    }

    async fn deliver(&self, job: NotificationJob) -> anyhow::Result<()> {
        match job {
            NotificationJob::VerifyEmail {
                email,
                name,
                code,
                token,
            } => {
                self.email(self.templates.verify_email(&email, &name, &code, &token))
                    .await;
            }
            NotificationJob::PasswordReset { email, token } => {
                self.email(self.templates.password_reset(&email, &token))
                    .await;
            }
            NotificationJob::AccountCreated {
                email,
                name,
                role,
                token,
            } => {
                self.email(
                    self.templates
                        .account_created(&email, &name, role.as_str(), &token),
                )
                .await;
            }
            NotificationJob::ReportConfirmation { issue_id } => {
                let issue = self.issue(issue_id).await?;
                let Some(creator) = self.recipient(issue.created_by_id).await? else {
                    return Ok(());
                };
                let settings = self.settings().await;
                self.email(
                    self.templates
                        .report_confirmation(&creator.email, issue.id, &issue.title),
                )
                .await;
                if settings.push_notifications_enabled {
                    self.push_user(creator.user_id).await;
                }
            }
            NotificationJob::StatusChanged {
                issue_id,
                status,
                actor_id,
                comment,
            } => {
                let issue = self.issue(issue_id).await?;
                let settings = self.settings().await;
                let recipients = status_recipients(
                    self.recipient(issue.created_by_id).await?,
                    self.recipient(issue.assigned_to_id).await?,
                    actor_id,
                );
                for r in recipients {
                    let message = settings.auto_email_on_status_change.then(|| {
                        self.templates.status_changed(
                            &r.email,
                            issue.id,
                            &issue.title,
                            status.label(),
                            comment.as_deref(),
                        )
                    });
                    self.notify(&r, message, settings.push_notifications_enabled)
                        .await;
                }
            }
            NotificationJob::CommentAdded {
                issue_id,
                author_id,
                body,
            } => {
                let issue = self.issue(issue_id).await?;
                let settings = self.settings().await;
                let author = self
                    .recipient(Some(author_id))
                    .await?
                    .map(|a| a.name)
                    .unwrap_or_else(|| "Someone".to_string());
                let recipients = comment_recipients(
                    self.recipient(issue.created_by_id).await?,
                    self.recipient(issue.assigned_to_id).await?,
                    self.admins().await?,
                    author_id,
                );
                for r in recipients {
                    let message = self.templates.comment_added(
                        &r.email,
                        issue.id,
                        &issue.title,
                        &author,
                        &body,
                    );
                    self.notify(&r, Some(message), settings.push_notifications_enabled)
                        .await;
                }
            }
            NotificationJob::Assigned {
                issue_id,
                assignee_id,
            } => {
                let issue = self.issue(issue_id).await?;
                let Some(assignee) = self.recipient(Some(assignee_id)).await? else {
                    return Ok(());
                };
                let settings = self.settings().await;
                self.email(self.templates.assigned(
                    &assignee.email,
                    &assignee.name,
                    issue.id,
                    &issue.title,
                ))
                .await;
                if settings.push_notifications_enabled {
                    self.push_user(assignee.user_id).await;
                }
            }
        }
        Ok(())
    }

    async fn settings(&self) -> Settings {
        SettingsService::new(self.db.clone())
            .load_or_default()
            .await
    }

    async fn issue(&self, id: i32) -> anyhow::Result<issue::Model> {
        Issue::find_by_id(id)
            .one(&self.db)
            .await?
            .ok_or_else(|| anyhow::anyhow!("issue {} no longer exists", id))
    }

    async fn recipient(&self, user_id: Option<i32>) -> anyhow::Result<Option<Recipient>> {
        let Some(id) = user_id else {
            return Ok(None);
        };
        Ok(User::find_by_id(id)
            .one(&self.db)
            .await?
            .filter(|u| u.is_active)
            .map(Recipient::from))
    }

    async fn admins(&self) -> anyhow::Result<Vec<Recipient>> {
        Ok(User::find()
            .filter(user::Column::Role.is_in([UserRole::Admin, UserRole::SuperAdmin]))
            .filter(user::Column::IsActive.eq(true))
            .order_by_asc(user::Column::Id)
            .all(&self.db)
            .await?
            .into_iter()
            .map(Recipient::from)
            .collect())
    }

    async fn email(&self, message: EmailMessage) {
        let label = format!("email '{}' to {}", message.subject, message.to);
        let mailer = self.mailer.clone();
        with_retry(self.retry, &label, || {
            let mailer = mailer.clone();
            let message = message.clone();
            async move { mailer.send(&message).await }
        })
        .await;
    }

    /// One recipient's share of a fan-out. Never fails.
    async fn notify(&self, r: &Recipient, message: Option<EmailMessage>, push: bool) {
        if let Some(message) = message {
            self.email(message).await;
        }
        if push {
            self.push_user(r.user_id).await;
        }
    }

    /// Push failures for one user never stop delivery to the others.
    async fn push_user(&self, user_id: i32) {
        if let Err(e) = self.push_subscriptions(user_id).await {
            tracing::warn!("Push delivery to user {} failed: {:#}", user_id, e);
        }
    }

    /// Tickle every browser the user subscribed; prune endpoints the push
    /// service reports as gone.
    async fn push_subscriptions(&self, user_id: i32) -> anyhow::Result<()> {
        let subscriptions = PushSubscription::find()
            .filter(push_subscription::Column::UserId.eq(user_id))
            .all(&self.db)
            .await?;

        for sub in subscriptions {
            let push = self.push.clone();
            let endpoint = sub.endpoint.clone();
            let label = format!("push to user {}", user_id);
            let outcome = with_retry(self.retry, &label, || {
                let push = push.clone();
                let endpoint = endpoint.clone();
                async move { push.send(&endpoint).await }
            })
            .await;

            if outcome == Some(PushOutcome::Gone) {
                tracing::info!("Removing expired push subscription {}", sub.id);
                PushSubscription::delete_by_id(sub.id).exec(&self.db).await?;
            }
        }
        Ok(())
    }
}
