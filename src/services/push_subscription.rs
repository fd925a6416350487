use crate::{
    error::{AppError, AppResult},
    models::{push_subscription, PushSubscription, PushSubscriptionModel},
};
use sea_orm::{ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter};

pub struct PushSubscriptionService {
    db: DatabaseConnection,
}

impl PushSubscriptionService {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    /// Upsert by endpoint: a browser re-subscribing under another account
    /// moves the subscription to that account.
    pub async fn subscribe(
        &self,
        user_id: i32,
        endpoint: &str,
        p256dh: &str,
        auth: &str,
    ) -> AppResult<PushSubscriptionModel> {
        let endpoint = endpoint.trim();
        if !endpoint.starts_with("https://") || p256dh.trim().is_empty() || auth.trim().is_empty() {
            return Err(AppError::validation("Bad subscription"));
        }

        let existing = PushSubscription::find()
            .filter(push_subscription::Column::Endpoint.eq(endpoint))
            .one(&self.db)
            .await?;

        let saved = match existing {
            Some(sub) => {
                let mut active: push_subscription::ActiveModel = sub.into();
                active.user_id = sea_orm::ActiveValue::Set(user_id);
                active.p256dh = sea_orm::ActiveValue::Set(p256dh.trim().to_string());
                active.auth = sea_orm::ActiveValue::Set(auth.trim().to_string());
                active.update(&self.db).await?
            }
            None => {
                push_subscription::ActiveModel {
                    user_id: sea_orm::ActiveValue::Set(user_id),
                    endpoint: sea_orm::ActiveValue::Set(endpoint.to_string()),
                    p256dh: sea_orm::ActiveValue::Set(p256dh.trim().to_string()),
                    auth: sea_orm::ActiveValue::Set(auth.trim().to_string()),
                    created_at: sea_orm::ActiveValue::Set(chrono::Utc::now().naive_utc()),
                    ..Default::default()
                }
                .insert(&self.db)
                .await?
            }
        };
        tracing::debug!(user_id, subscription_id = saved.id, "Push subscription saved");
        Ok(saved)
    }

    pub async fn unsubscribe(&self, user_id: i32, endpoint: &str) -> AppResult<()> {
        PushSubscription::delete_many()
            .filter(push_subscription::Column::Endpoint.eq(endpoint.trim()))
            .filter(push_subscription::Column::UserId.eq(user_id))
            .exec(&self.db)
            .await?;
        Ok(())
    }
}
