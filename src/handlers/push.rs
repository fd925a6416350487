use crate::error::{AppError, AppResult};
use crate::handlers::auth::MessageResponse;
use crate::middleware::AuthUser;
use crate::response::ApiResponse;
use crate::services::push_subscription::PushSubscriptionService;
use axum::{response::IntoResponse, Extension, Json};
use sea_orm::DatabaseConnection;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// VAPID application server key handed to browsers; `None` when push is
/// not configured.
#[derive(Debug, Clone, Default)]
pub struct PushPublicKey(pub Option<String>);

#[derive(Debug, Deserialize, ToSchema)]
pub struct SubscriptionKeys {
    pub p256dh: String,
    pub auth: String,
}

/// Same shape as the browser's `PushSubscription.toJSON()`.
#[derive(Debug, Deserialize, ToSchema)]
pub struct SubscribeRequest {
    pub endpoint: String,
    pub keys: SubscriptionKeys,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct UnsubscribeRequest {
    pub endpoint: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct PublicKeyResponse {
    pub enabled: bool,
    pub public_key: Option<String>,
}

#[utoipa::path(
    get,
    path = "/api/v1/push/public-key",
    responses((status = 200, description = "VAPID public key", body = PublicKeyResponse)),
    tag = "push"
)]
pub async fn public_key(Extension(key): Extension<PushPublicKey>) -> impl IntoResponse {
    ApiResponse::ok(PublicKeyResponse {
        enabled: key.0.is_some(),
        public_key: key.0,
    })
}

#[utoipa::path(
    post,
    path = "/api/v1/push/subscribe",
    security(("jwt_token" = [])),
    request_body = SubscribeRequest,
    responses(
        (status = 200, description = "Subscription saved", body = MessageResponse),
        (status = 400, description = "Bad subscription", body = AppError),
        (status = 401, description = "Unauthorized", body = AppError),
    ),
    tag = "push"
)]
pub async fn subscribe(
    Extension(db): Extension<DatabaseConnection>,
    auth_user: AuthUser,
    Json(payload): Json<SubscribeRequest>,
) -> AppResult<impl IntoResponse> {
    PushSubscriptionService::new(db)
        .subscribe(
            auth_user.user_id,
            &payload.endpoint,
            &payload.keys.p256dh,
            &payload.keys.auth,
        )
        .await?;
    Ok(ApiResponse::ok(MessageResponse::new("Subscribed")))
}

#[utoipa::path(
    post,
    path = "/api/v1/push/unsubscribe",
    security(("jwt_token" = [])),
    request_body = UnsubscribeRequest,
    responses(
        (status = 200, description = "Subscription removed", body = MessageResponse),
        (status = 401, description = "Unauthorized", body = AppError),
    ),
    tag = "push"
)]
pub async fn unsubscribe(
    Extension(db): Extension<DatabaseConnection>,
    auth_user: AuthUser,
    Json(payload): Json<UnsubscribeRequest>,
) -> AppResult<impl IntoResponse> {
    PushSubscriptionService::new(db)
        .unsubscribe(auth_user.user_id, &payload.endpoint)
        .await?;
    Ok(ApiResponse::ok(MessageResponse::new("Unsubscribed")))
}
