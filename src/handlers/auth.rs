use crate::error::{AppError, AppResult};
use crate::middleware::AuthUser;
use crate::models::{UserModel, UserRole};
use crate::response::ApiResponse;
use crate::services::auth::AuthService;
use crate::services::notification::NotificationDispatcher;
use axum::{response::IntoResponse, Extension, Json};
use chrono::NaiveDateTime;
use sea_orm::DatabaseConnection;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use validator::Validate;

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct RegisterRequest {
    /// Display name (2-100 characters)
    #[validate(length(min = 2, max = 100))]
    pub name: String,
    /// Email address
    #[validate(email)]
    pub email: String,
    /// Password (min 8 characters)
    #[validate(length(min = 8, max = 128))]
    pub password: String,
    /// Mobile number
    #[validate(length(max = 20))]
    pub mobile: Option<String>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct UserResponse {
    pub id: i32,
    pub email: String,
    pub name: String,
    pub mobile: Option<String>,
    pub role: UserRole,
    pub is_active: bool,
    pub is_verified: bool,
    pub last_login: Option<NaiveDateTime>,
    pub created_at: NaiveDateTime,
}

impl From<UserModel> for UserResponse {
    fn from(user: UserModel) -> Self {
        Self {
            id: user.id,
            email: user.email,
            name: user.name,
            mobile: user.mobile,
            role: user.role,
            is_active: user.is_active,
            is_verified: user.is_verified,
            last_login: user.last_login,
            created_at: user.created_at,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct TokenResponse {
    /// JWT access token (bearer)
    pub access_token: String,
    /// JWT refresh token
    pub refresh_token: String,
    pub token_type: String,
    /// Access token lifetime in seconds
    pub expires_in: u64,
}

impl TokenResponse {
    fn bearer(access_token: String, refresh_token: String) -> Self {
        Self {
            access_token,
            refresh_token,
            token_type: "bearer".to_string(),
            expires_in: crate::utils::jwt::access_token_expiry_seconds(),
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct AuthResponse {
    #[serde(flatten)]
    pub tokens: TokenResponse,
    pub user: UserResponse,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

pub(crate) fn validate_payload<T: Validate>(payload: &T) -> AppResult<()> {
    payload
        .validate()
        .map_err(|e| AppError::Validation(e.to_string()))
}

#[utoipa::path(
    post,
    path = "/api/v1/auth/register",
    request_body = RegisterRequest,
    responses(
        (status = 201, description = "Account created; verification email queued", body = AuthResponse),
        (status = 400, description = "Validation error or email taken", body = AppError),
    ),
    tag = "auth"
)]
pub async fn register(
    Extension(db): Extension<DatabaseConnection>,
    Extension(notifier): Extension<NotificationDispatcher>,
    Json(payload): Json<RegisterRequest>,
) -> AppResult<impl IntoResponse> {
    validate_payload(&payload)?;

    let service = AuthService::new(db);
    let (user, access_token, refresh_token) = service
        .register(
            &payload.name,
            &payload.email,
            &payload.password,
            payload.mobile,
            &notifier,
        )
        .await?;

    Ok(ApiResponse::created(AuthResponse {
        tokens: TokenResponse::bearer(access_token, refresh_token),
        user: user.into(),
    }))
}

#[utoipa::path(
    post,
    path = "/api/v1/auth/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Login successful", body = AuthResponse),
        (status = 401, description = "Invalid email or password", body = AppError),
        (status = 403, description = "Account deactivated or email not verified", body = AppError),
    ),
    tag = "auth"
)]
pub async fn login(
    Extension(db): Extension<DatabaseConnection>,
    Json(payload): Json<LoginRequest>,
) -> AppResult<impl IntoResponse> {
    let service = AuthService::new(db);
    let (user, access_token, refresh_token) =
        service.login(&payload.email, &payload.password).await?;

    Ok(ApiResponse::ok(AuthResponse {
        tokens: TokenResponse::bearer(access_token, refresh_token),
        user: user.into(),
    }))
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct RefreshTokenRequest {
    pub refresh_token: String,
}

#[utoipa::path(
    post,
    path = "/api/v1/auth/refresh",
    request_body = RefreshTokenRequest,
    responses(
        (status = 200, description = "New token pair; the presented refresh token is revoked", body = TokenResponse),
        (status = 401, description = "Invalid, expired or reused refresh token", body = AppError),
    ),
    tag = "auth"
)]
pub async fn refresh_token(
    Extension(db): Extension<DatabaseConnection>,
    Json(payload): Json<RefreshTokenRequest>,
) -> AppResult<impl IntoResponse> {
    let service = AuthService::new(db);
    let (access_token, refresh_token) = service.rotate_refresh_token(&payload.refresh_token).await?;
    Ok(ApiResponse::ok(TokenResponse::bearer(access_token, refresh_token)))
}

#[utoipa::path(
    post,
    path = "/api/v1/auth/logout",
    request_body = RefreshTokenRequest,
    responses(
        (status = 200, description = "Refresh token revoked", body = MessageResponse),
    ),
    tag = "auth"
)]
pub async fn logout(
    Extension(db): Extension<DatabaseConnection>,
    Json(payload): Json<RefreshTokenRequest>,
) -> AppResult<impl IntoResponse> {
    AuthService::new(db)
        .revoke_refresh_token(&payload.refresh_token)
        .await?;
    Ok(ApiResponse::ok(MessageResponse::new("Logged out")))
}

#[utoipa::path(
    get,
    path = "/api/v1/auth/me",
    security(("jwt_token" = [])),
    responses(
        (status = 200, description = "Current user", body = UserResponse),
        (status = 401, description = "Unauthorized", body = AppError),
    ),
    tag = "auth"
)]
pub async fn get_current_user(
    Extension(db): Extension<DatabaseConnection>,
    auth_user: AuthUser,
) -> AppResult<impl IntoResponse> {
    let user = AuthService::new(db).get_user_by_id(auth_user.user_id).await?;
    Ok(ApiResponse::ok(UserResponse::from(user)))
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct UpdateProfileRequest {
    #[validate(length(max = 100))]
    pub name: Option<String>,
    /// Empty string clears the number
    #[validate(length(max = 20))]
    pub mobile: Option<String>,
}

#[utoipa::path(
    put,
    path = "/api/v1/auth/profile",
    security(("jwt_token" = [])),
    request_body = UpdateProfileRequest,
    responses(
        (status = 200, description = "Profile updated", body = UserResponse),
        (status = 400, description = "Validation error", body = AppError),
    ),
    tag = "auth"
)]
pub async fn update_profile(
    Extension(db): Extension<DatabaseConnection>,
    auth_user: AuthUser,
    Json(payload): Json<UpdateProfileRequest>,
) -> AppResult<impl IntoResponse> {
    validate_payload(&payload)?;
    let user = AuthService::new(db)
        .update_profile(
            auth_user.user_id,
            payload.name.as_deref(),
            payload.mobile.as_deref(),
        )
        .await?;
    Ok(ApiResponse::ok(UserResponse::from(user)))
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct ChangePasswordRequest {
    pub current_password: String,
    /// New password (min 8 characters)
    #[validate(length(min = 8, max = 128))]
    pub new_password: String,
}

#[utoipa::path(
    put,
    path = "/api/v1/auth/password",
    security(("jwt_token" = [])),
    request_body = ChangePasswordRequest,
    responses(
        (status = 200, description = "Password changed; other sessions signed out", body = MessageResponse),
        (status = 400, description = "Validation error", body = AppError),
        (status = 401, description = "Unauthorized", body = AppError),
    ),
    tag = "auth"
)]
pub async fn change_password(
    Extension(db): Extension<DatabaseConnection>,
    auth_user: AuthUser,
    Json(payload): Json<ChangePasswordRequest>,
) -> AppResult<impl IntoResponse> {
    validate_payload(&payload)?;
    AuthService::new(db)
        .change_password(
            auth_user.user_id,
            &payload.current_password,
            &payload.new_password,
        )
        .await?;
    Ok(ApiResponse::ok(MessageResponse::new("Password changed successfully")))
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct VerifyEmailRequest {
    /// Token from the verification link
    pub token: String,
}

#[utoipa::path(
    post,
    path = "/api/v1/auth/verify-email",
    request_body = VerifyEmailRequest,
    responses(
        (status = 200, description = "Email verified", body = MessageResponse),
        (status = 400, description = "Invalid or expired link", body = AppError),
    ),
    tag = "auth"
)]
pub async fn verify_email(
    Extension(db): Extension<DatabaseConnection>,
    Json(payload): Json<VerifyEmailRequest>,
) -> AppResult<impl IntoResponse> {
    let message = AuthService::new(db).verify_email(&payload.token).await?;
    Ok(ApiResponse::ok(MessageResponse::new(message)))
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct VerifyCodeRequest {
    pub email: String,
    /// Six-digit code from the verification email
    pub code: String,
}

#[utoipa::path(
    post,
    path = "/api/v1/auth/verify-code",
    request_body = VerifyCodeRequest,
    responses(
        (status = 200, description = "Email verified", body = MessageResponse),
        (status = 400, description = "Wrong, missing or expired code", body = AppError),
        (status = 404, description = "User not found", body = AppError),
    ),
    tag = "auth"
)]
pub async fn verify_code(
    Extension(db): Extension<DatabaseConnection>,
    Json(payload): Json<VerifyCodeRequest>,
) -> AppResult<impl IntoResponse> {
    let message = AuthService::new(db)
        .verify_code(&payload.email, &payload.code)
        .await?;
    Ok(ApiResponse::ok(MessageResponse::new(message)))
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct EmailRequest {
    #[validate(email)]
    pub email: String,
}

#[utoipa::path(
    post,
    path = "/api/v1/auth/send-verify",
    request_body = EmailRequest,
    responses(
        (status = 200, description = "Verification email queued if the account exists", body = MessageResponse),
    ),
    tag = "auth"
)]
pub async fn send_verification(
    Extension(db): Extension<DatabaseConnection>,
    Extension(notifier): Extension<NotificationDispatcher>,
    Json(payload): Json<EmailRequest>,
) -> AppResult<impl IntoResponse> {
    validate_payload(&payload)?;
    let message = AuthService::new(db)
        .send_verification(&payload.email, &notifier)
        .await?;
    Ok(ApiResponse::ok(MessageResponse::new(message)))
}

#[utoipa::path(
    post,
    path = "/api/v1/auth/forgot",
    request_body = EmailRequest,
    responses(
        (status = 200, description = "Reset link queued if the account exists", body = MessageResponse),
        (status = 400, description = "Validation error", body = AppError),
    ),
    tag = "auth"
)]
pub async fn forgot_password(
    Extension(db): Extension<DatabaseConnection>,
    Extension(notifier): Extension<NotificationDispatcher>,
    Json(payload): Json<EmailRequest>,
) -> AppResult<impl IntoResponse> {
    validate_payload(&payload)?;
    AuthService::new(db)
        .forgot_password(&payload.email, &notifier)
        .await?;

    Ok(ApiResponse::ok(MessageResponse::new(
        "If an account exists with this email, a password reset link has been sent.",
    )))
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct ResetPasswordRequest {
    /// Token from the reset link
    pub token: String,
    /// New password (min 8 characters)
    #[validate(length(min = 8, max = 128))]
    pub password: String,
}

#[utoipa::path(
    post,
    path = "/api/v1/auth/reset",
    request_body = ResetPasswordRequest,
    responses(
        (status = 200, description = "Password reset", body = MessageResponse),
        (status = 400, description = "Invalid or expired link", body = AppError),
    ),
    tag = "auth"
)]
pub async fn reset_password(
    Extension(db): Extension<DatabaseConnection>,
    Json(payload): Json<ResetPasswordRequest>,
) -> AppResult<impl IntoResponse> {
    validate_payload(&payload)?;
    AuthService::new(db)
        .reset_password(&payload.token, &payload.password)
        .await?;

    Ok(ApiResponse::ok(MessageResponse::new(
        "Password reset successfully. You can now sign in with your new password.",
    )))
}
