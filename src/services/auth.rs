use crate::{
    error::{AppError, AppResult},
    models::{refresh_token, user, RefreshToken, User, UserModel, UserRole},
    services::{
        notification::{NotificationDispatcher, NotificationJob},
        settings::SettingsService,
    },
    utils::{
        encode_access_token, encode_refresh_token, hash_password,
        jwt::{self, PURPOSE_RESET, PURPOSE_VERIFY},
        password::verification_code,
        verify_password,
    },
};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait, QueryFilter,
    TransactionTrait,
};

/// Lifetime of the six-digit email code.
pub const VERIFY_CODE_MINUTES: i64 = 60;

pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

pub struct AuthService {
    db: DatabaseConnection,
}

impl AuthService {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    /// Create a citizen account and mail the verification code and link.
    /// Returns (user_model, access_token, refresh_token).
    pub async fn register(
        &self,
        name: &str,
        email: &str,
        password: &str,
        mobile: Option<String>,
        notifier: &NotificationDispatcher,
    ) -> AppResult<(UserModel, String, String)> {
        let email = normalize_email(email);
        if self.find_by_email(&email).await?.is_some() {
            return Err(AppError::Conflict("Email already registered".to_string()));
        }

        let hashed_password = hash_password(password)?;
        let code = verification_code()?;
        let now = chrono::Utc::now().naive_utc();

        let user = user::ActiveModel {
            email: sea_orm::ActiveValue::Set(email.clone()),
            hashed_password: sea_orm::ActiveValue::Set(hashed_password),
            name: sea_orm::ActiveValue::Set(name.trim().to_string()),
            mobile: sea_orm::ActiveValue::Set(mobile.filter(|m| !m.trim().is_empty())),
            role: sea_orm::ActiveValue::Set(UserRole::Citizen),
            is_active: sea_orm::ActiveValue::Set(true),
            is_verified: sea_orm::ActiveValue::Set(false),
            email_verify_code: sea_orm::ActiveValue::Set(Some(code.clone())),
            email_verify_expires_at: sea_orm::ActiveValue::Set(Some(
                now + chrono::Duration::minutes(VERIFY_CODE_MINUTES),
            )),
            last_login: sea_orm::ActiveValue::Set(None),
            created_at: sea_orm::ActiveValue::Set(now),
            ..Default::default()
        }
        .insert(&self.db)
        .await?;

        let (access_token, refresh_token) = self.issue_tokens_for_user(&user).await?;

        notifier.dispatch(NotificationJob::VerifyEmail {
            email: user.email.clone(),
            name: user.name.clone(),
            code,
            token: jwt::encode_purpose_token(&user.email, PURPOSE_VERIFY)?,
        });
        tracing::info!(user_id = user.id, "User registered");

        Ok((user, access_token, refresh_token))
    }

    /// Returns (user_model, access_token, refresh_token).
    pub async fn login(&self, email: &str, password: &str) -> AppResult<(UserModel, String, String)> {
        let user = self
            .find_by_email(&normalize_email(email))
            .await?
            .ok_or(AppError::Unauthorized)?;

        if !verify_password(password, &user.hashed_password)? {
            return Err(AppError::Unauthorized);
        }
        if !user.is_active {
            return Err(AppError::Forbidden);
        }
        if !user.is_verified {
            let settings = SettingsService::new(self.db.clone()).load().await?;
            if settings.require_email_verification {
                return Err(AppError::Forbidden);
            }
        }

        let mut active: user::ActiveModel = user.into();
        active.last_login = sea_orm::ActiveValue::Set(Some(chrono::Utc::now().naive_utc()));
        let user = active.update(&self.db).await?;

        let (access_token, refresh_token) = self.issue_tokens_for_user(&user).await?;
        Ok((user, access_token, refresh_token))
    }

    /// Exchange a refresh token for a fresh pair; the old one stops working.
    pub async fn rotate_refresh_token(&self, current_refresh_token: &str) -> AppResult<(String, String)> {
        let claims = jwt::decode_jwt(current_refresh_token).map_err(|_| AppError::Unauthorized)?;
        if !jwt::is_refresh_token(&claims) {
            return Err(AppError::Unauthorized);
        }
        let user_id: i32 = claims.sub.parse().map_err(|_| AppError::Unauthorized)?;

        let token_hash = jwt::hash_refresh_token(current_refresh_token);
        let now = chrono::Utc::now().naive_utc();

        let existing = RefreshToken::find()
            .filter(refresh_token::Column::UserId.eq(user_id))
            .filter(refresh_token::Column::Token.eq(token_hash))
            .one(&self.db)
            .await?
            .ok_or(AppError::Unauthorized)?;

        if existing.expires_at <= now {
            let _ = RefreshToken::delete_by_id(existing.id).exec(&self.db).await;
            return Err(AppError::Unauthorized);
        }

        // Role may have changed since the token was issued.
        let user = self.get_user_by_id(user_id).await.map_err(|_| AppError::Unauthorized)?;
        if !user.is_active {
            return Err(AppError::Forbidden);
        }

        let txn = self.db.begin().await?;
        RefreshToken::delete_by_id(existing.id).exec(&txn).await?;
        let pair = self.issue_tokens_for_user_txn(&txn, &user).await?;
        txn.commit().await?;
        Ok(pair)
    }

    pub async fn revoke_refresh_token(&self, refresh_token: &str) -> AppResult<()> {
        RefreshToken::delete_many()
            .filter(refresh_token::Column::Token.eq(jwt::hash_refresh_token(refresh_token)))
            .exec(&self.db)
            .await?;
        Ok(())
    }

    pub async fn revoke_all_user_refresh_tokens(&self, user_id: i32) -> AppResult<()> {
        RefreshToken::delete_many()
            .filter(refresh_token::Column::UserId.eq(user_id))
            .exec(&self.db)
            .await?;
        Ok(())
    }

    pub async fn get_user_by_id(&self, id: i32) -> AppResult<UserModel> {
        User::find_by_id(id)
            .one(&self.db)
            .await?
            .ok_or(AppError::NotFound)
    }

    async fn find_by_email(&self, email: &str) -> AppResult<Option<UserModel>> {
        Ok(User::find()
            .filter(user::Column::Email.eq(email))
            .one(&self.db)
            .await?)
    }

    pub async fn update_profile(
        &self,
        user_id: i32,
        name: Option<&str>,
        mobile: Option<&str>,
    ) -> AppResult<UserModel> {
        let user = self.get_user_by_id(user_id).await?;
        let mut active: user::ActiveModel = user.into();
        if let Some(name) = name {
            let name = name.trim();
            if name.chars().count() < 2 {
                return Err(AppError::validation("Name too short"));
            }
            active.name = sea_orm::ActiveValue::Set(name.to_string());
        }
        if let Some(mobile) = mobile {
            let mobile = mobile.trim();
            active.mobile =
                sea_orm::ActiveValue::Set((!mobile.is_empty()).then(|| mobile.to_string()));
        }
        Ok(active.update(&self.db).await?)
    }

    /// Signs the user out everywhere.
    pub async fn change_password(
        &self,
        user_id: i32,
        current_password: &str,
        new_password: &str,
    ) -> AppResult<()> {
        let user = self.get_user_by_id(user_id).await?;
        if !verify_password(current_password, &user.hashed_password)? {
            return Err(AppError::validation("Current password is incorrect"));
        }
        let mut active: user::ActiveModel = user.into();
        active.hashed_password = sea_orm::ActiveValue::Set(hash_password(new_password)?);
        active.update(&self.db).await?;
        self.revoke_all_user_refresh_tokens(user_id).await?;
        Ok(())
    }

    /// Redeem an emailed verification link.
    pub async fn verify_email(&self, token: &str) -> AppResult<&'static str> {
        let email = jwt::decode_purpose_token(token, PURPOSE_VERIFY).map_err(|_| {
            AppError::validation(
                "Invalid or expired verification link. Please request a new one.",
            )
        })?;
        let user = self.find_by_email(&email).await?.ok_or(AppError::NotFound)?;
        if user.is_verified {
            return Ok("Email already verified");
        }
        self.mark_verified(user).await?;
        Ok("Email verified successfully")
    }

    pub async fn verify_code(&self, email: &str, code: &str) -> AppResult<&'static str> {
        let user = self
            .find_by_email(&normalize_email(email))
            .await?
            .ok_or(AppError::NotFound)?;
        if user.is_verified {
            return Ok("Email is already verified.");
        }

        let (Some(expected), Some(expires_at)) =
            (user.email_verify_code.as_deref(), user.email_verify_expires_at)
        else {
            return Err(AppError::validation(
                "No verification code found. Please request a new verification code.",
            ));
        };
        if chrono::Utc::now().naive_utc() > expires_at {
            return Err(AppError::validation(
                "Verification code has expired. Please request a new one.",
            ));
        }
        if expected != code.trim() {
            return Err(AppError::validation(
                "Invalid verification code. Please check and try again.",
            ));
        }

        self.mark_verified(user).await?;
        Ok("Email verified successfully. You can now sign in.")
    }

    async fn mark_verified(&self, user: UserModel) -> AppResult<()> {
        let user_id = user.id;
        let mut active: user::ActiveModel = user.into();
        active.is_verified = sea_orm::ActiveValue::Set(true);
        active.email_verify_code = sea_orm::ActiveValue::Set(None);
        active.email_verify_expires_at = sea_orm::ActiveValue::Set(None);
        active.update(&self.db).await?;
        tracing::info!(user_id, "Email verified");
        Ok(())
    }

    /// Issue a new code and link. Unknown addresses get the same answer.
    pub async fn send_verification(
        &self,
        email: &str,
        notifier: &NotificationDispatcher,
    ) -> AppResult<&'static str> {
        let Some(user) = self.find_by_email(&normalize_email(email)).await? else {
            return Ok("If an account exists with this email, a verification email has been sent.");
        };
        if user.is_verified {
            return Ok("Email is already verified.");
        }

        let code = verification_code()?;
        let now = chrono::Utc::now().naive_utc();
        let (email, name) = (user.email.clone(), user.name.clone());
        let mut active: user::ActiveModel = user.into();
        active.email_verify_code = sea_orm::ActiveValue::Set(Some(code.clone()));
        active.email_verify_expires_at = sea_orm::ActiveValue::Set(Some(
            now + chrono::Duration::minutes(VERIFY_CODE_MINUTES),
        ));
        active.update(&self.db).await?;

        notifier.dispatch(NotificationJob::VerifyEmail {
            token: jwt::encode_purpose_token(&email, PURPOSE_VERIFY)?,
            email,
            name,
            code,
        });
        Ok("Verification email sent. Check your inbox for the code and link.")
    }

    /// Always succeeds so callers cannot probe for registered addresses.
    pub async fn forgot_password(
        &self,
        email: &str,
        notifier: &NotificationDispatcher,
    ) -> AppResult<()> {
        if let Some(user) = self.find_by_email(&normalize_email(email)).await? {
            notifier.dispatch(NotificationJob::PasswordReset {
                token: jwt::encode_purpose_token(&user.email, PURPOSE_RESET)?,
                email: user.email,
            });
        }
        Ok(())
    }

    pub async fn reset_password(&self, token: &str, new_password: &str) -> AppResult<()> {
        let email = jwt::decode_purpose_token(token, PURPOSE_RESET).map_err(|_| {
            AppError::validation(
                "Invalid or expired reset link. Please request a new password reset.",
            )
        })?;
        let user = self.find_by_email(&email).await?.ok_or(AppError::NotFound)?;
        if !user.is_active {
            return Err(AppError::Forbidden);
        }

        let user_id = user.id;
        let mut active: user::ActiveModel = user.into();
        active.hashed_password = sea_orm::ActiveValue::Set(hash_password(new_password)?);
        // Following an emailed link proves ownership of the address.
        active.is_verified = sea_orm::ActiveValue::Set(true);
        active.update(&self.db).await?;
        self.revoke_all_user_refresh_tokens(user_id).await?;
        tracing::info!(user_id, "Password reset");
        Ok(())
    }

    async fn issue_tokens_for_user(&self, user: &UserModel) -> AppResult<(String, String)> {
        self.issue_tokens_for_user_txn(&self.db, user).await
    }

    async fn issue_tokens_for_user_txn<C: ConnectionTrait>(
        &self,
        conn: &C,
        user: &UserModel,
    ) -> AppResult<(String, String)> {
        let access_token = encode_access_token(user.id, user.role)?;
        let refresh_token = encode_refresh_token(user.id, user.role)?;
        persist_refresh_token(conn, user.id, &refresh_token).await?;
        Ok((access_token, refresh_token))
    }
}

async fn persist_refresh_token<C: ConnectionTrait>(
    conn: &C,
    user_id: i32,
    refresh_token: &str,
) -> AppResult<()> {
    let now = chrono::Utc::now().naive_utc();
    let expires_at =
        now + chrono::Duration::seconds(jwt::refresh_token_expiry_seconds() as i64);

    refresh_token::ActiveModel {
        user_id: sea_orm::ActiveValue::Set(user_id),
        token: sea_orm::ActiveValue::Set(jwt::hash_refresh_token(refresh_token)),
        expires_at: sea_orm::ActiveValue::Set(expires_at),
        created_at: sea_orm::ActiveValue::Set(now),
        ..Default::default()
    }
    .insert(conn)
    .await?;
    Ok(())
}
