use crate::error::AppResult;
use crate::models::{user, User, UserRole};
use crate::services::auth::normalize_email;
use crate::utils::hash_password;
use sea_orm::{ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter};
use std::env;

#[derive(Debug, Clone)]
pub struct BootstrapSuperAdminConfig {
    pub email: String,
    pub name: String,
    pub password: String,
}

impl BootstrapSuperAdminConfig {
    pub fn from_env() -> Option<Self> {
        if !crate::config::env_flag("BOOTSTRAP_SUPER_ADMIN_ENABLED", false) {
            return None;
        }

        let password = env::var("BOOTSTRAP_SUPER_ADMIN_PASSWORD").ok()?;
        if password.len() < crate::utils::password::MIN_PASSWORD_LEN {
            tracing::warn!("BOOTSTRAP_SUPER_ADMIN_PASSWORD is too short, skipping bootstrap");
            return None;
        }

        Some(Self {
            email: normalize_email(&env::var("BOOTSTRAP_SUPER_ADMIN_EMAIL").ok()?),
            name: env::var("BOOTSTRAP_SUPER_ADMIN_NAME").unwrap_or_else(|_| "Super Admin".to_string()),
            password,
        })
    }
}

/// Make sure a super admin exists at startup:
/// - any super admin already present: nothing to do
/// - the configured email belongs to an account: promote and activate it
/// - otherwise create a verified super admin
pub async fn ensure_bootstrap_super_admin(db: &DatabaseConnection) -> AppResult<()> {
    let Some(cfg) = BootstrapSuperAdminConfig::from_env() else {
        return Ok(());
    };

    let exists = User::find()
        .filter(user::Column::Role.eq(UserRole::SuperAdmin))
        .one(db)
        .await?
        .is_some();
    if exists {
        return Ok(());
    }

    let existing = User::find()
        .filter(user::Column::Email.eq(cfg.email.as_str()))
        .one(db)
        .await?;

    if let Some(u) = existing {
        let user_id = u.id;
        let mut active: user::ActiveModel = u.into();
        active.role = sea_orm::ActiveValue::Set(UserRole::SuperAdmin);
        active.is_active = sea_orm::ActiveValue::Set(true);
        active.is_verified = sea_orm::ActiveValue::Set(true);
        active.update(db).await?;
        tracing::info!(user_id, "Promoted existing account to super admin");
        return Ok(());
    }

    let created = user::ActiveModel {
        email: sea_orm::ActiveValue::Set(cfg.email),
        hashed_password: sea_orm::ActiveValue::Set(hash_password(&cfg.password)?),
        name: sea_orm::ActiveValue::Set(cfg.name),
        mobile: sea_orm::ActiveValue::Set(None),
        role: sea_orm::ActiveValue::Set(UserRole::SuperAdmin),
        is_active: sea_orm::ActiveValue::Set(true),
        is_verified: sea_orm::ActiveValue::Set(true),
        email_verify_code: sea_orm::ActiveValue::Set(None),
        email_verify_expires_at: sea_orm::ActiveValue::Set(None),
        last_login: sea_orm::ActiveValue::Set(None),
        created_at: sea_orm::ActiveValue::Set(chrono::Utc::now().naive_utc()),
        ..Default::default()
    }
    .insert(db)
    .await?;
    tracing::info!(user_id = created.id, "Bootstrap super admin created");
    Ok(())
}
