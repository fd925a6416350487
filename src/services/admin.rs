use crate::{
    error::{AppError, AppResult},
    middleware::AuthUser,
    models::{
        issue, issue_comment, staff_region, user, Issue, IssueComment, RefreshToken,
        StaffRegion, User, UserModel, UserRole,
    },
    services::{
        auth::normalize_email,
        notification::{NotificationDispatcher, NotificationJob},
        region::normalize_state_code,
    },
    utils::{
        hash_password,
        jwt::{self, PURPOSE_RESET},
        password::random_password,
    },
};
use chrono::NaiveDateTime;
use sea_orm::{
    sea_query::{Expr, Func, LikeExpr},
    ActiveModelTrait, ColumnTrait, Condition, DatabaseConnection, EntityTrait, PaginatorTrait,
    QueryFilter, QueryOrder, TransactionTrait,
};
use serde::Serialize;
use std::collections::HashMap;
use utoipa::ToSchema;

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct AdminUserView {
    pub id: i32,
    pub email: String,
    pub name: String,
    pub mobile: Option<String>,
    pub role: UserRole,
    pub is_active: bool,
    pub is_verified: bool,
    pub created_at: NaiveDateTime,
    pub last_login: Option<NaiveDateTime>,
    pub regions: Vec<String>,
}

impl AdminUserView {
    fn new(u: UserModel, regions: Vec<String>) -> Self {
        Self {
            id: u.id,
            email: u.email,
            name: u.name,
            mobile: u.mobile,
            role: u.role,
            is_active: u.is_active,
            is_verified: u.is_verified,
            created_at: u.created_at,
            last_login: u.last_login,
            regions,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct UserFilter {
    pub q: Option<String>,
    pub role: Option<UserRole>,
    pub is_active: Option<bool>,
    pub is_verified: Option<bool>,
}

#[derive(Debug, Clone)]
pub struct NewStaffUser {
    pub email: String,
    pub name: String,
    pub role: UserRole,
    pub region: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct UserUpdate {
    pub role: Option<UserRole>,
    pub is_active: Option<bool>,
    pub name: Option<String>,
}

/// Role rules for an admin edit, checked before anything is written.
/// `active_super_admins` is the current number of active super admins.
pub fn check_user_update(
    actor: &AuthUser,
    target: &UserModel,
    update: &UserUpdate,
    active_super_admins: u64,
) -> AppResult<()> {
    let role_change = update.role.filter(|r| *r != target.role);

    if let Some(new_role) = role_change {
        if actor.user_id == target.id {
            return Err(AppError::validation("You cannot change your own role"));
        }
        // Only super admins grant or revoke elevated roles.
        if !actor.is_super_admin() && (new_role.is_admin_or_above() || target.role.is_admin_or_above()) {
            return Err(AppError::Forbidden);
        }
        if target.role == UserRole::SuperAdmin && active_super_admins <= 1 {
            return Err(AppError::validation("Cannot demote the last super admin"));
        }
    }

    if update.is_active == Some(false) {
        if target.role == UserRole::SuperAdmin {
            return Err(AppError::validation("Super admin accounts cannot be deactivated"));
        }
        if actor.user_id == target.id {
            return Err(AppError::validation("You cannot deactivate yourself"));
        }
        if !actor.is_super_admin() && target.role.is_admin_or_above() {
            return Err(AppError::Forbidden);
        }
    }

    Ok(())
}

pub struct AdminService {
    db: DatabaseConnection,
}

impl AdminService {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    async fn regions_by_user(&self, user_ids: Vec<i32>) -> AppResult<HashMap<i32, Vec<String>>> {
        let mut regions: HashMap<i32, Vec<String>> = HashMap::new();
        if user_ids.is_empty() {
            return Ok(regions);
        }
        for r in StaffRegion::find()
            .filter(staff_region::Column::UserId.is_in(user_ids))
            .order_by_asc(staff_region::Column::StateCode)
            .all(&self.db)
            .await?
        {
            regions.entry(r.user_id).or_default().push(r.state_code);
        }
        Ok(regions)
    }

    /// Newest accounts first, each with its regions.
    pub async fn list_users(&self, filter: &UserFilter) -> AppResult<Vec<AdminUserView>> {
        let mut cond = Condition::all();
        if let Some(q) = filter.q.as_deref().map(str::trim).filter(|q| !q.is_empty()) {
            let pattern = format!(
                "%{}%",
                q.to_lowercase().replace('\\', "\\\\").replace('%', "\\%").replace('_', "\\_")
            );
            let text = |col: user::Column| {
                Expr::expr(Func::lower(Expr::col(col)))
                    .like(LikeExpr::new(pattern.clone()).escape('\\'))
            };
            cond = cond.add(
                Condition::any()
                    .add(text(user::Column::Email))
                    .add(text(user::Column::Name)),
            );
        }
        if let Some(role) = filter.role {
            cond = cond.add(user::Column::Role.eq(role));
        }
        if let Some(active) = filter.is_active {
            cond = cond.add(user::Column::IsActive.eq(active));
        }
        if let Some(verified) = filter.is_verified {
            cond = cond.add(user::Column::IsVerified.eq(verified));
        }

        let users = User::find()
            .filter(cond)
            .order_by_desc(user::Column::CreatedAt)
            .order_by_desc(user::Column::Id)
            .all(&self.db)
            .await?;

        let mut regions = self.regions_by_user(users.iter().map(|u| u.id).collect()).await?;
        Ok(users
            .into_iter()
            .map(|u| {
                let r = regions.remove(&u.id).unwrap_or_default();
                AdminUserView::new(u, r)
            })
            .collect())
    }

    pub async fn get_user(&self, user_id: i32) -> AppResult<AdminUserView> {
        let user = User::find_by_id(user_id)
            .one(&self.db)
            .await?
            .ok_or(AppError::NotFound)?;
        let regions = self
            .regions_by_user(vec![user_id])
            .await?
            .remove(&user_id)
            .unwrap_or_default();
        Ok(AdminUserView::new(user, regions))
    }

    /// Staff and admin accounts start verified with a random password;
    /// the owner sets a real one through the emailed reset link.
    pub async fn create_user(
        &self,
        actor: &AuthUser,
        input: NewStaffUser,
        notifier: &NotificationDispatcher,
    ) -> AppResult<AdminUserView> {
        actor.require_super_admin()?;

        let email = normalize_email(&input.email);
        let name = input.name.trim().to_string();
        if email.is_empty() || name.is_empty() {
            return Err(AppError::validation("Name and email are required"));
        }
        if !matches!(input.role, UserRole::Staff | UserRole::Admin) {
            return Err(AppError::validation("Only staff and admin accounts can be created"));
        }
        let region = input.region.as_deref().map(normalize_state_code).transpose()?;

        if User::find()
            .filter(user::Column::Email.eq(email.as_str()))
            .one(&self.db)
            .await?
            .is_some()
        {
            return Err(AppError::Conflict("Email already registered".to_string()));
        }

        let now = chrono::Utc::now().naive_utc();
        let txn = self.db.begin().await?;
        let user = user::ActiveModel {
            email: sea_orm::ActiveValue::Set(email),
            hashed_password: sea_orm::ActiveValue::Set(hash_password(&random_password()?)?),
            name: sea_orm::ActiveValue::Set(name),
            mobile: sea_orm::ActiveValue::Set(None),
            role: sea_orm::ActiveValue::Set(input.role),
            is_active: sea_orm::ActiveValue::Set(true),
            is_verified: sea_orm::ActiveValue::Set(true),
            email_verify_code: sea_orm::ActiveValue::Set(None),
            email_verify_expires_at: sea_orm::ActiveValue::Set(None),
            last_login: sea_orm::ActiveValue::Set(None),
            created_at: sea_orm::ActiveValue::Set(now),
            ..Default::default()
        }
        .insert(&txn)
        .await?;
        if let Some(code) = &region {
            staff_region::ActiveModel {
                user_id: sea_orm::ActiveValue::Set(user.id),
                state_code: sea_orm::ActiveValue::Set(code.clone()),
                ..Default::default()
            }
            .insert(&txn)
            .await?;
        }
        txn.commit().await?;

        tracing::info!(user_id = user.id, role = user.role.as_str(), actor = actor.user_id, "Account created");
        notifier.dispatch(NotificationJob::AccountCreated {
            token: jwt::encode_purpose_token(&user.email, PURPOSE_RESET)?,
            email: user.email.clone(),
            name: user.name.clone(),
            role: user.role,
        });

        Ok(AdminUserView::new(user, region.into_iter().collect()))
    }

    pub async fn update_user(
        &self,
        actor: &AuthUser,
        user_id: i32,
        update: UserUpdate,
    ) -> AppResult<AdminUserView> {
        actor.require_admin()?;
        let target = User::find_by_id(user_id)
            .one(&self.db)
            .await?
            .ok_or(AppError::NotFound)?;

        let active_super_admins = User::find()
            .filter(user::Column::Role.eq(UserRole::SuperAdmin))
            .filter(user::Column::IsActive.eq(true))
            .count(&self.db)
            .await?;
        check_user_update(actor, &target, &update, active_super_admins)?;

        let revoke_sessions = update.role.is_some_and(|r| r != target.role)
            || (update.is_active == Some(false) && target.is_active);

        let mut active: user::ActiveModel = target.into();
        if let Some(role) = update.role {
            active.role = sea_orm::ActiveValue::Set(role);
        }
        if let Some(is_active) = update.is_active {
            active.is_active = sea_orm::ActiveValue::Set(is_active);
        }
        if let Some(name) = update.name.as_deref().map(str::trim).filter(|n| !n.is_empty()) {
            active.name = sea_orm::ActiveValue::Set(name.to_string());
        }
        let updated = active.update(&self.db).await?;

        if revoke_sessions {
            RefreshToken::delete_many()
                .filter(crate::models::refresh_token::Column::UserId.eq(user_id))
                .exec(&self.db)
                .await?;
        }
        tracing::info!(user_id, actor = actor.user_id, "User updated");

        self.get_user(updated.id).await
    }

    pub async fn delete_user(&self, actor: &AuthUser, user_id: i32) -> AppResult<()> {
        actor.require_super_admin()?;
        if actor.user_id == user_id {
            return Err(AppError::validation("You cannot delete yourself"));
        }
        let target = User::find_by_id(user_id)
            .one(&self.db)
            .await?
            .ok_or(AppError::NotFound)?;
        if target.role == UserRole::SuperAdmin {
            return Err(AppError::validation("Super admin accounts cannot be deleted"));
        }

        if target.role == UserRole::Citizen {
            let issues = Issue::find()
                .filter(issue::Column::CreatedById.eq(user_id))
                .count(&self.db)
                .await?;
            let comments = IssueComment::find()
                .filter(issue_comment::Column::UserId.eq(user_id))
                .count(&self.db)
                .await?;
            if issues > 0 || comments > 0 {
                return Err(AppError::Validation(format!(
                    "Cannot delete citizen with {} issue(s) and {} comment(s). Deactivate instead.",
                    issues, comments
                )));
            }
        }

        User::delete_by_id(user_id).exec(&self.db).await?;
        tracing::info!(user_id, actor = actor.user_id, "User deleted");
        Ok(())
    }

    pub async fn send_password_reset(
        &self,
        user_id: i32,
        notifier: &NotificationDispatcher,
    ) -> AppResult<()> {
        let user = User::find_by_id(user_id)
            .one(&self.db)
            .await?
            .ok_or(AppError::NotFound)?;
        notifier.dispatch(NotificationJob::PasswordReset {
            token: jwt::encode_purpose_token(&user.email, PURPOSE_RESET)?,
            email: user.email,
        });
        Ok(())
    }
}
