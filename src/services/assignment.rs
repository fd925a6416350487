use crate::{
    error::{AppError, AppResult},
    middleware::AuthUser,
    models::{issue, staff_region, user, IssueStatus, StaffRegion, User, UserRole},
};
use sea_orm::{
    ColumnTrait, ConnectionTrait, DatabaseBackend, EntityTrait, FromQueryResult, QueryFilter,
    QueryOrder, Statement,
};

/// A possible assignee and how many open issues they already own.
#[derive(Debug, Clone, Copy, PartialEq, Eq, FromQueryResult)]
pub struct Candidate {
    pub user_id: i32,
    pub open_count: i64,
}

/// Lowest open-issue count wins; ties go to the lowest user id.
pub fn pick_least_loaded(candidates: &[Candidate]) -> Option<i32> {
    candidates
        .iter()
        .min_by_key(|c| (c.open_count, c.user_id))
        .map(|c| c.user_id)
}

const REGIONAL_STAFF_SQL: &str = r#"
    SELECT u.id AS user_id, COUNT(i.id) AS open_count
    FROM users u
    JOIN staff_regions sr ON sr.user_id = u.id AND sr.state_code = $1
    LEFT JOIN issues i ON i.assigned_to_id = u.id AND i.status IN ('pending', 'in_progress')
    WHERE u.role = 'staff' AND u.is_active = TRUE
    GROUP BY u.id
"#;

const ADMIN_LOAD_SQL: &str = r#"
    SELECT u.id AS user_id, COUNT(i.id) AS open_count
    FROM users u
    LEFT JOIN issues i ON i.assigned_to_id = u.id AND i.status IN ('pending', 'in_progress')
    WHERE u.role = 'admin' AND u.is_active = TRUE
    GROUP BY u.id
"#;

/// Who gets a freshly reported issue when auto-assignment is on:
/// regional staff first, then admins, then any super admin.
pub async fn auto_assign_target<C: ConnectionTrait>(
    conn: &C,
    state_code: Option<&str>,
) -> AppResult<Option<i32>> {
    if let Some(code) = state_code {
        let staff = Candidate::find_by_statement(Statement::from_sql_and_values(
            DatabaseBackend::Postgres,
            REGIONAL_STAFF_SQL,
            [code.to_string().into()],
        ))
        .all(conn)
        .await?;
        if let Some(id) = pick_least_loaded(&staff) {
            tracing::debug!("Auto-assign: regional staff {} for {}", id, code);
            return Ok(Some(id));
        }
    }

    let admins = Candidate::find_by_statement(Statement::from_string(
        DatabaseBackend::Postgres,
        ADMIN_LOAD_SQL.to_string(),
    ))
    .all(conn)
    .await?;
    if let Some(id) = pick_least_loaded(&admins) {
        tracing::debug!("Auto-assign: falling back to admin {}", id);
        return Ok(Some(id));
    }

    let super_admin = User::find()
        .filter(user::Column::Role.eq(UserRole::SuperAdmin))
        .filter(user::Column::IsActive.eq(true))
        .order_by_asc(user::Column::Id)
        .one(conn)
        .await?;
    if super_admin.is_none() {
        tracing::warn!("Auto-assign: no active staff, admin or super admin found");
    }
    Ok(super_admin.map(|u| u.id))
}

/// Role and region rules for a manual reassignment. `actor_regions` are
/// the state codes the actor covers (only consulted for staff).
pub fn authorize_reassignment(
    actor: &AuthUser,
    issue: &issue::Model,
    actor_regions: &[String],
    target: Option<i32>,
) -> AppResult<()> {
    if !actor.is_staff_or_above() {
        return Err(AppError::Forbidden);
    }
    if issue.status == IssueStatus::Resolved {
        return Err(AppError::validation("Resolved issues cannot be reassigned"));
    }
    if actor.is_admin_or_above() {
        return Ok(());
    }

    // Staff may only pick up issues in their own regions, for themselves.
    let Some(target) = target else {
        return Err(AppError::Forbidden);
    };
    if target != actor.user_id {
        return Err(AppError::Forbidden);
    }
    let in_region = issue
        .state_code
        .as_deref()
        .is_some_and(|code| actor_regions.iter().any(|r| r.eq_ignore_ascii_case(code)));
    if !in_region {
        return Err(AppError::Forbidden);
    }
    Ok(())
}

/// State codes covered by a user.
pub async fn regions_of<C: ConnectionTrait>(conn: &C, user_id: i32) -> AppResult<Vec<String>> {
    Ok(StaffRegion::find()
        .filter(staff_region::Column::UserId.eq(user_id))
        .all(conn)
        .await?
        .into_iter()
        .map(|r| r.state_code)
        .collect())
}

/// The target of an assignment must be an active staff member or above.
pub async fn ensure_assignable<C: ConnectionTrait>(conn: &C, user_id: i32) -> AppResult<()> {
    let target = User::find_by_id(user_id)
        .one(conn)
        .await?
        .ok_or_else(|| AppError::validation("Assignee not found"))?;
    if !target.is_active || !target.role.is_staff_or_above() {
        return Err(AppError::validation(
            "Assignee must be an active staff member or administrator",
        ));
    }
    Ok(())
}
