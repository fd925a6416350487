use crate::{
    error::{AppError, AppResult},
    middleware::AuthUser,
    models::{issue, ActivityKind, IssueStatus},
    services::comment::clean_optional,
};

/// What a status update will write, decided before touching the database.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransitionPlan {
    pub from: IssueStatus,
    pub to: IssueStatus,
    /// Sanitized, non-empty comment to append to the timeline.
    pub comment: Option<String>,
    pub set_in_progress_at: bool,
    pub set_resolved_at: bool,
    pub activity: Option<ActivityKind>,
}

impl TransitionPlan {
    pub fn changed(&self) -> bool {
        self.from != self.to
    }
}

/// Admins may move any issue; staff only the ones assigned to them.
pub fn can_change_status(actor: &AuthUser, issue: &issue::Model) -> bool {
    actor.is_admin_or_above()
        || (actor.is_staff_or_above() && issue.assigned_to_id == Some(actor.user_id))
}

pub fn plan_transition(
    actor: &AuthUser,
    issue: &issue::Model,
    to: IssueStatus,
    comment: Option<&str>,
) -> AppResult<TransitionPlan> {
    if !can_change_status(actor, issue) {
        return Err(AppError::Forbidden);
    }

    let from = issue.status;
    let comment = clean_optional(comment)?;

    if to == IssueStatus::InProgress && issue.assigned_to_id.is_none() {
        return Err(AppError::validation(
            "Issue must be assigned before it can be marked in progress",
        ));
    }

    // Re-confirming a resolution does not need a fresh explanation.
    let comment_optional = from == IssueStatus::Resolved && to == IssueStatus::Resolved;
    if comment.is_none() && !comment_optional {
        return Err(AppError::validation("A comment is required for this status change"));
    }

    let entering = from != to;
    let (set_in_progress_at, set_resolved_at, activity) = match to {
        IssueStatus::InProgress if entering => (true, false, Some(ActivityKind::InProgress)),
        IssueStatus::Resolved if entering => {
            (false, issue.resolved_at.is_none(), Some(ActivityKind::Resolved))
        }
        _ => (false, false, None),
    };

    Ok(TransitionPlan {
        from,
        to,
        comment,
        set_in_progress_at,
        set_resolved_at,
        activity,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::UserRole;

    fn issue(status: IssueStatus, assigned: Option<i32>) -> issue::Model {
        issue::Model {
            id: 10,
            title: "Streetlight out".into(),
            description: None,
            category: Some("Lighting".into()),
            status,
            lat: None,
            lng: None,
            address: None,
            country: Some("IN".into()),
            state_code: Some("KA".into()),
            created_by_id: Some(1),
            assigned_to_id: assigned,
            created_at: chrono::Utc::now().naive_utc(),
            updated_at: None,
            in_progress_at: None,
            resolved_at: None,
        }
    }

    const ADMIN: AuthUser = AuthUser {
        user_id: 99,
        role: UserRole::Admin,
    };

    #[test]
    fn in_progress_requires_assignee() {
        let err = plan_transition(&ADMIN, &issue(IssueStatus::Pending, None), IssueStatus::InProgress, Some("on it"));
        assert!(matches!(err, Err(AppError::Validation(_))));
    }

    #[test]
    fn leaving_pending_requires_comment() {
        let i = issue(IssueStatus::Pending, Some(5));
        assert!(plan_transition(&ADMIN, &i, IssueStatus::InProgress, None).is_err());
        assert!(plan_transition(&ADMIN, &i, IssueStatus::InProgress, Some("   ")).is_err());
        assert!(plan_transition(&ADMIN, &i, IssueStatus::Resolved, None).is_err());
    }

    #[test]
    fn markup_only_comment_does_not_count() {
        let i = issue(IssueStatus::Pending, Some(5));
        assert!(matches!(
            plan_transition(&ADMIN, &i, IssueStatus::Resolved, Some("<b></b>")),
            Err(AppError::Validation(_))
        ));

        let plan = plan_transition(&ADMIN, &i, IssueStatus::Resolved, Some("<b>patched</b>")).unwrap();
        assert_eq!(plan.comment.as_deref(), Some("patched"));
    }

    #[test]
    fn over_long_status_comment_rejected() {
        let i = issue(IssueStatus::Pending, Some(5));
        let long = "x".repeat(crate::services::comment::MAX_COMMENT_LEN + 1);
        assert!(plan_transition(&ADMIN, &i, IssueStatus::InProgress, Some(&long)).is_err());
    }

    #[test]
    fn start_work_sets_timestamp_and_activity() {
        let plan = plan_transition(
            &ADMIN,
            &issue(IssueStatus::Pending, Some(5)),
            IssueStatus::InProgress,
            Some(" crew dispatched "),
        )
        .unwrap();
        assert!(plan.changed());
        assert!(plan.set_in_progress_at);
        assert_eq!(plan.activity, Some(ActivityKind::InProgress));
        assert_eq!(plan.comment.as_deref(), Some("crew dispatched"));
    }

    #[test]
    fn resolved_at_only_set_once() {
        let mut reopened = issue(IssueStatus::Pending, Some(5));
        reopened.resolved_at = Some(chrono::Utc::now().naive_utc());
        let plan = plan_transition(&ADMIN, &reopened, IssueStatus::Resolved, Some("fixed again")).unwrap();
        assert!(!plan.set_resolved_at);
        assert_eq!(plan.activity, Some(ActivityKind::Resolved));

        let fresh = issue(IssueStatus::InProgress, Some(5));
        let plan = plan_transition(&ADMIN, &fresh, IssueStatus::Resolved, Some("done")).unwrap();
        assert!(plan.set_resolved_at);
    }

    #[test]
    fn re_resolving_is_a_no_op_without_comment() {
        let mut done = issue(IssueStatus::Resolved, Some(5));
        done.resolved_at = Some(chrono::Utc::now().naive_utc());
        let plan = plan_transition(&ADMIN, &done, IssueStatus::Resolved, None).unwrap();
        assert!(!plan.changed());
        assert!(!plan.set_resolved_at);
        assert_eq!(plan.activity, None);
    }

    #[test]
    fn reopening_records_no_activity() {
        let plan = plan_transition(
            &ADMIN,
            &issue(IssueStatus::Resolved, Some(5)),
            IssueStatus::Pending,
            Some("came back"),
        )
        .unwrap();
        assert!(plan.changed());
        assert_eq!(plan.activity, None);
        assert!(!plan.set_in_progress_at && !plan.set_resolved_at);
    }

    #[test]
    fn staff_limited_to_own_issues() {
        let staff = AuthUser {
            user_id: 5,
            role: UserRole::Staff,
        };
        let mine = issue(IssueStatus::Pending, Some(5));
        let theirs = issue(IssueStatus::Pending, Some(6));
        assert!(plan_transition(&staff, &mine, IssueStatus::InProgress, Some("ok")).is_ok());
        assert!(matches!(
            plan_transition(&staff, &theirs, IssueStatus::InProgress, Some("ok")),
            Err(AppError::Forbidden)
        ));

        let citizen = AuthUser {
            user_id: 1,
            role: UserRole::Citizen,
        };
        assert!(matches!(
            plan_transition(&citizen, &mine, IssueStatus::Resolved, Some("x")),
            Err(AppError::Forbidden)
        ));
    }
}
