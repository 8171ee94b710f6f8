//! Human review layer.
//!
//! Runs alongside the per-type stage sequence and is enforced independently of
//! it: a fixed transition matrix, plus rules limiting which review statuses
//! each role may act on. The "requested changes" states live only here.
use super::error::WorkflowError;
use super::roles::Role;
use super::types::PrincipalId;

#[derive(
    minicbor::Encode,
    minicbor::Decode,
    strum::Display,
    strum::EnumIter,
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
)]
pub enum ReviewStatus {
    #[n(0)]
    Draft,
    #[n(1)]
    PendingSupervisorReview,
    #[n(2)]
    SupervisorRequestedChanges,
    #[n(3)]
    PendingAdminReview,
    #[n(4)]
    AdminRequestedChanges,
    #[n(5)]
    Approved,
    #[n(6)]
    Rejected,
    #[n(7)]
    Completed,
    #[n(8)]
    Cancelled,
}

impl ReviewStatus {
    pub fn allowed_targets(self) -> &'static [ReviewStatus] {
        use ReviewStatus::*;

        match self {
            Draft => &[PendingSupervisorReview, Cancelled],
            PendingSupervisorReview => &[PendingAdminReview, SupervisorRequestedChanges, Rejected],
            SupervisorRequestedChanges => &[Draft, PendingSupervisorReview, Rejected],
            PendingAdminReview => &[Approved, AdminRequestedChanges, Rejected],
            AdminRequestedChanges => &[Draft, PendingAdminReview],
            Approved => &[Completed, Cancelled],
            Rejected | Completed | Cancelled => &[],
        }
    }

    pub fn can_transition_to(self, target: ReviewStatus) -> bool {
        self.allowed_targets().contains(&target)
    }

    pub fn is_terminal(self) -> bool {
        self.allowed_targets().is_empty()
    }
}

/// Whether `role` may act on a transaction whose review status is `current`.
pub fn role_may_act(role: Role, current: ReviewStatus) -> bool {
    use ReviewStatus::*;

    match role {
        Role::Storeman => current == Draft,
        // admin change requests route back through the supervisor
        Role::Supervisor => matches!(
            current,
            PendingSupervisorReview | SupervisorRequestedChanges | AdminRequestedChanges
        ),
        Role::Admin => matches!(current, PendingAdminReview | Approved),
        Role::Clerk | Role::SupplierDriver => false,
    }
}

/// Checks a review move. Performs no writes.
pub fn validate_review(
    current: ReviewStatus,
    target: ReviewStatus,
    role: Role,
    principal: &PrincipalId,
) -> Result<(), WorkflowError> {
    if current.is_terminal() {
        return Err(WorkflowError::invalid_transition(
            current,
            target,
            "review is already closed",
        ));
    }
    if !role_may_act(role, current) {
        return Err(WorkflowError::unauthorized(
            principal,
            format!("{role} cannot act on a transaction in review status {current}"),
        ));
    }
    if !current.can_transition_to(target) {
        return Err(WorkflowError::invalid_transition(
            current,
            target,
            "not permitted by the review matrix",
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn storeman_submits_draft_for_review() {
        let who = PrincipalId::from("sam");
        assert!(
            validate_review(
                ReviewStatus::Draft,
                ReviewStatus::PendingSupervisorReview,
                Role::Storeman,
                &who
            )
            .is_ok()
        );
        let err = validate_review(
            ReviewStatus::PendingSupervisorReview,
            ReviewStatus::PendingAdminReview,
            Role::Storeman,
            &who,
        )
        .unwrap_err();
        assert_eq!(err.reason(), "unauthorized");
    }

    #[test]
    fn requested_changes_return_to_draft() {
        let who = PrincipalId::from("sue");
        assert!(
            validate_review(
                ReviewStatus::SupervisorRequestedChanges,
                ReviewStatus::Draft,
                Role::Supervisor,
                &who
            )
            .is_ok()
        );
        assert!(
            validate_review(
                ReviewStatus::AdminRequestedChanges,
                ReviewStatus::Draft,
                Role::Supervisor,
                &who
            )
            .is_ok()
        );
    }

    #[test]
    fn terminal_statuses_accept_nothing() {
        let who = PrincipalId::from("ada");
        let err = validate_review(
            ReviewStatus::Completed,
            ReviewStatus::Cancelled,
            Role::Admin,
            &who,
        )
        .unwrap_err();
        assert_eq!(err.reason(), "invalid_transition");
    }

    #[test]
    fn admin_cannot_skip_the_matrix() {
        let who = PrincipalId::from("ada");
        let err = validate_review(
            ReviewStatus::PendingAdminReview,
            ReviewStatus::Completed,
            Role::Admin,
            &who,
        )
        .unwrap_err();
        assert_eq!(err.reason(), "invalid_transition");
    }
}
