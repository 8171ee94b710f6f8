//! Stage transition rules.
//!
//! Everything here is pure: given the registry, a transaction's type and stage,
//! the requested target and the acting role, decide what kind of move it is or
//! why it is refused. The service layer performs the writes.
use super::error::WorkflowError;
use super::registry::{Stage, WorkflowRegistry};
use super::roles::Actor;
use super::types::TransactionType;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionKind {
    /// First move out of `Draft`, gated by the initiate grant.
    Submit,
    /// Forward move to a non-terminal stage.
    Advance,
    /// Forward move into the terminal stage; triggers reconciliation.
    Commit,
    /// Send back for rework.
    RejectToDraft,
}

impl TransitionKind {
    pub fn is_forward(self) -> bool {
        !matches!(self, TransitionKind::RejectToDraft)
    }
}

/// Validates `current -> target` for `actor`. Performs no writes.
pub fn validate_transition(
    registry: &WorkflowRegistry,
    kind: TransactionType,
    current: Stage,
    target: Stage,
    actor: &Actor,
) -> Result<TransitionKind, WorkflowError> {
    let workflow = registry.workflow(kind)?;

    if !workflow.contains(current) {
        return Err(WorkflowError::invalid_transition(
            current,
            target,
            format!("{current} is not a stage of {kind}"),
        ));
    }
    if !workflow.contains(target) {
        return Err(WorkflowError::invalid_transition(
            current,
            target,
            format!("{target} is not a stage of {kind}"),
        ));
    }

    let permissions = workflow.permissions_for(actor.role);

    match current {
        Stage::Completed => {
            return Err(WorkflowError::invalid_transition(
                current,
                target,
                "completed transactions can only be reversed",
            ));
        }
        Stage::Draft if target == Stage::Draft => {
            return Err(WorkflowError::invalid_transition(
                current,
                target,
                "transaction is already a draft",
            ));
        }
        Stage::Draft
        | Stage::PendingClerkSubmission
        | Stage::PendingSupplierDriverApproval
        | Stage::PendingStoremanApproval
        | Stage::PendingFirstLevelApproval
        | Stage::PendingFinalApproval => {}
    }

    if target == Stage::Draft {
        if permissions.can_approve_into.contains(&current) {
            return Ok(TransitionKind::RejectToDraft);
        }
        return Err(WorkflowError::unauthorized(
            &actor.principal,
            format!("{} holds no grant on {current} for {kind}", actor.role),
        ));
    }

    if workflow.next_after(current) != Some(target) {
        return Err(WorkflowError::invalid_transition(
            current,
            target,
            "target is not the next stage",
        ));
    }

    let forward = if current == Stage::Draft {
        if !permissions.can_initiate {
            return Err(WorkflowError::unauthorized(
                &actor.principal,
                format!("{} may not initiate {kind}", actor.role),
            ));
        }
        TransitionKind::Submit
    } else {
        if !permissions.can_approve_into.contains(&target) {
            return Err(WorkflowError::unauthorized(
                &actor.principal,
                format!("{} may not approve {kind} into {target}", actor.role),
            ));
        }
        TransitionKind::Advance
    };

    // entering the terminal stage always reconciles, even straight from Draft
    if Some(target) == workflow.terminal() && target.is_committing() {
        Ok(TransitionKind::Commit)
    } else {
        Ok(forward)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::{ApprovalStage, ApprovalWorkflow};
    use crate::roles::Role;
    use crate::types::PrincipalId;

    fn actor(role: Role) -> Actor {
        Actor {
            principal: PrincipalId::from("someone"),
            role,
        }
    }

    #[test]
    fn issuance_happy_path_kinds() {
        let registry = WorkflowRegistry::standard();
        let kind = TransactionType::Issuance;

        let step = |from, to, role| validate_transition(&registry, kind, from, to, &actor(role));

        assert_eq!(
            step(Stage::Draft, Stage::PendingClerkSubmission, Role::Clerk).unwrap(),
            TransitionKind::Submit
        );
        assert_eq!(
            step(
                Stage::PendingClerkSubmission,
                Stage::PendingStoremanApproval,
                Role::Storeman
            )
            .unwrap(),
            TransitionKind::Advance
        );
        assert_eq!(
            step(Stage::PendingFinalApproval, Stage::Completed, Role::Admin).unwrap(),
            TransitionKind::Commit
        );
    }

    #[test]
    fn submitting_into_the_terminal_stage_commits() {
        let mut registry = WorkflowRegistry::standard();
        registry
            .register(ApprovalWorkflow::new(
                TransactionType::Issuance,
                &[Role::Clerk],
                vec![
                    ApprovalStage::new(Stage::Draft, &[]),
                    ApprovalStage::new(Stage::Completed, &[Role::Admin]),
                ],
            ))
            .unwrap();

        let kind = validate_transition(
            &registry,
            TransactionType::Issuance,
            Stage::Draft,
            Stage::Completed,
            &actor(Role::Clerk),
        )
        .unwrap();
        assert_eq!(kind, TransitionKind::Commit);
        assert!(kind.is_forward());
    }

    #[test]
    fn backward_moves_short_of_draft_are_invalid() {
        let registry = WorkflowRegistry::standard();
        for kind in [
            TransactionType::Receipt,
            TransactionType::Issuance,
            TransactionType::Transfer,
            TransactionType::Swap,
        ] {
            let stages = registry.stages_for(kind).unwrap();
            for (position, &current) in stages.iter().enumerate() {
                for &earlier in stages[1..position.max(1)].iter() {
                    for role in [
                        Role::Clerk,
                        Role::SupplierDriver,
                        Role::Storeman,
                        Role::Supervisor,
                        Role::Admin,
                    ] {
                        let err =
                            validate_transition(&registry, kind, current, earlier, &actor(role))
                                .unwrap_err();
                        assert_eq!(
                            err.reason(),
                            "invalid_transition",
                            "{kind} {current} -> {earlier}"
                        );
                    }
                }
            }
        }
    }

    #[test]
    fn skipping_is_invalid() {
        let registry = WorkflowRegistry::standard();
        let err = validate_transition(
            &registry,
            TransactionType::Transfer,
            Stage::PendingFirstLevelApproval,
            Stage::Completed,
            &actor(Role::Admin),
        )
        .unwrap_err();
        assert_eq!(err.reason(), "invalid_transition");
    }

    #[test]
    fn foreign_stage_is_invalid() {
        let registry = WorkflowRegistry::standard();
        let err = validate_transition(
            &registry,
            TransactionType::Swap,
            Stage::Draft,
            Stage::PendingClerkSubmission,
            &actor(Role::Clerk),
        )
        .unwrap_err();
        assert_eq!(err.reason(), "invalid_transition");
    }

    #[test]
    fn reject_requires_grant_on_current_stage() {
        let registry = WorkflowRegistry::standard();
        let kind = TransactionType::Receipt;

        assert_eq!(
            validate_transition(
                &registry,
                kind,
                Stage::PendingStoremanApproval,
                Stage::Draft,
                &actor(Role::Storeman)
            )
            .unwrap(),
            TransitionKind::RejectToDraft
        );
        let err = validate_transition(
            &registry,
            kind,
            Stage::PendingStoremanApproval,
            Stage::Draft,
            &actor(Role::Clerk),
        )
        .unwrap_err();
        assert_eq!(err.reason(), "unauthorized");
    }

    #[test]
    fn completed_is_frozen() {
        let registry = WorkflowRegistry::standard();
        let err = validate_transition(
            &registry,
            TransactionType::Swap,
            Stage::Completed,
            Stage::Draft,
            &actor(Role::Admin),
        )
        .unwrap_err();
        assert_eq!(err.reason(), "invalid_transition");
    }
}
