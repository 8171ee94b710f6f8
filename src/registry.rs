//! Workflow definitions: the stage topology of every transaction type and the
//! role grants attached to each stage.
//!
//! The registry is configuration. It is built once and only read afterwards;
//! the state machine consults it to decide whether a move is legal.
use super::error::WorkflowError;
use super::roles::Role;
use super::types::TransactionType;
use std::collections::{BTreeMap, BTreeSet};

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
pub enum Stage {
    #[n(0)]
    Draft,
    #[n(1)]
    PendingClerkSubmission,
    #[n(2)]
    PendingSupplierDriverApproval,
    #[n(3)]
    PendingStoremanApproval,
    #[n(4)]
    PendingFirstLevelApproval,
    #[n(5)]
    PendingFinalApproval,
    #[n(6)]
    Completed,
}

impl Stage {
    /// Reaching this stage moves stock.
    pub fn is_committing(self) -> bool {
        match self {
            Stage::Completed => true,
            Stage::Draft
            | Stage::PendingClerkSubmission
            | Stage::PendingSupplierDriverApproval
            | Stage::PendingStoremanApproval
            | Stage::PendingFirstLevelApproval
            | Stage::PendingFinalApproval => false,
        }
    }

    pub fn is_pending(self) -> bool {
        !matches!(self, Stage::Draft | Stage::Completed)
    }
}

/// One step of a workflow and who may approve a transaction into it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApprovalStage {
    pub stage: Stage,
    pub approvers: BTreeSet<Role>,
    pub min_approvals: u32,
}

impl ApprovalStage {
    pub fn new(stage: Stage, approvers: &[Role]) -> Self {
        Self {
            stage,
            approvers: approvers.iter().copied().collect(),
            min_approvals: 1,
        }
    }

    pub fn with_min_approvals(mut self, count: u32) -> Self {
        self.min_approvals = count.max(1);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApprovalWorkflow {
    pub kind: TransactionType,
    pub initiators: BTreeSet<Role>,
    /// Ordered, starting at `Draft` and ending at `Completed`.
    pub stages: Vec<ApprovalStage>,
}

/// What a single role may do with one transaction type.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RolePermission {
    pub can_initiate: bool,
    pub can_approve_into: BTreeSet<Stage>,
}

impl ApprovalWorkflow {
    pub fn new(kind: TransactionType, initiators: &[Role], stages: Vec<ApprovalStage>) -> Self {
        Self {
            kind,
            initiators: initiators.iter().copied().collect(),
            stages,
        }
    }

    /// The built-in topology for a transaction type.
    pub fn standard(kind: TransactionType) -> Self {
        use Role::*;
        use Stage::*;

        match kind {
            TransactionType::Receipt => Self::new(
                kind,
                &[Clerk],
                vec![
                    ApprovalStage::new(Draft, &[]),
                    ApprovalStage::new(PendingClerkSubmission, &[Clerk]),
                    ApprovalStage::new(PendingSupplierDriverApproval, &[SupplierDriver]),
                    ApprovalStage::new(PendingStoremanApproval, &[Storeman]),
                    ApprovalStage::new(PendingFinalApproval, &[Supervisor]),
                    ApprovalStage::new(Completed, &[Admin]),
                ],
            ),
            TransactionType::Issuance => Self::new(
                kind,
                &[Clerk],
                vec![
                    ApprovalStage::new(Draft, &[]),
                    ApprovalStage::new(PendingClerkSubmission, &[Clerk]),
                    ApprovalStage::new(PendingStoremanApproval, &[Storeman]),
                    ApprovalStage::new(PendingFinalApproval, &[Supervisor]),
                    ApprovalStage::new(Completed, &[Admin]),
                ],
            ),
            TransactionType::Transfer => Self::new(
                kind,
                &[Storeman],
                vec![
                    ApprovalStage::new(Draft, &[]),
                    ApprovalStage::new(PendingFirstLevelApproval, &[Storeman]),
                    ApprovalStage::new(PendingFinalApproval, &[Supervisor]),
                    ApprovalStage::new(Completed, &[Admin]),
                ],
            ),
            TransactionType::Swap => Self::new(
                kind,
                &[Storeman],
                vec![
                    ApprovalStage::new(Draft, &[]),
                    ApprovalStage::new(PendingFirstLevelApproval, &[Storeman]),
                    ApprovalStage::new(Completed, &[Supervisor, Admin]),
                ],
            ),
        }
    }

    /// Checks the topology: `Draft` first, `Completed` last, each stage once.
    pub fn validate(&self) -> Result<(), WorkflowError> {
        let malformed = |reason: &str| WorkflowError::InvalidWorkflow {
            kind: self.kind,
            reason: reason.to_string(),
        };

        if self.stages.len() < 2 {
            return Err(malformed("needs at least Draft and Completed"));
        }
        if self.stages.first().map(|s| s.stage) != Some(Stage::Draft) {
            return Err(malformed("must start at Draft"));
        }
        if self.terminal() != Some(Stage::Completed) {
            return Err(malformed("must end at Completed"));
        }
        let distinct: BTreeSet<Stage> = self.stages.iter().map(|s| s.stage).collect();
        if distinct.len() != self.stages.len() {
            return Err(malformed("stages repeat"));
        }
        Ok(())
    }

    pub fn stage_sequence(&self) -> Vec<Stage> {
        self.stages.iter().map(|s| s.stage).collect()
    }

    pub fn contains(&self, stage: Stage) -> bool {
        self.stages.iter().any(|s| s.stage == stage)
    }

    pub fn approval_stage(&self, stage: Stage) -> Option<&ApprovalStage> {
        self.stages.iter().find(|s| s.stage == stage)
    }

    /// The stage immediately after `current`, if any.
    pub fn next_after(&self, current: Stage) -> Option<Stage> {
        let position = self.stages.iter().position(|s| s.stage == current)?;
        self.stages.get(position + 1).map(|s| s.stage)
    }

    pub fn terminal(&self) -> Option<Stage> {
        self.stages.last().map(|s| s.stage)
    }

    pub fn permissions_for(&self, role: Role) -> RolePermission {
        RolePermission {
            can_initiate: self.initiators.contains(&role),
            can_approve_into: self
                .stages
                .iter()
                .filter(|s| s.approvers.contains(&role))
                .map(|s| s.stage)
                .collect(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct WorkflowRegistry {
    workflows: BTreeMap<TransactionType, ApprovalWorkflow>,
}

impl WorkflowRegistry {
    /// A registry with no workflows at all.
    pub fn empty() -> Self {
        Self {
            workflows: BTreeMap::new(),
        }
    }

    pub fn standard() -> Self {
        use strum::IntoEnumIterator;

        let workflows = TransactionType::iter()
            .map(|kind| (kind, ApprovalWorkflow::standard(kind)))
            .collect();
        Self { workflows }
    }

    /// Replaces any workflow previously registered for the same type.
    /// Malformed topologies are refused and leave the registry unchanged.
    pub fn register(&mut self, workflow: ApprovalWorkflow) -> Result<(), WorkflowError> {
        workflow.validate()?;
        self.workflows.insert(workflow.kind, workflow);
        Ok(())
    }

    pub fn workflow(&self, kind: TransactionType) -> Result<&ApprovalWorkflow, WorkflowError> {
        self.workflows
            .get(&kind)
            .ok_or_else(|| WorkflowError::UnknownTransactionType(kind.to_string()))
    }

    pub fn stages_for(&self, kind: TransactionType) -> Result<Vec<Stage>, WorkflowError> {
        Ok(self.workflow(kind)?.stage_sequence())
    }

    pub fn permissions_for(
        &self,
        kind: TransactionType,
        role: Role,
    ) -> Result<RolePermission, WorkflowError> {
        Ok(self.workflow(kind)?.permissions_for(role))
    }
}

impl Default for WorkflowRegistry {
    fn default() -> Self {
        Self::standard()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn standard_topologies() {
        let registry = WorkflowRegistry::standard();
        use Stage::*;

        assert_eq!(
            registry.stages_for(TransactionType::Receipt).unwrap(),
            vec![
                Draft,
                PendingClerkSubmission,
                PendingSupplierDriverApproval,
                PendingStoremanApproval,
                PendingFinalApproval,
                Completed
            ]
        );
        assert_eq!(
            registry.stages_for(TransactionType::Issuance).unwrap(),
            vec![
                Draft,
                PendingClerkSubmission,
                PendingStoremanApproval,
                PendingFinalApproval,
                Completed
            ]
        );
        assert_eq!(
            registry.stages_for(TransactionType::Transfer).unwrap(),
            vec![Draft, PendingFirstLevelApproval, PendingFinalApproval, Completed]
        );
        assert_eq!(
            registry.stages_for(TransactionType::Swap).unwrap(),
            vec![Draft, PendingFirstLevelApproval, Completed]
        );
    }

    #[test]
    fn receipt_grants() {
        let registry = WorkflowRegistry::standard();

        let clerk = registry
            .permissions_for(TransactionType::Receipt, Role::Clerk)
            .unwrap();
        assert!(clerk.can_initiate);
        assert_eq!(
            clerk.can_approve_into,
            BTreeSet::from([Stage::PendingClerkSubmission])
        );

        let driver = registry
            .permissions_for(TransactionType::Receipt, Role::SupplierDriver)
            .unwrap();
        assert!(!driver.can_initiate);
        assert_eq!(
            driver.can_approve_into,
            BTreeSet::from([Stage::PendingSupplierDriverApproval])
        );

        // not listed for issuance at all
        let driver = registry
            .permissions_for(TransactionType::Issuance, Role::SupplierDriver)
            .unwrap();
        assert_eq!(driver, RolePermission::default());
    }

    #[test]
    fn missing_workflow_is_unknown_type() {
        let registry = WorkflowRegistry::empty();
        let err = registry.stages_for(TransactionType::Swap).unwrap_err();
        assert_eq!(err.reason(), "unknown_transaction_type");
    }

    #[test]
    fn malformed_topologies_are_refused() {
        use Stage::*;
        let mut registry = WorkflowRegistry::standard();
        let shapes: [&[Stage]; 5] = [
            &[Draft],
            &[PendingClerkSubmission, Completed],
            &[Draft, PendingFinalApproval],
            &[Draft, Completed, PendingFinalApproval],
            &[Draft, PendingFinalApproval, PendingFinalApproval, Completed],
        ];
        for shape in shapes {
            let workflow = ApprovalWorkflow::new(
                TransactionType::Issuance,
                &[Role::Clerk],
                shape
                    .iter()
                    .map(|&stage| ApprovalStage::new(stage, &[Role::Admin]))
                    .collect(),
            );
            let err = registry.register(workflow).unwrap_err();
            assert_eq!(err.reason(), "invalid_workflow", "{shape:?}");
        }
        assert_eq!(
            registry.workflow(TransactionType::Issuance).unwrap(),
            &ApprovalWorkflow::standard(TransactionType::Issuance)
        );

        let shortest = ApprovalWorkflow::new(
            TransactionType::Issuance,
            &[Role::Clerk],
            vec![
                ApprovalStage::new(Draft, &[]),
                ApprovalStage::new(Completed, &[Role::Admin]),
            ],
        );
        registry.register(shortest).unwrap();
        assert_eq!(
            registry.stages_for(TransactionType::Issuance).unwrap(),
            vec![Draft, Completed]
        );
    }

    #[test]
    fn standard_workflows_are_well_formed() {
        use strum::IntoEnumIterator;
        for kind in TransactionType::iter() {
            ApprovalWorkflow::standard(kind).validate().unwrap();
        }
    }

    #[test]
    fn min_approvals_never_drops_below_one() {
        let stage = ApprovalStage::new(Stage::PendingFinalApproval, &[Role::Supervisor])
            .with_min_approvals(0);
        assert_eq!(stage.min_approvals, 1);
    }
}
