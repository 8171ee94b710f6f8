//! Shared fixtures for the integration tests
#![allow(dead_code)]

use std::sync::Arc;
use stock_workflow::{
    InMemoryDirectory, PrincipalId, Role, Stage, TransactionId, TransitionOutcome,
    WorkflowError, WorkflowService, WorkflowStore,
};

/// One principal per role.
pub struct Staff {
    pub clerk: PrincipalId,
    pub driver: PrincipalId,
    pub storeman: PrincipalId,
    pub supervisor: PrincipalId,
    pub admin: PrincipalId,
}

impl Staff {
    pub fn for_role(&self, role: Role) -> &PrincipalId {
        match role {
            Role::Clerk => &self.clerk,
            Role::SupplierDriver => &self.driver,
            Role::Storeman => &self.storeman,
            Role::Supervisor => &self.supervisor,
            Role::Admin => &self.admin,
        }
    }
}

/// A directory with one principal per role. The storeman is assigned to
/// `S1`, the supervisor manages `S1` and `S2`.
pub fn staff() -> (Arc<InMemoryDirectory>, Staff) {
    let directory = InMemoryDirectory::new();
    let staff = Staff {
        clerk: PrincipalId::from("carla"),
        driver: PrincipalId::from("dev"),
        storeman: PrincipalId::from("sam"),
        supervisor: PrincipalId::from("sue"),
        admin: PrincipalId::from("ada"),
    };

    directory.add_principal(staff.clerk.clone(), Role::Clerk);
    directory.add_principal(staff.driver.clone(), Role::SupplierDriver);
    directory.add_principal(staff.storeman.clone(), Role::Storeman);
    directory.add_principal(staff.supervisor.clone(), Role::Supervisor);
    directory.add_principal(staff.admin.clone(), Role::Admin);

    directory.assign_storeroom(&staff.storeman, "S1");
    directory.assign_storeroom(&staff.clerk, "S1");
    directory.manage_storeroom(&staff.supervisor, "S1");
    directory.manage_storeroom(&staff.supervisor, "S2");

    (Arc::new(directory), staff)
}

pub fn service<S: WorkflowStore>(
    store: Arc<S>,
) -> (WorkflowService<S, InMemoryDirectory>, Staff) {
    let (directory, staff) = staff();
    (WorkflowService::new(store, directory), staff)
}

/// Walks `id` forward one stage at a time until it reaches `target`, each
/// step taken by the first role holding the needed grant.
pub fn drive_to<S: WorkflowStore>(
    service: &WorkflowService<S, InMemoryDirectory>,
    staff: &Staff,
    id: &TransactionId,
    target: Stage,
) -> Result<Vec<TransitionOutcome>, WorkflowError> {
    let transaction = service.transaction(id)?;
    let workflow = service.registry().workflow(transaction.kind())?.clone();

    let mut current = transaction.stage();
    let mut outcomes = vec![];
    while current != target {
        let Some(next) = workflow.next_after(current) else {
            panic!("{target} is not reachable from {current}");
        };
        let role = if current == Stage::Draft {
            workflow.initiators.iter().next().copied()
        } else {
            workflow
                .approval_stage(next)
                .and_then(|stage| stage.approvers.iter().next().copied())
        };
        let Some(role) = role else {
            panic!("no role may move into {next}");
        };
        outcomes.push(service.transition(id, next, staff.for_role(role))?);
        current = next;
    }
    Ok(outcomes)
}
