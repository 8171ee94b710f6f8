//! Roles and the principal directory consulted before every workflow operation
use super::error::WorkflowError;
use super::types::{PrincipalId, StoreroomId};
use std::collections::BTreeMap;
use std::sync::RwLock;

#[derive(
    minicbor::Encode,
    minicbor::Decode,
    strum::Display,
    strum::EnumString,
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
pub enum Role {
    #[n(0)]
    Clerk,
    #[n(1)]
    SupplierDriver,
    #[n(2)]
    Storeman,
    #[n(3)]
    Supervisor,
    #[n(4)]
    Admin,
}

/// A principal together with the role it acted under.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Actor {
    pub principal: PrincipalId,
    pub role: Role,
}

/// Lookup of principals owned by the surrounding application.
pub trait RoleDirectory: Send + Sync {
    fn role_of(&self, principal: &PrincipalId) -> Result<Role, WorkflowError>;
    fn assigned_storerooms(
        &self,
        principal: &PrincipalId,
    ) -> Result<Vec<StoreroomId>, WorkflowError>;
    fn managed_storerooms(
        &self,
        principal: &PrincipalId,
    ) -> Result<Vec<StoreroomId>, WorkflowError>;

    fn resolve(&self, principal: &PrincipalId) -> Result<Actor, WorkflowError> {
        Ok(Actor {
            principal: principal.clone(),
            role: self.role_of(principal)?,
        })
    }
}

#[derive(Debug, Clone)]
struct PrincipalRecord {
    role: Role,
    assigned: Vec<StoreroomId>,
    managed: Vec<StoreroomId>,
}

/// Directory held in process memory, populated by the embedding application.
#[derive(Debug, Default)]
pub struct InMemoryDirectory {
    principals: RwLock<BTreeMap<PrincipalId, PrincipalRecord>>,
}

impl InMemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers (or re-roles) a principal.
    pub fn add_principal(&self, principal: impl Into<PrincipalId>, role: Role) {
        let mut principals = self.write();
        principals
            .entry(principal.into())
            .and_modify(|record| record.role = role)
            .or_insert(PrincipalRecord {
                role,
                assigned: vec![],
                managed: vec![],
            });
    }

    pub fn assign_storeroom(&self, principal: &PrincipalId, storeroom: impl Into<StoreroomId>) {
        if let Some(record) = self.write().get_mut(principal) {
            record.assigned.push(storeroom.into());
        }
    }

    pub fn manage_storeroom(&self, principal: &PrincipalId, storeroom: impl Into<StoreroomId>) {
        if let Some(record) = self.write().get_mut(principal) {
            record.managed.push(storeroom.into());
        }
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, BTreeMap<PrincipalId, PrincipalRecord>> {
        self.principals
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn record(&self, principal: &PrincipalId) -> Result<PrincipalRecord, WorkflowError> {
        self.principals
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get(principal)
            .cloned()
            .ok_or_else(|| WorkflowError::unauthorized(principal, "unknown principal"))
    }
}

impl RoleDirectory for InMemoryDirectory {
    fn role_of(&self, principal: &PrincipalId) -> Result<Role, WorkflowError> {
        Ok(self.record(principal)?.role)
    }

    fn assigned_storerooms(
        &self,
        principal: &PrincipalId,
    ) -> Result<Vec<StoreroomId>, WorkflowError> {
        Ok(self.record(principal)?.assigned)
    }

    fn managed_storerooms(
        &self,
        principal: &PrincipalId,
    ) -> Result<Vec<StoreroomId>, WorkflowError> {
        Ok(self.record(principal)?.managed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_principal_is_unauthorized() {
        let directory = InMemoryDirectory::new();
        let err = directory.role_of(&PrincipalId::from("ghost")).unwrap_err();
        assert_eq!(err.reason(), "unauthorized");
    }

    #[test]
    fn storerooms_follow_the_principal() {
        let directory = InMemoryDirectory::new();
        let sam = PrincipalId::from("sam");
        directory.add_principal(sam.clone(), Role::Storeman);
        directory.assign_storeroom(&sam, "north");
        directory.manage_storeroom(&sam, "south");

        assert_eq!(
            directory.assigned_storerooms(&sam).unwrap(),
            vec![StoreroomId::from("north")]
        );
        assert_eq!(
            directory.managed_storerooms(&sam).unwrap(),
            vec![StoreroomId::from("south")]
        );

        directory.add_principal(sam.clone(), Role::Supervisor);
        assert_eq!(directory.role_of(&sam).unwrap(), Role::Supervisor);
        assert_eq!(directory.assigned_storerooms(&sam).unwrap().len(), 1);
    }
}
