//! Per-principal status summaries
use super::roles::Role;
use super::transaction::{Transaction, TransactionStatus};
use super::types::{StoreroomId, TransactionType};
use std::collections::{BTreeMap, BTreeSet};

/// Which transactions a principal is allowed to see.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Visibility {
    All,
    Storerooms(BTreeSet<StoreroomId>),
}

impl Visibility {
    /// Admins see everything; supervisors the storerooms they manage;
    /// everyone else the storerooms they are assigned to.
    pub fn for_role(role: Role, assigned: Vec<StoreroomId>, managed: Vec<StoreroomId>) -> Self {
        match role {
            Role::Admin => Visibility::All,
            Role::Supervisor => Visibility::Storerooms(managed.into_iter().collect()),
            Role::Storeman | Role::Clerk | Role::SupplierDriver => {
                Visibility::Storerooms(assigned.into_iter().collect())
            }
        }
    }

    pub fn admits(&self, transaction: &Transaction) -> bool {
        match self {
            Visibility::All => true,
            Visibility::Storerooms(storerooms) => {
                transaction.storerooms().any(|s| storerooms.contains(s))
            }
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StatusSummary {
    pub by_status: BTreeMap<TransactionStatus, usize>,
    pub by_type: BTreeMap<TransactionType, usize>,
    pub total: usize,
}

pub fn summarize<'a>(
    transactions: impl IntoIterator<Item = &'a Transaction>,
    visibility: &Visibility,
) -> StatusSummary {
    let mut summary = StatusSummary::default();
    for transaction in transactions
        .into_iter()
        .filter(|transaction| visibility.admits(transaction))
    {
        *summary.by_status.entry(transaction.status()).or_default() += 1;
        *summary.by_type.entry(transaction.kind()).or_default() += 1;
        summary.total += 1;
    }
    summary
}
