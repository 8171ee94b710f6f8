use super::types::{ItemId, PrincipalId, StoreroomId, TransactionId, TransactionType};

#[derive(thiserror::Error, Debug)]
pub enum WorkflowError {
    #[error("principal {principal} is not authorized: {reason}")]
    Unauthorized {
        principal: PrincipalId,
        reason: String,
    },
    #[error("invalid transition from {from} to {to}: {reason}")]
    InvalidTransition {
        from: String,
        to: String,
        reason: String,
    },
    #[error("no workflow registered for transaction type {0}")]
    UnknownTransactionType(String),
    #[error("workflow for {kind} is malformed: {reason}")]
    InvalidWorkflow {
        kind: TransactionType,
        reason: String,
    },
    #[error(
        "insufficient stock of {item} in {storeroom}: available {available}, requested {requested}"
    )]
    InsufficientStock {
        item: ItemId,
        storeroom: StoreroomId,
        available: u64,
        requested: u64,
    },
    #[error("transaction {id} cannot be reversed: {reason}")]
    NotReversible { id: TransactionId, reason: String },
    #[error("transaction {0} was not found")]
    NotFound(TransactionId),
    #[error("invalid draft: {0}")]
    InvalidDraft(#[from] ValidationError),
    #[error("persistence failure: {0}")]
    PersistenceFailure(String),
}

/// Problems found in a draft before it is allowed into the workflow.
#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum ValidationError {
    #[error("a transaction needs at least one line item")]
    NoItems,
    #[error("line item {0} has a zero quantity")]
    ZeroQuantity(ItemId),
    #[error("{0} requires a source storeroom")]
    MissingSource(TransactionType),
    #[error("{0} requires a destination storeroom")]
    MissingDestination(TransactionType),
    #[error("transfer source and destination are both {0}")]
    SameStoreroom(StoreroomId),
    #[error("swap line item {0} has no direction")]
    MissingDirection(ItemId),
    #[error("a swap needs at least one outgoing and one incoming item")]
    UnbalancedSwap,
    #[error("quantity of {0} would overflow")]
    QuantityOverflow(ItemId),
}

impl WorkflowError {
    /// Stable, machine readable code for the failure kind.
    pub fn reason(&self) -> &'static str {
        match self {
            WorkflowError::Unauthorized { .. } => "unauthorized",
            WorkflowError::InvalidTransition { .. } => "invalid_transition",
            WorkflowError::UnknownTransactionType(_) => "unknown_transaction_type",
            WorkflowError::InvalidWorkflow { .. } => "invalid_workflow",
            WorkflowError::InsufficientStock { .. } => "insufficient_stock",
            WorkflowError::NotReversible { .. } => "not_reversible",
            WorkflowError::NotFound(_) => "not_found",
            WorkflowError::InvalidDraft(_) => "invalid_draft",
            WorkflowError::PersistenceFailure(_) => "persistence_failure",
        }
    }

    pub(crate) fn unauthorized(principal: &PrincipalId, reason: impl Into<String>) -> Self {
        WorkflowError::Unauthorized {
            principal: principal.clone(),
            reason: reason.into(),
        }
    }

    pub(crate) fn invalid_transition(
        from: impl ToString,
        to: impl ToString,
        reason: impl Into<String>,
    ) -> Self {
        WorkflowError::InvalidTransition {
            from: from.to_string(),
            to: to.to_string(),
            reason: reason.into(),
        }
    }
}

impl From<sled::Error> for WorkflowError {
    fn from(err: sled::Error) -> Self {
        WorkflowError::PersistenceFailure(err.to_string())
    }
}

impl From<minicbor::decode::Error> for WorkflowError {
    fn from(err: minicbor::decode::Error) -> Self {
        WorkflowError::PersistenceFailure(format!("corrupt record: {err}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reason_codes_are_stable() {
        let err = WorkflowError::InsufficientStock {
            item: ItemId::from("item-x"),
            storeroom: StoreroomId::from("store-s"),
            available: 3,
            requested: 5,
        };
        assert_eq!(err.reason(), "insufficient_stock");
        assert_eq!(
            err.to_string(),
            "insufficient stock of item-x in store-s: available 3, requested 5"
        );

        let err: WorkflowError = ValidationError::NoItems.into();
        assert_eq!(err.reason(), "invalid_draft");
    }
}
