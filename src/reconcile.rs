//! Stock reconciliation: turns a transaction's line items into quantity
//! changes, guards against negative stock and records one audit entry per
//! adjusted (item, storeroom) pair.
use super::audit::{Adjustment, ChainedEntry, ChangeKind, InventoryAuditLogEntry};
use super::error::{ValidationError, WorkflowError};
use super::roles::Actor;
use super::store::UnitOfWork;
use super::transaction::{ItemDirection, Transaction, TransactionItem};
use super::types::{ItemId, StoreroomId, TimeStamp, TransactionType};
use chrono::Utc;
use std::collections::BTreeMap;
use tracing::debug;

/// Whether the transaction's movements are applied or undone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Posting {
    Forward,
    Reverse,
}

/// A single signed quantity change implied by a line item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Movement {
    pub item: ItemId,
    pub storeroom: StoreroomId,
    pub increase: bool,
    pub quantity: u64,
    /// Purpose of the originating line, if it gave one.
    pub purpose: Option<String>,
}

impl Movement {
    fn inverted(mut self) -> Self {
        self.increase = !self.increase;
        self
    }
}

/// The movements a completed transaction makes, in application order.
pub fn plan_movements(transaction: &Transaction) -> Result<Vec<Movement>, WorkflowError> {
    let kind = transaction.kind();
    let source = || {
        transaction
            .source()
            .cloned()
            .ok_or(ValidationError::MissingSource(kind))
    };
    let destination = || {
        transaction
            .destination()
            .cloned()
            .ok_or(ValidationError::MissingDestination(kind))
    };
    let movement = |line: &TransactionItem, storeroom, increase| Movement {
        item: line.item.clone(),
        storeroom,
        increase,
        quantity: line.quantity,
        purpose: line.purpose.clone(),
    };

    let mut movements = Vec::with_capacity(transaction.items().len() * 2);
    for line in transaction.items() {
        match kind {
            TransactionType::Receipt => movements.push(movement(line, destination()?, true)),
            TransactionType::Issuance => movements.push(movement(line, source()?, false)),
            TransactionType::Transfer => {
                movements.push(movement(line, source()?, false));
                movements.push(movement(line, destination()?, true));
            }
            TransactionType::Swap => match line.direction {
                Some(ItemDirection::Outgoing) => movements.push(movement(line, source()?, false)),
                Some(ItemDirection::Incoming) => {
                    movements.push(movement(line, destination()?, true))
                }
                None => return Err(ValidationError::MissingDirection(line.item.clone()).into()),
            },
        }
    }
    Ok(movements)
}

/// Computes every adjustment for `transaction` against current stock without
/// writing anything. Fails on the first quantity that would go negative.
pub(crate) fn stage_adjustments(
    unit: &dyn UnitOfWork,
    transaction: &Transaction,
    posting: Posting,
) -> Result<Vec<Adjustment>, WorkflowError> {
    let mut movements = plan_movements(transaction)?;
    if posting == Posting::Reverse {
        movements = movements.into_iter().rev().map(Movement::inverted).collect();
    }

    let mut running: BTreeMap<(ItemId, StoreroomId), u64> = BTreeMap::new();
    let mut adjustments = Vec::with_capacity(movements.len());

    for movement in movements {
        let key = (movement.item.clone(), movement.storeroom.clone());
        let previous = match running.get(&key) {
            Some(quantity) => *quantity,
            None => unit.quantity(&movement.item, &movement.storeroom)?,
        };

        let next = if movement.increase {
            previous
                .checked_add(movement.quantity)
                .ok_or_else(|| ValidationError::QuantityOverflow(movement.item.clone()))?
        } else {
            previous
                .checked_sub(movement.quantity)
                .ok_or_else(|| WorkflowError::InsufficientStock {
                    item: movement.item.clone(),
                    storeroom: movement.storeroom.clone(),
                    available: previous,
                    requested: movement.quantity,
                })?
        };
        running.insert(key, next);

        let change = match (posting, movement.increase) {
            (Posting::Reverse, _) => ChangeKind::Reversal,
            (Posting::Forward, true) => ChangeKind::Increase,
            (Posting::Forward, false) => ChangeKind::Decrease,
        };
        let reason = match posting {
            Posting::Forward => movement
                .purpose
                .unwrap_or_else(|| format!("{} {}", transaction.kind(), transaction.number())),
            Posting::Reverse => format!("reversal of {}", transaction.number()),
        };

        adjustments.push(Adjustment {
            item: movement.item,
            storeroom: movement.storeroom,
            change,
            quantity: movement.quantity,
            previous_quantity: previous,
            new_quantity: next,
            reason,
        });
    }

    Ok(adjustments)
}

/// Applies `transaction` to stored inventory inside `unit`.
///
/// All quantities are checked before the first write, so a failure leaves the
/// unit untouched; the enclosing unit of work provides atomicity against
/// storage failures part way through the writes.
pub fn apply_transaction(
    unit: &dyn UnitOfWork,
    transaction: &Transaction,
    posting: Posting,
    actor: &Actor,
    at: &TimeStamp<Utc>,
) -> Result<Vec<InventoryAuditLogEntry>, WorkflowError> {
    let adjustments = stage_adjustments(unit, transaction, posting)?;

    let mut last: BTreeMap<(&ItemId, &StoreroomId), u64> = BTreeMap::new();
    for adjustment in &adjustments {
        last.insert((&adjustment.item, &adjustment.storeroom), adjustment.new_quantity);
    }
    for ((item, storeroom), quantity) in last {
        unit.put_quantity(item, storeroom, quantity)?;
    }

    let mut head = unit.audit_head(transaction.id())?;
    let mut entries = Vec::with_capacity(adjustments.len());
    for adjustment in adjustments {
        let entry = InventoryAuditLogEntry::sealed(
            head.as_ref(),
            transaction.id().clone(),
            transaction.kind(),
            adjustment,
            actor.principal.clone(),
            actor.role,
            at.clone(),
        )?;
        unit.append_audit(&entry)?;
        head = Some(entry.head());
        entries.push(entry);
    }

    debug!(
        transaction = %transaction.id(),
        ?posting,
        adjustments = entries.len(),
        "stock reconciled"
    );
    Ok(entries)
}
