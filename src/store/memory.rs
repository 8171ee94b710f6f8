//! In-memory store with the same atomicity as the sled store.
//!
//! A unit of work writes straight into the state while holding the store lock
//! and keeps an undo log of what each write replaced. The log is replayed
//! backwards if the unit fails, so a unit costs what it touches rather than
//! the size of the store.
use super::{UnitOfWork, WorkflowStore};
use crate::audit::{ChainedEntry, InventoryAuditLogEntry, LogHead, TransactionStatusLogEntry};
use crate::error::WorkflowError;
use crate::transaction::Transaction;
use crate::types::{ItemId, StoreroomId, TransactionId};
use std::cell::RefCell;
use std::collections::BTreeMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Default)]
struct State {
    transactions: BTreeMap<TransactionId, Transaction>,
    inventory: BTreeMap<(ItemId, StoreroomId), u64>,
    status_logs: BTreeMap<TransactionId, Vec<TransactionStatusLogEntry>>,
    audit_logs: BTreeMap<TransactionId, Vec<InventoryAuditLogEntry>>,
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<State>,
    sequence: AtomicU64,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, State>, WorkflowError> {
        self.state
            .lock()
            .map_err(|_| WorkflowError::PersistenceFailure("memory store lock poisoned".into()))
    }
}

impl WorkflowStore for MemoryStore {
    fn atomically<T, F>(&self, op: F) -> Result<T, WorkflowError>
    where
        F: Fn(&dyn UnitOfWork) -> Result<T, WorkflowError>,
    {
        let mut state = self.lock()?;
        let unit = MemoryUnit::new(&mut state);
        match op(&unit) {
            Ok(value) => Ok(value),
            Err(err) => {
                unit.roll_back();
                Err(err)
            }
        }
    }

    fn next_sequence(&self) -> Result<u64, WorkflowError> {
        Ok(self.sequence.fetch_add(1, Ordering::SeqCst) + 1)
    }

    fn transactions(&self) -> Result<Vec<Transaction>, WorkflowError> {
        Ok(self.lock()?.transactions.values().cloned().collect())
    }

    fn status_history(
        &self,
        id: &TransactionId,
    ) -> Result<Vec<TransactionStatusLogEntry>, WorkflowError> {
        Ok(self.lock()?.status_logs.get(id).cloned().unwrap_or_default())
    }

    fn audit_history(
        &self,
        id: &TransactionId,
    ) -> Result<Vec<InventoryAuditLogEntry>, WorkflowError> {
        Ok(self.lock()?.audit_logs.get(id).cloned().unwrap_or_default())
    }

    // Plain reads skip the unit of work entirely.
    fn load(&self, id: &TransactionId) -> Result<Option<Transaction>, WorkflowError> {
        Ok(self.lock()?.transactions.get(id).cloned())
    }

    fn quantity(&self, item: &ItemId, storeroom: &StoreroomId) -> Result<u64, WorkflowError> {
        Ok(self
            .lock()?
            .inventory
            .get(&(item.clone(), storeroom.clone()))
            .copied()
            .unwrap_or(0))
    }
}

/// What a single write replaced.
enum Undo {
    Transaction(TransactionId, Option<Transaction>),
    Quantity((ItemId, StoreroomId), Option<u64>),
    StatusEntry(TransactionId),
    AuditEntry(TransactionId),
}

struct MemoryUnit<'a> {
    state: RefCell<&'a mut State>,
    undo: RefCell<Vec<Undo>>,
}

impl<'a> MemoryUnit<'a> {
    fn new(state: &'a mut State) -> Self {
        Self {
            state: RefCell::new(state),
            undo: RefCell::new(Vec::new()),
        }
    }

    fn roll_back(self) {
        let state = self.state.into_inner();
        for step in self.undo.into_inner().into_iter().rev() {
            match step {
                Undo::Transaction(id, Some(previous)) => {
                    state.transactions.insert(id, previous);
                }
                Undo::Transaction(id, None) => {
                    state.transactions.remove(&id);
                }
                Undo::Quantity(key, Some(previous)) => {
                    state.inventory.insert(key, previous);
                }
                Undo::Quantity(key, None) => {
                    state.inventory.remove(&key);
                }
                Undo::StatusEntry(id) => pop_entry(&mut state.status_logs, &id),
                Undo::AuditEntry(id) => pop_entry(&mut state.audit_logs, &id),
            }
        }
    }

    fn record(&self, step: Undo) {
        self.undo.borrow_mut().push(step);
    }
}

fn pop_entry<E>(logs: &mut BTreeMap<TransactionId, Vec<E>>, id: &TransactionId) {
    if let Some(entries) = logs.get_mut(id) {
        entries.pop();
        if entries.is_empty() {
            logs.remove(id);
        }
    }
}

impl UnitOfWork for MemoryUnit<'_> {
    fn transaction(&self, id: &TransactionId) -> Result<Option<Transaction>, WorkflowError> {
        Ok(self.state.borrow().transactions.get(id).cloned())
    }

    fn put_transaction(&self, transaction: &Transaction) -> Result<(), WorkflowError> {
        let id = transaction.id().clone();
        let previous = self
            .state
            .borrow_mut()
            .transactions
            .insert(id.clone(), transaction.clone());
        self.record(Undo::Transaction(id, previous));
        Ok(())
    }

    fn quantity(&self, item: &ItemId, storeroom: &StoreroomId) -> Result<u64, WorkflowError> {
        Ok(self
            .state
            .borrow()
            .inventory
            .get(&(item.clone(), storeroom.clone()))
            .copied()
            .unwrap_or(0))
    }

    fn put_quantity(
        &self,
        item: &ItemId,
        storeroom: &StoreroomId,
        quantity: u64,
    ) -> Result<(), WorkflowError> {
        let key = (item.clone(), storeroom.clone());
        let previous = self
            .state
            .borrow_mut()
            .inventory
            .insert(key.clone(), quantity);
        self.record(Undo::Quantity(key, previous));
        Ok(())
    }

    fn status_head(&self, id: &TransactionId) -> Result<Option<LogHead>, WorkflowError> {
        Ok(self
            .state
            .borrow()
            .status_logs
            .get(id)
            .and_then(|entries| entries.last())
            .map(ChainedEntry::head))
    }

    fn append_status(&self, entry: &TransactionStatusLogEntry) -> Result<(), WorkflowError> {
        self.state
            .borrow_mut()
            .status_logs
            .entry(entry.transaction_id.clone())
            .or_default()
            .push(entry.clone());
        self.record(Undo::StatusEntry(entry.transaction_id.clone()));
        Ok(())
    }

    fn audit_head(&self, id: &TransactionId) -> Result<Option<LogHead>, WorkflowError> {
        Ok(self
            .state
            .borrow()
            .audit_logs
            .get(id)
            .and_then(|entries| entries.last())
            .map(ChainedEntry::head))
    }

    fn append_audit(&self, entry: &InventoryAuditLogEntry) -> Result<(), WorkflowError> {
        self.state
            .borrow_mut()
            .audit_logs
            .entry(entry.transaction_id.clone())
            .or_default()
            .push(entry.clone());
        self.record(Undo::AuditEntry(entry.transaction_id.clone()));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::StatusChange;
    use crate::reconcile::{self, Posting};
    use crate::registry::Stage;
    use crate::roles::{Actor, Role};
    use crate::transaction::{TransactionDraft, TransactionItem, TransactionStatus};
    use crate::types::{PrincipalId, TimeStamp, TransactionType};

    fn receipt(id: &str) -> Transaction {
        Transaction::from_draft(
            TransactionId::from(id),
            TransactionType::Receipt.transaction_number(1),
            TransactionDraft::new(TransactionType::Receipt)
                .set_destination("north")
                .add_item(TransactionItem::new("bolt", 4)),
            PrincipalId::from("carla"),
            TimeStamp::new(),
        )
    }

    fn created(txn: &Transaction, head: Option<&LogHead>) -> TransactionStatusLogEntry {
        TransactionStatusLogEntry::sealed(
            head,
            txn.id().clone(),
            TransactionStatus::Draft,
            TransactionStatus::Draft,
            StatusChange::Created,
            PrincipalId::from("carla"),
            Role::Clerk,
            TimeStamp::new(),
            None,
        )
        .unwrap()
    }

    #[test]
    fn failed_unit_is_discarded() {
        let store = MemoryStore::new();
        let item = ItemId::from("bolt");
        let storeroom = StoreroomId::from("north");
        store.set_quantity(&item, &storeroom, 5).unwrap();

        let result: Result<(), WorkflowError> = store.atomically(|unit| {
            unit.put_quantity(&item, &storeroom, 1)?;
            Err(WorkflowError::PersistenceFailure("simulated".into()))
        });

        assert!(result.is_err());
        assert_eq!(store.quantity(&item, &storeroom).unwrap(), 5);
    }

    #[test]
    fn failed_unit_restores_every_record() {
        let store = MemoryStore::new();
        let bolt = ItemId::from("bolt");
        let (north, south) = (StoreroomId::from("north"), StoreroomId::from("south"));
        let first = receipt("txn_first");
        let second = receipt("txn_second");
        store.set_quantity(&bolt, &north, 5).unwrap();
        store
            .atomically(|unit| {
                unit.put_transaction(&first)?;
                unit.append_status(&created(&first, None))
            })
            .unwrap();

        let admin = Actor {
            principal: PrincipalId::from("ada"),
            role: Role::Admin,
        };
        let result: Result<(), WorkflowError> = store.atomically(|unit| {
            let mut moved = first.clone();
            moved.move_to(Stage::Completed, TimeStamp::new());
            reconcile::apply_transaction(unit, &moved, Posting::Forward, &admin, &TimeStamp::new())?;
            unit.put_transaction(&moved)?;
            unit.put_transaction(&second)?;
            // the same key twice: the oldest value must win
            unit.put_quantity(&bolt, &north, 1)?;
            unit.put_quantity(&bolt, &south, 9)?;
            let head = unit.status_head(first.id())?;
            unit.append_status(&created(&first, head.as_ref()))?;
            unit.append_status(&created(&second, None))?;
            Err(WorkflowError::PersistenceFailure("simulated".into()))
        });

        assert!(result.is_err());
        assert_eq!(store.load(first.id()).unwrap(), Some(first.clone()));
        assert_eq!(store.load(second.id()).unwrap(), None);
        assert_eq!(store.transactions().unwrap().len(), 1);
        assert_eq!(store.quantity(&bolt, &north).unwrap(), 5);
        assert_eq!(store.quantity(&bolt, &south).unwrap(), 0);
        assert_eq!(store.status_history(first.id()).unwrap().len(), 1);
        assert!(store.status_history(second.id()).unwrap().is_empty());
        assert!(store.audit_history(first.id()).unwrap().is_empty());
    }

    #[test]
    fn committed_unit_keeps_its_writes() {
        let store = MemoryStore::new();
        let txn = receipt("txn_kept");
        store
            .atomically(|unit| {
                unit.put_transaction(&txn)?;
                unit.append_status(&created(&txn, None))
            })
            .unwrap();

        assert_eq!(store.load(txn.id()).unwrap(), Some(txn.clone()));
        assert_eq!(store.status_history(txn.id()).unwrap().len(), 1);
    }

    #[test]
    fn sequence_starts_at_one() {
        let store = MemoryStore::new();
        assert_eq!(store.next_sequence().unwrap(), 1);
        assert_eq!(store.next_sequence().unwrap(), 2);
    }
}
