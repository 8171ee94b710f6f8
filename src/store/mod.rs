//! Persistence boundary.
//!
//! The engine never touches storage directly. Every operation that writes runs
//! inside [`WorkflowStore::atomically`], which hands it a [`UnitOfWork`]; the
//! store commits all of the unit's writes together or none of them, and
//! serializes units that touch the same records.
mod memory;
mod sled_store;

pub use memory::MemoryStore;
pub use sled_store::SledStore;

use super::audit::{InventoryAuditLogEntry, LogHead, TransactionStatusLogEntry};
use super::error::WorkflowError;
use super::transaction::Transaction;
use super::types::{ItemId, StoreroomId, TransactionId};

/// Reads and writes visible to one atomic operation.
///
/// Reads observe the unit's own earlier writes.
pub trait UnitOfWork {
    fn transaction(&self, id: &TransactionId) -> Result<Option<Transaction>, WorkflowError>;
    fn put_transaction(&self, transaction: &Transaction) -> Result<(), WorkflowError>;

    /// Stored quantity, zero when the pair has never been stocked.
    fn quantity(&self, item: &ItemId, storeroom: &StoreroomId) -> Result<u64, WorkflowError>;
    fn put_quantity(
        &self,
        item: &ItemId,
        storeroom: &StoreroomId,
        quantity: u64,
    ) -> Result<(), WorkflowError>;

    fn status_head(&self, id: &TransactionId) -> Result<Option<LogHead>, WorkflowError>;
    fn append_status(&self, entry: &TransactionStatusLogEntry) -> Result<(), WorkflowError>;

    fn audit_head(&self, id: &TransactionId) -> Result<Option<LogHead>, WorkflowError>;
    fn append_audit(&self, entry: &InventoryAuditLogEntry) -> Result<(), WorkflowError>;
}

pub trait WorkflowStore: Send + Sync {
    /// Runs `op` as one all-or-nothing unit. `op` may be invoked more than
    /// once if the store retries after a conflict, so it must not have side
    /// effects outside the unit.
    fn atomically<T, F>(&self, op: F) -> Result<T, WorkflowError>
    where
        F: Fn(&dyn UnitOfWork) -> Result<T, WorkflowError>;

    /// Monotonic counter used for transaction numbers.
    fn next_sequence(&self) -> Result<u64, WorkflowError>;

    fn transactions(&self) -> Result<Vec<Transaction>, WorkflowError>;
    fn status_history(
        &self,
        id: &TransactionId,
    ) -> Result<Vec<TransactionStatusLogEntry>, WorkflowError>;
    fn audit_history(&self, id: &TransactionId)
    -> Result<Vec<InventoryAuditLogEntry>, WorkflowError>;

    fn load(&self, id: &TransactionId) -> Result<Option<Transaction>, WorkflowError> {
        self.atomically(|unit| unit.transaction(id))
    }

    fn quantity(&self, item: &ItemId, storeroom: &StoreroomId) -> Result<u64, WorkflowError> {
        self.atomically(|unit| unit.quantity(item, storeroom))
    }

    /// Stock-take: overwrite a quantity outside of any transaction.
    fn set_quantity(
        &self,
        item: &ItemId,
        storeroom: &StoreroomId,
        quantity: u64,
    ) -> Result<(), WorkflowError> {
        self.atomically(|unit| unit.put_quantity(item, storeroom, quantity))
    }
}

pub(crate) fn to_cbor<T: minicbor::Encode<()>>(value: &T) -> Result<Vec<u8>, WorkflowError> {
    minicbor::to_vec(value).map_err(|e| WorkflowError::PersistenceFailure(e.to_string()))
}

pub(crate) fn from_cbor<T>(bytes: &[u8]) -> Result<T, WorkflowError>
where
    T: for<'b> minicbor::Decode<'b, ()>,
{
    Ok(minicbor::decode(bytes)?)
}

// Shared key layout. Every variable-length component but the last carries a
// big-endian length prefix, so arbitrary text never makes two keys collide.
// Log keys sort by sequence within a transaction.
fn push_field(key: &mut Vec<u8>, field: &str) {
    key.extend_from_slice(&(field.len() as u32).to_be_bytes());
    key.extend_from_slice(field.as_bytes());
}

pub(crate) fn inventory_key(item: &ItemId, storeroom: &StoreroomId) -> Vec<u8> {
    let mut key = Vec::with_capacity(4 + item.as_str().len() + storeroom.as_str().len());
    push_field(&mut key, item.as_str());
    key.extend_from_slice(storeroom.as_str().as_bytes());
    key
}

pub(crate) fn log_prefix(id: &TransactionId) -> Vec<u8> {
    let mut key = Vec::with_capacity(4 + id.as_str().len() + 8);
    push_field(&mut key, id.as_str());
    key
}

pub(crate) fn log_key(id: &TransactionId, sequence: u64) -> Vec<u8> {
    let mut key = log_prefix(id);
    key.extend_from_slice(&sequence.to_be_bytes());
    key
}
