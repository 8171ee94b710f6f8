//! Durable store on sled.
use super::{
    UnitOfWork, WorkflowStore, from_cbor, inventory_key, log_key, log_prefix, to_cbor,
};
use crate::audit::{InventoryAuditLogEntry, LogHead, TransactionStatusLogEntry};
use crate::error::WorkflowError;
use crate::transaction::Transaction;
use crate::types::{ItemId, StoreroomId, TransactionId};
use sled::transaction::{
    ConflictableTransactionError, TransactionError, TransactionalTree,
    UnabortableTransactionError,
};
use sled::{Transactional, Tree};
use std::cell::RefCell;
use std::path::Path;
use std::sync::Arc;
use tracing::debug;

const STATUS_HEAD: u8 = b's';
const AUDIT_HEAD: u8 = b'a';

pub struct SledStore {
    instance: Arc<sled::Db>,
    transactions: Tree,
    inventory: Tree,
    status_logs: Tree,
    audit_logs: Tree,
    log_heads: Tree,
    flush_on_commit: bool,
}

impl SledStore {
    pub fn new(instance: Arc<sled::Db>) -> Result<Self, WorkflowError> {
        Ok(Self {
            transactions: instance.open_tree("transactions")?,
            inventory: instance.open_tree("inventory")?,
            status_logs: instance.open_tree("transaction_status_logs")?,
            audit_logs: instance.open_tree("inventory_audit_logs")?,
            log_heads: instance.open_tree("log_heads")?,
            instance,
            flush_on_commit: false,
        })
    }

    pub fn open(path: impl AsRef<Path>) -> Result<Self, WorkflowError> {
        Self::new(Arc::new(sled::open(path)?))
    }

    /// Flush to disk after every committed unit of work.
    pub fn with_flush_on_commit(mut self, flush: bool) -> Self {
        self.flush_on_commit = flush;
        self
    }

    fn scan<T>(tree: &Tree, prefix: Vec<u8>) -> Result<Vec<T>, WorkflowError>
    where
        T: for<'b> minicbor::Decode<'b, ()>,
    {
        tree.scan_prefix(prefix)
            .values()
            .map(|value| from_cbor(&value?))
            .collect()
    }
}

impl WorkflowStore for SledStore {
    fn atomically<T, F>(&self, op: F) -> Result<T, WorkflowError>
    where
        F: Fn(&dyn UnitOfWork) -> Result<T, WorkflowError>,
    {
        let result = (
            &self.transactions,
            &self.inventory,
            &self.status_logs,
            &self.audit_logs,
            &self.log_heads,
        )
            .transaction(|(transactions, inventory, status_logs, audit_logs, log_heads)| {
                let unit = SledUnit {
                    transactions,
                    inventory,
                    status_logs,
                    audit_logs,
                    log_heads,
                    interrupted: RefCell::new(None),
                };
                match op(&unit) {
                    Ok(value) => Ok(value),
                    // sled must see its own conflicts to retry the closure
                    Err(err) => match unit.interrupted.take() {
                        Some(interrupted) => {
                            debug!("sled unit of work interrupted: {:?}", interrupted);
                            Err(interrupted.into())
                        }
                        None => Err(ConflictableTransactionError::Abort(err)),
                    },
                }
            });

        let value = result.map_err(|err| match err {
            TransactionError::Abort(err) => err,
            TransactionError::Storage(err) => err.into(),
        })?;

        if self.flush_on_commit {
            self.instance.flush()?;
        }
        Ok(value)
    }

    fn next_sequence(&self) -> Result<u64, WorkflowError> {
        Ok(self.instance.generate_id()? + 1)
    }

    fn transactions(&self) -> Result<Vec<Transaction>, WorkflowError> {
        self.transactions
            .iter()
            .values()
            .map(|value| from_cbor(&value?))
            .collect()
    }

    fn status_history(
        &self,
        id: &TransactionId,
    ) -> Result<Vec<TransactionStatusLogEntry>, WorkflowError> {
        Self::scan(&self.status_logs, log_prefix(id))
    }

    fn audit_history(
        &self,
        id: &TransactionId,
    ) -> Result<Vec<InventoryAuditLogEntry>, WorkflowError> {
        Self::scan(&self.audit_logs, log_prefix(id))
    }
}

struct SledUnit<'a> {
    transactions: &'a TransactionalTree,
    inventory: &'a TransactionalTree,
    status_logs: &'a TransactionalTree,
    audit_logs: &'a TransactionalTree,
    log_heads: &'a TransactionalTree,
    interrupted: RefCell<Option<UnabortableTransactionError>>,
}

impl SledUnit<'_> {
    // Keeps sled's own error so the closure can hand it back for a retry.
    fn check<T>(&self, result: Result<T, UnabortableTransactionError>) -> Result<T, WorkflowError> {
        result.map_err(|err| {
            let message = err.to_string();
            self.interrupted.replace(Some(err));
            WorkflowError::PersistenceFailure(message)
        })
    }

    fn head_key(tag: u8, id: &TransactionId) -> Vec<u8> {
        let mut key = vec![tag];
        key.extend_from_slice(id.as_str().as_bytes());
        key
    }

    fn head(&self, tag: u8, id: &TransactionId) -> Result<Option<LogHead>, WorkflowError> {
        match self.check(self.log_heads.get(Self::head_key(tag, id)))? {
            Some(bytes) => Ok(Some(from_cbor(&bytes)?)),
            None => Ok(None),
        }
    }

    fn append(
        &self,
        tree: &TransactionalTree,
        tag: u8,
        id: &TransactionId,
        head: LogHead,
        record: Vec<u8>,
    ) -> Result<(), WorkflowError> {
        self.check(tree.insert(log_key(id, head.sequence), record))?;
        self.check(self.log_heads.insert(Self::head_key(tag, id), to_cbor(&head)?))?;
        Ok(())
    }
}

impl UnitOfWork for SledUnit<'_> {
    fn transaction(&self, id: &TransactionId) -> Result<Option<Transaction>, WorkflowError> {
        match self.check(self.transactions.get(id.as_str().as_bytes()))? {
            Some(bytes) => Ok(Some(from_cbor(&bytes)?)),
            None => Ok(None),
        }
    }

    fn put_transaction(&self, transaction: &Transaction) -> Result<(), WorkflowError> {
        let record = to_cbor(transaction)?;
        self.check(
            self.transactions
                .insert(transaction.id().as_str().as_bytes(), record),
        )?;
        Ok(())
    }

    fn quantity(&self, item: &ItemId, storeroom: &StoreroomId) -> Result<u64, WorkflowError> {
        match self.check(self.inventory.get(inventory_key(item, storeroom)))? {
            Some(bytes) => Ok(from_cbor(&bytes)?),
            None => Ok(0),
        }
    }

    fn put_quantity(
        &self,
        item: &ItemId,
        storeroom: &StoreroomId,
        quantity: u64,
    ) -> Result<(), WorkflowError> {
        let record = to_cbor(&quantity)?;
        self.check(self.inventory.insert(inventory_key(item, storeroom), record))?;
        Ok(())
    }

    fn status_head(&self, id: &TransactionId) -> Result<Option<LogHead>, WorkflowError> {
        self.head(STATUS_HEAD, id)
    }

    fn append_status(&self, entry: &TransactionStatusLogEntry) -> Result<(), WorkflowError> {
        let head = LogHead {
            sequence: entry.sequence,
            hash: entry.hash.clone(),
        };
        self.append(
            self.status_logs,
            STATUS_HEAD,
            &entry.transaction_id,
            head,
            to_cbor(entry)?,
        )
    }

    fn audit_head(&self, id: &TransactionId) -> Result<Option<LogHead>, WorkflowError> {
        self.head(AUDIT_HEAD, id)
    }

    fn append_audit(&self, entry: &InventoryAuditLogEntry) -> Result<(), WorkflowError> {
        let head = LogHead {
            sequence: entry.sequence,
            hash: entry.hash.clone(),
        };
        self.append(
            self.audit_logs,
            AUDIT_HEAD,
            &entry.transaction_id,
            head,
            to_cbor(entry)?,
        )
    }
}
