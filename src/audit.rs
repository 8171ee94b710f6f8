//! Append-only history: one log of stage/status changes and one of stock
//! adjustments, both keyed by transaction.
//!
//! Entries of each log form a per-transaction hash chain. Every entry stores
//! its position, the hash of its predecessor and the sha256 of its own CBOR
//! encoding (taken with the hash field blank), so a stored history can be
//! checked for gaps and edits with [`verify_chain`].
use super::error::WorkflowError;
use super::registry::Stage;
use super::review::ReviewStatus;
use super::roles::Role;
use super::store::to_cbor;
use super::transaction::TransactionStatus;
use super::types::{ItemId, PrincipalId, StoreroomId, TimeStamp, TransactionId, TransactionType};
use super::utils;
use chrono::Utc;

#[derive(
    minicbor::Encode,
    minicbor::Decode,
    strum::Display,
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
)]
pub enum ChangeKind {
    #[n(0)]
    Increase,
    #[n(1)]
    Decrease,
    #[n(2)]
    Reversal,
}

/// Position of the newest entry of a chain.
#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, PartialEq, Eq)]
pub struct LogHead {
    #[n(0)]
    pub sequence: u64,
    #[n(1)]
    pub hash: String,
}

pub trait ChainedEntry: minicbor::Encode<()> + Clone {
    fn sequence(&self) -> u64;
    fn prev_hash(&self) -> Option<&str>;
    fn hash(&self) -> &str;
    fn set_hash(&mut self, hash: String);

    fn digest(&self) -> Result<String, WorkflowError> {
        let mut body = self.clone();
        body.set_hash(String::new());
        Ok(utils::chain_digest(self.prev_hash(), &to_cbor(&body)?))
    }

    fn head(&self) -> LogHead {
        LogHead {
            sequence: self.sequence(),
            hash: self.hash().to_owned(),
        }
    }
}

fn seal<E: ChainedEntry>(mut entry: E) -> Result<E, WorkflowError> {
    let hash = entry.digest()?;
    entry.set_hash(hash);
    Ok(entry)
}

// (sequence, prev_hash) for the entry following `head`
fn next_link(head: Option<&LogHead>) -> (u64, Option<String>) {
    match head {
        Some(head) => (head.sequence + 1, Some(head.hash.clone())),
        None => (0, None),
    }
}

/// True when `entries` is a complete, untampered chain starting at sequence 0.
pub fn verify_chain<E: ChainedEntry>(entries: &[E]) -> bool {
    let mut head: Option<LogHead> = None;
    for entry in entries {
        let (sequence, prev) = next_link(head.as_ref());
        if entry.sequence() != sequence || entry.prev_hash() != prev.as_deref() {
            return false;
        }
        match entry.digest() {
            Ok(digest) if digest == entry.hash() => {}
            _ => return false,
        }
        head = Some(entry.head());
    }
    true
}

/// What a status-log entry records.
#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, PartialEq, Eq)]
pub enum StatusChange {
    #[n(0)]
    Created,
    #[n(1)]
    Stage {
        #[n(0)]
        from: Stage,
        #[n(1)]
        to: Stage,
    },
    #[n(2)]
    Approval {
        #[n(0)]
        stage: Stage,
        #[n(1)]
        recorded: u32,
        #[n(2)]
        required: u32,
    },
    #[n(3)]
    Review {
        #[n(0)]
        from: ReviewStatus,
        #[n(1)]
        to: ReviewStatus,
    },
    #[n(4)]
    Reversal,
}

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, PartialEq, Eq)]
pub struct TransactionStatusLogEntry {
    #[n(0)]
    pub transaction_id: TransactionId,
    #[n(1)]
    pub sequence: u64,
    #[n(2)]
    pub old_status: TransactionStatus,
    #[n(3)]
    pub new_status: TransactionStatus,
    #[n(4)]
    pub change: StatusChange,
    #[n(5)]
    pub changed_by: PrincipalId,
    #[n(6)]
    pub role: Role,
    #[n(7)]
    pub at: TimeStamp<Utc>,
    #[n(8)]
    pub reason: Option<String>,
    #[n(9)]
    pub prev_hash: Option<String>,
    #[n(10)]
    pub hash: String,
}

impl TransactionStatusLogEntry {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn sealed(
        head: Option<&LogHead>,
        transaction_id: TransactionId,
        old_status: TransactionStatus,
        new_status: TransactionStatus,
        change: StatusChange,
        changed_by: PrincipalId,
        role: Role,
        at: TimeStamp<Utc>,
        reason: Option<String>,
    ) -> Result<Self, WorkflowError> {
        let (sequence, prev_hash) = next_link(head);
        seal(Self {
            transaction_id,
            sequence,
            old_status,
            new_status,
            change,
            changed_by,
            role,
            at,
            reason,
            prev_hash,
            hash: String::new(),
        })
    }
}

impl ChainedEntry for TransactionStatusLogEntry {
    fn sequence(&self) -> u64 {
        self.sequence
    }
    fn prev_hash(&self) -> Option<&str> {
        self.prev_hash.as_deref()
    }
    fn hash(&self) -> &str {
        &self.hash
    }
    fn set_hash(&mut self, hash: String) {
        self.hash = hash;
    }
}

/// One stock change for one (item, storeroom) pair.
#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, PartialEq, Eq)]
pub struct InventoryAuditLogEntry {
    #[n(0)]
    pub transaction_id: TransactionId,
    #[n(1)]
    pub sequence: u64,
    #[n(2)]
    pub item: ItemId,
    #[n(3)]
    pub storeroom: StoreroomId,
    #[n(4)]
    pub change: ChangeKind,
    #[n(5)]
    pub quantity: u64,
    #[n(6)]
    pub previous_quantity: u64,
    #[n(7)]
    pub new_quantity: u64,
    #[n(8)]
    pub changed_by: PrincipalId,
    #[n(9)]
    pub role: Role,
    #[n(10)]
    pub at: TimeStamp<Utc>,
    #[n(11)]
    pub transaction_type: TransactionType,
    #[n(12)]
    pub reason: String,
    #[n(13)]
    pub prev_hash: Option<String>,
    #[n(14)]
    pub hash: String,
}

/// The fields of an audit entry the reconciliation engine decides.
#[derive(Debug, Clone)]
pub(crate) struct Adjustment {
    pub item: ItemId,
    pub storeroom: StoreroomId,
    pub change: ChangeKind,
    pub quantity: u64,
    pub previous_quantity: u64,
    pub new_quantity: u64,
    pub reason: String,
}

impl InventoryAuditLogEntry {
    pub(crate) fn sealed(
        head: Option<&LogHead>,
        transaction_id: TransactionId,
        transaction_type: TransactionType,
        adjustment: Adjustment,
        changed_by: PrincipalId,
        role: Role,
        at: TimeStamp<Utc>,
    ) -> Result<Self, WorkflowError> {
        let (sequence, prev_hash) = next_link(head);
        seal(Self {
            transaction_id,
            sequence,
            item: adjustment.item,
            storeroom: adjustment.storeroom,
            change: adjustment.change,
            quantity: adjustment.quantity,
            previous_quantity: adjustment.previous_quantity,
            new_quantity: adjustment.new_quantity,
            changed_by,
            role,
            at,
            transaction_type,
            reason: adjustment.reason,
            prev_hash,
            hash: String::new(),
        })
    }

    /// Net effect on the stored quantity.
    pub fn delta(&self) -> i128 {
        self.new_quantity as i128 - self.previous_quantity as i128
    }
}

impl ChainedEntry for InventoryAuditLogEntry {
    fn sequence(&self) -> u64 {
        self.sequence
    }
    fn prev_hash(&self) -> Option<&str> {
        self.prev_hash.as_deref()
    }
    fn hash(&self) -> &str {
        &self.hash
    }
    fn set_hash(&mut self, hash: String) {
        self.hash = hash;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(head: Option<&LogHead>, qty: u64) -> InventoryAuditLogEntry {
        InventoryAuditLogEntry::sealed(
            head,
            TransactionId::from("txn_a"),
            TransactionType::Issuance,
            Adjustment {
                item: ItemId::from("bolt"),
                storeroom: StoreroomId::from("north"),
                change: ChangeKind::Decrease,
                quantity: qty,
                previous_quantity: 10,
                new_quantity: 10 - qty,
                reason: "issue".into(),
            },
            PrincipalId::from("ada"),
            Role::Admin,
            TimeStamp::new(),
        )
        .unwrap()
    }

    #[test]
    fn chain_links_and_verifies() {
        let first = entry(None, 1);
        let second = entry(Some(&first.head()), 2);

        assert_eq!(first.sequence, 0);
        assert_eq!(second.sequence, 1);
        assert_eq!(second.prev_hash.as_deref(), Some(first.hash.as_str()));
        assert!(verify_chain(&[first.clone(), second.clone()]));

        // dropping, reordering or editing entries breaks the chain
        assert!(!verify_chain(&[second.clone()]));
        assert!(!verify_chain(&[second.clone(), first.clone()]));
        let mut edited = second;
        edited.new_quantity = 9;
        assert!(!verify_chain(&[first, edited]));
    }

    #[test]
    fn delta_is_signed() {
        assert_eq!(entry(None, 4).delta(), -4);
    }
}
