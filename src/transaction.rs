//! Transactions, their line items and the draft builder used to create them
use super::error::ValidationError;
use super::registry::Stage;
use super::review::ReviewStatus;
use super::types::{ItemId, PrincipalId, StoreroomId, TimeStamp, TransactionId, TransactionType};
use chrono::Utc;

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
pub enum TransactionStatus {
    #[n(0)]
    Draft,
    #[n(1)]
    InProgress,
    #[n(2)]
    PendingApproval,
    #[n(3)]
    Approved,
    #[n(4)]
    Rejected,
    #[n(5)]
    Completed,
    #[n(6)]
    Reversed,
    #[n(7)]
    Cancelled,
}

impl TransactionStatus {
    /// Overall status as a function of both workflow layers.
    ///
    /// Reversal wins over everything, then a closed review, then the stage.
    pub fn derive(stage: Stage, review: ReviewStatus, reversed: bool) -> Self {
        if reversed {
            return TransactionStatus::Reversed;
        }
        match review {
            ReviewStatus::Rejected => return TransactionStatus::Rejected,
            ReviewStatus::Cancelled => return TransactionStatus::Cancelled,
            _ => {}
        }
        match stage {
            Stage::Draft => TransactionStatus::Draft,
            Stage::PendingClerkSubmission => TransactionStatus::InProgress,
            Stage::PendingSupplierDriverApproval
            | Stage::PendingStoremanApproval
            | Stage::PendingFirstLevelApproval
            | Stage::PendingFinalApproval => {
                if review == ReviewStatus::Approved {
                    TransactionStatus::Approved
                } else {
                    TransactionStatus::PendingApproval
                }
            }
            Stage::Completed => TransactionStatus::Completed,
        }
    }

    /// No further stage movement is possible.
    pub fn is_closed(self) -> bool {
        matches!(
            self,
            TransactionStatus::Completed
                | TransactionStatus::Reversed
                | TransactionStatus::Rejected
                | TransactionStatus::Cancelled
        )
    }
}

/// Which leg of a swap a line item belongs to.
#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemDirection {
    #[n(0)]
    Outgoing,
    #[n(1)]
    Incoming,
}

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, PartialEq, Eq)]
pub struct TransactionItem {
    #[n(0)]
    pub item: ItemId,
    #[n(1)]
    pub quantity: u64,
    #[n(2)]
    pub unit_price: Option<u64>, // minor currency units
    #[n(3)]
    pub direction: Option<ItemDirection>,
    #[n(4)]
    pub purpose: Option<String>,
}

impl TransactionItem {
    pub fn new(item: impl Into<ItemId>, quantity: u64) -> Self {
        Self {
            item: item.into(),
            quantity,
            unit_price: None,
            direction: None,
            purpose: None,
        }
    }
    pub fn set_unit_price(mut self, price: u64) -> Self {
        self.unit_price = Some(price);
        self
    }
    pub fn set_direction(mut self, direction: ItemDirection) -> Self {
        self.direction = Some(direction);
        self
    }
    pub fn set_purpose(mut self, purpose: impl Into<String>) -> Self {
        self.purpose = Some(purpose.into());
        self
    }
}

/// One approver's sign-off toward a multi-approver stage.
#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, PartialEq, Eq)]
pub struct StageApproval {
    #[n(0)]
    pub stage: Stage,
    #[n(1)]
    pub principal: PrincipalId,
    #[n(2)]
    pub at: TimeStamp<Utc>,
}

// used for constructing new transactions
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionDraft {
    kind: TransactionType,
    source: Option<StoreroomId>,
    destination: Option<StoreroomId>,
    notes: Option<String>,
    reference: Option<String>,
    supplier: Option<String>,
    items: Vec<TransactionItem>,
}

impl TransactionDraft {
    pub fn new(kind: TransactionType) -> Self {
        Self {
            kind,
            source: None,
            destination: None,
            notes: None,
            reference: None,
            supplier: None,
            items: vec![],
        }
    }
    pub fn kind(&self) -> TransactionType {
        self.kind
    }
    pub fn set_source(mut self, storeroom: impl Into<StoreroomId>) -> Self {
        self.source = Some(storeroom.into());
        self
    }
    pub fn set_destination(mut self, storeroom: impl Into<StoreroomId>) -> Self {
        self.destination = Some(storeroom.into());
        self
    }
    pub fn set_notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = Some(notes.into());
        self
    }
    pub fn set_reference(mut self, reference: impl Into<String>) -> Self {
        self.reference = Some(reference.into());
        self
    }
    pub fn set_supplier(mut self, supplier: impl Into<String>) -> Self {
        self.supplier = Some(supplier.into());
        self
    }
    pub fn add_item(mut self, item: TransactionItem) -> Self {
        self.items.push(item);
        self
    }

    /// Checks the draft against the domain rules for its type.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.items.is_empty() {
            return Err(ValidationError::NoItems);
        }
        if let Some(line) = self.items.iter().find(|line| line.quantity == 0) {
            return Err(ValidationError::ZeroQuantity(line.item.clone()));
        }

        let needs_source = || {
            self.source
                .as_ref()
                .ok_or(ValidationError::MissingSource(self.kind))
        };
        let needs_destination = || {
            self.destination
                .as_ref()
                .ok_or(ValidationError::MissingDestination(self.kind))
        };

        match self.kind {
            TransactionType::Receipt => {
                needs_destination()?;
            }
            TransactionType::Issuance => {
                needs_source()?;
            }
            TransactionType::Transfer => {
                let source = needs_source()?;
                let destination = needs_destination()?;
                if source == destination {
                    return Err(ValidationError::SameStoreroom(source.clone()));
                }
            }
            TransactionType::Swap => {
                needs_source()?;
                needs_destination()?;
                if let Some(line) = self.items.iter().find(|line| line.direction.is_none()) {
                    return Err(ValidationError::MissingDirection(line.item.clone()));
                }
                let has = |direction| self.items.iter().any(|l| l.direction == Some(direction));
                if !has(ItemDirection::Outgoing) || !has(ItemDirection::Incoming) {
                    return Err(ValidationError::UnbalancedSwap);
                }
            }
        }
        Ok(())
    }
}

/// An inventory moving transaction.
///
/// Fields are only changed by the workflow engine; callers read them through
/// the accessors.
#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, PartialEq, Eq)]
pub struct Transaction {
    #[n(0)]
    pub(crate) id: TransactionId,
    #[n(1)]
    pub(crate) number: String,
    #[n(2)]
    pub(crate) kind: TransactionType,
    #[n(3)]
    pub(crate) stage: Stage,
    #[n(4)]
    pub(crate) status: TransactionStatus,
    #[n(5)]
    pub(crate) review: ReviewStatus,
    #[n(6)]
    pub(crate) created_by: PrincipalId,
    #[n(7)]
    pub(crate) created_at: TimeStamp<Utc>,
    #[n(8)]
    pub(crate) updated_at: TimeStamp<Utc>,
    #[n(9)]
    pub(crate) source: Option<StoreroomId>,
    #[n(10)]
    pub(crate) destination: Option<StoreroomId>,
    #[n(11)]
    pub(crate) notes: Option<String>,
    #[n(12)]
    pub(crate) reference: Option<String>,
    #[n(13)]
    pub(crate) supplier: Option<String>,
    #[n(14)]
    pub(crate) items: Vec<TransactionItem>,
    #[n(15)]
    pub(crate) approvals: Vec<StageApproval>,
    #[n(16)]
    pub(crate) reversed_by: Option<PrincipalId>,
    #[n(17)]
    pub(crate) reversed_at: Option<TimeStamp<Utc>>,
    #[n(18)]
    pub(crate) version: u64,
}

impl Transaction {
    pub(crate) fn from_draft(
        id: TransactionId,
        number: String,
        draft: TransactionDraft,
        created_by: PrincipalId,
        at: TimeStamp<Utc>,
    ) -> Self {
        Self {
            id,
            number,
            kind: draft.kind,
            stage: Stage::Draft,
            status: TransactionStatus::Draft,
            review: ReviewStatus::Draft,
            created_by,
            created_at: at.clone(),
            updated_at: at,
            source: draft.source,
            destination: draft.destination,
            notes: draft.notes,
            reference: draft.reference,
            supplier: draft.supplier,
            items: draft.items,
            approvals: vec![],
            reversed_by: None,
            reversed_at: None,
            version: 0,
        }
    }

    pub fn id(&self) -> &TransactionId {
        &self.id
    }
    pub fn number(&self) -> &str {
        &self.number
    }
    pub fn kind(&self) -> TransactionType {
        self.kind
    }
    pub fn stage(&self) -> Stage {
        self.stage
    }
    pub fn status(&self) -> TransactionStatus {
        self.status
    }
    pub fn review(&self) -> ReviewStatus {
        self.review
    }
    pub fn created_by(&self) -> &PrincipalId {
        &self.created_by
    }
    pub fn created_at(&self) -> &TimeStamp<Utc> {
        &self.created_at
    }
    pub fn updated_at(&self) -> &TimeStamp<Utc> {
        &self.updated_at
    }
    pub fn source(&self) -> Option<&StoreroomId> {
        self.source.as_ref()
    }
    pub fn destination(&self) -> Option<&StoreroomId> {
        self.destination.as_ref()
    }
    pub fn notes(&self) -> Option<&str> {
        self.notes.as_deref()
    }
    pub fn reference(&self) -> Option<&str> {
        self.reference.as_deref()
    }
    pub fn supplier(&self) -> Option<&str> {
        self.supplier.as_deref()
    }
    pub fn items(&self) -> &[TransactionItem] {
        &self.items
    }
    pub fn approvals(&self) -> &[StageApproval] {
        &self.approvals
    }
    pub fn reversed_by(&self) -> Option<&PrincipalId> {
        self.reversed_by.as_ref()
    }
    pub fn reversed_at(&self) -> Option<&TimeStamp<Utc>> {
        self.reversed_at.as_ref()
    }
    pub fn is_reversed(&self) -> bool {
        self.reversed_at.is_some()
    }
    /// Bumped on every persisted change.
    pub fn version(&self) -> u64 {
        self.version
    }

    /// Storerooms this transaction touches.
    pub fn storerooms(&self) -> impl Iterator<Item = &StoreroomId> {
        self.source.iter().chain(self.destination.iter())
    }

    /// The overall status agrees with the stage, review and reversal state.
    pub fn is_consistent(&self) -> bool {
        self.status == TransactionStatus::derive(self.stage, self.review, self.is_reversed())
            && (self.review != ReviewStatus::Completed || self.stage == Stage::Completed)
            && (!self.is_reversed() || self.stage == Stage::Completed)
            && !(matches!(
                self.status,
                TransactionStatus::Rejected | TransactionStatus::Cancelled
            ) && self.stage == Stage::Completed)
    }

    pub(crate) fn move_to(&mut self, stage: Stage, at: TimeStamp<Utc>) {
        self.stage = stage;
        self.approvals.clear();
        self.touch(at);
    }

    pub(crate) fn record_approval(&mut self, stage: Stage, principal: PrincipalId, at: TimeStamp<Utc>) {
        self.approvals.push(StageApproval {
            stage,
            principal,
            at: at.clone(),
        });
        self.touch(at);
    }

    pub(crate) fn set_review(&mut self, review: ReviewStatus, at: TimeStamp<Utc>) {
        self.review = review;
        self.touch(at);
    }

    pub(crate) fn mark_reversed(&mut self, by: PrincipalId, at: TimeStamp<Utc>) {
        self.reversed_by = Some(by);
        self.reversed_at = Some(at.clone());
        self.touch(at);
    }

    fn touch(&mut self, at: TimeStamp<Utc>) {
        self.status = TransactionStatus::derive(self.stage, self.review, self.is_reversed());
        self.updated_at = at;
        self.version += 1;
    }
}
