//! Service layer API for workflow operations
//!
//! Every operation follows the same shape: resolve the acting principal, then
//! inside one unit of work load the transaction, validate the move, apply it,
//! append to the logs and persist. Events are emitted only once the unit has
//! committed.
use super::audit::{InventoryAuditLogEntry, StatusChange, TransactionStatusLogEntry, verify_chain};
use super::error::WorkflowError;
use super::machine::{self, TransitionKind};
use super::notify::{NotificationSink, TracingSink, WorkflowEvent};
use super::reconcile::{self, Posting};
use super::registry::{Stage, WorkflowRegistry};
use super::review::{self, ReviewStatus};
use super::roles::{Actor, RoleDirectory};
use super::store::{UnitOfWork, WorkflowStore};
use super::summary::{self, StatusSummary, Visibility};
use super::transaction::{Transaction, TransactionDraft, TransactionStatus};
use super::types::{ItemId, PrincipalId, StoreroomId, TimeStamp, TransactionId};
use chrono::Utc;
use std::sync::Arc;
use tracing::{debug, info, instrument};

/// Result of a successful [`WorkflowService::transition`].
#[derive(Debug, Clone)]
pub struct TransitionOutcome {
    pub transaction: Transaction,
    pub kind: TransitionKind,
    /// Stage the transaction was in before the call.
    pub from: Stage,
    /// False when the call only recorded an approval toward a stage that
    /// needs more approvers.
    pub advanced: bool,
    /// Entries written by reconciliation; empty unless the move committed.
    pub audit: Vec<InventoryAuditLogEntry>,
}

/// Result of a successful [`WorkflowService::reverse`].
#[derive(Debug, Clone)]
pub struct ReversalOutcome {
    pub transaction: Transaction,
    pub audit: Vec<InventoryAuditLogEntry>,
}

pub struct WorkflowService<S, D> {
    store: Arc<S>,
    directory: Arc<D>,
    registry: WorkflowRegistry,
    notifier: Arc<dyn NotificationSink>,
}

impl<S: WorkflowStore, D: RoleDirectory> WorkflowService<S, D> {
    pub fn new(store: Arc<S>, directory: Arc<D>) -> Self {
        Self {
            store,
            directory,
            registry: WorkflowRegistry::standard(),
            notifier: Arc::new(TracingSink),
        }
    }

    pub fn with_registry(mut self, registry: WorkflowRegistry) -> Self {
        self.registry = registry;
        self
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn NotificationSink>) -> Self {
        self.notifier = notifier;
        self
    }

    pub fn registry(&self) -> &WorkflowRegistry {
        &self.registry
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Creates a Draft transaction on behalf of `initiator`.
    #[instrument(skip(self, draft), fields(kind = %draft.kind()))]
    pub fn initiate(
        &self,
        draft: TransactionDraft,
        initiator: &PrincipalId,
    ) -> Result<Transaction, WorkflowError> {
        let result = self.initiate_inner(draft, initiator);
        self.report("initiate", None, initiator, result)
    }

    fn initiate_inner(
        &self,
        draft: TransactionDraft,
        initiator: &PrincipalId,
    ) -> Result<Transaction, WorkflowError> {
        let actor = self.directory.resolve(initiator)?;
        let kind = draft.kind();

        if !self.registry.permissions_for(kind, actor.role)?.can_initiate {
            return Err(WorkflowError::unauthorized(
                initiator,
                format!("{} may not initiate {kind}", actor.role),
            ));
        }
        draft.validate()?;

        let id = TransactionId::generate()?;
        let number = kind.transaction_number(self.store.next_sequence()?);
        let at = TimeStamp::new();
        let transaction = Transaction::from_draft(id, number, draft, initiator.clone(), at.clone());

        self.store.atomically(|unit| {
            unit.put_transaction(&transaction)?;
            append_status(
                unit,
                &transaction,
                TransactionStatus::Draft,
                StatusChange::Created,
                &actor,
                &at,
                None,
            )
        })?;

        info!(
            transaction = %transaction.id(),
            number = transaction.number(),
            "transaction initiated"
        );
        self.notifier.notify(&WorkflowEvent::Initiated {
            id: transaction.id().clone(),
            kind,
            by: initiator.clone(),
        });
        Ok(transaction)
    }

    /// Moves a transaction to `target`: the next stage of its workflow, or
    /// back to Draft for rework.
    #[instrument(skip(self))]
    pub fn transition(
        &self,
        id: &TransactionId,
        target: Stage,
        principal: &PrincipalId,
    ) -> Result<TransitionOutcome, WorkflowError> {
        let result = self.transition_inner(id, target, principal, None);
        self.report("transition", Some(id), principal, result)
    }

    /// Sends a transaction back to Draft with a reason.
    #[instrument(skip(self, reason))]
    pub fn reject(
        &self,
        id: &TransactionId,
        principal: &PrincipalId,
        reason: impl Into<String>,
    ) -> Result<TransitionOutcome, WorkflowError> {
        let result = self.transition_inner(id, Stage::Draft, principal, Some(reason.into()));
        self.report("reject", Some(id), principal, result)
    }

    fn transition_inner(
        &self,
        id: &TransactionId,
        target: Stage,
        principal: &PrincipalId,
        reason: Option<String>,
    ) -> Result<TransitionOutcome, WorkflowError> {
        let actor = self.directory.resolve(principal)?;
        let at = TimeStamp::new();

        let outcome = self.store.atomically(|unit| {
            let mut transaction = load(unit, id)?;
            let from = transaction.stage();
            let old_status = transaction.status();

            if old_status.is_closed() {
                return Err(WorkflowError::invalid_transition(
                    from,
                    target,
                    format!("transaction is {old_status}"),
                ));
            }

            let kind = machine::validate_transition(
                &self.registry,
                transaction.kind(),
                from,
                target,
                &actor,
            )?;

            let required = match kind {
                TransitionKind::RejectToDraft => 1,
                TransitionKind::Submit | TransitionKind::Advance | TransitionKind::Commit => self
                    .registry
                    .workflow(transaction.kind())?
                    .approval_stage(target)
                    .map(|stage| stage.min_approvals)
                    .unwrap_or(1),
            };

            let recorded = if required > 1 {
                let approvals = transaction.approvals().iter().filter(|a| a.stage == target);
                if approvals.clone().any(|a| a.principal == actor.principal) {
                    return Err(WorkflowError::invalid_transition(
                        from,
                        target,
                        format!("{} has already approved", actor.principal),
                    ));
                }
                approvals.count() as u32 + 1
            } else {
                1
            };

            if recorded < required {
                transaction.record_approval(target, actor.principal.clone(), at.clone());
                unit.put_transaction(&transaction)?;
                append_status(
                    unit,
                    &transaction,
                    old_status,
                    StatusChange::Approval {
                        stage: target,
                        recorded,
                        required,
                    },
                    &actor,
                    &at,
                    reason.clone(),
                )?;
                return Ok(TransitionOutcome {
                    transaction,
                    kind,
                    from,
                    advanced: false,
                    audit: vec![],
                });
            }

            transaction.move_to(target, at.clone());
            let audit = match kind {
                TransitionKind::Commit => {
                    reconcile::apply_transaction(unit, &transaction, Posting::Forward, &actor, &at)?
                }
                TransitionKind::Submit | TransitionKind::Advance | TransitionKind::RejectToDraft => {
                    vec![]
                }
            };
            unit.put_transaction(&transaction)?;
            append_status(
                unit,
                &transaction,
                old_status,
                StatusChange::Stage { from, to: target },
                &actor,
                &at,
                reason.clone(),
            )?;

            Ok(TransitionOutcome {
                transaction,
                kind,
                from,
                advanced: true,
                audit,
            })
        })?;

        let transaction = &outcome.transaction;
        if outcome.advanced {
            info!(
                transaction = %transaction.id(),
                to = %transaction.stage(),
                kind = ?outcome.kind,
                "stage changed"
            );
            self.notifier.notify(&WorkflowEvent::StageAdvanced {
                id: transaction.id().clone(),
                from: outcome.from,
                to: target,
                by: principal.clone(),
            });
            if outcome.kind == TransitionKind::Commit {
                self.notifier.notify(&WorkflowEvent::Committed {
                    id: transaction.id().clone(),
                    adjustments: outcome.audit.len(),
                });
            }
        } else {
            let (recorded, required) = approval_progress(&self.registry, transaction, target);
            debug!(transaction = %transaction.id(), recorded, required, "approval recorded");
            self.notifier.notify(&WorkflowEvent::ApprovalRecorded {
                id: transaction.id().clone(),
                stage: target,
                recorded,
                required,
                by: principal.clone(),
            });
        }
        Ok(outcome)
    }

    /// Undoes the stock movements of a completed transaction and marks it
    /// Reversed.
    #[instrument(skip(self))]
    pub fn reverse(
        &self,
        id: &TransactionId,
        principal: &PrincipalId,
    ) -> Result<ReversalOutcome, WorkflowError> {
        let result = self.reverse_inner(id, principal);
        self.report("reverse", Some(id), principal, result)
    }

    fn reverse_inner(
        &self,
        id: &TransactionId,
        principal: &PrincipalId,
    ) -> Result<ReversalOutcome, WorkflowError> {
        let actor = self.directory.resolve(principal)?;
        let at = TimeStamp::new();

        let outcome = self.store.atomically(|unit| {
            let mut transaction = load(unit, id)?;
            let old_status = transaction.status();

            if transaction.is_reversed() {
                return Err(WorkflowError::NotReversible {
                    id: id.clone(),
                    reason: "already reversed".into(),
                });
            }
            if old_status != TransactionStatus::Completed {
                return Err(WorkflowError::NotReversible {
                    id: id.clone(),
                    reason: format!("status is {old_status}"),
                });
            }

            let permissions = self
                .registry
                .permissions_for(transaction.kind(), actor.role)?;
            if !permissions.can_approve_into.contains(&Stage::Completed) {
                return Err(WorkflowError::unauthorized(
                    principal,
                    format!("{} may not reverse {}", actor.role, transaction.kind()),
                ));
            }

            let audit =
                reconcile::apply_transaction(unit, &transaction, Posting::Reverse, &actor, &at)?;
            transaction.mark_reversed(actor.principal.clone(), at.clone());
            unit.put_transaction(&transaction)?;
            append_status(
                unit,
                &transaction,
                old_status,
                StatusChange::Reversal,
                &actor,
                &at,
                None,
            )?;

            Ok(ReversalOutcome { transaction, audit })
        })?;

        info!(
            transaction = %outcome.transaction.id(),
            adjustments = outcome.audit.len(),
            "transaction reversed"
        );
        self.notifier.notify(&WorkflowEvent::Reversed {
            id: id.clone(),
            adjustments: outcome.audit.len(),
            by: principal.clone(),
        });
        Ok(outcome)
    }

    /// Moves the review layer of a transaction to `target`.
    #[instrument(skip(self, reason))]
    pub fn review(
        &self,
        id: &TransactionId,
        target: ReviewStatus,
        principal: &PrincipalId,
        reason: Option<String>,
    ) -> Result<Transaction, WorkflowError> {
        let result = self.review_inner(id, target, principal, reason);
        self.report("review", Some(id), principal, result)
    }

    pub fn cancel(
        &self,
        id: &TransactionId,
        principal: &PrincipalId,
        reason: impl Into<String>,
    ) -> Result<Transaction, WorkflowError> {
        self.review(id, ReviewStatus::Cancelled, principal, Some(reason.into()))
    }

    fn review_inner(
        &self,
        id: &TransactionId,
        target: ReviewStatus,
        principal: &PrincipalId,
        reason: Option<String>,
    ) -> Result<Transaction, WorkflowError> {
        let actor = self.directory.resolve(principal)?;
        let at = TimeStamp::new();

        let (transaction, from) = self.store.atomically(|unit| {
            let mut transaction = load(unit, id)?;
            let from = transaction.review();
            let stage = transaction.stage();

            if transaction.is_reversed() {
                return Err(WorkflowError::invalid_transition(
                    from,
                    target,
                    "transaction is reversed",
                ));
            }
            // once stock has moved only the closing review step remains
            if stage == Stage::Completed && target != ReviewStatus::Completed {
                return Err(WorkflowError::invalid_transition(
                    from,
                    target,
                    "transaction is completed",
                ));
            }

            review::validate_review(from, target, actor.role, principal)?;

            if target == ReviewStatus::Completed && stage != Stage::Completed {
                return Err(WorkflowError::invalid_transition(
                    from,
                    target,
                    format!("stage is still {stage}"),
                ));
            }

            let old_status = transaction.status();
            transaction.set_review(target, at.clone());
            unit.put_transaction(&transaction)?;
            append_status(
                unit,
                &transaction,
                old_status,
                StatusChange::Review { from, to: target },
                &actor,
                &at,
                reason.clone(),
            )?;
            Ok((transaction, from))
        })?;

        info!(transaction = %id, %from, to = %target, "review changed");
        self.notifier.notify(&WorkflowEvent::ReviewChanged {
            id: id.clone(),
            from,
            to: target,
            by: principal.clone(),
        });
        Ok(transaction)
    }

    /// Counts of visible transactions by status and type.
    #[instrument(skip(self))]
    pub fn status_summary(&self, principal: &PrincipalId) -> Result<StatusSummary, WorkflowError> {
        let role = self.directory.role_of(principal)?;
        let visibility = Visibility::for_role(
            role,
            self.directory.assigned_storerooms(principal)?,
            self.directory.managed_storerooms(principal)?,
        );
        let transactions = self.store.transactions()?;
        Ok(summary::summarize(&transactions, &visibility))
    }

    pub fn transaction(&self, id: &TransactionId) -> Result<Transaction, WorkflowError> {
        self.store
            .load(id)?
            .ok_or_else(|| WorkflowError::NotFound(id.clone()))
    }

    pub fn status_history(
        &self,
        id: &TransactionId,
    ) -> Result<Vec<TransactionStatusLogEntry>, WorkflowError> {
        self.store.status_history(id)
    }

    pub fn audit_history(
        &self,
        id: &TransactionId,
    ) -> Result<Vec<InventoryAuditLogEntry>, WorkflowError> {
        self.store.audit_history(id)
    }

    /// Both logs of `id` are complete and unmodified.
    pub fn verify_history(&self, id: &TransactionId) -> Result<bool, WorkflowError> {
        Ok(verify_chain(&self.store.status_history(id)?)
            && verify_chain(&self.store.audit_history(id)?))
    }

    pub fn quantity(&self, item: &ItemId, storeroom: &StoreroomId) -> Result<u64, WorkflowError> {
        self.store.quantity(item, storeroom)
    }

    fn report<T>(
        &self,
        operation: &'static str,
        id: Option<&TransactionId>,
        principal: &PrincipalId,
        result: Result<T, WorkflowError>,
    ) -> Result<T, WorkflowError> {
        if let Err(err) = &result {
            debug!(operation, reason = err.reason(), "operation refused");
            self.notifier.notify(&WorkflowEvent::Refused {
                id: id.cloned(),
                operation,
                reason: err.reason(),
                message: err.to_string(),
                by: principal.clone(),
            });
        }
        result
    }
}

fn load(unit: &dyn UnitOfWork, id: &TransactionId) -> Result<Transaction, WorkflowError> {
    unit.transaction(id)?
        .ok_or_else(|| WorkflowError::NotFound(id.clone()))
}

fn append_status(
    unit: &dyn UnitOfWork,
    transaction: &Transaction,
    old_status: TransactionStatus,
    change: StatusChange,
    actor: &Actor,
    at: &TimeStamp<Utc>,
    reason: Option<String>,
) -> Result<(), WorkflowError> {
    let head = unit.status_head(transaction.id())?;
    let entry = TransactionStatusLogEntry::sealed(
        head.as_ref(),
        transaction.id().clone(),
        old_status,
        transaction.status(),
        change,
        actor.principal.clone(),
        actor.role,
        at.clone(),
        reason,
    )?;
    unit.append_status(&entry)
}

fn approval_progress(
    registry: &WorkflowRegistry,
    transaction: &Transaction,
    stage: Stage,
) -> (u32, u32) {
    let recorded = transaction
        .approvals()
        .iter()
        .filter(|a| a.stage == stage)
        .count() as u32;
    let required = registry
        .workflow(transaction.kind())
        .ok()
        .and_then(|w| w.approval_stage(stage))
        .map(|s| s.min_approvals)
        .unwrap_or(1);
    (recorded, required)
}
