//! Approval workflow and stock reconciliation for inventory transactions.
//!
//! A transaction (receipt, issuance, transfer or swap) is created as a draft,
//! moved through the role gated stages registered for its type and, on
//! reaching `Completed`, applied to stored inventory in the same unit of work
//! as the stage change. Completed transactions can be reversed. Every stage
//! change and every stock adjustment is appended to hash-chained logs.
//!
//! [`WorkflowService`] is the entry point.

pub mod audit;
pub mod config;
pub mod error;
pub mod machine;
pub mod notify;
pub mod reconcile;
pub mod registry;
pub mod review;
pub mod roles;
pub mod service;
pub mod store;
pub mod summary;
pub mod telemetry;
pub mod transaction;
pub mod types;
pub mod utils;

pub use audit::{ChangeKind, InventoryAuditLogEntry, StatusChange, TransactionStatusLogEntry};
pub use config::EngineConfig;
pub use error::{ValidationError, WorkflowError};
pub use machine::TransitionKind;
pub use notify::{MemorySink, NotificationSink, TracingSink, WorkflowEvent};
pub use registry::{ApprovalStage, ApprovalWorkflow, RolePermission, Stage, WorkflowRegistry};
pub use review::ReviewStatus;
pub use roles::{Actor, InMemoryDirectory, Role, RoleDirectory};
pub use service::{ReversalOutcome, TransitionOutcome, WorkflowService};
pub use store::{MemoryStore, SledStore, UnitOfWork, WorkflowStore};
pub use summary::StatusSummary;
pub use transaction::{
    ItemDirection, Transaction, TransactionDraft, TransactionItem, TransactionStatus,
};
pub use types::{ItemId, PrincipalId, StoreroomId, TimeStamp, TransactionId, TransactionType};
