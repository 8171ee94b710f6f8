//! Outbound workflow events. Delivered after the unit of work has committed.
use super::registry::Stage;
use super::review::ReviewStatus;
use super::types::{PrincipalId, TransactionId, TransactionType};
use std::sync::Mutex;
use tracing::{info, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkflowEvent {
    Initiated {
        id: TransactionId,
        kind: TransactionType,
        by: PrincipalId,
    },
    ApprovalRecorded {
        id: TransactionId,
        stage: Stage,
        recorded: u32,
        required: u32,
        by: PrincipalId,
    },
    StageAdvanced {
        id: TransactionId,
        from: Stage,
        to: Stage,
        by: PrincipalId,
    },
    Committed {
        id: TransactionId,
        adjustments: usize,
    },
    ReviewChanged {
        id: TransactionId,
        from: ReviewStatus,
        to: ReviewStatus,
        by: PrincipalId,
    },
    Reversed {
        id: TransactionId,
        adjustments: usize,
        by: PrincipalId,
    },
    /// An operation failed; `reason` is the error's machine readable code.
    Refused {
        id: Option<TransactionId>,
        operation: &'static str,
        reason: &'static str,
        message: String,
        by: PrincipalId,
    },
}

pub trait NotificationSink: Send + Sync {
    fn notify(&self, event: &WorkflowEvent);
}

/// Writes events to the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl NotificationSink for TracingSink {
    fn notify(&self, event: &WorkflowEvent) {
        match event {
            WorkflowEvent::Refused {
                id,
                operation,
                reason,
                message,
                by,
            } => warn!(
                transaction = ?id,
                operation,
                reason,
                principal = %by,
                "{message}"
            ),
            other => info!(event = ?other, "workflow event"),
        }
    }
}

/// Keeps every event in memory.
#[derive(Debug, Default)]
pub struct MemorySink {
    events: Mutex<Vec<WorkflowEvent>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<WorkflowEvent> {
        self.events
            .lock()
            .map(|events| events.clone())
            .unwrap_or_default()
    }
}

impl NotificationSink for MemorySink {
    fn notify(&self, event: &WorkflowEvent) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event.clone());
        }
    }
}
