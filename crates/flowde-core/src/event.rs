use crate::types::{AssignmentId, InsertionMode, StepId};

/// Graph change notification, published after the owning transaction commits.
#[derive(Debug, Clone, PartialEq)]
pub enum GraphEvent {
    AssignmentCreated {
        assignment_id: AssignmentId,
        steps: usize,
    },
    AssignmentDeleted {
        assignment_id: AssignmentId,
    },
    StepInserted {
        assignment_id: AssignmentId,
        step_id: StepId,
        mode: InsertionMode,
    },
    ChainInserted {
        assignment_id: AssignmentId,
        reference: StepId,
        steps: Vec<StepId>,
    },
    StepDeleted {
        assignment_id: AssignmentId,
        step_id: StepId,
        promoted: Option<StepId>,
    },
    StepUpdated {
        assignment_id: AssignmentId,
        step_id: StepId,
    },
    Connected {
        assignment_id: AssignmentId,
        from_step: StepId,
        to_step: StepId,
    },
}

impl GraphEvent {
    pub fn assignment_id(&self) -> AssignmentId {
        match self {
            Self::AssignmentCreated { assignment_id, .. }
            | Self::AssignmentDeleted { assignment_id }
            | Self::StepInserted { assignment_id, .. }
            | Self::ChainInserted { assignment_id, .. }
            | Self::StepDeleted { assignment_id, .. }
            | Self::StepUpdated { assignment_id, .. }
            | Self::Connected { assignment_id, .. } => *assignment_id,
        }
    }
}

/// Broadcast bus for committed graph changes.
/// All subscribers receive all events.
pub struct EventBus {
    tx: tokio::sync::broadcast::Sender<GraphEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = tokio::sync::broadcast::channel(capacity);
        Self { tx }
    }

    pub fn publish(&self, event: GraphEvent) {
        // Ignore error if no receivers
        let _ = self.tx.send(event);
    }

    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<GraphEvent> {
        self.tx.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}
