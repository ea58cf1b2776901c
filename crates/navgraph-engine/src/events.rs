//! Validation progress events.
//!
//! Emits [`ValidationEvent`]s via a [`tokio::sync::broadcast`] channel so that
//! observers (CLI progress output, loggers, a UI) can follow a run without
//! coupling to the engine internals.

use navgraph_types::HealthRating;
use serde::{Deserialize, Serialize};

/// Status carried by a [`ValidationEvent::StepProgress`] event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Started,
    Passed,
    Failed,
    Skipped,
}

impl std::fmt::Display for StepStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            StepStatus::Started => "started",
            StepStatus::Passed => "passed",
            StepStatus::Failed => "failed",
            StepStatus::Skipped => "skipped",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ValidationEvent {
    RunStarted {
        run_id: String,
        node_count: usize,
        total_steps: usize,
    },
    StepProgress {
        current_step: usize,
        total_steps: usize,
        from_node: String,
        to_node: String,
        status: StepStatus,
    },
    NodeValidated {
        node_id: String,
        used_retry: bool,
    },
    NodeFailed {
        node_id: String,
        error: String,
    },
    NodeSkipped {
        node_id: String,
        reason: String,
    },
    TransitionRetrying {
        from_node: String,
        to_node: String,
    },
    DependentsAborted {
        node_id: String,
        aborted: Vec<String>,
    },
    RunCompleted {
        run_id: String,
        validated: usize,
        failed: usize,
        skipped: usize,
        health: HealthRating,
        duration_ms: u64,
    },
    RunCancelled {
        run_id: String,
        completed_steps: usize,
    },
}

/// Event emitter wrapping a broadcast sender.
#[derive(Clone)]
pub struct EventEmitter {
    sender: tokio::sync::broadcast::Sender<ValidationEvent>,
}

impl EventEmitter {
    /// Create a new emitter with the given channel capacity.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = tokio::sync::broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Emit an event to all current subscribers.
    ///
    /// If there are no active receivers the event is silently dropped.
    pub fn emit(&self, event: ValidationEvent) {
        let _ = self.sender.send(event);
    }

    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<ValidationEvent> {
        self.sender.subscribe()
    }
}

impl Default for EventEmitter {
    fn default() -> Self {
        Self::new(256)
    }
}
