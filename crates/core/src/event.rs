//! Run events: progress notifications from the agent loop.
//!
//! The controller publishes; the CLI (or anything else) subscribes. Nothing
//! in the loop depends on a subscriber being present.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::broadcast;

use crate::trajectory::{RunId, RunStatus};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum RunEvent {
    /// A run was created or picked up for resumption
    RunStarted {
        run_id: RunId,
        instance_id: String,
        resumed_at_step: u32,
        timestamp: DateTime<Utc>,
    },

    /// An action was durably committed
    StepCommitted {
        run_id: RunId,
        step: u32,
        tool_name: String,
        success: bool,
        duration_ms: u64,
        timestamp: DateTime<Utc>,
    },

    /// The oracle failed and is being asked again
    OracleRetried {
        run_id: RunId,
        step: u32,
        attempt: u32,
        error_message: String,
        timestamp: DateTime<Utc>,
    },

    /// The run reached a terminal status
    RunFinished {
        run_id: RunId,
        status: RunStatus,
        steps: u32,
        timestamp: DateTime<Utc>,
    },
}

/// A broadcast-based event bus for run events.
pub struct EventBus {
    sender: broadcast::Sender<Arc<RunEvent>>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish an event to all subscribers.
    pub fn publish(&self, event: RunEvent) {
        // No subscribers is fine
        let _ = self.sender.send(Arc::new(event));
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Arc<RunEvent>> {
        self.sender.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}
