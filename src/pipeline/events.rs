//! Stage events — broadcast fan-out of pipeline progress to WebSocket clients.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::trace;
use uuid::Uuid;

use super::types::{ClassificationResponse, Step};

/// Default broadcast channel capacity.
const DEFAULT_BROADCAST_CAPACITY: usize = 256;

/// Messages sent over WebSocket (server → client).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StageEvent {
    /// A step began.
    StageStarted {
        run_id: Uuid,
        step: Step,
        at: DateTime<Utc>,
    },
    /// A step ended. `escalated` is set for classification gates.
    StageFinished {
        run_id: Uuid,
        step: Step,
        label: Option<String>,
        confidence: Option<f32>,
        escalated: Option<bool>,
        at: DateTime<Utc>,
    },
    /// The run produced its result.
    RunCompleted {
        run_id: Uuid,
        result: ClassificationResponse,
        at: DateTime<Utc>,
    },
    /// Reply to a client `ping`.
    Pong,
}

impl StageEvent {
    pub fn started(run_id: Uuid, step: Step) -> Self {
        Self::StageStarted {
            run_id,
            step,
            at: Utc::now(),
        }
    }

    pub fn finished(run_id: Uuid, step: Step) -> Self {
        Self::StageFinished {
            run_id,
            step,
            label: None,
            confidence: None,
            escalated: None,
            at: Utc::now(),
        }
    }

    pub fn gate_finished(
        run_id: Uuid,
        step: Step,
        label: Option<String>,
        confidence: Option<f32>,
        escalated: bool,
    ) -> Self {
        Self::StageFinished {
            run_id,
            step,
            label,
            confidence,
            escalated: Some(escalated),
            at: Utc::now(),
        }
    }

    pub fn completed(run_id: Uuid, result: ClassificationResponse) -> Self {
        Self::RunCompleted {
            run_id,
            result,
            at: Utc::now(),
        }
    }
}

/// Broadcast hub for stage events.
pub struct EventHub {
    tx: broadcast::Sender<StageEvent>,
}

impl EventHub {
    pub fn new() -> Arc<Self> {
        Self::with_capacity(DEFAULT_BROADCAST_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Arc<Self> {
        let (tx, _rx) = broadcast::channel(capacity);
        Arc::new(Self { tx })
    }

    /// Subscribe to stage events. Each WS client calls this.
    pub fn subscribe(&self) -> broadcast::Receiver<StageEvent> {
        self.tx.subscribe()
    }

    /// Broadcast an event. Never blocks; dropped if nobody is listening.
    pub fn publish(&self, event: StageEvent) {
        if self.tx.send(event).is_err() {
            trace!("No stage event subscribers");
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}
