use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::broadcast;

use crate::model::{AgentType, TaskStatus, WorkflowStatus};

const EVENT_CAPACITY: usize = 1000;

/// Lifecycle notifications published to in-process subscribers.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum FlowEvent {
    WorkflowCreated {
        workflow_id: String,
        task_count: usize,
        timestamp: DateTime<Utc>,
    },
    WorkflowStatusChanged {
        workflow_id: String,
        from: WorkflowStatus,
        to: WorkflowStatus,
        timestamp: DateTime<Utc>,
    },
    TaskStatusChanged {
        task_id: String,
        workflow_id: String,
        from: TaskStatus,
        to: TaskStatus,
        timestamp: DateTime<Utc>,
    },
    TaskReleased {
        task_id: String,
        workflow_id: String,
        agent_type: AgentType,
        timestamp: DateTime<Utc>,
    },
    WorkflowFinished {
        workflow_id: String,
        status: WorkflowStatus,
        timestamp: DateTime<Utc>,
    },
}

/// Broadcast fan-out for [`FlowEvent`]. Sends never block and are dropped when nobody listens.
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<FlowEvent>,
}

impl EventBus {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(EVENT_CAPACITY);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<FlowEvent> {
        self.tx.subscribe()
    }

    pub fn emit(&self, event: FlowEvent) {
        let _ = self.tx.send(event);
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn subscribers_receive_events() {
        let bus = EventBus::new();
        let mut rx = bus.subscribe();
        bus.emit(FlowEvent::WorkflowCreated {
            workflow_id: "w1".into(),
            task_count: 2,
            timestamp: Utc::now(),
        });
        match rx.recv().await.unwrap() {
            FlowEvent::WorkflowCreated { task_count, .. } => assert_eq!(task_count, 2),
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[test]
    fn emit_without_subscribers_is_silent() {
        EventBus::new().emit(FlowEvent::WorkflowFinished {
            workflow_id: "w1".into(),
            status: WorkflowStatus::Completed,
            timestamp: Utc::now(),
        });
    }
}
