use async_trait::async_trait;
use serde_json::json;
use uuid::Uuid;

use crate::runner::RunStatus;

#[derive(Debug, Clone)]
pub enum Event {
    RunStarted {
        run_id: Uuid,
        workflow_id: String,
    },
    RunFinished {
        run_id: Uuid,
        status: RunStatus,
    },
    StepStarted {
        run_id: Uuid,
        step_id: String,
    },
    AttemptStarted {
        run_id: Uuid,
        step_id: String,
        attempt: u32,
    },
    AttemptFinished {
        run_id: Uuid,
        step_id: String,
        attempt: u32,
        succeeded: bool,
    },
    StepSucceeded {
        run_id: Uuid,
        step_id: String,
    },
    StepFailed {
        run_id: Uuid,
        step_id: String,
        reason: String,
    },
    RetryScheduled {
        run_id: Uuid,
        step_id: String,
        delay_ms: u64,
    },
}

#[async_trait]
pub trait EventSink: Send + Sync {
    async fn emit(&self, event: Event);
}

pub struct NoOpEventSink;

#[async_trait]
impl EventSink for NoOpEventSink {
    async fn emit(&self, _event: Event) {}
}

/// Emits one JSON object per line, the engine's structured log surface.
pub struct StdoutEventSink;

#[async_trait]
impl EventSink for StdoutEventSink {
    async fn emit(&self, event: Event) {
        let json = match event {
            Event::RunStarted { run_id, workflow_id } => {
                json!({"type": "run.started", "run_id": run_id.to_string(), "workflow_id": workflow_id})
            }
            Event::RunFinished { run_id, status } => {
                json!({"type": "run.finished", "run_id": run_id.to_string(), "status": status.as_str()})
            }
            Event::StepStarted { run_id, step_id } => {
                json!({"type": "step.started", "run_id": run_id.to_string(), "step_id": step_id})
            }
            Event::AttemptStarted { run_id, step_id, attempt } => {
                json!({"type": "attempt.started", "run_id": run_id.to_string(), "step_id": step_id, "attempt": attempt})
            }
            Event::AttemptFinished { run_id, step_id, attempt, succeeded } => {
                json!({"type": "attempt.finished", "run_id": run_id.to_string(), "step_id": step_id, "attempt": attempt, "succeeded": succeeded})
            }
            Event::StepSucceeded { run_id, step_id } => {
                json!({"type": "step.succeeded", "run_id": run_id.to_string(), "step_id": step_id})
            }
            Event::StepFailed { run_id, step_id, reason } => {
                json!({"type": "step.failed", "run_id": run_id.to_string(), "step_id": step_id, "reason": reason})
            }
            Event::RetryScheduled { run_id, step_id, delay_ms } => {
                json!({"type": "step.retry_scheduled", "run_id": run_id.to_string(), "step_id": step_id, "delay_ms": delay_ms})
            }
        };
        println!("{}", serde_json::to_string(&json).unwrap_or_default());
    }
}

#[derive(Default)]
pub struct CompositeEventSink {
    sinks: Vec<Box<dyn EventSink>>,
}

impl CompositeEventSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, sink: Box<dyn EventSink>) {
        self.sinks.push(sink);
    }
}

#[async_trait]
impl EventSink for CompositeEventSink {
    async fn emit(&self, event: Event) {
        for sink in &self.sinks {
            sink.emit(event.clone()).await;
        }
    }
}
