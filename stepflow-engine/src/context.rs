use std::collections::BTreeMap;

use serde_json::Value as JsonValue;
use stepflow_core::types::SourceDescription;

/// Mutable state of one workflow run. Exclusively owned by that run; the
/// only state shared across runs lives in the credential provider.
#[derive(Debug, Clone)]
pub struct ExecutionContext {
    /// Resolved input values, immutable after run start.
    inputs: JsonValue,
    /// Last response and extracted outputs per executed step. A step
    /// re-entered via `retry` or `goto` overwrites its own entry only.
    steps: BTreeMap<String, StepRecord>,
    /// Outputs of completed workflows: sub-workflows invoked by steps,
    /// plus any dependency outputs seeded by the caller.
    workflows: BTreeMap<String, JsonValue>,
    /// Source descriptions of the document, for `$sourceDescriptions.*`.
    sources: BTreeMap<String, SourceDescription>,
}

#[derive(Debug, Clone)]
pub struct StepRecord {
    pub response: CapturedResponse,
    pub outputs: JsonValue,
}

/// A response snapshot kept for expression resolution.
#[derive(Debug, Clone)]
pub struct CapturedResponse {
    pub status: u16,
    pub headers: BTreeMap<String, String>,
    pub body: Vec<u8>,
    pub body_json: Option<JsonValue>,
}

impl CapturedResponse {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

impl ExecutionContext {
    pub fn new(inputs: JsonValue, sources: &[SourceDescription]) -> Self {
        Self {
            inputs,
            steps: BTreeMap::new(),
            workflows: BTreeMap::new(),
            sources: sources
                .iter()
                .map(|s| (s.name.clone(), s.clone()))
                .collect(),
        }
    }

    pub fn inputs(&self) -> &JsonValue {
        &self.inputs
    }

    pub fn step(&self, step_id: &str) -> Option<&StepRecord> {
        self.steps.get(step_id)
    }

    /// Record a step's response and outputs, replacing any earlier entry
    /// for the same step.
    pub fn record_step(&mut self, step_id: &str, response: CapturedResponse, outputs: JsonValue) {
        self.steps
            .insert(step_id.to_string(), StepRecord { response, outputs });
    }

    pub fn workflow_outputs(&self, workflow_id: &str) -> Option<&JsonValue> {
        self.workflows.get(workflow_id)
    }

    pub fn record_workflow_outputs(&mut self, workflow_id: &str, outputs: JsonValue) {
        self.workflows.insert(workflow_id.to_string(), outputs);
    }

    pub fn source(&self, name: &str) -> Option<&SourceDescription> {
        self.sources.get(name)
    }
}
