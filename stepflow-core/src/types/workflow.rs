use std::collections::BTreeMap;

use crate::types::{RuntimeExpression, Step};

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Workflow {
    #[serde(rename = "workflowId")]
    pub workflow_id: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,

    #[serde(default)]
    pub inputs: Vec<InputParameter>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    #[serde(rename = "dependsOn")]
    pub depends_on: Vec<String>,

    pub steps: Vec<Step>,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub outputs: BTreeMap<String, RuntimeExpression>,
}

impl Workflow {
    pub fn step_index(&self, step_id: &str) -> Option<usize> {
        self.steps.iter().position(|s| s.step_id == step_id)
    }
}

/// A declared workflow input: name, expected kind, and whether a run may
/// start without it.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct InputParameter {
    pub name: String,

    #[serde(default, rename = "type")]
    pub kind: InputKind,

    #[serde(default)]
    pub required: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InputKind {
    String,
    Number,
    Boolean,
    Object,
    Array,
    #[default]
    Any,
}

impl InputKind {
    pub fn matches(&self, value: &serde_json::Value) -> bool {
        match self {
            InputKind::String => value.is_string(),
            InputKind::Number => value.is_number(),
            InputKind::Boolean => value.is_boolean(),
            InputKind::Object => value.is_object(),
            InputKind::Array => value.is_array(),
            InputKind::Any => true,
        }
    }
}
