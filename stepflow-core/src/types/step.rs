use std::collections::BTreeMap;

use crate::types::{
    Criterion, FailureAction, Parameter, RequestBody, RuntimeExpression, SuccessAction,
};

/// One step of a workflow. Exactly one of `operation_id`, `operation_path`,
/// or `workflow_id` designates what the step invokes; the loader is
/// expected to have rejected documents violating that.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Step {
    #[serde(rename = "stepId")]
    pub step_id: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[serde(rename = "operationId")]
    pub operation_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[serde(rename = "operationPath")]
    pub operation_path: Option<String>,

    /// Invoke another workflow of the same document instead of an operation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[serde(rename = "workflowId")]
    pub workflow_id: Option<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub parameters: Vec<Parameter>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[serde(rename = "requestBody")]
    pub request_body: Option<RequestBody>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    #[serde(rename = "successCriteria")]
    pub success_criteria: Vec<Criterion>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    #[serde(rename = "onSuccess")]
    pub on_success: Vec<SuccessAction>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    #[serde(rename = "onFailure")]
    pub on_failure: Vec<FailureAction>,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub outputs: BTreeMap<String, RuntimeExpression>,
}
