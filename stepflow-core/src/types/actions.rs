use crate::types::Criterion;

/// Control-flow directive consulted after a step passes its success
/// criteria. The first action whose criteria all hold (an empty criteria
/// list holds unconditionally) decides the transition.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct SuccessAction {
    pub name: String,

    #[serde(rename = "type")]
    pub action: SuccessActionType,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[serde(rename = "stepId")]
    pub step_id: Option<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub criteria: Vec<Criterion>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SuccessActionType {
    End,
    Goto,
}

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct FailureAction {
    pub name: String,

    #[serde(rename = "type")]
    pub action: FailureActionType,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[serde(rename = "stepId")]
    pub step_id: Option<String>,

    /// Seconds to wait before re-entering the step. Falls back to the
    /// run's default retry interval when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[serde(rename = "retryAfter")]
    pub retry_after_seconds: Option<f64>,

    /// Total number of attempts the step may make, the first included.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[serde(rename = "retryLimit")]
    pub retry_limit: Option<u32>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub criteria: Vec<Criterion>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FailureActionType {
    End,
    Retry,
    Goto,
}
