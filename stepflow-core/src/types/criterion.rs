use crate::types::RuntimeExpression;

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Criterion {
    /// Runtime expression the condition is applied to (required for
    /// `regex` and `jsonpath` criteria).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<RuntimeExpression>,

    pub condition: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[serde(rename = "type")]
    pub kind: Option<CriterionKind>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CriterionKind {
    Simple,
    Regex,
    Jsonpath,
}
