use crate::types::AnyValue;

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Parameter {
    pub name: String,

    /// Where the value lands in the outgoing request. `None` is only
    /// meaningful on steps invoking a workflow, where parameters become
    /// that workflow's inputs.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[serde(rename = "in")]
    pub location: Option<ParameterLocation>,

    /// Literal or runtime-expression value (expressions may be embedded
    /// in strings).
    pub value: AnyValue,

    /// `x-transform` extension: transforms applied in order to the
    /// resolved value before placement.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    #[serde(rename = "x-transform")]
    pub transforms: Vec<ValueTransform>,
}

/// One `x-transform` entry. A regex transform matches `pattern` against
/// the current value and rebuilds it from `result`, which may reference
/// capture groups as `\1` or `\<name>` (`\\` escapes the backslash). A
/// pattern that does not match leaves the value unchanged.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ValueTransform {
    Regex {
        pattern: String,
        result: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        description: Option<String>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParameterLocation {
    Path,
    Query,
    Header,
    Cookie,
    /// Merged as a field into the JSON request body.
    Body,
}
