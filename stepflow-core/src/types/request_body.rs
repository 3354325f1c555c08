use crate::types::AnyValue;

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct RequestBody {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[serde(rename = "contentType")]
    pub content_type: Option<String>,

    /// Body template; object/array/string literals may embed runtime
    /// expressions, resolved recursively at build time.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<AnyValue>,
}
