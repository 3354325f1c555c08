use crate::types::SecurityScheme;

/// A named external API document, with the pieces of it the engine needs
/// already resolved by the loader: a base URL to build requests against
/// and the security schemes declared for its operations.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct SourceDescription {
    pub name: String,

    /// Original location of the API document (for `$sourceDescriptions.<name>.url`).
    pub url: String,

    #[serde(rename = "baseUrl")]
    pub base_url: String,

    #[serde(default)]
    pub security: Vec<SecurityScheme>,
}

impl SourceDescription {
    pub fn scheme(&self, name: &str) -> Option<&SecurityScheme> {
        self.security.iter().find(|s| s.name == name)
    }
}
