use crate::types::{SourceDescription, Workflow};

/// A fully resolved workflow document as supplied by the document loader.
///
/// Immutable once constructed; the engine only reads it. Source
/// descriptions already carry their resolved base URL and security
/// schemes, so the engine never touches raw OpenAPI text.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct WorkflowDocument {
    #[serde(rename = "sourceDescriptions")]
    pub source_descriptions: Vec<SourceDescription>,

    pub workflows: Vec<Workflow>,
}

impl WorkflowDocument {
    pub fn workflow(&self, workflow_id: &str) -> Option<&Workflow> {
        self.workflows.iter().find(|w| w.workflow_id == workflow_id)
    }

    pub fn source(&self, name: &str) -> Option<&SourceDescription> {
        self.source_descriptions.iter().find(|s| s.name == name)
    }
}
