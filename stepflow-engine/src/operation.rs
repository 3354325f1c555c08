//! Operation lookup boundary.
//!
//! Mapping an `operationId` or `operationPath` to a concrete method and
//! URL template belongs to a collaborator that has read the source's API
//! document. A lookup miss fails the step before any request is sent.

use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OperationRef {
    /// `operationId`, without any `$sourceDescriptions.<name>.` prefix.
    Id(String),
    /// `operationPath` JSON pointer into the source document, e.g.
    /// `/paths/~1login/post`.
    Path(String),
}

/// What the engine needs to call an operation: verb, path template with
/// `{param}` placeholders, and the names of the security schemes the
/// operation requires.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedOperation {
    pub method: String,
    pub path: String,
    pub security: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum OperationLookupError {
    #[error("operation '{reference}' not found in source '{source_name}'")]
    NotFound {
        source_name: String,
        reference: String,
    },
}

pub trait OperationResolver: Send + Sync {
    fn resolve(
        &self,
        source: &str,
        reference: &OperationRef,
    ) -> Result<ResolvedOperation, OperationLookupError>;
}

/// Table-backed resolver for embedders that precompute their operations
/// (and for tests).
#[derive(Debug, Default)]
pub struct StaticOperationResolver {
    by_id: BTreeMap<(String, String), ResolvedOperation>,
    by_path: BTreeMap<(String, String), ResolvedOperation>,
}

impl StaticOperationResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_operation(
        mut self,
        source: &str,
        operation_id: &str,
        op: ResolvedOperation,
    ) -> Self {
        self.by_id
            .insert((source.to_string(), operation_id.to_string()), op);
        self
    }

    pub fn with_operation_path(mut self, source: &str, pointer: &str, op: ResolvedOperation) -> Self {
        self.by_path
            .insert((source.to_string(), pointer.to_string()), op);
        self
    }
}

impl OperationResolver for StaticOperationResolver {
    fn resolve(
        &self,
        source: &str,
        reference: &OperationRef,
    ) -> Result<ResolvedOperation, OperationLookupError> {
        let found = match reference {
            OperationRef::Id(id) => self.by_id.get(&(source.to_string(), id.clone())),
            OperationRef::Path(p) => self.by_path.get(&(source.to_string(), p.clone())),
        };
        found.cloned().ok_or_else(|| OperationLookupError::NotFound {
            source_name: source.to_string(),
            reference: match reference {
                OperationRef::Id(id) => id.clone(),
                OperationRef::Path(p) => p.clone(),
            },
        })
    }
}
