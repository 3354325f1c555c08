mod actions;
mod common;
mod criterion;
mod document;
mod parameter;
mod request_body;
mod security;
mod source;
mod step;
mod workflow;

pub use actions::{FailureAction, FailureActionType, SuccessAction, SuccessActionType};
pub use common::{AnyValue, RuntimeExpression};
pub use criterion::{Criterion, CriterionKind};
pub use document::WorkflowDocument;
pub use parameter::{Parameter, ParameterLocation, ValueTransform};
pub use request_body::RequestBody;
pub use security::{ApiKeyLocation, OAuth2Grant, SecurityScheme, SecuritySchemeKind};
pub use source::SourceDescription;
pub use step::Step;
pub use workflow::{InputKind, InputParameter, Workflow};
