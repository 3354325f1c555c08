#![forbid(unsafe_code)]

//! Document model and runtime-expression grammar for Arazzo workflow
//! execution. Loading and validating raw spec text is a collaborator's
//! job; this crate only defines the shapes the engine consumes.

pub mod expr;
pub mod types;

pub use crate::expr::{
    apply_transforms, parse_expression, scan_template, ExprError, JsonPointer, JsonPointerError,
    PathSeg, RequestSource, RuntimeExpr, TemplateSegment, TransformError, ValuePath,
};
pub use crate::types::WorkflowDocument;
