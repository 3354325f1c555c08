mod pointer;
mod runtime;
mod template;
mod transform;

pub use pointer::{JsonPointer, JsonPointerError};
pub use runtime::{
    parse_expression, ExprError, PathSeg, RequestSource, RuntimeExpr, ValuePath,
};
pub use template::{scan_template, TemplateSegment};
pub use transform::{apply_transforms, TransformError};
