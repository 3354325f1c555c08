//! Runtime-expression resolution against a live execution context.
//!
//! Resolution is side-effect-free: the same expression against an
//! unmodified context always yields the same value.

use serde_json::Value as JsonValue;
use stepflow_core::expr::{
    parse_expression, scan_template, ExprError, PathSeg, RequestSource, RuntimeExpr,
    TemplateSegment, ValuePath,
};

use crate::context::{CapturedResponse, ExecutionContext};

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ResolutionError {
    #[error("invalid expression '{expr}': {source}")]
    Parse {
        expr: String,
        #[source]
        source: ExprError,
    },
    #[error("expression '{expr}' references unknown step '{step_id}'")]
    UnknownStep { expr: String, step_id: String },
    #[error("expression '{expr}' references unknown workflow '{workflow_id}'")]
    UnknownWorkflow { expr: String, workflow_id: String },
    #[error("expression '{expr}' references unknown source description '{name}'")]
    UnknownSource { expr: String, name: String },
    #[error("expression '{expr}' does not resolve to a value")]
    PathNotFound { expr: String },
    #[error("expression '{expr}' addresses a non-JSON response body")]
    BodyNotJson { expr: String },
    #[error("expression '{expr}' requires a response in scope")]
    NoResponse { expr: String },
    #[error("expression '{expr}' resolved to a non-scalar value")]
    NotScalar { expr: String },
    #[error("expression '{expr}' has no request context in this engine")]
    UnsupportedContext { expr: String },
}

/// Resolve a single runtime expression. `response` is the response of the
/// step currently being evaluated, if any; recorded step responses are
/// addressed through `$steps.<id>.response.*` instead.
pub fn resolve(
    expr: &str,
    ctx: &ExecutionContext,
    response: Option<&CapturedResponse>,
) -> Result<JsonValue, ResolutionError> {
    let parsed = parse_expression(expr).map_err(|source| ResolutionError::Parse {
        expr: expr.to_string(),
        source,
    })?;

    match parsed {
        RuntimeExpr::Url | RuntimeExpr::Method | RuntimeExpr::Request(_) => {
            Err(ResolutionError::UnsupportedContext {
                expr: expr.to_string(),
            })
        }
        RuntimeExpr::StatusCode => {
            let r = response.ok_or_else(|| ResolutionError::NoResponse {
                expr: expr.to_string(),
            })?;
            Ok(JsonValue::Number(r.status.into()))
        }
        RuntimeExpr::Response(source) => {
            let r = response.ok_or_else(|| ResolutionError::NoResponse {
                expr: expr.to_string(),
            })?;
            response_source(&source, r, expr)
        }
        RuntimeExpr::Inputs(path) => walk(ctx.inputs(), &path, expr),
        RuntimeExpr::StepOutput { step_id, path } => {
            let record = ctx.step(&step_id).ok_or_else(|| ResolutionError::UnknownStep {
                expr: expr.to_string(),
                step_id: step_id.clone(),
            })?;
            walk(&record.outputs, &path, expr)
        }
        RuntimeExpr::StepResponse { step_id, source } => {
            let record = ctx.step(&step_id).ok_or_else(|| ResolutionError::UnknownStep {
                expr: expr.to_string(),
                step_id: step_id.clone(),
            })?;
            response_source(&source, &record.response, expr)
        }
        RuntimeExpr::WorkflowOutput { workflow_id, path } => {
            let outputs = ctx.workflow_outputs(&workflow_id).ok_or_else(|| {
                ResolutionError::UnknownWorkflow {
                    expr: expr.to_string(),
                    workflow_id: workflow_id.clone(),
                }
            })?;
            walk(outputs, &path, expr)
        }
        RuntimeExpr::SourceDescription { name, field } => {
            let src = ctx.source(&name).ok_or_else(|| ResolutionError::UnknownSource {
                expr: expr.to_string(),
                name: name.clone(),
            })?;
            match field.as_str() {
                "name" => Ok(JsonValue::String(src.name.clone())),
                "url" => Ok(JsonValue::String(src.url.clone())),
                "baseUrl" => Ok(JsonValue::String(src.base_url.clone())),
                _ => Err(ResolutionError::PathNotFound {
                    expr: expr.to_string(),
                }),
            }
        }
    }
}

/// Resolve a literal-or-expression value recursively: full-string
/// expressions become the typed value; strings with embedded expressions
/// concatenate; arrays and objects resolve element-wise.
pub fn resolve_value(
    value: &JsonValue,
    ctx: &ExecutionContext,
    response: Option<&CapturedResponse>,
) -> Result<JsonValue, ResolutionError> {
    match value {
        JsonValue::Null | JsonValue::Bool(_) | JsonValue::Number(_) => Ok(value.clone()),
        JsonValue::String(s) => resolve_string(s, ctx, response),
        JsonValue::Array(items) => {
            let mut out = Vec::with_capacity(items.len());
            for item in items {
                out.push(resolve_value(item, ctx, response)?);
            }
            Ok(JsonValue::Array(out))
        }
        JsonValue::Object(map) => {
            let mut out = serde_json::Map::new();
            for (k, v) in map {
                out.insert(k.clone(), resolve_value(v, ctx, response)?);
            }
            Ok(JsonValue::Object(out))
        }
    }
}

/// Resolve an expression that must produce a scalar (header, query, or
/// path placement). Arrays and objects are a `NotScalar` error.
pub fn resolve_scalar(
    value: &JsonValue,
    ctx: &ExecutionContext,
    response: Option<&CapturedResponse>,
    site: &str,
) -> Result<String, ResolutionError> {
    let resolved = resolve_value(value, ctx, response)?;
    to_scalar(&resolved).ok_or_else(|| ResolutionError::NotScalar {
        expr: site.to_string(),
    })
}

fn resolve_string(
    s: &str,
    ctx: &ExecutionContext,
    response: Option<&CapturedResponse>,
) -> Result<JsonValue, ResolutionError> {
    let trimmed = s.trim();
    if trimmed.starts_with('$') && parse_expression(trimmed).is_ok() {
        return resolve(trimmed, ctx, response);
    }

    let segments = scan_template(s).map_err(|source| ResolutionError::Parse {
        expr: s.to_string(),
        source,
    })?;
    if segments.len() == 1 {
        if let TemplateSegment::Literal(lit) = &segments[0] {
            return Ok(JsonValue::String(lit.clone()));
        }
    }

    let mut out = String::new();
    for seg in segments {
        match seg {
            TemplateSegment::Literal(lit) => out.push_str(&lit),
            TemplateSegment::Expr(expr) => {
                let v = resolve(&expr, ctx, response)?;
                match v {
                    JsonValue::String(s) => out.push_str(&s),
                    JsonValue::Number(n) => out.push_str(&n.to_string()),
                    JsonValue::Bool(b) => out.push_str(if b { "true" } else { "false" }),
                    JsonValue::Null => {}
                    other => out.push_str(&other.to_string()),
                }
            }
        }
    }
    Ok(JsonValue::String(out))
}

fn walk(root: &JsonValue, path: &ValuePath, expr: &str) -> Result<JsonValue, ResolutionError> {
    let mut cur = root;
    for seg in &path.segments {
        cur = match seg {
            PathSeg::Key(k) => cur.get(k),
            PathSeg::Index(i) => cur.get(i),
        }
        .ok_or_else(|| ResolutionError::PathNotFound {
            expr: expr.to_string(),
        })?;
    }
    if let Some(ptr) = &path.pointer {
        cur = cur
            .pointer(ptr.as_str())
            .ok_or_else(|| ResolutionError::PathNotFound {
                expr: expr.to_string(),
            })?;
    }
    Ok(cur.clone())
}

fn response_source(
    source: &RequestSource,
    resp: &CapturedResponse,
    expr: &str,
) -> Result<JsonValue, ResolutionError> {
    match source {
        RequestSource::Header(name) => resp
            .header(name)
            .map(|v| JsonValue::String(v.to_string()))
            .ok_or_else(|| ResolutionError::PathNotFound {
                expr: expr.to_string(),
            }),
        RequestSource::Body(pointer) => {
            let json = resp
                .body_json
                .as_ref()
                .ok_or_else(|| ResolutionError::BodyNotJson {
                    expr: expr.to_string(),
                })?;
            match pointer {
                None => Ok(json.clone()),
                Some(ptr) => json
                    .pointer(ptr.as_str())
                    .cloned()
                    .ok_or_else(|| ResolutionError::PathNotFound {
                        expr: expr.to_string(),
                    }),
            }
        }
        RequestSource::Query(_) | RequestSource::Path(_) => {
            Err(ResolutionError::UnsupportedContext {
                expr: expr.to_string(),
            })
        }
    }
}

pub(crate) fn to_scalar(value: &JsonValue) -> Option<String> {
    match value {
        JsonValue::String(s) => Some(s.clone()),
        JsonValue::Number(n) => Some(n.to_string()),
        JsonValue::Bool(b) => Some(b.to_string()),
        JsonValue::Null => Some(String::new()),
        JsonValue::Array(_) | JsonValue::Object(_) => None,
    }
}
