use std::sync::LazyLock;

use regex::Regex;

use super::pointer::{JsonPointer, JsonPointerError};

static NAME_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9_\-]+$").expect("valid regex"));

// RFC 9110 token characters, for header names.
static TCHAR_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[!#$%&'*+\-.^_`|~0-9A-Za-z]+$").expect("valid regex"));

/// A parsed runtime expression. Parsing is purely syntactic; resolution
/// against a live execution context happens in the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RuntimeExpr {
    Url,
    Method,
    StatusCode,
    Request(RequestSource),
    Response(RequestSource),
    Inputs(ValuePath),
    StepOutput { step_id: String, path: ValuePath },
    StepResponse { step_id: String, source: RequestSource },
    WorkflowOutput { workflow_id: String, path: ValuePath },
    SourceDescription { name: String, field: String },
}

/// A part of a request or response addressed by an expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestSource {
    Header(String),
    Query(String),
    Path(String),
    Body(Option<JsonPointer>),
}

/// Dot- or bracket-indexed path into a JSON value, with an optional
/// trailing JSON-pointer fragment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValuePath {
    pub segments: Vec<PathSeg>,
    pub pointer: Option<JsonPointer>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathSeg {
    Key(String),
    Index(usize),
}

pub fn parse_expression(input: &str) -> Result<RuntimeExpr, ExprError> {
    let s = input.trim();
    let body = s.strip_prefix('$').ok_or(ExprError::MissingPrefix)?;

    let (head, pointer) = match body.split_once('#') {
        Some((h, frag)) => (h, Some(JsonPointer::parse(frag)?)),
        None => (body, None),
    };

    let (root, rest) = match head.split_once('.') {
        Some((r, rest)) => (r, Some(rest)),
        None => (head, None),
    };

    match (root, rest) {
        ("url", None) => bare(RuntimeExpr::Url, pointer),
        ("method", None) => bare(RuntimeExpr::Method, pointer),
        ("statusCode", None) => bare(RuntimeExpr::StatusCode, pointer),
        ("request", Some(rest)) => Ok(RuntimeExpr::Request(parse_source(rest, pointer)?)),
        ("response", Some(rest)) => Ok(RuntimeExpr::Response(parse_source(rest, pointer)?)),
        ("inputs", Some(rest)) => Ok(RuntimeExpr::Inputs(parse_path(rest, pointer, false)?)),
        ("steps", Some(rest)) => parse_step(rest, pointer),
        ("workflows", Some(rest)) => parse_workflow(rest, pointer),
        ("sourceDescriptions", Some(rest)) => {
            let (name, field) = rest
                .split_once('.')
                .ok_or_else(|| ExprError::Unrecognized(s.to_string()))?;
            validate_name(name)?;
            validate_name(field)?;
            if pointer.is_some() {
                return Err(ExprError::PointerNotAllowed);
            }
            Ok(RuntimeExpr::SourceDescription {
                name: name.to_string(),
                field: field.to_string(),
            })
        }
        _ => Err(ExprError::Unrecognized(s.to_string())),
    }
}

fn bare(expr: RuntimeExpr, pointer: Option<JsonPointer>) -> Result<RuntimeExpr, ExprError> {
    if pointer.is_some() {
        return Err(ExprError::PointerNotAllowed);
    }
    Ok(expr)
}

fn parse_step(rest: &str, pointer: Option<JsonPointer>) -> Result<RuntimeExpr, ExprError> {
    let (step_id, tail) = rest
        .split_once('.')
        .ok_or_else(|| ExprError::Unrecognized(format!("$steps.{rest}")))?;
    validate_name(step_id)?;

    let (section, tail) = match tail.split_once('.') {
        Some((sec, t)) => (sec, Some(t)),
        None => (tail, None),
    };
    match section {
        // `$steps.<id>.outputs` with no further path addresses the whole
        // outputs object.
        "outputs" => Ok(RuntimeExpr::StepOutput {
            step_id: step_id.to_string(),
            path: parse_path(tail.unwrap_or(""), pointer, true)?,
        }),
        "response" => {
            let tail = tail.ok_or_else(|| {
                ExprError::InvalidSource(format!("$steps.{step_id}.response"))
            })?;
            Ok(RuntimeExpr::StepResponse {
                step_id: step_id.to_string(),
                source: parse_source(tail, pointer)?,
            })
        }
        other => Err(ExprError::Unrecognized(format!(
            "$steps.{step_id}.{other}"
        ))),
    }
}

fn parse_workflow(rest: &str, pointer: Option<JsonPointer>) -> Result<RuntimeExpr, ExprError> {
    let (workflow_id, tail) = rest
        .split_once('.')
        .ok_or_else(|| ExprError::Unrecognized(format!("$workflows.{rest}")))?;
    validate_name(workflow_id)?;

    let (section, tail) = match tail.split_once('.') {
        Some((sec, t)) => (sec, Some(t)),
        None => (tail, None),
    };
    if section != "outputs" {
        return Err(ExprError::Unrecognized(format!(
            "$workflows.{workflow_id}.{section}"
        )));
    }
    Ok(RuntimeExpr::WorkflowOutput {
        workflow_id: workflow_id.to_string(),
        path: parse_path(tail.unwrap_or(""), pointer, true)?,
    })
}

fn parse_source(rest: &str, pointer: Option<JsonPointer>) -> Result<RequestSource, ExprError> {
    if let Some(token) = rest.strip_prefix("header.") {
        if token.is_empty() || !TCHAR_RE.is_match(token) {
            return Err(ExprError::InvalidHeaderToken(token.to_string()));
        }
        if pointer.is_some() {
            return Err(ExprError::PointerNotAllowed);
        }
        return Ok(RequestSource::Header(token.to_string()));
    }
    if let Some(name) = rest.strip_prefix("query.") {
        validate_name(name)?;
        if pointer.is_some() {
            return Err(ExprError::PointerNotAllowed);
        }
        return Ok(RequestSource::Query(name.to_string()));
    }
    if let Some(name) = rest.strip_prefix("path.") {
        validate_name(name)?;
        if pointer.is_some() {
            return Err(ExprError::PointerNotAllowed);
        }
        return Ok(RequestSource::Path(name.to_string()));
    }
    if rest == "body" {
        return Ok(RequestSource::Body(pointer));
    }
    Err(ExprError::InvalidSource(rest.to_string()))
}

fn parse_path(
    rest: &str,
    pointer: Option<JsonPointer>,
    allow_empty: bool,
) -> Result<ValuePath, ExprError> {
    if rest.is_empty() {
        if !allow_empty {
            return Err(ExprError::EmptyName);
        }
        return Ok(ValuePath {
            segments: Vec::new(),
            pointer,
        });
    }

    let mut segments = Vec::new();
    for part in rest.split('.') {
        if part.is_empty() {
            return Err(ExprError::EmptyName);
        }
        let (name, mut brackets) = match part.find('[') {
            Some(i) => (&part[..i], &part[i..]),
            None => (part, ""),
        };
        if !name.is_empty() {
            validate_name(name)?;
            segments.push(PathSeg::Key(name.to_string()));
        }
        while !brackets.is_empty() {
            let inner = brackets
                .strip_prefix('[')
                .ok_or_else(|| ExprError::InvalidName(part.to_string()))?;
            let close = inner
                .find(']')
                .ok_or_else(|| ExprError::UnclosedIndex(part.to_string()))?;
            let idx: usize = inner[..close]
                .parse()
                .map_err(|_| ExprError::InvalidIndex(part.to_string()))?;
            segments.push(PathSeg::Index(idx));
            brackets = &inner[close + 1..];
        }
    }

    Ok(ValuePath { segments, pointer })
}

fn validate_name(name: &str) -> Result<(), ExprError> {
    if name.is_empty() {
        return Err(ExprError::EmptyName);
    }
    if !NAME_RE.is_match(name) {
        return Err(ExprError::InvalidName(name.to_string()));
    }
    Ok(())
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ExprError {
    #[error("runtime expression must start with '$'")]
    MissingPrefix,
    #[error("unrecognized runtime expression: {0}")]
    Unrecognized(String),
    #[error("invalid source reference: {0}")]
    InvalidSource(String),
    #[error("name segment must not be empty")]
    EmptyName,
    #[error("invalid name segment: {0}")]
    InvalidName(String),
    #[error("invalid header token: {0}")]
    InvalidHeaderToken(String),
    #[error("invalid array index in: {0}")]
    InvalidIndex(String),
    #[error("unclosed array index in: {0}")]
    UnclosedIndex(String),
    #[error("json pointer not allowed here")]
    PointerNotAllowed,
    #[error(transparent)]
    Pointer(#[from] JsonPointerError),
    #[error("unclosed embedded expression (missing '}}')")]
    UnclosedExpression,
}
