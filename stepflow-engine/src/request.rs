//! Request construction: operation lookup, parameter placement, body
//! templating, and credential injection.

use std::collections::BTreeMap;
use std::time::Duration;

use serde_json::Value as JsonValue;
use stepflow_core::expr::{apply_transforms, TransformError};
use stepflow_core::types::{
    Parameter, ParameterLocation, SourceDescription, Step, WorkflowDocument,
};

use crate::auth::{AuthError, Credential, CredentialProvider};
use crate::context::ExecutionContext;
use crate::http::HttpRequest;
use crate::operation::{OperationLookupError, OperationRef, OperationResolver};
use crate::resolve::{resolve_scalar, resolve_value, ResolutionError};

#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error("step '{step_id}' names no operation")]
    NoOperation { step_id: String },
    #[error("step '{step_id}' does not name a source and the document declares several")]
    AmbiguousSource { step_id: String },
    #[error("step '{step_id}' references unknown source '{name}'")]
    UnknownSource { step_id: String, name: String },
    #[error(transparent)]
    Lookup(#[from] OperationLookupError),
    #[error(transparent)]
    Resolution(#[from] ResolutionError),
    #[error(transparent)]
    Transform(#[from] TransformError),
    #[error(transparent)]
    Auth(#[from] AuthError),
    #[error("path template references parameter '{{{name}}}' with no matching path parameter")]
    MissingPathParameter { name: String },
    #[error("invalid request url '{url}'")]
    InvalidUrl { url: String },
    #[error("body parameters require an object request body")]
    BodyNotObject,
    #[error("operation requires scheme '{scheme}' not declared by source '{source_name}'")]
    UnknownScheme {
        source_name: String,
        scheme: String,
    },
}

/// Build the outgoing request for an operation step. Everything that can
/// fail here fails before any byte leaves the process, so build failures
/// are routed through the step's `onFailure` actions like a failed
/// response would be.
pub async fn build_request(
    step: &Step,
    document: &WorkflowDocument,
    operations: &dyn OperationResolver,
    credentials: &CredentialProvider,
    ctx: &ExecutionContext,
    skew: Duration,
) -> Result<HttpRequest, BuildError> {
    let (source, op_ref) = locate_operation(step, document)?;
    let op = operations.resolve(&source.name, &op_ref)?;

    let mut path_params: BTreeMap<String, String> = BTreeMap::new();
    let mut query_params: Vec<(String, String)> = Vec::new();
    let mut headers: BTreeMap<String, String> = BTreeMap::new();
    let mut cookies: Vec<(String, String)> = Vec::new();
    let mut body_fields: Vec<(String, JsonValue)> = Vec::new();

    for param in &step.parameters {
        match param.location {
            Some(ParameterLocation::Path) => {
                let v = scalar_value(param, ctx)?;
                path_params.insert(param.name.clone(), v);
            }
            Some(ParameterLocation::Query) => {
                let v = scalar_value(param, ctx)?;
                query_params.push((param.name.clone(), v));
            }
            Some(ParameterLocation::Header) => {
                let v = scalar_value(param, ctx)?;
                headers.insert(param.name.clone(), v);
            }
            Some(ParameterLocation::Cookie) => {
                let v = scalar_value(param, ctx)?;
                cookies.push((param.name.clone(), v));
            }
            Some(ParameterLocation::Body) => {
                let v = match resolve_value(&param.value, ctx, None)? {
                    JsonValue::String(s) if !param.transforms.is_empty() => {
                        JsonValue::String(apply_transforms(&s, &param.transforms)?)
                    }
                    other => other,
                };
                body_fields.push((param.name.clone(), v));
            }
            // Location-less parameters belong to workflow-invoking steps
            // and never reach the request builder.
            None => {}
        }
    }

    let path = substitute_path(&op.path, &path_params)?;
    let raw = join_url(&source.base_url, &path);
    let mut url = url::Url::parse(&raw).map_err(|_| BuildError::InvalidUrl { url: raw })?;

    // Body template first, then body-located parameters merged on top.
    let mut body_json: Option<JsonValue> = None;
    let mut content_type: Option<String> = None;
    if let Some(rb) = &step.request_body {
        content_type = rb.content_type.clone();
        if let Some(payload) = &rb.payload {
            body_json = Some(resolve_value(payload, ctx, None)?);
        }
    }
    if !body_fields.is_empty() {
        let target = body_json.get_or_insert_with(|| JsonValue::Object(Default::default()));
        let map = target.as_object_mut().ok_or(BuildError::BodyNotObject)?;
        for (name, value) in body_fields {
            map.insert(name, value);
        }
    }

    // Credentials last so a parameter cannot clobber an injected header.
    for scheme_name in &op.security {
        let scheme = source
            .scheme(scheme_name)
            .ok_or_else(|| BuildError::UnknownScheme {
                source_name: source.name.clone(),
                scheme: scheme_name.clone(),
            })?;
        match credentials
            .credential_with_skew(&source.name, scheme, skew)
            .await?
        {
            Credential::Header { name, value } => {
                headers.insert(name, value.expose().to_string());
            }
            Credential::Query { name, value } => {
                query_params.push((name, value.expose().to_string()));
            }
            Credential::Cookie { name, value } => {
                cookies.push((name, value.expose().to_string()));
            }
        }
    }

    if !query_params.is_empty() {
        let mut pairs = url.query_pairs_mut();
        for (k, v) in &query_params {
            pairs.append_pair(k, v);
        }
    }

    if !cookies.is_empty() {
        let joined = cookies
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect::<Vec<_>>()
            .join("; ");
        headers.insert("Cookie".to_string(), joined);
    }

    let body = match &body_json {
        None => Vec::new(),
        Some(JsonValue::String(s)) if !is_json_content(content_type.as_deref()) => {
            // Non-JSON string payloads go out verbatim.
            s.clone().into_bytes()
        }
        Some(v) => v.to_string().into_bytes(),
    };
    if body_json.is_some() {
        headers
            .entry("Content-Type".to_string())
            .or_insert_with(|| content_type.unwrap_or_else(|| "application/json".to_string()));
    }

    Ok(HttpRequest {
        method: op.method.to_ascii_uppercase(),
        url,
        headers,
        body,
    })
}

/// Work out which source the step targets and the operation reference
/// within it. An `operationId` may carry an explicit
/// `$sourceDescriptions.<name>.<id>` prefix; an `operationPath` may carry
/// a `{$sourceDescriptions.<name>.url}#<pointer>` prefix. Without a
/// prefix the document's sole source is used.
fn locate_operation<'d>(
    step: &Step,
    document: &'d WorkflowDocument,
) -> Result<(&'d SourceDescription, OperationRef), BuildError> {
    if let Some(op_id) = &step.operation_id {
        if let Some(rest) = op_id.strip_prefix("$sourceDescriptions.") {
            let (name, id) = rest.split_once('.').ok_or_else(|| BuildError::UnknownSource {
                step_id: step.step_id.clone(),
                name: rest.to_string(),
            })?;
            let source = named_source(step, document, name)?;
            return Ok((source, OperationRef::Id(id.to_string())));
        }
        let source = sole_source(step, document)?;
        return Ok((source, OperationRef::Id(op_id.clone())));
    }

    if let Some(op_path) = &step.operation_path {
        let (prefix, pointer) = match op_path.split_once('#') {
            Some((p, frag)) => (p.trim(), frag),
            None => ("", op_path.as_str()),
        };
        if let Some(inner) = prefix
            .strip_prefix('{')
            .and_then(|s| s.strip_suffix('}'))
            .map(str::trim)
        {
            if let Some(rest) = inner.strip_prefix("$sourceDescriptions.") {
                let name = rest.strip_suffix(".url").unwrap_or(rest);
                let source = named_source(step, document, name)?;
                return Ok((source, OperationRef::Path(pointer.to_string())));
            }
        }
        let source = sole_source(step, document)?;
        return Ok((source, OperationRef::Path(pointer.to_string())));
    }

    Err(BuildError::NoOperation {
        step_id: step.step_id.clone(),
    })
}

/// Resolve a scalar-placed parameter and run its transform chain.
fn scalar_value(param: &Parameter, ctx: &ExecutionContext) -> Result<String, BuildError> {
    let v = resolve_scalar(&param.value, ctx, None, &param.name)?;
    if param.transforms.is_empty() {
        return Ok(v);
    }
    Ok(apply_transforms(&v, &param.transforms)?)
}

fn named_source<'d>(
    step: &Step,
    document: &'d WorkflowDocument,
    name: &str,
) -> Result<&'d SourceDescription, BuildError> {
    document.source(name).ok_or_else(|| BuildError::UnknownSource {
        step_id: step.step_id.clone(),
        name: name.to_string(),
    })
}

fn sole_source<'d>(
    step: &Step,
    document: &'d WorkflowDocument,
) -> Result<&'d SourceDescription, BuildError> {
    match document.source_descriptions.as_slice() {
        [only] => Ok(only),
        _ => Err(BuildError::AmbiguousSource {
            step_id: step.step_id.clone(),
        }),
    }
}

fn substitute_path(
    template: &str,
    params: &BTreeMap<String, String>,
) -> Result<String, BuildError> {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let after = &rest[open + 1..];
        let close = after.find('}').ok_or_else(|| BuildError::InvalidUrl {
            url: template.to_string(),
        })?;
        let name = &after[..close];
        let value = params
            .get(name)
            .ok_or_else(|| BuildError::MissingPathParameter {
                name: name.to_string(),
            })?;
        out.push_str(&urlencoding::encode(value));
        rest = &after[close + 1..];
    }
    out.push_str(rest);
    Ok(out)
}

fn join_url(base: &str, path: &str) -> String {
    let base = base.trim_end_matches('/');
    let path = path.trim_start_matches('/');
    format!("{base}/{path}")
}

fn is_json_content(content_type: Option<&str>) -> bool {
    match content_type {
        None => true,
        Some(ct) => {
            let ct = ct.to_ascii_lowercase();
            ct.contains("json")
        }
    }
}
