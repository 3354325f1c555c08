mod common;

use std::collections::BTreeMap;

use serde_json::json;
use stepflow_engine::{
    resolve, resolve_scalar, resolve_value, CapturedResponse, ExecutionContext, ResolutionError,
};

fn response(status: u16, body: serde_json::Value) -> CapturedResponse {
    CapturedResponse {
        status,
        headers: {
            let mut h = BTreeMap::new();
            h.insert("X-Request-Id".to_string(), "req-1".to_string());
            h
        },
        body: body.to_string().into_bytes(),
        body_json: Some(body),
    }
}

fn context() -> ExecutionContext {
    let mut ctx = ExecutionContext::new(
        json!({"username": "amel", "limits": {"max": 5}, "tags": ["a", "b"]}),
        &[common::source()],
    );
    ctx.record_step(
        "login",
        response(200, json!({"token": "abc", "user": {"id": 42}})),
        json!({"token": "abc"}),
    );
    ctx.record_workflow_outputs("setup", json!({"session": "s-1"}));
    ctx
}

#[test]
fn inputs_steps_workflows_and_sources_resolve() {
    let ctx = context();

    assert_eq!(resolve("$inputs.username", &ctx, None).unwrap(), json!("amel"));
    assert_eq!(resolve("$inputs.limits.max", &ctx, None).unwrap(), json!(5));
    assert_eq!(resolve("$inputs.tags[1]", &ctx, None).unwrap(), json!("b"));
    assert_eq!(
        resolve("$steps.login.outputs.token", &ctx, None).unwrap(),
        json!("abc")
    );
    assert_eq!(
        resolve("$steps.login.response.body#/user/id", &ctx, None).unwrap(),
        json!(42)
    );
    assert_eq!(
        resolve("$steps.login.response.header.X-Request-Id", &ctx, None).unwrap(),
        json!("req-1")
    );
    assert_eq!(
        resolve("$workflows.setup.outputs.session", &ctx, None).unwrap(),
        json!("s-1")
    );
    assert_eq!(
        resolve("$sourceDescriptions.api.baseUrl", &ctx, None).unwrap(),
        json!("https://api.test")
    );
}

#[test]
fn current_response_expressions_need_a_response() {
    let ctx = context();
    let resp = response(201, json!({"id": 9}));

    assert_eq!(
        resolve("$statusCode", &ctx, Some(&resp)).unwrap(),
        json!(201)
    );
    assert_eq!(
        resolve("$response.body#/id", &ctx, Some(&resp)).unwrap(),
        json!(9)
    );
    assert!(matches!(
        resolve("$statusCode", &ctx, None),
        Err(ResolutionError::NoResponse { .. })
    ));
}

#[test]
fn resolution_is_idempotent() {
    let ctx = context();
    let a = resolve("$steps.login.outputs.token", &ctx, None).unwrap();
    let b = resolve("$steps.login.outputs.token", &ctx, None).unwrap();
    assert_eq!(a, b);
}

#[test]
fn each_error_subtype_surfaces() {
    let ctx = context();

    assert!(matches!(
        resolve("$steps.nope.outputs.x", &ctx, None),
        Err(ResolutionError::UnknownStep { ref step_id, .. }) if step_id == "nope"
    ));
    assert!(matches!(
        resolve("$workflows.nope.outputs.x", &ctx, None),
        Err(ResolutionError::UnknownWorkflow { .. })
    ));
    assert!(matches!(
        resolve("$sourceDescriptions.nope.url", &ctx, None),
        Err(ResolutionError::UnknownSource { .. })
    ));
    assert!(matches!(
        resolve("$inputs.absent", &ctx, None),
        Err(ResolutionError::PathNotFound { .. })
    ));
    assert!(matches!(
        resolve("not-an-expression", &ctx, None),
        Err(ResolutionError::Parse { .. })
    ));
    assert!(matches!(
        resolve("$request.body", &ctx, None),
        Err(ResolutionError::UnsupportedContext { .. })
    ));

    let raw = CapturedResponse {
        status: 200,
        headers: BTreeMap::new(),
        body: b"plain text".to_vec(),
        body_json: None,
    };
    assert!(matches!(
        resolve("$response.body#/x", &ctx, Some(&raw)),
        Err(ResolutionError::BodyNotJson { .. })
    ));
}

#[test]
fn value_resolution_types_and_templates() {
    let ctx = context();

    // A full-string expression keeps the value's type.
    assert_eq!(
        resolve_value(&json!("$inputs.limits.max"), &ctx, None).unwrap(),
        json!(5)
    );
    // Embedded expressions concatenate as text.
    assert_eq!(
        resolve_value(&json!("user={$inputs.username}"), &ctx, None).unwrap(),
        json!("user=amel")
    );
    assert_eq!(
        resolve_value(&json!("Bearer $steps.login.outputs.token"), &ctx, None).unwrap(),
        json!("Bearer abc")
    );
    // Containers resolve element-wise.
    assert_eq!(
        resolve_value(
            &json!({"who": "$inputs.username", "n": [1, "$inputs.limits.max"]}),
            &ctx,
            None
        )
        .unwrap(),
        json!({"who": "amel", "n": [1, 5]})
    );
}

#[test]
fn scalar_sites_reject_containers() {
    let ctx = context();

    assert_eq!(
        resolve_scalar(&json!("$inputs.username"), &ctx, None, "user").unwrap(),
        "amel"
    );
    assert_eq!(
        resolve_scalar(&json!("$inputs.limits.max"), &ctx, None, "max").unwrap(),
        "5"
    );
    assert!(matches!(
        resolve_scalar(&json!("$inputs.tags"), &ctx, None, "tags"),
        Err(ResolutionError::NotScalar { .. })
    ));
}
