//! Success-criteria evaluation for a step response.
//!
//! All criteria are ANDed and evaluation short-circuits on the first
//! false. An expression that fails to resolve makes its criterion false;
//! absence of data means the condition is not met, never an error.

use regex::Regex;
use serde_json::Value as JsonValue;
use serde_json_path::JsonPath;
use stepflow_core::types::{Criterion, CriterionKind};

use crate::context::{CapturedResponse, ExecutionContext};
use crate::resolve::resolve;

/// Evaluate a step's criteria list. An empty list falls back to the
/// default criterion: HTTP status in [200, 300).
pub fn evaluate_success(
    criteria: &[Criterion],
    resp: &CapturedResponse,
    ctx: &ExecutionContext,
) -> bool {
    if criteria.is_empty() {
        return (200..300).contains(&resp.status);
    }
    criteria.iter().all(|c| evaluate_criterion(c, resp, ctx))
}

pub(crate) fn evaluate_criterion(
    c: &Criterion,
    resp: &CapturedResponse,
    ctx: &ExecutionContext,
) -> bool {
    match c.kind.unwrap_or(CriterionKind::Simple) {
        CriterionKind::Simple => evaluate_simple(c, resp, ctx),
        CriterionKind::Regex => evaluate_regex(c, resp, ctx),
        CriterionKind::Jsonpath => evaluate_jsonpath(c, resp, ctx),
    }
}

fn evaluate_simple(c: &Criterion, resp: &CapturedResponse, ctx: &ExecutionContext) -> bool {
    let cond = c.condition.trim();

    // `<runtime-expr> <op> <literal>`; two-char operators first so `<=`
    // is not read as `<`.
    for op in ["==", "!=", "<=", ">=", "<", ">"] {
        if let Some((lhs, rhs)) = cond.split_once(op) {
            let Ok(lhs_val) = resolve(lhs.trim(), ctx, Some(resp)) else {
                return false;
            };
            let rhs_val = parse_literal(rhs.trim());
            return compare(&lhs_val, &rhs_val, op);
        }
    }

    // A bare expression is a truthiness test.
    match resolve(cond, ctx, Some(resp)) {
        Ok(JsonValue::Bool(b)) => b,
        Ok(JsonValue::Null) => false,
        Ok(_) => true,
        Err(_) => false,
    }
}

fn evaluate_regex(c: &Criterion, resp: &CapturedResponse, ctx: &ExecutionContext) -> bool {
    let Some(context_expr) = &c.context else {
        return false;
    };
    let Ok(value) = resolve(context_expr, ctx, Some(resp)) else {
        return false;
    };
    let text = match value {
        JsonValue::String(s) => s,
        other => other.to_string(),
    };
    Regex::new(c.condition.trim())
        .map(|re| re.is_match(&text))
        .unwrap_or(false)
}

fn evaluate_jsonpath(c: &Criterion, resp: &CapturedResponse, ctx: &ExecutionContext) -> bool {
    let Some(context_expr) = &c.context else {
        return false;
    };
    let Ok(target) = resolve(context_expr, ctx, Some(resp)) else {
        return false;
    };

    let condition = c.condition.trim();

    // Filter queries like `$[?(@.ok)]` expect an array target; wrap a
    // lone object so the filter applies to it.
    let target = if condition.contains("[?") && !target.is_array() {
        JsonValue::Array(vec![target])
    } else {
        target
    };

    // `$.path == literal` / `$.path != literal`, unless the operator sits
    // inside a filter.
    if !condition.starts_with("$[?") {
        for op in ["==", "!="] {
            if let Some((path, expected)) = condition.split_once(op) {
                let Ok(jsonpath) = JsonPath::parse(path.trim()) else {
                    return false;
                };
                let nodes = jsonpath.query(&target).all();
                let Some(actual) = nodes.first() else {
                    return false;
                };
                return compare(actual, &parse_literal(expected.trim()), op);
            }
        }
    }

    // Existence / filter query.
    let Ok(jsonpath) = JsonPath::parse(condition) else {
        return false;
    };
    !jsonpath.query(&target).all().is_empty()
}

fn parse_literal(s: &str) -> JsonValue {
    let s = s.trim();
    if let Ok(v) = serde_json::from_str::<JsonValue>(s) {
        return v;
    }
    if (s.starts_with('"') && s.ends_with('"') && s.len() >= 2)
        || (s.starts_with('\'') && s.ends_with('\'') && s.len() >= 2)
    {
        return JsonValue::String(s[1..s.len() - 1].to_string());
    }
    JsonValue::String(s.to_string())
}

fn compare(actual: &JsonValue, expected: &JsonValue, op: &str) -> bool {
    match op {
        "==" => json_eq(actual, expected),
        "!=" => !json_eq(actual, expected),
        "<" => num_cmp(actual, expected).map(|o| o.is_lt()).unwrap_or(false),
        ">" => num_cmp(actual, expected).map(|o| o.is_gt()).unwrap_or(false),
        "<=" => num_cmp(actual, expected).map(|o| o.is_le()).unwrap_or(false),
        ">=" => num_cmp(actual, expected).map(|o| o.is_ge()).unwrap_or(false),
        _ => false,
    }
}

fn json_eq(a: &JsonValue, b: &JsonValue) -> bool {
    match (a, b) {
        // Numbers compare by value so `1` equals `1.0`.
        (JsonValue::Number(x), JsonValue::Number(y)) => x.as_f64() == y.as_f64(),
        // A numeric string on either side compares numerically; status
        // codes and counts frequently arrive as strings.
        (JsonValue::String(s), JsonValue::Number(n)) | (JsonValue::Number(n), JsonValue::String(s)) => {
            s.parse::<f64>().ok() == n.as_f64()
        }
        _ => a == b,
    }
}

fn num_cmp(a: &JsonValue, b: &JsonValue) -> Option<std::cmp::Ordering> {
    let x = a.as_f64().or_else(|| a.as_str()?.parse().ok())?;
    let y = b.as_f64().or_else(|| b.as_str()?.parse().ok())?;
    x.partial_cmp(&y)
}
