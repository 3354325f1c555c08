/// Arbitrary JSON carried through parameter values, payloads, and step
/// outputs. The tagged `serde_json::Value` variant is the engine's value
/// representation end to end.
pub type AnyValue = serde_json::Value;

/// A runtime-expression string such as `$steps.login.outputs.token`.
/// Parsed on demand by [`crate::expr::parse_expression`].
pub type RuntimeExpression = String;
