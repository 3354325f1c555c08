use super::runtime::{parse_expression, ExprError};

/// A piece of a templated string: either literal text or an embedded
/// runtime expression (stored as source text, resolved by the engine).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TemplateSegment {
    Literal(String),
    Expr(String),
}

// Characters that may continue a bare `$...` expression.
fn expr_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-' | '[' | ']' | '#' | '/' | '$')
}

/// Split a string into literal and expression segments.
///
/// Expressions may appear bare (`"Bearer $steps.login.outputs.token"`) or
/// brace-wrapped (`"{$inputs.host}/v1"`). A bare span that does not parse
/// as an expression stays literal text; a brace-wrapped span that does not
/// parse is an authoring error.
pub fn scan_template(input: &str) -> Result<Vec<TemplateSegment>, ExprError> {
    let mut segments = Vec::new();
    let mut literal = String::new();
    let mut chars = input.char_indices().peekable();

    while let Some((i, ch)) = chars.next() {
        match ch {
            '{' => {
                // Only `{ $... }` is an expression; any other brace is
                // literal (JSON payload strings contain plenty of braces).
                let mut lookahead = chars.clone();
                while matches!(lookahead.peek(), Some((_, w)) if w.is_whitespace()) {
                    lookahead.next();
                }
                if !matches!(lookahead.peek(), Some((_, '$'))) {
                    literal.push('{');
                    continue;
                }
                let mut inner = String::new();
                let mut closed = false;
                for (_, n) in chars.by_ref() {
                    if n == '}' {
                        closed = true;
                        break;
                    }
                    inner.push(n);
                }
                if !closed {
                    return Err(ExprError::UnclosedExpression);
                }
                let inner = inner.trim().to_string();
                parse_expression(&inner)?;
                flush(&mut segments, &mut literal);
                segments.push(TemplateSegment::Expr(inner));
            }
            '$' => {
                let start = i;
                let mut end = input.len();
                while let Some(&(j, c)) = chars.peek() {
                    if expr_char(c) {
                        chars.next();
                    } else {
                        end = j;
                        break;
                    }
                }
                // Trailing dots read as punctuation, not path separators.
                let span = input[start..end].trim_end_matches('.');
                let trimmed = span.len();
                if parse_expression(span).is_ok() {
                    flush(&mut segments, &mut literal);
                    segments.push(TemplateSegment::Expr(span.to_string()));
                    literal.push_str(&input[start + trimmed..end]);
                } else {
                    literal.push_str(&input[start..end]);
                }
            }
            _ => literal.push(ch),
        }
    }

    flush(&mut segments, &mut literal);
    Ok(segments)
}

fn flush(segments: &mut Vec<TemplateSegment>, literal: &mut String) {
    if !literal.is_empty() {
        segments.push(TemplateSegment::Literal(std::mem::take(literal)));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_string_is_one_literal() {
        assert_eq!(
            scan_template("hello world").unwrap(),
            vec![TemplateSegment::Literal("hello world".into())]
        );
    }

    #[test]
    fn bare_expression_inside_string() {
        assert_eq!(
            scan_template("Bearer $steps.login.outputs.token").unwrap(),
            vec![
                TemplateSegment::Literal("Bearer ".into()),
                TemplateSegment::Expr("$steps.login.outputs.token".into()),
            ]
        );
    }

    #[test]
    fn braced_expression_with_suffix() {
        assert_eq!(
            scan_template("{$inputs.host}/v1").unwrap(),
            vec![
                TemplateSegment::Expr("$inputs.host".into()),
                TemplateSegment::Literal("/v1".into()),
            ]
        );
    }

    #[test]
    fn trailing_dot_stays_literal() {
        assert_eq!(
            scan_template("value is $inputs.count.").unwrap(),
            vec![
                TemplateSegment::Literal("value is ".into()),
                TemplateSegment::Expr("$inputs.count".into()),
                TemplateSegment::Literal(".".into()),
            ]
        );
    }

    #[test]
    fn unparseable_bare_span_stays_literal() {
        assert_eq!(
            scan_template("cost: $100").unwrap(),
            vec![TemplateSegment::Literal("cost: $100".into())]
        );
    }

    #[test]
    fn json_braces_are_literal() {
        assert_eq!(
            scan_template(r#"{"k": 1}"#).unwrap(),
            vec![TemplateSegment::Literal(r#"{"k": 1}"#.into())]
        );
    }

    #[test]
    fn unclosed_braced_expression_errors() {
        assert_eq!(
            scan_template("{$inputs.a"),
            Err(ExprError::UnclosedExpression)
        );
    }
}
