use regex::{Captures, Regex};

use crate::types::ValueTransform;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransformError {
    #[error("invalid transform pattern '{pattern}': {detail}")]
    BadPattern { pattern: String, detail: String },
}

/// Apply a parameter's `x-transform` chain to a resolved string value.
///
/// Each transform matches its pattern against the output of the previous
/// one; a non-matching pattern passes the value through untouched. The
/// result template references capture groups as `\1` (by number) or
/// `\<name>` (by name); `\\1` and `\\<name>` produce the literal text.
pub fn apply_transforms(
    value: &str,
    transforms: &[ValueTransform],
) -> Result<String, TransformError> {
    let mut current = value.to_string();
    for transform in transforms {
        let ValueTransform::Regex {
            pattern, result, ..
        } = transform;
        let re = Regex::new(pattern).map_err(|e| TransformError::BadPattern {
            pattern: pattern.clone(),
            detail: e.to_string(),
        })?;
        if let Some(caps) = re.captures(&current) {
            current = expand(&caps, result);
        }
    }
    Ok(current)
}

/// Expand a result template against a match. An unmatched or unknown
/// group reference expands to nothing.
fn expand(caps: &Captures, template: &str) -> String {
    let mut out = String::new();
    let mut chars = template.chars().peekable();
    while let Some(ch) = chars.next() {
        if ch != '\\' {
            out.push(ch);
            continue;
        }
        match chars.peek() {
            // `\\` keeps the backslash; the reference text after it then
            // reads as ordinary characters.
            Some('\\') => {
                chars.next();
                out.push('\\');
            }
            Some(c) if c.is_ascii_digit() => {
                let mut num = String::new();
                while let Some(&d) = chars.peek() {
                    if d.is_ascii_digit() {
                        num.push(d);
                        chars.next();
                    } else {
                        break;
                    }
                }
                if let Some(m) = num.parse::<usize>().ok().and_then(|i| caps.get(i)) {
                    out.push_str(m.as_str());
                }
            }
            Some('<') => {
                chars.next();
                let mut name = String::new();
                let mut closed = false;
                for d in chars.by_ref() {
                    if d == '>' {
                        closed = true;
                        break;
                    }
                    name.push(d);
                }
                if !closed {
                    out.push_str("\\<");
                    out.push_str(&name);
                } else if let Some(m) = caps.name(&name) {
                    out.push_str(m.as_str());
                }
            }
            _ => out.push('\\'),
        }
    }
    out
}
