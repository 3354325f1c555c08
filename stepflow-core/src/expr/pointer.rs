/// An RFC 6901 JSON pointer, as it appears after the `#` in runtime
/// expressions such as `$response.body#/data/0/id`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JsonPointer {
    raw: String,
}

impl JsonPointer {
    /// Parse the fragment part of an expression (the text after `#`).
    /// The empty pointer addresses the whole document.
    pub fn parse(fragment: &str) -> Result<Self, JsonPointerError> {
        if fragment.is_empty() {
            return Ok(Self { raw: String::new() });
        }
        if !fragment.starts_with('/') {
            return Err(JsonPointerError::MissingSlash);
        }
        let mut bytes = fragment.bytes();
        while let Some(b) = bytes.next() {
            if b == b'~' && !matches!(bytes.next(), Some(b'0' | b'1')) {
                return Err(JsonPointerError::BadEscape);
            }
        }
        Ok(Self {
            raw: fragment.to_string(),
        })
    }

    /// Pointer text in the form `serde_json::Value::pointer` accepts.
    pub fn as_str(&self) -> &str {
        &self.raw
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum JsonPointerError {
    #[error("json pointer must be empty or start with '/'")]
    MissingSlash,
    #[error("json pointer escape must be ~0 or ~1")]
    BadEscape,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_empty_and_rooted_pointers() {
        assert_eq!(JsonPointer::parse("").unwrap().as_str(), "");
        assert_eq!(JsonPointer::parse("/a/b/0").unwrap().as_str(), "/a/b/0");
        assert_eq!(JsonPointer::parse("/a~1b/~0").unwrap().as_str(), "/a~1b/~0");
    }

    #[test]
    fn rejects_unrooted_and_bad_escapes() {
        assert_eq!(
            JsonPointer::parse("a/b"),
            Err(JsonPointerError::MissingSlash)
        );
        assert_eq!(JsonPointer::parse("/a~2"), Err(JsonPointerError::BadEscape));
        assert_eq!(JsonPointer::parse("/a~"), Err(JsonPointerError::BadEscape));
    }
}
