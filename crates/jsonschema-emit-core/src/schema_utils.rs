//! Shared helpers for path construction and JSON number conversion.
//!
//! Descent paths recorded during traversal (and reported by cycle and
//! unrepresentable errors) are JSON Pointers rooted at `#`.

use std::borrow::Cow;

use serde_json::{Number, Value};

use crate::error::ConvertError;

// ---------------------------------------------------------------------------
// JSON Pointer escaping (RFC 6901)
// ---------------------------------------------------------------------------

/// Escape a single path segment per RFC 6901.
///
/// - `~` → `~0`
/// - `/` → `~1`
///
/// Returns `Cow::Borrowed` when no escaping is needed (the common case).
pub fn escape_pointer_segment(segment: &str) -> Cow<'_, str> {
    if segment.contains('~') || segment.contains('/') {
        Cow::Owned(segment.replace('~', "~0").replace('/', "~1"))
    } else {
        Cow::Borrowed(segment)
    }
}

/// Build a JSON Pointer path by appending segments to a parent path.
///
/// Each segment is escaped per RFC 6901 before joining.
///
/// # Example
/// ```
/// use jsonschema_emit_core::build_path;
/// assert_eq!(build_path("#", &["properties", "a/b"]), "#/properties/a~1b");
/// ```
pub fn build_path(parent: &str, segments: &[&str]) -> String {
    let mut path = parent.to_string();
    for segment in segments {
        path.push('/');
        path.push_str(&escape_pointer_segment(segment));
    }
    path
}

// ---------------------------------------------------------------------------
// Numbers
// ---------------------------------------------------------------------------

/// Convert a constraint value into a JSON number.
///
/// Integral values become integer numbers so `5.0` serializes as `5`.
/// Non-finite values have no JSON form and fail with
/// [`ConvertError::Serialization`].
pub fn number_value(value: f64, keyword: &str) -> Result<Value, ConvertError> {
    if value.is_finite() && value.fract() == 0.0 && value.abs() < 9_007_199_254_740_992.0 {
        return Ok(Value::from(value as i64));
    }
    Number::from_f64(value)
        .map(Value::Number)
        .ok_or_else(|| ConvertError::Serialization {
            message: format!("{keyword} is not a finite number: {value}"),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_escape_segments() {
        assert_eq!(escape_pointer_segment("plain"), "plain");
        assert_eq!(escape_pointer_segment("a/b~c"), "a~1b~0c");
    }

    #[test]
    fn test_build_path_escapes() {
        assert_eq!(
            build_path("#/properties", &["x/y", "items"]),
            "#/properties/x~1y/items"
        );
        assert_eq!(build_path("#", &[]), "#");
    }

    #[test]
    fn test_number_value_integral() {
        assert_eq!(number_value(5.0, "minimum").unwrap(), json!(5));
        assert_eq!(number_value(-3.0, "minimum").unwrap(), json!(-3));
    }

    #[test]
    fn test_number_value_fractional() {
        assert_eq!(number_value(0.5, "multipleOf").unwrap(), json!(0.5));
    }

    #[test]
    fn test_number_value_non_finite() {
        let err = number_value(f64::INFINITY, "maximum").unwrap_err();
        assert!(matches!(err, ConvertError::Serialization { .. }));
        assert!(number_value(f64::NAN, "maximum").is_err());
    }
}
