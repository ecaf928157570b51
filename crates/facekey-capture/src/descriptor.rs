//! Descriptor wire format emitted by external extractors.
//!
//! Accepted shapes:
//! - `[0.12, -0.03, ...]`: bare descriptor
//! - `{"descriptor": [...]}`: wrapped descriptor
//! - `null` or `{"descriptor": null}`: no face in the frame

use facekey_core::{CaptureError, Embedding};
use serde_json::Value;

/// Parse extractor output into an embedding, or `None` for "no face".
pub fn parse_descriptor(text: &str) -> Result<Option<Embedding>, CaptureError> {
    let text = text.trim();
    if text.is_empty() {
        return Err(CaptureError::Malformed("empty output".into()));
    }

    let value: Value =
        serde_json::from_str(text).map_err(|e| CaptureError::Malformed(e.to_string()))?;

    let raw = match value {
        Value::Null => return Ok(None),
        Value::Array(items) => Value::Array(items),
        Value::Object(mut fields) => match fields.remove("descriptor") {
            None => return Err(CaptureError::Malformed("missing \"descriptor\" field".into())),
            Some(Value::Null) => return Ok(None),
            Some(raw) => raw,
        },
        other => {
            return Err(CaptureError::Malformed(format!(
                "expected array, object or null, got {other}"
            )))
        }
    };

    let values: Vec<f32> =
        serde_json::from_value(raw).map_err(|e| CaptureError::Malformed(e.to_string()))?;

    if values.is_empty() {
        return Err(CaptureError::Malformed("descriptor has no values".into()));
    }
    let embedding = Embedding::new(values);
    if !embedding.is_finite() {
        return Err(CaptureError::Malformed("descriptor has non-finite values".into()));
    }

    Ok(Some(embedding))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bare_array() {
        let e = parse_descriptor("[0.5, -1.25, 2]\n").unwrap().unwrap();
        assert_eq!(e.values(), &[0.5, -1.25, 2.0]);
    }

    #[test]
    fn test_wrapped_object() {
        let e = parse_descriptor(r#"{"descriptor": [1.0, 2.0], "score": 0.98}"#)
            .unwrap()
            .unwrap();
        assert_eq!(e.dimension(), 2);
    }

    #[test]
    fn test_null_means_no_face() {
        assert_eq!(parse_descriptor("null").unwrap(), None);
        assert_eq!(parse_descriptor(r#"{"descriptor": null}"#).unwrap(), None);
    }

    #[test]
    fn test_rejects_garbage() {
        for text in [
            "",
            "   ",
            "not json",
            "[]",
            "42",
            r#"["a"]"#,
            r#"{"descriptor": []}"#,
            r#"{"score": 0.9}"#,
        ] {
            assert!(
                matches!(parse_descriptor(text), Err(CaptureError::Malformed(_))),
                "accepted {text:?}"
            );
        }
    }
}
