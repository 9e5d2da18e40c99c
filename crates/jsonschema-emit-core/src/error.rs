//! Error types for schema-graph conversion.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::graph::NodeId;

/// Stable, machine-readable error codes.
///
/// Variant names and their serialized `snake_case` strings are part of the
/// public contract; callers switch on them to decide whether to retry with a
/// different policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[non_exhaustive]
pub enum ErrorCode {
    /// JSON (de)serialization error while reading a graph document.
    JsonParseError,
    /// A node variant has no JSON Schema equivalent.
    UnrepresentableType,
    /// A cycle was found and the cycle policy is `throw`.
    CycleDetected,
    /// A `catch` fallback needs the rejected input to compute its value.
    DynamicFallback,
    /// The assembled document is not plain data.
    SerializationError,
    /// A template literal node carries no pattern.
    MissingTemplatePattern,
    /// A node handle points at a reserved but never defined slot.
    UndefinedNode,
    /// `emit` was called for a root that was never processed.
    UnprocessedSchema,
    /// Two registry entries claim the same id.
    DuplicateId,
    /// The session cannot emit again.
    SessionConsumed,
    /// A pattern in a graph document does not compile.
    InvalidPattern,
    /// A graph document is structurally invalid.
    InvalidGraph,
}

#[derive(Debug, Error)]
pub enum ConvertError {
    #[error("JSON (de)serialization error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("{variant} cannot be represented in JSON Schema (at {path})")]
    Unrepresentable { path: String, variant: String },

    #[error(
        "Cycle detected: {path}/<root>. Set the `cycles` option to \"ref\" to resolve cyclical schemas with definitions"
    )]
    Cycle { path: String },

    #[error("Dynamic catch values are not supported in JSON Schema (at {path}): {reason}")]
    DynamicFallback { path: String, reason: String },

    #[error("Error converting schema to JSON: {message}")]
    Serialization { message: String },

    #[error("Pattern not found in template literal at {path}")]
    MissingTemplatePattern { path: String },

    #[error("Node {node} was reserved but never defined")]
    UndefinedNode { node: NodeId },

    #[error("Unprocessed schema {node}: call process() before emit()")]
    UnprocessedSchema { node: NodeId },

    #[error("Id {id:?} already exists in the registry")]
    DuplicateId { id: String },

    #[error("Session cannot emit again: {message}")]
    SessionConsumed { message: String },

    #[error("Invalid pattern at {path}: {message}")]
    InvalidPattern { path: String, message: String },

    #[error("Invalid graph document: {message}")]
    InvalidGraph { message: String },
}

impl ConvertError {
    /// Returns the stable error code for this error variant.
    pub fn error_code(&self) -> ErrorCode {
        match self {
            ConvertError::JsonError(_) => ErrorCode::JsonParseError,
            ConvertError::Unrepresentable { .. } => ErrorCode::UnrepresentableType,
            ConvertError::Cycle { .. } => ErrorCode::CycleDetected,
            ConvertError::DynamicFallback { .. } => ErrorCode::DynamicFallback,
            ConvertError::Serialization { .. } => ErrorCode::SerializationError,
            ConvertError::MissingTemplatePattern { .. } => ErrorCode::MissingTemplatePattern,
            ConvertError::UndefinedNode { .. } => ErrorCode::UndefinedNode,
            ConvertError::UnprocessedSchema { .. } => ErrorCode::UnprocessedSchema,
            ConvertError::DuplicateId { .. } => ErrorCode::DuplicateId,
            ConvertError::SessionConsumed { .. } => ErrorCode::SessionConsumed,
            ConvertError::InvalidPattern { .. } => ErrorCode::InvalidPattern,
            ConvertError::InvalidGraph { .. } => ErrorCode::InvalidGraph,
        }
    }

    /// Returns the schema path context, if available.
    ///
    /// For [`ConvertError::Cycle`] this is the descent path at which the
    /// cycle was first detected.
    pub fn path(&self) -> Option<&str> {
        match self {
            ConvertError::Unrepresentable { path, .. } => Some(path),
            ConvertError::Cycle { path } => Some(path),
            ConvertError::DynamicFallback { path, .. } => Some(path),
            ConvertError::MissingTemplatePattern { path } => Some(path),
            ConvertError::InvalidPattern { path, .. } => Some(path),
            ConvertError::JsonError(_)
            | ConvertError::Serialization { .. }
            | ConvertError::UndefinedNode { .. }
            | ConvertError::UnprocessedSchema { .. }
            | ConvertError::DuplicateId { .. }
            | ConvertError::SessionConsumed { .. }
            | ConvertError::InvalidGraph { .. } => None,
        }
    }

    /// Produces a structured JSON error.
    ///
    /// Format: `{"code": "...", "message": "...", "path": "..." | null}`
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!({
            "code": self.error_code(),
            "message": self.to_string(),
            "path": self.path(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_error_code_serializes_snake_case() {
        let json = serde_json::to_value(ErrorCode::UnrepresentableType).unwrap();
        assert_eq!(json, json!("unrepresentable_type"));

        let back: ErrorCode = serde_json::from_value(json!("cycle_detected")).unwrap();
        assert_eq!(back, ErrorCode::CycleDetected);
    }

    #[test]
    fn test_cycle_error_names_path() {
        let err = ConvertError::Cycle {
            path: "#/properties/children/items".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("#/properties/children/items/<root>"), "{msg}");
        assert_eq!(err.path(), Some("#/properties/children/items"));
    }

    #[test]
    fn test_to_json_shape() {
        let err = ConvertError::Unrepresentable {
            path: "#/properties/when".to_string(),
            variant: "date".to_string(),
        };
        let json = err.to_json();
        assert_eq!(json["code"], json!("unrepresentable_type"));
        assert_eq!(json["path"], json!("#/properties/when"));
        assert!(json["message"].as_str().unwrap().starts_with("date cannot"));
    }

    #[test]
    fn test_pathless_errors_serialize_null_path() {
        let err = ConvertError::Serialization {
            message: "residual cycle".to_string(),
        };
        assert_eq!(err.to_json()["path"], json!(null));
        assert_eq!(err.error_code(), ErrorCode::SerializationError);
    }
}
