use thiserror::Error;

#[derive(Error, Debug)]
pub enum McpError {
    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid message format: {0}")]
    InvalidMessage(String),

    #[error("Protocol version mismatch: expected {expected}, got {actual}")]
    VersionMismatch { expected: String, actual: String },

    #[error("Protocol error: {0}")]
    Protocol(String),
}

pub type Result<T> = std::result::Result<T, McpError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = McpError::VersionMismatch {
            expected: "2025-06-18".into(),
            actual: "1999-01-01".into(),
        };
        assert_eq!(
            err.to_string(),
            "Protocol version mismatch: expected 2025-06-18, got 1999-01-01"
        );

        let err: McpError = serde_json::from_str::<serde_json::Value>("{").unwrap_err().into();
        assert!(matches!(err, McpError::Json(_)));
    }
}
