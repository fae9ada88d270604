use thiserror::Error;
use uidocs_mcp_core::JsonRpcError;

/// Failures raised while serving a tool call or resource read.
///
/// Client faults become `isError` tool results, protocol faults become
/// JSON-RPC errors, and everything else is an internal dispatch failure.
#[derive(Debug, Error)]
pub enum ToolError {
    #[error("Invalid arguments: {0}")]
    InvalidArguments(String),

    #[error("Component not found: {0}")]
    ComponentNotFound(String),

    #[error("Section '{section}' not found in {component}")]
    SectionNotFound { component: String, section: String },

    #[error("Documentation is not available: {0}")]
    DocsUnavailable(String),

    #[error("Unknown tool: {0}")]
    UnknownTool(String),

    #[error("Resource not found: {0}")]
    ResourceNotFound(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid pattern: {0}")]
    Pattern(#[from] regex::Error),
}

impl ToolError {
    /// Reported back to the model as a tool result rather than an error.
    pub fn is_client_fault(&self) -> bool {
        matches!(
            self,
            ToolError::InvalidArguments(_)
                | ToolError::ComponentNotFound(_)
                | ToolError::SectionNotFound { .. }
                | ToolError::DocsUnavailable(_)
        )
    }

    /// JSON-RPC error for protocol-level faults, `None` otherwise.
    pub fn to_rpc_error(&self) -> Option<JsonRpcError> {
        match self {
            ToolError::UnknownTool(_) => Some(JsonRpcError::invalid_params(self.to_string())),
            ToolError::ResourceNotFound(uri) => Some(
                JsonRpcError::custom(JsonRpcError::RESOURCE_NOT_FOUND, self.to_string())
                    .with_data(serde_json::json!({ "uri": uri })),
            ),
            _ => None,
        }
    }
}
