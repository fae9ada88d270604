use axum::{
    extract::rejection::BytesRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use thiserror::Error;
use tracing::{debug, error};
use uidocs_mcp_core::{JsonRpcError, JsonRpcMessage, RequestId};

use crate::endpoint::{EndpointError, FactoryError};
use crate::session::SessionId;

/// Routing failures, rendered as JSON-RPC error bodies with a matching
/// HTTP status.
#[derive(Debug, Error)]
pub enum RouterError {
    #[error("malformed request: {0}")]
    Malformed(String),

    #[error("request body rejected: {0}")]
    PayloadTooLarge(String),

    #[error("no route for {0}")]
    RouteNotFound(String),

    #[error("method {0} not allowed")]
    MethodNotAllowed(String),

    #[error("session not found: {0}")]
    SessionNotFound(String),

    #[error("server is shutting down")]
    ShuttingDown,

    #[error("origin not allowed: {0}")]
    OriginRejected(String),

    /// The endpoint's own error response to a failed `initialize`.
    #[error("session handshake failed")]
    HandshakeFailed(JsonRpcMessage),

    #[error("request failed: {message}")]
    Dispatch {
        request_id: Option<RequestId>,
        message: String,
    },

    #[error("internal error: {0}")]
    Internal(String),
}

impl RouterError {
    pub const SESSION_NOT_FOUND: i32 = -32001;
    pub const SHUTTING_DOWN: i32 = -32003;
    pub const ORIGIN_REJECTED: i32 = -32004;

    pub fn from_endpoint(err: EndpointError, session: &SessionId) -> Self {
        match err {
            EndpointError::Closed => RouterError::SessionNotFound(session.to_string()),
            EndpointError::NotEstablished => {
                RouterError::Malformed("session has not completed initialization".into())
            }
            EndpointError::OriginRejected(origin) => RouterError::OriginRejected(origin),
            EndpointError::Refused(_) => RouterError::ShuttingDown,
            EndpointError::Dispatch { request_id, source } => RouterError::Dispatch {
                request_id: Some(request_id),
                message: source.to_string(),
            },
            EndpointError::Panicked { request_id } => RouterError::Dispatch {
                request_id: Some(request_id),
                message: "request handler panicked".into(),
            },
            EndpointError::Close(message) => RouterError::Internal(message),
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            RouterError::Malformed(_) | RouterError::HandshakeFailed(_) => StatusCode::BAD_REQUEST,
            RouterError::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            RouterError::RouteNotFound(_) | RouterError::SessionNotFound(_) => {
                StatusCode::NOT_FOUND
            }
            RouterError::MethodNotAllowed(_) => StatusCode::METHOD_NOT_ALLOWED,
            RouterError::ShuttingDown => StatusCode::SERVICE_UNAVAILABLE,
            RouterError::OriginRejected(_) => StatusCode::FORBIDDEN,
            RouterError::Dispatch { .. } | RouterError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    pub fn code(&self) -> i32 {
        match self {
            RouterError::Malformed(_)
            | RouterError::PayloadTooLarge(_)
            | RouterError::RouteNotFound(_)
            | RouterError::MethodNotAllowed(_) => JsonRpcError::INVALID_REQUEST,
            RouterError::SessionNotFound(_) => Self::SESSION_NOT_FOUND,
            RouterError::ShuttingDown => Self::SHUTTING_DOWN,
            RouterError::OriginRejected(_) => Self::ORIGIN_REJECTED,
            RouterError::HandshakeFailed(message) => match message {
                JsonRpcMessage::Error(e) => e.error.code,
                _ => JsonRpcError::INVALID_REQUEST,
            },
            RouterError::Dispatch { .. } | RouterError::Internal(_) => JsonRpcError::INTERNAL_ERROR,
        }
    }

    /// The body sent to the client. Internal detail stays in the logs.
    pub fn to_message(&self) -> JsonRpcMessage {
        let (id, message) = match self {
            RouterError::HandshakeFailed(message) => return message.clone(),
            RouterError::Malformed(reason) => (None, format!("Bad Request: {reason}")),
            RouterError::PayloadTooLarge(_) => (None, "Request body too large".to_string()),
            RouterError::RouteNotFound(path) => (None, format!("Not Found: {path}")),
            RouterError::MethodNotAllowed(method) => {
                (None, format!("Method Not Allowed: {method}"))
            }
            RouterError::SessionNotFound(_) => (None, "Session not found".to_string()),
            RouterError::ShuttingDown => (None, "Server is shutting down".to_string()),
            RouterError::OriginRejected(_) => (None, "Origin not allowed".to_string()),
            RouterError::Dispatch { request_id, .. } => {
                (request_id.clone(), "Internal error".to_string())
            }
            RouterError::Internal(_) => (None, "Internal error".to_string()),
        };
        JsonRpcMessage::error(id, JsonRpcError::custom(self.code(), message))
    }
}

impl From<BytesRejection> for RouterError {
    fn from(rejection: BytesRejection) -> Self {
        if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE {
            RouterError::PayloadTooLarge(rejection.body_text())
        } else {
            RouterError::Malformed(rejection.body_text())
        }
    }
}

impl From<FactoryError> for RouterError {
    fn from(err: FactoryError) -> Self {
        match err {
            FactoryError::ShuttingDown => RouterError::ShuttingDown,
        }
    }
}

impl IntoResponse for RouterError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!(status = status.as_u16(), error = %self, "Request failed");
        } else {
            debug!(status = status.as_u16(), error = %self, "Request rejected");
        }

        (status, Json(self.to_message())).into_response()
    }
}

pub type RouterResult<T> = Result<T, RouterError>;
