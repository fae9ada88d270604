// ABOUTME: Protocol endpoint abstraction: one stateful MCP conversation bound to one session
// ABOUTME: Lifecycle events flow to a LifecycleObserver exactly once per endpoint

pub mod docs;
pub mod factory;
pub mod origin;

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;
use thiserror::Error;
use uidocs_mcp_core::{JsonRpcMessage, JsonRpcNotification, RequestId};
use uidocs_mcp_tools::ToolError;

use crate::session::{RegistryClosed, SessionId};

pub use docs::{DocsEndpoint, ServerIdentity};
pub use factory::{EndpointFactory, FactoryError, RegistryObserver};
pub use origin::OriginPolicy;

/// Transport-level facts about the physical request being forwarded.
#[derive(Debug, Clone, Default)]
pub struct RequestMeta {
    pub origin: Option<String>,
    pub host: Option<String>,
}

#[derive(Debug, Clone)]
pub enum EndpointReply {
    /// A JSON-RPC response to send back on the same request.
    Message(JsonRpcMessage),
    /// Notifications and client responses: nothing to send back.
    Accepted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    ClientTerminated,
    IdleTimeout,
    HandshakeFailed,
    ServerShutdown,
}

impl CloseReason {
    pub fn as_str(self) -> &'static str {
        match self {
            CloseReason::ClientTerminated => "client_terminated",
            CloseReason::IdleTimeout => "idle_timeout",
            CloseReason::HandshakeFailed => "handshake_failed",
            CloseReason::ServerShutdown => "server_shutdown",
        }
    }
}

impl fmt::Display for CloseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
pub enum EndpointError {
    #[error("endpoint is closed")]
    Closed,

    #[error("session has not completed initialization")]
    NotEstablished,

    #[error("origin not allowed: {0}")]
    OriginRejected(String),

    #[error("session registry refused the session")]
    Refused(#[from] RegistryClosed),

    #[error("request {request_id} failed: {source}")]
    Dispatch {
        request_id: RequestId,
        #[source]
        source: ToolError,
    },

    #[error("request {request_id} panicked")]
    Panicked { request_id: RequestId },

    #[error("close failed: {0}")]
    Close(String),
}

/// Server-pushed messages for one session; ends when the endpoint closes.
pub type NotificationStream = BoxStream<'static, JsonRpcMessage>;

/// One live protocol conversation.
///
/// Implementations report `established` and `closed` to their
/// [`LifecycleObserver`]; `close` must be idempotent.
#[async_trait]
pub trait ProtocolEndpoint: Send + Sync {
    fn session_id(&self) -> &SessionId;

    fn is_established(&self) -> bool;

    fn is_closed(&self) -> bool;

    /// Process one raw request body.
    async fn handle(&self, meta: &RequestMeta, body: Bytes) -> Result<EndpointReply, EndpointError>;

    /// Open a long-lived notification channel.
    async fn subscribe(&self, meta: &RequestMeta) -> Result<NotificationStream, EndpointError>;

    /// Client-requested termination.
    async fn terminate(&self, meta: &RequestMeta) -> Result<(), EndpointError>;

    /// Queue a server-to-client notification; dropped when nobody listens.
    fn notify(&self, notification: JsonRpcNotification);

    async fn close(&self, reason: CloseReason) -> Result<(), EndpointError>;
}

/// Receives endpoint lifecycle events.
pub trait LifecycleObserver: Send + Sync {
    /// Handshake completed; the endpoint is now addressable by its id.
    fn established(&self, endpoint: Arc<dyn ProtocolEndpoint>) -> Result<(), RegistryClosed>;

    /// The endpoint closed, whoever initiated it.
    fn closed(&self, id: &SessionId, reason: CloseReason);
}
