// ABOUTME: MCP endpoint serving component documentation for one session
// ABOUTME: Drives the initialize handshake, dispatches tools/resources and fans out notifications

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Weak};

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use serde::Serialize;
use serde_json::{json, Value};
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uidocs_mcp_core::{
    methods, parse_params, CallToolParams, Implementation, InitializeParams, InitializeResult,
    JsonRpcError, JsonRpcMessage, JsonRpcNotification, JsonRpcRequest, ListResourceTemplatesResult,
    ListResourcesResult, ListToolsResult, ProtocolVersion, ReadResourceParams, RequestId,
};
use uidocs_mcp_tools::CapabilitySet;

use crate::endpoint::{
    CloseReason, EndpointError, EndpointReply, LifecycleObserver, NotificationStream,
    OriginPolicy, ProtocolEndpoint, RequestMeta,
};
use crate::session::SessionId;

const AWAITING_INITIALIZE: u8 = 0;
const ESTABLISHED: u8 = 1;
const CLOSED: u8 = 2;

const NOTIFICATION_BUFFER: usize = 64;

/// What the server reports about itself in the `initialize` result.
#[derive(Debug, Clone)]
pub struct ServerIdentity {
    pub name: String,
    pub version: String,
    pub instructions: Option<String>,
}

impl Default for ServerIdentity {
    fn default() -> Self {
        Self {
            name: "uidocs".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            instructions: Some(
                "Documentation for UI components. Call list_components or search_components \
                 to find a component, then get_component_docs, get_component_api or \
                 get_component_examples for details."
                    .to_string(),
            ),
        }
    }
}

pub struct DocsEndpoint {
    id: SessionId,
    this: Weak<DocsEndpoint>,
    state: AtomicU8,
    observer: Arc<dyn LifecycleObserver>,
    capabilities: Arc<CapabilitySet>,
    identity: Arc<ServerIdentity>,
    origin_policy: Arc<OriginPolicy>,
    negotiated: Mutex<Option<(ProtocolVersion, Implementation)>>,
    notifications: broadcast::Sender<JsonRpcMessage>,
    cancel: CancellationToken,
}

impl DocsEndpoint {
    pub fn new(
        id: SessionId,
        observer: Arc<dyn LifecycleObserver>,
        capabilities: Arc<CapabilitySet>,
        identity: Arc<ServerIdentity>,
        origin_policy: Arc<OriginPolicy>,
    ) -> Arc<Self> {
        let (notifications, _) = broadcast::channel(NOTIFICATION_BUFFER);
        Arc::new_cyclic(|this| Self {
            id,
            this: this.clone(),
            state: AtomicU8::new(AWAITING_INITIALIZE),
            observer,
            capabilities,
            identity,
            origin_policy,
            negotiated: Mutex::new(None),
            notifications,
            cancel: CancellationToken::new(),
        })
    }

    pub fn protocol_version(&self) -> Option<ProtocolVersion> {
        self.negotiated.lock().as_ref().map(|(v, _)| v.clone())
    }

    pub fn client_info(&self) -> Option<Implementation> {
        self.negotiated.lock().as_ref().map(|(_, c)| c.clone())
    }

    /// Decode a body, or produce the JSON-RPC error to answer with.
    fn decode(body: &[u8]) -> Result<JsonRpcMessage, JsonRpcMessage> {
        let value: Value = serde_json::from_slice(body).map_err(|e| {
            JsonRpcMessage::error(
                None,
                JsonRpcError::parse_error().with_data(json!({ "detail": e.to_string() })),
            )
        })?;
        if value.is_array() {
            return Err(JsonRpcMessage::error(
                None,
                JsonRpcError::invalid_request("Batch requests are not supported"),
            ));
        }

        let id = value
            .get("id")
            .cloned()
            .and_then(|v| serde_json::from_value::<RequestId>(v).ok());
        let message: JsonRpcMessage = serde_json::from_value(value).map_err(|e| {
            JsonRpcMessage::error(id.clone(), JsonRpcError::invalid_request(e.to_string()))
        })?;
        message
            .validate()
            .map_err(|e| JsonRpcMessage::error(id, JsonRpcError::invalid_request(e.to_string())))?;
        Ok(message)
    }

    async fn handle_request(&self, request: JsonRpcRequest) -> Result<JsonRpcMessage, EndpointError> {
        let JsonRpcRequest {
            id, method, params, ..
        } = request;

        if method == methods::INITIALIZE {
            return self.initialize(id, params);
        }
        if method == methods::PING {
            return Ok(JsonRpcMessage::success(id, json!({})));
        }
        if !self.is_established() {
            return Ok(JsonRpcMessage::error(
                Some(id),
                JsonRpcError::invalid_request("Session not initialized"),
            ));
        }

        match method.as_str() {
            methods::TOOLS_LIST => Ok(respond(
                id,
                &ListToolsResult {
                    tools: self.capabilities.list_tools().to_vec(),
                },
            )),
            methods::TOOLS_CALL => self.call_tool(id, params).await,
            methods::RESOURCES_LIST => Ok(respond(
                id,
                &ListResourcesResult {
                    resources: self.capabilities.list_resources().to_vec(),
                },
            )),
            methods::RESOURCES_TEMPLATES_LIST => Ok(respond(
                id,
                &ListResourceTemplatesResult {
                    resource_templates: self.capabilities.list_resource_templates().to_vec(),
                },
            )),
            methods::RESOURCES_READ => self.read_resource(id, params).await,
            other => {
                debug!(session_id = %self.id, method = other, "Unknown method");
                Ok(JsonRpcMessage::error(
                    Some(id),
                    JsonRpcError::method_not_found(other),
                ))
            }
        }
    }

    fn initialize(&self, id: RequestId, params: Option<Value>) -> Result<JsonRpcMessage, EndpointError> {
        let params: InitializeParams = match parse_params(params) {
            Ok(params) => params,
            Err(e) => {
                return Ok(JsonRpcMessage::error(
                    Some(id),
                    JsonRpcError::invalid_params(e.to_string()),
                ))
            }
        };

        match self.state.compare_exchange(
            AWAITING_INITIALIZE,
            ESTABLISHED,
            Ordering::AcqRel,
            Ordering::Acquire,
        ) {
            Ok(_) => {}
            Err(ESTABLISHED) => {
                return Ok(JsonRpcMessage::error(
                    Some(id),
                    JsonRpcError::invalid_request("Session already initialized"),
                ))
            }
            Err(_) => return Err(EndpointError::Closed),
        }

        let version = ProtocolVersion::negotiate(&params.protocol_version);
        *self.negotiated.lock() = Some((version.clone(), params.client_info.clone()));

        // Registration happens before the response so the id it carries is
        // already resolvable.
        let this: Arc<dyn ProtocolEndpoint> = self.this.upgrade().ok_or(EndpointError::Closed)?;
        if let Err(refused) = self.observer.established(this) {
            warn!(session_id = %self.id, "Session refused during initialize");
            self.close_now(CloseReason::ServerShutdown);
            return Err(EndpointError::Refused(refused));
        }

        info!(
            session_id = %self.id,
            client = %params.client_info.name,
            client_version = %params.client_info.version,
            protocol_version = %version,
            "Session initialized"
        );

        let result = InitializeResult {
            protocol_version: version.to_string(),
            capabilities: self.capabilities.server_capabilities(),
            server_info: Implementation {
                name: self.identity.name.clone(),
                version: self.identity.version.clone(),
            },
            instructions: self.identity.instructions.clone(),
        };
        Ok(respond(id, &result))
    }

    async fn call_tool(&self, id: RequestId, params: Option<Value>) -> Result<JsonRpcMessage, EndpointError> {
        let params: CallToolParams = match parse_params(params) {
            Ok(params) => params,
            Err(e) => {
                return Ok(JsonRpcMessage::error(
                    Some(id),
                    JsonRpcError::invalid_params(e.to_string()),
                ))
            }
        };

        let tool = params.name.clone();
        debug!(session_id = %self.id, %tool, "Calling tool");

        // Own task so a panicking handler cannot take the connection down.
        let capabilities = self.capabilities.clone();
        let mut task = tokio::spawn(async move { capabilities.call_tool(params).await });
        let joined = tokio::select! {
            joined = &mut task => joined,
            _ = self.cancel.cancelled() => {
                task.abort();
                return Err(EndpointError::Closed);
            }
        };

        match joined {
            Ok(Ok(result)) => Ok(respond(id, &result)),
            Ok(Err(e)) => match e.to_rpc_error() {
                Some(rpc_error) => Ok(JsonRpcMessage::error(Some(id), rpc_error)),
                None => Err(EndpointError::Dispatch {
                    request_id: id,
                    source: e,
                }),
            },
            Err(join_error) => {
                error!(session_id = %self.id, %tool, error = %join_error, "Tool task failed");
                Err(EndpointError::Panicked { request_id: id })
            }
        }
    }

    async fn read_resource(&self, id: RequestId, params: Option<Value>) -> Result<JsonRpcMessage, EndpointError> {
        let params: ReadResourceParams = match parse_params(params) {
            Ok(params) => params,
            Err(e) => {
                return Ok(JsonRpcMessage::error(
                    Some(id),
                    JsonRpcError::invalid_params(e.to_string()),
                ))
            }
        };

        match self.capabilities.read_resource(&params.uri).await {
            Ok(result) => Ok(respond(id, &result)),
            Err(e) => match e.to_rpc_error() {
                Some(rpc_error) => Ok(JsonRpcMessage::error(Some(id), rpc_error)),
                None => Err(EndpointError::Dispatch {
                    request_id: id,
                    source: e,
                }),
            },
        }
    }

    fn handle_notification(&self, notification: &JsonRpcNotification) {
        match notification.method.as_str() {
            methods::NOTIFICATION_INITIALIZED => {
                debug!(session_id = %self.id, "Client finished initialization")
            }
            methods::NOTIFICATION_CANCELLED => {
                debug!(session_id = %self.id, params = ?notification.params, "Client cancelled a request")
            }
            other => debug!(session_id = %self.id, method = other, "Ignoring notification"),
        }
    }

    /// Transition to closed; only the first call has any effect.
    fn close_now(&self, reason: CloseReason) -> bool {
        if self.state.swap(CLOSED, Ordering::AcqRel) == CLOSED {
            return false;
        }
        self.cancel.cancel();
        self.observer.closed(&self.id, reason);
        info!(session_id = %self.id, %reason, "Session closed");
        true
    }
}

fn respond<T: Serialize>(id: RequestId, result: &T) -> JsonRpcMessage {
    match serde_json::to_value(result) {
        Ok(value) => JsonRpcMessage::success(id, value),
        Err(e) => {
            error!(request_id = %id, error = %e, "Failed to serialize result");
            JsonRpcMessage::error(Some(id), JsonRpcError::internal_error())
        }
    }
}

#[async_trait]
impl ProtocolEndpoint for DocsEndpoint {
    fn session_id(&self) -> &SessionId {
        &self.id
    }

    fn is_established(&self) -> bool {
        self.state.load(Ordering::Acquire) == ESTABLISHED
    }

    fn is_closed(&self) -> bool {
        self.state.load(Ordering::Acquire) == CLOSED
    }

    async fn handle(&self, meta: &RequestMeta, body: Bytes) -> Result<EndpointReply, EndpointError> {
        self.origin_policy.check(meta)?;
        if self.is_closed() {
            return Err(EndpointError::Closed);
        }

        let message = match Self::decode(&body) {
            Ok(message) => message,
            Err(reply) => return Ok(EndpointReply::Message(reply)),
        };

        match message {
            JsonRpcMessage::Request(request) => {
                self.handle_request(request).await.map(EndpointReply::Message)
            }
            JsonRpcMessage::Notification(notification) => {
                self.handle_notification(&notification);
                Ok(EndpointReply::Accepted)
            }
            JsonRpcMessage::Response(_) | JsonRpcMessage::Error(_) => Ok(EndpointReply::Accepted),
        }
    }

    async fn subscribe(&self, meta: &RequestMeta) -> Result<NotificationStream, EndpointError> {
        self.origin_policy.check(meta)?;
        match self.state.load(Ordering::Acquire) {
            CLOSED => return Err(EndpointError::Closed),
            AWAITING_INITIALIZE => return Err(EndpointError::NotEstablished),
            _ => {}
        }

        let receiver = self.notifications.subscribe();
        let cancel = self.cancel.clone();
        let session_id = self.id.clone();
        debug!(session_id = %session_id, "Notification channel opened");

        let stream = futures::stream::unfold((receiver, cancel), move |(mut receiver, cancel)| {
            let session_id = session_id.clone();
            async move {
                loop {
                    // queued messages are delivered before a close is observed
                    tokio::select! {
                        biased;
                        received = receiver.recv() => match received {
                            Ok(message) => return Some((message, (receiver, cancel))),
                            Err(RecvError::Lagged(skipped)) => {
                                warn!(session_id = %session_id, skipped, "Notification subscriber lagged");
                            }
                            Err(RecvError::Closed) => return None,
                        },
                        _ = cancel.cancelled() => return None,
                    }
                }
            }
        });
        Ok(Box::pin(stream))
    }

    async fn terminate(&self, meta: &RequestMeta) -> Result<(), EndpointError> {
        self.origin_policy.check(meta)?;
        if !self.close_now(CloseReason::ClientTerminated) {
            return Err(EndpointError::Closed);
        }
        Ok(())
    }

    fn notify(&self, notification: JsonRpcNotification) {
        if self.is_established() {
            // no subscribers is fine
            let _ = self.notifications.send(notification.into());
        }
    }

    async fn close(&self, reason: CloseReason) -> Result<(), EndpointError> {
        self.close_now(reason);
        Ok(())
    }
}
