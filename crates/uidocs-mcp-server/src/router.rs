// ABOUTME: Session-addressed HTTP routing for the MCP endpoint
// ABOUTME: Classifies each request, then forwards it to a fresh or registered endpoint

use std::any::Any;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::{
    body::Bytes,
    extract::{rejection::BytesRejection, State},
    http::{header, HeaderMap, HeaderValue, Method, StatusCode, Uri},
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse, Response,
    },
    routing::{get, post},
    Json, Router,
};
use futures::StreamExt;
use tower_http::{catch_panic::CatchPanicLayer, trace::TraceLayer};
use tracing::{debug, info, warn};
use uidocs_mcp_core::JsonRpcMessage;
use uidocs_mirror::DocsMirror;

use crate::endpoint::{CloseReason, EndpointFactory, EndpointReply, ProtocolEndpoint, RequestMeta};
use crate::error::{RouterError, RouterResult};
use crate::health;
use crate::session::{SessionId, SessionRegistry};

pub const SESSION_HEADER: &str = "mcp-session-id";
pub const MCP_PATH: &str = "/mcp";

#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<SessionRegistry>,
    pub factory: Arc<EndpointFactory>,
    pub mirror: Arc<dyn DocsMirror>,
    pub started_at: Instant,
    pub keep_alive: Duration,
}

impl AppState {
    pub fn new(
        registry: Arc<SessionRegistry>,
        factory: Arc<EndpointFactory>,
        mirror: Arc<dyn DocsMirror>,
        keep_alive: Duration,
    ) -> Self {
        Self {
            registry,
            factory,
            mirror,
            started_at: Instant::now(),
            keep_alive,
        }
    }
}

/// What the client is trying to do, from the HTTP method.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Intent {
    Send,
    Listen,
    Terminate,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Classification {
    Initiation,
    Continuation(SessionId),
    Malformed(String),
}

/// Decide how a request is routed. A session header always means
/// continuation; without one, only an `initialize` request sent with POST
/// starts a session.
pub fn classify(intent: Intent, session_header: Option<&HeaderValue>, body: &[u8]) -> Classification {
    if let Some(value) = session_header {
        return match value.to_str() {
            Ok(raw) if !raw.trim().is_empty() => {
                Classification::Continuation(SessionId::from(raw.trim()))
            }
            Ok(_) => Classification::Malformed("Empty session ID header".into()),
            Err(_) => Classification::Malformed("Session ID header is not valid ASCII".into()),
        };
    }

    match intent {
        Intent::Send if is_initialize(body) => Classification::Initiation,
        Intent::Send | Intent::Listen | Intent::Terminate => {
            Classification::Malformed("No valid session ID provided".into())
        }
    }
}

fn is_initialize(body: &[u8]) -> bool {
    JsonRpcMessage::from_slice(body)
        .map(|message| message.is_initialize_request())
        .unwrap_or(false)
}

pub fn build_http_app(state: AppState) -> Router {
    Router::new()
        .route(
            MCP_PATH,
            post(handle_post).get(handle_get).delete(handle_delete),
        )
        .route("/health", get(health::health_handler))
        .method_not_allowed_fallback(method_not_allowed)
        .fallback(route_not_found)
        .with_state(state)
        .layer(CatchPanicLayer::custom(panic_response))
        .layer(TraceLayer::new_for_http())
}

fn request_meta(headers: &HeaderMap) -> RequestMeta {
    let text = |name: header::HeaderName| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
    };
    RequestMeta {
        origin: text(header::ORIGIN),
        host: text(header::HOST),
    }
}

fn with_session_header(mut response: Response, id: &SessionId) -> Response {
    if let Ok(value) = HeaderValue::from_str(id.as_str()) {
        response.headers_mut().insert(SESSION_HEADER, value);
    }
    response
}

fn reply_response(reply: EndpointReply, id: &SessionId) -> Response {
    let response = match reply {
        EndpointReply::Message(message) => Json(message).into_response(),
        EndpointReply::Accepted => StatusCode::ACCEPTED.into_response(),
    };
    with_session_header(response, id)
}

/// Session id for GET and DELETE, which can never initiate.
fn existing_session(intent: Intent, headers: &HeaderMap) -> RouterResult<SessionId> {
    match classify(intent, headers.get(SESSION_HEADER), &[]) {
        Classification::Continuation(id) => Ok(id),
        Classification::Malformed(reason) => Err(RouterError::Malformed(reason)),
        Classification::Initiation => Err(RouterError::Malformed(
            "Sessions are initiated with POST".into(),
        )),
    }
}

fn lookup(state: &AppState, id: &SessionId) -> RouterResult<Arc<dyn ProtocolEndpoint>> {
    state
        .registry
        .get(id)
        .ok_or_else(|| RouterError::SessionNotFound(id.to_string()))
}

async fn handle_post(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Result<Bytes, BytesRejection>,
) -> RouterResult<Response> {
    let body = body?;
    let meta = request_meta(&headers);
    match classify(Intent::Send, headers.get(SESSION_HEADER), &body) {
        Classification::Continuation(id) => {
            let endpoint = lookup(&state, &id)?;
            let reply = endpoint
                .handle(&meta, body)
                .await
                .map_err(|e| RouterError::from_endpoint(e, &id))?;
            Ok(reply_response(reply, &id))
        }
        Classification::Initiation => initiate(&state, &meta, body).await,
        Classification::Malformed(reason) => Err(RouterError::Malformed(reason)),
    }
}

async fn initiate(state: &AppState, meta: &RequestMeta, body: Bytes) -> RouterResult<Response> {
    let endpoint = state.factory.create_endpoint()?;
    let id = endpoint.session_id().clone();

    let reply = match endpoint.handle(meta, body).await {
        Ok(reply) => reply,
        Err(e) => {
            discard(endpoint.as_ref()).await;
            return Err(RouterError::from_endpoint(e, &id));
        }
    };

    // the endpoint registered itself while answering, if it accepted
    if !endpoint.is_established() {
        discard(endpoint.as_ref()).await;
        return Err(match reply {
            EndpointReply::Message(message) => RouterError::HandshakeFailed(message),
            EndpointReply::Accepted => {
                RouterError::Malformed("initialize produced no response".into())
            }
        });
    }

    info!(session_id = %id, active = state.registry.count(), "Session initiated");
    Ok(reply_response(reply, &id))
}

async fn discard(endpoint: &dyn ProtocolEndpoint) {
    if let Err(e) = endpoint.close(CloseReason::HandshakeFailed).await {
        warn!(session_id = %endpoint.session_id(), error = %e, "Failed to close rejected endpoint");
    }
}

async fn handle_get(State(state): State<AppState>, headers: HeaderMap) -> RouterResult<Response> {
    let meta = request_meta(&headers);
    let id = existing_session(Intent::Listen, &headers)?;
    let endpoint = lookup(&state, &id)?;
    let notifications = endpoint
        .subscribe(&meta)
        .await
        .map_err(|e| RouterError::from_endpoint(e, &id))?;
    debug!(session_id = %id, "Opened notification stream");

    let events = notifications.map(|message| Event::default().event("message").json_data(message));
    let response = Sse::new(events)
        .keep_alive(KeepAlive::new().interval(state.keep_alive))
        .into_response();
    Ok(with_session_header(response, &id))
}

async fn handle_delete(State(state): State<AppState>, headers: HeaderMap) -> RouterResult<Response> {
    let meta = request_meta(&headers);
    let id = existing_session(Intent::Terminate, &headers)?;
    let endpoint = lookup(&state, &id)?;
    endpoint
        .terminate(&meta)
        .await
        .map_err(|e| RouterError::from_endpoint(e, &id))?;

    // usually already detached by the close event
    state.registry.remove(&id, CloseReason::ClientTerminated).await;
    info!(session_id = %id, active = state.registry.count(), "Session terminated by client");
    Ok(StatusCode::OK.into_response())
}

async fn route_not_found(uri: Uri) -> RouterError {
    RouterError::RouteNotFound(uri.path().to_string())
}

async fn method_not_allowed(method: Method) -> RouterError {
    RouterError::MethodNotAllowed(method.to_string())
}

fn panic_response(panic: Box<dyn Any + Send + 'static>) -> Response {
    let detail = if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else {
        "unknown panic payload".to_string()
    };
    RouterError::Internal(format!("handler panicked: {detail}")).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    const INIT: &[u8] = br#"{"jsonrpc":"2.0","id":1,"method":"initialize","params":{"protocolVersion":"2025-06-18","capabilities":{},"clientInfo":{"name":"t","version":"1"}}}"#;
    const PING: &[u8] = br#"{"jsonrpc":"2.0","id":2,"method":"ping"}"#;

    #[test]
    fn test_initialize_without_header_is_initiation() {
        assert_eq!(classify(Intent::Send, None, INIT), Classification::Initiation);
    }

    #[test]
    fn test_header_means_continuation() {
        let header = HeaderValue::from_static("  abc123 ");
        assert_eq!(
            classify(Intent::Send, Some(&header), PING),
            Classification::Continuation(SessionId::from("abc123"))
        );
        assert_eq!(
            classify(Intent::Terminate, Some(&header), &[]),
            Classification::Continuation(SessionId::from("abc123"))
        );
    }

    #[test]
    fn test_malformed_cases() {
        let blank = HeaderValue::from_static("   ");
        let non_ascii = HeaderValue::from_bytes(b"caf\xe9").unwrap();

        let malformed = |intent: Intent, header: Option<&HeaderValue>, body: &[u8]| {
            matches!(classify(intent, header, body), Classification::Malformed(_))
        };

        assert!(malformed(Intent::Send, None, PING));
        assert!(malformed(Intent::Send, None, b"not json"));
        assert!(malformed(Intent::Send, None, b""));
        assert!(malformed(Intent::Listen, None, b""));
        assert!(malformed(Intent::Terminate, None, b""));
        assert!(malformed(Intent::Listen, None, INIT));
        assert!(malformed(Intent::Send, Some(&blank), INIT));
        assert!(malformed(Intent::Send, Some(&non_ascii), PING));
    }

    #[test]
    fn test_panic_response_shape() {
        let response = panic_response(Box::new("boom"));
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
