mod common;

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use bytes::Bytes;
use serde_json::json;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use uidocs_mcp_core::JsonRpcNotification;
use uidocs_mcp_server::endpoint::NotificationStream;
use uidocs_mcp_server::{
    AppError, CloseReason, EndpointError, EndpointReply, ProtocolEndpoint, RequestMeta, SessionId,
};

use common::*;

#[tokio::test]
async fn test_initiation_refused_during_shutdown() {
    let server = test_server();
    let existing = initiate(&server.router).await;

    server.app.factory().stop_accepting();
    let report = server.app.registry().shutdown().await;
    assert_eq!(report.closed, 1);
    assert_eq!(report.failed, 0);

    let response = send(&server.router, post(None, &initialize_message(2))).await;
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body_json(response).await["error"]["code"], json!(-32003));

    let response = send(&server.router, post(Some(&existing), &ping(3))).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(server.app.registry().count(), 0);
}

#[tokio::test]
async fn test_endpoint_minted_before_shutdown_cannot_register() {
    let server = test_server();
    let registry = server.app.registry().clone();

    // created while accepting, handshake lands after the registry closed
    let endpoint = server.app.factory().create_endpoint().unwrap();
    registry.shutdown().await;

    let body = serde_json::to_vec(&initialize_message(1)).unwrap();
    let result = endpoint
        .handle(&Default::default(), body.into())
        .await;
    assert!(result.is_err());
    assert!(endpoint.is_closed());
    assert_eq!(registry.count(), 0);
    assert!(!registry.remove(endpoint.session_id(), CloseReason::ServerShutdown).await);
}

#[tokio::test]
async fn test_health_reports_sessions_and_mirror() {
    let server = test_server();
    initiate(&server.router).await;
    initiate(&server.router).await;

    let response = send(
        &server.router,
        Request::get("/health").body(Body::empty()).unwrap(),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["status"], json!("healthy"));
    assert_eq!(body["sessions"]["active"], json!(2));
    assert_eq!(body["sessions"]["created_total"], json!(2));
    assert_eq!(body["mirror"]["structurally_valid"], json!(true));

    // health is read-only
    assert_eq!(server.app.registry().count(), 2);
}

#[tokio::test]
async fn test_missing_docs_degrade_instead_of_failing() {
    let server = test_server_with(|config| {
        config.mirror.local_path = Some("/nonexistent/uidocs-test".into());
    });
    let session = initiate(&server.router).await;

    let response = send(
        &server.router,
        post(
            Some(&session),
            &json!({
                "jsonrpc": "2.0", "id": 2, "method": "tools/call",
                "params": {"name": "get_component_docs", "arguments": {"name": "button"}}
            }),
        ),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["result"]["isError"], json!(true));
}

#[tokio::test]
async fn test_start_serves_and_stop_releases_socket() {
    let server = test_server();
    let addr = server.app.start().await.expect("start");
    assert!(matches!(server.app.start().await, Err(AppError::AlreadyStarted)));

    let mut stream = TcpStream::connect(addr).await.expect("connect");
    stream
        .write_all(b"GET /health HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n")
        .await
        .unwrap();
    let mut raw = String::new();
    stream.read_to_string(&mut raw).await.unwrap();
    assert!(raw.starts_with("HTTP/1.1 200"));
    assert!(raw.contains("\"sessions\""));

    let report = server.app.stop().await;
    assert_eq!(report.failed, 0);
    assert!(!server.app.factory().is_accepting());
    assert!(server.app.registry().is_closed());
    assert!(TcpStream::connect(addr).await.is_err());

    // second stop is a no-op
    let again = server.app.stop().await;
    assert_eq!(again.closed, 0);
}

/// Session that checks, while being closed, whether the listener still
/// accepts connections.
struct ListenerCheckingSession {
    id: SessionId,
    addr: SocketAddr,
    closed: AtomicBool,
    listener_bound_at_close: AtomicBool,
}

#[async_trait]
impl ProtocolEndpoint for ListenerCheckingSession {
    fn session_id(&self) -> &SessionId {
        &self.id
    }

    fn is_established(&self) -> bool {
        true
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    async fn handle(&self, _: &RequestMeta, _: Bytes) -> Result<EndpointReply, EndpointError> {
        Ok(EndpointReply::Accepted)
    }

    async fn subscribe(&self, _: &RequestMeta) -> Result<NotificationStream, EndpointError> {
        Err(EndpointError::NotEstablished)
    }

    async fn terminate(&self, _: &RequestMeta) -> Result<(), EndpointError> {
        self.close(CloseReason::ClientTerminated).await
    }

    fn notify(&self, _: JsonRpcNotification) {}

    async fn close(&self, _: CloseReason) -> Result<(), EndpointError> {
        if !self.closed.swap(true, Ordering::SeqCst) {
            let bound = TcpStream::connect(self.addr).await.is_ok();
            self.listener_bound_at_close.store(bound, Ordering::SeqCst);
        }
        Ok(())
    }
}

#[tokio::test]
async fn test_stop_closes_sessions_before_releasing_socket() {
    let server = test_server();
    let addr = server.app.start().await.expect("start");

    let session = Arc::new(ListenerCheckingSession {
        id: SessionId::generate(),
        addr,
        closed: AtomicBool::new(false),
        listener_bound_at_close: AtomicBool::new(false),
    });
    server.app.registry().set(session.clone()).expect("register");

    let report = server.app.stop().await;
    assert_eq!(report.closed, 1);
    assert!(session.listener_bound_at_close.load(Ordering::SeqCst));
    assert!(TcpStream::connect(addr).await.is_err());
}

#[tokio::test]
async fn test_stop_after_failed_bind_still_drains_sessions() {
    let occupied = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let port = occupied.local_addr().expect("addr").port();
    let server = test_server_with(|config| {
        config.http.host = "127.0.0.1".into();
        config.http.port = port;
    });
    initiate(&server.router).await;

    assert!(matches!(server.app.start().await, Err(AppError::Bind { .. })));

    let report = server.app.stop().await;
    assert_eq!(report.closed, 1);
    assert!(!server.app.factory().is_accepting());
    assert!(server.app.registry().is_closed());
    assert_eq!(server.app.registry().count(), 0);

    let again = server.app.stop().await;
    assert_eq!(again.closed, 0);
}
