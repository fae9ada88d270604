#![allow(dead_code)]

use std::fs;

use axum::body::Body;
use axum::http::{Method, Request, Response, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tempfile::TempDir;
use tower::ServiceExt;
use uidocs_mcp_server::{mirror_from_config, Application, ServerConfig, SESSION_HEADER};

const BUTTON: &str = r#"---
title: Button
description: Displays a button or a component that looks like a button.
---

## Usage

```tsx
<Button variant="outline">Button</Button>
```
"#;

pub struct TestServer {
    pub app: Application,
    pub router: Router,
    _docs: TempDir,
}

pub fn docs_fixture() -> TempDir {
    let dir = tempfile::tempdir().expect("tempdir");
    fs::write(dir.path().join("button.mdx"), BUTTON).expect("write fixture");
    dir
}

pub fn test_config(docs: &TempDir) -> ServerConfig {
    let mut config = ServerConfig::default();
    config.http.port = 0;
    config.mirror.local_path = Some(docs.path().to_path_buf());
    config
}

pub fn test_server() -> TestServer {
    test_server_with(|_| {})
}

pub fn test_server_with(customize: impl FnOnce(&mut ServerConfig)) -> TestServer {
    let docs = docs_fixture();
    let mut config = test_config(&docs);
    customize(&mut config);
    let mirror = mirror_from_config(&config.mirror);
    let app = Application::new(config, mirror).expect("application");
    let router = app.router();
    TestServer {
        app,
        router,
        _docs: docs,
    }
}

pub fn initialize_message(id: i64) -> Value {
    json!({
        "jsonrpc": "2.0",
        "id": id,
        "method": "initialize",
        "params": {
            "protocolVersion": "2025-06-18",
            "capabilities": {},
            "clientInfo": {"name": "integration-test", "version": "1.0.0"}
        }
    })
}

pub fn request(method: Method, session: Option<&str>, body: Option<&Value>) -> Request<Body> {
    let mut builder = Request::builder()
        .method(method)
        .uri("/mcp")
        .header("content-type", "application/json")
        .header("accept", "application/json, text/event-stream");
    if let Some(session) = session {
        builder = builder.header(SESSION_HEADER, session);
    }
    let body = match body {
        Some(value) => Body::from(serde_json::to_vec(value).expect("encode")),
        None => Body::empty(),
    };
    builder.body(body).expect("request")
}

pub fn post(session: Option<&str>, body: &Value) -> Request<Body> {
    request(Method::POST, session, Some(body))
}

pub async fn send(router: &Router, request: Request<Body>) -> Response<Body> {
    router.clone().oneshot(request).await.expect("infallible")
}

pub async fn body_json(response: Response<Body>) -> Value {
    let bytes = response
        .into_body()
        .collect()
        .await
        .expect("body")
        .to_bytes();
    serde_json::from_slice(&bytes).expect("json body")
}

pub fn session_header(response: &Response<Body>) -> Option<String> {
    response
        .headers()
        .get(SESSION_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

/// Run the handshake and return the issued session id.
pub async fn initiate(router: &Router) -> String {
    let response = send(router, post(None, &initialize_message(1))).await;
    assert_eq!(response.status(), StatusCode::OK);
    session_header(&response).expect("session header on initialize response")
}

pub fn ping(id: i64) -> Value {
    json!({"jsonrpc": "2.0", "id": id, "method": "ping"})
}
