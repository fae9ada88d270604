// ABOUTME: Session-addressed MCP server over streamable HTTP
// ABOUTME: Owns the session registry, idle reaper, endpoint factory, request router and app lifecycle

pub mod app;
pub mod config;
pub mod endpoint;
pub mod error;
pub mod health;
pub mod logging;
pub mod router;
pub mod session;

pub use app::{mirror_from_config, AppError, Application};
pub use config::{ConfigError, HttpConfig, LoggingConfig, ServerConfig, SessionConfig};
pub use endpoint::{
    CloseReason, EndpointError, EndpointFactory, EndpointReply, LifecycleObserver, OriginPolicy,
    ProtocolEndpoint, RequestMeta, ServerIdentity,
};
pub use error::RouterError;
pub use health::HealthReport;
pub use router::{
    build_http_app, classify, AppState, Classification, Intent, MCP_PATH, SESSION_HEADER,
};
pub use session::{
    IdleReaper, RegistryClosed, SessionId, SessionInfo, SessionRegistry, ShutdownReport,
};
