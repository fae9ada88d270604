// ABOUTME: Application lifecycle: mirror readiness, socket ownership and ordered shutdown
// ABOUTME: start() brings up the reaper, refresher and HTTP server; stop() tears them down in order

use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::net::TcpListener;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uidocs_mcp_core::{methods, JsonRpcNotification};
use uidocs_mcp_tools::{CapabilitySet, DocsLibrary, ToolError};
use uidocs_mirror::{DocsMirror, GitMirror, LocalDocsDir, MirrorConfig};

use crate::config::ServerConfig;
use crate::endpoint::{EndpointFactory, OriginPolicy, ServerIdentity};
use crate::router::{build_http_app, AppState};
use crate::session::{IdleReaper, SessionRegistry, ShutdownReport};

#[derive(Debug, Error)]
pub enum AppError {
    #[error("failed to bind {address}: {source}")]
    Bind {
        address: String,
        #[source]
        source: io::Error,
    },

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("documentation catalog error: {0}")]
    Docs(#[from] ToolError),

    #[error("application already started")]
    AlreadyStarted,
}

/// A local directory when one is configured, otherwise the git mirror.
pub fn mirror_from_config(config: &MirrorConfig) -> Arc<dyn DocsMirror> {
    match &config.local_path {
        Some(path) => Arc::new(LocalDocsDir::new(path.clone())),
        None => Arc::new(GitMirror::new(config.clone())),
    }
}

struct RunningTasks {
    server: JoinHandle<io::Result<()>>,
    reaper: JoinHandle<()>,
    refresher: Option<JoinHandle<()>>,
}

pub struct Application {
    config: ServerConfig,
    registry: Arc<SessionRegistry>,
    factory: Arc<EndpointFactory>,
    mirror: Arc<dyn DocsMirror>,
    shutdown: CancellationToken,
    started: AtomicBool,
    tasks: Mutex<Option<RunningTasks>>,
}

impl Application {
    pub fn new(config: ServerConfig, mirror: Arc<dyn DocsMirror>) -> Result<Self, AppError> {
        let library = DocsLibrary::new(mirror.clone(), config.docs.clone())?;
        let registry = Arc::new(SessionRegistry::new());
        let factory = Arc::new(EndpointFactory::new(
            &registry,
            Arc::new(CapabilitySet::new(library)),
            ServerIdentity::default(),
            OriginPolicy::from_config(&config.http),
        ));

        Ok(Self {
            config,
            registry,
            factory,
            mirror,
            shutdown: CancellationToken::new(),
            started: AtomicBool::new(false),
            tasks: Mutex::new(None),
        })
    }

    pub fn registry(&self) -> &Arc<SessionRegistry> {
        &self.registry
    }

    pub fn factory(&self) -> &Arc<EndpointFactory> {
        &self.factory
    }

    pub fn state(&self) -> AppState {
        AppState::new(
            self.registry.clone(),
            self.factory.clone(),
            self.mirror.clone(),
            self.config.http.keep_alive(),
        )
    }

    pub fn router(&self) -> axum::Router {
        build_http_app(self.state())
    }

    /// Bring the server up and return the bound address.
    ///
    /// A mirror that cannot be made ready is logged and tolerated: discovery
    /// and health keep working and queries report missing documents.
    pub async fn start(&self) -> Result<SocketAddr, AppError> {
        if self.started.swap(true, Ordering::SeqCst) {
            return Err(AppError::AlreadyStarted);
        }

        match self.mirror.ensure_ready().await {
            Ok(outcome) => info!(
                revision = outcome.revision.as_deref().unwrap_or("local"),
                content_root = %self.mirror.content_root().display(),
                "Documentation mirror ready"
            ),
            Err(e) => warn!(error = %e, "Documentation mirror unavailable; serving degraded"),
        }

        let address = self.config.http.bind_address();
        let listener = TcpListener::bind(&address)
            .await
            .map_err(|source| AppError::Bind {
                address: address.clone(),
                source,
            })?;
        let local_addr = listener.local_addr()?;

        let reaper = IdleReaper::from_config(self.registry.clone(), &self.config.session)
            .spawn(self.shutdown.child_token());
        let refresher = self.config.mirror.refresh_interval().map(|interval| {
            spawn_refresher(
                self.mirror.clone(),
                self.registry.clone(),
                interval,
                self.shutdown.child_token(),
            )
        });

        let app = self.router();
        let token = self.shutdown.clone();
        let server = tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async move { token.cancelled().await })
                .await
        });

        *self.tasks.lock().await = Some(RunningTasks {
            server,
            reaper,
            refresher,
        });

        info!(
            address = %local_addr,
            session_timeout_secs = self.config.session.timeout_secs,
            sweep_interval_secs = self.config.session.sweep_interval_secs,
            "MCP server listening on http://{}/mcp",
            local_addr
        );
        Ok(local_addr)
    }

    /// Stop accepting, close every session, then release the socket.
    /// Also drains the registry when `start` failed part way. Later calls
    /// are no-ops.
    pub async fn stop(&self) -> ShutdownReport {
        let tasks = self.tasks.lock().await.take();
        if tasks.is_none() && self.registry.is_closed() {
            return ShutdownReport::default();
        }
        info!(active = self.registry.count(), "Shutting down");

        self.factory.stop_accepting();
        let report = self.registry.shutdown().await;

        // the listener stays bound until every session is closed
        self.shutdown.cancel();

        if let Some(tasks) = tasks {
            self.join_tasks(tasks).await;
        }

        info!(closed = report.closed, failed = report.failed, "Shutdown complete");
        report
    }

    async fn join_tasks(&self, tasks: RunningTasks) {
        let mut server = tasks.server;
        match tokio::time::timeout(self.config.http.shutdown_grace(), &mut server).await {
            Ok(Ok(Ok(()))) => info!("HTTP listener released"),
            Ok(Ok(Err(e))) => warn!(error = %e, "HTTP server exited with an error"),
            Ok(Err(e)) => warn!(error = %e, "HTTP server task failed"),
            Err(_) => {
                warn!(
                    grace_secs = self.config.http.shutdown_grace().as_secs(),
                    "Connections still open after grace period; aborting"
                );
                server.abort();
            }
        }

        if let Some(refresher) = tasks.refresher {
            refresher.abort();
        }
        if let Err(e) = tasks.reaper.await {
            warn!(error = %e, "Idle reaper task failed");
        }
    }

    /// Run until `signal` resolves, then stop.
    pub async fn serve_until<F>(&self, signal: F) -> Result<ShutdownReport, AppError>
    where
        F: Future<Output = ()>,
    {
        self.start().await?;
        signal.await;
        Ok(self.stop().await)
    }
}

/// Re-sync the mirror periodically and tell every session when the
/// documentation changed.
fn spawn_refresher(
    mirror: Arc<dyn DocsMirror>,
    registry: Arc<SessionRegistry>,
    interval: Duration,
    shutdown: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {
                    match mirror.ensure_ready().await {
                        Ok(outcome) if outcome.changed => {
                            let notified = registry.notify_all(JsonRpcNotification::new(
                                methods::NOTIFICATION_RESOURCES_LIST_CHANGED,
                                None,
                            ));
                            info!(
                                revision = outcome.revision.as_deref().unwrap_or("unknown"),
                                notified,
                                "Documentation updated"
                            );
                        }
                        Ok(_) => debug!("Documentation unchanged"),
                        Err(e) => warn!(error = %e, "Documentation refresh failed"),
                    }
                }
            }
        }
        debug!("Mirror refresher stopped");
    })
}
