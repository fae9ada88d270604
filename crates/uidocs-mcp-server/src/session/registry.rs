// ABOUTME: In-memory map from session id to its live protocol endpoint
// ABOUTME: Refreshes activity on lookup, closes endpoints on removal and drains everything on shutdown

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::Serialize;
use thiserror::Error;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};
use uidocs_mcp_core::JsonRpcNotification;

use crate::endpoint::{CloseReason, ProtocolEndpoint};
use crate::session::SessionId;

#[derive(Debug, Clone, Copy, Error)]
#[error("session registry is shut down")]
pub struct RegistryClosed;

struct SessionEntry {
    endpoint: Arc<dyn ProtocolEndpoint>,
    created_at: DateTime<Utc>,
    last_activity: Instant,
}

impl SessionEntry {
    /// Moves `last_activity` strictly forward, even if the clock has not
    /// ticked since the previous touch.
    fn touch(&mut self) {
        let now = Instant::now();
        self.last_activity = if now > self.last_activity {
            now
        } else {
            self.last_activity + Duration::from_nanos(1)
        };
    }
}

/// Point-in-time view of one session, for health reporting.
#[derive(Debug, Clone, Serialize)]
pub struct SessionInfo {
    pub id: SessionId,
    pub created_at: DateTime<Utc>,
    pub idle_secs: u64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ShutdownReport {
    pub closed: usize,
    pub failed: usize,
}

/// The only shared mutable structure of the server.
///
/// Entries are inserted once, when an endpoint reports its handshake, and
/// leave through [`remove`](Self::remove), the endpoint's own close event,
/// or [`shutdown`](Self::shutdown). No map guard is held across an await.
#[derive(Default)]
pub struct SessionRegistry {
    sessions: DashMap<SessionId, SessionEntry>,
    closed: AtomicBool,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up a session and mark it active.
    pub fn get(&self, id: &SessionId) -> Option<Arc<dyn ProtocolEndpoint>> {
        let mut entry = self.sessions.get_mut(id)?;
        entry.touch();
        Some(entry.endpoint.clone())
    }

    pub fn contains(&self, id: &SessionId) -> bool {
        self.sessions.contains_key(id)
    }

    /// Register an established endpoint under its own id.
    pub fn set(&self, endpoint: Arc<dyn ProtocolEndpoint>) -> Result<(), RegistryClosed> {
        if self.is_closed() {
            return Err(RegistryClosed);
        }

        let id = endpoint.session_id().clone();
        let entry = SessionEntry {
            endpoint: endpoint.clone(),
            created_at: Utc::now(),
            last_activity: Instant::now(),
        };
        if self.sessions.insert(id.clone(), entry).is_some() {
            error!(session_id = %id, "Session id registered twice; previous endpoint replaced");
        }

        // shutdown() or a concurrent close may have run between the check and the insert
        if self.is_closed() {
            self.sessions.remove(&id);
            return Err(RegistryClosed);
        }
        if endpoint.is_closed() {
            self.sessions.remove(&id);
            return Ok(());
        }

        info!(session_id = %id, active = self.sessions.len(), "Session established");
        Ok(())
    }

    /// Close a session's endpoint, then drop its entry. Returns false when
    /// the id was not registered; removing twice is harmless.
    pub async fn remove(&self, id: &SessionId, reason: CloseReason) -> bool {
        let Some(endpoint) = self.endpoint(id) else {
            debug!(session_id = %id, %reason, "Session already gone");
            return false;
        };

        if let Err(e) = endpoint.close(reason).await {
            warn!(session_id = %id, %reason, error = %e, "Endpoint close failed");
        }
        // usually detached already by the endpoint's close event
        self.sessions.remove(id);
        info!(session_id = %id, %reason, active = self.sessions.len(), "Session removed");
        true
    }

    /// Look up without refreshing activity. The map guard is released
    /// before returning.
    fn endpoint(&self, id: &SessionId) -> Option<Arc<dyn ProtocolEndpoint>> {
        self.sessions.get(id).map(|e| e.endpoint.clone())
    }

    /// Drop the entry without closing the endpoint; used by the endpoint's
    /// own close event.
    pub(crate) fn detach(&self, id: &SessionId, reason: CloseReason) -> bool {
        let removed = self.sessions.remove(id).is_some();
        if removed {
            debug!(session_id = %id, %reason, "Session detached on close");
        }
        removed
    }

    pub fn all_ids(&self) -> Vec<SessionId> {
        self.sessions.iter().map(|e| e.key().clone()).collect()
    }

    pub fn count(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Last activity without refreshing it.
    pub fn last_activity(&self, id: &SessionId) -> Option<Instant> {
        self.sessions.get(id).map(|e| e.last_activity)
    }

    /// Sessions idle for longer than `timeout` as of `now`.
    pub fn expired(&self, now: Instant, timeout: Duration) -> Vec<SessionId> {
        self.sessions
            .iter()
            .filter(|e| now.saturating_duration_since(e.last_activity) > timeout)
            .map(|e| e.key().clone())
            .collect()
    }

    pub fn snapshot(&self) -> Vec<SessionInfo> {
        let now = Instant::now();
        let mut sessions: Vec<SessionInfo> = self
            .sessions
            .iter()
            .map(|e| SessionInfo {
                id: e.key().clone(),
                created_at: e.created_at,
                idle_secs: now.saturating_duration_since(e.last_activity).as_secs(),
            })
            .collect();
        sessions.sort_by_key(|s| s.created_at);
        sessions
    }

    /// Broadcast to every live session; returns how many were notified.
    pub fn notify_all(&self, notification: JsonRpcNotification) -> usize {
        let endpoints: Vec<_> = self
            .sessions
            .iter()
            .map(|e| e.endpoint.clone())
            .collect();
        for endpoint in &endpoints {
            endpoint.notify(notification.clone());
        }
        endpoints.len()
    }

    /// Close every endpoint before dropping its entry, then clear the map.
    /// Later `set` calls fail.
    ///
    /// Close failures are logged and counted; they never stop the drain.
    pub async fn shutdown(&self) -> ShutdownReport {
        self.closed.store(true, Ordering::Release);

        let mut report = ShutdownReport::default();
        for id in self.all_ids() {
            let Some(endpoint) = self.endpoint(&id) else {
                continue;
            };
            match endpoint.close(CloseReason::ServerShutdown).await {
                Ok(()) => report.closed += 1,
                Err(e) => {
                    report.failed += 1;
                    warn!(session_id = %id, error = %e, "Endpoint close failed during shutdown");
                }
            }
            self.sessions.remove(&id);
        }
        self.sessions.clear();

        info!(closed = report.closed, failed = report.failed, "Session registry shut down");
        report
    }
}
