use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use thiserror::Error;
use tracing::{debug, warn};
use uidocs_mcp_tools::CapabilitySet;

use crate::endpoint::{
    CloseReason, DocsEndpoint, LifecycleObserver, OriginPolicy, ProtocolEndpoint, ServerIdentity,
};
use crate::session::{RegistryClosed, SessionId, SessionRegistry};

#[derive(Debug, Error)]
pub enum FactoryError {
    #[error("server is shutting down")]
    ShuttingDown,
}

/// Wires endpoint lifecycle events into the registry.
///
/// Holds the registry weakly so endpoints never keep it alive.
pub struct RegistryObserver {
    registry: Weak<SessionRegistry>,
}

impl RegistryObserver {
    pub fn new(registry: &Arc<SessionRegistry>) -> Self {
        Self {
            registry: Arc::downgrade(registry),
        }
    }
}

impl LifecycleObserver for RegistryObserver {
    fn established(&self, endpoint: Arc<dyn ProtocolEndpoint>) -> Result<(), RegistryClosed> {
        match self.registry.upgrade() {
            Some(registry) => registry.set(endpoint),
            None => Err(RegistryClosed),
        }
    }

    fn closed(&self, id: &SessionId, reason: CloseReason) {
        if let Some(registry) = self.registry.upgrade() {
            registry.detach(id, reason);
        }
    }
}

/// Mints a fresh, unregistered endpoint per initiation request.
pub struct EndpointFactory {
    observer: Arc<RegistryObserver>,
    capabilities: Arc<CapabilitySet>,
    identity: Arc<ServerIdentity>,
    origin_policy: Arc<OriginPolicy>,
    accepting: AtomicBool,
    created: AtomicU64,
}

impl EndpointFactory {
    pub fn new(
        registry: &Arc<SessionRegistry>,
        capabilities: Arc<CapabilitySet>,
        identity: ServerIdentity,
        origin_policy: OriginPolicy,
    ) -> Self {
        Self {
            observer: Arc::new(RegistryObserver::new(registry)),
            capabilities,
            identity: Arc::new(identity),
            origin_policy: Arc::new(origin_policy),
            accepting: AtomicBool::new(true),
            created: AtomicU64::new(0),
        }
    }

    /// A new endpoint with a freshly generated id. It registers itself
    /// only once its handshake succeeds.
    pub fn create_endpoint(&self) -> Result<Arc<dyn ProtocolEndpoint>, FactoryError> {
        if !self.is_accepting() {
            warn!("Rejecting session initiation during shutdown");
            return Err(FactoryError::ShuttingDown);
        }

        let id = SessionId::generate();
        let endpoint = DocsEndpoint::new(
            id.clone(),
            self.observer.clone(),
            self.capabilities.clone(),
            self.identity.clone(),
            self.origin_policy.clone(),
        );
        self.created.fetch_add(1, Ordering::Relaxed);
        debug!(session_id = %id, "Endpoint created");
        Ok(endpoint)
    }

    pub fn stop_accepting(&self) {
        self.accepting.store(false, Ordering::Release);
    }

    pub fn is_accepting(&self) -> bool {
        self.accepting.load(Ordering::Acquire)
    }

    pub fn created_count(&self) -> u64 {
        self.created.load(Ordering::Relaxed)
    }

    pub fn capabilities(&self) -> &Arc<CapabilitySet> {
        &self.capabilities
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::endpoint::{EndpointReply, RequestMeta};
    use bytes::Bytes;
    use serde_json::json;
    use uidocs_mcp_tools::{DocsLayout, DocsLibrary};
    use uidocs_mirror::LocalDocsDir;

    fn factory(registry: &Arc<SessionRegistry>, dir: &std::path::Path) -> EndpointFactory {
        let library =
            DocsLibrary::new(Arc::new(LocalDocsDir::new(dir)), DocsLayout::default()).unwrap();
        EndpointFactory::new(
            registry,
            Arc::new(CapabilitySet::new(library)),
            ServerIdentity::default(),
            OriginPolicy::default(),
        )
    }

    fn init_body() -> Bytes {
        Bytes::from(
            serde_json::to_vec(&json!({
                "jsonrpc": "2.0",
                "id": 1,
                "method": "initialize",
                "params": {
                    "protocolVersion": "2025-06-18",
                    "capabilities": {},
                    "clientInfo": {"name": "test", "version": "1"}
                }
            }))
            .unwrap(),
        )
    }

    #[tokio::test]
    async fn test_endpoint_registers_on_handshake() {
        let dir = tempfile::tempdir().unwrap();
        let registry = Arc::new(SessionRegistry::new());
        let factory = factory(&registry, dir.path());

        let endpoint = factory.create_endpoint().unwrap();
        assert_eq!(registry.count(), 0);

        let reply = endpoint
            .handle(&RequestMeta::default(), init_body())
            .await
            .unwrap();
        assert!(matches!(reply, EndpointReply::Message(_)));
        assert!(registry.contains(endpoint.session_id()));
        assert_eq!(factory.created_count(), 1);
    }

    #[tokio::test]
    async fn test_close_event_detaches_session() {
        let dir = tempfile::tempdir().unwrap();
        let registry = Arc::new(SessionRegistry::new());
        let factory = factory(&registry, dir.path());

        let endpoint = factory.create_endpoint().unwrap();
        endpoint
            .handle(&RequestMeta::default(), init_body())
            .await
            .unwrap();
        endpoint.terminate(&RequestMeta::default()).await.unwrap();
        assert_eq!(registry.count(), 0);
        assert!(!registry.remove(endpoint.session_id(), CloseReason::ClientTerminated).await);
    }

    #[tokio::test]
    async fn test_ids_are_unique() {
        let dir = tempfile::tempdir().unwrap();
        let registry = Arc::new(SessionRegistry::new());
        let factory = factory(&registry, dir.path());

        let ids: std::collections::HashSet<_> = (0..200)
            .map(|_| factory.create_endpoint().unwrap().session_id().clone())
            .collect();
        assert_eq!(ids.len(), 200);
    }

    #[tokio::test]
    async fn test_stop_accepting_and_closed_registry() {
        let dir = tempfile::tempdir().unwrap();
        let registry = Arc::new(SessionRegistry::new());
        let factory = factory(&registry, dir.path());

        let pending = factory.create_endpoint().unwrap();
        factory.stop_accepting();
        assert!(matches!(factory.create_endpoint(), Err(FactoryError::ShuttingDown)));

        // an endpoint minted before shutdown cannot register afterwards
        registry.shutdown().await;
        assert!(pending
            .handle(&RequestMeta::default(), init_body())
            .await
            .is_err());
        assert!(pending.is_closed());
        assert_eq!(registry.count(), 0);
    }
}
