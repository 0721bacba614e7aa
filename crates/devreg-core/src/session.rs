//! Process-scoped registry handle.
//!
//! [`DevRegistry`] is the single place a process keeps track of whether it
//! serves the registry. Its lifecycle:
//!
//! - **init**: [`DevRegistry::start`] wins the bind on the well-known port and
//!   stores the server handle. Losing the bind is not an error; the process
//!   is then a plain client.
//! - **teardown**: [`DevRegistry::stop`] drains and closes the server and
//!   clears the handle. If the server closes for any other reason its close
//!   hook clears the handle too, so a later `start` retries the bind.
//!
//! Error handling differs per operation. `register` only logs failures to
//! reach the registry. `list` maps "registry absent" to `None`, and
//! `unregister`/`clear` treat it as success; all three return any other
//! failure to the caller.

use crate::client::RegistryClient;
use crate::config::{LivenessPolicy, RegistryConfig, RegistrySettings};
use crate::definition::{BindingQuery, WorkerDefinition, WorkerRegistry};
use crate::error::{RegistryError, Result};
use crate::server::{
    BindOutcome, ReachabilityProbe, RegistryServer, RegistryServerHandle, TcpProbe,
};
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, MutexGuard, OnceLock};
use tracing::{debug, error, info};

/// What [`DevRegistry::start`] found.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartOutcome {
    /// This call bound the port and started serving.
    Started(SocketAddr),
    /// This process was already serving.
    AlreadyOwned(SocketAddr),
    /// Another process holds the port; this process is a client only.
    ServedElsewhere,
}

struct RunningServer {
    generation: u64,
    handle: RegistryServerHandle,
}

#[derive(Default)]
struct ServerSlot {
    next_generation: u64,
    running: Option<RunningServer>,
}

/// A process's view of the dev registry.
pub struct DevRegistry {
    settings: RegistrySettings,
    client: RegistryClient,
    probe: Arc<dyn ReachabilityProbe>,
    slot: Arc<Mutex<ServerSlot>>,
}

static GLOBAL: OnceLock<DevRegistry> = OnceLock::new();

impl DevRegistry {
    /// Create an independent registry handle.
    pub fn new(settings: RegistrySettings) -> Result<Self> {
        settings.validate()?;
        let timeout = match settings.liveness {
            LivenessPolicy::Probe { timeout, .. } => timeout,
            LivenessPolicy::Never => RegistryConfig::DEFAULT_PROBE_TIMEOUT,
        };
        Ok(Self {
            client: RegistryClient::new(&settings)?,
            probe: Arc::new(TcpProbe::new(timeout)),
            settings,
            slot: Arc::new(Mutex::new(ServerSlot::default())),
        })
    }

    /// Replace the reachability probe used when this handle starts a server.
    pub fn with_probe(mut self, probe: Arc<dyn ReachabilityProbe>) -> Self {
        self.probe = probe;
        self
    }

    /// The process-wide handle, configured from the environment on first use.
    pub fn global() -> Result<&'static DevRegistry> {
        if let Some(registry) = GLOBAL.get() {
            return Ok(registry);
        }
        let registry = DevRegistry::new(RegistrySettings::from_env()?)?;
        // A concurrent initializer may have won; either instance is equivalent.
        Ok(GLOBAL.get_or_init(|| registry))
    }

    pub fn settings(&self) -> &RegistrySettings {
        &self.settings
    }

    fn lock_slot(slot: &Mutex<ServerSlot>) -> MutexGuard<'_, ServerSlot> {
        slot.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Start serving the registry unless someone already does.
    ///
    /// Only bind errors other than "address in use" are returned. Must be
    /// called from within a Tokio runtime.
    pub fn start(&self) -> Result<StartOutcome> {
        let mut slot = Self::lock_slot(&self.slot);

        if let Some(running) = slot.running.as_ref() {
            if !running.handle.is_closed() {
                return Ok(StartOutcome::AlreadyOwned(running.handle.addr()));
            }
            slot.running = None;
        }

        let listener = match RegistryServer::bind(self.settings.socket_addr())? {
            BindOutcome::Bound(listener) => listener,
            BindOutcome::AddrInUse => {
                debug!(
                    "Dev registry port {} already in use, acting as client",
                    self.settings.port
                );
                return Ok(StartOutcome::ServedElsewhere);
            }
        };

        let generation = slot.next_generation;
        slot.next_generation += 1;

        let hook_slot = Arc::clone(&self.slot);
        let handle = RegistryServer::serve_with_probe(
            listener,
            &self.settings,
            Arc::clone(&self.probe),
            move || {
                let mut slot = Self::lock_slot(&hook_slot);
                if slot
                    .running
                    .as_ref()
                    .is_some_and(|running| running.generation == generation)
                {
                    slot.running = None;
                }
            },
        )?;

        let addr = handle.addr();
        slot.running = Some(RunningServer { generation, handle });
        Ok(StartOutcome::Started(addr))
    }

    /// Stop the server this process owns, if any.
    ///
    /// Returns true when a server was running. Waits for in-flight requests.
    pub async fn stop(&self) -> bool {
        let running = Self::lock_slot(&self.slot).running.take();
        match running {
            Some(running) => {
                info!("Stopping dev registry on {}", running.handle.addr());
                running.handle.shutdown().await;
                true
            }
            None => false,
        }
    }

    /// True while this process serves the registry.
    pub fn is_serving(&self) -> bool {
        Self::lock_slot(&self.slot)
            .running
            .as_ref()
            .is_some_and(|running| !running.handle.is_closed())
    }

    /// Publish `definition` under `name`, starting the registry if nobody serves it.
    ///
    /// Failing to reach the registry is logged, never returned: discovery is
    /// optional for a worker. Only a fatal startup error is returned.
    pub async fn register(&self, name: &str, definition: &WorkerDefinition) -> Result<()> {
        self.start()?;

        match self.client.upsert(name, definition).await {
            Ok(()) => {}
            Err(e) if e.is_unavailable() => {
                debug!("Failed to register worker {} in dev registry: {}", name, e);
            }
            Err(e) => {
                error!("Failed to register worker {} in dev registry: {}", name, e);
            }
        }
        Ok(())
    }

    /// Remove `name`. Succeeds when the registry is not running.
    pub async fn unregister(&self, name: &str) -> Result<()> {
        match self.client.remove(name).await {
            Err(e) if e.is_unavailable() => {
                debug!("Failed to unregister worker {} from dev registry: {}", name, e);
                Ok(())
            }
            other => other,
        }
    }

    /// Full registry snapshot, or `None` when no registry is running.
    pub async fn list(&self) -> Result<Option<WorkerRegistry>> {
        match self.client.list().await {
            Ok(registry) => Ok(Some(registry)),
            Err(e) if e.is_unavailable() => {
                debug!("Dev registry not available: {}", e);
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    /// Drop every entry. Succeeds when the registry is not running.
    pub async fn clear(&self) -> Result<()> {
        match self.client.clear().await {
            Err(e) if e.is_unavailable() => {
                debug!("Dev registry not available for clear: {}", e);
                Ok(())
            }
            other => other,
        }
    }

    /// Entries for the workers `query` is bound to.
    ///
    /// Empty when the registry is unreachable or nothing matches. Errors from
    /// the underlying `list` propagate, even for an empty query.
    pub async fn query_bound(&self, query: &BindingQuery) -> Result<WorkerRegistry> {
        Ok(self
            .list()
            .await?
            .map(|registry| query.filter(&registry))
            .unwrap_or_default())
    }
}

impl std::fmt::Debug for DevRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DevRegistry")
            .field("settings", &self.settings)
            .field("serving", &self.is_serving())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings_on_free_port() -> RegistrySettings {
        let port = {
            let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().port()
        };
        RegistrySettings::default().with_port(port)
    }

    #[tokio::test]
    async fn test_start_twice_in_process_reuses_server() {
        let registry = DevRegistry::new(settings_on_free_port()).unwrap();

        let first = registry.start().unwrap();
        assert!(matches!(first, StartOutcome::Started(_)));
        let second = registry.start().unwrap();
        assert!(matches!(second, StartOutcome::AlreadyOwned(_)));
        assert!(registry.is_serving());

        assert!(registry.stop().await);
        assert!(!registry.is_serving());
        assert!(!registry.stop().await);
    }

    #[tokio::test]
    async fn test_restart_after_stop_gets_fresh_registry() {
        let registry = DevRegistry::new(settings_on_free_port()).unwrap();

        registry
            .register("w", &WorkerDefinition::local().with_port(1))
            .await
            .unwrap();
        registry.stop().await;

        assert!(matches!(registry.start().unwrap(), StartOutcome::Started(_)));
        assert_eq!(registry.list().await.unwrap(), Some(WorkerRegistry::new()));
        registry.stop().await;
    }

    #[tokio::test]
    async fn test_bind_error_other_than_in_use_propagates() {
        // 192.0.2.0/24 is TEST-NET-1: not a local address, so bind fails.
        let mut settings = settings_on_free_port();
        settings.host = "192.0.2.1".parse().unwrap();
        let registry = DevRegistry {
            client: RegistryClient::new(&settings).unwrap(),
            probe: Arc::new(TcpProbe::new(std::time::Duration::from_millis(10))),
            settings,
            slot: Arc::new(Mutex::new(ServerSlot::default())),
        };

        let err = registry.start().unwrap_err();
        assert!(matches!(err, RegistryError::Bind { .. }));
        let err = registry
            .register("w", &WorkerDefinition::local())
            .await
            .unwrap_err();
        assert!(matches!(err, RegistryError::Bind { .. }));
    }

    #[tokio::test]
    async fn test_empty_query_without_registry_is_empty() {
        let registry = DevRegistry::new(settings_on_free_port()).unwrap();
        let bound = registry.query_bound(&BindingQuery::new()).await.unwrap();
        assert!(bound.is_empty());
    }
}
