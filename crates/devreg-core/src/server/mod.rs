//! Loopback HTTP server holding the worker registry.
//!
//! Exactly one process on the machine serves the registry: whoever wins the
//! bind on the well-known port. Losers see `AddrInUse` from [`RegistryServer::bind`]
//! and carry on as plain clients.
//!
//! # Endpoints
//!
//! | Method | Path | Effect |
//! |---|---|---|
//! | GET | `/workers` | full snapshot |
//! | POST | `/workers/:name` | upsert (full replace) |
//! | DELETE | `/workers/:name` | idempotent remove |
//! | DELETE | `/workers` | clear all |
//! | GET | `/health` | readiness check |

pub mod handlers;
pub mod liveness;
pub mod store;

pub use liveness::{ReachabilityProbe, TcpProbe};
pub use store::WorkerStore;

use crate::config::{LivenessPolicy, RegistryConfig, RegistrySettings};
use crate::error::{RegistryError, Result};
use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use handlers::{handle_clear, handle_health, handle_list, handle_remove, handle_upsert};
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::{oneshot, watch};
use tower_http::trace::TraceLayer;
use tracing::{error, info};

/// State shared across handlers.
pub struct AppState {
    pub store: WorkerStore,
}

/// Result of trying to claim the registry port.
#[derive(Debug)]
pub enum BindOutcome {
    /// This process owns the port.
    Bound(TcpListener),
    /// Another listener holds the port.
    AddrInUse,
}

/// Build the registry router over `store`.
pub fn router(store: WorkerStore) -> Router {
    let state = Arc::new(AppState { store });

    Router::new()
        .route("/health", get(handle_health))
        .route("/workers", get(handle_list).delete(handle_clear))
        .route("/workers/:name", post(handle_upsert).delete(handle_remove))
        .layer(DefaultBodyLimit::max(RegistryConfig::MAX_BODY_BYTES))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Entry points for starting the registry server.
pub struct RegistryServer;

impl RegistryServer {
    /// Try to bind the registry listener on `addr`.
    ///
    /// "Address in use" is an expected outcome, not an error. Any other bind
    /// failure propagates.
    pub fn bind(addr: SocketAddr) -> Result<BindOutcome> {
        let std_listener = match std::net::TcpListener::bind(addr) {
            Ok(listener) => listener,
            Err(e) if e.kind() == io::ErrorKind::AddrInUse => return Ok(BindOutcome::AddrInUse),
            Err(e) => return Err(RegistryError::Bind { addr, source: e }),
        };
        std_listener
            .set_nonblocking(true)
            .map_err(|e| RegistryError::Bind { addr, source: e })?;
        let listener = TcpListener::from_std(std_listener)
            .map_err(|e| RegistryError::Bind { addr, source: e })?;
        Ok(BindOutcome::Bound(listener))
    }

    /// Serve the registry on an already bound listener.
    ///
    /// `on_close` runs once the listener has been closed, whether through
    /// [`RegistryServerHandle::shutdown`] or because serving failed.
    pub fn serve<F>(
        listener: TcpListener,
        settings: &RegistrySettings,
        on_close: F,
    ) -> Result<RegistryServerHandle>
    where
        F: FnOnce() + Send + 'static,
    {
        Self::serve_with_probe(
            listener,
            settings,
            Arc::new(TcpProbe::new(RegistryConfig::DEFAULT_PROBE_TIMEOUT)),
            on_close,
        )
    }

    /// Like [`serve`](Self::serve) with a custom reachability probe.
    ///
    /// The probe is only consulted under [`LivenessPolicy::Probe`].
    pub fn serve_with_probe<F>(
        listener: TcpListener,
        settings: &RegistrySettings,
        probe: Arc<dyn ReachabilityProbe>,
        on_close: F,
    ) -> Result<RegistryServerHandle>
    where
        F: FnOnce() + Send + 'static,
    {
        let addr = listener.local_addr()?;
        let store = WorkerStore::new();
        let app = router(store.clone());

        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        let (sweeper_shutdown_tx, sweeper_shutdown_rx) = watch::channel(false);

        let sweeper = match settings.liveness {
            LivenessPolicy::Never => None,
            LivenessPolicy::Probe { interval, .. } => Some(liveness::spawn_sweeper(
                store.clone(),
                probe,
                interval,
                sweeper_shutdown_rx,
            )),
        };

        info!("Dev registry listening on {}", addr);

        let task_handle = tokio::spawn(async move {
            let result = axum::serve(listener, app)
                .with_graceful_shutdown(async {
                    let _ = shutdown_rx.await;
                })
                .await;
            if let Err(e) = result {
                error!("Dev registry server error: {}", e);
            }

            let _ = sweeper_shutdown_tx.send(true);
            if let Some(sweeper) = sweeper {
                let _ = sweeper.await;
            }

            info!("Dev registry on {} closed", addr);
            on_close();
        });

        Ok(RegistryServerHandle {
            addr,
            store,
            shutdown_tx: Some(shutdown_tx),
            task_handle: Some(task_handle),
        })
    }
}

/// Handle to a running registry server. Dropping aborts it without draining.
#[derive(Debug)]
pub struct RegistryServerHandle {
    addr: SocketAddr,
    store: WorkerStore,
    shutdown_tx: Option<oneshot::Sender<()>>,
    task_handle: Option<tokio::task::JoinHandle<()>>,
}

impl RegistryServerHandle {
    /// Get the address the server is listening on.
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Direct access to the in-process store, for embedding and tests.
    pub fn store(&self) -> &WorkerStore {
        &self.store
    }

    /// Shut down gracefully: stop accepting, drain in-flight requests, close.
    pub async fn shutdown(mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.task_handle.take() {
            if let Err(e) = handle.await {
                error!("Dev registry task ended abnormally: {}", e);
            }
        }
    }

    /// True once the serve task has finished.
    pub fn is_closed(&self) -> bool {
        self.task_handle
            .as_ref()
            .map_or(true, |handle| handle.is_finished())
    }
}

impl Drop for RegistryServerHandle {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.task_handle.take() {
            handle.abort();
        }
    }
}
