//! Background eviction of workers that stopped answering.
//!
//! Only runs under [`LivenessPolicy::Probe`](crate::config::LivenessPolicy).
//! With the default policy entries never expire.

use super::store::WorkerStore;
use crate::definition::{WorkerDefinition, WorkerMode};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::watch;
use tracing::{debug, info, warn};

/// Decides whether a registered worker is still reachable.
#[async_trait::async_trait]
pub trait ReachabilityProbe: Send + Sync + 'static {
    async fn is_reachable(&self, definition: &WorkerDefinition) -> bool;
}

/// Probe that opens a TCP connection to the worker's main address.
#[derive(Debug, Clone)]
pub struct TcpProbe {
    timeout: Duration,
}

impl TcpProbe {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

#[async_trait::async_trait]
impl ReachabilityProbe for TcpProbe {
    async fn is_reachable(&self, definition: &WorkerDefinition) -> bool {
        let Some(addr) = definition.address() else {
            return true;
        };
        match tokio::time::timeout(self.timeout, TcpStream::connect(addr.as_str())).await {
            Ok(Ok(_)) => true,
            Ok(Err(e)) => {
                debug!("Probe of {} failed: {}", addr, e);
                false
            }
            Err(_) => {
                debug!("Probe of {} timed out after {:?}", addr, self.timeout);
                false
            }
        }
    }
}

/// True for entries the sweeper is allowed to evict.
fn is_probeable(definition: &WorkerDefinition) -> bool {
    definition.mode == WorkerMode::Local && definition.port.is_some()
}

/// Probe every eligible entry once and evict the unreachable ones.
///
/// An entry re-registered while its probe was in flight is kept.
/// Returns the evicted names.
pub async fn sweep_once(store: &WorkerStore, probe: &dyn ReachabilityProbe) -> Vec<String> {
    let snapshot = store.snapshot().await;
    let mut evicted = Vec::new();

    for (name, definition) in snapshot.iter().filter(|(_, d)| is_probeable(d)) {
        if probe.is_reachable(definition).await {
            continue;
        }
        if store.remove_if_unchanged(name, definition).await {
            warn!("Evicted unreachable worker {}", name);
            evicted.push(name.clone());
        }
    }

    evicted
}

/// Spawn the periodic sweeper. It exits when `shutdown_rx` flips to true.
pub(crate) fn spawn_sweeper(
    store: WorkerStore,
    probe: Arc<dyn ReachabilityProbe>,
    interval: Duration,
    mut shutdown_rx: watch::Receiver<bool>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        info!("Liveness sweeper running every {:?}", interval);
        let mut ticker = tokio::time::interval(interval);
        // The first tick completes immediately; skip it so fresh entries get a grace period.
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    sweep_once(&store, probe.as_ref()).await;
                }
                _ = shutdown_rx.changed() => break,
            }
        }

        debug!("Liveness sweeper stopped");
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    /// Probe that treats a fixed set of ports as dead.
    struct DeadPorts(HashSet<u16>);

    #[async_trait::async_trait]
    impl ReachabilityProbe for DeadPorts {
        async fn is_reachable(&self, definition: &WorkerDefinition) -> bool {
            definition.port.map_or(true, |p| !self.0.contains(&p))
        }
    }

    #[tokio::test]
    async fn test_sweep_evicts_only_dead_local_workers() {
        let store = WorkerStore::new();
        store
            .upsert("alive".into(), WorkerDefinition::local().with_port(1000))
            .await;
        store
            .upsert("dead".into(), WorkerDefinition::local().with_port(2000))
            .await;
        store
            .upsert(
                "remote".into(),
                WorkerDefinition::new(WorkerMode::Remote).with_port(2000),
            )
            .await;
        store
            .upsert("starting".into(), WorkerDefinition::local())
            .await;

        let probe = DeadPorts(HashSet::from([2000]));
        let evicted = sweep_once(&store, &probe).await;

        assert_eq!(evicted, vec!["dead".to_string()]);
        let remaining = store.snapshot().await;
        assert!(remaining.contains_key("alive"));
        assert!(remaining.contains_key("remote"));
        assert!(remaining.contains_key("starting"));
    }

    #[tokio::test]
    async fn test_tcp_probe_detects_listener() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let probe = TcpProbe::new(Duration::from_millis(500));

        let def = WorkerDefinition::local().with_port(port);
        assert!(probe.is_reachable(&def).await);

        drop(listener);
        assert!(!probe.is_reachable(&def).await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweeper_stops_on_shutdown() {
        let store = WorkerStore::new();
        store
            .upsert("dead".into(), WorkerDefinition::local().with_port(9))
            .await;
        let (tx, rx) = watch::channel(false);
        let handle = spawn_sweeper(
            store.clone(),
            Arc::new(DeadPorts(HashSet::from([9]))),
            Duration::from_secs(5),
            rx,
        );

        tokio::time::sleep(Duration::from_secs(6)).await;
        assert!(store.is_empty().await);

        tx.send(true).unwrap();
        handle.await.unwrap();
    }
}
