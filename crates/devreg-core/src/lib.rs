//! Devreg Core - local development service registry.
//!
//! Lets independently started local workers find each other without an
//! orchestrator. One process on the machine serves a small HTTP registry on
//! a fixed loopback port; every other process talks to it as a client. Which
//! process serves is decided by who wins the bind.
//!
//! # Example
//!
//! ```rust,no_run
//! use devreg_core::{BindingQuery, DevRegistry, WorkerDefinition};
//!
//! # async fn run() -> devreg_core::Result<()> {
//! let registry = DevRegistry::global()?;
//!
//! // Publish ourselves (starts the registry if nobody serves it yet).
//! let me = WorkerDefinition::local()
//!     .with_port(8787)
//!     .with_host("127.0.0.1")
//!     .with_durable_object("COUNTER", "Counter");
//! registry.register("worker-a", &me).await?;
//!
//! // Resolve the peers we are bound to.
//! let peers = registry
//!     .query_bound(&BindingQuery::from_names(["auth"], ["chat"]))
//!     .await?;
//! for (name, peer) in &peers {
//!     println!("{} -> {:?}", name, peer.address());
//! }
//!
//! registry.unregister("worker-a").await?;
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod config;
pub mod definition;
pub mod error;
pub mod server;
pub mod session;

// Re-export commonly used types
pub use client::RegistryClient;
pub use config::{LivenessPolicy, RegistryConfig, RegistrySettings};
pub use definition::{
    BindingQuery, DurableObjectBinding, DurableObjectEntry, Protocol, ServiceBinding,
    WorkerDefinition, WorkerMode, WorkerRegistry,
};
pub use error::{RegistryError, Result};
pub use server::{
    BindOutcome, ReachabilityProbe, RegistryServer, RegistryServerHandle, TcpProbe, WorkerStore,
};
pub use session::{DevRegistry, StartOutcome};
