//! Worker definitions and binding declarations.
//!
//! A [`WorkerDefinition`] is what a worker publishes about itself: where it
//! listens and which durable-object classes it hosts. The JSON shape is the
//! wire format of the registry endpoints, so field names are camelCase and
//! absent optionals are omitted rather than sent as `null`.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// Snapshot of the registry: worker name to definition.
pub type WorkerRegistry = BTreeMap<String, WorkerDefinition>;

/// Scheme used to reach a worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    Http,
    Https,
}

impl Protocol {
    pub fn as_str(&self) -> &'static str {
        match self {
            Protocol::Http => "http",
            Protocol::Https => "https",
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Protocol {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "http" => Ok(Protocol::Http),
            "https" => Ok(Protocol::Https),
            other => Err(format!("unknown protocol: {}", other)),
        }
    }
}

/// Whether the worker runs on this machine or is a remote-bound reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkerMode {
    Local,
    Remote,
}

impl WorkerMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            WorkerMode::Local => "local",
            WorkerMode::Remote => "remote",
        }
    }
}

impl fmt::Display for WorkerMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for WorkerMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "local" => Ok(WorkerMode::Local),
            "remote" => Ok(WorkerMode::Remote),
            other => Err(format!("unknown worker mode: {}", other)),
        }
    }
}

/// A durable-object class hosted by a worker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DurableObjectEntry {
    pub name: String,
    pub class_name: String,
}

/// How to reach one local worker and what it exposes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkerDefinition {
    /// Absent while the worker is still starting up.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub protocol: Option<Protocol>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
    pub mode: WorkerMode,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub headers: Option<BTreeMap<String, String>>,
    #[serde(default)]
    pub durable_objects: Vec<DurableObjectEntry>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub durable_objects_host: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub durable_objects_port: Option<u16>,
}

impl WorkerDefinition {
    /// Bare definition with no address and no durable objects.
    pub fn new(mode: WorkerMode) -> Self {
        Self {
            port: None,
            protocol: None,
            host: None,
            mode,
            headers: None,
            durable_objects: Vec::new(),
            durable_objects_host: None,
            durable_objects_port: None,
        }
    }

    pub fn local() -> Self {
        Self::new(WorkerMode::Local)
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    pub fn with_protocol(mut self, protocol: Protocol) -> Self {
        self.protocol = Some(protocol);
        self
    }

    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = Some(host.into());
        self
    }

    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers
            .get_or_insert_with(BTreeMap::new)
            .insert(key.into(), value.into());
        self
    }

    pub fn with_durable_object(
        mut self,
        name: impl Into<String>,
        class_name: impl Into<String>,
    ) -> Self {
        self.durable_objects.push(DurableObjectEntry {
            name: name.into(),
            class_name: class_name.into(),
        });
        self
    }

    pub fn with_durable_objects_address(mut self, host: impl Into<String>, port: u16) -> Self {
        self.durable_objects_host = Some(host.into());
        self.durable_objects_port = Some(port);
        self
    }

    /// `host:port` of the main endpoint, once the port is known.
    ///
    /// Host defaults to the loopback address.
    pub fn address(&self) -> Option<String> {
        let port = self.port?;
        let host = self.host.as_deref().unwrap_or("127.0.0.1");
        Some(format_host_port(host, port))
    }

    /// `host:port` for durable-object traffic, falling back to [`address`](Self::address).
    pub fn durable_objects_address(&self) -> Option<String> {
        match (self.durable_objects_host.as_deref(), self.durable_objects_port) {
            (None, None) => self.address(),
            (host, port) => {
                let host = host
                    .or(self.host.as_deref())
                    .unwrap_or("127.0.0.1");
                let port = port.or(self.port)?;
                Some(format_host_port(host, port))
            }
        }
    }
}

fn format_host_port(host: &str, port: u16) -> String {
    if host.contains(':') && !host.starts_with('[') {
        format!("[{}]:{}", host, port)
    } else {
        format!("{}:{}", host, port)
    }
}

/// A declared dependency on another worker's exposed interface.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceBinding {
    /// Name the dependency is exposed under inside the declaring worker.
    pub binding: String,
    /// Name of the target worker.
    pub service: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub environment: Option<String>,
}

/// A declared binding to a durable-object class, possibly hosted elsewhere.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DurableObjectBinding {
    pub name: String,
    pub class_name: String,
    /// Worker hosting the class; `None` means the declaring worker itself.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub script_name: Option<String>,
}

/// The binding declarations of one worker, as used by query-bound.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BindingQuery {
    #[serde(default)]
    pub services: Vec<ServiceBinding>,
    #[serde(default)]
    pub durable_objects: Vec<DurableObjectBinding>,
}

impl BindingQuery {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a query from bare target names.
    ///
    /// Binding names are set to the target names since only the targets
    /// take part in filtering.
    pub fn from_names<S, D>(service_names: S, script_names: D) -> Self
    where
        S: IntoIterator,
        S::Item: Into<String>,
        D: IntoIterator,
        D::Item: Into<String>,
    {
        let mut query = Self::new();
        for service in service_names {
            let service = service.into();
            query = query.with_service(service.clone(), service);
        }
        for script in script_names {
            let script = script.into();
            query = query.with_durable_object(script.clone(), script.clone(), Some(script));
        }
        query
    }

    pub fn with_service(mut self, binding: impl Into<String>, service: impl Into<String>) -> Self {
        self.services.push(ServiceBinding {
            binding: binding.into(),
            service: service.into(),
            environment: None,
        });
        self
    }

    pub fn with_durable_object(
        mut self,
        name: impl Into<String>,
        class_name: impl Into<String>,
        script_name: Option<String>,
    ) -> Self {
        self.durable_objects.push(DurableObjectBinding {
            name: name.into(),
            class_name: class_name.into(),
            script_name,
        });
        self
    }

    /// Worker names this query depends on, de-duplicated.
    pub fn bound_names(&self) -> BTreeSet<&str> {
        self.services
            .iter()
            .map(|s| s.service.as_str())
            .chain(
                self.durable_objects
                    .iter()
                    .filter_map(|d| d.script_name.as_deref()),
            )
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.bound_names().is_empty()
    }

    /// Keep only the entries this query is bound to.
    pub fn filter(&self, registry: &WorkerRegistry) -> WorkerRegistry {
        let names = self.bound_names();
        registry
            .iter()
            .filter(|(name, _)| names.contains(name.as_str()))
            .map(|(name, def)| (name.clone(), def.clone()))
            .collect()
    }
}
