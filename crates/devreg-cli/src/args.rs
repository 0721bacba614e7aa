//! Command-line arguments.

use clap::{Parser, Subcommand};
use devreg_core::{Protocol, WorkerDefinition, WorkerMode};
use std::net::IpAddr;

#[derive(Parser, Debug)]
#[command(name = "devreg")]
#[command(about = "Local development service registry")]
pub struct Args {
    /// Registry host (loopback only; overrides DEVREG_HOST)
    #[arg(long, global = true)]
    pub host: Option<IpAddr>,

    /// Registry port (overrides DEVREG_PORT)
    #[arg(short, long, global = true)]
    pub port: Option<u16>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    pub debug: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the registry until interrupted
    Serve(ServeArgs),

    /// Print every registered worker
    List {
        /// Print raw JSON
        #[arg(long)]
        json: bool,
    },

    /// Register a worker definition
    Register(RegisterArgs),

    /// Remove a worker
    Unregister { name: String },

    /// Remove every worker
    Clear,

    /// Show registered workers matching the given bindings
    Bound {
        /// Service binding target (repeatable)
        #[arg(long = "service")]
        services: Vec<String>,

        /// Durable-object script name (repeatable)
        #[arg(long = "script")]
        scripts: Vec<String>,

        /// Print raw JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(clap::Args, Debug)]
pub struct ServeArgs {
    /// Evict unreachable local workers, probing every N seconds
    #[arg(long, value_name = "SECS", value_parser = clap::value_parser!(u64).range(1..))]
    pub probe_interval: Option<u64>,

    /// Connect timeout for each probe
    #[arg(long, value_name = "MS", default_value = "1000", value_parser = clap::value_parser!(u64).range(1..))]
    pub probe_timeout_ms: u64,
}

#[derive(clap::Args, Debug)]
pub struct RegisterArgs {
    pub name: String,

    /// Port the worker listens on
    #[arg(long = "worker-port")]
    pub worker_port: Option<u16>,

    #[arg(long)]
    pub protocol: Option<Protocol>,

    /// Host the worker listens on
    #[arg(long = "worker-host")]
    pub worker_host: Option<String>,

    #[arg(long, default_value = "local")]
    pub mode: WorkerMode,

    /// Hosted durable object as NAME=CLASS (repeatable)
    #[arg(long = "durable-object", value_parser = parse_pair)]
    pub durable_objects: Vec<(String, String)>,

    /// Extra request header as KEY=VALUE (repeatable)
    #[arg(long = "header", value_parser = parse_pair)]
    pub headers: Vec<(String, String)>,

    /// Host for durable-object traffic
    #[arg(long)]
    pub do_host: Option<String>,

    /// Port for durable-object traffic
    #[arg(long)]
    pub do_port: Option<u16>,
}

impl RegisterArgs {
    pub fn into_definition(self) -> WorkerDefinition {
        let mut definition = WorkerDefinition::new(self.mode);
        definition.port = self.worker_port;
        definition.protocol = self.protocol;
        definition.host = self.worker_host;
        for (name, class_name) in self.durable_objects {
            definition = definition.with_durable_object(name, class_name);
        }
        for (key, value) in self.headers {
            definition = definition.with_header(key, value);
        }
        definition.durable_objects_host = self.do_host;
        definition.durable_objects_port = self.do_port;
        definition
    }
}

fn parse_pair(raw: &str) -> Result<(String, String), String> {
    match raw.split_once('=') {
        Some((key, value)) if !key.is_empty() => Ok((key.to_string(), value.to_string())),
        _ => Err(format!("expected KEY=VALUE, got {:?}", raw)),
    }
}
