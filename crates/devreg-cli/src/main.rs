//! devreg - command-line front end for the local dev registry.
//!
//! `devreg serve` runs the registry for a dev session; the other commands
//! inspect or edit it from a terminal.

mod args;
mod output;

use anyhow::{Context, Result};
use args::{Args, Command, RegisterArgs, ServeArgs};
use clap::Parser;
use devreg_core::{
    BindingQuery, DevRegistry, LivenessPolicy, RegistrySettings, StartOutcome,
};
use std::time::Duration;
use tracing::{info, warn, Level};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Set up logging
    let default_level = if args.debug { Level::DEBUG } else { Level::INFO };
    let filter = EnvFilter::builder()
        .with_default_directive(default_level.into())
        .from_env_lossy();
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .compact()
        .init();

    let mut settings = RegistrySettings::from_env().context("Invalid registry environment")?;
    if let Some(host) = args.host {
        settings = settings.with_host(host);
    }
    if let Some(port) = args.port {
        settings = settings.with_port(port);
    }

    match args.command {
        Command::Serve(serve) => run_serve(settings, serve).await,
        Command::List { json } => {
            let registry = DevRegistry::new(settings)?;
            match registry.list().await? {
                Some(workers) => output::print_registry(&workers, json)?,
                None => output::print_unavailable(registry.settings()),
            }
            Ok(())
        }
        Command::Register(register) => run_register(settings, register).await,
        Command::Unregister { name } => {
            DevRegistry::new(settings)?.unregister(&name).await?;
            Ok(())
        }
        Command::Clear => {
            DevRegistry::new(settings)?.clear().await?;
            Ok(())
        }
        Command::Bound {
            services,
            scripts,
            json,
        } => {
            let registry = DevRegistry::new(settings)?;
            let query = BindingQuery::from_names(services, scripts);
            if query.is_empty() {
                warn!("No --service or --script given, nothing can match");
            }
            let bound = registry.query_bound(&query).await?;
            output::print_registry(&bound, json)?;
            Ok(())
        }
    }
}

async fn run_serve(settings: RegistrySettings, serve: ServeArgs) -> Result<()> {
    let mut settings = settings;
    if let Some(secs) = serve.probe_interval {
        settings = settings.with_liveness(LivenessPolicy::Probe {
            interval: Duration::from_secs(secs),
            timeout: Duration::from_millis(serve.probe_timeout_ms),
        });
    }
    let registry = DevRegistry::new(settings)?;

    match registry.start()? {
        StartOutcome::Started(addr) | StartOutcome::AlreadyOwned(addr) => {
            // Machine-readable line for the session that spawned us.
            println!("DEVREG_PORT={}", addr.port());
            info!("Dev registry running on {}", addr);
        }
        StartOutcome::ServedElsewhere => {
            println!("DEVREG_ALREADY_RUNNING={}", registry.settings().port);
            info!(
                "Dev registry already served on port {}, nothing to do",
                registry.settings().port
            );
            return Ok(());
        }
    }

    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received, stopping dev registry");
    registry.stop().await;
    Ok(())
}

async fn run_register(settings: RegistrySettings, register: RegisterArgs) -> Result<()> {
    let registry = DevRegistry::new(settings)?;
    let name = register.name.clone();
    let definition = register.into_definition();

    registry.register(&name, &definition).await?;

    if registry.is_serving() {
        // The registry lives in this process; keep it up until interrupted.
        info!(
            "Registered {} and serving the dev registry; press Ctrl-C to stop",
            name
        );
        tokio::signal::ctrl_c().await?;
        registry.unregister(&name).await?;
        registry.stop().await;
    } else {
        info!("Registered {}", name);
    }
    Ok(())
}
