//! Resource resolver service.
//!
//! # Architecture Overview
//!
//! ```text
//!                      ┌──────────────────────────────────────────────────────┐
//!                      │                  RESOURCE RESOLVER                    │
//!                      │                                                       │
//!   GET /resolve       │  ┌─────────┐    ┌──────────┐    ┌──────────────────┐ │
//!   ───────────────────┼─▶│  http   │───▶│ resolver │───▶│  mapping table   │ │
//!                      │  │ server  │    │          │    │ configured maps  │ │
//!                      │  └─────────┘    └────┬─────┘    │ alias index      │ │
//!                      │                      │          │ vanity index     │ │
//!                      │                      ▼          └────────┬─────────┘ │
//!                      │               ┌─────────────┐            │           │
//!                      │               │    store    │◀───────────┘           │
//!                      │               │ (in-memory) │  paged queries         │
//!                      │               └──────▲──────┘                        │
//!                      │                      │ fixture reloads               │
//!                      │               ┌──────┴──────┐   change batches       │
//!                      │               │   watcher   │──────────▶ on_change   │
//!                      │               └─────────────┘                        │
//!                      └──────────────────────────────────────────────────────┘
//! ```

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::net::TcpListener;

use resource_resolver::config::{load_config, FixtureWatcher, ResolverConfig};
use resource_resolver::http::HttpServer;
use resource_resolver::lifecycle::{self, build_engine, spawn_change_dispatcher, Shutdown};
use resource_resolver::observability::{init_tracing, metrics};
use resource_resolver::resolver::RequestContext;

#[derive(Parser)]
#[command(name = "resource-resolver")]
#[command(about = "Resolves request paths against aliases, vanity paths and configured mappings", long_about = None)]
struct Cli {
    /// TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Request URL used as context for one-shot commands
    #[arg(short, long)]
    url: Option<String>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the inspection HTTP server (default)
    Serve,
    /// Resolve one request path and print the result
    Resolve { path: String },
    /// Print every mapping of one resource path
    Map { path: String },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => load_config(path)?,
        None => ResolverConfig::default(),
    };
    init_tracing(&config.observability)?;

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        map_root = %config.mapping.map_root,
        alias_optimized = config.alias.optimized,
        vanity_background_init = config.vanity.background_init,
        "resource-resolver starting"
    );

    let context = match cli.url.as_deref() {
        Some(url) => Some(RequestContext::from_url(url).ok_or_else(|| format!("Invalid url: {}", url))?),
        None => None,
    };

    match cli.command.unwrap_or(Commands::Serve) {
        Commands::Serve => serve(config).await,
        Commands::Resolve { path } => {
            let engine = build_engine(Arc::new(config))?;
            engine.table.vanity().wait_until_ready().await;
            let resolution = engine.resolver.resolve(&path, context.as_ref())?;
            println!("{}", serde_json::to_string_pretty(&resolution)?);
            Ok(())
        }
        Commands::Map { path } => {
            let engine = build_engine(Arc::new(config))?;
            engine.table.vanity().wait_until_ready().await;
            for mapping in engine.resolver.all_mappings(&path, context.as_ref()) {
                println!("{}", mapping);
            }
            Ok(())
        }
    }
}

async fn serve(config: ResolverConfig) -> Result<(), Box<dyn std::error::Error>> {
    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let config = Arc::new(config);
    let engine = build_engine(Arc::clone(&config))?;
    let shutdown = Shutdown::new();

    // Dropping the watcher stops it, so it lives until main returns.
    let mut _watcher = None;
    let mut dispatcher = None;
    if let (true, Some(path)) = (config.content.watch, &config.content.fixture_path) {
        let (watcher, changes) = FixtureWatcher::new(path, Arc::clone(&engine.store));
        _watcher = Some(watcher.run()?);
        dispatcher = Some(spawn_change_dispatcher(
            Arc::clone(&engine.table),
            changes,
            shutdown.subscribe(),
        ));
    }

    let listener = TcpListener::bind(&config.listener.bind_address).await?;
    tracing::info!(address = %listener.local_addr()?, "Listening for connections");

    let server = HttpServer::new(engine.resolver.clone());
    let server_task = tokio::spawn(server.run(listener, shutdown.subscribe()));

    lifecycle::signals::shutdown_on_signal(&shutdown).await;
    server_task.await??;
    if let Some(dispatcher) = dispatcher {
        dispatcher.await?;
    }

    tracing::info!("Shutdown complete");
    Ok(())
}
