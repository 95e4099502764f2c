//! syncgate development server
//!
//! Runs the `/object/*` API against in-memory collaborators:
//! 1. Application schemas are preloaded from a JSON file
//! 2. Devices and accounts are registered from the command line
//! 3. Published events are logged at debug level and not retained
//!
//! Usage:
//!   syncgate-server --port 3000 --schemas schemas.json --device dev-1 --user alice@example.com=u1

use std::{collections::BTreeMap, fs, path::PathBuf, sync::Arc};
use anyhow::{Context, Result};
use clap::Parser;
use syncgate_core::config::DEFAULT_SCHEMA_CACHE_LIMIT_BYTES;
use syncgate_core::memory::MemoryBackend;
use syncgate_core::{GatewayConfig, Orchestrator};
use syncgate_model::ApplicationSchema;
use syncgate_server::build_router;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser, Debug)]
#[command(name = "syncgate-server")]
#[command(about = "syncgate subscription gateway (in-memory backend)")]
struct Args {
    /// HTTP port to listen on
    #[arg(short, long, default_value = "3000")]
    port: u16,

    /// JSON file mapping application ids to their schemas
    #[arg(short, long)]
    schemas: Option<PathBuf>,

    /// Serialized schema size above which the schema cache is flushed
    #[arg(long, default_value_t = DEFAULT_SCHEMA_CACHE_LIMIT_BYTES)]
    cache_limit_bytes: usize,

    /// Register a device id (repeatable)
    #[arg(long = "device")]
    devices: Vec<String>,

    /// Register a user account as EMAIL=USER_ID (repeatable)
    #[arg(long = "user", value_parser = parse_account)]
    users: Vec<(String, String)>,

    /// Register an admin account as EMAIL=USER_ID (repeatable)
    #[arg(long = "admin", value_parser = parse_account)]
    admins: Vec<(String, String)>,

    /// Enable verbose debug logging
    #[arg(short, long)]
    verbose: bool,
}

fn parse_account(raw: &str) -> Result<(String, String), String> {
    match raw.split_once('=') {
        Some((email, user_id)) if !email.is_empty() && !user_id.is_empty() => {
            Ok((email.to_string(), user_id.to_string()))
        }
        _ => Err(format!("expected EMAIL=USER_ID, got '{raw}'")),
    }
}

fn load_schemas(path: &PathBuf) -> Result<BTreeMap<String, ApplicationSchema>> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("failed to read schema file {}", path.display()))?;
    serde_json::from_str(&raw)
        .with_context(|| format!("failed to parse schema file {}", path.display()))
}

async fn seed_backend(args: &Args) -> Result<MemoryBackend> {
    let backend = MemoryBackend::without_history();

    if let Some(path) = &args.schemas {
        let schemas = load_schemas(path)?;
        info!("Loaded {} application schema(s) from {}", schemas.len(), path.display());
        for (app, schema) in schemas {
            backend.schemas.insert(app, schema).await;
        }
    }
    for device in &args.devices {
        backend.registry.register_device(device.as_str()).await;
    }
    for (email, user_id) in &args.users {
        backend.accounts.add_user(email.as_str(), user_id.as_str()).await;
    }
    for (email, user_id) in &args.admins {
        backend.accounts.add_admin(email.as_str(), user_id.as_str()).await;
    }

    Ok(backend)
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let log_level = if args.verbose { Level::DEBUG } else { Level::INFO };
    FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .compact()
        .init();

    info!("syncgate server starting...");
    let backend = seed_backend(&args).await?;
    let config = GatewayConfig {
        schema_cache_limit_bytes: args.cache_limit_bytes,
        ..GatewayConfig::default()
    };
    let orchestrator = Arc::new(Orchestrator::new(backend.collaborators(), config));
    let app = build_router(orchestrator);

    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", args.port))
        .await
        .with_context(|| format!("failed to bind port {}", args.port))?;
    info!("HTTP API listening on 0.0.0.0:{}", args.port);

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("Shutting down");
        })
        .await
        .context("HTTP server failed")
}
