//! The registry binary: wires `mesh_registry`'s router to a bound
//! `TcpListener`, installs a `tracing-subscriber`, and spawns the health
//! sweep. Thin by design — all behavior lives in the library crate.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use mesh_registry::durable::{AppendLog, LoggedEvent, Snapshot};
use mesh_registry::store::{AgentStore, HealthSweep, RegistryConfig};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// How often the snapshot is refreshed and the append log truncated, once
/// durable backing is enabled (§4.D "periodic snapshot").
const SNAPSHOT_INTERVAL: std::time::Duration = std::time::Duration::from_secs(60);

#[derive(Debug, Parser)]
#[command(name = "mesh-registryd", about = "Capability mesh registry")]
struct Args {
    /// Address the HTTP API binds to.
    #[arg(long, env = "MESH_REGISTRY_BIND_ADDR", default_value = "0.0.0.0:8000")]
    bind_addr: SocketAddr,

    /// Directory for the durable snapshot + append log. Omit to run
    /// in-memory only.
    #[arg(long, env = "MESH_REGISTRY_DATA_DIR")]
    data_dir: Option<std::path::PathBuf>,

    /// Emit JSON-formatted logs instead of the default compact format.
    #[arg(long, env = "MESH_REGISTRY_LOG_JSON", default_value_t = false)]
    log_json: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_tracing(args.log_json);

    let config = RegistryConfig::default();
    let store = match &args.data_dir {
        Some(dir) => {
            tokio::fs::create_dir_all(dir)
                .await
                .context("creating durable data directory")?;
            let snapshot = Snapshot::new(dir.join("snapshot.json"));
            let store = snapshot
                .load(config)
                .await
                .context("loading durable snapshot")?;
            let log = AppendLog::new(dir.join("events.jsonl"));
            log.replay_into(&store)
                .await
                .context("replaying durable append log")?;
            info!(target: "mesh_registryd", data_dir = %dir.display(), "durable backing enabled");
            spawn_durable_backing(store.clone(), snapshot, log);
            store
        }
        None => AgentStore::new(config),
    };

    let sweep = HealthSweep::new(store.clone());
    let _sweep_handle = sweep.spawn();

    let app = mesh_registry::http::router(store);
    let listener = tokio::net::TcpListener::bind(args.bind_addr)
        .await
        .with_context(|| format!("binding {}", args.bind_addr))?;

    info!(target: "mesh_registryd", addr = %args.bind_addr, "registry listening");
    axum::serve(listener, app)
        .await
        .context("registry http server exited")?;

    Ok(())
}

/// Wire `AgentStore`'s event broadcast to the append log (every mutation is
/// logged as it happens) and refresh the full snapshot on an interval,
/// truncating the log afterward so it only ever carries events since the
/// last snapshot (§4.D "on-disk append log plus periodic snapshot").
fn spawn_durable_backing(store: Arc<AgentStore>, snapshot: Snapshot, log: AppendLog) {
    let mut events = store.subscribe();
    let truncate_log = log.clone();
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) => {
                    let logged = LoggedEvent::from_registry_event(&event);
                    if let Err(e) = log.append(&logged).await {
                        warn!(target: "mesh_registryd", "failed to append durable event: {e}");
                    }
                }
                Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => {
                    warn!(target: "mesh_registryd", skipped = n, "durable event writer lagged; snapshot will cover the gap");
                }
                Err(tokio::sync::broadcast::error::RecvError::Closed) => return,
            }
        }
    });

    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(SNAPSHOT_INTERVAL);
        loop {
            ticker.tick().await;
            if let Err(e) = snapshot.write(&store).await {
                warn!(target: "mesh_registryd", "failed to write durable snapshot: {e}");
                continue;
            }
            if let Err(e) = truncate_log.truncate().await {
                warn!(target: "mesh_registryd", "failed to truncate durable append log: {e}");
            }
        }
    });
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::fmt().with_env_filter(filter);
    if json {
        registry.json().init();
    } else {
        registry.init();
    }
}
