//! Misir HTTP API — composition root.

mod auth;
mod handlers;
mod problem;
mod server;
mod state;

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use directories::ProjectDirs;
use misir_core::{ConfigHandle, SqliteStore};
use tracing::{error, info, Level};
use tracing_subscriber::EnvFilter;

use crate::state::AppState;

/// Config cache TTL (§5 "system-config cache: TTL-refreshed in background").
const CONFIG_TTL: Duration = Duration::from_secs(60);

#[derive(Debug, Parser)]
#[command(name = "misir-api", version, about = "HTTP API for the Misir semantic orientation engine")]
struct Args {
    /// Address to bind the HTTP listener to.
    #[arg(long, default_value = "127.0.0.1:8787")]
    listen: SocketAddr,

    /// Custom database path. Defaults to the platform data directory.
    #[arg(long)]
    db_path: Option<PathBuf>,
}

fn resolve_db_path(override_path: Option<PathBuf>) -> std::io::Result<PathBuf> {
    if let Some(path) = override_path {
        return Ok(path);
    }

    let proj_dirs = ProjectDirs::from("dev", "misir", "misir")
        .ok_or_else(|| std::io::Error::new(std::io::ErrorKind::NotFound, "could not determine project directories"))?;
    let data_dir = proj_dirs.data_dir();
    std::fs::create_dir_all(data_dir)?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let perms = std::fs::Permissions::from_mode(0o700);
        let _ = std::fs::set_permissions(data_dir, perms);
    }

    Ok(data_dir.join("misir.db"))
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(Level::INFO.into()))
        .with_target(false)
        .init();

    info!("misir-api v{} starting", misir_core::VERSION);

    let db_path = match resolve_db_path(args.db_path) {
        Ok(p) => p,
        Err(e) => {
            error!("failed to resolve data directory: {e}");
            std::process::exit(1);
        }
    };

    let store = match SqliteStore::open(&db_path) {
        Ok(s) => {
            info!(path = %db_path.display(), "storage opened");
            s
        }
        Err(e) => {
            error!("failed to open storage: {e}");
            std::process::exit(1);
        }
    };

    #[cfg(feature = "embeddings")]
    let embeddings = misir_core::EmbeddingService::new();
    #[cfg(feature = "embeddings")]
    if let Err(e) = embeddings.check_ready() {
        error!("embedding service unavailable: {e}");
        error!("captures and search will fall back to degraded modes until this is resolved");
    }

    let state = Arc::new(AppState {
        store,
        config: ConfigHandle::new(CONFIG_TTL),
        #[cfg(feature = "embeddings")]
        embeddings,
        webhook_client: reqwest::Client::new(),
    });

    if let Err(e) = server::serve(args.listen, state).await {
        error!("server error: {e}");
        std::process::exit(1);
    }

    info!("misir-api shut down cleanly");
}
