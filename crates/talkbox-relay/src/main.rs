//! talkbox relay binary.
//!
//! Reads `config.toml` (or the path given with `--config`) layered under
//! `TALKBOX_*` environment variables, restores the chat history from its JSON
//! image, and serves the relay over HTTP + WebSocket.
//!
//! ```
//! cargo run -p talkbox-relay --bin talkbox -- --config config.toml
//! ```

use std::{net::SocketAddr, path::PathBuf, sync::Arc};

use anyhow::Context as _;
use clap::Parser;
use talkbox_relay::{AppState, ConnectionHub, ServerConfig};
use talkbox_store_file::FileHistoryStore;
use tokio::net::TcpListener;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about = "Talkbox chat relay")]
struct Cli {
  /// Path to the TOML configuration file.
  #[arg(short, long, default_value = "config.toml")]
  config: PathBuf,

  /// Print the effective configuration as JSON and exit.
  #[arg(long)]
  print_config: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
  // Initialise tracing.
  tracing_subscriber::fmt()
    .with_env_filter(
      EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy(),
    )
    .init();

  let cli = Cli::parse();

  // Load configuration.
  let settings = config::Config::builder()
    .add_source(config::File::from(cli.config).required(false))
    .add_source(config::Environment::with_prefix("TALKBOX"))
    .build()
    .context("failed to read config file")?;

  let server_cfg: ServerConfig = settings
    .try_deserialize()
    .context("failed to deserialise ServerConfig")?;

  if cli.print_config {
    println!("{}", serde_json::to_string_pretty(&server_cfg)?);
    return Ok(());
  }

  // Restore history. A missing or corrupt file only logs; a bad capacity
  // is a configuration error.
  let store = FileHistoryStore::restore(&server_cfg.history_path, server_cfg.capacity)
    .await
    .with_context(|| {
      format!("failed to open history at {:?}", server_cfg.history_path)
    })?;
  let sync = store.monitor();

  let hub = ConnectionHub::spawn(store, server_cfg.hub_queue_depth);
  let state = AppState { hub: hub.clone(), config: Arc::new(server_cfg.clone()) };

  let app = talkbox_relay::router(state);
  let address = format!("{}:{}", server_cfg.host, server_cfg.port);

  let listener = TcpListener::bind(&address)
    .await
    .with_context(|| format!("failed to bind {address}"))?;
  tracing::info!(
    "Listening on http://{address}{}/",
    server_cfg.mount_path()
  );

  axum::serve(
    listener,
    app.into_make_service_with_connect_info::<SocketAddr>(),
  )
  .with_graceful_shutdown(shutdown_signal())
  .await
  .context("server error")?;

  // Stop the hub so the store is dropped, then wait for the last image.
  hub.shutdown().await;
  sync.closed().await;
  tracing::info!("Shutdown complete");

  Ok(())
}

async fn shutdown_signal() {
  let ctrl_c = async {
    if let Err(e) = tokio::signal::ctrl_c().await {
      tracing::warn!("failed to listen for Ctrl-C: {e}");
      std::future::pending::<()>().await;
    }
  };

  #[cfg(unix)]
  let terminate = async {
    match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
      Ok(mut signal) => {
        signal.recv().await;
      }
      Err(e) => {
        tracing::warn!("failed to listen for SIGTERM: {e}");
        std::future::pending::<()>().await;
      }
    }
  };

  #[cfg(not(unix))]
  let terminate = std::future::pending::<()>();

  tokio::select! {
    _ = ctrl_c => {},
    _ = terminate => {},
  }

  tracing::info!("Shutdown signal received");
}
