//! Engine API node binary: loads config, stands up an [`EngineCore`] with
//! no-op collaborators, and serves it over JSON-RPC until interrupted.
//!
//! Grounded on `mev-rs`'s CLI/logging/signal-handling shape in
//! `bin/mev-rs/src/main.rs` and on the teacher's auth-server `ServerBuilder`
//! wiring in `rpc-builder/src/auth.rs`, minus the JWT middleware layer (the
//! engine namespace here has no authentication requirement to satisfy).

mod config;

use clap::Parser;
use config::NodeConfig;
use engine_core::{EmptyCandidateSource, EngineCore, NoopProcessor};
use engine_rpc_api::{EngineApiImpl, EngineApiServer, MAX_REQUEST_BODY_BYTES};
use jsonrpsee::server::ServerBuilder;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::signal;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Parser)]
#[clap(author, version, name = "engine-node", about = "standalone engine API node", long_about = None)]
struct Cli {
    /// Path to a TOML node config. Defaults apply for any field a given file omits,
    /// and the node runs on pure defaults if no path is given at all.
    #[clap(long)]
    config: Option<PathBuf>,

    /// Overrides the listen address from the config file.
    #[clap(long)]
    addr: Option<std::net::SocketAddr>,
}

fn setup_logging() {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();
}

#[tokio::main]
async fn main() -> eyre::Result<()> {
    let cli = Cli::parse();
    setup_logging();

    let mut node_config = match &cli.config {
        Some(path) => NodeConfig::from_toml_file(path)?,
        None => NodeConfig::default(),
    };
    if let Some(addr) = cli.addr {
        node_config.addr = addr;
    }

    let core = Arc::new(EngineCore::new(
        node_config.chain_spec.clone(),
        node_config.block_store_capacity,
        Box::new(NoopProcessor),
        Box::new(EmptyCandidateSource),
    ));

    let module = EngineApiImpl::new(core).into_rpc();

    let server = ServerBuilder::new()
        .max_request_body_size(MAX_REQUEST_BODY_BYTES as u32)
        .max_response_body_size(128 * 1024 * 1024)
        .max_connections(500)
        .build(node_config.addr)
        .await?;
    let local_addr = server.local_addr()?;
    let handle = server.start(module);

    tracing::info!(target: "engine-node", addr = %local_addr, "engine API server listening");

    signal::ctrl_c().await?;
    tracing::info!(target: "engine-node", "received ctrl-c, shutting down");
    let _ = handle.stop();

    Ok(())
}
