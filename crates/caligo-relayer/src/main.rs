//! caligo-relayer - shielded pool relayer daemon
//!
//! usage:
//!   caligo-relayer --port 8799
//!   caligo-relayer --bind 0.0.0.0 --port 8799 --data-dir /var/lib/caligo

use std::sync::Arc;

use clap::Parser;
use tracing::info;

use caligo_relayer::backend::MockBackend;
use caligo_relayer::server::{router, AppState};
use caligo_tree::{MerkleAccumulator, TREE_DEPTH};

/// caligo-relayer - relay shielded pool operations
#[derive(Parser)]
#[command(name = "caligo-relayer")]
#[command(about = "caligo relayer - prepare and submit shielded pool operations")]
#[command(version)]
struct Args {
    /// bind address
    #[arg(short, long, default_value = "127.0.0.1")]
    bind: String,

    /// port to listen on
    #[arg(short, long, default_value = "8799")]
    port: u16,

    /// data directory for the sled database
    #[arg(short, long, default_value = "./caligo-data")]
    data_dir: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("caligo_relayer=info".parse()?),
        )
        .init();

    let args = Args::parse();
    std::fs::create_dir_all(&args.data_dir)?;
    let db = sled::open(format!("{}/db", args.data_dir))?;

    let state = AppState::new(&db, Arc::new(MockBackend))?;

    info!("caligo-relayer v{}", env!("CARGO_PKG_VERSION"));
    info!("  data: {}", args.data_dir);
    info!("  tree depth: {} (capacity {})", TREE_DEPTH, MerkleAccumulator::capacity());

    let app = router(Arc::new(state));
    let addr = format!("{}:{}", args.bind, args.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("listening on {}", addr);
    axum::serve(listener, app).await?;

    Ok(())
}
