//! Thin demo binary for the Store: opens a catalog rooted at a directory,
//! runs until a shutdown signal, then closes gracefully.
//!
//! The storage engine behind `Shard`/`SeriesFile` is out of scope for this
//! crate (spec §1), so this binary drives the in-memory test-double engine
//! from `tsstore-types` — a real on-disk engine is an integration concern
//! for whatever process embeds `tsstore-core`, not this demo.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{error, info};
use tsstore_core::Store;
use tsstore_types::in_memory::InMemoryOpener;
use tsstore_types::StoreConfig;

#[derive(Parser, Debug)]
#[command(name = "tsstore", about = "Shard/catalog coordinator for a time-series store")]
struct Args {
    /// Root directory of the `<database>/<retention_policy>/<shard>` tree.
    #[arg(long, default_value = "./data")]
    root: PathBuf,

    /// Root directory of the shard WAL tree; defaults to `--root` if unset.
    #[arg(long)]
    wal_root: Option<PathBuf>,

    /// Disables the background idle-shard monitor.
    #[arg(long)]
    no_monitor: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env().add_directive("tsstore=info".parse()?))
        .init();

    let args = Args::parse();

    let mut config = StoreConfig::new(&args.root);
    config.wal_root = args.wal_root;
    config.monitor_enabled = !args.no_monitor;

    info!(root = %args.root.display(), "opening store");
    let opener = InMemoryOpener::new("inmem");
    let store = Store::open(config, opener).await.context("failed to open store")?;
    info!("store opened");

    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "unable to listen for shutdown signal");
    } else {
        info!("received shutdown signal, closing store");
    }

    store.close().await.context("failed to close store")?;
    info!("store closed");
    Ok(())
}
