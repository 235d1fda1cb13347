//! # Emoji Art
//!
//! Command-line entry point for Emoji Art document stores.

use std::sync::Arc;

use clap::Parser;
use emoji_art_cli::{commands, CliArgs, CliConfig};
use emoji_art_core::{DirectoryStorage, DocumentStore};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let args = CliArgs::parse();
    let config = CliConfig::from(&args);

    tracing::debug!(
        "Store \"{}\" in {}",
        config.store.name,
        config.data_dir.display()
    );

    let storage = DirectoryStorage::open(&config.data_dir)?;
    let mut store = DocumentStore::load(config.store.clone(), Arc::new(storage));

    let mut stdout = std::io::stdout().lock();
    commands::run(&mut store, args.command, &config, &mut stdout).await
}

/// Initialize tracing with environment-based configuration.
///
/// Logs go to stderr so command output stays pipeable.
/// Set `RUST_LOG_FORMAT=json` for JSON output.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("warn,emoji_art_cli=info,emoji_art_core=info"));

    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_target(true)
        .with_writer(std::io::stderr);

    if std::env::var("RUST_LOG_FORMAT").as_deref() == Ok("json") {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt_layer.json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt_layer)
            .init();
    }
}
