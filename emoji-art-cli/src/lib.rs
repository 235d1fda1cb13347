//! # Emoji Art CLI
//!
//! Command-line host for an Emoji Art document store.
//!
//! ## Usage
//!
//! ```bash
//! emoji-art new --name Beach
//! emoji-art add Beach 🐚 --x 10 --y -20
//! emoji-art background Beach https://example.com/sand.png
//! emoji-art show Beach
//! ```
//!
//! ## Architecture
//!
//! - `CliArgs` - Command-line arguments parsed with clap
//! - `CliConfig` - Store location, store name and fetch timeout
//! - `commands::run` - Executes one `Command` against a `DocumentStore`

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![deny(clippy::pedantic)]

pub mod commands;

use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand};
use emoji_art_core::StoreConfig;

/// Directory used when `--data-dir` is not given.
pub const DEFAULT_DATA_DIR: &str = ".emoji-art";

/// Command-line arguments for emoji-art.
#[derive(Debug, Clone, Parser)]
#[command(name = "emoji-art")]
#[command(about = "Create and edit emoji art documents")]
#[command(version)]
pub struct CliArgs {
    /// Directory holding the document store
    #[arg(long, env = "EMOJI_ART_DATA_DIR", default_value = DEFAULT_DATA_DIR)]
    pub data_dir: PathBuf,

    /// Store name; separate names keep separate document lists
    #[arg(long, env = "EMOJI_ART_STORE", default_value = emoji_art_core::store::DEFAULT_STORE_NAME)]
    pub store_name: String,

    /// Seconds to wait for a background image before giving up
    #[arg(long, env = "EMOJI_ART_FETCH_TIMEOUT", default_value = "10")]
    pub fetch_timeout_secs: u64,

    /// What to do
    #[command(subcommand)]
    pub command: Command,
}

/// CLI subcommands. Documents are addressed by ID or by name.
#[derive(Debug, Clone, Subcommand)]
pub enum Command {
    /// List documents in store order
    List,
    /// Create an empty document
    New {
        /// Name to give the document instead of a generated one
        #[arg(long)]
        name: Option<String>,
    },
    /// Create a document from a saved JSON file
    Import {
        /// File to read
        file: PathBuf,
    },
    /// Open a document stored at an explicit path
    Open {
        /// Document file; created on first save if missing
        path: PathBuf,
    },
    /// Rename a document
    Rename {
        /// Document ID or name
        document: String,
        /// New name; must not be used by another document
        name: String,
    },
    /// Delete a document
    Remove {
        /// Document ID or name
        document: String,
    },
    /// Place an emoji
    Add {
        /// Document ID or name
        document: String,
        /// The emoji
        text: String,
        /// Horizontal offset from the document center
        #[arg(long, default_value = "0", allow_hyphen_values = true)]
        x: f64,
        /// Vertical offset from the document center
        #[arg(long, default_value = "0", allow_hyphen_values = true)]
        y: f64,
        /// Font size; defaults to the store's emoji size
        #[arg(long)]
        size: Option<u32>,
    },
    /// Move an emoji by whole document units
    Move {
        /// Document ID or name
        document: String,
        /// Emoji ID
        emoji: String,
        /// Horizontal distance
        #[arg(long, default_value = "0", allow_hyphen_values = true)]
        dx: f64,
        /// Vertical distance
        #[arg(long, default_value = "0", allow_hyphen_values = true)]
        dy: f64,
    },
    /// Resize an emoji by a factor
    Scale {
        /// Document ID or name
        document: String,
        /// Emoji ID
        emoji: String,
        /// Scale factor
        factor: f64,
    },
    /// Delete an emoji
    Delete {
        /// Document ID or name
        document: String,
        /// Emoji ID
        emoji: String,
    },
    /// Set or clear the background and wait for it to load
    Background {
        /// Document ID or name
        document: String,
        /// Image path or URL; omit to clear
        reference: Option<String>,
    },
    /// Print a document as JSON
    Show {
        /// Document ID or name
        document: String,
    },
    /// List the emoji palettes
    Palettes,
}

/// Resolved runtime configuration.
#[derive(Debug, Clone)]
pub struct CliConfig {
    /// Directory holding the document store.
    pub data_dir: PathBuf,
    /// Store configuration.
    pub store: StoreConfig,
    /// How long `background` waits for a fetch to settle.
    pub fetch_timeout: Duration,
}

impl Default for CliConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl CliConfig {
    /// Create a configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self {
            data_dir: PathBuf::from(DEFAULT_DATA_DIR),
            store: StoreConfig::default(),
            fetch_timeout: Duration::from_secs(10),
        }
    }
}

impl From<&CliArgs> for CliConfig {
    fn from(args: &CliArgs) -> Self {
        Self {
            data_dir: args.data_dir.clone(),
            store: StoreConfig::named(args.store_name.clone()),
            fetch_timeout: Duration::from_secs(args.fetch_timeout_secs),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let args = CliArgs::try_parse_from(["emoji-art", "list"]).expect("parse");
        let config = CliConfig::from(&args);
        assert_eq!(config.data_dir, PathBuf::from(DEFAULT_DATA_DIR));
        assert_eq!(config.store, StoreConfig::default());
        assert_eq!(config.fetch_timeout, Duration::from_secs(10));
        assert!(matches!(args.command, Command::List));
    }

    #[test]
    fn test_add_accepts_negative_offsets() {
        let args = CliArgs::try_parse_from([
            "emoji-art", "add", "Beach", "🐚", "--x", "-12.5", "--y", "-3",
        ])
        .expect("parse");
        match args.command {
            Command::Add { x, y, size, .. } => {
                assert!((x + 12.5).abs() < f64::EPSILON);
                assert!((y + 3.0).abs() < f64::EPSILON);
                assert_eq!(size, None);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn test_store_name_flows_into_config() {
        let args = CliArgs::try_parse_from([
            "emoji-art",
            "--store-name",
            "Scratch",
            "--fetch-timeout-secs",
            "2",
            "palettes",
        ])
        .expect("parse");
        let config = CliConfig::from(&args);
        assert_eq!(config.store.name, "Scratch");
        assert_eq!(config.fetch_timeout, Duration::from_secs(2));
    }
}
