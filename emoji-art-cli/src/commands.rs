//! Execution of CLI subcommands against a document store.

use std::io::Write;

use anyhow::{anyhow, bail, Context};
use emoji_art_core::{
    BackgroundRef, BackgroundStatus, DocumentId, DocumentStore, EmojiId, EmojiPlacement, Point,
    Vec2,
};
use serde::Serialize;
use tokio::sync::broadcast::error::RecvError;

use crate::{CliConfig, Command};

/// JSON shape printed by `show`.
#[derive(Debug, Serialize)]
struct DocumentView<'a> {
    id: DocumentId,
    name: &'a str,
    location: String,
    background: Option<&'a str>,
    background_status: BackgroundStatus,
    placements: &'a [EmojiPlacement],
}

/// Run one command, writing human-readable output to `out`.
///
/// # Errors
///
/// Returns an error for unknown documents or emoji, rejected renames,
/// unreadable import files, output failures, and backgrounds that fail to
/// load or time out.
pub async fn run(
    store: &mut DocumentStore,
    command: Command,
    config: &CliConfig,
    out: &mut dyn Write,
) -> anyhow::Result<()> {
    match command {
        Command::List => {
            for (id, name) in store.list() {
                writeln!(out, "{id}  {name}")?;
            }
        }
        Command::New { name } => {
            let id = store.create_document();
            if let Some(name) = name {
                if !store.rename(id, name.clone()) {
                    store.remove_document(id)?;
                    bail!("a document named \"{name}\" already exists");
                }
            }
            print_document(store, id, out)?;
        }
        Command::Import { file } => {
            let bytes = std::fs::read(&file)
                .with_context(|| format!("reading {}", file.display()))?;
            let id = store.import_document(&bytes);
            print_document(store, id, out)?;
        }
        Command::Open { path } => {
            let id = store.open_document(&path);
            print_document(store, id, out)?;
        }
        Command::Rename { document, name } => {
            let id = resolve(store, &document)?;
            if !store.rename(id, name.clone()) {
                bail!("a document named \"{name}\" already exists");
            }
            print_document(store, id, out)?;
        }
        Command::Remove { document } => {
            let id = resolve(store, &document)?;
            store.remove_document(id)?;
            writeln!(out, "removed {id}")?;
        }
        Command::Add {
            document,
            text,
            x,
            y,
            size,
        } => {
            let id = resolve(store, &document)?;
            let size = size.unwrap_or(store.config().default_emoji_size);
            let emoji = store
                .document_mut(id)?
                .add_emoji(text, Point::new(x, y), size);
            writeln!(out, "{emoji}")?;
        }
        Command::Move {
            document,
            emoji,
            dx,
            dy,
        } => {
            let (id, emoji) = resolve_emoji(store, &document, &emoji)?;
            store.document_mut(id)?.move_emoji(emoji, Vec2::new(dx, dy));
            print_placement(store, id, emoji, out)?;
        }
        Command::Scale {
            document,
            emoji,
            factor,
        } => {
            let (id, emoji) = resolve_emoji(store, &document, &emoji)?;
            store.document_mut(id)?.scale_emoji(emoji, factor);
            print_placement(store, id, emoji, out)?;
        }
        Command::Delete { document, emoji } => {
            let (id, emoji) = resolve_emoji(store, &document, &emoji)?;
            store.document_mut(id)?.delete_emoji(emoji);
            writeln!(out, "deleted {emoji}")?;
        }
        Command::Background {
            document,
            reference,
        } => {
            let id = resolve(store, &document)?;
            set_background(store, id, reference.map(BackgroundRef::new), config).await?;
            let document = store.document(id)?;
            match document.background_image() {
                Some(image) => writeln!(out, "background {}x{}", image.width, image.height)?,
                None => writeln!(out, "background cleared")?,
            }
        }
        Command::Show { document } => {
            let id = resolve(store, &document)?;
            let document = store.document(id)?;
            let view = DocumentView {
                id,
                name: document.display_name().unwrap_or_default(),
                location: document.storage_location().to_string(),
                background: document.background_reference().map(BackgroundRef::as_str),
                background_status: document.background_status(),
                placements: document.placements(),
            };
            serde_json::to_writer_pretty(&mut *out, &view)?;
            writeln!(out)?;
        }
        Command::Palettes => {
            for palette in store.palettes().palettes() {
                writeln!(out, "{:<12} {}", palette.name, palette.emojis)?;
            }
        }
    }
    Ok(())
}

/// Find a document by ID, then by name.
fn resolve(store: &DocumentStore, key: &str) -> anyhow::Result<DocumentId> {
    if let Ok(id) = DocumentId::parse(key) {
        if store.document(id).is_ok() {
            return Ok(id);
        }
    }
    store
        .list()
        .into_iter()
        .find(|(_, name)| name == key)
        .map(|(id, _)| id)
        .ok_or_else(|| anyhow!("no document \"{key}\""))
}

fn resolve_emoji(
    store: &DocumentStore,
    document: &str,
    emoji: &str,
) -> anyhow::Result<(DocumentId, EmojiId)> {
    let id = resolve(store, document)?;
    let emoji: EmojiId = emoji
        .parse()
        .with_context(|| format!("invalid emoji ID \"{emoji}\""))?;
    if store.document(id)?.model().placement(emoji).is_none() {
        bail!("no emoji {emoji} in document {id}");
    }
    Ok((id, emoji))
}

/// Set the background and wait until its fetch settles.
async fn set_background(
    store: &mut DocumentStore,
    id: DocumentId,
    reference: Option<BackgroundRef>,
    config: &CliConfig,
) -> anyhow::Result<()> {
    let mut rx = store.document(id)?.subscribe();
    let document = store.document_mut(id)?;
    document.set_background_reference(reference);

    let settled = tokio::time::timeout(config.fetch_timeout, async {
        while document.background_status() == BackgroundStatus::Loading {
            if let Err(RecvError::Closed) = rx.recv().await {
                break;
            }
        }
    })
    .await;
    if settled.is_err() {
        bail!(
            "background did not load within {}s",
            config.fetch_timeout.as_secs()
        );
    }

    match document.background_status() {
        BackgroundStatus::Failed => bail!(
            "failed to load background {}",
            document
                .background_reference()
                .map_or("", BackgroundRef::as_str)
        ),
        status => {
            tracing::debug!(document = %id, ?status, "Background settled");
            Ok(())
        }
    }
}

fn print_document(
    store: &DocumentStore,
    id: DocumentId,
    out: &mut dyn Write,
) -> anyhow::Result<()> {
    writeln!(out, "{id}  {}", store.name_of(id).unwrap_or_default())?;
    Ok(())
}

fn print_placement(
    store: &DocumentStore,
    id: DocumentId,
    emoji: EmojiId,
    out: &mut dyn Write,
) -> anyhow::Result<()> {
    if let Some(p) = store.document(id)?.model().placement(emoji) {
        writeln!(out, "{} {} at ({}, {}) size {}", p.id, p.text, p.x, p.y, p.size)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use emoji_art_core::{MemoryStorage, StoreConfig};

    use super::*;

    fn store() -> DocumentStore {
        DocumentStore::new(StoreConfig::default(), Arc::new(MemoryStorage::new()))
    }

    async fn exec(store: &mut DocumentStore, command: Command) -> anyhow::Result<String> {
        let config = CliConfig {
            fetch_timeout: Duration::from_secs(2),
            ..CliConfig::new()
        };
        let mut out = Vec::new();
        run(store, command, &config, &mut out).await?;
        Ok(String::from_utf8(out).expect("utf-8 output"))
    }

    #[tokio::test]
    async fn test_new_and_list() {
        let mut store = store();
        exec(&mut store, Command::New { name: None }).await.expect("new");
        exec(&mut store, Command::New { name: Some("Beach".into()) })
            .await
            .expect("new");

        let listing = exec(&mut store, Command::List).await.expect("list");
        let names: Vec<&str> = listing
            .lines()
            .filter_map(|line| line.split_once("  ").map(|(_, name)| name))
            .collect();
        assert_eq!(names, vec!["Untitled", "Beach"]);
    }

    #[tokio::test]
    async fn test_new_with_taken_name_leaves_no_document() {
        let mut store = store();
        exec(&mut store, Command::New { name: Some("Beach".into()) })
            .await
            .expect("new");
        let result = exec(&mut store, Command::New { name: Some("Beach".into()) }).await;
        assert!(result.is_err());
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_add_by_name_then_show() {
        let mut store = store();
        exec(&mut store, Command::New { name: Some("Beach".into()) })
            .await
            .expect("new");
        let emoji = exec(
            &mut store,
            Command::Add {
                document: "Beach".into(),
                text: "🐚".into(),
                x: 2.5,
                y: -1.5,
                size: None,
            },
        )
        .await
        .expect("add");

        let shown = exec(&mut store, Command::Show { document: "Beach".into() })
            .await
            .expect("show");
        let json: serde_json::Value = serde_json::from_str(&shown).expect("json");
        let placement = &json["placements"][0];
        assert_eq!(placement["id"], emoji.trim());
        assert_eq!(placement["x"], 2);
        assert_eq!(placement["y"], -2);
        assert_eq!(placement["size"], 40);
        assert_eq!(json["background_status"], "empty");
    }

    #[tokio::test]
    async fn test_move_scale_delete() {
        let mut store = store();
        exec(&mut store, Command::New { name: Some("Beach".into()) })
            .await
            .expect("new");
        let emoji = exec(
            &mut store,
            Command::Add {
                document: "Beach".into(),
                text: "🦀".into(),
                x: 0.0,
                y: 0.0,
                size: Some(20),
            },
        )
        .await
        .expect("add");
        let emoji = emoji.trim().to_string();

        let moved = exec(
            &mut store,
            Command::Move {
                document: "Beach".into(),
                emoji: emoji.clone(),
                dx: 3.0,
                dy: -4.0,
            },
        )
        .await
        .expect("move");
        assert!(moved.contains("at (3, -4)"));

        let scaled = exec(
            &mut store,
            Command::Scale {
                document: "Beach".into(),
                emoji: emoji.clone(),
                factor: 2.5,
            },
        )
        .await
        .expect("scale");
        assert!(scaled.ends_with("size 50\n"));

        exec(
            &mut store,
            Command::Delete {
                document: "Beach".into(),
                emoji: emoji.clone(),
            },
        )
        .await
        .expect("delete");
        let result = exec(
            &mut store,
            Command::Delete {
                document: "Beach".into(),
                emoji,
            },
        )
        .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_unknown_document() {
        let mut store = store();
        let result = exec(&mut store, Command::Show { document: "nope".into() }).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_missing_background_file_fails() {
        let dir = tempfile::tempdir().expect("tempdir");
        let missing = dir.path().join("missing.png");
        let mut store = store();
        exec(&mut store, Command::New { name: Some("Beach".into()) })
            .await
            .expect("new");

        let result = exec(
            &mut store,
            Command::Background {
                document: "Beach".into(),
                reference: Some(missing.display().to_string()),
            },
        )
        .await;
        assert!(result.is_err());

        let cleared = exec(
            &mut store,
            Command::Background {
                document: "Beach".into(),
                reference: None,
            },
        )
        .await
        .expect("clear");
        assert_eq!(cleared, "background cleared\n");
    }
}
