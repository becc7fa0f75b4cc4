use std::path::Path;

use anyhow::Context;
use chrono::{DateTime, Local};
use serde::Serialize;

use crate::bookmarks::Bookmark;

#[derive(Serialize)]
struct Export<'a> {
    timestamp: DateTime<Local>,
    bookmarks: &'a [Bookmark],
}

/// Writes the bookmark list, without content, as pretty JSON.
pub fn export_json(path: &Path, bookmarks: &[Bookmark]) -> anyhow::Result<()> {
    let export = Export {
        timestamp: Local::now(),
        bookmarks,
    };

    let json = serde_json::to_string_pretty(&export)?;
    std::fs::write(path, json).with_context(|| format!("writing {}", path.display()))?;

    log::info!("exported {} bookmarks to {}", bookmarks.len(), path.display());

    Ok(())
}
