use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Suffix appended to the title of a bookmark whose page could not be archived.
pub const ERRONEOUS_MARKER: &str = " (erroneous)";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bookmark {
    pub url: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub folder: Option<String>,
    pub date_added: DateTime<Utc>,

    /// Reference into the content store, set once the page has been archived.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_id: Option<i64>,
}

impl Bookmark {
    pub fn new(
        url: impl Into<String>,
        title: impl Into<String>,
        folder: Option<String>,
        date_added: DateTime<Utc>,
    ) -> Self {
        Self {
            url: url.into(),
            title: title.into(),
            folder,
            date_added,
            content_id: None,
        }
    }

    pub fn archive(&mut self, content_id: i64) {
        self.content_id = Some(content_id);
    }

    pub fn mark_erroneous(&mut self) {
        self.content_id = None;
        if !self.is_erroneous() {
            self.title.push_str(ERRONEOUS_MARKER);
        }
    }

    pub fn is_erroneous(&self) -> bool {
        self.title.ends_with(ERRONEOUS_MARKER)
    }
}

/// Drops every bookmark whose url was already seen, keeping the first occurrence.
pub fn dedup_by_url(bookmarks: Vec<Bookmark>) -> Vec<Bookmark> {
    let mut seen = HashSet::with_capacity(bookmarks.len());

    bookmarks
        .into_iter()
        .filter(|bmark| {
            let fresh = seen.insert(bmark.url.clone());
            if !fresh {
                log::debug!("{} is duplicate bookmark, skipping", bmark.url);
            }
            fresh
        })
        .collect()
}
