use chrono::Utc;

use super::BookmarkSource;
use crate::bookmarks::{dedup_by_url, Bookmark};

pub const MOCK_TITLE: &str = "Title";
pub const MOCK_FOLDER: &str = "Parent";

/// Fixed list of urls, used for trial runs without a browser profile.
pub struct MockSource {
    urls: Vec<String>,
}

impl MockSource {
    pub fn new(urls: Vec<String>) -> Self {
        Self { urls }
    }
}

impl BookmarkSource for MockSource {
    fn name(&self) -> &'static str {
        "mock"
    }

    fn bookmarks(&self) -> anyhow::Result<Vec<Bookmark>> {
        let now = Utc::now();
        let bookmarks = self
            .urls
            .iter()
            .map(|url| Bookmark::new(url, MOCK_TITLE, Some(MOCK_FOLDER.to_string()), now))
            .collect();

        Ok(dedup_by_url(bookmarks))
    }
}
