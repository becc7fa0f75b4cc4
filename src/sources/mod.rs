//! Where bookmarks come from before a run.

pub mod firefox;
pub mod mock;

use crate::{bookmarks::Bookmark, config::Config, scrape::CookieJar};

pub use firefox::FirefoxSource;
pub use mock::MockSource;

pub trait BookmarkSource {
    fn name(&self) -> &'static str;

    /// Bookmarks of this source, unique by url, newest first.
    fn bookmarks(&self) -> anyhow::Result<Vec<Bookmark>>;

    /// Cookie headers to send along with matching requests.
    fn cookies(&self) -> anyhow::Result<CookieJar> {
        Ok(CookieJar::default())
    }
}

/// Mock urls take precedence over the browser profile.
pub fn from_config(config: &Config) -> anyhow::Result<Box<dyn BookmarkSource>> {
    if !config.general.mock_urls.is_empty() {
        return Ok(Box::new(MockSource::new(config.general.mock_urls.clone())));
    }

    Ok(Box::new(FirefoxSource::from_config(&config.general)?))
}

/// Applies `skip` then `limit` to an already ordered list.
pub fn window(bookmarks: Vec<Bookmark>, skip: Option<usize>, limit: Option<usize>) -> Vec<Bookmark> {
    bookmarks
        .into_iter()
        .skip(skip.unwrap_or(0))
        .take(limit.unwrap_or(usize::MAX))
        .collect()
}
