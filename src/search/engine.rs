use std::ops::Range;

use chrono::{DateTime, Utc};
use rayon::prelude::*;
use serde::Serialize;

use super::{
    highlight::Fragments,
    query::{parse, Matcher, Query, Scope},
    SearchError,
};
use crate::{bookmarks::Bookmark, storage::StoreError};

/// Field a pattern matched in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchKind {
    None,
    Url,
    Title,
    Content,
    /// Matched in a restricted (`inurl:`/`intitle:`) search.
    Irrelevant,
}

#[derive(Debug, Clone, Serialize)]
pub struct SearchResult {
    pub url: String,
    pub title: String,
    pub folder: Option<String>,
    pub date_added: DateTime<Utc>,
    pub content_id: Option<i64>,
    pub match_kind: MatchKind,

    /// Byte ranges of every match in `content`.
    #[serde(skip)]
    pub spans: Vec<Range<usize>>,
    /// Full text, loaded only for content matches.
    #[serde(skip)]
    pub content: Option<String>,
}

impl SearchResult {
    fn new(bmark: &Bookmark, match_kind: MatchKind) -> Self {
        Self {
            url: bmark.url.clone(),
            title: bmark.title.clone(),
            folder: bmark.folder.clone(),
            date_added: bmark.date_added,
            content_id: bmark.content_id,
            match_kind,
            spans: Vec::new(),
            content: None,
        }
    }

    /// Highlighting fragments of the loaded content; empty for other kinds.
    pub fn fragments(&self) -> Fragments<'_> {
        Fragments::new(self.content.as_deref().unwrap_or_default(), &self.spans)
    }
}

/// Regex search over a snapshot of bookmarks. Content is pulled through
/// `load_contents` only for bookmarks whose url and title did not match.
pub struct SearchEngine<'a, F> {
    bookmarks: &'a [Bookmark],
    load_contents: F,
}

impl<'a, F> SearchEngine<'a, F>
where
    F: Fn(i64) -> Result<String, StoreError> + Sync,
{
    pub fn new(bookmarks: &'a [Bookmark], load_contents: F) -> Self {
        Self {
            bookmarks,
            load_contents,
        }
    }

    pub fn search(&self, query: &str) -> Result<Vec<SearchResult>, SearchError> {
        self.search_query(&parse(query))
    }

    pub fn search_query(&self, query: &Query) -> Result<Vec<SearchResult>, SearchError> {
        let mut results = match query {
            Query::Help => Vec::new(),
            Query::All => self
                .bookmarks
                .iter()
                .map(|b| SearchResult::new(b, MatchKind::None))
                .collect(),
            _ => {
                let Some(matcher) = query.compile()? else {
                    return Ok(Vec::new());
                };

                self.bookmarks
                    .par_iter()
                    .map(|b| self.match_bookmark(&matcher, b))
                    .collect::<Result<Vec<_>, _>>()?
                    .into_iter()
                    .flatten()
                    .collect()
            }
        };

        results.sort_by(|a, b| b.date_added.cmp(&a.date_added));

        Ok(results)
    }

    fn match_bookmark(
        &self,
        matcher: &Matcher,
        bmark: &Bookmark,
    ) -> Result<Option<SearchResult>, SearchError> {
        let regex = &matcher.regex;

        match matcher.scope {
            Scope::Url => {
                return Ok(regex
                    .is_match(&bmark.url)
                    .then(|| SearchResult::new(bmark, MatchKind::Irrelevant)));
            }
            Scope::Title => {
                return Ok(regex
                    .is_match(&bmark.title)
                    .then(|| SearchResult::new(bmark, MatchKind::Irrelevant)));
            }
            Scope::Everywhere => {}
        }

        if regex.is_match(&bmark.url) {
            return Ok(Some(SearchResult::new(bmark, MatchKind::Url)));
        }

        if regex.is_match(&bmark.title) {
            return Ok(Some(SearchResult::new(bmark, MatchKind::Title)));
        }

        let Some(content_id) = bmark.content_id else {
            return Ok(None);
        };

        let content = (self.load_contents)(content_id)?;
        let spans: Vec<Range<usize>> = regex.find_iter(&content).map(|m| m.range()).collect();
        if spans.is_empty() {
            return Ok(None);
        }

        let mut result = SearchResult::new(bmark, MatchKind::Content);
        result.spans = spans;
        result.content = Some(content);

        Ok(Some(result))
    }
}
