mod engine;
mod highlight;
mod query;


pub use engine::{MatchKind, SearchEngine, SearchResult};
pub use highlight::{excerpts, Fragment, Fragments};
pub use query::{parse, Query, HELP_MESSAGE};

use crate::storage::StoreError;

#[derive(thiserror::Error, Debug)]
pub enum SearchError {
    /// The user's pattern did not compile.
    #[error("invalid pattern: {0}")]
    Pattern(#[from] regex::Error),

    #[error("failed to load content: {0}")]
    Store(#[from] StoreError),
}
