use regex::{Regex, RegexBuilder};

use super::SearchError;
use crate::bookmarks::ERRONEOUS_MARKER;

pub const HELP_MESSAGE: &str = "\
Available modifier keywords:
all:        -- loads all bookmarks sorted by date descending
casesens:   -- makes search case sensitive
help: or ?  -- displays this text
inurl:      -- searches only in the urls
intitle:    -- searches only in the titles
singleline: -- treats whole text as one big line (affects performance)
err:        -- search for erroneous bookmarks";

/// A parsed query string: at most one leading modifier plus the pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Query {
    All,
    Help,
    CaseSensitive(String),
    InUrl(String),
    InTitle(String),
    SingleLine(String),
    Erroneous,
    FreeText(String),
}

/// Modifiers are matched case-sensitively and only at the very start.
pub fn parse(input: &str) -> Query {
    if input.is_empty() || input.starts_with("all:") {
        return Query::All;
    }

    if input == "?" || input.starts_with("help:") {
        return Query::Help;
    }

    if input.starts_with("err:") {
        return Query::Erroneous;
    }

    let modifiers: [(&str, fn(String) -> Query); 4] = [
        ("casesens:", Query::CaseSensitive),
        ("inurl:", Query::InUrl),
        ("intitle:", Query::InTitle),
        ("singleline:", Query::SingleLine),
    ];

    for (prefix, make) in modifiers {
        if let Some(pattern) = input.strip_prefix(prefix) {
            return make(pattern.to_string());
        }
    }

    Query::FreeText(input.to_string())
}

/// Fields a compiled query is applied to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    /// Url, then title, then content; first hit wins.
    Everywhere,
    Url,
    Title,
}

#[derive(Debug, Clone)]
pub struct Matcher {
    pub regex: Regex,
    pub scope: Scope,
}

fn build(pattern: &str, case_sensitive: bool, single_line: bool) -> Result<Regex, SearchError> {
    let regex = RegexBuilder::new(pattern)
        .case_insensitive(!case_sensitive)
        .multi_line(!single_line)
        .dot_matches_new_line(single_line)
        .build()?;

    Ok(regex)
}

impl Query {
    /// `None` for queries that need no pattern.
    pub fn compile(&self) -> Result<Option<Matcher>, SearchError> {
        let (regex, scope) = match self {
            Query::All | Query::Help => return Ok(None),
            Query::CaseSensitive(p) => (build(p, true, false)?, Scope::Everywhere),
            Query::InUrl(p) => (build(p, false, false)?, Scope::Url),
            Query::InTitle(p) => (build(p, false, false)?, Scope::Title),
            Query::SingleLine(p) => (build(p, false, true)?, Scope::Everywhere),
            Query::FreeText(p) => (build(p, false, false)?, Scope::Everywhere),
            Query::Erroneous => {
                let pattern = format!("{}$", regex::escape(ERRONEOUS_MARKER));
                (build(&pattern, true, false)?, Scope::Title)
            }
        };

        Ok(Some(Matcher { regex, scope }))
    }
}
