use anyhow::{Context, Result};
use inquire::{error::InquireError, Text};

use crate::{
    app,
    config::Config,
    search::{
        excerpts, parse, MatchKind, Query, SearchEngine, SearchError, SearchResult, HELP_MESSAGE,
    },
    storage::{ArchiveReader, StoreError},
};

const EXCERPTS_PER_RESULT: usize = 3;
const EXCERPT_CONTEXT: usize = 80;

pub fn handle_import(config: &Config) -> Result<()> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("starting async runtime")?;

    let summary = runtime.block_on(app::run_import(config))?;

    println!(
        "{} archived, {} erroneous",
        summary.archived, summary.erroneous
    );

    Ok(())
}

pub fn handle_config(config: &Config) -> Result<()> {
    print!("{}", serde_yml::to_string(config)?);
    Ok(())
}

pub fn handle_search(
    config: &Config,
    query: Option<String>,
    json: bool,
    limit: Option<usize>,
) -> Result<()> {
    let db_path = config.database_path();
    let reader = ArchiveReader::open(&db_path)
        .with_context(|| format!("opening archive {}", db_path.display()))?;

    let engine = SearchEngine::new(reader.bookmarks(), |id| reader.load_contents(id));

    if let Some(query) = query {
        return run_query(&engine, &query, json, limit).map_err(anyhow::Error::from);
    }

    if let Some(modified) = reader.last_modified() {
        println!(
            "{} bookmarks, archived {}",
            reader.bookmarks().len(),
            modified.format("%Y-%m-%d %H:%M")
        );
    }

    loop {
        let query = match Text::new("?").prompt() {
            Ok(q) => q,
            Err(InquireError::OperationCanceled | InquireError::OperationInterrupted) => {
                return Ok(())
            }
            Err(err) => return Err(err.into()),
        };

        if query == ":q" {
            return Ok(());
        }

        match run_query(&engine, &query, json, limit) {
            Ok(()) => {}
            Err(SearchError::Pattern(err)) => eprintln!("invalid pattern: {err}"),
            Err(err) => return Err(err.into()),
        }
    }
}

fn run_query<F>(
    engine: &SearchEngine<'_, F>,
    query: &str,
    json: bool,
    limit: Option<usize>,
) -> Result<(), SearchError>
where
    F: Fn(i64) -> Result<String, StoreError> + Sync,
{
    let query = parse(query);
    if query == Query::Help {
        println!("{HELP_MESSAGE}");
        return Ok(());
    }

    let mut results = engine.search_query(&query)?;
    let total = results.len();
    if let Some(limit) = limit {
        results.truncate(limit);
    }

    if json {
        match serde_json::to_string_pretty(&results) {
            Ok(out) => println!("{out}"),
            Err(err) => log::error!("failed to serialize results: {err}"),
        }
        return Ok(());
    }

    for result in &results {
        print_result(result);
    }
    println!("{total} found");

    Ok(())
}

fn print_result(result: &SearchResult) {
    println!("*** {}", result.title);
    println!("### {}", result.url);

    let folder = result.folder.as_deref().unwrap_or("-");
    println!(
        "    {} | {}",
        result.date_added.format("%Y-%m-%d"),
        folder
    );

    if result.match_kind == MatchKind::Content {
        if let Some(content) = &result.content {
            for excerpt in excerpts(content, &result.spans, EXCERPTS_PER_RESULT, EXCERPT_CONTEXT) {
                println!("    {excerpt}");
            }
        }
    }

    println!();
}
