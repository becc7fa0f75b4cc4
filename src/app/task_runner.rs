use std::{path::PathBuf, sync::Arc};

use indicatif::ProgressBar;
use tokio::task::JoinSet;

use crate::{
    bookmarks::Bookmark,
    render::{render_bytes, TextRenderer},
    scrape::{errlog::ErrorEntry, errlog::ErrorLogDrain, Downloader, Fetched},
    storage::{ContentStore, StoreError},
};

/// Everything one acquisition task needs, shared by all of them.
pub struct Pipeline {
    pub downloader: Downloader,
    pub renderer: Arc<dyn TextRenderer>,
    pub store: Arc<dyn ContentStore>,
    pub temp_dir: Option<PathBuf>,
}

#[derive(Debug, Default)]
pub struct RunSummary {
    pub archived: usize,
    pub erroneous: usize,
    /// Error log of the run, sorted.
    pub errors: Vec<ErrorEntry>,
}

/// Fans out one acquisition task per bookmark and waits for all of them.
pub struct Acquisition {
    pipeline: Arc<Pipeline>,
    errors: ErrorLogDrain,
    progress: ProgressBar,
}

impl Acquisition {
    pub fn new(pipeline: Pipeline, errors: ErrorLogDrain) -> Self {
        Self {
            pipeline: Arc::new(pipeline),
            errors,
            progress: ProgressBar::hidden(),
        }
    }

    pub fn with_progress(mut self, progress: ProgressBar) -> Self {
        self.progress = progress;
        self
    }

    /// Archives every bookmark: sets its content id, or marks it erroneous.
    ///
    /// Network and renderer failures stay local to their bookmark. A store
    /// failure aborts the run; the remaining tasks are cancelled when the
    /// task set is dropped.
    pub async fn run(self, bookmarks: &mut [Bookmark]) -> Result<RunSummary, StoreError> {
        self.progress.set_length(bookmarks.len() as u64);

        let mut tasks = JoinSet::new();
        for (idx, bmark) in bookmarks.iter().enumerate() {
            let pipeline = self.pipeline.clone();
            let url = bmark.url.clone();
            tasks.spawn(async move { (idx, acquire(&pipeline, &url).await) });
        }

        let mut settled = vec![false; bookmarks.len()];
        let mut summary = RunSummary::default();

        while let Some(joined) = tasks.join_next().await {
            let (idx, outcome) = match joined {
                Ok(res) => res,
                Err(err) => {
                    // the bookmark is picked up as unsettled below
                    log::error!("acquisition task failed: {err}");
                    self.progress.inc(1);
                    continue;
                }
            };

            settled[idx] = true;
            let outcome = match outcome {
                Ok(outcome) => outcome,
                Err(err) => {
                    self.progress.finish_and_clear();
                    return Err(err);
                }
            };

            match outcome {
                Some(content_id) => {
                    bookmarks[idx].archive(content_id);
                    summary.archived += 1;
                }
                None => {
                    bookmarks[idx].mark_erroneous();
                    summary.erroneous += 1;
                }
            }
            self.progress.inc(1);
        }

        let errlog = self.pipeline.downloader.errlog();
        for (bmark, _) in bookmarks.iter_mut().zip(&settled).filter(|(_, s)| !**s) {
            errlog.record(&bmark.url, None, "acquisition task failed", true);
            bmark.mark_erroneous();
            summary.erroneous += 1;
        }

        self.progress.finish_and_clear();
        summary.errors = self.errors.drain();

        Ok(summary)
    }
}

/// Fetch, render and store one page. `Ok(None)` means the page could not be
/// archived; the reason is already in the error log.
async fn acquire(pipeline: &Pipeline, url: &str) -> Result<Option<i64>, StoreError> {
    let text = match pipeline.downloader.fetch(url).await {
        Ok(Fetched::Raw { bytes, .. }) => {
            let throttle = pipeline.downloader.throttle();
            let _permit = throttle
                .acquire()
                .await
                .map_err(|err| StoreError::Task(err.to_string()))?;

            match render_bytes(
                pipeline.renderer.as_ref(),
                &bytes,
                pipeline.temp_dir.as_deref(),
            )
            .await
            {
                Ok(text) => text,
                Err(err) => {
                    pipeline
                        .downloader
                        .errlog()
                        .record(url, None, format!("render failed: {err}"), true);
                    return Ok(None);
                }
            }
        }
        Ok(Fetched::Text(text)) | Ok(Fetched::Placeholder(text)) => text,
        Err(_) => return Ok(None),
    };

    let store = pipeline.store.clone();
    let content_id = tokio::task::spawn_blocking(move || store.save_contents(&text))
        .await
        .map_err(|err| StoreError::Task(err.to_string()))??;

    log::debug!("{url}: archived as content {content_id}");

    Ok(Some(content_id))
}
