use std::{io::IsTerminal, sync::Arc};

use anyhow::Context;
use indicatif::{ProgressBar, ProgressStyle};
use tokio::sync::Semaphore;

use super::task_runner::{Acquisition, Pipeline, RunSummary};
use crate::{
    backup,
    config::{Config, FallbackKind},
    export,
    render::LynxRenderer,
    scrape::{
        errlog::{self, ErrorLog},
        fallback::{CommandFallback, FallbackRenderer},
        transport::ReqwestTransport,
        CookieJar, Downloader, RetryPolicy,
    },
    sources,
    storage::{ArchiveWriter, ContentStore},
};

fn fallback_from_config(config: &Config) -> anyhow::Result<Option<Arc<dyn FallbackRenderer>>> {
    let dl = &config.downloader;

    let fallback: Arc<dyn FallbackRenderer> = match dl.fallback {
        FallbackKind::None => return Ok(None),
        FallbackKind::Command => {
            Arc::new(CommandFallback::from_config(dl)?.working_dir(config.base_path().to_path_buf()))
        }
        #[cfg(feature = "headless")]
        FallbackKind::Chrome => Arc::new(crate::scrape::headless::ChromeFallback::from_config(dl)),
        #[cfg(not(feature = "headless"))]
        FallbackKind::Chrome => {
            anyhow::bail!("downloader.fallback is chrome but bmbase was built without `headless`")
        }
    };

    Ok(Some(fallback))
}

/// Production wiring of the acquisition pipeline.
pub fn build_pipeline(
    config: &Config,
    store: Arc<dyn ContentStore>,
    cookies: CookieJar,
    errors: ErrorLog,
) -> anyhow::Result<Pipeline> {
    let dl = &config.downloader;

    let transport = ReqwestTransport::new(dl).context("building http client")?;
    let throttle = Arc::new(Semaphore::new(dl.throttle));

    let mut downloader = Downloader::new(
        Arc::new(transport),
        RetryPolicy::from_config(dl),
        throttle,
        errors,
    )
    .with_cookies(cookies);

    if let Some(fallback) = fallback_from_config(config)? {
        downloader = downloader.with_fallback(fallback, dl.exceptional_urls.clone());
    }

    Ok(Pipeline {
        downloader,
        renderer: Arc::new(LynxRenderer::from_config(&config.renderer, config.base_path())),
        store,
        temp_dir: dl.temp_dir.clone(),
    })
}

fn progress_bar(len: usize) -> ProgressBar {
    if !std::io::stderr().is_terminal() {
        return ProgressBar::hidden();
    }

    let bar = ProgressBar::new(len as u64);
    if let Ok(style) =
        ProgressStyle::with_template("{spinner} [{elapsed_precise}] {wide_bar} {pos}/{len}")
    {
        bar.set_style(style);
    }
    bar
}

fn flush_error_log(config: &Config, summary: &RunSummary) -> anyhow::Result<()> {
    for entry in &summary.errors {
        log::warn!("{entry}");
    }

    if let Some(path) = &config.general.error_log_file {
        let lines: Vec<String> = summary.errors.iter().map(|e| e.to_string()).collect();
        std::fs::write(path, lines.join("\n"))
            .with_context(|| format!("writing {}", path.display()))?;
    }

    Ok(())
}

/// One full acquisition run. The previous archive is replaced only if the
/// run gets as far as the final commit.
pub async fn run_import(config: &Config) -> anyhow::Result<RunSummary> {
    let mock = !config.general.mock_urls.is_empty();

    let source = sources::from_config(config)?;
    let mut bookmarks = source.bookmarks()?;
    let cookies = source.cookies().unwrap_or_else(|err| {
        log::warn!("reading cookies failed: {err:#}");
        CookieJar::default()
    });

    log::info!("{} bookmarks from {}", bookmarks.len(), source.name());

    let db_path = config.database_path();
    if !mock && config.general.backup_existing_database {
        if let Err(err) = backup::backup_database(&db_path) {
            log::error!("backup of {} failed: {err:#}", db_path.display());
        }
    }

    let writer = Arc::new(ArchiveWriter::create(&db_path)?);
    let (errors, drain) = errlog::channel();
    let pipeline = build_pipeline(config, writer.clone(), cookies, errors)?;

    let summary = Acquisition::new(pipeline, drain)
        .with_progress(progress_bar(bookmarks.len()))
        .run(&mut bookmarks)
        .await?;

    writer.save_bookmarks(&bookmarks)?;
    writer.commit()?;

    log::info!(
        "done: {} archived, {} erroneous, {} error log entries",
        summary.archived,
        summary.erroneous,
        summary.errors.len()
    );

    flush_error_log(config, &summary)?;

    if !mock {
        if let Some(path) = &config.general.export_json_file {
            export::export_json(path, &bookmarks)?;
        }
    }

    Ok(summary)
}
