use std::{path::PathBuf, str::FromStr, time::Duration};

use async_trait::async_trait;
use headless_chrome::{Browser, LaunchOptionsBuilder};

use super::fallback::FallbackRenderer;
use crate::{config::DownloaderConfig, render::RenderError};

/// Full browser engine fallback: loads the page in headless chromium and
/// returns the rendered `innerText` of its body.
pub struct ChromeFallback {
    chrome_path: Option<PathBuf>,
    user_agent: String,
    timeout: Duration,
}

impl ChromeFallback {
    pub fn from_config(config: &DownloaderConfig) -> Self {
        let chrome_path = config.chrome_path.clone().or_else(|| {
            std::env::var("CHROME_PATH")
                .ok()
                .and_then(|p| PathBuf::from_str(&p).ok())
        });

        Self {
            chrome_path,
            user_agent: config.user_agent.clone(),
            timeout: Duration::from_millis(config.fallback_timeout_ms),
        }
    }
}

fn chrome_err(err: impl std::fmt::Display) -> RenderError {
    RenderError::Other(format!("chrome: {err}"))
}

fn fetch_text_with_chrome(
    url: &str,
    chrome_path: Option<PathBuf>,
    user_agent: &str,
    timeout: Duration,
) -> Result<String, RenderError> {
    let options = LaunchOptionsBuilder::default()
        .sandbox(false)
        .path(chrome_path)
        .build()
        .map_err(chrome_err)?;

    let browser = Browser::new(options).map_err(chrome_err)?;
    let tab = browser.new_tab().map_err(chrome_err)?;

    tab.set_user_agent(user_agent, Some("en-US,en"), None)
        .map_err(chrome_err)?;
    tab.set_default_timeout(timeout);

    tab.navigate_to(url).map_err(chrome_err)?;
    tab.wait_until_navigated().map_err(chrome_err)?;

    // in case the page hasn't been fully loaded yet
    let _ = tab.wait_for_element("body");

    let text = tab
        .evaluate("document.body ? document.body.innerText : ''", false)
        .map_err(chrome_err)?
        .value
        .and_then(|v| v.as_str().map(|s| s.to_string()))
        .unwrap_or_default();

    let _ = tab.close(true);

    Ok(text)
}

#[async_trait]
impl FallbackRenderer for ChromeFallback {
    async fn render(&self, url: &str) -> Result<String, RenderError> {
        log::debug!("{url}: starting with headless chrome");

        let url = url.to_string();
        let chrome_path = self.chrome_path.clone();
        let user_agent = self.user_agent.clone();
        let timeout = self.timeout;

        // the browser is driven synchronously; a timed-out session keeps its
        // thread until chromium's own navigation timeout fires
        let task = tokio::task::spawn_blocking(move || {
            fetch_text_with_chrome(&url, chrome_path, &user_agent, timeout)
        });

        match tokio::time::timeout(self.timeout, task).await {
            Ok(Ok(result)) => result,
            Ok(Err(join_err)) => Err(RenderError::Other(join_err.to_string())),
            Err(_) => Err(RenderError::Timeout(self.timeout)),
        }
    }
}
