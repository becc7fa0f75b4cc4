//! Page acquisition: fetches raw bytes for a url under the retry, backoff,
//! redirect and fallback-escalation policy, bounded by a shared throttle.

pub mod errlog;
pub mod failure;
pub mod fallback;
#[cfg(feature = "headless")]
pub mod headless;
pub mod transport;

use std::{sync::Arc, time::Duration};

use rand::Rng;
use tokio::{sync::Semaphore, time::sleep};

use crate::config::DownloaderConfig;
use errlog::ErrorLog;
use failure::{is_supported_content_type, FetchFailure};
use fallback::FallbackRenderer;
use transport::HttpTransport;

pub const UNSUPPORTED_CONTENT_PLACEHOLDER: &str = "Unsupported content type";
pub const ABOUT_PLACEHOLDER: &str = "Site from \"about\" protocol";

/// Entry of `exceptional_urls` that routes every url to the fallback.
pub const ALWAYS_FALLBACK: &str = "*";

/// Result of a successful fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Fetched {
    /// Raw markup that still has to go through the text renderer.
    Raw {
        bytes: Vec<u8>,
        content_type: Option<String>,
    },
    /// Text produced by the fallback renderer.
    Text(String),
    /// Descriptive stand-in stored instead of the page.
    Placeholder(String),
}

/// Outcome of one attempt; drives the retry loop in [`Downloader::fetch`].
#[derive(Debug)]
enum Attempt {
    Success(Fetched),
    Redirect(String),
    Retriable(FetchFailure),
    Permanent(FetchFailure),
}

impl From<FetchFailure> for Attempt {
    fn from(failure: FetchFailure) -> Self {
        if failure.is_permanent() {
            Attempt::Permanent(failure)
        } else {
            Attempt::Retriable(failure)
        }
    }
}

#[derive(Clone, Debug)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    /// Random wait before the first attempt, in milliseconds.
    pub first_jitter_ms: [u64; 2],
    /// Random wait before every later attempt, in milliseconds.
    pub retry_backoff_ms: [u64; 2],
    pub attempt_timeout: Duration,
}

impl RetryPolicy {
    pub fn from_config(config: &DownloaderConfig) -> Self {
        Self {
            max_attempts: config.retry_count,
            first_jitter_ms: config.first_jitter_ms,
            retry_backoff_ms: config.retry_backoff_ms,
            attempt_timeout: Duration::from_millis(config.timeout_ms),
        }
    }
}

fn jitter([min, max]: [u64; 2]) -> Duration {
    if max <= min {
        return Duration::from_millis(min);
    }
    Duration::from_millis(rand::rng().random_range(min..=max))
}

/// Cookie headers keyed by url prefix.
#[derive(Clone, Debug, Default)]
pub struct CookieJar {
    entries: Vec<(String, String)>,
}

impl CookieJar {
    pub fn insert(&mut self, url_prefix: impl Into<String>, header: impl Into<String>) {
        self.entries.push((url_prefix.into(), header.into()));
    }

    pub fn for_url(&self, url: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(prefix, _)| url.starts_with(prefix.as_str()))
            .map(|(_, header)| header.as_str())
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn normalize_url(url: &str) -> String {
    if url.starts_with("//") {
        format!("https:{url}")
    } else {
        url.to_string()
    }
}

fn resolve_location(base: &str, location: &str) -> Option<String> {
    match url::Url::parse(location) {
        Ok(abs) => Some(abs.to_string()),
        Err(url::ParseError::RelativeUrlWithoutBase) => url::Url::parse(base)
            .and_then(|b| b.join(location))
            .ok()
            .map(|u| u.to_string()),
        Err(_) => None,
    }
}

pub struct Downloader {
    transport: Arc<dyn HttpTransport>,
    fallback: Option<Arc<dyn FallbackRenderer>>,
    exceptional_urls: Vec<String>,
    cookies: CookieJar,
    policy: RetryPolicy,
    throttle: Arc<Semaphore>,
    errlog: ErrorLog,
}

impl Downloader {
    pub fn new(
        transport: Arc<dyn HttpTransport>,
        policy: RetryPolicy,
        throttle: Arc<Semaphore>,
        errlog: ErrorLog,
    ) -> Self {
        Self {
            transport,
            fallback: None,
            exceptional_urls: Vec::new(),
            cookies: CookieJar::default(),
            policy,
            throttle,
            errlog,
        }
    }

    pub fn with_fallback(
        mut self,
        fallback: Arc<dyn FallbackRenderer>,
        exceptional_urls: Vec<String>,
    ) -> Self {
        self.fallback = Some(fallback);
        self.exceptional_urls = exceptional_urls;
        self
    }

    pub fn with_cookies(mut self, cookies: CookieJar) -> Self {
        self.cookies = cookies;
        self
    }

    /// The gate bounding concurrent fetch and render work.
    pub fn throttle(&self) -> Arc<Semaphore> {
        self.throttle.clone()
    }

    pub fn errlog(&self) -> &ErrorLog {
        &self.errlog
    }

    fn is_exceptional(&self, url: &str) -> bool {
        self.exceptional_urls
            .iter()
            .any(|eu| eu == ALWAYS_FALLBACK || url.starts_with(eu.as_str()))
    }

    /// Fetches `url`, retrying retriable failures up to the policy's budget.
    /// Every failed attempt is recorded in the error log.
    pub async fn fetch(&self, url: &str) -> Result<Fetched, FetchFailure> {
        if url.starts_with("about:") {
            return Ok(Fetched::Placeholder(ABOUT_PLACEHOLDER.to_string()));
        }

        let mut url = normalize_url(url);
        let max = self.policy.max_attempts;
        let mut use_fallback = self.fallback.is_some() && self.is_exceptional(&url);
        let mut last_failure = FetchFailure::TooManyRedirects;

        sleep(jitter(self.policy.first_jitter_ms)).await;

        for attempt in 1..=max {
            if attempt > 1 {
                sleep(jitter(self.policy.retry_backoff_ms)).await;
            }

            let outcome = {
                let _permit = self
                    .throttle
                    .acquire()
                    .await
                    .map_err(|_| FetchFailure::Transport("throttle closed".to_string()))?;

                log::debug!("starting: {url} ({attempt}/{max})");
                if use_fallback {
                    self.attempt_fallback(&url).await
                } else {
                    self.attempt_http(&url).await
                }
            };

            match outcome {
                Attempt::Success(fetched) => {
                    log::debug!("OK: {url} ({attempt}/{max})");
                    return Ok(fetched);
                }
                Attempt::Redirect(next) => {
                    log::debug!("{url} redirects to {next}");
                    url = next;
                    last_failure = FetchFailure::TooManyRedirects;
                }
                Attempt::Retriable(failure) => {
                    self.errlog
                        .record(&url, Some((attempt, max)), &failure, attempt == max);

                    if !use_fallback && self.fallback.is_some() && failure.escalates_to_fallback() {
                        log::info!("{url}: escalating to fallback renderer");
                        use_fallback = true;
                    }

                    if attempt < max {
                        log::debug!("retrying {url} ({attempt}/{max})");
                    }
                    last_failure = failure;
                }
                Attempt::Permanent(failure) => {
                    self.errlog.record(&url, None, &failure, true);
                    return Err(failure);
                }
            }
        }

        if last_failure == FetchFailure::TooManyRedirects {
            self.errlog.record(&url, Some((max, max)), &last_failure, true);
        }

        Err(last_failure)
    }

    async fn attempt_http(&self, url: &str) -> Attempt {
        let cookie = self.cookies.for_url(url);

        let response = match tokio::time::timeout(
            self.policy.attempt_timeout,
            self.transport.get(url, cookie),
        )
        .await
        {
            Ok(Ok(response)) => response,
            Ok(Err(failure)) => return failure.into(),
            Err(_) => return Attempt::Retriable(FetchFailure::Timeout),
        };

        let status = response.status;

        if (300..400).contains(&status) {
            return match response.location {
                Some(location) => match resolve_location(url, &location) {
                    Some(next) => Attempt::Redirect(next),
                    None => Attempt::Retriable(FetchFailure::BadLocation { status, location }),
                },
                None => Attempt::Retriable(FetchFailure::RedirectWithoutLocation(status)),
            };
        }

        if !(200..300).contains(&status) {
            return failure::classify_status(status).into();
        }

        if !is_supported_content_type(response.content_type.as_deref()) {
            log::debug!("{url}: unsupported content type {:?}", response.content_type);
            return Attempt::Success(Fetched::Placeholder(
                UNSUPPORTED_CONTENT_PLACEHOLDER.to_string(),
            ));
        }

        Attempt::Success(Fetched::Raw {
            bytes: response.body,
            content_type: response.content_type,
        })
    }

    async fn attempt_fallback(&self, url: &str) -> Attempt {
        let Some(fallback) = &self.fallback else {
            return Attempt::Retriable(FetchFailure::Fallback("no fallback configured".to_string()));
        };

        match fallback.render(url).await {
            Ok(text) => Attempt::Success(Fetched::Text(text)),
            Err(err) => Attempt::Retriable(FetchFailure::Fallback(err.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_protocol_relative_url_is_upgraded() {
        assert_eq!(normalize_url("//x.test/a"), "https://x.test/a");
        assert_eq!(normalize_url("http://x.test/a"), "http://x.test/a");
    }

    #[test]
    fn test_relative_location_is_resolved() {
        assert_eq!(
            resolve_location("https://x.test/a/b", "/c").as_deref(),
            Some("https://x.test/c")
        );
        assert_eq!(
            resolve_location("https://x.test/a/b", "https://y.test/").as_deref(),
            Some("https://y.test/")
        );
    }

    #[test]
    fn test_cookie_jar_matches_prefix() {
        let mut jar = CookieJar::default();
        jar.insert("https://news.test/", "sid=1");

        assert_eq!(jar.for_url("https://news.test/article"), Some("sid=1"));
        assert_eq!(jar.for_url("https://other.test/"), None);
    }

    #[test]
    fn test_jitter_with_empty_range() {
        assert_eq!(jitter([0, 0]), Duration::ZERO);
        let d = jitter([10, 20]);
        assert!(d >= Duration::from_millis(10) && d <= Duration::from_millis(20));
    }
}
