use std::time::Duration;

use async_trait::async_trait;
use reqwest::{
    header::{self, HeaderMap, HeaderValue},
    redirect,
};

use super::failure::{classify_reqwest, is_supported_content_type, FetchFailure};
use crate::config::DownloaderConfig;

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub location: Option<String>,
    pub content_type: Option<String>,
    pub body: Vec<u8>,
}

/// One GET request, no redirect following.
#[async_trait]
pub trait HttpTransport: Send + Sync {
    async fn get(&self, url: &str, cookie: Option<&str>) -> Result<HttpResponse, FetchFailure>;
}

pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new(config: &DownloaderConfig) -> anyhow::Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::ACCEPT,
            HeaderValue::from_static("text/html, application/xhtml+xml, application/xml, text/plain"),
        );
        headers.insert(
            header::ACCEPT_LANGUAGE,
            HeaderValue::from_static("en-US,en;q=0.8,pl;q=0.5"),
        );

        let mut client = reqwest::Client::builder()
            .user_agent(&config.user_agent)
            .default_headers(headers)
            .redirect(redirect::Policy::none())
            .danger_accept_invalid_certs(config.accept_invalid_certs)
            .danger_accept_invalid_hostnames(config.accept_invalid_certs)
            .timeout(Duration::from_millis(config.timeout_ms))
            .pool_idle_timeout(Duration::from_secs(300));

        let opt_proxy = std::env::var("OPT_PROXY")
            .ok()
            .filter(|p| !p.is_empty())
            .or_else(|| config.proxy.clone());
        if let Some(proxy) = opt_proxy {
            log::debug!("using proxy {proxy:#?}");
            client = client.proxy(reqwest::Proxy::all(&proxy)?);
        }

        Ok(Self {
            client: client.build()?,
        })
    }
}

fn header_string(headers: &HeaderMap, name: header::HeaderName) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.to_string())
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn get(&self, url: &str, cookie: Option<&str>) -> Result<HttpResponse, FetchFailure> {
        let mut request = self.client.get(url);
        if let Some(cookie) = cookie {
            request = request.header(header::COOKIE, cookie);
        }

        let resp = request.send().await.map_err(|e| classify_reqwest(&e))?;

        let status = resp.status();
        let location = header_string(resp.headers(), header::LOCATION);
        let content_type = header_string(resp.headers(), header::CONTENT_TYPE);

        // only successful text responses carry a body worth reading; the
        // downloader turns anything else into a placeholder
        let body = if status.is_success() && is_supported_content_type(content_type.as_deref()) {
            resp.bytes().await.map_err(|e| classify_reqwest(&e))?.to_vec()
        } else {
            Vec::new()
        };

        Ok(HttpResponse {
            status: status.as_u16(),
            location,
            content_type,
            body,
        })
    }
}
