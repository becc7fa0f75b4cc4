use std::error::Error;

/// Why a single fetch attempt failed.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum FetchFailure {
    #[error("ProtocolError {0} (not found)")]
    NotFound(u16),

    #[error("StatusCode {0} but absent location")]
    RedirectWithoutLocation(u16),

    #[error("StatusCode {status} with unusable location {location:?}")]
    BadLocation { status: u16, location: String },

    #[error("redirect limit reached")]
    TooManyRedirects,

    #[error("ProtocolError {0}")]
    Status(u16),

    #[error("secure channel failure: {0}")]
    SecureChannel(String),

    #[error("connection failure: {0}")]
    Connect(String),

    #[error("Timeout")]
    Timeout,

    #[error("transport error: {0}")]
    Transport(String),

    #[error("fallback renderer failed: {0}")]
    Fallback(String),
}

impl FetchFailure {
    /// Permanent failures abandon the url without spending the retry budget.
    pub fn is_permanent(&self) -> bool {
        matches!(self, FetchFailure::NotFound(_))
    }

    pub fn escalates_to_fallback(&self) -> bool {
        matches!(self, FetchFailure::SecureChannel(_))
    }
}

/// Flattens an error and its sources into one line.
pub fn error_chain(error: &dyn Error) -> String {
    let mut chain = error.to_string();
    let mut source = error.source();

    while let Some(err) = source {
        let msg = err.to_string();
        if !chain.contains(&msg) {
            chain.push_str(": ");
            chain.push_str(&msg);
        }
        source = err.source();
    }

    chain
}

fn looks_like_tls(msg: &str) -> bool {
    let msg = msg.to_lowercase();
    ["tls", "ssl", "certificate", "handshake"]
        .iter()
        .any(|needle| msg.contains(needle))
}

/// Only the sources are inspected: the outer reqwest message carries the
/// request url, which may itself contain any of the tls words.
fn caused_by_tls(error: &dyn Error) -> bool {
    let mut source = error.source();
    while let Some(err) = source {
        if looks_like_tls(&err.to_string()) {
            return true;
        }
        source = err.source();
    }
    false
}

pub fn classify_reqwest(error: &reqwest::Error) -> FetchFailure {
    if error.is_timeout() {
        return FetchFailure::Timeout;
    }

    if let Some(status) = error.status() {
        return classify_status(status.as_u16());
    }

    let chain = error_chain(error);
    if caused_by_tls(error) {
        FetchFailure::SecureChannel(chain)
    } else if error.is_connect() {
        FetchFailure::Connect(chain)
    } else {
        FetchFailure::Transport(chain)
    }
}

pub fn classify_status(status: u16) -> FetchFailure {
    match status {
        404 | 410 => FetchFailure::NotFound(status),
        _ => FetchFailure::Status(status),
    }
}

/// A missing content type is taken to be markup.
pub fn is_supported_content_type(content_type: Option<&str>) -> bool {
    match content_type {
        None => true,
        Some(ct) => {
            let ct = ct.to_lowercase();
            ct.contains("text") || ct.contains("html") || ct.contains("xml")
        }
    }
}
