use std::{
    fmt::Display,
    sync::mpsc::{self, Receiver, Sender},
};

use chrono::Local;

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S:%3f";

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ErrorEntry {
    pub timestamp: String,
    pub url: String,
    /// `(attempt, max_attempts)`; absent for failures outside the retry loop.
    pub attempt: Option<(u32, u32)>,
    pub reason: String,
    /// Set on the entry that made the url give up.
    pub fatal: bool,
}

impl Display for ErrorEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ERROR: {}", self.timestamp, self.url)?;
        if let Some((attempt, max)) = self.attempt {
            write!(f, " ({attempt}/{max})")?;
        }
        write!(f, " {}", self.reason)?;
        if self.fatal {
            write!(f, " Failed")?;
        }
        Ok(())
    }
}

/// Sending half of the per-run error log. Cheap to clone into every task.
#[derive(Clone)]
pub struct ErrorLog {
    tx: Sender<ErrorEntry>,
}

/// Receiving half; drained exactly once when the run is over.
pub struct ErrorLogDrain {
    rx: Receiver<ErrorEntry>,
}

pub fn channel() -> (ErrorLog, ErrorLogDrain) {
    let (tx, rx) = mpsc::channel();
    (ErrorLog { tx }, ErrorLogDrain { rx })
}

impl ErrorLog {
    pub fn record(&self, url: &str, attempt: Option<(u32, u32)>, reason: impl Display, fatal: bool) {
        let entry = ErrorEntry {
            timestamp: Local::now().format(TIMESTAMP_FORMAT).to_string(),
            url: url.to_string(),
            attempt,
            reason: reason.to_string(),
            fatal,
        };

        log::debug!("{entry}");

        // the drain only goes away after every task has settled
        let _ = self.tx.send(entry);
    }
}

impl ErrorLogDrain {
    /// Everything recorded so far, sorted so the output does not depend on
    /// the order in which tasks finished.
    pub fn drain(&self) -> Vec<ErrorEntry> {
        let mut entries: Vec<ErrorEntry> = self.rx.try_iter().collect();
        entries.sort_by_cached_key(|e| e.to_string());
        entries
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entry_format() {
        let entry = ErrorEntry {
            timestamp: "2024-01-01 10:00:00:000".to_string(),
            url: "https://x.test".to_string(),
            attempt: Some((3, 3)),
            reason: "Timeout".to_string(),
            fatal: true,
        };

        assert_eq!(
            entry.to_string(),
            "2024-01-01 10:00:00:000 ERROR: https://x.test (3/3) Timeout Failed"
        );
    }

    #[test]
    fn test_drain_is_sorted() {
        let (log, drain) = channel();
        let senders: Vec<_> = ["https://c.test", "https://a.test", "https://b.test"]
            .into_iter()
            .map(|url| {
                let log = log.clone();
                std::thread::spawn(move || log.record(url, None, "boom", false))
            })
            .collect();
        for s in senders {
            s.join().unwrap();
        }

        let lines: Vec<String> = drain.drain().iter().map(|e| e.to_string()).collect();
        let mut sorted = lines.clone();
        sorted.sort();

        assert_eq!(lines.len(), 3);
        assert_eq!(lines, sorted);
        assert!(drain.drain().is_empty());
    }
}
