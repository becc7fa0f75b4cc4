use std::path::{Path, PathBuf};

use anyhow::{bail, Context};
use serde::{Deserialize, Serialize};

use crate::scrape::fallback::NODE_INLINE_PROGRAM;

pub const CONFIG_FILE_NAME: &str = "config.yaml";

const DEFAULT_USER_AGENT: &str =
    "Mozilla/5.0 (X11; Linux x86_64; rv:128.0) Gecko/20100101 Firefox/128.0";
const DEFAULT_TIMEOUT_MS: u64 = 15_000;
const DEFAULT_RETRY_COUNT: u32 = 3;
const DEFAULT_THROTTLE: usize = 4;
const DEFAULT_FALLBACK_TIMEOUT_MS: u64 = 10_000;
const DEFAULT_RENDER_TIMEOUT_MS: u64 = 5_000;
const DEFAULT_DATABASE_FILE_NAME: &str = "bmbase.sqlite";

/// Which heavier renderer handles exceptional and escalated urls.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FallbackKind {
    None,
    #[default]
    Command,
    Chrome,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DownloaderConfig {
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// Per-attempt network timeout.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    /// Maximum number of attempts per url, redirects included.
    #[serde(default = "default_retry_count")]
    pub retry_count: u32,

    /// How many fetch/render operations may run at once.
    #[serde(default = "default_throttle")]
    pub throttle: usize,

    #[serde(default = "default_first_jitter_ms")]
    pub first_jitter_ms: [u64; 2],

    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: [u64; 2],

    /// Url prefixes that always go through the fallback; `*` matches everything.
    #[serde(default)]
    pub exceptional_urls: Vec<String>,

    #[serde(default)]
    pub fallback: FallbackKind,

    #[serde(default = "default_fallback_command")]
    pub fallback_command: Vec<String>,

    #[serde(default = "default_fallback_timeout_ms")]
    pub fallback_timeout_ms: u64,

    #[serde(default)]
    pub proxy: Option<String>,

    #[serde(default)]
    pub accept_invalid_certs: bool,

    /// Where raw pages are written for the renderer; system temp dir if unset.
    #[serde(default)]
    pub temp_dir: Option<PathBuf>,

    #[serde(default)]
    pub chrome_path: Option<PathBuf>,
}

impl Default for DownloaderConfig {
    fn default() -> Self {
        Self {
            user_agent: default_user_agent(),
            timeout_ms: DEFAULT_TIMEOUT_MS,
            retry_count: DEFAULT_RETRY_COUNT,
            throttle: DEFAULT_THROTTLE,
            first_jitter_ms: default_first_jitter_ms(),
            retry_backoff_ms: default_retry_backoff_ms(),
            exceptional_urls: Vec::new(),
            fallback: FallbackKind::default(),
            fallback_command: default_fallback_command(),
            fallback_timeout_ms: DEFAULT_FALLBACK_TIMEOUT_MS,
            proxy: None,
            accept_invalid_certs: false,
            temp_dir: None,
            chrome_path: None,
        }
    }
}

fn default_user_agent() -> String {
    DEFAULT_USER_AGENT.to_string()
}

fn default_timeout_ms() -> u64 {
    DEFAULT_TIMEOUT_MS
}

fn default_retry_count() -> u32 {
    DEFAULT_RETRY_COUNT
}

fn default_throttle() -> usize {
    DEFAULT_THROTTLE
}

fn default_first_jitter_ms() -> [u64; 2] {
    [1000, 3500]
}

fn default_retry_backoff_ms() -> [u64; 2] {
    [4000, 6000]
}

fn default_fallback_command() -> Vec<String> {
    vec![
        "node".to_string(),
        "-e".to_string(),
        NODE_INLINE_PROGRAM.to_string(),
        "{url}".to_string(),
        "{user_agent}".to_string(),
    ]
}

fn default_fallback_timeout_ms() -> u64 {
    DEFAULT_FALLBACK_TIMEOUT_MS
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RendererConfig {
    #[serde(default = "default_render_command")]
    pub command: String,

    #[serde(default = "default_render_args")]
    pub args: Vec<String>,

    /// Passed to the renderer as `-cfg=<file>`.
    #[serde(default)]
    pub config_file: Option<PathBuf>,

    #[serde(default = "default_render_timeout_ms")]
    pub timeout_ms: u64,

    #[serde(default)]
    pub working_dir: Option<PathBuf>,
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self {
            command: default_render_command(),
            args: default_render_args(),
            config_file: None,
            timeout_ms: DEFAULT_RENDER_TIMEOUT_MS,
            working_dir: None,
        }
    }
}

fn default_render_command() -> String {
    "lynx".to_string()
}

fn default_render_args() -> Vec<String> {
    [
        "-nolist",
        "-nomargins",
        "-dump",
        "-nonumbers",
        "-width=100",
        "-hiddenlinks=ignore",
        "-display_charset=UTF-8",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

fn default_render_timeout_ms() -> u64 {
    DEFAULT_RENDER_TIMEOUT_MS
}

/// Sends cookies of hosts matching `where_host_like` (SQL LIKE) with every
/// request to urls starting with `for_url`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CookieStealing {
    pub for_url: String,
    pub where_host_like: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GeneralConfig {
    #[serde(default = "default_database_file_name")]
    pub database_file_name: String,

    /// When set, these urls replace the browser bookmarks.
    #[serde(default)]
    pub mock_urls: Vec<String>,

    #[serde(default)]
    pub limit_of_queried_bookmarks: Option<usize>,

    #[serde(default)]
    pub skip_queried_bookmarks: Option<usize>,

    #[serde(default = "default_true")]
    pub backup_existing_database: bool,

    #[serde(default)]
    pub places_file_path: Option<PathBuf>,

    #[serde(default)]
    pub cookies_file_path: Option<PathBuf>,

    #[serde(default)]
    pub cookie_stealings: Vec<CookieStealing>,

    #[serde(default)]
    pub export_json_file: Option<PathBuf>,

    #[serde(default)]
    pub error_log_file: Option<PathBuf>,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            database_file_name: default_database_file_name(),
            mock_urls: Vec::new(),
            limit_of_queried_bookmarks: None,
            skip_queried_bookmarks: None,
            backup_existing_database: true,
            places_file_path: None,
            cookies_file_path: None,
            cookie_stealings: Vec::new(),
            export_json_file: None,
            error_log_file: None,
        }
    }
}

fn default_database_file_name() -> String {
    DEFAULT_DATABASE_FILE_NAME.to_string()
}

fn default_true() -> bool {
    true
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub downloader: DownloaderConfig,
    #[serde(default)]
    pub renderer: RendererConfig,
    #[serde(default)]
    pub general: GeneralConfig,

    #[serde(skip_serializing, skip_deserializing)]
    base_path: PathBuf,
}

impl Config {
    pub fn validate(&self) -> anyhow::Result<()> {
        let dl = &self.downloader;

        if dl.throttle == 0 {
            bail!("downloader.throttle must be greater than 0");
        }

        if dl.retry_count == 0 {
            bail!("downloader.retry_count must be greater than 0");
        }

        for (name, [min, max]) in [
            ("first_jitter_ms", dl.first_jitter_ms),
            ("retry_backoff_ms", dl.retry_backoff_ms),
        ] {
            if min > max {
                bail!("downloader.{name}: min {min} is greater than max {max}");
            }
        }

        if dl.fallback == FallbackKind::Command
            && dl.fallback_command.first().map_or(true, |p| p.is_empty())
        {
            bail!("downloader.fallback_command must name a program");
        }

        if self.general.database_file_name.is_empty() {
            bail!("general.database_file_name is empty");
        }

        Ok(())
    }

    pub fn load_with(base_path: &Path) -> anyhow::Result<Self> {
        let config_path = base_path.join(CONFIG_FILE_NAME);

        // create new if does not exist
        if !config_path.exists() {
            std::fs::create_dir_all(base_path)
                .with_context(|| format!("creating {}", base_path.display()))?;
            std::fs::write(&config_path, serde_yml::to_string(&Self::default())?)
                .with_context(|| format!("writing {}", config_path.display()))?;
        }

        let config_str = std::fs::read_to_string(&config_path)
            .with_context(|| format!("reading {}", config_path.display()))?;
        let mut config: Self = serde_yml::from_str(&config_str)
            .with_context(|| format!("{} is malformed", config_path.display()))?;

        config.base_path = base_path.to_path_buf();

        config.validate()?;

        // resave in case config version needs an upgrade
        if config_str != serde_yml::to_string(&config)? {
            config.save()?;
        }

        Ok(config)
    }

    pub fn save(&self) -> anyhow::Result<()> {
        let config_path = self.base_path.join(CONFIG_FILE_NAME);
        let config_str = serde_yml::to_string(&self)?;
        std::fs::write(&config_path, config_str)
            .with_context(|| format!("writing {}", config_path.display()))?;
        Ok(())
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    pub fn database_path(&self) -> PathBuf {
        self.base_path.join(&self.general.database_file_name)
    }
}
