use std::{path::PathBuf, time::Duration};

use async_trait::async_trait;
use tokio::process::Command;

use crate::{
    config::DownloaderConfig,
    render::{run_with_timeout, RenderError},
};

/// Inline Node.js program used by the default fallback command. Reads the
/// url and user agent from its arguments and prints the page as text.
pub const NODE_INLINE_PROGRAM: &str = r#"const [url, userAgent] = process.argv.slice(1);
fetch(url, {
  method: 'GET',
  headers: { 'User-Agent': userAgent, 'Accept': 'text/html, application/xhtml+xml, text/plain, application/xml' },
  redirect: 'follow'
})
  .then(r => r.text())
  .then(html => process.stdout.write(html
    .replace(/<script[\s\S]*?<\/script>/gi, '')
    .replace(/<style[\s\S]*?<\/style>/gi, '')
    .replace(/<[^>]+>/g, ' ')
    .replace(/[ \t]+/g, ' ')
    .replace(/\n\s*\n+/g, '\n\n')))
  .catch(e => { console.error(String(e)); process.exit(1); });"#;

/// Heavier rendering path for sites the plain HTTP fetch cannot handle.
/// Yields text directly, so its output skips the [`TextRenderer`] step.
///
/// [`TextRenderer`]: crate::render::TextRenderer
#[async_trait]
pub trait FallbackRenderer: Send + Sync {
    async fn render(&self, url: &str) -> Result<String, RenderError>;
}

/// Scripted fetch helper run as a subprocess. `{url}` and `{user_agent}` in
/// the argument list are substituted per call.
pub struct CommandFallback {
    program: String,
    args: Vec<String>,
    user_agent: String,
    working_dir: Option<PathBuf>,
    timeout: Duration,
}

impl CommandFallback {
    pub fn new(program: impl Into<String>, args: Vec<String>, user_agent: impl Into<String>, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            args,
            user_agent: user_agent.into(),
            working_dir: None,
            timeout,
        }
    }

    pub fn from_config(config: &DownloaderConfig) -> anyhow::Result<Self> {
        let (program, args) = config
            .fallback_command
            .split_first()
            .ok_or_else(|| anyhow::anyhow!("downloader.fallback_command is empty"))?;

        Ok(Self::new(
            program.clone(),
            args.to_vec(),
            config.user_agent.clone(),
            Duration::from_millis(config.fallback_timeout_ms),
        ))
    }

    pub fn working_dir(mut self, dir: PathBuf) -> Self {
        self.working_dir = Some(dir);
        self
    }

    fn expand(&self, arg: &str, url: &str) -> String {
        arg.replace("{url}", url)
            .replace("{user_agent}", &self.user_agent)
    }
}

#[async_trait]
impl FallbackRenderer for CommandFallback {
    async fn render(&self, url: &str) -> Result<String, RenderError> {
        log::debug!("{url}: starting with {}", self.program);

        let mut command = Command::new(&self.program);
        command.args(self.args.iter().map(|a| self.expand(a, url)));
        if let Some(dir) = &self.working_dir {
            command.current_dir(dir);
        }

        run_with_timeout(command, self.timeout).await
    }
}
