use std::{
    io::Write,
    path::{Path, PathBuf},
    process::Stdio,
    time::Duration,
};

use async_trait::async_trait;
use tokio::process::Command;

use crate::config::RendererConfig;

#[derive(thiserror::Error, Debug)]
pub enum RenderError {
    #[error("failed to start {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("timed out after {0:?}")]
    Timeout(Duration),

    #[error("exited with {status}: {stderr}")]
    Exit { status: String, stderr: String },

    #[error("io error: {0}")]
    IO(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

/// Turns a file of raw markup into plain text.
#[async_trait]
pub trait TextRenderer: Send + Sync {
    async fn render(&self, path: &Path) -> Result<String, RenderError>;
}

/// Runs `command` and returns its stdout decoded as UTF-8.
///
/// The child is killed when the wait times out: it is spawned with
/// `kill_on_drop` and dropped together with the timed-out future.
pub async fn run_with_timeout(mut command: Command, timeout: Duration) -> Result<String, RenderError> {
    let program = command.as_std().get_program().to_string_lossy().to_string();

    let child = command
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|source| RenderError::Spawn {
            program: program.clone(),
            source,
        })?;

    let output = match tokio::time::timeout(timeout, child.wait_with_output()).await {
        Ok(output) => output?,
        Err(_) => {
            log::warn!("{program}: no exit after {timeout:?}, killing it");
            return Err(RenderError::Timeout(timeout));
        }
    };

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(RenderError::Exit {
            status: output.status.to_string(),
            stderr: stderr.trim().chars().take(200).collect(),
        });
    }

    Ok(String::from_utf8_lossy(&output.stdout).to_string())
}

/// Text-mode browser dump (`lynx -dump` and friends).
pub struct LynxRenderer {
    command: String,
    args: Vec<String>,
    config_file: Option<PathBuf>,
    working_dir: PathBuf,
    timeout: Duration,
}

impl LynxRenderer {
    pub fn from_config(config: &RendererConfig, base_path: &Path) -> Self {
        Self {
            command: config.command.clone(),
            args: config.args.clone(),
            config_file: config.config_file.clone(),
            working_dir: config
                .working_dir
                .clone()
                .unwrap_or_else(|| base_path.to_path_buf()),
            timeout: Duration::from_millis(config.timeout_ms),
        }
    }
}

#[async_trait]
impl TextRenderer for LynxRenderer {
    async fn render(&self, path: &Path) -> Result<String, RenderError> {
        let mut command = Command::new(&self.command);
        command.current_dir(&self.working_dir).args(&self.args);

        if let Some(cfg) = &self.config_file {
            command.arg(format!("-cfg={}", cfg.display()));
        }

        command.arg(path);

        run_with_timeout(command, self.timeout).await
    }
}

/// Writes `bytes` to a temporary `.htm` file and renders it. The file is
/// removed afterwards whether rendering succeeded or not.
pub async fn render_bytes(
    renderer: &dyn TextRenderer,
    bytes: &[u8],
    temp_dir: Option<&Path>,
) -> Result<String, RenderError> {
    let mut builder = tempfile::Builder::new();
    builder.suffix(".htm");

    let mut file = match temp_dir {
        Some(dir) => builder.tempfile_in(dir)?,
        None => builder.tempfile()?,
    };
    file.write_all(bytes)?;
    file.flush()?;

    renderer.render(file.path()).await
}

#[cfg(test)]
mod tests {
    use super::*;

    struct EchoRenderer;

    #[async_trait]
    impl TextRenderer for EchoRenderer {
        async fn render(&self, path: &Path) -> Result<String, RenderError> {
            Ok(std::fs::read_to_string(path)?)
        }
    }

    #[tokio::test]
    async fn test_render_bytes_removes_temp_file() {
        let dir = tempfile::tempdir().unwrap();

        let text = render_bytes(&EchoRenderer, b"<p>hello</p>", Some(dir.path()))
            .await
            .unwrap();

        assert_eq!(text, "<p>hello</p>");
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_missing_program_is_spawn_error() {
        let command = Command::new("definitely-not-a-real-renderer-binary");
        let err = run_with_timeout(command, Duration::from_secs(1))
            .await
            .unwrap_err();

        assert!(matches!(err, RenderError::Spawn { .. }));
    }
}
