//! Delegated lint tool used for native fixes and post-fix validation.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tokio::process::Command;
use tracing::debug;

/// Errors from running the lint tool.
#[derive(Debug, thiserror::Error)]
pub enum LintError {
    /// The tool could not be started.
    #[error("lint tool unavailable: {0}")]
    Unavailable(String),
    /// The tool ran longer than allowed.
    #[error("lint tool timed out after {seconds}s")]
    Timeout {
        /// Timeout budget in seconds.
        seconds: u64,
    },
    /// The tool ran but its output could not be used.
    #[error("lint tool failed: {0}")]
    Failed(String),
}

/// A linter that can fix files and report fatal parse errors.
#[async_trait]
pub trait LintTool: Send + Sync {
    /// Return the fixed content of `file`, or `None` if the tool changed nothing.
    async fn fix(&self, file: &Path) -> Result<Option<String>, LintError>;

    /// Fatal (parse-level) messages for `file`. Empty means it parsed.
    async fn fatal_messages(&self, file: &Path) -> Result<Vec<String>, LintError>;
}

/// Lint tool that never changes anything and never complains.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopLint;

#[async_trait]
impl LintTool for NoopLint {
    async fn fix(&self, _file: &Path) -> Result<Option<String>, LintError> {
        Ok(None)
    }

    async fn fatal_messages(&self, _file: &Path) -> Result<Vec<String>, LintError> {
        Ok(Vec::new())
    }
}

/// ESLint invoked as a subprocess with `--fix-dry-run --format json`.
#[derive(Debug, Clone)]
pub struct EslintCli {
    program: String,
    args: Vec<String>,
    working_dir: PathBuf,
    timeout: Duration,
}

#[derive(Debug, Deserialize)]
struct FileReport {
    #[serde(default)]
    output: Option<String>,
    #[serde(default)]
    messages: Vec<Message>,
}

#[derive(Debug, Deserialize)]
struct Message {
    #[serde(default)]
    fatal: bool,
    #[serde(default)]
    message: String,
}

impl EslintCli {
    /// Run `program args…` in `working_dir`, e.g. `npx eslint`.
    pub fn new(
        program: impl Into<String>,
        args: Vec<String>,
        working_dir: impl Into<PathBuf>,
        timeout: Duration,
    ) -> Self {
        Self {
            program: program.into(),
            args,
            working_dir: working_dir.into(),
            timeout,
        }
    }

    async fn report(&self, file: &Path) -> Result<FileReport, LintError> {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args)
            .args(["--fix-dry-run", "--format", "json"])
            .arg(file)
            .current_dir(&self.working_dir)
            .kill_on_drop(true);

        let output = tokio::time::timeout(self.timeout, cmd.output())
            .await
            .map_err(|_| LintError::Timeout {
                seconds: self.timeout.as_secs(),
            })?
            .map_err(|e| LintError::Unavailable(format!("{}: {e}", self.program)))?;

        // Exit code 1 means "problems found"; anything above is a tool failure.
        if !matches!(output.status.code(), Some(0 | 1)) {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(LintError::Failed(stderr.trim().to_owned()));
        }

        let reports: Vec<FileReport> = serde_json::from_slice(&output.stdout)
            .map_err(|e| LintError::Failed(format!("unparseable output: {e}")))?;
        debug!(file = %file.display(), reports = reports.len(), "lint report received");
        reports
            .into_iter()
            .next()
            .ok_or_else(|| LintError::Failed("empty report".to_owned()))
    }
}

#[async_trait]
impl LintTool for EslintCli {
    async fn fix(&self, file: &Path) -> Result<Option<String>, LintError> {
        Ok(self.report(file).await?.output)
    }

    async fn fatal_messages(&self, file: &Path) -> Result<Vec<String>, LintError> {
        Ok(self
            .report(file)
            .await?
            .messages
            .into_iter()
            .filter(|m| m.fatal)
            .map(|m| m.message)
            .collect())
    }
}
