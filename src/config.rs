//! Configuration loading for devwatch.
//!
//! Loads `devwatch.toml` from the project root with per-section defaults. All
//! sections use `#[serde(default)]` so a minimal, empty or missing config file
//! is valid.

use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::Deserialize;

/// Default config file name inside the project root.
pub const CONFIG_FILE: &str = "devwatch.toml";

/// Top-level devwatch configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DevwatchConfig {
    /// How the development server is launched and supervised.
    #[serde(default)]
    pub server: ServerConfig,

    /// Fix policy and backup settings.
    #[serde(default)]
    pub remediation: RemediationConfig,

    /// External tools the remediation engine delegates to.
    #[serde(default)]
    pub tools: ToolsConfig,
}

/// Development server launch and supervision settings.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Program to run (e.g. "npx").
    #[serde(default = "default_program")]
    pub program: String,

    /// Arguments placed before `--port` and `--hostname`.
    #[serde(default = "default_args")]
    pub args: Vec<String>,

    /// Output substrings that mean the server is ready.
    #[serde(default = "default_ready_signals")]
    pub ready_signals: Vec<String>,

    /// Seconds to wait for a ready signal.
    #[serde(default = "default_startup_timeout_secs")]
    pub startup_timeout_secs: u64,

    /// Seconds between SIGTERM and a forced kill.
    #[serde(default = "default_stop_grace_secs")]
    pub stop_grace_secs: u64,

    /// Byte cap of the rolling output buffer.
    #[serde(default = "default_buffer_max_bytes")]
    pub buffer_max_bytes: usize,

    /// Port passed to the server.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Hostname passed to the server.
    #[serde(default = "default_hostname")]
    pub hostname: String,

    /// Start the server with the Node inspector enabled.
    #[serde(default)]
    pub debug: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            program: default_program(),
            args: default_args(),
            ready_signals: default_ready_signals(),
            startup_timeout_secs: default_startup_timeout_secs(),
            stop_grace_secs: default_stop_grace_secs(),
            buffer_max_bytes: default_buffer_max_bytes(),
            port: default_port(),
            hostname: default_hostname(),
            debug: false,
        }
    }
}

/// Fix policy and backup settings.
#[derive(Debug, Clone, Deserialize)]
pub struct RemediationConfig {
    /// Only allow-listed strategies run unless forced.
    #[serde(default = "default_true")]
    pub conservative: bool,

    /// Take a backup before every write.
    #[serde(default = "default_true")]
    pub backups_enabled: bool,

    /// Validate files after every fix.
    #[serde(default = "default_true")]
    pub validate: bool,

    /// Files larger than this are never edited.
    #[serde(default = "default_max_file_size_bytes")]
    pub max_file_size_bytes: u64,

    /// Days a backup is kept before `prune` removes it.
    #[serde(default = "default_backup_retention_days")]
    pub backup_retention_days: u32,

    /// Backup directory, relative to the project root unless absolute.
    #[serde(default = "default_backup_dir")]
    pub backup_dir: PathBuf,
}

impl Default for RemediationConfig {
    fn default() -> Self {
        Self {
            conservative: true,
            backups_enabled: true,
            validate: true,
            max_file_size_bytes: default_max_file_size_bytes(),
            backup_retention_days: default_backup_retention_days(),
            backup_dir: default_backup_dir(),
        }
    }
}

/// External tool commands.
#[derive(Debug, Clone, Deserialize)]
pub struct ToolsConfig {
    /// Program used to run the linter.
    #[serde(default = "default_lint_program")]
    pub lint_program: String,

    /// Arguments placed before the lint flags.
    #[serde(default = "default_lint_args")]
    pub lint_args: Vec<String>,

    /// Package manager used to install missing dependencies.
    #[serde(default = "default_package_manager")]
    pub package_manager: String,

    /// Seconds any delegated tool may run.
    #[serde(default = "default_tool_timeout_secs")]
    pub tool_timeout_secs: u64,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            lint_program: default_lint_program(),
            lint_args: default_lint_args(),
            package_manager: default_package_manager(),
            tool_timeout_secs: default_tool_timeout_secs(),
        }
    }
}

/// Resolved filesystem paths for devwatch's own state in a project.
#[derive(Debug, Clone)]
pub struct DevwatchPaths {
    /// Project root the server runs in.
    pub project_root: PathBuf,

    /// Backup directory.
    pub backup_dir: PathBuf,

    /// Directory for rolling JSON logs.
    pub logs_dir: PathBuf,
}

impl DevwatchConfig {
    /// Validate that configuration values are within sane bounds.
    pub fn validate(&self) -> anyhow::Result<()> {
        anyhow::ensure!(
            !self.server.program.trim().is_empty(),
            "server.program must not be empty"
        );
        anyhow::ensure!(
            !self.server.ready_signals.is_empty(),
            "server.ready_signals must not be empty"
        );
        anyhow::ensure!(
            (1..=600).contains(&self.server.startup_timeout_secs),
            "server.startup_timeout_secs must be in [1, 600]"
        );
        anyhow::ensure!(
            (1..=120).contains(&self.server.stop_grace_secs),
            "server.stop_grace_secs must be in [1, 120]"
        );
        anyhow::ensure!(
            self.server.buffer_max_bytes >= 1024,
            "server.buffer_max_bytes must be >= 1024"
        );
        anyhow::ensure!(self.server.port != 0, "server.port must be non-zero");
        anyhow::ensure!(
            self.remediation.max_file_size_bytes > 0,
            "remediation.max_file_size_bytes must be positive"
        );
        anyhow::ensure!(
            self.remediation.backup_retention_days >= 1,
            "remediation.backup_retention_days must be >= 1"
        );
        anyhow::ensure!(
            !self.tools.package_manager.trim().is_empty(),
            "tools.package_manager must not be empty"
        );
        anyhow::ensure!(
            self.tools.tool_timeout_secs >= 1,
            "tools.tool_timeout_secs must be >= 1"
        );
        Ok(())
    }

    /// Resolve devwatch's state paths under `project_root`.
    pub fn paths(&self, project_root: &Path) -> DevwatchPaths {
        let state_root = project_root.join(".devwatch");
        DevwatchPaths {
            project_root: project_root.to_owned(),
            backup_dir: project_root.join(&self.remediation.backup_dir),
            logs_dir: state_root.join("logs"),
        }
    }
}

/// Load devwatch configuration from a TOML file.
///
/// A missing file yields the defaults.
///
/// # Errors
///
/// Returns an error if the file exists but cannot be read, parsed, or fails
/// validation.
pub fn load_config(path: &Path) -> anyhow::Result<DevwatchConfig> {
    let contents = match std::fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Ok(DevwatchConfig::default());
        }
        Err(e) => {
            return Err(e)
                .with_context(|| format!("failed to read devwatch config at {}", path.display()));
        }
    };
    let config: DevwatchConfig = toml::from_str(&contents)
        .with_context(|| format!("failed to parse devwatch config at {}", path.display()))?;
    config.validate()?;
    Ok(config)
}

// Default value functions for serde.

fn default_program() -> String {
    "npx".to_owned()
}

fn default_args() -> Vec<String> {
    vec!["next".to_owned(), "dev".to_owned()]
}

fn default_ready_signals() -> Vec<String> {
    ["Ready in", "ready started server on", "Local:", "started server on"]
        .iter()
        .map(|s| (*s).to_owned())
        .collect()
}

fn default_startup_timeout_secs() -> u64 {
    60
}

fn default_stop_grace_secs() -> u64 {
    5
}

fn default_buffer_max_bytes() -> usize {
    1_048_576
}

fn default_port() -> u16 {
    3000
}

fn default_hostname() -> String {
    "localhost".to_owned()
}

fn default_true() -> bool {
    true
}

fn default_max_file_size_bytes() -> u64 {
    1_048_576
}

fn default_backup_retention_days() -> u32 {
    7
}

fn default_backup_dir() -> PathBuf {
    PathBuf::from(".devwatch").join("backups")
}

fn default_lint_program() -> String {
    "npx".to_owned()
}

fn default_lint_args() -> Vec<String> {
    vec!["eslint".to_owned()]
}

fn default_package_manager() -> String {
    "npm".to_owned()
}

fn default_tool_timeout_secs() -> u64 {
    120
}
