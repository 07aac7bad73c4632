//! devwatch CLI entry point.
//!
//! Provides `start` to supervise a dev server, `classify` to triage a saved
//! log, and `backups` to inspect and maintain fix backups.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing::{error, info, warn};

use devwatch::config::{load_config, DevwatchConfig, CONFIG_FILE};
use devwatch::remediation::backup::BackupStore;
use devwatch::session::{Lifecycle, Session, SessionEvent};
use devwatch::supervisor::LaunchOptions;
use devwatch::{classifier, logging, ranker};

/// Supervise a dev server and triage its errors.
#[derive(Parser)]
#[command(name = "devwatch", version, about)]
struct Cli {
    /// Subcommand to execute.
    #[command(subcommand)]
    command: Command,
}

/// Available CLI subcommands.
#[derive(Subcommand)]
enum Command {
    /// Start the dev server and watch its output.
    Start {
        /// Project directory.
        #[arg(long, default_value = ".")]
        project: PathBuf,
        /// Port to pass to the server.
        #[arg(long)]
        port: Option<u16>,
        /// Hostname to pass to the server.
        #[arg(long)]
        hostname: Option<String>,
        /// Enable the Node inspector.
        #[arg(long)]
        debug: bool,
        /// Apply safe fixes automatically as diagnostics arrive.
        #[arg(long)]
        auto_fix: bool,
    },
    /// Classify and rank a saved log file, printing JSON.
    Classify {
        /// Log file to read.
        file: PathBuf,
    },
    /// Inspect and maintain fix backups.
    Backups {
        /// Project directory.
        #[arg(long, default_value = ".", global = true)]
        project: PathBuf,
        /// Backup action.
        #[command(subcommand)]
        action: BackupAction,
    },
}

/// Backup maintenance actions.
#[derive(Subcommand)]
enum BackupAction {
    /// List backups, optionally for one file.
    List {
        /// Only backups of this file.
        #[arg(long)]
        file: Option<PathBuf>,
    },
    /// Delete backups older than the retention period.
    Prune,
    /// Recompute a backup's checksum.
    Verify {
        /// Backup id.
        id: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Command::Start {
            project,
            port,
            hostname,
            debug,
            auto_fix,
        } => handle_start(&project, port, hostname, debug, auto_fix).await,
        Command::Classify { file } => handle_classify(&file),
        Command::Backups { project, action } => handle_backups(&project, action).await,
    }
}

fn load_project_config(project: &Path) -> anyhow::Result<(PathBuf, DevwatchConfig)> {
    let root = project
        .canonicalize()
        .with_context(|| format!("project directory {} not found", project.display()))?;
    let config = load_config(&root.join(CONFIG_FILE))?;
    Ok((root, config))
}

/// Run the supervised dev server until it exits or we are asked to stop.
async fn handle_start(
    project: &Path,
    port: Option<u16>,
    hostname: Option<String>,
    debug: bool,
    auto_fix: bool,
) -> anyhow::Result<()> {
    let (root, config) = load_project_config(project)?;
    let paths = config.paths(&root);
    let _logging_guard = logging::init_production(&paths.logs_dir)?;

    let mut launch = LaunchOptions::from_config(&config.server);
    if let Some(port) = port {
        launch.port = port;
    }
    if let Some(hostname) = hostname {
        launch.hostname = hostname;
    }
    launch.debug |= debug;

    let (session, mut events) = Session::new(&config, root.clone());
    let mut session = session.with_launch_options(launch);
    session.set_auto_fix(auto_fix);

    info!(project = %root.display(), auto_fix, "starting dev server");
    session
        .start()
        .await
        .context("dev server failed to start")?;

    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);
    loop {
        tokio::select! {
            event = session.next_event() => {
                let Some(event) = event else {
                    warn!("supervisor channel closed");
                    break;
                };
                session.handle_event(event).await;
            }
            () = &mut shutdown => break,
        }

        let mut exited = false;
        while let Ok(event) = events.try_recv() {
            exited |= matches!(event, SessionEvent::Lifecycle(Lifecycle::Exited { .. }));
            report(&event);
        }
        if exited {
            break;
        }
    }

    if let Err(e) = session.stop().await {
        error!(error = %e, "dev server did not stop cleanly");
    }
    while let Ok(event) = events.try_recv() {
        report(&event);
    }

    let metrics = session.metrics();
    info!(
        diagnostics = metrics.diagnostics_seen,
        attempted = metrics.fixes_attempted,
        applied = metrics.fixes_applied,
        lines = metrics.lines_processed,
        success_ratio = metrics.success_ratio(),
        "session finished"
    );
    Ok(())
}

/// Resolve on Ctrl-C, or SIGTERM on unix.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => info!("interrupt received, shutting down"),
        () = terminate => info!("SIGTERM received, shutting down"),
    }
}

/// Print one session event for the developer.
fn report(event: &SessionEvent) {
    match event {
        SessionEvent::Lifecycle(Lifecycle::Started { port }) => {
            println!("dev server ready on port {port}");
        }
        SessionEvent::Lifecycle(Lifecycle::Stopped) => println!("dev server stopped"),
        SessionEvent::Lifecycle(Lifecycle::Exited { code, signal }) => {
            println!("dev server exited (code {code:?}, signal {signal:?})");
        }
        SessionEvent::Lifecycle(Lifecycle::Error(message)) => {
            println!("supervisor error: {message}");
        }
        SessionEvent::DiagnosticObserved(ranked) => {
            let d = &ranked.diagnostic;
            let fix = ranked
                .suggested_fix
                .as_deref()
                .map(|s| format!(" -> {s}"))
                .unwrap_or_default();
            println!(
                "[{:>3}] {} {}:{} {}{fix}",
                ranked.priority, d.category, d.location.file, d.location.line, d.message
            );
        }
        SessionEvent::DiagnosticResolved { id } => println!("resolved {id}"),
    }
}

/// Classify a saved log and print ranked diagnostics as JSON.
fn handle_classify(file: &Path) -> anyhow::Result<()> {
    logging::init_cli();

    let text = std::fs::read(file)
        .with_context(|| format!("failed to read log file {}", file.display()))?;
    let text = String::from_utf8_lossy(&text);
    let ranked = ranker::rank_all(&classifier::classify_buffer(&text));
    let json = serde_json::to_string_pretty(&ranked).context("failed to serialize diagnostics")?;
    println!("{json}");
    Ok(())
}

/// List, prune or verify backups.
async fn handle_backups(project: &Path, action: BackupAction) -> anyhow::Result<()> {
    logging::init_cli();

    let (root, config) = load_project_config(project)?;
    let store = BackupStore::new(config.paths(&root).backup_dir);

    match action {
        BackupAction::List { file } => {
            let file = file.map(|f| if f.is_absolute() { f } else { root.join(f) });
            let records = store.list(file.as_deref()).await?;
            if records.is_empty() {
                println!("no backups in {}", store.dir().display());
            }
            for r in records {
                println!(
                    "{}  {}  {}  {} bytes  {}",
                    r.id,
                    r.timestamp.format("%Y-%m-%d %H:%M:%S"),
                    r.file_path.display(),
                    r.size,
                    r.fix_type
                );
            }
        }
        BackupAction::Prune => {
            let days = i64::from(config.remediation.backup_retention_days);
            let removed = store.prune(chrono::Duration::days(days)).await?;
            println!("removed {removed} backup(s) older than {days} day(s)");
        }
        BackupAction::Verify { id } => {
            if store.validate(&id).await? {
                println!("{id}: ok");
            } else {
                anyhow::bail!("{id}: checksum mismatch");
            }
        }
    }
    Ok(())
}
