//! Development server process supervision.
//!
//! [`ProcessSupervisor`] spawns the server, streams its output as
//! [`SupervisorEvent`]s on a bounded channel, keeps a capped rolling copy of
//! the output, and handles graceful stop with escalation to a forced kill.
//!
//! Internal state sits behind a `std::sync::Mutex` that is never held across
//! an await point. The child itself is owned by a single exit-watcher task.

use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::ServerConfig;

/// Capacity of the supervisor event channel.
pub const EVENT_CHANNEL_CAPACITY: usize = 1024;

/// How long to wait for a forced kill to take effect.
const KILL_WAIT: Duration = Duration::from_secs(5);

/// How long the exit watcher waits for readers to drain after the child exits.
const DRAIN_WAIT: Duration = Duration::from_secs(1);

const READ_CHUNK: usize = 8192;

/// Events emitted while the server runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SupervisorEvent {
    /// A chunk of standard output.
    Stdout(String),
    /// A chunk of standard error.
    Stderr(String),
    /// The process exited.
    Exit {
        /// Exit code, if it exited normally.
        code: Option<i32>,
        /// Terminating signal, if it was killed by one.
        signal: Option<i32>,
    },
    /// A supervision problem that did not stop the process.
    Error(String),
}

/// Per-launch options appended to the server command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchOptions {
    /// Port to listen on.
    pub port: u16,
    /// Hostname to bind.
    pub hostname: String,
    /// Enable the Node inspector.
    pub debug: bool,
}

impl LaunchOptions {
    /// Options taken from the `[server]` config section.
    pub fn from_config(config: &ServerConfig) -> Self {
        Self {
            port: config.port,
            hostname: config.hostname.clone(),
            debug: config.debug,
        }
    }
}

/// Supervision errors.
#[derive(Debug, thiserror::Error)]
pub enum SupervisorError {
    /// A start was requested while a process is starting or running.
    #[error("development server is already running")]
    AlreadyRunning,
    /// Restart was requested before any start.
    #[error("no previous launch to restart")]
    NoStoredLaunch,
    /// The process could not be spawned.
    #[error("failed to spawn {program}: {source}")]
    Spawn {
        /// Program that failed to start.
        program: String,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },
    /// No ready signal arrived in time. The process was killed.
    #[error("development server was not ready after {seconds}s")]
    StartupTimeout {
        /// Timeout in seconds.
        seconds: u64,
    },
    /// The process exited before it became ready.
    #[error("development server exited during startup (code {code:?}, signal {signal:?})")]
    ExitedDuringStartup {
        /// Exit code, if any.
        code: Option<i32>,
        /// Terminating signal, if any.
        signal: Option<i32>,
    },
    /// The process survived both SIGTERM and a forced kill.
    #[error("development server did not exit within {seconds}s")]
    ShutdownTimeout {
        /// Total time waited in seconds.
        seconds: u64,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Idle,
    Starting,
    Running,
}

/// Handle to a live child, owned by the exit watcher.
struct ChildHandle {
    pid: Option<u32>,
    kill_tx: Option<oneshot::Sender<()>>,
    exited: watch::Receiver<bool>,
}

struct Inner {
    phase: Phase,
    generation: u64,
    child: Option<ChildHandle>,
    last_launch: Option<(PathBuf, LaunchOptions)>,
}

/// Rolling output buffer that drops the oldest bytes past its cap.
#[derive(Debug)]
struct OutputBuffer {
    data: String,
    max_bytes: usize,
}

impl OutputBuffer {
    fn push(&mut self, chunk: &str) {
        self.data.push_str(chunk);
        if self.data.len() > self.max_bytes {
            let mut cut = self.data.len().saturating_sub(self.max_bytes);
            while !self.data.is_char_boundary(cut) {
                cut = cut.saturating_add(1);
            }
            self.data.drain(..cut);
        }
    }
}

/// How the start gate was settled.
#[derive(Debug)]
enum StartOutcome {
    Ready,
    Exited {
        code: Option<i32>,
        signal: Option<i32>,
    },
}

/// Single-settlement guard: the first of ready, exit or timeout wins.
struct StartGate {
    tx: Mutex<Option<oneshot::Sender<StartOutcome>>>,
}

impl StartGate {
    fn new() -> (Arc<Self>, oneshot::Receiver<StartOutcome>) {
        let (tx, rx) = oneshot::channel();
        (
            Arc::new(Self {
                tx: Mutex::new(Some(tx)),
            }),
            rx,
        )
    }

    /// Settle the gate. Later calls are no-ops.
    fn settle(&self, outcome: StartOutcome) {
        let sender = match self.tx.lock() {
            Ok(mut guard) => guard.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        if let Some(tx) = sender {
            let _ = tx.send(outcome);
        }
    }

    /// Close the gate without an outcome.
    fn close(&self) {
        match self.tx.lock() {
            Ok(mut guard) => drop(guard.take()),
            Err(poisoned) => drop(poisoned.into_inner().take()),
        }
    }
}

/// Supervises one development server process at a time.
pub struct ProcessSupervisor {
    config: ServerConfig,
    events: mpsc::Sender<SupervisorEvent>,
    inner: Arc<Mutex<Inner>>,
    buffer: Arc<Mutex<OutputBuffer>>,
}

impl std::fmt::Debug for ProcessSupervisor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProcessSupervisor")
            .field("program", &self.config.program)
            .field("phase", &lock(&self.inner).phase)
            .finish_non_exhaustive()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

#[cfg(unix)]
fn exit_signal(status: &ExitStatus) -> Option<i32> {
    use std::os::unix::process::ExitStatusExt;
    status.signal()
}

#[cfg(not(unix))]
fn exit_signal(_status: &ExitStatus) -> Option<i32> {
    None
}

impl ProcessSupervisor {
    /// Create a supervisor and the receiving end of its event channel.
    pub fn new(config: ServerConfig) -> (Self, mpsc::Receiver<SupervisorEvent>) {
        let (events, rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        let buffer = OutputBuffer {
            data: String::new(),
            max_bytes: config.buffer_max_bytes,
        };
        let supervisor = Self {
            config,
            events,
            inner: Arc::new(Mutex::new(Inner {
                phase: Phase::Idle,
                generation: 0,
                child: None,
                last_launch: None,
            })),
            buffer: Arc::new(Mutex::new(buffer)),
        };
        (supervisor, rx)
    }

    /// Spawn the server in `path` and wait until it reports ready.
    ///
    /// # Errors
    ///
    /// Returns [`SupervisorError::AlreadyRunning`] if a process is starting or
    /// running, [`SupervisorError::Spawn`] if it cannot be started,
    /// [`SupervisorError::StartupTimeout`] if no ready signal arrives in time,
    /// and [`SupervisorError::ExitedDuringStartup`] if it exits first.
    pub async fn start(&self, path: &Path, options: LaunchOptions) -> Result<(), SupervisorError> {
        let generation = {
            let mut inner = lock(&self.inner);
            if inner.phase != Phase::Idle {
                return Err(SupervisorError::AlreadyRunning);
            }
            inner.phase = Phase::Starting;
            inner.generation = inner.generation.saturating_add(1);
            inner.last_launch = Some((path.to_owned(), options.clone()));
            inner.generation
        };

        let mut cmd = Command::new(&self.config.program);
        cmd.args(&self.config.args)
            .arg("--port")
            .arg(options.port.to_string())
            .arg("--hostname")
            .arg(&options.hostname)
            .current_dir(path)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if options.debug {
            cmd.env("NODE_OPTIONS", "--inspect");
        }

        let mut child = match cmd.spawn() {
            Ok(child) => child,
            Err(source) => {
                lock(&self.inner).phase = Phase::Idle;
                return Err(SupervisorError::Spawn {
                    program: self.config.program.clone(),
                    source,
                });
            }
        };
        let pid = child.id();
        info!(
            pid = ?pid,
            program = %self.config.program,
            port = options.port,
            dir = %path.display(),
            "development server spawned"
        );

        let (gate, ready_rx) = StartGate::new();
        let mut readers = Vec::with_capacity(2);
        if let Some(stdout) = child.stdout.take() {
            readers.push(self.spawn_reader(stdout, SupervisorEvent::Stdout, Arc::clone(&gate)));
        }
        if let Some(stderr) = child.stderr.take() {
            readers.push(self.spawn_reader(stderr, SupervisorEvent::Stderr, Arc::clone(&gate)));
        }

        let (kill_tx, mut kill_rx) = oneshot::channel::<()>();
        let (exited_tx, exited_rx) = watch::channel(false);
        {
            let mut inner = lock(&self.inner);
            inner.child = Some(ChildHandle {
                pid,
                kill_tx: Some(kill_tx),
                exited: exited_rx,
            });
        }

        let inner = Arc::clone(&self.inner);
        let events = self.events.clone();
        let exit_gate = Arc::clone(&gate);
        tokio::spawn(async move {
            let status = tokio::select! {
                status = child.wait() => status,
                Ok(()) = &mut kill_rx => {
                    if let Err(e) = child.start_kill() {
                        warn!(error = %e, "forced kill failed");
                    }
                    child.wait().await
                }
            };

            for reader in readers {
                if tokio::time::timeout(DRAIN_WAIT, reader).await.is_err() {
                    debug!("output reader still open after exit");
                }
            }

            let (code, signal) = match &status {
                Ok(s) => (s.code(), exit_signal(s)),
                Err(e) => {
                    let _ = events
                        .send(SupervisorEvent::Error(format!("wait failed: {e}")))
                        .await;
                    (None, None)
                }
            };
            info!(code = ?code, signal = ?signal, "development server exited");

            // Back to Idle before settling so a caller that sees the exit can start again.
            {
                let mut inner = lock(&inner);
                if inner.generation == generation {
                    inner.phase = Phase::Idle;
                    inner.child = None;
                }
            }
            exit_gate.settle(StartOutcome::Exited { code, signal });
            let _ = exited_tx.send(true);
            let _ = events.send(SupervisorEvent::Exit { code, signal }).await;
        });

        let timeout = Duration::from_secs(self.config.startup_timeout_secs);
        match tokio::time::timeout(timeout, ready_rx).await {
            Ok(Ok(StartOutcome::Ready)) => {
                let mut inner = lock(&self.inner);
                if inner.generation == generation && inner.phase == Phase::Starting {
                    inner.phase = Phase::Running;
                }
                info!(pid = ?pid, "development server ready");
                Ok(())
            }
            Ok(Ok(StartOutcome::Exited { code, signal })) => {
                Err(SupervisorError::ExitedDuringStartup { code, signal })
            }
            Ok(Err(_)) => Err(SupervisorError::ExitedDuringStartup {
                code: None,
                signal: None,
            }),
            Err(_) => {
                gate.close();
                warn!(seconds = timeout.as_secs(), "startup timed out, killing server");
                self.force_kill().await;
                Err(SupervisorError::StartupTimeout {
                    seconds: timeout.as_secs(),
                })
            }
        }
    }

    fn spawn_reader<R>(
        &self,
        mut stream: R,
        wrap: fn(String) -> SupervisorEvent,
        gate: Arc<StartGate>,
    ) -> JoinHandle<()>
    where
        R: AsyncRead + Unpin + Send + 'static,
    {
        let events = self.events.clone();
        let buffer = Arc::clone(&self.buffer);
        let signals = self.config.ready_signals.clone();
        tokio::spawn(async move {
            let mut buf = vec![0u8; READ_CHUNK];
            loop {
                let n = match stream.read(&mut buf).await {
                    Ok(0) => break,
                    Ok(n) => n,
                    Err(e) => {
                        let _ = events
                            .send(SupervisorEvent::Error(format!("output read failed: {e}")))
                            .await;
                        break;
                    }
                };
                let chunk = String::from_utf8_lossy(buf.get(..n).unwrap_or_default()).into_owned();
                lock(&buffer).push(&chunk);
                if signals.iter().any(|s| chunk.contains(s.as_str())) {
                    gate.settle(StartOutcome::Ready);
                }
                // A dropped receiver only means nobody is listening; keep draining.
                let _ = events.send(wrap(chunk)).await;
            }
        })
    }

    /// Send SIGTERM, wait for the grace period, then force-kill.
    ///
    /// Stopping when nothing runs is a no-op.
    ///
    /// # Errors
    ///
    /// Returns [`SupervisorError::ShutdownTimeout`] if the process is still
    /// alive after the forced kill.
    pub async fn stop(&self) -> Result<(), SupervisorError> {
        let (pid, mut exited) = {
            let inner = lock(&self.inner);
            match &inner.child {
                Some(child) => (child.pid, child.exited.clone()),
                None => return Ok(()),
            }
        };
        if *exited.borrow() {
            return Ok(());
        }

        if let Some(pid) = pid {
            info!(pid, "sending SIGTERM to development server");
            match Command::new("kill")
                .args(["-TERM", &pid.to_string()])
                .stdout(Stdio::null())
                .stderr(Stdio::null())
                .status()
                .await
            {
                Ok(status) if status.success() => {}
                Ok(status) => warn!(pid, status = %status, "kill -TERM reported failure"),
                Err(e) => warn!(pid, error = %e, "failed to run kill"),
            }
        }

        let grace = Duration::from_secs(self.config.stop_grace_secs);
        if tokio::time::timeout(grace, exited.wait_for(|done| *done))
            .await
            .is_ok()
        {
            return Ok(());
        }

        warn!(seconds = grace.as_secs(), "grace period elapsed, forcing kill");
        if self.force_kill().await {
            Ok(())
        } else {
            Err(SupervisorError::ShutdownTimeout {
                seconds: grace.saturating_add(KILL_WAIT).as_secs(),
            })
        }
    }

    /// Ask the exit watcher to kill the child and wait for it to exit.
    async fn force_kill(&self) -> bool {
        let (kill_tx, mut exited) = {
            let mut inner = lock(&self.inner);
            match inner.child.as_mut() {
                Some(child) => (child.kill_tx.take(), child.exited.clone()),
                None => return true,
            }
        };
        if let Some(tx) = kill_tx {
            let _ = tx.send(());
        }
        let waited = tokio::time::timeout(KILL_WAIT, exited.wait_for(|done| *done)).await;
        waited.is_ok()
    }

    /// Stop, then start again with the stored path and options.
    ///
    /// # Errors
    ///
    /// Returns [`SupervisorError::NoStoredLaunch`] if nothing was started
    /// before, otherwise any error from [`Self::stop`] or [`Self::start`].
    pub async fn restart(&self) -> Result<(), SupervisorError> {
        let (path, options) = lock(&self.inner)
            .last_launch
            .clone()
            .ok_or(SupervisorError::NoStoredLaunch)?;
        self.stop().await?;
        self.start(&path, options).await
    }

    /// Whether a process is currently starting or running.
    pub fn is_running(&self) -> bool {
        lock(&self.inner).phase != Phase::Idle
    }

    /// Process id of the live child, if any.
    pub fn pid(&self) -> Option<u32> {
        lock(&self.inner).child.as_ref().and_then(|c| c.pid)
    }

    /// Snapshot of the rolling output buffer.
    pub fn output(&self) -> String {
        lock(&self.buffer).data.clone()
    }

    /// Empty the rolling output buffer.
    pub fn clear_output(&self) {
        lock(&self.buffer).data.clear();
    }
}
