//! Session coordinator: supervisor output in, ranked live diagnostics out.
//!
//! A [`Session`] is an explicit handle owning the supervisor, the remediation
//! engine and the live diagnostic map. All mutation happens through
//! `&mut self`; the supervisor's background tasks only send events.

use std::collections::HashMap;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::classifier;
use crate::config::DevwatchConfig;
use crate::diagnostic::{Category, RankedDiagnostic, Severity};
use crate::ranker;
use crate::remediation::{FixResult, RemediationEngine};
use crate::supervisor::{LaunchOptions, ProcessSupervisor, SupervisorError, SupervisorEvent};

/// Server lifecycle changes reported to the adapter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Lifecycle {
    /// The server reported ready.
    Started {
        /// Port it listens on.
        port: u16,
    },
    /// The server was stopped on request.
    Stopped,
    /// The server exited.
    Exited {
        /// Exit code, if any.
        code: Option<i32>,
        /// Terminating signal, if any.
        signal: Option<i32>,
    },
    /// A supervision error.
    Error(String),
}

/// Events delivered to the adapter.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    /// Server lifecycle change.
    Lifecycle(Lifecycle),
    /// A diagnostic was seen for the first time.
    DiagnosticObserved(RankedDiagnostic),
    /// A diagnostic was removed from the live map.
    DiagnosticResolved {
        /// Id of the removed diagnostic.
        id: String,
    },
}

/// A diagnostic in the live map.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LiveDiagnostic {
    /// The ranked diagnostic as first seen, with related ids kept current.
    pub ranked: RankedDiagnostic,
    /// When it first appeared.
    pub first_seen: DateTime<Utc>,
    /// When it last appeared.
    pub last_seen: DateTime<Utc>,
    /// How many times it appeared.
    pub occurrences: u32,
}

/// Selects diagnostics from the live map. Unset fields match everything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DiagnosticFilter {
    /// Only this category.
    pub category: Option<Category>,
    /// Only this severity.
    pub severity: Option<Severity>,
    /// Only diagnostics with this fixability.
    pub auto_fixable: Option<bool>,
}

impl DiagnosticFilter {
    fn matches(&self, ranked: &RankedDiagnostic) -> bool {
        unset_or_eq(self.category, ranked.diagnostic.category)
            && unset_or_eq(self.severity, ranked.diagnostic.severity)
            && unset_or_eq(self.auto_fixable, ranked.auto_fixable)
    }
}

fn unset_or_eq<T: PartialEq>(wanted: Option<T>, value: T) -> bool {
    wanted.map_or(true, |w| w == value)
}

/// Session counters.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SessionMetrics {
    /// New unique diagnostics added to the live map.
    pub diagnostics_seen: u32,
    /// Fix attempts made.
    pub fixes_attempted: u32,
    /// Fix attempts that were applied and kept.
    pub fixes_applied: u32,
    /// Output lines processed.
    pub lines_processed: u32,
    /// When the server last became ready.
    pub started_at: Option<DateTime<Utc>>,
}

impl SessionMetrics {
    /// Fixes applied per unique diagnostic seen, or 0 when nothing was seen.
    pub fn success_ratio(&self) -> f64 {
        if self.diagnostics_seen == 0 {
            return 0.0;
        }
        f64::from(self.fixes_applied) / f64::from(self.diagnostics_seen)
    }
}

/// Which stream a partial line came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum Stream {
    Stdout,
    Stderr,
}

/// Owns one supervised development server and its diagnostics.
#[derive(Debug)]
pub struct Session {
    project_root: PathBuf,
    launch: LaunchOptions,
    supervisor: ProcessSupervisor,
    supervisor_rx: mpsc::Receiver<SupervisorEvent>,
    engine: RemediationEngine,
    events: mpsc::UnboundedSender<SessionEvent>,
    live: HashMap<String, LiveDiagnostic>,
    signatures: HashMap<String, String>,
    partial: HashMap<Stream, String>,
    metrics: SessionMetrics,
    auto_fix: bool,
}

impl Session {
    /// Create a session for `project_root` and the receiver for its events.
    pub fn new(
        config: &DevwatchConfig,
        project_root: PathBuf,
    ) -> (Self, mpsc::UnboundedReceiver<SessionEvent>) {
        let (supervisor, supervisor_rx) = ProcessSupervisor::new(config.server.clone());
        let engine =
            RemediationEngine::new(project_root.clone(), &config.remediation, &config.tools);
        let (events, rx) = mpsc::unbounded_channel();
        let session = Self {
            project_root,
            launch: LaunchOptions::from_config(&config.server),
            supervisor,
            supervisor_rx,
            engine,
            events,
            live: HashMap::new(),
            signatures: HashMap::new(),
            partial: HashMap::new(),
            metrics: SessionMetrics::default(),
            auto_fix: false,
        };
        (session, rx)
    }

    /// Replace the remediation engine.
    #[must_use]
    pub fn with_engine(mut self, engine: RemediationEngine) -> Self {
        self.engine = engine;
        self
    }

    /// Override the launch options used by [`Self::start`].
    #[must_use]
    pub fn with_launch_options(mut self, launch: LaunchOptions) -> Self {
        self.launch = launch;
        self
    }

    /// Attempt a fix for every new auto-fixable diagnostic as it arrives.
    pub fn set_auto_fix(&mut self, enabled: bool) {
        self.auto_fix = enabled;
    }

    /// The supervisor handle.
    pub fn supervisor(&self) -> &ProcessSupervisor {
        &self.supervisor
    }

    /// The remediation engine.
    pub fn engine(&self) -> &RemediationEngine {
        &self.engine
    }

    /// Start the development server.
    ///
    /// # Errors
    ///
    /// Returns any [`SupervisorError`] from the supervisor.
    pub async fn start(&mut self) -> Result<(), SupervisorError> {
        self.supervisor
            .start(&self.project_root, self.launch.clone())
            .await?;
        self.metrics.started_at = Some(Utc::now());
        self.emit(SessionEvent::Lifecycle(Lifecycle::Started {
            port: self.launch.port,
        }));
        Ok(())
    }

    /// Stop the development server.
    ///
    /// # Errors
    ///
    /// Returns [`SupervisorError::ShutdownTimeout`] if it would not exit.
    pub async fn stop(&mut self) -> Result<(), SupervisorError> {
        let was_running = self.supervisor.is_running();
        self.supervisor.stop().await?;
        if was_running {
            self.emit(SessionEvent::Lifecycle(Lifecycle::Stopped));
        }
        Ok(())
    }

    /// Restart the development server with the same options.
    ///
    /// # Errors
    ///
    /// Returns any [`SupervisorError`] from the supervisor.
    pub async fn restart(&mut self) -> Result<(), SupervisorError> {
        self.supervisor.restart().await?;
        self.metrics.started_at = Some(Utc::now());
        self.emit(SessionEvent::Lifecycle(Lifecycle::Started {
            port: self.launch.port,
        }));
        Ok(())
    }

    /// Wait for the next supervisor event. `None` once the supervisor is gone.
    pub async fn next_event(&mut self) -> Option<SupervisorEvent> {
        self.supervisor_rx.recv().await
    }

    /// Handle every supervisor event already queued, without waiting.
    ///
    /// Returns how many events were handled.
    pub async fn pump(&mut self) -> usize {
        let mut handled = 0usize;
        while let Ok(event) = self.supervisor_rx.try_recv() {
            self.handle_event(event).await;
            handled = handled.saturating_add(1);
        }
        handled
    }

    /// Route one supervisor event through the pipeline.
    pub async fn handle_event(&mut self, event: SupervisorEvent) {
        match event {
            SupervisorEvent::Stdout(chunk) => self.ingest(Stream::Stdout, &chunk).await,
            SupervisorEvent::Stderr(chunk) => self.ingest(Stream::Stderr, &chunk).await,
            SupervisorEvent::Exit { code, signal } => {
                for stream in [Stream::Stdout, Stream::Stderr] {
                    if let Some(rest) = self.partial.remove(&stream) {
                        self.process_lines(&rest).await;
                    }
                }
                self.emit(SessionEvent::Lifecycle(Lifecycle::Exited { code, signal }));
            }
            SupervisorEvent::Error(message) => {
                warn!(error = %message, "supervisor error");
                self.emit(SessionEvent::Lifecycle(Lifecycle::Error(message)));
            }
        }
    }

    /// Classify a block of complete output text, as if read from stdout.
    pub async fn ingest_chunk(&mut self, text: &str) {
        self.process_lines(text).await;
    }

    async fn ingest(&mut self, stream: Stream, chunk: &str) {
        let mut text = self.partial.remove(&stream).unwrap_or_default();
        text.push_str(chunk);
        let complete = match text.rfind('\n') {
            Some(end) => {
                let tail = text.split_off(end.saturating_add(1));
                if !tail.is_empty() {
                    self.partial.insert(stream, tail);
                }
                text
            }
            None => {
                self.partial.insert(stream, text);
                return;
            }
        };
        self.process_lines(&complete).await;
    }

    async fn process_lines(&mut self, text: &str) {
        let lines = u32::try_from(text.lines().count()).unwrap_or(u32::MAX);
        self.metrics.lines_processed = self.metrics.lines_processed.saturating_add(lines);

        let diagnostics = classifier::classify_buffer(text);
        if diagnostics.is_empty() {
            return;
        }

        let mut fresh = Vec::new();
        for ranked in ranker::rank_all(&diagnostics) {
            if let Some(id) = self.insert_or_touch(ranked) {
                fresh.push(id);
            }
        }

        if self.auto_fix {
            for id in fresh {
                let fixable = self.live_by_id(&id).is_some_and(|l| l.ranked.auto_fixable);
                if fixable {
                    let result = self.fix(&id, false).await;
                    debug!(id = %id, success = result.success, error = ?result.error, "auto-fix attempt");
                }
            }
        }
    }

    /// Insert a new diagnostic or bump an existing one. Returns the id of a
    /// newly inserted entry.
    fn insert_or_touch(&mut self, mut ranked: RankedDiagnostic) -> Option<String> {
        let signature = ranked.diagnostic.signature();
        let now = Utc::now();
        if let Some(existing) = self.live.get_mut(&signature) {
            existing.last_seen = now;
            existing.occurrences = existing.occurrences.saturating_add(1);
            return None;
        }

        // Batch links may name entries that were only touched; rebuild from the live map.
        ranked.related_errors.clear();
        let id = ranked.id().to_owned();
        let related: Vec<String> = self
            .live
            .values()
            .filter(|l| l.ranked.group_key == ranked.group_key)
            .map(|l| l.ranked.id().to_owned())
            .collect();
        for live in self.live.values_mut() {
            if live.ranked.group_key == ranked.group_key && !live.ranked.related_errors.contains(&id)
            {
                live.ranked.related_errors.push(id.clone());
            }
        }
        for other in related {
            if !ranked.related_errors.contains(&other) {
                ranked.related_errors.push(other);
            }
        }

        debug!(
            id = %id,
            category = %ranked.diagnostic.category,
            priority = ranked.priority,
            "new diagnostic"
        );
        self.metrics.diagnostics_seen = self.metrics.diagnostics_seen.saturating_add(1);
        self.emit(SessionEvent::DiagnosticObserved(ranked.clone()));
        self.signatures.insert(id.clone(), signature.clone());
        self.live.insert(
            signature,
            LiveDiagnostic {
                ranked,
                first_seen: now,
                last_seen: now,
                occurrences: 1,
            },
        );
        Some(id)
    }

    fn live_by_id(&self, id: &str) -> Option<&LiveDiagnostic> {
        self.signatures.get(id).and_then(|sig| self.live.get(sig))
    }

    /// Look up a live diagnostic by id.
    pub fn get(&self, id: &str) -> Option<&LiveDiagnostic> {
        self.live_by_id(id)
    }

    /// Live diagnostics matching `filter`, highest priority first.
    ///
    /// Ties are ordered by first appearance.
    pub fn diagnostics(&self, filter: &DiagnosticFilter) -> Vec<RankedDiagnostic> {
        let mut matching: Vec<&LiveDiagnostic> = self
            .live
            .values()
            .filter(|l| filter.matches(&l.ranked))
            .collect();
        matching.sort_by(|a, b| {
            b.ranked
                .priority
                .cmp(&a.ranked.priority)
                .then(a.first_seen.cmp(&b.first_seen))
        });
        matching.into_iter().map(|l| l.ranked.clone()).collect()
    }

    /// Remove a diagnostic from the live map. Returns whether it existed.
    pub fn resolve(&mut self, id: &str) -> bool {
        let Some(signature) = self.signatures.remove(id) else {
            return false;
        };
        if self.live.remove(&signature).is_none() {
            return false;
        }
        for live in self.live.values_mut() {
            live.ranked.related_errors.retain(|r| r != id);
        }
        info!(id, "diagnostic resolved");
        self.emit(SessionEvent::DiagnosticResolved { id: id.to_owned() });
        true
    }

    /// Attempt a fix for diagnostic `id`; `force` disables conservative mode
    /// for this one attempt. A successful fix resolves the diagnostic.
    pub async fn fix(&mut self, id: &str, force: bool) -> FixResult {
        let Some(diagnostic) = self.live_by_id(id).map(|l| l.ranked.diagnostic.clone()) else {
            return FixResult::failed(None, format!("Unknown diagnostic: {id}"));
        };

        self.metrics.fixes_attempted = self.metrics.fixes_attempted.saturating_add(1);
        let result = if force {
            self.engine.apply_fix_forced(&diagnostic).await
        } else {
            self.engine.apply_fix(&diagnostic).await
        };

        if result.success && result.applied {
            self.metrics.fixes_applied = self.metrics.fixes_applied.saturating_add(1);
            self.resolve(id);
        }
        result
    }

    /// Current counters.
    pub fn metrics(&self) -> &SessionMetrics {
        &self.metrics
    }

    fn emit(&self, event: SessionEvent) {
        if self.events.send(event).is_err() {
            debug!("session event receiver dropped");
        }
    }
}
