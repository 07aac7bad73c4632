//! devwatch: a development-server supervisor.
//!
//! Runs a JavaScript/TypeScript dev server, turns its output into ranked
//! diagnostics, and applies reversible, safety-gated fixes to project files.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

/// Output classification into typed diagnostics.
pub mod classifier;
/// Configuration loading and validation.
pub mod config;
/// Diagnostic data model.
pub mod diagnostic;
/// Tracing subscriber setup.
pub mod logging;
/// Priority scoring and grouping.
pub mod ranker;
/// Fix strategies, safety gate, backups and validation.
pub mod remediation;
/// Session coordinator tying the pipeline together.
pub mod session;
/// Dev server process supervision.
pub mod supervisor;
