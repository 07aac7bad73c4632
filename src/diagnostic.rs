//! Diagnostic records shared by the classifier, ranker, engine and session.
//!
//! A [`Diagnostic`] is produced once by the classifier and never mutated
//! afterwards. The ranker wraps it in a [`RankedDiagnostic`].

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// File value used when a diagnostic carries no usable location.
pub const UNKNOWN_FILE: &str = "unknown";

/// Broad family a diagnostic belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    /// Static type-checker error (`TS2322` and friends).
    #[serde(rename = "typescript")]
    TypeScript,
    /// Linter finding.
    Lint,
    /// Bundler or compiler failure.
    Build,
    /// Exception thrown while the server was running.
    Runtime,
    /// Module resolution failure.
    Import,
    /// Parse error in a source file.
    Syntax,
    /// Looked like an error but matched no known format.
    Unknown,
}

impl Category {
    /// Stable lowercase name used in signatures and group keys.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::TypeScript => "typescript",
            Self::Lint => "lint",
            Self::Build => "build",
            Self::Runtime => "runtime",
            Self::Import => "import",
            Self::Syntax => "syntax",
            Self::Unknown => "unknown",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How serious a diagnostic is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Breaks the build or the running page.
    Error,
    /// Worth fixing, nothing is broken yet.
    Warning,
    /// Informational only.
    Info,
}

impl Severity {
    /// Parse the severity words used by compilers and linters.
    ///
    /// Anything unrecognized is treated as an error.
    pub fn from_word(word: &str) -> Self {
        match word.to_ascii_lowercase().as_str() {
            "warning" | "warn" => Self::Warning,
            "info" | "note" | "hint" => Self::Info,
            _ => Self::Error,
        }
    }
}

/// Upstream hint about whether a diagnostic can be fixed mechanically.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FixCapability {
    /// A known text transformation exists.
    AutoFixable,
    /// Needs a human edit.
    ManualOnly,
    /// A fix can be suggested but should not be applied blindly.
    SuggestionOnly,
    /// Nothing actionable.
    NoFix,
}

/// Where in the source a diagnostic points.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Location {
    /// File path as reported by the tool, or [`UNKNOWN_FILE`].
    pub file: String,
    /// 1-based line.
    pub line: u32,
    /// 1-based column.
    pub column: u32,
    /// Optional 1-based end line.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_line: Option<u32>,
    /// Optional 1-based end column.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_column: Option<u32>,
}

impl Location {
    /// Build a location, lifting zero line/column values to 1.
    pub fn new(file: impl Into<String>, line: u32, column: u32) -> Self {
        let file = file.into();
        let file = if file.trim().is_empty() {
            UNKNOWN_FILE.to_owned()
        } else {
            file
        };
        Self {
            file,
            line: line.max(1),
            column: column.max(1),
            end_line: None,
            end_column: None,
        }
    }

    /// Location used when nothing is known.
    pub fn unknown() -> Self {
        Self::new(UNKNOWN_FILE, 1, 1)
    }

    /// Location with a known file but no position.
    pub fn file_only(file: impl Into<String>) -> Self {
        Self::new(file, 1, 1)
    }

    /// Whether the location names a real file.
    pub fn has_file(&self) -> bool {
        self.file != UNKNOWN_FILE
    }
}

/// One classified problem extracted from process output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Diagnostic {
    /// Unique identifier (UUID v4).
    pub id: String,
    /// Category the classifier assigned.
    pub category: Category,
    /// Severity as reported or inferred.
    pub severity: Severity,
    /// Human-readable message.
    pub message: String,
    /// Tool-specific code such as `TS2322`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    /// Lint rule name such as `no-unused-vars`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rule: Option<String>,
    /// Source location.
    pub location: Location,
    /// Upstream fixability hint.
    pub capability: FixCapability,
    /// When the diagnostic was created.
    pub timestamp: DateTime<Utc>,
    /// The original (ANSI-stripped) output line.
    pub raw: String,
}

impl Diagnostic {
    /// Create a diagnostic with a fresh id and the current time.
    pub fn new(
        category: Category,
        severity: Severity,
        message: impl Into<String>,
        location: Location,
        capability: FixCapability,
        raw: impl Into<String>,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            category,
            severity,
            message: message.into(),
            code: None,
            rule: None,
            location,
            capability,
            timestamp: Utc::now(),
            raw: raw.into(),
        }
    }

    /// Attach a tool code.
    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }

    /// Attach a lint rule name.
    pub fn with_rule(mut self, rule: impl Into<String>) -> Self {
        self.rule = Some(rule.into());
        self
    }

    /// Dedup signature over category, file, line and message.
    ///
    /// Two diagnostics with the same signature describe the same problem.
    pub fn signature(&self) -> String {
        format!(
            "{}|{}|{}|{}",
            self.category, self.location.file, self.location.line, self.message
        )
    }
}

/// A diagnostic with priority and grouping attached by the ranker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedDiagnostic {
    /// The underlying diagnostic.
    #[serde(flatten)]
    pub diagnostic: Diagnostic,
    /// Priority in `[1, 100]`, higher first.
    pub priority: u8,
    /// Deterministic clustering key.
    pub group_key: String,
    /// Ids of the other diagnostics sharing `group_key`.
    pub related_errors: Vec<String>,
    /// Whether the engine should be able to fix this without help.
    pub auto_fixable: bool,
    /// Human hint describing a likely remedy.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suggested_fix: Option<String>,
}

impl RankedDiagnostic {
    /// Shorthand for the wrapped diagnostic id.
    pub fn id(&self) -> &str {
        &self.diagnostic.id
    }
}
