//! Converts raw process output into typed diagnostics.
//!
//! Stateless: every call is a pure function of its input. Lines are matched
//! against [`patterns::PATTERNS`] in order; lines that match nothing but still
//! read like an error fall back to an [`Category::Unknown`] diagnostic so that
//! nothing error-shaped is silently dropped.

pub mod patterns;

use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;
use tracing::debug;

use crate::diagnostic::{Category, Diagnostic, FixCapability, Location, Severity};

/// Case-insensitive substrings that mark an unrecognized line as an error.
const ERROR_KEYWORDS: &[&str] = &[
    "error",
    "failed",
    "failure",
    "exception",
    "cannot",
    "can't",
    "undefined",
    "is not defined",
    "is not a function",
    "unable to",
    "fatal",
    "panic",
    "crashed",
    "enoent",
    "eaddrinuse",
];

/// Progress output that mentions error words without reporting one.
static BENIGN: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(?:0 errors?|no errors?|without errors?|compiled successfully|error-free|errors?: 0)\b",
    )
    .ok()
});

/// Remove terminal color and cursor escape sequences.
pub fn strip_ansi(text: &str) -> String {
    let stripped = strip_ansi_escapes::strip(text.as_bytes());
    String::from_utf8_lossy(&stripped).into_owned()
}

/// Classify one line of output.
///
/// Returns `None` for blank lines and for lines that do not look like an
/// error at all.
pub fn classify_line(line: &str) -> Option<Diagnostic> {
    let clean = strip_ansi(line);
    let clean = clean.trim();
    if clean.is_empty() {
        return None;
    }

    for pattern in patterns::PATTERNS.iter() {
        match pattern.try_extract(clean) {
            None => continue,
            Some(Ok(diagnostic)) => return Some(diagnostic),
            Some(Err(e)) => {
                debug!(pattern = pattern.name, error = %e, "extractor rejected match");
            }
        }
    }

    fallback(clean)
}

/// Classify every line of `text` and drop repeats.
///
/// Two diagnostics are repeats when they share category, message, file and
/// line. The first occurrence wins and input order is kept.
pub fn classify_buffer(text: &str) -> Vec<Diagnostic> {
    let mut seen = HashSet::new();
    text.lines()
        .filter_map(classify_line)
        .filter(|d| seen.insert(d.signature()))
        .collect()
}

fn fallback(line: &str) -> Option<Diagnostic> {
    if let Some(benign) = BENIGN.as_ref() {
        if benign.is_match(line) {
            return None;
        }
    }

    let lower = line.to_lowercase();
    if !ERROR_KEYWORDS.iter().any(|k| lower.contains(k)) {
        return None;
    }

    let severity = if lower.contains("warn") {
        Severity::Warning
    } else {
        Severity::Error
    };

    Some(Diagnostic::new(
        Category::Unknown,
        severity,
        line,
        Location::unknown(),
        FixCapability::NoFix,
        line,
    ))
}
