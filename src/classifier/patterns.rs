//! Ordered table of known diagnostic line formats.
//!
//! Each entry pairs a regex with an extractor that turns the capture groups
//! into a [`Diagnostic`]. Order matters: the classifier stops at the first
//! pattern whose extractor succeeds.

use std::sync::LazyLock;

use regex::{Captures, Regex};
use tracing::warn;

use crate::diagnostic::{Category, Diagnostic, FixCapability, Location, Severity, UNKNOWN_FILE};

/// Failure to turn a regex match into a diagnostic.
#[derive(Debug, thiserror::Error)]
pub enum ExtractError {
    /// A capture group the extractor relies on did not participate.
    #[error("capture group `{0}` missing")]
    MissingGroup(&'static str),
    /// A numeric group could not be parsed.
    #[error("capture group `{group}` is not a number: {value}")]
    BadNumber {
        /// Group name.
        group: &'static str,
        /// Offending text.
        value: String,
    },
    /// The match is a false positive for this pattern.
    #[error("{0}")]
    Rejected(&'static str),
}

type Extractor = fn(&Captures<'_>, &str) -> Result<Diagnostic, ExtractError>;

/// One entry of the pattern table.
pub struct LinePattern {
    /// Short name used in logs.
    pub name: &'static str,
    /// Category every match of this pattern receives.
    pub category: Category,
    regex: Regex,
    extract: Extractor,
}

impl LinePattern {
    /// Match `line` and run the extractor.
    ///
    /// Returns `None` when the regex does not match at all.
    pub fn try_extract(&self, line: &str) -> Option<Result<Diagnostic, ExtractError>> {
        let caps = self.regex.captures(line)?;
        Some((self.extract)(&caps, line))
    }
}

/// The pattern table, compiled once.
pub static PATTERNS: LazyLock<Vec<LinePattern>> = LazyLock::new(build_patterns);

fn build_patterns() -> Vec<LinePattern> {
    let specs: [(&'static str, Category, &'static str, Extractor); 21] = [
        // -- Static type checker --
        (
            "tsc_paren",
            Category::TypeScript,
            r"^(?P<file>[^\s(][^(]*?)\((?P<line>\d+),(?P<col>\d+)\):\s*(?P<sev>error|warning)\s+(?P<code>TS\d+):\s*(?P<msg>.+)$",
            extract_tsc,
        ),
        (
            "tsc_pretty",
            Category::TypeScript,
            r"^(?P<file>[^\s:]+?\.[cm]?[jt]sx?):(?P<line>\d+):(?P<col>\d+)\s+-\s+(?P<sev>error|warning)\s+(?P<code>TS\d+):\s*(?P<msg>.+)$",
            extract_tsc,
        ),
        (
            "next_type_error",
            Category::TypeScript,
            r"^(?:(?P<file>\S+?\.[cm]?[jt]sx?):(?P<line>\d+):(?P<col>\d+)\s*)?Type error:\s*(?P<msg>.+)$",
            extract_type_error,
        ),
        // -- Linter --
        (
            "eslint_compact",
            Category::Lint,
            r"^(?P<file>.+?): line (?P<line>\d+), col (?P<col>\d+), (?P<sev>Error|Warning) - (?P<msg>.+?)(?: \((?P<rule>[@\w/-]+)\))?$",
            extract_eslint,
        ),
        (
            "eslint_unix",
            Category::Lint,
            r"^(?P<file>[^\s:]+):(?P<line>\d+):(?P<col>\d+):\s*(?P<msg>.+?)\s+\[(?P<sev>Error|Warning)/(?P<rule>[@\w/-]+)\]$",
            extract_eslint,
        ),
        (
            "eslint_stylish",
            Category::Lint,
            r"^(?P<line>\d+):(?P<col>\d+)\s+(?P<sev>[Ee]rror|[Ww]arning):?\s+(?P<msg>.+?)\s{2,}(?P<rule>[@\w/-]+)$",
            extract_eslint,
        ),
        // -- Module resolution --
        (
            "module_not_found",
            Category::Import,
            r"^(?:(?P<file>\S+?):(?P<line>\d+):(?P<col>\d+)\s*)?Module not found:\s*(?:Error:\s*)?Can't resolve '(?P<spec>[^']+)'(?: in '(?P<dir>[^']+)')?",
            extract_module_not_found,
        ),
        (
            "node_cannot_find_module",
            Category::Import,
            r"^(?:Error(?: \[ERR_MODULE_NOT_FOUND\])?:\s*)?Cannot find (?:module|package) '(?P<spec>[^']+)'(?: imported from (?P<file>\S+))?",
            extract_cannot_find_module,
        ),
        (
            "vite_failed_to_resolve",
            Category::Import,
            r#"^(?:\[plugin:vite:import-analysis\]\s*)?Failed to resolve import "(?P<spec>[^"]+)" from "(?P<file>[^"]+)""#,
            extract_cannot_find_module,
        ),
        // -- Parse errors --
        (
            "syntax_located",
            Category::Syntax,
            r"^(?P<file>\S+?\.[cm]?[jt]sx?):(?P<line>\d+):(?P<col>\d+)\s*(?:-\s*)?(?:SyntaxError|Syntax error|Parsing error):?\s*(?P<msg>.+)$",
            extract_syntax,
        ),
        (
            "syntax_error",
            Category::Syntax,
            r"^(?:Uncaught\s+)?SyntaxError:\s*(?P<msg>.+?)(?:\s+\((?P<line>\d+):(?P<col>\d+)\))?$",
            extract_syntax,
        ),
        (
            "swc_expected",
            Category::Syntax,
            r"^[x×⨯]\s+(?P<msg>(?:Expected|Unexpected|Unterminated) .+)$",
            extract_syntax,
        ),
        // -- Build --
        (
            "client_component_needed",
            Category::Build,
            r"You're importing a component that needs (?P<hook>[\w.]+)",
            extract_client_component,
        ),
        (
            "failed_to_compile",
            Category::Build,
            r"^(?:[x×⨯]\s+)?Failed to compile\.?\s*(?P<detail>.*)$",
            extract_build,
        ),
        (
            "build_failed",
            Category::Build,
            r"(?i)^(?:>\s*)?build (?:failed|error occurred)(?P<detail>.*)$",
            extract_build,
        ),
        (
            "compiled_with_errors",
            Category::Build,
            r"compiled with (?P<count>\d+) errors?",
            extract_compiled_with_errors,
        ),
        (
            "npm_err",
            Category::Build,
            r"^npm ERR!\s*(?P<detail>.+)$",
            extract_build,
        ),
        // -- Runtime --
        (
            "unhandled_runtime",
            Category::Runtime,
            r"^(?:Unhandled Runtime Error|Uncaught(?: \(in promise\))?)\s*:?\s*(?P<kind>[A-Z]\w*Error):\s*(?P<msg>.+)$",
            extract_runtime,
        ),
        (
            "next_error_at",
            Category::Runtime,
            r"^(?:-\s*)?error\s+(?P<file>\S+?\.[cm]?[jt]sx?)\s+\((?P<line>\d+):(?P<col>\d+)\)\s*@\s*(?P<func>\S+)$",
            extract_runtime_at,
        ),
        (
            "js_error",
            Category::Runtime,
            r"^(?:⨯\s+)?(?P<kind>TypeError|ReferenceError|RangeError|EvalError|URIError|InternalError|AggregateError|Error):\s*(?P<msg>.+)$",
            extract_runtime,
        ),
        (
            "unhandled_rejection",
            Category::Runtime,
            r"^(?:\(node:\d+\)\s*)?UnhandledPromiseRejectionWarning:\s*(?P<msg>.+)$",
            extract_unhandled_rejection,
        ),
    ];

    specs
        .into_iter()
        .filter_map(|(name, category, pattern, extract)| match Regex::new(pattern) {
            Ok(regex) => Some(LinePattern {
                name,
                category,
                regex,
                extract,
            }),
            Err(e) => {
                warn!(pattern = name, error = %e, "skipping pattern that failed to compile");
                None
            }
        })
        .collect()
}

// -- Capture helpers --

fn text<'c>(caps: &'c Captures<'_>, group: &'static str) -> Result<&'c str, ExtractError> {
    caps.name(group)
        .map(|m| m.as_str())
        .ok_or(ExtractError::MissingGroup(group))
}

fn opt_text<'c>(caps: &'c Captures<'_>, group: &'static str) -> Option<&'c str> {
    caps.name(group)
        .map(|m| m.as_str().trim())
        .filter(|s| !s.is_empty())
}

fn number(caps: &Captures<'_>, group: &'static str) -> Result<u32, ExtractError> {
    let value = text(caps, group)?;
    value.parse().map_err(|_| ExtractError::BadNumber {
        group,
        value: value.to_owned(),
    })
}

/// Location from optional `file`/`line`/`col` groups.
///
/// A position without a file (stylish lint output, parser messages) keeps
/// its line and column under [`UNKNOWN_FILE`].
fn location(caps: &Captures<'_>) -> Result<Location, ExtractError> {
    let file = opt_text(caps, "file").map_or(UNKNOWN_FILE, |f| f.strip_prefix("./").unwrap_or(f));
    if caps.name("line").is_none() {
        return Ok(Location::file_only(file));
    }
    let line = number(caps, "line")?;
    let column = if caps.name("col").is_some() {
        number(caps, "col")?
    } else {
        1
    };
    Ok(Location::new(file, line, column))
}

// -- Capability tables --

/// Type-checker codes with a known text transformation.
const TS_AUTO_FIXABLE: &[&str] = &[
    "TS2304", "TS2307", "TS2552", "TS6133", "TS6192", "TS7006", "TS7010", "TS7030", "TS2531",
    "TS2532", "TS18047", "TS18048", "TS2732",
];

/// Type-checker codes where a fix exists but needs a human to confirm intent.
const TS_SUGGESTION_ONLY: &[&str] = &["TS2322", "TS2345", "TS2339", "TS2741", "TS2375", "TS2379"];

/// Lint rules with a safe mechanical fix.
const LINT_AUTO_FIXABLE: &[&str] = &[
    "semi",
    "quotes",
    "prefer-const",
    "no-extra-semi",
    "comma-dangle",
    "indent",
    "no-var",
    "eol-last",
    "no-trailing-spaces",
    "object-shorthand",
    "no-unused-vars",
    "@typescript-eslint/no-unused-vars",
    "no-console",
    "no-debugger",
    "react/jsx-key",
];

/// Lint rules whose fix changes behavior and should only be suggested.
const LINT_SUGGESTION_ONLY: &[&str] = &[
    "react-hooks/exhaustive-deps",
    "jsx-a11y/alt-text",
    "@next/next/no-img-element",
];

fn ts_capability(code: Option<&str>) -> FixCapability {
    match code {
        Some(c) if TS_AUTO_FIXABLE.contains(&c) => FixCapability::AutoFixable,
        Some(c) if TS_SUGGESTION_ONLY.contains(&c) => FixCapability::SuggestionOnly,
        _ => FixCapability::ManualOnly,
    }
}

fn lint_capability(rule: Option<&str>) -> FixCapability {
    match rule {
        Some(r) if LINT_AUTO_FIXABLE.contains(&r) => FixCapability::AutoFixable,
        Some(r) if LINT_SUGGESTION_ONLY.contains(&r) => FixCapability::SuggestionOnly,
        Some(_) => FixCapability::ManualOnly,
        None => FixCapability::NoFix,
    }
}

/// Best-effort type-checker code for messages printed without one.
fn infer_ts_code(message: &str) -> Option<&'static str> {
    const KNOWN: &[(&str, &str)] = &[
        ("Cannot find name", "TS2304"),
        ("Cannot find module", "TS2307"),
        ("is not assignable to parameter of type", "TS2345"),
        ("is not assignable to type", "TS2322"),
        ("implicitly has an 'any' type", "TS7006"),
        ("is declared but its value is never read", "TS6133"),
        ("does not exist on type", "TS2339"),
        ("is possibly 'null'", "TS18047"),
        ("is possibly 'undefined'", "TS18048"),
        ("is missing in type", "TS2741"),
    ];
    KNOWN
        .iter()
        .find(|(needle, _)| message.contains(needle))
        .map(|(_, code)| *code)
}

// -- Extractors --

fn extract_tsc(caps: &Captures<'_>, raw: &str) -> Result<Diagnostic, ExtractError> {
    let code = text(caps, "code")?;
    let message = text(caps, "msg")?.trim();
    Ok(Diagnostic::new(
        Category::TypeScript,
        Severity::from_word(text(caps, "sev")?),
        message,
        location(caps)?,
        ts_capability(Some(code)),
        raw,
    )
    .with_code(code))
}

fn extract_type_error(caps: &Captures<'_>, raw: &str) -> Result<Diagnostic, ExtractError> {
    let message = text(caps, "msg")?.trim();
    let code = infer_ts_code(message);
    let diagnostic = Diagnostic::new(
        Category::TypeScript,
        Severity::Error,
        message,
        location(caps)?,
        ts_capability(code),
        raw,
    );
    Ok(match code {
        Some(code) => diagnostic.with_code(code),
        None => diagnostic,
    })
}

fn extract_eslint(caps: &Captures<'_>, raw: &str) -> Result<Diagnostic, ExtractError> {
    let message = text(caps, "msg")?.trim();
    let rule = opt_text(caps, "rule");
    let diagnostic = Diagnostic::new(
        Category::Lint,
        Severity::from_word(text(caps, "sev")?),
        message,
        location(caps)?,
        lint_capability(rule),
        raw,
    );
    Ok(match rule {
        Some(rule) => diagnostic.with_rule(rule),
        None => diagnostic,
    })
}

fn extract_module_not_found(caps: &Captures<'_>, raw: &str) -> Result<Diagnostic, ExtractError> {
    let spec = text(caps, "spec")?;
    Ok(Diagnostic::new(
        Category::Import,
        Severity::Error,
        format!("Module not found: Can't resolve '{spec}'"),
        location(caps)?,
        FixCapability::AutoFixable,
        raw,
    ))
}

fn extract_cannot_find_module(caps: &Captures<'_>, raw: &str) -> Result<Diagnostic, ExtractError> {
    let spec = text(caps, "spec")?;
    Ok(Diagnostic::new(
        Category::Import,
        Severity::Error,
        format!("Cannot find module '{spec}'"),
        location(caps)?,
        FixCapability::AutoFixable,
        raw,
    ))
}

fn extract_syntax(caps: &Captures<'_>, raw: &str) -> Result<Diagnostic, ExtractError> {
    let message = text(caps, "msg")?.trim();
    Ok(Diagnostic::new(
        Category::Syntax,
        Severity::Error,
        message,
        location(caps)?,
        FixCapability::ManualOnly,
        raw,
    ))
}

fn extract_client_component(caps: &Captures<'_>, raw: &str) -> Result<Diagnostic, ExtractError> {
    let hook = text(caps, "hook")?;
    Ok(Diagnostic::new(
        Category::Build,
        Severity::Error,
        format!(
            "You're importing a component that needs {hook}. It only works in a Client Component"
        ),
        Location::unknown(),
        FixCapability::AutoFixable,
        raw,
    ))
}

fn extract_build(_caps: &Captures<'_>, raw: &str) -> Result<Diagnostic, ExtractError> {
    Ok(Diagnostic::new(
        Category::Build,
        Severity::Error,
        raw.trim(),
        Location::unknown(),
        FixCapability::ManualOnly,
        raw,
    ))
}

fn extract_compiled_with_errors(
    caps: &Captures<'_>,
    raw: &str,
) -> Result<Diagnostic, ExtractError> {
    let count = number(caps, "count")?;
    if count == 0 {
        return Err(ExtractError::Rejected("compiled with zero errors"));
    }
    Ok(Diagnostic::new(
        Category::Build,
        Severity::Error,
        format!("Compiled with {count} error(s)"),
        Location::unknown(),
        FixCapability::ManualOnly,
        raw,
    ))
}

fn runtime_capability(message: &str) -> FixCapability {
    if message.contains("is not defined") || message.contains("Cannot read propert") {
        FixCapability::SuggestionOnly
    } else {
        FixCapability::ManualOnly
    }
}

fn extract_runtime(caps: &Captures<'_>, raw: &str) -> Result<Diagnostic, ExtractError> {
    let kind = text(caps, "kind")?;
    let message = format!("{kind}: {}", text(caps, "msg")?.trim());
    let capability = runtime_capability(&message);
    Ok(Diagnostic::new(
        Category::Runtime,
        Severity::Error,
        message,
        location(caps)?,
        capability,
        raw,
    ))
}

fn extract_runtime_at(caps: &Captures<'_>, raw: &str) -> Result<Diagnostic, ExtractError> {
    let func = text(caps, "func")?;
    Ok(Diagnostic::new(
        Category::Runtime,
        Severity::Error,
        format!("Error: runtime error in {func}"),
        location(caps)?,
        FixCapability::ManualOnly,
        raw,
    ))
}

fn extract_unhandled_rejection(
    caps: &Captures<'_>,
    raw: &str,
) -> Result<Diagnostic, ExtractError> {
    let message = text(caps, "msg")?.trim();
    Ok(Diagnostic::new(
        Category::Runtime,
        Severity::Warning,
        format!("UnhandledPromiseRejection: {message}"),
        Location::unknown(),
        runtime_capability(message),
        raw,
    ))
}
