//! Post-fix validation.
//!
//! Checks run in order and the first failure wins:
//!
//! 1. syntax probe (bracket and string balance, or a JSON parse for `.json`)
//! 2. malformed token sequences
//! 3. fatal messages from the lint tool, skipped if the tool cannot run
//! 4. size ceiling
//!
//! The first two checks compare against the content before the fix so that a
//! file which was already broken does not block every fix to it.

use std::path::Path;
use std::sync::Arc;

use tracing::warn;

use crate::remediation::lint::LintTool;

/// Token sequences no transform should ever produce.
const MALFORMED: &[&str] = &[
    ": :", ": ;", "=> =>", "as as ", "import import ", "export export ", ",,", "?.?.", ": )",
];

/// Runs the validation checks against a freshly written file.
#[derive(Clone)]
pub struct Validator {
    lint: Arc<dyn LintTool>,
    max_file_size_bytes: u64,
}

impl std::fmt::Debug for Validator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Validator")
            .field("max_file_size_bytes", &self.max_file_size_bytes)
            .finish_non_exhaustive()
    }
}

impl Validator {
    /// Create a validator backed by `lint`.
    pub fn new(lint: Arc<dyn LintTool>, max_file_size_bytes: u64) -> Self {
        Self {
            lint,
            max_file_size_bytes,
        }
    }

    /// Validate `after`, already written to `file`, against `before`.
    ///
    /// # Errors
    ///
    /// Returns the reason of the first failing check.
    pub async fn validate(&self, file: &Path, before: &str, after: &str) -> Result<(), String> {
        let is_json = file.extension().is_some_and(|e| e == "json");
        let probe = |text: &str| {
            if is_json {
                serde_json::from_str::<serde_json::Value>(text)
                    .map(|_| ())
                    .map_err(|e| format!("invalid JSON: {e}"))
            } else {
                syntax_probe(text)
            }
        };
        if let Err(reason) = probe(after) {
            if probe(before).is_ok() {
                return Err(format!("Syntax check failed: {reason}"));
            }
        }

        if !is_json {
            if let Some(seq) = MALFORMED
                .iter()
                .find(|seq| after.matches(*seq).count() > before.matches(*seq).count())
            {
                return Err(format!("Malformed token sequence introduced: '{seq}'"));
            }

            match self.lint.fatal_messages(file).await {
                Ok(fatal) => {
                    if let Some(first) = fatal.first() {
                        return Err(format!("Lint reported a fatal error: {first}"));
                    }
                }
                Err(e) => {
                    warn!(file = %file.display(), error = %e, "lint validation skipped");
                }
            }
        }

        let size = u64::try_from(after.len()).unwrap_or(u64::MAX);
        if size > self.max_file_size_bytes {
            return Err(format!(
                "Fixed file is {size} bytes, over the {} byte limit",
                self.max_file_size_bytes
            ));
        }
        Ok(())
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum State {
    Code,
    Str(char),
    LineComment,
    BlockComment,
}

/// Bracket and string balance check for JS/TS source.
///
/// A `'` or `"` with no closing quote on the same line is treated as plain
/// text, which keeps JSX copy such as `Don't` from tripping the probe.
///
/// # Errors
///
/// Returns a description of the first imbalance.
pub fn syntax_probe(text: &str) -> Result<(), String> {
    let mut stack: Vec<(char, usize)> = Vec::new();
    let mut state = State::Code;
    let mut line = 1usize;
    let chars: Vec<char> = text.chars().collect();
    let mut i = 0usize;

    while let Some(&c) = chars.get(i) {
        let next = chars.get(i.saturating_add(1)).copied();
        if c == '\n' {
            line = line.saturating_add(1);
        }
        match state {
            State::Code => match c {
                '/' if next == Some('/') => state = State::LineComment,
                '/' if next == Some('*') => {
                    state = State::BlockComment;
                    i = i.saturating_add(1);
                }
                '`' => state = State::Str('`'),
                '\'' | '"' if closes_on_line(&chars, i, c) => state = State::Str(c),
                '(' | '[' | '{' => stack.push((c, line)),
                ')' | ']' | '}' => {
                    let expected = match c {
                        ')' => '(',
                        ']' => '[',
                        _ => '{',
                    };
                    match stack.pop() {
                        Some((open, _)) if open == expected => {}
                        Some((open, open_line)) => {
                            return Err(format!(
                                "'{c}' on line {line} does not close '{open}' from line {open_line}"
                            ));
                        }
                        None => return Err(format!("unmatched '{c}' on line {line}")),
                    }
                }
                _ => {}
            },
            State::Str(q) => {
                if c == '\\' {
                    i = i.saturating_add(1);
                    if next == Some('\n') {
                        line = line.saturating_add(1);
                    }
                } else if c == q {
                    state = State::Code;
                }
            }
            State::LineComment => {
                if c == '\n' {
                    state = State::Code;
                }
            }
            State::BlockComment => {
                if c == '*' && next == Some('/') {
                    state = State::Code;
                    i = i.saturating_add(1);
                }
            }
        }
        i = i.saturating_add(1);
    }

    match state {
        State::Str(q) => return Err(format!("unterminated {q} string")),
        State::BlockComment => return Err("unterminated block comment".to_owned()),
        State::Code | State::LineComment => {}
    }
    if let Some((open, open_line)) = stack.last() {
        return Err(format!("'{open}' from line {open_line} is never closed"));
    }
    Ok(())
}

fn closes_on_line(chars: &[char], start: usize, quote: char) -> bool {
    let mut escaped = false;
    for &c in chars.iter().skip(start.saturating_add(1)) {
        if c == '\n' {
            return false;
        }
        if escaped {
            escaped = false;
        } else if c == '\\' {
            escaped = true;
        } else if c == quote {
            return true;
        }
    }
    false
}
