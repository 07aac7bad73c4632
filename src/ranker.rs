//! Priority scoring, grouping and dedup of classified diagnostics.
//!
//! Scores start from a severity base, may be pinned by a category-specific
//! message override, get a boost for build and syntax failures, and are
//! lowered for warnings. Every result lies in `[1, 100]`.

use std::collections::HashMap;
use std::sync::LazyLock;

use regex::Regex;
use tracing::warn;

use crate::diagnostic::{Category, Diagnostic, FixCapability, RankedDiagnostic, Severity};

/// Priority given to categories with no scoring rules.
pub const DEFAULT_PRIORITY: u8 = 50;

const ERROR_BASE: i32 = 50;
const WARNING_BASE: i32 = 25;
const INFO_BASE: i32 = 10;
const BUILD_SYNTAX_BOOST: i32 = 10;
const WARNING_PENALTY: i32 = 20;
const INFO_PENALTY: i32 = 30;

/// A message regex pinned to a fixed score.
struct Override {
    pattern: Regex,
    score: i32,
}

/// Per-category scoring, fixability and suggestion rules.
struct CategoryRules {
    overrides: Vec<Override>,
    safe_fixes: Vec<Regex>,
    suggestions: Vec<(Regex, &'static str)>,
}

fn compile(pattern: &str) -> Option<Regex> {
    match Regex::new(pattern) {
        Ok(regex) => Some(regex),
        Err(e) => {
            warn!(pattern, error = %e, "skipping ranking rule that failed to compile");
            None
        }
    }
}

impl CategoryRules {
    fn new(
        overrides: &[(&str, i32)],
        safe_fixes: &[&str],
        suggestions: &[(&str, &'static str)],
    ) -> Self {
        Self {
            overrides: overrides
                .iter()
                .filter_map(|(p, score)| {
                    compile(p).map(|pattern| Override {
                        pattern,
                        score: *score,
                    })
                })
                .collect(),
            safe_fixes: safe_fixes.iter().filter_map(|p| compile(p)).collect(),
            suggestions: suggestions
                .iter()
                .filter_map(|(p, text)| compile(p).map(|r| (r, *text)))
                .collect(),
        }
    }
}

static RULES: LazyLock<HashMap<Category, CategoryRules>> = LazyLock::new(|| {
    let mut rules = HashMap::new();
    rules.insert(
        Category::TypeScript,
        CategoryRules::new(
            &[
                (r"(?i)cannot find module", 90),
                (r"(?i)cannot find name", 80),
                (r"(?i)is not assignable to", 70),
                (r"(?i)does not exist on type", 65),
                (r"(?i)is possibly '(?:null|undefined)'", 60),
                (r"(?i)implicitly has an? '\w+' (?:return )?type", 45),
                (r"(?i)is declared but (?:its value is )?never (?:read|used)", 30),
            ],
            &[
                r"(?i)cannot find name",
                r"(?i)implicitly has an 'any' type",
                r"(?i)is declared but (?:its value is )?never (?:read|used)",
                r"(?i)lacks a return-type annotation",
                r"(?i)is possibly '(?:null|undefined)'",
            ],
            &[
                (r"(?i)cannot find module", "Install the package or fix the import path"),
                (r"(?i)cannot find name", "Import the missing symbol"),
                (r"(?i)is not assignable to", "Align the value with the declared type"),
                (r"(?i)implicitly has an 'any' type", "Add an explicit type annotation"),
                (r"(?i)is possibly '(?:null|undefined)'", "Guard the access with optional chaining"),
                (r"(?i)is declared but", "Remove the unused declaration"),
            ],
        ),
    );
    rules.insert(
        Category::Lint,
        CategoryRules::new(
            &[
                (r"(?i)react hook .* is called (?:conditionally|in function)", 85),
                (r"(?i)is not defined", 75),
                (r"(?i)react hook .* has (?:a )?missing dependenc", 55),
                (r"(?i)is (?:defined|assigned a value) but never used", 30),
                (r"(?i)unexpected console statement", 20),
            ],
            &[
                r"(?i)is (?:defined|assigned a value) but never used",
                r"(?i)unexpected console statement",
                r"(?i)unexpected 'debugger' statement",
                r"(?i)missing semicolon",
                r"(?i)strings must use",
                r"(?i)is never reassigned\. use 'const'",
            ],
            &[
                (r"(?i)never used", "Remove the unused symbol"),
                (r"(?i)console statement|debugger", "Remove the debug statement"),
                (r"(?i)missing dependenc", "Add the missing hook dependencies"),
                (r#"(?i)missing "key" prop"#, "Add a key prop to each iterated element"),
            ],
        ),
    );
    rules.insert(
        Category::Build,
        CategoryRules::new(
            &[
                (r"(?i)heap out of memory|out of memory", 95),
                (r"(?i)module not found", 90),
                (r"(?i)failed to compile", 80),
                (r"(?i)client component", 75),
            ],
            &[r"(?i)you're importing a component that needs"],
            &[
                (r"(?i)client component", "Add the 'use client' directive"),
                (r"(?i)module not found", "Install the package or fix the import path"),
            ],
        ),
    );
    rules.insert(
        Category::Import,
        CategoryRules::new(
            &[(r"(?i)module not found|cannot find (?:module|package)|can't resolve", 90)],
            &[r"'\.{1,2}/"],
            &[
                (r"'\.{1,2}/", "Fix the relative import path or extension"),
                (r"'@/", "Fix the path alias or module resolution"),
                (r"'[^.@/][^']*'|'@[^/]+/[^']+'", "Install the missing dependency"),
            ],
        ),
    );
    rules.insert(
        Category::Runtime,
        CategoryRules::new(
            &[
                (r"(?i)maximum call stack", 90),
                (r"(?i)cannot read propert(?:y|ies) of (?:undefined|null)", 85),
                (r"(?i)is not defined", 80),
                (r"(?i)hydration", 75),
                (r"(?i)is not a function", 70),
                (r"(?i)eaddrinuse", 95),
            ],
            &[],
            &[
                (r"(?i)cannot read propert", "Guard the access with optional chaining"),
                (r"(?i)is not defined", "Import or declare the missing symbol"),
                (r"(?i)eaddrinuse", "Stop the other process or choose another port"),
            ],
        ),
    );
    rules.insert(
        Category::Syntax,
        CategoryRules::new(
            &[
                (r"(?i)unexpected token", 80),
                (r"(?i)unterminated", 80),
                (r"(?i)expected", 75),
            ],
            &[],
            &[(r"(?i).", "Fix the syntax at the reported location")],
        ),
    );
    rules
});

/// Assign a priority, group key and fixability to one diagnostic.
///
/// The returned value has no related ids; use [`rank_all`] to link groups.
pub fn rank(diagnostic: &Diagnostic) -> RankedDiagnostic {
    let Some(rules) = RULES.get(&diagnostic.category) else {
        return unranked(diagnostic);
    };

    let priority = priority(diagnostic, rules);
    let auto_fixable = diagnostic.capability == FixCapability::AutoFixable
        || rules
            .safe_fixes
            .iter()
            .any(|r| r.is_match(&diagnostic.message));
    let suggested_fix = rules
        .suggestions
        .iter()
        .find(|(r, _)| r.is_match(&diagnostic.message))
        .map(|(_, text)| (*text).to_owned());

    RankedDiagnostic {
        diagnostic: diagnostic.clone(),
        priority,
        group_key: group_key(diagnostic),
        related_errors: Vec::new(),
        auto_fixable,
        suggested_fix,
    }
}

/// Rank a batch, link each group's members to one another, and sort by
/// descending priority.
///
/// The sort is stable, so equal priorities keep their input order.
pub fn rank_all(diagnostics: &[Diagnostic]) -> Vec<RankedDiagnostic> {
    let mut ranked: Vec<RankedDiagnostic> = diagnostics.iter().map(rank).collect();

    let mut groups: HashMap<String, Vec<String>> = HashMap::new();
    for r in &ranked {
        groups
            .entry(r.group_key.clone())
            .or_default()
            .push(r.diagnostic.id.clone());
    }

    for r in &mut ranked {
        if let Some(members) = groups.get(&r.group_key) {
            if members.len() > 1 {
                r.related_errors = members
                    .iter()
                    .filter(|id| **id != r.diagnostic.id)
                    .cloned()
                    .collect();
            }
        }
    }

    ranked.sort_by(|a, b| b.priority.cmp(&a.priority));
    ranked
}

fn priority(diagnostic: &Diagnostic, rules: &CategoryRules) -> u8 {
    let mut score = match diagnostic.severity {
        Severity::Error => ERROR_BASE,
        Severity::Warning => WARNING_BASE,
        Severity::Info => INFO_BASE,
    };

    if let Some(o) = rules
        .overrides
        .iter()
        .find(|o| o.pattern.is_match(&diagnostic.message))
    {
        score = o.score;
    }

    if matches!(diagnostic.category, Category::Build | Category::Syntax) {
        score = score.saturating_add(BUILD_SYNTAX_BOOST);
    }

    score = match diagnostic.severity {
        Severity::Error => score,
        Severity::Warning => score.saturating_sub(WARNING_PENALTY),
        Severity::Info => score.saturating_sub(INFO_PENALTY),
    };

    // Clamped to [1, 100], so the conversion cannot fail.
    u8::try_from(score.clamp(1, 100)).unwrap_or(DEFAULT_PRIORITY)
}

/// Deterministic clustering key for a diagnostic.
pub fn group_key(diagnostic: &Diagnostic) -> String {
    let or_unknown = |v: Option<&String>| v.map_or("unknown", String::as_str).to_owned();
    let loc = &diagnostic.location;
    match diagnostic.category {
        Category::TypeScript => format!("typescript:{}", or_unknown(diagnostic.code.as_ref())),
        Category::Lint => format!("eslint:{}", or_unknown(diagnostic.rule.as_ref())),
        Category::Build => format!("build:{}", loc.file),
        Category::Import => format!("import:{}", loc.file),
        Category::Runtime => {
            let token = diagnostic
                .message
                .split_whitespace()
                .next()
                .map(|t| t.trim_end_matches(':'))
                .filter(|t| !t.is_empty())
                .unwrap_or("unknown");
            format!("runtime:{token}")
        }
        Category::Syntax => format!("syntax:{}:{}", loc.file, loc.line),
        Category::Unknown => format!("unclassified:{}", diagnostic.id),
    }
}

fn unranked(diagnostic: &Diagnostic) -> RankedDiagnostic {
    RankedDiagnostic {
        diagnostic: diagnostic.clone(),
        priority: DEFAULT_PRIORITY,
        group_key: group_key(diagnostic),
        related_errors: Vec::new(),
        auto_fixable: diagnostic.capability == FixCapability::AutoFixable,
        suggested_fix: None,
    }
}
