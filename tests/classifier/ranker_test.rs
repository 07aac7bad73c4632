//! Priority scoring, grouping and related-id linking.

use devwatch::classifier::classify_line;
use devwatch::diagnostic::{Category, Diagnostic, FixCapability, Location, Severity};
use devwatch::ranker::{group_key, rank, rank_all, DEFAULT_PRIORITY};

fn diagnostic(category: Category, severity: Severity, message: &str) -> Diagnostic {
    Diagnostic::new(
        category,
        severity,
        message,
        Location::new("src/app.tsx", 4, 2),
        FixCapability::ManualOnly,
        message,
    )
}

// ---------------------------------------------------------------------------
// Priority
// ---------------------------------------------------------------------------

#[test]
fn type_mismatch_scores_seventy() {
    let d = classify_line(
        "Button.tsx(10,15): error TS2322: Type 'string' is not assignable to type 'number'.",
    )
    .expect("line should classify");
    let ranked = rank(&d);
    assert_eq!(ranked.priority, 70);
    assert_eq!(ranked.group_key, "typescript:TS2322");
    assert!(!ranked.auto_fixable);
}

#[test]
fn severity_base_scores() {
    let error = rank(&diagnostic(Category::TypeScript, Severity::Error, "Something odd"));
    let warning = rank(&diagnostic(Category::TypeScript, Severity::Warning, "Something odd"));
    assert_eq!(error.priority, 50);
    // Base 25 for warnings, minus the 20 point warning penalty.
    assert_eq!(warning.priority, 5);
}

#[test]
fn warning_penalty_applies_after_override() {
    let d = diagnostic(Category::Lint, Severity::Warning, "'foo' is defined but never used");
    assert_eq!(rank(&d).priority, 10);
}

#[test]
fn build_and_syntax_get_boost() {
    let build = rank(&diagnostic(Category::Build, Severity::Error, "Failed to compile."));
    assert_eq!(build.priority, 90);

    let syntax = rank(&diagnostic(Category::Syntax, Severity::Error, "Unexpected token '<'"));
    assert_eq!(syntax.priority, 90);
}

#[test]
fn priority_is_clamped() {
    let high = rank(&diagnostic(
        Category::Build,
        Severity::Error,
        "FATAL ERROR: JavaScript heap out of memory",
    ));
    assert_eq!(high.priority, 100);

    let low = rank(&diagnostic(
        Category::Lint,
        Severity::Warning,
        "Unexpected console statement.",
    ));
    assert_eq!(low.priority, 1);

    let info = rank(&diagnostic(Category::TypeScript, Severity::Info, "note"));
    assert_eq!(info.priority, 1);
}

#[test]
fn unknown_category_keeps_defaults() {
    let mut d = diagnostic(Category::Unknown, Severity::Error, "something failed");
    d.capability = FixCapability::AutoFixable;
    let ranked = rank(&d);
    assert_eq!(ranked.priority, DEFAULT_PRIORITY);
    assert!(ranked.auto_fixable);
    assert!(ranked.suggested_fix.is_none());
    assert_eq!(ranked.group_key, format!("unclassified:{}", d.id));
}

// ---------------------------------------------------------------------------
// Fixability and suggestions
// ---------------------------------------------------------------------------

#[test]
fn safe_pattern_marks_auto_fixable() {
    let d = diagnostic(Category::TypeScript, Severity::Error, "Cannot find name 'useState'.");
    let ranked = rank(&d);
    assert!(ranked.auto_fixable);
    assert_eq!(ranked.priority, 80);
    assert_eq!(
        ranked.suggested_fix.as_deref(),
        Some("Import the missing symbol")
    );
}

#[test]
fn capability_tag_marks_auto_fixable() {
    let mut d = diagnostic(Category::Runtime, Severity::Error, "TypeError: x is not a function");
    d.capability = FixCapability::AutoFixable;
    assert!(rank(&d).auto_fixable);
}

// ---------------------------------------------------------------------------
// Grouping
// ---------------------------------------------------------------------------

#[test]
fn group_keys_per_category() {
    let lint = diagnostic(Category::Lint, Severity::Error, "bad");
    assert_eq!(group_key(&lint), "eslint:unknown");
    assert_eq!(
        group_key(&lint.clone().with_rule("no-console")),
        "eslint:no-console"
    );

    let ts = diagnostic(Category::TypeScript, Severity::Error, "bad");
    assert_eq!(group_key(&ts), "typescript:unknown");

    let runtime = diagnostic(Category::Runtime, Severity::Error, "TypeError: x is not a function");
    assert_eq!(group_key(&runtime), "runtime:TypeError");

    let build = diagnostic(Category::Build, Severity::Error, "Failed to compile.");
    assert_eq!(group_key(&build), "build:src/app.tsx");

    let syntax = diagnostic(Category::Syntax, Severity::Error, "Unexpected token");
    assert_eq!(group_key(&syntax), "syntax:src/app.tsx:4");
}

#[test]
fn rank_all_links_groups_symmetrically() {
    let a = diagnostic(Category::TypeScript, Severity::Error, "Type 'a' is not assignable to type 'b'.")
        .with_code("TS2322");
    let b = diagnostic(Category::TypeScript, Severity::Error, "Type 'c' is not assignable to type 'd'.")
        .with_code("TS2322");
    let lone = diagnostic(Category::Lint, Severity::Error, "bad").with_rule("semi");

    let ranked = rank_all(&[a.clone(), lone.clone(), b.clone()]);
    assert_eq!(ranked.len(), 3);

    let find = |id: &str| {
        ranked
            .iter()
            .find(|r| r.id() == id)
            .expect("ranked entry should exist")
    };
    assert_eq!(find(&a.id).related_errors, vec![b.id.clone()]);
    assert_eq!(find(&b.id).related_errors, vec![a.id.clone()]);
    assert!(find(&lone.id).related_errors.is_empty());
}

#[test]
fn rank_all_sorts_descending_and_is_stable() {
    let first = diagnostic(Category::Runtime, Severity::Error, "Error: first");
    let second = diagnostic(Category::Runtime, Severity::Error, "Error: second");
    let urgent = diagnostic(Category::Build, Severity::Error, "Module not found: x");

    let ranked = rank_all(&[first.clone(), second.clone(), urgent.clone()]);
    let ids: Vec<&str> = ranked.iter().map(|r| r.id()).collect();
    assert_eq!(ids, vec![urgent.id.as_str(), first.id.as_str(), second.id.as_str()]);
    assert!(ranked.windows(2).all(|w| w[0].priority >= w[1].priority));
}

#[test]
fn rank_all_of_nothing_is_empty() {
    assert!(rank_all(&[]).is_empty());
}
