//! Session coordinator: live map, grouping, fixes and lifecycle.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use devwatch::config::{DevwatchConfig, ServerConfig};
use devwatch::diagnostic::{Category, Severity};
use devwatch::remediation::lint::NoopLint;
use devwatch::remediation::RemediationEngine;
use devwatch::session::{DiagnosticFilter, Lifecycle, Session, SessionEvent};
use tokio::sync::mpsc::UnboundedReceiver;

const TS_LINE: &str =
    "Button.tsx(10,15): error TS2322: Type 'string' is not assignable to type 'number'.";
const TS_LINE_2: &str =
    "Card.tsx(4,2): error TS2322: Type 'number' is not assignable to type 'string'.";
const LINT_LINE: &str = "src/app.ts:3:1: Unexpected console statement. [Warning/no-console]";

const APP_SOURCE: &str = "const a = 1;\nconst b = 2;\nconsole.log(a, b);\nexport default a;\n";

fn session_in(root: &Path) -> (Session, UnboundedReceiver<SessionEvent>) {
    let config = DevwatchConfig::default();
    let engine = RemediationEngine::new(root.to_path_buf(), &config.remediation, &config.tools)
        .with_lint_tool(Arc::new(NoopLint));
    let (session, rx) = Session::new(&config, root.to_path_buf());
    (session.with_engine(engine), rx)
}

fn drain(rx: &mut UnboundedReceiver<SessionEvent>) -> Vec<SessionEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

fn observed_ids(events: &[SessionEvent]) -> Vec<String> {
    events
        .iter()
        .filter_map(|e| match e {
            SessionEvent::DiagnosticObserved(ranked) => Some(ranked.id().to_owned()),
            _ => None,
        })
        .collect()
}

fn write_app(root: &Path) {
    std::fs::create_dir_all(root.join("src")).expect("should create src dir");
    std::fs::write(root.join("src/app.ts"), APP_SOURCE).expect("should write app source");
}

// ---------------------------------------------------------------------------
// Live map
// ---------------------------------------------------------------------------

#[tokio::test]
async fn chunk_produces_ranked_diagnostics() {
    let tmp = tempfile::tempdir().expect("should create temp dir");
    let (mut session, mut rx) = session_in(tmp.path());

    session
        .ingest_chunk(&format!("compiling...\n{TS_LINE}\n{LINT_LINE}\n"))
        .await;

    let all = session.diagnostics(&DiagnosticFilter::default());
    assert_eq!(all.len(), 2);
    assert_eq!(all[0].diagnostic.code.as_deref(), Some("TS2322"));
    assert_eq!(all[0].priority, 70);
    assert_eq!(session.metrics().diagnostics_seen, 2);
    assert_eq!(session.metrics().lines_processed, 3);
    assert_eq!(observed_ids(&drain(&mut rx)).len(), 2);
}

#[tokio::test]
async fn repeated_lines_bump_occurrences() {
    let tmp = tempfile::tempdir().expect("should create temp dir");
    let (mut session, mut rx) = session_in(tmp.path());

    session.ingest_chunk(&format!("{TS_LINE}\n")).await;
    session.ingest_chunk(&format!("{TS_LINE}\n")).await;

    let ids = observed_ids(&drain(&mut rx));
    assert_eq!(ids.len(), 1);
    let live = session.get(&ids[0]).expect("diagnostic should be live");
    assert_eq!(live.occurrences, 2);
    assert!(live.last_seen >= live.first_seen);
    assert_eq!(session.metrics().diagnostics_seen, 1);
}

#[tokio::test]
async fn same_group_diagnostics_are_related() {
    let tmp = tempfile::tempdir().expect("should create temp dir");
    let (mut session, mut rx) = session_in(tmp.path());

    session.ingest_chunk(&format!("{TS_LINE}\n")).await;
    session.ingest_chunk(&format!("{TS_LINE_2}\n")).await;
    let ids = observed_ids(&drain(&mut rx));
    assert_eq!(ids.len(), 2);

    let first = session.get(&ids[0]).expect("first should be live");
    let second = session.get(&ids[1]).expect("second should be live");
    assert_eq!(first.ranked.related_errors, vec![ids[1].clone()]);
    assert_eq!(second.ranked.related_errors, vec![ids[0].clone()]);

    assert!(session.resolve(&ids[0]));
    assert!(session.get(&ids[0]).is_none());
    let second = session.get(&ids[1]).expect("second should stay live");
    assert!(second.ranked.related_errors.is_empty());
    assert_eq!(
        drain(&mut rx),
        vec![SessionEvent::DiagnosticResolved { id: ids[0].clone() }]
    );

    assert!(!session.resolve(&ids[0]));
}

#[tokio::test]
async fn repeated_line_in_mixed_batch_links_only_live_ids() {
    let tmp = tempfile::tempdir().expect("should create temp dir");
    let (mut session, mut rx) = session_in(tmp.path());

    session.ingest_chunk(&format!("{TS_LINE}\n")).await;
    session
        .ingest_chunk(&format!("{TS_LINE}\n{TS_LINE_2}\n"))
        .await;
    let ids = observed_ids(&drain(&mut rx));
    assert_eq!(ids.len(), 2);

    for live in session.diagnostics(&DiagnosticFilter::default()) {
        for related in &live.related_errors {
            let other = session
                .get(related)
                .unwrap_or_else(|| panic!("{} links to missing {related}", live.id()));
            assert!(other.ranked.related_errors.contains(&live.id().to_owned()));
        }
    }
    let card = session.get(&ids[1]).expect("second should be live");
    assert_eq!(card.ranked.related_errors, vec![ids[0].clone()]);
    assert_eq!(session.get(&ids[0]).map(|l| l.occurrences), Some(2));
}

#[tokio::test]
async fn filters_select_by_category_and_severity() {
    let tmp = tempfile::tempdir().expect("should create temp dir");
    let (mut session, _rx) = session_in(tmp.path());
    session
        .ingest_chunk(&format!("{TS_LINE}\n{LINT_LINE}\n"))
        .await;

    let lint = session.diagnostics(&DiagnosticFilter {
        category: Some(Category::Lint),
        ..DiagnosticFilter::default()
    });
    assert_eq!(lint.len(), 1);
    assert_eq!(lint[0].diagnostic.rule.as_deref(), Some("no-console"));

    let warnings = session.diagnostics(&DiagnosticFilter {
        severity: Some(Severity::Warning),
        ..DiagnosticFilter::default()
    });
    assert_eq!(warnings.len(), 1);

    let fixable = session.diagnostics(&DiagnosticFilter {
        auto_fixable: Some(true),
        ..DiagnosticFilter::default()
    });
    assert!(fixable.iter().all(|d| d.auto_fixable));
    assert!(fixable.iter().any(|d| d.diagnostic.category == Category::Lint));
}

// ---------------------------------------------------------------------------
// Fixes
// ---------------------------------------------------------------------------

#[tokio::test]
async fn successful_fix_resolves_diagnostic() {
    let tmp = tempfile::tempdir().expect("should create temp dir");
    write_app(tmp.path());
    let (mut session, mut rx) = session_in(tmp.path());

    session.ingest_chunk(&format!("{LINT_LINE}\n")).await;
    let ids = observed_ids(&drain(&mut rx));
    assert_eq!(ids.len(), 1);

    let result = session.fix(&ids[0], false).await;
    assert!(result.success, "fix failed: {:?}", result.error);
    assert_eq!(
        std::fs::read_to_string(tmp.path().join("src/app.ts")).expect("should read app"),
        "const a = 1;\nconst b = 2;\nexport default a;\n"
    );
    assert!(session.get(&ids[0]).is_none());
    assert_eq!(
        drain(&mut rx),
        vec![SessionEvent::DiagnosticResolved { id: ids[0].clone() }]
    );

    let metrics = session.metrics();
    assert_eq!(metrics.diagnostics_seen, 1);
    assert_eq!(metrics.fixes_attempted, 1);
    assert_eq!(metrics.fixes_applied, 1);
    assert!((metrics.success_ratio() - 1.0).abs() < f64::EPSILON);
}

#[tokio::test]
async fn failed_fix_keeps_diagnostic() {
    let tmp = tempfile::tempdir().expect("should create temp dir");
    let (mut session, mut rx) = session_in(tmp.path());

    session.ingest_chunk(&format!("{TS_LINE}\n")).await;
    let ids = observed_ids(&drain(&mut rx));

    let result = session.fix(&ids[0], false).await;
    assert!(!result.success);
    assert!(session.get(&ids[0]).is_some());
    assert_eq!(session.metrics().fixes_attempted, 1);
    assert_eq!(session.metrics().fixes_applied, 0);
}

#[tokio::test]
async fn unknown_id_is_reported() {
    let tmp = tempfile::tempdir().expect("should create temp dir");
    let (mut session, _rx) = session_in(tmp.path());

    let result = session.fix("no-such-id", false).await;
    assert!(!result.success);
    assert!(result
        .error
        .as_deref()
        .is_some_and(|e| e.contains("Unknown diagnostic")));
    assert_eq!(session.metrics().fixes_attempted, 0);
    assert!(session.metrics().success_ratio().abs() < f64::EPSILON);
}

#[tokio::test]
async fn auto_fix_applies_safe_fixes_on_arrival() {
    let tmp = tempfile::tempdir().expect("should create temp dir");
    write_app(tmp.path());
    let (mut session, mut rx) = session_in(tmp.path());
    session.set_auto_fix(true);

    session.ingest_chunk(&format!("{LINT_LINE}\n")).await;

    let events = drain(&mut rx);
    assert_eq!(observed_ids(&events).len(), 1);
    assert!(events
        .iter()
        .any(|e| matches!(e, SessionEvent::DiagnosticResolved { .. })));
    assert!(session.diagnostics(&DiagnosticFilter::default()).is_empty());
    assert_eq!(session.metrics().fixes_applied, 1);
}

// ---------------------------------------------------------------------------
// Lifecycle
// ---------------------------------------------------------------------------

#[cfg(unix)]
#[tokio::test]
async fn supervised_output_flows_into_live_map() {
    let tmp = tempfile::tempdir().expect("should create temp dir");
    let script = "echo 'Ready in 1s'; \
                  echo \"src/a.ts(1,1): error TS2304: Cannot find name 'x'.\"; \
                  exec sleep 30";
    let config = DevwatchConfig {
        server: ServerConfig {
            program: "sh".to_owned(),
            args: vec!["-c".to_owned(), script.to_owned()],
            startup_timeout_secs: 5,
            stop_grace_secs: 2,
            ..ServerConfig::default()
        },
        ..DevwatchConfig::default()
    };
    let (mut session, mut rx) = Session::new(&config, tmp.path().to_path_buf());

    session.start().await.expect("server should start");
    assert!(session.supervisor().is_running());

    while session.diagnostics(&DiagnosticFilter::default()).is_empty() {
        let event = tokio::time::timeout(Duration::from_secs(10), session.next_event())
            .await
            .expect("supervisor should keep producing events")
            .expect("supervisor channel should stay open");
        session.handle_event(event).await;
    }

    let all = session.diagnostics(&DiagnosticFilter::default());
    assert_eq!(all[0].diagnostic.code.as_deref(), Some("TS2304"));

    session.stop().await.expect("server should stop");
    let events = drain(&mut rx);
    assert!(matches!(
        events.first(),
        Some(SessionEvent::Lifecycle(Lifecycle::Started { port: 3000 }))
    ));
    assert!(events.contains(&SessionEvent::Lifecycle(Lifecycle::Stopped)));
}
