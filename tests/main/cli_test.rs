//! CLI contract tests against the built binary.

use assert_cmd::Command;

fn devwatch() -> Command {
    match Command::cargo_bin("devwatch") {
        Ok(cmd) => cmd,
        Err(err) => panic!("devwatch binary should build: {err}"),
    }
}

fn stdout_of(cmd: &mut Command) -> String {
    let output = cmd.output().expect("devwatch should run");
    assert!(
        output.status.success(),
        "devwatch failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    String::from_utf8_lossy(&output.stdout).into_owned()
}

#[test]
fn help_lists_subcommands() {
    let out = stdout_of(devwatch().arg("--help"));
    assert!(out.contains("start"));
    assert!(out.contains("classify"));
    assert!(out.contains("backups"));
}

#[test]
fn classify_prints_ranked_json() {
    let tmp = tempfile::tempdir().expect("should create temp dir");
    let log = tmp.path().join("dev.log");
    std::fs::write(
        &log,
        "\u{1b}[31mButton.tsx(10,15): error TS2322: Type 'string' is not assignable to type 'number'.\u{1b}[0m\n\
         ready - started server on 0.0.0.0:3000\n",
    )
    .expect("should write log");

    let out = stdout_of(devwatch().arg("classify").arg(&log));
    let ranked: serde_json::Value = serde_json::from_str(&out).expect("output should be JSON");
    let items = ranked.as_array().expect("output should be an array");
    assert_eq!(items.len(), 1);
    assert_eq!(items[0]["code"], "TS2322");
    assert_eq!(items[0]["priority"], 70);
    assert_eq!(items[0]["category"], "typescript");
}

#[test]
fn classify_of_clean_log_prints_empty_array() {
    let tmp = tempfile::tempdir().expect("should create temp dir");
    let log = tmp.path().join("dev.log");
    std::fs::write(&log, "compiled successfully\n").expect("should write log");

    let out = stdout_of(devwatch().arg("classify").arg(&log));
    assert_eq!(out.trim(), "[]");
}

#[test]
fn classify_missing_file_fails() {
    let tmp = tempfile::tempdir().expect("should create temp dir");
    let output = devwatch()
        .arg("classify")
        .arg(tmp.path().join("nope.log"))
        .output()
        .expect("devwatch should run");
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("failed to read log file"));
}

#[test]
fn backups_list_on_fresh_project() {
    let tmp = tempfile::tempdir().expect("should create temp dir");
    let out = stdout_of(devwatch().args(["backups", "list", "--project"]).arg(tmp.path()));
    assert!(out.contains("no backups in "));
    assert!(out.contains(".devwatch"));
}

#[test]
fn backups_verify_unknown_id_fails() {
    let tmp = tempfile::tempdir().expect("should create temp dir");
    let output = devwatch()
        .args(["backups", "verify", "backup-missing", "--project"])
        .arg(tmp.path())
        .output()
        .expect("devwatch should run");
    assert!(!output.status.success());
}

#[test]
fn backups_prune_reports_count() {
    let tmp = tempfile::tempdir().expect("should create temp dir");
    let out = stdout_of(devwatch().args(["backups", "prune", "--project"]).arg(tmp.path()));
    assert!(out.contains("removed 0 backup(s) older than 7 day(s)"));
}
