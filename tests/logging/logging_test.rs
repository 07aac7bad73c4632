//! Tests for `src/logging.rs`.

use devwatch::logging::{LoggingGuard, LOG_FILE_PREFIX};

#[test]
fn logging_guard_is_send() {
    fn assert_send<T: Send>() {}
    assert_send::<LoggingGuard>();
}

#[test]
fn init_production_creates_logs_dir() {
    let tmp = tempfile::tempdir().expect("should create temp dir");
    let logs_dir = tmp.path().join(".devwatch/logs");
    assert!(!logs_dir.exists());

    // The global subscriber can be installed once per process; this is the
    // only test in this binary that does it.
    let guard = match devwatch::logging::init_production(&logs_dir) {
        Ok(guard) => guard,
        Err(err) => panic!("logging should initialise: {err}"),
    };
    assert!(logs_dir.exists(), "logs directory should be created");
    assert_eq!(guard.logs_dir(), logs_dir.as_path());
    tracing::info!(component = "test", "hello from the logging test");
}

#[test]
fn log_file_prefix_is_stable() {
    assert_eq!(LOG_FILE_PREFIX, "devwatch.log");
}
