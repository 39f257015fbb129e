//! Tests for `src/logging.rs`.

use warden::config::LoggingConfig;
use warden::logging::LoggingGuard;

#[test]
fn logging_guard_is_send() {
    fn assert_send<T: Send>() {}
    assert_send::<LoggingGuard>();
}

// The global subscriber can only be installed once per process, so this is
// the only test in the binary that initialises logging.
#[test]
fn file_logging_creates_logs_dir() {
    let tmp = tempfile::tempdir().expect("should create temp dir");
    let logs_dir = tmp.path().join("logs");
    assert!(!logs_dir.exists());

    let guard = warden::logging::init_server(&LoggingConfig {
        dir: Some(logs_dir.clone()),
    })
    .expect("logging should initialise");
    assert!(guard.is_some());
    assert!(logs_dir.exists(), "logs directory should be created");
}
