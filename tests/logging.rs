//! Log file routing. One test per binary since the subscriber is global.

use std::fs;

use ingestd::config::LoggingConfig;
use ingestd::observability::logging::{init_logging, LogTarget, Severity};

#[test]
fn events_are_routed_to_files_by_level() {
    let dir = tempfile::tempdir().unwrap();
    let config = LoggingConfig {
        severity: Severity::Debug,
        directory: Some(dir.path().to_path_buf()),
    };

    let guard = init_logging(&config).unwrap();
    tracing::error!("disk on fire");
    tracing::warn!("disk warm");
    tracing::info!("accepted client");
    tracing::debug!("read 12 bytes");
    tracing::trace!("poll returned");
    guard.shutdown();

    let read = |target: LogTarget| fs::read_to_string(dir.path().join(target.file_name())).unwrap();

    let errors = read(LogTarget::Errors);
    assert!(errors.contains("disk on fire"));
    assert!(errors.contains("disk warm"));
    assert!(!errors.contains("accepted client"));

    let status = read(LogTarget::Status);
    assert!(status.contains("Initialized log service"));
    assert!(status.contains("accepted client"));
    assert!(status.contains("Shutting down log service"));
    assert!(!status.contains("disk on fire"));

    let debug = read(LogTarget::Debug);
    assert!(debug.contains("read 12 bytes"));
    assert!(!debug.contains("poll returned"));
    assert!(!debug.contains("accepted client"));
}
