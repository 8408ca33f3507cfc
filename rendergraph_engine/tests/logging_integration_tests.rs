//! Integration tests for the engine logging system
//!
//! No GPU required.
//!
//! Run with: cargo test --test logging_integration_tests

use rendergraph_engine::rendergraph::{Engine, Error};
use rendergraph_engine::rendergraph::log::{Logger, LogEntry, LogSeverity};
use rendergraph_engine::{engine_err, engine_info, engine_warn};
use std::sync::{Arc, Mutex};
use serial_test::serial;

// ============================================================================
// TEST LOGGER IMPLEMENTATION
// ============================================================================

/// Captures entries whose source starts with "test"
struct TestLogger {
    entries: Arc<Mutex<Vec<LogEntry>>>,
}

impl TestLogger {
    fn new() -> (Self, Arc<Mutex<Vec<LogEntry>>>) {
        let entries = Arc::new(Mutex::new(Vec::new()));
        (Self { entries: entries.clone() }, entries)
    }
}

impl Logger for TestLogger {
    fn log(&self, entry: &LogEntry) {
        if entry.source.starts_with("test") {
            self.entries.lock().unwrap().push(entry.clone());
        }
    }
}

// ============================================================================
// LOGGING TESTS
// ============================================================================

#[test]
#[serial]
fn test_integration_custom_logger() {
    let (test_logger, entries) = TestLogger::new();
    Engine::set_logger(test_logger);
    Engine::set_min_severity(LogSeverity::Trace);

    Engine::log(LogSeverity::Info, "test::graph", "Graph built".to_string());
    Engine::log(LogSeverity::Warn, "test::graph", "Unused set".to_string());

    let captured = entries.lock().unwrap().clone();
    assert_eq!(captured.len(), 2);
    assert_eq!(captured[0].severity, LogSeverity::Info);
    assert_eq!(captured[0].source, "test::graph");
    assert_eq!(captured[0].message, "Graph built");
    assert_eq!(captured[1].severity, LogSeverity::Warn);
    assert_eq!(captured[0].file, None);

    Engine::reset_logger();
}

#[test]
#[serial]
fn test_integration_error_logging_with_location() {
    let (test_logger, entries) = TestLogger::new();
    Engine::set_logger(test_logger);

    Engine::log_detailed(
        LogSeverity::Error,
        "test::error",
        "Frame fence lost".to_string(),
        "frame_loop.rs",
        42,
    );

    let captured = entries.lock().unwrap().clone();
    assert_eq!(captured.len(), 1);
    assert_eq!(captured[0].file, Some("frame_loop.rs"));
    assert_eq!(captured[0].line, Some(42));

    Engine::reset_logger();
}

#[test]
#[serial]
fn test_integration_engine_err_logs_and_builds_error() {
    let (test_logger, entries) = TestLogger::new();
    Engine::set_logger(test_logger);

    let error = engine_err!("test::vulkan", "Failed to create fence: {}", "ERROR_DEVICE_LOST");

    assert!(matches!(&error, Error::BackendError(message) if message == "Failed to create fence: ERROR_DEVICE_LOST"));
    let captured = entries.lock().unwrap().clone();
    assert_eq!(captured.len(), 1);
    assert_eq!(captured[0].severity, LogSeverity::Error);
    assert!(captured[0].file.is_some());
    assert!(captured[0].line.is_some());

    Engine::reset_logger();
}

#[test]
#[serial]
fn test_integration_min_severity_filters_entries() {
    let (test_logger, entries) = TestLogger::new();
    Engine::set_logger(test_logger);
    Engine::set_min_severity(LogSeverity::Warn);

    engine_info!("test::filter", "dropped");
    engine_warn!("test::filter", "kept {}", 1);

    let captured = entries.lock().unwrap().clone();
    assert_eq!(captured.len(), 1);
    assert_eq!(captured[0].message, "kept 1");

    Engine::set_min_severity(LogSeverity::Trace);
    Engine::reset_logger();
}

#[test]
#[serial]
fn test_integration_logger_reset() {
    let (test_logger, entries) = TestLogger::new();
    Engine::set_logger(test_logger);

    Engine::log(LogSeverity::Info, "test", "Message 1".to_string());
    assert_eq!(entries.lock().unwrap().len(), 1);

    Engine::reset_logger();

    // Goes to the console logger
    Engine::log(LogSeverity::Info, "test", "Message 2".to_string());
    assert_eq!(entries.lock().unwrap().len(), 1);
}
