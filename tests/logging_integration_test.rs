// Integration test for logger initialization.
// Installs the global subscriber, so this binary holds a single test.

use std::fs;

use tempfile::TempDir;
use tracing::{info, instrument, warn};

use convergence_engine::infrastructure::logging::{LogConfig, LogFormat, LoggerImpl, RotationPolicy};

#[instrument]
fn score_window(key: &str, events: usize) -> usize {
    info!(events, "scoring window");
    events * 2
}

#[test]
fn test_file_logging_writes_json_lines() {
    let temp_dir = TempDir::new().unwrap();
    let config = LogConfig {
        level: "info".to_string(),
        format: LogFormat::Json,
        log_dir: Some(temp_dir.path().to_path_buf()),
        enable_stdout: false,
        rotation: RotationPolicy::Never,
        file_name: "convergence-engine.log".to_string(),
    };

    let logger = LoggerImpl::init(&config).unwrap();

    info!(key = "session-a", "semantic payload refreshed");
    warn!(key = "session-a", "keeping previous payload");
    assert_eq!(score_window("session-a", 3), 6);

    // A second global subscriber is refused
    assert!(LoggerImpl::init(&config).is_err());

    // Dropping the guard flushes the non-blocking writer
    drop(logger);

    let contents = fs::read_to_string(temp_dir.path().join("convergence-engine.log")).unwrap();
    let lines: Vec<serde_json::Value> = contents
        .lines()
        .map(|line| serde_json::from_str(line).expect("every line is JSON"))
        .collect();

    assert!(lines.iter().any(|l| l["fields"]["message"] == "semantic payload refreshed"));
    assert!(lines.iter().any(|l| l["level"] == "WARN"));
    let in_window_span = |l: &serde_json::Value| {
        l["fields"]["message"] == "scoring window" && l["span"]["name"] == "score_window"
    };
    assert!(lines.iter().any(|l| in_window_span(l)));
}
