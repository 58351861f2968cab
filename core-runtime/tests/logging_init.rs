//! Global subscriber installation can only happen once per process, so it
//! gets its own integration-test binary.

use core_runtime::logging::{init_logging, LogOptions, LogStyle};
use tracing::Level;

#[test]
fn test_init_logging_once_then_rejects_reinit() {
    let options = LogOptions::default()
        .style(LogStyle::Json)
        .level(Level::DEBUG);
    init_logging(options.clone()).expect("first init should succeed");

    tracing::info!(account_id = "google:1", "logging initialized");

    let err = init_logging(options).expect_err("second init must fail");
    assert!(err.to_string().contains("already initialized"));
}
