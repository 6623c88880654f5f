//! Unit tests for the logging functionality in the `meterlog-rs` crate.

use meterlog_rs::logging::{
    init_logger_with_default, log_debug, log_error, log_info, log_warn,
};

/// Tests that the logging helpers work as expected after initialization.
#[test]
fn test_logging() {
    init_logger_with_default("debug");
    log_error("This is an error message");
    log_warn("This is a warning message");
    log_info("This is an info message");
    log_debug("This is a debug message");
}

/// Tests that initializing twice is harmless; the second call must not
/// panic or override the first filter.
#[test]
fn test_init_logger_is_idempotent() {
    init_logger_with_default("info");
    init_logger_with_default("trace");
}
