//! # Meter Logger Error Handling
//!
//! This module defines the MeterLogError enum, which represents the different
//! error types that can occur in the meterlog-rs crate.

use thiserror::Error;

/// Represents the different error types that can occur in the meter logger.
#[derive(Debug, Error)]
pub enum MeterLogError {
    /// Indicates an invalid or inconsistent configuration.
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Indicates a channel identifier string that could not be resolved.
    #[error("Invalid identifier: {0}")]
    InvalidIdentifier(String),

    /// Indicates a buffer at capacity with no evictable entry.
    #[error("Buffer full: {0}")]
    BufferFull(String),

    /// Indicates a dump snapshot that does not fit the caller's bound.
    #[error("Dump overflow: need {needed} bytes, limit is {limit}")]
    DumpOverflow { needed: usize, limit: usize },

    /// Indicates an error reported by a meter driver.
    #[error("Meter error: {0}")]
    MeterError(String),

    /// Indicates an error related to the serial port communication.
    #[error("Serial port error: {0}")]
    SerialPortError(String),

    /// Indicates an error while building a collector client.
    #[error("Collector setup error: {0}")]
    CollectorSetupError(String),

    /// Indicates a nom parsing error.
    #[error("Parse error: {0}")]
    ParseError(String),

    /// Indicates an I/O error.
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// Indicates a JSON serialization or deserialization error.
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    /// A catch-all error for uncategorized cases.
    #[error("Other error: {0}")]
    Other(String),
}
