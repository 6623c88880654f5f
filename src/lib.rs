//! # meterlog-rs - A Buffering Data Logger for Utility Meters
//!
//! The meterlog-rs crate reads measurements from utility meters (electricity,
//! gas, water, heat) and ships them to a remote collector in batches. Its core
//! is the per-channel buffering protocol: an ordered in-memory queue with
//! tombstone-based consumption, duplicate suppression, optional resampling,
//! and retry semantics that lose nothing on a failed or partially-failed send.
//!
//! ## Features
//!
//! - Read meters through pluggable drivers (serial port, file, random walk)
//! - Fan readings out to channels by OBIS code, name, or channel number
//! - Buffer readings per channel with bounded memory and eviction of
//!   already-transmitted history only
//! - Suppress unchanged values within a configurable duplicate window
//! - Resample high-frequency readings (time-weighted average, maximum, sum)
//! - Transmit batches over HTTP or InfluxDB line protocol, with retry,
//!   conflict, and permanent-failure handling per channel
//! - Support for logging, statistics export, and error handling
//!
//! ## Usage
//!
//! To use the meterlog-rs crate in your Rust project, add the following to
//! your Cargo.toml file:
//!
//! ```toml
//! [dependencies]
//! meterlog-rs = "0.5.0"
//! ```
//!
//! Then, in your Rust code, you can import the necessary modules and
//! functions:
//!
//! ```rust
//! use meterlog_rs::{
//!     load_config, registry_from_file,
//!     Buffer, BufferConfig, Reading, ReadingIdentifier, ReadingTime,
//!     MeterLogError, init_logger, log_info,
//!     Scheduler,
//! };
//! ```

pub mod api;
pub mod buffer;
pub mod channel;
pub mod config;
pub mod error;
pub mod logging;
pub mod meter;
pub mod obis;
pub mod reading;
pub mod registry;
pub mod scheduler;
pub mod stats;
pub mod transmit;

pub use crate::error::MeterLogError;
pub use crate::logging::{init_logger, log_info};

// Core reading and buffer types
pub use buffer::{AggregationMode, BatchEntry, Buffer, BufferConfig, ScanDecision};
pub use obis::ObisCode;
pub use reading::{Reading, ReadingIdentifier, ReadingTime};

// Channel and transmission pipeline
pub use api::{Collector, SendError};
pub use channel::Channel;
pub use transmit::{AggregationSettings, CycleOutcome, Transmitter};

// Runtime assembly
pub use config::Config;
pub use registry::{MeterGroup, Registry};
pub use scheduler::Scheduler;

/// Load and validate a configuration file.
///
/// # Arguments
/// * `path` - Path to the JSON configuration
///
/// # Returns
/// * `Ok(Config)` - Parsed and validated configuration
/// * `Err(MeterLogError)` - I/O, JSON, or validation failure
pub fn load_config<P: AsRef<std::path::Path>>(path: P) -> Result<Config, MeterLogError> {
    Config::from_file(path)
}

/// Build the runtime object graph from a configuration file.
///
/// # Arguments
/// * `path` - Path to the JSON configuration
///
/// # Returns
/// * `Ok(Registry)` - Meters, channels, and transmitters, ready to start
/// * `Err(MeterLogError)` - Configuration or collector setup failure
pub fn registry_from_file<P: AsRef<std::path::Path>>(path: P) -> Result<Registry, MeterLogError> {
    let config = Config::from_file(path)?;
    Registry::from_config(&config)
}
