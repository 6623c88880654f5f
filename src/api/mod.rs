//! # Collector Interfaces
//!
//! This module defines the Collector trait, the boundary between the
//! transmission cycle and whatever service ingests the readings. Backends
//! are selected per channel from the tagged `api` section of the
//! configuration and handed around as trait objects; one collector instance
//! serves exactly one channel, and no connection state is shared across
//! channels.
//!
//! The send result is deliberately ternary: success, a retryable failure
//! that leaves the batch pending, or a permanent failure that disables the
//! channel. A conflict (the collector already holds a reading at some
//! timestamp) is the one permanent failure scoped to a single batch member.

pub mod http;
pub mod influx;
pub mod mock;
pub mod null;

use async_trait::async_trait;
use thiserror::Error;

use crate::buffer::BatchEntry;
use crate::config::ApiConfig;
use crate::error::MeterLogError;

/// Why a transmission attempt did not land.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SendError {
    /// Transient failure; the same batch should be offered again later.
    #[error("Retryable collector error: {0}")]
    Retryable(String),

    /// The collector already holds a reading at this timestamp; that batch
    /// member must not be offered again.
    #[error("Duplicate timestamp at collector: {timestamp_ms} ms")]
    Conflict { timestamp_ms: i64 },

    /// Misconfiguration or a rejection that retrying cannot fix.
    #[error("Permanent collector error: {0}")]
    Permanent(String),
}

/// A measurement collector endpoint bound to one channel.
#[async_trait]
pub trait Collector: Send + Sync {
    /// Announces the channel to the collector, for backends that have such
    /// a concept. Called once before the first send cycle.
    async fn register_device(&self) -> Result<(), SendError>;

    /// Ships one batch. `Ok` means the collector durably accepted every
    /// member. Any error means nothing in the batch may be considered
    /// delivered, except the single reading named by a conflict.
    async fn send(&self, batch: &[BatchEntry]) -> Result<(), SendError>;

    /// Backend name for log lines.
    fn backend(&self) -> &'static str;
}

/// Builds the collector for one channel from its configuration.
pub fn from_config(config: &ApiConfig, uuid: &str) -> Result<Box<dyn Collector>, MeterLogError> {
    match config {
        ApiConfig::Http {
            url,
            token,
            timeout_secs,
        } => Ok(Box::new(http::HttpCollector::new(
            url,
            token.clone(),
            *timeout_secs,
            uuid,
        )?)),
        ApiConfig::Influx {
            url,
            database,
            measurement,
            username,
            password,
        } => Ok(Box::new(influx::InfluxCollector::new(
            url,
            database,
            measurement,
            username.clone(),
            password.clone(),
            uuid,
        )?)),
        ApiConfig::Null => Ok(Box::new(null::NullCollector::new(uuid))),
    }
}
