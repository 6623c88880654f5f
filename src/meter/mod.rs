//! # Meter Drivers
//!
//! This module defines the Meter trait, the boundary between the scheduler's
//! read loops and the physical devices, along with a set of reference
//! drivers: a random walk for demos and load tests, a line-format file
//! reader for replays and FIFOs, and a raw serial line reader.
//!
//! Protocol decoders (D0/SML framing, Modbus register maps, OCR) are
//! deliberately not part of this crate; a real device integration
//! implements this trait out of tree.

pub mod file;
pub mod mock;
pub mod random;
pub mod serial;

use async_trait::async_trait;

use crate::error::MeterLogError;
use crate::reading::Reading;

/// A physical (or simulated) metering device.
#[async_trait]
pub trait Meter: Send {
    /// Acquires the underlying resource (port, file, ...).
    async fn open(&mut self) -> Result<(), MeterLogError>;

    /// Releases the underlying resource.
    async fn close(&mut self) -> Result<(), MeterLogError>;

    /// Produces up to `max` readings. Returning fewer, or none at all on a
    /// quiet device, is normal and not an error.
    async fn read(&mut self, max: usize) -> Result<Vec<Reading>, MeterLogError>;

    /// Whether the device tolerates being polled on an interval. Devices
    /// that push data on their own schedule return `false` and are read
    /// continuously instead.
    fn allow_interval(&self) -> bool {
        true
    }
}
