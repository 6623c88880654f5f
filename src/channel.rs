//! # Measurement Channels
//!
//! This module provides the Channel struct, which binds one logical series
//! of readings to a collector-side UUID. A channel filters the readings its
//! meter produces by identifier, optionally turns absolute counter values
//! into deltas, and owns the buffer the transmission cycle drains.
//!
//! Channel names (`chn0`, `chn1`, ...) come from an explicit counter owned
//! by whoever constructs the channels, so embedding several registries in
//! one process cannot produce colliding names.

use std::sync::{Arc, Mutex};

use crate::buffer::{Buffer, BufferConfig};
use crate::logging::log_warn;
use crate::reading::{Reading, ReadingIdentifier};
use crate::stats::ChannelStats;

/// One logical series of readings bound to a collector UUID.
pub struct Channel {
    name: String,
    uuid: String,
    identifier: ReadingIdentifier,
    counter: bool,
    /// Last absolute value seen in counter mode.
    last: Mutex<Option<f64>>,
    buffer: Arc<Buffer>,
    stats: Arc<ChannelStats>,
}

impl Channel {
    /// Creates a channel and its buffer.
    ///
    /// With `counter` set, incoming absolute register values are stored as
    /// deltas against the previous value.
    pub fn new(
        name: impl Into<String>,
        uuid: impl Into<String>,
        identifier: ReadingIdentifier,
        counter: bool,
        buffer_config: BufferConfig,
    ) -> Self {
        Channel {
            name: name.into(),
            uuid: uuid.into(),
            identifier,
            counter,
            last: Mutex::new(None),
            buffer: Arc::new(Buffer::new(buffer_config)),
            stats: Arc::new(ChannelStats::new()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn uuid(&self) -> &str {
        &self.uuid
    }

    pub fn identifier(&self) -> &ReadingIdentifier {
        &self.identifier
    }

    pub fn is_counter(&self) -> bool {
        self.counter
    }

    pub fn buffer(&self) -> &Arc<Buffer> {
        &self.buffer
    }

    pub fn stats(&self) -> &Arc<ChannelStats> {
        &self.stats
    }

    /// Last absolute value seen in counter mode.
    pub fn last_value(&self) -> Option<f64> {
        *self.last.lock().unwrap()
    }

    /// Whether this channel wants readings carrying `identifier`.
    ///
    /// A channel configured without an identifier admits everything, which
    /// is the normal case for unaddressed single-scalar meters.
    pub fn accepts(&self, identifier: &ReadingIdentifier) -> bool {
        self.identifier == ReadingIdentifier::Nil || self.identifier == *identifier
    }

    /// Offers a raw meter reading to this channel.
    ///
    /// Returns `false` when the identifier does not match. A matching
    /// reading is admitted even when the buffer rejects it; the drop is
    /// counted and logged instead of propagated, so one saturated channel
    /// cannot stall the meter loop.
    pub fn add_reading(&self, raw: &Reading) -> bool {
        if !self.accepts(&raw.identifier) {
            return false;
        }
        let value = if self.counter {
            self.counter_delta(raw.value)
        } else {
            raw.value
        };
        let stored = Reading::new(value, raw.time, raw.identifier.clone());
        match self.buffer.push(stored) {
            Ok(_) => self.stats.note_pushed(),
            Err(e) => {
                self.stats.note_dropped();
                log_warn(&format!(
                    "channel {}: dropping reading at {}: {e}",
                    self.name, raw.time
                ));
            }
        }
        true
    }

    /// Delta against the previous absolute value. The first reading after
    /// creation has no baseline and stores 0; `last` advances on every
    /// matching reading regardless.
    fn counter_delta(&self, current: f64) -> f64 {
        let mut last = self.last.lock().unwrap();
        let delta = match *last {
            Some(prev) => current - prev,
            None => 0.0,
        };
        *last = Some(current);
        if delta < 0.0 {
            log_warn(&format!(
                "channel {}: negative delta {delta} (meter reset or rollover)",
                self.name
            ));
        }
        delta
    }
}
