//! # Per-Channel Reading Buffer
//!
//! This module provides the ordered in-memory store that sits between a
//! channel's producer (the meter read loop) and its consumer (the
//! transmission cycle). A single mutex guards every operation; no I/O ever
//! happens under the lock. Consumers work on a cloned batch snapshot and
//! commit results back by slot sequence number, so the lock is released
//! during network calls.
//!
//! ## Features
//!
//! - Append-only ordering with monotonically increasing slot sequence numbers
//! - Tombstones instead of immediate removal, so a failed send loses nothing
//! - A sent watermark separating acknowledged history from pending readings
//! - Bounded capacity that only ever evicts already-transmitted entries
//! - A retention floor (`keep`) of recent history for the diagnostics surface
//! - Optional resampling (time-weighted average, maximum, sum) before sending
//!
//! ## Usage
//!
//! ```rust
//! use meterlog_rs::buffer::{Buffer, BufferConfig, ScanDecision};
//! use meterlog_rs::reading::{Reading, ReadingIdentifier, ReadingTime};
//!
//! let buffer = Buffer::new(BufferConfig::default());
//! buffer
//!     .push(Reading::new(1.0, ReadingTime::from_secs(0), ReadingIdentifier::Nil))
//!     .unwrap();
//!
//! let batch = buffer.collect_batch(|_| ScanDecision::Send);
//! // ... ship the batch without holding the lock ...
//! buffer.mark_sent(&batch);
//! buffer.clean(true);
//! ```

use std::collections::VecDeque;
use std::sync::Mutex;

use serde::{Deserialize, Serialize};

use crate::error::MeterLogError;
use crate::reading::{Reading, ReadingTime};

/// How a buffer condenses its pending readings before transmission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AggregationMode {
    /// Ship every reading as-is.
    #[default]
    None,
    /// Time-weighted average; each value is weighted by the time until the
    /// next sample, and the newest (still open) sample is carried into the
    /// next window.
    Avg,
    /// Maximum of the pending values.
    Max,
    /// Sum of the pending values.
    Sum,
}

/// Tuning knobs for one buffer.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BufferConfig {
    /// Resampling applied by [`Buffer::aggregate`].
    pub mode: AggregationMode,
    /// How many of the newest entries survive [`Buffer::clean`] regardless
    /// of their sent state. This is the history the local diagnostics
    /// surface can still show after a flush.
    pub keep: usize,
    /// Hard bound on stored entries. Reaching it evicts old transmitted
    /// entries first and rejects new readings when nothing is evictable.
    pub capacity: usize,
}

impl Default for BufferConfig {
    fn default() -> Self {
        BufferConfig {
            mode: AggregationMode::None,
            keep: 32,
            capacity: 4096,
        }
    }
}

/// Verdict of a batch-scan policy for one pending reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanDecision {
    /// Clone the reading into the outgoing batch.
    Send,
    /// Consume the reading without sending it (duplicate suppression).
    Suppress,
}

/// One batch member: a cloned reading plus the sequence number used to
/// commit its fate after the network call.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchEntry {
    pub seq: u64,
    pub reading: Reading,
}

struct Slot {
    seq: u64,
    reading: Reading,
}

struct Inner {
    slots: VecDeque<Slot>,
    /// Next sequence number to assign; starts at 1 so a watermark of 0
    /// means "nothing acknowledged yet".
    next_seq: u64,
    /// Highest sequence number acknowledged by the collector.
    watermark: u64,
    /// The still-open sample excluded from the previous averaging window,
    /// kept with its original value and timestamp to seed the next one.
    last_agg: Option<(f64, ReadingTime)>,
    /// Count of non-tombstoned entries.
    live: usize,
}

/// Ordered, bounded, mutex-guarded store for one channel's readings.
pub struct Buffer {
    inner: Mutex<Inner>,
    mode: AggregationMode,
    keep: usize,
    capacity: usize,
}

impl Buffer {
    pub fn new(config: BufferConfig) -> Self {
        Buffer {
            inner: Mutex::new(Inner {
                slots: VecDeque::new(),
                next_seq: 1,
                watermark: 0,
                last_agg: None,
                live: 0,
            }),
            mode: config.mode,
            keep: config.keep,
            capacity: config.capacity,
        }
    }

    /// Appends a reading and returns its sequence number.
    ///
    /// At capacity, the oldest entry that is both outside the retention
    /// floor and already transmitted is evicted to make room. When no entry
    /// qualifies the push is rejected; unsent readings are never discarded
    /// to admit new ones.
    pub fn push(&self, reading: Reading) -> Result<u64, MeterLogError> {
        let mut guard = self.inner.lock().unwrap();
        let inner = &mut *guard;

        if inner.slots.len() >= self.capacity {
            let protected_from = inner.slots.len().saturating_sub(self.keep);
            let victim = inner
                .slots
                .iter()
                .take(protected_from)
                .position(|slot| slot.reading.deleted || slot.seq <= inner.watermark);
            match victim {
                Some(idx) => {
                    if let Some(slot) = inner.slots.remove(idx) {
                        if !slot.reading.deleted {
                            inner.live -= 1;
                        }
                    }
                }
                None => {
                    return Err(MeterLogError::BufferFull(format!(
                        "capacity {} reached with no evictable entry",
                        self.capacity
                    )));
                }
            }
        }

        let seq = inner.next_seq;
        inner.next_seq += 1;
        inner.slots.push_back(Slot { seq, reading });
        inner.live += 1;
        Ok(seq)
    }

    /// Walks the pending readings in order and builds an outgoing batch.
    ///
    /// The policy sees each live reading exactly once, oldest first.
    /// `Send` clones the reading into the batch; `Suppress` tombstones it
    /// in place. The returned batch is a snapshot: the lock is released
    /// when this returns, and the caller commits via [`Buffer::mark_sent`].
    pub fn collect_batch<F>(&self, mut decide: F) -> Vec<BatchEntry>
    where
        F: FnMut(&Reading) -> ScanDecision,
    {
        let mut guard = self.inner.lock().unwrap();
        let inner = &mut *guard;
        let mut batch = Vec::new();
        for slot in inner.slots.iter_mut() {
            if slot.reading.deleted {
                continue;
            }
            match decide(&slot.reading) {
                ScanDecision::Send => batch.push(BatchEntry {
                    seq: slot.seq,
                    reading: slot.reading.clone(),
                }),
                ScanDecision::Suppress => {
                    slot.reading.deleted = true;
                    inner.live -= 1;
                }
            }
        }
        batch
    }

    /// Acknowledges a transmitted batch: every member is tombstoned and the
    /// sent watermark advances to the batch's highest sequence number.
    pub fn mark_sent(&self, batch: &[BatchEntry]) {
        if batch.is_empty() {
            return;
        }
        let mut guard = self.inner.lock().unwrap();
        let inner = &mut *guard;
        let mut max_seq = inner.watermark;
        for entry in batch {
            if let Ok(idx) = inner
                .slots
                .binary_search_by(|slot| slot.seq.cmp(&entry.seq))
            {
                let slot = &mut inner.slots[idx];
                if !slot.reading.deleted {
                    slot.reading.deleted = true;
                    inner.live -= 1;
                }
            }
            max_seq = max_seq.max(entry.seq);
        }
        inner.watermark = max_seq;
    }

    /// Tombstones a single entry without advancing the watermark. Used when
    /// the collector reports a conflict for one specific reading.
    pub fn mark_deleted(&self, seq: u64) -> bool {
        let mut guard = self.inner.lock().unwrap();
        let inner = &mut *guard;
        if let Ok(idx) = inner.slots.binary_search_by(|slot| slot.seq.cmp(&seq)) {
            let slot = &mut inner.slots[idx];
            if !slot.reading.deleted {
                slot.reading.deleted = true;
                inner.live -= 1;
            }
            return true;
        }
        false
    }

    /// Compacts the buffer while sparing the `keep` newest entries.
    ///
    /// Outside that retention floor, tombstoned entries are always removed;
    /// with `remove_old` set, entries at or below the sent watermark are
    /// removed as well. Pending readings above the watermark are never
    /// touched.
    pub fn clean(&self, remove_old: bool) {
        let mut guard = self.inner.lock().unwrap();
        let inner = &mut *guard;
        let protected_from = inner.slots.len().saturating_sub(self.keep);
        let watermark = inner.watermark;
        let mut idx = 0;
        inner.slots.retain(|slot| {
            let in_floor = idx >= protected_from;
            idx += 1;
            if in_floor {
                return true;
            }
            if slot.reading.deleted {
                return false;
            }
            !(remove_old && slot.seq <= watermark)
        });
        inner.live = inner
            .slots
            .iter()
            .filter(|slot| !slot.reading.deleted)
            .count();
    }

    /// Condenses the pending readings according to the configured mode.
    ///
    /// All modes collapse the live entries into one synthetic reading at
    /// the newest sample's slot and tombstone the rest. With
    /// `fixed_interval` and a positive `aggtime_secs`, the synthetic
    /// reading is stamped at the end of its containing interval.
    ///
    /// In `Avg` mode the newest sample never enters the weighted window:
    /// its end time is unknown until the next sample arrives, so it is
    /// parked (with its original value and timestamp) to open the next
    /// window instead.
    pub fn aggregate(&self, aggtime_secs: i64, fixed_interval: bool) {
        if self.mode == AggregationMode::None {
            return;
        }
        let mut guard = self.inner.lock().unwrap();
        let inner = &mut *guard;

        let live_idx: Vec<usize> = inner
            .slots
            .iter()
            .enumerate()
            .filter(|(_, slot)| !slot.reading.deleted)
            .map(|(i, _)| i)
            .collect();
        let newest = match live_idx.last() {
            Some(&i) => i,
            None => return,
        };
        let newest_time = inner.slots[newest].reading.time;

        let value = match self.mode {
            AggregationMode::Avg => {
                if let Some((_, parked_time)) = inner.last_agg {
                    // Nothing newer than the parked sample: the window has
                    // not moved, leave the buffer alone.
                    if newest_time <= parked_time {
                        return;
                    }
                }
                let mut samples: Vec<(f64, ReadingTime)> =
                    Vec::with_capacity(live_idx.len() + 1);
                if let Some(parked) = inner.last_agg {
                    samples.push(parked);
                }
                for &i in &live_idx {
                    let r = &inner.slots[i].reading;
                    samples.push((r.value, r.time));
                }
                let value = if samples.len() == 1 {
                    samples[0].0
                } else {
                    let mut weighted = 0.0;
                    let mut span = 0.0;
                    for pair in samples.windows(2) {
                        let w = pair[1].1.seconds_since(&pair[0].1);
                        weighted += pair[0].0 * w;
                        span += w;
                    }
                    if span > 0.0 {
                        weighted / span
                    } else {
                        // All samples share one timestamp; last write wins.
                        samples[samples.len() - 1].0
                    }
                };
                inner.last_agg = Some((inner.slots[newest].reading.value, newest_time));
                value
            }
            AggregationMode::Max => live_idx
                .iter()
                .map(|&i| inner.slots[i].reading.value)
                .fold(f64::NEG_INFINITY, f64::max),
            AggregationMode::Sum => live_idx.iter().map(|&i| inner.slots[i].reading.value).sum(),
            AggregationMode::None => unreachable!(),
        };

        for &i in &live_idx {
            if i != newest {
                inner.slots[i].reading.deleted = true;
            }
        }
        let slot = &mut inner.slots[newest];
        slot.reading.value = value;
        if fixed_interval && aggtime_secs > 0 {
            let aligned = (slot.reading.time.secs().div_euclid(aggtime_secs) + 1) * aggtime_secs;
            slot.reading.time = ReadingTime::from_secs(aligned);
        }
        inner.live = 1;
    }

    /// Bounded textual snapshot of everything still buffered, retained
    /// history included, e.g. `[2.00|3.50|4.00]`.
    pub fn dump(&self, max_len: usize) -> Result<String, MeterLogError> {
        let guard = self.inner.lock().unwrap();
        let mut out = String::from("[");
        for (i, slot) in guard.slots.iter().enumerate() {
            if i > 0 {
                out.push('|');
            }
            out.push_str(&format!("{:.2}", slot.reading.value));
        }
        out.push(']');
        if out.len() > max_len {
            return Err(MeterLogError::DumpOverflow {
                needed: out.len(),
                limit: max_len,
            });
        }
        Ok(out)
    }

    /// Count of pending (non-tombstoned) readings.
    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().live
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Count of all stored entries, retained tombstones included.
    pub fn physical_len(&self) -> usize {
        self.inner.lock().unwrap().slots.len()
    }

    /// Clones the pending readings in order.
    pub fn live_readings(&self) -> Vec<Reading> {
        self.inner
            .lock()
            .unwrap()
            .slots
            .iter()
            .filter(|slot| !slot.reading.deleted)
            .map(|slot| slot.reading.clone())
            .collect()
    }

    /// Clones every stored reading in order, tombstones included.
    pub fn all_readings(&self) -> Vec<Reading> {
        self.inner
            .lock()
            .unwrap()
            .slots
            .iter()
            .map(|slot| slot.reading.clone())
            .collect()
    }
}
