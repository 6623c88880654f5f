//! # Transmission Cycle
//!
//! This module provides the Transmitter struct, which owns one channel's
//! send side: the collector client, the duplicate-suppression state, and
//! the aggregation settings. A cycle runs aggregate, scan, ship, commit in
//! that order, and the buffer lock is never held across the network call.
//!
//! The duplicate policy keeps a cursor at the last reading placed in a
//! batch, seeded from the last member of the last acknowledged batch. A
//! pending reading is suppressed when its value equals the cursor's and it
//! arrived within the configured window; a reading sent because the window
//! expired doubles as the collector's "still alive" signal. Suppression
//! over a constant series of identical timestamps and values is therefore
//! deterministic: retrying a failed cycle rebuilds the identical batch.

use std::sync::Arc;

use crate::api::{Collector, SendError};
use crate::buffer::ScanDecision;
use crate::channel::Channel;
use crate::logging::{log_debug, log_error, log_warn};
use crate::reading::ReadingTime;

/// What one transmission cycle did.
#[derive(Debug, Clone, PartialEq)]
pub enum CycleOutcome {
    /// Nothing pending after suppression; no network call was made.
    Idle,
    /// The collector acknowledged this many readings.
    Sent(usize),
    /// Transient failure; the batch stays pending for the next cycle.
    Retry,
    /// One reading conflicted and was dropped; the rest stays pending.
    Conflict,
    /// Permanent failure; the channel should be disabled.
    Failed(String),
}

/// How a channel condenses readings before sending. The mode itself lives
/// in the buffer configuration; these are the per-cycle parameters.
#[derive(Debug, Clone, Copy, Default)]
pub struct AggregationSettings {
    /// Window length in seconds; 0 condenses whatever is pending.
    pub interval_secs: i64,
    /// Stamp synthetic readings at interval boundaries.
    pub fixed_timestamps: bool,
}

/// Owns one channel's path to its collector.
pub struct Transmitter {
    channel: Arc<Channel>,
    collector: Box<dyn Collector>,
    /// Seconds after which an exact duplicate is sent anyway; `None`
    /// suppresses duplicates indefinitely.
    duplicate_window_secs: Option<f64>,
    aggregation: AggregationSettings,
    /// Value and timestamp of the last member of the last acknowledged
    /// batch. Advances only on a fully acknowledged batch.
    prev_sent: Option<(f64, ReadingTime)>,
}

impl Transmitter {
    pub fn new(
        channel: Arc<Channel>,
        collector: Box<dyn Collector>,
        duplicate_window_secs: Option<f64>,
        aggregation: AggregationSettings,
    ) -> Self {
        Transmitter {
            channel,
            collector,
            duplicate_window_secs,
            aggregation,
            prev_sent: None,
        }
    }

    pub fn channel(&self) -> &Arc<Channel> {
        &self.channel
    }

    /// The duplicate-suppression baseline.
    pub fn prev_sent(&self) -> Option<(f64, ReadingTime)> {
        self.prev_sent
    }

    pub fn backend(&self) -> &'static str {
        self.collector.backend()
    }

    /// Announces the channel to the collector.
    pub async fn register(&self) -> Result<(), SendError> {
        self.collector.register_device().await
    }

    /// Runs one transmission cycle.
    pub async fn send_cycle(&mut self) -> CycleOutcome {
        let buffer = Arc::clone(self.channel.buffer());
        buffer.aggregate(
            self.aggregation.interval_secs,
            self.aggregation.fixed_timestamps,
        );

        let mut cursor = self.prev_sent;
        let window = self.duplicate_window_secs;
        let mut suppressed = 0u64;
        let batch = buffer.collect_batch(|reading| {
            let duplicate = match cursor {
                Some((value, time)) => {
                    reading.value == value
                        && match window {
                            Some(w) => reading.time.seconds_since(&time) < w,
                            None => true,
                        }
                }
                None => false,
            };
            if duplicate {
                suppressed += 1;
                ScanDecision::Suppress
            } else {
                cursor = Some((reading.value, reading.time));
                ScanDecision::Send
            }
        });
        if suppressed > 0 {
            self.channel.stats().note_suppressed(suppressed);
            log_debug(&format!(
                "channel {}: suppressed {suppressed} duplicate readings",
                self.channel.name()
            ));
        }

        if batch.is_empty() {
            buffer.clean(true);
            return CycleOutcome::Idle;
        }

        let outcome = match self.collector.send(&batch).await {
            Ok(()) => {
                buffer.mark_sent(&batch);
                let last = &batch[batch.len() - 1];
                self.prev_sent = Some((last.reading.value, last.reading.time));
                self.channel.stats().note_sent(batch.len() as u64);
                log_debug(&format!(
                    "channel {}: {} readings acknowledged by {} collector",
                    self.channel.name(),
                    batch.len(),
                    self.collector.backend()
                ));
                CycleOutcome::Sent(batch.len())
            }
            Err(SendError::Retryable(msg)) => {
                self.channel.stats().note_send_failure();
                log_warn(&format!(
                    "channel {}: send failed, will retry: {msg}",
                    self.channel.name()
                ));
                CycleOutcome::Retry
            }
            Err(SendError::Conflict { timestamp_ms }) => {
                let hit = batch
                    .iter()
                    .find(|entry| entry.reading.time.to_millis() == timestamp_ms);
                match hit {
                    Some(entry) => {
                        buffer.mark_deleted(entry.seq);
                        self.channel.stats().note_conflict();
                        log_warn(&format!(
                            "channel {}: collector already holds a reading at {timestamp_ms} ms, dropping ours",
                            self.channel.name()
                        ));
                        CycleOutcome::Conflict
                    }
                    None => {
                        // The collector names a timestamp we never sent;
                        // treat it like a transient failure.
                        self.channel.stats().note_send_failure();
                        log_warn(&format!(
                            "channel {}: conflict at {timestamp_ms} ms matches nothing in the batch, will retry",
                            self.channel.name()
                        ));
                        CycleOutcome::Retry
                    }
                }
            }
            Err(SendError::Permanent(msg)) => {
                self.channel.stats().note_send_failure();
                log_error(&format!(
                    "channel {}: permanent collector failure: {msg}",
                    self.channel.name()
                ));
                CycleOutcome::Failed(msg)
            }
        };
        buffer.clean(true);
        outcome
    }
}
