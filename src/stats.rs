//! # Per-Channel Statistics
//!
//! This module provides counters tracking what happened to a channel's
//! readings between the meter and the collector. Counters are plain atomics
//! so the producer thread, the send loop, and a diagnostics caller can all
//! touch them without locking, and they export to a JSON-friendly snapshot
//! for monitoring.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

/// Event counters for one channel.
#[derive(Debug, Default)]
pub struct ChannelStats {
    pushed: AtomicU64,
    dropped: AtomicU64,
    suppressed: AtomicU64,
    sent: AtomicU64,
    send_failures: AtomicU64,
    conflicts: AtomicU64,
}

impl ChannelStats {
    pub fn new() -> Self {
        ChannelStats::default()
    }

    /// A reading was admitted into the buffer.
    pub fn note_pushed(&self) {
        self.pushed.fetch_add(1, Ordering::Relaxed);
    }

    /// A reading was rejected because the buffer was full.
    pub fn note_dropped(&self) {
        self.dropped.fetch_add(1, Ordering::Relaxed);
    }

    /// Readings consumed by duplicate suppression without being sent.
    pub fn note_suppressed(&self, count: u64) {
        self.suppressed.fetch_add(count, Ordering::Relaxed);
    }

    /// Readings acknowledged by the collector.
    pub fn note_sent(&self, count: u64) {
        self.sent.fetch_add(count, Ordering::Relaxed);
    }

    /// A transmission cycle failed (retryable or permanent).
    pub fn note_send_failure(&self) {
        self.send_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// The collector rejected one reading as already present.
    pub fn note_conflict(&self) {
        self.conflicts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn pushed(&self) -> u64 {
        self.pushed.load(Ordering::Relaxed)
    }

    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    pub fn suppressed(&self) -> u64 {
        self.suppressed.load(Ordering::Relaxed)
    }

    pub fn sent(&self) -> u64 {
        self.sent.load(Ordering::Relaxed)
    }

    pub fn send_failures(&self) -> u64 {
        self.send_failures.load(Ordering::Relaxed)
    }

    pub fn conflicts(&self) -> u64 {
        self.conflicts.load(Ordering::Relaxed)
    }

    /// Snapshot for serialization.
    pub fn export(&self, channel: &str, uuid: &str) -> ChannelStatsExport {
        ChannelStatsExport {
            channel: channel.to_string(),
            uuid: uuid.to_string(),
            pushed: self.pushed(),
            dropped: self.dropped(),
            suppressed: self.suppressed(),
            sent: self.sent(),
            send_failures: self.send_failures(),
            conflicts: self.conflicts(),
        }
    }
}

/// Exportable channel statistics (for serialization).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelStatsExport {
    pub channel: String,
    pub uuid: String,
    pub pushed: u64,
    pub dropped: u64,
    pub suppressed: u64,
    pub sent: u64,
    pub send_failures: u64,
    pub conflicts: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_accumulate() {
        let stats = ChannelStats::new();
        stats.note_pushed();
        stats.note_pushed();
        stats.note_suppressed(3);
        stats.note_sent(2);
        stats.note_send_failure();
        stats.note_conflict();
        stats.note_dropped();

        assert_eq!(stats.pushed(), 2);
        assert_eq!(stats.suppressed(), 3);
        assert_eq!(stats.sent(), 2);
        assert_eq!(stats.send_failures(), 1);
        assert_eq!(stats.conflicts(), 1);
        assert_eq!(stats.dropped(), 1);
    }

    #[test]
    fn test_export_snapshot() {
        let stats = ChannelStats::new();
        stats.note_sent(5);
        let export = stats.export("chn0", "abc-123");
        assert_eq!(export.channel, "chn0");
        assert_eq!(export.uuid, "abc-123");
        assert_eq!(export.sent, 5);

        let json = serde_json::to_string(&export).unwrap();
        assert!(json.contains("\"sent\":5"));
    }
}
