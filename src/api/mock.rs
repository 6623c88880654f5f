//! Mock collector implementation for testing
//!
//! This module provides a scripted collector that records every batch it
//! receives and replays queued outcomes, so the transmission logic can be
//! tested without a network.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use super::{Collector, SendError};
use crate::buffer::BatchEntry;

/// Collector double with scriptable outcomes.
#[derive(Clone, Default)]
pub struct MockCollector {
    /// Batches offered to `send`, as `(millis, value)` tuples, in order.
    pub sent_batches: Arc<Mutex<Vec<Vec<(i64, f64)>>>>,
    /// Outcomes to replay, oldest first; `Ok` once exhausted.
    pub outcomes: Arc<Mutex<VecDeque<Result<(), SendError>>>>,
    /// Outcomes for `register_device`; `Ok` once exhausted.
    pub register_outcomes: Arc<Mutex<VecDeque<Result<(), SendError>>>>,
    /// Number of `register_device` calls.
    pub registrations: Arc<Mutex<u32>>,
}

impl MockCollector {
    pub fn new() -> Self {
        MockCollector::default()
    }

    /// Queue the outcome of the next `send` call.
    pub fn queue_outcome(&self, outcome: Result<(), SendError>) {
        self.outcomes.lock().unwrap().push_back(outcome);
    }

    /// Queue the outcome of the next `register_device` call.
    pub fn queue_register_outcome(&self, outcome: Result<(), SendError>) {
        self.register_outcomes.lock().unwrap().push_back(outcome);
    }

    /// All batches offered so far.
    pub fn sent(&self) -> Vec<Vec<(i64, f64)>> {
        self.sent_batches.lock().unwrap().clone()
    }

    /// Number of `send` calls so far.
    pub fn send_count(&self) -> usize {
        self.sent_batches.lock().unwrap().len()
    }

    /// Clear recorded batches and scripted outcomes.
    pub fn clear(&self) {
        self.sent_batches.lock().unwrap().clear();
        self.outcomes.lock().unwrap().clear();
        self.register_outcomes.lock().unwrap().clear();
    }
}

#[async_trait]
impl Collector for MockCollector {
    async fn register_device(&self) -> Result<(), SendError> {
        *self.registrations.lock().unwrap() += 1;
        self.register_outcomes
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Ok(()))
    }

    async fn send(&self, batch: &[BatchEntry]) -> Result<(), SendError> {
        self.sent_batches.lock().unwrap().push(
            batch
                .iter()
                .map(|entry| (entry.reading.time.to_millis(), entry.reading.value))
                .collect(),
        );
        self.outcomes.lock().unwrap().pop_front().unwrap_or(Ok(()))
    }

    fn backend(&self) -> &'static str {
        "mock"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reading::{Reading, ReadingIdentifier, ReadingTime};

    fn entry(seq: u64, value: f64, secs: i64) -> BatchEntry {
        BatchEntry {
            seq,
            reading: Reading::new(value, ReadingTime::from_secs(secs), ReadingIdentifier::Nil),
        }
    }

    #[tokio::test]
    async fn test_records_batches_in_order() {
        let mock = MockCollector::new();
        mock.send(&[entry(1, 1.0, 10)]).await.unwrap();
        mock.send(&[entry(2, 2.0, 20), entry(3, 3.0, 30)])
            .await
            .unwrap();

        let sent = mock.sent();
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[0], vec![(10_000, 1.0)]);
        assert_eq!(sent[1], vec![(20_000, 2.0), (30_000, 3.0)]);
    }

    #[tokio::test]
    async fn test_replays_scripted_outcomes() {
        let mock = MockCollector::new();
        mock.queue_outcome(Err(SendError::Retryable("down".into())));

        let first = mock.send(&[entry(1, 1.0, 0)]).await;
        assert!(matches!(first, Err(SendError::Retryable(_))));

        // Script exhausted: defaults to success.
        assert!(mock.send(&[entry(2, 2.0, 1)]).await.is_ok());
    }
}
