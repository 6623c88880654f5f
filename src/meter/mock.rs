//! Mock meter for testing.
//!
//! Serves pre-loaded batches of readings in order and can be armed to fail,
//! so scheduler and registry behavior can be tested without hardware.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use super::Meter;
use crate::error::MeterLogError;
use crate::reading::Reading;

pub struct MockMeter {
    /// Batches handed out by `read`, one per call, front first.
    pub batches: Arc<Mutex<VecDeque<Vec<Reading>>>>,
    /// Tracks whether `open` has been called (and `close` not yet).
    pub opened: Arc<Mutex<bool>>,
    /// When set, the next `read` fails with this message.
    pub next_error: Arc<Mutex<Option<String>>>,
    interval_ok: bool,
}

impl MockMeter {
    pub fn new() -> Self {
        MockMeter {
            batches: Arc::new(Mutex::new(VecDeque::new())),
            opened: Arc::new(Mutex::new(false)),
            next_error: Arc::new(Mutex::new(None)),
            interval_ok: true,
        }
    }

    /// Mock of a push-style device that must be read continuously.
    pub fn new_continuous() -> Self {
        MockMeter {
            interval_ok: false,
            ..MockMeter::new()
        }
    }

    pub fn queue_batch(&self, batch: Vec<Reading>) {
        self.batches.lock().unwrap().push_back(batch);
    }

    pub fn is_open(&self) -> bool {
        *self.opened.lock().unwrap()
    }
}

impl Default for MockMeter {
    fn default() -> Self {
        MockMeter::new()
    }
}

#[async_trait]
impl Meter for MockMeter {
    async fn open(&mut self) -> Result<(), MeterLogError> {
        *self.opened.lock().unwrap() = true;
        Ok(())
    }

    async fn close(&mut self) -> Result<(), MeterLogError> {
        *self.opened.lock().unwrap() = false;
        Ok(())
    }

    async fn read(&mut self, max: usize) -> Result<Vec<Reading>, MeterLogError> {
        if let Some(msg) = self.next_error.lock().unwrap().take() {
            return Err(MeterLogError::MeterError(msg));
        }
        let mut batch = self
            .batches
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_default();
        batch.truncate(max);
        Ok(batch)
    }

    fn allow_interval(&self) -> bool {
        self.interval_ok
    }
}
