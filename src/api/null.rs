//! # Null Collector
//!
//! Accepts and discards every batch. Useful for draining a meter during
//! commissioning and for dry runs of a configuration without a reachable
//! collector.

use async_trait::async_trait;

use super::{Collector, SendError};
use crate::buffer::BatchEntry;
use crate::logging::log_debug;

pub struct NullCollector {
    uuid: String,
}

impl NullCollector {
    pub fn new(uuid: &str) -> Self {
        NullCollector {
            uuid: uuid.to_string(),
        }
    }
}

#[async_trait]
impl Collector for NullCollector {
    async fn register_device(&self) -> Result<(), SendError> {
        Ok(())
    }

    async fn send(&self, batch: &[BatchEntry]) -> Result<(), SendError> {
        log_debug(&format!(
            "null collector: discarding {} readings for {}",
            batch.len(),
            self.uuid
        ));
        Ok(())
    }

    fn backend(&self) -> &'static str {
        "null"
    }
}
