//! # Random-Walk Meter
//!
//! Simulated device producing a bounded random walk. Used in example
//! configurations, demos, and load tests; it exercises the full pipeline
//! without hardware.

use async_trait::async_trait;
use rand::Rng;

use super::Meter;
use crate::error::MeterLogError;
use crate::reading::{Reading, ReadingIdentifier, ReadingTime};

pub struct RandomMeter {
    min: f64,
    max: f64,
    value: f64,
}

impl RandomMeter {
    /// Starts the walk at the middle of `[min, max]`.
    pub fn new(min: f64, max: f64) -> Self {
        RandomMeter {
            min,
            max,
            value: (min + max) / 2.0,
        }
    }
}

#[async_trait]
impl Meter for RandomMeter {
    async fn open(&mut self) -> Result<(), MeterLogError> {
        Ok(())
    }

    async fn close(&mut self) -> Result<(), MeterLogError> {
        Ok(())
    }

    async fn read(&mut self, _max: usize) -> Result<Vec<Reading>, MeterLogError> {
        let step = {
            let mut rng = rand::thread_rng();
            rng.gen_range(-1.0..=1.0) * (self.max - self.min) * 0.05
        };
        self.value = (self.value + step).clamp(self.min, self.max);
        Ok(vec![Reading::new(
            self.value,
            ReadingTime::now(),
            ReadingIdentifier::Nil,
        )])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_walk_stays_in_bounds() {
        let mut meter = RandomMeter::new(10.0, 20.0);
        meter.open().await.unwrap();
        for _ in 0..200 {
            let readings = meter.read(1).await.unwrap();
            assert_eq!(readings.len(), 1);
            assert!(readings[0].value >= 10.0);
            assert!(readings[0].value <= 20.0);
        }
        meter.close().await.unwrap();
    }
}
