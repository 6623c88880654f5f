//! # Serial Line Meter
//!
//! Raw line-oriented serial reader: one ASCII value per line, as emitted by
//! simple pulse counters and debug taps. The device pushes data on its own
//! schedule, so this meter reports `allow_interval() == false` and is read
//! continuously. Deliberately framing-free; protocol decoders live outside
//! this crate.

use std::time::Duration;

use async_trait::async_trait;
use tokio::io::AsyncReadExt;
use tokio::time::timeout;
use tokio_serial::SerialPortBuilderExt;

use super::Meter;
use crate::error::MeterLogError;
use crate::logging::log_debug;
use crate::reading::{Reading, ReadingIdentifier, ReadingTime};

/// Configuration for the serial line meter.
#[derive(Debug, Clone)]
pub struct SerialMeterConfig {
    pub baudrate: u32,
    pub timeout: Duration,
}

impl Default for SerialMeterConfig {
    fn default() -> Self {
        SerialMeterConfig {
            baudrate: 9600,
            timeout: Duration::from_secs(2),
        }
    }
}

pub struct SerialMeter {
    port_name: String,
    config: SerialMeterConfig,
    stream: Option<tokio_serial::SerialStream>,
    /// Bytes received but not yet terminated by a newline.
    carry: String,
}

impl SerialMeter {
    pub fn new(port_name: &str) -> Self {
        Self::with_config(port_name, SerialMeterConfig::default())
    }

    pub fn with_config(port_name: &str, config: SerialMeterConfig) -> Self {
        SerialMeter {
            port_name: port_name.to_string(),
            config,
            stream: None,
            carry: String::new(),
        }
    }

    /// Drains complete lines from the carry buffer into readings.
    fn take_lines(&mut self, max: usize) -> Vec<Reading> {
        let mut readings = Vec::new();
        while readings.len() < max {
            let pos = match self.carry.find('\n') {
                Some(pos) => pos,
                None => break,
            };
            let line: String = self.carry.drain(..=pos).collect();
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            match line.parse::<f64>() {
                Ok(value) => readings.push(Reading::new(
                    value,
                    ReadingTime::now(),
                    ReadingIdentifier::Nil,
                )),
                Err(_) => log_debug(&format!("serial meter: ignoring line {line:?}")),
            }
        }
        readings
    }
}

#[async_trait]
impl Meter for SerialMeter {
    async fn open(&mut self) -> Result<(), MeterLogError> {
        let stream = tokio_serial::new(self.port_name.as_str(), self.config.baudrate)
            .data_bits(tokio_serial::DataBits::Eight)
            .stop_bits(tokio_serial::StopBits::One)
            .parity(tokio_serial::Parity::None)
            .timeout(self.config.timeout)
            .open_native_async()
            .map_err(|e| MeterLogError::SerialPortError(e.to_string()))?;
        self.stream = Some(stream);
        self.carry.clear();
        Ok(())
    }

    async fn close(&mut self) -> Result<(), MeterLogError> {
        // Dropping the stream closes the port.
        self.stream = None;
        Ok(())
    }

    async fn read(&mut self, max: usize) -> Result<Vec<Reading>, MeterLogError> {
        if self.stream.is_none() {
            return Err(MeterLogError::SerialPortError("port not open".into()));
        }
        let mut buf = [0u8; 256];
        // Bounded number of port reads per call so a noisy line cannot
        // starve the caller.
        for _ in 0..8 {
            let readings = self.take_lines(max);
            if !readings.is_empty() {
                return Ok(readings);
            }
            let stream = match self.stream.as_mut() {
                Some(s) => s,
                None => break,
            };
            let n = match timeout(self.config.timeout, stream.read(&mut buf)).await {
                Ok(Ok(n)) => n,
                Ok(Err(e)) => return Err(MeterLogError::SerialPortError(e.to_string())),
                // A quiet line is not an error.
                Err(_) => return Ok(Vec::new()),
            };
            if n == 0 {
                return Ok(Vec::new());
            }
            self.carry.push_str(&String::from_utf8_lossy(&buf[..n]));
            if self.carry.len() > 4096 {
                log_debug("serial meter: discarding oversized partial line");
                self.carry.clear();
            }
        }
        Ok(self.take_lines(max))
    }

    fn allow_interval(&self) -> bool {
        false
    }
}
