//! # Logger Configuration
//!
//! JSON configuration model for the meter logger. A configuration names a
//! set of meters, and each meter a set of channels; every channel carries
//! its own collector endpoint, buffer bounds, and transmission policy.
//!
//! ## Example
//!
//! ```json
//! {
//!   "meters": [
//!     {
//!       "protocol": { "type": "random", "min": 0.0, "max": 40.0 },
//!       "interval_secs": 10,
//!       "channels": [
//!         {
//!           "uuid": "3c5d7780-2a3f-11f0-bc12-0800200c9a66",
//!           "identifier": "1-0:1.8.0",
//!           "api": { "type": "http", "url": "https://demo.example.org/middleware" }
//!         }
//!       ]
//!     }
//!   ]
//! }
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::buffer::AggregationMode;
use crate::error::MeterLogError;

fn default_read_interval_secs() -> u64 {
    10
}

fn default_send_interval_secs() -> u64 {
    30
}

fn default_keep() -> usize {
    32
}

fn default_capacity() -> usize {
    4096
}

fn default_baudrate() -> u32 {
    9600
}

fn default_serial_timeout_ms() -> u64 {
    2000
}

fn default_http_timeout_secs() -> u64 {
    30
}

fn default_measurement() -> String {
    "meterlog".to_string()
}

fn default_random_min() -> f64 {
    0.0
}

fn default_random_max() -> f64 {
    40.0
}

/// Top-level configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Log filter applied when RUST_LOG is not set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_level: Option<String>,

    /// Default read interval for meters that do not set their own.
    #[serde(default = "default_read_interval_secs")]
    pub interval_secs: u64,

    pub meters: Vec<MeterConfig>,
}

/// One metering device and the channels it feeds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MeterConfig {
    /// Display name for log lines; defaulted to `mtr{N}` when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    pub protocol: ProtocolConfig,

    /// Read interval for this meter; falls back to the top-level value.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interval_secs: Option<u64>,

    pub channels: Vec<ChannelConfig>,
}

/// Which driver reads the device.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ProtocolConfig {
    /// Random-walk generator, for demos and load testing.
    Random {
        #[serde(default = "default_random_min")]
        min: f64,
        #[serde(default = "default_random_max")]
        max: f64,
    },
    /// Line-oriented file, re-read on every poll.
    File { path: PathBuf },
    /// Line-oriented serial port.
    Serial {
        port: String,
        #[serde(default = "default_baudrate")]
        baudrate: u32,
        #[serde(default = "default_serial_timeout_ms")]
        timeout_ms: u64,
    },
}

/// One logging channel: an identifier filter plus a collector endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelConfig {
    pub uuid: String,

    /// Display name for log lines; defaulted to `chn{N}` when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Identifier filter; absent admits every reading from the meter.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub identifier: Option<String>,

    pub api: ApiConfig,

    #[serde(default = "default_send_interval_secs")]
    pub send_interval_secs: u64,

    /// Seconds after which an unchanged value is re-sent anyway. Absent
    /// suppresses exact duplicates indefinitely; 0 disables suppression.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duplicate_timeout_secs: Option<f64>,

    /// Interpret raw values as a monotonic counter and log deltas.
    #[serde(default)]
    pub counter: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aggregation: Option<AggregationConfig>,

    /// Acknowledged readings retained for aggregation baselines and the
    /// local dump surface.
    #[serde(default = "default_keep")]
    pub keep: usize,

    #[serde(default = "default_capacity")]
    pub capacity: usize,
}

/// Per-channel resampling policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AggregationConfig {
    pub mode: AggregationMode,

    /// Window length in seconds; 0 condenses whatever is pending at each
    /// send cycle.
    #[serde(default)]
    pub interval_secs: i64,

    /// Stamp condensed readings at window boundaries instead of the
    /// newest sample's time.
    #[serde(default)]
    pub fixed_timestamps: bool,
}

/// Collector backend selection, tagged by `type`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ApiConfig {
    Http {
        url: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        token: Option<String>,
        #[serde(default = "default_http_timeout_secs")]
        timeout_secs: u64,
    },
    Influx {
        url: String,
        database: String,
        #[serde(default = "default_measurement")]
        measurement: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        username: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        password: Option<String>,
    },
    /// Discards everything; useful for dry runs.
    Null,
}

impl Config {
    /// Loads and validates a configuration file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Config, MeterLogError> {
        let text = std::fs::read_to_string(path)?;
        Config::from_json(&text)
    }

    /// Parses and validates a configuration from JSON text.
    pub fn from_json(text: &str) -> Result<Config, MeterLogError> {
        let config: Config = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Checks the cross-field constraints serde cannot express.
    pub fn validate(&self) -> Result<(), MeterLogError> {
        if self.meters.is_empty() {
            return Err(MeterLogError::ConfigError(
                "no meters configured".to_string(),
            ));
        }
        if self.interval_secs == 0 {
            return Err(MeterLogError::ConfigError(
                "interval_secs must be positive".to_string(),
            ));
        }
        for (m, meter) in self.meters.iter().enumerate() {
            let meter_label = meter.name.clone().unwrap_or_else(|| format!("meter {m}"));
            if meter.channels.is_empty() {
                return Err(MeterLogError::ConfigError(format!(
                    "{meter_label} has no channels"
                )));
            }
            if meter.interval_secs == Some(0) {
                return Err(MeterLogError::ConfigError(format!(
                    "{meter_label}: interval_secs must be positive"
                )));
            }
            for channel in &meter.channels {
                let label = channel
                    .name
                    .clone()
                    .unwrap_or_else(|| channel.uuid.clone());
                if channel.uuid.trim().is_empty() {
                    return Err(MeterLogError::ConfigError(format!(
                        "{meter_label}: channel with empty uuid"
                    )));
                }
                if channel.send_interval_secs == 0 {
                    return Err(MeterLogError::ConfigError(format!(
                        "channel {label}: send_interval_secs must be positive"
                    )));
                }
                if channel.capacity == 0 {
                    return Err(MeterLogError::ConfigError(format!(
                        "channel {label}: capacity must be positive"
                    )));
                }
                if channel.keep > channel.capacity {
                    return Err(MeterLogError::ConfigError(format!(
                        "channel {label}: keep ({}) exceeds capacity ({})",
                        channel.keep, channel.capacity
                    )));
                }
                if let Some(window) = channel.duplicate_timeout_secs {
                    if window < 0.0 {
                        return Err(MeterLogError::ConfigError(format!(
                            "channel {label}: duplicate_timeout_secs must not be negative"
                        )));
                    }
                }
                if let Some(agg) = &channel.aggregation {
                    if agg.interval_secs < 0 {
                        return Err(MeterLogError::ConfigError(format!(
                            "channel {label}: aggregation interval_secs must not be negative"
                        )));
                    }
                }
            }
        }
        Ok(())
    }

    /// Built-in example printed by `dump-config`.
    pub fn example() -> Config {
        Config {
            log_level: Some("info".to_string()),
            interval_secs: default_read_interval_secs(),
            meters: vec![MeterConfig {
                name: Some("demo".to_string()),
                protocol: ProtocolConfig::Random {
                    min: 0.0,
                    max: 40.0,
                },
                interval_secs: None,
                channels: vec![ChannelConfig {
                    uuid: "3c5d7780-2a3f-11f0-bc12-0800200c9a66".to_string(),
                    name: None,
                    identifier: None,
                    api: ApiConfig::Null,
                    send_interval_secs: default_send_interval_secs(),
                    duplicate_timeout_secs: Some(300.0),
                    counter: false,
                    aggregation: Some(AggregationConfig {
                        mode: AggregationMode::Avg,
                        interval_secs: 60,
                        fixed_timestamps: false,
                    }),
                    keep: default_keep(),
                    capacity: default_capacity(),
                }],
            }],
        }
    }

    pub fn to_json_pretty(&self) -> Result<String, MeterLogError> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

impl MeterConfig {
    /// Read interval for this meter, with the top-level fallback applied.
    pub fn effective_interval_secs(&self, global: u64) -> u64 {
        self.interval_secs.unwrap_or(global)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn minimal_json() -> String {
        r#"{
            "meters": [
                {
                    "protocol": { "type": "random" },
                    "channels": [
                        { "uuid": "u-1", "api": { "type": "null" } }
                    ]
                }
            ]
        }"#
        .to_string()
    }

    #[test]
    fn test_minimal_config_gets_defaults() {
        let config = Config::from_json(&minimal_json()).unwrap();
        assert_eq!(config.interval_secs, 10);
        let channel = &config.meters[0].channels[0];
        assert_eq!(channel.send_interval_secs, 30);
        assert_eq!(channel.keep, 32);
        assert_eq!(channel.capacity, 4096);
        assert!(channel.duplicate_timeout_secs.is_none());
        assert!(!channel.counter);
        assert!(channel.aggregation.is_none());
    }

    #[test]
    fn test_tagged_protocol_variants() {
        let json = r#"{
            "meters": [
                {
                    "protocol": { "type": "serial", "port": "/dev/ttyUSB0" },
                    "channels": [
                        { "uuid": "u-1", "api": { "type": "null" } }
                    ]
                }
            ]
        }"#;
        let config = Config::from_json(json).unwrap();
        match &config.meters[0].protocol {
            ProtocolConfig::Serial {
                port,
                baudrate,
                timeout_ms,
            } => {
                assert_eq!(port, "/dev/ttyUSB0");
                assert_eq!(*baudrate, 9600);
                assert_eq!(*timeout_ms, 2000);
            }
            other => panic!("unexpected protocol: {other:?}"),
        }
    }

    #[test]
    fn test_http_api_defaults() {
        let json = r#"{
            "meters": [
                {
                    "protocol": { "type": "random" },
                    "channels": [
                        {
                            "uuid": "u-1",
                            "api": { "type": "http", "url": "https://mw.example.org" }
                        }
                    ]
                }
            ]
        }"#;
        let config = Config::from_json(json).unwrap();
        match &config.meters[0].channels[0].api {
            ApiConfig::Http {
                url,
                token,
                timeout_secs,
            } => {
                assert_eq!(url, "https://mw.example.org");
                assert!(token.is_none());
                assert_eq!(*timeout_secs, 30);
            }
            other => panic!("unexpected api: {other:?}"),
        }
    }

    #[test]
    fn test_rejects_empty_uuid() {
        let json = minimal_json().replace("u-1", "  ");
        let err = Config::from_json(&json).unwrap_err();
        assert!(matches!(err, MeterLogError::ConfigError(_)));
    }

    #[test]
    fn test_rejects_keep_beyond_capacity() {
        let json = r#"{
            "meters": [
                {
                    "protocol": { "type": "random" },
                    "channels": [
                        { "uuid": "u-1", "api": { "type": "null" }, "keep": 64, "capacity": 16 }
                    ]
                }
            ]
        }"#;
        let err = Config::from_json(json).unwrap_err();
        assert!(matches!(err, MeterLogError::ConfigError(_)));
    }

    #[test]
    fn test_rejects_meter_without_channels() {
        let json = r#"{
            "meters": [ { "protocol": { "type": "random" }, "channels": [] } ]
        }"#;
        let err = Config::from_json(json).unwrap_err();
        assert!(matches!(err, MeterLogError::ConfigError(_)));
    }

    #[test]
    fn test_example_round_trips() {
        let text = Config::example().to_json_pretty().unwrap();
        let parsed = Config::from_json(&text).unwrap();
        assert_eq!(parsed.meters.len(), 1);
        assert!(matches!(
            parsed.meters[0].channels[0].api,
            ApiConfig::Null
        ));
    }
}
