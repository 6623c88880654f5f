//! # Runtime Registry
//!
//! Builds the runtime object graph from a validated configuration: meter
//! groups (one device plus the channels it feeds) and one sender per
//! channel (transmitter plus send interval). The scheduler takes the parts
//! apart with [`Registry::into_parts`] and drives them; the registry keeps
//! shared channel handles around for the stats and dump surfaces.

use std::sync::Arc;

use crate::api;
use crate::buffer::{AggregationMode, BufferConfig};
use crate::channel::Channel;
use crate::config::{ChannelConfig, Config, ProtocolConfig};
use crate::error::MeterLogError;
use crate::logging::{log_debug, log_info};
use crate::meter::file::FileMeter;
use crate::meter::random::RandomMeter;
use crate::meter::serial::{SerialMeter, SerialMeterConfig};
use crate::meter::Meter;
use crate::reading::ReadingIdentifier;
use crate::stats::ChannelStatsExport;
use crate::transmit::{AggregationSettings, Transmitter};

/// Readings requested from a driver per poll.
pub const READ_CHUNK: usize = 32;

/// One metering device and the channels its readings fan out to.
pub struct MeterGroup {
    name: String,
    meter: Box<dyn Meter>,
    interval_secs: u64,
    channels: Vec<Arc<Channel>>,
}

impl MeterGroup {
    pub fn new(
        name: impl Into<String>,
        meter: Box<dyn Meter>,
        interval_secs: u64,
        channels: Vec<Arc<Channel>>,
    ) -> Self {
        MeterGroup {
            name: name.into(),
            meter,
            interval_secs,
            channels,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn interval_secs(&self) -> u64 {
        self.interval_secs
    }

    /// Whether the device tolerates being polled on a timer.
    pub fn allow_interval(&self) -> bool {
        self.meter.allow_interval()
    }

    pub fn channels(&self) -> &[Arc<Channel>] {
        &self.channels
    }

    pub async fn open(&mut self) -> Result<(), MeterLogError> {
        self.meter.open().await
    }

    pub async fn close(&mut self) -> Result<(), MeterLogError> {
        self.meter.close().await
    }

    /// Polls the device once and offers every reading to every channel.
    ///
    /// Returns how many channel admissions happened. A reading no channel
    /// wants is logged and dropped; that is a configuration smell, not an
    /// error.
    pub async fn read_once(&mut self) -> Result<usize, MeterLogError> {
        let readings = self.meter.read(READ_CHUNK).await?;
        let mut admitted = 0;
        for reading in &readings {
            let mut matched = false;
            for channel in &self.channels {
                if channel.add_reading(reading) {
                    matched = true;
                    admitted += 1;
                }
            }
            if !matched {
                log_debug(&format!(
                    "Meter {}: no channel wants identifier {}",
                    self.name, reading.identifier
                ));
            }
        }
        Ok(admitted)
    }
}

/// The send side of one channel.
pub struct ChannelSender {
    pub transmitter: Transmitter,
    pub send_interval_secs: u64,
}

/// The full object graph built from one configuration.
pub struct Registry {
    groups: Vec<MeterGroup>,
    senders: Vec<ChannelSender>,
    channels: Vec<Arc<Channel>>,
}

impl Registry {
    /// Builds meters, channels, and transmitters from a configuration.
    ///
    /// Unnamed meters and channels get the explicit names `mtr{N}` and
    /// `chn{N}` so every log line stays attributable.
    pub fn from_config(config: &Config) -> Result<Registry, MeterLogError> {
        config.validate()?;

        let mut groups = Vec::new();
        let mut senders = Vec::new();
        let mut channels = Vec::new();
        let mut channel_seq = 0usize;

        for (m, meter_config) in config.meters.iter().enumerate() {
            let meter_name = meter_config
                .name
                .clone()
                .unwrap_or_else(|| format!("mtr{m}"));
            let meter = build_meter(&meter_config.protocol);
            let interval = meter_config.effective_interval_secs(config.interval_secs);

            let mut group_channels = Vec::new();
            for channel_config in &meter_config.channels {
                let channel = Arc::new(build_channel(channel_config, channel_seq));
                channel_seq += 1;

                let collector = api::from_config(&channel_config.api, channel.uuid())?;
                log_info(&format!(
                    "Channel {} ({}) on meter {} -> {} every {}s",
                    channel.name(),
                    channel.uuid(),
                    meter_name,
                    collector.backend(),
                    channel_config.send_interval_secs
                ));

                let aggregation = channel_config
                    .aggregation
                    .as_ref()
                    .map(|a| AggregationSettings {
                        interval_secs: a.interval_secs,
                        fixed_timestamps: a.fixed_timestamps,
                    })
                    .unwrap_or_default();
                let transmitter = Transmitter::new(
                    Arc::clone(&channel),
                    collector,
                    channel_config.duplicate_timeout_secs,
                    aggregation,
                );

                senders.push(ChannelSender {
                    transmitter,
                    send_interval_secs: channel_config.send_interval_secs,
                });
                group_channels.push(Arc::clone(&channel));
                channels.push(channel);
            }

            groups.push(MeterGroup::new(
                meter_name,
                meter,
                interval,
                group_channels,
            ));
        }

        Ok(Registry {
            groups,
            senders,
            channels,
        })
    }

    /// Assembles a registry from pre-built parts, for tests and embedders.
    pub fn new(groups: Vec<MeterGroup>, senders: Vec<ChannelSender>) -> Registry {
        let channels = groups
            .iter()
            .flat_map(|g| g.channels().iter().cloned())
            .collect();
        Registry {
            groups,
            senders,
            channels,
        }
    }

    pub fn groups(&self) -> &[MeterGroup] {
        &self.groups
    }

    pub fn senders(&self) -> &[ChannelSender] {
        &self.senders
    }

    /// Shared handles to every channel, across all meters.
    pub fn channel_handles(&self) -> Vec<Arc<Channel>> {
        self.channels.clone()
    }

    /// Hands the drivable parts to the scheduler.
    pub fn into_parts(self) -> (Vec<MeterGroup>, Vec<ChannelSender>) {
        (self.groups, self.senders)
    }

    /// Snapshot of every channel's counters as pretty-printed JSON.
    pub fn export_stats_json(&self) -> Result<String, MeterLogError> {
        export_stats_json(&self.channels)
    }

    /// Concatenated per-channel buffer dumps for the status surface.
    pub fn dump_all(&self, max_len: usize) -> Result<String, MeterLogError> {
        let mut out = String::new();
        for channel in &self.channels {
            let dump = channel.buffer().dump(max_len)?;
            out.push_str(&format!("{}: {}\n", channel.name(), dump));
        }
        Ok(out)
    }
}

/// Snapshot of the given channels' counters as pretty-printed JSON. Usable
/// after the registry itself has been taken apart by the scheduler.
pub fn export_stats_json(channels: &[Arc<Channel>]) -> Result<String, MeterLogError> {
    let exports: Vec<ChannelStatsExport> = channels
        .iter()
        .map(|c| c.stats().export(c.name(), c.uuid()))
        .collect();
    Ok(serde_json::to_string_pretty(&exports)?)
}

fn build_meter(protocol: &ProtocolConfig) -> Box<dyn Meter> {
    match protocol {
        ProtocolConfig::Random { min, max } => Box::new(RandomMeter::new(*min, *max)),
        ProtocolConfig::File { path } => Box::new(FileMeter::new(path.clone())),
        ProtocolConfig::Serial {
            port,
            baudrate,
            timeout_ms,
        } => Box::new(SerialMeter::with_config(
            port,
            SerialMeterConfig {
                baudrate: *baudrate,
                timeout: std::time::Duration::from_millis(*timeout_ms),
            },
        )),
    }
}

fn build_channel(config: &ChannelConfig, seq: usize) -> Channel {
    let name = config
        .name
        .clone()
        .unwrap_or_else(|| format!("chn{seq}"));
    let identifier = match &config.identifier {
        Some(s) => ReadingIdentifier::resolve(s),
        None => ReadingIdentifier::Nil,
    };
    let mode = config
        .aggregation
        .as_ref()
        .map(|a| a.mode)
        .unwrap_or(AggregationMode::None);
    let buffer_config = BufferConfig {
        mode,
        keep: config.keep,
        capacity: config.capacity,
    };
    Channel::new(name, &config.uuid, identifier, config.counter, buffer_config)
}
