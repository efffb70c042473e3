//! Configuration parsing and validation.
//!
//! A configuration file holds two sections: the [`SensorConfiguration`]
//! snapshot handed to decoders, and the [`WrapperConfig`] that controls the
//! wrapper itself.
//!
//! ```yaml
//! sensor:
//!   sensor_model: Pandar64
//!   sensor_ip: 192.168.1.201
//!   host_ip: 192.168.1.100
//!   frame_id: lidar_top
//!   return_mode: dual
//!
//! wrapper:
//!   calibration_file: /etc/scanlink/pandar64.csv
//!   watchdog_timeout: 100ms
//!   publish_packets: true
//! ```

use crate::error::{Error, Result as ScanlinkResult};
use eyre::{Result, WrapErr, ensure};
use serde::Deserialize;
use std::{
    fmt, fs,
    net::IpAddr,
    path::{Path, PathBuf},
    str::FromStr,
    time::Duration,
};
use tracing::warn;

/// Root configuration structure.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Sensor settings passed to the decoder.
    pub sensor: SensorConfiguration,

    /// Wrapper settings.
    pub wrapper: WrapperConfig,
}

impl Config {
    /// Load configuration from a YAML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path)
            .wrap_err_with(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = serde_yaml::from_str(&contents)
            .wrap_err_with(|| format!("Failed to parse config file: {}", path.display()))?;

        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    fn validate(&self) -> Result<()> {
        self.sensor
            .validate()
            .wrap_err("Invalid sensor section")?;

        ensure!(
            !self.wrapper.calibration_file.as_os_str().is_empty(),
            "wrapper.calibration_file cannot be empty"
        );

        ensure!(
            !self.wrapper.watchdog_timeout.is_zero(),
            "wrapper.watchdog_timeout must be greater than zero"
        );

        ensure!(
            self.wrapper.channel_capacity > 0,
            "wrapper.channel_capacity must be greater than zero"
        );

        ensure!(
            self.wrapper.max_packets_per_scan > 0,
            "wrapper.max_packets_per_scan must be greater than zero"
        );

        Ok(())
    }
}

/// Immutable snapshot of the sensor settings a decoder is built from.
///
/// Shared as `Arc<SensorConfiguration>`. Updates produce a new snapshot.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SensorConfiguration {
    /// Sensor model name, e.g. `Pandar64`.
    pub sensor_model: String,

    /// Address of the sensor.
    pub sensor_ip: IpAddr,

    /// Address of the host receiving packets.
    pub host_ip: IpAddr,

    /// UDP port the sensor streams to.
    #[serde(default = "default_data_port")]
    pub data_port: u16,

    /// Frame id stamped onto published clouds.
    #[serde(default = "default_frame_id")]
    pub frame_id: String,

    #[serde(default)]
    pub return_mode: ReturnMode,

    /// Motor speed in revolutions per minute.
    #[serde(default = "default_rotation_speed")]
    pub rotation_speed: u16,

    /// Start of the azimuth window in degrees.
    #[serde(default)]
    pub cloud_min_angle: u16,

    /// End of the azimuth window in degrees.
    #[serde(default = "default_cloud_max_angle")]
    pub cloud_max_angle: u16,

    /// Points closer than this (metres) are discarded.
    #[serde(default = "default_min_range")]
    pub min_range: f64,

    /// Points further than this (metres) are discarded.
    #[serde(default = "default_max_range")]
    pub max_range: f64,
}

impl SensorConfiguration {
    /// Check the value ranges a decoder relies on.
    pub fn validate(&self) -> ScanlinkResult<()> {
        let invalid = |msg: String| -> ScanlinkResult<()> { Err(Error::InvalidSensorConfig(msg)) };

        if self.sensor_model.is_empty() {
            return invalid("sensor_model cannot be empty".to_string());
        }
        if self.frame_id.is_empty() {
            return invalid("frame_id cannot be empty".to_string());
        }
        if self.cloud_min_angle > 360 || self.cloud_max_angle > 360 {
            return invalid(format!(
                "cloud angles must be within 0..=360, got {}..{}",
                self.cloud_min_angle, self.cloud_max_angle
            ));
        }
        if self.cloud_min_angle == self.cloud_max_angle {
            return invalid("cloud_min_angle and cloud_max_angle cannot be equal".to_string());
        }
        if !(300..=1200).contains(&self.rotation_speed) || self.rotation_speed % 60 != 0 {
            return invalid(format!(
                "rotation_speed must be a multiple of 60 within 300..=1200 rpm, got {}",
                self.rotation_speed
            ));
        }
        if !self.min_range.is_finite() || !self.max_range.is_finite() || self.min_range < 0.0 {
            return invalid("ranges must be finite and non-negative".to_string());
        }
        if self.min_range >= self.max_range {
            return invalid(format!(
                "min_range ({}) must be below max_range ({})",
                self.min_range, self.max_range
            ));
        }

        Ok(())
    }
}

fn default_data_port() -> u16 {
    2368
}

fn default_frame_id() -> String {
    "lidar".to_string()
}

fn default_rotation_speed() -> u16 {
    600
}

fn default_cloud_max_angle() -> u16 {
    360
}

fn default_min_range() -> f64 {
    0.3
}

fn default_max_range() -> f64 {
    300.0
}

/// Which returns the sensor reports per firing.
#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ReturnMode {
    #[default]
    Strongest,
    Last,
    Dual,
}

impl FromStr for ReturnMode {
    type Err = Error;

    fn from_str(s: &str) -> ScanlinkResult<Self> {
        match s {
            "strongest" => Ok(ReturnMode::Strongest),
            "last" => Ok(ReturnMode::Last),
            "dual" => Ok(ReturnMode::Dual),
            other => Err(Error::InvalidSensorConfig(format!(
                "unknown return_mode '{other}'"
            ))),
        }
    }
}

impl fmt::Display for ReturnMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReturnMode::Strongest => write!(f, "strongest"),
            ReturnMode::Last => write!(f, "last"),
            ReturnMode::Dual => write!(f, "dual"),
        }
    }
}

/// Settings of the wrapper itself.
#[derive(Debug, Clone, Deserialize)]
pub struct WrapperConfig {
    /// Fallback calibration file. The file downloaded from the sensor is
    /// cached next to it.
    pub calibration_file: PathBuf,

    /// Maximum time between two published clouds before the wrapper reports
    /// degraded health.
    #[serde(with = "humantime_serde", default = "default_watchdog_timeout")]
    pub watchdog_timeout: Duration,

    /// Also emit the raw packets of every scan.
    #[serde(default)]
    pub publish_packets: bool,

    /// Capacity of the cloud and packet channels.
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,

    /// Packets after which a scan without a boundary is dropped.
    #[serde(default = "default_max_packets_per_scan")]
    pub max_packets_per_scan: usize,
}

impl WrapperConfig {
    pub fn new(calibration_file: impl Into<PathBuf>) -> Self {
        Self {
            calibration_file: calibration_file.into(),
            watchdog_timeout: default_watchdog_timeout(),
            publish_packets: false,
            channel_capacity: default_channel_capacity(),
            max_packets_per_scan: default_max_packets_per_scan(),
        }
    }

    pub fn with_watchdog_timeout(mut self, timeout: Duration) -> Self {
        self.watchdog_timeout = timeout;
        self
    }

    pub fn with_packet_publishing(mut self, enabled: bool) -> Self {
        self.publish_packets = enabled;
        self
    }

    pub fn with_channel_capacity(mut self, capacity: usize) -> Self {
        self.channel_capacity = capacity;
        self
    }

    pub fn with_max_packets_per_scan(mut self, max_packets: usize) -> Self {
        self.max_packets_per_scan = max_packets;
        self
    }

    /// Replace values the wrapper cannot run with by their defaults.
    ///
    /// A zero watchdog timeout would stop the watchdog task, and a zero
    /// channel capacity turns the sinks into rendezvous channels that drop
    /// every cloud no receiver is already waiting for.
    pub fn sanitized(mut self) -> Self {
        if self.watchdog_timeout.is_zero() {
            warn!(
                default = ?default_watchdog_timeout(),
                "watchdog_timeout is zero, using the default"
            );
            self.watchdog_timeout = default_watchdog_timeout();
        }
        if self.channel_capacity == 0 {
            warn!(
                default = default_channel_capacity(),
                "channel_capacity is zero, using the default"
            );
            self.channel_capacity = default_channel_capacity();
        }
        if self.max_packets_per_scan == 0 {
            warn!(
                default = default_max_packets_per_scan(),
                "max_packets_per_scan is zero, using the default"
            );
            self.max_packets_per_scan = default_max_packets_per_scan();
        }
        self
    }
}

fn default_watchdog_timeout() -> Duration {
    Duration::from_millis(100)
}

fn default_channel_capacity() -> usize {
    16
}

fn default_max_packets_per_scan() -> usize {
    100_000
}
