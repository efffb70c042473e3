//! Error and health types shared by the resolver, the driver slot and the
//! packet pipeline.

use std::{fmt, path::PathBuf, time::Duration};

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised while acquiring calibration, building drivers or decoding
/// packets.
///
/// The enum is `Clone` so the last error can be kept inside [`Status`].
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum Error {
    /// No hardware interface, or the sensor did not respond
    #[error("sensor is not connected")]
    SensorNotConnected,

    /// The sensor was reachable but the calibration download failed
    #[error("failed to download calibration from sensor: {0}")]
    CalibrationDownload(String),

    /// The calibration file does not exist
    #[error("calibration file not found: {}", .0.display())]
    CalibrationFileNotFound(PathBuf),

    /// The calibration file exists but could not be read
    #[error("failed to read calibration file {}: {reason}", path.display())]
    CalibrationRead { path: PathBuf, reason: String },

    /// Calibration text was read but is malformed
    #[error("invalid calibration data from {origin}: {reason}")]
    InvalidCalibration { origin: String, reason: String },

    /// Downloaded calibration could not be written to the cache file
    #[error("failed to save calibration to {}: {reason}", path.display())]
    CalibrationSave { path: PathBuf, reason: String },

    /// Sensor configuration failed validation
    #[error("invalid sensor configuration: {0}")]
    InvalidSensorConfig(String),

    /// The decoder rejected the configuration/calibration pair
    #[error("driver construction failed: {0}")]
    DriverConstruction(String),

    /// A single packet could not be decoded
    #[error("packet decode failed: {0}")]
    Decode(String),

    /// No point cloud was forwarded within the watchdog timeout
    #[error("no point cloud published within {0:?}")]
    MissedDeadline(Duration),
}

impl Error {
    /// Builds an [`Error::CalibrationRead`] or [`Error::CalibrationFileNotFound`]
    /// from an I/O failure on `path`.
    pub fn from_io(path: impl Into<PathBuf>, err: &std::io::Error) -> Self {
        let path = path.into();
        match err.kind() {
            std::io::ErrorKind::NotFound => Error::CalibrationFileNotFound(path),
            _ => Error::CalibrationRead {
                path,
                reason: err.to_string(),
            },
        }
    }
}

/// Current health of a decoder wrapper.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Status {
    /// Everything works.
    #[default]
    Ok,
    /// Running, but something needs attention (stalled output, cache write
    /// failure).
    Degraded(Error),
    /// The last configuration or calibration step failed.
    Error(Error),
}

impl Status {
    pub fn is_ok(&self) -> bool {
        matches!(self, Status::Ok)
    }

    pub fn is_degraded(&self) -> bool {
        matches!(self, Status::Degraded(_))
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Status::Error(_))
    }

    /// The error carried by a non-`Ok` status.
    pub fn last_error(&self) -> Option<&Error> {
        match self {
            Status::Ok => None,
            Status::Degraded(err) | Status::Error(err) => Some(err),
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Status::Ok => write!(f, "ok"),
            Status::Degraded(err) => write!(f, "degraded: {err}"),
            Status::Error(err) => write!(f, "error: {err}"),
        }
    }
}
