//! Calibration acquisition policy.
//!
//! Calibration is taken from the best available source, in order:
//!
//! 1. the sensor itself, when a hardware interface is connected; the
//!    downloaded data is cached next to the fallback file,
//! 2. that cached download from a previous run,
//! 3. the fallback calibration file.
//!
//! Every tier either yields a calibration or an explicit [`Error`]; when all
//! tiers fail the error of the last one is returned.

use crate::{
    calibration::CalibrationConfiguration,
    error::{Error, Result},
    hw_interface::HwInterface,
};
use std::{
    ffi::OsString,
    path::{Path, PathBuf},
    sync::Arc,
};
use tracing::{debug, info, warn};

/// Where a resolved calibration came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CalibrationSource {
    /// Downloaded from the sensor during this resolution.
    Sensor,
    /// The download cached by an earlier resolution.
    Downloaded(PathBuf),
    /// The caller-supplied fallback file.
    Fallback(PathBuf),
}

/// A successfully resolved calibration.
#[derive(Debug, Clone)]
pub struct Resolution {
    pub calibration: Arc<CalibrationConfiguration>,
    pub source: CalibrationSource,
    /// Non-fatal problem hit on the way, e.g. the download could not be
    /// cached.
    pub warning: Option<Error>,
}

/// Outcome of [`CalibrationResolver::resolve`].
pub type CalibrationResult = Result<Resolution>;

/// Applies the tiered calibration lookup.
#[derive(Clone, Default)]
pub struct CalibrationResolver {
    hw_interface: Option<Arc<dyn HwInterface>>,
}

impl CalibrationResolver {
    pub fn new(hw_interface: Option<Arc<dyn HwInterface>>) -> Self {
        Self { hw_interface }
    }

    /// Resolve calibration data.
    ///
    /// With `ignore_others` set, the sensor and the cached download are
    /// skipped and `calibration_file` is loaded directly.
    pub fn resolve(&self, calibration_file: &Path, ignore_others: bool) -> CalibrationResult {
        if !ignore_others {
            let downloaded = downloaded_file_path(calibration_file);

            match self.download(&downloaded) {
                Ok(resolution) => return Ok(resolution),
                Err(Error::SensorNotConnected) => {
                    debug!("Sensor not connected, skipping calibration download");
                }
                Err(err) => warn!(error = %err, "Could not use calibration from sensor"),
            }

            match CalibrationConfiguration::load_from_file(&downloaded) {
                Ok(calibration) => {
                    info!(path = %downloaded.display(), "Using previously downloaded calibration");
                    return Ok(Resolution {
                        calibration: Arc::new(calibration),
                        source: CalibrationSource::Downloaded(downloaded),
                        warning: None,
                    });
                }
                Err(Error::CalibrationFileNotFound(_)) => {
                    debug!(path = %downloaded.display(), "No downloaded calibration file");
                }
                Err(err) => warn!(error = %err, "Could not use downloaded calibration"),
            }
        }

        match CalibrationConfiguration::load_from_file(calibration_file) {
            Ok(calibration) => {
                info!(path = %calibration_file.display(), "Using calibration file");
                Ok(Resolution {
                    calibration: Arc::new(calibration),
                    source: CalibrationSource::Fallback(calibration_file.to_path_buf()),
                    warning: None,
                })
            }
            Err(err) => {
                warn!(error = %err, "No calibration could be resolved");
                Err(err)
            }
        }
    }

    /// Download from the sensor and cache the result at `cache_path`.
    fn download(&self, cache_path: &Path) -> CalibrationResult {
        let hw_interface = self
            .hw_interface
            .as_ref()
            .filter(|hw| hw.is_connected())
            .ok_or(Error::SensorNotConnected)?;

        let text = hw_interface.download_calibration()?;
        let calibration = CalibrationConfiguration::parse(&text, "sensor")?;
        info!(num_channels = calibration.len(), "Downloaded calibration from sensor");

        let warning = match calibration.save_to_file(cache_path) {
            Ok(()) => {
                info!(path = %cache_path.display(), "Saved downloaded calibration");
                None
            }
            Err(err) => {
                warn!(error = %err, "Failed to cache downloaded calibration");
                Some(err)
            }
        };

        Ok(Resolution {
            calibration: Arc::new(calibration),
            source: CalibrationSource::Sensor,
            warning,
        })
    }
}

/// Path under which a calibration downloaded from the sensor is cached:
/// `_from_sensor` is inserted before the extension of `calibration_file`.
pub fn downloaded_file_path(calibration_file: &Path) -> PathBuf {
    let mut name: OsString = calibration_file
        .file_stem()
        .map(OsString::from)
        .unwrap_or_default();
    name.push("_from_sensor");
    if let Some(ext) = calibration_file.extension() {
        name.push(".");
        name.push(ext);
    }
    calibration_file.with_file_name(name)
}
