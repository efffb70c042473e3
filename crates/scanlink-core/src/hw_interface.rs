//! Seam to the sensor's hardware interface.

use crate::error::Result;

/// Control-plane access to a physical sensor.
///
/// Packet delivery is push-based and goes straight to
/// [`DecoderWrapper::process_cloud_packet`](crate::DecoderWrapper::process_cloud_packet);
/// this trait only covers what calibration resolution needs.
pub trait HwInterface: Send + Sync {
    /// Whether the sensor currently answers on its control channel.
    fn is_connected(&self) -> bool;

    /// Fetch the calibration stored on the sensor, in calibration file format.
    ///
    /// Failures should be reported as
    /// [`Error::CalibrationDownload`](crate::Error::CalibrationDownload).
    fn download_calibration(&self) -> Result<String>;
}
