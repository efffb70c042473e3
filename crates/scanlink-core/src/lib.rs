//! This library connects a LiDAR hardware interface and a packet decoder to
//! a point-cloud sink.
//!
//! It owns the parts around the decoder: choosing calibration data from the
//! sensor, a cached download or a fallback file; replacing the live decoder
//! when configuration or calibration changes without letting packets see a
//! half-swapped driver; assembling decoded fragments into scans; and
//! watching that scans keep coming.
//!
//! # Usage
//!
//! ```rust
//! use scanlink_core::{
//!     CalibrationConfiguration, DecodedPacket, Decoder, DecoderWrapper, DriverFactory,
//!     Packet, Point, SensorConfiguration, WrapperConfig,
//! };
//! use std::{sync::Arc, time::Duration};
//!
//! // A decoder producing one point per packet; a packet starting with 0xFF
//! // closes the scan.
//! struct MyDecoder;
//!
//! impl Decoder for MyDecoder {
//!     fn decode_packet(&mut self, packet: &[u8]) -> scanlink_core::Result<DecodedPacket> {
//!         let point = Point { x: 1.0, y: 0.0, z: 0.0, intensity: 100, channel: 0 };
//!         Ok(DecodedPacket {
//!             points: vec![point],
//!             scan_complete: packet.first() == Some(&0xFF),
//!         })
//!     }
//! }
//!
//! struct MyFactory;
//!
//! impl DriverFactory for MyFactory {
//!     type Driver = MyDecoder;
//!
//!     fn build(
//!         &self,
//!         _sensor: &Arc<SensorConfiguration>,
//!         _calibration: &Arc<CalibrationConfiguration>,
//!     ) -> scanlink_core::Result<MyDecoder> {
//!         Ok(MyDecoder)
//!     }
//! }
//!
//! # fn main() -> eyre::Result<()> {
//! let sensor: SensorConfiguration = serde_yaml::from_str(
//!     "sensor_model: Pandar64\nsensor_ip: 192.168.1.201\nhost_ip: 192.168.1.100\n",
//! )?;
//! let calibration = CalibrationConfiguration::parse(
//!     "Laser id,Elevation,Azimuth\n1,15.0,-1.0\n2,11.0,-1.0\n",
//!     "inline",
//! )?;
//!
//! let (wrapper, outputs) =
//!     DecoderWrapper::new(MyFactory, None, WrapperConfig::new("pandar64.csv"));
//! wrapper.on_config_change(Arc::new(sensor))?;
//! wrapper.on_calibration_change(Arc::new(calibration))?;
//!
//! wrapper.process_cloud_packet(Packet::new(Duration::ZERO, vec![0x01]));
//! wrapper.process_cloud_packet(Packet::new(Duration::ZERO, vec![0xFF]));
//!
//! let cloud = outputs.clouds.try_recv()?;
//! assert_eq!(cloud.len(), 2);
//! assert!(wrapper.status().is_ok());
//! # Ok(())
//! # }
//! ```

pub mod calibration;
pub mod config;
pub mod driver;
mod error;
pub mod hw_interface;
pub mod params;
pub mod resolver;
pub mod scan;
mod slot;
mod watchdog;
mod wrapper;

pub use calibration::{CalibrationConfiguration, ChannelCorrection};
pub use config::{Config, ReturnMode, SensorConfiguration, WrapperConfig};
pub use driver::{DecodedPacket, Decoder, DriverFactory, Packet, Point};
pub use error::{Error, Result, Status};
pub use hw_interface::HwInterface;
pub use params::{Parameter, ParameterValue, SetParametersResult};
pub use resolver::{CalibrationResolver, CalibrationResult, CalibrationSource, Resolution};
pub use scan::{PointCloud, ScanPackets};
pub use slot::SwapOutcome;
pub use watchdog::Watchdog;
pub use wrapper::{CloudStream, DecoderWrapper, Outputs, WrapperStats};
