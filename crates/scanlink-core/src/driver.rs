//! Seams to the decoder library.
//!
//! The wrapper never parses packets itself. A [`DriverFactory`] turns a
//! (sensor, calibration) pair into a [`Decoder`], and the decoder turns raw
//! packets into point fragments, signalling where one scan ends.

use crate::{
    calibration::CalibrationConfiguration,
    config::SensorConfiguration,
    error::Result,
};
use std::{sync::Arc, time::Duration};

/// A single decoded return.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Point {
    pub x: f32,
    pub y: f32,
    pub z: f32,
    pub intensity: u8,
    pub channel: u16,
}

/// Output of decoding one packet.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DecodedPacket {
    /// Points contributed by this packet.
    pub points: Vec<Point>,
    /// Set when this packet closes the current scan.
    pub scan_complete: bool,
}

impl DecodedPacket {
    pub fn fragment(points: Vec<Point>) -> Self {
        Self {
            points,
            scan_complete: false,
        }
    }

    pub fn end_of_scan(points: Vec<Point>) -> Self {
        Self {
            points,
            scan_complete: true,
        }
    }
}

/// A raw packet as delivered by the hardware interface.
#[derive(Debug, Clone, PartialEq)]
pub struct Packet {
    /// Receive time since the Unix epoch.
    pub stamp: Duration,
    pub data: Vec<u8>,
}

impl Packet {
    pub fn new(stamp: Duration, data: Vec<u8>) -> Self {
        Self { stamp, data }
    }
}

/// A stateful packet decoder bound to one sensor/calibration pair.
pub trait Decoder: Send {
    /// Decode one packet.
    ///
    /// An error only concerns this packet; the decoder must stay usable for
    /// the next one.
    fn decode_packet(&mut self, packet: &[u8]) -> Result<DecodedPacket>;
}

/// Builds decoders from configuration snapshots.
pub trait DriverFactory: Send + Sync {
    type Driver: Decoder;

    /// Build a decoder, or fail with [`Error::DriverConstruction`] when the
    /// pair is not a valid combination.
    ///
    /// [`Error::DriverConstruction`]: crate::Error::DriverConstruction
    fn build(
        &self,
        sensor: &Arc<SensorConfiguration>,
        calibration: &Arc<CalibrationConfiguration>,
    ) -> Result<Self::Driver>;
}

impl<D: Decoder + ?Sized> Decoder for Box<D> {
    fn decode_packet(&mut self, packet: &[u8]) -> Result<DecodedPacket> {
        (**self).decode_packet(packet)
    }
}
