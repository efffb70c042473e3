//! The driver slot: the single live decoder together with the snapshots it
//! was built from and the scan it is assembling.
//!
//! The slot itself is not synchronized. [`DecoderWrapper`] keeps it behind
//! one mutex so that packet processing and driver replacement never
//! interleave.
//!
//! [`DecoderWrapper`]: crate::DecoderWrapper

use crate::{
    calibration::CalibrationConfiguration,
    config::SensorConfiguration,
    driver::{Decoder, DriverFactory, Packet},
    error::{Error, Result},
    scan::{PointCloud, ScanAssembler, ScanPackets, ScanProgress},
};
use std::sync::Arc;
use tracing::debug;

/// A change delivered to the slot.
#[derive(Debug, Clone)]
pub enum Change {
    Sensor(Arc<SensorConfiguration>),
    Calibration(Arc<CalibrationConfiguration>),
    /// Both inputs replaced together, yielding at most one new driver.
    Both {
        sensor: Arc<SensorConfiguration>,
        calibration: Arc<CalibrationConfiguration>,
    },
}

/// Result of applying a [`Change`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SwapOutcome {
    /// A new driver was built and installed.
    Installed { generation: u64 },
    /// The change was stored, but the other input is still missing.
    AwaitingInputs,
}

/// Result of feeding one packet to the slot.
#[derive(Debug)]
pub enum PacketOutcome {
    /// No driver installed yet; the packet was dropped.
    NoDriver,
    /// The driver rejected the packet.
    DecodeFailed(Error),
    /// The packet was added to the scan in progress.
    Accumulated,
    /// The packet closed a scan.
    ScanComplete(PointCloud, Option<ScanPackets>),
    /// The scan reached the packet limit without a boundary and was dropped.
    ScanOverflow { discarded_points: usize },
}

struct ActiveDriver<D> {
    driver: D,
    generation: u64,
}

pub struct DriverSlot<D> {
    sensor: Option<Arc<SensorConfiguration>>,
    calibration: Option<Arc<CalibrationConfiguration>>,
    active: Option<ActiveDriver<D>>,
    scan: ScanAssembler,
    last_generation: u64,
}

impl<D> DriverSlot<D>
where
    D: Decoder,
{
    pub fn new(record_packets: bool, max_packets_per_scan: usize) -> Self {
        Self {
            sensor: None,
            calibration: None,
            active: None,
            scan: ScanAssembler::new(record_packets, max_packets_per_scan),
            last_generation: 0,
        }
    }

    /// Store `change` and, if both inputs are known, replace the driver.
    ///
    /// When the factory fails nothing is modified: the previous snapshots and
    /// driver stay in place.
    pub fn apply<F>(&mut self, factory: &F, change: Change) -> Result<SwapOutcome>
    where
        F: DriverFactory<Driver = D>,
    {
        let (sensor, calibration) = match change {
            Change::Sensor(sensor) => (Some(sensor), self.calibration.clone()),
            Change::Calibration(calibration) => (self.sensor.clone(), Some(calibration)),
            Change::Both {
                sensor,
                calibration,
            } => (Some(sensor), Some(calibration)),
        };

        let (Some(sensor), Some(calibration)) = (sensor.clone(), calibration.clone()) else {
            self.sensor = sensor;
            self.calibration = calibration;
            return Ok(SwapOutcome::AwaitingInputs);
        };

        let driver = factory.build(&sensor, &calibration)?;

        let discarded = self.scan.discard();
        if discarded > 0 {
            debug!(
                discarded_points = discarded,
                "Discarded partial scan of replaced driver"
            );
        }

        self.last_generation += 1;
        let generation = self.last_generation;
        self.sensor = Some(sensor);
        self.calibration = Some(calibration);
        self.active = Some(ActiveDriver { driver, generation });

        Ok(SwapOutcome::Installed { generation })
    }

    /// Decode `packet` with the installed driver.
    pub fn process(&mut self, packet: Packet) -> PacketOutcome {
        let (Some(active), Some(sensor)) = (self.active.as_mut(), self.sensor.as_ref()) else {
            return PacketOutcome::NoDriver;
        };

        let decoded = match active.driver.decode_packet(&packet.data) {
            Ok(decoded) => decoded,
            Err(err) => return PacketOutcome::DecodeFailed(err),
        };

        match self
            .scan
            .push(packet, decoded, &sensor.frame_id, active.generation)
        {
            ScanProgress::Pending => PacketOutcome::Accumulated,
            ScanProgress::Complete(cloud, packets) => PacketOutcome::ScanComplete(cloud, packets),
            ScanProgress::Overflow { discarded_points } => {
                PacketOutcome::ScanOverflow { discarded_points }
            }
        }
    }

    /// Generation of the installed driver, if any.
    pub fn generation(&self) -> Option<u64> {
        self.active.as_ref().map(|active| active.generation)
    }

    pub fn has_driver(&self) -> bool {
        self.active.is_some()
    }

    pub fn sensor(&self) -> Option<&Arc<SensorConfiguration>> {
        self.sensor.as_ref()
    }

    pub fn calibration(&self) -> Option<&Arc<CalibrationConfiguration>> {
        self.calibration.as_ref()
    }

    pub fn pending_points(&self) -> usize {
        self.scan.pending_points()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        calibration::ChannelCorrection,
        config::ReturnMode,
        driver::{DecodedPacket, Point},
    };
    use std::time::Duration;

    /// Emits one point per packet with the low byte of the configured
    /// rotation speed as intensity; `0xFF` closes the scan.
    struct TagDecoder {
        tag: u8,
    }

    impl Decoder for TagDecoder {
        fn decode_packet(&mut self, packet: &[u8]) -> Result<DecodedPacket> {
            match packet.first() {
                None => Err(Error::Decode("empty packet".to_string())),
                Some(&byte) => Ok(DecodedPacket {
                    points: vec![Point {
                        x: 0.0,
                        y: 0.0,
                        z: 0.0,
                        intensity: self.tag,
                        channel: 0,
                    }],
                    scan_complete: byte == 0xFF,
                }),
            }
        }
    }

    struct TagFactory;

    impl DriverFactory for TagFactory {
        type Driver = TagDecoder;

        fn build(
            &self,
            sensor: &Arc<SensorConfiguration>,
            _calibration: &Arc<CalibrationConfiguration>,
        ) -> Result<TagDecoder> {
            if sensor.return_mode == ReturnMode::Dual {
                return Err(Error::DriverConstruction("dual return unsupported".to_string()));
            }
            Ok(TagDecoder {
                tag: sensor.rotation_speed as u8,
            })
        }
    }

    fn sensor(rotation_speed: u16, return_mode: ReturnMode) -> Arc<SensorConfiguration> {
        Arc::new(SensorConfiguration {
            sensor_model: "Test".to_string(),
            sensor_ip: "192.168.1.201".parse().unwrap(),
            host_ip: "192.168.1.100".parse().unwrap(),
            data_port: 2368,
            frame_id: "lidar".to_string(),
            return_mode,
            rotation_speed,
            cloud_min_angle: 0,
            cloud_max_angle: 360,
            min_range: 0.3,
            max_range: 300.0,
        })
    }

    fn calibration() -> Arc<CalibrationConfiguration> {
        let corr = ChannelCorrection {
            elevation: 0.0,
            azimuth: 0.0,
        };
        Arc::new(CalibrationConfiguration::from_channels([(1, corr)]).unwrap())
    }

    fn packet(byte: u8) -> Packet {
        Packet::new(Duration::ZERO, vec![byte])
    }

    #[test]
    fn test_awaits_both_inputs() {
        let mut slot = DriverSlot::new(false, 1000);
        let outcome = slot
            .apply(&TagFactory, Change::Sensor(sensor(600, ReturnMode::Strongest)))
            .unwrap();
        assert_eq!(outcome, SwapOutcome::AwaitingInputs);
        assert!(!slot.has_driver());
        assert!(matches!(slot.process(packet(1)), PacketOutcome::NoDriver));

        let outcome = slot
            .apply(&TagFactory, Change::Calibration(calibration()))
            .unwrap();
        assert_eq!(outcome, SwapOutcome::Installed { generation: 1 });
        assert_eq!(slot.generation(), Some(1));
    }

    #[test]
    fn test_failed_build_keeps_previous() {
        let mut slot = DriverSlot::new(false, 1000);
        let good = sensor(600, ReturnMode::Strongest);
        slot.apply(&TagFactory, Change::Calibration(calibration()))
            .unwrap();
        slot.apply(&TagFactory, Change::Sensor(good.clone())).unwrap();

        let err = slot
            .apply(&TagFactory, Change::Sensor(sensor(600, ReturnMode::Dual)))
            .unwrap_err();
        assert!(matches!(err, Error::DriverConstruction(_)));
        assert_eq!(slot.generation(), Some(1));
        assert_eq!(slot.sensor(), Some(&good));
        assert!(matches!(slot.process(packet(1)), PacketOutcome::Accumulated));
    }

    #[test]
    fn test_swap_discards_partial_scan() {
        let mut slot = DriverSlot::new(false, 1000);
        slot.apply(&TagFactory, Change::Calibration(calibration()))
            .unwrap();
        slot.apply(&TagFactory, Change::Sensor(sensor(600, ReturnMode::Strongest)))
            .unwrap();

        slot.process(packet(1));
        slot.process(packet(2));
        assert_eq!(slot.pending_points(), 2);

        slot.apply(&TagFactory, Change::Sensor(sensor(1200, ReturnMode::Strongest)))
            .unwrap();
        assert_eq!(slot.pending_points(), 0);

        let PacketOutcome::ScanComplete(cloud, _) = slot.process(packet(0xFF)) else {
            panic!("expected a complete scan");
        };
        assert_eq!(cloud.driver_generation, 2);
        assert_eq!(cloud.len(), 1);
        assert!(cloud.points.iter().all(|p| p.intensity == (1200u16 as u8)));
    }

    #[test]
    fn test_decode_error_does_not_interrupt() {
        let mut slot = DriverSlot::new(false, 1000);
        slot.apply(&TagFactory, Change::Calibration(calibration()))
            .unwrap();
        slot.apply(&TagFactory, Change::Sensor(sensor(600, ReturnMode::Strongest)))
            .unwrap();

        slot.process(packet(1));
        let outcome = slot.process(Packet::new(Duration::ZERO, vec![]));
        assert!(matches!(outcome, PacketOutcome::DecodeFailed(Error::Decode(_))));

        let PacketOutcome::ScanComplete(cloud, _) = slot.process(packet(0xFF)) else {
            panic!("expected a complete scan");
        };
        assert_eq!(cloud.len(), 2);
    }
}
