use parking_lot::Mutex;
use scanlink_core::{
    CalibrationConfiguration, DecodedPacket, Decoder, DecoderWrapper, DriverFactory, Error,
    HwInterface, Outputs, Packet, Point, ReturnMode, SensorConfiguration, WrapperConfig,
};
use std::{
    fs,
    path::{Path, PathBuf},
    sync::{
        Arc,
        atomic::{AtomicU8, AtomicUsize, Ordering},
    },
    time::Duration,
};

/// Packet byte that closes a scan.
#[allow(dead_code)]
pub const END_OF_SCAN: u8 = 0xFF;

pub const FACTORY_CALIBRATION: &str = "\
Laser id,Elevation,Azimuth
1,15.0,-1.0
2,11.0,-1.0
3,7.0,-1.0
";

pub const SENSOR_CALIBRATION: &str = "\
Laser id,Elevation,Azimuth
1,15.1,-1.1
2,11.1,-1.1
";

pub const CACHED_CALIBRATION: &str = "\
Laser id,Elevation,Azimuth
1,15.2,-1.2
";

/// Decoder emitting one point per non-empty packet, with the number of the
/// build that created it as intensity. Empty packets fail to decode.
pub struct TagDecoder {
    pub tag: u8,
}

impl Decoder for TagDecoder {
    fn decode_packet(&mut self, packet: &[u8]) -> scanlink_core::Result<DecodedPacket> {
        let Some(&first) = packet.first() else {
            return Err(Error::Decode("empty packet".to_string()));
        };
        Ok(DecodedPacket {
            points: vec![Point {
                x: first as f32,
                y: 0.0,
                z: 0.0,
                intensity: self.tag,
                channel: 0,
            }],
            scan_complete: first == END_OF_SCAN,
        })
    }
}

/// Factory numbering its builds from 1. Sensors in dual-return mode are
/// rejected.
#[derive(Default)]
pub struct TagFactory {
    builds: AtomicU8,
}

impl TagFactory {
    #[allow(dead_code)]
    pub fn builds(&self) -> u8 {
        self.builds.load(Ordering::SeqCst)
    }
}

impl DriverFactory for TagFactory {
    type Driver = TagDecoder;

    fn build(
        &self,
        sensor: &Arc<SensorConfiguration>,
        _calibration: &Arc<CalibrationConfiguration>,
    ) -> scanlink_core::Result<TagDecoder> {
        if sensor.return_mode == ReturnMode::Dual {
            return Err(Error::DriverConstruction(
                "dual return is not supported".to_string(),
            ));
        }
        let tag = self.builds.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(TagDecoder { tag })
    }
}

/// Hardware interface with a scripted connection state and download result.
#[allow(dead_code)]
pub struct FakeHw {
    connected: bool,
    download: Mutex<scanlink_core::Result<String>>,
    downloads: AtomicUsize,
}

#[allow(dead_code)]
impl FakeHw {
    pub fn connected(download: scanlink_core::Result<String>) -> Arc<Self> {
        Arc::new(Self {
            connected: true,
            download: Mutex::new(download),
            downloads: AtomicUsize::new(0),
        })
    }

    pub fn disconnected() -> Arc<Self> {
        Arc::new(Self {
            connected: false,
            download: Mutex::new(Err(Error::SensorNotConnected)),
            downloads: AtomicUsize::new(0),
        })
    }

    pub fn downloads(&self) -> usize {
        self.downloads.load(Ordering::SeqCst)
    }
}

impl HwInterface for FakeHw {
    fn is_connected(&self) -> bool {
        self.connected
    }

    fn download_calibration(&self) -> scanlink_core::Result<String> {
        self.downloads.fetch_add(1, Ordering::SeqCst);
        self.download.lock().clone()
    }
}

#[allow(dead_code)]
pub fn sensor() -> SensorConfiguration {
    SensorConfiguration {
        sensor_model: "Pandar64".to_string(),
        sensor_ip: "192.168.1.201".parse().unwrap(),
        host_ip: "192.168.1.100".parse().unwrap(),
        data_port: 2368,
        frame_id: "lidar_top".to_string(),
        return_mode: ReturnMode::Strongest,
        rotation_speed: 600,
        cloud_min_angle: 0,
        cloud_max_angle: 360,
        min_range: 0.3,
        max_range: 300.0,
    }
}

#[allow(dead_code)]
pub fn calibration() -> Arc<CalibrationConfiguration> {
    Arc::new(CalibrationConfiguration::parse(FACTORY_CALIBRATION, "test").unwrap())
}

#[allow(dead_code)]
pub fn packet(byte: u8) -> Packet {
    Packet::new(Duration::from_millis(byte as u64), vec![byte])
}

#[allow(dead_code)]
pub fn write_file(dir: &Path, name: &str, contents: &str) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, contents).unwrap();
    path
}

/// A wrapper with the given fallback calibration file and no hardware.
#[allow(dead_code)]
pub fn wrapper(calibration_file: &Path) -> (DecoderWrapper<TagFactory>, Outputs) {
    DecoderWrapper::new(
        TagFactory::default(),
        None,
        WrapperConfig::new(calibration_file).with_channel_capacity(64),
    )
}

/// A wrapper with a driver already installed.
#[allow(dead_code)]
pub fn ready_wrapper() -> (DecoderWrapper<TagFactory>, Outputs) {
    let (wrapper, outputs) = wrapper(Path::new("unused.csv"));
    wrapper.on_config_change(Arc::new(sensor())).unwrap();
    wrapper.on_calibration_change(calibration()).unwrap();
    (wrapper, outputs)
}
