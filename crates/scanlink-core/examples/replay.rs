use futures::stream::StreamExt;
use scanlink_core::{
    CalibrationConfiguration, Config, DecodedPacket, Decoder, DecoderWrapper, DriverFactory,
    Packet, Point, SensorConfiguration, WrapperConfig,
};
use std::{sync::Arc, time::Duration};
use tracing_subscriber::EnvFilter;

const PACKETS_PER_SCAN: u32 = 36;

// A toy decoder: every packet carries one azimuth step (10 degrees) and yields
// a point per calibrated channel.
struct RingDecoder {
    calibration: Arc<CalibrationConfiguration>,
    max_range: f32,
}

impl Decoder for RingDecoder {
    fn decode_packet(&mut self, packet: &[u8]) -> scanlink_core::Result<DecodedPacket> {
        let &[step, ..] = packet else {
            return Err(scanlink_core::Error::Decode("empty packet".to_string()));
        };
        let azimuth = (step as f32 * 10.0).to_radians();
        let range = self.max_range.min(10.0);

        let points = self
            .calibration
            .channels()
            .map(|(channel, correction)| {
                let elevation = correction.elevation.to_radians();
                Point {
                    x: range * elevation.cos() * azimuth.cos(),
                    y: range * elevation.cos() * azimuth.sin(),
                    z: range * elevation.sin(),
                    intensity: 100,
                    channel,
                }
            })
            .collect();

        Ok(DecodedPacket {
            points,
            scan_complete: step as u32 == PACKETS_PER_SCAN - 1,
        })
    }
}

struct RingFactory;

impl DriverFactory for RingFactory {
    type Driver = RingDecoder;

    fn build(
        &self,
        sensor: &Arc<SensorConfiguration>,
        calibration: &Arc<CalibrationConfiguration>,
    ) -> scanlink_core::Result<RingDecoder> {
        Ok(RingDecoder {
            calibration: calibration.clone(),
            max_range: sensor.max_range as f32,
        })
    }
}

#[tokio::main]
async fn main() -> eyre::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // Pass a YAML config to use it; otherwise a built-in one is used.
    let config = match std::env::args().nth(1) {
        Some(path) => Config::load(path)?,
        None => Config {
            sensor: serde_yaml::from_str(
                "sensor_model: Pandar64\nsensor_ip: 192.168.1.201\nhost_ip: 192.168.1.100\n",
            )?,
            wrapper: WrapperConfig::new(std::env::temp_dir().join("scanlink_replay.csv")),
        },
    };

    // Seed the fallback file so resolution succeeds without a sensor.
    let calibration_file = config.wrapper.calibration_file.clone();
    if !calibration_file.exists() {
        let calibration = CalibrationConfiguration::parse(
            "Laser id,Elevation,Azimuth\n1,15.0,0.0\n2,5.0,0.0\n3,-5.0,0.0\n4,-15.0,0.0\n",
            "replay",
        )?;
        calibration.save_to_file(&calibration_file)?;
    }

    let (wrapper, outputs) = DecoderWrapper::new(RingFactory, None, config.wrapper);
    let wrapper = Arc::new(wrapper);
    wrapper.initialize(config.sensor)?;
    let _watchdog = wrapper.spawn_watchdog();

    // Replay three scans at 10 Hz.
    let producer = {
        let wrapper = wrapper.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(Duration::from_millis(100) / PACKETS_PER_SCAN);
            for index in 0..PACKETS_PER_SCAN * 3 {
                ticker.tick().await;
                let step = (index % PACKETS_PER_SCAN) as u8;
                let stamp = Duration::from_millis(index as u64 * 100 / PACKETS_PER_SCAN as u64);
                wrapper.process_cloud_packet(Packet::new(stamp, vec![step]));
            }
        })
    };

    let clouds: Vec<_> = outputs.cloud_stream().take(3).collect().await;
    producer.await?;

    for cloud in &clouds {
        println!(
            "cloud #{} frame={} points={} generation={}",
            cloud.sequence,
            cloud.frame_id,
            cloud.len(),
            cloud.driver_generation
        );
    }
    println!("status: {}", wrapper.status());
    println!("{:#?}", wrapper.stats());

    Ok(())
}
