//! The decoder wrapper: entry points for packets, configuration and
//! calibration changes, and runtime parameter updates.

use crate::{
    calibration::CalibrationConfiguration,
    config::{SensorConfiguration, WrapperConfig},
    driver::{DriverFactory, Packet},
    error::{Error, Result, Status},
    hw_interface::HwInterface,
    params::{self, Parameter, SetParametersResult},
    resolver::{CalibrationResolver, CalibrationResult},
    scan::{PointCloud, ScanPackets},
    slot::{Change, DriverSlot, PacketOutcome, SwapOutcome},
    watchdog::Watchdog,
};
use flume::TrySendError;
use futures::stream::{BoxStream, StreamExt};
use parking_lot::Mutex;
use std::{
    path::{Path, PathBuf},
    sync::{Arc, Weak},
};
use tokio::{
    task::JoinHandle,
    time::{Instant, MissedTickBehavior},
};
use tracing::{debug, error, info, warn};

/// Stream of finalized clouds returned by [`Outputs::cloud_stream`].
pub type CloudStream = BoxStream<'static, PointCloud>;

/// Receiving ends of the wrapper's sinks.
#[derive(Debug)]
pub struct Outputs {
    /// One cloud per completed scan, in arrival order.
    pub clouds: flume::Receiver<PointCloud>,
    /// Raw packets per scan; present when packet publishing is enabled.
    pub packets: Option<flume::Receiver<ScanPackets>>,
}

impl Outputs {
    /// The cloud receiver as an async stream.
    pub fn cloud_stream(&self) -> CloudStream {
        self.clouds.clone().into_stream().boxed()
    }
}

/// Counters describing the packet pipeline.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WrapperStats {
    pub packets_received: u64,
    /// Packets that arrived while no driver was installed.
    pub packets_dropped: u64,
    pub decode_errors: u64,
    pub clouds_published: u64,
    /// Clouds lost because the sink was full.
    pub clouds_discarded: u64,
    /// Scans dropped for exceeding the packet limit.
    pub scans_overflowed: u64,
    /// Generation of the installed driver.
    pub driver_generation: Option<u64>,
}

/// Slot and counters, guarded together.
struct Pipeline<D> {
    slot: DriverSlot<D>,
    stats: WrapperStats,
}

/// Bridges a hardware interface and a decoder to the cloud sink.
///
/// All methods take `&self` and may be called from any thread. Packet
/// processing and driver replacement are serialized by one lock, so every
/// packet is decoded by a fully constructed driver. Calibration file I/O
/// runs outside that lock.
pub struct DecoderWrapper<F>
where
    F: DriverFactory,
{
    factory: F,
    resolver: CalibrationResolver,
    pipeline: Mutex<Pipeline<F::Driver>>,
    status: Mutex<Status>,
    calibration_file: Mutex<PathBuf>,
    watchdog: Watchdog,
    cloud_tx: flume::Sender<PointCloud>,
    packets_tx: Option<flume::Sender<ScanPackets>>,
}

impl<F> DecoderWrapper<F>
where
    F: DriverFactory,
{
    /// Create a wrapper with an empty driver slot.
    ///
    /// Nothing is decoded until [`Self::initialize`] or both
    /// [`Self::on_config_change`] and [`Self::on_calibration_change`] have
    /// supplied their inputs. A zero watchdog timeout or channel capacity is
    /// replaced by its default, see [`WrapperConfig::sanitized`].
    pub fn new(
        factory: F,
        hw_interface: Option<Arc<dyn HwInterface>>,
        config: WrapperConfig,
    ) -> (Self, Outputs) {
        let config = config.sanitized();
        let (cloud_tx, cloud_rx) = flume::bounded(config.channel_capacity);
        let (packets_tx, packets_rx) = if config.publish_packets {
            let (tx, rx) = flume::bounded(config.channel_capacity);
            (Some(tx), Some(rx))
        } else {
            (None, None)
        };

        let wrapper = Self {
            factory,
            resolver: CalibrationResolver::new(hw_interface),
            pipeline: Mutex::new(Pipeline {
                slot: DriverSlot::new(config.publish_packets, config.max_packets_per_scan),
                stats: WrapperStats::default(),
            }),
            status: Mutex::new(Status::Ok),
            calibration_file: Mutex::new(config.calibration_file),
            watchdog: Watchdog::new(config.watchdog_timeout),
            cloud_tx,
            packets_tx,
        };
        let outputs = Outputs {
            clouds: cloud_rx,
            packets: packets_rx,
        };

        (wrapper, outputs)
    }

    /// Apply the initial sensor configuration and resolve calibration with
    /// the full source policy.
    pub fn initialize(&self, sensor: SensorConfiguration) -> Result<SwapOutcome> {
        self.on_config_change(Arc::new(sensor))?;

        let calibration_file = self.calibration_file();
        let resolution = self.get_calibration_data(&calibration_file, false)?;
        let outcome = self.on_calibration_change(resolution.calibration)?;

        // A successful install clears an earlier error status, so the
        // warning is recorded again afterwards.
        if let Some(warning) = resolution.warning {
            self.degrade(warning);
        }

        Ok(outcome)
    }

    /// Resolve calibration data and record failures in the status.
    ///
    /// See [`CalibrationResolver::resolve`] for the source policy.
    pub fn get_calibration_data(
        &self,
        calibration_file: &Path,
        ignore_others: bool,
    ) -> CalibrationResult {
        match self.resolver.resolve(calibration_file, ignore_others) {
            Ok(resolution) => {
                let mut status = self.status.lock();
                match &resolution.warning {
                    Some(warning) if !status.is_error() => {
                        *status = Status::Degraded(warning.clone());
                    }
                    None if matches!(&*status, Status::Degraded(Error::CalibrationSave { .. })) => {
                        info!("Calibration resolved cleanly, clearing cache warning");
                        *status = Status::Ok;
                    }
                    _ => {}
                }
                Ok(resolution)
            }
            Err(err) => {
                error!(error = %err, "Failed to get calibration data");
                *self.status.lock() = Status::Error(err.clone());
                Err(err)
            }
        }
    }

    /// Replace the sensor configuration.
    pub fn on_config_change(&self, sensor: Arc<SensorConfiguration>) -> Result<SwapOutcome> {
        if let Err(err) = sensor.validate() {
            error!(error = %err, "Rejected sensor configuration");
            *self.status.lock() = Status::Error(err.clone());
            return Err(err);
        }

        let mut pipeline = self.pipeline.lock();
        self.install(&mut pipeline, Change::Sensor(sensor))
    }

    /// Replace the calibration.
    pub fn on_calibration_change(
        &self,
        calibration: Arc<CalibrationConfiguration>,
    ) -> Result<SwapOutcome> {
        let mut pipeline = self.pipeline.lock();
        self.install(&mut pipeline, Change::Calibration(calibration))
    }

    /// Decode one packet and publish the cloud if it completes a scan.
    ///
    /// Never fails: packets without a driver and undecodable packets are
    /// logged and skipped.
    pub fn process_cloud_packet(&self, packet: Packet) {
        let mut pipeline = self.pipeline.lock();
        pipeline.stats.packets_received += 1;

        match pipeline.slot.process(packet) {
            PacketOutcome::NoDriver => {
                pipeline.stats.packets_dropped += 1;
                debug!("No driver installed, dropping packet");
            }
            PacketOutcome::DecodeFailed(err) => {
                pipeline.stats.decode_errors += 1;
                warn!(error = %err, "Failed to decode packet");
            }
            PacketOutcome::Accumulated => {}
            PacketOutcome::ScanOverflow { discarded_points } => {
                pipeline.stats.scans_overflowed += 1;
                warn!(
                    discarded_points,
                    "No scan boundary within packet limit, discarding scan"
                );
            }
            PacketOutcome::ScanComplete(cloud, packets) => {
                self.publish(&mut pipeline.stats, cloud, packets);
            }
        }
    }

    /// Handle a runtime parameter update.
    ///
    /// Accepts `calibration_file` and the sensor parameters described in
    /// [`crate::params`]. The update is applied as a whole or not at all.
    pub fn on_parameter_change(&self, parameters: &[Parameter]) -> SetParametersResult {
        let calibration_file = match params::find_string(parameters, params::CALIBRATION_FILE) {
            Ok(path) => path.map(PathBuf::from),
            Err(err) => return SetParametersResult::failure(err.to_string()),
        };

        let calibration = match &calibration_file {
            None => None,
            Some(path) if !path.exists() => {
                return SetParametersResult::failure(format!(
                    "The given calibration path does not exist, ignoring: '{}'",
                    path.display()
                ));
            }
            Some(path) => match self.resolver.resolve(path, true) {
                Ok(resolution) => Some(resolution.calibration),
                Err(err) => {
                    return SetParametersResult::failure(format!(
                        "Could not change calibration file to '{}': {err}",
                        path.display()
                    ));
                }
            },
        };

        let mut pipeline = self.pipeline.lock();

        let sensor = match pipeline.slot.sensor() {
            Some(current) => match params::apply_sensor_parameters(current, parameters) {
                Ok(sensor) => sensor.map(Arc::new),
                Err(err) => return SetParametersResult::failure(err.to_string()),
            },
            None => None,
        };

        let change = match (sensor, calibration) {
            (None, None) => return SetParametersResult::success(),
            (Some(sensor), None) => Change::Sensor(sensor),
            (None, Some(calibration)) => Change::Calibration(calibration),
            (Some(sensor), Some(calibration)) => Change::Both {
                sensor,
                calibration,
            },
        };

        if let Err(err) = self.install(&mut pipeline, change) {
            return SetParametersResult::failure(err.to_string());
        }
        drop(pipeline);

        if let Some(path) = calibration_file {
            info!(path = %path.display(), "Changed calibration file");
            *self.calibration_file.lock() = path;
        }

        SetParametersResult::success()
    }

    /// Current health.
    pub fn status(&self) -> Status {
        self.status.lock().clone()
    }

    pub fn stats(&self) -> WrapperStats {
        self.pipeline.lock().stats.clone()
    }

    /// The fallback calibration file currently in use.
    pub fn calibration_file(&self) -> PathBuf {
        self.calibration_file.lock().clone()
    }

    /// The sensor configuration of the installed or pending driver.
    pub fn sensor_configuration(&self) -> Option<Arc<SensorConfiguration>> {
        self.pipeline.lock().slot.sensor().cloned()
    }

    /// The calibration of the installed or pending driver.
    pub fn calibration_configuration(&self) -> Option<Arc<CalibrationConfiguration>> {
        self.pipeline.lock().slot.calibration().cloned()
    }

    /// Check the output deadline now. See [`Self::check_watchdog_at`].
    pub fn check_watchdog(&self) -> bool {
        self.check_watchdog_at(Instant::now())
    }

    /// Check whether a cloud was published within the watchdog timeout
    /// before `now`, and update the status accordingly.
    ///
    /// A missed deadline replaces `Ok` or any other degradation with
    /// `Degraded(MissedDeadline)`; an `Error` status is left alone. A met
    /// deadline clears a missed-deadline degradation. Before a driver is
    /// installed the check always passes.
    pub fn check_watchdog_at(&self, now: Instant) -> bool {
        let pipeline = self.pipeline.lock();
        if !pipeline.slot.has_driver() {
            return true;
        }

        let alive = self.watchdog.is_alive_at(now);
        let mut status = self.status.lock();
        let stalled = matches!(&*status, Status::Degraded(Error::MissedDeadline(_)));

        if !alive && !stalled && !status.is_error() {
            // A stall outranks any other degradation, but not an error.
            warn!(
                elapsed = ?self.watchdog.elapsed_at(now),
                timeout = ?self.watchdog.timeout(),
                previous = %*status,
                "Missed pointcloud output deadline"
            );
            *status = Status::Degraded(Error::MissedDeadline(self.watchdog.timeout()));
        } else if alive && stalled {
            info!("Pointcloud output resumed");
            *status = Status::Ok;
        }

        alive
    }

    fn install(&self, pipeline: &mut Pipeline<F::Driver>, change: Change) -> Result<SwapOutcome> {
        match pipeline.slot.apply(&self.factory, change) {
            Ok(SwapOutcome::Installed { generation }) => {
                info!(generation, "Installed new driver");
                pipeline.stats.driver_generation = Some(generation);
                self.watchdog.update();

                // Errors and calibration warnings belong to the replaced
                // inputs. A stall clears on the next published cloud.
                let mut status = self.status.lock();
                if !matches!(&*status, Status::Ok | Status::Degraded(Error::MissedDeadline(_))) {
                    info!(previous = %*status, "Cleared status after driver install");
                    *status = Status::Ok;
                }
                Ok(SwapOutcome::Installed { generation })
            }
            Ok(SwapOutcome::AwaitingInputs) => {
                debug!("Driver inputs incomplete, slot stays as is");
                Ok(SwapOutcome::AwaitingInputs)
            }
            Err(err) => {
                error!(
                    error = %err,
                    generation = ?pipeline.slot.generation(),
                    "Failed to build driver, keeping previous one"
                );
                *self.status.lock() = Status::Error(err.clone());
                Err(err)
            }
        }
    }

    fn publish(&self, stats: &mut WrapperStats, cloud: PointCloud, packets: Option<ScanPackets>) {
        self.watchdog.update();

        let sequence = cloud.sequence;
        match self.cloud_tx.try_send(cloud) {
            Ok(()) => stats.clouds_published += 1,
            Err(TrySendError::Full(_)) => {
                stats.clouds_discarded += 1;
                warn!(sequence, "Cloud sink is full, discarding cloud");
            }
            Err(TrySendError::Disconnected(_)) => {
                debug!(sequence, "Cloud sink closed, discarding cloud");
            }
        }

        if let (Some(tx), Some(packets)) = (&self.packets_tx, packets) {
            match tx.try_send(packets) {
                Ok(()) => {}
                Err(TrySendError::Full(_)) => {
                    warn!(sequence, "Packet sink is full, discarding scan packets");
                }
                Err(TrySendError::Disconnected(_)) => {
                    debug!(sequence, "Packet sink closed, discarding scan packets");
                }
            }
        }

        let mut status = self.status.lock();
        if matches!(&*status, Status::Degraded(Error::MissedDeadline(_))) {
            info!("Pointcloud output resumed");
            *status = Status::Ok;
        }
    }

    fn degrade(&self, err: Error) {
        let mut status = self.status.lock();
        if !status.is_error() {
            *status = Status::Degraded(err);
        }
    }
}

impl<F> DecoderWrapper<F>
where
    F: DriverFactory + 'static,
{
    /// Spawn a task checking the output deadline once per watchdog period.
    ///
    /// The task ends once the wrapper is dropped. Must be called from within
    /// a tokio runtime.
    pub fn spawn_watchdog(self: &Arc<Self>) -> JoinHandle<()> {
        let wrapper: Weak<Self> = Arc::downgrade(self);
        let period = self.watchdog.timeout();

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first tick completes immediately.
            ticker.tick().await;

            loop {
                ticker.tick().await;
                let Some(wrapper) = wrapper.upgrade() else {
                    break;
                };
                wrapper.check_watchdog();
            }
        })
    }
}
