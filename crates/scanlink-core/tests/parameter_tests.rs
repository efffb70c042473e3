mod common;

use common::*;
use scanlink_core::{Parameter, ParameterValue, ReturnMode, SwapOutcome};
use tempfile::TempDir;

#[test]
fn test_calibration_file_change() {
    let dir = TempDir::new().unwrap();
    let first = write_file(dir.path(), "first.csv", FACTORY_CALIBRATION);
    let second = write_file(dir.path(), "second.csv", CACHED_CALIBRATION);
    // A cached download next to the new file must not be preferred.
    write_file(dir.path(), "second_from_sensor.csv", SENSOR_CALIBRATION);

    let (wrapper, _outputs) = wrapper(&first);
    wrapper.initialize(sensor()).unwrap();

    let result = wrapper.on_parameter_change(&[Parameter::string(
        "calibration_file",
        second.to_string_lossy(),
    )]);
    assert!(result.successful, "{}", result.reason);
    assert_eq!(wrapper.calibration_file(), second);
    assert_eq!(wrapper.calibration_configuration().unwrap().len(), 1);
    assert_eq!(wrapper.stats().driver_generation, Some(2));
}

#[test]
fn test_missing_calibration_file_is_rejected() {
    let dir = TempDir::new().unwrap();
    let first = write_file(dir.path(), "first.csv", FACTORY_CALIBRATION);
    let missing = dir.path().join("missing.csv");

    let (wrapper, _outputs) = wrapper(&first);
    wrapper.initialize(sensor()).unwrap();

    let result = wrapper.on_parameter_change(&[Parameter::string(
        "calibration_file",
        missing.to_string_lossy(),
    )]);
    assert!(!result.successful);
    assert!(result.reason.contains("does not exist"));
    assert_eq!(wrapper.calibration_file(), first);
    assert_eq!(wrapper.stats().driver_generation, Some(1));
    assert!(wrapper.status().is_ok());
}

#[test]
fn test_malformed_calibration_file_is_rejected() {
    let dir = TempDir::new().unwrap();
    let first = write_file(dir.path(), "first.csv", FACTORY_CALIBRATION);
    let broken = write_file(dir.path(), "broken.csv", "Laser id,Elevation\n1,2\n");

    let (wrapper, _outputs) = wrapper(&first);
    wrapper.initialize(sensor()).unwrap();

    let result = wrapper.on_parameter_change(&[Parameter::string(
        "calibration_file",
        broken.to_string_lossy(),
    )]);
    assert!(!result.successful);
    assert!(result.reason.starts_with("Could not change calibration file"));
    assert_eq!(wrapper.calibration_file(), first);
}

#[test]
fn test_sensor_parameters_rebuild_driver() {
    let (wrapper, outputs) = ready_wrapper();

    let result = wrapper.on_parameter_change(&[
        Parameter::string("frame_id", "lidar_front"),
        Parameter::integer("rotation_speed", 1200),
        Parameter::double("max_range", 120.0),
    ]);
    assert!(result.successful, "{}", result.reason);

    let sensor = wrapper.sensor_configuration().unwrap();
    assert_eq!(sensor.frame_id, "lidar_front");
    assert_eq!(sensor.rotation_speed, 1200);
    assert_eq!(sensor.max_range, 120.0);
    assert_eq!(wrapper.stats().driver_generation, Some(2));

    wrapper.process_cloud_packet(packet(END_OF_SCAN));
    assert_eq!(outputs.clouds.try_recv().unwrap().frame_id, "lidar_front");
}

#[test]
fn test_unknown_parameters_are_ignored() {
    let (wrapper, _outputs) = ready_wrapper();

    let result = wrapper.on_parameter_change(&[Parameter::new(
        "diagnostics_period",
        ParameterValue::Bool(true),
    )]);
    assert!(result.successful);
    assert_eq!(wrapper.stats().driver_generation, Some(1));
}

#[test]
fn test_invalid_update_applies_nothing() {
    let dir = TempDir::new().unwrap();
    let first = write_file(dir.path(), "first.csv", FACTORY_CALIBRATION);
    let second = write_file(dir.path(), "second.csv", CACHED_CALIBRATION);

    let (wrapper, _outputs) = wrapper(&first);
    wrapper.initialize(sensor()).unwrap();

    let result = wrapper.on_parameter_change(&[
        Parameter::string("calibration_file", second.to_string_lossy()),
        Parameter::integer("rotation_speed", 1200),
        Parameter::integer("cloud_min_angle", 90),
        Parameter::integer("cloud_max_angle", 90),
    ]);
    assert!(!result.successful);

    let sensor = wrapper.sensor_configuration().unwrap();
    assert_eq!(sensor.rotation_speed, 600);
    assert_eq!(sensor.cloud_min_angle, 0);
    assert_eq!(wrapper.calibration_file(), first);
    assert_eq!(wrapper.calibration_configuration().unwrap().len(), 3);
    assert_eq!(wrapper.stats().driver_generation, Some(1));
}

#[test]
fn test_rejected_build_applies_nothing() {
    let dir = TempDir::new().unwrap();
    let first = write_file(dir.path(), "first.csv", FACTORY_CALIBRATION);
    let second = write_file(dir.path(), "second.csv", CACHED_CALIBRATION);

    let (wrapper, _outputs) = wrapper(&first);
    wrapper.initialize(sensor()).unwrap();

    let result = wrapper.on_parameter_change(&[
        Parameter::string("calibration_file", second.to_string_lossy()),
        Parameter::string("return_mode", "dual"),
    ]);
    assert!(!result.successful);
    assert_eq!(
        wrapper.sensor_configuration().unwrap().return_mode,
        ReturnMode::Strongest
    );
    assert_eq!(wrapper.calibration_file(), first);
    assert_eq!(wrapper.calibration_configuration().unwrap().len(), 3);
}

#[test]
fn test_combined_update_builds_one_driver() {
    let dir = TempDir::new().unwrap();
    let first = write_file(dir.path(), "first.csv", FACTORY_CALIBRATION);
    let second = write_file(dir.path(), "second.csv", CACHED_CALIBRATION);

    let (wrapper, _outputs) = wrapper(&first);
    wrapper.initialize(sensor()).unwrap();

    let result = wrapper.on_parameter_change(&[
        Parameter::string("calibration_file", second.to_string_lossy()),
        Parameter::string("return_mode", "last"),
    ]);
    assert!(result.successful, "{}", result.reason);
    assert_eq!(wrapper.stats().driver_generation, Some(2));
    assert_eq!(
        wrapper.sensor_configuration().unwrap().return_mode,
        ReturnMode::Last
    );
    assert_eq!(wrapper.calibration_configuration().unwrap().len(), 1);
}

#[test]
fn test_calibration_change_before_config() {
    let dir = TempDir::new().unwrap();
    let file = write_file(dir.path(), "first.csv", FACTORY_CALIBRATION);
    let (wrapper, _outputs) = wrapper(std::path::Path::new("unused.csv"));

    let result =
        wrapper.on_parameter_change(&[Parameter::string("calibration_file", file.to_string_lossy())]);
    assert!(result.successful);
    assert_eq!(wrapper.calibration_file(), file);
    assert_eq!(wrapper.stats().driver_generation, None);

    let outcome = wrapper
        .on_config_change(std::sync::Arc::new(sensor()))
        .unwrap();
    assert_eq!(outcome, SwapOutcome::Installed { generation: 1 });
}
