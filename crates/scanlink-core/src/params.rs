//! Runtime parameter updates.

use crate::{
    config::{ReturnMode, SensorConfiguration},
    error::{Error, Result},
};
use std::fmt;

/// Name of the parameter holding the fallback calibration file.
pub const CALIBRATION_FILE: &str = "calibration_file";

/// A typed parameter value.
#[derive(Debug, Clone, PartialEq)]
pub enum ParameterValue {
    Bool(bool),
    Integer(i64),
    Double(f64),
    String(String),
}

impl fmt::Display for ParameterValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParameterValue::Bool(v) => write!(f, "{v}"),
            ParameterValue::Integer(v) => write!(f, "{v}"),
            ParameterValue::Double(v) => write!(f, "{v}"),
            ParameterValue::String(v) => write!(f, "'{v}'"),
        }
    }
}

/// A named parameter update.
#[derive(Debug, Clone, PartialEq)]
pub struct Parameter {
    pub name: String,
    pub value: ParameterValue,
}

impl Parameter {
    pub fn new(name: impl Into<String>, value: ParameterValue) -> Self {
        Self {
            name: name.into(),
            value,
        }
    }

    pub fn string(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self::new(name, ParameterValue::String(value.into()))
    }

    pub fn integer(name: impl Into<String>, value: i64) -> Self {
        Self::new(name, ParameterValue::Integer(value))
    }

    pub fn double(name: impl Into<String>, value: f64) -> Self {
        Self::new(name, ParameterValue::Double(value))
    }
}

/// Answer to a parameter update request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SetParametersResult {
    pub successful: bool,
    /// Why the update was rejected. Empty on success.
    pub reason: String,
}

impl SetParametersResult {
    pub fn success() -> Self {
        Self {
            successful: true,
            reason: String::new(),
        }
    }

    pub fn failure(reason: impl Into<String>) -> Self {
        Self {
            successful: false,
            reason: reason.into(),
        }
    }
}

/// Look up a string parameter. The last occurrence wins.
pub(crate) fn find_string<'a>(params: &'a [Parameter], name: &str) -> Result<Option<&'a str>> {
    match find(params, name) {
        None => Ok(None),
        Some(ParameterValue::String(value)) => Ok(Some(value.as_str())),
        Some(other) => Err(type_mismatch(name, "string", other)),
    }
}

/// Apply the sensor parameters among `params` to a copy of `base`.
///
/// Returns `Ok(None)` when `params` holds no sensor parameter. The returned
/// configuration has been validated.
pub(crate) fn apply_sensor_parameters(
    base: &SensorConfiguration,
    params: &[Parameter],
) -> Result<Option<SensorConfiguration>> {
    let mut config = base.clone();
    let mut changed = false;

    if let Some(frame_id) = find_string(params, "frame_id")? {
        config.frame_id = frame_id.to_string();
        changed = true;
    }
    if let Some(mode) = find_string(params, "return_mode")? {
        config.return_mode = mode.parse::<ReturnMode>()?;
        changed = true;
    }
    if let Some(angle) = find_u16(params, "cloud_min_angle")? {
        config.cloud_min_angle = angle;
        changed = true;
    }
    if let Some(angle) = find_u16(params, "cloud_max_angle")? {
        config.cloud_max_angle = angle;
        changed = true;
    }
    if let Some(speed) = find_u16(params, "rotation_speed")? {
        config.rotation_speed = speed;
        changed = true;
    }
    if let Some(range) = find_f64(params, "min_range")? {
        config.min_range = range;
        changed = true;
    }
    if let Some(range) = find_f64(params, "max_range")? {
        config.max_range = range;
        changed = true;
    }

    if !changed {
        return Ok(None);
    }

    config.validate()?;
    Ok(Some(config))
}

fn find<'a>(params: &'a [Parameter], name: &str) -> Option<&'a ParameterValue> {
    params
        .iter()
        .rev()
        .find(|param| param.name == name)
        .map(|param| &param.value)
}

fn find_u16(params: &[Parameter], name: &str) -> Result<Option<u16>> {
    match find(params, name) {
        None => Ok(None),
        Some(&ParameterValue::Integer(value)) => u16::try_from(value).map(Some).map_err(|_| {
            Error::InvalidSensorConfig(format!("parameter '{name}' out of range: {value}"))
        }),
        Some(other) => Err(type_mismatch(name, "integer", other)),
    }
}

fn find_f64(params: &[Parameter], name: &str) -> Result<Option<f64>> {
    match find(params, name) {
        None => Ok(None),
        Some(&ParameterValue::Double(value)) => Ok(Some(value)),
        Some(&ParameterValue::Integer(value)) => Ok(Some(value as f64)),
        Some(other) => Err(type_mismatch(name, "double", other)),
    }
}

fn type_mismatch(name: &str, expected: &str, got: &ParameterValue) -> Error {
    Error::InvalidSensorConfig(format!(
        "parameter '{name}' expects a {expected}, got {got}"
    ))
}
