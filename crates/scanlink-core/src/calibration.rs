//! Per-channel angle correction tables.
//!
//! Calibration files are CSV with a header row and one row per laser
//! channel:
//!
//! ```text
//! Laser id,Elevation,Azimuth
//! 1,14.882,-1.042
//! 2,11.032,-1.042
//! ```
//!
//! Lines starting with `#` are comments.

use crate::error::{Error, Result};
use chrono::Utc;
use indexmap::IndexMap;
use itertools::Itertools;
use std::{fmt::Write as _, fs, path::Path};

const HEADER: &str = "Laser id,Elevation,Azimuth";

/// Angle corrections for a single laser channel, in degrees.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChannelCorrection {
    pub elevation: f32,
    pub azimuth: f32,
}

/// Immutable snapshot of a sensor calibration.
///
/// Shared as `Arc<CalibrationConfiguration>` and replaced wholesale.
#[derive(Debug, Clone, PartialEq)]
pub struct CalibrationConfiguration {
    channels: IndexMap<u16, ChannelCorrection>,
}

impl CalibrationConfiguration {
    /// Build a calibration from channel corrections.
    ///
    /// Fails on an empty table, duplicated channel ids or non-finite angles.
    pub fn from_channels<I>(channels: I) -> Result<Self>
    where
        I: IntoIterator<Item = (u16, ChannelCorrection)>,
    {
        let rows: Vec<_> = channels.into_iter().collect();
        Self::check_rows(&rows, "channel table")?;
        Ok(Self {
            channels: rows.into_iter().collect(),
        })
    }

    /// Parse calibration text. `origin` names where the text came from and
    /// only appears in error messages.
    pub fn parse(text: &str, origin: &str) -> Result<Self> {
        let invalid = |reason: String| Error::InvalidCalibration {
            origin: origin.to_string(),
            reason,
        };

        let mut lines = text
            .lines()
            .enumerate()
            .map(|(idx, line)| (idx + 1, line.trim()))
            .filter(|(_, line)| !line.is_empty() && !line.starts_with('#'));

        match lines.next() {
            Some((_, header)) if is_header(header) => {}
            Some((lineno, _)) => {
                return Err(invalid(format!(
                    "line {lineno}: expected header '{HEADER}'"
                )));
            }
            None => return Err(invalid("empty calibration".to_string())),
        }

        let mut rows = Vec::new();
        for (lineno, line) in lines {
            let fields: Vec<&str> = line.split(',').map(str::trim).collect();
            let &[id, elevation, azimuth] = fields.as_slice() else {
                return Err(invalid(format!(
                    "line {lineno}: expected 3 fields, found {}",
                    fields.len()
                )));
            };

            let id: u16 = id
                .parse()
                .map_err(|_| invalid(format!("line {lineno}: bad laser id '{id}'")))?;
            let elevation: f32 = elevation
                .parse()
                .map_err(|_| invalid(format!("line {lineno}: bad elevation '{elevation}'")))?;
            let azimuth: f32 = azimuth
                .parse()
                .map_err(|_| invalid(format!("line {lineno}: bad azimuth '{azimuth}'")))?;

            rows.push((id, ChannelCorrection { elevation, azimuth }));
        }

        Self::check_rows(&rows, origin)?;
        Ok(Self {
            channels: rows.into_iter().collect(),
        })
    }

    /// Load and parse a calibration file.
    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|err| Error::from_io(path, &err))?;
        Self::parse(&text, &path.display().to_string())
    }

    /// Write the calibration to `path`.
    ///
    /// The text goes to a sibling temporary file first and is renamed into
    /// place, so readers never observe a partially written file.
    pub fn save_to_file(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let save_err = |err: std::io::Error| Error::CalibrationSave {
            path: path.to_path_buf(),
            reason: err.to_string(),
        };

        let mut tmp_name = path.as_os_str().to_owned();
        tmp_name.push(".tmp");
        let tmp_path = Path::new(&tmp_name);

        fs::write(tmp_path, self.to_csv()).map_err(save_err)?;
        fs::rename(tmp_path, path).map_err(|err| {
            let _ = fs::remove_file(tmp_path);
            save_err(err)
        })
    }

    /// Render as calibration file text.
    pub fn to_csv(&self) -> String {
        let mut out = format!("# written {}\n{HEADER}\n", Utc::now().to_rfc3339());
        for (id, corr) in &self.channels {
            // Writing into a String cannot fail.
            let _ = writeln!(out, "{id},{},{}", corr.elevation, corr.azimuth);
        }
        out
    }

    pub fn get(&self, channel: u16) -> Option<&ChannelCorrection> {
        self.channels.get(&channel)
    }

    /// Channels in file order.
    pub fn channels(&self) -> impl Iterator<Item = (u16, &ChannelCorrection)> {
        self.channels.iter().map(|(id, corr)| (*id, corr))
    }

    pub fn len(&self) -> usize {
        self.channels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }

    fn check_rows(rows: &[(u16, ChannelCorrection)], origin: &str) -> Result<()> {
        let invalid = |reason: String| Error::InvalidCalibration {
            origin: origin.to_string(),
            reason,
        };

        if rows.is_empty() {
            return Err(invalid("no channels".to_string()));
        }

        let duplicates: Vec<u16> = rows.iter().map(|(id, _)| *id).duplicates().collect();
        if !duplicates.is_empty() {
            return Err(invalid(format!("duplicate channel ids {duplicates:?}")));
        }

        if let Some((id, _)) = rows
            .iter()
            .find(|(_, c)| !c.elevation.is_finite() || !c.azimuth.is_finite())
        {
            return Err(invalid(format!("channel {id} has a non-finite angle")));
        }

        Ok(())
    }
}

fn is_header(line: &str) -> bool {
    line.split(',')
        .next()
        .is_some_and(|first| first.trim().eq_ignore_ascii_case("laser id"))
}
