//! Scan set parameters.
//!
//! A scan set is `nL` lighting conditions × `nV` view directions × `nH`
//! focus heights, the heights `zStep` millimetres apart. Parameters come
//! from the command line, from a parameter file, or from the operator at a
//! prompt; all three paths funnel through [`ScanSetParameters::new`], so an
//! invalid set is reported before any device is touched.
//!
//! Parameter file format: four significant lines, in order,
//!
//! ```text
//! # comment lines and blank lines are skipped
//! nL = 6
//! nV = 1
//! nH = 20
//! Z_step = 0.050   # trailing comments are fine too
//! ```

use crate::error::ParameterError;
use std::fmt;
use std::fs::File;
use std::io::{BufRead, BufReader, Write};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

/// Maximum number of lighting conditions (one per LED).
pub const MAX_LIGHTS: u32 = 24;
/// Maximum number of view directions (no rotating stage yet).
pub const MAX_VIEWS: u32 = 1;
/// Maximum number of frames per stack.
pub const MAX_HEIGHTS: u32 = 99;
/// Largest step between focus planes, in mm.
pub const MAX_Z_STEP: f64 = 0.999;
/// Total Z travel available to a stack, in mm.
pub const MAX_Z_RANGE: f64 = 100.0;

// Rounding slack for the stack range check.
const Z_RANGE_FUDGE: f64 = 0.0001;

// Time estimates, in seconds.
const MOVE_SECS: f64 = 2.0;
const ROTATE_SECS: f64 = 3.0;
const IMAGE_SECS: f64 = 3.0;

/// Validated, immutable scan set parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScanSetParameters {
    n_lights: u32,
    n_views: u32,
    n_heights: u32,
    z_step: f64,
}

impl ScanSetParameters {
    /// Validate and build a parameter set.
    pub fn new(n_lights: u32, n_views: u32, n_heights: u32, z_step: f64) -> Result<Self, ParameterError> {
        check_range("nL", n_lights, 1, MAX_LIGHTS)?;
        check_range("nV", n_views, 1, MAX_VIEWS)?;
        check_range("nH", n_heights, 1, MAX_HEIGHTS)?;
        if !z_step.is_finite() || !(-MAX_Z_STEP..=MAX_Z_STEP).contains(&z_step) {
            return Err(ParameterError::OutOfRange {
                name: "Z_step",
                value: format!("{:+.4}", z_step),
                lo: format!("{:+.3}", -MAX_Z_STEP),
                hi: format!("{:+.3}", MAX_Z_STEP),
            });
        }
        if f64::from(n_heights) * z_step > MAX_Z_RANGE + Z_RANGE_FUDGE {
            return Err(ParameterError::RangeExceeded {
                n_h: n_heights,
                z_step,
                max: MAX_Z_RANGE,
            });
        }
        Ok(Self {
            n_lights,
            n_views,
            n_heights,
            z_step,
        })
    }

    /// Number of lighting conditions `nL`.
    pub fn n_lights(&self) -> u32 {
        self.n_lights
    }

    /// Number of view directions `nV`.
    pub fn n_views(&self) -> u32 {
        self.n_views
    }

    /// Number of focus heights `nH`.
    pub fn n_heights(&self) -> u32 {
        self.n_heights
    }

    /// Distance between focus planes in mm.
    pub fn z_step(&self) -> f64 {
        self.z_step
    }

    /// Total number of frames in the scan set.
    pub fn frame_count(&self) -> u32 {
        self.n_lights * self.n_views * self.n_heights
    }

    /// Rough wall-clock estimate for the whole scan set.
    ///
    /// Assumes the first height is captured where the operator left the
    /// microscope and that every view change needs a rotation.
    pub fn estimated_duration(&self) -> Duration {
        let mut secs = IMAGE_SECS * f64::from(self.n_lights);
        if self.n_views > 1 {
            secs = (secs + ROTATE_SECS) * f64::from(self.n_views);
        }
        secs = secs * f64::from(self.n_heights) + MOVE_SECS * f64::from(self.n_heights - 1);
        Duration::from_secs_f64(secs)
    }

    /// Parse the four positional command line values `nL nV nH Z_step`.
    pub fn from_args(n_lights: &str, n_views: &str, n_heights: &str, z_step: &str) -> Result<Self, ParameterError> {
        Self::new(
            parse_value("nL", n_lights)?,
            parse_value("nV", n_views)?,
            parse_value("nH", n_heights)?,
            parse_value("Z_step", z_step)?,
        )
    }

    /// Read a tagged parameter file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ParameterError> {
        let file = File::open(path.as_ref())?;
        Self::from_reader(BufReader::new(file))
    }

    /// Parse the tagged parameter format from any reader.
    pub fn from_reader<R: BufRead>(reader: R) -> Result<Self, ParameterError> {
        let mut lines = SignificantLines::new(reader);
        let n_lights = parse_tagged(&mut lines, "nL")?;
        let n_views = parse_tagged(&mut lines, "nV")?;
        let n_heights = parse_tagged(&mut lines, "nH")?;
        let z_step = parse_tagged(&mut lines, "Z_step")?;
        Self::new(n_lights, n_views, n_heights, z_step)
    }

    /// Ask the operator for `nL`, `nH` and `Z_step`; `nV` is fixed at 1.
    pub fn prompt<R: BufRead, W: Write>(input: &mut R, prompt: &mut W) -> Result<Self, ParameterError> {
        let n_lights = ask(
            input,
            prompt,
            "nL",
            &format!("number of lights (1 to {})? ", MAX_LIGHTS),
        )?;
        let n_heights = ask(
            input,
            prompt,
            "nH",
            &format!("number of focus planes (1 to {})? ", MAX_HEIGHTS),
        )?;
        let z_step = ask(
            input,
            prompt,
            "Z_step",
            &format!(
                "displacement between focus planes in mm ({:+5.3} to {:+5.3})? ",
                -MAX_Z_STEP, MAX_Z_STEP
            ),
        )?;
        Self::new(n_lights, 1, n_heights, z_step)
    }
}

impl fmt::Display for ScanSetParameters {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} lights, {} views, {} heights, Z step {:+.3} mm",
            self.n_lights, self.n_views, self.n_heights, self.z_step
        )
    }
}

fn check_range(name: &'static str, value: u32, lo: u32, hi: u32) -> Result<(), ParameterError> {
    if value < lo || value > hi {
        return Err(ParameterError::OutOfRange {
            name,
            value: value.to_string(),
            lo: lo.to_string(),
            hi: hi.to_string(),
        });
    }
    Ok(())
}

fn parse_value<T: FromStr>(name: &'static str, text: &str) -> Result<T, ParameterError> {
    let text = text.trim();
    if text.is_empty() {
        return Err(ParameterError::Empty { name });
    }
    text.parse().map_err(|_| ParameterError::Invalid {
        name,
        text: text.to_string(),
    })
}

fn parse_tagged<T: FromStr, R: BufRead>(lines: &mut SignificantLines<R>, name: &'static str) -> Result<T, ParameterError> {
    let line = lines.next_line()?.ok_or(ParameterError::Missing { name })?;
    let value = match line.split_once('=') {
        Some((tag, value)) if tag.trim() == name => value,
        _ => return Err(ParameterError::BadTag { name, line }),
    };
    parse_value(name, value)
}

fn ask<T: FromStr, R: BufRead, W: Write>(
    input: &mut R,
    prompt: &mut W,
    name: &'static str,
    question: &str,
) -> Result<T, ParameterError> {
    write!(prompt, "{}", question)?;
    prompt.flush()?;
    let mut line = String::new();
    if input.read_line(&mut line)? == 0 {
        return Err(ParameterError::Missing { name });
    }
    parse_value(name, &line)
}

/// Lines of a parameter file with comments stripped and blanks skipped.
struct SignificantLines<R> {
    reader: R,
}

impl<R: BufRead> SignificantLines<R> {
    fn new(reader: R) -> Self {
        Self { reader }
    }

    fn next_line(&mut self) -> std::io::Result<Option<String>> {
        loop {
            let mut line = String::new();
            if self.reader.read_line(&mut line)? == 0 {
                return Ok(None);
            }
            let content = match line.find('#') {
                Some(pos) => &line[..pos],
                None => line.as_str(),
            };
            let content = content.trim();
            if !content.is_empty() {
                return Ok(Some(content.to_string()));
            }
        }
    }
}
