//! Custom error types for the capture system.
//!
//! Each layer has its own `thiserror` enum so callers can match on the
//! failure they care about, and `MuffError` consolidates them for the
//! top-level handler that runs cleanup and picks the exit status.
//!
//! ## Error Hierarchy
//!
//! - **`ProtocolError`**: the positioner firmware answered with something other
//!   than the acknowledgement byte, or the byte stream itself misbehaved. The
//!   firmware has no recovery primitive, so these are always fatal.
//! - **`DeviceError`**: semantic device operations rejected before anything is
//!   sent (step size out of range, partial LED intensity), plus wrapped
//!   `ProtocolError`s and port-opening failures.
//! - **`CaptureError`**: the frame-grabbing collaborator stopped talking
//!   (`LinkBroken`) or replied with something other than `ok` (`BadAck`).
//!   Fatal to the session, which still runs its cleanup.
//! - **`ParameterError`**: scan set parameters that failed parsing or range
//!   checks. Reported before any device interaction.
//! - **`LayoutError`**: the scan directory tree could not be created, most
//!   often because a session already started in the same UTC minute.
//! - **`ConfigError`**: the configuration file or environment did not load.

use std::path::PathBuf;
use thiserror::Error;

/// Convenience alias for results using the application error type.
pub type AppResult<T> = std::result::Result<T, MuffError>;

fn printable_byte(byte: &u8) -> String {
    crate::escape::show_bytes(&[*byte], true)
}

fn printable_text(text: &str) -> String {
    crate::escape::show_bytes(text.as_bytes(), false)
}

/// Failures of the command/acknowledgement exchange with the firmware.
#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("unexpected acknowledgement byte {}", printable_byte(.byte))]
    UnexpectedAck { byte: u8 },

    #[error("serial read returned {len} bytes, expected exactly 1")]
    MalformedRead { len: usize },

    #[error("serial I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Failures of semantic device operations.
#[derive(Error, Debug)]
pub enum DeviceError {
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error("step size {mm:+.4} mm is outside [-0.999, +0.999]")]
    OutOfRange { mm: f64 },

    #[error("LED {index} intensity {value} is not supported (only 0.0 or 1.0)")]
    UnsupportedIntensity { index: usize, value: f64 },

    #[error("LED index {0} is out of range (0..23)")]
    InvalidLed(usize),

    #[error("failed to open serial port '{port}': {reason}")]
    Open { port: String, reason: String },

    #[error("Serial support not enabled. Rebuild with --features instrument_serial")]
    SerialFeatureDisabled,
}

/// Failures of the capture request/acknowledgement exchange.
#[derive(Error, Debug)]
pub enum CaptureError {
    #[error("link to frame grabber broken: {0}")]
    LinkBroken(String),

    #[error("frame grabber returned invalid response '{}'", printable_text(.0))]
    BadAck(String),

    #[error("capture destination {0:?} is not valid UTF-8")]
    NonUtf8Path(PathBuf),
}

/// Invalid scan set parameters.
#[derive(Error, Debug)]
pub enum ParameterError {
    #[error("parameter {name} is empty")]
    Empty { name: &'static str },

    #[error("parameter {name} = '{text}' is invalid")]
    Invalid { name: &'static str, text: String },

    #[error("parameter {name} = {value} should be in {lo}..{hi}")]
    OutOfRange {
        name: &'static str,
        value: String,
        lo: String,
        hi: String,
    },

    #[error("'{line}' should be '{name} = VALUE'")]
    BadTag { name: &'static str, line: String },

    #[error("parameter {name} is missing")]
    Missing { name: &'static str },

    #[error("stack height {n_h} x {z_step:+.3} mm exceeds the {max:.1} mm travel")]
    RangeExceeded { n_h: u32, z_step: f64, max: f64 },

    #[error("failed to read parameters: {0}")]
    Io(#[from] std::io::Error),
}

/// Failures while creating the scan directory tree.
#[derive(Error, Debug)]
pub enum LayoutError {
    #[error("directory '{0}' already exists; retry after the current minute has passed")]
    DirectoryExists(PathBuf),

    #[error("failed to create directory '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Configuration loading and validation failures.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Configuration load error: {0}")]
    Load(#[from] Box<figment::Error>),

    #[error("Configuration validation error: {0}")]
    Validation(String),
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        ConfigError::Load(Box::new(err))
    }
}

/// Umbrella error for a capture session.
#[derive(Error, Debug)]
pub enum MuffError {
    #[error(transparent)]
    Device(#[from] DeviceError),

    #[error(transparent)]
    Capture(#[from] CaptureError),

    #[error(transparent)]
    Parameter(#[from] ParameterError),

    #[error(transparent)]
    Layout(#[from] LayoutError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("operator I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<ProtocolError> for MuffError {
    fn from(err: ProtocolError) -> Self {
        MuffError::Device(DeviceError::Protocol(err))
    }
}

impl MuffError {
    /// Short tag used to prefix the diagnostic printed on exit.
    pub fn tag(&self) -> &'static str {
        match self {
            MuffError::Device(DeviceError::Protocol(_)) => "protocol",
            MuffError::Device(_) => "device",
            MuffError::Capture(_) => "capture",
            MuffError::Parameter(_) => "params",
            MuffError::Layout(_) => "layout",
            MuffError::Config(_) => "config",
            MuffError::Io(_) => "io",
        }
    }

    /// Process exit status for this failure.
    pub fn exit_code(&self) -> u8 {
        match self {
            MuffError::Parameter(_) | MuffError::Config(_) => 2,
            _ => 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unexpected_ack_display_escapes_byte() {
        let err = ProtocolError::UnexpectedAck { byte: b'\n' };
        assert_eq!(err.to_string(), "unexpected acknowledgement byte [chr(010)]");

        let err = ProtocolError::UnexpectedAck { byte: b'1' };
        assert_eq!(err.to_string(), "unexpected acknowledgement byte 1");
    }

    #[test]
    fn test_protocol_error_is_tagged_as_protocol() {
        let err: MuffError = ProtocolError::UnexpectedAck { byte: b'x' }.into();
        assert_eq!(err.tag(), "protocol");
        assert_eq!(err.exit_code(), 1);
    }

    #[test]
    fn test_parameter_errors_exit_with_two() {
        let err: MuffError = ParameterError::Missing { name: "nH" }.into();
        assert_eq!(err.tag(), "params");
        assert_eq!(err.exit_code(), 2);
    }

    #[test]
    fn test_bad_ack_display() {
        let err = CaptureError::BadAck("bad\n".to_string());
        assert_eq!(
            err.to_string(),
            "frame grabber returned invalid response 'bad[chr(010)]'"
        );
    }
}
