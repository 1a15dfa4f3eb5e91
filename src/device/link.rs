//! Command/acknowledgement transport to the positioner firmware.
//!
//! Protocol overview:
//! - Commands are short ASCII byte strings (`3`, `4+500`, `+A`, `-@`, ...).
//! - After executing a command the firmware answers with the single byte `0`.
//! - Spaces, CR and LF between replies are insignificant.
//! - `#` starts a firmware comment that runs to the end of the line; the
//!   firmware uses these to narrate what it is doing.
//! - Any other byte means the firmware rejected or misread the command. It
//!   has no way to recover from that, so neither do we.
//!
//! There is no timeout: the firmware always answers eventually.

use crate::config::DeviceConfig;
use crate::device::port::Port;
use crate::error::{DeviceError, ProtocolError};
use crate::escape::show_bytes;
use std::io::ErrorKind;
use std::time::Duration;
use tracing::{debug, info};

/// Delay the simulated link waits before pretending the firmware replied.
pub const SIMULATED_ACK_DELAY: Duration = Duration::from_millis(200);

/// Synchronous command/acknowledgement exchange with the firmware.
pub trait DeviceLink {
    /// Send `command` and block until the firmware acknowledges it.
    fn send_and_await_ack(&mut self, command: &[u8]) -> Result<(), ProtocolError>;

    /// Whether this link talks to real hardware.
    fn is_simulated(&self) -> bool {
        false
    }
}

impl<L: DeviceLink + ?Sized> DeviceLink for Box<L> {
    fn send_and_await_ack(&mut self, command: &[u8]) -> Result<(), ProtocolError> {
        (**self).send_and_await_ack(command)
    }

    fn is_simulated(&self) -> bool {
        (**self).is_simulated()
    }
}

// =============================================================================
// SerialLink - real firmware over a byte stream
// =============================================================================

/// Link to the firmware over a [`Port`].
pub struct SerialLink<P: Port> {
    port: P,
}

impl<P: Port> SerialLink<P> {
    /// Wrap an already opened port.
    pub fn new(port: P) -> Self {
        Self { port }
    }

    /// Borrow the underlying port.
    pub fn port(&self) -> &P {
        &self.port
    }

    /// Read exactly one byte, waiting through port read timeouts.
    fn read_byte(&mut self) -> Result<u8, ProtocolError> {
        let mut buf = [0u8; 1];
        loop {
            match self.port.read(&mut buf) {
                Ok(1) => return Ok(buf[0]),
                Ok(len) => return Err(ProtocolError::MalformedRead { len }),
                Err(e) if e.kind() == ErrorKind::TimedOut => continue,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(ProtocolError::Io(e)),
            }
        }
    }

    /// Consume bytes up to and including the next CR or LF.
    fn skip_comment(&mut self) -> Result<(), ProtocolError> {
        let mut comment = vec![b'#'];
        loop {
            let b = self.read_byte()?;
            if b == b'\r' || b == b'\n' {
                break;
            }
            comment.push(b);
        }
        debug!("firmware: {}", show_bytes(&comment, false));
        Ok(())
    }

    /// Read the next significant byte, skipping whitespace and comments.
    fn read_significant(&mut self) -> Result<u8, ProtocolError> {
        loop {
            match self.read_byte()? {
                b'#' => self.skip_comment()?,
                b' ' | b'\r' | b'\n' => {}
                b => return Ok(b),
            }
        }
    }
}

impl<P: Port> DeviceLink for SerialLink<P> {
    fn send_and_await_ack(&mut self, command: &[u8]) -> Result<(), ProtocolError> {
        self.port.discard_input()?;
        debug!("Sending to positioner: '{}'", show_bytes(command, false));
        self.port.write_all(command)?;
        self.port.flush()?;

        match self.read_significant()? {
            b'0' => Ok(()),
            byte => Err(ProtocolError::UnexpectedAck { byte }),
        }
    }
}

// =============================================================================
// SimulatedLink - no hardware attached
// =============================================================================

/// Stand-in link used when no positioner is attached.
///
/// Logs every command, waits a short delay to keep the pacing realistic and
/// always reports success.
#[derive(Debug, Clone)]
pub struct SimulatedLink {
    delay: Duration,
    sent: usize,
}

impl SimulatedLink {
    /// Simulated link with the standard acknowledgement delay.
    pub fn new() -> Self {
        Self::with_delay(SIMULATED_ACK_DELAY)
    }

    /// Simulated link with a custom acknowledgement delay.
    pub fn with_delay(delay: Duration) -> Self {
        Self { delay, sent: 0 }
    }

    /// Number of commands "sent" so far.
    pub fn sent(&self) -> usize {
        self.sent
    }
}

impl Default for SimulatedLink {
    fn default() -> Self {
        Self::new()
    }
}

impl DeviceLink for SimulatedLink {
    fn send_and_await_ack(&mut self, command: &[u8]) -> Result<(), ProtocolError> {
        info!("would send to positioner: '{}'", show_bytes(command, false));
        if !self.delay.is_zero() {
            std::thread::sleep(self.delay);
        }
        self.sent += 1;
        debug!("pretending that the positioner replied OK");
        Ok(())
    }

    fn is_simulated(&self) -> bool {
        true
    }
}

/// Build the link selected by `config`: the serial port when one is
/// configured and `simulate` is false, otherwise a [`SimulatedLink`].
pub fn open_link(config: &DeviceConfig, simulate: bool) -> Result<Box<dyn DeviceLink>, DeviceError> {
    match config.port.as_deref() {
        Some(port_name) if !simulate => open_serial_link(port_name, config),
        _ => {
            tracing::warn!("running without the positioner (simulated device link)");
            Ok(Box::new(SimulatedLink::with_delay(Duration::from_millis(
                config.simulated_ack_ms,
            ))))
        }
    }
}

#[cfg(feature = "instrument_serial")]
fn open_serial_link(
    port_name: &str,
    config: &DeviceConfig,
) -> Result<Box<dyn DeviceLink>, DeviceError> {
    let port = crate::device::port::open_serial(
        port_name,
        config.baud_rate,
        Duration::from_millis(config.settle_ms),
    )?;
    Ok(Box::new(SerialLink::new(port)))
}

#[cfg(not(feature = "instrument_serial"))]
fn open_serial_link(
    _port_name: &str,
    _config: &DeviceConfig,
) -> Result<Box<dyn DeviceLink>, DeviceError> {
    Err(DeviceError::SerialFeatureDisabled)
}
