//! Byte-stream seam under the serial link.

use std::io::{self, Read, Write};

#[cfg(feature = "instrument_serial")]
use crate::error::DeviceError;
#[cfg(feature = "instrument_serial")]
use std::time::Duration;
#[cfg(feature = "instrument_serial")]
use tracing::{debug, info};

/// A bidirectional byte stream that can drop input it has not read yet.
///
/// Stale acknowledgements left over from an earlier exchange must never be
/// mistaken for the answer to a new command, so the link discards them
/// before every write.
pub trait Port: Read + Write {
    /// Discard any bytes received but not yet read.
    fn discard_input(&mut self) -> io::Result<()>;
}

impl<P: Port + ?Sized> Port for Box<P> {
    fn discard_input(&mut self) -> io::Result<()> {
        (**self).discard_input()
    }
}

#[cfg(feature = "instrument_serial")]
impl Port for dyn serialport::SerialPort {
    fn discard_input(&mut self) -> io::Result<()> {
        self.clear(serialport::ClearBuffer::Input)
            .map_err(io::Error::from)
    }
}

/// Open the positioner's serial port: 8 data bits, no parity, one stop bit.
///
/// Opening the port resets the microcontroller, so this waits `settle`
/// before returning to let the firmware boot.
#[cfg(feature = "instrument_serial")]
pub fn open_serial(
    port_name: &str,
    baud_rate: u32,
    settle: Duration,
) -> Result<Box<dyn serialport::SerialPort>, DeviceError> {
    let port = serialport::new(port_name, baud_rate)
        .data_bits(serialport::DataBits::Eight)
        .parity(serialport::Parity::None)
        .stop_bits(serialport::StopBits::One)
        .flow_control(serialport::FlowControl::None)
        // Internal read timeout; the link keeps waiting across timeouts.
        .timeout(Duration::from_millis(100))
        .open()
        .map_err(|e| DeviceError::Open {
            port: port_name.to_string(),
            reason: e.to_string(),
        })?;

    info!("Serial port '{}' opened at {} baud", port_name, baud_rate);
    debug!("Waiting {:?} for the positioner to reset", settle);
    std::thread::sleep(settle);
    Ok(port)
}
