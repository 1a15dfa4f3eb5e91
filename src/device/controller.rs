//! Semantic positioner operations on top of a [`DeviceLink`].
//!
//! Opcodes (one ASCII byte, some followed by an argument):
//!
//! | Command   | Meaning                                   |
//! |-----------|-------------------------------------------|
//! | `1` / `2` | start moving up / down, slow              |
//! | `6` / `7` | start moving up / down, fast              |
//! | `3`       | stop the motor                            |
//! | `4±NNN`   | set the step size, signed 3-digit microns |
//! | `5`       | move one step                             |
//! | `+X`/`-X` | LED `X` (`A`..`X`) on / off               |
//! | `+@`/`-@` | all LEDs on / off                         |
//!
//! Each round-trip costs tens of milliseconds, so the controller keeps a
//! [`DeviceState`] mirroring what it last commanded and only sends the LED
//! changes that are actually needed.

use crate::device::link::DeviceLink;
use crate::error::DeviceError;
use crate::lighting::{IlluminationVector, NUM_LEDS};
use tracing::debug;

/// Largest step size the firmware accepts, in millimetres.
pub const MAX_STEP_MM: f64 = 0.999;

/// Direction of motor travel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Raise the microscope.
    Up,
    /// Lower the microscope.
    Down,
}

/// What the controller presumes about the positioner.
///
/// Nothing is ever read back from the hardware; this is purely a mirror of
/// the commands sent.
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceState {
    /// Z offset in mm relative to the operator-chosen zero, `None` until
    /// manual positioning completes.
    pub z_offset: Option<f64>,
    /// Last commanded intensity of every LED.
    pub leds: IlluminationVector,
}

impl Default for DeviceState {
    fn default() -> Self {
        Self {
            z_offset: None,
            leds: IlluminationVector::dark(),
        }
    }
}

/// Stateful wrapper exposing motor and LED operations.
pub struct DeviceController<L: DeviceLink> {
    link: L,
    state: DeviceState,
}

impl<L: DeviceLink> DeviceController<L> {
    /// Wrap a connected link. Z is undefined and all LEDs presumed off.
    pub fn new(link: L) -> Self {
        Self {
            link,
            state: DeviceState::default(),
        }
    }

    /// Presumed device state.
    pub fn state(&self) -> &DeviceState {
        &self.state
    }

    /// Borrow the underlying link.
    pub fn link(&self) -> &L {
        &self.link
    }

    /// Whether the link is simulated.
    pub fn is_simulated(&self) -> bool {
        self.link.is_simulated()
    }

    fn send(&mut self, command: &[u8]) -> Result<(), DeviceError> {
        self.link.send_and_await_ack(command)?;
        Ok(())
    }

    /// Start continuous motion. The motor is always stopped first since the
    /// current motion state is not trusted.
    pub fn start_motor(&mut self, direction: Direction, fast: bool) -> Result<(), DeviceError> {
        self.stop_motor()?;
        debug!("Starting motor {:?} ({})", direction, if fast { "fast" } else { "slow" });
        let opcode: &[u8] = match (direction, fast) {
            (Direction::Up, false) => b"1",
            (Direction::Down, false) => b"2",
            (Direction::Up, true) => b"6",
            (Direction::Down, true) => b"7",
        };
        self.send(opcode)
    }

    /// Stop the motor. Safe to call at any time.
    pub fn stop_motor(&mut self) -> Result<(), DeviceError> {
        debug!("Stopping motor");
        self.send(b"3")
    }

    /// Set the Z step size used by [`step_once`](Self::step_once).
    pub fn set_step_size(&mut self, mm: f64) -> Result<(), DeviceError> {
        let command = step_size_command(mm)?;
        debug!("Setting Z step to {:+.3} mm", mm);
        self.send(command.as_bytes())
    }

    /// Move one step of the configured size. The caller accounts for the
    /// new position with [`advance_z`](Self::advance_z).
    pub fn step_once(&mut self) -> Result<(), DeviceError> {
        debug!("Moving microscope by one step");
        self.send(b"5")
    }

    /// Define the current position as Z = 0.
    pub fn zero_z(&mut self) {
        self.state.z_offset = Some(0.0);
    }

    /// Record a relative move of `dz` mm.
    pub fn advance_z(&mut self, dz: f64) {
        self.state.z_offset = Some(self.state.z_offset.unwrap_or(0.0) + dz);
    }

    /// Switch a single LED fully on (1.0) or off (0.0).
    pub fn set_led(&mut self, index: usize, intensity: f64) -> Result<(), DeviceError> {
        let command = led_command(index, intensity)?;
        debug!("Setting LED {:02} intensity to {:.2}", index, intensity);
        self.send(&command)?;
        self.state.leds.set(index, intensity);
        Ok(())
    }

    /// Bring the dome to `target`, sending commands only for LEDs whose
    /// presumed state differs.
    pub fn apply_illumination(&mut self, target: &IlluminationVector) -> Result<usize, DeviceError> {
        // Reject partial intensities before touching the hardware.
        for (index, value) in target.iter() {
            if value != 0.0 && value != 1.0 {
                return Err(DeviceError::UnsupportedIntensity { index, value });
            }
        }

        let mut changed = 0;
        for index in 0..NUM_LEDS {
            let want = target[index];
            if self.state.leds[index] != want {
                self.set_led(index, want)?;
                changed += 1;
            }
        }
        Ok(changed)
    }

    /// Broadcast "all LEDs off" in a single command.
    pub fn all_lights_off(&mut self) -> Result<(), DeviceError> {
        debug!("Switching all LEDs off");
        self.send(b"-@")?;
        self.state.leds = IlluminationVector::dark();
        Ok(())
    }

    /// Broadcast "all LEDs on" in a single command.
    pub fn all_lights_on(&mut self) -> Result<(), DeviceError> {
        debug!("Switching all LEDs on");
        self.send(b"+@")?;
        self.state.leds = IlluminationVector::full();
        Ok(())
    }
}

/// Encode a step size as `4` + sign + three-digit microns.
pub fn step_size_command(mm: f64) -> Result<String, DeviceError> {
    if !mm.is_finite() || !(-MAX_STEP_MM..=MAX_STEP_MM).contains(&mm) {
        return Err(DeviceError::OutOfRange { mm });
    }
    let microns = (mm * 1000.0).round() as i32;
    if microns.abs() > 999 {
        return Err(DeviceError::OutOfRange { mm });
    }
    Ok(format!("4{:+04}", microns))
}

/// Encode a single-LED command: `+` or `-` followed by the LED letter.
pub fn led_command(index: usize, intensity: f64) -> Result<[u8; 2], DeviceError> {
    if index >= NUM_LEDS {
        return Err(DeviceError::InvalidLed(index));
    }
    let opcode = if intensity == 1.0 {
        b'+'
    } else if intensity == 0.0 {
        b'-'
    } else {
        return Err(DeviceError::UnsupportedIntensity {
            index,
            value: intensity,
        });
    };
    Ok([opcode, b'A' + index as u8])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::link::SerialLink;
    use crate::device::mock::{CommandLog, MockPort};
    use crate::lighting::plan;

    fn controller() -> (DeviceController<SerialLink<MockPort>>, CommandLog) {
        let (port, log) = MockPort::auto_ack();
        (DeviceController::new(SerialLink::new(port)), log)
    }

    #[test]
    fn test_step_size_encoding() {
        assert_eq!(step_size_command(0.5).unwrap(), "4+500");
        assert_eq!(step_size_command(-0.05).unwrap(), "4-050");
        assert_eq!(step_size_command(0.0).unwrap(), "4+000");
        assert_eq!(step_size_command(0.999).unwrap(), "4+999");
        assert_eq!(step_size_command(-0.999).unwrap(), "4-999");
    }

    #[test]
    fn test_step_size_out_of_range() {
        assert!(matches!(
            step_size_command(1.234),
            Err(DeviceError::OutOfRange { .. })
        ));
        assert!(matches!(
            step_size_command(-1.0),
            Err(DeviceError::OutOfRange { .. })
        ));
        assert!(step_size_command(f64::NAN).is_err());
    }

    #[test]
    fn test_set_step_size_sends_payload() {
        let (mut ctl, log) = controller();
        ctl.set_step_size(0.5).unwrap();
        assert_eq!(log.commands(), vec!["4+500"]);

        assert!(ctl.set_step_size(1.234).is_err());
        assert_eq!(log.len(), 1);
    }

    #[test]
    fn test_start_motor_stops_first() {
        let (mut ctl, log) = controller();
        ctl.start_motor(Direction::Up, false).unwrap();
        ctl.start_motor(Direction::Down, false).unwrap();
        ctl.start_motor(Direction::Up, true).unwrap();
        ctl.start_motor(Direction::Down, true).unwrap();
        assert_eq!(
            log.commands(),
            vec!["3", "1", "3", "2", "3", "6", "3", "7"]
        );
    }

    #[test]
    fn test_led_commands() {
        assert_eq!(&led_command(0, 1.0).unwrap(), b"+A");
        assert_eq!(&led_command(23, 0.0).unwrap(), b"-X");
        assert!(matches!(
            led_command(24, 1.0),
            Err(DeviceError::InvalidLed(24))
        ));
        assert!(matches!(
            led_command(3, 0.5),
            Err(DeviceError::UnsupportedIntensity { index: 3, .. })
        ));
    }

    #[test]
    fn test_apply_illumination_sends_only_changes() {
        let (mut ctl, log) = controller();
        let first = IlluminationVector::with_lit(&[0, 12]);
        assert_eq!(ctl.apply_illumination(&first).unwrap(), 2);
        assert_eq!(log.commands(), vec!["+A", "+M"]);

        let second = IlluminationVector::with_lit(&[1, 12]);
        assert_eq!(ctl.apply_illumination(&second).unwrap(), 2);
        assert_eq!(log.commands(), vec!["+A", "+M", "-A", "+B"]);
        assert_eq!(ctl.state().leds, second);
    }

    #[test]
    fn test_apply_illumination_twice_is_idempotent() {
        let (mut ctl, log) = controller();
        let pattern = plan(2, 7);
        ctl.apply_illumination(&pattern).unwrap();
        let after_first = log.len();
        assert_eq!(after_first, 6);

        assert_eq!(ctl.apply_illumination(&pattern).unwrap(), 0);
        assert_eq!(log.len(), after_first);
    }

    #[test]
    fn test_partial_intensity_rejected_before_sending() {
        let (mut ctl, log) = controller();
        let mut values = [0.0; NUM_LEDS];
        values[0] = 1.0;
        values[5] = 0.25;
        let result = ctl.apply_illumination(&IlluminationVector::from(values));
        assert!(matches!(
            result,
            Err(DeviceError::UnsupportedIntensity { index: 5, .. })
        ));
        assert!(log.is_empty());
    }

    #[test]
    fn test_all_lights_off_resets_cache() {
        let (mut ctl, log) = controller();
        ctl.apply_illumination(&plan(0, 12)).unwrap();
        ctl.all_lights_off().unwrap();
        assert_eq!(ctl.state().leds, IlluminationVector::dark());
        assert_eq!(log.commands().last().map(String::as_str), Some("-@"));

        // Cache is dark again, so the same pattern is re-sent in full.
        assert_eq!(ctl.apply_illumination(&plan(0, 12)).unwrap(), 2);
    }

    #[test]
    fn test_z_bookkeeping() {
        let (mut ctl, _log) = controller();
        assert_eq!(ctl.state().z_offset, None);
        ctl.zero_z();
        assert_eq!(ctl.state().z_offset, Some(0.0));
        ctl.advance_z(0.1);
        ctl.advance_z(0.1);
        let z = ctl.state().z_offset.unwrap();
        assert!((z - 0.2).abs() < 1e-12);
    }

    #[test]
    fn test_protocol_failure_propagates() {
        let (port, _log) = MockPort::scripted(b"E");
        let mut ctl = DeviceController::new(SerialLink::new(port));
        assert!(matches!(
            ctl.stop_motor(),
            Err(DeviceError::Protocol(_))
        ));
    }
}
