//! Positioner firmware access.
//!
//! The MUFF positioner is a microcontroller driving the focus stepper motor
//! and the 24 dome LEDs. It speaks a one-byte-opcode ASCII protocol and
//! answers every command with a single `0`.
//!
//! - [`link`]: the command/acknowledgement transport (`DeviceLink`), with a
//!   serial implementation and a simulated one for running without hardware.
//! - [`port`]: the byte-stream seam under the serial link.
//! - [`controller`]: semantic operations and the presumed device state.
//! - [`mock`]: scripted in-memory port for tests.

pub mod controller;
pub mod link;
pub mod mock;
pub mod port;

pub use controller::{DeviceController, DeviceState, Direction};
pub use link::{DeviceLink, SerialLink, SimulatedLink};
pub use port::Port;
