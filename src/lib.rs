//! Core library for the MUFF capture rig.
//!
//! MUFF (multi-light, multi-view, multi-focus) drives a motorized focus stage
//! and a 24-LED illumination dome to capture a structured image set: every
//! lighting condition at every focus height. Frames are grabbed by a separate
//! camera process that this crate talks to over a pair of named pipes.
//!
//! The pieces, leaf first:
//! - [`device`]: the positioner firmware link and the stateful controller.
//! - [`lighting`]: the dome geometry and the per-condition LED patterns.
//! - [`capture`]: the request/acknowledgement channel to the frame grabber.
//! - [`layout`]: where frames land on disk.
//! - [`session`]: the state machine tying it all together.
//!
//! [`params`], [`config`] and [`error`] carry the inputs and failures of a
//! session; [`escape`] renders raw bytes for diagnostics.

pub mod capture;
pub mod config;
pub mod device;
pub mod error;
pub mod escape;
pub mod layout;
pub mod lighting;
pub mod params;
pub mod session;
