//! Capture session state machine.
//!
//! ```text
//! AwaitManualPositioning --ok--> Sequencing(L, V, H) --> Done
//!          |                             |
//!          +--abort / q / EOF--> Aborted <+-- capture or device failure
//! ```
//!
//! Whatever the path, [`SessionSequencer::run`] stops the motor and switches
//! every LED off before it returns.

use crate::capture::CaptureChannel;
use crate::config::SessionConfig;
use crate::device::{DeviceController, DeviceLink, Direction};
use crate::error::{DeviceError, MuffError};
use crate::escape::show_bytes;
use crate::layout::ScanLayout;
use crate::lighting::{plan, positioning_pattern};
use crate::params::ScanSetParameters;
use chrono::{DateTime, Utc};
use std::io::{BufRead, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

const POSITIONING_HELP: &str = "\
Manually position the microscope camera at the lowest Z position of the stack.

Type
  'u' to start the microscope moving up (slow),
  'U' to start the microscope moving up (fast),
  'd' to start it moving down (slow),
  'D' to start it moving down (fast), and
  's' to stop the motion.
You may repeat these commands as many times as needed.

When the camera is at the desired starting position, type 'ok'.

To abort the capture, type 'abort' or 'q', or end the input (CTRL-D).
";

const POSITIONING_PROMPT: &str = "command (u,d,U,D,s,q,ok,abort)? ";

/// Where the session is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Waiting for the operator to place the microscope at the first height.
    AwaitManualPositioning,
    /// Working on the frame for this light, view and height.
    Sequencing {
        /// Lighting condition index.
        light: u32,
        /// View direction index.
        view: u32,
        /// Focus height index.
        height: u32,
    },
    /// Every frame was captured.
    Done,
    /// The operator gave up or something failed.
    Aborted,
}

/// How a session ended without error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionOutcome {
    /// All frames captured.
    Completed,
    /// The operator aborted during positioning.
    Aborted,
}

/// Summary returned by [`SessionSequencer::run`].
#[derive(Debug, Clone, PartialEq)]
pub struct SessionReport {
    /// How the session ended.
    pub outcome: SessionOutcome,
    /// Scan set directory, if sequencing got that far.
    pub top_dir: Option<PathBuf>,
    /// Frames acknowledged by the grabber.
    pub frames_captured: u32,
}

/// Session knobs that are not scan set parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionOptions {
    /// Root under which the scan set directory is created.
    pub scans_dir: PathBuf,
    /// Flash the dome and preview every lighting condition first.
    pub lamp_test: bool,
    /// All-on time of the lamp test.
    pub lamp_test_on: Duration,
    /// Dark pause after the lamp test.
    pub lamp_test_off: Duration,
    /// Time each lighting condition is shown in the preview.
    pub preview: Duration,
}

impl SessionOptions {
    /// Options from the `[session]` configuration section.
    pub fn from_config(config: &SessionConfig) -> Self {
        Self {
            scans_dir: config.scans_dir.clone(),
            lamp_test: config.lamp_test,
            lamp_test_on: Duration::from_millis(config.lamp_test_on_ms),
            lamp_test_off: Duration::from_millis(config.lamp_test_off_ms),
            preview: Duration::from_millis(config.preview_ms),
        }
    }
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self::from_config(&SessionConfig::default())
    }
}

/// Drives one capture session over a device controller and a capture channel.
pub struct SessionSequencer<L: DeviceLink, C: CaptureChannel> {
    controller: DeviceController<L>,
    channel: C,
    params: ScanSetParameters,
    options: SessionOptions,
    state: SessionState,
    frames_captured: u32,
    layout: Option<ScanLayout>,
}

impl<L: DeviceLink, C: CaptureChannel> SessionSequencer<L, C> {
    /// New session, waiting for manual positioning.
    pub fn new(controller: DeviceController<L>, channel: C, params: ScanSetParameters, options: SessionOptions) -> Self {
        Self {
            controller,
            channel,
            params,
            options,
            state: SessionState::AwaitManualPositioning,
            frames_captured: 0,
            layout: None,
        }
    }

    /// Current state.
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Frames acknowledged so far.
    pub fn frames_captured(&self) -> u32 {
        self.frames_captured
    }

    /// The device controller.
    pub fn controller(&self) -> &DeviceController<L> {
        &self.controller
    }

    /// The capture channel.
    pub fn channel(&self) -> &C {
        &self.channel
    }

    /// Mutable access to the capture channel, e.g. to shut the grabber down.
    pub fn channel_mut(&mut self) -> &mut C {
        &mut self.channel
    }

    /// Scan set layout, once sequencing has created it.
    pub fn layout(&self) -> Option<&ScanLayout> {
        self.layout.as_ref()
    }

    /// Run the whole session: preparation, manual positioning, sequencing.
    ///
    /// `operator` supplies the positioning commands and `prompt` receives
    /// the help text and prompts. Cleanup runs exactly once on every path;
    /// an error from the session itself takes precedence over a cleanup
    /// failure.
    pub fn run<R: BufRead, W: Write>(&mut self, operator: &mut R, prompt: &mut W) -> Result<SessionReport, MuffError> {
        let result = self.drive(operator, prompt);
        if result.is_err() {
            self.state = SessionState::Aborted;
        }
        let cleanup = self.cleanup();

        let outcome = match result {
            Ok(outcome) => outcome,
            Err(e) => {
                error!("Session aborted: {}", e);
                if let Err(cleanup_err) = cleanup {
                    error!("Cleanup after abort also failed: {}", cleanup_err);
                }
                return Err(e);
            }
        };
        cleanup?;

        Ok(SessionReport {
            outcome,
            top_dir: self.layout.as_ref().map(|l| l.top_dir().to_path_buf()),
            frames_captured: self.frames_captured,
        })
    }

    fn drive<R: BufRead, W: Write>(&mut self, operator: &mut R, prompt: &mut W) -> Result<SessionOutcome, MuffError> {
        self.prepare()?;
        if !self.position_manually(operator, prompt)? {
            return Ok(SessionOutcome::Aborted);
        }
        self.sequence(Utc::now())?;
        Ok(SessionOutcome::Completed)
    }

    /// Lamp test and preview (or just all-off), then program the step size.
    pub fn prepare(&mut self) -> Result<(), MuffError> {
        if self.options.lamp_test {
            info!("Testing the lamps");
            self.controller.all_lights_on()?;
            pause(self.options.lamp_test_on);
            self.controller.all_lights_off()?;
            pause(self.options.lamp_test_off);

            let n_lights = self.params.n_lights();
            for light in 0..n_lights {
                info!("Previewing lighting condition {} of {}", light, n_lights);
                self.controller.apply_illumination(&plan(light as usize, n_lights as usize))?;
                pause(self.options.preview);
                self.controller.all_lights_off()?;
            }
        } else {
            self.controller.all_lights_off()?;
        }
        self.controller.set_step_size(self.params.z_step())?;
        Ok(())
    }

    /// Let the operator place the microscope at the first height.
    ///
    /// Returns `true` when the operator accepted the position with `ok`, and
    /// `false` on `abort`, `q` or end of input. The motor is stopped on
    /// every exit.
    pub fn position_manually<R: BufRead, W: Write>(&mut self, operator: &mut R, prompt: &mut W) -> Result<bool, MuffError> {
        self.state = SessionState::AwaitManualPositioning;
        info!("Starting manual positioning of the camera");
        write!(prompt, "{}", POSITIONING_HELP)?;
        self.controller.apply_illumination(&positioning_pattern())?;

        loop {
            write!(prompt, "{}", POSITIONING_PROMPT)?;
            prompt.flush()?;

            let mut line = Vec::new();
            if operator.read_until(b'\n', &mut line)? == 0 {
                writeln!(prompt)?;
                warn!("End of operator input during positioning");
                self.controller.stop_motor()?;
                self.state = SessionState::Aborted;
                return Ok(false);
            }

            // Bytes that are not UTF-8 fall through to the unrecognized arm.
            let raw = line.trim_ascii();
            match std::str::from_utf8(raw).ok() {
                Some("u") => self.controller.start_motor(Direction::Up, false)?,
                Some("d") => self.controller.start_motor(Direction::Down, false)?,
                Some("U") => self.controller.start_motor(Direction::Up, true)?,
                Some("D") => self.controller.start_motor(Direction::Down, true)?,
                Some("") => {}
                Some(command) if command.eq_ignore_ascii_case("s") => self.controller.stop_motor()?,
                Some(command) if command.eq_ignore_ascii_case("ok") => {
                    self.controller.stop_motor()?;
                    self.controller.zero_z();
                    self.controller.all_lights_off()?;
                    info!("Position accepted as Z = 0");
                    self.state = SessionState::Sequencing {
                        light: 0,
                        view: 0,
                        height: 0,
                    };
                    return Ok(true);
                }
                Some(command) if command.eq_ignore_ascii_case("abort") || command.eq_ignore_ascii_case("q") => {
                    warn!("Operator aborted positioning");
                    self.controller.stop_motor()?;
                    self.state = SessionState::Aborted;
                    return Ok(false);
                }
                _ => {
                    writeln!(prompt, "** unrecognized command '{}'", show_bytes(raw, true))?;
                }
            }
        }
    }

    /// Capture every frame of the scan set, starting at the current height.
    pub fn sequence(&mut self, started_at: DateTime<Utc>) -> Result<(), MuffError> {
        let n_lights = self.params.n_lights();
        let n_views = self.params.n_views();
        let n_heights = self.params.n_heights();
        let z_step = self.params.z_step();

        info!(
            "Capturing {} images ({} lights, {} views, {} heights)",
            self.params.frame_count(),
            n_lights,
            n_views,
            n_heights
        );
        info!(
            "Estimated time = {:.1} minutes",
            self.params.estimated_duration().as_secs_f64() / 60.0
        );

        let layout = ScanLayout::create(&self.options.scans_dir, n_lights, n_views, started_at)?;
        info!("Saving images in {}", layout.top_dir().display());
        self.layout = Some(layout.clone());

        let t_start = Instant::now();
        for height in 0..n_heights {
            if height > 0 {
                self.controller.step_once()?;
                self.controller.advance_z(z_step);
            }
            for view in 0..n_views {
                if n_views > 1 {
                    self.set_view_direction(view);
                }
                for light in 0..n_lights {
                    self.state = SessionState::Sequencing { light, view, height };
                    let destination = layout.frame_path(light, view, height);
                    self.capture_frame(light, &destination)?;
                }
            }
        }

        info!(
            "Captured {} images in {:.1} minutes",
            self.frames_captured,
            t_start.elapsed().as_secs_f64() / 60.0
        );
        self.state = SessionState::Done;
        Ok(())
    }

    fn capture_frame(&mut self, light: u32, destination: &Path) -> Result<(), MuffError> {
        let pattern = plan(light as usize, self.params.n_lights() as usize);
        self.controller.apply_illumination(&pattern)?;
        debug!("Lit LEDs {:?} for condition {}", pattern.lit(), light);

        let captured = self.channel.request_capture(destination);
        let lights_off = self.controller.all_lights_off();
        if let Err(e) = captured {
            error!("Frame capture failed: {}", e);
            return Err(e.into());
        }
        lights_off?;
        self.frames_captured += 1;
        Ok(())
    }

    // No rotating stage yet; more than one view is rejected by the parameters.
    fn set_view_direction(&mut self, view: u32) {
        warn!("View rotation is not implemented, ignoring view {}", view);
    }

    fn cleanup(&mut self) -> Result<(), DeviceError> {
        info!("Stopping motor and switching all LEDs off");
        let stopped = self.controller.stop_motor();
        let dark = self.controller.all_lights_off();
        stopped.and(dark)
    }
}

fn pause(duration: Duration) {
    if !duration.is_zero() {
        std::thread::sleep(duration);
    }
}
