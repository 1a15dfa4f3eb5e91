//! MUFF capture: positions the microscope, sequences the dome lighting and
//! asks the frame grabber for every frame of a scan set.

use anyhow::Context;
use clap::Parser;
use muff_capture::capture::{open_channel, CaptureChannel};
use muff_capture::config::{MuffConfig, DEFAULT_CONFIG_FILE};
use muff_capture::device::link::open_link;
use muff_capture::device::DeviceController;
use muff_capture::error::{MuffError, ParameterError};
use muff_capture::params::ScanSetParameters;
use muff_capture::session::{SessionOptions, SessionOutcome, SessionSequencer};
use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// Capture a multi-light, multi-focus image set with the MUFF rig.
///
/// Scan set parameters come from the four positional values, from a
/// parameter file, or, with neither, from prompts on the terminal.
#[derive(Parser, Debug)]
#[command(name = "muff_capture", version)]
#[command(about = "MUFF microscope positioner and capture sequencer", long_about = None)]
struct Args {
    /// Lighting conditions, view directions, focus heights and Z step (mm)
    #[arg(num_args = 4, value_names = ["NL", "NV", "NH", "ZSTEP"], conflicts_with = "params", allow_negative_numbers = true)]
    scan: Vec<String>,

    /// Read scan set parameters from FILE
    #[arg(long, value_name = "FILE")]
    params: Option<PathBuf>,

    /// Configuration file
    #[arg(long, value_name = "FILE", default_value = DEFAULT_CONFIG_FILE)]
    config: PathBuf,

    /// Run without the positioner
    #[arg(long)]
    simulate_device: bool,

    /// Run without the frame grabber
    #[arg(long)]
    no_camera: bool,

    /// Root directory for scan sets
    #[arg(long, value_name = "DIR")]
    scans_dir: Option<PathBuf>,

    /// Skip the lamp test and lighting preview
    #[arg(long)]
    no_lamp_test: bool,

    /// Log device traffic
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> ExitCode {
    let args = Args::parse();
    match run(&args) {
        Ok(code) => code,
        Err(err) => {
            let (tag, code) = match err.downcast_ref::<MuffError>() {
                Some(e) => (e.tag(), e.exit_code()),
                None => ("muff", 1),
            };
            eprintln!("** [{}] {:#}", tag, err);
            ExitCode::from(code)
        }
    }
}

fn run(args: &Args) -> anyhow::Result<ExitCode> {
    let mut config = MuffConfig::load_from(&args.config).map_err(MuffError::from)?;
    init_logging(&config, args.verbose);

    if let Some(dir) = &args.scans_dir {
        config.session.scans_dir = dir.clone();
    }
    if args.no_lamp_test {
        config.session.lamp_test = false;
    }
    config.validate().map_err(MuffError::from)?;

    let stdin = io::stdin();
    let mut operator = stdin.lock();
    let mut prompt = io::stderr();

    let params = scan_parameters(args, &mut operator, &mut prompt).map_err(MuffError::from)?;
    info!("Scan set: {}", params);

    let link = open_link(&config.device, args.simulate_device).map_err(MuffError::from)?;
    let channel = open_channel(&config.capture, args.no_camera)
        .map_err(MuffError::from)
        .context("cannot reach the frame grabber")?;

    let mut sequencer = SessionSequencer::new(
        DeviceController::new(link),
        channel,
        params,
        SessionOptions::from_config(&config.session),
    );
    let result = sequencer.run(&mut operator, &mut prompt);

    if let Err(e) = sequencer.channel_mut().request_shutdown() {
        warn!("Frame grabber shutdown request failed: {}", e);
    }

    let report = result?;
    match report.outcome {
        SessionOutcome::Completed => {
            info!("Done: {} frames captured", report.frames_captured);
            Ok(ExitCode::SUCCESS)
        }
        SessionOutcome::Aborted => {
            writeln!(prompt, "** process aborted.")?;
            Ok(ExitCode::FAILURE)
        }
    }
}

fn scan_parameters<R: BufRead, W: Write>(
    args: &Args,
    operator: &mut R,
    prompt: &mut W,
) -> Result<ScanSetParameters, ParameterError> {
    if let Some(path) = &args.params {
        return ScanSetParameters::from_file(path);
    }
    match args.scan.as_slice() {
        [n_l, n_v, n_h, z_step] => ScanSetParameters::from_args(n_l, n_v, n_h, z_step),
        _ => ScanSetParameters::prompt(operator, prompt),
    }
}

fn init_logging(config: &MuffConfig, verbose: bool) {
    let level = if verbose { "debug" } else { config.log_level.as_str() };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level)))
        .with_writer(io::stderr)
        .init();
}
