//! End-to-end capture sessions against the mock positioner port and an
//! in-memory frame grabber.

use muff_capture::capture::{PipeChannel, SimulatedChannel};
use muff_capture::device::link::SimulatedLink;
use muff_capture::device::mock::MockPort;
use muff_capture::device::{DeviceController, SerialLink};
use muff_capture::error::{CaptureError, MuffError};
use muff_capture::params::ScanSetParameters;
use muff_capture::session::{SessionOptions, SessionOutcome, SessionSequencer, SessionState};
use std::io::Cursor;
use std::path::Path;
use std::time::Duration;

type Grabber = PipeChannel<Vec<u8>, Cursor<Vec<u8>>>;

fn options(scans_dir: &Path) -> SessionOptions {
    SessionOptions {
        scans_dir: scans_dir.to_path_buf(),
        lamp_test: false,
        lamp_test_on: Duration::ZERO,
        lamp_test_off: Duration::ZERO,
        preview: Duration::ZERO,
    }
}

fn grabber(replies: &str) -> Grabber {
    PipeChannel::new(Vec::new(), Cursor::new(replies.as_bytes().to_vec()))
}

fn requests(channel: &Grabber) -> Vec<String> {
    String::from_utf8(channel.requests().clone())
        .unwrap()
        .lines()
        .map(str::to_string)
        .collect()
}

fn session(
    port: MockPort,
    channel: Grabber,
    params: ScanSetParameters,
    scans_dir: &Path,
) -> SessionSequencer<SerialLink<MockPort>, Grabber> {
    SessionSequencer::new(
        DeviceController::new(SerialLink::new(port)),
        channel,
        params,
        options(scans_dir),
    )
}

#[test]
fn test_two_height_stack() {
    let scans = tempfile::tempdir().unwrap();
    let (port, log) = MockPort::auto_ack();
    let params = ScanSetParameters::new(1, 1, 2, 0.1).unwrap();
    let mut seq = session(port, grabber("ok\nok\n"), params, scans.path());

    let mut operator = Cursor::new("u\ns\nok\n");
    let mut prompt = Vec::new();
    let report = seq.run(&mut operator, &mut prompt).unwrap();

    assert_eq!(report.outcome, SessionOutcome::Completed);
    assert_eq!(report.frames_captured, 2);
    assert_eq!(seq.state(), SessionState::Done);

    let top = report.top_dir.unwrap();
    assert!(top.starts_with(scans.path()));
    assert!(top.join("L_00/V_00/raw").is_dir());

    let sent = requests(seq.channel());
    assert_eq!(
        sent,
        vec![
            format!("G {}", top.join("L_00/V_00/raw/frame_00000.jpg").display()),
            format!("G {}", top.join("L_00/V_00/raw/frame_00001.jpg").display()),
        ]
    );

    assert_eq!(log.count("5"), 1);
    assert_eq!(log.count("4+100"), 1);
    let z = seq.controller().state().z_offset.unwrap();
    assert!((z - 0.1).abs() < 1e-9);
}

#[test]
fn test_step_happens_between_the_two_captures() {
    let scans = tempfile::tempdir().unwrap();
    let (port, log) = MockPort::auto_ack();
    let params = ScanSetParameters::new(1, 1, 2, 0.1).unwrap();
    let mut seq = session(port, grabber("ok\nok\n"), params, scans.path());

    seq.run(&mut Cursor::new("ok\n"), &mut Vec::new()).unwrap();

    // plan(0, 1) lights six LEDs; the step sits between the two frames,
    // each frame ending with the dome switched off.
    let commands = log.commands();
    let step = commands.iter().position(|c| c == "5").unwrap();
    let lights_off: Vec<usize> = commands
        .iter()
        .enumerate()
        .filter(|(_, c)| c.as_str() == "-@")
        .map(|(i, _)| i)
        .collect();
    assert!(lights_off.iter().any(|&i| i < step));
    assert!(lights_off.iter().any(|&i| i > step));
}

#[test]
fn test_bad_ack_on_second_of_three_frames() {
    let scans = tempfile::tempdir().unwrap();
    let (port, log) = MockPort::auto_ack();
    let params = ScanSetParameters::new(3, 1, 1, 0.1).unwrap();
    let mut seq = session(port, grabber("ok\nbad\n"), params, scans.path());

    let result = seq.run(&mut Cursor::new("ok\n"), &mut Vec::new());
    match result {
        Err(MuffError::Capture(CaptureError::BadAck(reply))) => assert_eq!(reply, "bad\n"),
        other => panic!("expected BadAck, got {:?}", other),
    }

    assert_eq!(requests(seq.channel()).len(), 2);
    assert_eq!(seq.frames_captured(), 1);
    assert_eq!(seq.state(), SessionState::Aborted);

    // One stop when positioning is accepted, one from cleanup.
    assert_eq!(log.count("3"), 2);
    let commands = log.commands();
    assert_eq!(commands[commands.len() - 2..], ["3", "-@"]);
}

#[test]
fn test_closed_grabber_pipe_aborts() {
    let scans = tempfile::tempdir().unwrap();
    let (port, log) = MockPort::auto_ack();
    let params = ScanSetParameters::new(2, 1, 2, 0.1).unwrap();
    let mut seq = session(port, grabber(""), params, scans.path());

    let result = seq.run(&mut Cursor::new("ok\n"), &mut Vec::new());
    assert!(matches!(
        result,
        Err(MuffError::Capture(CaptureError::LinkBroken(_)))
    ));
    assert_eq!(requests(seq.channel()).len(), 1);
    assert_eq!(log.count("5"), 0);
}

#[test]
fn test_operator_quits_before_sequencing() {
    let scans = tempfile::tempdir().unwrap();
    let (port, log) = MockPort::auto_ack();
    let params = ScanSetParameters::new(4, 1, 10, 0.05).unwrap();
    let mut seq = session(port, grabber(""), params, scans.path());

    let report = seq.run(&mut Cursor::new("D\nq\n"), &mut Vec::new()).unwrap();
    assert_eq!(report.outcome, SessionOutcome::Aborted);
    assert_eq!(report.top_dir, None);
    assert_eq!(report.frames_captured, 0);
    assert!(requests(seq.channel()).is_empty());

    // Nothing was created under the scans directory.
    assert_eq!(std::fs::read_dir(scans.path()).unwrap().count(), 0);

    let commands = log.commands();
    assert_eq!(commands[commands.len() - 2..], ["3", "-@"]);
}

#[test]
fn test_firmware_rejection_still_cleans_up() {
    let scans = tempfile::tempdir().unwrap();
    let (mut port, log) = MockPort::auto_ack();
    // "-@" and the step size are acknowledged, the first LED is not.
    port.stage_reply(b"0");
    port.stage_reply(b"# step 100\n0");
    port.stage_reply(b"E");
    let params = ScanSetParameters::new(1, 1, 1, 0.1).unwrap();
    let mut seq = session(port, grabber(""), params, scans.path());

    let err = seq.run(&mut Cursor::new("ok\n"), &mut Vec::new()).unwrap_err();
    assert_eq!(err.tag(), "protocol");
    assert_eq!(err.exit_code(), 1);
    assert_eq!(
        log.commands(),
        vec!["-@", "4+100", "+A", "3", "-@"]
    );
}

#[test]
fn test_fully_simulated_session() {
    let scans = tempfile::tempdir().unwrap();
    let params = ScanSetParameters::new(24, 1, 1, 0.2).unwrap();
    let mut seq = SessionSequencer::new(
        DeviceController::new(SimulatedLink::with_delay(Duration::ZERO)),
        SimulatedChannel::new(),
        params,
        options(scans.path()),
    );

    let report = seq.run(&mut Cursor::new("ok\n"), &mut Vec::new()).unwrap();
    assert_eq!(report.outcome, SessionOutcome::Completed);
    assert_eq!(report.frames_captured, 24);
    assert_eq!(seq.channel().requested(), 24);
    assert!(seq.controller().is_simulated());

    let top = report.top_dir.unwrap();
    for light in 0..24 {
        assert!(top.join(format!("L_{:02}/V_00/raw", light)).is_dir());
    }
}
