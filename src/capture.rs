//! Request/acknowledgement channel to the frame grabber.
//!
//! The grabber is a separate process reading requests on one named pipe and
//! answering on another:
//!
//! ```text
//! -> G muff_scans/2026-10-16-0942-U/L_00/V_00/raw/frame_00000.jpg
//! <- ok
//! -> Q
//! ```
//!
//! At most one request is outstanding at any time.

use crate::config::CaptureConfig;
use crate::error::CaptureError;
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;
use tracing::{debug, info, warn};

/// The grabber's success reply, terminator included.
pub const ACK_LINE: &str = "ok\n";

/// Synchronous channel to the frame grabber.
pub trait CaptureChannel {
    /// Ask for one frame saved at `destination` and block until it is done.
    fn request_capture(&mut self, destination: &Path) -> Result<(), CaptureError>;

    /// Tell the grabber to exit. No reply is expected.
    fn request_shutdown(&mut self) -> Result<(), CaptureError>;

    /// Whether frames are really being grabbed.
    fn is_simulated(&self) -> bool {
        false
    }
}

impl<C: CaptureChannel + ?Sized> CaptureChannel for Box<C> {
    fn request_capture(&mut self, destination: &Path) -> Result<(), CaptureError> {
        (**self).request_capture(destination)
    }

    fn request_shutdown(&mut self) -> Result<(), CaptureError> {
        (**self).request_shutdown()
    }

    fn is_simulated(&self) -> bool {
        (**self).is_simulated()
    }
}

/// Channel over an arbitrary request writer and reply reader.
pub struct PipeChannel<W: Write, R: BufRead> {
    requests: W,
    replies: R,
}

impl<W: Write, R: BufRead> PipeChannel<W, R> {
    /// Wrap already opened streams.
    pub fn new(requests: W, replies: R) -> Self {
        Self { requests, replies }
    }

    /// The request stream.
    pub fn requests(&self) -> &W {
        &self.requests
    }

    /// Give back the underlying streams.
    pub fn into_inner(self) -> (W, R) {
        (self.requests, self.replies)
    }

    fn send_line(&mut self, line: &str) -> Result<(), CaptureError> {
        writeln!(self.requests, "{}", line)
            .and_then(|()| self.requests.flush())
            .map_err(|e| CaptureError::LinkBroken(format!("request could not be sent: {}", e)))
    }
}

impl<W: Write, R: BufRead> CaptureChannel for PipeChannel<W, R> {
    fn request_capture(&mut self, destination: &Path) -> Result<(), CaptureError> {
        // The grabber must receive the exact path, never a lossy rendering.
        let path = destination
            .to_str()
            .ok_or_else(|| CaptureError::NonUtf8Path(destination.to_path_buf()))?;
        info!("Requesting capture: {}", path);
        self.send_line(&format!("G {}", path))?;

        let mut reply = Vec::new();
        let len = self
            .replies
            .read_until(b'\n', &mut reply)
            .map_err(|e| CaptureError::LinkBroken(format!("reply could not be read: {}", e)))?;
        if len == 0 {
            return Err(CaptureError::LinkBroken("reply pipe was closed".to_string()));
        }
        if reply != ACK_LINE.as_bytes() {
            return Err(CaptureError::BadAck(String::from_utf8_lossy(&reply).into_owned()));
        }
        debug!("Frame grabber acknowledged {}", destination.display());
        Ok(())
    }

    fn request_shutdown(&mut self) -> Result<(), CaptureError> {
        info!("Asking frame grabber to exit");
        self.send_line("Q")
    }
}

/// Stand-in used when no frame grabber is running.
#[derive(Debug, Default, Clone)]
pub struct SimulatedChannel {
    requested: usize,
}

impl SimulatedChannel {
    /// Create a simulated channel.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of captures requested so far.
    pub fn requested(&self) -> usize {
        self.requested
    }
}

impl CaptureChannel for SimulatedChannel {
    fn request_capture(&mut self, destination: &Path) -> Result<(), CaptureError> {
        info!("would request capture: 'G {}'", destination.display());
        self.requested += 1;
        Ok(())
    }

    fn request_shutdown(&mut self) -> Result<(), CaptureError> {
        debug!("would ask frame grabber to exit");
        Ok(())
    }

    fn is_simulated(&self) -> bool {
        true
    }
}

/// Pipe channel over the named FIFOs shared with the grabber.
pub type FifoChannel = PipeChannel<BufWriter<File>, BufReader<File>>;

/// Open the FIFOs shared with the grabber.
///
/// Opening a FIFO blocks until its other end is opened too. The grabber
/// opens the request pipe for reading and then the reply pipe for writing,
/// so the request side must be opened first here as well.
pub fn open_fifos(request: &Path, reply: &Path) -> Result<FifoChannel, CaptureError> {
    debug!("Opening request pipe {}", request.display());
    let requests = OpenOptions::new()
        .write(true)
        .open(request)
        .map_err(|e| CaptureError::LinkBroken(format!("cannot open {}: {}", request.display(), e)))?;

    debug!("Opening reply pipe {}", reply.display());
    let replies = File::open(reply)
        .map_err(|e| CaptureError::LinkBroken(format!("cannot open {}: {}", reply.display(), e)))?;

    info!("Connected to frame grabber");
    Ok(PipeChannel::new(BufWriter::new(requests), BufReader::new(replies)))
}

/// Build the channel selected by `config`; `no_camera` forces simulation.
pub fn open_channel(config: &CaptureConfig, no_camera: bool) -> Result<Box<dyn CaptureChannel>, CaptureError> {
    if config.simulate || no_camera {
        warn!("running without the frame grabber (simulated capture channel)");
        return Ok(Box::new(SimulatedChannel::new()));
    }
    Ok(Box::new(open_fifos(&config.request_pipe, &config.reply_pipe)?))
}
