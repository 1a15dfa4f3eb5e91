//! Mock positioner port
//!
//! In-memory [`Port`] for exercising the serial link, the controller and the
//! session sequencer without hardware. Every write is recorded as one command
//! in a shared [`CommandLog`], so a test keeps a handle to the log after the
//! port has been moved into a link.
//!
//! Replies are delivered only after a command is written, mirroring the real
//! firmware, which never speaks before it is spoken to (apart from stale
//! bytes, see [`MockPort::with_stale_input`]).

use crate::device::port::Port;
use std::collections::VecDeque;
use std::io::{self, Read, Write};
use std::sync::{Arc, Mutex};

/// Shared record of the commands written to a [`MockPort`].
#[derive(Debug, Clone, Default)]
pub struct CommandLog {
    commands: Arc<Mutex<Vec<Vec<u8>>>>,
}

impl CommandLog {
    fn push(&self, command: Vec<u8>) {
        let mut guard = self.commands.lock().unwrap_or_else(|e| e.into_inner());
        guard.push(command);
    }

    /// All commands written so far, as text.
    pub fn commands(&self) -> Vec<String> {
        let guard = self.commands.lock().unwrap_or_else(|e| e.into_inner());
        guard
            .iter()
            .map(|c| String::from_utf8_lossy(c).into_owned())
            .collect()
    }

    /// Number of times `command` was written.
    pub fn count(&self, command: &str) -> usize {
        self.commands().iter().filter(|c| c.as_str() == command).count()
    }

    /// Number of commands written so far.
    pub fn len(&self) -> usize {
        self.commands.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    /// Whether nothing has been written yet.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Scripted in-memory port.
#[derive(Debug, Default)]
pub struct MockPort {
    input: VecDeque<u8>,
    staged: VecDeque<Vec<u8>>,
    auto_ack: bool,
    log: CommandLog,
}

impl MockPort {
    /// Port that answers every command with `0`.
    pub fn auto_ack() -> (Self, CommandLog) {
        let port = Self {
            auto_ack: true,
            ..Self::default()
        };
        let log = port.log.clone();
        (port, log)
    }

    /// Port whose reply to the first command is `reply`; later commands get
    /// no reply unless more are staged.
    pub fn scripted(reply: &[u8]) -> (Self, CommandLog) {
        let mut port = Self::default();
        port.stage_reply(reply);
        let log = port.log.clone();
        (port, log)
    }

    /// Port with `stale` already waiting in its input buffer, as if left over
    /// from an earlier exchange.
    pub fn with_stale_input(stale: &[u8]) -> (Self, CommandLog) {
        let port = Self {
            input: stale.iter().copied().collect(),
            ..Self::default()
        };
        let log = port.log.clone();
        (port, log)
    }

    /// Queue `reply` to be delivered after the next command without one.
    pub fn stage_reply(&mut self, reply: &[u8]) {
        self.staged.push_back(reply.to_vec());
    }
}

impl Read for MockPort {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let mut n = 0;
        while n < buf.len() {
            match self.input.pop_front() {
                Some(b) => {
                    buf[n] = b;
                    n += 1;
                }
                None => break,
            }
        }
        Ok(n)
    }
}

impl Write for MockPort {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        self.log.push(buf.to_vec());
        match self.staged.pop_front() {
            Some(reply) => self.input.extend(reply),
            None if self.auto_ack => self.input.push_back(b'0'),
            None => {}
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Port for MockPort {
    fn discard_input(&mut self) -> io::Result<()> {
        self.input.clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_auto_ack_replies_after_each_write() {
        let (mut port, log) = MockPort::auto_ack();
        let mut buf = [0u8; 4];
        assert_eq!(port.read(&mut buf).unwrap(), 0);

        port.write_all(b"3").unwrap();
        assert_eq!(port.read(&mut buf).unwrap(), 1);
        assert_eq!(buf[0], b'0');
        assert_eq!(log.commands(), vec!["3"]);
    }

    #[test]
    fn test_staged_reply_takes_precedence_over_auto_ack() {
        let (mut port, log) = MockPort::auto_ack();
        port.stage_reply(b"#x\n1");
        port.write_all(b"+A").unwrap();
        let mut out = Vec::new();
        port.read_to_end(&mut out).unwrap();
        assert_eq!(out, b"#x\n1");
        assert_eq!(log.count("+A"), 1);
    }

    #[test]
    fn test_discard_drops_pending_input() {
        let (mut port, log) = MockPort::with_stale_input(b"000");
        port.discard_input().unwrap();
        let mut buf = [0u8; 1];
        assert_eq!(port.read(&mut buf).unwrap(), 0);
        assert!(log.is_empty());
    }
}
