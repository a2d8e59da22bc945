//! Control Channels
//!
//! Four unidirectional pipes connect the supervisor with its workers:
//!
//! ```text
//! response  worker ──frames──▶ supervisor   (Ready / Done / Report)
//! start     supervisor ──token──▶ worker
//! results   supervisor ──token──▶ worker    (one request per report)
//! exit      supervisor ──token──▶ worker
//! ```
//!
//! Each pipe is shared by all workers of a run. After `fork(2)` each side
//! drops the half it does not own, so every end is held by exactly one party.

use crate::framing::{FrameDecoder, FrameError, FrameWriter};
use crate::messages::{PhaseToken, WorkerMessage};
use std::fs::File;
use std::io::{Read, Write};
use std::os::fd::{AsFd, AsRawFd, BorrowedFd, FromRawFd, OwnedFd, RawFd};
use std::time::Duration;
use thiserror::Error;

/// Errors raised by the control channels
#[derive(Debug, Error)]
pub enum ChannelError {
    /// `pipe(2)` failed
    #[error("Failed to create pipe: {0}")]
    Create(std::io::Error),

    /// Reading or writing a pipe failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A response frame could not be encoded or decoded
    #[error("Frame error: {0}")]
    Frame(#[from] FrameError),

    /// Every writer on the other side closed its end
    #[error("Channel closed by peer")]
    Closed,

    /// A token channel carried the wrong byte
    #[error("Unexpected token byte {got:#04x} (expected {expected:?})")]
    UnexpectedToken {
        /// Token this channel carries
        expected: PhaseToken,
        /// Byte actually read
        got: u8,
    },
}

/// Result of polling for data
#[derive(Debug)]
pub enum PollResult {
    /// At least one byte can be read without blocking
    DataAvailable,
    /// Nothing arrived before the timeout
    Timeout,
    /// Every writer closed its end
    PipeClosed,
    /// A signal (typically SIGCHLD) interrupted the wait
    Interrupted,
    /// `poll(2)` itself failed
    Error(std::io::Error),
}

/// Wait for data to be available on a file descriptor with timeout
pub fn wait_for_data(fd: BorrowedFd<'_>, timeout_ms: i32) -> PollResult {
    let mut pollfd = libc::pollfd {
        fd: fd.as_raw_fd(),
        events: libc::POLLIN,
        revents: 0,
    };

    let result = unsafe { libc::poll(&mut pollfd, 1, timeout_ms) };

    if result < 0 {
        let err = std::io::Error::last_os_error();
        if err.kind() == std::io::ErrorKind::Interrupted {
            PollResult::Interrupted
        } else {
            PollResult::Error(err)
        }
    } else if result == 0 {
        PollResult::Timeout
    } else if pollfd.revents & libc::POLLIN != 0 {
        // Data first: a closing pipe may still hold unread bytes
        PollResult::DataAvailable
    } else if pollfd.revents & (libc::POLLERR | libc::POLLHUP | libc::POLLNVAL) != 0 {
        PollResult::PipeClosed
    } else {
        PollResult::Timeout
    }
}

/// Create a pipe pair, returning (read end, write end), both close-on-exec.
fn create_pipe() -> Result<(OwnedFd, OwnedFd), ChannelError> {
    let mut fds = [0 as RawFd; 2];
    let ret = unsafe { libc::pipe(fds.as_mut_ptr()) };
    if ret != 0 {
        return Err(ChannelError::Create(std::io::Error::last_os_error()));
    }
    // SAFETY: pipe(2) succeeded, both descriptors are fresh and owned by us.
    let (read, write) = unsafe { (OwnedFd::from_raw_fd(fds[0]), OwnedFd::from_raw_fd(fds[1])) };
    for fd in [read.as_raw_fd(), write.as_raw_fd()] {
        unsafe {
            let flags = libc::fcntl(fd, libc::F_GETFD);
            libc::fcntl(fd, libc::F_SETFD, flags | libc::FD_CLOEXEC);
        }
    }
    Ok((read, write))
}

fn poll_timeout_ms(timeout: Duration) -> i32 {
    timeout.as_millis().min(i32::MAX as u128) as i32
}

/// Supervisor side of a phase-token channel
#[derive(Debug)]
pub struct TokenSender {
    file: File,
    token: PhaseToken,
}

impl TokenSender {
    /// Write `count` copies of this channel's token (one per worker addressed)
    pub fn send(&mut self, count: usize) -> Result<(), ChannelError> {
        let bytes = vec![self.token.to_byte(); count];
        self.file.write_all(&bytes)?;
        Ok(())
    }
}

/// Worker side of a phase-token channel
#[derive(Debug)]
pub struct TokenReceiver {
    file: File,
    token: PhaseToken,
}

impl TokenReceiver {
    /// Consume one token if one is already waiting; never blocks on an empty pipe.
    pub fn try_recv(&mut self) -> Result<bool, ChannelError> {
        match wait_for_data(self.file.as_fd(), 0) {
            PollResult::DataAvailable => {
                self.recv()?;
                Ok(true)
            }
            PollResult::Timeout | PollResult::Interrupted => Ok(false),
            PollResult::PipeClosed => Err(ChannelError::Closed),
            PollResult::Error(e) => Err(ChannelError::Io(e)),
        }
    }

    /// Block until one token arrives
    pub fn recv(&mut self) -> Result<(), ChannelError> {
        let mut byte = [0u8; 1];
        match self.file.read_exact(&mut byte) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                return Err(ChannelError::Closed);
            }
            Err(e) => return Err(ChannelError::Io(e)),
        }
        match PhaseToken::from_byte(byte[0]) {
            Some(token) if token == self.token => Ok(()),
            _ => Err(ChannelError::UnexpectedToken {
                expected: self.token,
                got: byte[0],
            }),
        }
    }
}

/// Supervisor side of the response channel
#[derive(Debug)]
pub struct MessageReceiver {
    file: File,
    decoder: FrameDecoder,
    scratch: Vec<u8>,
}

impl MessageReceiver {
    /// Wait at most `timeout` for the next complete message.
    ///
    /// Returns `Ok(None)` when the wait elapsed (or was interrupted by a
    /// signal) before a whole frame arrived; partial frames stay buffered.
    pub fn poll_message(
        &mut self,
        timeout: Duration,
    ) -> Result<Option<WorkerMessage>, ChannelError> {
        if let Some(message) = self.decoder.next_frame()? {
            return Ok(Some(message));
        }

        match wait_for_data(self.file.as_fd(), poll_timeout_ms(timeout)) {
            PollResult::DataAvailable => {
                let n = match self.file.read(&mut self.scratch) {
                    Ok(0) => return Err(ChannelError::Closed),
                    Ok(n) => n,
                    Err(e) if e.kind() == std::io::ErrorKind::Interrupted => return Ok(None),
                    Err(e) => return Err(ChannelError::Io(e)),
                };
                self.decoder.push(&self.scratch[..n]);
                Ok(self.decoder.next_frame()?)
            }
            PollResult::Timeout | PollResult::Interrupted => Ok(None),
            PollResult::PipeClosed => Err(ChannelError::Closed),
            PollResult::Error(e) => Err(ChannelError::Io(e)),
        }
    }
}

/// Worker side of the response channel
#[derive(Debug)]
pub struct MessageSender {
    writer: FrameWriter<File>,
}

impl MessageSender {
    /// Send one framed message
    pub fn send(&mut self, message: &WorkerMessage) -> Result<(), ChannelError> {
        self.writer.write(message)?;
        Ok(())
    }
}

/// The supervisor's halves of the four control channels
#[derive(Debug)]
pub struct SupervisorEnds {
    /// Ready / Done / Report frames from all workers
    pub responses: MessageReceiver,
    /// Start tokens
    pub start: TokenSender,
    /// Result-request tokens
    pub results: TokenSender,
    /// Exit tokens
    pub exit: TokenSender,
}

/// A worker's halves of the four control channels
#[derive(Debug)]
pub struct WorkerEnds {
    /// Frames to the supervisor
    pub responses: MessageSender,
    /// Start tokens
    pub start: TokenReceiver,
    /// Result-request tokens
    pub results: TokenReceiver,
    /// Exit tokens
    pub exit: TokenReceiver,
}

/// Create the four control pipes and split them by owner.
///
/// If any pipe cannot be created, the ones already created are closed on drop.
pub fn control_channels() -> Result<(SupervisorEnds, WorkerEnds), ChannelError> {
    let (response_read, response_write) = create_pipe()?;
    let (start_read, start_write) = create_pipe()?;
    let (results_read, results_write) = create_pipe()?;
    let (exit_read, exit_write) = create_pipe()?;

    let supervisor = SupervisorEnds {
        responses: MessageReceiver {
            file: File::from(response_read),
            decoder: FrameDecoder::new(),
            scratch: vec![0u8; 64 * 1024],
        },
        start: TokenSender {
            file: File::from(start_write),
            token: PhaseToken::Start,
        },
        results: TokenSender {
            file: File::from(results_write),
            token: PhaseToken::ResultRequest,
        },
        exit: TokenSender {
            file: File::from(exit_write),
            token: PhaseToken::Exit,
        },
    };

    let worker = WorkerEnds {
        responses: MessageSender {
            writer: FrameWriter::new(File::from(response_write)),
        },
        start: TokenReceiver {
            file: File::from(start_read),
            token: PhaseToken::Start,
        },
        results: TokenReceiver {
            file: File::from(results_read),
            token: PhaseToken::ResultRequest,
        },
        exit: TokenReceiver {
            file: File::from(exit_read),
            token: PhaseToken::Exit,
        },
    };

    Ok((supervisor, worker))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Sample, WorkerReport};

    #[test]
    fn test_token_roundtrip() {
        let (mut supervisor, mut worker) = control_channels().unwrap();

        assert!(!worker.start.try_recv().unwrap());
        supervisor.start.send(2).unwrap();
        assert!(worker.start.try_recv().unwrap());
        assert!(worker.start.try_recv().unwrap());
        assert!(!worker.start.try_recv().unwrap());
    }

    #[test]
    fn test_message_roundtrip() {
        let (mut supervisor, mut worker) = control_channels().unwrap();

        let report = WorkerMessage::Report(WorkerReport {
            worker: 1,
            samples: vec![Sample::new(100, 10); 32],
        });
        worker.responses.send(&WorkerMessage::Ready { worker: 1 }).unwrap();
        worker.responses.send(&report).unwrap();

        let timeout = Duration::from_millis(100);
        let mut received = Vec::new();
        while received.len() < 2 {
            if let Some(msg) = supervisor.responses.poll_message(timeout).unwrap() {
                received.push(msg);
            }
        }
        assert_eq!(received[0], WorkerMessage::Ready { worker: 1 });
        assert_eq!(received[1], report);
    }

    #[test]
    fn test_poll_times_out_without_data() {
        let (mut supervisor, _worker) = control_channels().unwrap();
        let msg = supervisor
            .responses
            .poll_message(Duration::from_millis(10))
            .unwrap();
        assert!(msg.is_none());
    }

    #[test]
    fn test_closed_response_channel_detected() {
        let (mut supervisor, worker) = control_channels().unwrap();
        drop(worker);
        assert!(matches!(
            supervisor.responses.poll_message(Duration::from_millis(100)),
            Err(ChannelError::Closed)
        ));
    }

    #[test]
    fn test_closed_exit_channel_detected() {
        let (supervisor, mut worker) = control_channels().unwrap();
        drop(supervisor);
        assert!(matches!(worker.exit.recv(), Err(ChannelError::Closed)));
    }
}
