#![warn(missing_docs)]
//! benchmp IPC Protocol
//!
//! Control-plane protocol between the benchmark supervisor and its forked
//! workers. Phase transitions travel supervisor → worker as single-byte
//! tokens on dedicated pipes; readiness, completion and result ledgers travel
//! worker → supervisor as length-prefixed rkyv frames on one shared pipe.

mod channel;
mod framing;
mod messages;

pub use channel::{
    ChannelError, MessageReceiver, MessageSender, PollResult, SupervisorEnds, TokenReceiver,
    TokenSender, WorkerEnds, control_channels, wait_for_data,
};
pub use framing::{
    FrameDecoder, FrameError, FrameWriter, MAX_FRAME_SIZE, decode_payload, encode_frame,
    write_frame,
};
pub use messages::{PhaseToken, Sample, WorkerMessage, WorkerReport};

#[cfg(test)]
mod tests {
    use super::*;

    /// Largest write POSIX guarantees to be atomic on a pipe
    const PIPE_ATOMIC_WRITE: usize = 512;

    #[test]
    fn test_sample_size() {
        // Two u64 fields, no padding
        assert_eq!(std::mem::size_of::<Sample>(), 16);
    }

    #[test]
    fn test_sample_alignment() {
        assert_eq!(std::mem::align_of::<Sample>(), 8);
    }

    #[test]
    fn test_phase_frames_are_atomic() {
        let ready = encode_frame(&WorkerMessage::Ready { worker: u32::MAX }).unwrap();
        let done = encode_frame(&WorkerMessage::Done {
            worker: u32::MAX,
            repetitions: u32::MAX,
        })
        .unwrap();
        assert!(ready.len() <= PIPE_ATOMIC_WRITE);
        assert!(done.len() <= PIPE_ATOMIC_WRITE);
    }
}
