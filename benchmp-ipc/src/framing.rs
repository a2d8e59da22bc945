//! Length-Prefixed Frame Encoding
//!
//! Provides message boundaries over the shared response pipe. A frame is
//! written with a single `write(2)` so frames smaller than `PIPE_BUF` from
//! different workers never interleave.

use rkyv::ser::serializers::AllocSerializer;
use rkyv::validation::validators::DefaultValidator;
use rkyv::{AlignedVec, Archive, CheckBytes, Deserialize, Infallible, Serialize};
use std::io::{BufWriter, Write};
use thiserror::Error;

/// Maximum frame size (16 MB) to prevent memory exhaustion
pub const MAX_FRAME_SIZE: usize = 16 * 1024 * 1024;

/// Size of the length prefix
const HEADER_LEN: usize = 4;

/// Errors that can occur during frame encoding/decoding
#[derive(Debug, Error)]
pub enum FrameError {
    /// Reading or writing the frame failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// rkyv could not archive the message
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// The payload failed validation
    #[error("Deserialization error: {0}")]
    Deserialization(String),

    /// The length prefix exceeds [`MAX_FRAME_SIZE`]
    #[error("Frame too large: {size} bytes (max {max} bytes)")]
    FrameTooLarge {
        /// Announced payload size
        size: usize,
        /// Largest accepted payload
        max: usize,
    },

    /// The frame is structurally broken
    #[error("Invalid frame: {0}")]
    InvalidFrame(String),
}

/// Serialize a message into a complete frame (length prefix + payload).
///
/// Frame format:
/// ```text
/// +----------------+------------------+
/// | length (4 LE)  | rkyv payload     |
/// +----------------+------------------+
/// ```
pub fn encode_frame<T>(message: &T) -> Result<Vec<u8>, FrameError>
where
    T: Serialize<AllocSerializer<256>>,
{
    let bytes =
        rkyv::to_bytes::<_, 256>(message).map_err(|e| FrameError::Serialization(e.to_string()))?;

    let len = bytes.len();
    if len > MAX_FRAME_SIZE {
        return Err(FrameError::FrameTooLarge {
            size: len,
            max: MAX_FRAME_SIZE,
        });
    }

    let mut frame = Vec::with_capacity(HEADER_LEN + len);
    frame.extend_from_slice(&(len as u32).to_le_bytes());
    frame.extend_from_slice(&bytes);
    Ok(frame)
}

/// Validate and deserialize a frame payload (without its length prefix)
pub fn decode_payload<T>(payload: &[u8]) -> Result<T, FrameError>
where
    T: Archive,
    T::Archived: for<'a> CheckBytes<DefaultValidator<'a>> + Deserialize<T, Infallible>,
{
    // rkyv needs the archive at its natural alignment
    let mut buf = AlignedVec::with_capacity(payload.len());
    buf.extend_from_slice(payload);

    let archived = rkyv::check_archived_root::<T>(&buf)
        .map_err(|e| FrameError::Deserialization(e.to_string()))?;

    archived
        .deserialize(&mut Infallible)
        .map_err(|e| FrameError::Deserialization(format!("{e:?}")))
}

/// Write one frame and flush it
pub fn write_frame<W, T>(writer: &mut BufWriter<W>, message: &T) -> Result<(), FrameError>
where
    W: Write,
    T: Serialize<AllocSerializer<256>>,
{
    let frame = encode_frame(message)?;
    writer.write_all(&frame)?;
    writer.flush()?;
    Ok(())
}

/// Frame writer wrapper for convenient message sending
#[derive(Debug)]
pub struct FrameWriter<W: Write> {
    writer: BufWriter<W>,
}

impl<W: Write> FrameWriter<W> {
    /// Create a new frame writer
    pub fn new(writer: W) -> Self {
        Self {
            writer: BufWriter::with_capacity(64 * 1024, writer), // 64KB buffer
        }
    }

    /// Write a message
    pub fn write<T>(&mut self, message: &T) -> Result<(), FrameError>
    where
        T: Serialize<AllocSerializer<256>>,
    {
        write_frame(&mut self.writer, message)
    }
}

/// Incremental frame decoder.
///
/// The supervisor reads whatever bytes `poll(2)` reports as available and
/// pushes them here; complete frames are popped one at a time.
#[derive(Debug, Default)]
pub struct FrameDecoder {
    buffer: Vec<u8>,
}

impl FrameDecoder {
    /// Create an empty decoder
    pub fn new() -> Self {
        Self::default()
    }

    /// Append raw bytes read from the stream
    pub fn push(&mut self, bytes: &[u8]) {
        self.buffer.extend_from_slice(bytes);
    }

    /// Number of buffered bytes not yet consumed by a complete frame
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// Pop the next complete frame, if one is buffered
    pub fn next_frame<T>(&mut self) -> Result<Option<T>, FrameError>
    where
        T: Archive,
        T::Archived: for<'a> CheckBytes<DefaultValidator<'a>> + Deserialize<T, Infallible>,
    {
        if self.buffer.len() < HEADER_LEN {
            return Ok(None);
        }

        let mut len_buf = [0u8; HEADER_LEN];
        len_buf.copy_from_slice(&self.buffer[..HEADER_LEN]);
        let len = u32::from_le_bytes(len_buf) as usize;

        if len > MAX_FRAME_SIZE {
            return Err(FrameError::FrameTooLarge {
                size: len,
                max: MAX_FRAME_SIZE,
            });
        }
        if len == 0 {
            return Err(FrameError::InvalidFrame("zero-length frame".to_string()));
        }
        if self.buffer.len() < HEADER_LEN + len {
            return Ok(None);
        }

        let value = decode_payload(&self.buffer[HEADER_LEN..HEADER_LEN + len]);
        self.buffer.drain(..HEADER_LEN + len);
        value.map(Some)
    }
}
