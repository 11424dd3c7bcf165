//! The record wire unit and its framing.
//!
//! A [`Record`] is the single unit of data exchanged between nodes over any
//! transport. The payload is an arbitrary JSON value so node programs can
//! ship whatever shape they need without the engine caring.
//!
//! Socket and file channels move records as length-delimited JSON frames:
//! a big-endian `u32` byte length followed by the serialized record. The
//! same framing carries the origin-name handshake that opens every socket
//! connection (see [`crate::channels::socket`]).
//!
//! # Examples
//!
//! ```rust
//! use tideflow::record::Record;
//! use serde_json::json;
//!
//! let rec = Record::new(json!({"vertex": 3, "rank": 0.25}));
//! assert_eq!(rec.payload["vertex"], 3);
//!
//! // Plain text payloads are common in tests and simple pipelines.
//! let line = Record::text("alpha");
//! assert_eq!(line.as_text(), Some("alpha"));
//! ```

use miette::Diagnostic;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Upper bound on a single frame, as a guard against corrupt streams.
const MAX_FRAME_BYTES: u32 = 64 * 1024 * 1024;

/// A single unit of data flowing through a channel.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Record {
    /// Arbitrary JSON payload supplied by the producing node program.
    pub payload: serde_json::Value,
}

impl Record {
    /// Wrap a JSON value in a record.
    pub fn new(payload: impl Into<serde_json::Value>) -> Self {
        Self {
            payload: payload.into(),
        }
    }

    /// Convenience constructor for string payloads.
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            payload: serde_json::Value::String(text.into()),
        }
    }

    /// The payload as a string slice, if it is a JSON string.
    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        self.payload.as_str()
    }
}

/// Errors produced by frame encoding/decoding.
#[derive(Debug, Error, Diagnostic)]
pub enum FrameError {
    /// Underlying transport failure.
    #[error("frame I/O error: {0}")]
    #[diagnostic(code(tideflow::record::io))]
    Io(#[from] std::io::Error),

    /// Frame contents were not valid JSON for the expected type.
    #[error("frame decode error: {0}")]
    #[diagnostic(
        code(tideflow::record::decode),
        help("The peer wrote something that is not a length-delimited JSON record.")
    )]
    Decode(#[from] serde_json::Error),

    /// Declared frame length exceeds the sanity bound.
    #[error("frame of {0} bytes exceeds the {MAX_FRAME_BYTES} byte limit")]
    #[diagnostic(code(tideflow::record::oversized))]
    Oversized(u32),
}

/// Write one length-delimited JSON frame.
pub async fn write_frame<W, T>(writer: &mut W, value: &T) -> Result<(), FrameError>
where
    W: AsyncWrite + Unpin,
    T: Serialize,
{
    let bytes = serde_json::to_vec(value)?;
    let len = u32::try_from(bytes.len()).map_err(|_| FrameError::Oversized(u32::MAX))?;
    if len > MAX_FRAME_BYTES {
        return Err(FrameError::Oversized(len));
    }
    writer.write_u32(len).await?;
    writer.write_all(&bytes).await?;
    Ok(())
}

/// Read one length-delimited JSON frame.
///
/// Returns `Ok(None)` on a clean end of stream, i.e. EOF hit exactly at a
/// frame boundary. EOF in the middle of a frame is an error.
pub async fn read_frame<R, T>(reader: &mut R) -> Result<Option<T>, FrameError>
where
    R: AsyncRead + Unpin,
    T: for<'de> Deserialize<'de>,
{
    let len = match reader.read_u32().await {
        Ok(len) => len,
        Err(error) if error.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(error) => return Err(error.into()),
    };
    if len > MAX_FRAME_BYTES {
        return Err(FrameError::Oversized(len));
    }
    let mut bytes = vec![0u8; len as usize];
    reader.read_exact(&mut bytes).await?;
    Ok(Some(serde_json::from_slice(&bytes)?))
}
