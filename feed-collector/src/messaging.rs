//! Native messaging boundary.
//!
//! Chrome frames every message as a 32-bit length in native byte order
//! followed by that many bytes of UTF-8 JSON, in both directions.

use crate::service::Reply;
use serde::{Deserialize, Serialize};
use std::io::{self, Read, Write};
use tracing::warn;

/// Largest message accepted from the browser
pub const MAX_MESSAGE_BYTES: usize = 1024 * 1024;

#[derive(Debug, thiserror::Error)]
pub enum MessagingError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Message too large: {0} bytes")]
    TooLarge(usize),

    #[error("Invalid message: {0}")]
    Decode(#[from] serde_json::Error),
}

/// Operation requested by the extension
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Action {
    ScrapeBookmarks,
    GenerateDebugSnapshot,
    DebugModeSync,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HostRequest {
    pub action: Action,
    #[serde(default)]
    pub batch_limit: Option<usize>,
    #[serde(default)]
    pub skip_duplicates: Option<bool>,
}

/// Read one framed message. Returns `None` once the browser closes the pipe.
pub fn read_frame<R: Read>(reader: &mut R) -> Result<Option<Vec<u8>>, MessagingError> {
    let mut length_bytes = [0u8; 4];

    match reader.read_exact(&mut length_bytes) {
        Ok(()) => {}
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e.into()),
    }

    let length = u32::from_ne_bytes(length_bytes) as usize;
    if length > MAX_MESSAGE_BYTES {
        return Err(MessagingError::TooLarge(length));
    }

    let mut message = vec![0u8; length];
    reader.read_exact(&mut message)?;
    Ok(Some(message))
}

/// Write one framed message and flush
pub fn write_frame<W: Write>(writer: &mut W, message: &[u8]) -> Result<(), MessagingError> {
    if message.len() > MAX_MESSAGE_BYTES {
        return Err(MessagingError::TooLarge(message.len()));
    }

    writer.write_all(&(message.len() as u32).to_ne_bytes())?;
    writer.write_all(message)?;
    writer.flush()?;
    Ok(())
}

/// Decode a request frame
pub fn decode_request(frame: &[u8]) -> Result<HostRequest, MessagingError> {
    Ok(serde_json::from_slice(frame)?)
}

/// Serialize and frame a reply
pub fn write_message<W, T>(writer: &mut W, reply: &T) -> Result<(), MessagingError>
where
    W: Write,
    T: Serialize + ?Sized,
{
    let json = serde_json::to_vec(reply)?;
    write_frame(writer, &json)
}

/// Frame a reply for the extension.
///
/// A reply over the frame limit is replaced by an error reply, so the
/// request still gets exactly one answer.
pub fn write_reply<W: Write>(writer: &mut W, reply: &Reply) -> Result<(), MessagingError> {
    match write_message(writer, reply) {
        Err(MessagingError::TooLarge(size)) => {
            warn!("Reply of {} bytes exceeds the frame limit", size);
            write_message(writer, &Reply::failed(MessagingError::TooLarge(size).to_string()))
        }
        other => other,
    }
}
