//! Binary chunk framing: 4-byte big-endian header length + JSON header + raw payload.
//!
//! ```text
//! [4 bytes BE: header_len][header_len bytes: UTF-8 JSON][rest: payload]
//! ```
//!
//! The payload has no length prefix; it is everything after the header.
//! This framing is only used on the direct channel, which delivers whole
//! messages.

use serde::Serialize;
use serde::de::DeserializeOwned;

/// A decoded frame: parsed header plus the raw payload bytes.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame<H> {
    pub header: H,
    pub payload: Vec<u8>,
}

/// Errors from binary frame parsing.
#[derive(Debug, thiserror::Error)]
pub enum FramingError {
    #[error("message too short (need at least 4 bytes)")]
    TooShort,

    #[error("header truncated: expected {expected} bytes, got {got}")]
    HeaderTruncated { expected: usize, got: usize },

    #[error("invalid header JSON: {0}")]
    InvalidJson(String),

    #[error("header too large: {0} bytes")]
    HeaderTooLarge(usize),
}

/// Encodes a header and payload into one transport message.
pub fn encode_frame<H: Serialize>(header: &H, payload: &[u8]) -> Result<Vec<u8>, FramingError> {
    let header_json =
        serde_json::to_vec(header).map_err(|e| FramingError::InvalidJson(e.to_string()))?;
    let header_len = u32::try_from(header_json.len())
        .map_err(|_| FramingError::HeaderTooLarge(header_json.len()))?;

    let mut buf = Vec::with_capacity(4 + header_json.len() + payload.len());
    buf.extend_from_slice(&header_len.to_be_bytes());
    buf.extend_from_slice(&header_json);
    buf.extend_from_slice(payload);
    Ok(buf)
}

/// Parses a raw binary message into its header and payload.
pub fn decode_frame<H: DeserializeOwned>(data: &[u8]) -> Result<Frame<H>, FramingError> {
    if data.len() < 4 {
        return Err(FramingError::TooShort);
    }

    let header_len = u32::from_be_bytes([data[0], data[1], data[2], data[3]]) as usize;
    let rest = &data[4..];
    if rest.len() < header_len {
        return Err(FramingError::HeaderTruncated {
            expected: header_len,
            got: rest.len(),
        });
    }

    let header_bytes = &rest[..header_len];
    let text =
        std::str::from_utf8(header_bytes).map_err(|e| FramingError::InvalidJson(e.to_string()))?;
    let header: H =
        serde_json::from_str(text).map_err(|e| FramingError::InvalidJson(e.to_string()))?;

    Ok(Frame {
        header,
        payload: rest[header_len..].to_vec(),
    })
}
