//! Binary gateway protocol.
//!
//! All integers are big-endian.
//!
//! ```text
//! notification:   | 1 | identifier u32 | expiry u32 | token_len u16 | token | payload_len u16 | payload |
//! error response: | 8 | status u8 | identifier u32 |
//! feedback tuple: | timestamp u32 | token_len u16 | token |
//! ```

use chrono::{DateTime, TimeZone, Utc};

use herald_common::error::AppError;
use herald_common::types::{PushPayload, ResponseEvent};

use crate::token::hex_to_bytes;

pub const NOTIFICATION_COMMAND: u8 = 1;
pub const ERROR_RESPONSE_COMMAND: u8 = 8;
pub const ERROR_RESPONSE_LEN: usize = 6;

/// Largest JSON payload the gateway accepts.
pub const MAX_PAYLOAD_BYTES: usize = 2048;

/// A single encoded-ready notification for one device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WireMessage {
    pub identifier: u32,
    /// Unix time after which the gateway may drop the message (0 = don't store)
    pub expiry: u32,
    pub token: Vec<u8>,
    pub payload: Vec<u8>,
}

impl WireMessage {
    /// Build a message from a hex device token and caller payload.
    pub fn build(
        identifier: u32,
        token_hex: &str,
        payload: &PushPayload,
        expiry: u32,
    ) -> Result<Self, AppError> {
        let token = hex_to_bytes(token_hex)?;
        if token.is_empty() || token.len() > u16::MAX as usize {
            return Err(AppError::Token(format!(
                "token length {} not encodable",
                token.len()
            )));
        }

        let payload = serde_json::to_vec(&payload.to_gateway_json())
            .map_err(|e| AppError::Internal(format!("payload serialization failed: {}", e)))?;
        if payload.len() > MAX_PAYLOAD_BYTES {
            return Err(AppError::Validation(format!(
                "payload is {} bytes, limit is {}",
                payload.len(),
                MAX_PAYLOAD_BYTES
            )));
        }

        Ok(Self {
            identifier,
            expiry,
            token,
            payload,
        })
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(1 + 4 + 4 + 2 + self.token.len() + 2 + self.payload.len());
        buf.push(NOTIFICATION_COMMAND);
        buf.extend_from_slice(&self.identifier.to_be_bytes());
        buf.extend_from_slice(&self.expiry.to_be_bytes());
        buf.extend_from_slice(&(self.token.len() as u16).to_be_bytes());
        buf.extend_from_slice(&self.token);
        buf.extend_from_slice(&(self.payload.len() as u16).to_be_bytes());
        buf.extend_from_slice(&self.payload);
        buf
    }
}

/// Decode a 6-byte error response frame.
pub fn decode_error_response(frame: &[u8]) -> Result<ResponseEvent, AppError> {
    if frame.len() != ERROR_RESPONSE_LEN {
        return Err(AppError::Decode(format!(
            "error response must be {} bytes, got {}",
            ERROR_RESPONSE_LEN,
            frame.len()
        )));
    }
    if frame[0] != ERROR_RESPONSE_COMMAND {
        return Err(AppError::Decode(format!(
            "unexpected response command {}",
            frame[0]
        )));
    }

    Ok(ResponseEvent {
        status: frame[1],
        identifier: u32::from_be_bytes([frame[2], frame[3], frame[4], frame[5]]),
    })
}

/// A device the feedback service reports as no longer accepting pushes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedbackTuple {
    /// When the gateway determined the app was gone from the device
    pub timestamp: DateTime<Utc>,
    pub token: Vec<u8>,
}

impl FeedbackTuple {
    pub fn token_hex(&self) -> String {
        hex::encode(&self.token)
    }
}

/// Decode a complete feedback stream. A truncated trailing tuple is an error.
pub fn decode_feedback(mut buf: &[u8]) -> Result<Vec<FeedbackTuple>, AppError> {
    let mut tuples = Vec::new();

    while !buf.is_empty() {
        if buf.len() < 6 {
            return Err(AppError::Decode("truncated feedback tuple header".to_string()));
        }
        let seconds = u32::from_be_bytes([buf[0], buf[1], buf[2], buf[3]]);
        let token_len = u16::from_be_bytes([buf[4], buf[5]]) as usize;
        buf = &buf[6..];

        if buf.len() < token_len {
            return Err(AppError::Decode("truncated feedback token".to_string()));
        }
        let (token, rest) = buf.split_at(token_len);
        buf = rest;

        let timestamp = Utc
            .timestamp_opt(i64::from(seconds), 0)
            .single()
            .ok_or_else(|| AppError::Decode(format!("invalid feedback timestamp {}", seconds)))?;

        tuples.push(FeedbackTuple {
            timestamp,
            token: token.to_vec(),
        });
    }

    Ok(tuples)
}
