//! Device token encodings.
//!
//! The gateway speaks hex (raw bytes on the wire); registrations are persisted
//! as base64.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;

use herald_common::error::AppError;

/// Convert a hex token into its persisted base64 form.
pub fn hex_to_b64(token: &str) -> Result<String, AppError> {
    Ok(STANDARD.encode(hex_to_bytes(token)?))
}

/// Convert a persisted base64 token into the gateway's hex form.
pub fn b64_to_hex(token: &str) -> Result<String, AppError> {
    let bytes = STANDARD
        .decode(token)
        .map_err(|e| AppError::Token(format!("invalid base64 token: {}", e)))?;
    Ok(hex::encode(bytes))
}

/// Decode a hex token into the raw bytes written to the wire.
pub fn hex_to_bytes(token: &str) -> Result<Vec<u8>, AppError> {
    hex::decode(token).map_err(|e| AppError::Token(format!("invalid hex token: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hex_to_b64() {
        assert_eq!(hex_to_b64("aaaa").unwrap(), "qqo=");
        assert_eq!(hex_to_b64("bbbb").unwrap(), "u7s=");
    }

    #[test]
    fn test_b64_to_hex() {
        assert_eq!(b64_to_hex("qqo=").unwrap(), "aaaa");
    }

    #[test]
    fn test_uppercase_hex_normalises() {
        assert_eq!(b64_to_hex(&hex_to_b64("ABCD").unwrap()).unwrap(), "abcd");
    }

    #[test]
    fn test_invalid_tokens() {
        assert!(matches!(hex_to_b64("abc"), Err(AppError::Token(_))));
        assert!(matches!(hex_to_b64("zz"), Err(AppError::Token(_))));
        assert!(matches!(b64_to_hex("***"), Err(AppError::Token(_))));
    }
}
