//! Fixed-width frame header
//!
//! Every message on the wire is preceded by a 64-byte header holding a compact
//! JSON rendering of `{size, crypt_mode}`, right-padded with zero bytes. The
//! receiver always reads exactly `HEADER_SIZE` bytes first and only then knows
//! how many payload bytes follow.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Width of the header slot in bytes
pub const HEADER_SIZE: usize = 64;

/// Padding byte used to fill the header slot
const PADDING: u8 = 0;

/// Frame header errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FrameError {
    /// No bytes at all; the peer closed the connection
    #[error("Header data is empty")]
    Empty,
    #[error("Malformed header: {0}")]
    Malformed(String),
    #[error("Encoded header is {0} bytes, exceeds the 64-byte slot")]
    TooLong(usize),
}

/// Payload encryption mode announced in the header
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CryptMode {
    Unencrypted,
    /// Reserved; no peer implements it yet
    Rsa,
}

/// Header announcing the size of the following payload
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FrameHeader {
    pub size: u32,
    pub crypt_mode: CryptMode,
}

impl FrameHeader {
    pub fn new(size: u32, crypt_mode: CryptMode) -> Self {
        Self { size, crypt_mode }
    }

    pub fn unencrypted(size: u32) -> Self {
        Self::new(size, CryptMode::Unencrypted)
    }

    /// Serialize into the fixed 64-byte slot
    pub fn encode(&self) -> Result<[u8; HEADER_SIZE], FrameError> {
        let json = serde_json::to_vec(self).map_err(|e| FrameError::Malformed(e.to_string()))?;
        if json.len() > HEADER_SIZE {
            return Err(FrameError::TooLong(json.len()));
        }

        let mut slot = [PADDING; HEADER_SIZE];
        slot[..json.len()].copy_from_slice(&json);
        Ok(slot)
    }

    /// Parse a header slot. Only the first `HEADER_SIZE` bytes are considered.
    pub fn decode(bytes: &[u8]) -> Result<Self, FrameError> {
        if bytes.is_empty() {
            return Err(FrameError::Empty);
        }

        let window = &bytes[..bytes.len().min(HEADER_SIZE)];

        // Padding may be NUL or ASCII '0' depending on the sender; the JSON
        // object is whatever sits between the outermost braces.
        let start = window.iter().position(|&b| b == b'{');
        let end = window.iter().rposition(|&b| b == b'}');
        let (start, end) = match (start, end) {
            (Some(s), Some(e)) if s < e => (s, e),
            _ => {
                return Err(FrameError::Malformed(
                    "no header structure in slot".to_string(),
                ))
            }
        };

        serde_json::from_slice(&window[start..=end])
            .map_err(|e| FrameError::Malformed(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip() {
        for size in [0, 1, 64, 65_535, u32::MAX] {
            for mode in [CryptMode::Unencrypted, CryptMode::Rsa] {
                let header = FrameHeader::new(size, mode);
                let slot = header.encode().unwrap();
                assert_eq!(slot.len(), HEADER_SIZE);
                assert_eq!(FrameHeader::decode(&slot).unwrap(), header);
            }
        }
    }

    #[test]
    fn test_padding_is_zero_bytes() {
        let slot = FrameHeader::unencrypted(12).encode().unwrap();
        let text_len = slot.iter().position(|&b| b == 0).unwrap();
        assert_eq!(
            std::str::from_utf8(&slot[..text_len]).unwrap(),
            r#"{"size":12,"crypt_mode":"UNENCRYPTED"}"#
        );
        assert!(slot[text_len..].iter().all(|&b| b == 0));
    }

    #[test]
    fn test_ascii_zero_padding_accepted() {
        let mut slot = [b'0'; HEADER_SIZE];
        let json = br#"{"size":7,"crypt_mode":"UNENCRYPTED"}"#;
        slot[..json.len()].copy_from_slice(json);

        assert_eq!(
            FrameHeader::decode(&slot).unwrap(),
            FrameHeader::unencrypted(7)
        );
    }

    #[test]
    fn test_empty() {
        assert_eq!(FrameHeader::decode(&[]), Err(FrameError::Empty));
    }

    #[test]
    fn test_malformed() {
        assert!(matches!(
            FrameHeader::decode(&[0u8; HEADER_SIZE]),
            Err(FrameError::Malformed(_))
        ));
        assert!(matches!(
            FrameHeader::decode(b"}garbage{"),
            Err(FrameError::Malformed(_))
        ));
        assert!(matches!(
            FrameHeader::decode(br#"{"size":"big","crypt_mode":"UNENCRYPTED"}"#),
            Err(FrameError::Malformed(_))
        ));
        assert!(matches!(
            FrameHeader::decode(br#"{"size":1,"crypt_mode":"ROT13"}"#),
            Err(FrameError::Malformed(_))
        ));
    }

    #[test]
    fn test_structure_outside_window_ignored() {
        let mut bytes = vec![0u8; HEADER_SIZE];
        bytes.extend_from_slice(br#"{"size":1,"crypt_mode":"UNENCRYPTED"}"#);
        assert!(matches!(
            FrameHeader::decode(&bytes),
            Err(FrameError::Malformed(_))
        ));
    }
}
