//! Wire framing for outbound command blocks.
//!
//! Two framing variants are understood by printer firmwares:
//!
//! - **Simple**: the payload followed by CRLF.
//! - **Numbered**: `N<line> <payload> *<checksum>` followed by CRLF, where
//!   the checksum is the 8-bit XOR of every byte of `N<line> <payload>`.
//!   The checksum field itself never feeds its own computation.
//!
//! Formatting is a pure transform of payload, variant, and line number: a
//! failed format changes nothing, so callers can roll back cleanly.

pub mod assembler;
pub mod resend;
pub mod scheduler;

use std::fmt;
use std::str::FromStr;

use replink_core::constants::{BLOCK_CAPACITY, FRAME_CAPACITY, FRAME_TERMINATOR};
use replink_core::{Error, ProtocolError, Result};
use serde::{Deserialize, Serialize};

/// Wire protocol variant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Protocol {
    /// Bare payload, CRLF-terminated
    Simple,
    /// Line-numbered, XOR-checksummed framing
    #[default]
    Numbered,
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Simple => write!(f, "simple"),
            Self::Numbered => write!(f, "numbered"),
        }
    }
}

impl FromStr for Protocol {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "simple" => Ok(Self::Simple),
            "numbered" => Ok(Self::Numbered),
            other => Err(ProtocolError::UnsupportedProtocol {
                protocol: other.to_string(),
            }
            .into()),
        }
    }
}

/// Running 8-bit XOR over `bytes`.
pub fn xor_checksum(bytes: &[u8]) -> u8 {
    bytes.iter().fold(0, |sum, b| sum ^ b)
}

/// Format one payload into the exact bytes to put on the wire.
pub fn format_frame(payload: &[u8], protocol: Protocol, line: u64) -> Result<Vec<u8>> {
    match protocol {
        Protocol::Simple => format_simple(payload),
        Protocol::Numbered => format_numbered(payload, line),
    }
}

fn format_simple(payload: &[u8]) -> Result<Vec<u8>> {
    let length = payload.len() + FRAME_TERMINATOR.len();
    if length > FRAME_CAPACITY {
        return Err(ProtocolError::BlockTooLarge {
            length,
            capacity: FRAME_CAPACITY,
        }
        .into());
    }
    let mut frame = Vec::with_capacity(length);
    frame.extend_from_slice(payload);
    frame.extend_from_slice(FRAME_TERMINATOR);
    Ok(frame)
}

fn format_numbered(payload: &[u8], line: u64) -> Result<Vec<u8>> {
    let mut frame = Vec::with_capacity(payload.len() + 16);
    frame.extend_from_slice(format!("N{} ", line).as_bytes());
    frame.extend_from_slice(payload);
    if frame.len() > BLOCK_CAPACITY {
        return Err(ProtocolError::BlockTooLarge {
            length: frame.len(),
            capacity: BLOCK_CAPACITY,
        }
        .into());
    }

    let checksum = xor_checksum(&frame);
    frame.extend_from_slice(format!(" *{}", checksum).as_bytes());
    frame.extend_from_slice(FRAME_TERMINATOR);
    if frame.len() > FRAME_CAPACITY {
        return Err(ProtocolError::BlockTooLarge {
            length: frame.len(),
            capacity: FRAME_CAPACITY,
        }
        .into());
    }
    Ok(frame)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_simple_framing() {
        let frame = format_frame(b"M105", Protocol::Simple, 0).unwrap();
        assert_eq!(frame, b"M105\r\n");
    }

    #[test]
    fn test_numbered_framing() {
        // XOR of "N0 G1 X10" is 81.
        let frame = format_frame(b"G1 X10", Protocol::Numbered, 0).unwrap();
        assert_eq!(frame, b"N0 G1 X10 *81\r\n");
    }

    #[test]
    fn test_checksum_excludes_its_own_field() {
        let frame = format_frame(b"G28", Protocol::Numbered, 3).unwrap();
        let text = b"N3 G28";
        let expected = xor_checksum(text);
        let rendered = String::from_utf8(frame).unwrap();
        assert_eq!(rendered, format!("N3 G28 *{}\r\n", expected));
    }

    #[test]
    fn test_oversized_simple() {
        let payload = vec![b'X'; FRAME_CAPACITY];
        let err = format_frame(&payload, Protocol::Simple, 0).unwrap_err();
        assert!(err.is_block_too_large());
    }

    #[test]
    fn test_oversized_numbered_pre_checksum() {
        let payload = vec![b'X'; BLOCK_CAPACITY];
        let err = format_frame(&payload, Protocol::Numbered, 0).unwrap_err();
        assert!(err.is_block_too_large());
    }

    #[test]
    fn test_protocol_from_str() {
        assert_eq!("simple".parse::<Protocol>().unwrap(), Protocol::Simple);
        assert_eq!("numbered".parse::<Protocol>().unwrap(), Protocol::Numbered);
        let err = "grbl".parse::<Protocol>().unwrap_err();
        assert!(matches!(
            err,
            Error::Protocol(ProtocolError::UnsupportedProtocol { .. })
        ));
    }

    proptest! {
        #[test]
        fn prop_numbered_framing_is_deterministic(
            payload in proptest::collection::vec(0x20u8..0x7f, 0..200),
            line in 0u64..1_000_000,
        ) {
            let a = format_frame(&payload, Protocol::Numbered, line).unwrap();
            let b = format_frame(&payload, Protocol::Numbered, line).unwrap();
            prop_assert_eq!(&a, &b);
        }

        #[test]
        fn prop_checksum_matches_pre_checksum_text(
            payload in proptest::collection::vec(0x20u8..0x7f, 0..200),
            line in 0u64..1_000_000,
        ) {
            let frame = format_frame(&payload, Protocol::Numbered, line).unwrap();
            // Strip the terminator, split on the last " *".
            let body = &frame[..frame.len() - 2];
            let star = body.windows(2).rposition(|w| w == b" *").unwrap();
            let text = &body[..star];
            let field: u8 = std::str::from_utf8(&body[star + 2..])
                .unwrap()
                .parse()
                .unwrap();
            prop_assert_eq!(field, xor_checksum(text));
            prop_assert!(text.ends_with(&payload));
        }
    }
}
