//! Error handling for replink
//!
//! Provides error types for both layers of the engine:
//! - Link errors (opening and driving the serial/TCP link)
//! - Protocol errors (framing and resend handling)
//!
//! All error types use `thiserror` for ergonomic error handling.

use thiserror::Error;

/// Link error type
///
/// Represents failures opening the underlying serial or TCP link, and
/// non-transient I/O failures while driving it. Transient conditions
/// (interrupted syscalls, zero-byte transfers) are handled inside the
/// session and never reach this type.
#[derive(Error, Debug, Clone)]
pub enum LinkError {
    /// Failed to open the link
    #[error("Failed to open {port}: {reason}")]
    FailedToOpen {
        /// Port name or address that could not be opened.
        port: String,
        /// The reason the open failed.
        reason: String,
    },

    /// Baud rate not supported
    #[error("Baud rate {baud} not supported")]
    UnsupportedBaudRate {
        /// The unsupported baud rate.
        baud: u32,
    },

    /// Invalid link parameters
    #[error("Invalid link parameters: {reason}")]
    InvalidParameters {
        /// The reason the parameters are invalid.
        reason: String,
    },

    /// Non-transient I/O failure on an open link
    #[error("Link I/O error during {operation}: {reason}")]
    Io {
        /// The operation that failed ("read", "write", "close").
        operation: String,
        /// The underlying I/O error text.
        reason: String,
    },
}

/// Protocol error type
///
/// Represents failures framing a block for the wire or satisfying a resend
/// request. Protocol errors never change wire state: a rejected block leaves
/// the line counter and the rest of the queue untouched.
#[derive(Error, Debug, Clone)]
pub enum ProtocolError {
    /// Formatted block exceeds the frame capacity
    #[error("Block too large: {length} bytes exceeds capacity of {capacity}")]
    BlockTooLarge {
        /// Length the formatted frame would have had.
        length: usize,
        /// The capacity that was exceeded.
        capacity: usize,
    },

    /// Protocol variant not recognized
    #[error("Unsupported protocol: {protocol}")]
    UnsupportedProtocol {
        /// The unrecognized protocol name.
        protocol: String,
    },

    /// Requested line is no longer held in the resend cache
    #[error("Line {line} not available for resend")]
    ResendUnavailable {
        /// The line number that was requested.
        line: u64,
    },
}

/// Main error type for replink
///
/// A unified error type that can represent any failure from either layer.
/// This is the primary error type used in public APIs.
#[derive(Error, Debug, Clone)]
pub enum Error {
    /// Link error
    #[error(transparent)]
    Link(#[from] LinkError),

    /// Protocol error
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Create an error from a string message
    pub fn other(msg: impl Into<String>) -> Self {
        Error::Other(msg.into())
    }

    /// Check if this is a link error
    pub fn is_link_error(&self) -> bool {
        matches!(self, Error::Link(_))
    }

    /// Check if this is a protocol error
    pub fn is_protocol_error(&self) -> bool {
        matches!(self, Error::Protocol(_))
    }

    /// Check if this is a block-too-large rejection
    pub fn is_block_too_large(&self) -> bool {
        matches!(self, Error::Protocol(ProtocolError::BlockTooLarge { .. }))
    }
}

/// Result type using Error
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::from(ProtocolError::BlockTooLarge {
            length: 300,
            capacity: 256,
        });
        assert_eq!(
            err.to_string(),
            "Block too large: 300 bytes exceeds capacity of 256"
        );
        assert!(err.is_block_too_large());
        assert!(err.is_protocol_error());
        assert!(!err.is_link_error());
    }

    #[test]
    fn test_link_error_classification() {
        let err = Error::from(LinkError::Io {
            operation: "write".to_string(),
            reason: "broken pipe".to_string(),
        });
        assert!(err.is_link_error());
        assert_eq!(err.to_string(), "Link I/O error during write: broken pipe");
    }
}
