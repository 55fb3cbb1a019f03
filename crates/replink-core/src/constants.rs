//! Wire-protocol and buffer sizing constants.
//!
//! All of these are fixed properties of the link protocol or conservative
//! sizing defaults; none of them are tunable at runtime.

/// Maximum length in bytes of the unterminated, pre-checksum frame text:
/// `N<line> <payload>` under the numbered protocol, the bare payload under
/// the simple protocol.
pub const BLOCK_CAPACITY: usize = 256;

/// Maximum length in bytes of a fully framed block on the wire. The extra
/// headroom covers the checksum field (` *NNN`) and the terminator.
pub const FRAME_CAPACITY: usize = BLOCK_CAPACITY + 8;

/// Terminator appended to every outbound frame.
pub const FRAME_TERMINATOR: &[u8] = b"\r\n";

/// Terminator marking the end of one inbound reply frame.
pub const REPLY_TERMINATOR: &[u8] = b"\r\n";

/// Initial receive-buffer size in bytes. The buffer doubles whenever a read
/// finds it full.
pub const RECV_BUFFER_INITIAL: usize = 256;

/// Default number of sent frames retained for resend requests.
pub const DEFAULT_RESEND_CACHE_BLOCKS: usize = 64;

/// Default serial link speed in baud.
pub const DEFAULT_BAUD_RATE: u32 = 115_200;
