//! Inbound reply reassembly.
//!
//! The firmware's replies arrive as an undifferentiated byte stream; this
//! module accumulates them and splits out one frame per terminator
//! occurrence. Payloads are not terminator-escaped, so a terminator byte
//! sequence always ends a frame.

use replink_core::constants::{RECV_BUFFER_INITIAL, REPLY_TERMINATOR};

/// Accumulates raw link bytes and splits them into reply frames.
///
/// The buffer grows by doubling whenever a read finds it full and holds at
/// most one incomplete trailing frame: every completed frame is dispatched
/// and compacted out during the scan. A low-water mark keeps resolved bytes
/// from being rescanned while still catching a terminator split across two
/// reads or across a growth boundary.
#[derive(Debug)]
pub struct ReplyAssembler {
    buf: Vec<u8>,
    fill: usize,
    /// Leading bytes already known to contain no terminator start.
    scanned: usize,
}

impl ReplyAssembler {
    pub fn new() -> Self {
        Self::with_capacity(RECV_BUFFER_INITIAL)
    }

    /// Build an assembler with a specific initial capacity (tests use tiny
    /// capacities to exercise growth).
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(REPLY_TERMINATOR.len());
        Self {
            buf: vec![0; capacity],
            fill: 0,
            scanned: 0,
        }
    }

    /// Double the buffer if the fill has reached capacity.
    pub fn grow_if_full(&mut self) {
        if self.fill == self.buf.len() {
            self.buf.resize(self.buf.len() * 2, 0);
        }
    }

    /// Spare space available for a direct link read.
    pub fn spare_mut(&mut self) -> &mut [u8] {
        let fill = self.fill;
        &mut self.buf[fill..]
    }

    /// Record `n` bytes freshly read into [`spare_mut`](Self::spare_mut)
    /// and dispatch every frame they complete.
    pub fn commit<F: FnMut(&[u8])>(&mut self, n: usize, dispatch: F) {
        debug_assert!(self.fill + n <= self.buf.len(), "commit past capacity");
        self.fill += n;
        self.scan(dispatch);
    }

    /// Append bytes arriving from elsewhere than a direct read, growing as
    /// needed, and dispatch every frame they complete.
    pub fn feed<F: FnMut(&[u8])>(&mut self, bytes: &[u8], dispatch: F) {
        while self.buf.len() - self.fill < bytes.len() {
            self.buf.resize(self.buf.len() * 2, 0);
        }
        self.buf[self.fill..self.fill + bytes.len()].copy_from_slice(bytes);
        self.commit(bytes.len(), dispatch);
    }

    /// Bytes buffered but not yet resolved into a complete frame.
    pub fn pending(&self) -> &[u8] {
        &self.buf[..self.fill]
    }

    fn scan<F: FnMut(&[u8])>(&mut self, mut dispatch: F) {
        let term = REPLY_TERMINATOR;
        let mut start = 0;
        let mut pos = self.scanned;
        while pos + term.len() <= self.fill {
            if &self.buf[pos..pos + term.len()] == term {
                dispatch(&self.buf[start..pos]);
                pos += term.len();
                start = pos;
            } else {
                pos += 1;
            }
        }

        // Compact the incomplete trailing frame to the buffer start.
        if start > 0 {
            self.buf.copy_within(start..self.fill, 0);
            self.fill -= start;
        }
        self.scanned = self.fill.saturating_sub(term.len() - 1);
    }
}

impl Default for ReplyAssembler {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn collect(assembler: &mut ReplyAssembler, bytes: &[u8]) -> Vec<Vec<u8>> {
        let mut frames = Vec::new();
        assembler.feed(bytes, |frame| frames.push(frame.to_vec()));
        frames
    }

    #[test]
    fn test_reply_splitting_leaves_tail_buffered() {
        let mut assembler = ReplyAssembler::new();
        let frames = collect(&mut assembler, b"OK 12\r\ntemp:20");
        assert_eq!(frames, [b"OK 12".to_vec()]);
        assert_eq!(assembler.pending(), b"temp:20");

        let frames = collect(&mut assembler, b"\r\n");
        assert_eq!(frames, [b"temp:20".to_vec()]);
        assert!(assembler.pending().is_empty());
    }

    #[test]
    fn test_multiple_frames_in_one_feed() {
        let mut assembler = ReplyAssembler::new();
        let frames = collect(&mut assembler, b"ok\r\nok\r\nT:200\r\n");
        assert_eq!(
            frames,
            [b"ok".to_vec(), b"ok".to_vec(), b"T:200".to_vec()]
        );
    }

    #[test]
    fn test_empty_frame_is_dispatched_not_suppressed() {
        let mut assembler = ReplyAssembler::new();
        let frames = collect(&mut assembler, b"ok\r\n\r\nrest\r\n");
        assert_eq!(
            frames,
            [b"ok".to_vec(), b"".to_vec(), b"rest".to_vec()]
        );
    }

    #[test]
    fn test_terminator_split_across_feeds() {
        let mut assembler = ReplyAssembler::new();
        assert!(collect(&mut assembler, b"ok\r").is_empty());
        let frames = collect(&mut assembler, b"\nnext\r\n");
        assert_eq!(frames, [b"ok".to_vec(), b"next".to_vec()]);
    }

    #[test]
    fn test_single_bytes_across_growth_boundary() {
        // Capacity 2 forces several doublings while feeding byte-by-byte;
        // the terminator still gets detected wherever it lands.
        let mut assembler = ReplyAssembler::with_capacity(2);
        let mut frames = Vec::new();
        for &b in b"status:ready\r\n" {
            assembler.feed(&[b], |frame| frames.push(frame.to_vec()));
        }
        assert_eq!(frames, [b"status:ready".to_vec()]);
        assert!(assembler.pending().is_empty());
    }

    #[test]
    fn test_direct_read_path() {
        let mut assembler = ReplyAssembler::with_capacity(4);
        let mut frames = Vec::new();

        assembler.grow_if_full();
        let spare = assembler.spare_mut();
        spare[..4].copy_from_slice(b"ok\r\n");
        assembler.commit(4, |frame| frames.push(frame.to_vec()));

        assert_eq!(frames, [b"ok".to_vec()]);
    }
}
