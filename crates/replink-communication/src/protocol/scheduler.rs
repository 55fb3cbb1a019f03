//! Outbound block scheduling and transmit-state tracking.
//!
//! Blocks wait in one FIFO queue per priority level. Selection is strict:
//! the highest non-empty level always wins, and a continuously busy high
//! level starves lower ones. That is the documented contract, not an
//! oversight. A frame once begun is never abandoned: it completes
//! byte-for-byte before any other block, of any priority, is considered.

use std::collections::VecDeque;

use replink_core::Error;

use super::{format_frame, Protocol};

/// Send priority for a queued block.
///
/// Higher values win selection of the next block to send; they never
/// reorder bytes already on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub enum Priority {
    /// Background traffic (e.g. streamed print moves)
    Low,
    /// Ordinary commands
    #[default]
    Normal,
    /// Urgent commands that should jump the print stream
    High,
}

impl Priority {
    /// Number of priority levels.
    pub const COUNT: usize = 3;

    /// Levels in selection order, highest first.
    const DESCENDING: [Priority; Self::COUNT] = [Priority::High, Priority::Normal, Priority::Low];

    fn index(self) -> usize {
        self as usize
    }
}

/// One embedder-supplied payload awaiting transmission.
#[derive(Debug)]
struct QueuedBlock<T> {
    /// Opaque completion tag, returned verbatim through the listener.
    tag: T,
    /// Raw payload bytes, read-only for the block's lifetime.
    payload: Vec<u8>,
}

/// What the in-flight frame is carrying.
#[derive(Debug)]
enum FrameOrigin<T> {
    /// The head block of a priority queue, dequeued for transmission.
    Block { tag: T, line: u64 },
    /// A cached frame being retransmitted after a resend request.
    Resend,
}

/// Transmit state: idle, or exactly one frame part-way onto the wire.
///
/// `cursor` is always within the frame; the frame is complete exactly when
/// `cursor == frame.len()`.
#[derive(Debug)]
enum TxState<T> {
    Idle,
    Sending {
        origin: FrameOrigin<T>,
        frame: Vec<u8>,
        cursor: usize,
    },
}

/// Outcome of [`SendQueue::begin_next`].
#[derive(Debug)]
pub enum BeginOutcome<T> {
    /// A frame is now in flight.
    Started {
        /// True when the frame is a cached retransmission rather than a
        /// newly framed block.
        resend: bool,
    },
    /// Every queue was empty; nothing to do.
    Empty,
    /// The head block could not be framed and was removed so the queue can
    /// make progress. The caller must report it to the embedder.
    Rejected {
        /// Completion tag of the discarded block.
        tag: T,
        /// Why framing failed.
        error: Error,
    },
}

/// A fully transmitted frame, handed back by [`SendQueue::advance`].
#[derive(Debug)]
pub enum CompletedFrame<T> {
    /// A queue-originated block finished.
    Block {
        /// The block's completion tag.
        tag: T,
        /// Line number the frame was sent under.
        line: u64,
        /// The exact bytes that went onto the wire.
        frame: Vec<u8>,
    },
    /// A cached frame finished retransmission.
    Resend {
        /// The retransmitted bytes.
        frame: Vec<u8>,
    },
}

/// Per-session outbound scheduler.
///
/// Owns the priority queues, the retransmission queue, and the in-flight
/// transmit state. Resend frames are drained before any priority level:
/// the firmware asked for them because it cannot proceed without them.
#[derive(Debug)]
pub struct SendQueue<T> {
    queues: [VecDeque<QueuedBlock<T>>; Priority::COUNT],
    resend: VecDeque<Vec<u8>>,
    state: TxState<T>,
}

impl<T> SendQueue<T> {
    pub fn new() -> Self {
        Self {
            queues: [VecDeque::new(), VecDeque::new(), VecDeque::new()],
            resend: VecDeque::new(),
            state: TxState::Idle,
        }
    }

    /// Append a block at the tail of its priority queue.
    pub fn enqueue(&mut self, priority: Priority, tag: T, payload: Vec<u8>) {
        self.queues[priority.index()].push_back(QueuedBlock { tag, payload });
    }

    /// Schedule previously formatted frame bytes for retransmission, ahead
    /// of every priority queue.
    pub fn push_resend(&mut self, frame: Vec<u8>) {
        self.resend.push_back(frame);
    }

    /// Number of queued blocks not yet begun (resend frames excluded).
    pub fn pending_blocks(&self) -> usize {
        self.queues.iter().map(VecDeque::len).sum()
    }

    /// True while a frame is part-way onto the wire.
    pub fn is_sending(&self) -> bool {
        matches!(self.state, TxState::Sending { .. })
    }

    /// True when the link should be watched for writability: a frame is in
    /// flight or anything is waiting to be framed.
    pub fn has_work(&self) -> bool {
        self.is_sending() || !self.resend.is_empty() || self.pending_blocks() > 0
    }

    /// Drop every block not yet begun and return their tags, highest
    /// priority first, FIFO within a level. Pending resend frames are
    /// dropped too. The in-flight frame, if any, is untouched.
    pub fn clear_pending(&mut self) -> Vec<T> {
        self.resend.clear();
        let mut tags = Vec::with_capacity(self.pending_blocks());
        for priority in Priority::DESCENDING {
            tags.extend(self.queues[priority.index()].drain(..).map(|b| b.tag));
        }
        tags
    }

    /// Select and frame the next block to send.
    ///
    /// Must only be called while idle. On [`BeginOutcome::Started`] the
    /// frame is in flight with its cursor at zero; on
    /// [`BeginOutcome::Rejected`] the offending block has been removed and
    /// nothing else changed; the line counter and the rest of the queue
    /// are exactly as before.
    pub fn begin_next(&mut self, protocol: Protocol, line: u64) -> BeginOutcome<T> {
        debug_assert!(!self.is_sending(), "begin_next called mid-frame");

        if let Some(frame) = self.resend.pop_front() {
            self.state = TxState::Sending {
                origin: FrameOrigin::Resend,
                frame,
                cursor: 0,
            };
            return BeginOutcome::Started { resend: true };
        }

        for priority in Priority::DESCENDING {
            let Some(block) = self.queues[priority.index()].pop_front() else {
                continue;
            };
            return match format_frame(&block.payload, protocol, line) {
                Ok(frame) => {
                    tracing::trace!(line, %protocol, bytes = frame.len(), "frame begun");
                    self.state = TxState::Sending {
                        origin: FrameOrigin::Block {
                            tag: block.tag,
                            line,
                        },
                        frame,
                        cursor: 0,
                    };
                    BeginOutcome::Started { resend: false }
                }
                Err(error) => BeginOutcome::Rejected {
                    tag: block.tag,
                    error,
                },
            };
        }

        BeginOutcome::Empty
    }

    /// The unsent suffix of the in-flight frame, if any.
    pub fn unsent(&self) -> Option<&[u8]> {
        match &self.state {
            TxState::Idle => None,
            TxState::Sending { frame, cursor, .. } => Some(&frame[*cursor..]),
        }
    }

    /// Record `n` bytes accepted by the link. Returns the completed frame
    /// once the cursor reaches the end, leaving the queue idle.
    pub fn advance(&mut self, n: usize) -> Option<CompletedFrame<T>> {
        let complete = match &mut self.state {
            TxState::Idle => false,
            TxState::Sending { frame, cursor, .. } => {
                *cursor += n;
                debug_assert!(*cursor <= frame.len(), "cursor past frame end");
                *cursor == frame.len()
            }
        };
        if !complete {
            return None;
        }
        match std::mem::replace(&mut self.state, TxState::Idle) {
            TxState::Sending { origin, frame, .. } => Some(match origin {
                FrameOrigin::Block { tag, line } => CompletedFrame::Block { tag, line, frame },
                FrameOrigin::Resend => CompletedFrame::Resend { frame },
            }),
            TxState::Idle => None,
        }
    }
}

impl<T> Default for SendQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn drain_tags(queue: &mut SendQueue<&'static str>) -> Vec<&'static str> {
        let mut order = Vec::new();
        loop {
            match queue.begin_next(Protocol::Simple, 0) {
                BeginOutcome::Started { .. } => {
                    let len = queue.unsent().map(<[u8]>::len).unwrap_or(0);
                    match queue.advance(len) {
                        Some(CompletedFrame::Block { tag, .. }) => order.push(tag),
                        _ => break,
                    }
                }
                BeginOutcome::Empty => break,
                BeginOutcome::Rejected { .. } => panic!("unexpected rejection"),
            }
        }
        order
    }

    #[test]
    fn test_strict_priority_order() {
        let mut queue = SendQueue::new();
        queue.enqueue(Priority::High, "a", b"G28".to_vec());
        queue.enqueue(Priority::Low, "b", b"G1 X1".to_vec());
        queue.enqueue(Priority::High, "c", b"M112".to_vec());
        assert_eq!(drain_tags(&mut queue), ["a", "c", "b"]);
    }

    #[test]
    fn test_fifo_within_level() {
        let mut queue = SendQueue::new();
        queue.enqueue(Priority::Normal, "a", b"G1 X1".to_vec());
        queue.enqueue(Priority::Normal, "b", b"G1 X2".to_vec());
        assert_eq!(drain_tags(&mut queue), ["a", "b"]);
    }

    #[test]
    fn test_partial_advance_completes_once() {
        let mut queue = SendQueue::new();
        queue.enqueue(Priority::Normal, "a", b"G28".to_vec());
        assert!(matches!(
            queue.begin_next(Protocol::Simple, 0),
            BeginOutcome::Started { resend: false }
        ));
        // "G28\r\n" is 5 bytes; feed them one at a time.
        for _ in 0..4 {
            assert!(queue.advance(1).is_none());
            assert!(queue.is_sending());
        }
        let done = queue.advance(1);
        assert!(matches!(done, Some(CompletedFrame::Block { tag: "a", .. })));
        assert!(!queue.is_sending());
        assert!(!queue.has_work());
    }

    #[test]
    fn test_oversized_head_is_rejected_and_removed() {
        let mut queue = SendQueue::new();
        queue.enqueue(Priority::Normal, "big", vec![b'X'; 400]);
        queue.enqueue(Priority::Normal, "ok", b"G28".to_vec());
        match queue.begin_next(Protocol::Numbered, 0) {
            BeginOutcome::Rejected { tag, error } => {
                assert_eq!(tag, "big");
                assert!(error.is_block_too_large());
            }
            other => panic!("expected rejection, got {:?}", other),
        }
        assert!(!queue.is_sending());
        // The valid block behind it proceeds normally.
        assert!(matches!(
            queue.begin_next(Protocol::Numbered, 0),
            BeginOutcome::Started { resend: false }
        ));
    }

    #[test]
    fn test_resend_frames_preempt_queues() {
        let mut queue = SendQueue::new();
        queue.enqueue(Priority::High, "new", b"G28".to_vec());
        queue.push_resend(b"N4 G1 X1 *97\r\n".to_vec());
        assert!(matches!(
            queue.begin_next(Protocol::Numbered, 7),
            BeginOutcome::Started { resend: true }
        ));
        assert_eq!(queue.unsent().unwrap(), b"N4 G1 X1 *97\r\n");
        let done = queue.advance(14);
        assert!(matches!(done, Some(CompletedFrame::Resend { .. })));
    }

    #[test]
    fn test_clear_pending_returns_tags_in_selection_order() {
        let mut queue = SendQueue::new();
        queue.enqueue(Priority::Low, "l", b"a".to_vec());
        queue.enqueue(Priority::High, "h", b"b".to_vec());
        queue.enqueue(Priority::Normal, "n", b"c".to_vec());
        queue.push_resend(b"x\r\n".to_vec());
        assert_eq!(queue.clear_pending(), ["h", "n", "l"]);
        assert!(!queue.has_work());
    }
}
