//! Device session: the façade tying link, scheduler, assembler, and resend
//! cache together for a callback-driven event loop.
//!
//! The session is single-threaded by design: the embedding event loop calls
//! [`DeviceSession::on_readable`] and [`DeviceSession::on_writable`] when
//! the link is ready, each performs at most one non-blocking syscall, and
//! every notification reaches the embedder through [`DeviceListener`]
//! before the call returns. Partial transfers are the expected steady state
//! of non-blocking I/O, not errors; interrupted syscalls are retried
//! internally and never surfaced.

use std::io;

use replink_core::constants::DEFAULT_RESEND_CACHE_BLOCKS;
use replink_core::{Error, LinkError, ProtocolError, Result};
use serde::{Deserialize, Serialize};

use crate::communication::{open_link, ConnectionParams, DeviceLink};
use crate::protocol::assembler::ReplyAssembler;
use crate::protocol::resend::SentCache;
use crate::protocol::scheduler::{BeginOutcome, CompletedFrame, Priority, SendQueue};
use crate::protocol::Protocol;

/// Notifications delivered to the embedder.
///
/// All callbacks fire synchronously from inside [`DeviceSession::enqueue`],
/// [`DeviceSession::on_writable`], [`DeviceSession::on_readable`], or
/// [`DeviceSession::request_resend`]; implementations must not call back
/// into the session.
pub trait DeviceListener<T> {
    /// A queued block has been flushed to the link in full. Fires exactly
    /// once per block, with the exact bytes that went onto the wire.
    fn on_send(&mut self, tag: T, frame: &[u8]);

    /// One complete reply frame arrived, terminator stripped. Zero-length
    /// frames are forwarded, not suppressed: their meaning is the
    /// embedder's concern.
    fn on_reply(&mut self, frame: &[u8]);

    /// The session started or stopped wanting writability events from the
    /// event loop. Edge-triggered: fires only on changes.
    fn on_writable_interest_changed(&mut self, want_writable: bool);

    /// A block was discarded because it cannot be framed. Reported instead
    /// of `on_send` for that block, never in addition to it.
    fn on_reject(&mut self, tag: T, error: &Error);
}

/// Open-time session configuration, immutable for the session's lifetime.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Link parameters.
    pub connection: ConnectionParams,
    /// Wire protocol variant.
    pub protocol: Protocol,
    /// Sent-frame cache capacity in blocks; zero disables resend support.
    pub resend_cache_blocks: usize,
}

impl SessionConfig {
    pub fn new(connection: ConnectionParams, protocol: Protocol) -> Self {
        Self {
            connection,
            protocol,
            resend_cache_blocks: DEFAULT_RESEND_CACHE_BLOCKS,
        }
    }
}

/// A live link to one device.
///
/// Owns the link handle, the priority queues, the receive buffer, the
/// sent-frame cache, and the line counter; it is the sole writer of all of
/// them. `T` is the embedder's opaque completion tag, returned verbatim
/// through [`DeviceListener::on_send`].
pub struct DeviceSession<T> {
    link: Box<dyn DeviceLink>,
    listener: Box<dyn DeviceListener<T>>,
    protocol: Protocol,
    line: u64,
    queue: SendQueue<T>,
    assembler: ReplyAssembler,
    sent: SentCache,
    want_writable: bool,
}

impl<T> DeviceSession<T> {
    /// Open the link described by `config` and build an idle session.
    pub fn open(config: &SessionConfig, listener: Box<dyn DeviceListener<T>>) -> Result<Self> {
        let link = open_link(&config.connection)?;
        tracing::debug!(link = %link.name(), protocol = %config.protocol, "device session opened");
        Ok(Self::with_link(
            link,
            config.protocol,
            config.resend_cache_blocks,
            listener,
        ))
    }

    /// Build a session over an already opened link. Useful for custom
    /// transports and for tests.
    pub fn with_link(
        link: Box<dyn DeviceLink>,
        protocol: Protocol,
        resend_cache_blocks: usize,
        listener: Box<dyn DeviceListener<T>>,
    ) -> Self {
        Self {
            link,
            listener,
            protocol,
            line: 0,
            queue: SendQueue::new(),
            assembler: ReplyAssembler::new(),
            sent: SentCache::new(resend_cache_blocks),
            want_writable: false,
        }
    }

    /// Append a block at the tail of its priority queue. Never blocks.
    /// Raises writability interest if the session had nothing to send.
    pub fn enqueue(&mut self, priority: Priority, tag: T, payload: impl Into<Vec<u8>>) {
        self.queue.enqueue(priority, tag, payload.into());
        self.update_writable_interest();
    }

    /// Drive the outbound side: begin the next frame if idle, then perform
    /// one non-blocking write of the unsent suffix.
    ///
    /// Returns `Ok(())` when there was nothing to send (and lowers
    /// writability interest). A head block that cannot be framed is removed,
    /// reported through [`DeviceListener::on_reject`], and returned as an
    /// error; the line counter and the rest of the queue are untouched, so
    /// the next call proceeds normally.
    pub fn on_writable(&mut self) -> Result<()> {
        if !self.queue.is_sending() {
            match self.queue.begin_next(self.protocol, self.line) {
                BeginOutcome::Empty => {
                    self.update_writable_interest();
                    return Ok(());
                }
                BeginOutcome::Started { resend } => {
                    if !resend && self.protocol == Protocol::Numbered {
                        self.line += 1;
                    }
                }
                BeginOutcome::Rejected { tag, error } => {
                    tracing::warn!(%error, "dropping block that cannot be framed");
                    self.listener.on_reject(tag, &error);
                    self.update_writable_interest();
                    return Err(error);
                }
            }
        }

        let Some(unsent) = self.queue.unsent() else {
            return Ok(());
        };
        let written = retry_interrupted(|| self.link.write(unsent))
            .map_err(|e| link_io("write", &e))?;
        if written == 0 {
            return Ok(());
        }

        if let Some(done) = self.queue.advance(written) {
            match done {
                CompletedFrame::Block { tag, line, frame } => {
                    if self.protocol == Protocol::Numbered {
                        self.sent.insert(line, frame.clone());
                    }
                    tracing::trace!(line, bytes = frame.len(), "frame sent");
                    self.listener.on_send(tag, &frame);
                }
                CompletedFrame::Resend { frame } => {
                    tracing::trace!(bytes = frame.len(), "cached frame retransmitted");
                }
            }
            self.update_writable_interest();
        }
        Ok(())
    }

    /// Drive the inbound side: one non-blocking read into the receive
    /// buffer (grown first if full), dispatching every reply frame the new
    /// bytes complete.
    pub fn on_readable(&mut self) -> Result<()> {
        self.assembler.grow_if_full();
        let read = retry_interrupted(|| self.link.read(self.assembler.spare_mut()))
            .map_err(|e| link_io("read", &e))?;
        let listener = &mut self.listener;
        self.assembler.commit(read, |frame| listener.on_reply(frame));
        Ok(())
    }

    /// Schedule the cached frame for `line` for retransmission ahead of
    /// every queued block. The bytes go out verbatim, with the original
    /// line number and checksum, and no second `on_send` fires for them.
    ///
    /// The engine does not parse replies, so recognizing the firmware's
    /// resend request is the embedder's job; this is the operation it calls
    /// once it has.
    pub fn request_resend(&mut self, line: u64) -> Result<()> {
        match self.sent.lookup(line) {
            Some(frame) => {
                let frame = frame.to_vec();
                tracing::debug!(line, "scheduling cached frame for resend");
                self.queue.push_resend(frame);
                self.update_writable_interest();
                Ok(())
            }
            None => {
                tracing::warn!(line, "resend requested for a line no longer cached");
                Err(ProtocolError::ResendUnavailable { line }.into())
            }
        }
    }

    /// Drop every block not yet begun and return their tags, highest
    /// priority first. The in-flight frame, if any, still completes
    /// byte-for-byte and fires its `on_send`.
    pub fn clear_pending(&mut self) -> Vec<T> {
        let tags = self.queue.clear_pending();
        self.update_writable_interest();
        tags
    }

    /// Number of blocks waiting to be framed.
    pub fn pending_blocks(&self) -> usize {
        self.queue.pending_blocks()
    }

    /// True while a frame is part-way onto the wire.
    pub fn is_sending(&self) -> bool {
        self.queue.is_sending()
    }

    /// Line number the next numbered frame will be sent under.
    pub fn line_number(&self) -> u64 {
        self.line
    }

    /// The session's wire protocol variant.
    pub fn protocol(&self) -> Protocol {
        self.protocol
    }

    /// Release the link. Consumes the session; queues, buffers, and the
    /// sent-frame cache are dropped with it.
    pub fn close(mut self) -> Result<()> {
        tracing::debug!(link = %self.link.name(), "device session closed");
        self.link.close().map_err(|e| link_io("close", &e))
    }

    fn update_writable_interest(&mut self) {
        let want = self.queue.has_work();
        if want != self.want_writable {
            self.want_writable = want;
            self.listener.on_writable_interest_changed(want);
        }
    }
}

/// Retry `op` across signal interruptions; every other outcome is the
/// caller's to interpret.
fn retry_interrupted(mut op: impl FnMut() -> io::Result<usize>) -> io::Result<usize> {
    loop {
        match op() {
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            other => return other,
        }
    }
}

fn link_io(operation: &str, source: &io::Error) -> Error {
    LinkError::Io {
        operation: operation.to_string(),
        reason: source.to_string(),
    }
    .into()
}
