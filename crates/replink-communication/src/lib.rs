//! # Replink Communication
//!
//! Device-communication engine for serial-linked 3D-printer controllers.
//! Turns discrete outbound command blocks into a framed, checksummed,
//! priority-ordered byte stream, drives non-blocking serial/TCP I/O from an
//! embedding event loop, and reassembles inbound bytes into discrete reply
//! frames.
//!
//! The [`session::DeviceSession`] façade is the only type most embedders
//! need: the event loop calls `on_readable`/`on_writable` when the link is
//! ready, the embedder calls `enqueue` to submit blocks, and completion and
//! reply notifications arrive through the [`session::DeviceListener`]
//! callbacks. What a block means to the machine, and how replies are
//! interpreted, is entirely the embedder's concern.

pub mod communication;
pub mod protocol;
pub mod session;

pub use communication::{
    serial::{list_ports, SerialLink, SerialPortInfo},
    tcp::TcpLink,
    ConnectionDriver, ConnectionParams, DeviceLink, SerialParity,
};
pub use protocol::{
    format_frame, xor_checksum, Protocol,
    scheduler::Priority,
};
pub use session::{DeviceListener, DeviceSession, SessionConfig};
