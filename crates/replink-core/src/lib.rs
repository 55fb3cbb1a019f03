//! # Replink Core
//!
//! Shared foundation for the replink device-communication engine.
//! Provides the error taxonomy used across the workspace and the fixed
//! wire-protocol constants (frame capacities, terminators, buffer sizing).

pub mod constants;
pub mod error;

pub use error::{Error, LinkError, ProtocolError, Result};
