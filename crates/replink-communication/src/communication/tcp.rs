//! TCP backend for network-attached controllers.
//!
//! Some controller boards (and print servers fronting a serial board)
//! expose the same line protocol over a TCP socket. The stream is switched
//! to nonblocking mode after connecting so reads and writes poll exactly
//! like the serial backend.

use std::io::{self, Read, Write};
use std::net::{Shutdown, TcpStream};

use replink_core::{LinkError, Result};

use super::{ConnectionParams, DeviceLink};

/// TCP link backend.
pub struct TcpLink {
    stream: TcpStream,
    peer: String,
}

impl TcpLink {
    /// Connect to the "host:port" address in `params` and switch the stream
    /// to nonblocking mode.
    pub fn open(params: &ConnectionParams) -> Result<Self> {
        let stream = TcpStream::connect(&params.port).map_err(|e| {
            tracing::warn!("Failed to connect to {}: {}", params.port, e);
            LinkError::FailedToOpen {
                port: params.port.clone(),
                reason: e.to_string(),
            }
        })?;

        // Command frames are tiny; coalescing them behind Nagle only adds
        // latency between blocks.
        stream.set_nodelay(true).map_err(|e| LinkError::Io {
            operation: "set_nodelay".to_string(),
            reason: e.to_string(),
        })?;
        stream.set_nonblocking(true).map_err(|e| LinkError::Io {
            operation: "set_nonblocking".to_string(),
            reason: e.to_string(),
        })?;

        Ok(TcpLink {
            stream,
            peer: params.port.clone(),
        })
    }
}

fn no_progress(kind: io::ErrorKind) -> bool {
    matches!(kind, io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut)
}

impl DeviceLink for TcpLink {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        match self.stream.write(data) {
            Err(e) if no_progress(e.kind()) => Ok(0),
            other => other,
        }
    }

    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        match self.stream.read(buf) {
            // A zero-byte read on TCP means the peer closed the connection;
            // surface that instead of reporting idle progress forever.
            Ok(0) => Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "connection closed by peer",
            )),
            Err(e) if no_progress(e.kind()) => Ok(0),
            other => other,
        }
    }

    fn name(&self) -> String {
        format!("tcp://{}", self.peer)
    }

    fn close(&mut self) -> io::Result<()> {
        self.stream.shutdown(Shutdown::Both)
    }
}
