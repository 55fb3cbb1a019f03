//! Link abstraction and transport backends.
//!
//! A [`DeviceLink`] is a non-blocking byte-stream handle to the printer:
//! one write or read syscall per call, zero bytes when the link cannot make
//! progress. The session layer owns exactly one link and is its only caller,
//! so implementations carry no internal synchronization.

pub mod serial;
pub mod tcp;

use std::io;

use replink_core::constants::DEFAULT_BAUD_RATE;
use replink_core::Result;
use serde::{Deserialize, Serialize};

/// Transport used to reach the device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ConnectionDriver {
    /// Direct serial/USB connection
    #[default]
    Serial,
    /// TCP socket connection (network-attached controller)
    Tcp,
}

impl std::fmt::Display for ConnectionDriver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Serial => write!(f, "serial"),
            Self::Tcp => write!(f, "tcp"),
        }
    }
}

/// Parity setting for serial links
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SerialParity {
    /// No parity bit
    #[default]
    None,
    /// Even parity
    Even,
    /// Odd parity
    Odd,
}

/// Parameters for opening a device link
///
/// Fixed at open time and immutable for the session's lifetime. The serial
/// fields are ignored by the TCP driver.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionParams {
    /// Transport to use
    pub driver: ConnectionDriver,
    /// Port name (e.g. "/dev/ttyACM0", "COM3") or "host:port" address
    pub port: String,
    /// Serial link speed in baud
    pub baud_rate: u32,
    /// Serial data bits (5-8)
    pub data_bits: u8,
    /// Serial stop bits (1-2)
    pub stop_bits: u8,
    /// Serial parity
    pub parity: SerialParity,
    /// Hardware flow control
    pub flow_control: bool,
}

impl Default for ConnectionParams {
    fn default() -> Self {
        Self {
            driver: ConnectionDriver::Serial,
            port: String::new(),
            baud_rate: DEFAULT_BAUD_RATE,
            data_bits: 8,
            stop_bits: 1,
            parity: SerialParity::None,
            flow_control: false,
        }
    }
}

impl ConnectionParams {
    /// Parameters for a serial link at the given speed
    pub fn serial(port: impl Into<String>, baud_rate: u32) -> Self {
        Self {
            port: port.into(),
            baud_rate,
            ..Self::default()
        }
    }

    /// Parameters for a TCP link to a "host:port" address
    pub fn tcp(address: impl Into<String>) -> Self {
        Self {
            driver: ConnectionDriver::Tcp,
            port: address.into(),
            ..Self::default()
        }
    }
}

/// Non-blocking byte-stream handle to the device.
///
/// Contract: `read` and `write` perform at most one syscall and return the
/// number of bytes actually transferred, which may be zero when the link
/// cannot make progress. Implementations report genuine failures through
/// `io::Error`; `WouldBlock`-class conditions are normalized to `Ok(0)` so
/// the session never sees them as errors. `EINTR` retries are the session's
/// responsibility, not the link's.
pub trait DeviceLink {
    /// Write as many bytes as the link will accept without blocking.
    fn write(&mut self, data: &[u8]) -> io::Result<usize>;

    /// Read whatever bytes the link has available without blocking.
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize>;

    /// Link identifier for diagnostics.
    fn name(&self) -> String;

    /// Close the link.
    fn close(&mut self) -> io::Result<()>;
}

/// Open the link described by `params` with the matching backend.
pub fn open_link(params: &ConnectionParams) -> Result<Box<dyn DeviceLink>> {
    match params.driver {
        ConnectionDriver::Serial => Ok(Box::new(serial::SerialLink::open(params)?)),
        ConnectionDriver::Tcp => Ok(Box::new(tcp::TcpLink::open(params)?)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_params() {
        let params = ConnectionParams::default();
        assert_eq!(params.driver, ConnectionDriver::Serial);
        assert_eq!(params.baud_rate, DEFAULT_BAUD_RATE);
        assert_eq!(params.data_bits, 8);
        assert_eq!(params.stop_bits, 1);
        assert_eq!(params.parity, SerialParity::None);
    }

    #[test]
    fn test_tcp_params() {
        let params = ConnectionParams::tcp("octopi.local:5000");
        assert_eq!(params.driver, ConnectionDriver::Tcp);
        assert_eq!(params.port, "octopi.local:5000");
        assert_eq!(params.driver.to_string(), "tcp");
    }
}
