//! Serial port backend.
//!
//! Opens the port through the `serialport` crate with a very short timeout
//! so every read behaves as a non-blocking poll, and normalizes the
//! timeout/would-block conditions that produces into zero-byte progress.
//! Also provides port enumeration filtered to the device patterns printer
//! controller boards actually enumerate as.

use std::io::{self, Read, Write};
use std::time::Duration;

use replink_core::{LinkError, Result};

use super::{ConnectionParams, DeviceLink, SerialParity};

/// Poll timeout for reads and writes. Short enough that the link behaves as
/// non-blocking from the session's point of view.
const POLL_TIMEOUT: Duration = Duration::from_millis(10);

/// Information about an available serial port
#[derive(Debug, Clone)]
pub struct SerialPortInfo {
    /// Port name (e.g. "/dev/ttyACM0", "COM3")
    pub port_name: String,
    /// Human-readable description
    pub description: String,
    /// Manufacturer name if available
    pub manufacturer: Option<String>,
    /// Serial number if available
    pub serial_number: Option<String>,
    /// USB vendor ID if applicable
    pub vid: Option<u16>,
    /// USB product ID if applicable
    pub pid: Option<u16>,
}

/// List serial ports that look like printer controller boards.
///
/// Filtered to the patterns USB-attached controllers enumerate as:
/// - Windows: COM*
/// - Linux: /dev/ttyUSB*, /dev/ttyACM*
/// - macOS: /dev/cu.usbserial-*, /dev/cu.usbmodem*
pub fn list_ports() -> Result<Vec<SerialPortInfo>> {
    let ports = serialport::available_ports().map_err(|e| {
        tracing::error!("Failed to enumerate serial ports: {}", e);
        LinkError::FailedToOpen {
            port: "<enumeration>".to_string(),
            reason: e.to_string(),
        }
    })?;

    Ok(ports
        .iter()
        .filter(|port| is_printer_port(&port.port_name))
        .map(describe_port)
        .collect())
}

/// Check whether a port name matches the printer controller patterns.
fn is_printer_port(port_name: &str) -> bool {
    if port_name.starts_with("COM") && port_name[3..].chars().all(|c| c.is_ascii_digit()) {
        return true;
    }
    if port_name.starts_with("/dev/ttyUSB") || port_name.starts_with("/dev/ttyACM") {
        return true;
    }
    port_name.starts_with("/dev/cu.usbserial-") || port_name.starts_with("/dev/cu.usbmodem")
}

fn describe_port(port: &serialport::SerialPortInfo) -> SerialPortInfo {
    let mut info = SerialPortInfo {
        port_name: port.port_name.clone(),
        description: "Serial Port".to_string(),
        manufacturer: None,
        serial_number: None,
        vid: None,
        pid: None,
    };

    if let serialport::SerialPortType::UsbPort(usb) = &port.port_type {
        info.description = format!(
            "USB {} {}",
            usb.manufacturer.as_deref().unwrap_or("Device"),
            usb.product.as_deref().unwrap_or("Serial Port")
        );
        info.manufacturer = usb.manufacturer.clone();
        info.serial_number = usb.serial_number.clone();
        info.vid = Some(usb.vid);
        info.pid = Some(usb.pid);
    }

    info
}

fn to_serialport_parity(parity: SerialParity) -> serialport::Parity {
    match parity {
        SerialParity::None => serialport::Parity::None,
        SerialParity::Even => serialport::Parity::Even,
        SerialParity::Odd => serialport::Parity::Odd,
    }
}

/// Byte-stream view of the opened port.
trait ReadWrite: Read + Write {}
impl<T: Read + Write> ReadWrite for T {}

/// Serial link backend.
///
/// Owned exclusively by one session on one thread; no internal locking.
pub struct SerialLink {
    port: Box<dyn ReadWrite>,
    name: String,
}

impl SerialLink {
    /// Open the serial port described by `params` in polling mode.
    pub fn open(params: &ConnectionParams) -> Result<Self> {
        let data_bits = match params.data_bits {
            5 => serialport::DataBits::Five,
            6 => serialport::DataBits::Six,
            7 => serialport::DataBits::Seven,
            8 => serialport::DataBits::Eight,
            other => {
                return Err(LinkError::InvalidParameters {
                    reason: format!("invalid data bits: {}", other),
                }
                .into())
            }
        };
        let stop_bits = match params.stop_bits {
            1 => serialport::StopBits::One,
            2 => serialport::StopBits::Two,
            other => {
                return Err(LinkError::InvalidParameters {
                    reason: format!("invalid stop bits: {}", other),
                }
                .into())
            }
        };

        let builder = serialport::new(&params.port, params.baud_rate)
            .timeout(POLL_TIMEOUT)
            .data_bits(data_bits)
            .stop_bits(stop_bits)
            .parity(to_serialport_parity(params.parity))
            .flow_control(if params.flow_control {
                serialport::FlowControl::Hardware
            } else {
                serialport::FlowControl::None
            });

        match builder.open_native() {
            Ok(port) => Ok(SerialLink {
                port: Box::new(port),
                name: params.port.clone(),
            }),
            Err(e) => {
                tracing::warn!("Failed to open serial port {}: {}", params.port, e);
                Err(LinkError::FailedToOpen {
                    port: params.port.clone(),
                    reason: e.to_string(),
                }
                .into())
            }
        }
    }
}

/// `TimedOut` from the poll timeout and `WouldBlock` both mean the link
/// made no progress, not that it failed.
fn no_progress(kind: io::ErrorKind) -> bool {
    matches!(kind, io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock)
}

impl DeviceLink for SerialLink {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        match self.port.write(data) {
            Err(e) if no_progress(e.kind()) => Ok(0),
            other => other,
        }
    }

    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self.port.read(buf) {
            Err(e) if no_progress(e.kind()) => Ok(0),
            other => other,
        }
    }

    fn name(&self) -> String {
        self.name.clone()
    }

    fn close(&mut self) -> io::Result<()> {
        // The port is released when the handle drops.
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_printer_port_patterns() {
        assert!(is_printer_port("COM3"));
        assert!(is_printer_port("/dev/ttyUSB0"));
        assert!(is_printer_port("/dev/ttyACM1"));
        assert!(is_printer_port("/dev/cu.usbmodem14201"));
        assert!(!is_printer_port("/dev/ttyS0"));
        assert!(!is_printer_port("COMx"));
        assert!(!is_printer_port("/dev/random"));
    }

    #[test]
    fn test_invalid_data_bits_rejected() {
        let mut params = ConnectionParams::serial("/dev/null", 115_200);
        params.data_bits = 9;
        let err = match SerialLink::open(&params) {
            Err(err) => err,
            Ok(_) => panic!("expected invalid data bits to be rejected"),
        };
        assert!(err.is_link_error());
    }
}
