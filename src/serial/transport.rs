use std::io::{Read, Write};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use serialport::{SerialPort, SerialPortType};

use super::{Result, SerialError};

/// Default baud rate for the GPD-X303S (factory setting).
pub const DEFAULT_BAUD_RATE: u32 = 9600;

/// Internal per-read timeout on the port; the overall deadline is enforced
/// by the `read_line` loop.
const PORT_TIMEOUT: Duration = Duration::from_millis(100);

/// A serial port visible to the operator's port picker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PortInfo {
    pub port_name: String,
    pub manufacturer: Option<String>,
    pub product: Option<String>,
}

/// List serial ports available on this machine.
pub fn list_ports() -> Result<Vec<PortInfo>> {
    let ports = serialport::available_ports()?;
    let mut infos = Vec::new();

    for port in ports {
        let (manufacturer, product) = match port.port_type {
            SerialPortType::UsbPort(usb_info) => (usb_info.manufacturer, usb_info.product),
            _ => (None, None),
        };
        infos.push(PortInfo {
            port_name: port.port_name,
            manufacturer,
            product,
        });
    }

    Ok(infos)
}

/// Line-oriented byte transport to the instrument.
///
/// One write or one write+read transaction at a time; callers serialize
/// access through the session's transport lock.
pub trait LineTransport: Send {
    /// Write one command line. The newline terminator is appended here.
    fn write_line(&mut self, line: &str) -> Result<()>;

    /// Read one reply line, trimmed of the terminator and surrounding
    /// whitespace. Returns `Timeout` if no byte arrived before the
    /// deadline; a partial line received by the deadline is returned as-is.
    fn read_line(&mut self, timeout: Duration) -> Result<String>;

    /// Close the transport. Idempotent, safe to call when never opened.
    fn close(&mut self);

    fn is_open(&self) -> bool;
}

pub struct SerialTransport {
    port: Option<Box<dyn SerialPort>>,
    port_name: String,
}

impl SerialTransport {
    /// Open a serial port for the instrument.
    pub fn open(port_name: &str, baud_rate: u32) -> Result<Self> {
        let port = serialport::new(port_name, baud_rate)
            .timeout(PORT_TIMEOUT)
            .open()
            .map_err(|e| SerialError::PortUnavailable(format!("{}: {}", port_name, e)))?;

        log::info!("Opened serial port {} at {} baud", port_name, baud_rate);

        Ok(Self {
            port: Some(port),
            port_name: port_name.to_string(),
        })
    }

    pub fn port_name(&self) -> &str {
        &self.port_name
    }
}

impl LineTransport for SerialTransport {
    fn write_line(&mut self, line: &str) -> Result<()> {
        let port = self.port.as_mut().ok_or(SerialError::NotOpen)?;

        port.write_all(format!("{}\n", line).as_bytes())?;
        port.flush()?;

        log::debug!("TX {}: {}", self.port_name, line);
        Ok(())
    }

    fn read_line(&mut self, timeout: Duration) -> Result<String> {
        let port = self.port.as_mut().ok_or(SerialError::NotOpen)?;

        let deadline = Instant::now() + timeout;
        let mut received = Vec::new();
        let mut byte = [0u8; 1];

        loop {
            if Instant::now() >= deadline {
                if received.is_empty() {
                    return Err(SerialError::Timeout);
                }
                // Partial line; hand back what arrived.
                break;
            }

            match port.read(&mut byte) {
                Ok(1) => {
                    if byte[0] == b'\n' {
                        break;
                    }
                    received.push(byte[0]);
                }
                Ok(_) => continue,
                // Port-level timeout is shorter than the overall deadline.
                Err(ref e) if e.kind() == std::io::ErrorKind::TimedOut => continue,
                Err(e) => return Err(SerialError::IoError(e)),
            }
        }

        let line = String::from_utf8_lossy(&received).trim().to_string();
        log::debug!("RX {}: {}", self.port_name, line);
        Ok(line)
    }

    fn close(&mut self) {
        if self.port.take().is_some() {
            log::info!("Closed serial port {}", self.port_name);
        }
    }

    fn is_open(&self) -> bool {
        self.port.is_some()
    }
}
