//! Serial device transport backed by the `serialport` crate

use super::transport::SerialTransport;
use crate::config::{DataBits, Parity, SerialSettings, StopBits};
use crate::error::{CaptureError, Result};
use serde::Serialize;
use std::io::{ErrorKind, Read, Write};
use std::time::Duration;

/// A detected serial port
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PortInfo {
    pub port_name: String,
    /// `USB`, `Bluetooth`, `PCI` or `Unknown`
    pub port_type: String,
    pub manufacturer: Option<String>,
    pub product: Option<String>,
}

/// List available serial ports
///
/// On macOS only the `/dev/cu.*` devices are listed; the `/dev/tty.*`
/// twins block on open waiting for carrier detect.
pub fn list_ports() -> Result<Vec<PortInfo>> {
    let ports = serialport::available_ports()
        .map_err(|e| CaptureError::Transport(format!("Failed to enumerate ports: {}", e)))?;

    Ok(ports
        .into_iter()
        .filter(|_p| {
            #[cfg(target_os = "macos")]
            {
                !_p.port_name.starts_with("/dev/tty.")
            }
            #[cfg(not(target_os = "macos"))]
            {
                true
            }
        })
        .map(|p| {
            let (port_type, manufacturer, product) = match p.port_type {
                serialport::SerialPortType::UsbPort(info) => {
                    ("USB".to_string(), info.manufacturer, info.product)
                }
                serialport::SerialPortType::BluetoothPort => ("Bluetooth".to_string(), None, None),
                serialport::SerialPortType::PciPort => ("PCI".to_string(), None, None),
                serialport::SerialPortType::Unknown => ("Unknown".to_string(), None, None),
            };
            PortInfo {
                port_name: p.port_name,
                port_type,
                manufacturer,
                product,
            }
        })
        .collect())
}

fn to_serialport_data_bits(bits: DataBits) -> serialport::DataBits {
    match bits {
        DataBits::Five => serialport::DataBits::Five,
        DataBits::Six => serialport::DataBits::Six,
        DataBits::Seven => serialport::DataBits::Seven,
        DataBits::Eight => serialport::DataBits::Eight,
    }
}

fn to_serialport_parity(parity: Parity) -> serialport::Parity {
    match parity {
        Parity::None => serialport::Parity::None,
        Parity::Odd => serialport::Parity::Odd,
        Parity::Even => serialport::Parity::Even,
    }
}

fn to_serialport_stop_bits(bits: StopBits) -> serialport::StopBits {
    match bits {
        StopBits::One => serialport::StopBits::One,
        StopBits::Two => serialport::StopBits::Two,
    }
}

/// Transport over a real serial device
#[derive(Default)]
pub struct SerialPortTransport {
    port: Option<Box<dyn serialport::SerialPort>>,
    name: String,
    read_timeout: Duration,
    write_timeout: Duration,
}

impl SerialPortTransport {
    pub fn new() -> Self {
        Self::default()
    }

    fn port(&mut self) -> Result<&mut Box<dyn serialport::SerialPort>> {
        self.port.as_mut().ok_or(CaptureError::NotConnected)
    }
}

impl SerialTransport for SerialPortTransport {
    fn open(&mut self, settings: &SerialSettings) -> Result<()> {
        settings.validate()?;
        self.close();

        let port = serialport::new(&settings.port_name, settings.baud_rate)
            .data_bits(to_serialport_data_bits(settings.data_bits))
            .stop_bits(to_serialport_stop_bits(settings.stop_bits))
            .parity(to_serialport_parity(settings.parity))
            .timeout(settings.read_timeout())
            .open()
            .map_err(|e| {
                CaptureError::Transport(format!("Failed to open {}: {}", settings.port_name, e))
            })?;

        tracing::info!(
            "Opened {} at {} baud ({:?}, {:?}, {:?})",
            settings.port_name,
            settings.baud_rate,
            settings.data_bits,
            settings.parity,
            settings.stop_bits
        );
        self.port = Some(port);
        self.name = settings.port_name.clone();
        self.read_timeout = settings.read_timeout();
        self.write_timeout = settings.write_timeout();
        Ok(())
    }

    fn close(&mut self) {
        if self.port.take().is_some() {
            tracing::info!("Closed {}", self.name);
        }
    }

    fn is_open(&self) -> bool {
        self.port.is_some()
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        match self.port()?.read(buf) {
            Ok(n) => Ok(n),
            Err(e) if e.kind() == ErrorKind::TimedOut => Ok(0),
            Err(e) => Err(CaptureError::Transport(format!("Read error: {}", e))),
        }
    }

    fn write(&mut self, bytes: &[u8]) -> Result<()> {
        let (write_timeout, read_timeout) = (self.write_timeout, self.read_timeout);
        let port = self.port()?;
        port.set_timeout(write_timeout)?;
        let result = port.write_all(bytes).and_then(|_| port.flush());
        port.set_timeout(read_timeout)?;
        result.map_err(|e| CaptureError::Transport(format!("Write error: {}", e)))
    }

    fn describe(&self) -> String {
        if self.name.is_empty() {
            "serial port".to_string()
        } else {
            self.name.clone()
        }
    }
}
