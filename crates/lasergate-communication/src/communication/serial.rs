//! Serial port link implementation
//!
//! Provides port enumeration and the [`SerialLink`] used to reach GRBL over
//! USB or RS-232.
//!
//! Supports:
//! - Port enumeration and discovery
//! - 8N1 framing without flow control
//! - DTR control for the reset pulse
//! - Blocking reads bounded by the read timeout

use super::{ConnectionParams, Link};
use lasergate_core::{ConnectionError, Error, Result};
use std::io::{self, Read, Write};

/// Information about an available serial port
#[derive(Debug, Clone)]
pub struct SerialPortInfo {
    /// Port name (e.g., "/dev/ttyUSB0", "COM3")
    pub port_name: String,

    /// Port description (e.g., "USB Serial Port")
    pub description: String,

    /// Manufacturer name if available
    pub manufacturer: Option<String>,

    /// USB vendor ID if applicable
    pub vid: Option<u16>,

    /// USB product ID if applicable
    pub pid: Option<u16>,
}

impl SerialPortInfo {
    /// Create a new port info
    pub fn new(port_name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            port_name: port_name.into(),
            description: description.into(),
            manufacturer: None,
            vid: None,
            pid: None,
        }
    }

    /// Set manufacturer
    pub fn with_manufacturer(mut self, manufacturer: impl Into<String>) -> Self {
        self.manufacturer = Some(manufacturer.into());
        self
    }

    /// Set USB IDs
    pub fn with_usb_ids(mut self, vid: u16, pid: u16) -> Self {
        self.vid = Some(vid);
        self.pid = Some(pid);
        self
    }
}

/// List serial ports that look like CNC controllers
///
/// Keeps only the usual controller patterns:
/// - Windows: COM* (e.g., COM1, COM3)
/// - Linux: /dev/ttyUSB*, /dev/ttyACM*
/// - macOS: /dev/cu.usbserial-*, /dev/cu.usbmodem*
pub fn list_ports() -> Result<Vec<SerialPortInfo>> {
    match serialport::available_ports() {
        Ok(ports) => Ok(ports
            .iter()
            .filter(|port| is_valid_cnc_port(&port.port_name))
            .map(|port| {
                let info = SerialPortInfo::new(&port.port_name, port_description(port));
                match &port.port_type {
                    serialport::SerialPortType::UsbPort(usb_info) => {
                        let info = info.with_usb_ids(usb_info.vid, usb_info.pid);
                        match &usb_info.manufacturer {
                            Some(mfg) => info.with_manufacturer(mfg),
                            None => info,
                        }
                    }
                    _ => info,
                }
            })
            .collect()),
        Err(e) => {
            tracing::error!("Failed to enumerate serial ports: {}", e);
            Err(Error::other(format!("Failed to enumerate ports: {}", e)))
        }
    }
}

fn is_valid_cnc_port(port_name: &str) -> bool {
    if let Some(number) = port_name.strip_prefix("COM") {
        return !number.is_empty() && number.chars().all(|c| c.is_ascii_digit());
    }

    port_name.starts_with("/dev/ttyUSB")
        || port_name.starts_with("/dev/ttyACM")
        || port_name.starts_with("/dev/cu.usbserial-")
        || port_name.starts_with("/dev/cu.usbmodem")
}

fn port_description(port: &serialport::SerialPortInfo) -> String {
    match &port.port_type {
        serialport::SerialPortType::UsbPort(usb_info) => format!(
            "USB {} {}",
            usb_info.manufacturer.as_deref().unwrap_or("Device"),
            usb_info.product.as_deref().unwrap_or("Serial Port")
        ),
        serialport::SerialPortType::BluetoothPort => "Bluetooth Serial".to_string(),
        serialport::SerialPortType::PciPort => "PCI Serial".to_string(),
        _ => "Serial Port".to_string(),
    }
}

/// Serial port link to a GRBL controller
pub struct SerialLink {
    port: Box<dyn serialport::SerialPort>,
    name: String,
}

impl SerialLink {
    /// Open the port described by `params`
    pub fn open(params: &ConnectionParams) -> Result<Self> {
        params.validate()?;

        let port = serialport::new(&params.port, params.baud_rate)
            .data_bits(serialport::DataBits::Eight)
            .parity(serialport::Parity::None)
            .stop_bits(serialport::StopBits::One)
            .flow_control(serialport::FlowControl::None)
            .timeout(params.timeout())
            .open()
            .map_err(|e| {
                tracing::warn!("Failed to open serial port {}: {}", params.port, e);
                ConnectionError::FailedToOpen {
                    port: params.port.clone(),
                    reason: e.to_string(),
                }
            })?;

        tracing::info!("Opened {} at {} baud", params.port, params.baud_rate);
        Ok(Self {
            port,
            name: params.port.clone(),
        })
    }
}

impl Link for SerialLink {
    fn name(&self) -> String {
        self.name.clone()
    }

    fn write(&mut self, data: &[u8]) -> io::Result<()> {
        self.port.write_all(data)?;
        self.port.flush()
    }

    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self.port.read(buf) {
            Ok(n) => Ok(n),
            Err(e) if e.kind() == io::ErrorKind::TimedOut => Ok(0),
            Err(e) => Err(e),
        }
    }

    fn bytes_to_read(&mut self) -> io::Result<usize> {
        Ok(self.port.bytes_to_read()? as usize)
    }

    fn set_dtr(&mut self, level: bool) -> io::Result<()> {
        Ok(self.port.write_data_terminal_ready(level)?)
    }
}
