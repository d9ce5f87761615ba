use log::{debug, warn};
use serde::Serialize;
use tokio_serial::{SerialPortType, available_ports};

use crate::error::{LinkError, Result};

/// One serial port as shown to the user.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SerialPortDescriptor {
    /// Device name, e.g. `COM3` or `/dev/ttyUSB0`.
    pub name: String,
    /// Best-effort description; the name itself when nothing better is known.
    pub description: String,
    /// Whether this is the port the manager currently has open.
    pub is_open: bool,
}

impl SerialPortDescriptor {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            is_open: false,
        }
    }
}

/// Lists the serial ports present right now.
#[cfg_attr(test, mockall::automock)]
pub trait PortEnumerator: Send + Sync {
    fn list(&self) -> Result<Vec<SerialPortDescriptor>>;
}

/// Asks the operating system on every call.
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemPorts;

impl PortEnumerator for SystemPorts {
    fn list(&self) -> Result<Vec<SerialPortDescriptor>> {
        let ports = available_ports().map_err(|e| {
            warn!("Error listing ports: {}", e);
            LinkError::enumeration_failed(e)
        })?;
        debug!("Found {} serial ports", ports.len());
        Ok(ports
            .into_iter()
            .map(|p| {
                let description = describe_port(&p.port_name, &p.port_type);
                SerialPortDescriptor::new(p.port_name, description)
            })
            .collect())
    }
}

/// Human readable description for a port.
pub fn describe_port(name: &str, port_type: &SerialPortType) -> String {
    match port_type {
        SerialPortType::UsbPort(usb) => usb_description(
            name,
            usb.vid,
            usb.pid,
            usb.manufacturer.as_deref(),
            usb.product.as_deref(),
        ),
        SerialPortType::PciPort => format!("{name} (PCI)"),
        SerialPortType::BluetoothPort => format!("{name} (Bluetooth)"),
        SerialPortType::Unknown => name.to_string(),
    }
}

fn usb_description(
    name: &str,
    vid: u16,
    pid: u16,
    manufacturer: Option<&str>,
    product: Option<&str>,
) -> String {
    let label = match (product, manufacturer) {
        (Some(product), _) if !product.is_empty() => product.to_string(),
        (_, Some(manufacturer)) if !manufacturer.is_empty() => manufacturer.to_string(),
        _ => name.to_string(),
    };
    format!("{label} (USB {vid:04X}:{pid:04X})")
}
