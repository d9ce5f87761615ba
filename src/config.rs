//! # Config Module
//!
//! Connection settings as they arrive from the front end. Field names follow
//! the camelCase JSON the UI sends; every field has a default so partial
//! settings still deserialize.

use std::fmt;
use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{LinkError, Result};

/// Baud rates offered by the front end. Other rates still open; the CLI
/// only warns about them.
pub const COMMON_BAUD_RATES: &[u32] = &[
    4800, 9600, 19200, 38400, 57600, 115200, 230400, 460800, 500000, 576000, 921600, 1000000,
    1500000, 2000000,
];

/// Serial port settings.
///
/// `stop_bits`, `parity` and `flow_control` stay as the raw strings the UI
/// sent. They are mapped to driver constants when the port is opened, and
/// anything unrecognized falls back to a default instead of failing.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SerialConfig {
    /// Device name, e.g. `COM3` or `/dev/ttyUSB0`.
    pub port_name: String,
    pub baud_rate: u32,
    /// 5, 6, 7 or 8.
    pub data_bits: u8,
    /// `"1"`, `"1.5"` or `"2"`.
    pub stop_bits: String,
    /// `"N"`, `"O"`, `"E"`, `"M"` or `"S"`.
    pub parity: String,
    /// `"none"`, `"hardware"` or `"software"`. Parsed but not applied to the port.
    pub flow_control: String,
}

impl SerialConfig {
    /// Settings for `port_name` at `baud_rate`, 8N1, no flow control.
    pub fn new(port_name: impl Into<String>, baud_rate: u32) -> Self {
        Self {
            port_name: port_name.into(),
            baud_rate,
            ..Self::default()
        }
    }

    /// Whether `baud_rate` is one of [`COMMON_BAUD_RATES`].
    pub fn has_common_baud_rate(&self) -> bool {
        COMMON_BAUD_RATES.contains(&self.baud_rate)
    }

    /// Flow control as requested by the caller.
    pub fn flow_control(&self) -> FlowControlSetting {
        FlowControlSetting::from_str_lossy(&self.flow_control)
    }
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            port_name: String::new(),
            baud_rate: 115200,
            data_bits: 8,
            stop_bits: "1".to_string(),
            parity: "N".to_string(),
            flow_control: "none".to_string(),
        }
    }
}

/// Requested flow control mode.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum FlowControlSetting {
    #[default]
    None,
    Hardware,
    Software,
}

impl FlowControlSetting {
    /// Unknown strings map to [`FlowControlSetting::None`].
    pub fn from_str_lossy(s: &str) -> Self {
        match s.to_ascii_lowercase().as_str() {
            "hardware" => Self::Hardware,
            "software" => Self::Software,
            _ => Self::None,
        }
    }
}

/// TCP client settings.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TcpConfig {
    /// `host:port`
    pub address: String,
}

impl TcpConfig {
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
        }
    }
}

/// UDP settings. The socket is connected to `address`; it never listens.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct UdpConfig {
    /// `host:port`
    pub address: String,
}

impl UdpConfig {
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
        }
    }
}

/// A complete connection profile, tagged by transport kind.
///
/// ```json
/// { "kind": "serial", "portName": "COM3", "baudRate": 9600 }
/// { "kind": "tcp", "address": "192.168.1.10:502" }
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum ConnectionConfig {
    Serial(SerialConfig),
    Tcp(TcpConfig),
    Udp(UdpConfig),
}

impl ConnectionConfig {
    /// Parse a profile from JSON text.
    pub fn from_json(text: &str) -> Result<Self> {
        serde_json::from_str(text).map_err(LinkError::invalid_config)
    }

    /// Read and parse a profile file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| LinkError::invalid_config(format!("{}: {e}", path.display())))?;
        Self::from_json(&text)
    }

    pub fn kind(&self) -> TransportKind {
        match self {
            Self::Serial(_) => TransportKind::Serial,
            Self::Tcp(_) => TransportKind::Tcp,
            Self::Udp(_) => TransportKind::Udp,
        }
    }
}

/// The medium behind a session.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    Serial,
    Tcp,
    Udp,
}

impl TransportKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Serial => "serial",
            Self::Tcp => "tcp",
            Self::Udp => "udp",
        }
    }
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransportKind {
    type Err = LinkError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "serial" => Ok(Self::Serial),
            "tcp" => Ok(Self::Tcp),
            "udp" => Ok(Self::Udp),
            other => Err(LinkError::UnknownTransportKind(other.to_string())),
        }
    }
}
