//! # Embedpost
//!
//! Connection core for a serial/TCP/UDP debugging tool.
//!
//! A [`ConnectionManager`](manager::ConnectionManager) owns exactly one open
//! link at a time. Serial ports get a background read loop that pushes every
//! received chunk to a [`NotificationSink`](notify::NotificationSink); TCP and
//! UDP links are write-only from the manager's point of view.
//!
//! ## Architecture
//!
//! - [`transport`]: one session type per medium behind a common trait
//! - [`ports`]: serial port enumeration
//! - [`reader`]: the cancellable serial read loop
//! - [`manager`]: the single entry point, serializing connect/write/close
//! - [`notify`]: events and sinks
//! - [`config`]: connection settings and profiles
//! - [`error`]: custom error types for the crate

pub mod config;
pub mod error;
pub mod manager;
pub mod notify;
pub mod ports;
pub mod reader;
pub mod transport;

/// Re-exports for convenience
pub mod prelude {
    pub use crate::config::{ConnectionConfig, SerialConfig, TcpConfig, TransportKind, UdpConfig};
    pub use crate::error::*;
    pub use crate::manager::ConnectionManager;
    pub use crate::notify::{ChannelSink, Event, LogSink, NotificationSink};
    pub use crate::ports::SerialPortDescriptor;
}
