//! # Manager Module
//!
//! [`ConnectionManager`] owns at most one open session. Every operation that
//! touches the session runs under one async lock for its whole duration, so
//! connects, closes and writes never interleave. The serial read loop runs
//! outside that lock and is stopped before its session is closed.

use std::io;
use std::sync::Arc;

use log::{debug, info, trace, warn};
use tokio::sync::Mutex;

use crate::config::{ConnectionConfig, SerialConfig, TcpConfig, TransportKind, UdpConfig};
use crate::error::{LinkError, Result};
use crate::notify::{Event, NotificationSink};
use crate::ports::{PortEnumerator, SerialPortDescriptor, SystemPorts};
use crate::reader::ReadLoop;
use crate::transport::serial::approximated_settings;
use crate::transport::{Connector, SystemConnector, TransportSession};

/// State guarded by the manager lock.
#[derive(Default)]
struct Inner {
    active: Option<Arc<dyn TransportSession>>,
    /// Present only while `active` is a serial session being read.
    read_loop: Option<ReadLoop>,
}

/// Outcome of retiring the active session.
struct Retired {
    kind: TransportKind,
    name: String,
    closed: io::Result<()>,
}

impl Inner {
    fn active_kind(&self) -> Option<TransportKind> {
        self.active.as_ref().map(|s| s.kind())
    }

    /// Stop the read loop, then close and forget the active session.
    async fn retire(&mut self) -> Option<Retired> {
        if let Some(mut read_loop) = self.read_loop.take() {
            read_loop.stop().await;
        }
        let session = self.active.take()?;
        let closed = session.close().await;
        Some(Retired {
            kind: session.kind(),
            name: session.describe().to_string(),
            closed,
        })
    }
}

/// Single entry point for opening, writing to and closing a link.
pub struct ConnectionManager {
    inner: Mutex<Inner>,
    connector: Arc<dyn Connector>,
    ports: Arc<dyn PortEnumerator>,
    sink: Arc<dyn NotificationSink>,
}

impl ConnectionManager {
    /// Manager backed by real serial ports and sockets.
    pub fn new(sink: Arc<dyn NotificationSink>) -> Self {
        Self::with_parts(Arc::new(SystemConnector), Arc::new(SystemPorts), sink)
    }

    pub fn with_parts(
        connector: Arc<dyn Connector>,
        ports: Arc<dyn PortEnumerator>,
        sink: Arc<dyn NotificationSink>,
    ) -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
            connector,
            ports,
            sink,
        }
    }

    /// Open whichever transport `config` describes.
    pub async fn connect(&self, config: &ConnectionConfig) -> Result<()> {
        match config {
            ConnectionConfig::Serial(serial) => self.connect_serial(serial).await,
            ConnectionConfig::Tcp(tcp) => self.connect_tcp(tcp).await,
            ConnectionConfig::Udp(udp) => self.connect_udp(udp).await,
        }
    }

    /// Replace the active session with a serial port and start reading it.
    ///
    /// `serial:connected` is emitted before the read loop starts, so it
    /// always precedes the first `serial:data`.
    pub async fn connect_serial(&self, config: &SerialConfig) -> Result<()> {
        let mut inner = self.inner.lock().await;
        self.replace(&mut inner).await;

        for note in approximated_settings(config) {
            warn!("{}: {}", config.port_name, note);
        }
        let session = self.connector.open_serial(config).await?;
        info!("Serial port {} connected", session.describe());
        self.sink.notify(Event::Connected(session.describe().to_string()));

        let mut read_loop = ReadLoop::new();
        read_loop.start(session.clone(), self.sink.clone());
        inner.active = Some(session);
        inner.read_loop = Some(read_loop);
        Ok(())
    }

    /// Replace the active session with a TCP connection. Nothing reads it.
    pub async fn connect_tcp(&self, config: &TcpConfig) -> Result<()> {
        let mut inner = self.inner.lock().await;
        self.replace(&mut inner).await;
        let session = self.connector.open_tcp(config).await?;
        info!("TCP {} connected", session.describe());
        inner.active = Some(session);
        Ok(())
    }

    /// Replace the active session with a connected UDP socket. Nothing reads it.
    pub async fn connect_udp(&self, config: &UdpConfig) -> Result<()> {
        let mut inner = self.inner.lock().await;
        self.replace(&mut inner).await;
        let session = self.connector.open_udp(config).await?;
        info!("UDP {} connected", session.describe());
        inner.active = Some(session);
        Ok(())
    }

    /// Write to the active session, whatever it is.
    pub async fn write(&self, data: &[u8]) -> Result<()> {
        let inner = self.inner.lock().await;
        let session = inner.active.as_ref().ok_or(LinkError::NotConnected)?;
        Self::write_to(session.as_ref(), data).await
    }

    /// Write to the active session, which must be of kind `kind`
    /// (`"serial"`, `"tcp"` or `"udp"`).
    pub async fn send_data(&self, kind: &str, data: &[u8]) -> Result<()> {
        let requested: TransportKind = kind.parse()?;
        let inner = self.inner.lock().await;
        let session = inner.active.as_ref().ok_or(LinkError::NotConnected)?;
        if session.kind() != requested {
            return Err(LinkError::WrongTransport {
                requested: requested.to_string(),
                active: session.kind().to_string(),
            });
        }
        Self::write_to(session.as_ref(), data).await
    }

    /// Close the serial port. A no-op unless a serial session is active.
    pub async fn close_serial(&self) -> Result<()> {
        let mut inner = self.inner.lock().await;
        if inner.active_kind() != Some(TransportKind::Serial) {
            return Ok(());
        }
        self.close_active(&mut inner).await
    }

    /// Close the active session of any kind. A no-op when nothing is open.
    pub async fn disconnect(&self) -> Result<()> {
        let mut inner = self.inner.lock().await;
        self.close_active(&mut inner).await
    }

    /// Close everything, ignoring close errors. Used at shutdown.
    pub async fn close_all(&self) {
        let mut inner = self.inner.lock().await;
        if let Err(e) = self.close_active(&mut inner).await {
            warn!("Ignoring error during shutdown: {}", e);
        }
    }

    /// Serial ports present right now, with the open one flagged.
    ///
    /// Enumeration blocks, so it runs on the blocking pool before the lock is
    /// taken.
    pub async fn list_serial_ports(&self) -> Result<Vec<SerialPortDescriptor>> {
        let enumerator = self.ports.clone();
        let mut ports = tokio::task::spawn_blocking(move || enumerator.list())
            .await
            .map_err(LinkError::enumeration_failed)??;

        let inner = self.inner.lock().await;
        let open_port = inner
            .active
            .as_ref()
            .filter(|s| s.kind() == TransportKind::Serial)
            .map(|s| s.describe().to_string());
        for port in &mut ports {
            port.is_open = open_port.as_deref() == Some(port.name.as_str());
        }
        Ok(ports)
    }

    pub async fn is_connected(&self) -> bool {
        self.inner.lock().await.active.is_some()
    }

    pub async fn active_kind(&self) -> Option<TransportKind> {
        self.inner.lock().await.active_kind()
    }

    /// Device name or address of the active session.
    pub async fn active_description(&self) -> Option<String> {
        let inner = self.inner.lock().await;
        inner.active.as_ref().map(|s| s.describe().to_string())
    }

    /// Whether a read loop is running.
    pub async fn is_reading(&self) -> bool {
        let inner = self.inner.lock().await;
        inner.read_loop.as_ref().is_some_and(ReadLoop::is_running)
    }

    /// Close the previous session before opening a new one. Close errors are
    /// logged and dropped.
    async fn replace(&self, inner: &mut Inner) {
        if let Err(e) = self.close_active(inner).await {
            warn!("Ignoring error while replacing connection: {}", e);
        }
    }

    async fn close_active(&self, inner: &mut Inner) -> Result<()> {
        let Some(retired) = inner.retire().await else {
            debug!("Nothing to close");
            return Ok(());
        };
        info!("{} {} disconnected", retired.kind, retired.name);
        if retired.kind == TransportKind::Serial {
            self.sink.notify(Event::Disconnected);
        }
        retired.closed.map_err(LinkError::close_failed)
    }

    async fn write_to(session: &dyn TransportSession, data: &[u8]) -> Result<()> {
        trace!("{} -> {}", session.describe(), hex::encode(data));
        session
            .write(data)
            .await
            .map(|_| ())
            .map_err(LinkError::write_failed)
    }
}
