//! # Transport Module
//!
//! One [`TransportSession`] per open channel, whatever the medium. Sessions
//! take `&self` everywhere so the manager and the read loop can share one
//! `Arc` without a common lock: each implementation keeps its read side and
//! write side behind separate locks.

pub mod serial;
pub mod tcp;
pub mod udp;

#[cfg(test)]
pub(crate) mod fake;

use std::io;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncReadExt};

use crate::config::{SerialConfig, TcpConfig, TransportKind, UdpConfig};
use crate::error::Result;

pub use serial::SerialSession;
pub use tcp::TcpSession;
pub use udp::UdpSession;

/// An open channel over one medium.
#[async_trait]
pub trait TransportSession: Send + Sync {
    /// Which medium this session runs over.
    fn kind(&self) -> TransportKind;

    /// Device name or remote address the session was opened with.
    fn describe(&self) -> &str;

    /// False once [`close`](TransportSession::close) has been called.
    fn is_open(&self) -> bool;

    /// Read at most `buf.len()` bytes, giving up after `timeout` with
    /// [`io::ErrorKind::TimedOut`].
    async fn read(&self, buf: &mut [u8], timeout: Duration) -> io::Result<usize>;

    /// Write all of `data`.
    async fn write(&self, data: &[u8]) -> io::Result<usize>;

    /// Release the handle. Calling it again is a no-op.
    async fn close(&self) -> io::Result<()>;
}

/// Opens sessions from connection settings.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn open_serial(&self, config: &SerialConfig) -> Result<Arc<dyn TransportSession>>;
    async fn open_tcp(&self, config: &TcpConfig) -> Result<Arc<dyn TransportSession>>;
    async fn open_udp(&self, config: &UdpConfig) -> Result<Arc<dyn TransportSession>>;
}

/// Opens real OS handles.
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemConnector;

#[async_trait]
impl Connector for SystemConnector {
    async fn open_serial(&self, config: &SerialConfig) -> Result<Arc<dyn TransportSession>> {
        Ok(Arc::new(SerialSession::open(config)?))
    }

    async fn open_tcp(&self, config: &TcpConfig) -> Result<Arc<dyn TransportSession>> {
        Ok(Arc::new(TcpSession::connect(&config.address).await?))
    }

    async fn open_udp(&self, config: &UdpConfig) -> Result<Arc<dyn TransportSession>> {
        Ok(Arc::new(UdpSession::connect(&config.address).await?))
    }
}

/// Error returned by reads and writes on a closed session.
pub(crate) fn closed_error() -> io::Error {
    io::Error::new(io::ErrorKind::NotConnected, "session is closed")
}

/// Read from a stream half, bounded by `timeout`.
pub(crate) async fn read_with_timeout<R>(
    reader: &mut R,
    buf: &mut [u8],
    timeout: Duration,
) -> io::Result<usize>
where
    R: AsyncRead + Unpin + ?Sized,
{
    match tokio::time::timeout(timeout, reader.read(buf)).await {
        Ok(result) => result,
        Err(_) => Err(io::ErrorKind::TimedOut.into()),
    }
}
