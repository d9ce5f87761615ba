use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use log::{error, info};
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::sync::Mutex;

use super::{TransportSession, closed_error, read_with_timeout};
use crate::config::TransportKind;
use crate::error::{LinkError, Result};

/// A TCP client connection.
pub struct TcpSession {
    address: String,
    reader: Mutex<Option<OwnedReadHalf>>,
    writer: Mutex<Option<OwnedWriteHalf>>,
    open: AtomicBool,
}

impl TcpSession {
    /// Dial `address` (`host:port`).
    pub async fn connect(address: &str) -> Result<Self> {
        let stream = TcpStream::connect(address).await.map_err(|e| {
            error!("TCP connect to {} failed: {}", address, e);
            LinkError::open_failed(address, e)
        })?;
        info!("Connected TCP {}", address);

        let (reader, writer) = stream.into_split();
        Ok(Self {
            address: address.to_string(),
            reader: Mutex::new(Some(reader)),
            writer: Mutex::new(Some(writer)),
            open: AtomicBool::new(true),
        })
    }
}

#[async_trait]
impl TransportSession for TcpSession {
    fn kind(&self) -> TransportKind {
        TransportKind::Tcp
    }

    fn describe(&self) -> &str {
        &self.address
    }

    fn is_open(&self) -> bool {
        self.open.load(Ordering::Acquire)
    }

    async fn read(&self, buf: &mut [u8], timeout: Duration) -> io::Result<usize> {
        let mut guard = self.reader.lock().await;
        let reader = guard.as_mut().ok_or_else(closed_error)?;
        read_with_timeout(reader, buf, timeout).await
    }

    async fn write(&self, data: &[u8]) -> io::Result<usize> {
        let mut guard = self.writer.lock().await;
        let writer = guard.as_mut().ok_or_else(closed_error)?;
        writer.write_all(data).await?;
        Ok(data.len())
    }

    async fn close(&self) -> io::Result<()> {
        if !self.open.swap(false, Ordering::AcqRel) {
            return Ok(());
        }
        let writer = self.writer.lock().await.take();
        self.reader.lock().await.take();
        let result = match writer {
            Some(mut writer) => writer.shutdown().await,
            None => Ok(()),
        };
        info!("Closed TCP {}", self.address);
        result
    }
}
