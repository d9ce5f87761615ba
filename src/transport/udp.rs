use std::io;
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use log::{error, info};
use tokio::net::{UdpSocket, lookup_host};
use tokio::sync::RwLock;

use super::{TransportSession, closed_error};
use crate::config::TransportKind;
use crate::error::{LinkError, Result};

/// A connected UDP socket. It only exchanges datagrams with the one peer.
pub struct UdpSession {
    address: String,
    socket: RwLock<Option<UdpSocket>>,
    open: AtomicBool,
}

impl UdpSession {
    /// Bind an ephemeral local port and connect it to `address` (`host:port`).
    pub async fn connect(address: &str) -> Result<Self> {
        let socket = Self::connect_socket(address).await.map_err(|e| {
            error!("UDP connect to {} failed: {}", address, e);
            LinkError::open_failed(address, e)
        })?;
        info!("Connected UDP {}", address);

        Ok(Self {
            address: address.to_string(),
            socket: RwLock::new(Some(socket)),
            open: AtomicBool::new(true),
        })
    }

    async fn connect_socket(address: &str) -> io::Result<UdpSocket> {
        let remote = lookup_host(address).await?.next().ok_or_else(|| {
            io::Error::new(io::ErrorKind::InvalidInput, "address resolved to nothing")
        })?;
        let local: SocketAddr = if remote.is_ipv4() {
            (Ipv4Addr::UNSPECIFIED, 0).into()
        } else {
            (Ipv6Addr::UNSPECIFIED, 0).into()
        };
        let socket = UdpSocket::bind(local).await?;
        socket.connect(remote).await?;
        Ok(socket)
    }
}

#[async_trait]
impl TransportSession for UdpSession {
    fn kind(&self) -> TransportKind {
        TransportKind::Udp
    }

    fn describe(&self) -> &str {
        &self.address
    }

    fn is_open(&self) -> bool {
        self.open.load(Ordering::Acquire)
    }

    async fn read(&self, buf: &mut [u8], timeout: Duration) -> io::Result<usize> {
        let guard = self.socket.read().await;
        let socket = guard.as_ref().ok_or_else(closed_error)?;
        match tokio::time::timeout(timeout, socket.recv(buf)).await {
            Ok(result) => result,
            Err(_) => Err(io::ErrorKind::TimedOut.into()),
        }
    }

    async fn write(&self, data: &[u8]) -> io::Result<usize> {
        let guard = self.socket.read().await;
        let socket = guard.as_ref().ok_or_else(closed_error)?;
        socket.send(data).await
    }

    async fn close(&self) -> io::Result<()> {
        if !self.open.swap(false, Ordering::AcqRel) {
            return Ok(());
        }
        self.socket.write().await.take();
        info!("Closed UDP {}", self.address);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_datagram_round_trip() {
        let peer = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let address = peer.local_addr().unwrap().to_string();

        let session = UdpSession::connect(&address).await.unwrap();
        assert_eq!(session.kind(), TransportKind::Udp);
        assert_eq!(session.write(&[0x01, 0x02]).await.unwrap(), 2);

        let mut buf = [0u8; 16];
        let (n, from) = peer.recv_from(&mut buf).await.unwrap();
        assert_eq!(&buf[..n], &[0x01, 0x02]);

        peer.send_to(b"ack", from).await.unwrap();
        let n = session.read(&mut buf, Duration::from_secs(1)).await.unwrap();
        assert_eq!(&buf[..n], b"ack");
    }

    #[tokio::test]
    async fn test_close_is_idempotent() {
        let peer = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let address = peer.local_addr().unwrap().to_string();
        let session = UdpSession::connect(&address).await.unwrap();

        session.close().await.unwrap();
        session.close().await.unwrap();
        assert!(!session.is_open());

        let mut buf = [0u8; 4];
        let err = session
            .read(&mut buf, Duration::from_millis(10))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotConnected);
    }

    #[tokio::test]
    async fn test_unresolvable_address() {
        let err = UdpSession::connect("not an address").await.err().unwrap();
        assert!(matches!(err, LinkError::OpenFailed { .. }));
    }
}
