//! In-memory sessions and connector for tests.

use std::collections::{HashSet, VecDeque};
use std::io;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Notify;

use super::{Connector, TransportSession, closed_error};
use crate::config::{SerialConfig, TcpConfig, TransportKind, UdpConfig};
use crate::error::{LinkError, Result};

/// Shared, ordered record of what the fakes were asked to do.
#[derive(Clone, Debug, Default)]
pub struct Journal(Arc<Mutex<Vec<String>>>);

impl Journal {
    pub fn push(&self, entry: impl Into<String>) {
        self.0.lock().unwrap().push(entry.into());
    }

    pub fn entries(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }

    /// Index of the first entry equal to `entry`.
    pub fn position(&self, entry: &str) -> Option<usize> {
        self.entries().iter().position(|e| e == entry)
    }

    /// Index of the last entry equal to `entry`.
    pub fn last_position(&self, entry: &str) -> Option<usize> {
        self.entries().iter().rposition(|e| e == entry)
    }
}

/// A session whose incoming bytes are pushed by the test.
pub struct FakeSession {
    kind: TransportKind,
    name: String,
    journal: Journal,
    incoming: Mutex<VecDeque<Vec<u8>>>,
    arrived: Notify,
    written: Mutex<Vec<Vec<u8>>>,
    failing_reads: AtomicUsize,
    fail_writes: AtomicBool,
    fail_close: AtomicBool,
    at_eof: AtomicBool,
    close_delay: Mutex<Duration>,
    open: AtomicBool,
}

impl FakeSession {
    pub fn new(kind: TransportKind, name: &str, journal: Journal) -> Self {
        Self {
            kind,
            name: name.to_string(),
            journal,
            incoming: Mutex::new(VecDeque::new()),
            arrived: Notify::new(),
            written: Mutex::new(Vec::new()),
            failing_reads: AtomicUsize::new(0),
            fail_writes: AtomicBool::new(false),
            fail_close: AtomicBool::new(false),
            at_eof: AtomicBool::new(false),
            close_delay: Mutex::new(Duration::ZERO),
            open: AtomicBool::new(true),
        }
    }

    pub fn serial(name: &str, journal: Journal) -> Self {
        Self::new(TransportKind::Serial, name, journal)
    }

    /// Queue bytes for the next read.
    pub fn push_incoming(&self, data: &[u8]) {
        self.incoming.lock().unwrap().push_back(data.to_vec());
        self.arrived.notify_one();
    }

    pub fn written(&self) -> Vec<Vec<u8>> {
        self.written.lock().unwrap().clone()
    }

    /// Make the next `count` reads fail immediately.
    pub fn fail_reads(&self, count: usize) {
        self.failing_reads.store(count, Ordering::SeqCst);
    }

    pub fn fail_writes(&self) {
        self.fail_writes.store(true, Ordering::SeqCst);
    }

    pub fn fail_close(&self) {
        self.fail_close.store(true, Ordering::SeqCst);
    }

    pub fn set_close_delay(&self, delay: Duration) {
        *self.close_delay.lock().unwrap() = delay;
    }

    /// Every read from now on returns zero bytes at once, like a hung-up device.
    pub fn eof(&self) {
        self.at_eof.store(true, Ordering::SeqCst);
    }

    fn pop_into(&self, buf: &mut [u8]) -> Option<usize> {
        let chunk = self.incoming.lock().unwrap().pop_front()?;
        let n = chunk.len().min(buf.len());
        buf[..n].copy_from_slice(&chunk[..n]);
        Some(n)
    }
}

#[async_trait]
impl TransportSession for FakeSession {
    fn kind(&self) -> TransportKind {
        self.kind
    }

    fn describe(&self) -> &str {
        &self.name
    }

    fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }

    async fn read(&self, buf: &mut [u8], timeout: Duration) -> io::Result<usize> {
        if !self.is_open() {
            return Err(closed_error());
        }
        self.journal.push(format!("read {}", self.name));
        let failing = self.failing_reads.load(Ordering::SeqCst);
        if failing > 0 {
            self.failing_reads.store(failing - 1, Ordering::SeqCst);
            return Err(io::Error::other("device glitch"));
        }
        if self.at_eof.load(Ordering::SeqCst) {
            return Ok(0);
        }
        if let Some(n) = self.pop_into(buf) {
            return Ok(n);
        }
        let _ = tokio::time::timeout(timeout, self.arrived.notified()).await;
        self.pop_into(buf)
            .ok_or_else(|| io::ErrorKind::TimedOut.into())
    }

    async fn write(&self, data: &[u8]) -> io::Result<usize> {
        if !self.is_open() {
            return Err(closed_error());
        }
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "device unplugged"));
        }
        self.written.lock().unwrap().push(data.to_vec());
        Ok(data.len())
    }

    async fn close(&self) -> io::Result<()> {
        if !self.open.swap(false, Ordering::SeqCst) {
            return Ok(());
        }
        self.journal.push(format!("close {}", self.name));
        let delay = *self.close_delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        self.journal.push(format!("closed {}", self.name));
        if self.fail_close.load(Ordering::SeqCst) {
            return Err(io::Error::other("close failed"));
        }
        Ok(())
    }
}

/// Hands out [`FakeSession`]s and remembers them.
#[derive(Default)]
pub struct FakeConnector {
    pub journal: Journal,
    sessions: Mutex<Vec<Arc<FakeSession>>>,
    unreachable: Mutex<HashSet<String>>,
    close_delay: Mutex<Duration>,
}

impl FakeConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Opening `target` will fail.
    pub fn make_unreachable(&self, target: &str) {
        self.unreachable.lock().unwrap().insert(target.to_string());
    }

    /// Every session opened from now on takes `delay` to close.
    pub fn set_close_delay(&self, delay: Duration) {
        *self.close_delay.lock().unwrap() = delay;
    }

    /// All sessions opened so far, oldest first.
    pub fn sessions(&self) -> Vec<Arc<FakeSession>> {
        self.sessions.lock().unwrap().clone()
    }

    /// The most recently opened session.
    pub fn last(&self) -> Arc<FakeSession> {
        self.sessions().last().cloned().expect("no session opened")
    }

    fn open(&self, kind: TransportKind, target: &str) -> Result<Arc<dyn TransportSession>> {
        if self.unreachable.lock().unwrap().contains(target) {
            return Err(LinkError::open_failed(target, "no such device"));
        }
        self.journal.push(format!("open {}", target));
        let session = Arc::new(FakeSession::new(kind, target, self.journal.clone()));
        session.set_close_delay(*self.close_delay.lock().unwrap());
        self.sessions.lock().unwrap().push(session.clone());
        Ok(session)
    }
}

#[async_trait]
impl Connector for FakeConnector {
    async fn open_serial(&self, config: &SerialConfig) -> Result<Arc<dyn TransportSession>> {
        self.open(TransportKind::Serial, &config.port_name)
    }

    async fn open_tcp(&self, config: &TcpConfig) -> Result<Arc<dyn TransportSession>> {
        self.open(TransportKind::Tcp, &config.address)
    }

    async fn open_udp(&self, config: &UdpConfig) -> Result<Arc<dyn TransportSession>> {
        self.open(TransportKind::Udp, &config.address)
    }
}
