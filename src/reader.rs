//! # Reader Module
//!
//! The background task that drains a serial session into the notification
//! sink. It never touches the manager's lock; it owns an `Arc` to the
//! session and a one-shot cancellation receiver, nothing else.

use std::io;
use std::sync::Arc;
use std::time::Duration;

use log::{debug, error, trace};
use tokio::sync::oneshot::{self, error::TryRecvError};
use tokio::task::JoinHandle;

use crate::notify::{Event, NotificationSink};
use crate::transport::TransportSession;

/// Upper bound on a single read, and so on how long a stop can take.
pub const READ_TIMEOUT: Duration = Duration::from_millis(100);

/// Size of the read buffer.
pub const READ_BUFFER_SIZE: usize = 1024;

/// Lifecycle of a [`ReadLoop`]. `Stopped` is terminal.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReadLoopState {
    Idle,
    Running,
    Stopped,
}

/// Handle to the read task for one session.
pub struct ReadLoop {
    state: ReadLoopState,
    cancel: Option<oneshot::Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl ReadLoop {
    pub fn new() -> Self {
        Self {
            state: ReadLoopState::Idle,
            cancel: None,
            handle: None,
        }
    }

    pub fn state(&self) -> ReadLoopState {
        self.state
    }

    pub fn is_running(&self) -> bool {
        self.state == ReadLoopState::Running
    }

    /// Spawn the read task. Only valid from `Idle`; returns false otherwise.
    pub fn start(
        &mut self,
        session: Arc<dyn TransportSession>,
        sink: Arc<dyn NotificationSink>,
    ) -> bool {
        if self.state != ReadLoopState::Idle {
            error!("Read loop already used, state {:?}", self.state);
            return false;
        }
        let (cancel_tx, cancel_rx) = oneshot::channel();
        self.cancel = Some(cancel_tx);
        self.handle = Some(tokio::spawn(run(session, sink, cancel_rx)));
        self.state = ReadLoopState::Running;
        true
    }

    /// Signal the task and wait for it to exit. Calling it again is a no-op.
    pub async fn stop(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            let _ = cancel.send(());
        }
        if let Some(handle) = self.handle.take() {
            if let Err(e) = handle.await {
                error!("Read loop ended abnormally: {}", e);
            }
        }
        self.state = ReadLoopState::Stopped;
    }
}

impl Default for ReadLoop {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for ReadLoop {
    fn drop(&mut self) {
        // Cannot join here; the task sees the signal before its next read.
        if let Some(cancel) = self.cancel.take() {
            let _ = cancel.send(());
        }
    }
}

async fn run(
    session: Arc<dyn TransportSession>,
    sink: Arc<dyn NotificationSink>,
    mut cancel: oneshot::Receiver<()>,
) {
    debug!("Read loop started on {}", session.describe());
    let mut buffer = vec![0u8; READ_BUFFER_SIZE];

    loop {
        if !matches!(cancel.try_recv(), Err(TryRecvError::Empty)) {
            break;
        }

        let result = tokio::select! {
            biased;
            _ = &mut cancel => break,
            result = session.read(&mut buffer, READ_TIMEOUT) => result,
        };

        match result {
            Ok(n) if n > 0 => {
                trace!("{} <- {}", session.describe(), hex::encode(&buffer[..n]));
                sink.notify(Event::Data(buffer[..n].to_vec()));
                continue;
            }
            Err(e) if e.kind() == io::ErrorKind::TimedOut => continue,
            Ok(_) => trace!("{}: empty read", session.describe()),
            Err(e) => trace!("{}: read error: {}", session.describe(), e),
        }

        // Errors and empty reads come back immediately; wait before retrying.
        tokio::select! {
            biased;
            _ = &mut cancel => break,
            _ = tokio::time::sleep(READ_TIMEOUT) => {}
        }
    }

    debug!("Read loop stopped on {}", session.describe());
}
