//! # Notify Module
//!
//! Events the link core reports to whatever is displaying it. Delivery is
//! fire-and-forget: a sink must never block the caller, because the read
//! loop calls it between reads.

use log::{debug, info};
use tokio::sync::mpsc;

/// Topic for a newly opened serial port. Payload is the device name.
pub const TOPIC_SERIAL_CONNECTED: &str = "serial:connected";
/// Topic for a closed serial port. No payload.
pub const TOPIC_SERIAL_DISCONNECTED: &str = "serial:disconnected";
/// Topic for bytes received from the serial port. Payload is the raw bytes.
pub const TOPIC_SERIAL_DATA: &str = "serial:data";

/// One notification.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Event {
    Connected(String),
    Disconnected,
    Data(Vec<u8>),
}

impl Event {
    pub fn topic(&self) -> &'static str {
        match self {
            Event::Connected(_) => TOPIC_SERIAL_CONNECTED,
            Event::Disconnected => TOPIC_SERIAL_DISCONNECTED,
            Event::Data(_) => TOPIC_SERIAL_DATA,
        }
    }

    /// Payload bytes, if the topic carries one.
    pub fn payload(&self) -> Option<&[u8]> {
        match self {
            Event::Connected(port) => Some(port.as_bytes()),
            Event::Disconnected => None,
            Event::Data(data) => Some(data),
        }
    }
}

/// Receives events from the connection manager and its read loop.
pub trait NotificationSink: Send + Sync {
    fn notify(&self, event: Event);
}

impl<F> NotificationSink for F
where
    F: Fn(Event) + Send + Sync,
{
    fn notify(&self, event: Event) {
        self(event)
    }
}

/// Forwards events into an unbounded channel.
#[derive(Clone, Debug)]
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<Event>,
}

impl ChannelSink {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<Event>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl NotificationSink for ChannelSink {
    fn notify(&self, event: Event) {
        if self.tx.send(event).is_err() {
            debug!("Event receiver dropped, discarding event");
        }
    }
}

/// Writes every event to the log.
#[derive(Clone, Copy, Debug, Default)]
pub struct LogSink;

impl NotificationSink for LogSink {
    fn notify(&self, event: Event) {
        match &event {
            Event::Connected(port) => info!("[{}] {}", event.topic(), port),
            Event::Disconnected => info!("[{}]", event.topic()),
            Event::Data(data) => info!("[{}] {}", event.topic(), hex::encode(data)),
        }
    }
}
