use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use log::{error, info};
use tokio::io::{AsyncWriteExt, ReadHalf, WriteHalf};
use tokio::sync::Mutex;
use tokio_serial::SerialPortBuilderExt;
pub use tokio_serial::{DataBits, Parity, SerialStream, StopBits};

use super::{TransportSession, closed_error, read_with_timeout};
use crate::config::{FlowControlSetting, SerialConfig, TransportKind};
use crate::error::{LinkError, Result};
use crate::reader::READ_TIMEOUT;

/// An open serial port.
///
/// The stream is split so a read that is waiting on the device never holds
/// up a write.
pub struct SerialSession {
    port_name: String,
    reader: Mutex<Option<ReadHalf<SerialStream>>>,
    writer: Mutex<Option<WriteHalf<SerialStream>>>,
    open: AtomicBool,
}

impl SerialSession {
    /// Open the port described by `config`.
    ///
    /// Flow control is not passed to the driver; the port always opens with
    /// flow control off.
    pub fn open(config: &SerialConfig) -> Result<Self> {
        let stream = tokio_serial::new(config.port_name.as_str(), config.baud_rate)
            .data_bits(data_bits(config.data_bits))
            .stop_bits(stop_bits(&config.stop_bits))
            .parity(parity(&config.parity))
            .timeout(READ_TIMEOUT)
            .open_native_async()
            .map_err(|e| {
                error!("Failed to open serial port {}: {}", config.port_name, e);
                LinkError::open_failed(&config.port_name, e)
            })?;
        info!(
            "Opened serial port {} at {} baud ({}{}{})",
            config.port_name, config.baud_rate, config.data_bits, config.parity, config.stop_bits
        );

        let (reader, writer) = tokio::io::split(stream);
        Ok(Self {
            port_name: config.port_name.clone(),
            reader: Mutex::new(Some(reader)),
            writer: Mutex::new(Some(writer)),
            open: AtomicBool::new(true),
        })
    }
}

#[async_trait]
impl TransportSession for SerialSession {
    fn kind(&self) -> TransportKind {
        TransportKind::Serial
    }

    fn describe(&self) -> &str {
        &self.port_name
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
        writer.flush().await?;
        Ok(data.len())
    }

    async fn close(&self) -> io::Result<()> {
        if !self.open.swap(false, Ordering::AcqRel) {
            return Ok(());
        }
        // The port is released once both halves are dropped.
        let writer = self.writer.lock().await.take();
        let reader = self.reader.lock().await.take();
        let result = match writer {
            Some(mut writer) => writer.flush().await,
            None => Ok(()),
        };
        drop(reader);
        info!("Closed serial port {}", self.port_name);
        result
    }
}

/// Convert a data bits count to the driver constant. Anything outside 5..=7
/// is eight bits.
pub fn data_bits(bits: u8) -> DataBits {
    match bits {
        5 => DataBits::Five,
        6 => DataBits::Six,
        7 => DataBits::Seven,
        _ => DataBits::Eight,
    }
}

/// Convert a stop bits string (`"1"`, `"1.5"`, `"2"`) to the driver constant.
///
/// The driver has no 1.5 stop bit mode, so `"1.5"` opens with two. Anything
/// unrecognized is one stop bit.
pub fn stop_bits(s: &str) -> StopBits {
    match s.trim() {
        "1.5" | "2" => StopBits::Two,
        _ => StopBits::One,
    }
}

/// Convert a parity letter (`N`, `O`, `E`, `M`, `S`) to the driver constant.
///
/// Mark and space parity are not available from the driver and open as no
/// parity, as does anything unrecognized.
pub fn parity(s: &str) -> Parity {
    match s.trim().to_ascii_uppercase().as_str() {
        "O" => Parity::Odd,
        "E" => Parity::Even,
        _ => Parity::None,
    }
}

/// Settings in `config` that the port cannot honour exactly, for logging.
pub fn approximated_settings(config: &SerialConfig) -> Vec<String> {
    let mut notes = Vec::new();
    if config.stop_bits.trim() == "1.5" {
        notes.push("1.5 stop bits opened as 2".to_string());
    }
    match config.parity.trim().to_ascii_uppercase().as_str() {
        "M" => notes.push("mark parity opened as none".to_string()),
        "S" => notes.push("space parity opened as none".to_string()),
        _ => {}
    }
    if config.flow_control() != FlowControlSetting::None {
        notes.push(format!("flow control '{}' is not applied", config.flow_control));
    }
    notes
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_data_bits_mapping() {
        assert_eq!(data_bits(5), DataBits::Five);
        assert_eq!(data_bits(6), DataBits::Six);
        assert_eq!(data_bits(7), DataBits::Seven);
        assert_eq!(data_bits(8), DataBits::Eight);
        assert_eq!(data_bits(9), DataBits::Eight);
        assert_eq!(data_bits(0), DataBits::Eight);
    }

    #[test]
    fn test_stop_bits_mapping() {
        assert_eq!(stop_bits("1"), StopBits::One);
        assert_eq!(stop_bits("1.5"), StopBits::Two);
        assert_eq!(stop_bits("2"), StopBits::Two);
        assert_eq!(stop_bits(""), StopBits::One);
        assert_eq!(stop_bits("3"), StopBits::One);
    }

    #[test]
    fn test_parity_mapping() {
        assert_eq!(parity("N"), Parity::None);
        assert_eq!(parity("O"), Parity::Odd);
        assert_eq!(parity("E"), Parity::Even);
        assert_eq!(parity("e"), Parity::Even);
        assert_eq!(parity("M"), Parity::None);
        assert_eq!(parity("S"), Parity::None);
        assert_eq!(parity("odd"), Parity::None);
    }

    #[test]
    fn test_approximated_settings() {
        assert!(approximated_settings(&SerialConfig::new("COM3", 9600)).is_empty());

        let config = SerialConfig {
            stop_bits: "1.5".into(),
            parity: "M".into(),
            flow_control: "hardware".into(),
            ..SerialConfig::new("COM3", 9600)
        };
        let notes = approximated_settings(&config);
        assert_eq!(notes.len(), 3);
        assert!(notes[0].contains("1.5"));
        assert!(notes[1].contains("mark"));
        assert!(notes[2].contains("hardware"));
    }

    #[tokio::test]
    async fn test_open_missing_device_fails() {
        let config = SerialConfig::new("/dev/embedpost-no-such-port", 9600);
        match SerialSession::open(&config) {
            Err(LinkError::OpenFailed { target, .. }) => {
                assert_eq!(target, "/dev/embedpost-no-such-port")
            }
            Err(other) => panic!("unexpected error: {other}"),
            Ok(_) => panic!("opening a missing device should fail"),
        }
    }
}
