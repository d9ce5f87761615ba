use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use log::{error, info, warn};
use tokio::io::{AsyncBufReadExt, BufReader};

use embedpost::prelude::*;

type AppResult<T> = std::result::Result<T, Box<dyn std::error::Error + Send + Sync>>;

/// Talk to a device over serial, TCP or UDP. Lines typed on stdin are sent,
/// received serial data is printed.
#[derive(Parser)]
#[command(name = "embedpost", version)]
struct Cli {
    /// Treat input lines as hex ("01 02 ff") and print received data as hex
    #[arg(long, global = true)]
    hex: bool,

    /// Append CR LF to every line sent
    #[arg(long, global = true)]
    crlf: bool,

    /// Write received events to the log instead of stdout
    #[arg(long, global = true)]
    log_events: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// List serial ports
    Ports,
    /// Open a serial port
    Serial {
        port: String,
        #[arg(short, long, default_value_t = 115200)]
        baud: u32,
        #[arg(long, default_value_t = 8)]
        data_bits: u8,
        /// 1, 1.5 or 2
        #[arg(long, default_value = "1")]
        stop_bits: String,
        /// N, O, E, M or S
        #[arg(long, default_value = "N")]
        parity: String,
        /// none, hardware or software
        #[arg(long, default_value = "none")]
        flow_control: String,
    },
    /// Connect to a TCP server
    Tcp { address: String },
    /// Send datagrams to a UDP peer
    Udp { address: String },
    /// Connect using a JSON profile
    Profile { path: PathBuf },
}

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    if let Err(e) = run(Cli::parse()).await {
        error!("{}", e);
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> AppResult<()> {
    let (channel_sink, mut events) = ChannelSink::new();
    let sink: Arc<dyn NotificationSink> = if cli.log_events {
        drop(channel_sink);
        Arc::new(LogSink)
    } else {
        Arc::new(channel_sink)
    };
    let manager = ConnectionManager::new(sink);

    let config = match cli.command {
        Command::Ports => {
            let ports = match manager.list_serial_ports().await {
                Ok(ports) => ports,
                Err(e) => {
                    warn!("{}, showing default ports", e);
                    fallback_ports()
                }
            };
            for port in ports {
                println!("{:<20} {}", port.name, port.description);
            }
            return Ok(());
        }
        Command::Serial {
            port,
            baud,
            data_bits,
            stop_bits,
            parity,
            flow_control,
        } => ConnectionConfig::Serial(SerialConfig {
            port_name: port,
            baud_rate: baud,
            data_bits,
            stop_bits,
            parity,
            flow_control,
        }),
        Command::Tcp { address } => ConnectionConfig::Tcp(TcpConfig::new(address)),
        Command::Udp { address } => ConnectionConfig::Udp(UdpConfig::new(address)),
        Command::Profile { path } => ConnectionConfig::load(path)?,
    };

    if let ConnectionConfig::Serial(serial) = &config {
        if !serial.has_common_baud_rate() {
            warn!("Unusual baud rate {}, opening anyway", serial.baud_rate);
        }
    }
    manager.connect(&config).await?;
    info!("Connected ({}), reading stdin; Ctrl-D to quit", config.kind());

    let hex_output = cli.hex;
    let printer = tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            print_event(&event, hex_output);
        }
    });

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let mut data = match encode_line(&line, cli.hex) {
            Ok(data) => data,
            Err(e) => {
                warn!("Not sent: {}", e);
                continue;
            }
        };
        if cli.crlf {
            data.extend_from_slice(b"\r\n");
        }
        if let Err(e) = manager.write(&data).await {
            error!("{}", e);
        }
    }

    manager.close_all().await;
    // Dropping the manager drops the last sink, which ends the printer.
    drop(manager);
    let _ = printer.await;
    Ok(())
}

/// Ports to offer when the system cannot be asked.
fn fallback_ports() -> Vec<SerialPortDescriptor> {
    let names: Vec<String> = if cfg!(windows) {
        (1..=4).map(|i| format!("COM{i}")).collect()
    } else {
        (0..4).map(|i| format!("/dev/ttyUSB{i}")).collect()
    };
    names
        .into_iter()
        .map(|name| SerialPortDescriptor::new(name.clone(), name))
        .collect()
}

/// Turn a typed line into bytes, either verbatim or as hex digits.
fn encode_line(line: &str, hex_input: bool) -> std::result::Result<Vec<u8>, hex::FromHexError> {
    if hex_input {
        let digits: String = line.chars().filter(|c| !c.is_whitespace()).collect();
        hex::decode(digits)
    } else {
        Ok(line.as_bytes().to_vec())
    }
}

fn print_event(event: &Event, hex_output: bool) {
    let time = chrono::Local::now().format("%H:%M:%S%.3f");
    match event {
        Event::Connected(port) => println!("[{}-{}] {}", time, event.topic(), port),
        Event::Disconnected => println!("[{}-{}]", time, event.topic()),
        Event::Data(data) if hex_output => {
            println!("[{}-{}] {}", time, event.topic(), hex::encode_upper(data))
        }
        Event::Data(data) => println!(
            "[{}-{}] {}",
            time,
            event.topic(),
            String::from_utf8_lossy(data)
        ),
    }
}
