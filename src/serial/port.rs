//! Serial port configuration and session management.
//!
//! The session owns the only handle to the device. Opening converts the
//! command-line settings into what the serial layer supports; settings the
//! layer cannot express (mark/space parity, 1.5 stop bits, odd data-bit
//! counts) are surfaced as an open failure rather than rejected up front.

use std::io::{self, Read, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use clap::ValueEnum;
use colored::Colorize;
use log::debug;
use serialport::{DataBits, FlowControl, SerialPort};
use thiserror::Error;

use crate::device;

/// Upper bound on a single blocking wait inside [`SerialConnection::read_chunk`];
/// bounds how long a cleared running flag or an expired deadline can go
/// unnoticed.
const POLL_INTERVAL: Duration = Duration::from_millis(200);

/// Errors from the port session.
#[derive(Debug, Error)]
pub enum PortError {
    /// The device could not be opened with the requested settings.
    #[error("open failed")]
    Open(#[from] serialport::Error),

    /// I/O failure while reading from an open port.
    #[error("read failed")]
    Read(#[source] io::Error),

    /// I/O failure while writing to an open port or to the output stream.
    #[error("write failed")]
    Write(#[source] io::Error),
}

/// Parity accepted on the command line.
///
/// The serial layer supports a subset; the rest fail at open time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Parity {
    None,
    Even,
    Odd,
    Mark,
    Space,
}

impl Parity {
    fn to_serial(self) -> Result<serialport::Parity, serialport::Error> {
        match self {
            Parity::None => Ok(serialport::Parity::None),
            Parity::Even => Ok(serialport::Parity::Even),
            Parity::Odd => Ok(serialport::Parity::Odd),
            Parity::Mark => Err(unsupported("mark parity")),
            Parity::Space => Err(unsupported("space parity")),
        }
    }
}

/// Stop bits accepted on the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum StopBits {
    #[value(name = "1")]
    One,
    #[value(name = "1.5")]
    OnePointFive,
    #[value(name = "2")]
    Two,
}

impl StopBits {
    fn to_serial(self) -> Result<serialport::StopBits, serialport::Error> {
        match self {
            StopBits::One => Ok(serialport::StopBits::One),
            StopBits::OnePointFive => Err(unsupported("1.5 stop bits")),
            StopBits::Two => Ok(serialport::StopBits::Two),
        }
    }
}

fn data_bits(bits: u8) -> Result<DataBits, serialport::Error> {
    match bits {
        5 => Ok(DataBits::Five),
        6 => Ok(DataBits::Six),
        7 => Ok(DataBits::Seven),
        8 => Ok(DataBits::Eight),
        other => Err(unsupported(&format!("{other} data bits"))),
    }
}

fn unsupported(what: &str) -> serialport::Error {
    serialport::Error::new(
        serialport::ErrorKind::InvalidInput,
        format!("{what} not supported by the serial layer"),
    )
}

/// Configuration for a serial port connection.
#[derive(Debug, Clone)]
pub struct PortConfig {
    /// Serial device path (e.g. /dev/ttyUSB0, /dev/ttyACM0)
    pub path: String,
    /// Baud rate (default: 9600, the geiger firmware's rate)
    pub baud_rate: u32,
    /// Data bits per character (default: 8)
    pub data_bits: u8,
    /// Parity (default: none)
    pub parity: Parity,
    /// Stop bits (default: 1)
    pub stop_bits: StopBits,
    /// Per-read timeout; `None` blocks until a full chunk arrives
    pub timeout: Option<Duration>,
}

impl Default for PortConfig {
    fn default() -> Self {
        Self {
            path: String::from(device::DEFAULT_PORT),
            baud_rate: device::DEFAULT_BAUD,
            data_bits: 8,
            parity: Parity::None,
            stop_bits: StopBits::One,
            timeout: None,
        }
    }
}

impl PortConfig {
    /// Create a new configuration with the device defaults.
    pub fn new(path: &str) -> Self {
        Self {
            path: path.to_string(),
            ..Default::default()
        }
    }

    /// Set the baud rate.
    pub fn with_baud_rate(mut self, baud_rate: u32) -> Self {
        self.baud_rate = baud_rate;
        self
    }

    /// Set the data bits per character.
    pub fn with_data_bits(mut self, data_bits: u8) -> Self {
        self.data_bits = data_bits;
        self
    }

    /// Set the parity mode.
    pub fn with_parity(mut self, parity: Parity) -> Self {
        self.parity = parity;
        self
    }

    /// Set the stop bits.
    pub fn with_stop_bits(mut self, stop_bits: StopBits) -> Self {
        self.stop_bits = stop_bits;
        self
    }

    /// Set the read timeout; `None` blocks.
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }
}

/// Exclusively-owned serial connection.
///
/// The underlying handle is closed when the connection is dropped, which
/// covers every exit path: normal loop exit, error propagation, and the
/// interrupt-triggered return.
pub struct SerialConnection {
    port: Box<dyn SerialPort>,
    config: PortConfig,
}

impl SerialConnection {
    /// Open a serial connection with the given configuration.
    pub fn open(config: PortConfig) -> Result<Self, PortError> {
        let data_bits = data_bits(config.data_bits)?;
        let parity = config.parity.to_serial()?;
        let stop_bits = config.stop_bits.to_serial()?;

        let port = serialport::new(&config.path, config.baud_rate)
            .data_bits(data_bits)
            .parity(parity)
            .stop_bits(stop_bits)
            .flow_control(FlowControl::None)
            .timeout(POLL_INTERVAL)
            .open()?;

        debug!(
            "opened {} ({} baud, {} data bits, {:?} parity)",
            config.path, config.baud_rate, config.data_bits, config.parity
        );

        Ok(Self { port, config })
    }

    /// Get the port configuration.
    pub fn config(&self) -> &PortConfig {
        &self.config
    }

    /// Write a single command byte to the device.
    ///
    /// Fire and forget; the firmware sends no acknowledgement.
    pub fn send_command(&mut self, command: u8) -> Result<(), PortError> {
        self.port.write_all(&[command]).map_err(PortError::Write)?;
        self.port.flush().map_err(PortError::Write)?;
        debug!("sent command {:?} to {}", command as char, self.config.path);
        Ok(())
    }

    /// Fill `buf` from the port, honoring the configured timeout.
    ///
    /// With a timeout the call returns once the buffer is full or the
    /// deadline passes, whichever comes first; a short or empty result is
    /// valid. Without a timeout the call blocks until the buffer is full,
    /// waiting in short internal intervals. Clearing `running` ends the call
    /// early with whatever has accumulated. Returns the number of bytes
    /// read.
    pub fn read_chunk(
        &mut self,
        buf: &mut [u8],
        running: &AtomicBool,
    ) -> Result<usize, PortError> {
        let deadline = self.config.timeout.map(|t| Instant::now() + t);
        let mut filled = 0;

        while filled < buf.len() && running.load(Ordering::SeqCst) {
            let wait = match deadline {
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        break;
                    }
                    (deadline - now).min(POLL_INTERVAL)
                }
                None => POLL_INTERVAL,
            };
            self.port
                .set_timeout(wait)
                .map_err(|e| PortError::Read(e.into()))?;

            match self.port.read(&mut buf[filled..]) {
                Ok(0) => {
                    // The port claimed readiness and delivered nothing; a
                    // disconnected USB adapter looks like this.
                    return Err(PortError::Read(io::Error::new(
                        io::ErrorKind::UnexpectedEof,
                        "device reported readiness but returned no data",
                    )));
                }
                Ok(n) => filled += n,
                Err(e) if e.kind() == io::ErrorKind::TimedOut => continue,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(PortError::Read(e)),
            }
        }

        Ok(filled)
    }
}

/// Print available serial ports to stderr with USB metadata.
///
/// stderr keeps stdout clean for the reading stream even when listing.
pub fn print_ports() -> Result<(), serialport::Error> {
    let ports = serialport::available_ports()?;

    if ports.is_empty() {
        eprintln!("{}", "No serial ports found".yellow());
        eprintln!("\n{}", "Troubleshooting tips:".cyan().bold());
        eprintln!("  1. Connect the geiger counter's USB-to-serial adapter");
        eprintln!("  2. Check the device node: ls -la /dev/ttyUSB* /dev/ttyACM*");
        eprintln!("  3. Add your user to the 'dialout' group: sudo usermod -aG dialout $USER");
        eprintln!("  4. Check dmesg for connection events: dmesg | tail -20");
        return Ok(());
    }

    eprintln!("{}", "Available serial ports:".green().bold());

    for port in ports {
        eprintln!("\n{}: {}", "Port".cyan(), port.port_name.white().bold());
        match port.port_type {
            serialport::SerialPortType::UsbPort(usb) => {
                eprintln!("  Type: USB serial");
                if let Some(ref mfg) = usb.manufacturer {
                    eprintln!("  Manufacturer: {mfg}");
                }
                if let Some(ref product) = usb.product {
                    eprintln!("  Product: {product}");
                }
                eprintln!("  VID:PID: {:04x}:{:04x}", usb.vid, usb.pid);
            }
            serialport::SerialPortType::PciPort => eprintln!("  Type: PCI serial"),
            serialport::SerialPortType::BluetoothPort => eprintln!("  Type: Bluetooth"),
            serialport::SerialPortType::Unknown => eprintln!("  Type: Unknown"),
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_matches_device() {
        let config = PortConfig::default();
        assert_eq!(config.path, "/dev/ttyUSB0");
        assert_eq!(config.baud_rate, 9600);
        assert_eq!(config.data_bits, 8);
        assert_eq!(config.parity, Parity::None);
        assert_eq!(config.stop_bits, StopBits::One);
        assert!(config.timeout.is_none());
    }

    #[test]
    fn config_builder() {
        let config = PortConfig::new("/dev/ttyACM0")
            .with_baud_rate(19200)
            .with_data_bits(7)
            .with_parity(Parity::Even)
            .with_stop_bits(StopBits::Two)
            .with_timeout(Some(Duration::from_secs(1)));

        assert_eq!(config.path, "/dev/ttyACM0");
        assert_eq!(config.baud_rate, 19200);
        assert_eq!(config.data_bits, 7);
        assert_eq!(config.parity, Parity::Even);
        assert_eq!(config.stop_bits, StopBits::Two);
        assert_eq!(config.timeout, Some(Duration::from_secs(1)));
    }

    #[test]
    fn supported_parity_converts() {
        assert_eq!(Parity::None.to_serial().unwrap(), serialport::Parity::None);
        assert_eq!(Parity::Even.to_serial().unwrap(), serialport::Parity::Even);
        assert_eq!(Parity::Odd.to_serial().unwrap(), serialport::Parity::Odd);
    }

    #[test]
    fn unsupported_parity_fails_at_conversion() {
        assert!(Parity::Mark.to_serial().is_err());
        assert!(Parity::Space.to_serial().is_err());
    }

    #[test]
    fn stop_bits_convert() {
        assert_eq!(
            StopBits::One.to_serial().unwrap(),
            serialport::StopBits::One
        );
        assert_eq!(
            StopBits::Two.to_serial().unwrap(),
            serialport::StopBits::Two
        );
        assert!(StopBits::OnePointFive.to_serial().is_err());
    }

    #[test]
    fn data_bits_range() {
        for bits in 5u8..=8 {
            assert!(data_bits(bits).is_ok());
        }
        assert!(data_bits(4).is_err());
        assert!(data_bits(9).is_err());
    }

    #[test]
    fn read_error_keeps_the_cause_in_the_chain() {
        let err = PortError::Read(io::Error::new(io::ErrorKind::UnexpectedEof, "gone"));
        assert_eq!(err.to_string(), "read failed");
        let source = std::error::Error::source(&err).expect("source");
        assert_eq!(source.to_string(), "gone");
    }
}
