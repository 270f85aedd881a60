//! geiger-feed
//!
//! Read count data from a SparkFun geiger counter attached to a serial
//! port, strip the SerLCD control characters the firmware interleaves with
//! its display text, and write one counts-per-second integer per line to
//! stdout. Designed to sit in front of a live-plotting pipe; everything
//! human-facing goes to stderr so the pipe sees only data.
//!
//! # Usage
//!
//! ```bash
//! # Stream readings from the default port
//! geiger-feed
//!
//! # Live plot via feedgnuplot
//! geiger-feed -p /dev/ttyUSB0 | feedgnuplot --stream --lines
//!
//! # Zero the device counters before streaming
//! geiger-feed -z /dev/ttyUSB1
//!
//! # Give up on a silent device after half a second per read
//! geiger-feed -t 0.5
//!
//! # List candidate ports
//! geiger-feed --list-ports
//! ```

mod device;
mod readings;
mod serial;

use std::process;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use colored::Colorize;

use serial::{port, Parity, PortConfig, StopBits, StreamConfig};

/// Read data from a geiger counter and write it to stdout
#[derive(Parser)]
#[command(name = "geiger-feed")]
#[command(version)]
#[command(about = "Read count data from a geiger counter serial port and write it to stdout")]
struct Cli {
    /// Serial device to use (positional form; `--port` wins if both given)
    #[arg(value_name = "PORT")]
    port_pos: Option<String>,

    /// Serial device to use
    #[arg(short, long)]
    port: Option<String>,

    /// Baud rate for the port
    #[arg(short, long, default_value_t = device::DEFAULT_BAUD)]
    baud: u32,

    /// Port parity
    #[arg(long, value_enum, default_value = "none")]
    parity: Parity,

    /// Stop bits for the port
    #[arg(short, long, value_enum, default_value = "1")]
    stop: StopBits,

    /// Bits per character for the port
    #[arg(long, default_value_t = 8)]
    bits: u8,

    /// Number of characters to read per chunk
    #[arg(short, long, value_name = "N", default_value_t = device::DEFAULT_CHUNK as u64,
          value_parser = clap::value_parser!(u64).range(1..))]
    chars: u64,

    /// Read timeout in seconds; omit to block until a full chunk arrives
    #[arg(short, long, value_name = "SECONDS")]
    timeout: Option<f64>,

    /// Reset the geiger counter before starting
    #[arg(short = 'z', long)]
    reset: bool,

    /// Flash the device activity LED after opening (link check)
    #[arg(long)]
    lamp_test: bool,

    /// List available serial ports and exit
    #[arg(long)]
    list_ports: bool,

    /// Enable debug output
    #[arg(short, long)]
    verbose: bool,
}

impl Cli {
    fn resolve_port(&self) -> String {
        self.port
            .clone()
            .or_else(|| self.port_pos.clone())
            .unwrap_or_else(|| device::DEFAULT_PORT.to_string())
    }
}

fn main() {
    let cli = Cli::parse();

    let default_filter = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
        .init();

    if cli.list_ports {
        if let Err(e) = port::print_ports() {
            eprintln!("{} {}", "[ERROR]".red().bold(), e);
            process::exit(1);
        }
        return;
    }

    let path = cli.resolve_port();
    if let Err(e) = run(&cli, &path) {
        eprintln!("problem reading from port {path}: {e:#}");
        process::exit(1);
    }
}

fn run(cli: &Cli, path: &str) -> Result<()> {
    let timeout = cli
        .timeout
        .map(Duration::try_from_secs_f64)
        .transpose()
        .context("invalid timeout")?;

    let port_config = PortConfig::new(path)
        .with_baud_rate(cli.baud)
        .with_data_bits(cli.bits)
        .with_parity(cli.parity)
        .with_stop_bits(cli.stop)
        .with_timeout(timeout);

    let config = StreamConfig {
        port_config,
        chunk_size: cli.chars as usize,
        reset_on_start: cli.reset,
        lamp_test: cli.lamp_test,
    };

    serial::run_stream(config)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_is_well_formed() {
        Cli::command().debug_assert();
    }

    #[test]
    fn defaults_match_the_device() {
        let cli = Cli::parse_from(["geiger-feed"]);
        assert_eq!(cli.resolve_port(), "/dev/ttyUSB0");
        assert_eq!(cli.baud, 9600);
        assert_eq!(cli.parity, Parity::None);
        assert_eq!(cli.stop, StopBits::One);
        assert_eq!(cli.bits, 8);
        assert_eq!(cli.chars, 36);
        assert!(cli.timeout.is_none());
        assert!(!cli.reset);
    }

    #[test]
    fn flag_port_wins_over_positional() {
        let cli = Cli::parse_from(["geiger-feed", "-p", "/dev/ttyACM0", "/dev/ttyUSB1"]);
        assert_eq!(cli.resolve_port(), "/dev/ttyACM0");

        let cli = Cli::parse_from(["geiger-feed", "/dev/ttyUSB1"]);
        assert_eq!(cli.resolve_port(), "/dev/ttyUSB1");
    }

    #[test]
    fn fractional_stop_bits_parse() {
        let cli = Cli::parse_from(["geiger-feed", "-s", "1.5"]);
        assert_eq!(cli.stop, StopBits::OnePointFive);
    }

    #[test]
    fn zero_chunk_size_is_rejected() {
        assert!(Cli::try_parse_from(["geiger-feed", "-c", "0"]).is_err());
    }
}
