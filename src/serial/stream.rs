//! Count streaming loop.
//!
//! Reads fixed-size chunks from the port, extracts the first count reading
//! of each chunk, and writes it as a line to stdout, flushed per line so a
//! downstream plotting pipe sees it without delay. Everything human-facing
//! goes to stderr.

use std::io::{self, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use colored::Colorize;
use log::{debug, trace, warn};

use crate::device;
use crate::readings;
use crate::serial::{PortConfig, PortError, SerialConnection};

/// Configuration for a streaming session.
#[derive(Debug, Clone)]
pub struct StreamConfig {
    /// Port configuration
    pub port_config: PortConfig,
    /// Bytes requested per read
    pub chunk_size: usize,
    /// Send the counter reset command after opening, before the first read
    pub reset_on_start: bool,
    /// Flash the device activity LED after opening
    pub lamp_test: bool,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            port_config: PortConfig::default(),
            chunk_size: device::DEFAULT_CHUNK,
            reset_on_start: false,
            lamp_test: false,
        }
    }
}

/// Streams count readings from an open port to stdout.
pub struct CountStreamer {
    config: StreamConfig,
    connection: Option<SerialConnection>,
    chunks_read: usize,
    readings_emitted: usize,
    running: Arc<AtomicBool>,
}

impl CountStreamer {
    /// Create a new streamer with the given configuration.
    pub fn new(config: StreamConfig) -> Self {
        Self {
            config,
            connection: None,
            chunks_read: 0,
            readings_emitted: 0,
            running: Arc::new(AtomicBool::new(true)),
        }
    }

    /// Get a clone of the running flag for the interrupt handler.
    pub fn running_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.running)
    }

    /// Open the port and send any requested startup commands.
    pub fn connect(&mut self) -> Result<(), PortError> {
        let mut connection = SerialConnection::open(self.config.port_config.clone())?;

        eprintln!(
            "{} Connected to {} at {} baud",
            "[OK]".green().bold(),
            connection.config().path.white().bold(),
            connection.config().baud_rate
        );

        if self.config.reset_on_start {
            connection.send_command(device::CMD_RESET)?;
            eprintln!("{} Counter reset sent", "[OK]".green().bold());
        }
        if self.config.lamp_test {
            connection.send_command(device::CMD_LAMP_TEST)?;
            eprintln!("{} Lamp test sent", "[OK]".green().bold());
        }

        self.connection = Some(connection);
        Ok(())
    }

    /// Run the reading loop until a port error or an interrupt.
    ///
    /// Line N of the output is always the value extracted from read N: the
    /// write and flush complete before the next read begins.
    pub fn start(&mut self) -> Result<(), PortError> {
        eprintln!(
            "{}",
            "--- Streaming counts (Ctrl+C to stop) ---".cyan().bold()
        );

        let mut chunk = vec![0u8; self.config.chunk_size];
        let stdout = io::stdout();
        let mut out = stdout.lock();

        while self.running.load(Ordering::SeqCst) {
            let connection = match self.connection.as_mut() {
                Some(connection) => connection,
                None => break,
            };

            let n = connection.read_chunk(&mut chunk, &self.running)?;
            if n == 0 {
                // Timed out with nothing to show; not an error
                continue;
            }
            self.chunks_read += 1;

            for line in hexdump::hexdump_iter(&chunk[..n]) {
                trace!("{line}");
            }

            match readings::extract_count(&chunk[..n]) {
                Some(count) => {
                    writeln!(out, "{count}").map_err(PortError::Write)?;
                    out.flush().map_err(PortError::Write)?;
                    self.readings_emitted += 1;
                }
                None => debug!("no reading in {n}-byte chunk"),
            }
        }

        self.print_summary();
        Ok(())
    }

    fn print_summary(&self) {
        eprintln!("\n{}", "--- Stream summary ---".cyan().bold());
        eprintln!("Chunks read: {}", self.chunks_read);
        eprintln!("Readings emitted: {}", self.readings_emitted);
    }
}

/// Run a streaming session with interrupt handling.
///
/// Ctrl+C clears the running flag; the loop drains out of its current read,
/// prints the summary, and drops the connection, so the handle is released
/// on interrupt exactly as on normal exit.
pub fn run_stream(config: StreamConfig) -> Result<(), PortError> {
    let mut streamer = CountStreamer::new(config);

    let running = streamer.running_flag();
    if let Err(e) = ctrlc::set_handler(move || {
        eprintln!("\n{}", "Stopping...".yellow());
        running.store(false, Ordering::SeqCst);
    }) {
        warn!("could not install interrupt handler: {e}");
    }

    streamer.connect()?;
    streamer.start()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_stream_config() {
        let config = StreamConfig::default();
        assert_eq!(config.chunk_size, 36);
        assert!(!config.reset_on_start);
        assert!(!config.lamp_test);
    }

    #[test]
    fn running_flag_is_shared() {
        let streamer = CountStreamer::new(StreamConfig::default());
        let flag = streamer.running_flag();
        assert!(streamer.running.load(Ordering::SeqCst));
        flag.store(false, Ordering::SeqCst);
        assert!(!streamer.running.load(Ordering::SeqCst));
    }
}
