//! SparkFun geiger counter protocol facts.
//!
//! The stock-replacement firmware drives a SerLCD 2.5 panel over the same
//! UART the host reads: two 16-character lines, each prefixed with a two-byte
//! cursor-control sequence (`0xFE 0x80` for line one, `0xFE 0xC0` for line
//! two). Line one shows the current counts-per-second, which is the value
//! streamed here; line two shows a rolling counts-per-minute. The receive
//! side of the firmware understands two single-byte commands and sends no
//! acknowledgement for either.

/// Default serial device path.
pub const DEFAULT_PORT: &str = "/dev/ttyUSB0";

/// The firmware configures its UART as 9600 8N1.
pub const DEFAULT_BAUD: u32 = 9600;

/// Characters per LCD line, including the two cursor-control bytes.
pub const LCD_LINE_SIZE: usize = 18;

/// Number of LCD lines.
pub const LCD_LINE_COUNT: usize = 2;

/// Default read chunk: one full display refresh.
pub const DEFAULT_CHUNK: usize = LCD_LINE_SIZE * LCD_LINE_COUNT;

/// Zero all counters on the device.
pub const CMD_RESET: u8 = b'z';

/// Blink the activity LED ten times; useful as a link check.
pub const CMD_LAMP_TEST: u8 = b't';

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chunk_covers_one_display_refresh() {
        assert_eq!(DEFAULT_CHUNK, 36);
    }
}
