//! Count extraction from raw device chunks.
//!
//! Chunks arrive as LCD refresh text interleaved with SerLCD cursor-control
//! bytes. Decoding keeps ASCII only, so the control bytes (`0xFE`, `0x80`,
//! `0xC0`) vanish before tokenization; ASCII control characters survive the
//! decode and are eliminated by the whitespace split and digit filter
//! instead.

/// Decode a raw chunk, keeping ASCII bytes and silently dropping the rest.
pub fn ascii_text(raw: &[u8]) -> String {
    raw.iter()
        .copied()
        .filter(u8::is_ascii)
        .map(char::from)
        .collect()
}

/// Parse the first whitespace-delimited token made entirely of decimal
/// digits.
///
/// Tokens with signs, decimal points, or any stray character never qualify.
/// Additional qualifying tokens in the same chunk are discarded; a digit run
/// too large for `u64` is skipped like a non-qualifying token.
pub fn first_count(text: &str) -> Option<u64> {
    text.split_whitespace()
        .filter(|token| token.chars().all(|c| c.is_ascii_digit()))
        .find_map(|token| token.parse().ok())
}

/// Extract the first count reading from a raw chunk, if any.
pub fn extract_count(raw: &[u8]) -> Option<u64> {
    first_count(&ascii_text(raw))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn drops_non_ascii_bytes() {
        assert_eq!(ascii_text(b"\xFE\x80 12 c/s"), " 12 c/s");
    }

    #[test]
    fn token_between_control_bytes() {
        assert_eq!(extract_count(b"\x02 045 \x03"), Some(45));
    }

    #[test]
    fn chunk_without_digit_token() {
        assert_eq!(extract_count(b"CPM\n"), None);
    }

    #[test]
    fn empty_chunk() {
        assert_eq!(extract_count(b""), None);
    }

    #[test]
    fn first_of_two_qualifying_tokens_wins() {
        assert_eq!(extract_count(b"012 099"), Some(12));
    }

    #[test]
    fn signed_and_decimal_tokens_never_qualify() {
        assert_eq!(first_count("-12 3.5"), None);
        assert_eq!(first_count("-12 3.5 7"), Some(7));
    }

    #[test]
    fn digits_glued_to_text_do_not_qualify() {
        assert_eq!(first_count("12c/s 34"), Some(34));
    }

    #[test]
    fn full_display_refresh() {
        // Both LCD lines as the firmware formats them; line one carries the
        // counts-per-second value.
        let chunk = b"\xFE\x80 7 c/s (max 12)  \xFE\xC0 310 c/m (max 400)";
        assert_eq!(extract_count(chunk), Some(7));
    }

    #[test]
    fn oversized_digit_run_is_skipped() {
        assert_eq!(first_count("99999999999999999999999999 5"), Some(5));
    }
}
