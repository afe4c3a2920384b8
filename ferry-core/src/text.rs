//! Bounded text helpers for logs and record fields

/// Length of the correlation ids attached to log lines
pub const CORRELATION_LEN: usize = 12;

/// Truncates `s` to at most `max` characters, appending `...` when cut
pub fn clip(s: &str, max: usize) -> String {
    match s.char_indices().nth(max) {
        Some((idx, _)) => format!("{}...", &s[..idx]),
        None => s.to_string(),
    }
}

/// Lossy UTF-8 view of a payload, clipped to `max` characters
pub fn clip_bytes(bytes: &[u8], max: usize) -> String {
    clip(&String::from_utf8_lossy(bytes), max)
}

/// Fresh short hex id tying together the log lines of one call
pub fn correlation_id() -> String {
    let mut id = uuid::Uuid::new_v4().simple().to_string();
    id.truncate(CORRELATION_LEN);
    id
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clip_leaves_short_text_alone() {
        assert_eq!(clip("hello", 5), "hello");
        assert_eq!(clip("", 3), "");
    }

    #[test]
    fn test_clip_cuts_on_char_boundaries() {
        assert_eq!(clip("hello world", 5), "hello...");
        assert_eq!(clip("ééééé", 2), "éé...");
    }

    #[test]
    fn test_correlation_ids_are_short_hex() {
        let id = correlation_id();
        assert_eq!(id.len(), CORRELATION_LEN);
        assert!(id.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(id, correlation_id());
    }

    #[test]
    fn test_clip_bytes_tolerates_invalid_utf8() {
        assert_eq!(clip_bytes(&[0x61, 0xff, 0x62], 10), "a\u{fffd}b");
    }
}
