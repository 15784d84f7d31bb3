//! Size estimation utilities.
//!
//! Sizes are measured in characters (Unicode scalar values), not bytes, and
//! converted to tokens with a fixed characters-per-token ratio (4 by
//! default). The estimate only drives the compaction trigger, so it favors
//! predictability over precision.

/// Character length of a string.
pub fn char_len(text: &str) -> usize {
    text.chars().count()
}

/// Estimate the token count for a string. Rounds up.
pub fn estimate_tokens(text: &str, chars_per_token: usize) -> usize {
    let chars = char_len(text);
    if chars == 0 || chars_per_token == 0 {
        return 0;
    }
    chars.div_ceil(chars_per_token)
}

/// Whether `chars` crosses the threshold. Landing exactly on it does not.
pub fn exceeds_threshold(chars: usize, threshold_chars: usize) -> bool {
    chars > threshold_chars
}

/// The first `max_chars` characters of `text`.
pub fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((byte_idx, _)) => &text[..byte_idx],
        None => text,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_string_is_zero() {
        assert_eq!(estimate_tokens("", 4), 0);
    }

    #[test]
    fn four_chars_is_one_token() {
        assert_eq!(estimate_tokens("test", 4), 1);
    }

    #[test]
    fn five_chars_rounds_up() {
        assert_eq!(estimate_tokens("hello", 4), 2);
    }

    #[test]
    fn counts_chars_not_bytes() {
        assert_eq!(char_len("héllo"), 5);
        assert_eq!(estimate_tokens("éééé", 4), 1);
    }

    #[test]
    fn threshold_is_strict() {
        assert!(!exceeds_threshold(400, 400));
        assert!(exceeds_threshold(401, 400));
    }

    #[test]
    fn truncate_respects_char_boundaries() {
        assert_eq!(truncate_chars("héllo wörld", 7), "héllo w");
        assert_eq!(truncate_chars("short", 50), "short");
    }
}
