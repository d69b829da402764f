//! Barcode normalization.
//!
//! Scanner payloads embed the warehouse barcode as one of several GS1-style
//! segments, e.g. `(01)12345(21)6789`. Only the last `(digits)digits` segment
//! is meaningful; its two digit groups joined together form the barcode.

use regex::Regex;
use std::sync::OnceLock;

fn segment_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(r"\((\d+)\)(\d+)").ok())
        .as_ref()
}

/// Canonical form of a raw barcode.
///
/// Never fails: input without a `(digits)digits` segment is returned trimmed.
///
/// ```
/// use core_sync::barcode::normalize;
///
/// assert_eq!(normalize("(01)12345(21)6789"), "216789");
/// assert_eq!(normalize("  PLAINBARCODE "), "PLAINBARCODE");
/// ```
pub fn normalize(raw: &str) -> String {
    let Some(pattern) = segment_pattern() else {
        return raw.trim().to_string();
    };
    match pattern.captures_iter(raw).last() {
        Some(caps) => format!("{}{}", &caps[1], &caps[2]),
        None => raw.trim().to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_last_segment_wins() {
        assert_eq!(normalize("(01)12345(21)6789"), "216789");
        assert_eq!(normalize("(00)1(01)22(10)333"), "10333");
    }

    #[test]
    fn test_single_segment() {
        assert_eq!(normalize("(21)6789"), "216789");
    }

    #[test]
    fn test_plain_input_is_trimmed() {
        assert_eq!(normalize("PLAINBARCODE"), "PLAINBARCODE");
        assert_eq!(normalize("  SF1234567890\n"), "SF1234567890");
        assert_eq!(normalize(""), "");
    }

    #[test]
    fn test_malformed_segments_pass_through() {
        assert_eq!(normalize("(AB)123"), "(AB)123");
        assert_eq!(normalize("(12)"), "(12)");
        assert_eq!(normalize("()123"), "()123");
    }

    #[test]
    fn test_surrounding_noise_is_dropped() {
        assert_eq!(normalize("]C1(01)12345(21)6789\r"), "216789");
    }

    #[test]
    fn test_idempotent() {
        let inputs = [
            "(01)12345(21)6789",
            "PLAINBARCODE",
            "  spaced  ",
            "(AB)123",
            "(1)2",
            "",
            "x(01)9y",
        ];
        for input in inputs {
            let once = normalize(input);
            assert_eq!(normalize(&once), once, "input {:?}", input);
        }
    }
}
