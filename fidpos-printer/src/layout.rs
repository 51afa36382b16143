//! Column layout helpers for fixed-width receipt paper
//!
//! Receipt paper is measured in character columns (32 for 58mm paper,
//! 48 for 80mm). These helpers size, truncate and pad text to column
//! widths so item names and amounts line up.

/// Column width of a string.
///
/// Receipts are plain ASCII/Latin text, so one char is one column.
pub fn text_width(s: &str) -> usize {
    s.chars().count()
}

/// Truncate a string to fit within a column width
pub fn truncate_text(s: &str, max_width: usize) -> String {
    s.chars().take(max_width).collect()
}

/// Pad a string to a specific column width
///
/// If the string is longer than the width, it will be truncated.
pub fn pad_text(s: &str, width: usize, align_right: bool) -> String {
    let current_width = text_width(s);
    if current_width >= width {
        return truncate_text(s, width);
    }
    let spaces = width - current_width;
    if align_right {
        format!("{}{}", " ".repeat(spaces), s)
    } else {
        format!("{}{}", s, " ".repeat(spaces))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn width_counts_chars() {
        assert_eq!(text_width("Soap 200g"), 9);
        assert_eq!(text_width(""), 0);
    }

    #[test]
    fn truncate_respects_width() {
        assert_eq!(truncate_text("Sunlight Soap", 8), "Sunlight");
        assert_eq!(truncate_text("abc", 10), "abc");
    }

    #[test]
    fn pad_left_and_right() {
        assert_eq!(pad_text("abc", 6, false), "abc   ");
        assert_eq!(pad_text("abc", 6, true), "   abc");
        // Longer than width -> truncated
        assert_eq!(pad_text("abcdef", 4, false), "abcd");
    }
}
