//! Pointer coordinate to character offset resolution.
//!
//! Platform hit-testing reports offsets *between* characters, which is off by
//! one whenever the pointer sits over the right half of a glyph. Rendered code
//! is monospace, so we instead walk the line with a virtual cursor, expanding
//! tabs to the next tab stop.

/// Monospace layout constants of a rendered code line.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LineMetrics {
    /// Advance of a single non-tab character, in pixels.
    pub character_width: f64,
    /// Tab stop interval, in characters.
    pub tab_size: u32,
}

impl LineMetrics {
    pub const fn new(
        character_width: f64,
        tab_size: u32,
    ) -> Self {
        Self {
            character_width,
            tab_size,
        }
    }

    fn tab_stop_width(&self) -> f64 {
        self.character_width * f64::from(self.tab_size.max(1))
    }

    fn is_usable(&self) -> bool {
        self.character_width.is_finite() && self.character_width > 0.0
    }
}

/// Screen geometry captured for one pointer event over one line.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct PointerSample {
    /// Pointer x in the same coordinate space as the `*_left` fields.
    pub client_x: f64,
    /// Left edge of the line container.
    pub line_left: f64,
    pub line_padding_left: f64,
    /// Left edge of the first text run inside the line.
    pub first_run_left: f64,
    pub first_run_padding_left: f64,
}

/// Horizontal pointer offset relative to where the line's text starts.
///
/// Tabs render flush left, so a line that starts with `\t` is measured from
/// the line container itself rather than from its first run.
pub fn content_x(
    sample: &PointerSample,
    text: &str,
) -> f64 {
    let origin = if text.starts_with('\t') {
        sample.line_left + sample.line_padding_left
    } else {
        sample.first_run_left + sample.first_run_padding_left
    };
    sample.client_x - origin
}

/// Index of the character under `content_x`, or `None` when the coordinate
/// precedes the first character or follows the last.
pub fn hover_character(
    content_x: f64,
    text: &str,
    metrics: LineMetrics,
) -> Option<usize> {
    if content_x.is_nan() || content_x < 0.0 || !metrics.is_usable() {
        return None;
    }

    let tab_stop = metrics.tab_stop_width();
    let mut x = 0.0;
    for (index, ch) in text.chars().enumerate() {
        if ch == '\t' {
            x = ((x / tab_stop).floor() + 1.0) * tab_stop;
        } else {
            x += metrics.character_width;
        }
        if x > content_x {
            return Some(index);
        }
    }
    None
}

/// Convenience wrapper: origin selection followed by [`hover_character`].
pub fn resolve_pointer(
    sample: &PointerSample,
    text: &str,
    metrics: LineMetrics,
) -> Option<usize> {
    hover_character(content_x(sample, text), text, metrics)
}

/// Number of characters in `text`.
pub fn char_len(text: &str) -> usize {
    text.chars().count()
}

/// Byte offset of the `char_offset`-th character, allowing one past the end.
pub fn byte_offset_of_char(
    text: &str,
    char_offset: usize,
) -> Option<usize> {
    if char_offset == 0 {
        return Some(0);
    }
    let mut chars = text.char_indices();
    match chars.nth(char_offset) {
        Some((byte, _)) => Some(byte),
        None if char_len(text) == char_offset => Some(text.len()),
        None => None,
    }
}

/// Split `text` at a character offset.
pub fn split_at_char(
    text: &str,
    char_offset: usize,
) -> Option<(&str, &str)> {
    let byte = byte_offset_of_char(text, char_offset)?;
    Some(text.split_at(byte))
}

#[cfg(test)]
#[path = "../tests/src/text_pos_tests.rs"]
mod tests;
