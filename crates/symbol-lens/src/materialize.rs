//! Splittable text runs of one rendered line.
//!
//! A line is rendered as a sequence of fragments whose concatenation is the
//! line text. To style exactly the characters of a symbol occurrence we split
//! the fragments that straddle the occurrence's boundaries and then mark every
//! fragment inside it. Splitting never changes the line text and never creates
//! empty fragments.

use std::collections::{BTreeMap, BTreeSet};

use tracing::debug;

use crate::text_pos::{char_len, split_at_char};

/// Style marker attached to a fragment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Marker {
    /// The occurrence under the pointer.
    Hovered,
    /// Another occurrence of the hovered symbol.
    Highlighted,
    /// Activating the fragment jumps to the definition.
    Clickable,
    /// Dashed underline on every known symbol range.
    Underline,
    /// Transient highlight on a line that was just scrolled into view.
    Pulse,
}

/// A contiguous run of line text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fragment {
    start: usize,
    text: String,
    /// Style the run had when it was first rendered, e.g. a syntax class.
    class: Option<String>,
    markers: BTreeSet<Marker>,
    tooltip: Option<String>,
}

impl Fragment {
    pub fn start(&self) -> usize {
        self.start
    }

    /// One past the last character, in line character offsets.
    pub fn end(&self) -> usize {
        self.start + char_len(&self.text)
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn class(&self) -> Option<&str> {
        self.class.as_deref()
    }

    pub fn markers(&self) -> &BTreeSet<Marker> {
        &self.markers
    }

    pub fn has_marker(
        &self,
        marker: Marker,
    ) -> bool {
        self.markers.contains(&marker)
    }

    pub fn add_marker(
        &mut self,
        marker: Marker,
    ) {
        self.markers.insert(marker);
    }

    pub fn remove_marker(
        &mut self,
        marker: Marker,
    ) {
        self.markers.remove(&marker);
    }

    pub fn tooltip(&self) -> Option<&str> {
        self.tooltip.as_deref()
    }

    pub fn set_tooltip(
        &mut self,
        tooltip: Option<String>,
    ) {
        self.tooltip = tooltip;
    }

    /// Copy of this fragment carrying `text` at `start`, like a shallow
    /// element clone with new contents.
    fn with_text(
        &self,
        start: usize,
        text: &str,
    ) -> Self {
        Self {
            start,
            text: text.to_string(),
            class: self.class.clone(),
            markers: self.markers.clone(),
            tooltip: self.tooltip.clone(),
        }
    }
}

/// Initial run of a rendered line: text plus an optional style class.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Run {
    pub text: String,
    pub class: Option<String>,
}

impl Run {
    pub fn plain(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            class: None,
        }
    }

    pub fn styled(
        text: impl Into<String>,
        class: impl Into<String>,
    ) -> Self {
        Self {
            text: text.into(),
            class: Some(class.into()),
        }
    }
}

impl From<&str> for Run {
    fn from(text: &str) -> Self {
        Self::plain(text)
    }
}

/// Fragments of one line, ordered by start offset.
///
/// Offsets are character offsets into the line text.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FragmentLine {
    fragments: BTreeMap<usize, Fragment>,
    len: usize,
}

impl FragmentLine {
    /// Build from the runs the line was first rendered with. Empty runs are
    /// dropped.
    pub fn new<I, R>(runs: I) -> Self
    where
        I: IntoIterator<Item = R>,
        R: Into<Run>,
    {
        let mut fragments = BTreeMap::new();
        let mut offset = 0usize;
        for run in runs {
            let Run {
                text,
                class,
            } = run.into();
            let len = char_len(&text);
            if len == 0 {
                continue;
            }
            fragments.insert(
                offset,
                Fragment {
                    start: offset,
                    text,
                    class,
                    markers: BTreeSet::new(),
                    tooltip: None,
                },
            );
            offset += len;
        }
        Self {
            fragments,
            len: offset,
        }
    }

    /// Single plain run covering the whole line.
    pub fn plain(text: &str) -> Self {
        Self::new([Run::plain(text)])
    }

    /// Line length in characters.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn fragment_count(&self) -> usize {
        self.fragments.len()
    }

    /// Concatenated fragment text.
    pub fn text(&self) -> String {
        self.fragments.values().map(|fragment| fragment.text.as_str()).collect()
    }

    pub fn fragments(&self) -> impl Iterator<Item = &Fragment> {
        self.fragments.values()
    }

    pub fn fragments_mut(&mut self) -> impl Iterator<Item = &mut Fragment> {
        self.fragments.values_mut()
    }

    /// The fragment containing character `offset`.
    ///
    /// This is the greatest start `<= offset`, i.e. an upper-bound search
    /// followed by one step back. A lower-bound search would return the next
    /// fragment whenever `offset` is not itself a boundary.
    pub fn locate(
        &self,
        offset: usize,
    ) -> Option<&Fragment> {
        if offset >= self.len {
            return None;
        }
        self.fragments.range(..=offset).next_back().map(|(_, fragment)| fragment)
    }

    /// Make `offset` a fragment boundary. Returns `true` if a fragment was
    /// split; offsets that are already boundaries or lie outside the line are
    /// left alone.
    pub fn split_at(
        &mut self,
        offset: usize,
    ) -> bool {
        let Some(containing) = self.locate(offset) else {
            return false;
        };
        let start = containing.start;
        if start == offset {
            return false;
        }

        let Some((left, right)) = split_at_char(&containing.text, offset - start) else {
            debug!("[materialize] offset {offset} is not a character boundary of fragment at {start}");
            return false;
        };
        let left_fragment = containing.with_text(start, left);
        let right_fragment = containing.with_text(offset, right);
        self.fragments.insert(start, left_fragment);
        self.fragments.insert(offset, right_fragment);
        true
    }

    /// Isolate `[start, end)` and return the fragments spanning it, in order.
    ///
    /// Intervals that are empty or reach past the line select nothing and
    /// leave the line untouched.
    pub fn select_range(
        &mut self,
        start: usize,
        end: usize,
    ) -> Vec<&mut Fragment> {
        if !self.is_valid_interval(start, end) {
            return Vec::new();
        }
        self.split_at(start);
        self.split_at(end);
        self.fragments.range_mut(start..end).map(|(_, fragment)| fragment).collect()
    }

    /// Add `marker` to every fragment of `[start, end)`, splitting as needed.
    /// Returns how many fragments were marked.
    pub fn mark(
        &mut self,
        start: usize,
        end: usize,
        marker: Marker,
    ) -> usize {
        let pieces = self.select_range(start, end);
        let count = pieces.len();
        for fragment in pieces {
            fragment.add_marker(marker);
        }
        count
    }

    /// Remove `marker` from every fragment of `[start, end)`.
    pub fn unmark(
        &mut self,
        start: usize,
        end: usize,
        marker: Marker,
    ) {
        for fragment in self.select_range(start, end) {
            fragment.remove_marker(marker);
        }
    }

    /// Remove `marker` from the whole line.
    pub fn clear_marker(
        &mut self,
        marker: Marker,
    ) {
        for fragment in self.fragments.values_mut() {
            fragment.remove_marker(marker);
        }
    }

    /// Attach (or with `None`, detach) tooltip content to `[start, end)`.
    pub fn set_tooltip(
        &mut self,
        start: usize,
        end: usize,
        tooltip: Option<&str>,
    ) {
        for fragment in self.select_range(start, end) {
            fragment.set_tooltip(tooltip.map(str::to_string));
        }
    }

    /// Tooltip of the fragment containing `offset`.
    pub fn tooltip_at(
        &self,
        offset: usize,
    ) -> Option<&str> {
        self.locate(offset).and_then(Fragment::tooltip)
    }

    /// Marked character ranges, merged across adjacent fragments.
    pub fn marked_ranges(
        &self,
        marker: Marker,
    ) -> Vec<(usize, usize)> {
        let mut ranges: Vec<(usize, usize)> = Vec::new();
        for fragment in self.fragments.values().filter(|fragment| fragment.has_marker(marker)) {
            match ranges.last_mut() {
                Some((_, end)) if *end == fragment.start => *end = fragment.end(),
                _ => ranges.push((fragment.start, fragment.end())),
            }
        }
        ranges
    }

    fn is_valid_interval(
        &self,
        start: usize,
        end: usize,
    ) -> bool {
        start < end && end <= self.len
    }
}

#[cfg(test)]
#[path = "../tests/src/materialize_tests.rs"]
mod tests;
