//! Symbol-extent ranges of one file at one commit, and position lookup.

use serde::{Deserialize, Serialize};
use tracing::warn;

/// Zero-based line/character position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Position {
    pub line: u32,
    #[serde(rename = "char")]
    pub character: u32,
}

impl Position {
    pub const fn new(
        line: u32,
        character: u32,
    ) -> Self {
        Self {
            line,
            character,
        }
    }
}

/// Single-line range, half-open on the character axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Range {
    pub line: u32,
    pub character_start: u32,
    pub character_end: u32,
}

impl Range {
    pub const fn new(
        line: u32,
        character_start: u32,
        character_end: u32,
    ) -> Self {
        Self {
            line,
            character_start,
            character_end,
        }
    }

    pub fn width(&self) -> u32 {
        self.character_end.saturating_sub(self.character_start)
    }

    pub fn overlaps(
        &self,
        other: &Range,
    ) -> bool {
        self.line == other.line
            && self.character_start < other.character_end
            && other.character_start < self.character_end
    }
}

/// `r.line == p.line && r.character_start <= p.character < r.character_end`.
pub fn contains(
    position: Position,
    range: &Range,
) -> bool {
    range.line == position.line && range.character_start <= position.character && position.character < range.character_end
}

/// Ordered ranges for one file at one commit.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Stencil {
    ranges: Vec<Range>,
}

impl Stencil {
    /// Wrap backend ranges, keeping their order.
    ///
    /// Overlapping ranges are tolerated but logged: lookups then fall back to
    /// the smallest containing range.
    pub fn new(ranges: Vec<Range>) -> Self {
        let stencil = Self {
            ranges,
        };
        let overlaps = stencil.overlaps();
        if let Some((a, b)) = overlaps.first() {
            warn!("[stencil] {} overlapping range pair(s), first: {a:?} / {b:?}", overlaps.len());
        }
        stencil
    }

    pub fn ranges(&self) -> &[Range] {
        &self.ranges
    }

    pub fn len(&self) -> usize {
        self.ranges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Range> {
        self.ranges.iter()
    }

    /// The range enclosing `position`.
    ///
    /// Well-formed stencils have at most one candidate. When a provider emits
    /// overlapping ranges the narrowest one wins; equal widths keep stencil
    /// order.
    pub fn lookup(
        &self,
        position: Position,
    ) -> Option<Range> {
        let mut best: Option<&Range> = None;
        for range in self.ranges.iter().filter(|range| contains(position, range)) {
            match best {
                Some(current) if current.width() <= range.width() => {},
                _ => best = Some(range),
            }
        }
        best.copied()
    }

    /// Ranges on a single line, in stencil order.
    pub fn on_line(
        &self,
        line: u32,
    ) -> impl Iterator<Item = &Range> + '_ {
        self.ranges.iter().filter(move |range| range.line == line)
    }

    /// Every overlapping pair, ordered by position.
    pub fn overlaps(&self) -> Vec<(Range, Range)> {
        let mut sorted: Vec<&Range> = self.ranges.iter().collect();
        sorted.sort();
        let mut pairs = Vec::new();
        for (index, range) in sorted.iter().enumerate() {
            for other in sorted.iter().skip(index + 1) {
                if other.line != range.line || other.character_start >= range.character_end {
                    break;
                }
                if range.overlaps(other) {
                    pairs.push((**range, **other));
                }
            }
        }
        pairs
    }
}

impl From<Vec<Range>> for Stencil {
    fn from(ranges: Vec<Range>) -> Self {
        Self::new(ranges)
    }
}

impl<'a> IntoIterator for &'a Stencil {
    type Item = &'a Range;
    type IntoIter = std::slice::Iter<'a, Range>;

    fn into_iter(self) -> Self::IntoIter {
        self.ranges.iter()
    }
}

#[cfg(test)]
#[path = "../tests/src/stencil_tests.rs"]
mod tests;
