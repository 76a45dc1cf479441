use tracing::debug;

use crate::{
    materialize::Marker,
    stencil::Range,
    surface::{FileRegion, NodeId, Surface},
    symbols::{LocatedRange, Symbol},
};

/// The occurrence under the pointer: a stencil range on a rendered line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HoverTarget {
    pub region: NodeId,
    pub line: NodeId,
    pub range: LocatedRange,
}

#[derive(Debug, Clone, Copy)]
struct Mark {
    node: NodeId,
    start: usize,
    end: usize,
    marker: Marker,
}

/// Markers and tooltip applied for one hovered symbol. Torn down before the
/// next target is annotated.
#[derive(Debug, Default)]
pub(crate) struct Annotation {
    marks: Vec<Mark>,
    tooltip: Option<(NodeId, usize, usize)>,
    /// Jump target; set only when the hovered occurrence is not the
    /// definition itself.
    definition: Option<LocatedRange>,
}

impl Annotation {
    pub(crate) fn apply(
        surface: &Surface,
        region: &FileRegion,
        target: &HoverTarget,
        symbol: &Symbol,
        tooltip: &str,
    ) -> Self {
        let mut annotation = Annotation::default();
        let (start, end) = span(&target.range.range);

        annotation.mark(surface, target.line, start, end, Marker::Hovered);
        if surface.with_line_mut(target.line, |line| line.set_tooltip(start, end, Some(tooltip))).is_some() {
            annotation.tooltip = Some((target.line, start, end));
        }

        annotation.definition = symbol.definition.as_ref().filter(|definition| **definition != target.range).cloned();
        if annotation.definition.is_some() {
            annotation.mark(surface, target.line, start, end, Marker::Clickable);
        }

        let lines = surface.lines(target.region);
        for occurrence in symbol.occurrences().filter(|occurrence| **occurrence != target.range) {
            let (start, end) = span(&occurrence.range);
            let rendered = lines.iter().filter(|(_, spec)| {
                spec.line == occurrence.range.line && region.renders(spec.kind, &occurrence.file)
            });
            for (node, _) in rendered {
                annotation.mark(surface, *node, start, end, Marker::Highlighted);
            }
        }
        annotation
    }

    pub(crate) fn definition(&self) -> Option<&LocatedRange> {
        self.definition.as_ref()
    }

    pub(crate) fn tear_down(
        self,
        surface: &Surface,
    ) {
        for mark in self.marks {
            surface.with_line_mut(mark.node, |line| line.unmark(mark.start, mark.end, mark.marker));
        }
        if let Some((node, start, end)) = self.tooltip {
            surface.with_line_mut(node, |line| line.set_tooltip(start, end, None));
        }
    }

    fn mark(
        &mut self,
        surface: &Surface,
        node: NodeId,
        start: usize,
        end: usize,
        marker: Marker,
    ) {
        let marked = surface.with_line_mut(node, |line| line.mark(start, end, marker)).unwrap_or(0);
        if marked == 0 {
            debug!("[pipeline] {marker:?} span {start}..{end} does not fit line {node}");
            return;
        }
        self.marks.push(Mark {
            node,
            start,
            end,
            marker,
        });
    }
}

pub(crate) fn span(range: &Range) -> (usize, usize) {
    (range.character_start as usize, range.character_end as usize)
}
