use crate::symbols::types::{LocatedRange, Symbol};

pub const DEFINED_HERE: &str = "Defined here.";
pub const STILL_PROCESSING: &str = "Still processing this commit...";
const SECTION_SEPARATOR: &str = "\n\n---\n\n";

/// Tooltip text for `symbol` when hovered at `hovered`.
///
/// On the definition itself this is the hover text alone. Elsewhere the
/// definition's location is appended as a separate section.
pub fn compose_hover(
    symbol: &Symbol,
    hovered: &LocatedRange,
) -> String {
    if symbol.is_defined_at(hovered) {
        return symbol.hover.clone().unwrap_or_else(|| DEFINED_HERE.to_string());
    }

    let mut sections = Vec::new();
    if let Some(hover) = symbol.hover.as_deref().filter(|hover| !hover.is_empty()) {
        sections.push(hover.to_string());
    }
    if let Some(definition) = &symbol.definition {
        sections.push(definition_location(definition, hovered));
    }
    sections.join(SECTION_SEPARATOR)
}

fn definition_location(
    definition: &LocatedRange,
    hovered: &LocatedRange,
) -> String {
    if definition.file.path == hovered.file.path {
        format!("Defined on line {}", u64::from(definition.range.line) + 1)
    } else {
        format!("Defined in {}", definition.file.path)
    }
}

/// Stand-in shown while the backend is still indexing the commit.
pub fn still_processing(hovered: &LocatedRange) -> Symbol {
    Symbol {
        definition: None,
        references: vec![hovered.clone()],
        hover: Some(STILL_PROCESSING.to_string()),
    }
}
