//! Symbol data model: file identities, located ranges, symbols and cache keys.

mod hover;
mod types;

pub use hover::{DEFINED_HERE, STILL_PROCESSING, compose_hover, still_processing};
pub use types::{FileIdentity, LocatedRange, RepoCommit, Symbol, SymbolKey, SymbolValue, symbol_aliases};

#[cfg(test)]
#[path = "../../tests/src/symbols/symbols_tests.rs"]
mod tests;
