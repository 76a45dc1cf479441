pub mod cache;
pub mod config;
pub mod error;
pub mod materialize;
pub mod page;
pub mod pipeline;
pub mod provider;
pub mod stencil;
pub mod surface;
pub mod symbols;
pub mod text_pos;

pub use cache::{AliasCache, CacheFuture};
pub use config::LensSettings;
pub use error::{ConfigError, LookupError};
pub use materialize::{Fragment, FragmentLine, Marker, Run};
pub use page::{PageKind, classify};
pub use pipeline::{HoverOutcome, HoverTarget, Lens, Navigation, PointerEvent, lookup_symbol};
pub use provider::{
    CommandBackend, CommitWarmer, StencilCache, StencilKey, StencilProvider, SymbolCache, SymbolProvider,
    stencil_cache, symbol_cache,
};
pub use stencil::{Position, Range, Stencil};
pub use surface::{Extent, FileRegion, LineKind, LineSpec, NodeId, Surface};
pub use symbols::{FileIdentity, LocatedRange, RepoCommit, Symbol, SymbolKey, compose_hover};
pub use text_pos::{LineMetrics, PointerSample, hover_character, resolve_pointer};
