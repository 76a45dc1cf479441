//! Pointer-driven symbol overlay.
//!
//! A pointer move is debounced, resolved to a character, looked up in the
//! line's stencil and then in the symbol cache; the result is painted onto
//! the surface. Each move bumps a generation counter. A resolution only
//! touches the surface while it owns the newest generation that reached the
//! annotation stage, so a slow lookup can never paint over a newer one.

mod annotate;
mod regions;

use std::{
    ops::ControlFlow,
    panic::AssertUnwindSafe,
    sync::{
        Arc, Mutex, MutexGuard, PoisonError,
        atomic::{AtomicBool, AtomicU64, Ordering},
    },
    time::Duration,
};

pub use annotate::HoverTarget;
use annotate::{Annotation, span};
use dashmap::{DashMap, DashSet};
use futures::FutureExt;
use once_cell::sync::OnceCell;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::{
    config::LensSettings,
    error::LookupError,
    materialize::Marker,
    page::EMPTY_TREE_BASE,
    provider::{
        CommitWarmer, StencilCache, StencilKey, StencilProvider, SymbolCache, SymbolProvider, stencil_cache,
        symbol_cache,
    },
    stencil::{Position, Stencil},
    surface::{FileRegion, NodeId, Surface},
    symbols::{FileIdentity, LocatedRange, RepoCommit, Symbol, SymbolKey, compose_hover, still_processing},
    text_pos::{PointerSample, resolve_pointer},
};

/// How long a revealed line keeps its pulse marker.
pub const PULSE_DURATION: Duration = Duration::from_millis(1500);

const STENCIL_LOADS_IN_FLIGHT: usize = 4;

/// Pointer position over one rendered line.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PointerEvent {
    pub line: NodeId,
    pub sample: PointerSample,
}

/// What a single resolution ended with.
#[derive(Debug, Clone, PartialEq)]
pub enum HoverOutcome {
    /// A newer pointer event took over.
    Superseded,
    /// Nothing under the pointer: whitespace, no stencil range or a line the
    /// surface no longer has.
    NoTarget,
    /// Same occurrence as the one already annotated.
    Unchanged,
    /// The symbol provider has nothing at this range.
    NotFound,
    /// The file cannot be analyzed; the region stays inert.
    Unsupported,
    Annotated {
        range: LocatedRange,
        tooltip: String,
        /// The backend is still indexing; the tooltip is a placeholder.
        placeholder: bool,
    },
    Failed(LookupError),
}

/// Where activating the current annotation leads.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Navigation {
    /// The definition is rendered on this page; it was scrolled to and pulsed.
    Reveal {
        node: NodeId,
        line: u32,
    },
    External {
        url: String,
    },
}

#[derive(Debug, Clone)]
struct RegionState {
    region: FileRegion,
    unsupported: bool,
}

#[derive(Default)]
struct HoverState {
    /// Generation that last claimed the annotation slot.
    generation: u64,
    target: Option<HoverTarget>,
    annotation: Option<Annotation>,
}

struct LensInner {
    surface: Surface,
    stencils: StencilCache,
    symbols: SymbolCache,
    settings: LensSettings,
    git_ref: Option<String>,
    hover_generation: AtomicU64,
    hover: Mutex<HoverState>,
    regions: DashMap<NodeId, RegionState>,
    underline: AtomicBool,
    warmer: OnceCell<Arc<dyn CommitWarmer>>,
    touched: DashSet<RepoCommit>,
}

/// Symbol overlay for one page view. Clones share state.
#[derive(Clone)]
pub struct Lens {
    inner: Arc<LensInner>,
}

impl Lens {
    /// Overlay using caches that may be shared with other views.
    pub fn new(
        surface: Surface,
        stencils: StencilCache,
        symbols: SymbolCache,
        settings: LensSettings,
        git_ref: Option<String>,
    ) -> Self {
        let underline = settings.hover.underline;
        Self {
            inner: Arc::new(LensInner {
                surface,
                stencils,
                symbols,
                settings,
                git_ref,
                hover_generation: AtomicU64::new(0),
                hover: Mutex::new(HoverState::default()),
                regions: DashMap::new(),
                underline: AtomicBool::new(underline),
                warmer: OnceCell::new(),
                touched: DashSet::new(),
            }),
        }
    }

    /// Overlay with fresh caches over the given providers.
    pub fn with_providers(
        surface: Surface,
        stencil_provider: Arc<dyn StencilProvider>,
        symbol_provider: Arc<dyn SymbolProvider>,
        settings: LensSettings,
        git_ref: Option<String>,
    ) -> Self {
        let stencils = stencil_cache(stencil_provider, STENCIL_LOADS_IN_FLIGHT);
        let symbols = symbol_cache(symbol_provider, settings.cache.max_concurrent_loads);
        stencils.set_load_timeout(Some(settings.cache.load_timeout()));
        symbols.set_load_timeout(Some(settings.cache.load_timeout()));
        Self::new(surface, stencils, symbols, settings, git_ref)
    }

    /// Send `touch` for every commit this view shows through `warmer`. Only
    /// the first warmer given to a view is used.
    pub fn with_warmer(
        self,
        warmer: Arc<dyn CommitWarmer>,
    ) -> Self {
        if self.inner.warmer.set(warmer).is_err() {
            debug!("[pipeline] view already has a commit warmer");
        }
        self
    }

    /// Ask the backend to start preparing `commit`, once per view. Returns
    /// whether a request went out. Must be called from within a Tokio
    /// runtime.
    pub fn touch(
        &self,
        commit: RepoCommit,
    ) -> bool {
        let Some(warmer) = self.inner.warmer.get() else {
            return false;
        };
        if commit.commit == EMPTY_TREE_BASE || !self.inner.touched.insert(commit.clone()) {
            return false;
        }
        let warmer = Arc::clone(warmer);
        let git_ref = self.inner.git_ref.clone();
        tokio::spawn(async move {
            match warmer.touch(&commit, git_ref.as_deref()).await {
                Ok(()) => debug!("[pipeline] touched {commit}"),
                Err(error) => debug!("[pipeline] touch of {commit} failed: {error}"),
            }
        });
        true
    }

    pub fn surface(&self) -> &Surface {
        &self.inner.surface
    }

    pub fn symbols(&self) -> &SymbolCache {
        &self.inner.symbols
    }

    pub fn stencils(&self) -> &StencilCache {
        &self.inner.stencils
    }

    pub fn git_ref(&self) -> Option<&str> {
        self.inner.git_ref.as_deref()
    }

    /// The occurrence currently annotated, if any.
    pub fn current_target(&self) -> Option<HoverTarget> {
        let state = self.lock_hover();
        state.annotation.as_ref().and(state.target.clone())
    }

    /// Debounced resolution of a pointer move. The handle resolves with
    /// [`HoverOutcome::Superseded`] if another move arrives within the
    /// debounce window.
    pub fn pointer_moved(
        &self,
        event: PointerEvent,
    ) -> JoinHandle<HoverOutcome> {
        let generation = self.next_generation();
        let lens = self.clone();
        let debounce = Duration::from_millis(self.inner.settings.hover.debounce_ms);
        tokio::spawn(async move {
            tokio::time::sleep(debounce).await;
            if !lens.is_latest(generation) {
                return HoverOutcome::Superseded;
            }
            let result = AssertUnwindSafe(lens.resolve(generation, event)).catch_unwind().await;
            result.unwrap_or_else(|_| {
                warn!("[pipeline] hover resolution panicked");
                HoverOutcome::Failed(LookupError::Backend {
                    reason: "hover resolution panicked".to_string(),
                })
            })
        })
    }

    /// The pointer left the code. Pending resolutions are dropped and the
    /// current annotation removed.
    pub fn pointer_left(&self) {
        let generation = self.next_generation();
        let mut state = self.lock_hover();
        state.generation = generation;
        state.target = None;
        if let Some(annotation) = state.annotation.take() {
            annotation.tear_down(&self.inner.surface);
        }
    }

    /// Resolve `event` right away, as generation `generation`.
    async fn resolve(
        &self,
        generation: u64,
        event: PointerEvent,
    ) -> HoverOutcome {
        let surface = &self.inner.surface;
        let (Some(spec), Some(text)) = (surface.line_spec(event.line), surface.line_text(event.line)) else {
            warn!("[pipeline] pointer over {} which is not a rendered line", event.line);
            return HoverOutcome::NoTarget;
        };
        let Some((region_node, region)) = surface.enclosing_region(event.line) else {
            warn!("[pipeline] line {} has no enclosing file region", event.line);
            return HoverOutcome::NoTarget;
        };
        if self.register_region(region_node, &region).unsupported {
            return HoverOutcome::Unsupported;
        }

        let metrics = self.inner.settings.rendering.metrics();
        let Some(character) = resolve_pointer(&event.sample, &text, metrics) else {
            return self.claim(generation, None).break_value().unwrap_or(HoverOutcome::NoTarget);
        };
        let position = Position::new(spec.line, character as u32);
        let file = region.side(spec.kind).clone();

        let stencil = match self.inner.stencils.get(self.stencil_key(&file)).await {
            Ok(stencil) => stencil,
            Err(error) => return self.stencil_failed(region_node, &file, error),
        };
        let target = stencil.lookup(position).map(|range| HoverTarget {
            region: region_node,
            line: event.line,
            range: file.at(range),
        });
        let Some(target) = target else {
            return self.claim(generation, None).break_value().unwrap_or(HoverOutcome::NoTarget);
        };
        if let ControlFlow::Break(outcome) = self.claim(generation, Some(target.clone())) {
            return outcome;
        }

        let key = SymbolKey::new(target.range.clone(), self.inner.git_ref.clone());
        let (symbol, placeholder) = match self.inner.symbols.get(key).await {
            Ok(Some(symbol)) => (symbol, false),
            Ok(None) => return HoverOutcome::NotFound,
            Err(LookupError::NotReady) => (Arc::new(still_processing(&target.range)), true),
            Err(error) if error.is_unsupported() => {
                self.mark_unsupported(target.region);
                return HoverOutcome::Unsupported;
            },
            Err(error) => {
                warn!("[pipeline] symbol lookup for {} failed: {error}", target.range);
                return HoverOutcome::Failed(error);
            },
        };

        self.annotate(generation, &region, target, &symbol, placeholder)
    }

    /// Take the annotation slot for `target`, tearing down whatever was there
    /// unless it is the same occurrence. `Continue` means the lookup goes on.
    fn claim(
        &self,
        generation: u64,
        target: Option<HoverTarget>,
    ) -> ControlFlow<HoverOutcome> {
        let mut state = self.lock_hover();
        if generation <= state.generation {
            return ControlFlow::Break(HoverOutcome::Superseded);
        }
        state.generation = generation;

        let Some(target) = target else {
            state.target = None;
            if let Some(annotation) = state.annotation.take() {
                annotation.tear_down(&self.inner.surface);
            }
            return ControlFlow::Break(HoverOutcome::NoTarget);
        };
        if state.target.as_ref() == Some(&target) {
            if state.annotation.is_some() {
                return ControlFlow::Break(HoverOutcome::Unchanged);
            }
            return ControlFlow::Continue(());
        }

        if let Some(annotation) = state.annotation.take() {
            annotation.tear_down(&self.inner.surface);
        }
        state.target = Some(target);
        ControlFlow::Continue(())
    }

    fn annotate(
        &self,
        generation: u64,
        region: &FileRegion,
        target: HoverTarget,
        symbol: &Symbol,
        placeholder: bool,
    ) -> HoverOutcome {
        let mut state = self.lock_hover();
        if state.generation != generation || state.target.as_ref() != Some(&target) {
            debug!("[pipeline] dropping stale result for {}", target.range);
            return HoverOutcome::Superseded;
        }
        if !self.inner.surface.contains(target.line) {
            debug!("[pipeline] line of {} was removed during the lookup", target.range);
            state.target = None;
            self.forget_region(target.region);
            return HoverOutcome::NoTarget;
        }
        if let Some(previous) = state.annotation.take() {
            previous.tear_down(&self.inner.surface);
        }

        let tooltip = compose_hover(symbol, &target.range);
        state.annotation = Some(Annotation::apply(&self.inner.surface, region, &target, symbol, &tooltip));
        HoverOutcome::Annotated {
            range: target.range,
            tooltip,
            placeholder,
        }
    }

    fn stencil_failed(
        &self,
        region_node: NodeId,
        file: &FileIdentity,
        error: LookupError,
    ) -> HoverOutcome {
        if error.is_unsupported() {
            self.mark_unsupported(region_node);
            return HoverOutcome::Unsupported;
        }
        if error.is_not_ready() {
            debug!("[pipeline] stencil for {file} not ready yet");
            return HoverOutcome::NoTarget;
        }
        warn!("[pipeline] stencil for {file} failed: {error}");
        HoverOutcome::Failed(error)
    }

    /// Follow the current annotation to its definition.
    ///
    /// `None` when nothing clickable is annotated. A reveal schedules the pulse
    /// removal on the current Tokio runtime.
    pub fn activate(&self) -> Option<Navigation> {
        let definition = {
            let state = self.lock_hover();
            state.annotation.as_ref()?.definition()?.clone()
        };

        let Some(node) = self.rendered_line(&definition) else {
            return Some(Navigation::External {
                url: definition.file.line_url(definition.range.line),
            });
        };

        let surface = self.inner.surface.clone();
        surface.reveal(node);
        tokio::spawn(async move {
            tokio::time::sleep(PULSE_DURATION).await;
            surface.with_line_mut(node, |line| line.clear_marker(Marker::Pulse));
        });
        Some(Navigation::Reveal {
            node,
            line: definition.range.line,
        })
    }

    /// A line on this page that renders `range`'s line of `range`'s file.
    fn rendered_line(
        &self,
        range: &LocatedRange,
    ) -> Option<NodeId> {
        let candidates: Vec<(NodeId, FileRegion)> = self
            .inner
            .regions
            .iter()
            .map(|entry| (*entry.key(), entry.value().region.clone()))
            .collect();
        candidates.into_iter().find_map(|(node, region)| {
            self.inner
                .surface
                .find_line(node, |spec| spec.line == range.range.line && region.renders(spec.kind, &range.file))
        })
    }

    /// Underline every symbol range of the regions whose stencils are
    /// already fetched, or remove the underlines.
    pub async fn set_underline(
        &self,
        enabled: bool,
    ) {
        self.inner.underline.store(enabled, Ordering::SeqCst);
        let regions: Vec<(NodeId, FileRegion)> = self
            .inner
            .regions
            .iter()
            .filter(|entry| !entry.value().unsupported)
            .map(|entry| (*entry.key(), entry.value().region.clone()))
            .collect();
        for (node, region) in regions {
            if enabled {
                for file in region.revisions() {
                    // Regions not yet near the viewport get underlined by their prefetch.
                    let key = self.stencil_key(file);
                    if !self.inner.stencils.is_resolved(&key) {
                        continue;
                    }
                    if let Ok(stencil) = self.inner.stencils.get(key).await {
                        self.underline_region(node, &region, file, &stencil);
                    }
                }
            } else {
                for (line, _) in self.inner.surface.lines(node) {
                    self.inner.surface.with_line_mut(line, |fragments| fragments.clear_marker(Marker::Underline));
                }
            }
        }
    }

    pub fn underline_enabled(&self) -> bool {
        self.inner.underline.load(Ordering::SeqCst)
    }

    fn underline_region(
        &self,
        node: NodeId,
        region: &FileRegion,
        file: &FileIdentity,
        stencil: &Stencil,
    ) {
        for (line, spec) in self.inner.surface.lines(node) {
            if !region.renders(spec.kind, file) {
                continue;
            }
            for range in stencil.on_line(spec.line) {
                let (start, end) = span(range);
                self.inner.surface.with_line_mut(line, |fragments| fragments.mark(start, end, Marker::Underline));
            }
        }
    }

    fn stencil_key(
        &self,
        file: &FileIdentity,
    ) -> StencilKey {
        StencilKey::new(file.clone(), self.inner.git_ref.clone())
    }

    fn register_region(
        &self,
        node: NodeId,
        region: &FileRegion,
    ) -> RegionState {
        if let Some(state) = self.inner.regions.get(&node) {
            return state.clone();
        }
        // Regions first seen by a hover have no watcher to forget them.
        self.inner.regions.retain(|node, _| self.inner.surface.contains(*node));
        self.inner
            .regions
            .entry(node)
            .or_insert_with(|| RegionState {
                region: region.clone(),
                unsupported: false,
            })
            .clone()
    }

    fn mark_unsupported(
        &self,
        node: NodeId,
    ) {
        if let Some(mut state) = self.inner.regions.get_mut(&node) {
            if !state.unsupported {
                debug!("[pipeline] region {node} is not supported, disabling it");
            }
            state.unsupported = true;
        }
    }

    fn forget_region(
        &self,
        node: NodeId,
    ) {
        self.inner.regions.remove(&node);
    }

    pub fn is_region_supported(
        &self,
        node: NodeId,
    ) -> Option<bool> {
        self.inner.regions.get(&node).map(|state| !state.unsupported)
    }

    fn next_generation(&self) -> u64 {
        self.inner.hover_generation.fetch_add(1, Ordering::SeqCst) + 1
    }

    fn is_latest(
        &self,
        generation: u64,
    ) -> bool {
        self.inner.hover_generation.load(Ordering::SeqCst) == generation
    }

    fn lock_hover(&self) -> MutexGuard<'_, HoverState> {
        self.inner.hover.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Stencil lookup followed by a symbol lookup, without any surface.
///
/// `Ok(None)` when no range encloses `position` or nothing is known there.
pub async fn lookup_symbol(
    stencils: &StencilCache,
    symbols: &SymbolCache,
    file: &FileIdentity,
    position: Position,
    git_ref: Option<String>,
) -> Result<Option<(LocatedRange, Arc<Symbol>)>, LookupError> {
    let stencil = stencils.get(StencilKey::new(file.clone(), git_ref.clone())).await?;
    let Some(range) = stencil.lookup(position) else {
        return Ok(None);
    };
    let located = file.at(range);
    let symbol = symbols.get(SymbolKey::new(located.clone(), git_ref)).await?;
    Ok(symbol.map(|symbol| (located, symbol)))
}

#[cfg(test)]
#[path = "../../tests/src/pipeline/pipeline_tests.rs"]
mod tests;
