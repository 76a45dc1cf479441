//! In-memory model of the rendering surface plus change observation.
//!
//! The surface is a tree of nodes. Containers group file regions; a file
//! region holds the rendered lines of one file (or one diff); each line owns
//! its [`FragmentLine`]. Observers get an unbounded channel of events and
//! unsubscribe when dropped.

use std::{
    collections::HashMap,
    fmt::{Display, Formatter},
    sync::{Arc, Mutex, MutexGuard, PoisonError, Weak},
};

use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender, unbounded_channel};
use tracing::{debug, warn};

use crate::{
    materialize::{FragmentLine, Marker, Run},
    symbols::FileIdentity,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(u64);

impl Display for NodeId {
    fn fmt(
        &self,
        f: &mut Formatter<'_>,
    ) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Change kind of a rendered line. Plain file views only have `Normal`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum LineKind {
    #[default]
    Normal,
    Context,
    Addition,
    Deletion,
}

impl LineKind {
    /// Additions only exist in the head revision.
    pub fn is_head_side(self) -> bool {
        matches!(self, LineKind::Addition)
    }
}

/// Logical identity of a rendered line.
///
/// `line` is zero-based and counts lines of the revision the line belongs
/// to: the head for additions, the base for everything else.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LineSpec {
    pub line: u32,
    pub kind: LineKind,
}

impl LineSpec {
    pub const fn new(
        line: u32,
        kind: LineKind,
    ) -> Self {
        Self {
            line,
            kind,
        }
    }

    pub const fn normal(line: u32) -> Self {
        Self::new(line, LineKind::Normal)
    }
}

/// The file(s) a region renders.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FileRegion {
    pub head: FileIdentity,
    /// Parent revision in diff views; `None` for a plain file view.
    pub base: Option<FileIdentity>,
}

impl FileRegion {
    pub fn blob(file: FileIdentity) -> Self {
        Self {
            head: file,
            base: None,
        }
    }

    pub fn diff(
        base: FileIdentity,
        head: FileIdentity,
    ) -> Self {
        Self {
            head,
            base: Some(base),
        }
    }

    /// The revision lines of `kind` are resolved against.
    pub fn side(
        &self,
        kind: LineKind,
    ) -> &FileIdentity {
        match (&self.base, kind.is_head_side()) {
            (Some(base), false) => base,
            _ => &self.head,
        }
    }

    /// Whether lines of `kind` in this region belong to `file`.
    pub fn renders(
        &self,
        kind: LineKind,
        file: &FileIdentity,
    ) -> bool {
        self.side(kind) == file
    }

    /// Every distinct revision shown, base first.
    pub fn revisions(&self) -> Vec<&FileIdentity> {
        match &self.base {
            Some(base) if base != &self.head => vec![base, &self.head],
            _ => vec![&self.head],
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum NodeKind {
    Container,
    /// Container whose children are loaded progressively after first render.
    Progressive,
    Region(FileRegion),
    Line {
        spec: LineSpec,
        fragments: FragmentLine,
    },
}

/// Vertical extent in surface pixels.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Extent {
    pub top: f64,
    pub bottom: f64,
}

impl Extent {
    pub const fn new(
        top: f64,
        bottom: f64,
    ) -> Self {
        Self {
            top,
            bottom,
        }
    }

    fn height(&self) -> f64 {
        self.bottom - self.top
    }

    /// Overlap with `other` grown by `margin` on both ends.
    fn intersects(
        &self,
        other: &Extent,
        margin: f64,
    ) -> bool {
        self.bottom > other.top - margin && self.top < other.bottom + margin
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChildEvent {
    Added(NodeId),
    Removed(NodeId),
}

struct Node {
    parent: Option<NodeId>,
    children: Vec<NodeId>,
    kind: NodeKind,
    extent: Option<Extent>,
}

struct ChildWatch {
    parent: NodeId,
    include_removals: bool,
    events: UnboundedSender<ChildEvent>,
}

struct VisibilityWatch {
    target: NodeId,
    margin: f64,
    intersecting: bool,
    events: UnboundedSender<bool>,
}

struct Tree {
    nodes: HashMap<NodeId, Node>,
    root: NodeId,
    next_node: u64,
    viewport: Extent,
    child_watches: HashMap<u64, ChildWatch>,
    visibility_watches: HashMap<u64, VisibilityWatch>,
    next_watch: u64,
}

impl Tree {
    fn is_intersecting(
        &self,
        target: NodeId,
        margin: f64,
    ) -> bool {
        self.nodes
            .get(&target)
            .and_then(|node| node.extent)
            .is_some_and(|extent| extent.intersects(&self.viewport, margin))
    }

    fn notify_children(
        &mut self,
        parent: NodeId,
        event: ChildEvent,
    ) {
        self.child_watches.retain(|_, watch| {
            if watch.parent != parent {
                return true;
            }
            if matches!(event, ChildEvent::Removed(_)) && !watch.include_removals {
                return true;
            }
            watch.events.send(event).is_ok()
        });
    }

    fn refresh_visibility(&mut self) {
        let mut states = Vec::with_capacity(self.visibility_watches.len());
        for (id, watch) in &self.visibility_watches {
            states.push((*id, self.is_intersecting(watch.target, watch.margin)));
        }
        for (id, intersecting) in states {
            let Some(watch) = self.visibility_watches.get_mut(&id) else {
                continue;
            };
            if watch.intersecting == intersecting {
                continue;
            }
            watch.intersecting = intersecting;
            if watch.events.send(intersecting).is_err() {
                self.visibility_watches.remove(&id);
            }
        }
    }

    fn subtree(
        &self,
        node: NodeId,
    ) -> Vec<NodeId> {
        let mut order = Vec::new();
        let mut stack = vec![node];
        while let Some(id) = stack.pop() {
            let Some(current) = self.nodes.get(&id) else {
                continue;
            };
            order.push(id);
            stack.extend(current.children.iter().rev().copied());
        }
        order
    }
}

/// Shared handle to the rendering surface.
#[derive(Clone)]
pub struct Surface {
    tree: Arc<Mutex<Tree>>,
}

impl Default for Surface {
    fn default() -> Self {
        Self::new()
    }
}

impl Surface {
    pub fn new() -> Self {
        let root = NodeId(0);
        let mut nodes = HashMap::new();
        nodes.insert(
            root,
            Node {
                parent: None,
                children: Vec::new(),
                kind: NodeKind::Container,
                extent: None,
            },
        );
        Self {
            tree: Arc::new(Mutex::new(Tree {
                nodes,
                root,
                next_node: 1,
                viewport: Extent::default(),
                child_watches: HashMap::new(),
                visibility_watches: HashMap::new(),
                next_watch: 1,
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Tree> {
        self.tree.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn root(&self) -> NodeId {
        self.lock().root
    }

    /// Append a child to `parent`. `None` when `parent` is gone.
    pub fn append(
        &self,
        parent: NodeId,
        kind: NodeKind,
    ) -> Option<NodeId> {
        let mut tree = self.lock();
        if !tree.nodes.contains_key(&parent) {
            warn!("[surface] cannot append to missing node {parent}");
            return None;
        }
        let id = NodeId(tree.next_node);
        tree.next_node += 1;
        tree.nodes.insert(
            id,
            Node {
                parent: Some(parent),
                children: Vec::new(),
                kind,
                extent: None,
            },
        );
        if let Some(node) = tree.nodes.get_mut(&parent) {
            node.children.push(id);
        }
        tree.notify_children(parent, ChildEvent::Added(id));
        Some(id)
    }

    pub fn append_container(
        &self,
        parent: NodeId,
        progressive: bool,
    ) -> Option<NodeId> {
        let kind = if progressive {
            NodeKind::Progressive
        } else {
            NodeKind::Container
        };
        self.append(parent, kind)
    }

    pub fn append_region(
        &self,
        parent: NodeId,
        region: FileRegion,
    ) -> Option<NodeId> {
        self.append(parent, NodeKind::Region(region))
    }

    pub fn append_line<I, R>(
        &self,
        parent: NodeId,
        spec: LineSpec,
        runs: I,
    ) -> Option<NodeId>
    where
        I: IntoIterator<Item = R>,
        R: Into<Run>,
    {
        self.append(
            parent,
            NodeKind::Line {
                spec,
                fragments: FragmentLine::new(runs),
            },
        )
    }

    /// Detach `node` and drop its subtree. Observers of removed nodes are
    /// closed.
    pub fn remove(
        &self,
        node: NodeId,
    ) -> bool {
        let mut tree = self.lock();
        if node == tree.root {
            warn!("[surface] refusing to remove the root node");
            return false;
        }
        let Some(parent) = tree.nodes.get(&node).and_then(|n| n.parent) else {
            debug!("[surface] remove of unknown node {node}");
            return false;
        };
        let removed = tree.subtree(node);
        for id in &removed {
            tree.nodes.remove(id);
        }
        if let Some(parent_node) = tree.nodes.get_mut(&parent) {
            parent_node.children.retain(|child| *child != node);
        }
        tree.child_watches.retain(|_, watch| !removed.contains(&watch.parent));
        tree.visibility_watches.retain(|_, watch| !removed.contains(&watch.target));
        tree.notify_children(parent, ChildEvent::Removed(node));
        true
    }

    pub fn contains(
        &self,
        node: NodeId,
    ) -> bool {
        self.lock().nodes.contains_key(&node)
    }

    pub fn kind(
        &self,
        node: NodeId,
    ) -> Option<NodeKind> {
        self.lock().nodes.get(&node).map(|n| n.kind.clone())
    }

    pub fn parent(
        &self,
        node: NodeId,
    ) -> Option<NodeId> {
        self.lock().nodes.get(&node).and_then(|n| n.parent)
    }

    pub fn children(
        &self,
        node: NodeId,
    ) -> Vec<NodeId> {
        self.lock().nodes.get(&node).map(|n| n.children.clone()).unwrap_or_default()
    }

    pub fn region(
        &self,
        node: NodeId,
    ) -> Option<FileRegion> {
        match &self.lock().nodes.get(&node)?.kind {
            NodeKind::Region(region) => Some(region.clone()),
            _ => None,
        }
    }

    pub fn line_spec(
        &self,
        node: NodeId,
    ) -> Option<LineSpec> {
        match &self.lock().nodes.get(&node)?.kind {
            NodeKind::Line {
                spec,
                ..
            } => Some(*spec),
            _ => None,
        }
    }

    /// Nearest region node at or above `node`.
    pub fn enclosing_region(
        &self,
        node: NodeId,
    ) -> Option<(NodeId, FileRegion)> {
        let tree = self.lock();
        let mut current = Some(node);
        while let Some(id) = current {
            let found = tree.nodes.get(&id)?;
            if let NodeKind::Region(region) = &found.kind {
                return Some((id, region.clone()));
            }
            current = found.parent;
        }
        None
    }

    /// Every line under `ancestor`, in document order.
    pub fn lines(
        &self,
        ancestor: NodeId,
    ) -> Vec<(NodeId, LineSpec)> {
        let tree = self.lock();
        tree.subtree(ancestor)
            .into_iter()
            .filter_map(|id| match &tree.nodes.get(&id)?.kind {
                NodeKind::Line {
                    spec,
                    ..
                } => Some((id, *spec)),
                _ => None,
            })
            .collect()
    }

    /// First line under `ancestor` whose spec satisfies `matches`.
    pub fn find_line(
        &self,
        ancestor: NodeId,
        matches: impl Fn(&LineSpec) -> bool,
    ) -> Option<NodeId> {
        self.lines(ancestor).into_iter().find(|(_, spec)| matches(spec)).map(|(id, _)| id)
    }

    pub fn with_line<R>(
        &self,
        node: NodeId,
        f: impl FnOnce(&FragmentLine) -> R,
    ) -> Option<R> {
        match &self.lock().nodes.get(&node)?.kind {
            NodeKind::Line {
                fragments,
                ..
            } => Some(f(fragments)),
            _ => None,
        }
    }

    pub fn with_line_mut<R>(
        &self,
        node: NodeId,
        f: impl FnOnce(&mut FragmentLine) -> R,
    ) -> Option<R> {
        match &mut self.lock().nodes.get_mut(&node)?.kind {
            NodeKind::Line {
                fragments,
                ..
            } => Some(f(fragments)),
            _ => None,
        }
    }

    pub fn line_text(
        &self,
        node: NodeId,
    ) -> Option<String> {
        self.with_line(node, FragmentLine::text)
    }

    pub fn set_extent(
        &self,
        node: NodeId,
        extent: Extent,
    ) {
        let mut tree = self.lock();
        let Some(found) = tree.nodes.get_mut(&node) else {
            debug!("[surface] extent for unknown node {node}");
            return;
        };
        found.extent = Some(extent);
        tree.refresh_visibility();
    }

    pub fn viewport(&self) -> Extent {
        self.lock().viewport
    }

    pub fn set_viewport(
        &self,
        viewport: Extent,
    ) {
        let mut tree = self.lock();
        tree.viewport = viewport;
        tree.refresh_visibility();
    }

    /// Scroll `node` to the middle of the viewport and pulse it.
    pub fn reveal(
        &self,
        node: NodeId,
    ) -> bool {
        let mut tree = self.lock();
        let Some(found) = tree.nodes.get_mut(&node) else {
            warn!("[surface] cannot reveal missing node {node}");
            return false;
        };
        if let NodeKind::Line {
            fragments,
            ..
        } = &mut found.kind
        {
            let len = fragments.len();
            fragments.mark(0, len, Marker::Pulse);
        }
        if let Some(extent) = found.extent {
            let height = tree.viewport.height();
            let center = (extent.top + extent.bottom) / 2.0;
            tree.viewport = Extent::new(center - height / 2.0, center + height / 2.0);
            tree.refresh_visibility();
        }
        true
    }

    /// Emit every current child of `parent`, then additions and removals.
    pub fn observe_children(
        &self,
        parent: NodeId,
    ) -> Option<ChildObserver> {
        self.watch_children(parent, true)
    }

    /// Emit every current child of `parent`, then later additions only.
    pub fn observe_new_children(
        &self,
        parent: NodeId,
    ) -> Option<ChildObserver> {
        self.watch_children(parent, false)
    }

    fn watch_children(
        &self,
        parent: NodeId,
        include_removals: bool,
    ) -> Option<ChildObserver> {
        let mut tree = self.lock();
        let Some(node) = tree.nodes.get(&parent) else {
            warn!("[surface] cannot observe missing node {parent}");
            return None;
        };
        let (events, receiver) = unbounded_channel();
        for child in &node.children {
            let _ = events.send(ChildEvent::Added(*child));
        }
        let id = tree.next_watch;
        tree.next_watch += 1;
        tree.child_watches.insert(
            id,
            ChildWatch {
                parent,
                include_removals,
                events,
            },
        );
        Some(ChildObserver {
            events: receiver,
            _subscription: Subscription {
                tree: Arc::downgrade(&self.tree),
                id,
            },
        })
    }

    /// Emit whether `target` intersects the viewport grown by `margin`,
    /// then every transition.
    pub fn observe_intersection(
        &self,
        target: NodeId,
        margin: f64,
    ) -> Option<IntersectionObserver> {
        let mut tree = self.lock();
        if !tree.nodes.contains_key(&target) {
            warn!("[surface] cannot observe visibility of missing node {target}");
            return None;
        }
        let intersecting = tree.is_intersecting(target, margin);
        let (events, receiver) = unbounded_channel();
        let _ = events.send(intersecting);
        let id = tree.next_watch;
        tree.next_watch += 1;
        tree.visibility_watches.insert(
            id,
            VisibilityWatch {
                target,
                margin,
                intersecting,
                events,
            },
        );
        Some(IntersectionObserver {
            events: receiver,
            _subscription: Subscription {
                tree: Arc::downgrade(&self.tree),
                id,
            },
        })
    }

    /// Live subscriptions, for leak checks.
    pub fn observer_count(&self) -> usize {
        let tree = self.lock();
        tree.child_watches.len() + tree.visibility_watches.len()
    }
}

/// Removes its watch from the tree when dropped.
struct Subscription {
    tree: Weak<Mutex<Tree>>,
    id: u64,
}

impl Drop for Subscription {
    fn drop(&mut self) {
        let Some(tree) = self.tree.upgrade() else {
            return;
        };
        let mut tree = tree.lock().unwrap_or_else(PoisonError::into_inner);
        tree.child_watches.remove(&self.id);
        tree.visibility_watches.remove(&self.id);
    }
}

/// Child additions (and optionally removals) under one node.
///
/// `recv` yields `None` once the observed node is removed.
pub struct ChildObserver {
    events: UnboundedReceiver<ChildEvent>,
    _subscription: Subscription,
}

impl ChildObserver {
    pub async fn recv(&mut self) -> Option<ChildEvent> {
        self.events.recv().await
    }

    pub fn try_recv(&mut self) -> Option<ChildEvent> {
        self.events.try_recv().ok()
    }
}

/// Intersection state of one node: the initial state, then transitions.
pub struct IntersectionObserver {
    events: UnboundedReceiver<bool>,
    _subscription: Subscription,
}

impl IntersectionObserver {
    pub async fn recv(&mut self) -> Option<bool> {
        self.events.recv().await
    }

    pub fn try_recv(&mut self) -> Option<bool> {
        self.events.try_recv().ok()
    }

    /// Wait for the first intersecting state. `false` if the target went away
    /// first.
    pub async fn intersecting(&mut self) -> bool {
        while let Some(intersecting) = self.recv().await {
            if intersecting {
                return true;
            }
        }
        false
    }

    /// Resolves once the target node is removed.
    pub async fn closed(&mut self) {
        while self.recv().await.is_some() {}
    }
}

#[cfg(test)]
#[path = "../tests/src/surface_tests.rs"]
mod tests;
