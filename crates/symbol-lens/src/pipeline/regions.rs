//! Attaching the lens to file regions as they appear on the surface.

use futures::{
    FutureExt,
    future::{BoxFuture, join_all},
};
use tokio::{select, task::JoinHandle, task::JoinSet};
use tracing::{debug, warn};

use super::Lens;
use crate::surface::{ChildEvent, ChildObserver, FileRegion, NodeId, NodeKind};

impl Lens {
    /// Watch `root` for file regions, including those that show up later
    /// inside progressive containers. Each region touches its commits when
    /// attached and prefetches its stencils once it comes within the
    /// configured margin of the viewport.
    ///
    /// The task ends when `root` is removed; aborting it detaches every
    /// region it attached.
    pub fn watch(
        &self,
        root: NodeId,
    ) -> Option<JoinHandle<()>> {
        let observer = self.surface().observe_new_children(root)?;
        Some(tokio::spawn(self.clone().watch_children(root, observer)))
    }

    fn watch_children(
        self,
        parent: NodeId,
        mut observer: ChildObserver,
    ) -> BoxFuture<'static, ()> {
        async move {
            let mut attached = JoinSet::new();
            loop {
                select! {
                    event = observer.recv() => match event {
                        Some(ChildEvent::Added(child)) => self.attach(child, &mut attached),
                        Some(ChildEvent::Removed(_)) => {},
                        None => break,
                    },
                    Some(joined) = attached.join_next(), if !attached.is_empty() => {
                        if let Err(error) = joined
                            && error.is_panic()
                        {
                            warn!("[pipeline] region task under {parent} panicked");
                        }
                    },
                }
            }
            debug!("[pipeline] stopped watching {parent}");
        }
        .boxed()
    }

    fn attach(
        &self,
        child: NodeId,
        attached: &mut JoinSet<()>,
    ) {
        match self.surface().kind(child) {
            Some(NodeKind::Progressive) => {
                if let Some(observer) = self.surface().observe_new_children(child) {
                    debug!("[pipeline] descending into progressive container {child}");
                    attached.spawn(self.clone().watch_children(child, observer));
                }
            },
            Some(NodeKind::Region(region)) => {
                attached.spawn(self.clone().track_region(child, region));
            },
            _ => {},
        }
    }

    async fn track_region(
        self,
        node: NodeId,
        region: FileRegion,
    ) {
        self.register_region(node, &region);
        for file in region.revisions() {
            self.touch(file.repo_commit());
        }
        let margin = f64::from(self.inner.settings.visibility.root_margin_px);
        let Some(mut visibility) = self.surface().observe_intersection(node, margin) else {
            self.forget_region(node);
            return;
        };

        if visibility.intersecting().await {
            select! {
                _ = self.prefetch(node, &region) => {},
                _ = visibility.closed() => {
                    debug!("[pipeline] region {node} removed while fetching stencils");
                },
            }
            visibility.closed().await;
        }
        self.forget_region(node);
    }

    /// Fetch the stencil of every revision the region shows.
    async fn prefetch(
        &self,
        node: NodeId,
        region: &FileRegion,
    ) {
        let files = region.revisions();
        let fetches = files.iter().map(|file| self.stencils().get(self.stencil_key(file)));
        let results = join_all(fetches).await;

        for (file, result) in files.into_iter().zip(results) {
            match result {
                Ok(stencil) => {
                    debug!("[pipeline] region {node}: {} ranges for {file}", stencil.len());
                    if self.underline_enabled() {
                        self.underline_region(node, region, file, &stencil);
                    }
                },
                Err(error) if error.is_unsupported() => {
                    self.mark_unsupported(node);
                    return;
                },
                Err(error) if error.is_not_ready() => {
                    debug!("[pipeline] stencil for {file} not ready yet");
                },
                Err(error) => {
                    warn!("[pipeline] stencil prefetch for {file} failed: {error}");
                },
            }
        }
    }
}
