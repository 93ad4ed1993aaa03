//! Snapshot Storage
//!
//! Owns every frame's snapshot history, the per-context resource lists and the
//! per-page screencast frames, and hands out one renderer per snapshot.

use super::renderer::SnapshotRenderer;
use super::rewrite::rewrite_url_for_custom_protocol;
use crate::cache::{LruCache, RenderCache, DEFAULT_RENDER_CACHE_BYTES};
use crate::trace::snapshot::{FrameSnapshot, ResourceSnapshot};
use crate::trace::ScreencastFrame;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

type Shared<T> = Arc<RwLock<T>>;

/// History of one frame
struct FrameSnapshots {
    raw: Shared<Vec<Arc<FrameSnapshot>>>,
    renderers: Vec<Arc<SnapshotRenderer>>,
}

/// Snapshot and resource store for one loaded trace.
pub struct SnapshotStorage {
    cache: Arc<RenderCache>,
    frames: Vec<FrameSnapshots>,
    /// Frame id (and page id, for main frames) -> index into `frames`
    by_id: HashMap<String, usize>,
    context_resources: HashMap<String, Shared<Vec<ResourceSnapshot>>>,
    screencast_frames: HashMap<String, Shared<Vec<ScreencastFrame>>>,
    next_renderer_id: u64,
}

impl Default for SnapshotStorage {
    fn default() -> Self {
        Self::new(DEFAULT_RENDER_CACHE_BYTES)
    }
}

impl SnapshotStorage {
    /// Create an empty store whose render cache holds at most `cache_bytes`.
    pub fn new(cache_bytes: usize) -> Self {
        Self {
            cache: Arc::new(LruCache::new(cache_bytes)),
            frames: Vec::new(),
            by_id: HashMap::new(),
            context_resources: HashMap::new(),
            screencast_frames: HashMap::new(),
            next_renderer_id: 0,
        }
    }

    /// Render cache shared by all renderers of this store.
    pub fn render_cache(&self) -> &Arc<RenderCache> {
        &self.cache
    }

    /// Record a network resource for a context and return it with its URL
    /// rewritten for replay. Ordering is fixed up in [`finalize`](Self::finalize).
    pub fn add_resource(
        &mut self,
        context_id: &str,
        mut resource: ResourceSnapshot,
    ) -> ResourceSnapshot {
        resource.request.url = rewrite_url_for_custom_protocol(&resource.request.url);
        self.resources_for_context(context_id).write().push(resource.clone());
        resource
    }

    /// Record a screencast frame for its page.
    pub fn add_screencast_frame(&mut self, frame: ScreencastFrame) {
        self.screencast_for_page(&frame.page_id).write().push(frame);
    }

    /// Append a DOM snapshot to its frame's history and return its renderer.
    pub fn add_frame_snapshot(
        &mut self,
        context_id: &str,
        mut snapshot: FrameSnapshot,
    ) -> Arc<SnapshotRenderer> {
        for resource_override in snapshot.resource_overrides.iter_mut() {
            resource_override.url = rewrite_url_for_custom_protocol(&resource_override.url);
        }

        let slot = match self.by_id.get(&snapshot.frame_id) {
            Some(slot) => *slot,
            None => {
                let slot = self.frames.len();
                self.frames.push(FrameSnapshots {
                    raw: Arc::new(RwLock::new(Vec::new())),
                    renderers: Vec::new(),
                });
                self.by_id.insert(snapshot.frame_id.clone(), slot);
                if snapshot.is_main_frame {
                    self.by_id.insert(snapshot.page_id.clone(), slot);
                }
                slot
            }
        };

        let resources = self.resources_for_context(context_id);
        let screencast = self.screencast_for_page(&snapshot.page_id);
        let id = self.next_renderer_id;
        self.next_renderer_id += 1;

        let frame = &mut self.frames[slot];
        let snapshot = Arc::new(snapshot);
        let index = {
            let mut raw = frame.raw.write();
            raw.push(Arc::clone(&snapshot));
            raw.len() - 1
        };
        let renderer = Arc::new(SnapshotRenderer::new(
            id,
            Arc::clone(&self.cache),
            resources,
            Arc::clone(&frame.raw),
            screencast,
            index,
            snapshot,
        ));
        frame.renderers.push(Arc::clone(&renderer));
        renderer
    }

    /// Renderer for the named snapshot of a page or frame.
    pub fn snapshot_by_name(
        &self,
        page_or_frame_id: &str,
        name: &str,
    ) -> Option<Arc<SnapshotRenderer>> {
        let slot = *self.by_id.get(page_or_frame_id)?;
        self.frames[slot]
            .renderers
            .iter()
            .find(|r| r.snapshot_name() == Some(name))
            .cloned()
    }

    /// All renderers of a page or frame, oldest first.
    pub fn renderers(&self, page_or_frame_id: &str) -> Vec<Arc<SnapshotRenderer>> {
        self.by_id
            .get(page_or_frame_id)
            .map(|slot| self.frames[*slot].renderers.clone())
            .unwrap_or_default()
    }

    /// Ids (frame ids and main-frame page ids) that own at least one snapshot.
    pub fn frame_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.by_id.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Resources recorded for a context, in their current order.
    pub fn resources(&self, context_id: &str) -> Vec<ResourceSnapshot> {
        self.context_resources
            .get(context_id)
            .map(|r| r.read().clone())
            .unwrap_or_default()
    }

    /// Stable-sort every context's resources by capture time.
    pub fn finalize(&mut self) {
        for (context_id, resources) in &self.context_resources {
            let mut resources = resources.write();
            resources.sort_by(|a, b| {
                let a = a.monotonic_time.unwrap_or(0.0);
                let b = b.monotonic_time.unwrap_or(0.0);
                a.total_cmp(&b)
            });
            debug!(context = %context_id, resources = resources.len(), "Sorted context resources");
        }
    }

    fn resources_for_context(&mut self, context_id: &str) -> Shared<Vec<ResourceSnapshot>> {
        Arc::clone(
            self.context_resources
                .entry(context_id.to_string())
                .or_insert_with(|| Arc::new(RwLock::new(Vec::new()))),
        )
    }

    fn screencast_for_page(&mut self, page_id: &str) -> Shared<Vec<ScreencastFrame>> {
        Arc::clone(
            self.screencast_frames
                .entry(page_id.to_string())
                .or_insert_with(|| Arc::new(RwLock::new(Vec::new()))),
        )
    }
}
