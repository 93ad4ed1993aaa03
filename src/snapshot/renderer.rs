//! Snapshot Renderer
//!
//! Rebuilds one captured frame into a self-contained HTML document. Subtree
//! references are resolved against earlier snapshots of the same frame, and
//! URLs are rewritten so the document can be replayed from a sandboxed origin.

use super::rewrite::{
    escape_html, escape_html_attribute, escape_urls_in_stylesheet, rewrite_url_for_custom_protocol,
    rewrite_urls_in_stylesheet,
};
use crate::cache::RenderCache;
use crate::trace::snapshot::{DomNode, FrameSnapshot, NodeId, ResourceSnapshot};
use crate::trace::ScreencastFrame;
use crate::types::{FrameId, PageId, Sha1, Viewport};
use parking_lot::RwLock;
use std::sync::Arc;

/// Script injected ahead of every rendered document.
const BOOTSTRAP_SCRIPT: &str = include_str!("bootstrap.js");

const CURRENT_SRC_ATTRIBUTE: &str = "__playwright_current_src__";

/// Elements that never get a closing tag.
const VOID_ELEMENTS: &[&str] = &[
    "AREA", "BASE", "BR", "COL", "COMMAND", "EMBED", "HR", "IMG", "INPUT", "KEYGEN", "LINK",
    "MENUITEM", "META", "PARAM", "SOURCE", "TRACK", "WBR",
];

/// Output of [`SnapshotRenderer::render`]
#[derive(Debug, Clone)]
pub struct RenderedFrameSnapshot {
    pub html: Arc<str>,
    pub page_id: PageId,
    pub frame_id: FrameId,
    /// Position of the snapshot in its frame's history
    pub index: usize,
}

/// Renders the snapshot at one position of a frame's history.
pub struct SnapshotRenderer {
    id: u64,
    cache: Arc<RenderCache>,
    resources: Arc<RwLock<Vec<ResourceSnapshot>>>,
    snapshots: Arc<RwLock<Vec<Arc<FrameSnapshot>>>>,
    screencast_frames: Arc<RwLock<Vec<ScreencastFrame>>>,
    index: usize,
    snapshot: Arc<FrameSnapshot>,
}

impl std::fmt::Debug for SnapshotRenderer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SnapshotRenderer")
            .field("id", &self.id)
            .field("index", &self.index)
            .field("frame_id", &self.snapshot.frame_id)
            .field("snapshot_name", &self.snapshot.snapshot_name)
            .finish()
    }
}

impl SnapshotRenderer {
    pub(crate) fn new(
        id: u64,
        cache: Arc<RenderCache>,
        resources: Arc<RwLock<Vec<ResourceSnapshot>>>,
        snapshots: Arc<RwLock<Vec<Arc<FrameSnapshot>>>>,
        screencast_frames: Arc<RwLock<Vec<ScreencastFrame>>>,
        index: usize,
        snapshot: Arc<FrameSnapshot>,
    ) -> Self {
        Self {
            id,
            cache,
            resources,
            snapshots,
            screencast_frames,
            index,
            snapshot,
        }
    }

    /// Cache identity of this renderer.
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn snapshot_name(&self) -> Option<&str> {
        self.snapshot.snapshot_name.as_deref()
    }

    pub fn snapshot(&self) -> &FrameSnapshot {
        &self.snapshot
    }

    pub fn viewport(&self) -> Viewport {
        self.snapshot.viewport
    }

    /// Screencast frame nearest to the capture time of this snapshot.
    pub fn closest_screenshot(&self) -> Option<Sha1> {
        let frames = self.screencast_frames.read();
        let first_swap = frames
            .first()
            .and_then(|f| f.frame_swap_wall_time)
            .filter(|t| *t != 0.0);
        let closest = match (self.snapshot.wall_time.filter(|t| *t != 0.0), first_swap) {
            (Some(wall_time), Some(_)) => find_closest(
                &frames,
                |f| f.frame_swap_wall_time.unwrap_or(0.0),
                wall_time,
            ),
            _ => find_closest(&frames, |f| f.timestamp, self.snapshot.timestamp),
        };
        closest.map(|f| f.sha1.clone())
    }

    /// Render the snapshot, reusing the cached document when present.
    pub fn render(&self) -> RenderedFrameSnapshot {
        let html = self.cache.get_or_compute(self.id, || {
            let snapshots = self.snapshots.read();
            let html = self.build_document(&snapshots);
            let size = html.len();
            (Arc::from(html), size)
        });
        RenderedFrameSnapshot {
            html,
            page_id: self.snapshot.page_id.clone(),
            frame_id: self.snapshot.frame_id.clone(),
            index: self.index,
        }
    }

    fn build_document(&self, snapshots: &[Arc<FrameSnapshot>]) -> String {
        let mut visitor = NodeVisitor {
            snapshots,
            out: String::new(),
            active: Vec::new(),
        };
        if let Some(root) = self.snapshot.html.root() {
            visitor.visit(self.index, root, None);
        }

        let mut html = String::with_capacity(visitor.out.len() + BOOTSTRAP_SCRIPT.len() + 256);
        if let Some(doctype) = self.snapshot.doctype.as_deref().filter(|d| !d.is_empty()) {
            html.push_str("<!DOCTYPE ");
            html.push_str(doctype);
            html.push('>');
        }
        html.push_str("<style>*,*::before,*::after { visibility: hidden }</style>");
        html.push_str("<script>");
        html.push_str(&self.bootstrap_invocation());
        html.push_str("</script>");
        html.push_str(&visitor.out);
        html
    }

    fn bootstrap_invocation(&self) -> String {
        let viewport = serde_json::to_string(&self.snapshot.viewport).unwrap_or_else(|_| "{}".into());
        let mut script = format!("\n({})({}", BOOTSTRAP_SCRIPT.trim_end(), viewport);
        for target in [Some(self.snapshot.call_id.as_str()), self.snapshot_name()] {
            script.push_str(", ");
            let encoded = match target {
                Some(id) => serde_json::to_string(id).unwrap_or_else(|_| "null".into()),
                None => "null".to_string(),
            };
            script.push_str(&encoded.replace("</", "<\\/"));
        }
        script.push(')');
        script
    }

    /// Resource this snapshot would have loaded for `url`/`method`.
    ///
    /// Resources captured at or after the snapshot are invisible, 304s are
    /// skipped in favour of the real body, same-frame responses win over
    /// other frames, and GET overrides substitute their body hash.
    pub fn resource_by_url(&self, url: &str, method: &str) -> Option<ResourceSnapshot> {
        let resources = self.resources.read();
        let mut same_frame: Option<&ResourceSnapshot> = None;
        let mut other_frame: Option<&ResourceSnapshot> = None;

        for resource in resources.iter() {
            if let Some(time) = resource.monotonic_time {
                if time >= self.snapshot.timestamp {
                    break;
                }
            }
            if resource.response.status == 304 {
                continue;
            }
            if resource.request.url == url && resource.request.method == method {
                if resource.frame_ref.as_deref() == Some(self.snapshot.frame_id.as_str()) {
                    same_frame = Some(resource);
                } else {
                    other_frame = Some(resource);
                }
            }
        }

        let mut result = same_frame.or(other_frame).cloned()?;
        if method.eq_ignore_ascii_case("GET") {
            let replacement = self
                .snapshot
                .resource_overrides
                .iter()
                .find(|o| o.url == url && o.sha1.as_deref().map_or(false, |s| !s.is_empty()));
            if let Some(o) = replacement {
                result.response.content.sha1 = o.sha1.clone();
            }
        }
        Some(result)
    }
}

fn find_closest<T>(items: &[T], metric: impl Fn(&T) -> f64, target: f64) -> Option<&T> {
    items.iter().enumerate().find_map(|(i, item)| match items.get(i + 1) {
        None => Some(item),
        Some(next) if (metric(item) - target).abs() < (metric(next) - target).abs() => Some(item),
        Some(_) => None,
    })
}

type ParentContext<'a> = Option<(&'a str, &'a [(String, String)])>;

struct NodeVisitor<'a> {
    snapshots: &'a [Arc<FrameSnapshot>],
    out: String,
    /// Elements on the current path; a reference back into one of them is a cycle
    active: Vec<(usize, NodeId)>,
}

/// Remaining stack below which a visit continues on a fresh segment.
const STACK_RED_ZONE: usize = 64 * 1024;
/// Size of each extra stack segment used by deep documents.
const STACK_SEGMENT: usize = 1024 * 1024;

impl<'a> NodeVisitor<'a> {
    fn visit(&mut self, snapshot_index: usize, node: NodeId, parent: ParentContext<'a>) {
        stacker::maybe_grow(STACK_RED_ZONE, STACK_SEGMENT, || {
            self.visit_node(snapshot_index, node, parent)
        })
    }

    fn visit_node(&mut self, snapshot_index: usize, node: NodeId, parent: ParentContext<'a>) {
        let snapshots = self.snapshots;
        let Some(snapshot) = snapshots.get(snapshot_index) else {
            return;
        };
        let tree = &snapshot.html;
        match tree.node(node) {
            Some(DomNode::Text(text)) => {
                let in_style = matches!(parent, Some(("STYLE", _)) | Some(("style", _)));
                if in_style {
                    self.out
                        .push_str(&escape_urls_in_stylesheet(&rewrite_urls_in_stylesheet(text)));
                } else {
                    self.out.push_str(&escape_html(text));
                }
            }
            Some(DomNode::Reference { distance, index }) => {
                let reference_index = snapshot_index as i64 - distance;
                if reference_index < 0 || reference_index > snapshot_index as i64 {
                    return;
                }
                let reference_index = reference_index as usize;
                let Some(target) = snapshots
                    .get(reference_index)
                    .and_then(|s| s.html.flat_node(*index))
                else {
                    return;
                };
                if self.active.contains(&(reference_index, target)) {
                    return;
                }
                self.visit(reference_index, target, parent);
            }
            Some(DomNode::Element {
                name,
                attrs,
                children,
            }) => {
                self.active.push((snapshot_index, node));
                self.visit_element(snapshot_index, name, attrs, children, parent);
                self.active.pop();
            }
            Some(DomNode::Invalid) | None => {}
        }
    }

    fn visit_element(
        &mut self,
        snapshot_index: usize,
        name: &'a str,
        attrs: &'a [(String, String)],
        children: &'a [NodeId],
        parent: ParentContext<'a>,
    ) {
        let node_name = if name == "NOSCRIPT" { "X-NOSCRIPT" } else { name };
        let is_frame = node_name == "IFRAME" || node_name == "FRAME";
        let is_anchor = node_name == "A";
        let is_img = node_name == "IMG";
        let img_with_current_src = is_img && attrs.iter().any(|(k, _)| k == CURRENT_SRC_ATTRIBUTE);
        let source_in_picture_with_current_src = node_name == "SOURCE"
            && matches!(parent, Some(("PICTURE", parent_attrs)) if parent_attrs.iter().any(|(k, _)| k == CURRENT_SRC_ATTRIBUTE));

        self.out.push('<');
        self.out.push_str(node_name);
        for (attr, value) in attrs {
            let lower = attr.to_ascii_lowercase();
            let mut attr_name = attr.clone();
            if is_frame && lower == "src" {
                attr_name = "__playwright_src__".to_string();
            }
            if is_img && attr == CURRENT_SRC_ATTRIBUTE {
                attr_name = "src".to_string();
            }
            if (lower == "src" || lower == "srcset")
                && (img_with_current_src || source_in_picture_with_current_src)
            {
                attr_name = format!("_{}", attr_name);
            }
            let attr_value = if is_anchor && lower == "href" {
                format!("link://{}", value)
            } else if lower == "href" || lower == "src" || attr == CURRENT_SRC_ATTRIBUTE {
                rewrite_url_for_custom_protocol(value)
            } else {
                value.clone()
            };
            self.out.push(' ');
            self.out.push_str(&attr_name);
            self.out.push_str("=\"");
            self.out.push_str(&escape_html_attribute(&attr_value));
            self.out.push('"');
        }
        self.out.push('>');

        for child in children {
            self.visit(snapshot_index, *child, Some((node_name, attrs)));
        }
        if !VOID_ELEMENTS.contains(&node_name) {
            self.out.push_str("</");
            self.out.push_str(node_name);
            self.out.push('>');
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::LruCache;
    use crate::trace::snapshot::DomTree;
    use serde_json::json;

    fn snapshot(html: serde_json::Value) -> Arc<FrameSnapshot> {
        Arc::new(
            serde_json::from_value(json!({
                "snapshotName": "s",
                "callId": "call@1",
                "pageId": "page@1",
                "frameId": "frame@1",
                "frameUrl": "http://x/",
                "timestamp": 100,
                "html": html,
                "resourceOverrides": [],
                "viewport": {"width": 10, "height": 20},
                "isMainFrame": true
            }))
            .unwrap(),
        )
    }

    fn renderer_for(history: Vec<Arc<FrameSnapshot>>, index: usize) -> SnapshotRenderer {
        let snapshot = Arc::clone(&history[index]);
        SnapshotRenderer::new(
            index as u64,
            Arc::new(LruCache::new(1_000_000)),
            Arc::new(RwLock::new(Vec::new())),
            Arc::new(RwLock::new(history)),
            Arc::new(RwLock::new(Vec::new())),
            index,
            snapshot,
        )
    }

    fn body(html: &str) -> &str {
        let end = html.find("</script>").unwrap() + "</script>".len();
        &html[end..]
    }

    #[test]
    fn test_elements_and_text() {
        let r = renderer_for(vec![snapshot(json!(["HTML", {}, ["BODY", {}, "a<b", ["BR", {}]]]))], 0);
        let html = r.render().html;
        assert_eq!(body(&html), "<HTML><BODY>a&lt;b<BR></BODY></HTML>");
    }

    #[test]
    fn test_attribute_rewrites() {
        let r = renderer_for(
            vec![snapshot(json!(["DIV", {},
                ["IFRAME", {"src": "/frame"}],
                ["A", {"href": "page.html"}],
                ["IMG", {"src": "a.png", "srcset": "b.png 2x", "__playwright_current_src__": "http://x/b.png"}],
                ["NOSCRIPT", {}],
                ["LINK", {"href": "custom://h/s.css"}]
            ]))],
            0,
        );
        let html = r.render().html;
        assert_eq!(
            body(&html),
            "<DIV><IFRAME __playwright_src__=\"/frame\"></IFRAME><A href=\"link://page.html\"></A>\
             <IMG _src=\"a.png\" _srcset=\"b.png 2x\" src=\"http://x/b.png\">\
             <X-NOSCRIPT></X-NOSCRIPT><LINK href=\"https://pw-custom--h/s.css\"></DIV>"
        );
    }

    #[test]
    fn test_picture_sources_defer_to_current_src() {
        let r = renderer_for(
            vec![snapshot(json!(["PICTURE", {"__playwright_current_src__": "x"}, ["SOURCE", {"srcset": "y"}]]))],
            0,
        );
        assert!(body(&r.render().html).contains("<SOURCE _srcset=\"y\">"));
    }

    #[test]
    fn test_style_text_is_rewritten_not_escaped() {
        let r = renderer_for(
            vec![snapshot(json!(["STYLE", {}, "a > b { background: url(custom://h/i.png) }"]))],
            0,
        );
        assert_eq!(
            body(&r.render().html),
            "<STYLE>a > b { background: url(https://pw-custom--h/i.png) }</STYLE>"
        );
    }

    #[test]
    fn test_reference_to_previous_snapshot() {
        let first = snapshot(json!(["HTML", {}, ["DIV", {"id": "kept"}, "text"]]));
        // post-order of first: "text"(0), DIV(1), HTML(2)
        let second = snapshot(json!(["HTML", {}, [[1, 1]], ["P", {}]]));
        let html = renderer_for(vec![first, second], 1).render().html;
        assert_eq!(body(&html), "<HTML><DIV id=\"kept\">text</DIV><P></P></HTML>");
    }

    #[test]
    fn test_out_of_range_and_self_references_render_empty() {
        let s = snapshot(json!(["HTML", {}, [[5, 0]], [[0, 99]], [[-1, 0]], ["B", {}, [[0, 1]]]]));
        let html = renderer_for(vec![s], 0).render().html;
        assert_eq!(body(&html), "<HTML><B></B></HTML>");
    }

    #[test]
    fn test_prefix_and_doctype() {
        let mut raw = (*snapshot(json!(["HTML", {}]))).clone();
        raw.doctype = Some("html".to_string());
        let html = renderer_for(vec![Arc::new(raw)], 0).render().html;
        assert!(html.starts_with("<!DOCTYPE html><style>*,*::before,*::after { visibility: hidden }</style><script>"));
        assert!(html.contains("{\"width\":10.0,\"height\":20.0}, \"call@1\", \"s\")"));
    }

    #[test]
    fn test_render_is_cached_and_deterministic() {
        let r = renderer_for(vec![snapshot(json!(["HTML", {}, ["BODY", {}, "x"]]))], 0);
        let a = r.render().html;
        let b = r.render().html;
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn test_find_closest() {
        let items = [1.0, 5.0, 9.0];
        assert_eq!(find_closest(&items, |v| *v, 6.0), Some(&5.0));
        assert_eq!(find_closest(&items, |v| *v, 100.0), Some(&9.0));
        assert_eq!(find_closest(&items, |v| *v, -3.0), Some(&1.0));
        let empty: [f64; 0] = [];
        assert_eq!(find_closest(&empty, |v| *v, 1.0), None);
    }

    fn screencast_frame(sha1: &str, timestamp: f64, wall_time: Option<f64>) -> ScreencastFrame {
        ScreencastFrame {
            page_id: "page@1".to_string(),
            sha1: sha1.to_string(),
            width: 10.0,
            height: 20.0,
            timestamp,
            frame_swap_wall_time: wall_time,
        }
    }

    fn renderer_with_screencast(
        snapshot: Arc<FrameSnapshot>,
        frames: Vec<ScreencastFrame>,
    ) -> SnapshotRenderer {
        SnapshotRenderer::new(
            0,
            Arc::new(LruCache::new(1_000_000)),
            Arc::new(RwLock::new(Vec::new())),
            Arc::new(RwLock::new(vec![Arc::clone(&snapshot)])),
            Arc::new(RwLock::new(frames)),
            0,
            snapshot,
        )
    }

    #[test]
    fn test_closest_screenshot_prefers_wall_clock() {
        let mut raw = (*snapshot(json!(["HTML", {}]))).clone();
        raw.timestamp = 11.0;
        raw.wall_time = Some(2_900.0);
        let frames = vec![
            screencast_frame("first", 10.0, Some(1_000.0)),
            screencast_frame("second", 20.0, Some(2_000.0)),
            screencast_frame("third", 30.0, Some(3_000.0)),
        ];
        let r = renderer_with_screencast(Arc::new(raw.clone()), frames.clone());
        assert_eq!(r.closest_screenshot().as_deref(), Some("third"));

        // Without a wall time the monotonic timestamp decides.
        raw.wall_time = None;
        let r = renderer_with_screencast(Arc::new(raw), frames);
        assert_eq!(r.closest_screenshot().as_deref(), Some("first"));
    }

    #[test]
    fn test_closest_screenshot_without_swap_times_uses_timestamp() {
        let mut raw = (*snapshot(json!(["HTML", {}]))).clone();
        raw.timestamp = 19.0;
        raw.wall_time = Some(1_000.0);
        let frames = vec![
            screencast_frame("first", 10.0, None),
            screencast_frame("second", 20.0, None),
        ];
        let r = renderer_with_screencast(Arc::new(raw), frames);
        assert_eq!(r.closest_screenshot().as_deref(), Some("second"));
        let empty = renderer_with_screencast(snapshot(json!(["HTML", {}])), Vec::new());
        assert_eq!(empty.closest_screenshot(), None);
    }

    #[test]
    fn test_deeply_nested_document_renders() {
        let depth = 500;
        let mut html = json!("leaf");
        for _ in 0..depth {
            html = json!(["DIV", {}, html]);
        }
        let mut raw = (*snapshot(json!(["HTML", {}]))).clone();
        raw.html = DomTree::from(&html);
        let rendered = renderer_for(vec![Arc::new(raw)], 0).render().html;
        let expected = format!("{}leaf{}", "<DIV>".repeat(depth), "</DIV>".repeat(depth));
        assert_eq!(body(&rendered), expected);
    }
}
