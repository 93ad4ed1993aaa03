//! Snapshot payloads carried by `frame-snapshot` and `resource-snapshot` events.
//!
//! DOM trees arrive as nested JSON arrays. They are flattened into an arena on
//! decode so that subtree references from later snapshots can be resolved with
//! plain integer indexing.

use crate::types::{FrameId, PageId, Sha1, Viewport};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Index of a node inside a [`DomTree`] arena
pub type NodeId = usize;

/// One node of a captured DOM tree.
#[derive(Debug, Clone, PartialEq)]
pub enum DomNode {
    /// Plain text content.
    Text(String),
    /// `[tagName, attributes, ...children]`.
    Element {
        name: String,
        attrs: Vec<(String, String)>,
        children: Vec<NodeId>,
    },
    /// `[[snapshotDistance, nodeIndex]]`: reuse a node from an earlier snapshot
    /// of the same frame.
    Reference { distance: i64, index: i64 },
    /// Anything else. Renders as nothing.
    Invalid,
}

/// Arena-backed DOM tree.
///
/// Nodes are stored in post-order, so a node's children always precede it.
/// `flat` lists the text and element nodes in post-order; that is the index
/// space subtree references point into.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DomTree {
    nodes: Vec<DomNode>,
    flat: Vec<NodeId>,
}

impl DomTree {
    /// Root node, if the tree holds anything.
    pub fn root(&self) -> Option<NodeId> {
        self.nodes.len().checked_sub(1)
    }

    pub fn node(&self, id: NodeId) -> Option<&DomNode> {
        self.nodes.get(id)
    }

    /// Arena id of the `index`-th text/element node in post-order.
    pub fn flat_node(&self, index: i64) -> Option<NodeId> {
        usize::try_from(index)
            .ok()
            .and_then(|i| self.flat.get(i).copied())
    }

    /// Number of nodes addressable by subtree references.
    pub fn flat_len(&self) -> usize {
        self.flat.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Flatten `value` into the arena. Walks with an explicit stack so that
    /// deeply nested pages do not exhaust the thread stack.
    fn push(&mut self, value: &Value) -> NodeId {
        let mut open: Vec<OpenElement<'_>> = Vec::new();
        let mut current = value;
        'descend: loop {
            let mut finished = match element_parts(current) {
                Some((name, attrs, children)) => {
                    open.push(OpenElement {
                        name,
                        attrs,
                        pending: children.iter(),
                        children: Vec::new(),
                    });
                    None
                }
                None => Some(self.push_leaf(current)),
            };
            while let Some(mut top) = open.pop() {
                if let Some(id) = finished.take() {
                    top.children.push(id);
                }
                if let Some(next) = top.pending.next() {
                    current = next;
                    open.push(top);
                    continue 'descend;
                }
                finished = Some(self.push_element(top));
            }
            // The root is always the last node finished.
            return finished.unwrap_or_default();
        }
    }

    fn push_leaf(&mut self, value: &Value) -> NodeId {
        let id = self.nodes.len();
        match value {
            Value::String(text) => {
                self.nodes.push(DomNode::Text(text.clone()));
                self.flat.push(id);
            }
            Value::Array(items) => match items.first() {
                Some(Value::Array(reference)) => self.nodes.push(DomNode::Reference {
                    distance: reference.first().and_then(as_integer).unwrap_or(-1),
                    index: reference.get(1).and_then(as_integer).unwrap_or(-1),
                }),
                _ => self.nodes.push(DomNode::Invalid),
            },
            _ => self.nodes.push(DomNode::Invalid),
        }
        id
    }

    fn push_element(&mut self, element: OpenElement<'_>) -> NodeId {
        let id = self.nodes.len();
        self.nodes.push(DomNode::Element {
            name: element.name.to_string(),
            attrs: element.attrs,
            children: element.children,
        });
        self.flat.push(id);
        id
    }
}

/// Element whose children are still being flattened.
struct OpenElement<'v> {
    name: &'v str,
    attrs: Vec<(String, String)>,
    pending: std::slice::Iter<'v, Value>,
    children: Vec<NodeId>,
}

/// Split `[tagName, attributes, ...children]` into its parts.
fn element_parts(value: &Value) -> Option<(&str, Vec<(String, String)>, &[Value])> {
    let items = value.as_array()?;
    let name = items.first()?.as_str()?;
    let attrs = match items.get(1) {
        Some(Value::Object(map)) => map
            .iter()
            .map(|(k, v)| (k.clone(), attribute_value(v)))
            .collect(),
        _ => Vec::new(),
    };
    Some((name, attrs, items.get(2..).unwrap_or(&[])))
}

fn as_integer(value: &Value) -> Option<i64> {
    value
        .as_i64()
        .or_else(|| value.as_f64().map(|f| f as i64))
}

fn attribute_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

impl From<&Value> for DomTree {
    fn from(value: &Value) -> Self {
        let mut tree = DomTree::default();
        if !value.is_null() {
            tree.push(value);
        }
        tree
    }
}

impl From<Value> for DomTree {
    fn from(value: Value) -> Self {
        DomTree::from(&value)
    }
}

impl<'de> Deserialize<'de> for DomTree {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        Value::deserialize(deserializer).map(DomTree::from)
    }
}

/// Substitutes the body of a GET resource at replay time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceOverride {
    pub url: String,
    #[serde(default)]
    pub sha1: Option<Sha1>,
    #[serde(default, rename = "ref")]
    pub reference: Option<i64>,
}

/// One DOM capture of one frame.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FrameSnapshot {
    #[serde(default)]
    pub snapshot_name: Option<String>,
    #[serde(default)]
    pub call_id: String,
    pub page_id: PageId,
    pub frame_id: FrameId,
    #[serde(default)]
    pub frame_url: String,
    #[serde(default)]
    pub timestamp: f64,
    #[serde(default)]
    pub wall_time: Option<f64>,
    #[serde(default)]
    pub doctype: Option<String>,
    #[serde(default)]
    pub html: DomTree,
    #[serde(default)]
    pub resource_overrides: Vec<ResourceOverride>,
    #[serde(default)]
    pub viewport: Viewport,
    #[serde(default)]
    pub is_main_frame: bool,
}

/// HAR name/value pair
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HarHeader {
    pub name: String,
    #[serde(default)]
    pub value: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HarPostData {
    #[serde(default)]
    pub mime_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, rename = "_sha1", skip_serializing_if = "Option::is_none")]
    pub sha1: Option<Sha1>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HarRequest {
    pub url: String,
    #[serde(default = "default_method")]
    pub method: String,
    #[serde(default)]
    pub headers: Vec<HarHeader>,
    #[serde(default)]
    pub query_string: Vec<HarHeader>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub post_data: Option<HarPostData>,
}

fn default_method() -> String {
    "GET".to_string()
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HarContent {
    #[serde(default)]
    pub mime_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, rename = "_sha1", skip_serializing_if = "Option::is_none")]
    pub sha1: Option<Sha1>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HarResponse {
    #[serde(default)]
    pub status: i64,
    #[serde(default)]
    pub status_text: String,
    #[serde(default)]
    pub headers: Vec<HarHeader>,
    #[serde(default)]
    pub content: HarContent,
}

/// One captured request/response pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceSnapshot {
    #[serde(default, rename = "_frameref", skip_serializing_if = "Option::is_none")]
    pub frame_ref: Option<FrameId>,
    pub request: HarRequest,
    pub response: HarResponse,
    #[serde(default, rename = "_monotonicTime", skip_serializing_if = "Option::is_none")]
    pub monotonic_time: Option<f64>,
}
