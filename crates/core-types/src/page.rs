//! Searchable page model
//!
//! An arena-backed element tree standing in for "a tree of elements queryable
//! by id/name/attribute/text/position". Adapters populate it from a live
//! document; the locator strategies and step executor only ever see this
//! abstraction. Nested documents (iframes, shadow roots) hang off their host
//! node as sub-models.

use crate::bundle::{BoundingBox, FrameDescriptor};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Handle into a [`PageModel`] arena. Only meaningful for the model that
/// produced it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NodeId(pub usize);

/// One element of the tree.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ElementNode {
    pub tag: String,
    #[serde(default)]
    pub attributes: BTreeMap<String, String>,
    #[serde(default)]
    pub classes: Vec<String>,
    /// Own text content (not including descendants).
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub bounding: Option<BoundingBox>,
    #[serde(default = "default_true")]
    pub visible: bool,
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_opacity")]
    pub opacity: f64,
    #[serde(default)]
    pub content_editable: bool,
    /// Nested document when this node is an iframe host.
    #[serde(default)]
    pub frame_content: Option<Box<PageModel>>,
    /// Nested tree when this node hosts a shadow root.
    #[serde(default)]
    pub shadow_content: Option<Box<PageModel>>,
    #[serde(default)]
    parent: Option<NodeId>,
    #[serde(default)]
    children: Vec<NodeId>,
}

fn default_true() -> bool {
    true
}

fn default_opacity() -> f64 {
    1.0
}

impl ElementNode {
    pub fn new(tag: impl Into<String>) -> Self {
        Self {
            tag: tag.into().to_ascii_lowercase(),
            attributes: BTreeMap::new(),
            classes: Vec::new(),
            text: None,
            bounding: None,
            visible: true,
            enabled: true,
            opacity: 1.0,
            content_editable: false,
            frame_content: None,
            shadow_content: None,
            parent: None,
            children: Vec::new(),
        }
    }

    pub fn with_attr(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    pub fn with_id(self, id: impl Into<String>) -> Self {
        self.with_attr("id", id)
    }

    pub fn with_name(self, name: impl Into<String>) -> Self {
        self.with_attr("name", name)
    }

    pub fn with_placeholder(self, placeholder: impl Into<String>) -> Self {
        self.with_attr("placeholder", placeholder)
    }

    pub fn with_aria_label(self, label: impl Into<String>) -> Self {
        self.with_attr("aria-label", label)
    }

    pub fn with_class(mut self, class: impl Into<String>) -> Self {
        self.classes.push(class.into());
        self
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }

    pub fn with_bounding(mut self, bounding: BoundingBox) -> Self {
        self.bounding = Some(bounding);
        self
    }

    pub fn hidden(mut self) -> Self {
        self.visible = false;
        self
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    pub fn with_opacity(mut self, opacity: f64) -> Self {
        self.opacity = opacity;
        self
    }

    pub fn editable(mut self) -> Self {
        self.content_editable = true;
        self
    }

    pub fn with_frame(mut self, content: PageModel) -> Self {
        self.frame_content = Some(Box::new(content));
        self
    }

    pub fn with_shadow(mut self, content: PageModel) -> Self {
        self.shadow_content = Some(Box::new(content));
        self
    }

    pub fn attr(&self, key: &str) -> Option<&str> {
        self.attributes.get(key).map(String::as_str)
    }

    pub fn id_attr(&self) -> Option<&str> {
        self.attr("id")
    }

    pub fn name_attr(&self) -> Option<&str> {
        self.attr("name")
    }

    pub fn has_class(&self, class: &str) -> bool {
        self.classes.iter().any(|c| c == class)
    }
}

/// Arena of elements with the document root at index 0.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageModel {
    pub url: String,
    nodes: Vec<ElementNode>,
}

impl PageModel {
    /// Create a model with an `html` root node.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            nodes: vec![ElementNode::new("html")],
        }
    }

    pub const ROOT: NodeId = NodeId(0);

    /// Append `node` as the last child of `parent`.
    pub fn append(&mut self, parent: NodeId, mut node: ElementNode) -> NodeId {
        let id = NodeId(self.nodes.len());
        node.parent = Some(parent);
        self.nodes.push(node);
        self.nodes[parent.0].children.push(id);
        id
    }

    /// Append directly under the document root.
    pub fn append_root(&mut self, node: ElementNode) -> NodeId {
        self.append(Self::ROOT, node)
    }

    pub fn node(&self, id: NodeId) -> &ElementNode {
        &self.nodes[id.0]
    }

    pub fn node_mut(&mut self, id: NodeId) -> &mut ElementNode {
        &mut self.nodes[id.0]
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn parent_of(&self, id: NodeId) -> Option<NodeId> {
        self.nodes[id.0].parent
    }

    pub fn children_of(&self, id: NodeId) -> &[NodeId] {
        &self.nodes[id.0].children
    }

    /// All node ids in document order.
    pub fn ids(&self) -> impl Iterator<Item = NodeId> + '_ {
        (0..self.nodes.len()).map(NodeId)
    }

    pub fn find_where<F>(&self, mut pred: F) -> Vec<NodeId>
    where
        F: FnMut(&ElementNode) -> bool,
    {
        self.ids().filter(|id| pred(self.node(*id))).collect()
    }

    pub fn find_by_attr(&self, key: &str, value: &str) -> Vec<NodeId> {
        self.find_where(|n| n.attr(key) == Some(value))
    }

    pub fn find_by_id(&self, id: &str) -> Vec<NodeId> {
        self.find_by_attr("id", id)
    }

    pub fn find_by_name(&self, name: &str) -> Vec<NodeId> {
        self.find_by_attr("name", name)
    }

    pub fn find_by_tag(&self, tag: &str) -> Vec<NodeId> {
        let tag = tag.to_ascii_lowercase();
        self.find_where(|n| n.tag == tag)
    }

    /// Own text plus descendant text, document order, whitespace-joined.
    pub fn deep_text(&self, id: NodeId) -> String {
        let mut parts = Vec::new();
        self.collect_text(id, &mut parts);
        parts.join(" ")
    }

    fn collect_text(&self, id: NodeId, parts: &mut Vec<String>) {
        if let Some(text) = &self.node(id).text {
            let trimmed = text.trim();
            if !trimmed.is_empty() {
                parts.push(trimmed.to_string());
            }
        }
        for child in self.children_of(id) {
            self.collect_text(*child, parts);
        }
    }

    /// 1-based position among siblings that share this node's tag, the
    /// convention XPath positional predicates use.
    pub fn sibling_index(&self, id: NodeId) -> usize {
        let tag = &self.node(id).tag;
        match self.parent_of(id) {
            Some(parent) => {
                let mut index = 0;
                for sibling in self.children_of(parent) {
                    if &self.node(*sibling).tag == tag {
                        index += 1;
                    }
                    if *sibling == id {
                        break;
                    }
                }
                index
            }
            None => 1,
        }
    }

    /// Locate the sub-document hosted by the iframe matching `descriptor`.
    pub fn find_frame(&self, descriptor: &FrameDescriptor) -> Option<&PageModel> {
        self.frame_host(descriptor)
            .and_then(|id| self.nodes[id.0].frame_content.as_deref())
    }

    /// Mutable access to the sub-document hosted by the matching iframe.
    pub fn find_frame_mut(&mut self, descriptor: &FrameDescriptor) -> Option<&mut PageModel> {
        self.frame_host(descriptor)
            .and_then(|id| self.nodes[id.0].frame_content.as_deref_mut())
    }

    fn frame_host(&self, descriptor: &FrameDescriptor) -> Option<NodeId> {
        let mut frame_ordinal = 0;
        for id in self.ids() {
            let node = self.node(id);
            if node.frame_content.is_none() {
                continue;
            }
            let matched = match descriptor {
                FrameDescriptor { id: Some(want), .. } => node.id_attr() == Some(want.as_str()),
                FrameDescriptor {
                    name: Some(want), ..
                } => node.name_attr() == Some(want.as_str()),
                FrameDescriptor { src: Some(want), .. } => node.attr("src") == Some(want.as_str()),
                FrameDescriptor {
                    index: Some(want), ..
                } => frame_ordinal == *want,
                _ => false,
            };
            if matched {
                return Some(id);
            }
            frame_ordinal += 1;
        }
        None
    }

    /// Locate the shadow tree hosted by the element named by `host`.
    ///
    /// Host path strings are matched against the host's `#id`, raw id, or
    /// tag name - the forms the recorder emits.
    pub fn find_shadow_root(&self, host: &str) -> Option<&PageModel> {
        self.shadow_host(host)
            .and_then(|id| self.nodes[id.0].shadow_content.as_deref())
    }

    /// Mutable access to the shadow tree hosted by the element named by
    /// `host`.
    pub fn find_shadow_root_mut(&mut self, host: &str) -> Option<&mut PageModel> {
        self.shadow_host(host)
            .and_then(|id| self.nodes[id.0].shadow_content.as_deref_mut())
    }

    fn shadow_host(&self, host: &str) -> Option<NodeId> {
        for id in self.ids() {
            let node = self.node(id);
            if node.shadow_content.is_none() {
                continue;
            }
            let matched = if let Some(want) = host.strip_prefix('#') {
                node.id_attr() == Some(want)
            } else {
                node.id_attr() == Some(host) || node.tag == host.to_ascii_lowercase()
            };
            if matched {
                return Some(id);
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_page() -> PageModel {
        let mut page = PageModel::new("https://example.com/login");
        let form = page.append_root(ElementNode::new("form").with_id("login-form"));
        page.append(
            form,
            ElementNode::new("input")
                .with_id("username")
                .with_name("username")
                .with_placeholder("Username"),
        );
        page.append(
            form,
            ElementNode::new("input")
                .with_id("password")
                .with_name("password"),
        );
        let button = page.append(
            form,
            ElementNode::new("button").with_class("primary").with_text("Sign in"),
        );
        page.append(button, ElementNode::new("span").with_text("now"));
        page
    }

    #[test]
    fn queries_by_id_name_tag() {
        let page = sample_page();
        assert_eq!(page.find_by_id("username").len(), 1);
        assert_eq!(page.find_by_name("password").len(), 1);
        assert_eq!(page.find_by_tag("input").len(), 2);
        assert!(page.find_by_id("missing").is_empty());
    }

    #[test]
    fn deep_text_joins_descendants() {
        let page = sample_page();
        let button = page.find_by_tag("button")[0];
        assert_eq!(page.deep_text(button), "Sign in now");
    }

    #[test]
    fn sibling_index_counts_same_tag_only() {
        let page = sample_page();
        let inputs = page.find_by_tag("input");
        assert_eq!(page.sibling_index(inputs[0]), 1);
        assert_eq!(page.sibling_index(inputs[1]), 2);
        let button = page.find_by_tag("button")[0];
        assert_eq!(page.sibling_index(button), 1);
    }

    #[test]
    fn frame_lookup_by_name_and_index() {
        let mut page = PageModel::new("https://example.com");
        let inner = PageModel::new("https://example.com/inner");
        page.append_root(
            ElementNode::new("iframe")
                .with_name("content")
                .with_frame(inner),
        );

        assert!(page.find_frame(&FrameDescriptor::by_name("content")).is_some());
        assert!(page
            .find_frame(&FrameDescriptor {
                index: Some(0),
                ..Default::default()
            })
            .is_some());
        assert!(page.find_frame(&FrameDescriptor::by_name("other")).is_none());
    }

    #[test]
    fn mutable_frame_lookup_reaches_the_inner_document() {
        let mut inner = PageModel::new("https://example.com/inner");
        inner.append_root(ElementNode::new("input").with_id("field"));
        let mut page = PageModel::new("https://example.com");
        page.append_root(
            ElementNode::new("iframe")
                .with_name("content")
                .with_frame(inner),
        );

        let framed = page.find_frame_mut(&FrameDescriptor::by_name("content")).unwrap();
        let field = framed.find_by_id("field")[0];
        framed
            .node_mut(field)
            .attributes
            .insert("value".to_string(), "typed".to_string());

        let framed = page.find_frame(&FrameDescriptor::by_name("content")).unwrap();
        let field = framed.find_by_id("field")[0];
        assert_eq!(framed.node(field).attr("value"), Some("typed"));
        assert!(page.find_frame_mut(&FrameDescriptor::by_name("other")).is_none());
    }

    #[test]
    fn shadow_root_lookup_by_host_id() {
        let mut page = PageModel::new("https://example.com");
        let mut shadow = PageModel::new("https://example.com");
        shadow.append_root(ElementNode::new("button").with_text("Inside"));
        page.append_root(
            ElementNode::new("custom-widget")
                .with_id("widget")
                .with_shadow(shadow),
        );

        assert!(page.find_shadow_root("#widget").is_some());
        assert!(page.find_shadow_root("custom-widget").is_some());
        assert!(page.find_shadow_root("#other").is_none());
    }
}
