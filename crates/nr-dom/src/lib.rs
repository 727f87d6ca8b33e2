//! DOM tree data structures.
//!
//! Nodes live in an arena and are addressed by [`NodeId`]. Removing a node
//! detaches it from the tree; the id stays valid so callers holding ids
//! (caches, pending mutation records) never dangle.

pub mod style;

pub use style::InlineStyle;

use nr_core::GuardError;
use nr_core::GuardResult;
use std::collections::BTreeMap;

/// ID used to address nodes in the DOM arena.
pub type NodeId = u64;

/// Element payload: lowercase tag name plus ordered attributes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ElementData {
    pub tag: String,
    pub attributes: Vec<(String, String)>,
}

impl ElementData {
    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeKind {
    Document,
    Element(ElementData),
    Text(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Node {
    kind: NodeKind,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
}

/// Child-list mutation observed on a connected node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MutationRecord {
    pub target: NodeId,
    pub added: Vec<NodeId>,
}

/// Live document for one page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    url: String,
    root: NodeId,
    next_id: NodeId,
    nodes: BTreeMap<NodeId, Node>,
    mutations: Vec<MutationRecord>,
}

impl Document {
    pub fn new(url: impl Into<String>) -> Self {
        let root = 1;
        let mut nodes = BTreeMap::new();
        nodes.insert(
            root,
            Node {
                kind: NodeKind::Document,
                parent: None,
                children: Vec::new(),
            },
        );

        Self {
            url: url.into(),
            root,
            next_id: root + 1,
            nodes,
            mutations: Vec::new(),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn set_url(&mut self, url: impl Into<String>) {
        self.url = url.into();
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn create_element(&mut self, tag: &str) -> NodeId {
        self.insert_node(NodeKind::Element(ElementData {
            tag: tag.to_ascii_lowercase(),
            attributes: Vec::new(),
        }))
    }

    pub fn create_text(&mut self, text: impl Into<String>) -> NodeId {
        self.insert_node(NodeKind::Text(text.into()))
    }

    /// Builds a detached element with attributes in one call.
    pub fn create_element_with(&mut self, tag: &str, attributes: &[(&str, &str)]) -> NodeId {
        let id = self.create_element(tag);
        for (name, value) in attributes {
            let _ = self.set_attribute(id, name, value);
        }
        id
    }

    pub fn append_child(&mut self, parent: NodeId, child: NodeId) -> GuardResult<()> {
        if parent == child || self.is_ancestor(child, parent) {
            return Err(GuardError::new(
                "dom.hierarchy_invalid",
                format!("node {child} cannot be appended under its own descendant {parent}"),
            ));
        }
        if matches!(self.node(parent)?.kind, NodeKind::Text(_)) {
            return Err(GuardError::new(
                "dom.hierarchy_invalid",
                format!("text node {parent} cannot have children"),
            ));
        }
        self.node(child)?;

        self.detach(child);
        if let Some(node) = self.nodes.get_mut(&child) {
            node.parent = Some(parent);
        }
        if let Some(node) = self.nodes.get_mut(&parent) {
            node.children.push(child);
        }

        if self.is_connected(parent) {
            self.mutations.push(MutationRecord {
                target: parent,
                added: vec![child],
            });
        }
        Ok(())
    }

    /// Detaches `node` from its parent. Returns false if it was not attached.
    pub fn remove(&mut self, node: NodeId) -> bool {
        self.detach(node)
    }

    pub fn is_connected(&self, node: NodeId) -> bool {
        let mut current = Some(node);
        while let Some(id) = current {
            if id == self.root {
                return true;
            }
            current = self.nodes.get(&id).and_then(|node| node.parent);
        }
        false
    }

    pub fn kind(&self, node: NodeId) -> Option<&NodeKind> {
        self.nodes.get(&node).map(|node| &node.kind)
    }

    pub fn element(&self, node: NodeId) -> Option<&ElementData> {
        match self.kind(node) {
            Some(NodeKind::Element(data)) => Some(data),
            _ => None,
        }
    }

    pub fn tag_name(&self, node: NodeId) -> Option<&str> {
        self.element(node).map(|data| data.tag.as_str())
    }

    pub fn is_element(&self, node: NodeId, tag: &str) -> bool {
        self.tag_name(node)
            .is_some_and(|name| name.eq_ignore_ascii_case(tag))
    }

    pub fn parent(&self, node: NodeId) -> Option<NodeId> {
        self.nodes.get(&node).and_then(|node| node.parent)
    }

    pub fn children(&self, node: NodeId) -> &[NodeId] {
        self.nodes
            .get(&node)
            .map(|node| node.children.as_slice())
            .unwrap_or(&[])
    }

    pub fn element_children(&self, node: NodeId) -> Vec<NodeId> {
        self.children(node)
            .iter()
            .copied()
            .filter(|child| self.element(*child).is_some())
            .collect()
    }

    pub fn attribute(&self, node: NodeId, name: &str) -> Option<&str> {
        self.element(node).and_then(|data| data.attribute(name))
    }

    pub fn has_attribute(&self, node: NodeId, name: &str) -> bool {
        self.attribute(node, name).is_some()
    }

    pub fn set_attribute(&mut self, node: NodeId, name: &str, value: &str) -> GuardResult<()> {
        let Some(Node {
            kind: NodeKind::Element(data),
            ..
        }) = self.nodes.get_mut(&node)
        else {
            return Err(GuardError::new(
                "dom.not_an_element",
                format!("node {node} is not an element"),
            ));
        };

        let name = name.to_ascii_lowercase();
        match data.attributes.iter_mut().find(|(key, _)| *key == name) {
            Some((_, existing)) => *existing = value.to_owned(),
            None => data.attributes.push((name, value.to_owned())),
        }
        Ok(())
    }

    pub fn class_list(&self, node: NodeId) -> Vec<&str> {
        self.attribute(node, "class")
            .map(|classes| classes.split_ascii_whitespace().collect())
            .unwrap_or_default()
    }

    pub fn has_class(&self, node: NodeId, class: &str) -> bool {
        self.class_list(node).contains(&class)
    }

    pub fn inline_style(&self, node: NodeId) -> InlineStyle {
        InlineStyle::parse(self.attribute(node, "style").unwrap_or_default())
    }

    /// Nearest inclusive ancestor element with the given tag.
    pub fn closest(&self, node: NodeId, tag: &str) -> Option<NodeId> {
        let mut current = Some(node);
        while let Some(id) = current {
            if self.is_element(id, tag) {
                return Some(id);
            }
            current = self.parent(id);
        }
        None
    }

    /// Concatenated descendant text.
    pub fn text_content(&self, node: NodeId) -> String {
        let mut out = String::new();
        self.collect_text(node, &mut out);
        out
    }

    /// Connected elements with `tag`, in document order.
    pub fn elements_by_tag(&self, tag: &str) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack = vec![self.root];
        while let Some(id) = stack.pop() {
            if self.is_element(id, tag) {
                out.push(id);
            }
            stack.extend(self.children(id).iter().rev().copied());
        }
        out
    }

    pub fn first_element_by_tag(&self, tag: &str) -> Option<NodeId> {
        self.elements_by_tag(tag).into_iter().next()
    }

    /// Drains child-list mutations recorded since the last call.
    pub fn take_mutations(&mut self) -> Vec<MutationRecord> {
        std::mem::take(&mut self.mutations)
    }

    pub fn pending_mutations(&self) -> usize {
        self.mutations.len()
    }

    fn insert_node(&mut self, kind: NodeKind) -> NodeId {
        let id = self.next_id;
        self.next_id = self.next_id.saturating_add(1);
        self.nodes.insert(
            id,
            Node {
                kind,
                parent: None,
                children: Vec::new(),
            },
        );
        id
    }

    fn node(&self, id: NodeId) -> GuardResult<&Node> {
        self.nodes.get(&id).ok_or_else(|| {
            GuardError::new("dom.node_unknown", format!("node {id} does not exist"))
        })
    }

    fn detach(&mut self, node: NodeId) -> bool {
        let Some(parent) = self.parent(node) else {
            return false;
        };
        if let Some(parent_node) = self.nodes.get_mut(&parent) {
            parent_node.children.retain(|child| *child != node);
        }
        if let Some(node) = self.nodes.get_mut(&node) {
            node.parent = None;
        }
        true
    }

    fn is_ancestor(&self, ancestor: NodeId, node: NodeId) -> bool {
        let mut current = self.parent(node);
        while let Some(id) = current {
            if id == ancestor {
                return true;
            }
            current = self.parent(id);
        }
        false
    }

    fn collect_text(&self, node: NodeId, out: &mut String) {
        match self.kind(node) {
            Some(NodeKind::Text(text)) => out.push_str(text),
            Some(_) => {
                for child in self.children(node) {
                    self.collect_text(*child, out);
                }
            }
            None => {}
        }
    }
}
