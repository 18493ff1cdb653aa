use std::collections::{HashMap, HashSet};

use crate::core_dom_utils::{
    escape_html_attr_for_serialization, escape_html_text_for_serialization,
};
use crate::element::{Element, ElementHandle, Node, NodeId, NodeType};
use crate::selector::{SelectorChain, SelectorStep, parse_selector_chain};
use crate::{Error, Result};

const RED_ZONE: usize = 64 * 1024;
const STACK_GROWTH: usize = 1024 * 1024;

/// The element tree plus its id index.
///
/// Nodes live in an arena addressed by [`ElementHandle`]. Removing a node frees
/// its whole subtree; freed slots are never reused, so an old handle can only
/// ever resolve to "detached", never to a different element. The arena keeps
/// one slot per element ever created, so long-lived documents should be
/// rebuilt rather than churned indefinitely.
#[derive(Debug, Clone)]
pub struct Dom {
    nodes: Vec<Option<Node>>,
    root: NodeId,
    body: NodeId,
    id_index: HashMap<String, NodeId>,
    freed: Vec<NodeId>,
}

impl Default for Dom {
    fn default() -> Self {
        Self::new()
    }
}

impl Dom {
    pub fn new() -> Self {
        let mut dom = Self {
            nodes: vec![Some(Node::new(NodeType::Document))],
            root: NodeId(0),
            body: NodeId(0),
            id_index: HashMap::new(),
            freed: Vec::new(),
        };
        let body = dom.alloc(NodeType::Element(Element::new("body")));
        dom.link(dom.root, body);
        dom.body = body;
        dom
    }

    pub fn body(&self) -> ElementHandle {
        ElementHandle(self.body)
    }

    /// Creates a detached element. It joins the id index once appended under
    /// the body.
    pub fn create_element(&mut self, tag_name: &str) -> ElementHandle {
        ElementHandle(self.alloc(NodeType::Element(Element::new(tag_name))))
    }

    pub fn create_element_with(
        &mut self,
        tag_name: &str,
        attrs: &[(&str, &str)],
        text: &str,
    ) -> ElementHandle {
        let mut element = Element::new(tag_name);
        for (name, value) in attrs {
            element.set_attribute(name, value);
        }
        let id = self.alloc(NodeType::Element(element));
        if !text.is_empty() {
            let text_node = self.alloc(NodeType::Text(text.to_string()));
            self.link(id, text_node);
        }
        ElementHandle(id)
    }

    pub fn contains(&self, handle: ElementHandle) -> bool {
        self.element(handle.node_id()).is_some()
    }

    pub fn is_connected(&self, handle: ElementHandle) -> bool {
        self.contains(handle) && self.is_connected_node(handle.node_id())
    }

    pub fn get_element_by_id(&self, id: &str) -> Option<ElementHandle> {
        self.id_index.get(id).copied().map(ElementHandle)
    }

    pub fn query_selector(&self, selector: &str) -> Result<Option<ElementHandle>> {
        let chain = parse_selector_chain(selector)?;
        if let Some(id) = chain.single_id() {
            return Ok(self.get_element_by_id(id));
        }
        Ok(self
            .elements_preorder(self.root)
            .into_iter()
            .find(|node| self.matches_chain(*node, &chain))
            .map(ElementHandle))
    }

    pub fn query_selector_all(&self, selector: &str) -> Result<Vec<ElementHandle>> {
        let chain = parse_selector_chain(selector)?;
        if let Some(id) = chain.single_id() {
            return Ok(self.get_element_by_id(id).into_iter().collect());
        }
        Ok(self.collect_matches(self.root, &chain))
    }

    /// Like [`query_selector`](Self::query_selector) but only looks at the
    /// descendants of `scope`.
    pub fn query_selector_within(
        &self,
        scope: ElementHandle,
        selector: &str,
    ) -> Result<Option<ElementHandle>> {
        Ok(self
            .query_selector_all_within(scope, selector)?
            .into_iter()
            .next())
    }

    pub fn query_selector_all_within(
        &self,
        scope: ElementHandle,
        selector: &str,
    ) -> Result<Vec<ElementHandle>> {
        let chain = parse_selector_chain(selector)?;
        self.node(scope.node_id())?;
        Ok(self
            .collect_matches(scope.node_id(), &chain)
            .into_iter()
            .filter(|handle| *handle != scope)
            .collect())
    }

    pub fn closest(&self, handle: ElementHandle, selector: &str) -> Result<Option<ElementHandle>> {
        let chain = parse_selector_chain(selector)?;
        self.node(handle.node_id())?;
        let mut cursor = Some(handle.node_id());
        while let Some(current) = cursor {
            if self.matches_chain(current, &chain) {
                return Ok(Some(ElementHandle(current)));
            }
            cursor = self.parent_of(current);
        }
        Ok(None)
    }

    pub fn tag_name(&self, handle: ElementHandle) -> Result<String> {
        Ok(self.element_ref(handle)?.tag_name.clone())
    }

    pub fn attribute(&self, handle: ElementHandle, name: &str) -> Result<Option<String>> {
        Ok(self.element_ref(handle)?.attribute(name).map(str::to_string))
    }

    pub fn set_attribute(&mut self, handle: ElementHandle, name: &str, value: &str) -> Result<()> {
        let node_id = handle.node_id();
        let is_id = name.eq_ignore_ascii_case("id");
        if is_id && !value.is_empty() && self.is_connected_node(node_id) {
            if let Some(existing) = self.id_index.get(value) {
                if *existing != node_id {
                    return Err(Error::DuplicateId(value.to_string()));
                }
            }
        }

        let old_id = self.element_ref(handle)?.id().map(str::to_string);
        self.element_mut(handle)?.set_attribute(name, value);

        if is_id && self.is_connected_node(node_id) {
            if let Some(old) = old_id {
                self.id_index.remove(&old);
            }
            if !value.is_empty() {
                self.id_index.insert(value.to_string(), node_id);
            }
        }
        Ok(())
    }

    pub fn remove_attribute(&mut self, handle: ElementHandle, name: &str) -> Result<bool> {
        let old_id = self.element_ref(handle)?.id().map(str::to_string);
        let removed = self.element_mut(handle)?.remove_attribute(name);
        if name.eq_ignore_ascii_case("id") {
            if let Some(old) = old_id {
                if self.id_index.get(&old) == Some(&handle.node_id()) {
                    self.id_index.remove(&old);
                }
            }
        }
        Ok(removed)
    }

    pub fn value(&self, handle: ElementHandle) -> Result<String> {
        Ok(self.element_ref(handle)?.value.clone())
    }

    /// Stores `value` verbatim. Numeric-looking fields accept anything;
    /// interpreting the text is up to the reader.
    pub fn set_value(&mut self, handle: ElementHandle, value: &str) -> Result<()> {
        self.element_mut(handle)?.value = value.to_string();
        Ok(())
    }

    pub fn text_content(&self, handle: ElementHandle) -> Result<String> {
        self.node(handle.node_id())?;
        let mut out = String::new();
        self.collect_text(handle.node_id(), &mut out);
        Ok(out)
    }

    /// Replaces every child with a single text node (none for `""`).
    pub fn set_text_content(&mut self, handle: ElementHandle, text: &str) -> Result<()> {
        self.element_ref(handle)?;
        let node_id = handle.node_id();
        let old_children = self.node(node_id)?.children.clone();
        for child in old_children {
            self.free_subtree(child);
        }
        if let Some(node) = self.node_slot_mut(node_id) {
            node.children.clear();
        }
        if !text.is_empty() {
            let text_node = self.alloc(NodeType::Text(text.to_string()));
            self.link(node_id, text_node);
        }
        self.rebuild_id_index();
        Ok(())
    }

    pub fn parent(&self, handle: ElementHandle) -> Result<Option<ElementHandle>> {
        self.node(handle.node_id())?;
        Ok(self
            .parent_of(handle.node_id())
            .filter(|parent| self.element(*parent).is_some())
            .map(ElementHandle))
    }

    pub fn children(&self, handle: ElementHandle) -> Result<Vec<ElementHandle>> {
        Ok(self
            .node(handle.node_id())?
            .children
            .iter()
            .copied()
            .filter(|child| self.element(*child).is_some())
            .map(ElementHandle)
            .collect())
    }

    /// Makes `child` the last child of `parent`, moving it if it already has a
    /// parent. Fails without touching the tree when an id in the moved subtree
    /// is already taken.
    pub fn append_child(&mut self, parent: ElementHandle, child: ElementHandle) -> Result<()> {
        let parent_id = parent.node_id();
        let child_id = child.node_id();
        self.element_ref(parent)?;
        self.element_ref(child)?;
        if child_id == self.body || child_id == parent_id {
            return Err(Error::InvalidOperation(format!(
                "cannot append {child} to {parent}"
            )));
        }

        let mut cursor = Some(parent_id);
        while let Some(node) = cursor {
            if node == child_id {
                return Err(Error::InvalidOperation(
                    "appendChild would create a cycle".into(),
                ));
            }
            cursor = self.parent_of(node);
        }

        if self.is_connected_node(parent_id) {
            let mut subtree_ids = HashSet::new();
            for node in self.elements_preorder(child_id) {
                let Some(id) = self.element(node).and_then(Element::id) else {
                    continue;
                };
                if !subtree_ids.insert(id.to_string()) {
                    return Err(Error::DuplicateId(id.to_string()));
                }
                if let Some(existing) = self.id_index.get(id) {
                    if *existing != node {
                        return Err(Error::DuplicateId(id.to_string()));
                    }
                }
            }
        }

        self.unlink(child_id);
        self.link(parent_id, child_id);
        self.rebuild_id_index();
        Ok(())
    }

    /// Detaches the element and frees its subtree.
    pub fn remove(&mut self, handle: ElementHandle) -> Result<()> {
        self.element_ref(handle)?;
        if handle.node_id() == self.body {
            return Err(Error::InvalidOperation(
                "cannot remove the document body".into(),
            ));
        }
        self.unlink(handle.node_id());
        self.free_subtree(handle.node_id());
        self.rebuild_id_index();
        Ok(())
    }

    /// Serializes the element as markup, attributes in name order.
    pub fn dump(&self, handle: ElementHandle) -> Result<String> {
        self.node(handle.node_id())?;
        let mut out = String::new();
        self.dump_node(handle.node_id(), &mut out);
        Ok(out)
    }

    pub fn label(&self, handle: ElementHandle) -> String {
        self.element(handle.node_id())
            .map(Element::label)
            .unwrap_or_else(|| handle.to_string())
    }

    pub(crate) fn take_freed(&mut self) -> Vec<NodeId> {
        std::mem::take(&mut self.freed)
    }

    fn alloc(&mut self, node_type: NodeType) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(Some(Node::new(node_type)));
        id
    }

    fn link(&mut self, parent: NodeId, child: NodeId) {
        if let Some(node) = self.node_slot_mut(child) {
            node.parent = Some(parent);
        }
        if let Some(node) = self.node_slot_mut(parent) {
            node.children.push(child);
        }
    }

    fn unlink(&mut self, child: NodeId) {
        let Some(parent) = self.parent_of(child) else {
            return;
        };
        if let Some(node) = self.node_slot_mut(parent) {
            node.children.retain(|id| *id != child);
        }
        if let Some(node) = self.node_slot_mut(child) {
            node.parent = None;
        }
    }

    fn free_subtree(&mut self, node_id: NodeId) {
        stacker::maybe_grow(RED_ZONE, STACK_GROWTH, || {
            let Some(node) = self.nodes.get_mut(node_id.0).and_then(Option::take) else {
                return;
            };
            if matches!(node.node_type, NodeType::Element(_)) {
                self.freed.push(node_id);
            }
            for child in node.children {
                self.free_subtree(child);
            }
        })
    }

    fn node(&self, node_id: NodeId) -> Result<&Node> {
        self.nodes
            .get(node_id.0)
            .and_then(Option::as_ref)
            .ok_or_else(|| Error::DetachedNode(format!("node#{}", node_id.0)))
    }

    fn node_slot_mut(&mut self, node_id: NodeId) -> Option<&mut Node> {
        self.nodes.get_mut(node_id.0).and_then(Option::as_mut)
    }

    fn element(&self, node_id: NodeId) -> Option<&Element> {
        match &self.nodes.get(node_id.0)?.as_ref()?.node_type {
            NodeType::Element(element) => Some(element),
            NodeType::Document | NodeType::Text(_) => None,
        }
    }

    fn element_ref(&self, handle: ElementHandle) -> Result<&Element> {
        self.element(handle.node_id())
            .ok_or_else(|| Error::DetachedNode(handle.to_string()))
    }

    fn element_mut(&mut self, handle: ElementHandle) -> Result<&mut Element> {
        match self
            .nodes
            .get_mut(handle.node_id().0)
            .and_then(Option::as_mut)
            .map(|node| &mut node.node_type)
        {
            Some(NodeType::Element(element)) => Ok(element),
            _ => Err(Error::DetachedNode(handle.to_string())),
        }
    }

    fn parent_of(&self, node_id: NodeId) -> Option<NodeId> {
        self.nodes.get(node_id.0)?.as_ref()?.parent
    }

    fn is_connected_node(&self, node_id: NodeId) -> bool {
        let mut cursor = Some(node_id);
        while let Some(node) = cursor {
            if node == self.root {
                return true;
            }
            cursor = self.parent_of(node);
        }
        false
    }

    fn rebuild_id_index(&mut self) {
        let mut next = HashMap::new();
        let mut stack = vec![self.root];
        while let Some(node_id) = stack.pop() {
            let Some(node) = self.nodes.get(node_id.0).and_then(Option::as_ref) else {
                continue;
            };
            if let NodeType::Element(element) = &node.node_type {
                if let Some(id) = element.id() {
                    // first in document order wins, matching getElementById
                    next.entry(id.to_string()).or_insert(node_id);
                }
            }
            for child in node.children.iter().rev() {
                stack.push(*child);
            }
        }
        self.id_index = next;
    }

    fn elements_preorder(&self, start: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        self.collect_elements_dfs(start, &mut out);
        out
    }

    fn collect_elements_dfs(&self, node_id: NodeId, out: &mut Vec<NodeId>) {
        stacker::maybe_grow(RED_ZONE, STACK_GROWTH, || {
            let Some(node) = self.nodes.get(node_id.0).and_then(Option::as_ref) else {
                return;
            };
            if matches!(node.node_type, NodeType::Element(_)) {
                out.push(node_id);
            }
            for child in &node.children {
                self.collect_elements_dfs(*child, out);
            }
        })
    }

    fn collect_matches(&self, start: NodeId, chain: &SelectorChain) -> Vec<ElementHandle> {
        self.elements_preorder(start)
            .into_iter()
            .filter(|node| self.matches_chain(*node, chain))
            .map(ElementHandle)
            .collect()
    }

    fn matches_chain(&self, node_id: NodeId, chain: &SelectorChain) -> bool {
        if !self.matches_step(node_id, chain.subject()) {
            return false;
        }

        // Greedy nearest-ancestor matching is exact for descendant-only chains.
        let mut current = node_id;
        for step in chain.steps.iter().rev().skip(1) {
            let mut cursor = self.parent_of(current);
            let mut found = None;
            while let Some(ancestor) = cursor {
                if self.matches_step(ancestor, step) {
                    found = Some(ancestor);
                    break;
                }
                cursor = self.parent_of(ancestor);
            }
            let Some(matched) = found else {
                return false;
            };
            current = matched;
        }
        true
    }

    fn matches_step(&self, node_id: NodeId, step: &SelectorStep) -> bool {
        let Some(element) = self.element(node_id) else {
            return false;
        };
        if let Some(tag) = &step.tag {
            if element.tag_name != *tag {
                return false;
            }
        }
        if let Some(id) = &step.id {
            if element.id() != Some(id.as_str()) {
                return false;
            }
        }
        true
    }

    fn collect_text(&self, node_id: NodeId, out: &mut String) {
        stacker::maybe_grow(RED_ZONE, STACK_GROWTH, || {
            let Some(node) = self.nodes.get(node_id.0).and_then(Option::as_ref) else {
                return;
            };
            match &node.node_type {
                NodeType::Text(text) => out.push_str(text),
                NodeType::Document | NodeType::Element(_) => {
                    for child in &node.children {
                        self.collect_text(*child, out);
                    }
                }
            }
        })
    }

    fn dump_node(&self, node_id: NodeId, out: &mut String) {
        stacker::maybe_grow(RED_ZONE, STACK_GROWTH, || {
            let Some(node) = self.nodes.get(node_id.0).and_then(Option::as_ref) else {
                return;
            };
            match &node.node_type {
                NodeType::Document => {
                    for child in &node.children {
                        self.dump_node(*child, out);
                    }
                }
                NodeType::Text(text) => out.push_str(&escape_html_text_for_serialization(text)),
                NodeType::Element(element) => {
                    out.push('<');
                    out.push_str(&element.tag_name);
                    for (name, value) in &element.attrs {
                        out.push(' ');
                        out.push_str(name);
                        out.push_str("=\"");
                        out.push_str(&escape_html_attr_for_serialization(value));
                        out.push('"');
                    }
                    out.push('>');
                    for child in &node.children {
                        self.dump_node(*child, out);
                    }
                    out.push_str("</");
                    out.push_str(&element.tag_name);
                    out.push('>');
                }
            }
        })
    }
}
