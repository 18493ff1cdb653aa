use std::collections::BTreeMap;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub(crate) struct NodeId(pub(crate) usize);

/// Live view onto an element of a [`Dom`](crate::Dom).
///
/// A handle is only an address: every read goes through the document and
/// observes the current node state, every write mutates the node in place.
/// Once the element is removed, accessors fail with
/// [`Error::DetachedNode`](crate::Error::DetachedNode) and id lookups stop
/// returning it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ElementHandle(pub(crate) NodeId);

impl ElementHandle {
    pub(crate) fn node_id(self) -> NodeId {
        self.0
    }
}

impl fmt::Display for ElementHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "node#{}", (self.0).0)
    }
}

#[derive(Debug, Clone)]
pub(crate) enum NodeType {
    Document,
    Element(Element),
    Text(String),
}

#[derive(Debug, Clone)]
pub(crate) struct Node {
    pub(crate) parent: Option<NodeId>,
    pub(crate) children: Vec<NodeId>,
    pub(crate) node_type: NodeType,
}

impl Node {
    pub(crate) fn new(node_type: NodeType) -> Self {
        Self {
            parent: None,
            children: Vec::new(),
            node_type,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct Element {
    pub(crate) tag_name: String,
    pub(crate) attrs: BTreeMap<String, String>,
    pub(crate) value: String,
}

impl Element {
    pub(crate) fn new(tag_name: &str) -> Self {
        Self {
            tag_name: tag_name.to_ascii_lowercase(),
            attrs: BTreeMap::new(),
            value: String::new(),
        }
    }

    pub(crate) fn id(&self) -> Option<&str> {
        self.attrs
            .get("id")
            .map(String::as_str)
            .filter(|id| !id.is_empty())
    }

    pub(crate) fn attribute(&self, name: &str) -> Option<&str> {
        self.attrs
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }

    // Writing the `value` attribute also resets the live value, like a
    // fresh `<input value=...>`.
    pub(crate) fn set_attribute(&mut self, name: &str, value: &str) {
        let lowered = name.to_ascii_lowercase();
        if lowered == "value" {
            self.value = value.to_string();
        }
        self.attrs.insert(lowered, value.to_string());
    }

    pub(crate) fn remove_attribute(&mut self, name: &str) -> bool {
        let lowered = name.to_ascii_lowercase();
        if lowered == "value" {
            self.value.clear();
        }
        self.attrs.remove(&lowered).is_some()
    }

    pub(crate) fn label(&self) -> String {
        match self.id() {
            Some(id) => format!("{}#{id}", self.tag_name),
            None => self.tag_name.clone(),
        }
    }
}
