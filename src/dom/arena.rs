//! Arena-backed markup tree for content documents.
//!
//! Nodes live in one vector and link to each other by index. Detached nodes
//! stay in the arena until the document is dropped, which keeps ids stable
//! while passes move things around.

use html5ever::{LocalName, Namespace, Prefix, QualName, ns};

pub const EPUB_NS: &str = "http://www.idpf.org/2007/ops";

/// Index of a node in a [`Document`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub u32);

impl NodeId {
    /// Sentinel value for no node.
    pub const NONE: NodeId = NodeId(u32::MAX);

    pub fn is_some(&self) -> bool {
        self.0 != u32::MAX
    }

    pub fn is_none(&self) -> bool {
        self.0 == u32::MAX
    }
}

#[derive(Debug, Clone)]
pub enum NodeData {
    Document,
    Element { name: QualName, attrs: Vec<Attribute> },
    Text(String),
    Comment(String),
    Doctype { name: String, public_id: String, system_id: String },
    ProcessingInstruction { target: String, data: String },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Attribute {
    pub name: QualName,
    pub value: String,
}

impl Attribute {
    pub fn new(name: &str, value: impl Into<String>) -> Self {
        Self {
            name: attr_name(name),
            value: value.into(),
        }
    }

    /// Whether this attribute is written as `name` (`href`, `xlink:href`, ...).
    pub fn is(&self, name: &str) -> bool {
        qualified_eq(&self.name, name)
    }
}

#[derive(Debug, Clone)]
pub struct Node {
    pub data: NodeData,
    pub parent: NodeId,
    pub first_child: NodeId,
    pub last_child: NodeId,
    pub prev_sibling: NodeId,
    pub next_sibling: NodeId,
}

impl Node {
    fn new(data: NodeData) -> Self {
        Self {
            data,
            parent: NodeId::NONE,
            first_child: NodeId::NONE,
            last_child: NodeId::NONE,
            prev_sibling: NodeId::NONE,
            next_sibling: NodeId::NONE,
        }
    }
}

/// Qualified name for an XHTML element.
pub fn html_name(local: &str) -> QualName {
    QualName::new(None, ns!(html), LocalName::from(local))
}

/// Qualified name for an attribute written as `prefix:local` or `local`.
pub fn attr_name(name: &str) -> QualName {
    match name.split_once(':') {
        Some(("xml", local)) => QualName::new(Some(Prefix::from("xml")), ns!(xml), LocalName::from(local)),
        Some(("xlink", local)) => {
            QualName::new(Some(Prefix::from("xlink")), ns!(xlink), LocalName::from(local))
        }
        Some(("epub", local)) => QualName::new(
            Some(Prefix::from("epub")),
            Namespace::from(EPUB_NS),
            LocalName::from(local),
        ),
        Some((prefix, local)) => QualName::new(
            Some(Prefix::from(prefix)),
            ns!(),
            LocalName::from(local),
        ),
        None => QualName::new(None, ns!(), LocalName::from(name)),
    }
}

/// The name as written in markup: `prefix:local` or `local`.
pub fn qualified(name: &QualName) -> String {
    match &name.prefix {
        Some(prefix) => format!("{}:{}", prefix, name.local),
        None => name.local.to_string(),
    }
}

fn qualified_eq(name: &QualName, written: &str) -> bool {
    match &name.prefix {
        Some(prefix) => written
            .split_once(':')
            .is_some_and(|(p, l)| p == prefix.as_ref() && l == name.local.as_ref()),
        None => name.local.as_ref() == written,
    }
}

/// A parsed content document.
#[derive(Debug, Clone)]
pub struct Document {
    nodes: Vec<Node>,
    root: NodeId,
}

impl Default for Document {
    fn default() -> Self {
        Self::new()
    }
}

impl Document {
    /// Create an empty document containing only the root node.
    pub fn new() -> Self {
        let mut doc = Self {
            nodes: Vec::new(),
            root: NodeId::NONE,
        };
        doc.root = doc.alloc(Node::new(NodeData::Document));
        doc
    }

    fn alloc(&mut self, node: Node) -> NodeId {
        let id = NodeId(self.nodes.len() as u32);
        self.nodes.push(node);
        id
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn get(&self, id: NodeId) -> Option<&Node> {
        if id.is_none() {
            return None;
        }
        self.nodes.get(id.0 as usize)
    }

    pub fn get_mut(&mut self, id: NodeId) -> Option<&mut Node> {
        if id.is_none() {
            return None;
        }
        self.nodes.get_mut(id.0 as usize)
    }

    pub fn create_element(&mut self, name: QualName, attrs: Vec<Attribute>) -> NodeId {
        self.alloc(Node::new(NodeData::Element { name, attrs }))
    }

    /// Create an XHTML element from `(name, value)` attribute pairs.
    pub fn create_html_element(&mut self, local: &str, attrs: &[(&str, &str)]) -> NodeId {
        let attrs = attrs.iter().map(|(n, v)| Attribute::new(n, *v)).collect();
        self.create_element(html_name(local), attrs)
    }

    pub fn create_text(&mut self, text: impl Into<String>) -> NodeId {
        self.alloc(Node::new(NodeData::Text(text.into())))
    }

    pub fn create_comment(&mut self, text: impl Into<String>) -> NodeId {
        self.alloc(Node::new(NodeData::Comment(text.into())))
    }

    pub fn create_doctype(&mut self, name: String, public_id: String, system_id: String) -> NodeId {
        self.alloc(Node::new(NodeData::Doctype {
            name,
            public_id,
            system_id,
        }))
    }

    pub fn create_pi(&mut self, target: String, data: String) -> NodeId {
        self.alloc(Node::new(NodeData::ProcessingInstruction { target, data }))
    }

    /// Append `child` as the last child of `parent`, detaching it first.
    pub fn append(&mut self, parent: NodeId, child: NodeId) {
        self.detach(child);
        let last_child = self.get(parent).map(|n| n.last_child).unwrap_or(NodeId::NONE);

        if let Some(node) = self.get_mut(child) {
            node.parent = parent;
            node.prev_sibling = last_child;
        }
        if let Some(last) = self.get_mut(last_child) {
            last.next_sibling = child;
        }
        if let Some(p) = self.get_mut(parent) {
            if p.first_child.is_none() {
                p.first_child = child;
            }
            p.last_child = child;
        }
    }

    /// Insert `new_node` as the first child of `parent`.
    pub fn prepend(&mut self, parent: NodeId, new_node: NodeId) {
        match self.first_child(parent) {
            Some(first) => self.insert_before(first, new_node),
            None => self.append(parent, new_node),
        }
    }

    /// Insert `new_node` immediately before `sibling`.
    pub fn insert_before(&mut self, sibling: NodeId, new_node: NodeId) {
        self.detach(new_node);
        let (parent, prev) = match self.get(sibling) {
            Some(n) => (n.parent, n.prev_sibling),
            None => return,
        };

        if let Some(new) = self.get_mut(new_node) {
            new.parent = parent;
            new.prev_sibling = prev;
            new.next_sibling = sibling;
        }
        if let Some(sib) = self.get_mut(sibling) {
            sib.prev_sibling = new_node;
        }
        if prev.is_some() {
            if let Some(p) = self.get_mut(prev) {
                p.next_sibling = new_node;
            }
        } else if let Some(par) = self.get_mut(parent) {
            par.first_child = new_node;
        }
    }

    /// Append text to `parent`, merging with a trailing text node.
    pub fn append_text(&mut self, parent: NodeId, text: &str) {
        let last_child = self.get(parent).map(|n| n.last_child).unwrap_or(NodeId::NONE);
        if let Some(last) = self.get_mut(last_child)
            && let NodeData::Text(existing) = &mut last.data
        {
            existing.push_str(text);
            return;
        }
        let node = self.create_text(text);
        self.append(parent, node);
    }

    /// Unlink a node from its parent. Its own subtree stays intact.
    pub fn detach(&mut self, id: NodeId) {
        let (parent, prev, next) = match self.get(id) {
            Some(n) => (n.parent, n.prev_sibling, n.next_sibling),
            None => return,
        };
        if parent.is_none() {
            return;
        }

        if prev.is_some() {
            if let Some(p) = self.get_mut(prev) {
                p.next_sibling = next;
            }
        } else if let Some(p) = self.get_mut(parent) {
            p.first_child = next;
        }

        if next.is_some() {
            if let Some(n) = self.get_mut(next) {
                n.prev_sibling = prev;
            }
        } else if let Some(p) = self.get_mut(parent) {
            p.last_child = prev;
        }

        if let Some(node) = self.get_mut(id) {
            node.parent = NodeId::NONE;
            node.prev_sibling = NodeId::NONE;
            node.next_sibling = NodeId::NONE;
        }
    }

    /// Replace `node` by its children.
    pub fn unwrap_node(&mut self, node: NodeId) {
        let children: Vec<_> = self.children(node).collect();
        for child in children {
            self.insert_before(node, child);
        }
        self.detach(node);
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.get(id).map(|n| n.parent).filter(|p| p.is_some())
    }

    pub fn first_child(&self, id: NodeId) -> Option<NodeId> {
        self.get(id).map(|n| n.first_child).filter(|c| c.is_some())
    }

    pub fn next_sibling(&self, id: NodeId) -> Option<NodeId> {
        self.get(id).map(|n| n.next_sibling).filter(|c| c.is_some())
    }

    pub fn prev_sibling(&self, id: NodeId) -> Option<NodeId> {
        self.get(id).map(|n| n.prev_sibling).filter(|c| c.is_some())
    }

    pub fn children(&self, parent: NodeId) -> Children<'_> {
        Children {
            doc: self,
            current: self.get(parent).map(|n| n.first_child).unwrap_or(NodeId::NONE),
        }
    }

    /// Element children only.
    pub fn element_children(&self, parent: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        self.children(parent).filter(|&c| self.is_element(c))
    }

    /// Pre-order traversal of `root` and everything below it.
    pub fn descendants(&self, root: NodeId) -> Descendants<'_> {
        Descendants {
            doc: self,
            root,
            next: if self.get(root).is_some() { root } else { NodeId::NONE },
        }
    }

    /// Pre-order traversal of every attached element.
    pub fn elements(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.descendants(self.root).filter(|&id| self.is_element(id))
    }

    /// Whether `ancestor` contains `node` (or is it).
    pub fn contains(&self, ancestor: NodeId, node: NodeId) -> bool {
        let mut current = node;
        while current.is_some() {
            if current == ancestor {
                return true;
            }
            current = self.get(current).map(|n| n.parent).unwrap_or(NodeId::NONE);
        }
        false
    }

    pub fn is_element(&self, id: NodeId) -> bool {
        self.get(id).is_some_and(|n| matches!(n.data, NodeData::Element { .. }))
    }

    pub fn element_name(&self, id: NodeId) -> Option<&QualName> {
        self.get(id).and_then(|n| match &n.data {
            NodeData::Element { name, .. } => Some(name),
            _ => None,
        })
    }

    /// Lower-cased local name of an element.
    pub fn local_name(&self, id: NodeId) -> Option<&str> {
        self.element_name(id).map(|n| n.local.as_ref())
    }

    pub fn is_named(&self, id: NodeId, local: &str) -> bool {
        self.local_name(id).is_some_and(|n| n.eq_ignore_ascii_case(local))
    }

    /// Change an element's local name, keeping its namespace.
    pub fn rename_element(&mut self, id: NodeId, local: &str) {
        if let Some(node) = self.get_mut(id)
            && let NodeData::Element { name, .. } = &mut node.data
        {
            name.local = LocalName::from(local);
        }
    }

    pub fn attrs(&self, id: NodeId) -> &[Attribute] {
        self.get(id)
            .and_then(|n| match &n.data {
                NodeData::Element { attrs, .. } => Some(attrs.as_slice()),
                _ => None,
            })
            .unwrap_or(&[])
    }

    pub fn attrs_mut(&mut self, id: NodeId) -> Option<&mut Vec<Attribute>> {
        self.get_mut(id).and_then(|n| match &mut n.data {
            NodeData::Element { attrs, .. } => Some(attrs),
            _ => None,
        })
    }

    /// Attribute value by written name (`href`, `xlink:href`, `epub:type`).
    pub fn get_attr(&self, id: NodeId, name: &str) -> Option<&str> {
        self.attrs(id)
            .iter()
            .find(|a| a.is(name))
            .map(|a| a.value.as_str())
    }

    pub fn has_attr(&self, id: NodeId, name: &str) -> bool {
        self.get_attr(id, name).is_some()
    }

    pub fn set_attr(&mut self, id: NodeId, name: &str, value: impl Into<String>) {
        let value = value.into();
        if let Some(attrs) = self.attrs_mut(id) {
            match attrs.iter_mut().find(|a| a.is(name)) {
                Some(existing) => existing.value = value,
                None => attrs.push(Attribute::new(name, value)),
            }
        }
    }

    pub fn remove_attr(&mut self, id: NodeId, name: &str) -> Option<String> {
        let attrs = self.attrs_mut(id)?;
        let pos = attrs.iter().position(|a| a.is(name))?;
        Some(attrs.remove(pos).value)
    }

    pub fn element_id(&self, id: NodeId) -> Option<&str> {
        self.get_attr(id, "id")
    }

    /// Whitespace-separated class names.
    pub fn classes(&self, id: NodeId) -> impl Iterator<Item = &str> {
        self.get_attr(id, "class").unwrap_or("").split_whitespace()
    }

    pub fn text(&self, id: NodeId) -> Option<&str> {
        self.get(id).and_then(|n| match &n.data {
            NodeData::Text(s) => Some(s.as_str()),
            _ => None,
        })
    }

    /// Concatenated text of all descendant text nodes.
    pub fn text_content(&self, id: NodeId) -> String {
        let mut out = String::new();
        for node in self.descendants(id) {
            if let Some(text) = self.text(node) {
                out.push_str(text);
            }
        }
        out
    }

    /// First element with the given local name, in document order.
    pub fn find_element(&self, local: &str) -> Option<NodeId> {
        self.elements().find(|&id| self.is_named(id, local))
    }

    /// Every element with the given local name, in document order.
    pub fn find_elements(&self, local: &str) -> Vec<NodeId> {
        self.elements().filter(|&id| self.is_named(id, local)).collect()
    }

    /// The top-level element (`<html>`).
    pub fn document_element(&self) -> Option<NodeId> {
        self.element_children(self.root).next()
    }

    pub fn head(&self) -> Option<NodeId> {
        let html = self.document_element()?;
        self.element_children(html).find(|&c| self.is_named(c, "head"))
    }

    pub fn body(&self) -> Option<NodeId> {
        let html = self.document_element()?;
        self.element_children(html).find(|&c| self.is_named(c, "body"))
    }

    /// Element whose `id` equals `value`.
    pub fn find_by_id(&self, value: &str) -> Option<NodeId> {
        self.elements().find(|&id| self.element_id(id) == Some(value))
    }

    /// Element carrying `value` as `id`, or an `<a>` carrying it as `name`.
    pub fn find_anchor(&self, value: &str) -> Option<NodeId> {
        self.elements().find(|&id| {
            self.element_id(id) == Some(value)
                || (self.is_named(id, "a") && self.get_attr(id, "name") == Some(value))
        })
    }

    /// Deep-copy `node` from `other` into this document, unattached.
    pub fn import(&mut self, other: &Document, node: NodeId) -> NodeId {
        let Some(source) = other.get(node) else {
            return NodeId::NONE;
        };
        let copy = self.alloc(Node::new(source.data.clone()));
        for child in other.children(node) {
            let child_copy = self.import(other, child);
            self.append(copy, child_copy);
        }
        copy
    }

    /// Number of nodes ever allocated, attached or not.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.len() <= 1
    }
}

pub struct Children<'a> {
    doc: &'a Document,
    current: NodeId,
}

impl Iterator for Children<'_> {
    type Item = NodeId;

    fn next(&mut self) -> Option<Self::Item> {
        if self.current.is_none() {
            return None;
        }
        let id = self.current;
        self.current = self.doc.get(id).map(|n| n.next_sibling).unwrap_or(NodeId::NONE);
        Some(id)
    }
}

pub struct Descendants<'a> {
    doc: &'a Document,
    root: NodeId,
    next: NodeId,
}

impl Iterator for Descendants<'_> {
    type Item = NodeId;

    fn next(&mut self) -> Option<Self::Item> {
        if self.next.is_none() {
            return None;
        }
        let current = self.next;
        let node = self.doc.get(current)?;

        self.next = if node.first_child.is_some() {
            node.first_child
        } else {
            let mut cursor = current;
            loop {
                if cursor == self.root {
                    break NodeId::NONE;
                }
                let Some(n) = self.doc.get(cursor) else {
                    break NodeId::NONE;
                };
                if n.next_sibling.is_some() {
                    break n.next_sibling;
                }
                cursor = n.parent;
                if cursor.is_none() {
                    break NodeId::NONE;
                }
            }
        };
        Some(current)
    }
}
