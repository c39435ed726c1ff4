//! Table of contents.
//!
//! The tree is stored in an arena: nodes refer to their parent and children
//! by [`TocNodeId`]. Both on-disk forms (the NCX index and the EPUB 3
//! navigation document) parse into and render from the same [`Toc`].

pub mod generate;
pub mod nav;
pub mod ncx;
pub mod verify;

pub use generate::{Heuristics, TocSource, from_files, from_headings, from_links, generate};
pub use verify::{ensure_id, verify};

use crate::href::Reference;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TocNodeId(u32);

/// Result of checking a node's destination.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum TocState {
    #[default]
    Unverified,
    Exists,
    Missing(String),
}

#[derive(Debug, Clone, Default)]
pub struct TocNode {
    pub title: Option<String>,
    /// Canonical path of the destination file.
    pub dest: Option<String>,
    pub frag: Option<String>,
    pub state: TocState,
    /// Original `navPoint` id, kept on round trips.
    pub id: Option<String>,
    parent: Option<TocNodeId>,
    children: Vec<TocNodeId>,
}

impl TocNode {
    pub fn reference(&self) -> Option<Reference> {
        self.dest
            .as_ref()
            .map(|d| Reference::new(d.clone(), self.frag.clone()))
    }

    pub fn parent(&self) -> Option<TocNodeId> {
        self.parent
    }

    pub fn children(&self) -> &[TocNodeId] {
        &self.children
    }
}

/// One entry of the page list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageTarget {
    pub name: String,
    pub reference: Reference,
}

/// One semantic landmark of the navigation document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Landmark {
    /// The `epub:type` (`cover`, `toc`, `bodymatter`, ...).
    pub kind: String,
    pub title: String,
    pub reference: Reference,
}

#[derive(Debug, Clone)]
pub struct Toc {
    nodes: Vec<TocNode>,
    pub title: Option<String>,
    pub uid: Option<String>,
    pub lang: Option<String>,
    pub page_list: Vec<PageTarget>,
    pub landmarks: Vec<Landmark>,
}

impl Default for Toc {
    fn default() -> Self {
        Self::new()
    }
}

impl Toc {
    pub fn new() -> Self {
        Self {
            nodes: vec![TocNode::default()],
            title: None,
            uid: None,
            lang: None,
            page_list: Vec::new(),
            landmarks: Vec::new(),
        }
    }

    pub fn root(&self) -> TocNodeId {
        TocNodeId(0)
    }

    pub fn node(&self, id: TocNodeId) -> &TocNode {
        &self.nodes[id.0 as usize]
    }

    pub fn node_mut(&mut self, id: TocNodeId) -> &mut TocNode {
        &mut self.nodes[id.0 as usize]
    }

    pub fn children(&self, id: TocNodeId) -> &[TocNodeId] {
        &self.node(id).children
    }

    /// Append a child under `parent`.
    pub fn add_child(
        &mut self,
        parent: TocNodeId,
        title: Option<String>,
        dest: Option<String>,
        frag: Option<String>,
    ) -> TocNodeId {
        let id = TocNodeId(self.nodes.len() as u32);
        self.nodes.push(TocNode {
            title,
            dest,
            frag: frag.filter(|f| !f.is_empty()),
            parent: Some(parent),
            ..TocNode::default()
        });
        self.node_mut(parent).children.push(id);
        id
    }

    /// Shorthand for `add_child` with a title and a reference.
    pub fn add(&mut self, parent: TocNodeId, title: &str, reference: &Reference) -> TocNodeId {
        self.add_child(
            parent,
            Some(title.to_string()),
            Some(reference.path.clone()),
            reference.fragment.clone(),
        )
    }

    /// Insert a new child of `parent` at `index`.
    pub fn insert_child(
        &mut self,
        parent: TocNodeId,
        index: usize,
        title: &str,
        reference: &Reference,
    ) -> TocNodeId {
        let id = self.add(parent, title, reference);
        let children = &mut self.node_mut(parent).children;
        children.pop();
        let index = index.min(children.len());
        children.insert(index, id);
        id
    }

    /// Detach a node and its whole subtree.
    pub fn remove(&mut self, id: TocNodeId) {
        if let Some(parent) = self.node(id).parent {
            self.node_mut(parent).children.retain(|&c| c != id);
            self.node_mut(id).parent = None;
        }
    }

    /// Detach a node, splicing its children into its place.
    pub fn remove_from_parent(&mut self, id: TocNodeId) {
        let Some(parent) = self.node(id).parent else {
            return;
        };
        let Some(pos) = self.node(parent).children.iter().position(|&c| c == id) else {
            return;
        };
        let children = std::mem::take(&mut self.node_mut(id).children);
        for &child in &children {
            self.node_mut(child).parent = Some(parent);
        }
        let siblings = &mut self.node_mut(parent).children;
        siblings.splice(pos..=pos, children);
        self.node_mut(id).parent = None;
    }

    /// Drop every entry.
    pub fn clear(&mut self) {
        let root = self.root();
        self.node_mut(root).children.clear();
    }

    /// Depth-first `(node, level)` pairs below `from`, levels starting at 1.
    pub fn iter_descendants(&self, from: TocNodeId) -> Vec<(TocNodeId, usize)> {
        let mut out = Vec::new();
        let mut stack: Vec<(TocNodeId, usize)> = self
            .children(from)
            .iter()
            .rev()
            .map(|&c| (c, 1))
            .collect();
        while let Some((id, level)) = stack.pop() {
            out.push((id, level));
            stack.extend(self.children(id).iter().rev().map(|&c| (c, level + 1)));
        }
        out
    }

    /// Every attached entry in depth-first order.
    pub fn iter(&self) -> Vec<(TocNodeId, usize)> {
        self.iter_descendants(self.root())
    }

    /// 1 for a leaf, otherwise 1 + the deepest child.
    pub fn node_depth(&self, id: TocNodeId) -> usize {
        1 + self
            .children(id)
            .iter()
            .map(|&c| self.node_depth(c))
            .max()
            .unwrap_or(0)
    }

    /// Number of entry levels (0 for an empty TOC).
    pub fn depth(&self) -> usize {
        self.node_depth(self.root()) - 1
    }

    pub fn count(&self) -> usize {
        self.iter().len()
    }

    pub fn is_empty(&self) -> bool {
        self.children(self.root()).is_empty()
    }

    /// Remove later siblings repeating an earlier sibling's title (or full
    /// `(title, dest, frag)` when `only_text` is false), recursively.
    pub fn remove_duplicates(&mut self, only_text: bool) {
        self.remove_duplicates_under(self.root(), only_text);
    }

    fn remove_duplicates_under(&mut self, parent: TocNodeId, only_text: bool) {
        let mut seen = std::collections::HashSet::new();
        let mut duplicates = Vec::new();
        for &child in self.children(parent).to_vec().iter() {
            let node = self.node(child);
            let key = if only_text {
                (node.title.clone(), None, None)
            } else {
                (node.title.clone(), node.dest.clone(), node.frag.clone())
            };
            if seen.insert(key) {
                self.remove_duplicates_under(child, only_text);
            } else {
                duplicates.push(child);
            }
        }
        for dup in duplicates {
            self.remove(dup);
        }
    }

    /// Drop every node marked `Missing`, keeping its valid descendants.
    pub fn retain_resolved(&mut self) -> usize {
        let missing: Vec<_> = self
            .iter()
            .into_iter()
            .filter(|(id, _)| matches!(self.node(*id).state, TocState::Missing(_)))
            .map(|(id, _)| id)
            .collect();
        for &id in &missing {
            self.remove_from_parent(id);
        }
        missing.len()
    }

    /// Splice out every entry whose title contains `needle`.
    pub fn remove_matching_titles(&mut self, needle: &str) -> usize {
        let matching: Vec<_> = self
            .iter()
            .into_iter()
            .filter(|(id, _)| {
                self.node(*id)
                    .title
                    .as_deref()
                    .is_some_and(|t| t.contains(needle))
            })
            .map(|(id, _)| id)
            .collect();
        for &id in &matching {
            self.remove_from_parent(id);
        }
        matching.len()
    }

    /// Splice out entries pointing into `path` and forget landmarks and
    /// page targets that do.
    pub fn remove_references_to(&mut self, path: &str) {
        let doomed: Vec<_> = self
            .iter()
            .into_iter()
            .filter(|(id, _)| self.node(*id).dest.as_deref() == Some(path))
            .map(|(id, _)| id)
            .collect();
        for id in doomed {
            self.remove_from_parent(id);
        }
        self.page_list.retain(|p| p.reference.path != path);
        self.landmarks.retain(|l| l.reference.path != path);
    }

    /// Rewrite every destination through `map`; `None` leaves it unchanged.
    pub fn rewrite_references(&mut self, mut map: impl FnMut(&Reference) -> Option<Reference>) {
        for (id, _) in self.iter() {
            let node = self.node_mut(id);
            if let Some(old) = node.reference()
                && let Some(new) = map(&old)
            {
                node.dest = Some(new.path);
                node.frag = new.fragment;
            }
        }
        for target in &mut self.page_list {
            if let Some(new) = map(&target.reference) {
                target.reference = new;
            }
        }
        for landmark in &mut self.landmarks {
            if let Some(new) = map(&landmark.reference) {
                landmark.reference = new;
            }
        }
    }

    /// First entry (depth-first) pointing into `path`.
    pub fn find_by_path(&self, path: &str) -> Option<TocNodeId> {
        self.iter()
            .into_iter()
            .map(|(id, _)| id)
            .find(|&id| self.node(id).dest.as_deref() == Some(path))
    }

    /// `(level, title, dest, frag)` of every entry, for inspection and tests.
    pub fn flatten(&self) -> Vec<(usize, String, Option<String>, Option<String>)> {
        self.iter()
            .into_iter()
            .map(|(id, level)| {
                let n = self.node(id);
                (
                    level,
                    n.title.clone().unwrap_or_default(),
                    n.dest.clone(),
                    n.frag.clone(),
                )
            })
            .collect()
    }
}
