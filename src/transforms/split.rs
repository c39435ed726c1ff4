//! Splitting large content documents into several files.
//!
//! Documents are cut between the children of their body (or of the single
//! block wrapping the whole body): before every element matching
//! `page_breaks_before`, and wherever a part would outgrow `flow_size`
//! kilobytes. The first part keeps the original item; the others become
//! `<stem>_split_NNN` items following it in the spine. References to
//! anchors that moved are rewritten everywhere in the book.

use std::collections::{HashMap, HashSet};

use super::{Transform, is_on, rewrite_book_references};
use crate::book::Book;
use crate::dom::{Document, LINK_ATTRS, NodeId, Query, node_to_string};
use crate::error::{Error, Result};
use crate::href::{Reference, basename, dirname, relative_href, resolve_internal};
use crate::options::OptionSet;
use crate::pipeline::JobContext;
use crate::util::XHTML_MIME;

/// Elements that only wrap the body's content and are descended into.
const WRAPPERS: &[&str] = &["div", "section", "article", "main"];

pub struct Split;

impl Transform for Split {
    fn name(&self) -> &'static str {
        "Split"
    }

    fn gating_options(&self) -> &'static [&'static str] {
        &["page_breaks_before", "flow_size"]
    }

    fn is_enabled(&self, options: &OptionSet) -> bool {
        let page_breaks =
            is_on(options, "page_breaks_before") && !options.flag("dont_split_on_page_breaks");
        page_breaks || is_on(options, "flow_size")
    }

    fn apply(&self, book: &mut Book, options: &OptionSet, _ctx: &mut JobContext) -> Result<()> {
        let breaks = match options.text("page_breaks_before") {
            Some(q) if !options.flag("dont_split_on_page_breaks") => Some(
                Query::parse(q)
                    .map_err(|e| Error::invalid_option("page_breaks_before", e.to_string()))?,
            ),
            _ => None,
        };
        let budget = usize::try_from(options.int("flow_size").unwrap_or(0)).unwrap_or(0) * 1024;

        let mut moved = HashMap::new();
        for id in book.spine_documents() {
            let parts = split_document(book, &id, breaks.as_ref(), budget, &mut moved)?;
            if parts > 1 {
                log::info!("split: {id} split into {parts} files");
            }
        }
        if !moved.is_empty() {
            rewrite_book_references(book, &moved, &HashMap::new())?;
        }
        Ok(())
    }
}

/// The node whose children are distributed over the parts.
fn split_container(doc: &Document) -> Option<NodeId> {
    let mut container = doc.body()?;
    loop {
        let mut elements = doc.element_children(container);
        let (Some(only), None) = (elements.next(), elements.next()) else {
            return Some(container);
        };
        let has_text = doc
            .children(container)
            .any(|c| doc.text(c).is_some_and(|t| !t.trim().is_empty()));
        if has_text || !WRAPPERS.iter().any(|w| doc.is_named(only, w)) {
            return Some(container);
        }
        container = only;
    }
}

fn has_content(doc: &Document, node: NodeId) -> bool {
    doc.is_element(node) || doc.text(node).is_some_and(|t| !t.trim().is_empty())
}

/// Group `children` into parts. A part never starts before it has content.
fn partition(
    doc: &Document,
    children: &[NodeId],
    breaks: Option<&Query>,
    budget: usize,
) -> Vec<Vec<NodeId>> {
    let mut parts: Vec<Vec<NodeId>> = vec![Vec::new()];
    let mut size = 0;
    let mut content = false;
    for &child in children {
        let child_size = if budget > 0 {
            node_to_string(doc, child).len()
        } else {
            0
        };
        let page_break = breaks.is_some_and(|q| q.matches(doc, child));
        let overflow = budget > 0 && size + child_size > budget;
        if content && (page_break || overflow) {
            parts.push(Vec::new());
            size = 0;
            content = false;
        }
        size += child_size;
        content |= has_content(doc, child);
        if let Some(part) = parts.last_mut() {
            part.push(child);
        }
    }
    parts
}

/// Anchors defined below `nodes`.
fn anchors(doc: &Document, nodes: &[NodeId]) -> Vec<String> {
    let mut out = Vec::new();
    for &node in nodes {
        for el in doc.descendants(node).filter(|&n| doc.is_element(n)) {
            if let Some(id) = doc.element_id(el) {
                out.push(id.to_string());
            }
            if doc.is_named(el, "a")
                && let Some(name) = doc.get_attr(el, "name")
            {
                out.push(name.to_string());
            }
        }
    }
    out
}

/// Split one document, recording moved anchors in `moved`. Returns the
/// number of parts.
fn split_document(
    book: &mut Book,
    id: &str,
    breaks: Option<&Query>,
    budget: usize,
    moved: &mut HashMap<Reference, Reference>,
) -> Result<usize> {
    let Some(path) = book.manifest.get(id).map(|i| i.href().to_string()) else {
        return Ok(0);
    };
    let doc = match book.document(id) {
        Ok(doc) => doc,
        Err(e) => {
            log::warn!("split: leaving {path} alone: {e}");
            return Ok(0);
        }
    };
    let Some(container) = split_container(&doc) else {
        return Ok(0);
    };
    let children: Vec<NodeId> = doc.children(container).collect();
    let parts = partition(&doc, &children, breaks, budget);
    if parts.len() < 2 {
        return Ok(parts.len());
    }

    let position = book.spine_position(id).unwrap_or(0);
    let linear = book
        .spine()
        .entries()
        .get(position)
        .is_none_or(|e| e.linear);

    let name = basename(&path);
    let (stem, ext) = match name.rfind('.') {
        Some(dot) if dot > 0 => (&name[..dot], &name[dot..]),
        _ => (name, ""),
    };
    let dir = dirname(&path);
    let mut paths = vec![path.clone()];
    let mut ids = vec![id.to_string()];
    for n in 1..parts.len() {
        let file = format!("{stem}_split_{n:03}{ext}");
        let hint = if dir.is_empty() {
            file
        } else {
            format!("{dir}/{file}")
        };
        let item = book
            .manifest
            .add(&format!("{id}_split"), &hint, XHTML_MIME, Vec::new())?;
        ids.push(item.id().to_string());
        paths.push(item.href().to_string());
    }

    // The first definition of an id wins; ids already in the first part stay.
    let kept: HashSet<String> = anchors(&doc, &parts[0]).into_iter().collect();
    let mut local: HashMap<String, usize> = HashMap::new();
    for (index, part) in parts.iter().enumerate().skip(1) {
        for anchor in anchors(&doc, part) {
            if !kept.contains(&anchor) {
                local.entry(anchor).or_insert(index);
            }
        }
    }
    for (anchor, &index) in &local {
        moved.insert(
            Reference::new(path.clone(), Some(anchor.clone())),
            Reference::new(paths[index].clone(), Some(anchor.clone())),
        );
    }

    for (index, part) in parts.iter().enumerate() {
        let mut part_doc = doc.clone();
        for &child in &children {
            if !part.contains(&child) {
                part_doc.detach(child);
            }
        }
        relink(&mut part_doc, &path, &paths[index], &paths, &local);
        book.store_document(&ids[index], &part_doc)?;
        if index > 0 {
            book.spine_insert(&ids[index], position + index, linear)?;
        }
    }
    Ok(parts.len())
}

/// Point the links of a part written at `own` at the right part, resolving
/// them against the original location `original`.
fn relink(
    doc: &mut Document,
    original: &str,
    own: &str,
    paths: &[String],
    local: &HashMap<String, usize>,
) {
    let elements: Vec<NodeId> = doc.elements().collect();
    for el in elements {
        for &attr in LINK_ATTRS {
            let Some(reference) = doc
                .get_attr(el, attr)
                .and_then(|value| resolve_internal(value, original))
            else {
                continue;
            };
            let target = match &reference.fragment {
                Some(frag) if reference.path == original => match local.get(frag) {
                    Some(&index) => Reference::new(paths[index].clone(), Some(frag.clone())),
                    None => reference.clone(),
                },
                _ => reference.clone(),
            };
            if own != original || target != reference {
                doc.set_attr(el, attr, relative_href(&target, own));
            }
        }
    }
}
