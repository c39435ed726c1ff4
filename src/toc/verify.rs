//! Destination checks and anchor assignment.

use std::collections::{HashMap, HashSet};

use super::{Toc, TocState};
use crate::book::Book;
use crate::dom::{Document, NodeId};

/// Anchors of one file, or why the file cannot hold any.
type Anchors = std::result::Result<HashSet<String>, String>;

fn anchors_of(book: &Book, path: &str) -> Anchors {
    let Some(item) = book.manifest.by_path(path) else {
        return Err(format!("no file named {path} exists"));
    };
    if !item.is_markup() {
        return Err(format!("{path} is not a content document"));
    }
    let doc = book
        .document(item.id())
        .map_err(|e| format!("{path} cannot be parsed: {e}"))?;

    let mut anchors = HashSet::new();
    for el in doc.elements() {
        if let Some(id) = doc.element_id(el) {
            anchors.insert(id.to_string());
        }
        if doc.is_named(el, "a")
            && let Some(name) = doc.get_attr(el, "name")
        {
            anchors.insert(name.to_string());
        }
    }
    Ok(anchors)
}

/// Mark every node with a destination `Exists` or `Missing(reason)`.
///
/// Nodes without a destination stay `Unverified`. Files are parsed once.
pub fn verify(book: &Book, toc: &mut Toc) {
    let mut cache: HashMap<String, Anchors> = HashMap::new();
    for (id, _) in toc.iter() {
        let Some(dest) = toc.node(id).dest.clone() else {
            continue;
        };
        let anchors = cache
            .entry(dest.clone())
            .or_insert_with(|| anchors_of(book, &dest));

        let state = match (anchors, &toc.node(id).frag) {
            (Err(reason), _) => TocState::Missing(reason.clone()),
            (Ok(_), None) => TocState::Exists,
            (Ok(set), Some(frag)) if set.contains(frag) => TocState::Exists,
            (Ok(_), Some(frag)) => {
                TocState::Missing(format!("the anchor {frag} does not exist in {dest}"))
            }
        };
        if let TocState::Missing(reason) = &state {
            log::debug!("toc: {:?} -> {reason}", toc.node(id).title);
        }
        toc.node_mut(id).state = state;
    }
}

/// The anchor of `element`, assigning a fresh `toc_<n>` id when it has none.
///
/// An existing `id`, or the `name` of an `<a>`, is reused. `taken` collects
/// the ids handed out so far; ids already present in `doc` are never reused
/// for a new element.
pub fn ensure_id(doc: &mut Document, element: NodeId, taken: &mut HashSet<String>) -> String {
    if let Some(id) = doc.element_id(element) {
        let id = id.to_string();
        taken.insert(id.clone());
        return id;
    }
    if doc.is_named(element, "a")
        && let Some(name) = doc.get_attr(element, "name")
    {
        let name = name.to_string();
        taken.insert(name.clone());
        return name;
    }

    let mut n = 1;
    let id = loop {
        let candidate = format!("toc_{n}");
        if !taken.contains(&candidate) && doc.find_anchor(&candidate).is_none() {
            break candidate;
        }
        n += 1;
    };
    doc.set_attr(element, "id", id.clone());
    taken.insert(id.clone());
    id
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::parse_html;
    use crate::href::Reference;

    #[test]
    fn test_verify_marks_missing_targets() {
        let mut book = Book::new();
        book.add_file(
            "a",
            "a.xhtml",
            b"<html><body><p id='x'>x</p><a name='y'>y</a></body></html>".to_vec(),
        )
        .unwrap();
        book.add_file("img", "pic.png", vec![0x89, b'P', b'N', b'G']).unwrap();

        let mut toc = Toc::new();
        let root = toc.root();
        let ok = toc.add(root, "ok", &Reference::file("a.xhtml"));
        let by_id = toc.add(root, "id", &Reference::new("a.xhtml", Some("x".into())));
        let by_name = toc.add(root, "name", &Reference::new("a.xhtml", Some("y".into())));
        let no_anchor = toc.add(root, "anchor", &Reference::new("a.xhtml", Some("z".into())));
        let no_file = toc.add(root, "file", &Reference::file("gone.xhtml"));
        let image = toc.add(root, "image", &Reference::file("pic.png"));
        let heading = toc.add_child(root, Some("heading".into()), None, None);

        verify(&book, &mut toc);
        for id in [ok, by_id, by_name] {
            assert_eq!(toc.node(id).state, TocState::Exists);
        }
        for id in [no_anchor, no_file, image] {
            assert!(matches!(toc.node(id).state, TocState::Missing(_)));
        }
        assert_eq!(toc.node(heading).state, TocState::Unverified);

        assert_eq!(toc.retain_resolved(), 3);
        assert_eq!(toc.count(), 4);
    }

    #[test]
    fn test_ensure_id_reuses_and_allocates() {
        let mut doc = parse_html(
            "<body><h1 id='a'>A</h1><a name='n'>N</a><h2>B</h2><p id='toc_1'>p</p><h2>C</h2></body>",
        );
        let mut taken = HashSet::new();
        let h1 = doc.find_element("h1").unwrap();
        let a = doc.find_element("a").unwrap();
        let h2s = doc.find_elements("h2");

        assert_eq!(ensure_id(&mut doc, h1, &mut taken), "a");
        assert_eq!(ensure_id(&mut doc, a, &mut taken), "n");
        assert_eq!(ensure_id(&mut doc, h2s[0], &mut taken), "toc_2");
        assert_eq!(ensure_id(&mut doc, h2s[1], &mut taken), "toc_3");
        assert_eq!(doc.element_id(h2s[0]), Some("toc_2"));
    }
}
