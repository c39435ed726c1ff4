//! Building a TOC from the content when the book does not carry a usable one.

use std::collections::{HashMap, HashSet};

use super::{Toc, TocNodeId, verify};
use crate::book::Book;
use crate::dom::{self, Document, NodeId, Query};
use crate::error::Result;
use crate::href::{Resolved, basename, resolve};
use crate::util::collapse_whitespace;

/// Budget for titles taken from running text.
const TEXT_LIMIT: usize = 200;

/// Which heuristic produced a generated TOC.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TocSource {
    Headings,
    Links,
    Files,
}

/// Visible label of a heading or link: its own `title` or `alt`, else its
/// text, else the `alt` of an image inside it.
fn element_label(doc: &Document, el: NodeId) -> String {
    let own = ["title", "alt"]
        .iter()
        .filter_map(|attr| doc.get_attr(el, attr))
        .map(collapse_whitespace)
        .find(|label| !label.is_empty());
    if let Some(label) = own {
        return label;
    }
    let text = collapse_whitespace(&doc.text_content(el));
    if !text.is_empty() {
        return text.chars().take(1000).collect::<String>().trim().to_string();
    }
    doc.descendants(el)
        .filter(|&n| doc.is_named(n, "img"))
        .find_map(|n| doc.get_attr(n, "alt"))
        .map(collapse_whitespace)
        .filter(|alt| !alt.is_empty())
        .unwrap_or_else(|| "(Untitled)".to_string())
}

/// The TOC node a heading of `level` hangs under: the nearest preceding
/// node of a lower level.
fn parent_for_level(toc: &Toc, levels: &HashMap<TocNodeId, usize>, level: usize) -> TocNodeId {
    let limit = level - 1;
    let mut node = toc.root();
    loop {
        let Some(&last) = toc.children(node).last() else {
            return node;
        };
        let last_level = levels.get(&last).copied().unwrap_or(0);
        if last_level > limit {
            return node;
        } else if last_level == limit {
            return last;
        }
        node = last;
    }
}

/// One query per level (`queries[0]` is level 1).
///
/// Levels without a single match in the whole spine are dropped and the
/// rest renumbered. Headings that are not the first content of their file
/// get an anchor, and the documents carrying new anchors are stored back.
pub fn from_headings(book: &mut Book, queries: &[Query]) -> Result<Toc> {
    let mut parsed: Vec<(String, Document, Vec<Vec<NodeId>>)> = Vec::new();
    let mut empty_levels: HashSet<usize> = (0..queries.len()).collect();

    for id in book.spine_documents() {
        let doc = match book.document(&id) {
            Ok(doc) => doc,
            Err(e) => {
                log::warn!("toc: skipping {id} while looking for headings: {e}");
                continue;
            }
        };
        let matches: Vec<Vec<NodeId>> = queries.iter().map(|q| q.select(&doc)).collect();
        for (level, found) in matches.iter().enumerate() {
            if !found.is_empty() {
                empty_levels.remove(&level);
            }
        }
        parsed.push((id, doc, matches));
    }

    let mut toc = Toc::new();
    let mut node_levels: HashMap<TocNodeId, usize> = HashMap::new();

    for (id, mut doc, matches) in parsed {
        let path = match book.manifest.get(&id) {
            Some(item) => item.href().to_string(),
            None => continue,
        };

        // Contiguous renumbering of the levels that matched somewhere.
        let mut level_of: HashMap<NodeId, usize> = HashMap::new();
        let mut level = 0;
        for (index, found) in matches.into_iter().enumerate() {
            if empty_levels.contains(&index) {
                continue;
            }
            level += 1;
            for el in found {
                level_of.entry(el).or_insert(level);
            }
        }

        let mut taken = HashSet::new();
        let mut dirty = false;
        let headings: Vec<NodeId> = doc
            .elements()
            .filter(|el| level_of.contains_key(el))
            .collect();
        for el in headings {
            let level = level_of[&el];
            let title = element_label(&doc, el);
            let parent = parent_for_level(&toc, &node_levels, level);
            let frag = if dom::is_at_top(&doc, el) {
                None
            } else {
                let had_id = doc.element_id(el).is_some()
                    || (doc.is_named(el, "a") && doc.has_attr(el, "name"));
                let anchor = verify::ensure_id(&mut doc, el, &mut taken);
                dirty |= !had_id;
                Some(anchor)
            };
            let node = toc.add_child(parent, Some(title), Some(path.clone()), frag);
            toc.node_mut(node).state = super::TocState::Exists;
            node_levels.insert(node, level);
        }
        if dirty {
            book.store_document(&id, &doc)?;
        }
    }
    Ok(toc)
}

/// Every internal link in spine order, de-duplicated by destination and,
/// unless `keep_duplicate_titles`, by text. Unresolvable entries are dropped.
pub fn from_links(book: &Book, keep_duplicate_titles: bool) -> Toc {
    let mut toc = Toc::new();
    let root = toc.root();
    let mut seen_dests = HashSet::new();
    let mut seen_titles = HashSet::new();

    for id in book.spine_documents() {
        let Some(path) = book.manifest.get(&id).map(|i| i.href().to_string()) else {
            continue;
        };
        let doc = match book.document(&id) {
            Ok(doc) => doc,
            Err(e) => {
                log::warn!("toc: skipping {id} while collecting links: {e}");
                continue;
            }
        };
        for a in doc.elements().filter(|&el| doc.is_named(el, "a")) {
            let Some(href) = doc.get_attr(a, "href").filter(|h| !h.trim().is_empty()) else {
                continue;
            };
            let Resolved::Internal(reference) = resolve(href, &path) else {
                continue;
            };
            if !seen_dests.insert(reference.clone()) {
                continue;
            }
            let title = element_label(&doc, a);
            if !keep_duplicate_titles && !seen_titles.insert(title.clone()) {
                continue;
            }
            toc.add(root, &title, &reference);
        }
    }

    verify(book, &mut toc);
    toc.retain_resolved();
    toc
}

/// First non-trivial block of text below `node`, shortened to the budget.
fn find_text(doc: &Document, node: NodeId) -> Option<String> {
    for child in doc.element_children(node) {
        let text = collapse_whitespace(&doc.text_content(child));
        if text.is_empty() {
            continue;
        }
        if text.chars().count() > TEXT_LIMIT {
            return find_text(doc, child).or_else(|| {
                let short: String = text.chars().take(TEXT_LIMIT).collect();
                Some(format!("{short}..."))
            });
        }
        return Some(text);
    }
    None
}

/// One entry per spine document.
pub fn from_files(book: &Book) -> Toc {
    let mut toc = Toc::new();
    let root = toc.root();
    for id in book.spine_documents() {
        let Some(path) = book.manifest.get(&id).map(|i| i.href().to_string()) else {
            continue;
        };
        let Ok(doc) = book.document(&id) else {
            continue;
        };
        let Some(body) = doc.body() else {
            continue;
        };
        let title = find_text(&doc, body).unwrap_or_else(|| {
            let name = basename(&path);
            let stem = name.rsplit_once('.').map(|(s, _)| s).unwrap_or(name);
            let first = book.spine_position(&id) == Some(0);
            if first && matches!(stem.to_lowercase().as_str(), "cover" | "titlepage") {
                "Cover".to_string()
            } else {
                name.to_string()
            }
        });
        toc.add_child(root, Some(title), Some(path), None);
    }
    toc
}

/// Knobs for [`generate`].
#[derive(Debug, Clone)]
pub struct Heuristics {
    /// One query per heading level.
    pub queries: Vec<Query>,
    /// Links are only used when there are at most this many.
    pub max_links: usize,
    pub keep_duplicate_titles: bool,
}

/// Headings, then links, then files: the first heuristic yielding entries
/// wins.
pub fn generate(book: &mut Book, heuristics: &Heuristics) -> Result<(Toc, TocSource)> {
    if !heuristics.queries.is_empty() {
        let toc = from_headings(book, &heuristics.queries)?;
        if !toc.is_empty() {
            return Ok((toc, TocSource::Headings));
        }
    }
    let toc = from_links(book, heuristics.keep_duplicate_titles);
    if !toc.is_empty() && toc.count() <= heuristics.max_links {
        return Ok((toc, TocSource::Links));
    }
    if toc.count() > heuristics.max_links {
        log::debug!(
            "toc: {} links exceed the limit of {}, ignoring them",
            toc.count(),
            heuristics.max_links
        );
    }
    Ok((from_files(book), TocSource::Files))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::parse_html;

    fn book(files: &[(&str, &str)]) -> Book {
        let mut book = Book::new();
        for (name, body) in files {
            let id = book
                .add_file(
                    name,
                    &format!("text/{name}"),
                    format!("<html><body>{body}</body></html>").into_bytes(),
                )
                .unwrap();
            book.spine_append(&id, true).unwrap();
        }
        book
    }

    fn queries(list: &[&str]) -> Vec<Query> {
        list.iter().map(|q| Query::parse(q).unwrap()).collect()
    }

    #[test]
    fn test_headings_nest_under_lower_levels() {
        let mut b = book(&[
            ("a.xhtml", "<h1>One</h1><p>x</p><h2>One.1</h2><h3>One.1.a</h3>"),
            ("b.xhtml", "<h2>Orphan</h2><h1>Two</h1>"),
        ]);
        let toc = from_headings(&mut b, &queries(&["h1", "h2", "h3"])).unwrap();
        let entries: Vec<_> = toc.flatten().into_iter().map(|e| (e.0, e.1)).collect();
        assert_eq!(
            entries,
            [
                (1, "One".into()),
                (2, "One.1".into()),
                (3, "One.1.a".into()),
                (2, "Orphan".into()),
                (1, "Two".into()),
            ]
        );
        // The first heading is at the top of its file and needs no anchor.
        assert_eq!(toc.flatten()[0].3, None);
        assert_eq!(toc.flatten()[1].3.as_deref(), Some("toc_1"));

        let doc = b.document("a.xhtml").unwrap();
        assert!(doc.find_by_id("toc_1").is_some());
    }

    #[test]
    fn test_empty_levels_collapse() {
        let mut b = book(&[("a.xhtml", "<h1>A</h1><h3>A.a</h3><h1>B</h1>")]);
        let toc = from_headings(&mut b, &queries(&["h1", "h2", "h3"])).unwrap();
        assert_eq!(toc.depth(), 2);
        let levels: Vec<_> = toc.flatten().into_iter().map(|e| e.0).collect();
        assert_eq!(levels, [1, 2, 1]);
    }

    #[test]
    fn test_links_are_deduplicated_and_verified() {
        let b = book(&[
            (
                "index.xhtml",
                "<a href='a.xhtml'>A</a><a href='a.xhtml'>A again</a>\
                 <a href='b.xhtml#s'>A</a><a href='gone.xhtml'>Gone</a>\
                 <a href='http://example.com'>Web</a><a href='a.xhtml#nope'>Nope</a>",
            ),
            ("a.xhtml", "<p>a</p>"),
            ("b.xhtml", "<p id='s'>b</p>"),
        ]);
        let toc = from_links(&b, false);
        let titles: Vec<_> = toc.flatten().into_iter().map(|e| e.1).collect();
        assert_eq!(titles, ["A"]);

        let toc = from_links(&b, true);
        let titles: Vec<_> = toc.flatten().into_iter().map(|e| e.1).collect();
        assert_eq!(titles, ["A", "A"]);
    }

    #[test]
    fn test_files_use_first_text_block() {
        let long = "word ".repeat(100);
        let b = book(&[
            ("cover.xhtml", "<div><img src='c.jpg'/></div>"),
            ("a.xhtml", "<div> </div><p>First   paragraph</p>"),
            ("b.xhtml", &format!("<div>{long}</div>")),
            ("c.xhtml", ""),
        ]);
        let toc = from_files(&b);
        let titles: Vec<_> = toc.flatten().into_iter().map(|e| e.1).collect();
        assert_eq!(titles[0], "Cover");
        assert_eq!(titles[1], "First paragraph");
        assert!(titles[2].ends_with("..."));
        assert_eq!(titles[2].chars().count(), TEXT_LIMIT + 3);
        assert_eq!(titles[3], "c.xhtml");
    }

    #[test]
    fn test_labels_prefer_own_title_and_alt() {
        let mut b = book(&[(
            "a.xhtml",
            "<h1 title='Prologue'><img src='p.png'/></h1>\
             <h1><img src='q.png' alt='Part  Two'/></h1>\
             <h1><img alt='Inner' src='r.png'/> Outer</h1>",
        )]);
        let toc = from_headings(&mut b, &queries(&["h1"])).unwrap();
        let titles: Vec<_> = toc.flatten().into_iter().map(|e| e.1).collect();
        assert_eq!(titles, ["Prologue", "Part Two", "Outer"]);

        let doc = parse_html("<a alt='Map'>see the map</a>");
        let a = doc.find_element("a").unwrap();
        assert_eq!(element_label(&doc, a), "Map");
    }

    #[test]
    fn test_cover_title_needs_first_spine_position() {
        let mut b = book(&[("cover.xhtml", "<div><img src='c.jpg'/></div>")]);
        let image = b.add_file("art", "images/art.jpg", vec![0xff, 0xd8]).unwrap();
        b.spine_insert(&image, 0, true).unwrap();
        let toc = from_files(&b);
        let titles: Vec<_> = toc.flatten().into_iter().map(|e| e.1).collect();
        assert_eq!(titles, ["cover.xhtml"]);
    }

    #[test]
    fn test_generate_falls_back_in_order() {
        let mut b = book(&[("a.xhtml", "<p>Just text</p>")]);
        let heuristics = Heuristics {
            queries: queries(&["h1"]),
            max_links: 50,
            keep_duplicate_titles: false,
        };
        let (toc, source) = generate(&mut b, &heuristics).unwrap();
        assert_eq!(source, TocSource::Files);
        assert_eq!(toc.count(), 1);
    }
}
