//! The EPUB 3 navigation document.

use super::{Landmark, PageTarget, Toc, TocNodeId};
use crate::dom::{self, Document, NodeId};
use crate::error::Result;
use crate::href::{relative_href, resolve_internal};
use crate::util::collapse_whitespace;

fn nav_kind(doc: &Document, nav: NodeId, kind: &str) -> bool {
    doc.get_attr(nav, "epub:type")
        .is_some_and(|t| t.split_whitespace().any(|w| w == kind))
}

/// Parse a navigation document located at `nav_path`.
///
/// Reads `nav[epub:type=toc]` (its heading becomes the TOC title), the
/// landmarks and the page list.
pub fn parse(content: &str, nav_path: &str) -> Result<Toc> {
    let doc = dom::parse_document(content.as_bytes(), nav_path)?;
    let mut toc = Toc::new();

    if let Some(html) = doc.document_element() {
        toc.lang = doc
            .get_attr(html, "xml:lang")
            .or_else(|| doc.get_attr(html, "lang"))
            .map(str::to_string);
    }

    for nav in doc.find_elements("nav") {
        if nav_kind(&doc, nav, "toc") {
            if toc.title.is_none() {
                toc.title = doc
                    .element_children(nav)
                    .find(|&c| {
                        doc.local_name(c)
                            .is_some_and(|n| matches!(n, "h1" | "h2" | "h3" | "h4" | "h5" | "h6"))
                    })
                    .map(|h| collapse_whitespace(&doc.text_content(h)))
                    .filter(|t| !t.is_empty());
            }
            if let Some(ol) = doc.element_children(nav).find(|&c| doc.is_named(c, "ol")) {
                let root = toc.root();
                parse_list(&doc, ol, &mut toc, root, nav_path);
            }
        } else if nav_kind(&doc, nav, "landmarks") {
            for a in doc.descendants(nav).filter(|&n| doc.is_named(n, "a")) {
                let Some(reference) = doc
                    .get_attr(a, "href")
                    .and_then(|h| resolve_internal(h, nav_path))
                else {
                    continue;
                };
                toc.landmarks.push(Landmark {
                    kind: doc.get_attr(a, "epub:type").unwrap_or_default().to_string(),
                    title: collapse_whitespace(&doc.text_content(a)),
                    reference,
                });
            }
        } else if nav_kind(&doc, nav, "page-list") {
            for a in doc.descendants(nav).filter(|&n| doc.is_named(n, "a")) {
                let Some(reference) = doc
                    .get_attr(a, "href")
                    .and_then(|h| resolve_internal(h, nav_path))
                else {
                    continue;
                };
                toc.page_list.push(PageTarget {
                    name: collapse_whitespace(&doc.text_content(a)),
                    reference,
                });
            }
        }
    }
    Ok(toc)
}

fn parse_list(doc: &Document, ol: NodeId, toc: &mut Toc, parent: TocNodeId, nav_path: &str) {
    for li in doc.element_children(ol).filter(|&c| doc.is_named(c, "li")) {
        let label = doc
            .element_children(li)
            .find(|&c| doc.is_named(c, "a") || doc.is_named(c, "span"));

        let (title, reference) = match label {
            Some(label) => {
                let title = collapse_whitespace(&doc.text_content(label));
                let reference = doc
                    .is_named(label, "a")
                    .then(|| doc.get_attr(label, "href"))
                    .flatten()
                    .and_then(|h| resolve_internal(h, nav_path));
                (Some(title).filter(|t| !t.is_empty()), reference)
            }
            None => (None, None),
        };

        let (dest, frag) = match reference {
            Some(r) => (Some(r.path), r.fragment),
            None => (None, None),
        };
        let node = toc.add_child(parent, title, dest, frag);
        for sub in doc.element_children(li).filter(|&c| doc.is_named(c, "ol")) {
            parse_list(doc, sub, toc, node, nav_path);
        }
    }
}

/// Book-level values for the navigation document.
#[derive(Debug, Clone, Default)]
pub struct NavContext<'a> {
    /// `<title>` of the document.
    pub title: &'a str,
    pub lang: Option<&'a str>,
    /// Canonical path the document will be written to.
    pub nav_path: &'a str,
    /// Heading of the TOC nav; defaults to "Table of Contents".
    pub toc_title: Option<&'a str>,
}

/// Render `toc` as a navigation document: the TOC as nested `<ol>`, plus
/// landmarks and page-list navs when present.
pub fn render(toc: &Toc, ctx: &NavContext<'_>) -> String {
    let mut doc = dom::skeleton(ctx.title, ctx.lang);
    let Some(body) = doc.body() else {
        return dom::to_xhtml(&doc);
    };
    if let Some(html) = doc.document_element() {
        doc.set_attr(html, "xmlns:epub", dom::EPUB_NS);
    }

    let heading = ctx
        .toc_title
        .or(toc.title.as_deref())
        .unwrap_or("Table of Contents");
    let nav = open_nav(&mut doc, body, "toc", heading, false);
    let ol = doc.create_html_element("ol", &[]);
    doc.append(nav, ol);
    render_children(&mut doc, ol, toc, toc.root(), ctx.nav_path, 2);
    newline(&mut doc, nav, 1);

    if !toc.landmarks.is_empty() {
        let nav = open_nav(&mut doc, body, "landmarks", "Landmarks", true);
        let ol = doc.create_html_element("ol", &[]);
        doc.append(nav, ol);
        for landmark in &toc.landmarks {
            let href = relative_href(&landmark.reference, ctx.nav_path);
            let a = doc.create_html_element(
                "a",
                &[("epub:type", landmark.kind.as_str()), ("href", href.as_str())],
            );
            doc.append_text(a, &landmark.title);
            append_item(&mut doc, ol, a, 3);
        }
        newline(&mut doc, ol, 2);
        newline(&mut doc, nav, 1);
    }

    if !toc.page_list.is_empty() {
        let nav = open_nav(&mut doc, body, "page-list", "Pages", true);
        let ol = doc.create_html_element("ol", &[]);
        doc.append(nav, ol);
        for target in &toc.page_list {
            let href = relative_href(&target.reference, ctx.nav_path);
            let a = doc.create_html_element("a", &[("href", href.as_str())]);
            doc.append_text(a, &target.name);
            append_item(&mut doc, ol, a, 3);
        }
        newline(&mut doc, ol, 2);
        newline(&mut doc, nav, 1);
    }
    newline(&mut doc, body, 0);

    dom::to_xhtml(&doc)
}

fn open_nav(doc: &mut Document, body: NodeId, kind: &str, heading: &str, hidden: bool) -> NodeId {
    let mut attrs = vec![("epub:type", kind), ("id", kind)];
    if hidden {
        attrs.push(("hidden", ""));
    }
    let nav = doc.create_html_element("nav", &attrs);
    newline(doc, body, 1);
    doc.append(body, nav);
    let h = doc.create_html_element(if hidden { "h2" } else { "h1" }, &[]);
    doc.append_text(h, heading);
    newline(doc, nav, 2);
    doc.append(nav, h);
    newline(doc, nav, 2);
    nav
}

fn render_children(
    doc: &mut Document,
    ol: NodeId,
    toc: &Toc,
    parent: TocNodeId,
    nav_path: &str,
    indent: usize,
) {
    for &child in toc.children(parent) {
        let node = toc.node(child);
        let title = node.title.as_deref().unwrap_or("Unknown");
        let label = match node.reference() {
            Some(reference) => {
                let href = relative_href(&reference, nav_path);
                doc.create_html_element("a", &[("href", href.as_str())])
            }
            None => doc.create_html_element("span", &[]),
        };
        doc.append_text(label, title);

        let li = doc.create_html_element("li", &[]);
        newline(doc, ol, indent + 1);
        doc.append(ol, li);
        if toc.children(child).is_empty() {
            // A lone label stays on one line.
            doc.append(li, label);
            continue;
        }
        newline(doc, li, indent + 2);
        doc.append(li, label);
        let sub = doc.create_html_element("ol", &[]);
        newline(doc, li, indent + 2);
        doc.append(li, sub);
        render_children(doc, sub, toc, child, nav_path, indent + 2);
        newline(doc, li, indent + 1);
    }
    newline(doc, ol, indent);
}

fn append_item(doc: &mut Document, ol: NodeId, label: NodeId, indent: usize) {
    let li = doc.create_html_element("li", &[]);
    newline(doc, ol, indent);
    doc.append(ol, li);
    doc.append(li, label);
}

fn newline(doc: &mut Document, parent: NodeId, indent: usize) {
    let text = doc.create_text(format!("\n{}", "  ".repeat(indent)));
    doc.append(parent, text);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::href::Reference;

    const NAV: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<html xmlns="http://www.w3.org/1999/xhtml" xmlns:epub="http://www.idpf.org/2007/ops" xml:lang="fr">
<head><title>nav</title></head>
<body>
  <nav epub:type="toc" id="toc">
    <h1>Contents</h1>
    <ol>
      <li><a href="text/ch1.xhtml">One</a>
        <ol><li><a href="text/ch1.xhtml#s1">One.
            A</a></li></ol>
      </li>
      <li><span>Part</span><ol><li><a href="text/ch2.xhtml">Two</a></li></ol></li>
    </ol>
  </nav>
  <nav epub:type="landmarks" hidden="">
    <ol><li><a epub:type="cover" href="text/cover.xhtml">Cover</a></li></ol>
  </nav>
  <nav epub:type="page-list"><ol><li><a href="text/ch1.xhtml#p3">3</a></li></ol></nav>
</body>
</html>"#;

    #[test]
    fn test_parse_nav() {
        let toc = parse(NAV, "OEBPS/nav.xhtml").unwrap();
        assert_eq!(toc.title.as_deref(), Some("Contents"));
        assert_eq!(toc.lang.as_deref(), Some("fr"));

        let entries = toc.flatten();
        assert_eq!(entries.len(), 4);
        assert_eq!(entries[0].1, "One");
        assert_eq!(entries[1].0, 2);
        assert_eq!(entries[1].1, "One. A");
        assert_eq!(entries[1].3.as_deref(), Some("s1"));
        assert_eq!(entries[2].1, "Part");
        assert_eq!(entries[2].2, None);
        assert_eq!(entries[3].2.as_deref(), Some("OEBPS/text/ch2.xhtml"));

        assert_eq!(toc.landmarks[0].kind, "cover");
        assert_eq!(toc.page_list[0].reference.fragment.as_deref(), Some("p3"));
    }

    #[test]
    fn test_render_then_parse_preserves_entries() {
        let mut toc = Toc::new();
        let root = toc.root();
        let a = toc.add(root, "Chapter <1>", &Reference::file("OEBPS/text/ch 1.xhtml"));
        toc.add(a, "Section", &Reference::new("OEBPS/text/ch 1.xhtml", Some("s".into())));
        toc.landmarks.push(Landmark {
            kind: "bodymatter".into(),
            title: "Start".into(),
            reference: Reference::file("OEBPS/text/ch 1.xhtml"),
        });

        let ctx = NavContext {
            title: "Book",
            lang: Some("en"),
            nav_path: "OEBPS/nav.xhtml",
            toc_title: None,
        };
        let out = render(&toc, &ctx);
        assert!(out.contains("<li><a href=\"text/ch%201.xhtml#s\">Section</a></li>"));
        assert!(out.contains("epub:type=\"landmarks\""));

        let back = parse(&out, "OEBPS/nav.xhtml").unwrap();
        assert_eq!(back.flatten(), toc.flatten());
        assert_eq!(back.landmarks, toc.landmarks);
        assert_eq!(back.title.as_deref(), Some("Table of Contents"));
    }
}
