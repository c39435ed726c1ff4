//! A table of contents rendered as a regular content document.

use super::Transform;
use crate::book::{Book, GuideRole};
use crate::dom::{self, Document, NodeId};
use crate::error::Result;
use crate::href::{Reference, relative_href};
use crate::options::OptionSet;
use crate::pipeline::JobContext;
use crate::toc::{Toc, TocNodeId};
use crate::util::{CSS_MIME, XHTML_MIME};

const DEFAULT_TITLE: &str = "Table of Contents";

const STYLE: &str = "\
.toc_header {
  text-align: center;
}
.toc_block {
  margin-left: 1.2em;
  text-indent: -1.2em;
}
.toc_block .toc_block {
  margin-left: 2.4em;
}
.toc_block .toc_block .toc_block {
  margin-left: 3.6em;
}
";

pub struct HtmlTocAdder;

impl Transform for HtmlTocAdder {
    fn name(&self) -> &'static str {
        "HtmlTocAdder"
    }

    fn gating_options(&self) -> &'static [&'static str] {
        &["inline_toc"]
    }

    fn apply(&self, book: &mut Book, options: &OptionSet, _ctx: &mut JobContext) -> Result<()> {
        let at_end = options.flag("toc_at_end");

        if let Some(entry) = book.guide.get(GuideRole::Toc) {
            let path = entry.reference.path.clone();
            match book.manifest.by_path(&path).map(|i| i.id().to_string()) {
                Some(id) if has_links(book, &id) => {
                    if !book.spine().contains(&id) {
                        place(book, &id, at_end)?;
                    }
                    log::debug!("htmltoc: the book already has an inline TOC at {path}");
                    return Ok(());
                }
                Some(_) if book.toc.is_empty() => {}
                _ => {
                    book.guide.remove(GuideRole::Toc);
                }
            }
        }
        if book.toc.is_empty() {
            log::debug!("htmltoc: no TOC entries to render");
            return Ok(());
        }

        let title = options.text("toc_title").unwrap_or(DEFAULT_TITLE).to_string();
        let css = book
            .manifest
            .add("tocstyle", "tocstyle.css", CSS_MIME, STYLE.as_bytes().to_vec())?
            .href()
            .to_string();
        let (_, path) = book.manifest.generate("contents", "contents.xhtml");

        let doc = render(&book.toc, &title, book.metadata.language(), &path, &css);
        let id = book
            .manifest
            .add("contents", &path, XHTML_MIME, dom::to_xhtml(&doc).into_bytes())?
            .id()
            .to_string();
        place(book, &id, at_end)?;
        book.guide
            .set(GuideRole::Toc, DEFAULT_TITLE, Reference::file(path));
        log::info!("htmltoc: generated inline TOC {id}");
        Ok(())
    }
}

fn has_links(book: &Book, id: &str) -> bool {
    book.document(id)
        .map(|doc| {
            doc.find_elements("a")
                .into_iter()
                .any(|a| doc.has_attr(a, "href"))
        })
        .unwrap_or(false)
}

/// At the start of the spine, or non-linear at its end.
fn place(book: &mut Book, id: &str, at_end: bool) -> Result<()> {
    if at_end {
        book.spine_append(id, false)
    } else {
        book.spine_insert(id, 0, true)
    }
}

fn render(toc: &Toc, title: &str, lang: Option<&str>, path: &str, css: &str) -> Document {
    let mut doc = dom::skeleton(title, lang);
    if let Some(head) = doc.head() {
        let href = relative_href(&Reference::file(css), path);
        let link = doc.create_html_element(
            "link",
            &[("rel", "stylesheet"), ("type", CSS_MIME), ("href", href.as_str())],
        );
        doc.append(head, link);
    }
    if let Some(body) = doc.body() {
        doc.set_attr(body, "class", "toc");
        let header = doc.create_html_element("h2", &[("class", "toc_header")]);
        doc.append(body, header);
        doc.append_text(header, title);
        add_level(&mut doc, body, toc, toc.root(), path);
    }
    doc
}

fn add_level(doc: &mut Document, parent: NodeId, toc: &Toc, node: TocNodeId, path: &str) {
    for &child in toc.children(node) {
        let entry = toc.node(child);
        let block = doc.create_html_element("div", &[("class", "toc_block")]);
        doc.append(parent, block);
        let label = entry.title.as_deref().unwrap_or("");
        let line = match entry.reference() {
            Some(target) => {
                let href = relative_href(&target, path);
                doc.create_html_element("a", &[("href", href.as_str()), ("class", "toc_line")])
            }
            None => doc.create_html_element("span", &[("class", "toc_line")]),
        };
        doc.append(block, line);
        doc.append_text(line, label);
        add_level(doc, block, toc, child, path);
    }
}
