//! A generated page listing the book's metadata, placed after the title page.

use super::Transform;
use crate::book::{Book, GuideRole};
use crate::dom::{self, Document, NodeId};
use crate::error::Result;
use crate::options::OptionSet;
use crate::pipeline::JobContext;
use crate::util::{XHTML_MIME, collapse_whitespace};

/// `<meta name=... content="jacket">` marks a generated jacket.
const MARKER_NAME: &str = "ebconv-content";
const MARKER_VALUE: &str = "jacket";

const STYLE: &str = "\
.jacket { text-align: center; }
.jacket .title { margin-bottom: 0.2em; }
.jacket .author, .jacket .series { font-style: italic; }
.jacket .tags { font-size: smaller; }
.jacket .description { text-align: left; margin-top: 1.5em; }
";

pub struct Jacket;

impl Transform for Jacket {
    fn name(&self) -> &'static str {
        "Jacket"
    }

    fn gating_options(&self) -> &'static [&'static str] {
        &["insert_metadata"]
    }

    fn apply(&self, book: &mut Book, _options: &OptionSet, _ctx: &mut JobContext) -> Result<()> {
        for id in book.spine_documents() {
            if book.document(&id).is_ok_and(|doc| is_jacket(&doc)) {
                log::info!("jacket: removing previous jacket {id}");
                book.remove_item(&id);
            }
        }

        let (_, path) = book.manifest.generate("jacket", "jacket.xhtml");
        let doc = render(book);
        let id = book
            .manifest
            .add("jacket", &path, XHTML_MIME, dom::to_xhtml(&doc).into_bytes())?
            .id()
            .to_string();

        let position = book
            .guide
            .get(GuideRole::TitlePage)
            .and_then(|entry| book.manifest.by_path(&entry.reference.path))
            .and_then(|item| book.spine_position(item.id()))
            .map_or(0, |p| p + 1);
        book.spine_insert(&id, position, true)?;
        log::info!("jacket: inserted {id} at spine position {position}");
        Ok(())
    }
}

/// Whether a document is a jacket generated by this pass.
pub fn is_jacket(doc: &Document) -> bool {
    let Some(head) = doc.head() else {
        return false;
    };
    doc.element_children(head).any(|el| {
        doc.is_named(el, "meta")
            && doc.get_attr(el, "name") == Some(MARKER_NAME)
            && doc.get_attr(el, "content") == Some(MARKER_VALUE)
    })
}

fn render(book: &Book) -> Document {
    let meta = &book.metadata;
    let title = meta.title().unwrap_or("Unknown");
    let mut doc = dom::skeleton(title, meta.language());

    if let Some(head) = doc.head() {
        let marker = doc.create_html_element(
            "meta",
            &[("name", MARKER_NAME), ("content", MARKER_VALUE)],
        );
        doc.append(head, marker);
        let style = doc.create_html_element("style", &[("type", "text/css")]);
        doc.append(head, style);
        doc.append_text(style, STYLE);
    }
    let Some(body) = doc.body() else {
        return doc;
    };
    let jacket = doc.create_html_element("div", &[("class", "jacket")]);
    doc.append(body, jacket);

    line(&mut doc, jacket, "h1", "title", title);
    let authors: Vec<&str> = meta.get("creator").iter().map(|c| c.value.as_str()).collect();
    if !authors.is_empty() {
        line(&mut doc, jacket, "p", "author", &authors.join(" & "));
    }
    if let Some(series) = meta.first("custom:series").or_else(|| meta.first("series")) {
        line(&mut doc, jacket, "p", "series", series);
    }
    if let Some(publisher) = meta.first("publisher") {
        line(&mut doc, jacket, "p", "publisher", publisher);
    }
    let tags: Vec<&str> = meta.get("subject").iter().map(|s| s.value.as_str()).collect();
    if !tags.is_empty() {
        line(&mut doc, jacket, "p", "tags", &tags.join(", "));
    }
    if let Some(description) = meta.first("description").filter(|d| !d.trim().is_empty()) {
        let block = doc.create_html_element("div", &[("class", "description")]);
        doc.append(jacket, block);
        add_description(&mut doc, block, description);
    }
    doc
}

fn line(doc: &mut Document, parent: NodeId, tag: &str, class: &str, text: &str) {
    let el = doc.create_html_element(tag, &[("class", class)]);
    doc.append(parent, el);
    doc.append_text(el, text);
}

/// Descriptions are often HTML fragments; plain text becomes one paragraph
/// per blank-line separated block.
fn add_description(doc: &mut Document, block: NodeId, description: &str) {
    if description.trim_start().starts_with('<') {
        let fragment = dom::parse_html(description);
        if let Some(body) = fragment.body() {
            let children: Vec<NodeId> = fragment.children(body).collect();
            for child in children {
                let copy = doc.import(&fragment, child);
                doc.append(block, copy);
            }
            return;
        }
    }
    for para in description.split("\n\n") {
        let text = collapse_whitespace(para);
        if !text.is_empty() {
            line(doc, block, "p", "para", &text);
        }
    }
}
