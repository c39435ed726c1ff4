//! Content documents: parsing, querying and serialization.
//!
//! Documents are parsed strictly as XML first. When that fails they are
//! parsed once more with html5ever, which accepts anything a browser would.
//! Only a lenient tree without a `<body>` is an error.

mod arena;
mod query;
mod serialize;
mod sink;
pub(crate) mod xml;

pub use arena::{
    Attribute, Children, Descendants, Document, EPUB_NS, Node, NodeData, NodeId, attr_name,
    html_name, qualified,
};
pub use query::Query;
pub use serialize::{node_to_string, to_xhtml};
pub use sink::DocumentSink;

use html5ever::driver::ParseOpts;
use html5ever::parse_document as html5ever_parse;
use html5ever::tendril::TendrilSink;

use crate::error::{Error, Result};
use crate::util::decode_text;

/// Attributes that carry references to other files.
pub const LINK_ATTRS: &[&str] = &["href", "src", "xlink:href", "poster", "data"];

/// Parse a content document, falling back to the lenient parser.
///
/// `name` is only used for diagnostics.
pub fn parse_document(bytes: &[u8], name: &str) -> Result<Document> {
    let text = decode_text(bytes, None);
    let text = text.trim_start_matches('\u{feff}');

    match xml::parse_xml(text) {
        Ok(doc) if doc.body().is_some() => return Ok(doc),
        Ok(_) => log::debug!("{name}: no <body> in strict parse, retrying leniently"),
        Err(e) => log::warn!("{name}: not well-formed ({e}), re-parsing as HTML"),
    }

    let doc = parse_html(text);
    if doc.body().is_none() {
        return Err(Error::Malformed {
            name: name.to_string(),
            reason: "no <body> element after lenient parse".to_string(),
        });
    }
    Ok(doc)
}

/// Lenient HTML5 parse. Never fails.
pub fn parse_html(text: &str) -> Document {
    html5ever_parse(DocumentSink::new(), ParseOpts::default())
        .from_utf8()
        .one(text.as_bytes())
        .into_document()
}

/// An empty XHTML document with `<head><title>` and `<body>`.
pub fn skeleton(title: &str, lang: Option<&str>) -> Document {
    let mut doc = Document::new();
    let root = doc.root();
    let doctype = doc.create_doctype("html".into(), String::new(), String::new());
    doc.append(root, doctype);

    let html = match lang {
        Some(lang) => doc.create_html_element("html", &[("lang", lang), ("xml:lang", lang)]),
        None => doc.create_html_element("html", &[]),
    };
    doc.append(root, html);
    let head = doc.create_html_element("head", &[]);
    doc.append(html, head);
    let title_el = doc.create_html_element("title", &[]);
    doc.append(head, title_el);
    doc.append_text(title_el, title);
    let body = doc.create_html_element("body", &[]);
    doc.append(html, body);
    doc
}

/// Whether `node` is the first content in the body: no text or images
/// precede it in document order.
pub fn is_at_top(doc: &Document, node: NodeId) -> bool {
    let Some(body) = doc.body() else {
        return false;
    };
    for id in doc.descendants(body) {
        if id == node {
            return true;
        }
        if doc.contains(id, node) {
            continue;
        }
        if doc.text(id).is_some_and(|t| !t.trim().is_empty()) {
            return false;
        }
        if doc.is_named(id, "img") || doc.is_named(id, "svg") || doc.is_named(id, "image") {
            return false;
        }
    }
    false
}

/// Whether the body holds neither text nor images.
pub fn is_blank(doc: &Document) -> bool {
    let Some(body) = doc.body() else {
        return true;
    };
    !doc.descendants(body).any(|id| {
        doc.text(id).is_some_and(|t| !t.trim().is_empty())
            || doc.is_named(id, "img")
            || doc.is_named(id, "svg")
            || doc.is_named(id, "image")
    })
}
