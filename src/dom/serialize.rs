//! XHTML serialization of a [`Document`].

use html5ever::ns;

use super::arena::{Document, NodeData, NodeId, qualified, EPUB_NS};

const XHTML_NS: &str = "http://www.w3.org/1999/xhtml";
const SVG_NS: &str = "http://www.w3.org/2000/svg";
const MATHML_NS: &str = "http://www.w3.org/1998/Math/MathML";
const XLINK_NS: &str = "http://www.w3.org/1999/xlink";

const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "param", "source",
    "track", "wbr",
];

/// Serialize a whole document as XHTML with an XML declaration.
///
/// Namespace declarations the lenient parser never records (`xmlns` on the
/// root and on embedded SVG/MathML, `xmlns:epub`, `xmlns:xlink`) are added
/// where they are missing.
pub fn to_xhtml(doc: &Document) -> String {
    let mut out = String::from("<?xml version=\"1.0\" encoding=\"utf-8\"?>\n");

    let mut extra_root_decls: Vec<(&str, &str)> = Vec::new();
    if uses_prefix(doc, "epub") && !declares(doc, "xmlns:epub") {
        extra_root_decls.push(("xmlns:epub", EPUB_NS));
    }
    if uses_prefix(doc, "xlink") && !declares(doc, "xmlns:xlink") {
        extra_root_decls.push(("xmlns:xlink", XLINK_NS));
    }

    let mut seen_doctype = false;
    let document_element = doc.document_element();
    for child in doc.children(doc.root()) {
        match doc.get(child).map(|n| &n.data) {
            Some(NodeData::Doctype { name, .. }) => {
                if !seen_doctype {
                    out.push_str(&format!("<!DOCTYPE {name}>\n"));
                    seen_doctype = true;
                }
            }
            Some(NodeData::Element { .. }) if Some(child) == document_element => {
                write_element(doc, child, &extra_root_decls, &mut out);
                out.push('\n');
            }
            _ => {
                write_node(doc, child, &mut out);
            }
        }
    }
    out
}

/// Serialize one node and its subtree (no declaration, no added namespaces).
pub fn node_to_string(doc: &Document, node: NodeId) -> String {
    let mut out = String::new();
    write_node(doc, node, &mut out);
    out
}

fn write_node(doc: &Document, node: NodeId, out: &mut String) {
    let Some(n) = doc.get(node) else {
        return;
    };
    match &n.data {
        NodeData::Element { .. } => write_element(doc, node, &[], out),
        NodeData::Text(text) => out.push_str(&escape_text(text)),
        NodeData::Comment(text) => {
            out.push_str("<!--");
            out.push_str(&text.replace("--", "- -"));
            out.push_str("-->");
        }
        NodeData::ProcessingInstruction { target, data } => {
            out.push_str(&format!("<?{target} {data}?>"));
        }
        NodeData::Document => {
            for child in doc.children(node) {
                write_node(doc, child, out);
            }
        }
        NodeData::Doctype { .. } => {}
    }
}

fn write_element(doc: &Document, node: NodeId, extra: &[(&str, &str)], out: &mut String) {
    let Some(name) = doc.element_name(node) else {
        return;
    };
    let tag = qualified(name);
    out.push('<');
    out.push_str(&tag);

    let attrs = doc.attrs(node);
    let has_xmlns = attrs.iter().any(|a| a.is("xmlns"));
    if !has_xmlns {
        let parent_ns = doc.parent(node).and_then(|p| doc.element_name(p)).map(|n| n.ns.clone());
        let own = &name.ns;
        let declared = if *own == ns!(svg) && parent_ns != Some(ns!(svg)) {
            Some(SVG_NS)
        } else if *own == ns!(mathml) && parent_ns != Some(ns!(mathml)) {
            Some(MATHML_NS)
        } else if doc.parent(node) == Some(doc.root()) && (*own == ns!(html) || *own == ns!()) {
            Some(XHTML_NS)
        } else {
            None
        };
        if let Some(uri) = declared {
            write_attr(out, "xmlns", uri);
        }
    }
    for (attr, value) in extra {
        write_attr(out, attr, value);
    }
    for attr in attrs {
        write_attr(out, &qualified(&attr.name), &attr.value);
    }

    if doc.first_child(node).is_none() && self_closes(doc, node) {
        out.push_str("/>");
        return;
    }

    out.push('>');
    for child in doc.children(node) {
        write_node(doc, child, out);
    }
    out.push_str("</");
    out.push_str(&tag);
    out.push('>');
}

fn self_closes(doc: &Document, node: NodeId) -> bool {
    let Some(name) = doc.element_name(node) else {
        return false;
    };
    let is_html = name.ns == ns!(html) || name.ns == ns!();
    !is_html || VOID_ELEMENTS.contains(&name.local.as_ref())
}

fn write_attr(out: &mut String, name: &str, value: &str) {
    out.push(' ');
    out.push_str(name);
    out.push_str("=\"");
    out.push_str(&escape_attr(value));
    out.push('"');
}

fn uses_prefix(doc: &Document, prefix: &str) -> bool {
    doc.elements().any(|el| {
        doc.attrs(el).iter().any(|a| {
            qualified(&a.name)
                .split_once(':')
                .is_some_and(|(p, _)| p == prefix)
        })
    })
}

fn declares(doc: &Document, decl: &str) -> bool {
    doc.elements().any(|el| doc.has_attr(el, decl))
}

fn escape_text(s: &str) -> String {
    s.replace('&', "&amp;").replace('<', "&lt;").replace('>', "&gt;")
}

fn escape_attr(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}
