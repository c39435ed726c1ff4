//! Strict (well-formed XML) parse of content documents with quick-xml.

use html5ever::{LocalName, Namespace, Prefix, QualName, ns};
use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};

use super::arena::{Attribute, Document, NodeId, attr_name};
use crate::error::{Error, Result};

const XML_NS: &str = "http://www.w3.org/XML/1998/namespace";

/// Namespace bindings introduced by one element.
type Scope = Vec<(Option<String>, String)>;

/// Parse a well-formed XML document. Any well-formedness problem is an error;
/// callers fall back to the lenient HTML parser.
pub fn parse_xml(content: &str) -> Result<Document> {
    let mut reader = Reader::from_str(content);

    let mut doc = Document::new();
    let mut open: Vec<NodeId> = vec![doc.root()];
    let mut scopes: Vec<Scope> = vec![vec![(Some("xml".to_string()), XML_NS.to_string())]];

    loop {
        match reader.read_event()? {
            Event::Start(e) => {
                let element = build_element(&mut doc, &e, &mut scopes)?;
                let parent = current(&open);
                doc.append(parent, element);
                open.push(element);
            }
            Event::Empty(e) => {
                let element = build_element(&mut doc, &e, &mut scopes)?;
                scopes.pop();
                let parent = current(&open);
                doc.append(parent, element);
            }
            Event::End(_) => {
                if open.len() <= 1 {
                    return Err(Error::format("XML", "unbalanced end tag"));
                }
                open.pop();
                scopes.pop();
            }
            Event::Text(e) => {
                let text = String::from_utf8_lossy(e.as_ref());
                let parent = current(&open);
                if parent != doc.root() || !text.trim().is_empty() {
                    if parent == doc.root() {
                        return Err(Error::format("XML", "text outside the root element"));
                    }
                    doc.append_text(parent, &text);
                }
            }
            Event::CData(e) => {
                let text = String::from_utf8_lossy(e.as_ref()).into_owned();
                doc.append_text(current(&open), &text);
            }
            Event::GeneralRef(e) => {
                let entity = String::from_utf8_lossy(e.as_ref());
                let resolved = resolve_entity(&entity).ok_or_else(|| {
                    Error::format("XML", format!("undefined entity &{entity};"))
                })?;
                doc.append_text(current(&open), &resolved);
            }
            Event::Comment(e) => {
                let comment = doc.create_comment(String::from_utf8_lossy(e.as_ref()).into_owned());
                doc.append(current(&open), comment);
            }
            Event::DocType(e) => {
                let raw = String::from_utf8_lossy(e.as_ref()).into_owned();
                let name = raw.split_whitespace().next().unwrap_or("html").to_string();
                let doctype = doc.create_doctype(name, String::new(), String::new());
                let root = doc.root();
                doc.append(root, doctype);
            }
            Event::PI(e) => {
                let raw = String::from_utf8_lossy(e.as_ref()).into_owned();
                let (target, data) = raw.split_once(char::is_whitespace).unwrap_or((raw.as_str(), ""));
                let pi = doc.create_pi(target.to_string(), data.trim().to_string());
                doc.append(current(&open), pi);
            }
            Event::Eof => break,
            _ => {}
        }
    }

    if open.len() > 1 {
        return Err(Error::format("XML", "unclosed element at end of input"));
    }
    if doc.document_element().is_none() {
        return Err(Error::format("XML", "no root element"));
    }
    Ok(doc)
}

fn current(open: &[NodeId]) -> NodeId {
    open.last().copied().unwrap_or(NodeId::NONE)
}

/// Create the element for a start tag and push its namespace scope.
fn build_element(doc: &mut Document, e: &BytesStart<'_>, scopes: &mut Vec<Scope>) -> Result<NodeId> {
    let mut scope: Scope = Vec::new();
    let mut attrs = Vec::new();

    for attr in e.attributes() {
        let attr = attr.map_err(|err| Error::format("XML", err.to_string()))?;
        let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
        let value = unescape(&String::from_utf8_lossy(&attr.value))?;

        if key == "xmlns" {
            scope.push((None, value.clone()));
        } else if let Some(prefix) = key.strip_prefix("xmlns:") {
            scope.push((Some(prefix.to_string()), value.clone()));
        }
        attrs.push(Attribute {
            name: attr_name(&key),
            value,
        });
    }
    scopes.push(scope);

    let raw_name = String::from_utf8_lossy(e.name().as_ref()).into_owned();
    let (prefix, local) = match raw_name.split_once(':') {
        Some((p, l)) => (Some(p), l),
        None => (None, raw_name.as_str()),
    };

    let ns = match lookup(scopes, prefix) {
        Some(uri) => Namespace::from(uri),
        None if prefix.is_some() => {
            return Err(Error::format("XML", format!("unbound prefix in <{raw_name}>")));
        }
        None => ns!(),
    };

    let name = QualName::new(prefix.map(Prefix::from), ns, LocalName::from(local));
    Ok(doc.create_element(name, attrs))
}

fn lookup<'a>(scopes: &'a [Scope], prefix: Option<&str>) -> Option<&'a str> {
    scopes.iter().rev().find_map(|scope| {
        scope
            .iter()
            .rev()
            .find(|(p, _)| p.as_deref() == prefix)
            .map(|(_, uri)| uri.as_str())
    })
}

/// Expand entity and character references in an attribute value.
fn unescape(raw: &str) -> Result<String> {
    if !raw.contains('&') {
        return Ok(raw.to_string());
    }
    let mut out = String::with_capacity(raw.len());
    let mut rest = raw;
    while let Some(amp) = rest.find('&') {
        out.push_str(&rest[..amp]);
        let after = &rest[amp + 1..];
        let end = after
            .find(';')
            .ok_or_else(|| Error::format("XML", "unterminated reference in attribute"))?;
        let entity = &after[..end];
        let resolved = resolve_entity(entity)
            .ok_or_else(|| Error::format("XML", format!("undefined entity &{entity};")))?;
        out.push_str(&resolved);
        rest = &after[end + 1..];
    }
    out.push_str(rest);
    Ok(out)
}

/// Local part of a possibly prefixed tag name.
pub(crate) fn local_name(name: &[u8]) -> &[u8] {
    name.iter()
        .rposition(|&b| b == b':')
        .map(|i| &name[i + 1..])
        .unwrap_or(name)
}

/// Lower-cased local name of a start tag.
pub(crate) fn tag_name(e: &BytesStart<'_>) -> String {
    String::from_utf8_lossy(local_name(e.name().as_ref())).to_ascii_lowercase()
}

/// Unescaped value of the attribute written as `key`. Unknown references
/// are kept literally.
pub(crate) fn attribute(e: &BytesStart<'_>, key: &str) -> Option<String> {
    let attr = e
        .attributes()
        .flatten()
        .find(|a| a.key.as_ref() == key.as_bytes())?;
    let raw = String::from_utf8_lossy(&attr.value).into_owned();
    Some(unescape(&raw).unwrap_or(raw))
}

/// Every attribute as `(written name, unescaped value)`.
pub(crate) fn attributes(e: &BytesStart<'_>) -> Vec<(String, String)> {
    e.attributes()
        .flatten()
        .map(|a| {
            let key = String::from_utf8_lossy(a.key.as_ref()).into_owned();
            let raw = String::from_utf8_lossy(&a.value).into_owned();
            (key, unescape(&raw).unwrap_or(raw))
        })
        .collect()
}

/// Resolve the predefined XML entities and character references.
pub(crate) fn resolve_entity(entity: &str) -> Option<String> {
    match entity {
        "apos" => return Some("'".to_string()),
        "quot" => return Some("\"".to_string()),
        "lt" => return Some("<".to_string()),
        "gt" => return Some(">".to_string()),
        "amp" => return Some("&".to_string()),
        _ => {}
    }

    let code = if let Some(hex) = entity.strip_prefix("#x").or_else(|| entity.strip_prefix("#X")) {
        u32::from_str_radix(hex, 16).ok()?
    } else {
        entity.strip_prefix('#')?.parse::<u32>().ok()?
    };
    char::from_u32(code).map(|c| c.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    const XHTML: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<!DOCTYPE html>
<html xmlns="http://www.w3.org/1999/xhtml" xmlns:epub="http://www.idpf.org/2007/ops">
<head><title>T</title></head>
<body><h1 id="c1" title="a &amp; b">One &#8217; two</h1>
<svg xmlns="http://www.w3.org/2000/svg" xmlns:xlink="http://www.w3.org/1999/xlink"><image xlink:href="c.jpg"/></svg>
<section epub:type="chapter"><![CDATA[x < y]]></section></body>
</html>"#;

    #[test]
    fn test_parse_well_formed_xhtml() {
        let doc = parse_xml(XHTML).unwrap();
        let h1 = doc.find_by_id("c1").unwrap();
        assert_eq!(doc.get_attr(h1, "title"), Some("a & b"));
        assert_eq!(doc.text_content(h1), "One \u{2019} two");
        assert_eq!(doc.element_name(h1).unwrap().ns, ns!(html));

        let svg = doc.find_element("svg").unwrap();
        assert_eq!(doc.element_name(svg).unwrap().ns, ns!(svg));
        let image = doc.find_element("image").unwrap();
        assert_eq!(doc.get_attr(image, "xlink:href"), Some("c.jpg"));

        let section = doc.find_element("section").unwrap();
        assert_eq!(doc.get_attr(section, "epub:type"), Some("chapter"));
        assert_eq!(doc.text_content(section), "x < y");
    }

    #[test]
    fn test_rejects_html_only_constructs() {
        assert!(parse_xml("<html><body><p>a&nbsp;b</p></body></html>").is_err());
        assert!(parse_xml("<html><body><p>open</body></html>").is_err());
        assert!(parse_xml("<html><body><br></body>").is_err());
        assert!(parse_xml("no markup at all").is_err());
    }

    #[test]
    fn test_resolve_entity() {
        assert_eq!(resolve_entity("amp"), Some("&".to_string()));
        assert_eq!(resolve_entity("#65"), Some("A".to_string()));
        assert_eq!(resolve_entity("#x2019"), Some("\u{2019}".to_string()));
        assert_eq!(resolve_entity("nbsp"), None);
    }
}
