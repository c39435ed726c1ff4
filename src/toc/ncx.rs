//! The NCX index (`application/x-dtbncx+xml`).

use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};

use super::{PageTarget, Toc, TocNodeId};
use crate::dom::xml::{attribute, local_name, resolve_entity, tag_name};
use crate::error::Result;
use crate::href::{Reference, relative_href, resolve_internal};
use crate::util::{collapse_whitespace, escape_xml};

/// What the text currently being read belongs to.
#[derive(Debug, Clone, Copy)]
enum Owner {
    DocTitle,
    NavPoint(TocNodeId),
    PageTarget(usize),
}

/// Parse an NCX document located at `ncx_path`.
///
/// Destinations are resolved relative to `ncx_path`. Entries are kept even
/// when their destination is missing; verification decides what to do.
pub fn parse(content: &str, ncx_path: &str) -> Result<Toc> {
    let mut reader = Reader::from_str(content.trim_start_matches('\u{feff}'));

    let mut toc = Toc::new();
    let mut owners: Vec<Owner> = Vec::new();
    let mut in_text = false;
    let mut text = String::new();

    loop {
        match reader.read_event()? {
            Event::Start(e) => {
                let local = tag_name(&e);
                match local.as_str() {
                    "ncx" => toc.lang = attribute(&e, "xml:lang"),
                    "doctitle" => owners.push(Owner::DocTitle),
                    "navpoint" => {
                        let parent = owners
                            .iter()
                            .rev()
                            .find_map(|o| match o {
                                Owner::NavPoint(id) => Some(*id),
                                _ => None,
                            })
                            .unwrap_or(toc.root());
                        let node = toc.add_child(parent, None, None, None);
                        toc.node_mut(node).id = attribute(&e, "id");
                        owners.push(Owner::NavPoint(node));
                    }
                    "pagetarget" => {
                        owners.push(Owner::PageTarget(toc.page_list.len()));
                        toc.page_list.push(PageTarget {
                            name: attribute(&e, "value").unwrap_or_default(),
                            reference: Reference::file(""),
                        });
                    }
                    "content" | "meta" => read_leaf(&e, &mut toc, owners.last().copied(), ncx_path),
                    "text" => {
                        in_text = true;
                        text.clear();
                    }
                    _ => {}
                }
            }
            Event::Empty(e) => read_leaf(&e, &mut toc, owners.last().copied(), ncx_path),
            Event::Text(e) => {
                if in_text {
                    text.push_str(&String::from_utf8_lossy(e.as_ref()));
                }
            }
            Event::CData(e) => {
                if in_text {
                    text.push_str(&String::from_utf8_lossy(e.as_ref()));
                }
            }
            Event::GeneralRef(e) => {
                if in_text
                    && let Some(resolved) = resolve_entity(&String::from_utf8_lossy(e.as_ref()))
                {
                    text.push_str(&resolved);
                }
            }
            Event::End(e) => {
                let name = e.name();
                let local = String::from_utf8_lossy(local_name(name.as_ref())).to_ascii_lowercase();
                match local.as_str() {
                    "text" => {
                        in_text = false;
                        let label = collapse_whitespace(&text);
                        match owners.last().copied() {
                            Some(Owner::DocTitle) if !label.is_empty() => toc.title = Some(label),
                            Some(Owner::NavPoint(id)) => {
                                let node = toc.node_mut(id);
                                if node.title.is_none() && !label.is_empty() {
                                    node.title = Some(label);
                                }
                            }
                            Some(Owner::PageTarget(i)) if !label.is_empty() => {
                                if let Some(target) = toc.page_list.get_mut(i) {
                                    target.name = label;
                                }
                            }
                            _ => {}
                        }
                    }
                    "doctitle" | "navpoint" | "pagetarget" => {
                        owners.pop();
                    }
                    _ => {}
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    // Page targets without a destination are useless.
    toc.page_list.retain(|target| !target.reference.path.is_empty());

    Ok(toc)
}

/// `<content src>` and `<meta name="dtb:uid">`.
fn read_leaf(e: &BytesStart<'_>, toc: &mut Toc, owner: Option<Owner>, ncx_path: &str) {
    match tag_name(e).as_str() {
        "content" => {
            if let Some(src) = attribute(e, "src")
                && let Some(reference) = resolve_internal(&src, ncx_path)
            {
                set_destination(toc, owner, reference);
            }
        }
        "meta" if attribute(e, "name").as_deref() == Some("dtb:uid") => {
            toc.uid = attribute(e, "content").filter(|c| !c.trim().is_empty());
        }
        _ => {}
    }
}

fn set_destination(toc: &mut Toc, owner: Option<Owner>, reference: Reference) {
    match owner {
        Some(Owner::NavPoint(id)) => {
            let node = toc.node_mut(id);
            node.dest = Some(reference.path);
            node.frag = reference.fragment;
        }
        Some(Owner::PageTarget(i)) => {
            if let Some(target) = toc.page_list.get_mut(i) {
                target.reference = reference;
            }
        }
        _ => {}
    }
}

/// Book-level values written into the NCX head.
#[derive(Debug, Clone, Default)]
pub struct NcxContext<'a> {
    pub uid: &'a str,
    pub title: &'a str,
    pub lang: Option<&'a str>,
    /// Canonical path the NCX will be written to; hrefs are relative to it.
    pub ncx_path: &'a str,
}

/// Render `toc` as an NCX document.
///
/// `playOrder` increases strictly in depth-first order and `dtb:depth`
/// is the number of entry levels.
pub fn render(toc: &Toc, ctx: &NcxContext<'_>) -> String {
    let mut out = String::new();
    out.push_str("<?xml version=\"1.0\" encoding=\"utf-8\"?>\n");
    out.push_str("<ncx xmlns=\"http://www.daisy.org/z3986/2005/ncx/\" version=\"2005-1\"");
    if let Some(lang) = ctx.lang {
        out.push_str(&format!(" xml:lang=\"{}\"", escape_xml(lang)));
    }
    out.push_str(">\n  <head>\n");
    out.push_str(&format!(
        "    <meta name=\"dtb:uid\" content=\"{}\"/>\n",
        escape_xml(ctx.uid)
    ));
    out.push_str(&format!(
        "    <meta name=\"dtb:depth\" content=\"{}\"/>\n",
        toc.depth().max(1)
    ));
    out.push_str("    <meta name=\"dtb:totalPageCount\" content=\"0\"/>\n");
    out.push_str("    <meta name=\"dtb:maxPageNumber\" content=\"0\"/>\n");
    out.push_str("  </head>\n  <docTitle>\n    <text>");
    out.push_str(&escape_xml(ctx.title));
    out.push_str("</text>\n  </docTitle>\n  <navMap>\n");

    let mut play_order = 0;
    let mut used_ids = std::collections::HashSet::new();
    for &child in toc.children(toc.root()) {
        write_nav_point(&mut out, toc, child, ctx, &mut play_order, &mut used_ids, 2);
    }
    out.push_str("  </navMap>\n");

    if !toc.page_list.is_empty() {
        out.push_str("  <pageList>\n    <navLabel><text>Pages</text></navLabel>\n");
        for (i, target) in toc.page_list.iter().enumerate() {
            play_order += 1;
            out.push_str(&format!(
                "    <pageTarget id=\"page_{}\" type=\"normal\" value=\"{}\" playOrder=\"{}\">\n      <navLabel><text>{}</text></navLabel>\n      <content src=\"{}\"/>\n    </pageTarget>\n",
                i + 1,
                escape_xml(&target.name),
                play_order,
                escape_xml(&target.name),
                escape_xml(&relative_href(&target.reference, ctx.ncx_path)),
            ));
        }
        out.push_str("  </pageList>\n");
    }
    out.push_str("</ncx>\n");
    out
}

fn write_nav_point(
    out: &mut String,
    toc: &Toc,
    id: TocNodeId,
    ctx: &NcxContext<'_>,
    play_order: &mut usize,
    used_ids: &mut std::collections::HashSet<String>,
    indent: usize,
) {
    let node = toc.node(id);
    let pad = "  ".repeat(indent);
    *play_order += 1;

    let nav_id = node
        .id
        .clone()
        .filter(|i| !used_ids.contains(i))
        .unwrap_or_else(|| format!("num_{play_order}"));
    used_ids.insert(nav_id.clone());

    out.push_str(&format!(
        "{pad}<navPoint id=\"{}\" playOrder=\"{play_order}\">\n",
        escape_xml(&nav_id)
    ));
    out.push_str(&format!(
        "{pad}  <navLabel>\n{pad}    <text>{}</text>\n{pad}  </navLabel>\n",
        escape_xml(node.title.as_deref().unwrap_or_default())
    ));
    if let Some(reference) = node.reference() {
        out.push_str(&format!(
            "{pad}  <content src=\"{}\"/>\n",
            escape_xml(&relative_href(&reference, ctx.ncx_path))
        ));
    }
    for &child in toc.children(id) {
        write_nav_point(out, toc, child, ctx, play_order, used_ids, indent + 1);
    }
    out.push_str(&format!("{pad}</navPoint>\n"));
}
