//! OPF package and `container.xml` parsing.

use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};

use crate::book::{GuideRole, MetaItem, Metadata};
use crate::dom::xml::{attribute, attributes, local_name, resolve_entity, tag_name};
use crate::error::{Error, Result};
use crate::href::{Reference, resolve_internal};
use crate::util::collapse_whitespace;

/// One `<item>` of the package manifest, its href already resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestEntry {
    pub id: String,
    pub path: String,
    pub media_type: String,
    pub properties: Vec<String>,
}

/// Everything the package document declares.
#[derive(Debug, Clone, Default)]
pub struct Package {
    pub version: Option<String>,
    /// Value of `unique-identifier`.
    pub uid: Option<String>,
    pub metadata: Metadata,
    pub manifest: Vec<ManifestEntry>,
    /// `(idref, linear)` in reading order.
    pub spine: Vec<(String, bool)>,
    /// The spine `toc` attribute.
    pub toc_id: Option<String>,
    pub guide: Vec<(GuideRole, String, Reference)>,
    /// Id named by `<meta name="cover">`.
    pub cover_id: Option<String>,
}

impl Package {
    pub fn entry(&self, id: &str) -> Option<&ManifestEntry> {
        self.manifest.iter().find(|e| e.id == id)
    }

    /// The item marked as cover image, by EPUB 3 property first.
    pub fn cover_entry(&self) -> Option<&ManifestEntry> {
        self.manifest
            .iter()
            .find(|e| e.properties.iter().any(|p| p == "cover-image"))
            .or_else(|| self.cover_id.as_deref().and_then(|id| self.entry(id)))
    }

    /// The EPUB 3 navigation document.
    pub fn nav_entry(&self) -> Option<&ManifestEntry> {
        self.manifest
            .iter()
            .find(|e| e.properties.iter().any(|p| p == "nav"))
    }

    /// The NCX: named by the spine, else found by media type.
    pub fn ncx_entry(&self) -> Option<&ManifestEntry> {
        self.toc_id
            .as_deref()
            .and_then(|id| self.entry(id))
            .or_else(|| {
                self.manifest
                    .iter()
                    .find(|e| e.media_type == crate::util::NCX_MIME)
            })
    }
}

/// Path of the package document named by `META-INF/container.xml`.
pub fn parse_container(bytes: &[u8]) -> Result<String> {
    let content = String::from_utf8(strip_bom(bytes).to_vec())?;
    let mut reader = Reader::from_str(&content);
    reader.config_mut().trim_text(true);

    loop {
        match reader.read_event()? {
            Event::Empty(e) | Event::Start(e) if tag_name(&e) == "rootfile" => {
                if let Some(path) = attribute(&e, "full-path") {
                    return Ok(path);
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }
    Err(Error::format("EPUB", "no rootfile found in container.xml"))
}

pub(crate) fn strip_bom(data: &[u8]) -> &[u8] {
    data.strip_prefix(&[0xEF, 0xBB, 0xBF]).unwrap_or(data)
}

/// A `<meta refines="#id" property="...">` waiting for its target.
struct Refinement {
    target: String,
    property: String,
    value: String,
}

/// Metadata element whose text is being collected.
struct OpenMeta {
    term: String,
    attrs: Vec<(String, String)>,
    text: String,
}

/// Parse a package document located at `opf_path`.
///
/// Hrefs are resolved against `opf_path`. `<meta name content>` and
/// EPUB 3 property metas become terms of their own; `role` and `file-as`
/// refinements are folded into the attributes of the refined element.
pub fn parse_package(content: &str, opf_path: &str) -> Result<Package> {
    let mut reader = Reader::from_str(content.trim_start_matches('\u{feff}'));

    let mut package = Package::default();
    let mut refinements: Vec<Refinement> = Vec::new();
    let mut in_metadata = false;
    let mut open: Option<OpenMeta> = None;
    let mut saw_package = false;

    loop {
        match reader.read_event()? {
            Event::Start(e) => {
                let local = tag_name(&e);
                match local.as_str() {
                    "package" => {
                        saw_package = true;
                        read_package_attrs(&e, &mut package);
                    }
                    "metadata" | "dc-metadata" | "x-metadata" => in_metadata = true,
                    "spine" => read_spine_attrs(&e, &mut package),
                    "item" | "itemref" | "reference" => read_entry(&e, opf_path, &mut package),
                    _ if in_metadata => {
                        let term = metadata_term(&e);
                        open = Some(OpenMeta {
                            term,
                            attrs: attributes(&e),
                            text: String::new(),
                        });
                    }
                    _ => {}
                }
            }
            Event::Empty(e) => {
                let local = tag_name(&e);
                match local.as_str() {
                    "package" => {
                        saw_package = true;
                        read_package_attrs(&e, &mut package);
                    }
                    "spine" => read_spine_attrs(&e, &mut package),
                    "item" | "itemref" | "reference" => read_entry(&e, opf_path, &mut package),
                    "meta" if in_metadata => read_name_meta(&e, &mut package),
                    _ => {}
                }
            }
            Event::Text(e) => {
                if let Some(meta) = open.as_mut() {
                    meta.text.push_str(&String::from_utf8_lossy(e.as_ref()));
                }
            }
            Event::CData(e) => {
                if let Some(meta) = open.as_mut() {
                    meta.text.push_str(&String::from_utf8_lossy(e.as_ref()));
                }
            }
            Event::GeneralRef(e) => {
                if let Some(meta) = open.as_mut()
                    && let Some(resolved) = resolve_entity(&String::from_utf8_lossy(e.as_ref()))
                {
                    meta.text.push_str(&resolved);
                }
            }
            Event::End(e) => {
                let name = e.name();
                let local = String::from_utf8_lossy(local_name(name.as_ref())).to_ascii_lowercase();
                if matches!(local.as_str(), "metadata" | "dc-metadata" | "x-metadata") {
                    in_metadata = false;
                } else if let Some(meta) = open.take() {
                    finish_meta(meta, &mut package, &mut refinements);
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    if !saw_package {
        return Err(Error::format("OPF", "no <package> element"));
    }
    apply_refinements(&mut package.metadata, refinements);
    Ok(package)
}

fn read_package_attrs(e: &BytesStart<'_>, package: &mut Package) {
    package.version = attribute(e, "version");
    package.uid = attribute(e, "unique-identifier").filter(|u| !u.is_empty());
}

fn read_spine_attrs(e: &BytesStart<'_>, package: &mut Package) {
    package.toc_id = attribute(e, "toc").filter(|t| !t.is_empty());
}

/// `dc:title` → `title`; a non-DC element keeps its written name.
fn metadata_term(e: &BytesStart<'_>) -> String {
    let written = String::from_utf8_lossy(e.name().as_ref()).into_owned();
    match written.split_once(':') {
        Some((prefix, local)) if prefix.eq_ignore_ascii_case("dc") => local.to_ascii_lowercase(),
        Some(_) => written,
        None => {
            let lower = written.to_ascii_lowercase();
            if crate::book::DC_TERMS.contains(&lower.as_str()) {
                lower
            } else {
                written
            }
        }
    }
}

fn finish_meta(meta: OpenMeta, package: &mut Package, refinements: &mut Vec<Refinement>) {
    let value = collapse_whitespace(&meta.text);
    let get = |name: &str| {
        meta.attrs
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.clone())
    };

    if meta.term == "meta" {
        // EPUB 3 `<meta property="...">value</meta>`.
        let Some(property) = get("property") else {
            if let (Some(name), Some(content)) = (get("name"), get("content")) {
                add_name_meta(package, name, content);
            }
            return;
        };
        match get("refines") {
            Some(target) => refinements.push(Refinement {
                target: target.trim_start_matches('#').to_string(),
                property,
                value,
            }),
            None if !value.is_empty() => {
                let mut item = MetaItem::new(value);
                if let Some(id) = get("id") {
                    item = item.with_attr("id", id);
                }
                package.metadata.add_item(property, item);
            }
            None => {}
        }
        return;
    }

    if value.is_empty() {
        return;
    }
    let mut item = MetaItem::new(value);
    for (key, v) in meta.attrs {
        if !key.starts_with("xmlns") {
            item.attrs.insert(key, v);
        }
    }
    package.metadata.add_item(meta.term, item);
}

/// OPF 2 `<meta name="..." content="..."/>`; `name="cover"` names the cover.
fn read_name_meta(e: &BytesStart<'_>, package: &mut Package) {
    if let (Some(name), Some(content)) = (attribute(e, "name"), attribute(e, "content")) {
        add_name_meta(package, name, content);
    }
}

fn add_name_meta(package: &mut Package, name: String, content: String) {
    if name == "cover" {
        package.cover_id = Some(content.trim().to_string());
    } else if !content.trim().is_empty() {
        package.metadata.add(name, content.trim());
    }
}

fn apply_refinements(metadata: &mut Metadata, refinements: Vec<Refinement>) {
    let terms: Vec<String> = metadata.iter().map(|(t, _)| t.to_string()).collect();
    for refinement in refinements {
        let attr = match refinement.property.as_str() {
            "role" => "opf:role",
            "file-as" => "opf:file-as",
            "identifier-type" => "opf:scheme",
            other => {
                log::debug!("opf: ignoring refinement {other} of #{}", refinement.target);
                continue;
            }
        };
        let target = terms.iter().find_map(|term| {
            let index = metadata
                .get(term)
                .iter()
                .position(|i| i.attr("id") == Some(refinement.target.as_str()))?;
            Some((term.clone(), index))
        });
        if let Some((term, index)) = target
            && let Some(items) = metadata.get_mut(&term)
        {
            items[index]
                .attrs
                .entry(attr.to_string())
                .or_insert(refinement.value);
        }
    }
}

/// Manifest items, spine itemrefs and guide references.
fn read_entry(e: &BytesStart<'_>, opf_path: &str, package: &mut Package) {
    match tag_name(e).as_str() {
        "item" => read_item(e, opf_path, package),
        "itemref" => {
            if let Some(idref) = attribute(e, "idref") {
                let linear = attribute(e, "linear").is_none_or(|l| l.trim() != "no");
                package.spine.push((idref, linear));
            }
        }
        "reference" => read_reference(e, opf_path, package),
        _ => {}
    }
}

fn read_item(e: &BytesStart<'_>, opf_path: &str, package: &mut Package) {
    let (Some(id), Some(href)) = (attribute(e, "id"), attribute(e, "href")) else {
        log::warn!("opf: manifest item without id or href ignored");
        return;
    };
    let Some(reference) = resolve_internal(&href, opf_path) else {
        log::debug!("opf: remote manifest item {id} ({href}) ignored");
        return;
    };
    if package.entry(&id).is_some() {
        log::warn!("opf: duplicate manifest id {id} ignored");
        return;
    }
    package.manifest.push(ManifestEntry {
        id,
        path: reference.path,
        media_type: attribute(e, "media-type").unwrap_or_default(),
        properties: attribute(e, "properties")
            .map(|p| p.split_whitespace().map(str::to_string).collect())
            .unwrap_or_default(),
    });
}

fn read_reference(e: &BytesStart<'_>, opf_path: &str, package: &mut Package) {
    let (Some(kind), Some(href)) = (attribute(e, "type"), attribute(e, "href")) else {
        return;
    };
    let Some(role) = GuideRole::parse(&kind) else {
        log::debug!("opf: unknown guide type {kind:?} ignored");
        return;
    };
    let Some(reference) = resolve_internal(&href, opf_path) else {
        return;
    };
    let title = attribute(e, "title").unwrap_or_default();
    package.guide.push((role, title, reference));
}

#[cfg(test)]
mod tests {
    use super::*;

    const OPF: &str = r##"<?xml version="1.0" encoding="UTF-8"?>
<package xmlns="http://www.idpf.org/2007/opf" version="3.0" unique-identifier="bookid">
  <metadata xmlns:dc="http://purl.org/dc/elements/1.1/" xmlns:opf="http://www.idpf.org/2007/opf">
    <dc:title>A  Tale &amp; More</dc:title>
    <dc:creator id="cre" opf:file-as="Doe, Jane">Jane Doe</dc:creator>
    <meta refines="#cre" property="role" scheme="marc:relators">aut</meta>
    <dc:identifier id="bookid">urn:uuid:0b7a5c43-1e1a-4d34-9d2e-5c2f34a5b9f1</dc:identifier>
    <dc:language>en</dc:language>
    <meta property="dcterms:modified">2020-01-01T00:00:00Z</meta>
    <meta name="cover" content="cover-img"/>
    <meta name="custom:series" content="Tales"/>
  </metadata>
  <manifest>
    <item id="ncx" href="toc.ncx" media-type="application/x-dtbncx+xml"/>
    <item id="nav" href="nav.xhtml" media-type="application/xhtml+xml" properties="nav"/>
    <item id="cover-img" href="images/cover%20art.jpg" media-type="image/jpeg"/>
    <item id="ch1" href="text/ch1.xhtml" media-type="application/xhtml+xml"/>
    <item id="remote" href="http://example.com/font.otf" media-type="font/otf"/>
  </manifest>
  <spine toc="ncx">
    <itemref idref="ch1"/>
    <itemref idref="nav" linear="no"/>
  </spine>
  <guide>
    <reference type="cover" title="Cover" href="text/ch1.xhtml#top"/>
    <reference type="other.ms-coverimage" href="images/cover%20art.jpg"/>
  </guide>
</package>"##;

    #[test]
    fn test_parse_package() {
        let package = parse_package(OPF, "OEBPS/content.opf").unwrap();
        assert_eq!(package.version.as_deref(), Some("3.0"));
        assert_eq!(package.uid.as_deref(), Some("bookid"));
        assert_eq!(package.metadata.title(), Some("A Tale & More"));

        let creator = &package.metadata.get("creator")[0];
        assert_eq!(creator.value, "Jane Doe");
        assert_eq!(creator.attr("opf:role"), Some("aut"));
        assert_eq!(creator.attr("opf:file-as"), Some("Doe, Jane"));
        assert_eq!(
            package.metadata.first("dcterms:modified"),
            Some("2020-01-01T00:00:00Z")
        );
        assert_eq!(package.metadata.first("custom:series"), Some("Tales"));

        assert_eq!(package.manifest.len(), 4);
        assert_eq!(
            package.cover_entry().unwrap().path,
            "OEBPS/images/cover art.jpg"
        );
        assert_eq!(package.ncx_entry().unwrap().path, "OEBPS/toc.ncx");
        assert_eq!(package.nav_entry().unwrap().id, "nav");
        assert_eq!(
            package.spine,
            [("ch1".to_string(), true), ("nav".to_string(), false)]
        );
        assert_eq!(package.guide.len(), 1);
        assert_eq!(package.guide[0].2.fragment.as_deref(), Some("top"));
    }

    #[test]
    fn test_container() {
        let xml = br#"<?xml version="1.0"?>
<container version="1.0" xmlns="urn:oasis:names:tc:opendocument:xmlns:container">
  <rootfiles><rootfile full-path="OPS/book.opf" media-type="application/oebps-package+xml"/></rootfiles>
</container>"#;
        assert_eq!(parse_container(xml).unwrap(), "OPS/book.opf");
        assert!(parse_container(b"<container/>").is_err());
    }

    #[test]
    fn test_not_a_package() {
        assert!(parse_package("<html/>", "a.opf").is_err());
    }
}
