//! OPF package document generation.

use super::Version;
use crate::book::{Book, DC_TERMS, GuideRole, MetaItem, Metadata};
use crate::href::{Reference, relative_href};
use crate::util::{NCX_MIME, escape_xml, utc_timestamp, uuid_v4};

/// `container.xml` pointing at the package document.
pub fn container_xml(opf_path: &str) -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<container version="1.0" xmlns="urn:oasis:names:tc:opendocument:xmlns:container">
  <rootfiles>
    <rootfile full-path="{}" media-type="application/oebps-package+xml"/>
  </rootfiles>
</container>
"#,
        escape_xml(opf_path)
    )
}

/// The id of the item used as cover image, if any.
pub fn cover_image_id(book: &Book) -> Option<String> {
    if let Some(item) = book.manifest.iter().find(|i| i.has_property("cover-image")) {
        return Some(item.id().to_string());
    }
    let entry = book.guide.get(GuideRole::Cover)?;
    book.manifest
        .by_path(&entry.reference.path)
        .filter(|i| i.is_image())
        .map(|i| i.id().to_string())
}

/// Metadata as written: title, language and identifier are always present
/// and the unique identifier carries an id. Returns the id.
fn prepared_metadata(book: &Book) -> (Metadata, String) {
    let mut metadata = book.metadata.clone();
    if metadata.title().is_none() {
        metadata.set("title", "Unknown");
    }
    if metadata.language().is_none() {
        metadata.set("language", "en");
    }
    if metadata.get("identifier").is_empty() {
        metadata.add("identifier", format!("urn:uuid:{}", uuid_v4()));
    }

    let uid_value = metadata
        .unique_identifier(book.uid.as_deref())
        .map(|i| i.value.clone())
        .unwrap_or_default();
    let mut uid = String::from("uuid_id");
    if let Some(ids) = metadata.get_mut("identifier")
        && let Some(item) = ids.iter_mut().find(|i| i.value == uid_value)
    {
        match item.attr("id") {
            Some(id) => uid = id.to_string(),
            None => {
                item.attrs.insert("id".into(), uid.clone());
            }
        }
    }
    (metadata, uid)
}

/// Render the package document of `book`, hrefs relative to `opf_path`.
pub fn write_package(book: &Book, opf_path: &str, version: Version) -> String {
    let (metadata, uid) = prepared_metadata(book);
    let cover_id = cover_image_id(book);

    let mut opf = String::new();
    opf.push_str("<?xml version=\"1.0\" encoding=\"utf-8\"?>\n");
    opf.push_str(&format!(
        "<package xmlns=\"http://www.idpf.org/2007/opf\" version=\"{}\" unique-identifier=\"{}\">\n",
        version.as_str(),
        escape_xml(&uid)
    ));
    opf.push_str(
        "  <metadata xmlns:dc=\"http://purl.org/dc/elements/1.1/\" xmlns:opf=\"http://www.idpf.org/2007/opf\">\n",
    );

    let mut refines = String::new();
    let mut generated_ids = 0;
    for term in DC_TERMS {
        for item in metadata.get(term) {
            write_dc(&mut opf, &mut refines, term, item, version, &mut generated_ids);
        }
    }
    opf.push_str(&refines);

    for (term, items) in metadata.iter() {
        if DC_TERMS.contains(&term) {
            continue;
        }
        for item in items {
            if version == Version::Epub3 && term.starts_with("dcterms:") {
                if term == "dcterms:modified" {
                    continue;
                }
                opf.push_str(&format!(
                    "    <meta property=\"{}\">{}</meta>\n",
                    escape_xml(term),
                    escape_xml(&item.value)
                ));
            } else {
                opf.push_str(&format!(
                    "    <meta name=\"{}\" content=\"{}\"/>\n",
                    escape_xml(term),
                    escape_xml(&item.value)
                ));
            }
        }
    }
    if let Some(id) = &cover_id {
        opf.push_str(&format!(
            "    <meta name=\"cover\" content=\"{}\"/>\n",
            escape_xml(id)
        ));
    }
    if version == Version::Epub3 {
        opf.push_str(&format!(
            "    <meta property=\"dcterms:modified\">{}</meta>\n",
            utc_timestamp()
        ));
    }
    opf.push_str("  </metadata>\n  <manifest>\n");

    for item in book.manifest.iter() {
        let href = relative_href(&Reference::file(item.href()), opf_path);
        opf.push_str(&format!(
            "    <item id=\"{}\" href=\"{}\" media-type=\"{}\"",
            escape_xml(item.id()),
            escape_xml(&href),
            escape_xml(&item.media_type)
        ));
        if version == Version::Epub3 {
            let mut properties = item.properties.clone();
            if cover_id.as_deref() == Some(item.id())
                && !properties.iter().any(|p| p == "cover-image")
            {
                properties.push("cover-image".into());
            }
            if !properties.is_empty() {
                opf.push_str(&format!(
                    " properties=\"{}\"",
                    escape_xml(&properties.join(" "))
                ));
            }
        }
        opf.push_str("/>\n");
    }

    opf.push_str("  </manifest>\n  <spine");
    if let Some(ncx) = book.manifest.iter().find(|i| i.media_type == NCX_MIME) {
        opf.push_str(&format!(" toc=\"{}\"", escape_xml(ncx.id())));
    }
    opf.push_str(">\n");
    for (_, item, linear) in book.spine_items() {
        opf.push_str(&format!("    <itemref idref=\"{}\"", escape_xml(item.id())));
        if !linear {
            opf.push_str(" linear=\"no\"");
        }
        opf.push_str("/>\n");
    }
    opf.push_str("  </spine>\n");

    if !book.guide.is_empty() {
        opf.push_str("  <guide>\n");
        for (role, entry) in book.guide.iter() {
            opf.push_str(&format!(
                "    <reference type=\"{}\" title=\"{}\" href=\"{}\"/>\n",
                role.as_str(),
                escape_xml(&entry.title),
                escape_xml(&relative_href(&entry.reference, opf_path))
            ));
        }
        opf.push_str("  </guide>\n");
    }
    opf.push_str("</package>\n");
    opf
}

fn write_dc(
    opf: &mut String,
    refines: &mut String,
    term: &str,
    item: &MetaItem,
    version: Version,
    generated_ids: &mut usize,
) {
    opf.push_str(&format!("    <dc:{term}"));
    let mut id = item.attr("id").map(str::to_string);

    let needs_refines = version == Version::Epub3
        && (item.attr("opf:role").is_some() || item.attr("opf:file-as").is_some());
    if needs_refines && id.is_none() {
        *generated_ids += 1;
        id = Some(format!("{term}{generated_ids:02}"));
    }
    if let Some(id) = &id {
        opf.push_str(&format!(" id=\"{}\"", escape_xml(id)));
    }

    for (name, value) in &item.attrs {
        if name == "id" || (version == Version::Epub3 && name.starts_with("opf:")) {
            continue;
        }
        opf.push_str(&format!(" {}=\"{}\"", name, escape_xml(value)));
    }
    opf.push_str(&format!(">{}</dc:{term}>\n", escape_xml(&item.value)));

    if needs_refines && let Some(id) = &id {
        if let Some(role) = item.attr("opf:role") {
            refines.push_str(&format!(
                "    <meta refines=\"#{}\" property=\"role\" scheme=\"marc:relators\">{}</meta>\n",
                escape_xml(id),
                escape_xml(role)
            ));
        }
        if let Some(file_as) = item.attr("opf:file-as") {
            refines.push_str(&format!(
                "    <meta refines=\"#{}\" property=\"file-as\">{}</meta>\n",
                escape_xml(id),
                escape_xml(file_as)
            ));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::book::MetaItem;
    use crate::opf::reader::parse_package;

    fn sample() -> Book {
        let mut book = Book::new();
        book.metadata.add("title", "Tom & Jerry");
        book.metadata.add_item(
            "creator",
            MetaItem::new("Jane Doe")
                .with_attr("opf:role", "aut")
                .with_attr("opf:file-as", "Doe, Jane"),
        );
        book.metadata.add("custom:series", "Cartoons");
        let ch = book
            .add_file("ch1", "OEBPS/text/ch 1.xhtml", b"<html/>".to_vec())
            .unwrap();
        book.add_file("cover", "OEBPS/images/cover.jpg", vec![0xFF, 0xD8])
            .unwrap();
        book.spine_append(&ch, true).unwrap();
        book.guide.set(
            GuideRole::Cover,
            "Cover",
            Reference::file("OEBPS/images/cover.jpg"),
        );
        book
    }

    #[test]
    fn test_epub2_package_round_trips() {
        let book = sample();
        let opf = write_package(&book, "OEBPS/content.opf", Version::Epub2);
        assert!(opf.contains("href=\"text/ch%201.xhtml\""));
        assert!(opf.contains("<meta name=\"cover\" content=\"cover\"/>"));
        assert!(!opf.contains("dcterms:modified"));

        let package = parse_package(&opf, "OEBPS/content.opf").unwrap();
        assert_eq!(package.metadata.title(), Some("Tom & Jerry"));
        assert_eq!(package.metadata.language(), Some("en"));
        assert_eq!(package.uid.as_deref(), Some("uuid_id"));
        assert_eq!(
            package.metadata.get("creator")[0].attr("opf:file-as"),
            Some("Doe, Jane")
        );
        assert_eq!(package.metadata.first("custom:series"), Some("Cartoons"));
        assert_eq!(package.manifest[0].path, "OEBPS/text/ch 1.xhtml");
        assert_eq!(package.spine, [("ch1".to_string(), true)]);
        assert_eq!(package.guide[0].0, GuideRole::Cover);
    }

    #[test]
    fn test_epub3_package_uses_refines() {
        let book = sample();
        let opf = write_package(&book, "OEBPS/content.opf", Version::Epub3);
        assert!(opf.contains("version=\"3.0\""));
        assert!(opf.contains("property=\"role\" scheme=\"marc:relators\">aut</meta>"));
        assert!(opf.contains("properties=\"cover-image\""));
        assert!(opf.contains("<meta property=\"dcterms:modified\">"));
        assert!(!opf.contains("opf:role"));

        let package = parse_package(&opf, "OEBPS/content.opf").unwrap();
        let creator = &package.metadata.get("creator")[0];
        assert_eq!(creator.attr("opf:role"), Some("aut"));
        assert_eq!(creator.attr("opf:file-as"), Some("Doe, Jane"));
    }

    #[test]
    fn test_existing_unique_identifier_is_kept() {
        let mut book = sample();
        book.metadata
            .add_item("identifier", MetaItem::new("isbn:123").with_attr("id", "isbn"));
        book.metadata
            .add_item("identifier", MetaItem::new("urn:uuid:x").with_attr("id", "main"));
        book.uid = Some("main".into());
        let opf = write_package(&book, "content.opf", Version::Epub2);
        assert!(opf.contains("unique-identifier=\"main\""));
        assert_eq!(opf.matches("<dc:identifier").count(), 2);
    }
}
