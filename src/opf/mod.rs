//! The manifest descriptor: OPF 2/3 package documents.
//!
//! [`read_book`] turns an unpacked package on disk into a [`Book`];
//! [`write_package`] renders a book's package document.

pub mod reader;
pub mod writer;

pub use reader::{ManifestEntry, Package, parse_container, parse_package};
pub use writer::{container_xml, cover_image_id, write_package};

use std::collections::HashMap;
use std::path::Path;

use crate::book::{Book, GuideRole, SpillConfig};
use crate::error::{Error, Result};
use crate::href::Reference;
use crate::toc::{self, Toc};
use crate::util::{decode_text, guess_media_type};

/// Package format version written by the output side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Version {
    #[default]
    Epub2,
    Epub3,
}

impl Version {
    pub fn as_str(self) -> &'static str {
        match self {
            Version::Epub2 => "2.0",
            Version::Epub3 => "3.0",
        }
    }
}

/// Build a book from the package document at `opf_file`.
///
/// Paths are canonical relative to the directory holding the package
/// document. Manifest items whose file is missing are dropped, as are spine
/// entries naming them. The NCX (or, failing that, the navigation document)
/// becomes the book's TOC and is removed from the manifest.
pub fn read_book(opf_file: &Path, spill: Option<SpillConfig>) -> Result<Book> {
    let root = opf_file.parent().unwrap_or(Path::new(""));
    let opf_name = opf_file
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .ok_or_else(|| Error::format("OPF", format!("not a file: {}", opf_file.display())))?;

    let bytes = std::fs::read(opf_file)?;
    let content = decode_text(&bytes, None);
    let package = parse_package(&content, &opf_name)?;

    let mut book = Book::new();
    if let Some(spill) = spill {
        book.manifest.set_spill(spill);
    }
    book.metadata = package.metadata.clone();
    book.uid = package.uid.clone();
    book.version = package.version.clone();

    // Declared id -> id actually used in the manifest.
    let mut ids: HashMap<String, String> = HashMap::new();
    for entry in &package.manifest {
        let file = root.join(&entry.path);
        let data = match std::fs::read(&file) {
            Ok(data) => data,
            Err(e) => {
                log::warn!("opf: {} listed in the manifest but unreadable: {e}", entry.path);
                continue;
            }
        };
        let media_type = if entry.media_type.trim().is_empty() {
            guess_media_type(&entry.path).to_string()
        } else {
            entry.media_type.trim().to_string()
        };
        let item = book.manifest.add(&entry.id, &entry.path, &media_type, data)?;
        let id = item.id().to_string();
        if let Some(item) = book.manifest.get_mut(&id) {
            item.properties = entry.properties.clone();
        }
        ids.insert(entry.id.clone(), id);
    }

    for (idref, linear) in &package.spine {
        let Some(id) = ids.get(idref) else {
            log::warn!("opf: spine entry {idref} has no manifest item");
            continue;
        };
        if book.spine().contains(id) {
            log::warn!("opf: duplicate spine entry {idref} dropped");
            continue;
        }
        book.spine_append(id, *linear)?;
    }

    for (role, title, reference) in &package.guide {
        if book.manifest.contains_path(&reference.path) {
            book.guide.set(*role, title.clone(), reference.clone());
        } else {
            log::debug!("opf: guide {role} points to missing {}", reference.path);
        }
    }

    if let Some(cover) = package.cover_entry()
        && let Some(id) = ids.get(&cover.id)
        && let Some(item) = book.manifest.get_mut(id)
        && item.is_image()
    {
        if !item.has_property("cover-image") {
            item.properties.push("cover-image".into());
        }
        let path = item.href().to_string();
        if book.guide.get(GuideRole::Cover).is_none() {
            book.guide.set(GuideRole::Cover, "Cover", Reference::file(path));
        }
    }

    book.toc = read_toc(&mut book, &package, &ids);
    Ok(book)
}

/// TOC from the NCX, else from the navigation document. The NCX item is
/// dropped; the navigation document too unless it is part of the spine.
fn read_toc(book: &mut Book, package: &Package, ids: &HashMap<String, String>) -> Toc {
    let mut result = Toc::new();

    if let Some(ncx) = package.ncx_entry()
        && let Some(id) = ids.get(&ncx.id)
    {
        match parse_item(book, id, toc::ncx::parse) {
            Ok(parsed) => result = parsed,
            Err(e) => log::warn!("opf: unreadable NCX {}: {e}", ncx.path),
        }
        if !book.spine().contains(id) {
            book.remove_item(id);
        }
    }

    if let Some(nav) = package.nav_entry()
        && let Some(id) = ids.get(&nav.id)
    {
        if result.is_empty() {
            match parse_item(book, id, toc::nav::parse) {
                Ok(parsed) => result = parsed,
                Err(e) => log::warn!("opf: unreadable navigation document {}: {e}", nav.path),
            }
        }
        if book.spine().contains(id) {
            if let Some(item) = book.manifest.get_mut(id) {
                item.properties.retain(|p| p != "nav");
            }
        } else {
            book.remove_item(id);
        }
    }

    if result.title.is_none() {
        result.title = book.title().map(str::to_string);
    }
    log::debug!("opf: TOC with {} entries", result.count());
    result
}

fn parse_item(
    book: &Book,
    id: &str,
    parse: impl Fn(&str, &str) -> Result<Toc>,
) -> Result<Toc> {
    let item = book
        .manifest
        .get(id)
        .ok_or_else(|| Error::Invariant(format!("no manifest item with id {id:?}")))?;
    let data = item.data()?;
    let text = decode_text(&data, None);
    parse(&text, item.href())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write(dir: &Path, path: &str, content: &str) {
        let file = dir.join(path);
        std::fs::create_dir_all(file.parent().unwrap()).unwrap();
        std::fs::write(file, content).unwrap();
    }

    const OPF: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<package xmlns="http://www.idpf.org/2007/opf" version="2.0" unique-identifier="id">
  <metadata xmlns:dc="http://purl.org/dc/elements/1.1/">
    <dc:title>Sample</dc:title>
    <dc:identifier id="id">urn:uuid:1</dc:identifier>
    <meta name="cover" content="img"/>
  </metadata>
  <manifest>
    <item id="ncx" href="toc.ncx" media-type="application/x-dtbncx+xml"/>
    <item id="c1" href="text/c1.xhtml" media-type="application/xhtml+xml"/>
    <item id="img" href="images/cover.jpg" media-type="image/jpeg"/>
    <item id="gone" href="text/gone.xhtml" media-type="application/xhtml+xml"/>
  </manifest>
  <spine toc="ncx">
    <itemref idref="c1"/>
    <itemref idref="c1"/>
    <itemref idref="gone"/>
  </spine>
</package>"#;

    const NCX: &str = r#"<ncx xmlns="http://www.daisy.org/z3986/2005/ncx/" version="2005-1">
<navMap><navPoint id="a"><navLabel><text>One</text></navLabel><content src="text/c1.xhtml"/></navPoint></navMap>
</ncx>"#;

    #[test]
    fn test_read_book_from_directory() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "content.opf", OPF);
        write(dir.path(), "toc.ncx", NCX);
        write(dir.path(), "text/c1.xhtml", "<html><body><p>x</p></body></html>");
        write(dir.path(), "images/cover.jpg", "jpeg");

        let book = read_book(&dir.path().join("content.opf"), None).unwrap();
        book.check_consistency().unwrap();
        assert_eq!(book.title(), Some("Sample"));
        assert_eq!(book.uid.as_deref(), Some("id"));
        assert_eq!(book.spine().len(), 1);
        assert!(book.manifest.get("ncx").is_none());
        assert!(book.manifest.get("gone").is_none());
        assert_eq!(book.toc.flatten()[0].2.as_deref(), Some("text/c1.xhtml"));
        assert_eq!(
            book.guide.get(GuideRole::Cover).unwrap().reference.path,
            "images/cover.jpg"
        );
        assert!(book.manifest.get("img").unwrap().has_property("cover-image"));
    }
}
