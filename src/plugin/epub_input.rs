//! EPUB input: unpack the archive and hand a cleaned-up package document
//! to the pipeline.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use zip::ZipArchive;

use super::fonts::{Obfuscation, adobe_key, idpf_key, parse_encryption};
use super::{InputArtifacts, InputOutcome, InputPlugin};
use crate::book::{Book, GuideRole};
use crate::error::{Error, Result};
use crate::href::{Reference, dirname};
use crate::opf::{self, Version, parse_container, parse_package};
use crate::options::{Level, OptionSet, Recommendation};
use crate::pipeline::JobContext;
use crate::toc::ncx::{self, NcxContext};
use crate::util::{NCX_MIME, decode_text};

/// Name of the rewritten package document, next to the original one.
const NORMALIZED_OPF: &str = "content.opf";

/// Media types that never belong in the reading order.
const NOT_FOR_SPINE: &[&str] = &[
    "application/vnd.adobe-page-template+xml",
    "application/vnd.adobe.page-template+xml",
    "application/adobe-page-template+xml",
    "application/adobe.page-template+xml",
    "application/text",
];

pub struct EpubInput;

impl InputPlugin for EpubInput {
    fn name(&self) -> &'static str {
        "epub"
    }

    fn file_types(&self) -> &'static [&'static str] {
        &["epub"]
    }

    fn recommendations(&self) -> Vec<Recommendation> {
        vec![Recommendation::new("page_breaks_before", "", Level::Medium)]
    }

    fn convert(
        &self,
        source: &Path,
        _options: &OptionSet,
        _detected_ext: &str,
        ctx: &mut JobContext,
    ) -> Result<InputOutcome> {
        let root = ctx.subdir("epub")?;
        extract(source, &root)?;
        let opf_path = find_opf(&root)?;
        log::info!("epub: package document {opf_path}");
        let opf_file = root.join(&opf_path);
        let opf_dir = dirname(&opf_path).to_string();

        let encrypted_fonts = process_encryption(&root, &opf_file, &opf_dir, source)?;
        let mut book = opf::read_book(&opf_file, Some(ctx.spill_config()))?;
        if book
            .manifest
            .iter()
            .any(|i| i.media_type == "application/x-dtbook+xml")
        {
            return Err(Error::UnsupportedFormat(
                "EPUB files with DTBook markup".into(),
            ));
        }
        let removed_cover = rationalize_cover(&mut book);
        clean_spine(&mut book)?;

        let normalized = write_normalized(&mut book, &opf_file)?;
        Ok(InputOutcome {
            source: super::BookSource::Descriptor(normalized),
            artifacts: InputArtifacts {
                removed_cover,
                encrypted_fonts,
            },
        })
    }

    fn postprocess_book(
        &self,
        book: &mut Book,
        _options: &OptionSet,
        artifacts: &InputArtifacts,
    ) -> Result<()> {
        let Some(removed) = &artifacts.removed_cover else {
            return Ok(());
        };
        let title_page = book
            .guide
            .get(GuideRole::TitlePage)
            .map(|e| e.reference.path.clone())
            .filter(|p| book.manifest.contains_path(p));
        match title_page {
            Some(page) => book.toc.rewrite_references(|r| {
                (r.path == *removed).then(|| Reference::file(page.as_str()))
            }),
            None => book.toc.remove_references_to(removed),
        }
        Ok(())
    }
}

/// Unpack every entry below `root`, refusing paths that escape it.
fn extract(source: &Path, root: &Path) -> Result<()> {
    let file = fs::File::open(source)?;
    let mut archive = ZipArchive::new(file)?;
    for i in 0..archive.len() {
        let mut entry = archive.by_index(i)?;
        let Some(relative) = entry.enclosed_name() else {
            log::warn!("epub: skipping unsafe entry {}", entry.name());
            continue;
        };
        let target = root.join(relative);
        if entry.is_dir() {
            fs::create_dir_all(&target)?;
            continue;
        }
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut out = fs::File::create(&target)?;
        io::copy(&mut entry, &mut out)?;
    }
    log::debug!("epub: extracted {} entries", archive.len());
    Ok(())
}

/// Container-relative path of the package document: the one named by
/// `META-INF/container.xml`, else the first `*.opf` found.
fn find_opf(root: &Path) -> Result<String> {
    let container = root.join("META-INF").join("container.xml");
    match fs::read(&container) {
        Ok(bytes) => match parse_container(&bytes) {
            Ok(path) if root.join(&path).is_file() => return Ok(path),
            Ok(path) => log::warn!("epub: container.xml names missing {path}"),
            Err(e) => log::warn!("epub: unusable container.xml: {e}"),
        },
        Err(_) => log::warn!("epub: no META-INF/container.xml"),
    }

    let mut found = Vec::new();
    scan_for_opf(root, root, &mut found)?;
    found.sort();
    found
        .into_iter()
        .next()
        .ok_or_else(|| Error::format("EPUB", "could not find a package document"))
}

fn scan_for_opf(root: &Path, dir: &Path, found: &mut Vec<String>) -> Result<()> {
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        if name.starts_with('.') || name == "__MACOSX" {
            continue;
        }
        if path.is_dir() {
            scan_for_opf(root, &path, found)?;
        } else if name.to_ascii_lowercase().ends_with(".opf")
            && let Ok(relative) = path.strip_prefix(root)
        {
            found.push(relative.to_string_lossy().replace('\\', "/"));
        }
    }
    Ok(())
}

/// De-obfuscate fonts in place. Returns their canonical paths (relative to
/// the package document). Any other kind of encryption is DRM.
fn process_encryption(
    root: &Path,
    opf_file: &Path,
    opf_dir: &str,
    source: &Path,
) -> Result<Vec<String>> {
    let encryption = root.join("META-INF").join("encryption.xml");
    let Ok(bytes) = fs::read(&encryption) else {
        return Ok(Vec::new());
    };
    let drm = || Error::Drm(source.display().to_string());
    let entries = parse_encryption(&decode_text(&bytes, None)).map_err(|_| drm())?;
    if entries.is_empty() {
        return Ok(Vec::new());
    }
    if let Some(entry) = entries
        .iter()
        .find(|e| Obfuscation::from_algorithm(&e.algorithm).is_none())
    {
        log::error!("epub: {} is encrypted with {}", entry.uri, entry.algorithm);
        return Err(drm());
    }

    let package = {
        let bytes = fs::read(opf_file)?;
        parse_package(&decode_text(&bytes, None), NORMALIZED_OPF)?
    };
    let idpf = package
        .metadata
        .unique_identifier(package.uid.as_deref())
        .map(|i| idpf_key(&i.value));
    let adobe = package
        .metadata
        .get("identifier")
        .iter()
        .filter(|i| {
            i.attr("opf:scheme").is_some_and(|s| s.eq_ignore_ascii_case("uuid"))
                || i.value.starts_with("urn:uuid:")
        })
        .find_map(|i| adobe_key(&i.value));

    let prefix = if opf_dir.is_empty() {
        String::new()
    } else {
        format!("{opf_dir}/")
    };
    let mut fonts = Vec::new();
    for entry in entries {
        let Some(scheme) = Obfuscation::from_algorithm(&entry.algorithm) else {
            continue;
        };
        let key: Option<&[u8]> = match scheme {
            Obfuscation::Idpf => idpf.as_ref().map(|k| k.as_slice()),
            Obfuscation::Adobe => adobe.as_ref().map(|k| k.as_slice()),
        };
        let file = root.join(&entry.uri);
        let (Some(key), true) = (key, file.is_file()) else {
            log::warn!("epub: cannot de-obfuscate {}", entry.uri);
            continue;
        };
        let mut data = fs::read(&file)?;
        scheme.apply(&mut data, key);
        fs::write(&file, data)?;
        log::debug!("epub: de-obfuscated {} ({scheme:?})", entry.uri);
        let canonical = entry
            .uri
            .strip_prefix(prefix.as_str())
            .unwrap_or(&entry.uri)
            .to_string();
        fonts.push(canonical);
    }
    Ok(fonts)
}

/// Sort out cover markings. An HTML cover page that is also the first
/// spine item leaves the spine and becomes the title page; the guide cover
/// then points at the raster cover image, if there is one. Returns the path
/// of the removed page.
fn rationalize_cover(book: &mut Book) -> Option<String> {
    let cover_path = book.guide.get(GuideRole::Cover)?.reference.path.clone();
    let (first_id, first_path) = book
        .spine_items()
        .next()
        .map(|(_, item, _)| (item.id().to_string(), item.href().to_string()))?;
    if first_path != cover_path {
        return None;
    }
    if book.spine().len() == 1 {
        log::warn!("epub: the only spine item is marked as the cover, dropping the marking");
        book.guide.remove(GuideRole::Cover);
        return None;
    }

    log::info!("epub: found HTML cover {cover_path}");
    book.spine_remove(&first_id);
    book.guide
        .set(GuideRole::TitlePage, "Title Page", Reference::file(cover_path.as_str()));
    let raster = book
        .manifest
        .iter()
        .find(|i| i.has_property("cover-image") && i.is_image())
        .map(|i| i.href().to_string());
    match raster {
        Some(image) => book
            .guide
            .set(GuideRole::Cover, "Cover Image", Reference::file(image)),
        None => {
            book.guide.remove(GuideRole::Cover);
        }
    }
    Some(cover_path)
}

/// Drop spine entries that cannot be read as content.
fn clean_spine(book: &mut Book) -> Result<()> {
    let ids: Vec<String> = book.manifest.ids();
    for id in ids {
        let Some(item) = book.manifest.get_mut(&id) else {
            continue;
        };
        let ext = item.href().rsplit('.').next().unwrap_or("").to_ascii_lowercase();
        let font_as_text = item.media_type == "text/plain" && matches!(ext.as_str(), "otf" | "ttf");
        if font_as_text {
            item.media_type = format!("font/{ext}");
        }
        if (font_as_text || NOT_FOR_SPINE.contains(&item.media_type.as_str()))
            && book.spine_remove(&id)
        {
            log::warn!("epub: removed unsuitable item {id} from the spine");
        }
    }
    if book.spine().is_empty() {
        return Err(Error::format("EPUB", "no valid entries in the spine"));
    }
    Ok(())
}

/// Write the package document (and an NCX carrying the TOC) next to the
/// original package document.
fn write_normalized(book: &mut Book, opf_file: &Path) -> Result<PathBuf> {
    let dir = opf_file.parent().unwrap_or(Path::new(""));
    if !book.toc.is_empty() {
        let (_, ncx_path) = book.manifest.generate("ncx", "toc.ncx");
        let uid = book
            .metadata
            .unique_identifier(book.uid.as_deref())
            .map(|i| i.value.clone())
            .unwrap_or_default();
        let rendered = ncx::render(
            &book.toc,
            &NcxContext {
                uid: &uid,
                title: book.title().unwrap_or("Unknown"),
                lang: book.metadata.language(),
                ncx_path: &ncx_path,
            },
        );
        fs::write(dir.join(&ncx_path), &rendered)?;
        book.manifest
            .add("ncx", &ncx_path, NCX_MIME, rendered.into_bytes())?;
    }

    let version = match book.version.as_deref() {
        Some(v) if v.starts_with('3') => Version::Epub3,
        _ => Version::Epub2,
    };
    let target = dir.join(NORMALIZED_OPF);
    fs::write(&target, opf::write_package(book, NORMALIZED_OPF, version))?;
    Ok(target)
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use zip::ZipWriter;
    use zip::write::SimpleFileOptions;

    use super::*;
    use crate::plugin::BookSource;
    use crate::plugin::fonts::{ADOBE_ALGORITHM, IDPF_ALGORITHM, encryption_xml};

    const CONTAINER: &str = r#"<?xml version="1.0"?>
<container version="1.0" xmlns="urn:oasis:names:tc:opendocument:xmlns:container">
  <rootfiles><rootfile full-path="OEBPS/book.opf" media-type="application/oebps-package+xml"/></rootfiles>
</container>"#;

    const OPF: &str = r#"<?xml version="1.0"?>
<package xmlns="http://www.idpf.org/2007/opf" version="2.0" unique-identifier="id">
  <metadata xmlns:dc="http://purl.org/dc/elements/1.1/" xmlns:opf="http://www.idpf.org/2007/opf">
    <dc:title>T</dc:title>
    <dc:identifier id="id">urn:uuid:00112233-4455-6677-8899-aabbccddeeff</dc:identifier>
    <meta name="cover" content="img"/>
  </metadata>
  <manifest>
    <item id="cover" href="cover.xhtml" media-type="application/xhtml+xml"/>
    <item id="ch1" href="text/ch1.xhtml" media-type="application/xhtml+xml"/>
    <item id="img" href="images/c.jpg" media-type="image/jpeg"/>
    <item id="font" href="fonts/f.ttf" media-type="font/ttf"/>
    <item id="ncx" href="toc.ncx" media-type="application/x-dtbncx+xml"/>
  </manifest>
  <spine toc="ncx">
    <itemref idref="cover"/>
    <itemref idref="ch1"/>
  </spine>
  <guide>
    <reference type="cover" title="Cover" href="cover.xhtml"/>
  </guide>
</package>"#;

    const NCX: &str = r#"<?xml version="1.0"?>
<ncx xmlns="http://www.daisy.org/z3986/2005/ncx/" version="2005-1">
  <navMap>
    <navPoint id="n1"><navLabel><text>Cover</text></navLabel><content src="cover.xhtml"/></navPoint>
    <navPoint id="n2"><navLabel><text>One</text></navLabel><content src="text/ch1.xhtml"/></navPoint>
  </navMap>
</ncx>"#;

    const XHTML: &str = r#"<html xmlns="http://www.w3.org/1999/xhtml"><head><title>x</title></head><body><p>x</p></body></html>"#;

    fn font() -> Vec<u8> {
        (0..1500u32).map(|i| (i % 256) as u8).collect()
    }

    fn write_epub(path: &Path, encryption: Option<String>, font_data: &[u8]) {
        let file = fs::File::create(path).unwrap();
        let mut zip = ZipWriter::new(file);
        let mut add = |name: &str, data: &[u8]| {
            zip.start_file(name, SimpleFileOptions::default()).unwrap();
            zip.write_all(data).unwrap();
        };
        add("mimetype", b"application/epub+zip");
        add("META-INF/container.xml", CONTAINER.as_bytes());
        if let Some(enc) = &encryption {
            add("META-INF/encryption.xml", enc.as_bytes());
        }
        add("OEBPS/book.opf", OPF.as_bytes());
        add("OEBPS/toc.ncx", NCX.as_bytes());
        add("OEBPS/cover.xhtml", XHTML.as_bytes());
        add("OEBPS/text/ch1.xhtml", XHTML.as_bytes());
        add("OEBPS/images/c.jpg", &[0xFF, 0xD8, 0xFF, 0xE0]);
        add("OEBPS/fonts/f.ttf", font_data);
        zip.finish().unwrap();
    }

    fn convert(path: &Path, ctx: &mut JobContext) -> Result<(Book, InputArtifacts)> {
        let outcome = EpubInput.convert(path, &OptionSet::default(), "epub", ctx)?;
        let BookSource::Descriptor(opf) = outcome.source else {
            panic!("expected a descriptor");
        };
        let mut book = opf::read_book(&opf, None)?;
        EpubInput.postprocess_book(&mut book, &OptionSet::default(), &outcome.artifacts)?;
        Ok((book, outcome.artifacts))
    }

    #[test]
    fn test_html_cover_leaves_the_spine() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("book.epub");
        write_epub(&path, None, &font());
        let mut ctx = JobContext::new().unwrap();
        let (book, artifacts) = convert(&path, &mut ctx).unwrap();

        assert_eq!(artifacts.removed_cover.as_deref(), Some("cover.xhtml"));
        let spine: Vec<_> = book.spine_items().map(|(_, i, _)| i.href().to_string()).collect();
        assert_eq!(spine, ["text/ch1.xhtml"]);
        assert_eq!(
            book.guide.get(GuideRole::TitlePage).unwrap().reference.path,
            "cover.xhtml"
        );
        assert_eq!(
            book.guide.get(GuideRole::Cover).unwrap().reference.path,
            "images/c.jpg"
        );
        let titles: Vec<_> = book.toc.flatten().into_iter().map(|e| e.1).collect();
        assert_eq!(titles, ["Cover", "One"]);
        book.check_consistency().unwrap();
    }

    #[test]
    fn test_obfuscated_fonts_are_restored() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("book.epub");
        let mut scrambled = font();
        let key = idpf_key("urn:uuid:00112233-4455-6677-8899-aabbccddeeff");
        Obfuscation::Idpf.apply(&mut scrambled, &key);
        let enc = encryption_xml(&["OEBPS/fonts/f.ttf".to_string()])
            .replace(ADOBE_ALGORITHM, IDPF_ALGORITHM);
        write_epub(&path, Some(enc), &scrambled);

        let mut ctx = JobContext::new().unwrap();
        let (book, artifacts) = convert(&path, &mut ctx).unwrap();
        assert_eq!(artifacts.encrypted_fonts, ["fonts/f.ttf"]);
        let item = book.manifest.by_path("fonts/f.ttf").unwrap();
        assert_eq!(item.data().unwrap().as_ref(), font().as_slice());
    }

    #[test]
    fn test_unknown_encryption_is_drm() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("book.epub");
        let enc = encryption_xml(&["OEBPS/text/ch1.xhtml".to_string()])
            .replace(ADOBE_ALGORITHM, "http://www.w3.org/2001/04/xmlenc#aes128-cbc");
        write_epub(&path, Some(enc), &font());
        let mut ctx = JobContext::new().unwrap();
        let err = EpubInput
            .convert(&path, &OptionSet::default(), "epub", &mut ctx)
            .unwrap_err();
        assert!(matches!(err, Error::Drm(_)));
    }

    #[test]
    fn test_opf_found_without_container() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("a/b")).unwrap();
        fs::write(dir.path().join("a/b/x.opf"), "").unwrap();
        fs::create_dir_all(dir.path().join("__MACOSX")).unwrap();
        fs::write(dir.path().join("__MACOSX/y.opf"), "").unwrap();
        assert_eq!(find_opf(dir.path()).unwrap(), "a/b/x.opf");
    }
}
