//! EPUB output.
//!
//! Everything the package needs besides the content (identifier, NCX,
//! navigation document, package document) is assembled by [`assemble`],
//! which the OEB output shares.

use std::fs::File;
use std::io::Write;
use std::path::Path;

use zip::CompressionMethod;
use zip::ZipWriter;
use zip::write::SimpleFileOptions;

use super::fonts::{Obfuscation, adobe_key, encryption_xml};
use super::{InputArtifacts, OutputPlugin};
use crate::book::{Book, MetaItem};
use crate::error::Result;
use crate::href::Reference;
use crate::opf::{self, Version};
use crate::options::{Level, OptionSet, OptionSpec, Recommendation};
use crate::pipeline::JobContext;
use crate::toc::nav::{self, NavContext};
use crate::toc::ncx::{self, NcxContext};
use crate::util::{NCX_MIME, XHTML_MIME, uuid_v4};

/// Directory holding the package inside the archive.
const CONTENT_DIR: &str = "OEBPS";
const OPF_NAME: &str = "content.opf";

/// Configuration for EPUB output.
#[derive(Debug, Clone, Default)]
pub struct EpubConfig {
    /// Compression level for deflate (0-9, default 6).
    pub compression_level: Option<u32>,
}

/// Writes `.epub` archives.
pub struct EpubOutput {
    config: EpubConfig,
}

impl EpubOutput {
    pub fn new() -> Self {
        Self {
            config: EpubConfig::default(),
        }
    }

    pub fn with_config(mut self, config: EpubConfig) -> Self {
        self.config = config;
        self
    }
}

impl Default for EpubOutput {
    fn default() -> Self {
        Self::new()
    }
}

impl OutputPlugin for EpubOutput {
    fn name(&self) -> &'static str {
        "epub"
    }

    fn file_type(&self) -> &'static str {
        "epub"
    }

    fn options(&self) -> Vec<OptionSpec> {
        vec![
            OptionSpec::choice(
                "epub_version",
                &["2", "3"],
                "2",
                "Version of the generated package.",
            ),
            OptionSpec::flag(
                "epub_flatten",
                false,
                "Put every file at the top level of the package.",
            ),
        ]
    }

    fn recommendations(&self) -> Vec<Recommendation> {
        vec![
            Recommendation::new("insert_cover", true, Level::Medium),
            Recommendation::new("flow_size", 260i64, Level::Medium),
        ]
    }

    fn convert(
        &self,
        book: &mut Book,
        output: &Path,
        artifacts: &InputArtifacts,
        options: &OptionSet,
        _ctx: &mut JobContext,
    ) -> Result<()> {
        let package = assemble(book, version(options), &artifacts.encrypted_fonts)?;

        let file = File::create(output)?;
        let mut zip = ZipWriter::new(file);
        let compression_level = self.config.compression_level.unwrap_or(6);
        let stored = SimpleFileOptions::default().compression_method(CompressionMethod::Stored);
        let deflated = SimpleFileOptions::default()
            .compression_method(CompressionMethod::Deflated)
            .compression_level(Some(compression_level as i64));

        // mimetype first and uncompressed
        zip.start_file("mimetype", stored)?;
        zip.write_all(b"application/epub+zip")?;

        zip.start_file("META-INF/container.xml", deflated)?;
        zip.write_all(opf::container_xml(&format!("{CONTENT_DIR}/{OPF_NAME}")).as_bytes())?;

        let key = package.font_key;
        let mut obfuscated = Vec::new();
        zip.start_file(format!("{CONTENT_DIR}/{OPF_NAME}"), deflated)?;
        zip.write_all(package.opf.as_bytes())?;
        for item in book.manifest.iter() {
            let name = format!("{CONTENT_DIR}/{}", item.href());
            let mut data = item.data()?.into_owned();
            if let Some(key) = &key
                && package.fonts.iter().any(|f| f == item.href())
            {
                Obfuscation::Adobe.apply(&mut data, key);
                obfuscated.push(name.clone());
            }
            let options = if item.is_image() { stored } else { deflated };
            zip.start_file(name, options)?;
            zip.write_all(&data)?;
        }

        if !obfuscated.is_empty() {
            zip.start_file("META-INF/encryption.xml", deflated)?;
            zip.write_all(encryption_xml(&obfuscated).as_bytes())?;
        }
        zip.finish()?;
        log::info!(
            "epub: wrote {} ({} items, {} obfuscated fonts)",
            output.display(),
            book.manifest.len(),
            obfuscated.len()
        );
        Ok(())
    }
}

fn version(options: &OptionSet) -> Version {
    match options.text("epub_version") {
        Some("3") => Version::Epub3,
        _ => Version::Epub2,
    }
}

/// The parts of a package not held in the manifest.
pub(super) struct Package {
    /// Rendered package document.
    pub opf: String,
    /// Paths of fonts to obfuscate, all present in the manifest.
    pub fonts: Vec<String>,
    /// Key derived from the book's UUID identifier.
    pub font_key: Option<[u8; 16]>,
}

/// Complete `book` for writing: a UUID identifier as unique identifier, a
/// non-empty TOC, a fresh NCX and (for EPUB 3) navigation document in the
/// manifest, and the package document rendered for `content.opf`.
pub(super) fn assemble(book: &mut Book, version: Version, fonts: &[String]) -> Result<Package> {
    let uid = ensure_uuid(book);
    ensure_toc(book);

    let title = book.title().unwrap_or("Unknown").to_string();
    let lang = book.metadata.language().map(str::to_string);

    let (_, ncx_path) = book.manifest.generate("ncx", "toc.ncx");
    let rendered = ncx::render(
        &book.toc,
        &NcxContext {
            uid: &uid,
            title: &title,
            lang: lang.as_deref(),
            ncx_path: &ncx_path,
        },
    );
    book.manifest
        .add("ncx", &ncx_path, NCX_MIME, rendered.into_bytes())?;

    if version == Version::Epub3 {
        for id in book.manifest.ids() {
            if let Some(item) = book.manifest.get_mut(&id) {
                item.properties.retain(|p| p != "nav");
            }
        }
        let (_, nav_path) = book.manifest.generate("nav", "nav.xhtml");
        let rendered = nav::render(
            &book.toc,
            &NavContext {
                title: &title,
                lang: lang.as_deref(),
                nav_path: &nav_path,
                toc_title: None,
            },
        );
        let id = book
            .manifest
            .add("nav", &nav_path, XHTML_MIME, rendered.into_bytes())?
            .id()
            .to_string();
        if let Some(item) = book.manifest.get_mut(&id) {
            item.properties.push("nav".into());
        }
    }

    let fonts: Vec<String> = fonts
        .iter()
        .filter(|f| book.manifest.contains_path(f))
        .cloned()
        .collect();
    Ok(Package {
        opf: opf::write_package(book, OPF_NAME, version),
        fonts,
        font_key: adobe_key(&uid),
    })
}

/// Make a `urn:uuid:` identifier the unique identifier, adding one when
/// the book has none. Returns its value.
fn ensure_uuid(book: &mut Book) -> String {
    let identifiers = book.metadata.get("identifier");
    let index = identifiers.iter().position(|i| {
        i.attr("opf:scheme").is_some_and(|s| s.eq_ignore_ascii_case("uuid"))
            || i.value.starts_with("urn:uuid:")
    });
    let index = match index {
        Some(index) => index,
        None => {
            let value = format!("urn:uuid:{}", uuid_v4());
            log::debug!("epub: adding identifier {value}");
            book.metadata.add_item(
                "identifier",
                MetaItem::new(value).with_attr("opf:scheme", "uuid"),
            );
            book.metadata.get("identifier").len() - 1
        }
    };

    let Some(item) = book
        .metadata
        .get_mut("identifier")
        .and_then(|ids| ids.get_mut(index))
    else {
        return String::new();
    };
    let id = item
        .attr("id")
        .map(str::to_string)
        .unwrap_or_else(|| "uuid_id".to_string());
    item.attrs.insert("id".into(), id.clone());
    let value = item.value.clone();
    book.uid = Some(id);
    value
}

/// Readers reject packages without a navigation entry.
fn ensure_toc(book: &mut Book) {
    if !book.toc.is_empty() {
        return;
    }
    let Some(first) = book
        .spine_items()
        .next()
        .map(|(_, item, _)| item.href().to_string())
    else {
        return;
    };
    log::debug!("epub: empty TOC, pointing \"Start\" at {first}");
    let root = book.toc.root();
    book.toc.add(root, "Start", &Reference::file(first));
}
