//! User metadata overrides.

use super::Transform;
use crate::book::{Book, GuideRole, MetaItem};
use crate::error::{Feedback, Result, Severity};
use crate::href::Reference;
use crate::options::OptionSet;
use crate::pipeline::JobContext;
use crate::util::ImageFormat;

/// Applies `title`, `authors`, `language` and `publisher`, and installs the
/// image named by `cover` as the book's cover.
pub struct MergeMetadata;

impl Transform for MergeMetadata {
    fn name(&self) -> &'static str {
        "MergeMetadata"
    }

    fn gating_options(&self) -> &'static [&'static str] {
        &["title", "authors", "language", "publisher", "cover"]
    }

    fn apply(&self, book: &mut Book, options: &OptionSet, ctx: &mut JobContext) -> Result<()> {
        if let Some(title) = options.text("title") {
            book.metadata.set("title", title.trim());
        }
        if let Some(authors) = options.text("authors") {
            set_authors(book, authors);
        }
        if let Some(language) = options.text("language") {
            book.metadata.set("language", language.trim());
        }
        if let Some(publisher) = options.text("publisher") {
            book.metadata.set("publisher", publisher.trim());
        }
        if let Some(cover) = options.text("cover") {
            set_cover(book, cover, ctx)?;
        }
        Ok(())
    }
}

/// Replace the authors, keeping creators with another role (editors,
/// illustrators, ...).
fn set_authors(book: &mut Book, authors: &str) {
    let mut creators: Vec<MetaItem> = book
        .metadata
        .remove("creator")
        .into_iter()
        .filter(|c| c.attr("opf:role").is_some_and(|r| r != "aut"))
        .collect();
    let authors: Vec<MetaItem> = authors
        .split('&')
        .map(str::trim)
        .filter(|a| !a.is_empty())
        .map(|a| MetaItem::new(a).with_attr("opf:role", "aut"))
        .collect();
    creators.splice(0..0, authors);
    for creator in creators {
        book.metadata.add_item("creator", creator);
    }
}

fn set_cover(book: &mut Book, file: &str, ctx: &mut JobContext) -> Result<()> {
    let data = match std::fs::read(file) {
        Ok(data) => data,
        Err(e) => {
            ctx.report(Feedback::new(
                Severity::Warning,
                "Cover not used",
                format!("Could not read the cover image {file}: {e}"),
            ));
            return Ok(());
        }
    };
    let Some(format) = ImageFormat::sniff(&data) else {
        ctx.report(Feedback::new(
            Severity::Warning,
            "Cover not used",
            format!("{file} is not a JPEG, PNG, GIF or WebP image"),
        ));
        return Ok(());
    };

    let ids: Vec<String> = book.manifest.ids();
    for id in ids {
        if let Some(item) = book.manifest.get_mut(&id) {
            item.properties.retain(|p| p != "cover-image");
        }
    }

    let id = book
        .manifest
        .add("cover", &format!("cover.{}", format.extension()), format.mime_type(), data)?
        .id()
        .to_string();
    let Some(item) = book.manifest.get_mut(&id) else {
        return Ok(());
    };
    item.properties.push("cover-image".into());
    let path = item.href().to_string();
    book.guide.set(GuideRole::Cover, "Cover", Reference::file(path));
    log::debug!("metadata: cover image {file} stored as {id}");
    Ok(())
}
