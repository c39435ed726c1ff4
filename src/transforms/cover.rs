//! Title page generation for books that only have a cover image.

use super::Transform;
use crate::book::{Book, GuideRole};
use crate::error::Result;
use crate::href::{Reference, relative_href};
use crate::options::OptionSet;
use crate::pipeline::JobContext;
use crate::util::{XHTML_MIME, escape_xml, image_dimensions};

/// Used when the image header cannot be read.
const FALLBACK_SIZE: (u32, u32) = (600, 800);

/// Generates a title page showing the raster cover named by the guide and
/// puts it first in the reading order.
pub struct CoverManager;

impl Transform for CoverManager {
    fn name(&self) -> &'static str {
        "CoverManager"
    }

    fn gating_options(&self) -> &'static [&'static str] {
        &["insert_cover"]
    }

    fn apply(&self, book: &mut Book, options: &OptionSet, _ctx: &mut JobContext) -> Result<()> {
        if let Some(entry) = book.guide.get(GuideRole::TitlePage) {
            let existing = book
                .manifest
                .by_path(&entry.reference.path)
                .filter(|i| i.is_markup())
                .map(|i| i.id().to_string());
            if let Some(id) = existing
                && !book.spine().contains(&id)
            {
                book.spine_insert(&id, 0, true)?;
                log::debug!("cover: moved existing title page {id} into the spine");
            }
            return Ok(());
        }

        let Some((image_id, image_path)) = raster_cover(book) else {
            log::debug!("cover: no raster cover image");
            return Ok(());
        };
        let (width, height) = match book.manifest.get(&image_id).map(|i| i.data()) {
            Some(Ok(data)) => image_dimensions(&data).unwrap_or_else(|| {
                log::warn!("cover: cannot read the size of {image_path}, assuming 600x800");
                FALLBACK_SIZE
            }),
            _ => FALLBACK_SIZE,
        };

        let (_, path) = book.manifest.generate("titlepage", "titlepage.xhtml");
        let src = relative_href(&Reference::file(image_path.as_str()), &path);
        let title = book.title().unwrap_or("Cover").to_string();
        let page = if options.flag("no_svg_cover") {
            img_page(&title, &src)
        } else {
            svg_page(
                &title,
                &src,
                width,
                height,
                options.flag("preserve_cover_aspect_ratio"),
            )
        };
        let id = book
            .manifest
            .add("titlepage", &path, XHTML_MIME, page.into_bytes())?
            .id()
            .to_string();
        book.spine_insert(&id, 0, true)?;

        if let Some(item) = book.manifest.get_mut(&image_id)
            && !item.has_property("cover-image")
        {
            item.properties.push("cover-image".into());
        }
        book.guide
            .set(GuideRole::Cover, "Cover", Reference::file(path.as_str()));
        book.guide
            .set(GuideRole::TitlePage, "Title page", Reference::file(path.as_str()));
        book.toc.rewrite_references(|r| {
            (r.path == image_path).then(|| Reference::file(path.as_str()))
        });
        log::info!("cover: generated title page {id} for {image_path} ({width}x{height})");
        Ok(())
    }
}

/// `(id, path)` of the guide cover when it is a raster image.
fn raster_cover(book: &Book) -> Option<(String, String)> {
    let entry = book.guide.get(GuideRole::Cover)?;
    let item = book.manifest.by_path(&entry.reference.path)?;
    (item.is_image() && item.media_type != "image/svg+xml")
        .then(|| (item.id().to_string(), item.href().to_string()))
}

fn svg_page(title: &str, src: &str, width: u32, height: u32, keep_aspect: bool) -> String {
    let aspect = if keep_aspect { "xMidYMid meet" } else { "none" };
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<html xmlns="http://www.w3.org/1999/xhtml">
<head>
<title>{title}</title>
<style type="text/css">
@page {{ padding: 0; margin: 0; }}
body {{ padding: 0; margin: 0; text-align: center; }}
</style>
</head>
<body>
<div>
<svg xmlns="http://www.w3.org/2000/svg" xmlns:xlink="http://www.w3.org/1999/xlink" version="1.1" width="100%" height="100%" viewBox="0 0 {width} {height}" preserveAspectRatio="{aspect}">
<image width="{width}" height="{height}" xlink:href="{src}"/>
</svg>
</div>
</body>
</html>
"#,
        title = escape_xml(title),
        src = escape_xml(src),
    )
}

fn img_page(title: &str, src: &str) -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<html xmlns="http://www.w3.org/1999/xhtml">
<head>
<title>{title}</title>
<style type="text/css">
@page {{ padding: 0; margin: 0; }}
body {{ padding: 0; margin: 0; text-align: center; }}
img {{ max-width: 100%; max-height: 100%; }}
</style>
</head>
<body>
<div><img src="{src}" alt="{title}"/></div>
</body>
</html>
"#,
        title = escape_xml(title),
        src = escape_xml(src),
    )
}
