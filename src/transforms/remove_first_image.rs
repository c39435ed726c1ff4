use super::Transform;
use super::jacket::is_jacket;
use crate::book::Book;
use crate::dom;
use crate::error::Result;
use crate::href::resolve_internal;
use crate::options::OptionSet;
use crate::pipeline::JobContext;

/// Removes the first image of the book, typically a cover repeated at the
/// start of the text. A document left empty goes with it.
pub struct RemoveFirstImage;

impl Transform for RemoveFirstImage {
    fn name(&self) -> &'static str {
        "RemoveFirstImage"
    }

    fn gating_options(&self) -> &'static [&'static str] {
        &["remove_first_image"]
    }

    fn apply(&self, book: &mut Book, _options: &OptionSet, _ctx: &mut JobContext) -> Result<()> {
        for id in book.spine_documents() {
            let Some(base) = book.manifest.get(&id).map(|i| i.href().to_string()) else {
                continue;
            };
            let mut doc = book.document(&id)?;
            if is_jacket(&doc) {
                continue;
            }
            let found = doc.find_elements("img").into_iter().find_map(|img| {
                let src = doc.get_attr(img, "src")?;
                let target = resolve_internal(src, &base)?;
                let image = book.manifest.by_path(&target.path)?;
                Some((img, image.id().to_string()))
            });
            let Some((img, image_id)) = found else {
                continue;
            };

            book.remove_item(&image_id);
            doc.detach(img);
            log::info!("remove_first_image: removed {image_id} from {base}");
            if dom::is_blank(&doc) {
                log::info!("remove_first_image: {base} has no content left, removing it");
                book.remove_item(&id);
            } else {
                book.store_document(&id, &doc)?;
            }
            return Ok(());
        }
        log::warn!("remove_first_image: no image found");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::book::GuideRole;
    use crate::href::Reference;
    use crate::transforms::testing;

    #[test]
    fn test_first_image_and_emptied_document_are_removed() {
        let mut book = testing::book(&[
            ("text/cover.xhtml", "<div><img src=\"../images/c.jpg\"/></div>"),
            ("text/a.xhtml", "<p>Text <img src=\"../images/d.jpg\"/></p>"),
        ]);
        book.add_file("c", "images/c.jpg", vec![0xFF, 0xD8, 0xFF, 0xE0])
            .unwrap();
        book.add_file("d", "images/d.jpg", vec![0xFF, 0xD8, 0xFF, 0xE0])
            .unwrap();
        book.guide
            .set(GuideRole::Cover, "Cover", Reference::file("images/c.jpg"));
        let root = book.toc.root();
        book.toc.add(root, "Cover", &Reference::file("text/cover.xhtml"));
        book.toc.add(root, "A", &Reference::file("text/a.xhtml"));

        let mut ctx = JobContext::new().unwrap();
        RemoveFirstImage
            .apply(&mut book, &OptionSet::default(), &mut ctx)
            .unwrap();

        book.check_consistency().unwrap();
        assert!(book.manifest.get("c").is_none());
        assert!(book.manifest.get("d").is_some());
        assert!(book.manifest.get("cover.xhtml").is_none());
        assert!(book.guide.is_empty());
        assert_eq!(book.spine().len(), 1);
        let titles: Vec<_> = book.toc.flatten().into_iter().map(|e| e.1).collect();
        assert_eq!(titles, ["A"]);
    }

    #[test]
    fn test_jacket_images_are_skipped() {
        let mut book = testing::book(&[
            ("jacket.xhtml", "<p>About</p>"),
            ("text/a.xhtml", "<p><img src=\"../images/d.jpg\"/> text</p>"),
        ]);
        book.add_file("d", "images/d.jpg", vec![0xFF, 0xD8]).unwrap();
        let jacket = String::from(
            "<html xmlns=\"http://www.w3.org/1999/xhtml\"><head><title>t</title>\
             <meta name=\"ebconv-content\" content=\"jacket\"/></head>\
             <body><img src=\"images/d.jpg\"/></body></html>"
        );
        book.manifest
            .set_data("jacket.xhtml", jacket.into_bytes())
            .unwrap();

        let mut ctx = JobContext::new().unwrap();
        RemoveFirstImage
            .apply(&mut book, &OptionSet::default(), &mut ctx)
            .unwrap();

        assert!(book.manifest.get("d").is_none());
        assert!(book.manifest.get("jacket.xhtml").is_some());
        let doc = book.document("a.xhtml").unwrap();
        assert!(doc.find_element("img").is_none());
    }
}
