//! Images embedded as `data:` URLs become manifest items.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use percent_encoding::percent_decode_str;

use super::Transform;
use crate::book::Book;
use crate::error::Result;
use crate::href::{Reference, relative_href};
use crate::options::OptionSet;
use crate::pipeline::JobContext;
use crate::util::ImageFormat;

pub struct DataUrl;

impl Transform for DataUrl {
    fn name(&self) -> &'static str {
        "DataUrl"
    }

    fn gating_options(&self) -> &'static [&'static str] {
        &["unpack_data_urls"]
    }

    fn best_effort(&self) -> bool {
        true
    }

    fn apply(&self, book: &mut Book, _options: &OptionSet, _ctx: &mut JobContext) -> Result<()> {
        for id in book.spine_documents() {
            let Some(base) = book.manifest.get(&id).map(|i| i.href().to_string()) else {
                continue;
            };
            let mut doc = book.document(&id)?;
            let mut changed = false;
            for img in doc.find_elements("img") {
                let Some(src) = doc.get_attr(img, "src") else {
                    continue;
                };
                let Some((data, format)) = decode(src) else {
                    continue;
                };
                let path = book
                    .manifest
                    .add(
                        "data-url-image",
                        &format!("data-url-image.{}", format.extension()),
                        format.mime_type(),
                        data,
                    )?
                    .href()
                    .to_string();
                log::debug!("data_url: image in {base} stored as {path}");
                doc.set_attr(img, "src", relative_href(&Reference::file(path), &base));
                changed = true;
            }
            if changed {
                book.store_document(&id, &doc)?;
            }
        }
        Ok(())
    }
}

/// Payload of a `data:image/...` URL with a recognizable image format.
fn decode(src: &str) -> Option<(Vec<u8>, ImageFormat)> {
    let rest = src.trim().strip_prefix("data:")?;
    let (header, payload) = rest.split_once(',')?;
    if !header.starts_with("image/") || payload.is_empty() {
        return None;
    }
    let data = if header.contains(";base64") {
        let compact: String = payload.chars().filter(|c| !c.is_whitespace()).collect();
        match STANDARD.decode(compact) {
            Ok(data) => data,
            Err(e) => {
                log::warn!("data_url: invalid base64 payload ignored: {e}");
                return None;
            }
        }
    } else {
        percent_decode_str(payload).collect()
    };
    match ImageFormat::sniff(&data) {
        Some(format) => Some((data, format)),
        None => {
            log::warn!("data_url: embedded image of unknown format ignored");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transforms::testing;

    const GIF: &[u8] = b"GIF89a\x01\x00\x01\x00\x00\x00\x00";

    #[test]
    fn test_embedded_images_become_items() {
        let src = format!("data:image/gif;base64,{}", STANDARD.encode(GIF));
        let body = format!("<p><img src=\"{src}\" alt=\"\"/><img src=\"data:text/plain,x\"/></p>");
        let mut book = testing::book(&[("text/a.xhtml", body.as_str())]);
        let mut ctx = JobContext::new().unwrap();
        DataUrl
            .apply(&mut book, &OptionSet::default(), &mut ctx)
            .unwrap();

        let item = book.manifest.by_path("data-url-image.gif").unwrap();
        assert_eq!(item.media_type, "image/gif");
        assert_eq!(item.data().unwrap().as_ref(), GIF);

        let doc = book.document("a.xhtml").unwrap();
        let imgs = doc.find_elements("img");
        assert_eq!(doc.get_attr(imgs[0], "src"), Some("../data-url-image.gif"));
        assert_eq!(doc.get_attr(imgs[1], "src"), Some("data:text/plain,x"));
    }

    #[test]
    fn test_decode_rejects_unknown_payloads() {
        assert!(decode("data:image/png;base64,!!!").is_none());
        assert!(decode("data:image/png,hello").is_none());
        assert!(decode("images/a.png").is_none());
    }
}
