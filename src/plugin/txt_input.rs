//! Plain text input. Blank lines separate paragraphs.

use std::fs;
use std::path::Path;

use super::{InputOutcome, InputPlugin};
use crate::book::Book;
use crate::dom::{self, Document};
use crate::error::Result;
use crate::options::{OptionSet, OptionSpec};
use crate::pipeline::JobContext;
use crate::util::{collapse_whitespace, decode_text};

pub struct TxtInput;

impl InputPlugin for TxtInput {
    fn name(&self) -> &'static str {
        "txt"
    }

    fn file_types(&self) -> &'static [&'static str] {
        &["txt"]
    }

    fn options(&self) -> Vec<OptionSpec> {
        vec![OptionSpec::text(
            "input_encoding",
            None,
            "Encoding of the text when it is not UTF-8.",
        )]
    }

    fn convert(
        &self,
        source: &Path,
        options: &OptionSet,
        _detected_ext: &str,
        _ctx: &mut JobContext,
    ) -> Result<InputOutcome> {
        let bytes = fs::read(source)?;
        let text = decode_text(&bytes, options.text("input_encoding"));
        let title = source
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "Unknown".to_string());

        let doc = text_document(&title, &text);
        let mut book = Book::new();
        book.metadata.set("title", title.as_str());
        let id = book.add_file("index", "index.xhtml", dom::to_xhtml(&doc).into_bytes())?;
        book.spine_append(&id, true)?;
        log::info!("txt: {} paragraphs from {}", doc.find_elements("p").len(), source.display());
        Ok(InputOutcome::book(book))
    }
}

fn text_document(title: &str, text: &str) -> Document {
    let mut doc = dom::skeleton(title, None);
    let Some(body) = doc.body() else {
        return doc;
    };
    let normalized = text.trim_start_matches('\u{feff}').replace("\r\n", "\n");
    for block in normalized.split("\n\n") {
        let para = collapse_whitespace(block);
        if para.is_empty() {
            continue;
        }
        let p = doc.create_html_element("p", &[]);
        doc.append(body, p);
        doc.append_text(p, &para);
    }
    doc
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plugin::BookSource;

    #[test]
    fn test_paragraphs_from_blank_lines() {
        let doc = text_document("T", "One\nline\r\n\r\nTwo & more\n\n\n\n");
        let ps = doc.find_elements("p");
        assert_eq!(ps.len(), 2);
        assert_eq!(doc.text_content(ps[0]), "One line");
        assert_eq!(doc.text_content(ps[1]), "Two & more");
    }

    #[test]
    fn test_book_from_legacy_encoding() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("notes.txt");
        fs::write(&path, b"caf\xe9\n\nfin").unwrap();
        let mut ctx = JobContext::new().unwrap();
        let outcome = TxtInput
            .convert(&path, &OptionSet::default(), "txt", &mut ctx)
            .unwrap();
        let BookSource::Book(book) = outcome.source else {
            panic!("expected a book");
        };
        assert_eq!(book.title(), Some("notes"));
        assert_eq!(book.spine().len(), 1);
        let doc = book.document("index").unwrap();
        assert!(doc.text_content(doc.body().unwrap()).contains("café"));
        book.check_consistency().unwrap();
    }
}
