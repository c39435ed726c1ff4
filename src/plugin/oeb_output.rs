//! OEB output: the package written unzipped into a directory.

use std::fs;
use std::path::Path;

use super::epub_output::assemble;
use super::{InputArtifacts, OutputPlugin};
use crate::book::Book;
use crate::error::Result;
use crate::href::normalize;
use crate::opf::Version;
use crate::options::OptionSet;
use crate::pipeline::JobContext;

pub struct OebOutput;

impl OutputPlugin for OebOutput {
    fn name(&self) -> &'static str {
        "oeb"
    }

    fn file_type(&self) -> &'static str {
        "oeb"
    }

    fn convert(
        &self,
        book: &mut Book,
        output: &Path,
        _artifacts: &InputArtifacts,
        _options: &OptionSet,
        _ctx: &mut JobContext,
    ) -> Result<()> {
        // Fonts stay in the clear: nothing would tell a reader to undo it.
        let package = assemble(book, Version::Epub2, &[])?;
        fs::create_dir_all(output)?;
        fs::write(output.join("content.opf"), package.opf)?;
        for item in book.manifest.iter() {
            let path = output.join(normalize(item.href()));
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::write(&path, item.data()?)?;
        }
        log::info!(
            "oeb: wrote {} files to {}",
            book.manifest.len() + 1,
            output.display()
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::opf::read_book;
    use crate::transforms::testing;

    #[test]
    fn test_directory_reads_back() {
        let mut book = testing::book(&[("text/a.xhtml", "<p>A</p>"), ("text/b.xhtml", "<p>B</p>")]);
        book.metadata.set("title", "Written");
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("book");
        let mut ctx = JobContext::new().unwrap();
        OebOutput
            .convert(&mut book, &out, &InputArtifacts::default(), &OptionSet::default(), &mut ctx)
            .unwrap();

        assert!(out.join("toc.ncx").is_file());
        let read = read_book(&out.join("content.opf"), None).unwrap();
        assert_eq!(read.title(), Some("Written"));
        let spine: Vec<_> = read.spine_items().map(|(_, i, _)| i.href().to_string()).collect();
        assert_eq!(spine, ["text/a.xhtml", "text/b.xhtml"]);
        assert_eq!(read.toc.count(), 1);
        read.check_consistency().unwrap();
    }
}
