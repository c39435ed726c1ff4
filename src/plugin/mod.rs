//! Input and output plugins.
//!
//! An input plugin turns a source file into either a package descriptor on
//! disk or a ready [`Book`]; an output plugin writes a book in its format.
//! Both declare the options they understand and recommend values for
//! others; the pipeline merges those with the user's choices.
//!
//! Plugins are selected by file extension through a [`PluginRegistry`].

mod epub_input;
mod epub_output;
mod fonts;
mod oeb_output;
mod opf_input;
mod registry;
mod txt_input;

pub use epub_input::EpubInput;
pub use epub_output::{EpubConfig, EpubOutput};
pub use oeb_output::OebOutput;
pub use opf_input::OpfInput;
pub use registry::PluginRegistry;
pub use txt_input::TxtInput;

use std::path::{Path, PathBuf};

use crate::book::Book;
use crate::error::Result;
use crate::options::{OptionSet, OptionSpec, Recommendation};
use crate::pipeline::JobContext;

/// Facts an input plugin hands to the rest of the job.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InputArtifacts {
    /// Path of an HTML cover page taken out of the spine.
    pub removed_cover: Option<String>,
    /// Paths of fonts that were de-obfuscated and must be obfuscated again
    /// on output.
    pub encrypted_fonts: Vec<String>,
}

/// What an input plugin produced.
#[derive(Debug)]
pub enum BookSource {
    /// A package document on disk, to be read with [`crate::opf::read_book`].
    Descriptor(PathBuf),
    Book(Book),
}

#[derive(Debug)]
pub struct InputOutcome {
    pub source: BookSource,
    pub artifacts: InputArtifacts,
}

impl InputOutcome {
    pub fn descriptor(path: impl Into<PathBuf>) -> Self {
        Self {
            source: BookSource::Descriptor(path.into()),
            artifacts: InputArtifacts::default(),
        }
    }

    pub fn book(book: Book) -> Self {
        Self {
            source: BookSource::Book(book),
            artifacts: InputArtifacts::default(),
        }
    }
}

/// Reads one family of source formats.
pub trait InputPlugin {
    fn name(&self) -> &'static str;

    /// Lower-case extensions handled, without the dot.
    fn file_types(&self) -> &'static [&'static str];

    fn options(&self) -> Vec<OptionSpec> {
        Vec::new()
    }

    fn recommendations(&self) -> Vec<Recommendation> {
        Vec::new()
    }

    fn convert(
        &self,
        source: &Path,
        options: &OptionSet,
        detected_ext: &str,
        ctx: &mut JobContext,
    ) -> Result<InputOutcome>;

    /// Called once the book has been built, before the transform passes.
    fn postprocess_book(
        &self,
        _book: &mut Book,
        _options: &OptionSet,
        _artifacts: &InputArtifacts,
    ) -> Result<()> {
        Ok(())
    }
}

/// Writes books in one format.
pub trait OutputPlugin {
    fn name(&self) -> &'static str;

    /// Lower-case extension produced, without the dot.
    fn file_type(&self) -> &'static str;

    fn options(&self) -> Vec<OptionSpec> {
        Vec::new()
    }

    fn recommendations(&self) -> Vec<Recommendation> {
        Vec::new()
    }

    fn convert(
        &self,
        book: &mut Book,
        output: &Path,
        artifacts: &InputArtifacts,
        options: &OptionSet,
        ctx: &mut JobContext,
    ) -> Result<()>;
}

/// Lower-case extension of `path`, without the dot.
pub fn extension_of(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
}
