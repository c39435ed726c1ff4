//! # ebconv
//!
//! The core of an ebook converter: a canonical in-memory book model, table
//! of contents reconciliation, and a pipeline that runs an input plugin,
//! a fixed sequence of transform passes and an output plugin.
//!
//! ## Quick Start
//!
//! ```no_run
//! use ebconv::{Pipeline, PluginRegistry, UserOptions};
//! use std::path::Path;
//!
//! let registry = PluginRegistry::builtin();
//! let mut options = UserOptions::default();
//! options.push_raw("epub_version=3")?;
//! Pipeline::new(&registry).run(Path::new("in.epub"), Path::new("out.epub"), &options)?;
//! # Ok::<(), ebconv::Error>(())
//! ```
//!
//! ## Working with Books
//!
//! ```
//! use ebconv::Book;
//! use ebconv::href::Reference;
//!
//! let mut book = Book::new();
//! book.metadata.set("title", "My Book");
//! let id = book
//!     .add_file("ch1", "text/ch1.xhtml", b"<html><body><h1>One</h1></body></html>".to_vec())
//!     .unwrap();
//! book.spine_append(&id, true).unwrap();
//! let root = book.toc.root();
//! book.toc.add(root, "One", &Reference::file("text/ch1.xhtml"));
//! book.check_consistency().unwrap();
//! ```

pub mod book;
pub mod dom;
pub mod error;
pub mod href;
pub mod opf;
pub mod options;
pub mod pipeline;
pub mod plugin;
pub mod toc;
pub mod transforms;
pub mod util;

pub use book::{Book, GuideRole, Item, Manifest, Metadata};
pub use error::{Error, Feedback, Result, Severity};
pub use options::{Level, OptionMerger, OptionSet, OptionSpec, OptionValue, Recommendation};
pub use pipeline::{JobContext, JobReport, Pipeline, Stage, UserOptions};
pub use plugin::{InputPlugin, OutputPlugin, PluginRegistry};
pub use toc::Toc;
