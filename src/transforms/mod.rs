//! Transform passes run over the book between input and output.
//!
//! Every pass is invoked in the fixed order of [`passes`]. A pass whose
//! gating options are all off does nothing and reports
//! [`PassOutcome::NoOp`]; a best-effort pass that fails is logged and
//! reported as a no-op too. Any other failure aborts the job.

pub mod cover;
pub mod css;
pub mod data_url;
pub mod filenames;
pub mod htmltoc;
pub mod jacket;
pub mod metadata;
pub mod remove_first_image;
pub mod split;
pub mod structure;
pub mod upshift;

pub use cover::CoverManager;
pub use data_url::DataUrl;
pub use filenames::{FlatFilenames, UniqueFilenames};
pub use htmltoc::HtmlTocAdder;
pub use jacket::Jacket;
pub use metadata::MergeMetadata;
pub use remove_first_image::RemoveFirstImage;
pub use split::Split;
pub use structure::DetectStructure;
pub use upshift::UpshiftMarkup;

use std::collections::HashMap;

use serde::Serialize;

use crate::book::Book;
use crate::dom::{Document, LINK_ATTRS};
use crate::error::{Error, Result};
use crate::href::{Reference, Resolved, relative_href, resolve};
use crate::options::{OptionSet, OptionValue};
use crate::pipeline::JobContext;

/// What running a pass amounted to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PassOutcome {
    Applied,
    NoOp,
}

/// One step of the conversion.
pub trait Transform {
    fn name(&self) -> &'static str;

    /// Options switching the pass on. A pass without gating options always
    /// runs.
    fn gating_options(&self) -> &'static [&'static str] {
        &[]
    }

    fn is_enabled(&self, options: &OptionSet) -> bool {
        let gates = self.gating_options();
        gates.is_empty() || gates.iter().any(|name| is_on(options, name))
    }

    /// Failures are logged and skipped instead of aborting the job.
    fn best_effort(&self) -> bool {
        false
    }

    fn apply(&self, book: &mut Book, options: &OptionSet, ctx: &mut JobContext) -> Result<()>;
}

/// Whether an option is set to something other than off, zero or blank.
pub fn is_on(options: &OptionSet, name: &str) -> bool {
    match options.get(name) {
        Some(OptionValue::Bool(b)) => *b,
        Some(OptionValue::Int(i)) => *i > 0,
        Some(OptionValue::Float(x)) => *x > 0.0,
        Some(OptionValue::Text(s)) => !s.trim().is_empty(),
        Some(OptionValue::None) | None => false,
    }
}

/// The passes in the order they run.
pub fn passes() -> Vec<Box<dyn Transform>> {
    vec![
        Box::new(MergeMetadata),
        Box::new(DataUrl),
        Box::new(DetectStructure),
        Box::new(RemoveFirstImage),
        Box::new(Jacket),
        Box::new(HtmlTocAdder),
        Box::new(Split),
        Box::new(CoverManager),
        Box::new(FlatFilenames),
        Box::new(UniqueFilenames),
        Box::new(UpshiftMarkup),
    ]
}

/// Run one pass, honoring its gating options and failure policy.
pub fn run(
    pass: &dyn Transform,
    book: &mut Book,
    options: &OptionSet,
    ctx: &mut JobContext,
) -> Result<PassOutcome> {
    if !pass.is_enabled(options) {
        log::debug!("pass {}: disabled", pass.name());
        return Ok(PassOutcome::NoOp);
    }
    match pass.apply(book, options, ctx) {
        Ok(()) => {
            log::info!("pass {}: applied", pass.name());
            Ok(PassOutcome::Applied)
        }
        Err(e) if pass.best_effort() => {
            log::warn!("pass {} failed, skipping: {e}", pass.name());
            Ok(PassOutcome::NoOp)
        }
        Err(e) => Err(Error::Pass {
            pass: pass.name(),
            source: Box::new(e),
        }),
    }
}

/// Rewrite the link attributes of a document read from `from` and written
/// back at `to`.
///
/// `map` receives every internal reference and returns its new target, or
/// `None` to keep it. Returns whether anything changed.
pub(crate) fn rewrite_links(
    doc: &mut Document,
    from: &str,
    to: &str,
    mut map: impl FnMut(&Reference) -> Option<Reference>,
) -> bool {
    let mut changed = false;
    let elements: Vec<_> = doc.elements().collect();
    for el in elements {
        for &attr in LINK_ATTRS {
            let Some(value) = doc.get_attr(el, attr) else {
                continue;
            };
            let Resolved::Internal(old) = resolve(value, from) else {
                continue;
            };
            let new = match map(&old) {
                Some(new) => new,
                None if from != to => old,
                None => continue,
            };
            let href = relative_href(&new, to);
            if href != value {
                doc.set_attr(el, attr, href);
                changed = true;
            }
        }
    }
    changed
}

/// Rewrite `url()` and `@import` references in every stylesheet item.
/// `moves` gives the new location of sheets that are about to move.
pub(crate) fn rewrite_stylesheets(
    book: &mut Book,
    moves: &HashMap<String, String>,
    mut map: impl FnMut(&Reference) -> Option<Reference>,
) -> Result<()> {
    let sheets: Vec<(String, String)> = book
        .manifest
        .iter()
        .filter(|i| i.media_type == crate::util::CSS_MIME)
        .map(|i| (i.id().to_string(), i.href().to_string()))
        .collect();
    for (id, from) in sheets {
        let Some(item) = book.manifest.get(&id) else {
            continue;
        };
        let to = moves.get(&from).map_or(from.as_str(), String::as_str);
        let text = crate::util::decode_text(&item.data()?, None).into_owned();
        let rewritten = css::rewrite_urls(&text, |url| {
            let old = resolve(url, &from).into_internal()?;
            let new = match map(&old) {
                Some(new) => new,
                None if from != to => old,
                None => return None,
            };
            Some(relative_href(&new, to)).filter(|href| href != url)
        });
        if rewritten != text {
            book.manifest.set_data(&id, rewritten.into_bytes())?;
        }
    }
    Ok(())
}

/// Rewrite every reference held by the book (links in spine and non-spine
/// markup, stylesheets, TOC, guide and landmarks), then move items.
///
/// `map` retargets single anchors. `moves` maps old item paths to new ones;
/// the new paths must be free. Links inside moved files are re-relativized
/// to their new location.
pub(crate) fn rewrite_book_references(
    book: &mut Book,
    map: &HashMap<Reference, Reference>,
    moves: &HashMap<String, String>,
) -> Result<()> {
    let lookup = |r: &Reference| -> Option<Reference> {
        if let Some(new) = map.get(r) {
            return Some(new.clone());
        }
        moves
            .get(&r.path)
            .map(|p| Reference::new(p.clone(), r.fragment.clone()))
    };

    let documents: Vec<(String, String)> = book
        .manifest
        .iter()
        .filter(|i| i.is_markup())
        .map(|i| (i.id().to_string(), i.href().to_string()))
        .collect();
    for (id, from) in documents {
        let to = moves.get(&from).map_or(from.as_str(), String::as_str);
        let mut doc = match book.document(&id) {
            Ok(doc) => doc,
            Err(e) => {
                log::warn!("cannot rewrite links in {from}: {e}");
                continue;
            }
        };
        if rewrite_links(&mut doc, &from, to, lookup) {
            book.store_document(&id, &doc)?;
        }
    }
    rewrite_stylesheets(book, moves, lookup)?;

    book.toc.rewrite_references(lookup);
    for (_, entry) in book.guide.iter_mut() {
        if let Some(new) = lookup(&entry.reference) {
            entry.reference = new;
        }
    }

    for (old, new) in moves {
        let Some(id) = book.manifest.by_path(old).map(|i| i.id().to_string()) else {
            continue;
        };
        book.manifest.rename(&id, new)?;
        log::debug!("renamed {old} -> {new}");
    }
    Ok(())
}

#[cfg(test)]
pub(crate) mod testing {
    use crate::book::Book;

    /// A book with one spine document per `(path, body)`.
    pub fn book(files: &[(&str, &str)]) -> Book {
        let mut book = Book::new();
        for (path, body) in files {
            let name = crate::href::basename(path);
            let id = book
                .add_file(
                    name,
                    path,
                    format!(
                        "<html xmlns=\"http://www.w3.org/1999/xhtml\"><head><title>t</title></head><body>{body}</body></html>"
                    )
                    .into_bytes(),
                )
                .unwrap();
            book.spine_append(&id, true).unwrap();
        }
        book
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{Feedback, Severity};
    use crate::options::OptionSet;

    struct Failing {
        best_effort: bool,
    }

    impl Transform for Failing {
        fn name(&self) -> &'static str {
            "Failing"
        }

        fn gating_options(&self) -> &'static [&'static str] {
            &["enabled"]
        }

        fn best_effort(&self) -> bool {
            self.best_effort
        }

        fn apply(&self, _: &mut Book, _: &OptionSet, _: &mut JobContext) -> Result<()> {
            Err(Error::Feedback(Feedback::new(Severity::Error, "boom", "")))
        }
    }

    #[test]
    fn test_gating_and_failure_policy() {
        let mut book = Book::new();
        let mut ctx = JobContext::new().unwrap();
        let off = OptionSet::default();
        let on = OptionSet::from_values([("enabled", OptionValue::Bool(true))]);

        let strict = Failing { best_effort: false };
        assert_eq!(
            run(&strict, &mut book, &off, &mut ctx).unwrap(),
            PassOutcome::NoOp
        );
        let err = run(&strict, &mut book, &on, &mut ctx).unwrap_err();
        assert!(matches!(err, Error::Pass { pass: "Failing", .. }));

        let lenient = Failing { best_effort: true };
        assert_eq!(
            run(&lenient, &mut book, &on, &mut ctx).unwrap(),
            PassOutcome::NoOp
        );
    }

    #[test]
    fn test_is_on() {
        let options = OptionSet::from_values([
            ("a", OptionValue::Int(0)),
            ("b", OptionValue::Text(" ".into())),
            ("c", OptionValue::Text("h1".into())),
            ("d", OptionValue::Int(260)),
        ]);
        assert!(!is_on(&options, "a"));
        assert!(!is_on(&options, "b"));
        assert!(is_on(&options, "c"));
        assert!(is_on(&options, "d"));
        assert!(!is_on(&options, "missing"));
    }

    #[test]
    fn test_pass_order() {
        let names: Vec<_> = passes().iter().map(|p| p.name()).collect();
        assert_eq!(
            names,
            [
                "MergeMetadata",
                "DataUrl",
                "DetectStructure",
                "RemoveFirstImage",
                "Jacket",
                "HtmlTocAdder",
                "Split",
                "CoverManager",
                "FlatFilenames",
                "UniqueFilenames",
                "UpshiftMarkup",
            ]
        );
    }

    #[test]
    fn test_rewrite_book_references_reaches_every_holder() {
        let mut book = testing::book(&[
            ("text/a.xhtml", "<p><a href=\"b.xhtml#x\">b</a></p>"),
            ("text/b.xhtml", "<p id=\"x\">x</p>"),
        ]);
        book.add_file(
            "css",
            "styles/main.css",
            b"p { background: url('../text/b.xhtml'); }".to_vec(),
        )
        .unwrap();
        let root = book.toc.root();
        book.toc.add(
            root,
            "B",
            &Reference::new("text/b.xhtml", Some("x".into())),
        );

        let mut map = HashMap::new();
        map.insert(
            Reference::new("text/b.xhtml", Some("x".into())),
            Reference::new("text/b_split_001.xhtml", Some("x".into())),
        );
        let mut paths = HashMap::new();
        paths.insert("text/b.xhtml".to_string(), "text/c.xhtml".to_string());
        rewrite_book_references(&mut book, &map, &paths).unwrap();

        let doc = book.document("a.xhtml").unwrap();
        let a = doc.find_element("a").unwrap();
        assert_eq!(doc.get_attr(a, "href"), Some("b_split_001.xhtml#x"));
        let css = book.manifest.get("css").unwrap().data().unwrap().into_owned();
        assert_eq!(
            String::from_utf8(css).unwrap(),
            "p { background: url(\"../text/c.xhtml\"); }"
        );
        assert_eq!(
            book.toc.flatten()[0].2.as_deref(),
            Some("text/b_split_001.xhtml")
        );
        assert_eq!(
            book.manifest.get("b.xhtml").unwrap().href(),
            "text/c.xhtml"
        );
    }
}
