//! Choosing the book's table of contents.

use super::Transform;
use crate::book::Book;
use crate::dom::Query;
use crate::error::{Error, Feedback, Result, Severity};
use crate::options::OptionSet;
use crate::pipeline::JobContext;
use crate::toc::{self, Heuristics, Toc, TocSource};

/// Heading queries used when no `levelN_toc` option is given.
const DEFAULT_LEVELS: [&str; 3] = ["h1", "h2", "h3"];

/// Keeps the TOC read from the input when it is good enough, otherwise
/// builds one from headings, links or files. The result is filtered,
/// verified and stripped of unresolvable entries.
pub struct DetectStructure;

impl Transform for DetectStructure {
    fn name(&self) -> &'static str {
        "DetectStructure"
    }

    fn apply(&self, book: &mut Book, options: &OptionSet, ctx: &mut JobContext) -> Result<()> {
        let threshold = usize::try_from(options.int("toc_threshold").unwrap_or(6)).unwrap_or(0);
        let use_auto_toc = options.flag("use_auto_toc");
        let existing = book.toc.count();

        if use_auto_toc || existing < threshold {
            let heuristics = Heuristics {
                queries: level_queries(options)?,
                max_links: usize::try_from(options.int("max_toc_links").unwrap_or(50))
                    .unwrap_or(0),
                keep_duplicate_titles: options.flag("duplicate_links_in_toc"),
            };
            let (generated, source) = toc::generate(book, &heuristics)?;
            if use_auto_toc || generated.count() > existing {
                log::info!(
                    "structure: using a TOC of {} entries built from {source:?} (input had {existing})",
                    generated.count()
                );
                if source == TocSource::Files {
                    ctx.report(Feedback::new(
                        Severity::Warning,
                        "No usable table of contents",
                        "Neither headings nor links describe the book; the table of contents lists its files instead.",
                    ));
                }
                replace_entries(&mut book.toc, generated);
            }
        }

        if let Some(filter) = options.text("toc_filter") {
            let removed = book.toc.remove_matching_titles(filter);
            log::debug!("structure: toc_filter removed {removed} entries");
        }

        let mut toc = std::mem::take(&mut book.toc);
        toc::verify(book, &mut toc);
        let dropped = toc.retain_resolved();
        if dropped > 0 {
            log::warn!("structure: dropped {dropped} TOC entries with missing destinations");
        }
        if toc.title.is_none() {
            toc.title = book.title().map(str::to_string);
        }
        book.toc = toc;
        Ok(())
    }
}

/// Take the entries of `generated`, keeping the title, page list and
/// landmarks of `current`.
fn replace_entries(current: &mut Toc, mut generated: Toc) {
    generated.title = current.title.take().or(generated.title);
    generated.uid = current.uid.take().or(generated.uid);
    generated.lang = current.lang.take().or(generated.lang);
    generated.page_list = std::mem::take(&mut current.page_list);
    generated.landmarks = std::mem::take(&mut current.landmarks);
    *current = generated;
}

fn level_queries(options: &OptionSet) -> Result<Vec<Query>> {
    let given: Vec<(&str, &str)> = ["level1_toc", "level2_toc", "level3_toc"]
        .into_iter()
        .filter_map(|name| options.text(name).map(|q| (name, q)))
        .collect();
    if given.is_empty() {
        return DEFAULT_LEVELS.iter().map(|q| Query::parse(q)).collect();
    }
    given
        .into_iter()
        .map(|(name, q)| Query::parse(q).map_err(|e| Error::invalid_option(name, e.to_string())))
        .collect()
}
