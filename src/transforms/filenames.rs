//! Renaming package files.
//!
//! Both passes only compute a set of moves; the moves and every reference
//! to the moved files are applied by `rewrite_book_references`.

use std::collections::{HashMap, HashSet};

use super::{Transform, rewrite_book_references};
use crate::book::Book;
use crate::error::Result;
use crate::href::{basename, dirname};
use crate::options::OptionSet;
use crate::pipeline::JobContext;

/// Gives every file a basename that is unique regardless of case, for
/// readers that flatten or case-fold the package.
pub struct UniqueFilenames;

impl Transform for UniqueFilenames {
    fn name(&self) -> &'static str {
        "UniqueFilenames"
    }

    fn is_enabled(&self, options: &OptionSet) -> bool {
        !(options.flag("flatten_filenames") || options.flag("epub_flatten"))
    }

    fn apply(&self, book: &mut Book, _options: &OptionSet, _ctx: &mut JobContext) -> Result<()> {
        let mut taken: HashSet<String> = book.manifest.iter().map(|i| i.href().to_string()).collect();
        let mut names = HashSet::new();
        let mut moves = HashMap::new();
        for item in book.manifest.iter() {
            let path = item.href();
            if names.insert(basename(path).to_lowercase()) {
                continue;
            }
            let new = free_path(dirname(path), basename(path), "_u", |candidate| {
                !taken.contains(candidate) && !names.contains(&basename(candidate).to_lowercase())
            });
            names.insert(basename(&new).to_lowercase());
            taken.insert(new.clone());
            moves.insert(path.to_string(), new);
        }
        apply_moves(book, moves)
    }
}

/// Moves every file to the top level, folding its directories into the
/// name (`text/ch1.xhtml` becomes `text_ch1.xhtml`).
pub struct FlatFilenames;

impl Transform for FlatFilenames {
    fn name(&self) -> &'static str {
        "FlatFilenames"
    }

    fn gating_options(&self) -> &'static [&'static str] {
        &["flatten_filenames", "epub_flatten"]
    }

    fn apply(&self, book: &mut Book, _options: &OptionSet, _ctx: &mut JobContext) -> Result<()> {
        let mut taken: HashSet<String> = book.manifest.iter().map(|i| i.href().to_string()).collect();
        let mut moves = HashMap::new();
        for item in book.manifest.iter() {
            let path = item.href();
            if !path.contains('/') {
                continue;
            }
            let flat = path.replace('/', "_");
            let new = if taken.contains(&flat) {
                free_path("", &flat, "_", |candidate| !taken.contains(candidate))
            } else {
                flat
            };
            taken.insert(new.clone());
            moves.insert(path.to_string(), new);
        }
        apply_moves(book, moves)
    }
}

/// `dir/{stem}{sep}{n}{ext}` for the first `n` accepted by `free`.
fn free_path(dir: &str, name: &str, sep: &str, free: impl Fn(&str) -> bool) -> String {
    let (stem, ext) = match name.rfind('.') {
        Some(dot) if dot > 0 => (&name[..dot], &name[dot..]),
        _ => (name, ""),
    };
    let mut n = 1;
    loop {
        let file = format!("{stem}{sep}{n}{ext}");
        let candidate = if dir.is_empty() {
            file
        } else {
            format!("{dir}/{file}")
        };
        if free(&candidate) {
            return candidate;
        }
        n += 1;
    }
}

fn apply_moves(book: &mut Book, moves: HashMap<String, String>) -> Result<()> {
    if moves.is_empty() {
        return Ok(());
    }
    log::info!("filenames: renaming {} files", moves.len());
    rewrite_book_references(book, &HashMap::new(), &moves)
}
