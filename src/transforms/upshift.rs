//! Markup cleanups that make content documents valid XHTML.

use std::collections::HashSet;

use super::Transform;
use crate::book::Book;
use crate::dom::{Document, NodeId};
use crate::error::Result;
use crate::options::OptionSet;
use crate::pipeline::JobContext;

pub struct UpshiftMarkup;

impl Transform for UpshiftMarkup {
    fn name(&self) -> &'static str {
        "UpshiftMarkup"
    }

    fn gating_options(&self) -> &'static [&'static str] {
        &["upshift_markup"]
    }

    fn best_effort(&self) -> bool {
        true
    }

    fn apply(&self, book: &mut Book, _options: &OptionSet, _ctx: &mut JobContext) -> Result<()> {
        let documents: Vec<String> = book
            .manifest
            .iter()
            .filter(|i| i.is_markup())
            .map(|i| i.id().to_string())
            .collect();
        for id in documents {
            let mut doc = book.document(&id)?;
            if upshift(&mut doc) {
                log::debug!("upshift: rewrote {id}");
                book.store_document(&id, &doc)?;
            }
        }
        Ok(())
    }
}

/// Returns whether the document changed.
fn upshift(doc: &mut Document) -> bool {
    let mut changed = false;
    let mut anchors = HashSet::new();
    let elements: Vec<NodeId> = doc.elements().collect();
    for el in elements {
        changed |= drop_duplicate_anchor(doc, el, "id", &mut anchors);
        if doc.is_named(el, "a") {
            changed |= drop_duplicate_anchor(doc, el, "name", &mut anchors);
        }

        if doc.is_named(el, "u") {
            doc.rename_element(el, "span");
            let style = match doc.get_attr(el, "style").map(str::trim) {
                Some(s) if !s.is_empty() => format!("{}; text-decoration: underline", s.trim_end_matches(';')),
                _ => "text-decoration: underline".to_string(),
            };
            doc.set_attr(el, "style", style);
            changed = true;
        }

        if !doc.has_attr(el, "xml:lang")
            && let Some(lang) = doc.get_attr(el, "lang").map(str::to_string)
        {
            doc.set_attr(el, "xml:lang", lang);
            changed = true;
        }
    }
    changed
}

fn drop_duplicate_anchor(
    doc: &mut Document,
    el: NodeId,
    attr: &str,
    seen: &mut HashSet<String>,
) -> bool {
    let Some(value) = doc.get_attr(el, attr).map(str::to_string) else {
        return false;
    };
    if seen.insert(value) {
        return false;
    }
    doc.remove_attr(el, attr);
    true
}
