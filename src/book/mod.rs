//! The canonical in-memory book: manifest, spine, guide, metadata and TOC.
//!
//! A `Book` is created per conversion job, mutated in place by the
//! transform passes and consumed by the output plugin.

mod guide;
mod manifest;
mod metadata;
mod spine;

pub use guide::{Guide, GuideEntry, GuideRole};
pub use manifest::{Item, Manifest, Payload, SpillConfig};
pub use metadata::{DC_TERMS, MetaItem, Metadata};
pub use spine::{Spine, SpineEntry};

use std::collections::HashSet;

use crate::dom::{self, Document};
use crate::error::{Error, Result};
use crate::href::Reference;
use crate::toc::Toc;
use crate::util::guess_media_type;

#[derive(Debug, Clone, Default)]
pub struct Book {
    pub metadata: Metadata,
    pub manifest: Manifest,
    spine: Spine,
    pub guide: Guide,
    pub toc: Toc,
    /// `id` of the identifier named by the package `unique-identifier`.
    pub uid: Option<String>,
    /// Package version as read (`2.0`, `3.0`).
    pub version: Option<String>,
}

impl Book {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn spine(&self) -> &Spine {
        &self.spine
    }

    /// Add a file, guessing its media type from the path.
    pub fn add_file(&mut self, id_hint: &str, href_hint: &str, data: Vec<u8>) -> Result<String> {
        let media_type = guess_media_type(href_hint);
        Ok(self
            .manifest
            .add(id_hint, href_hint, media_type, data)?
            .id()
            .to_string())
    }

    /// Insert a manifest item into the reading order.
    pub fn spine_insert(&mut self, id: &str, position: usize, linear: bool) -> Result<()> {
        if !self.manifest.contains_id(id) {
            return Err(Error::Invariant(format!(
                "spine entry {id:?} is not in the manifest"
            )));
        }
        if self.spine.contains(id) {
            return Err(Error::Invariant(format!("{id:?} is already in the spine")));
        }
        self.spine.insert(position, id.to_string(), linear);
        Ok(())
    }

    pub fn spine_append(&mut self, id: &str, linear: bool) -> Result<()> {
        self.spine_insert(id, usize::MAX, linear)
    }

    pub fn spine_remove(&mut self, id: &str) -> bool {
        self.spine.remove(id)
    }

    pub fn spine_set_linear(&mut self, id: &str, linear: bool) {
        self.spine.set_linear(id, linear);
    }

    pub fn spine_position(&self, id: &str) -> Option<usize> {
        self.spine.position(id)
    }

    /// `(index, item, linear)` in reading order.
    pub fn spine_items(&self) -> impl Iterator<Item = (usize, &Item, bool)> {
        self.spine
            .entries()
            .iter()
            .enumerate()
            .filter_map(|(i, e)| self.manifest.get(&e.id).map(|item| (i, item, e.linear)))
    }

    /// Ids of the markup documents in the spine, in reading order.
    pub fn spine_documents(&self) -> Vec<String> {
        self.spine_items()
            .filter(|(_, item, _)| item.is_markup())
            .map(|(_, item, _)| item.id().to_string())
            .collect()
    }

    /// Remove an item together with every spine entry, guide entry and TOC
    /// node referring to it.
    pub fn remove_item(&mut self, id: &str) -> Option<Item> {
        let path = self.manifest.get(id)?.href().to_string();
        self.spine.remove(id);
        self.guide.remove_by_reference(&path);
        self.toc.remove_references_to(&path);
        log::debug!("book: removed {id} ({path})");
        self.manifest.remove(id)
    }

    /// Move an item to a new path and retarget guide and TOC entries.
    /// Links inside documents are the caller's business.
    pub fn rename_item(&mut self, id: &str, new_path: &str) -> Result<()> {
        let old = self
            .manifest
            .get(id)
            .map(|i| i.href().to_string())
            .ok_or_else(|| Error::Invariant(format!("no manifest item with id {id:?}")))?;
        self.manifest.rename(id, new_path)?;
        let new = self.manifest.get(id).map(|i| i.href().to_string()).unwrap_or_default();

        for (_, entry) in self.guide.iter_mut() {
            if entry.reference.path == old {
                entry.reference.path = new.clone();
            }
        }
        self.toc.rewrite_references(|r| {
            (r.path == old).then(|| Reference::new(new.clone(), r.fragment.clone()))
        });
        Ok(())
    }

    /// Full scan of the cross-structure invariants.
    pub fn check_consistency(&self) -> Result<()> {
        let mut seen = HashSet::new();
        for entry in self.spine.entries() {
            if !self.manifest.contains_id(&entry.id) {
                return Err(Error::Invariant(format!(
                    "spine refers to missing item {:?}",
                    entry.id
                )));
            }
            if !seen.insert(entry.id.as_str()) {
                return Err(Error::Invariant(format!(
                    "{:?} appears twice in the spine",
                    entry.id
                )));
            }
        }
        for (role, entry) in self.guide.iter() {
            if !self.manifest.contains_path(&entry.reference.path) {
                return Err(Error::Invariant(format!(
                    "guide {role} points to missing {}",
                    entry.reference.path
                )));
            }
        }
        for (id, _) in self.toc.iter() {
            if let Some(dest) = &self.toc.node(id).dest
                && !self.manifest.contains_path(dest)
            {
                return Err(Error::Invariant(format!("TOC points to missing {dest}")));
            }
        }
        Ok(())
    }

    /// Parse a markup item.
    pub fn document(&self, id: &str) -> Result<Document> {
        let item = self
            .manifest
            .get(id)
            .ok_or_else(|| Error::Invariant(format!("no manifest item with id {id:?}")))?;
        dom::parse_document(&item.data()?, item.href())
    }

    /// Serialize a document back into its item.
    pub fn store_document(&mut self, id: &str, doc: &Document) -> Result<()> {
        self.manifest.set_data(id, dom::to_xhtml(doc).into_bytes())?;
        if let Some(item) = self.manifest.get_mut(id)
            && item.media_type != crate::util::XHTML_MIME
            && item.is_markup()
        {
            item.media_type = crate::util::XHTML_MIME.to_string();
        }
        Ok(())
    }

    pub fn title(&self) -> Option<&str> {
        self.metadata.title()
    }
}
