//! The set of files making up a book.

use std::borrow::Cow;
use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;

use crate::error::{Error, Result};
use crate::href::{basename, dirname, normalize};

/// Where an item's bytes live.
#[derive(Debug, Clone)]
pub enum Payload {
    Memory(Vec<u8>),
    /// Written to the job scratch directory once it outgrew the spill threshold.
    Spilled(PathBuf),
}

/// One file of the book.
#[derive(Debug, Clone)]
pub struct Item {
    id: String,
    href: String,
    pub media_type: String,
    /// EPUB 3 manifest properties (`nav`, `cover-image`, `svg`, ...).
    pub properties: Vec<String>,
    payload: Payload,
}

impl Item {
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Canonical root-relative path.
    pub fn href(&self) -> &str {
        &self.href
    }

    pub fn payload(&self) -> &Payload {
        &self.payload
    }

    /// The item's bytes, read back from scratch storage if spilled.
    pub fn data(&self) -> Result<Cow<'_, [u8]>> {
        match &self.payload {
            Payload::Memory(data) => Ok(Cow::Borrowed(data)),
            Payload::Spilled(path) => Ok(Cow::Owned(fs::read(path)?)),
        }
    }

    pub fn is_markup(&self) -> bool {
        crate::util::is_markup_type(&self.media_type)
    }

    pub fn is_image(&self) -> bool {
        self.media_type.starts_with("image/")
    }

    pub fn has_property(&self, property: &str) -> bool {
        self.properties.iter().any(|p| p == property)
    }
}

/// Spill configuration: items larger than `threshold` bytes go to `dir`.
#[derive(Debug, Clone)]
pub struct SpillConfig {
    pub dir: PathBuf,
    pub threshold: usize,
}

/// Bidirectional id/path index over the book's items.
#[derive(Debug, Clone, Default)]
pub struct Manifest {
    items: HashMap<String, Item>,
    by_path: HashMap<String, String>,
    order: Vec<String>,
    spill: Option<SpillConfig>,
    spilled: usize,
}

impl Manifest {
    pub fn new() -> Self {
        Self::default()
    }

    /// Spill payloads above `config.threshold` bytes into `config.dir`.
    pub fn set_spill(&mut self, config: SpillConfig) {
        self.spill = Some(config);
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn get(&self, id: &str) -> Option<&Item> {
        self.items.get(id)
    }

    pub fn get_mut(&mut self, id: &str) -> Option<&mut Item> {
        self.items.get_mut(id)
    }

    pub fn by_path(&self, path: &str) -> Option<&Item> {
        self.by_path.get(path).and_then(|id| self.items.get(id))
    }

    pub fn contains_id(&self, id: &str) -> bool {
        self.items.contains_key(id)
    }

    pub fn contains_path(&self, path: &str) -> bool {
        self.by_path.contains_key(path)
    }

    /// Items in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &Item> {
        self.order.iter().filter_map(|id| self.items.get(id))
    }

    /// Ids in insertion order.
    pub fn ids(&self) -> Vec<String> {
        self.order.clone()
    }

    /// A free `(id, path)` pair derived from the hints.
    ///
    /// Colliding ids become `base1`, `base2`, ...; colliding paths become
    /// `stem1.ext`, `stem2.ext`, ...
    pub fn generate(&self, id_hint: &str, href_hint: &str) -> (String, String) {
        let base = sanitize_id(id_hint);
        let mut id = base.clone();
        let mut counter = 1;
        while self.items.contains_key(&id) {
            id = format!("{base}{counter}");
            counter += 1;
        }

        let path = normalize(href_hint);
        let path = if path.is_empty() { "item".to_string() } else { path };
        let mut href = path.clone();
        if self.by_path.contains_key(&href) {
            let dir = dirname(&path);
            let name = basename(&path);
            let (stem, ext) = match name.rfind('.') {
                Some(dot) if dot > 0 => (&name[..dot], &name[dot..]),
                _ => (name, ""),
            };
            let mut counter = 1;
            loop {
                let candidate = if dir.is_empty() {
                    format!("{stem}{counter}{ext}")
                } else {
                    format!("{dir}/{stem}{counter}{ext}")
                };
                if !self.by_path.contains_key(&candidate) {
                    href = candidate;
                    break;
                }
                counter += 1;
            }
        }
        (id, href)
    }

    /// Add a file. Colliding hints are replaced by generated ones.
    pub fn add(
        &mut self,
        id_hint: &str,
        href_hint: &str,
        media_type: &str,
        data: Vec<u8>,
    ) -> Result<&Item> {
        let (id, href) = self.generate(id_hint, href_hint);
        let payload = self.store(data)?;
        log::debug!("manifest: added {id} -> {href} ({media_type})");

        self.by_path.insert(href.clone(), id.clone());
        self.order.push(id.clone());
        let item = Item {
            id: id.clone(),
            href,
            media_type: media_type.to_string(),
            properties: Vec::new(),
            payload,
        };
        Ok(self.items.entry(id).or_insert(item))
    }

    pub fn set_data(&mut self, id: &str, data: Vec<u8>) -> Result<()> {
        if !self.items.contains_key(id) {
            return Err(Error::Invariant(format!("no manifest item with id {id:?}")));
        }
        let payload = self.store(data)?;
        if let Some(item) = self.items.get_mut(id) {
            item.payload = payload;
        }
        Ok(())
    }

    /// Move an item to a new canonical path.
    pub fn rename(&mut self, id: &str, new_path: &str) -> Result<()> {
        let new_path = normalize(new_path);
        let Some(item) = self.items.get_mut(id) else {
            return Err(Error::Invariant(format!("no manifest item with id {id:?}")));
        };
        if item.href == new_path {
            return Ok(());
        }
        if self.by_path.contains_key(&new_path) {
            return Err(Error::Invariant(format!("path {new_path:?} is already taken")));
        }
        self.by_path.remove(&item.href);
        self.by_path.insert(new_path.clone(), id.to_string());
        item.href = new_path;
        Ok(())
    }

    /// Drop an item from the index. Spine, guide and TOC are not touched;
    /// use `Book::remove_item` from outside the model.
    pub(crate) fn remove(&mut self, id: &str) -> Option<Item> {
        let item = self.items.remove(id)?;
        self.by_path.remove(&item.href);
        self.order.retain(|i| i != id);
        if let Payload::Spilled(path) = &item.payload
            && let Err(e) = fs::remove_file(path)
        {
            log::debug!("manifest: could not remove spilled {}: {e}", path.display());
        }
        Some(item)
    }

    fn store(&mut self, data: Vec<u8>) -> Result<Payload> {
        match &self.spill {
            Some(spill) if data.len() > spill.threshold => {
                if self.spilled == 0 {
                    fs::create_dir_all(&spill.dir)?;
                }
                self.spilled += 1;
                let path = spill.dir.join(format!("payload-{}.bin", self.spilled));
                fs::write(&path, &data)?;
                Ok(Payload::Spilled(path))
            }
            _ => Ok(Payload::Memory(data)),
        }
    }
}

/// Make an id hint usable as an XML id.
fn sanitize_id(hint: &str) -> String {
    let mut id: String = hint
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') {
                c
            } else {
                '_'
            }
        })
        .collect();
    if id.is_empty() {
        id.push_str("id");
    }
    if !id.starts_with(|c: char| c.is_ascii_alphabetic() || c == '_') {
        id.insert(0, 'x');
    }
    id
}
