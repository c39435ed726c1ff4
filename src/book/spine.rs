//! Reading order.

/// One spine entry, referring to a manifest item by id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpineEntry {
    pub id: String,
    pub linear: bool,
}

/// Ordered `(item id, linear)` pairs. Mutation goes through `Book` so that
/// every id is checked against the manifest.
#[derive(Debug, Clone, Default)]
pub struct Spine {
    entries: Vec<SpineEntry>,
}

impl Spine {
    pub fn entries(&self) -> &[SpineEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.position(id).is_some()
    }

    pub fn position(&self, id: &str) -> Option<usize> {
        self.entries.iter().position(|e| e.id == id)
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|e| e.id.as_str())
    }

    /// Insert at `position`, clamped to the end.
    pub(crate) fn insert(&mut self, position: usize, id: String, linear: bool) {
        let position = position.min(self.entries.len());
        self.entries.insert(position, SpineEntry { id, linear });
    }

    pub(crate) fn remove(&mut self, id: &str) -> bool {
        let before = self.entries.len();
        self.entries.retain(|e| e.id != id);
        before != self.entries.len()
    }

    pub(crate) fn set_linear(&mut self, id: &str, linear: bool) {
        if let Some(entry) = self.entries.iter_mut().find(|e| e.id == id) {
            entry.linear = linear;
        }
    }
}
