//! Multi-valued book metadata.

use std::collections::BTreeMap;

/// Dublin Core terms written as `dc:` elements.
pub const DC_TERMS: &[&str] = &[
    "title",
    "creator",
    "contributor",
    "subject",
    "description",
    "publisher",
    "date",
    "type",
    "format",
    "identifier",
    "source",
    "language",
    "relation",
    "coverage",
    "rights",
];

/// One value of a term with its qualifiers (`opf:role`, `opf:scheme`, `id`, ...).
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct MetaItem {
    pub value: String,
    pub attrs: BTreeMap<String, String>,
}

impl MetaItem {
    pub fn new(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            attrs: BTreeMap::new(),
        }
    }

    pub fn with_attr(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.attrs.insert(name.into(), value.into());
        self
    }

    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attrs.get(name).map(String::as_str)
    }
}

/// Term name to ordered values.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Metadata {
    terms: BTreeMap<String, Vec<MetaItem>>,
}

impl Metadata {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, term: impl Into<String>, value: impl Into<String>) {
        self.add_item(term, MetaItem::new(value));
    }

    pub fn add_item(&mut self, term: impl Into<String>, item: MetaItem) {
        self.terms.entry(term.into()).or_default().push(item);
    }

    pub fn get(&self, term: &str) -> &[MetaItem] {
        self.terms.get(term).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn get_mut(&mut self, term: &str) -> Option<&mut Vec<MetaItem>> {
        self.terms.get_mut(term)
    }

    pub fn first(&self, term: &str) -> Option<&str> {
        self.get(term).first().map(|i| i.value.as_str())
    }

    /// Replace all values of `term` by one value.
    pub fn set(&mut self, term: impl Into<String>, value: impl Into<String>) {
        self.terms.insert(term.into(), vec![MetaItem::new(value)]);
    }

    pub fn remove(&mut self, term: &str) -> Vec<MetaItem> {
        self.terms.remove(term).unwrap_or_default()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[MetaItem])> {
        self.terms.iter().map(|(t, v)| (t.as_str(), v.as_slice()))
    }

    pub fn is_empty(&self) -> bool {
        self.terms.values().all(Vec::is_empty)
    }

    pub fn title(&self) -> Option<&str> {
        self.first("title")
    }

    pub fn language(&self) -> Option<&str> {
        self.first("language")
    }

    /// The identifier whose `id` matches the package `unique-identifier`,
    /// else the first identifier.
    pub fn unique_identifier(&self, uid: Option<&str>) -> Option<&MetaItem> {
        let ids = self.get("identifier");
        uid.and_then(|uid| ids.iter().find(|i| i.attr("id") == Some(uid)))
            .or_else(|| ids.first())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_multi_valued_terms_keep_order() {
        let mut m = Metadata::new();
        m.add("creator", "A");
        m.add_item("creator", MetaItem::new("B").with_attr("opf:role", "edt"));
        let creators: Vec<_> = m.get("creator").iter().map(|i| i.value.as_str()).collect();
        assert_eq!(creators, ["A", "B"]);
        assert_eq!(m.get("creator")[1].attr("opf:role"), Some("edt"));

        m.set("creator", "C");
        assert_eq!(m.get("creator").len(), 1);
        assert!(m.get("missing").is_empty());
    }

    #[test]
    fn test_unique_identifier_prefers_package_uid() {
        let mut m = Metadata::new();
        m.add_item("identifier", MetaItem::new("isbn").with_attr("id", "isbn"));
        m.add_item("identifier", MetaItem::new("urn:uuid:x").with_attr("id", "uid"));
        assert_eq!(m.unique_identifier(Some("uid")).unwrap().value, "urn:uuid:x");
        assert_eq!(m.unique_identifier(None).unwrap().value, "isbn");
    }
}
