//! Semantic landmarks of the OPF 2 `<guide>`.

use std::collections::BTreeMap;
use std::fmt;

use crate::href::Reference;

/// The closed set of guide roles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum GuideRole {
    Cover,
    TitlePage,
    Toc,
    Index,
    Glossary,
    Acknowledgements,
    Bibliography,
    Colophon,
    CopyrightPage,
    Dedication,
    Epigraph,
    Foreword,
    ListOfIllustrations,
    ListOfTables,
    Notes,
    Preface,
    Text,
}

impl GuideRole {
    pub const ALL: [GuideRole; 17] = [
        GuideRole::Cover,
        GuideRole::TitlePage,
        GuideRole::Toc,
        GuideRole::Index,
        GuideRole::Glossary,
        GuideRole::Acknowledgements,
        GuideRole::Bibliography,
        GuideRole::Colophon,
        GuideRole::CopyrightPage,
        GuideRole::Dedication,
        GuideRole::Epigraph,
        GuideRole::Foreword,
        GuideRole::ListOfIllustrations,
        GuideRole::ListOfTables,
        GuideRole::Notes,
        GuideRole::Preface,
        GuideRole::Text,
    ];

    /// The OPF `type` attribute value.
    pub fn as_str(self) -> &'static str {
        match self {
            GuideRole::Cover => "cover",
            GuideRole::TitlePage => "title-page",
            GuideRole::Toc => "toc",
            GuideRole::Index => "index",
            GuideRole::Glossary => "glossary",
            GuideRole::Acknowledgements => "acknowledgements",
            GuideRole::Bibliography => "bibliography",
            GuideRole::Colophon => "colophon",
            GuideRole::CopyrightPage => "copyright-page",
            GuideRole::Dedication => "dedication",
            GuideRole::Epigraph => "epigraph",
            GuideRole::Foreword => "foreword",
            GuideRole::ListOfIllustrations => "loi",
            GuideRole::ListOfTables => "lot",
            GuideRole::Notes => "notes",
            GuideRole::Preface => "preface",
            GuideRole::Text => "text",
        }
    }

    /// Parse an OPF guide type (case-insensitive; `titlepage` accepted).
    pub fn parse(value: &str) -> Option<Self> {
        let value = value.trim().to_ascii_lowercase();
        if value == "titlepage" {
            return Some(GuideRole::TitlePage);
        }
        if value == "start" || value == "bodymatter" {
            return Some(GuideRole::Text);
        }
        GuideRole::ALL.into_iter().find(|r| r.as_str() == value)
    }

    /// The EPUB 3 landmark `epub:type` for this role.
    pub fn epub_type(self) -> &'static str {
        match self {
            GuideRole::Cover => "cover",
            GuideRole::TitlePage => "titlepage",
            GuideRole::Text => "bodymatter",
            GuideRole::CopyrightPage => "copyright-page",
            other => other.as_str(),
        }
    }
}

impl fmt::Display for GuideRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GuideEntry {
    pub title: String,
    pub reference: Reference,
}

/// At most one entry per role.
#[derive(Debug, Clone, Default)]
pub struct Guide {
    entries: BTreeMap<GuideRole, GuideEntry>,
}

impl Guide {
    pub fn set(&mut self, role: GuideRole, title: impl Into<String>, reference: Reference) {
        self.entries.insert(
            role,
            GuideEntry {
                title: title.into(),
                reference,
            },
        );
    }

    pub fn get(&self, role: GuideRole) -> Option<&GuideEntry> {
        self.entries.get(&role)
    }

    pub fn remove(&mut self, role: GuideRole) -> Option<GuideEntry> {
        self.entries.remove(&role)
    }

    /// Remove every role pointing into `path`. Returns how many were removed.
    pub fn remove_by_reference(&mut self, path: &str) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, e| e.reference.path != path);
        before - self.entries.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (GuideRole, &GuideEntry)> {
        self.entries.iter().map(|(r, e)| (*r, e))
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (GuideRole, &mut GuideEntry)> {
        self.entries.iter_mut().map(|(r, e)| (*r, e))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
