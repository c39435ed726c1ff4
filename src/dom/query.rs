//! Element queries used by TOC detection and page-break options.
//!
//! A query is a comma separated list of compound selectors. Each compound is
//! an optional tag name (or `*`) followed by any number of `.class`, `#id`,
//! `[attr]`, `[attr=value]` and `[attr~=word]` conditions, e.g.
//! `h1, h2.chapter, div[class=part]`.

use std::fmt;

use super::arena::{Document, NodeId};
use crate::error::{Error, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
enum Condition {
    Class(String),
    Id(String),
    Has(String),
    Equals(String, String),
    Includes(String, String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Compound {
    tag: Option<String>,
    conditions: Vec<Condition>,
}

/// A parsed element query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Query {
    source: String,
    alternatives: Vec<Compound>,
}

impl Query {
    pub fn parse(text: &str) -> Result<Self> {
        let mut alternatives = Vec::new();
        for part in text.split(',') {
            let part = part.trim();
            if part.is_empty() {
                continue;
            }
            alternatives.push(parse_compound(part)?);
        }
        if alternatives.is_empty() {
            return Err(Error::format("query", format!("empty query {text:?}")));
        }
        Ok(Self {
            source: text.trim().to_string(),
            alternatives,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }

    pub fn matches(&self, doc: &Document, node: NodeId) -> bool {
        doc.is_element(node) && self.alternatives.iter().any(|c| c.matches(doc, node))
    }

    /// Matching elements below `root` (inclusive), in document order.
    pub fn select_within(&self, doc: &Document, root: NodeId) -> Vec<NodeId> {
        doc.descendants(root)
            .filter(|&id| self.matches(doc, id))
            .collect()
    }

    /// Matching elements of the whole document, in document order.
    pub fn select(&self, doc: &Document) -> Vec<NodeId> {
        self.select_within(doc, doc.root())
    }
}

impl fmt::Display for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

impl Compound {
    fn matches(&self, doc: &Document, node: NodeId) -> bool {
        if let Some(tag) = &self.tag
            && !doc.is_named(node, tag)
        {
            return false;
        }
        self.conditions.iter().all(|cond| match cond {
            Condition::Class(class) => doc.classes(node).any(|c| c == class),
            Condition::Id(id) => doc.element_id(node) == Some(id.as_str()),
            Condition::Has(attr) => doc.has_attr(node, attr),
            Condition::Equals(attr, value) => doc.get_attr(node, attr) == Some(value.as_str()),
            Condition::Includes(attr, word) => doc
                .get_attr(node, attr)
                .is_some_and(|v| v.split_whitespace().any(|w| w == word)),
        })
    }
}

fn is_name_char(c: char) -> bool {
    c.is_alphanumeric() || matches!(c, '-' | '_' | ':')
}

fn parse_compound(text: &str) -> Result<Compound> {
    let invalid = |reason: &str| Error::format("query", format!("{reason} in {text:?}"));
    let chars: Vec<char> = text.chars().collect();
    let mut i = 0;

    let take_name = |i: &mut usize| -> String {
        let start = *i;
        while *i < chars.len() && is_name_char(chars[*i]) {
            *i += 1;
        }
        chars[start..*i].iter().collect()
    };

    let tag = if i < chars.len() && chars[i] == '*' {
        i += 1;
        None
    } else {
        let name = take_name(&mut i);
        (!name.is_empty()).then(|| name.to_ascii_lowercase())
    };

    let mut conditions = Vec::new();
    while i < chars.len() {
        match chars[i] {
            '.' | '#' => {
                let marker = chars[i];
                i += 1;
                let name = take_name(&mut i);
                if name.is_empty() {
                    return Err(invalid("missing name"));
                }
                conditions.push(if marker == '.' {
                    Condition::Class(name)
                } else {
                    Condition::Id(name)
                });
            }
            '[' => {
                let close = chars[i..]
                    .iter()
                    .position(|&c| c == ']')
                    .ok_or_else(|| invalid("unterminated attribute condition"))?;
                let inner: String = chars[i + 1..i + close].iter().collect();
                i += close + 1;
                conditions.push(parse_attr_condition(&inner).ok_or_else(|| invalid("bad attribute condition"))?);
            }
            c if c.is_whitespace() => return Err(invalid("descendant combinators are not supported")),
            _ => return Err(invalid("unexpected character")),
        }
    }

    if tag.is_none() && conditions.is_empty() && !text.starts_with('*') {
        return Err(invalid("empty selector"));
    }
    Ok(Compound { tag, conditions })
}

fn parse_attr_condition(inner: &str) -> Option<Condition> {
    let unquote = |v: &str| {
        let v = v.trim();
        v.strip_prefix('"')
            .and_then(|v| v.strip_suffix('"'))
            .or_else(|| v.strip_prefix('\'').and_then(|v| v.strip_suffix('\'')))
            .unwrap_or(v)
            .to_string()
    };
    let valid_name = |n: &str| !n.is_empty() && n.chars().all(is_name_char);

    if let Some((name, value)) = inner.split_once("~=") {
        let name = name.trim();
        return valid_name(name).then(|| Condition::Includes(name.to_string(), unquote(value)));
    }
    if let Some((name, value)) = inner.split_once('=') {
        let name = name.trim();
        return valid_name(name).then(|| Condition::Equals(name.to_string(), unquote(value)));
    }
    let name = inner.trim();
    valid_name(name).then(|| Condition::Has(name.to_string()))
}
