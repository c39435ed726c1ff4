//! Conversion options: declarations, recommendations and the merged set.
//!
//! Every option is declared once with a [`OptionSpec`]. Plugins recommend
//! values at a [`Level`]; the [`OptionMerger`] picks one value per option
//! and hands the passes an immutable [`OptionSet`].

mod merge;

pub use merge::OptionMerger;

use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;

use crate::error::{Error, Result};

/// Strength of a recommendation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum Level {
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OptionKind {
    Bool,
    Int,
    Float,
    Text,
    /// Text restricted to the listed values.
    Choice(&'static [&'static str]),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum OptionValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    /// An unset text option.
    None,
}

impl OptionValue {
    /// Whether this value fits `kind`.
    pub fn fits(&self, kind: OptionKind) -> bool {
        match (kind, self) {
            (OptionKind::Bool, OptionValue::Bool(_)) => true,
            (OptionKind::Int, OptionValue::Int(_)) => true,
            (OptionKind::Float, OptionValue::Float(_) | OptionValue::Int(_)) => true,
            (OptionKind::Text, OptionValue::Text(_) | OptionValue::None) => true,
            (OptionKind::Choice(allowed), OptionValue::Text(t)) => allowed.contains(&t.as_str()),
            _ => false,
        }
    }

    /// Parse a command-line value for an option of `kind`.
    pub fn parse(kind: OptionKind, raw: &str) -> Option<OptionValue> {
        let raw = raw.trim();
        let value = match kind {
            OptionKind::Bool => match raw.to_ascii_lowercase().as_str() {
                "true" | "yes" | "on" | "1" => OptionValue::Bool(true),
                "false" | "no" | "off" | "0" => OptionValue::Bool(false),
                _ => return None,
            },
            OptionKind::Int => OptionValue::Int(raw.parse().ok()?),
            OptionKind::Float => OptionValue::Float(raw.parse().ok()?),
            OptionKind::Text | OptionKind::Choice(_) => OptionValue::Text(raw.to_string()),
        };
        value.fits(kind).then_some(value)
    }

    /// Convert a JSON value from an options file.
    pub fn from_json(kind: OptionKind, json: &serde_json::Value) -> Option<OptionValue> {
        use serde_json::Value;
        let value = match (kind, json) {
            (OptionKind::Text, Value::Null) => OptionValue::None,
            (OptionKind::Bool, Value::Bool(b)) => OptionValue::Bool(*b),
            (OptionKind::Int, Value::Number(n)) => OptionValue::Int(n.as_i64()?),
            (OptionKind::Float, Value::Number(n)) => OptionValue::Float(n.as_f64()?),
            (_, Value::String(s)) => return OptionValue::parse(kind, s),
            (OptionKind::Text | OptionKind::Choice(_), Value::Number(n)) => {
                OptionValue::Text(n.to_string())
            }
            _ => return None,
        };
        value.fits(kind).then_some(value)
    }
}

impl fmt::Display for OptionValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OptionValue::Bool(b) => write!(f, "{b}"),
            OptionValue::Int(i) => write!(f, "{i}"),
            OptionValue::Float(x) => write!(f, "{x}"),
            OptionValue::Text(s) => f.write_str(s),
            OptionValue::None => f.write_str("(unset)"),
        }
    }
}

impl From<bool> for OptionValue {
    fn from(b: bool) -> Self {
        OptionValue::Bool(b)
    }
}

impl From<i64> for OptionValue {
    fn from(i: i64) -> Self {
        OptionValue::Int(i)
    }
}

impl From<&str> for OptionValue {
    fn from(s: &str) -> Self {
        OptionValue::Text(s.to_string())
    }
}

/// Declaration of one option.
#[derive(Debug, Clone, PartialEq)]
pub struct OptionSpec {
    pub name: &'static str,
    pub kind: OptionKind,
    pub default: OptionValue,
    pub help: &'static str,
}

impl OptionSpec {
    pub fn flag(name: &'static str, default: bool, help: &'static str) -> Self {
        Self {
            name,
            kind: OptionKind::Bool,
            default: OptionValue::Bool(default),
            help,
        }
    }

    pub fn int(name: &'static str, default: i64, help: &'static str) -> Self {
        Self {
            name,
            kind: OptionKind::Int,
            default: OptionValue::Int(default),
            help,
        }
    }

    pub fn float(name: &'static str, default: f64, help: &'static str) -> Self {
        Self {
            name,
            kind: OptionKind::Float,
            default: OptionValue::Float(default),
            help,
        }
    }

    pub fn text(name: &'static str, default: Option<&str>, help: &'static str) -> Self {
        Self {
            name,
            kind: OptionKind::Text,
            default: default.map_or(OptionValue::None, OptionValue::from),
            help,
        }
    }

    pub fn choice(
        name: &'static str,
        choices: &'static [&'static str],
        default: &'static str,
        help: &'static str,
    ) -> Self {
        Self {
            name,
            kind: OptionKind::Choice(choices),
            default: OptionValue::from(default),
            help,
        }
    }
}

/// `(name, value, level)`.
#[derive(Debug, Clone, PartialEq)]
pub struct Recommendation {
    pub name: String,
    pub value: OptionValue,
    pub level: Level,
}

impl Recommendation {
    pub fn new(name: impl Into<String>, value: impl Into<OptionValue>, level: Level) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            level,
        }
    }
}

/// The resolved options of one job.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct OptionSet {
    values: BTreeMap<String, OptionValue>,
}

impl OptionSet {
    pub fn get(&self, name: &str) -> Option<&OptionValue> {
        self.values.get(name)
    }

    /// Boolean option; unknown or non-boolean options read as `false`.
    pub fn flag(&self, name: &str) -> bool {
        matches!(self.values.get(name), Some(OptionValue::Bool(true)))
    }

    pub fn int(&self, name: &str) -> Option<i64> {
        match self.values.get(name)? {
            OptionValue::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn float(&self, name: &str) -> Option<f64> {
        match self.values.get(name)? {
            OptionValue::Float(x) => Some(*x),
            OptionValue::Int(i) => Some(*i as f64),
            _ => None,
        }
    }

    /// Text option; unset and blank values read as `None`.
    pub fn text(&self, name: &str) -> Option<&str> {
        match self.values.get(name)? {
            OptionValue::Text(s) if !s.trim().is_empty() => Some(s.as_str()),
            _ => None,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &OptionValue)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub(crate) fn insert(&mut self, name: impl Into<String>, value: OptionValue) {
        self.values.insert(name.into(), value);
    }

    /// Build a set directly from values. Intended for tests and embedding.
    pub fn from_values<I, K>(values: I) -> Self
    where
        I: IntoIterator<Item = (K, OptionValue)>,
        K: Into<String>,
    {
        Self {
            values: values.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        }
    }
}

/// Declarations of the options every conversion understands.
pub fn pipeline_options() -> Vec<OptionSpec> {
    vec![
        OptionSpec::text("title", None, "Set the title."),
        OptionSpec::text("authors", None, "Set the authors, separated by '&'."),
        OptionSpec::text("language", None, "Set the language."),
        OptionSpec::text("publisher", None, "Set the publisher."),
        OptionSpec::text("cover", None, "Use this image file as the cover."),
        OptionSpec::flag(
            "unpack_data_urls",
            true,
            "Turn images embedded as data: URLs into separate files.",
        ),
        OptionSpec::text("level1_toc", None, "Query for first level TOC entries."),
        OptionSpec::text("level2_toc", None, "Query for second level TOC entries."),
        OptionSpec::text("level3_toc", None, "Query for third level TOC entries."),
        OptionSpec::flag(
            "use_auto_toc",
            false,
            "Always generate the TOC, ignoring the one in the input.",
        ),
        OptionSpec::int(
            "toc_threshold",
            6,
            "Generate a TOC when the input TOC has fewer entries than this.",
        ),
        OptionSpec::int(
            "max_toc_links",
            50,
            "Maximum number of links to turn into TOC entries; 0 disables links.",
        ),
        OptionSpec::flag(
            "duplicate_links_in_toc",
            false,
            "Allow TOC entries built from links to repeat a title.",
        ),
        OptionSpec::text(
            "toc_filter",
            None,
            "Remove TOC entries whose title contains this text.",
        ),
        OptionSpec::flag("remove_first_image", false, "Remove the first image of the book."),
        OptionSpec::flag(
            "insert_metadata",
            false,
            "Insert a page listing the book's metadata after the title page.",
        ),
        OptionSpec::flag("inline_toc", false, "Insert a generated HTML table of contents."),
        OptionSpec::text("toc_title", None, "Title of the generated table of contents."),
        OptionSpec::flag(
            "toc_at_end",
            false,
            "Put the generated table of contents at the end of the book.",
        ),
        OptionSpec::text(
            "page_breaks_before",
            Some("h1, h2"),
            "Split files before elements matching this query.",
        ),
        OptionSpec::flag(
            "dont_split_on_page_breaks",
            false,
            "Do not split files on page breaks.",
        ),
        OptionSpec::int(
            "flow_size",
            0,
            "Split files larger than this many KB; 0 disables size splitting.",
        ),
        OptionSpec::flag("insert_cover", false, "Generate a title page showing the cover."),
        OptionSpec::flag("no_svg_cover", false, "Use a plain <img> in the generated title page."),
        OptionSpec::flag(
            "preserve_cover_aspect_ratio",
            false,
            "Keep the aspect ratio of the cover image.",
        ),
        OptionSpec::flag(
            "flatten_filenames",
            false,
            "Put every file at the top level with a generated name.",
        ),
        OptionSpec::flag(
            "upshift_markup",
            true,
            "Clean up markup: duplicate anchors, <u>, missing xml:lang.",
        ),
    ]
}

pub(crate) fn check_value(spec: &OptionSpec, value: &OptionValue) -> Result<()> {
    if value.fits(spec.kind) {
        Ok(())
    } else {
        Err(Error::invalid_option(
            spec.name,
            format!("{value} is not a valid {:?} value", spec.kind),
        ))
    }
}
