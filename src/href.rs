//! Reference resolution between files of a book.
//!
//! Every internal reference is reduced to a canonical [`Reference`]: a
//! root-relative, percent-decoded, `.`/`..`-free path plus an optional
//! fragment. Hrefs written back into documents are produced by
//! [`relative_href`], so a reference survives any number of rewrites.
//!
//! ```
//! use ebconv::href::{resolve, Resolved};
//!
//! let r = resolve("../images/a%20b.png#top", "OEBPS/text/ch1.xhtml");
//! let Resolved::Internal(r) = r else { panic!() };
//! assert_eq!(r.path, "OEBPS/images/a b.png");
//! assert_eq!(r.fragment.as_deref(), Some("top"));
//! ```

use std::fmt;

use percent_encoding::{AsciiSet, CONTROLS, percent_decode_str, utf8_percent_encode};

/// Characters escaped when a path or fragment is written back as an href.
const HREF_ESCAPE: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'%')
    .add(b'<')
    .add(b'>')
    .add(b'?')
    .add(b'`')
    .add(b'{')
    .add(b'}')
    .add(b'[')
    .add(b']')
    .add(b'\\')
    .add(b'^')
    .add(b'|');

/// A canonical pointer to a file in the book and optionally an anchor in it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Reference {
    /// Root-relative path without leading slash (`OEBPS/text/ch1.xhtml`).
    pub path: String,
    pub fragment: Option<String>,
}

impl Reference {
    pub fn new(path: impl Into<String>, fragment: Option<String>) -> Self {
        Self {
            path: path.into(),
            fragment: fragment.filter(|f| !f.is_empty()),
        }
    }

    /// A reference to the start of a file.
    pub fn file(path: impl Into<String>) -> Self {
        Self::new(path, None)
    }

    /// The same file with a different fragment.
    pub fn with_fragment(&self, fragment: Option<String>) -> Self {
        Self::new(self.path.clone(), fragment)
    }

    /// Relative href of this reference as written inside `from`.
    pub fn href_from(&self, from: &str) -> String {
        relative_href(self, from)
    }
}

/// Rooted canonical form: `/path#fragment`.
impl fmt::Display for Reference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "/{}", utf8_percent_encode(&self.path, HREF_ESCAPE))?;
        if let Some(frag) = &self.fragment {
            write!(f, "#{}", utf8_percent_encode(frag, HREF_ESCAPE))?;
        }
        Ok(())
    }
}

/// Result of resolving an href.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Resolved {
    Internal(Reference),
    /// Scheme-qualified reference (`http:`, `mailto:`, `data:`, ...), untouched.
    External(String),
}

impl Resolved {
    pub fn internal(&self) -> Option<&Reference> {
        match self {
            Resolved::Internal(r) => Some(r),
            Resolved::External(_) => None,
        }
    }

    pub fn into_internal(self) -> Option<Reference> {
        match self {
            Resolved::Internal(r) => Some(r),
            Resolved::External(_) => None,
        }
    }
}

impl fmt::Display for Resolved {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Resolved::Internal(r) => r.fmt(f),
            Resolved::External(s) => f.write_str(s),
        }
    }
}

/// Whether `reference` starts with a URI scheme (`scheme:`).
pub fn is_external(reference: &str) -> bool {
    let reference = reference.trim();
    let Some(colon) = reference.find(':') else {
        return false;
    };
    let scheme = &reference[..colon];
    let mut chars = scheme.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'))
}

/// Collapse `.`, `..` and empty segments. `..` above the root is dropped.
pub fn normalize(path: &str) -> String {
    let mut parts: Vec<&str> = Vec::new();
    for segment in path.split(['/', '\\']) {
        match segment {
            "" | "." => {}
            ".." => {
                parts.pop();
            }
            s => parts.push(s),
        }
    }
    parts.join("/")
}

/// Directory part of a canonical path (`""` for top-level files).
pub fn dirname(path: &str) -> &str {
    path.rfind('/').map(|i| &path[..i]).unwrap_or("")
}

/// Final segment of a canonical path.
pub fn basename(path: &str) -> &str {
    path.rfind('/').map(|i| &path[i + 1..]).unwrap_or(path)
}

/// Join a directory and a relative path, normalizing the result.
pub fn join(dir: &str, relative: &str) -> String {
    if dir.is_empty() {
        normalize(relative)
    } else {
        normalize(&format!("{dir}/{relative}"))
    }
}

/// Resolve `reference` as written inside the file at canonical path `base`.
///
/// `#frag` points into `base` itself, a leading `/` is relative to the book
/// root and a `?query` is kept as part of the path.
pub fn resolve(reference: &str, base: &str) -> Resolved {
    let reference = reference.trim();
    if is_external(reference) {
        return Resolved::External(reference.to_string());
    }

    let (raw_path, raw_fragment) = match reference.split_once('#') {
        Some((p, f)) => (p, Some(f)),
        None => (reference, None),
    };

    let path = percent_decode_str(raw_path).decode_utf8_lossy();
    let fragment = raw_fragment
        .map(|f| percent_decode_str(f).decode_utf8_lossy().into_owned())
        .filter(|f| !f.is_empty());

    let path = if path.is_empty() {
        normalize(base)
    } else if let Some(rooted) = path.strip_prefix('/') {
        normalize(rooted)
    } else {
        join(dirname(&normalize(base)), &path)
    };

    Resolved::Internal(Reference { path, fragment })
}

/// Resolve and keep only internal references.
pub fn resolve_internal(reference: &str, base: &str) -> Option<Reference> {
    resolve(reference, base).into_internal()
}

/// Percent-encoded href of `target` relative to the file at `from`.
///
/// Resolving the result against `from` yields `target` again.
pub fn relative_href(target: &Reference, from: &str) -> String {
    let fragment = target
        .fragment
        .as_ref()
        .map(|f| format!("#{}", utf8_percent_encode(f, HREF_ESCAPE)))
        .unwrap_or_default();

    if target.path == from && !fragment.is_empty() {
        return fragment;
    }

    let from_dir: Vec<&str> = dirname(from).split('/').filter(|s| !s.is_empty()).collect();
    let to: Vec<&str> = target.path.split('/').filter(|s| !s.is_empty()).collect();

    let common = from_dir
        .iter()
        .zip(to.iter())
        .take_while(|(a, b)| a == b)
        .count()
        // Never consume the file name itself.
        .min(to.len().saturating_sub(1));

    let mut segments: Vec<String> = Vec::new();
    for _ in common..from_dir.len() {
        segments.push("..".to_string());
    }
    for seg in &to[common..] {
        segments.push(utf8_percent_encode(seg, HREF_ESCAPE).to_string());
    }

    let mut href = segments.join("/");
    if href.is_empty() {
        href.push_str("./");
    } else if is_external(&href) {
        href.insert_str(0, "./");
    }
    href.push_str(&fragment);
    href
}
