//! Error types for conversion jobs.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors that can occur while converting a book.
#[derive(Error, Debug)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("ZIP error: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("XML parsing error: {0}")]
    Xml(#[from] quick_xml::Error),

    #[error("UTF-8 decoding error: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),

    /// The source cannot be turned into anything usable.
    #[error("Invalid {format}: {reason}")]
    Format { format: String, reason: String },

    /// Rights-managed content without a usable key.
    #[error("{0} is encrypted with DRM and cannot be converted")]
    Drm(String),

    /// Strict and lenient parses both failed to produce a usable document.
    #[error("Malformed markup in {name}: {reason}")]
    Malformed { name: String, reason: String },

    /// A book model invariant was violated.
    #[error("Book model invariant violated: {0}")]
    Invariant(String),

    #[error("Invalid option {name}: {reason}")]
    InvalidOption { name: String, reason: String },

    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    #[error("Transform {pass} failed: {source}")]
    Pass {
        pass: &'static str,
        #[source]
        source: Box<Error>,
    },

    /// An expected condition the user must be told about.
    #[error("{}", .0.title)]
    Feedback(Feedback),
}

impl Error {
    pub(crate) fn format(format: impl Into<String>, reason: impl Into<String>) -> Self {
        Error::Format {
            format: format.into(),
            reason: reason.into(),
        }
    }

    pub(crate) fn invalid_option(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Error::InvalidOption {
            name: name.into(),
            reason: reason.into(),
        }
    }

    /// The user-facing feedback carried by this error, if any.
    pub fn feedback(&self) -> Option<&Feedback> {
        match self {
            Error::Feedback(fb) => Some(fb),
            Error::Pass { source, .. } => source.feedback(),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

/// How prominently a front end should present a [`Feedback`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
    Error,
}

/// Structured message for conditions that are not bugs but must be shown
/// to the user (no usable TOC, DRM, unsupported markup, ...).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Feedback {
    pub title: String,
    pub message: String,
    pub severity: Severity,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl Feedback {
    pub fn new(severity: Severity, title: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            message: message.into(),
            severity,
            detail: None,
        }
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }
}

impl std::fmt::Display for Feedback {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.title, self.message)?;
        if let Some(detail) = &self.detail {
            write!(f, " ({detail})")?;
        }
        Ok(())
    }
}
