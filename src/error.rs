//! Error types for the docxmerge library.

use std::io;
use thiserror::Error;

/// Result type alias for docxmerge operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while merging documents.
#[derive(Error, Debug)]
pub enum Error {
    /// I/O error during file operations.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Fewer than two documents were supplied.
    #[error("At least two documents are required (base + source), got {0}")]
    InsufficientSources(usize),

    /// None of pattern / insert-at-start / insert-at-end was selected.
    #[error("No insertion mode selected: set a pattern, insert-at-start or insert-at-end")]
    NoInsertionMode,

    /// An input could not be opened as a ZIP container.
    #[error("Corrupt container: {0}")]
    CorruptContainer(String),

    /// A required part is not well-formed XML.
    #[error("Malformed XML: {0}")]
    MalformedXml(String),

    /// A relationship points at a media payload absent from its package.
    ///
    /// Never returned from a merge; it is reported through the log channel
    /// and the merge report.
    #[error("Missing media asset: {0}")]
    MissingMediaAsset(String),

    /// Every requested insertion policy produced zero effect.
    #[error("No insertion was performed (pattern not found and no other mode active)")]
    NoInsertionPerformed,

    /// A required document component is missing.
    #[error("Missing component: {0}")]
    MissingComponent(String),

    /// Error writing the output container.
    #[error("Container write error: {0}")]
    Container(String),

    /// Options or report (de)serialization failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl From<zip::result::ZipError> for Error {
    fn from(err: zip::result::ZipError) -> Self {
        Error::CorruptContainer(err.to_string())
    }
}

impl From<quick_xml::Error> for Error {
    fn from(err: quick_xml::Error) -> Self {
        Error::MalformedXml(err.to_string())
    }
}

impl From<quick_xml::events::attributes::AttrError> for Error {
    fn from(err: quick_xml::events::attributes::AttrError) -> Self {
        Error::MalformedXml(err.to_string())
    }
}
