//! Merge options configuration.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Severity of a merge log message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Progress information
    Info,
    /// A step completed successfully
    Ok,
    /// Something was skipped or degraded
    Warn,
    /// The merge failed
    Err,
}

impl LogLevel {
    /// Short lowercase label.
    pub fn as_str(self) -> &'static str {
        match self {
            LogLevel::Info => "info",
            LogLevel::Ok => "ok",
            LogLevel::Warn => "warn",
            LogLevel::Err => "err",
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Callback receiving every merge log message.
pub type LogCallback = Arc<dyn Fn(&str, LogLevel) + Send + Sync>;

/// Options for merging documents.
///
/// At least one insertion mode (a pattern, `insert_at_start` or
/// `insert_at_end`) must be selected. The modes combine: start insertions
/// run first, then pattern insertions, then end insertions.
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MergeOptions {
    /// Insert each source before the first paragraph containing this text
    pub pattern: Option<String>,

    /// Insert each source at the top of the base body
    pub insert_at_start: bool,

    /// Append each source to the end of the base body
    pub insert_at_end: bool,

    /// Merge numbering definitions and remap `numId` references
    pub merge_numbering: bool,

    /// Merge styles, fonts, theme, web settings and selected settings
    pub merge_styles: bool,

    /// Merge footnotes and endnotes
    pub merge_footnotes: bool,

    /// Put a page break before each source appended at the end
    pub page_breaks: bool,

    /// Receives log messages; advisory only
    #[serde(skip)]
    pub on_log: Option<LogCallback>,
}

impl Default for MergeOptions {
    fn default() -> Self {
        Self {
            pattern: None,
            insert_at_start: false,
            insert_at_end: false,
            merge_numbering: true,
            merge_styles: true,
            merge_footnotes: true,
            page_breaks: true,
            on_log: None,
        }
    }
}

impl fmt::Debug for MergeOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MergeOptions")
            .field("pattern", &self.pattern)
            .field("insert_at_start", &self.insert_at_start)
            .field("insert_at_end", &self.insert_at_end)
            .field("merge_numbering", &self.merge_numbering)
            .field("merge_styles", &self.merge_styles)
            .field("merge_footnotes", &self.merge_footnotes)
            .field("page_breaks", &self.page_breaks)
            .field("on_log", &self.on_log.is_some())
            .finish()
    }
}

impl MergeOptions {
    /// Create new merge options.
    pub fn new() -> Self {
        Self::default()
    }

    /// Load options from JSON. Missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(Error::from)
    }

    /// Insert sources before the first paragraph containing `pattern`.
    pub fn with_pattern(mut self, pattern: impl Into<String>) -> Self {
        self.pattern = Some(pattern.into());
        self
    }

    /// Insert sources at the top of the base body.
    pub fn with_insert_at_start(mut self, enabled: bool) -> Self {
        self.insert_at_start = enabled;
        self
    }

    /// Append sources to the end of the base body.
    pub fn with_insert_at_end(mut self, enabled: bool) -> Self {
        self.insert_at_end = enabled;
        self
    }

    /// Enable or disable numbering merge.
    pub fn with_numbering(mut self, enabled: bool) -> Self {
        self.merge_numbering = enabled;
        self
    }

    /// Enable or disable styles merge.
    pub fn with_styles(mut self, enabled: bool) -> Self {
        self.merge_styles = enabled;
        self
    }

    /// Enable or disable footnote and endnote merge.
    pub fn with_footnotes(mut self, enabled: bool) -> Self {
        self.merge_footnotes = enabled;
        self
    }

    /// Enable or disable page breaks between appended documents.
    pub fn with_page_breaks(mut self, enabled: bool) -> Self {
        self.page_breaks = enabled;
        self
    }

    /// Set the log callback.
    pub fn with_log<F>(mut self, callback: F) -> Self
    where
        F: Fn(&str, LogLevel) + Send + Sync + 'static,
    {
        self.on_log = Some(Arc::new(callback));
        self
    }

    /// The pattern, if one is set and non-empty.
    pub fn pattern(&self) -> Option<&str> {
        self.pattern.as_deref().filter(|p| !p.is_empty())
    }

    /// Whether any insertion mode is selected.
    pub fn has_insertion_mode(&self) -> bool {
        self.pattern().is_some() || self.insert_at_start || self.insert_at_end
    }

    /// Check the structural preconditions for merging `source_count` documents.
    pub fn validate(&self, source_count: usize) -> Result<()> {
        if source_count < 2 {
            return Err(Error::InsufficientSources(source_count));
        }
        if !self.has_insertion_mode() {
            return Err(Error::NoInsertionMode);
        }
        Ok(())
    }
}
