//! Merge report and log channel.

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::options::{LogCallback, LogLevel};

/// Target used for every `log` record emitted by the merge.
pub const LOG_TARGET: &str = "docxmerge";

/// JSON output format options.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum JsonFormat {
    /// Compact single-line JSON
    Compact,
    /// Pretty-printed with 2-space indentation
    #[default]
    Pretty,
}

/// Counters collected during one merge call.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergeReport {
    /// Documents taken as input (base included)
    pub documents: usize,
    /// Insertion operations applied to the base body
    pub insertions: usize,
    pub styles_added: usize,
    pub fonts_added: usize,
    pub settings_added: usize,
    pub abstract_numbering_added: usize,
    pub numbering_instances_added: usize,
    pub footnotes_added: usize,
    pub endnotes_added: usize,
    /// Media payloads copied into the base package
    pub media_copied: usize,
    /// Non-media parts copied into the base package
    pub parts_copied: usize,
    /// Relationship references removed because they could not be resolved
    pub references_dropped: usize,
    /// Warning messages, in order
    pub warnings: Vec<String>,
}

impl MergeReport {
    /// Serialize the report.
    pub fn to_json(&self, format: JsonFormat) -> Result<String> {
        let json = match format {
            JsonFormat::Compact => serde_json::to_string(self)?,
            JsonFormat::Pretty => serde_json::to_string_pretty(self)?,
        };
        Ok(json)
    }
}

/// Fans merge messages out to the caller's callback and the `log` facade,
/// and keeps the report.
pub(crate) struct MergeLog {
    callback: Option<LogCallback>,
    pub(crate) report: MergeReport,
}

impl MergeLog {
    pub(crate) fn new(callback: Option<LogCallback>) -> Self {
        Self {
            callback,
            report: MergeReport::default(),
        }
    }

    pub(crate) fn emit(&mut self, level: LogLevel, message: &str) {
        match level {
            LogLevel::Info | LogLevel::Ok => log::info!(target: LOG_TARGET, "{}", message),
            LogLevel::Warn => log::warn!(target: LOG_TARGET, "{}", message),
            LogLevel::Err => log::error!(target: LOG_TARGET, "{}", message),
        }
        if level == LogLevel::Warn {
            self.report.warnings.push(message.to_string());
        }
        if let Some(callback) = &self.callback {
            callback(message, level);
        }
    }

    pub(crate) fn info(&mut self, message: impl AsRef<str>) {
        self.emit(LogLevel::Info, message.as_ref());
    }

    pub(crate) fn ok(&mut self, message: impl AsRef<str>) {
        self.emit(LogLevel::Ok, message.as_ref());
    }

    pub(crate) fn warn(&mut self, message: impl AsRef<str>) {
        self.emit(LogLevel::Warn, message.as_ref());
    }

    pub(crate) fn error(&mut self, message: impl AsRef<str>) {
        self.emit(LogLevel::Err, message.as_ref());
    }

    /// Verbose detail that only goes to the `log` facade.
    pub(crate) fn debug(&self, message: impl AsRef<str>) {
        log::debug!(target: LOG_TARGET, "{}", message.as_ref());
    }

    pub(crate) fn into_report(self) -> MergeReport {
        self.report
    }
}
