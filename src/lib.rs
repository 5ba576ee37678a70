//! # docxmerge
//!
//! Merge Word (DOCX) documents into one package.
//!
//! The first document is the base. Every other document has its body
//! spliced into the base (at the top, before a paragraph containing a
//! pattern, or at the end) and everything that body depends on is carried
//! along: numbering definitions, styles, footnotes, endnotes, images and
//! other related parts, each under identifiers that cannot collide with the
//! base's own.
//!
//! ## Quick Start
//!
//! ```no_run
//! use docxmerge::{merge_files, MergeOptions};
//!
//! let options = MergeOptions::new().with_insert_at_end(true);
//! let merged = merge_files(&["cover.docx", "chapter1.docx", "chapter2.docx"], &options)?;
//! std::fs::write("book.docx", merged)?;
//! # Ok::<(), docxmerge::Error>(())
//! ```
//!
//! ## Pattern insertion with logging
//!
//! ```no_run
//! use docxmerge::{merge_with_report, LogLevel, MergeOptions};
//!
//! let template = std::fs::read("template.docx")?;
//! let section = std::fs::read("section.docx")?;
//!
//! let options = MergeOptions::new()
//!     .with_pattern("{{CONTENT}}")
//!     .with_log(|message, level| {
//!         if level == LogLevel::Warn {
//!             eprintln!("warning: {}", message);
//!         }
//!     });
//!
//! let (merged, report) = merge_with_report(&[template, section], &options)?;
//! println!("{}", report.to_json(docxmerge::JsonFormat::Pretty)?);
//! # Ok::<(), docxmerge::Error>(())
//! ```
//!
//! ## Features
//!
//! - `async`: `merge_files_async`, reading inputs with Tokio

pub mod container;
pub mod docx;
pub mod error;
pub mod options;
pub mod report;
pub mod xml;

// Re-exports
pub use container::Package;
pub use docx::{DocxMerger, MergeStage, PackageSummary};
pub use error::{Error, Result};
pub use options::{LogCallback, LogLevel, MergeOptions};
pub use report::{JsonFormat, MergeReport};

use std::path::Path;

/// Merge DOCX packages held in memory.
///
/// `sources[0]` is the base; the rest are inserted in order.
///
/// # Example
///
/// ```no_run
/// use docxmerge::{merge, MergeOptions};
///
/// let base = std::fs::read("base.docx")?;
/// let extra = std::fs::read("extra.docx")?;
/// let merged = merge(&[base, extra], &MergeOptions::new().with_insert_at_end(true))?;
/// # Ok::<(), docxmerge::Error>(())
/// ```
pub fn merge<S: AsRef<[u8]>>(sources: &[S], options: &MergeOptions) -> Result<Vec<u8>> {
    merge_with_report(sources, options).map(|(bytes, _)| bytes)
}

/// Merge DOCX packages and return the merge report alongside the output.
pub fn merge_with_report<S: AsRef<[u8]>>(
    sources: &[S],
    options: &MergeOptions,
) -> Result<(Vec<u8>, MergeReport)> {
    DocxMerger::new(options).merge(sources)
}

/// Merge DOCX files read from disk.
pub fn merge_files<P: AsRef<Path>>(paths: &[P], options: &MergeOptions) -> Result<Vec<u8>> {
    options.validate(paths.len())?;
    let sources = paths
        .iter()
        .map(|p| std::fs::read(p.as_ref()).map_err(Error::from))
        .collect::<Result<Vec<_>>>()?;
    merge(&sources, options)
}

/// Merge DOCX files, reading them asynchronously.
///
/// The merge itself runs synchronously once every input is in memory.
#[cfg(feature = "async")]
pub async fn merge_files_async<P: AsRef<Path>>(
    paths: &[P],
    options: &MergeOptions,
) -> Result<Vec<u8>> {
    options.validate(paths.len())?;
    let mut sources = Vec::with_capacity(paths.len());
    for path in paths {
        sources.push(tokio::fs::read(path.as_ref()).await?);
    }
    merge(&sources, options)
}

/// Summarize a DOCX file.
pub fn inspect_file(path: impl AsRef<Path>) -> Result<PackageSummary> {
    PackageSummary::from_package(&Package::open(path)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_merge_validates_before_io() {
        let err = merge_files(&["does-not-exist.docx"], &MergeOptions::new()).unwrap_err();
        assert!(matches!(err, Error::InsufficientSources(1)));

        let err = merge_files(&["a.docx", "b.docx"], &MergeOptions::new()).unwrap_err();
        assert!(matches!(err, Error::NoInsertionMode));
    }

    #[test]
    fn test_corrupt_input_aborts() {
        let options = MergeOptions::new().with_insert_at_end(true);
        let err = merge(&[b"not a zip".to_vec(), b"nope".to_vec()], &options).unwrap_err();
        assert!(matches!(err, Error::CorruptContainer(_)));
    }
}
