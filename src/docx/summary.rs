//! Package overview used by the `inspect` command.

use serde::Serialize;

use crate::container::Package;
use crate::error::{Error, Result};
use crate::xml::XmlDocument;

use super::relationships::RelationshipSet;
use super::{locate_main_part, locate_part, splice, PartKind, W_NS};

/// What a DOCX package contains, as far as merging is concerned.
#[derive(Debug, Clone, Default, Serialize)]
pub struct PackageSummary {
    pub main_part: String,
    pub parts: Vec<String>,
    pub relationships: usize,
    pub paragraphs: usize,
    pub tables: usize,
    pub styles: usize,
    pub fonts: usize,
    pub abstract_numbering: usize,
    pub numbering_instances: usize,
    pub footnotes: usize,
    pub endnotes: usize,
    pub media: usize,
}

impl PackageSummary {
    /// Summarize a DOCX held in memory.
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        Self::from_package(&Package::from_bytes(data)?)
    }

    /// Summarize an opened package.
    pub fn from_package(package: &Package) -> Result<Self> {
        let main_part = locate_main_part(package)?;
        let document = XmlDocument::parse(package.read_part(&main_part)?)?;
        let body = splice::body(&document)
            .ok_or_else(|| Error::MissingComponent(format!("w:body in {}", main_part)))?;
        let rels = RelationshipSet::load(package, &main_part)?;

        let count = |kind: PartKind, local: &str| -> Result<usize> {
            match locate_part(package, &rels, &main_part, kind) {
                Some(path) => {
                    let doc = XmlDocument::parse(package.read_part(&path)?)?;
                    Ok(doc.root.children_named(W_NS, local).count())
                }
                None => Ok(0),
            }
        };

        Ok(Self {
            parts: package.part_names().map(str::to_string).collect(),
            relationships: rels.len(),
            paragraphs: body.descendants(W_NS, "p").len(),
            tables: body.descendants(W_NS, "tbl").len(),
            styles: count(PartKind::Styles, "style")?,
            fonts: count(PartKind::FontTable, "font")?,
            abstract_numbering: count(PartKind::Numbering, "abstractNum")?,
            numbering_instances: count(PartKind::Numbering, "num")?,
            footnotes: count(PartKind::Footnotes, "footnote")?,
            endnotes: count(PartKind::Endnotes, "endnote")?,
            media: package.part_names_with_prefix("word/media/").count(),
            main_part,
        })
    }
}
