//! `[Content_Types].xml` handling.

use crate::error::Result;
use crate::xml::{Element, XmlDocument, XMLNS_NS};

use super::CONTENT_TYPES_NS;

/// Media type for a file extension, used when a source package does not
/// declare one.
pub fn media_type_for_extension(ext: &str) -> &'static str {
    match ext.to_ascii_lowercase().as_str() {
        "png" => "image/png",
        "jpg" | "jpeg" | "jpe" => "image/jpeg",
        "gif" => "image/gif",
        "bmp" => "image/bmp",
        "tif" | "tiff" => "image/tiff",
        "emf" => "image/x-emf",
        "wmf" => "image/x-wmf",
        "svg" => "image/svg+xml",
        "webp" => "image/webp",
        "ico" => "image/x-icon",
        "wdp" => "image/vnd.ms-photo",
        "mp3" => "audio/mpeg",
        "wav" => "audio/wav",
        "mp4" => "video/mp4",
        "xml" => "application/xml",
        "rels" => "application/vnd.openxmlformats-package.relationships+xml",
        _ => "application/octet-stream",
    }
}

/// Extension of a part name, without the dot.
pub fn extension_of(part: &str) -> Option<&str> {
    let file = part.rsplit('/').next().unwrap_or(part);
    file.rsplit_once('.').map(|(_, ext)| ext).filter(|e| !e.is_empty())
}

fn normalize_part_name(part: &str) -> String {
    format!("/{}", part.trim_start_matches('/'))
}

/// Default and Override declarations of a package.
#[derive(Debug, Clone, Default)]
pub struct ContentTypes {
    defaults: Vec<(String, String)>,
    overrides: Vec<(String, String)>,
}

impl ContentTypes {
    /// Parse `[Content_Types].xml`.
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        let doc = XmlDocument::parse(bytes)?;
        let mut types = Self::default();

        for el in doc.root.elements() {
            let content_type = el
                .attr(CONTENT_TYPES_NS, "ContentType")
                .unwrap_or_default()
                .to_string();
            match el.local_name() {
                "Default" => {
                    if let Some(ext) = el.attr(CONTENT_TYPES_NS, "Extension") {
                        types.defaults.push((ext.to_string(), content_type));
                    }
                }
                "Override" => {
                    if let Some(part) = el.attr(CONTENT_TYPES_NS, "PartName") {
                        types.overrides.push((part.to_string(), content_type));
                    }
                }
                _ => {}
            }
        }

        Ok(types)
    }

    /// Default content type registered for an extension.
    pub fn default_for(&self, ext: &str) -> Option<&str> {
        self.defaults
            .iter()
            .find(|(e, _)| e.eq_ignore_ascii_case(ext))
            .map(|(_, ct)| ct.as_str())
    }

    /// Override registered for a part name.
    pub fn override_for(&self, part: &str) -> Option<&str> {
        let part = normalize_part_name(part);
        self.overrides
            .iter()
            .find(|(p, _)| p.eq_ignore_ascii_case(&part))
            .map(|(_, ct)| ct.as_str())
    }

    /// Effective content type of a part (override first, then default).
    pub fn content_type_for(&self, part: &str) -> Option<&str> {
        self.override_for(part)
            .or_else(|| extension_of(part).and_then(|ext| self.default_for(ext)))
    }

    /// Register a Default for `ext` unless one exists. Returns whether it was added.
    pub fn ensure_default(&mut self, ext: &str, content_type: &str) -> bool {
        if self.default_for(ext).is_some() {
            return false;
        }
        self.defaults
            .push((ext.to_ascii_lowercase(), content_type.to_string()));
        true
    }

    /// Register an Override for `part` unless one exists. Returns whether it was added.
    pub fn ensure_override(&mut self, part: &str, content_type: &str) -> bool {
        if self.override_for(part).is_some() {
            return false;
        }
        self.overrides
            .push((normalize_part_name(part), content_type.to_string()));
        true
    }

    /// Serialize as `[Content_Types].xml`.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut root = Element::new("Types", CONTENT_TYPES_NS).with_attr(
            "xmlns",
            Some(XMLNS_NS),
            CONTENT_TYPES_NS,
        );
        for (ext, ct) in &self.defaults {
            root = root.with_child(
                Element::new("Default", CONTENT_TYPES_NS)
                    .with_attr("Extension", None, ext.as_str())
                    .with_attr("ContentType", None, ct.as_str()),
            );
        }
        for (part, ct) in &self.overrides {
            root = root.with_child(
                Element::new("Override", CONTENT_TYPES_NS)
                    .with_attr("PartName", None, part.as_str())
                    .with_attr("ContentType", None, ct.as_str()),
            );
        }
        XmlDocument::new(root).to_bytes()
    }
}
