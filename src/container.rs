//! ZIP container abstraction for OOXML packages.

use crate::error::{Error, Result};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufReader, Cursor, Read, Write};
use std::path::Path;

/// Name of the content-types part, always written first.
pub const CONTENT_TYPES_PART: &str = "[Content_Types].xml";

/// Fix XML encoding declaration from UTF-16 to UTF-8.
///
/// When we decode UTF-16 XML to a Rust String (UTF-8), the XML declaration
/// still says encoding="UTF-16". This causes quick-xml to fail when it tries
/// to re-interpret the already-decoded UTF-8 string as UTF-16.
fn fix_xml_encoding_declaration(content: &str) -> String {
    if content.starts_with("<?xml") {
        if let Some(end_decl) = content.find("?>") {
            let decl = &content[..end_decl + 2];
            let rest = &content[end_decl + 2..];

            let fixed_decl = decl
                .replace("encoding=\"UTF-16\"", "encoding=\"UTF-8\"")
                .replace("encoding='UTF-16'", "encoding='UTF-8'")
                .replace("encoding=\"utf-16\"", "encoding=\"UTF-8\"")
                .replace("encoding='utf-16'", "encoding='UTF-8'");

            return format!("{}{}", fixed_decl, rest);
        }
    }
    content.to_string()
}

/// Decode XML bytes handling different encodings (UTF-8, UTF-16 LE/BE).
///
/// OOXML files are typically UTF-8 encoded, but some (especially older
/// or non-standard documents) may use UTF-16 encoding.
pub fn decode_xml_bytes(bytes: &[u8]) -> Result<String> {
    if bytes.starts_with(&[0xEF, 0xBB, 0xBF]) {
        return String::from_utf8(bytes[3..].to_vec())
            .map_err(|e| Error::MalformedXml(format!("invalid UTF-8: {}", e)));
    }

    if bytes.starts_with(&[0xFF, 0xFE]) {
        let content = decode_utf16(&bytes[2..], u16::from_le_bytes)?;
        return Ok(fix_xml_encoding_declaration(&content));
    }

    if bytes.starts_with(&[0xFE, 0xFF]) {
        let content = decode_utf16(&bytes[2..], u16::from_be_bytes)?;
        return Ok(fix_xml_encoding_declaration(&content));
    }

    // No BOM - try UTF-8 first, then attempt UTF-16 detection
    match String::from_utf8(bytes.to_vec()) {
        Ok(s) => Ok(s),
        Err(e) => {
            // UTF-16 LE has null bytes in odd positions for ASCII
            if bytes.len() >= 4 && bytes[1] == 0 && bytes[3] == 0 {
                decode_utf16(bytes, u16::from_le_bytes).map(|s| fix_xml_encoding_declaration(&s))
            } else if bytes.len() >= 4 && bytes[0] == 0 && bytes[2] == 0 {
                decode_utf16(bytes, u16::from_be_bytes).map(|s| fix_xml_encoding_declaration(&s))
            } else {
                Err(Error::MalformedXml(format!("invalid UTF-8: {}", e)))
            }
        }
    }
}

fn decode_utf16(bytes: &[u8], unit: fn([u8; 2]) -> u16) -> Result<String> {
    // Ensure even number of bytes
    let len = bytes.len() & !1;

    let u16_iter = (0..len)
        .step_by(2)
        .map(|i| unit([bytes[i], bytes[i + 1]]));

    char::decode_utf16(u16_iter)
        .collect::<std::result::Result<String, _>>()
        .map_err(|e| Error::MalformedXml(format!("invalid UTF-16: {}", e)))
}

/// An OOXML package held fully in memory.
///
/// Parts are keyed by their ZIP entry name (no leading slash). The base
/// package of a merge is mutated in place; source packages are only read.
#[derive(Clone, Default)]
pub struct Package {
    parts: BTreeMap<String, Vec<u8>>,
}

impl Package {
    /// Open a package from a file path.
    ///
    /// # Example
    ///
    /// ```no_run
    /// use docxmerge::container::Package;
    ///
    /// let package = Package::open("document.docx")?;
    /// assert!(package.exists("word/document.xml"));
    /// # Ok::<(), docxmerge::Error>(())
    /// ```
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let file = File::open(path.as_ref())?;
        let mut reader = BufReader::new(file);
        let mut data = Vec::new();
        reader.read_to_end(&mut data)?;
        Self::from_bytes(&data)
    }

    /// Load every part of a ZIP container into memory.
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        let mut archive = zip::ZipArchive::new(Cursor::new(data))?;

        let mut parts = BTreeMap::new();
        for i in 0..archive.len() {
            let mut file = archive.by_index(i)?;
            if file.is_dir() {
                continue;
            }
            let name = file.name().trim_start_matches('/').to_string();
            let mut buf = Vec::with_capacity(file.size() as usize);
            file.read_to_end(&mut buf)
                .map_err(|e| Error::CorruptContainer(format!("{}: {}", name, e)))?;
            parts.insert(name, buf);
        }

        Ok(Self { parts })
    }

    /// Raw bytes of a part.
    pub fn part(&self, path: &str) -> Option<&[u8]> {
        self.parts
            .get(path.trim_start_matches('/'))
            .map(Vec::as_slice)
    }

    /// Raw bytes of a part, or `MissingComponent`.
    pub fn read_part(&self, path: &str) -> Result<&[u8]> {
        self.part(path)
            .ok_or_else(|| Error::MissingComponent(path.to_string()))
    }

    /// Read an XML part as a string, decoding UTF-16 when needed.
    pub fn read_xml(&self, path: &str) -> Result<String> {
        decode_xml_bytes(self.read_part(path)?)
    }

    /// Insert or replace a part.
    pub fn set_part(&mut self, path: impl Into<String>, bytes: Vec<u8>) {
        let path = path.into();
        let path = path.trim_start_matches('/').to_string();
        self.parts.insert(path, bytes);
    }

    /// Check if a part exists.
    pub fn exists(&self, path: &str) -> bool {
        self.parts.contains_key(path.trim_start_matches('/'))
    }

    /// All part names.
    pub fn part_names(&self) -> impl Iterator<Item = &str> {
        self.parts.keys().map(String::as_str)
    }

    /// Part names starting with `prefix`.
    pub fn part_names_with_prefix<'a>(&'a self, prefix: &'a str) -> impl Iterator<Item = &'a str> {
        self.part_names().filter(move |n| n.starts_with(prefix))
    }

    /// Number of parts.
    pub fn len(&self) -> usize {
        self.parts.len()
    }

    /// Whether the package has no parts.
    pub fn is_empty(&self) -> bool {
        self.parts.is_empty()
    }

    /// First free part name for `path`.
    ///
    /// Returns `path` itself when unused, otherwise appends `_1`, `_2`, ...
    /// to the file stem until no existing part occupies the candidate.
    pub fn unique_part_name(&self, path: &str) -> String {
        let path = path.trim_start_matches('/');
        if !self.exists(path) {
            return path.to_string();
        }

        let (dir, file) = match path.rsplit_once('/') {
            Some((dir, file)) => (format!("{}/", dir), file),
            None => (String::new(), path),
        };
        let (stem, ext) = match file.rsplit_once('.') {
            Some((stem, ext)) if !stem.is_empty() => (stem, format!(".{}", ext)),
            _ => (file, String::new()),
        };

        let mut n = 1;
        loop {
            let candidate = format!("{}{}_{}{}", dir, stem, n, ext);
            if !self.exists(&candidate) {
                return candidate;
            }
            n += 1;
        }
    }

    /// Serialize the package to ZIP bytes, `[Content_Types].xml` first.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut zip = zip::ZipWriter::new(Cursor::new(Vec::new()));
        let options = zip::write::SimpleFileOptions::default()
            .compression_method(zip::CompressionMethod::Deflated);

        let ordered = self
            .parts
            .iter()
            .filter(|(name, _)| name.as_str() == CONTENT_TYPES_PART)
            .chain(
                self.parts
                    .iter()
                    .filter(|(name, _)| name.as_str() != CONTENT_TYPES_PART),
            );

        for (name, bytes) in ordered {
            zip.start_file(name.as_str(), options)
                .map_err(|e| Error::Container(e.to_string()))?;
            zip.write_all(bytes)?;
        }

        let cursor = zip.finish().map_err(|e| Error::Container(e.to_string()))?;
        Ok(cursor.into_inner())
    }

    /// Part path of the relationships file belonging to `part_path`.
    pub fn rels_path_for(part_path: &str) -> String {
        let part_path = part_path.trim_start_matches('/');
        if part_path.is_empty() {
            return "_rels/.rels".to_string();
        }
        match part_path.rsplit_once('/') {
            Some((dir, file)) => format!("{}/_rels/{}.rels", dir, file),
            None => format!("_rels/{}.rels", part_path),
        }
    }

    /// Resolve a relationship target relative to the part that owns it.
    pub fn resolve_path(base: &str, relative: &str) -> String {
        if let Some(stripped) = relative.strip_prefix('/') {
            return stripped.to_string();
        }

        let mut result: Vec<&str> = base.split('/').collect();
        result.pop();
        for component in relative.split(['/', '\\']) {
            match component {
                ".." => {
                    result.pop();
                }
                "." | "" => {}
                c => result.push(c),
            }
        }

        result.join("/")
    }

    /// Express `target_part` as a relationship target from `source_part`.
    ///
    /// Targets inside the source part's folder become relative; anything else
    /// is written as an absolute part name.
    pub fn relative_target(source_part: &str, target_part: &str) -> String {
        let target_part = target_part.trim_start_matches('/');
        let dir = match source_part.trim_start_matches('/').rsplit_once('/') {
            Some((dir, _)) => format!("{}/", dir),
            None => String::new(),
        };
        match target_part.strip_prefix(dir.as_str()) {
            Some(rest) if !dir.is_empty() => rest.to_string(),
            _ if dir.is_empty() => target_part.to_string(),
            _ => format!("/{}", target_part),
        }
    }
}

impl std::fmt::Debug for Package {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Package")
            .field("parts", &self.parts.len())
            .finish()
    }
}
