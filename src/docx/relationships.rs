//! Relationship (`.rels`) parts.

use crate::container::Package;
use crate::error::{Error, Result};
use crate::xml::{Element, XmlDocument};

use super::{rel_type_is, PACKAGE_RELS_NS};

/// A relationship entry from a .rels file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Relationship {
    /// Relationship ID (e.g., "rId1")
    pub id: String,
    /// Relationship type URI
    pub rel_type: String,
    /// Target path (relative or absolute) or URL
    pub target: String,
    /// Whether the target is external (`TargetMode="External"`)
    pub external: bool,
}

/// The relationships owned by one part, in file order.
#[derive(Debug, Clone, Default)]
pub struct RelationshipSet {
    entries: Vec<Relationship>,
}

impl RelationshipSet {
    /// Create a new empty relationship set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Load the relationships of `part_path`; a missing .rels file yields an
    /// empty set.
    pub fn load(package: &Package, part_path: &str) -> Result<Self> {
        match package.part(&Package::rels_path_for(part_path)) {
            Some(bytes) => Self::parse(bytes),
            None => Ok(Self::new()),
        }
    }

    /// Parse a relationships file.
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        let content = crate::container::decode_xml_bytes(bytes)?;
        if content.trim().is_empty() {
            return Ok(Self::new());
        }

        let mut rels = Self::new();
        let mut reader = quick_xml::Reader::from_str(&content);
        reader.config_mut().trim_text(true);

        loop {
            match reader.read_event() {
                Ok(quick_xml::events::Event::Empty(e)) | Ok(quick_xml::events::Event::Start(e))
                    if e.local_name().as_ref() == b"Relationship" =>
                {
                    let mut id = String::new();
                    let mut rel_type = String::new();
                    let mut target = String::new();
                    let mut external = false;

                    for attr in e.attributes().flatten() {
                        let value = attr
                            .unescape_value()
                            .map_err(|e| Error::MalformedXml(e.to_string()))?
                            .into_owned();
                        match attr.key.as_ref() {
                            b"Id" => id = value,
                            b"Type" => rel_type = value,
                            b"Target" => target = value,
                            b"TargetMode" => external = value.eq_ignore_ascii_case("external"),
                            _ => {}
                        }
                    }

                    if !id.is_empty() {
                        rels.entries.push(Relationship {
                            id,
                            rel_type,
                            target,
                            external,
                        });
                    }
                }
                Ok(quick_xml::events::Event::Eof) => break,
                Err(e) => return Err(Error::MalformedXml(e.to_string())),
                _ => {}
            }
        }

        Ok(rels)
    }

    /// Get a relationship by ID.
    pub fn get(&self, id: &str) -> Option<&Relationship> {
        self.entries.iter().find(|r| r.id == id)
    }

    /// Iterate relationships in file order.
    pub fn iter(&self) -> impl Iterator<Item = &Relationship> {
        self.entries.iter()
    }

    /// Number of relationships.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the set is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Find an entry with the same (type, target, mode) triple.
    pub fn find(&self, rel_type: &str, target: &str, external: bool) -> Option<&Relationship> {
        self.entries
            .iter()
            .find(|r| r.rel_type == rel_type && r.target == target && r.external == external)
    }

    /// First relationship whose type URI ends in `/suffix`.
    pub fn find_by_type(&self, suffix: &str) -> Option<&Relationship> {
        self.entries.iter().find(|r| rel_type_is(&r.rel_type, suffix))
    }

    /// Next free `rId<N>`, one past the highest numeric suffix present.
    ///
    /// Recomputed on every call so consecutive allocations never collide.
    pub fn next_id(&self) -> String {
        let max = self
            .entries
            .iter()
            .filter_map(|r| r.id.strip_prefix("rId"))
            .filter_map(|n| n.parse::<u32>().ok())
            .max()
            .unwrap_or(0);

        let mut n = max + 1;
        loop {
            let candidate = format!("rId{}", n);
            if self.get(&candidate).is_none() {
                return candidate;
            }
            n += 1;
        }
    }

    /// Add a relationship under a freshly allocated ID.
    pub fn add(&mut self, rel_type: &str, target: &str, external: bool) -> String {
        let id = self.next_id();
        self.entries.push(Relationship {
            id: id.clone(),
            rel_type: rel_type.to_string(),
            target: target.to_string(),
            external,
        });
        id
    }

    /// Return the ID of an equivalent entry, adding one if none exists.
    pub fn find_or_add(&mut self, rel_type: &str, target: &str, external: bool) -> String {
        match self.find(rel_type, target, external) {
            Some(existing) => existing.id.clone(),
            None => self.add(rel_type, target, external),
        }
    }

    /// Serialize as a `.rels` part.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut root = Element::new("Relationships", PACKAGE_RELS_NS).with_attr(
            "xmlns",
            Some(crate::xml::XMLNS_NS),
            PACKAGE_RELS_NS,
        );

        for rel in &self.entries {
            let mut el = Element::new("Relationship", PACKAGE_RELS_NS)
                .with_attr("Id", None, rel.id.as_str())
                .with_attr("Type", None, rel.rel_type.as_str())
                .with_attr("Target", None, rel.target.as_str());
            if rel.external {
                el = el.with_attr("TargetMode", None, "External");
            }
            root = root.with_child(el);
        }

        XmlDocument::new(root).to_bytes()
    }
}
