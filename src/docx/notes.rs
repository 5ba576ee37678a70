//! Footnote and endnote merge.

use crate::error::Result;
use crate::xml::{Element, Node, XmlDocument};

use super::ids::{parse_id, IdAllocator, IdMap};
use super::{PartKind, W_NS};

/// Note types that are layout markers rather than content.
const RESERVED_TYPES: &[&str] = &["separator", "continuationSeparator", "continuationNotice"];

/// Footnotes or endnotes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NoteKind {
    Footnote,
    Endnote,
}

impl NoteKind {
    /// Local name of a note element.
    pub fn element_name(self) -> &'static str {
        match self {
            NoteKind::Footnote => "footnote",
            NoteKind::Endnote => "endnote",
        }
    }

    /// Local name of the body element referencing a note.
    pub fn reference_name(self) -> &'static str {
        match self {
            NoteKind::Footnote => "footnoteReference",
            NoteKind::Endnote => "endnoteReference",
        }
    }

    pub fn part_kind(self) -> PartKind {
        match self {
            NoteKind::Footnote => PartKind::Footnotes,
            NoteKind::Endnote => PartKind::Endnotes,
        }
    }
}

/// Whether a note is a separator marker that is never copied or renumbered.
fn is_reserved(note: &Element) -> bool {
    let negative = note
        .attr(W_NS, "id")
        .and_then(parse_id)
        .is_some_and(|id| id < 0);
    let marker = note
        .attr(W_NS, "type")
        .is_some_and(|t| RESERVED_TYPES.contains(&t));
    negative || marker
}

/// Outcome of merging one source notes part.
#[derive(Debug, Clone, Default)]
pub struct NotesMerge {
    /// Source note ID → merged note ID (reserved IDs map to themselves)
    pub id_map: IdMap,
    pub added: usize,
}

/// The base document's footnotes or endnotes part.
#[derive(Debug, Clone)]
pub struct NotesPart {
    pub kind: NoteKind,
    pub doc: XmlDocument,
    ids: IdAllocator,
}

impl NotesPart {
    /// Wrap a notes part; new IDs start after the highest non-negative one.
    pub fn new(kind: NoteKind, doc: XmlDocument) -> Self {
        let ids = IdAllocator::seeded(
            doc.root
                .children_named(W_NS, kind.element_name())
                .filter_map(|n| n.attr(W_NS, "id").and_then(parse_id))
                .filter(|id| *id >= 0),
            0,
        );
        Self { kind, doc, ids }
    }

    /// IDs of every note in the part.
    pub fn note_ids(&self) -> Vec<String> {
        self.doc
            .root
            .children_named(W_NS, self.kind.element_name())
            .filter_map(|n| n.attr(W_NS, "id"))
            .map(str::to_string)
            .collect()
    }

    /// Append every content note of `source` under a fresh ID.
    ///
    /// `rewrite` runs on each copy before it is appended, so references
    /// inside the note can be re-pointed at the base package.
    pub fn merge(
        &mut self,
        source: &XmlDocument,
        rewrite: &mut dyn FnMut(&mut Element) -> Result<()>,
    ) -> Result<NotesMerge> {
        let mut result = NotesMerge::default();

        for note in source.root.children_named(W_NS, self.kind.element_name()) {
            let Some(old) = note.attr(W_NS, "id") else {
                continue;
            };
            if is_reserved(note) {
                result.id_map.insert(old.to_string(), old.to_string());
                continue;
            }

            let new_id = self.ids.allocate().to_string();
            let mut copy = note.clone();
            copy.set_attr(W_NS, "id", new_id.as_str());
            rewrite(&mut copy)?;

            self.doc.root.children.push(Node::Element(copy));
            result.id_map.insert(old.to_string(), new_id);
            result.added += 1;
        }

        Ok(result)
    }
}

/// Point every note reference under `root` at its merged note.
///
/// References to negative IDs are left alone. References with no merged
/// note are removed. Returns the number removed.
pub fn remap_note_references(root: &mut Element, kind: NoteKind, map: &IdMap) -> usize {
    let mut dropped = 0;
    strip_references(root, kind, map, &mut dropped);
    dropped
}

fn strip_references(el: &mut Element, kind: NoteKind, map: &IdMap, dropped: &mut usize) {
    el.children.retain_mut(|node| {
        let Node::Element(child) = node else {
            return true;
        };
        if !child.is(W_NS, kind.reference_name()) {
            return true;
        }
        let Some(old) = child.attr(W_NS, "id").map(str::to_string) else {
            return true;
        };
        if parse_id(&old).is_some_and(|id| id < 0) {
            return true;
        }
        match map.get(&old) {
            Some(new_id) => {
                child.set_attr(W_NS, "id", new_id.as_str());
                true
            }
            None => {
                *dropped += 1;
                false
            }
        }
    });

    for child in el.elements_mut() {
        strip_references(child, kind, map, dropped);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn notes(body: &str) -> XmlDocument {
        XmlDocument::parse_str(&format!(
            r#"<w:footnotes xmlns:w="{W_NS}">{body}</w:footnotes>"#
        ))
        .unwrap()
    }

    const SOURCE: &str = r#"<w:footnote w:type="separator" w:id="-1"/><w:footnote w:type="continuationSeparator" w:id="0"/><w:footnote w:id="1"><w:p><w:r><w:t>first</w:t></w:r></w:p></w:footnote><w:footnote w:id="2"><w:p><w:r><w:t>second</w:t></w:r></w:p></w:footnote>"#;

    #[test]
    fn test_merge_skips_reserved_and_renumbers() {
        let base_doc = notes(
            r#"<w:footnote w:type="separator" w:id="-1"/><w:footnote w:type="continuationSeparator" w:id="0"/><w:footnote w:id="1"/>"#,
        );
        let mut part = NotesPart::new(NoteKind::Footnote, base_doc);

        let mut seen = 0;
        let result = part
            .merge(&notes(SOURCE), &mut |_: &mut Element| -> Result<()> {
                seen += 1;
                Ok(())
            })
            .unwrap();

        assert_eq!(seen, 2);
        assert_eq!(result.added, 2);
        assert_eq!(result.id_map.get("-1").map(String::as_str), Some("-1"));
        assert_eq!(result.id_map.get("0").map(String::as_str), Some("0"));
        assert_eq!(result.id_map.get("1").map(String::as_str), Some("2"));
        assert_eq!(result.id_map.get("2").map(String::as_str), Some("3"));
        assert_eq!(part.note_ids(), vec!["-1", "0", "1", "2", "3"]);
    }

    #[test]
    fn test_merge_into_skeleton() {
        let skeleton = PartKind::Footnotes.skeleton().unwrap();
        let mut part = NotesPart::new(NoteKind::Footnote, skeleton);
        let result = part
            .merge(&notes(SOURCE), &mut |_: &mut Element| -> Result<()> { Ok(()) })
            .unwrap();
        assert_eq!(result.id_map.get("1").map(String::as_str), Some("1"));
        assert_eq!(part.note_ids(), vec!["-1", "0", "1", "2"]);
    }

    #[test]
    fn test_remap_references() {
        let mut body = XmlDocument::parse_str(&format!(
            r#"<w:body xmlns:w="{W_NS}"><w:p><w:r><w:footnoteReference w:id="1"/></w:r><w:r><w:footnoteReference w:id="8"/></w:r><w:r><w:endnoteReference w:id="1"/></w:r></w:p></w:body>"#
        ))
        .unwrap();
        let map = IdMap::from([("1".to_string(), "5".to_string())]);

        let dropped = remap_note_references(&mut body.root, NoteKind::Footnote, &map);
        assert_eq!(dropped, 1);

        let refs = body.root.descendants(W_NS, "footnoteReference");
        assert_eq!(refs.len(), 1);
        assert_eq!(refs[0].attr(W_NS, "id"), Some("5"));

        let endnote = body.root.descendants(W_NS, "endnoteReference");
        assert_eq!(endnote[0].attr(W_NS, "id"), Some("1"));
    }
}
