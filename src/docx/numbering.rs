//! Numbering (list definition) merge.
//!
//! `numbering.xml` holds two linked tables: `w:abstractNum` definitions with
//! the level formatting, and `w:num` instances that each point at one
//! abstract definition. Body paragraphs reference instances through
//! `w:numPr/w:numId`.

use crate::xml::{Element, Node, XmlDocument};

use super::ids::{parse_id, IdAllocator, IdMap};
use super::W_NS;

/// Outcome of merging one source numbering table.
#[derive(Debug, Clone, Default)]
pub struct NumberingMerge {
    /// Source `numId` → merged `numId`
    pub num_map: IdMap,
    pub abstracts_added: usize,
    pub nums_added: usize,
    /// Source instances skipped because their abstract definition is missing
    pub orphaned: Vec<String>,
}

/// The base document's numbering part with its ID counters.
#[derive(Debug, Clone)]
pub struct NumberingTable {
    pub doc: XmlDocument,
    abstract_ids: IdAllocator,
    num_ids: IdAllocator,
}

fn abstract_id_of(el: &Element) -> Option<i64> {
    el.attr(W_NS, "abstractNumId").and_then(parse_id)
}

fn num_id_of(el: &Element) -> Option<i64> {
    el.attr(W_NS, "numId").and_then(parse_id)
}

impl NumberingTable {
    /// Wrap a numbering part, seeding both counters from its maximum IDs.
    pub fn new(doc: XmlDocument) -> Self {
        let abstract_ids = IdAllocator::seeded(
            doc.root
                .children_named(W_NS, "abstractNum")
                .filter_map(abstract_id_of),
            -1,
        );
        let num_ids = IdAllocator::seeded(
            doc.root.children_named(W_NS, "num").filter_map(num_id_of),
            0,
        );
        Self {
            doc,
            abstract_ids,
            num_ids,
        }
    }

    /// Instance IDs present in the table.
    pub fn num_ids(&self) -> Vec<String> {
        self.doc
            .root
            .children_named(W_NS, "num")
            .filter_map(|n| n.attr(W_NS, "numId"))
            .map(str::to_string)
            .collect()
    }

    /// Abstract definition referenced by instance `num_id`.
    pub fn abstract_for(&self, num_id: &str) -> Option<&str> {
        self.doc
            .root
            .children_named(W_NS, "num")
            .find(|n| n.attr(W_NS, "numId") == Some(num_id))
            .and_then(|n| n.child(W_NS, "abstractNumId"))
            .and_then(|a| a.attr(W_NS, "val"))
    }

    /// Whether an abstract definition with this ID exists.
    pub fn has_abstract(&self, abstract_id: &str) -> bool {
        self.doc
            .root
            .children_named(W_NS, "abstractNum")
            .any(|a| a.attr(W_NS, "abstractNumId") == Some(abstract_id))
    }

    /// Copy every definition of `source` into this table under fresh IDs.
    pub fn merge(&mut self, source: &XmlDocument) -> NumberingMerge {
        let mut result = NumberingMerge::default();
        let mut abstract_map = IdMap::new();

        for abs in source.root.children_named(W_NS, "abstractNum") {
            let Some(old) = abs.attr(W_NS, "abstractNumId") else {
                continue;
            };
            let new_id = self.abstract_ids.allocate().to_string();
            let mut copy = abs.clone();
            copy.set_attr(W_NS, "abstractNumId", new_id.as_str());
            abstract_map.insert(old.to_string(), new_id);
            self.insert_abstract(copy);
            result.abstracts_added += 1;
        }

        for num in source.root.children_named(W_NS, "num") {
            let Some(old) = num.attr(W_NS, "numId") else {
                continue;
            };
            let mapped_abstract = num
                .child(W_NS, "abstractNumId")
                .and_then(|a| a.attr(W_NS, "val"))
                .and_then(|val| abstract_map.get(val));
            let Some(mapped_abstract) = mapped_abstract.cloned() else {
                result.orphaned.push(old.to_string());
                continue;
            };

            let new_id = self.num_ids.allocate().to_string();
            let mut copy = num.clone();
            copy.set_attr(W_NS, "numId", new_id.as_str());
            if let Some(link) = copy.child_mut(W_NS, "abstractNumId") {
                link.set_attr(W_NS, "val", mapped_abstract);
            }
            result.num_map.insert(old.to_string(), new_id);
            self.insert_num(copy);
            result.nums_added += 1;
        }

        result
    }

    fn position_of_last(&self, local: &str) -> Option<usize> {
        self.doc
            .root
            .children
            .iter()
            .rposition(|n| n.as_element().is_some_and(|e| e.is(W_NS, local)))
    }

    fn position_of_first(&self, local: &str) -> Option<usize> {
        self.doc
            .root
            .children
            .iter()
            .position(|n| n.as_element().is_some_and(|e| e.is(W_NS, local)))
    }

    /// Abstract definitions go after the existing ones and before any instance.
    fn insert_abstract(&mut self, el: Element) {
        let at = self
            .position_of_last("abstractNum")
            .map(|i| i + 1)
            .or_else(|| self.position_of_first("num"))
            .or_else(|| self.position_of_first("numIdMacAtCleanup"))
            .unwrap_or(self.doc.root.children.len());
        self.doc.root.children.insert(at, Node::Element(el));
    }

    fn insert_num(&mut self, el: Element) {
        let at = self
            .position_of_last("num")
            .map(|i| i + 1)
            .or_else(|| self.position_of_first("numIdMacAtCleanup"))
            .unwrap_or(self.doc.root.children.len());
        self.doc.root.children.insert(at, Node::Element(el));
    }
}

/// Rewrite every `w:numId/@w:val` under `root` through `map`.
///
/// `0` (numbering removed) is left alone; values with no mapping are set to
/// `0`. Returns the values that had no mapping.
pub fn remap_num_ids(root: &mut Element, map: &IdMap) -> Vec<String> {
    let mut dangling = Vec::new();
    root.walk_mut(&mut |el: &mut Element| {
        if !el.is(W_NS, "numId") {
            return;
        }
        let Some(old) = el.attr(W_NS, "val").map(str::to_string) else {
            return;
        };
        if old == "0" {
            return;
        }
        match map.get(&old) {
            Some(new_id) => el.set_attr(W_NS, "val", new_id.as_str()),
            None => {
                el.set_attr(W_NS, "val", "0");
                dangling.push(old);
            }
        }
    });
    dangling
}

#[cfg(test)]
mod tests {
    use super::*;

    fn numbering(body: &str) -> XmlDocument {
        XmlDocument::parse_str(&format!(
            r#"<w:numbering xmlns:w="{W_NS}">{body}</w:numbering>"#
        ))
        .unwrap()
    }

    const BASE: &str = r#"<w:abstractNum w:abstractNumId="0"><w:lvl w:ilvl="0"/></w:abstractNum><w:abstractNum w:abstractNumId="3"/><w:num w:numId="1"><w:abstractNumId w:val="0"/></w:num><w:num w:numId="2"><w:abstractNumId w:val="3"/></w:num><w:numIdMacAtCleanup w:val="2"/>"#;

    const SOURCE: &str = r#"<w:abstractNum w:abstractNumId="0"><w:lvl w:ilvl="0"><w:numFmt w:val="bullet"/></w:lvl></w:abstractNum><w:num w:numId="1"><w:abstractNumId w:val="0"/></w:num><w:num w:numId="5"><w:abstractNumId w:val="9"/></w:num>"#;

    #[test]
    fn test_merge_allocates_fresh_ids() {
        let mut table = NumberingTable::new(numbering(BASE));
        let result = table.merge(&numbering(SOURCE));

        assert_eq!(result.abstracts_added, 1);
        assert_eq!(result.nums_added, 1);
        assert_eq!(result.num_map.get("1").map(String::as_str), Some("3"));
        assert_eq!(result.orphaned, vec!["5".to_string()]);

        assert_eq!(table.abstract_for("3"), Some("4"));
        assert!(table.has_abstract("4"));
        assert_eq!(table.num_ids(), vec!["1", "2", "3"]);
    }

    #[test]
    fn test_schema_order_is_kept() {
        let mut table = NumberingTable::new(numbering(BASE));
        table.merge(&numbering(SOURCE));

        let order: Vec<&str> = table.doc.root.elements().map(|e| e.local_name()).collect();
        assert_eq!(
            order,
            vec!["abstractNum", "abstractNum", "abstractNum", "num", "num", "num", "numIdMacAtCleanup"]
        );
    }

    #[test]
    fn test_merge_into_empty_table() {
        let mut table = NumberingTable::new(numbering(""));
        let result = table.merge(&numbering(SOURCE));
        assert_eq!(result.num_map.get("1").map(String::as_str), Some("1"));
        assert_eq!(table.abstract_for("1"), Some("0"));
    }

    #[test]
    fn test_remap_num_ids() {
        let mut doc = XmlDocument::parse_str(&format!(
            r#"<w:body xmlns:w="{W_NS}"><w:p><w:pPr><w:numPr><w:ilvl w:val="0"/><w:numId w:val="1"/></w:numPr></w:pPr></w:p><w:p><w:pPr><w:numPr><w:numId w:val="0"/></w:numPr></w:pPr></w:p><w:p><w:pPr><w:numPr><w:numId w:val="7"/></w:numPr></w:pPr></w:p></w:body>"#
        ))
        .unwrap();

        let map = IdMap::from([("1".to_string(), "12".to_string())]);
        let dangling = remap_num_ids(&mut doc.root, &map);
        assert_eq!(dangling, vec!["7".to_string()]);

        let vals: Vec<_> = doc
            .root
            .descendants(W_NS, "numId")
            .iter()
            .filter_map(|n| n.attr(W_NS, "val"))
            .map(str::to_string)
            .collect();
        assert_eq!(vals, vec!["12", "0", "0"]);
    }
}
