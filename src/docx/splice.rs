//! Body splicing: anchors, insertion and section properties.

use std::collections::BTreeSet;

use unicode_normalization::UnicodeNormalization;

use crate::xml::{Attribute, Element, Node, XmlDocument};

use super::{w_element, MC_NS, W_NS};

/// The document's `w:body`.
pub fn body(doc: &XmlDocument) -> Option<&Element> {
    doc.root.child(W_NS, "body")
}

/// The document's `w:body`, mutably.
pub fn body_mut(doc: &mut XmlDocument) -> Option<&mut Element> {
    doc.root.child_mut(W_NS, "body")
}

/// Remove the body's trailing `w:sectPr`, if the last element is one.
pub fn detach_section_properties(body: &mut Element) -> Option<Element> {
    let last = body.last_element_index()?;
    let is_sect = body.children[last]
        .as_element()
        .is_some_and(|el| el.is(W_NS, "sectPr"));
    if !is_sect {
        return None;
    }
    match body.children.remove(last) {
        Node::Element(el) => Some(el),
        _ => None,
    }
}

/// Deep copies of the body's content elements (the body-level `w:sectPr`
/// excluded).
pub fn content_nodes(body: &Element) -> Vec<Element> {
    body.elements()
        .filter(|el| !el.is(W_NS, "sectPr"))
        .cloned()
        .collect()
}

/// `<w:p><w:r><w:br w:type="page"/></w:r></w:p>`
pub fn page_break() -> Element {
    let br = w_element("br").with_attr("w:type", Some(W_NS), "page");
    w_element("p").with_child(w_element("r").with_child(br))
}

/// Concatenated `w:t` contents of a paragraph.
pub fn paragraph_text(paragraph: &Element) -> String {
    paragraph
        .descendants(W_NS, "t")
        .iter()
        .map(|t| t.text())
        .collect()
}

/// NFC form used for pattern comparison.
pub fn normalize(text: &str) -> String {
    text.nfc().collect()
}

/// Path (child indices from `body`) of the first paragraph whose text
/// contains `pattern`, searching top-level children from `from` onwards.
///
/// Paragraphs nested in tables or content controls are found too.
/// `pattern` must already be NFC-normalized.
pub fn find_anchor(body: &Element, pattern: &str, from: usize) -> Option<Vec<usize>> {
    for (i, node) in body.children.iter().enumerate().skip(from) {
        let Node::Element(el) = node else {
            continue;
        };
        if let Some(mut path) = search(el, pattern) {
            path.insert(0, i);
            return Some(path);
        }
    }
    None
}

fn search(el: &Element, pattern: &str) -> Option<Vec<usize>> {
    if el.is(W_NS, "p") {
        return normalize(&paragraph_text(el))
            .contains(pattern)
            .then(Vec::new);
    }
    for (i, node) in el.children.iter().enumerate() {
        let Node::Element(child) = node else {
            continue;
        };
        if let Some(mut path) = search(child, pattern) {
            path.insert(0, i);
            return Some(path);
        }
    }
    None
}

/// Insert `nodes` immediately before the element at `path`.
///
/// `path` is advanced past the inserted nodes so it keeps pointing at the
/// same element. Returns the number of nodes inserted.
pub fn insert_before(body: &mut Element, path: &mut [usize], nodes: Vec<Element>) -> usize {
    let Some((&mut at, parents)) = path.split_last_mut() else {
        return 0;
    };

    let mut parent = body;
    for &i in parents.iter() {
        match parent.children.get_mut(i).and_then(Node::as_element_mut) {
            Some(el) => parent = el,
            None => return 0,
        }
    }

    let count = nodes.len();
    let at = at.min(parent.children.len());
    parent
        .children
        .splice(at..at, nodes.into_iter().map(Node::Element));

    if let Some(last) = path.last_mut() {
        *last += count;
    }
    count
}

/// Outcome of [`ensure_namespaces`].
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct NamespaceImport {
    /// Prefixes newly declared on the base root
    pub added: Vec<String>,
    /// Prefixes the base root binds to a different URI than the source
    pub conflicts: Vec<String>,
}

/// Declare on `base_root` every prefix used by `nodes` that only the
/// source root declares.
///
/// Prefixes the source marks as `mc:Ignorable` stay ignorable in the base;
/// the attribute (and the `mc` binding) is created when the base has none.
/// A prefix bound differently on both roots is left as the base has it and
/// reported in [`NamespaceImport::conflicts`].
pub fn ensure_namespaces<'a>(
    base_root: &mut Element,
    source_root: &Element,
    nodes: impl IntoIterator<Item = &'a Element>,
) -> NamespaceImport {
    let mut used = BTreeSet::new();
    for node in nodes {
        node.used_prefixes(&mut used);
    }

    let source_ignorable: Vec<String> = source_root
        .attr(MC_NS, "Ignorable")
        .map(|v| v.split_whitespace().map(str::to_string).collect())
        .unwrap_or_default();

    let mut import = NamespaceImport::default();
    for prefix in used {
        let Some(uri) = source_root.declared_namespace(Some(&prefix)) else {
            continue;
        };
        if let Some(existing) = base_root.declared_namespace(Some(&prefix)) {
            if existing != uri {
                import.conflicts.push(prefix);
            }
            continue;
        }
        base_root.declare_namespace(&prefix, uri);

        if source_ignorable.contains(&prefix) {
            mark_ignorable(base_root, source_root, &prefix);
        }
        import.added.push(prefix);
    }
    import
}

fn mark_ignorable(base_root: &mut Element, source_root: &Element, prefix: &str) {
    if let Some(current) = base_root.attr(MC_NS, "Ignorable").map(str::to_string) {
        if !current.split_whitespace().any(|p| p == prefix) {
            base_root.set_attr(MC_NS, "Ignorable", format!("{} {}", current, prefix));
        }
        return;
    }

    let mc = match prefix_for(base_root, MC_NS) {
        Some(mc) => mc,
        None => {
            let mc = prefix_for(source_root, MC_NS)
                .filter(|p| base_root.declared_namespace(Some(p.as_str())).is_none())
                .unwrap_or_else(|| "mc".to_string());
            base_root.declare_namespace(&mc, MC_NS);
            mc
        }
    };
    base_root.attributes.push(Attribute {
        name: format!("{mc}:Ignorable"),
        namespace: Some(MC_NS.to_string()),
        value: prefix.to_string(),
    });
}

/// The prefix `root` binds to `uri`, if any.
fn prefix_for(root: &Element, uri: &str) -> Option<String> {
    root.attributes
        .iter()
        .filter(|a| a.value == uri)
        .find_map(|a| a.name.strip_prefix("xmlns:"))
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(body: &str) -> XmlDocument {
        XmlDocument::parse_str(&format!(
            r#"<w:document xmlns:w="{W_NS}"><w:body>{body}</w:body></w:document>"#
        ))
        .unwrap()
    }

    fn texts(body: &Element) -> Vec<String> {
        body.children_named(W_NS, "p").map(paragraph_text).collect()
    }

    #[test]
    fn test_detach_section_properties() {
        let mut d = doc(r#"<w:p/><w:sectPr><w:pgSz w:w="11906"/></w:sectPr>"#);
        let body = body_mut(&mut d).unwrap();
        let sect = detach_section_properties(body).unwrap();
        assert!(sect.is(W_NS, "sectPr"));
        assert_eq!(body.element_count(), 1);
        assert!(detach_section_properties(body).is_none());
    }

    #[test]
    fn test_content_nodes_skip_section_properties() {
        let d = doc(r#"<w:p><w:r><w:t>a</w:t></w:r></w:p><w:tbl/><w:sectPr/>"#);
        let nodes = content_nodes(body(&d).unwrap());
        assert_eq!(nodes.len(), 2);
        assert!(nodes[1].is(W_NS, "tbl"));
    }

    #[test]
    fn test_find_anchor_top_level_and_nested() {
        let d = doc(
            r#"<w:p><w:r><w:t>intro</w:t></w:r></w:p><w:tbl><w:tr><w:tc><w:p><w:r><w:t>AN</w:t></w:r><w:r><w:t>CHOR</w:t></w:r></w:p></w:tc></w:tr></w:tbl><w:p><w:r><w:t>ANCHOR</w:t></w:r></w:p>"#,
        );
        let body = body(&d).unwrap();
        assert_eq!(find_anchor(body, "ANCHOR", 0), Some(vec![1, 0, 0, 0]));
        assert_eq!(find_anchor(body, "ANCHOR", 2), Some(vec![2]));
        assert_eq!(find_anchor(body, "missing", 0), None);
    }

    #[test]
    fn test_find_anchor_normalizes() {
        // "é" precomposed in the document, decomposed in the pattern
        let d = doc("<w:p><w:r><w:t>caf\u{e9}</w:t></w:r></w:p>");
        let pattern = normalize("cafe\u{301}");
        assert_eq!(find_anchor(body(&d).unwrap(), &pattern, 0), Some(vec![0]));
    }

    #[test]
    fn test_insert_before_keeps_order() {
        let mut d = doc(r#"<w:p><w:r><w:t>ANCHOR</w:t></w:r></w:p>"#);
        let body = body_mut(&mut d).unwrap();
        let mut path = find_anchor(body, "ANCHOR", 0).unwrap();

        let para = |text: &str| {
            w_element("p").with_child(w_element("r").with_child({
                let mut t = w_element("t");
                t.children.push(Node::Text(text.to_string()));
                t
            }))
        };

        assert_eq!(insert_before(body, &mut path, vec![para("one")]), 1);
        assert_eq!(insert_before(body, &mut path, vec![para("two")]), 1);
        assert_eq!(texts(body), vec!["one", "two", "ANCHOR"]);
        assert_eq!(path, vec![2]);
    }

    #[test]
    fn test_page_break_shape() {
        let p = page_break();
        let br = &p.descendants(W_NS, "br")[0];
        assert_eq!(br.attr(W_NS, "type"), Some("page"));
    }

    #[test]
    fn test_ensure_namespaces() {
        let mut base = XmlDocument::parse_str(&format!(
            r#"<w:document xmlns:w="{W_NS}" xmlns:mc="{MC_NS}" mc:Ignorable="w14"/>"#
        ))
        .unwrap();
        let source = XmlDocument::parse_str(&format!(
            r#"<w:document xmlns:w="{W_NS}" xmlns:mc="{MC_NS}" xmlns:w14="urn:w14" xmlns:wp="urn:wp" mc:Ignorable="w14 wp"><w:body><w:p w14:paraId="1"><wp:inline/></w:p></w:body></w:document>"#
        ))
        .unwrap();
        let nodes = content_nodes(body(&source).unwrap());

        let import = ensure_namespaces(&mut base.root, &source.root, &nodes);
        assert_eq!(import.added, vec!["w14", "wp"]);
        assert!(import.conflicts.is_empty());
        assert_eq!(base.root.declared_namespace(Some("wp")), Some("urn:wp"));
        assert_eq!(base.root.attr(MC_NS, "Ignorable"), Some("w14 wp"));
    }

    #[test]
    fn test_ensure_namespaces_creates_ignorable() {
        // skeleton parts declare only w and r
        let mut base =
            XmlDocument::parse_str(&format!(r#"<w:footnotes xmlns:w="{W_NS}"/>"#)).unwrap();
        let source = XmlDocument::parse_str(&format!(
            r#"<w:footnotes xmlns:w="{W_NS}" xmlns:mc="{MC_NS}" xmlns:w14="urn:w14" mc:Ignorable="w14"><w:footnote w:id="1"><w:p w14:paraId="1A2B3C4D"/></w:footnote></w:footnotes>"#
        ))
        .unwrap();

        let import = ensure_namespaces(&mut base.root, &source.root, source.root.elements());
        assert_eq!(import.added, vec!["w14"]);
        assert_eq!(base.root.declared_namespace(Some("w14")), Some("urn:w14"));
        assert_eq!(base.root.declared_namespace(Some("mc")), Some(MC_NS));
        assert_eq!(base.root.attr(MC_NS, "Ignorable"), Some("w14"));

        let text = String::from_utf8(base.to_bytes().unwrap()).unwrap();
        assert!(text.contains(r#"mc:Ignorable="w14""#));
    }

    #[test]
    fn test_ensure_namespaces_reports_conflicting_binding() {
        let mut base = XmlDocument::parse_str(&format!(
            r#"<w:document xmlns:w="{W_NS}" xmlns:x="urn:base"/>"#
        ))
        .unwrap();
        let source = XmlDocument::parse_str(&format!(
            r#"<w:document xmlns:w="{W_NS}" xmlns:x="urn:source"><w:p x:flag="1"/></w:document>"#
        ))
        .unwrap();

        let import = ensure_namespaces(&mut base.root, &source.root, source.root.elements());
        assert!(import.added.is_empty());
        assert_eq!(import.conflicts, vec!["x"]);
        assert_eq!(base.root.declared_namespace(Some("x")), Some("urn:base"));
    }
}
