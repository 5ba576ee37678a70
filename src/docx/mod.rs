//! DOCX (WordprocessingML) merge engine.
//!
//! The merge runs against one mutable base package. Every source document
//! is pulled through the same pipeline: its auxiliary parts (numbering,
//! styles, notes) are folded into the base with fresh identifiers, its body
//! is copied, and every relationship reference in the copy is re-pointed at
//! the base package.

pub mod content_types;
pub mod ids;
pub mod merger;
pub mod notes;
pub mod numbering;
pub mod relationships;
pub mod resolver;
pub mod splice;
pub mod styles;
pub mod summary;

pub use merger::{DocxMerger, MergeStage};
pub use summary::PackageSummary;

use crate::container::Package;
use crate::xml::{Element, XmlDocument, XMLNS_NS};

use relationships::RelationshipSet;

/// WordprocessingML main namespace.
pub const W_NS: &str = "http://schemas.openxmlformats.org/wordprocessingml/2006/main";

/// Relationship reference namespace (transitional).
pub const R_NS: &str = "http://schemas.openxmlformats.org/officeDocument/2006/relationships";

/// Relationship reference namespace (strict).
pub const R_NS_STRICT: &str = "http://purl.oclc.org/ooxml/officeDocument/relationships";

/// Markup compatibility namespace.
pub const MC_NS: &str = "http://schemas.openxmlformats.org/markup-compatibility/2006";

/// Namespace of `.rels` parts.
pub const PACKAGE_RELS_NS: &str = "http://schemas.openxmlformats.org/package/2006/relationships";

/// Namespace of `[Content_Types].xml`.
pub const CONTENT_TYPES_NS: &str = "http://schemas.openxmlformats.org/package/2006/content-types";

/// Prefix shared by the transitional relationship type URIs.
pub const REL_TYPE_BASE: &str = "http://schemas.openxmlformats.org/officeDocument/2006/relationships";

/// Relationship type of the main document part.
pub const REL_TYPE_OFFICE_DOCUMENT: &str =
    "http://schemas.openxmlformats.org/officeDocument/2006/relationships/officeDocument";

/// Default location of the main document part.
pub const MAIN_DOCUMENT_PART: &str = "word/document.xml";

/// Content type of the main document part.
pub const DOCUMENT_CONTENT_TYPE: &str =
    "application/vnd.openxmlformats-officedocument.wordprocessingml.document.main+xml";

/// Whether a relationship type URI ends in `/suffix`.
///
/// Matching on the last segment accepts both transitional and strict URIs.
pub fn rel_type_is(rel_type: &str, suffix: &str) -> bool {
    rel_type.rsplit('/').next() == Some(suffix)
}

/// Main document part named by the package relationships, falling back to
/// `word/document.xml`.
pub fn locate_main_part(package: &Package) -> crate::error::Result<String> {
    let rels = RelationshipSet::load(package, "")?;
    let located = rels
        .find_by_type("officeDocument")
        .map(|rel| Package::resolve_path("", &rel.target))
        .filter(|path| package.exists(path));
    Ok(located.unwrap_or_else(|| MAIN_DOCUMENT_PART.to_string()))
}

/// Path of an auxiliary part: through the main part's relationships first,
/// then the canonical location. `None` when the package has neither.
pub fn locate_part(
    package: &Package,
    rels: &RelationshipSet,
    main_part: &str,
    kind: PartKind,
) -> Option<String> {
    rels.find_by_type(kind.rel_suffix())
        .filter(|rel| !rel.external)
        .map(|rel| Package::resolve_path(main_part, &rel.target))
        .filter(|path| package.exists(path))
        .or_else(|| {
            package
                .exists(kind.default_path())
                .then(|| kind.default_path().to_string())
        })
}

/// Auxiliary parts the merge reads or creates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum PartKind {
    Numbering,
    Styles,
    FontTable,
    Theme,
    WebSettings,
    Settings,
    Footnotes,
    Endnotes,
}

impl PartKind {
    /// Last segment of the relationship type URI.
    pub fn rel_suffix(self) -> &'static str {
        match self {
            PartKind::Numbering => "numbering",
            PartKind::Styles => "styles",
            PartKind::FontTable => "fontTable",
            PartKind::Theme => "theme",
            PartKind::WebSettings => "webSettings",
            PartKind::Settings => "settings",
            PartKind::Footnotes => "footnotes",
            PartKind::Endnotes => "endnotes",
        }
    }

    /// Full transitional relationship type URI.
    pub fn rel_type(self) -> String {
        format!("{}/{}", REL_TYPE_BASE, self.rel_suffix())
    }

    /// Canonical part name inside a package.
    pub fn default_path(self) -> &'static str {
        match self {
            PartKind::Numbering => "word/numbering.xml",
            PartKind::Styles => "word/styles.xml",
            PartKind::FontTable => "word/fontTable.xml",
            PartKind::Theme => "word/theme/theme1.xml",
            PartKind::WebSettings => "word/webSettings.xml",
            PartKind::Settings => "word/settings.xml",
            PartKind::Footnotes => "word/footnotes.xml",
            PartKind::Endnotes => "word/endnotes.xml",
        }
    }

    /// Content type registered for the part.
    pub fn content_type(self) -> &'static str {
        match self {
            PartKind::Numbering => {
                "application/vnd.openxmlformats-officedocument.wordprocessingml.numbering+xml"
            }
            PartKind::Styles => {
                "application/vnd.openxmlformats-officedocument.wordprocessingml.styles+xml"
            }
            PartKind::FontTable => {
                "application/vnd.openxmlformats-officedocument.wordprocessingml.fontTable+xml"
            }
            PartKind::Theme => "application/vnd.openxmlformats-officedocument.theme+xml",
            PartKind::WebSettings => {
                "application/vnd.openxmlformats-officedocument.wordprocessingml.webSettings+xml"
            }
            PartKind::Settings => {
                "application/vnd.openxmlformats-officedocument.wordprocessingml.settings+xml"
            }
            PartKind::Footnotes => {
                "application/vnd.openxmlformats-officedocument.wordprocessingml.footnotes+xml"
            }
            PartKind::Endnotes => {
                "application/vnd.openxmlformats-officedocument.wordprocessingml.endnotes+xml"
            }
        }
    }

    /// Local name of the part's root element.
    pub fn root_name(self) -> &'static str {
        match self {
            PartKind::Numbering => "numbering",
            PartKind::Styles => "styles",
            PartKind::FontTable => "fonts",
            PartKind::Theme => "theme",
            PartKind::WebSettings => "webSettings",
            PartKind::Settings => "settings",
            PartKind::Footnotes => "footnotes",
            PartKind::Endnotes => "endnotes",
        }
    }

    /// Minimal valid tree for a part absent from the base package.
    ///
    /// Themes are only ever adopted wholesale, so they have no skeleton.
    pub fn skeleton(self) -> Option<XmlDocument> {
        if self == PartKind::Theme {
            return None;
        }

        let mut root = w_element(self.root_name());
        root.attributes.push(ns_decl("w", W_NS));
        root.attributes.push(ns_decl("r", R_NS));

        match self {
            PartKind::Footnotes => {
                root = root
                    .with_child(separator_note("footnote", "separator", "-1"))
                    .with_child(separator_note("footnote", "continuationSeparator", "0"));
            }
            PartKind::Endnotes => {
                root = root
                    .with_child(separator_note("endnote", "separator", "-1"))
                    .with_child(separator_note("endnote", "continuationSeparator", "0"));
            }
            _ => {}
        }

        Some(XmlDocument::new(root))
    }
}

/// New `w:`-prefixed element.
pub fn w_element(local: &str) -> Element {
    Element::new(format!("w:{}", local), W_NS)
}

fn ns_decl(prefix: &str, uri: &str) -> crate::xml::Attribute {
    crate::xml::Attribute {
        name: format!("xmlns:{}", prefix),
        namespace: Some(XMLNS_NS.to_string()),
        value: uri.to_string(),
    }
}

fn separator_note(note: &str, note_type: &str, id: &str) -> Element {
    let spacing = w_element("spacing")
        .with_attr("w:after", Some(W_NS), "0")
        .with_attr("w:line", Some(W_NS), "240")
        .with_attr("w:lineRule", Some(W_NS), "auto");
    let paragraph = w_element("p")
        .with_child(w_element("pPr").with_child(spacing))
        .with_child(w_element("r").with_child(w_element(note_type)));

    w_element(note)
        .with_attr("w:type", Some(W_NS), note_type)
        .with_attr("w:id", Some(W_NS), id)
        .with_child(paragraph)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rel_type_matching() {
        assert!(rel_type_is(&PartKind::Styles.rel_type(), "styles"));
        assert!(rel_type_is(
            "http://purl.oclc.org/ooxml/officeDocument/relationships/numbering",
            "numbering"
        ));
        assert!(!rel_type_is(&PartKind::Styles.rel_type(), "stylesWithEffects"));
    }

    #[test]
    fn test_locate_parts() {
        let mut package = Package::default();
        let mut root_rels = RelationshipSet::new();
        root_rels.add(REL_TYPE_OFFICE_DOCUMENT, "/word/main.xml", false);
        package.set_part("_rels/.rels", root_rels.to_bytes().unwrap());
        package.set_part("word/main.xml", b"<w:document/>".to_vec());
        package.set_part("word/custom-styles.xml", b"<w:styles/>".to_vec());
        package.set_part("word/settings.xml", b"<w:settings/>".to_vec());

        let main = locate_main_part(&package).unwrap();
        assert_eq!(main, "word/main.xml");

        let mut rels = RelationshipSet::new();
        rels.add(&PartKind::Styles.rel_type(), "custom-styles.xml", false);
        assert_eq!(
            locate_part(&package, &rels, &main, PartKind::Styles).as_deref(),
            Some("word/custom-styles.xml")
        );
        assert_eq!(
            locate_part(&package, &rels, &main, PartKind::Settings).as_deref(),
            Some("word/settings.xml")
        );
        assert!(locate_part(&package, &rels, &main, PartKind::Numbering).is_none());
        assert_eq!(locate_main_part(&Package::default()).unwrap(), MAIN_DOCUMENT_PART);
    }

    #[test]
    fn test_skeletons() {
        let numbering = PartKind::Numbering.skeleton().unwrap();
        assert!(numbering.root.is(W_NS, "numbering"));
        assert_eq!(numbering.root.element_count(), 0);

        let footnotes = PartKind::Footnotes.skeleton().unwrap();
        let ids: Vec<_> = footnotes
            .root
            .children_named(W_NS, "footnote")
            .filter_map(|n| n.attr(W_NS, "id"))
            .collect();
        assert_eq!(ids, vec!["-1", "0"]);

        assert!(PartKind::Theme.skeleton().is_none());
    }

    #[test]
    fn test_skeleton_serializes() {
        let doc = PartKind::Endnotes.skeleton().unwrap();
        let bytes = doc.to_bytes().unwrap();
        let reparsed = XmlDocument::parse(&bytes).unwrap();
        assert!(reparsed.root.is(W_NS, "endnotes"));
        assert_eq!(reparsed.root.descendants(W_NS, "separator").len(), 1);
    }
}
