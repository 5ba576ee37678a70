//! Styles, font table and settings merge.
//!
//! All three follow "first writer wins": a definition already present in the
//! base is kept and the source's copy is dropped.

use std::collections::HashSet;

use crate::xml::{Element, Node, XmlDocument};

use super::ids::IdMap;
use super::numbering::remap_num_ids;
use super::W_NS;

/// Settings copied from a source when the base lacks them.
pub const SETTINGS_ALLOW_LIST: &[&str] = &[
    "defaultTabStop",
    "autoHyphenation",
    "characterSpacingControl",
    "compat",
    "themeFontLang",
    "clrSchemeMapping",
    "decimalSymbol",
    "listSeparator",
];

/// Child order of `w:settings` (CT_Settings).
const SETTINGS_ORDER: &[&str] = &[
    "writeProtection",
    "view",
    "zoom",
    "removePersonalInformation",
    "removeDateAndTime",
    "doNotDisplayPageBoundaries",
    "displayBackgroundShape",
    "printPostScriptOverText",
    "printFractionalCharacterWidth",
    "printFormsData",
    "embedTrueTypeFonts",
    "embedSystemFonts",
    "saveSubsetFonts",
    "saveFormsData",
    "mirrorMargins",
    "alignBordersAndEdges",
    "bordersDoNotSurroundHeader",
    "bordersDoNotSurroundFooter",
    "gutterAtTop",
    "hideSpellingErrors",
    "hideGrammaticalErrors",
    "activeWritingStyle",
    "proofState",
    "formsDesign",
    "attachedTemplate",
    "linkStyles",
    "stylePaneFormatFilter",
    "stylePaneSortMethod",
    "documentType",
    "mailMerge",
    "revisionView",
    "trackRevisions",
    "doNotTrackMoves",
    "doNotTrackFormatting",
    "documentProtection",
    "autoFormatOverride",
    "styleLockTheme",
    "styleLockQFSet",
    "defaultTabStop",
    "autoHyphenation",
    "consecutiveHyphenLimit",
    "hyphenationZone",
    "doNotHyphenateCaps",
    "showEnvelope",
    "summaryLength",
    "clickAndTypeStyle",
    "defaultTableStyle",
    "evenAndOddHeaders",
    "bookFoldRevPrinting",
    "bookFoldPrinting",
    "bookFoldPrintingSheets",
    "drawingGridHorizontalSpacing",
    "drawingGridVerticalSpacing",
    "displayHorizontalDrawingGridEvery",
    "displayVerticalDrawingGridEvery",
    "doNotUseMarginsForDrawingGridOrigin",
    "drawingGridHorizontalOrigin",
    "drawingGridVerticalOrigin",
    "doNotShadeFormData",
    "noPunctuationKerning",
    "characterSpacingControl",
    "printTwoOnOne",
    "strictFirstAndLastChars",
    "noLineBreaksAfter",
    "noLineBreaksBefore",
    "savePreviewPicture",
    "doNotValidateAgainstSchema",
    "saveInvalidXml",
    "ignoreMixedContent",
    "alwaysShowPlaceholderText",
    "doNotDemarcateInvalidXml",
    "saveXmlDataOnly",
    "useXSLTWhenSaving",
    "saveThroughXslt",
    "showXMLTags",
    "alwaysMergeEmptyNamespace",
    "updateFields",
    "hdrShapeDefaults",
    "footnotePr",
    "endnotePr",
    "compat",
    "docVars",
    "rsids",
    "mathPr",
    "attachedSchema",
    "themeFontLang",
    "clrSchemeMapping",
    "doNotIncludeSubdocsInStats",
    "doNotAutoCompressPictures",
    "forceUpgrade",
    "captions",
    "readModeInkLockDown",
    "smartTagType",
    "schemaLibrary",
    "shapeDefaults",
    "doNotEmbedSmartTags",
    "decimalSymbol",
    "listSeparator",
];

const FONT_EMBEDS: &[&str] = &["embedRegular", "embedBold", "embedItalic", "embedBoldItalic"];

/// Outcome of merging one source styles part.
#[derive(Debug, Clone, Default)]
pub struct StylesMerge {
    pub added: usize,
    /// `numId` values in copied styles with no merged instance
    pub dangling_num_ids: Vec<String>,
}

/// Copy source styles whose `w:styleId` the base does not define.
///
/// Copied styles get their `numId` references rewritten through `num_map`
/// when numbering was merged in the same pass.
pub fn merge_styles(
    base: &mut XmlDocument,
    source: &XmlDocument,
    num_map: Option<&IdMap>,
) -> StylesMerge {
    let mut result = StylesMerge::default();

    for local in ["latentStyles", "docDefaults"] {
        if base.root.child(W_NS, local).is_none() {
            if let Some(el) = source.root.child(W_NS, local) {
                base.root.children.insert(0, Node::Element(el.clone()));
            }
        }
    }

    let mut known: HashSet<String> = base
        .root
        .children_named(W_NS, "style")
        .filter_map(|s| s.attr(W_NS, "styleId"))
        .map(str::to_string)
        .collect();

    for style in source.root.children_named(W_NS, "style") {
        let Some(id) = style.attr(W_NS, "styleId") else {
            continue;
        };
        if !known.insert(id.to_string()) {
            continue;
        }

        let mut copy = style.clone();
        if let Some(map) = num_map {
            result
                .dangling_num_ids
                .extend(remap_num_ids(&mut copy, map));
        }
        base.root.children.push(Node::Element(copy));
        result.added += 1;
    }

    result
}

/// Copy source font entries whose `w:name` the base lacks, without their
/// embedded font references.
pub fn merge_fonts(base: &mut XmlDocument, source: &XmlDocument) -> usize {
    let mut known: HashSet<String> = base
        .root
        .children_named(W_NS, "font")
        .filter_map(|f| f.attr(W_NS, "name"))
        .map(str::to_string)
        .collect();

    let mut added = 0;
    for font in source.root.children_named(W_NS, "font") {
        let Some(name) = font.attr(W_NS, "name") else {
            continue;
        };
        if !known.insert(name.to_string()) {
            continue;
        }

        let mut copy = font.clone();
        copy.children.retain(|n| {
            !n.as_element()
                .is_some_and(|e| FONT_EMBEDS.iter().any(|l| e.is(W_NS, l)))
        });
        base.root.children.push(Node::Element(copy));
        added += 1;
    }
    added
}

fn settings_rank(el: &Element) -> usize {
    SETTINGS_ORDER
        .iter()
        .position(|name| *name == el.local_name())
        .unwrap_or(SETTINGS_ORDER.len())
}

/// Copy allow-listed settings the base lacks, keeping schema order.
pub fn merge_settings(base: &mut XmlDocument, source: &XmlDocument) -> usize {
    let mut added = 0;

    for name in SETTINGS_ALLOW_LIST {
        if base.root.child(W_NS, name).is_some() {
            continue;
        }
        let Some(setting) = source.root.child(W_NS, name) else {
            continue;
        };

        let rank = settings_rank(setting);
        let at = base
            .root
            .children
            .iter()
            .position(|n| n.as_element().is_some_and(|e| settings_rank(e) > rank))
            .unwrap_or(base.root.children.len());
        base.root
            .children
            .insert(at, Node::Element(setting.clone()));
        added += 1;
    }

    added
}
