//! Re-pointing relationship references from a source part at the base package.

use std::collections::HashMap;

use crate::container::Package;
use crate::error::{Error, Result};
use crate::report::MergeLog;
use crate::xml::{Attribute, Element};

use super::content_types::{extension_of, media_type_for_extension, ContentTypes};
use super::relationships::{Relationship, RelationshipSet};
use super::{rel_type_is, R_NS, R_NS_STRICT};

/// VML office namespace; `o:relid` carries a relationship ID.
const VML_OFFICE_NS: &str = "urn:schemas-microsoft-com:office:office";

/// Relationship types whose target is a binary payload stored under `media/`.
const MEDIA_TYPES: &[&str] = &["image", "audio", "video", "media"];

/// The part of the base package receiving imported references.
pub struct BaseTarget<'a> {
    pub package: &'a mut Package,
    pub content_types: &'a mut ContentTypes,
    pub rels: &'a mut RelationshipSet,
    /// Part that owns `rels`
    pub part: &'a str,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TargetKind {
    External,
    Media,
    Part,
}

fn classify(rel: &Relationship) -> TargetKind {
    if rel.external {
        TargetKind::External
    } else if MEDIA_TYPES.iter().any(|t| rel_type_is(&rel.rel_type, t)) {
        TargetKind::Media
    } else {
        TargetKind::Part
    }
}

/// Whether an attribute holds a relationship ID.
fn is_reference(attr: &Attribute) -> bool {
    match attr.namespace.as_deref() {
        Some(R_NS) | Some(R_NS_STRICT) => true,
        Some(VML_OFFICE_NS) => attr.local_name() == "relid",
        Some(_) => false,
        None => attr.prefix() == Some("r"),
    }
}

fn part_dir(part: &str) -> &str {
    match part.rfind('/') {
        Some(i) => &part[..=i],
        None => "",
    }
}

/// Resolves the relationship IDs of one source part against a base part.
///
/// Results are memoized per source ID, so an image referenced twice in the
/// same pass is copied once.
pub struct RelationshipResolver<'s> {
    source: &'s Package,
    source_types: &'s ContentTypes,
    source_part: String,
    source_rels: RelationshipSet,
    resolved: HashMap<String, Option<String>>,
    copied_parts: HashMap<String, String>,
}

impl<'s> RelationshipResolver<'s> {
    /// Resolver for the relationships owned by `source_part`.
    pub fn new(
        source: &'s Package,
        source_types: &'s ContentTypes,
        source_part: &str,
    ) -> Result<Self> {
        Ok(Self {
            source,
            source_types,
            source_part: source_part.to_string(),
            source_rels: RelationshipSet::load(source, source_part)?,
            resolved: HashMap::new(),
            copied_parts: HashMap::new(),
        })
    }

    /// Map a source relationship ID to an ID in the base part's set.
    ///
    /// Returns `None` when the ID is unknown in the source; the caller must
    /// then drop the reference.
    pub(crate) fn resolve(
        &mut self,
        old_id: &str,
        base: &mut BaseTarget<'_>,
        log: &mut MergeLog,
    ) -> Result<Option<String>> {
        if let Some(known) = self.resolved.get(old_id) {
            return Ok(known.clone());
        }

        let resolved = match self.source_rels.get(old_id).cloned() {
            None => {
                log.warn(format!(
                    "Relationship {} is not defined in {}; reference dropped",
                    old_id, self.source_part
                ));
                None
            }
            Some(rel) => Some(match classify(&rel) {
                TargetKind::External => base.rels.find_or_add(&rel.rel_type, &rel.target, true),
                TargetKind::Media => self.copy_media(&rel, base, log),
                TargetKind::Part => self.copy_part(&rel, base, log)?,
            }),
        };

        self.resolved.insert(old_id.to_string(), resolved.clone());
        Ok(resolved)
    }

    fn copy_media(
        &mut self,
        rel: &Relationship,
        base: &mut BaseTarget<'_>,
        log: &mut MergeLog,
    ) -> String {
        let source_path = Package::resolve_path(&self.source_part, &rel.target);

        let Some(payload) = self.source.part(&source_path) else {
            log.warn(Error::MissingMediaAsset(source_path).to_string());
            return base.rels.find_or_add(&rel.rel_type, &rel.target, false);
        };

        let file = source_path.rsplit('/').next().unwrap_or(&source_path);
        let dest = base
            .package
            .unique_part_name(&format!("{}media/{}", part_dir(base.part), file));
        base.package.set_part(dest.as_str(), payload.to_vec());

        if let Some(ext) = extension_of(&dest) {
            let content_type = self
                .source_types
                .default_for(ext)
                .unwrap_or_else(|| media_type_for_extension(ext));
            base.content_types.ensure_default(ext, content_type);
        }

        log.report.media_copied += 1;
        log.debug(format!("Copied {} to {}", source_path, dest));

        base.rels
            .add(&rel.rel_type, &Package::relative_target(base.part, &dest), false)
    }

    fn copy_part(
        &mut self,
        rel: &Relationship,
        base: &mut BaseTarget<'_>,
        log: &mut MergeLog,
    ) -> Result<String> {
        let source_path = Package::resolve_path(&self.source_part, &rel.target);

        let dest = match self.copied_parts.get(&source_path).cloned() {
            Some(dest) => dest,
            None => match self.source.part(&source_path) {
                None => {
                    log.warn(format!(
                        "Part {} referenced by {} is missing; keeping original target",
                        source_path, self.source_part
                    ));
                    return Ok(base.rels.find_or_add(&rel.rel_type, &rel.target, false));
                }
                Some(payload) => {
                    let dest = base.package.unique_part_name(&source_path);
                    base.package.set_part(dest.as_str(), payload.to_vec());

                    let content_type = self
                        .source_types
                        .content_type_for(&source_path)
                        .or_else(|| extension_of(&dest).map(media_type_for_extension))
                        .unwrap_or("application/octet-stream");
                    base.content_types.ensure_override(&dest, content_type);

                    self.copied_parts.insert(source_path.clone(), dest.clone());
                    log.report.parts_copied += 1;
                    log.debug(format!("Copied part {} to {}", source_path, dest));

                    self.copy_part_relationships(&source_path, &dest, base, log)?;
                    dest
                }
            },
        };

        Ok(base
            .rels
            .add(&rel.rel_type, &Package::relative_target(base.part, &dest), false))
    }

    /// Carry the copied part's own relationships (and their payloads) over.
    fn copy_part_relationships(
        &mut self,
        source_path: &str,
        dest: &str,
        base: &mut BaseTarget<'_>,
        log: &mut MergeLog,
    ) -> Result<()> {
        let source_rels = RelationshipSet::load(self.source, source_path)?;
        if source_rels.is_empty() {
            return Ok(());
        }

        let mut nested = RelationshipResolver {
            source: self.source,
            source_types: self.source_types,
            source_part: source_path.to_string(),
            source_rels,
            resolved: HashMap::new(),
            copied_parts: std::mem::take(&mut self.copied_parts),
        };

        // The memo is handed back only on success; errors abort the merge.
        let mut dest_rels = RelationshipSet::new();
        let ids: Vec<String> = nested.source_rels.iter().map(|r| r.id.clone()).collect();
        {
            let mut target = BaseTarget {
                package: &mut *base.package,
                content_types: &mut *base.content_types,
                rels: &mut dest_rels,
                part: dest,
            };
            for id in &ids {
                nested.resolve(id, &mut target, log)?;
            }
        }
        self.copied_parts = nested.copied_parts;

        base.package
            .set_part(Package::rels_path_for(dest), dest_rels.to_bytes()?);
        Ok(())
    }

    /// Rewrite every relationship reference in `el` and its descendants.
    ///
    /// References that cannot be resolved are removed. Returns the number of
    /// references dropped.
    pub(crate) fn rewrite_references(
        &mut self,
        el: &mut Element,
        base: &mut BaseTarget<'_>,
        log: &mut MergeLog,
    ) -> Result<usize> {
        let refs: Vec<(String, String)> = el
            .attributes
            .iter()
            .filter(|a| is_reference(a) && !a.value.is_empty())
            .map(|a| (a.name.clone(), a.value.clone()))
            .collect();

        let mut dropped = 0;
        for (name, old_id) in refs {
            match self.resolve(&old_id, base, log)? {
                Some(new_id) => {
                    if let Some(attr) = el.attributes.iter_mut().find(|a| a.name == name) {
                        attr.value = new_id;
                    }
                }
                None => {
                    el.attributes.retain(|a| a.name != name);
                    dropped += 1;
                }
            }
        }

        for child in el.elements_mut() {
            dropped += self.rewrite_references(child, base, log)?;
        }

        Ok(dropped)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::docx::W_NS;
    use crate::xml::XmlDocument;

    const IMAGE: &str = "http://schemas.openxmlformats.org/officeDocument/2006/relationships/image";
    const LINK: &str = "http://schemas.openxmlformats.org/officeDocument/2006/relationships/hyperlink";
    const CUSTOM: &str = "http://schemas.openxmlformats.org/officeDocument/2006/relationships/customXml";

    fn source_package() -> Package {
        let mut rels = RelationshipSet::new();
        rels.add(IMAGE, "media/image1.png", false);
        rels.add(LINK, "https://example.com", true);
        rels.add(IMAGE, "media/gone.png", false);
        rels.add(CUSTOM, "../customXml/item1.xml", false);

        let mut package = Package::default();
        package.set_part("word/_rels/document.xml.rels", rels.to_bytes().unwrap());
        package.set_part("word/media/image1.png", vec![0x89, b'P', b'N', b'G']);
        package.set_part("customXml/item1.xml", b"<item/>".to_vec());
        package
    }

    struct Base {
        package: Package,
        types: ContentTypes,
        rels: RelationshipSet,
    }

    impl Base {
        fn new() -> Self {
            let mut package = Package::default();
            package.set_part("word/media/image1.png", vec![1, 2, 3]);
            let mut rels = RelationshipSet::new();
            rels.add(IMAGE, "media/image1.png", false);
            rels.add(LINK, "https://example.com", true);
            Self {
                package,
                types: ContentTypes::default(),
                rels,
            }
        }

        fn target(&mut self) -> BaseTarget<'_> {
            BaseTarget {
                package: &mut self.package,
                content_types: &mut self.types,
                rels: &mut self.rels,
                part: "word/document.xml",
            }
        }
    }

    #[test]
    fn test_media_copied_to_free_path() {
        let source = source_package();
        let types = ContentTypes::default();
        let mut resolver = RelationshipResolver::new(&source, &types, "word/document.xml").unwrap();
        let mut base = Base::new();
        let mut log = MergeLog::new(None);

        let id = resolver.resolve("rId1", &mut base.target(), &mut log).unwrap().unwrap();
        let rel = base.rels.get(&id).unwrap();
        assert_eq!(rel.target, "media/image1_1.png");
        assert_eq!(base.package.part("word/media/image1.png"), Some(&[1u8, 2, 3][..]));
        assert_eq!(base.package.part("word/media/image1_1.png").unwrap()[1], b'P');
        assert_eq!(base.types.default_for("png"), Some("image/png"));

        let again = resolver.resolve("rId1", &mut base.target(), &mut log).unwrap().unwrap();
        assert_eq!(again, id);
        assert_eq!(log.report.media_copied, 1);
    }

    #[test]
    fn test_external_dedup_and_unknown_id() {
        let source = source_package();
        let types = ContentTypes::default();
        let mut resolver = RelationshipResolver::new(&source, &types, "word/document.xml").unwrap();
        let mut base = Base::new();
        let mut log = MergeLog::new(None);

        let link = resolver.resolve("rId2", &mut base.target(), &mut log).unwrap();
        assert_eq!(link.as_deref(), Some("rId2"));
        assert_eq!(base.rels.len(), 2);

        assert!(resolver.resolve("rId99", &mut base.target(), &mut log).unwrap().is_none());
        assert_eq!(log.report.warnings.len(), 1);
    }

    #[test]
    fn test_missing_media_degrades() {
        let source = source_package();
        let types = ContentTypes::default();
        let mut resolver = RelationshipResolver::new(&source, &types, "word/document.xml").unwrap();
        let mut base = Base::new();
        let mut log = MergeLog::new(None);

        let id = resolver.resolve("rId3", &mut base.target(), &mut log).unwrap().unwrap();
        assert_eq!(base.rels.get(&id).unwrap().target, "media/gone.png");
        assert!(log.report.warnings[0].contains("Missing media asset"));
    }

    #[test]
    fn test_generic_part_copied_with_override() {
        let source = source_package();
        let types = ContentTypes::default();
        let mut resolver = RelationshipResolver::new(&source, &types, "word/document.xml").unwrap();
        let mut base = Base::new();
        let mut log = MergeLog::new(None);

        let id = resolver.resolve("rId4", &mut base.target(), &mut log).unwrap().unwrap();
        assert_eq!(base.rels.get(&id).unwrap().target, "/customXml/item1.xml");
        assert!(base.package.exists("customXml/item1.xml"));
        assert_eq!(
            base.types.override_for("customXml/item1.xml"),
            Some("application/xml")
        );
        assert_eq!(log.report.parts_copied, 1);
    }

    #[test]
    fn test_rewrite_references_drops_unknown() {
        let source = source_package();
        let types = ContentTypes::default();
        let mut resolver = RelationshipResolver::new(&source, &types, "word/document.xml").unwrap();
        let mut base = Base::new();
        let mut log = MergeLog::new(None);

        let mut doc = XmlDocument::parse_str(&format!(
            r#"<w:p xmlns:w="{W_NS}" xmlns:r="{R_NS}"><w:hyperlink r:id="rId2"/><w:hyperlink r:id="rId42"/><a:blip xmlns:a="urn:a" r:embed="rId1"/></w:p>"#
        ))
        .unwrap();

        let dropped = resolver
            .rewrite_references(&mut doc.root, &mut base.target(), &mut log)
            .unwrap();
        assert_eq!(dropped, 1);

        let links: Vec<_> = doc.root.children_named(W_NS, "hyperlink").collect();
        assert_eq!(links[0].attr(R_NS, "id"), Some("rId2"));
        assert_eq!(links[1].attr(R_NS, "id"), None);

        let blip = doc.root.elements().nth(2).unwrap();
        assert_eq!(blip.attr(R_NS, "embed"), Some("rId3"));
    }
}
