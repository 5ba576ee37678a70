//! Merge orchestration.
//!
//! The first input is the base package and is mutated in place; every other
//! input is a source whose body is spliced into it. Insert-at-start sources
//! run first, then pattern sources, then insert-at-end sources, each in input
//! order.

use std::collections::BTreeMap;
use std::fmt;

use crate::container::{Package, CONTENT_TYPES_PART};
use crate::error::{Error, Result};
use crate::options::MergeOptions;
use crate::report::{MergeLog, MergeReport};
use crate::xml::{Element, Node, XmlDocument};

use super::content_types::{media_type_for_extension, ContentTypes};
use super::ids::IdMap;
use super::notes::{remap_note_references, NoteKind, NotesPart};
use super::numbering::{remap_num_ids, NumberingTable};
use super::relationships::RelationshipSet;
use super::resolver::{BaseTarget, RelationshipResolver};
use super::splice::{self, content_nodes, ensure_namespaces, find_anchor, insert_before, page_break};
use super::styles::{merge_fonts, merge_settings, merge_styles};
use super::{locate_main_part, locate_part, PartKind, DOCUMENT_CONTENT_TYPE};

/// Phase of a merge call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeStage {
    Validating,
    Loading,
    Splicing,
    Finalizing,
    Done,
}

impl fmt::Display for MergeStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MergeStage::Validating => "validating",
            MergeStage::Loading => "loading",
            MergeStage::Splicing => "splicing",
            MergeStage::Finalizing => "finalizing",
            MergeStage::Done => "done",
        };
        f.write_str(name)
    }
}

/// Parts merged as "styles": parsed, merged entry by entry.
const STYLE_PARTS: [PartKind; 3] = [PartKind::Styles, PartKind::FontTable, PartKind::Settings];

/// Parts adopted whole from the first source that has them.
const ADOPTED_PARTS: [PartKind; 2] = [PartKind::Theme, PartKind::WebSettings];

/// Parts the main document must have a relationship to after a styles merge.
const STYLE_FAMILY: [PartKind; 5] = [
    PartKind::Styles,
    PartKind::FontTable,
    PartKind::Theme,
    PartKind::WebSettings,
    PartKind::Settings,
];

fn missing_body(part: &str) -> Error {
    Error::MissingComponent(format!("w:body in {}", part))
}

/// Declare on `target` the prefixes that `nodes`, copied from a part whose
/// root is `source`, rely on.
fn import_namespaces<'a>(
    target: &mut Element,
    source: &Element,
    nodes: impl IntoIterator<Item = &'a Element>,
    part: &str,
    log: &mut MergeLog,
) {
    let import = ensure_namespaces(target, source, nodes);
    if !import.added.is_empty() {
        log.debug(format!(
            "Declared namespaces in {}: {}",
            part,
            import.added.join(", ")
        ));
    }
    for prefix in import.conflicts {
        log.warn(format!(
            "Prefix \"{}\" is bound to a different namespace in {}; keeping the base binding",
            prefix, part
        ));
    }
}

struct LoadedPart {
    path: String,
    doc: XmlDocument,
}

struct LoadedNumbering {
    path: String,
    table: NumberingTable,
}

struct LoadedNotes {
    path: String,
    part: NotesPart,
    rels: RelationshipSet,
}

/// The base package and the parts being edited.
struct BaseDocument {
    package: Package,
    content_types: ContentTypes,
    main_part: String,
    document: XmlDocument,
    rels: RelationshipSet,
    section: Option<Element>,
    numbering: Option<LoadedNumbering>,
    parts: BTreeMap<PartKind, LoadedPart>,
    footnotes: Option<LoadedNotes>,
    endnotes: Option<LoadedNotes>,
}

impl BaseDocument {
    fn open(package: Package) -> Result<Self> {
        let content_types = match package.part(CONTENT_TYPES_PART) {
            Some(bytes) => ContentTypes::parse(bytes)?,
            None => ContentTypes::default(),
        };
        let main_part = locate_main_part(&package)?;
        let mut document = XmlDocument::parse(package.read_part(&main_part)?)?;
        let rels = RelationshipSet::load(&package, &main_part)?;

        let body = splice::body_mut(&mut document).ok_or_else(|| missing_body(&main_part))?;
        let section = splice::detach_section_properties(body);

        Ok(Self {
            package,
            content_types,
            main_part,
            document,
            rels,
            section,
            numbering: None,
            parts: BTreeMap::new(),
            footnotes: None,
            endnotes: None,
        })
    }

    fn body(&self) -> Result<&Element> {
        splice::body(&self.document).ok_or_else(|| missing_body(&self.main_part))
    }

    fn body_mut(&mut self) -> Result<&mut Element> {
        let part = &self.main_part;
        splice::body_mut(&mut self.document).ok_or_else(|| missing_body(part))
    }

    fn locate(&self, kind: PartKind) -> Option<String> {
        locate_part(&self.package, &self.rels, &self.main_part, kind)
    }

    /// Make sure the main part has a relationship to `path` and the part has
    /// a content type.
    fn register(&mut self, kind: PartKind, path: &str) {
        if self.rels.find_by_type(kind.rel_suffix()).is_none() {
            let target = Package::relative_target(&self.main_part, path);
            self.rels.add(&kind.rel_type(), &target, false);
        }
        self.content_types.ensure_override(path, kind.content_type());
    }

    /// Parse an existing part or start from the kind's skeleton.
    fn load_or_create(&mut self, kind: PartKind) -> Result<(String, XmlDocument)> {
        let path = self
            .locate(kind)
            .unwrap_or_else(|| kind.default_path().to_string());
        let doc = match self.package.part(&path) {
            Some(bytes) => XmlDocument::parse(bytes)?,
            None => kind
                .skeleton()
                .ok_or_else(|| Error::MissingComponent(path.clone()))?,
        };
        self.register(kind, &path);
        Ok((path, doc))
    }

    fn numbering(&mut self) -> Result<&mut NumberingTable> {
        let loaded = match self.numbering.take() {
            Some(loaded) => loaded,
            None => {
                let (path, doc) = self.load_or_create(PartKind::Numbering)?;
                LoadedNumbering {
                    path,
                    table: NumberingTable::new(doc),
                }
            }
        };
        Ok(&mut self.numbering.insert(loaded).table)
    }

    fn part_mut(&mut self, kind: PartKind) -> Result<&mut XmlDocument> {
        if !self.parts.contains_key(&kind) {
            let (path, doc) = self.load_or_create(kind)?;
            self.parts.insert(kind, LoadedPart { path, doc });
        }
        self.parts
            .get_mut(&kind)
            .map(|part| &mut part.doc)
            .ok_or_else(|| Error::MissingComponent(kind.default_path().to_string()))
    }

    fn notes_slot(&mut self, kind: NoteKind) -> &mut Option<LoadedNotes> {
        match kind {
            NoteKind::Footnote => &mut self.footnotes,
            NoteKind::Endnote => &mut self.endnotes,
        }
    }

    /// Take the notes part out for editing; put it back with `restore_notes`.
    fn take_notes(&mut self, kind: NoteKind) -> Result<LoadedNotes> {
        if let Some(loaded) = self.notes_slot(kind).take() {
            return Ok(loaded);
        }
        let (path, doc) = self.load_or_create(kind.part_kind())?;
        let rels = RelationshipSet::load(&self.package, &path)?;
        Ok(LoadedNotes {
            path,
            part: NotesPart::new(kind, doc),
            rels,
        })
    }

    fn restore_notes(&mut self, kind: NoteKind, notes: LoadedNotes) {
        *self.notes_slot(kind) = Some(notes);
    }

    /// Write every edited part back and serialize the package.
    fn finish(mut self) -> Result<Vec<u8>> {
        if let Some(section) = self.section.take() {
            self.body_mut()?.children.push(Node::Element(section));
        }

        self.package
            .set_part(self.main_part.as_str(), self.document.to_bytes()?);

        if let Some(numbering) = &self.numbering {
            self.package
                .set_part(numbering.path.as_str(), numbering.table.doc.to_bytes()?);
        }
        for part in self.parts.values() {
            self.package.set_part(part.path.as_str(), part.doc.to_bytes()?);
        }
        for notes in [&self.footnotes, &self.endnotes].into_iter().flatten() {
            self.package
                .set_part(notes.path.as_str(), notes.part.doc.to_bytes()?);
            if !notes.rels.is_empty() {
                self.package
                    .set_part(Package::rels_path_for(&notes.path), notes.rels.to_bytes()?);
            }
        }

        self.package
            .set_part(Package::rels_path_for(&self.main_part), self.rels.to_bytes()?);

        self.content_types
            .ensure_default("rels", media_type_for_extension("rels"));
        self.content_types
            .ensure_default("xml", media_type_for_extension("xml"));
        self.content_types
            .ensure_override(&self.main_part, DOCUMENT_CONTENT_TYPE);
        self.package
            .set_part(CONTENT_TYPES_PART, self.content_types.to_bytes()?);

        self.package.to_bytes()
    }
}

/// A read-only source package.
struct SourcePackage {
    /// 1-based position in the input list
    number: usize,
    package: Package,
    content_types: ContentTypes,
    main_part: String,
    rels: RelationshipSet,
}

impl SourcePackage {
    fn open(number: usize, package: Package) -> Result<Self> {
        let content_types = match package.part(CONTENT_TYPES_PART) {
            Some(bytes) => ContentTypes::parse(bytes)?,
            None => ContentTypes::default(),
        };
        let main_part = locate_main_part(&package)?;
        let rels = RelationshipSet::load(&package, &main_part)?;
        Ok(Self {
            number,
            package,
            content_types,
            main_part,
            rels,
        })
    }

    /// Fresh parse of the main document.
    fn parse_document(&self) -> Result<XmlDocument> {
        let document = XmlDocument::parse(self.package.read_part(&self.main_part)?)?;
        if splice::body(&document).is_none() {
            return Err(missing_body(&self.main_part));
        }
        Ok(document)
    }

    fn locate(&self, kind: PartKind) -> Option<String> {
        locate_part(&self.package, &self.rels, &self.main_part, kind)
    }

    fn aux_part(&self, kind: PartKind) -> Result<Option<(String, XmlDocument)>> {
        let Some(path) = self.locate(kind) else {
            return Ok(None);
        };
        let doc = XmlDocument::parse(self.package.read_part(&path)?)?;
        Ok(Some((path, doc)))
    }
}

/// Splices source documents into a base document.
///
/// # Example
///
/// ```no_run
/// use docxmerge::{DocxMerger, MergeOptions};
///
/// let base = std::fs::read("base.docx")?;
/// let appendix = std::fs::read("appendix.docx")?;
///
/// let options = MergeOptions::new().with_insert_at_end(true);
/// let (bytes, report) = DocxMerger::new(&options).merge(&[base, appendix])?;
/// println!("{} insertions, {} bytes", report.insertions, bytes.len());
/// # Ok::<(), docxmerge::Error>(())
/// ```
pub struct DocxMerger<'a> {
    options: &'a MergeOptions,
}

impl<'a> DocxMerger<'a> {
    /// Create a merger using `options`.
    pub fn new(options: &'a MergeOptions) -> Self {
        Self { options }
    }

    /// Merge `sources` (base first) into a new package.
    pub fn merge<S: AsRef<[u8]>>(&self, sources: &[S]) -> Result<(Vec<u8>, MergeReport)> {
        let mut log = MergeLog::new(self.options.on_log.clone());
        match self.run(sources, &mut log) {
            Ok(bytes) => Ok((bytes, log.into_report())),
            Err(err) => {
                log.error(format!("Merge failed: {}", err));
                Err(err)
            }
        }
    }

    fn run<S: AsRef<[u8]>>(&self, sources: &[S], log: &mut MergeLog) -> Result<Vec<u8>> {
        log.debug(format!("stage: {}", MergeStage::Validating));
        self.options.validate(sources.len())?;
        log.report.documents = sources.len();

        log.debug(format!("stage: {}", MergeStage::Loading));
        log.info(format!("Loading {} documents", sources.len()));
        let mut packages = Vec::with_capacity(sources.len());
        for (i, source) in sources.iter().enumerate() {
            let package = Package::from_bytes(source.as_ref()).map_err(|err| match err {
                Error::CorruptContainer(msg) => {
                    Error::CorruptContainer(format!("document {}: {}", i + 1, msg))
                }
                other => other,
            })?;
            packages.push(package);
        }

        let mut packages = packages.into_iter();
        let base_package = packages
            .next()
            .ok_or(Error::InsufficientSources(sources.len()))?;
        let mut base = BaseDocument::open(base_package)?;
        let inputs = packages
            .enumerate()
            .map(|(i, package)| SourcePackage::open(i + 2, package))
            .collect::<Result<Vec<_>>>()?;

        log.debug(format!("stage: {}", MergeStage::Splicing));
        let applied = self.splice_all(&mut base, &inputs, log)?;

        log.debug(format!("stage: {}", MergeStage::Finalizing));
        if applied == 0 {
            return Err(Error::NoInsertionPerformed);
        }
        log.report.insertions = applied;
        let bytes = base.finish()?;

        log.debug(format!("stage: {}", MergeStage::Done));
        log.ok(format!(
            "Merged {} documents ({} insertions)",
            sources.len(),
            applied
        ));
        Ok(bytes)
    }

    /// Run every requested insertion mode. Returns the number applied.
    fn splice_all(
        &self,
        base: &mut BaseDocument,
        inputs: &[SourcePackage],
        log: &mut MergeLog,
    ) -> Result<usize> {
        let mut applied = 0;
        let mut cursor = 0;

        if self.options.insert_at_start {
            for input in inputs {
                let nodes = self.import(base, input, log)?;
                let count = nodes.len();
                let body = base.body_mut()?;
                let at = cursor.min(body.children.len());
                body.children
                    .splice(at..at, nodes.into_iter().map(Node::Element));
                cursor = at + count;
                applied += 1;
                log.ok(format!("Inserted document {} at start", input.number));
            }
        }

        if let Some(pattern) = self.options.pattern() {
            let needle = splice::normalize(pattern);
            match find_anchor(base.body()?, &needle, cursor) {
                None => log.warn(format!(
                    "Pattern \"{}\" not found; skipping pattern insertion",
                    pattern
                )),
                Some(mut path) => {
                    for input in inputs {
                        let nodes = self.import(base, input, log)?;
                        insert_before(base.body_mut()?, &mut path, nodes);
                        applied += 1;
                        log.ok(format!(
                            "Inserted document {} before \"{}\"",
                            input.number, pattern
                        ));
                    }
                }
            }
        }

        if self.options.insert_at_end {
            for input in inputs {
                let has_content = base.body()?.element_count() > 0;
                let nodes = self.import(base, input, log)?;
                let body = base.body_mut()?;
                if self.options.page_breaks && has_content {
                    body.children.push(Node::Element(page_break()));
                }
                body.children.extend(nodes.into_iter().map(Node::Element));
                applied += 1;
                log.ok(format!("Appended document {}", input.number));
            }
        }

        Ok(applied)
    }

    /// Prepare one source's body for insertion into the base.
    ///
    /// Numbering, styles and notes are merged first so the copied nodes can
    /// be rewritten against the merged IDs.
    fn import(
        &self,
        base: &mut BaseDocument,
        input: &SourcePackage,
        log: &mut MergeLog,
    ) -> Result<Vec<Element>> {
        log.info(format!("Importing document {}", input.number));
        let mut document = input.parse_document()?;

        let num_map = if self.options.merge_numbering {
            Some(self.merge_numbering(base, input, &mut document, log)?)
        } else {
            None
        };

        if self.options.merge_styles {
            self.merge_styles(base, input, num_map.as_ref(), log)?;
        }

        if self.options.merge_footnotes {
            for kind in [NoteKind::Footnote, NoteKind::Endnote] {
                self.merge_notes(base, input, kind, num_map.as_ref(), &mut document, log)?;
            }
        }

        let body = splice::body(&document).ok_or_else(|| missing_body(&input.main_part))?;
        let mut nodes = content_nodes(body);

        import_namespaces(
            &mut base.document.root,
            &document.root,
            &nodes,
            &base.main_part,
            log,
        );

        let mut resolver =
            RelationshipResolver::new(&input.package, &input.content_types, &input.main_part)?;
        let mut target = BaseTarget {
            package: &mut base.package,
            content_types: &mut base.content_types,
            rels: &mut base.rels,
            part: &base.main_part,
        };
        let mut dropped = 0;
        for node in &mut nodes {
            dropped += resolver.rewrite_references(node, &mut target, log)?;
        }
        log.report.references_dropped += dropped;

        Ok(nodes)
    }

    fn merge_numbering(
        &self,
        base: &mut BaseDocument,
        input: &SourcePackage,
        document: &mut XmlDocument,
        log: &mut MergeLog,
    ) -> Result<IdMap> {
        let num_map = match input.aux_part(PartKind::Numbering)? {
            Some((source_path, numbering)) => {
                let table = base.numbering()?;
                let merged = table.merge(&numbering);
                import_namespaces(
                    &mut table.doc.root,
                    &numbering.root,
                    numbering.root.elements(),
                    &source_path,
                    log,
                );
                log.report.abstract_numbering_added += merged.abstracts_added;
                log.report.numbering_instances_added += merged.nums_added;
                if !merged.orphaned.is_empty() {
                    log.warn(format!(
                        "Document {}: numbering instances {} reference missing definitions",
                        input.number,
                        merged.orphaned.join(", ")
                    ));
                }
                merged.num_map
            }
            None => IdMap::new(),
        };

        let body = splice::body_mut(document).ok_or_else(|| missing_body(&input.main_part))?;
        let dangling = remap_num_ids(body, &num_map);
        if !dangling.is_empty() {
            log.warn(format!(
                "Document {}: list references {} have no numbering definition; numbering removed",
                input.number,
                dangling.join(", ")
            ));
        }
        Ok(num_map)
    }

    fn merge_styles(
        &self,
        base: &mut BaseDocument,
        input: &SourcePackage,
        num_map: Option<&IdMap>,
        log: &mut MergeLog,
    ) -> Result<()> {
        for kind in STYLE_PARTS {
            let Some((source_path, source)) = input.aux_part(kind)? else {
                continue;
            };
            let target = base.part_mut(kind)?;
            match kind {
                PartKind::Styles => {
                    let merged = merge_styles(target, &source, num_map);
                    log.report.styles_added += merged.added;
                    if !merged.dangling_num_ids.is_empty() {
                        log.warn(format!(
                            "Document {}: styles reference missing numbering {}",
                            input.number,
                            merged.dangling_num_ids.join(", ")
                        ));
                    }
                }
                PartKind::FontTable => log.report.fonts_added += merge_fonts(target, &source),
                PartKind::Settings => log.report.settings_added += merge_settings(target, &source),
                _ => {}
            }
            import_namespaces(
                &mut target.root,
                &source.root,
                source.root.elements(),
                &source_path,
                log,
            );
        }

        for kind in ADOPTED_PARTS {
            if base.locate(kind).is_some() {
                continue;
            }
            let Some(path) = input.locate(kind) else {
                continue;
            };
            let bytes = input.package.read_part(&path)?.to_vec();
            let dest = base.package.unique_part_name(kind.default_path());
            base.package.set_part(dest.as_str(), bytes);
            base.register(kind, &dest);
            log.report.parts_copied += 1;
            log.info(format!(
                "Adopted {} from document {}",
                kind.rel_suffix(),
                input.number
            ));
        }

        for kind in STYLE_FAMILY {
            if let Some(path) = base.locate(kind) {
                base.register(kind, &path);
            }
        }

        Ok(())
    }

    fn merge_notes(
        &self,
        base: &mut BaseDocument,
        input: &SourcePackage,
        kind: NoteKind,
        num_map: Option<&IdMap>,
        document: &mut XmlDocument,
        log: &mut MergeLog,
    ) -> Result<()> {
        let id_map = match input.aux_part(kind.part_kind())? {
            None => IdMap::new(),
            Some((source_path, source_notes)) => {
                let mut notes = base.take_notes(kind)?;
                let mut resolver =
                    RelationshipResolver::new(&input.package, &input.content_types, &source_path)?;

                let merged = {
                    let mut target = BaseTarget {
                        package: &mut base.package,
                        content_types: &mut base.content_types,
                        rels: &mut notes.rels,
                        part: &notes.path,
                    };
                    notes
                        .part
                        .merge(&source_notes, &mut |note: &mut Element| -> Result<()> {
                            if let Some(map) = num_map {
                                remap_num_ids(note, map);
                            }
                            let dropped = resolver.rewrite_references(note, &mut target, log)?;
                            log.report.references_dropped += dropped;
                            Ok(())
                        })
                };
                if merged.is_ok() {
                    import_namespaces(
                        &mut notes.part.doc.root,
                        &source_notes.root,
                        source_notes.root.elements(),
                        &source_path,
                        log,
                    );
                }
                base.restore_notes(kind, notes);
                let merged = merged?;

                match kind {
                    NoteKind::Footnote => log.report.footnotes_added += merged.added,
                    NoteKind::Endnote => log.report.endnotes_added += merged.added,
                }
                merged.id_map
            }
        };

        let body = splice::body_mut(document).ok_or_else(|| missing_body(&input.main_part))?;
        let dropped = remap_note_references(body, kind, &id_map);
        if dropped > 0 {
            log.warn(format!(
                "Document {}: removed {} {} reference(s) without a note",
                input.number,
                dropped,
                kind.element_name()
            ));
        }
        Ok(())
    }
}
