//! Synthetic DOCX fixtures for integration tests.

#![allow(dead_code)]

use std::io::{Cursor, Write};

use docxmerge::docx::splice::{body, paragraph_text};
use docxmerge::docx::W_NS;
use docxmerge::xml::{Element, XmlDocument};
use docxmerge::Package;
use zip::write::SimpleFileOptions;
use zip::ZipWriter;

pub const W: &str = "http://schemas.openxmlformats.org/wordprocessingml/2006/main";
pub const R: &str = "http://schemas.openxmlformats.org/officeDocument/2006/relationships";
const REL_BASE: &str = "http://schemas.openxmlformats.org/officeDocument/2006/relationships";
const WML_CT: &str = "application/vnd.openxmlformats-officedocument.wordprocessingml";

struct Rel {
    id: String,
    rel_type: String,
    target: String,
    external: bool,
}

/// Builds a minimal but well-formed DOCX package.
pub struct DocxBuilder {
    body: String,
    section: bool,
    extra_ns: Vec<(String, String)>,
    aux_attrs: String,
    parts: Vec<(String, Vec<u8>)>,
    overrides: Vec<(String, String)>,
    rels: Vec<Rel>,
}

impl Default for DocxBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl DocxBuilder {
    pub fn new() -> Self {
        Self {
            body: String::new(),
            section: true,
            extra_ns: Vec::new(),
            aux_attrs: String::new(),
            parts: Vec::new(),
            overrides: Vec::new(),
            rels: Vec::new(),
        }
    }

    /// Append `<w:p>` holding one run with `text`.
    pub fn paragraph(mut self, text: &str) -> Self {
        self.body
            .push_str(&format!("<w:p><w:r><w:t>{}</w:t></w:r></w:p>", text));
        self
    }

    /// Append raw body XML.
    pub fn body_xml(mut self, xml: &str) -> Self {
        self.body.push_str(xml);
        self
    }

    pub fn without_section(mut self) -> Self {
        self.section = false;
        self
    }

    /// Declare an extra namespace on the document root.
    pub fn namespace(mut self, prefix: &str, uri: &str) -> Self {
        self.extra_ns.push((prefix.to_string(), uri.to_string()));
        self
    }

    /// Raw attributes written on the root of every aux part added after
    /// this call, e.g. extra `xmlns:` declarations.
    pub fn aux_root_attrs(mut self, attrs: &str) -> Self {
        self.aux_attrs = format!(" {}", attrs);
        self
    }

    fn next_rel_id(&self) -> String {
        format!("rId{}", self.rels.len() + 100)
    }

    fn aux_part(mut self, name: &str, root: &str, inner: &str) -> Self {
        let xml = format!(
            r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><w:{root} xmlns:w="{W}" xmlns:r="{R}"{}>{inner}</w:{root}>"#,
            self.aux_attrs
        );
        let id = self.next_rel_id();
        self.rels.push(Rel {
            id,
            rel_type: format!("{}/{}", REL_BASE, name),
            target: format!("{}.xml", name),
            external: false,
        });
        self.overrides.push((
            format!("/word/{}.xml", name),
            format!("{}.{}+xml", WML_CT, name),
        ));
        self.parts.push((format!("word/{}.xml", name), xml.into_bytes()));
        self
    }

    pub fn numbering(self, inner: &str) -> Self {
        self.aux_part("numbering", "numbering", inner)
    }

    pub fn styles(self, inner: &str) -> Self {
        self.aux_part("styles", "styles", inner)
    }

    pub fn fonts(self, inner: &str) -> Self {
        self.aux_part("fontTable", "fonts", inner)
    }

    pub fn settings(self, inner: &str) -> Self {
        self.aux_part("settings", "settings", inner)
    }

    pub fn footnotes(self, inner: &str) -> Self {
        self.aux_part("footnotes", "footnotes", inner)
    }

    pub fn endnotes(self, inner: &str) -> Self {
        self.aux_part("endnotes", "endnotes", inner)
    }

    pub fn web_settings(self) -> Self {
        self.aux_part("webSettings", "webSettings", "")
    }

    /// Add `word/theme/theme1.xml` with its relationship and override.
    pub fn theme(mut self, name: &str) -> Self {
        let xml = format!(
            r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><a:theme xmlns:a="http://schemas.openxmlformats.org/drawingml/2006/main" name="{name}"/>"#
        );
        let id = self.next_rel_id();
        self.rels.push(Rel {
            id,
            rel_type: format!("{}/theme", REL_BASE),
            target: "theme/theme1.xml".to_string(),
            external: false,
        });
        self.overrides.push((
            "/word/theme/theme1.xml".to_string(),
            "application/vnd.openxmlformats-officedocument.theme+xml".to_string(),
        ));
        self.parts
            .push(("word/theme/theme1.xml".to_string(), xml.into_bytes()));
        self
    }

    /// Add an image relationship `id` targeting `word/<target>`; `payload`
    /// of `None` leaves the media file out of the package.
    pub fn image(mut self, id: &str, target: &str, payload: Option<&[u8]>) -> Self {
        self.rels.push(Rel {
            id: id.to_string(),
            rel_type: format!("{}/image", REL_BASE),
            target: target.to_string(),
            external: false,
        });
        if let Some(bytes) = payload {
            self.parts.push((format!("word/{}", target), bytes.to_vec()));
        }
        self
    }

    pub fn hyperlink(mut self, id: &str, url: &str) -> Self {
        self.rels.push(Rel {
            id: id.to_string(),
            rel_type: format!("{}/hyperlink", REL_BASE),
            target: url.to_string(),
            external: true,
        });
        self
    }

    /// Add an arbitrary part (and no relationship).
    pub fn part(mut self, path: &str, bytes: &[u8]) -> Self {
        self.parts.push((path.to_string(), bytes.to_vec()));
        self
    }

    pub fn build(self) -> Vec<u8> {
        let mut buffer = Vec::new();
        let mut zip = ZipWriter::new(Cursor::new(&mut buffer));
        let options =
            SimpleFileOptions::default().compression_method(zip::CompressionMethod::Deflated);

        let mut types = String::from(
            r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types">
  <Default Extension="rels" ContentType="application/vnd.openxmlformats-package.relationships+xml"/>
  <Default Extension="xml" ContentType="application/xml"/>
  <Override PartName="/word/document.xml" ContentType="application/vnd.openxmlformats-officedocument.wordprocessingml.document.main+xml"/>"#,
        );
        for (part, ct) in &self.overrides {
            types.push_str(&format!(
                r#"<Override PartName="{}" ContentType="{}"/>"#,
                part, ct
            ));
        }
        types.push_str("</Types>");
        zip.start_file("[Content_Types].xml", options).unwrap();
        zip.write_all(types.as_bytes()).unwrap();

        zip.start_file("_rels/.rels", options).unwrap();
        zip.write_all(
            br#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">
  <Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/officeDocument" Target="word/document.xml"/>
</Relationships>"#,
        )
        .unwrap();

        let mut rels = String::from(
            r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">"#,
        );
        for rel in &self.rels {
            let mode = if rel.external {
                r#" TargetMode="External""#
            } else {
                ""
            };
            rels.push_str(&format!(
                r#"<Relationship Id="{}" Type="{}" Target="{}"{}/>"#,
                rel.id, rel.rel_type, rel.target, mode
            ));
        }
        rels.push_str("</Relationships>");
        zip.start_file("word/_rels/document.xml.rels", options)
            .unwrap();
        zip.write_all(rels.as_bytes()).unwrap();

        let namespaces: String = self
            .extra_ns
            .iter()
            .map(|(prefix, uri)| format!(r#" xmlns:{}="{}""#, prefix, uri))
            .collect();
        let section = if self.section {
            r#"<w:sectPr><w:pgSz w:w="11906" w:h="16838"/></w:sectPr>"#
        } else {
            ""
        };
        let document = format!(
            r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<w:document xmlns:w="{W}" xmlns:r="{R}"{namespaces}><w:body>{}{section}</w:body></w:document>"#,
            self.body
        );
        zip.start_file("word/document.xml", options).unwrap();
        zip.write_all(document.as_bytes()).unwrap();

        for (path, bytes) in &self.parts {
            zip.start_file(path.as_str(), options).unwrap();
            zip.write_all(bytes).unwrap();
        }

        zip.finish().unwrap();
        buffer
    }
}

/// A merged package opened for assertions.
pub struct Merged {
    pub package: Package,
}

impl Merged {
    pub fn open(bytes: &[u8]) -> Self {
        Self {
            package: Package::from_bytes(bytes).unwrap(),
        }
    }

    pub fn xml(&self, path: &str) -> XmlDocument {
        XmlDocument::parse(self.package.read_part(path).unwrap()).unwrap()
    }

    pub fn document(&self) -> XmlDocument {
        self.xml("word/document.xml")
    }

    /// Text of each top-level body paragraph, in order.
    pub fn paragraph_texts(&self) -> Vec<String> {
        let doc = self.document();
        body(&doc)
            .unwrap()
            .children_named(W_NS, "p")
            .map(paragraph_text)
            .collect()
    }

    /// Non-empty paragraph texts, in order.
    pub fn texts(&self) -> Vec<String> {
        self.paragraph_texts()
            .into_iter()
            .filter(|t| !t.is_empty())
            .collect()
    }

    pub fn body_children(&self) -> Vec<Element> {
        let doc = self.document();
        body(&doc).unwrap().elements().cloned().collect()
    }

    /// Value of `attr` on every `local` element in `part`.
    pub fn attr_values(&self, part: &str, local: &str, attr: &str) -> Vec<String> {
        self.xml(part)
            .root
            .descendants(W_NS, local)
            .iter()
            .filter_map(|el| el.attr(W_NS, attr))
            .map(str::to_string)
            .collect()
    }
}
