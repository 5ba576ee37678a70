//! Mutable, namespace-aware XML tree built on quick-xml.
//!
//! Parts are parsed into an owned [`Element`] tree that keeps every node it
//! does not understand (text, comments, processing instructions), so a part
//! can be edited and written back without losing content. Element and
//! attribute names are stored exactly as written; the namespace URI each
//! prefix resolved to at parse time is recorded next to the name.

use std::collections::BTreeSet;
use std::fmt::Display;

use quick_xml::events::{BytesCData, BytesDecl, BytesEnd, BytesPI, BytesStart, BytesText, Event};
use quick_xml::{Reader, Writer};

use crate::container::decode_xml_bytes;
use crate::error::{Error, Result};

/// Namespace bound to `xmlns` / `xmlns:*` declarations.
pub const XMLNS_NS: &str = "http://www.w3.org/2000/xmlns/";

/// Namespace bound to the reserved `xml` prefix.
pub const XML_NS: &str = "http://www.w3.org/XML/1998/namespace";

/// A node in an element's child list.
#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    Element(Element),
    Text(String),
    CData(String),
    Comment(String),
    ProcessingInstruction(String),
}

impl Node {
    /// Borrow the element if this node is one.
    pub fn as_element(&self) -> Option<&Element> {
        match self {
            Node::Element(el) => Some(el),
            _ => None,
        }
    }

    /// Mutably borrow the element if this node is one.
    pub fn as_element_mut(&mut self) -> Option<&mut Element> {
        match self {
            Node::Element(el) => Some(el),
            _ => None,
        }
    }
}

/// An attribute with its resolved namespace.
#[derive(Debug, Clone, PartialEq)]
pub struct Attribute {
    /// Qualified name as written (e.g. `r:id`)
    pub name: String,
    /// Namespace URI the prefix resolved to, if any
    pub namespace: Option<String>,
    /// Unescaped value
    pub value: String,
}

impl Attribute {
    /// Local part of the attribute name.
    pub fn local_name(&self) -> &str {
        split_name(&self.name).1
    }

    /// Prefix of the attribute name, if any.
    pub fn prefix(&self) -> Option<&str> {
        split_name(&self.name).0
    }
}

/// An XML element.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Element {
    /// Qualified name as written (e.g. `w:p`)
    pub name: String,
    /// Namespace URI the prefix resolved to, if any
    pub namespace: Option<String>,
    /// Attributes in document order
    pub attributes: Vec<Attribute>,
    /// Child nodes in document order
    pub children: Vec<Node>,
}

/// Split a qualified name into `(prefix, local)`.
pub fn split_name(name: &str) -> (Option<&str>, &str) {
    match name.split_once(':') {
        Some((prefix, local)) => (Some(prefix), local),
        None => (None, name),
    }
}

impl Element {
    /// Create an element in the given namespace.
    pub fn new(name: impl Into<String>, namespace: &str) -> Self {
        Self {
            name: name.into(),
            namespace: Some(namespace.to_string()),
            attributes: Vec::new(),
            children: Vec::new(),
        }
    }

    /// Builder: add an attribute.
    pub fn with_attr(mut self, name: &str, namespace: Option<&str>, value: impl Into<String>) -> Self {
        self.attributes.push(Attribute {
            name: name.to_string(),
            namespace: namespace.map(str::to_string),
            value: value.into(),
        });
        self
    }

    /// Builder: add a child element.
    pub fn with_child(mut self, child: Element) -> Self {
        self.children.push(Node::Element(child));
        self
    }

    /// Local part of the element name.
    pub fn local_name(&self) -> &str {
        split_name(&self.name).1
    }

    /// Prefix of the element name, if any.
    pub fn prefix(&self) -> Option<&str> {
        split_name(&self.name).0
    }

    /// Whether this element is `{ns}local`.
    ///
    /// An element whose prefix could not be resolved matches on local name
    /// alone.
    pub fn is(&self, ns: &str, local: &str) -> bool {
        self.local_name() == local && self.namespace.as_deref().is_none_or(|n| n == ns)
    }

    /// Child elements.
    pub fn elements(&self) -> impl Iterator<Item = &Element> {
        self.children.iter().filter_map(Node::as_element)
    }

    /// Mutable child elements.
    pub fn elements_mut(&mut self) -> impl Iterator<Item = &mut Element> {
        self.children.iter_mut().filter_map(Node::as_element_mut)
    }

    /// Child elements named `{ns}local`.
    pub fn children_named<'a>(
        &'a self,
        ns: &'a str,
        local: &'a str,
    ) -> impl Iterator<Item = &'a Element> + 'a {
        self.elements().filter(move |el| el.is(ns, local))
    }

    /// First child element named `{ns}local`.
    pub fn child(&self, ns: &str, local: &str) -> Option<&Element> {
        self.elements().find(|el| el.is(ns, local))
    }

    /// First child element named `{ns}local`, mutably.
    pub fn child_mut(&mut self, ns: &str, local: &str) -> Option<&mut Element> {
        self.elements_mut().find(|el| el.is(ns, local))
    }

    /// All descendants named `{ns}local` in document order (self excluded).
    pub fn descendants(&self, ns: &str, local: &str) -> Vec<&Element> {
        let mut out = Vec::new();
        self.collect_descendants(ns, local, &mut out);
        out
    }

    fn collect_descendants<'a>(&'a self, ns: &str, local: &str, out: &mut Vec<&'a Element>) {
        for child in self.elements() {
            if child.is(ns, local) {
                out.push(child);
            }
            child.collect_descendants(ns, local, out);
        }
    }

    /// Visit this element and every descendant element, pre-order.
    pub fn walk_mut<F: FnMut(&mut Element)>(&mut self, f: &mut F) {
        f(self);
        for child in self.elements_mut() {
            child.walk_mut(f);
        }
    }

    /// Index of the attribute `{ns}local`, falling back to a bare `local`.
    fn attr_index(&self, ns: &str, local: &str) -> Option<usize> {
        self.attributes
            .iter()
            .position(|a| a.namespace.as_deref() == Some(ns) && a.local_name() == local)
            .or_else(|| self.attributes.iter().position(|a| a.name == local))
    }

    /// Attribute value for `{ns}local`, falling back to a bare `local`.
    pub fn attr(&self, ns: &str, local: &str) -> Option<&str> {
        self.attr_index(ns, local)
            .map(|i| self.attributes[i].value.as_str())
    }

    /// Attribute value by exact qualified name, ignoring namespaces.
    pub fn raw_attr(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|a| a.name == name)
            .map(|a| a.value.as_str())
    }

    /// Set `{ns}local`, updating whichever spelling already exists.
    ///
    /// A new attribute borrows the element's own prefix when the element is
    /// in the same namespace.
    pub fn set_attr(&mut self, ns: &str, local: &str, value: impl Into<String>) {
        let value = value.into();
        match self.attr_index(ns, local) {
            Some(i) => self.attributes[i].value = value,
            None => {
                let name = match self.prefix() {
                    Some(prefix) if self.namespace.as_deref() == Some(ns) => {
                        format!("{prefix}:{local}")
                    }
                    _ => local.to_string(),
                };
                self.attributes.push(Attribute {
                    name,
                    namespace: Some(ns.to_string()),
                    value,
                });
            }
        }
    }

    /// Remove `{ns}local` (or bare `local`), returning its value.
    pub fn remove_attr(&mut self, ns: &str, local: &str) -> Option<String> {
        self.attr_index(ns, local)
            .map(|i| self.attributes.remove(i).value)
    }

    /// Concatenated character data of this element and its descendants.
    pub fn text(&self) -> String {
        let mut out = String::new();
        self.collect_text(&mut out);
        out
    }

    fn collect_text(&self, out: &mut String) {
        for child in &self.children {
            match child {
                Node::Text(t) | Node::CData(t) => out.push_str(t),
                Node::Element(el) => el.collect_text(out),
                _ => {}
            }
        }
    }

    /// Index (into `children`) of the last child element, if any.
    pub fn last_element_index(&self) -> Option<usize> {
        self.children
            .iter()
            .rposition(|n| matches!(n, Node::Element(_)))
    }

    /// Number of child elements.
    pub fn element_count(&self) -> usize {
        self.elements().count()
    }

    /// URI declared for `prefix` on this element (`None` = default namespace).
    pub fn declared_namespace(&self, prefix: Option<&str>) -> Option<&str> {
        let name = match prefix {
            Some(p) => format!("xmlns:{p}"),
            None => "xmlns".to_string(),
        };
        self.raw_attr(&name)
    }

    /// Declare `xmlns:prefix="uri"` on this element.
    pub fn declare_namespace(&mut self, prefix: &str, uri: &str) {
        self.attributes.push(Attribute {
            name: format!("xmlns:{prefix}"),
            namespace: Some(XMLNS_NS.to_string()),
            value: uri.to_string(),
        });
    }

    /// Prefixes used by element and attribute names in this subtree.
    pub fn used_prefixes(&self, out: &mut BTreeSet<String>) {
        if let Some(prefix) = self.prefix() {
            out.insert(prefix.to_string());
        }
        for attr in &self.attributes {
            match attr.prefix() {
                Some("xmlns") | Some("xml") | None => {}
                Some(prefix) => {
                    out.insert(prefix.to_string());
                }
            }
        }
        for child in self.elements() {
            child.used_prefixes(out);
        }
    }
}

/// A parsed XML part.
#[derive(Debug, Clone, PartialEq)]
pub struct XmlDocument {
    /// Document element
    pub root: Element,
}

impl XmlDocument {
    /// Wrap a root element.
    pub fn new(root: Element) -> Self {
        Self { root }
    }

    /// Parse raw part bytes (UTF-8 or UTF-16, with or without BOM).
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        let xml = decode_xml_bytes(bytes)?;
        Self::parse_str(&xml)
    }

    /// Parse an XML string.
    pub fn parse_str(xml: &str) -> Result<Self> {
        let mut reader = Reader::from_str(xml);
        reader.config_mut().trim_text(false);

        let mut stack: Vec<Element> = Vec::new();
        let mut scopes: Vec<Vec<(String, String)>> = Vec::new();
        let mut root: Option<Element> = None;

        loop {
            match reader.read_event().map_err(malformed)? {
                Event::Start(e) => {
                    let el = open_element(&e, &mut scopes)?;
                    stack.push(el);
                }
                Event::Empty(e) => {
                    let el = open_element(&e, &mut scopes)?;
                    scopes.pop();
                    attach(el, &mut stack, &mut root)?;
                }
                Event::End(_) => {
                    let el = stack
                        .pop()
                        .ok_or_else(|| Error::MalformedXml("unexpected closing tag".to_string()))?;
                    scopes.pop();
                    attach(el, &mut stack, &mut root)?;
                }
                Event::Text(e) => {
                    if let Some(parent) = stack.last_mut() {
                        let text = e.unescape().map_err(malformed)?;
                        parent.children.push(Node::Text(text.into_owned()));
                    }
                }
                Event::CData(e) => {
                    if let Some(parent) = stack.last_mut() {
                        let text = String::from_utf8_lossy(&e.into_inner()).into_owned();
                        parent.children.push(Node::CData(text));
                    }
                }
                Event::Comment(e) => {
                    if let Some(parent) = stack.last_mut() {
                        let text = String::from_utf8_lossy(&e).into_owned();
                        parent.children.push(Node::Comment(text));
                    }
                }
                Event::PI(e) => {
                    if let Some(parent) = stack.last_mut() {
                        let text = String::from_utf8_lossy(&e).into_owned();
                        parent.children.push(Node::ProcessingInstruction(text));
                    }
                }
                Event::Eof => break,
                _ => {}
            }
        }

        if let Some(open) = stack.last() {
            return Err(Error::MalformedXml(format!("unclosed element <{}>", open.name)));
        }

        root.map(Self::new)
            .ok_or_else(|| Error::MalformedXml("document has no root element".to_string()))
    }

    /// Serialize to UTF-8 bytes with a standalone XML declaration.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut writer = Writer::new(Vec::new());
        writer
            .write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), Some("yes"))))
            .map_err(write_err)?;
        writer.get_mut().extend_from_slice(b"\r\n");
        write_element(&mut writer, &self.root)?;
        Ok(writer.into_inner())
    }
}

fn malformed(err: impl Display) -> Error {
    Error::MalformedXml(err.to_string())
}

fn write_err(err: impl Display) -> Error {
    Error::Container(format!("XML write error: {}", err))
}

fn resolve_prefix(scopes: &[Vec<(String, String)>], prefix: &str) -> Option<String> {
    if prefix == "xml" {
        return Some(XML_NS.to_string());
    }
    if prefix == "xmlns" {
        return Some(XMLNS_NS.to_string());
    }
    scopes
        .iter()
        .rev()
        .flat_map(|frame| frame.iter().rev())
        .find(|(p, _)| p == prefix)
        .map(|(_, uri)| uri.clone())
}

/// Build an element from a start tag and push its namespace frame.
fn open_element(e: &BytesStart<'_>, scopes: &mut Vec<Vec<(String, String)>>) -> Result<Element> {
    let name = String::from_utf8_lossy(e.name().as_ref()).into_owned();

    let mut raw = Vec::new();
    let mut frame = Vec::new();
    for attr in e.attributes() {
        let attr = attr.map_err(malformed)?;
        let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
        let value = attr.unescape_value().map_err(malformed)?.into_owned();
        if key == "xmlns" {
            frame.push((String::new(), value.clone()));
        } else if let Some(prefix) = key.strip_prefix("xmlns:") {
            frame.push((prefix.to_string(), value.clone()));
        }
        raw.push((key, value));
    }
    scopes.push(frame);

    let (prefix, _) = split_name(&name);
    let namespace = resolve_prefix(scopes, prefix.unwrap_or(""));

    let attributes = raw
        .into_iter()
        .map(|(key, value)| {
            let namespace = match split_name(&key) {
                _ if key == "xmlns" => Some(XMLNS_NS.to_string()),
                (Some(prefix), _) => resolve_prefix(scopes, prefix),
                (None, _) => None,
            };
            Attribute {
                name: key,
                namespace,
                value,
            }
        })
        .collect();

    Ok(Element {
        name,
        namespace,
        attributes,
        children: Vec::new(),
    })
}

fn attach(el: Element, stack: &mut [Element], root: &mut Option<Element>) -> Result<()> {
    if let Some(parent) = stack.last_mut() {
        parent.children.push(Node::Element(el));
        return Ok(());
    }
    if root.is_some() {
        return Err(Error::MalformedXml("multiple root elements".to_string()));
    }
    *root = Some(el);
    Ok(())
}

fn write_element(writer: &mut Writer<Vec<u8>>, el: &Element) -> Result<()> {
    let mut start = BytesStart::new(el.name.as_str());
    for attr in &el.attributes {
        start.push_attribute((attr.name.as_str(), attr.value.as_str()));
    }

    if el.children.is_empty() {
        writer.write_event(Event::Empty(start)).map_err(write_err)?;
        return Ok(());
    }

    writer.write_event(Event::Start(start)).map_err(write_err)?;
    for child in &el.children {
        match child {
            Node::Element(child) => write_element(writer, child)?,
            Node::Text(text) => writer
                .write_event(Event::Text(BytesText::new(text)))
                .map_err(write_err)?,
            Node::CData(text) => writer
                .write_event(Event::CData(BytesCData::new(text.as_str())))
                .map_err(write_err)?,
            Node::Comment(text) => writer
                .write_event(Event::Comment(BytesText::from_escaped(text.as_str())))
                .map_err(write_err)?,
            Node::ProcessingInstruction(text) => writer
                .write_event(Event::PI(BytesPI::new(text.as_str())))
                .map_err(write_err)?,
        }
    }
    writer
        .write_event(Event::End(BytesEnd::new(el.name.as_str())))
        .map_err(write_err)?;
    Ok(())
}
