//! A small namespace-aware element tree over `quick_xml`.
//!
//! Feed documents are tiny compared to what streaming parsers are built for,
//! and mapping them is much easier against a tree. Input is transcoded to
//! UTF-8 first (BOM, then XML declaration, then UTF-8), so the reader itself
//! never sees a foreign encoding.
//!
//! SEC-002: DTDs are skipped and entity declarations never expanded.

use std::borrow::Cow;

use encoding_rs::{Encoding, UTF_16BE, UTF_16LE, UTF_8};
use quick_xml::escape::escape;
use quick_xml::events::{BytesStart, Event};
use quick_xml::name::{Namespace, QName, ResolveResult};
use quick_xml::NsReader;
use thiserror::Error;

use super::Ns;

/// How far into the document to look for an XML declaration.
const DECLARATION_WINDOW: usize = 1024;

#[derive(Debug, Error)]
pub enum XmlError {
    #[error("{0}")]
    Syntax(#[from] quick_xml::Error),

    #[error("document ended inside <{0}>")]
    Unclosed(String),

    #[error("document has no root element")]
    Empty,

    #[error("unsupported character encoding: {0}")]
    Encoding(String),
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Node {
    Element(Element),
    Text(String),
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Attribute {
    pub ns: Option<String>,
    pub prefix: Option<String>,
    pub name: String,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Element {
    /// Resolved namespace URI, `None` when unbound.
    pub ns: Option<String>,
    /// Literal prefix as written.
    pub prefix: Option<String>,
    pub name: String,
    pub attrs: Vec<Attribute>,
    pub children: Vec<Node>,
}

impl Element {
    pub fn is(&self, ns: &Ns, local: &str) -> bool {
        self.name == local && ns.matches(self.ns.as_deref(), self.prefix.as_deref())
    }

    pub fn child(&self, ns: &Ns, local: &str) -> Option<&Element> {
        self.elements().find(|e| e.is(ns, local))
    }

    pub fn children<'a>(
        &'a self,
        ns: &'a Ns,
        local: &'a str,
    ) -> impl Iterator<Item = &'a Element> + 'a {
        self.elements().filter(move |e| e.is(ns, local))
    }

    pub fn elements(&self) -> impl Iterator<Item = &Element> {
        self.children.iter().filter_map(|n| match n {
            Node::Element(e) => Some(e),
            Node::Text(_) => None,
        })
    }

    /// Unqualified attribute by local name.
    pub fn attr(&self, local: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|a| a.name == local && a.ns.is_none() && a.prefix.is_none())
            .map(|a| a.value.as_str())
    }

    pub fn attr_ns(&self, ns: &Ns, local: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|a| a.name == local && ns.matches(a.ns.as_deref(), a.prefix.as_deref()))
            .map(|a| a.value.as_str())
    }

    /// Character data of the element. Markup nested inside it (HTML pasted
    /// into a description without escaping) comes back serialized.
    pub fn text(&self) -> String {
        if self.elements().next().is_some() {
            return self.inner_xml();
        }
        self.children
            .iter()
            .filter_map(|n| match n {
                Node::Text(t) => Some(t.as_str()),
                Node::Element(_) => None,
            })
            .collect()
    }

    pub fn inner_xml(&self) -> String {
        let mut out = String::new();
        for child in &self.children {
            write_node(child, &mut out);
        }
        out
    }

    fn qualified_name(&self) -> Cow<'_, str> {
        match &self.prefix {
            Some(prefix) => Cow::Owned(format!("{prefix}:{}", self.name)),
            None => Cow::Borrowed(&self.name),
        }
    }
}

fn write_node(node: &Node, out: &mut String) {
    match node {
        Node::Text(text) => out.push_str(&escape(text.as_str())),
        Node::Element(el) => {
            out.push('<');
            out.push_str(&el.qualified_name());
            for attr in &el.attrs {
                out.push(' ');
                if let Some(prefix) = &attr.prefix {
                    out.push_str(prefix);
                    out.push(':');
                }
                out.push_str(&attr.name);
                out.push_str("=\"");
                out.push_str(&escape(attr.value.as_str()));
                out.push('"');
            }
            if el.children.is_empty() {
                out.push_str("/>");
                return;
            }
            out.push('>');
            for child in &el.children {
                write_node(child, out);
            }
            out.push_str("</");
            out.push_str(&el.qualified_name());
            out.push('>');
        }
    }
}

/// Parses a complete document and returns its root element.
pub(crate) fn parse(bytes: &[u8]) -> Result<Element, XmlError> {
    let text = transcode(bytes)?;
    let mut reader = NsReader::from_str(&text);

    let mut stack: Vec<Element> = Vec::new();
    let mut root: Option<Element> = None;

    loop {
        match reader.read_event()? {
            Event::Start(start) => stack.push(open_element(&reader, &start)),
            Event::Empty(start) => {
                let el = open_element(&reader, &start);
                attach(&mut stack, &mut root, el);
            }
            Event::End(_) => {
                if let Some(el) = stack.pop() {
                    attach(&mut stack, &mut root, el);
                }
            }
            Event::Text(text) => {
                if let Some(parent) = stack.last_mut() {
                    let value = text
                        .unescape()
                        .map(Cow::into_owned)
                        .unwrap_or_else(|_| String::from_utf8_lossy(&text).into_owned());
                    parent.children.push(Node::Text(value));
                }
            }
            Event::CData(data) => {
                if let Some(parent) = stack.last_mut() {
                    let value = String::from_utf8_lossy(&data.into_inner()).into_owned();
                    parent.children.push(Node::Text(value));
                }
            }
            Event::Eof => break,
            // Declarations, comments, processing instructions and DTDs.
            _ => {}
        }
    }

    if let Some(open) = stack.pop() {
        return Err(XmlError::Unclosed(open.name));
    }
    root.ok_or(XmlError::Empty)
}

fn attach(stack: &mut [Element], root: &mut Option<Element>, el: Element) {
    match stack.last_mut() {
        Some(parent) => parent.children.push(Node::Element(el)),
        None => {
            if root.is_none() {
                *root = Some(el);
            }
        }
    }
}

fn open_element(reader: &NsReader<&[u8]>, start: &BytesStart<'_>) -> Element {
    let (resolved, local) = reader.resolve_element(start.name());
    let (ns, prefix) = split_name(resolved, start.name());

    let mut attrs = Vec::new();
    let mut attributes = start.attributes();
    attributes.with_checks(false);
    for attr in attributes.flatten() {
        if attr.key.as_namespace_binding().is_some() {
            continue;
        }
        let (resolved, attr_local) = reader.resolve_attribute(attr.key);
        let (attr_ns, attr_prefix) = split_name(resolved, attr.key);
        let value = attr
            .unescape_value()
            .map(Cow::into_owned)
            .unwrap_or_else(|_| String::from_utf8_lossy(&attr.value).into_owned());
        attrs.push(Attribute {
            ns: attr_ns,
            prefix: attr_prefix,
            name: String::from_utf8_lossy(attr_local.as_ref()).into_owned(),
            value,
        });
    }

    Element {
        ns,
        prefix,
        name: String::from_utf8_lossy(local.as_ref()).into_owned(),
        attrs,
        children: Vec::new(),
    }
}

fn split_name(resolved: ResolveResult<'_>, qname: QName<'_>) -> (Option<String>, Option<String>) {
    let prefix = qname
        .prefix()
        .map(|p| String::from_utf8_lossy(p.as_ref()).into_owned());
    match resolved {
        ResolveResult::Bound(Namespace(uri)) => (Some(String::from_utf8_lossy(uri).into_owned()), prefix),
        _ => (None, prefix),
    }
}

/// Decodes the document to UTF-8. A BOM wins over the declaration.
fn transcode(bytes: &[u8]) -> Result<Cow<'_, str>, XmlError> {
    let encoding = match declared_label(bytes) {
        Some(label) => match Encoding::for_label(label.as_bytes()) {
            Some(encoding) => encoding,
            None if Encoding::for_bom(bytes).is_none() && std::str::from_utf8(bytes).is_err() => {
                return Err(XmlError::Encoding(label));
            }
            None => {
                tracing::debug!(label = %label, "Unknown XML encoding label, reading as UTF-8");
                UTF_8
            }
        },
        None => UTF_8,
    };
    // A UTF-16 label on bytes without a UTF-16 BOM is a mislabelled ASCII-compatible document.
    let is_utf16 = encoding == UTF_16LE || encoding == UTF_16BE;
    let encoding = if is_utf16 && Encoding::for_bom(bytes).is_none() {
        tracing::debug!(label = encoding.name(), "UTF-16 declared without a BOM, reading as UTF-8");
        UTF_8
    } else {
        encoding
    };

    let (text, used, had_errors) = encoding.decode(bytes);
    if had_errors {
        tracing::debug!(encoding = used.name(), "Replaced malformed sequences while decoding feed");
    }
    Ok(text)
}

/// The `encoding` pseudo-attribute of the XML declaration, if any.
fn declared_label(bytes: &[u8]) -> Option<String> {
    let head = String::from_utf8_lossy(&bytes[..bytes.len().min(DECLARATION_WINDOW)]);
    let head = head.trim_start_matches('\u{feff}').trim_start();
    if !head.starts_with("<?xml") {
        return None;
    }
    let decl = &head[..head.find("?>")?];
    let after = &decl[decl.find("encoding")? + "encoding".len()..];
    let after = after.trim_start().strip_prefix('=')?.trim_start();
    let quote = after.chars().next().filter(|c| *c == '"' || *c == '\'')?;
    let value = &after[1..];
    let value = &value[..value.find(quote)?];
    Some(value.trim().to_owned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::{ATOM, CONTENT, DC, RSS};

    #[test]
    fn test_parse_simple_tree() {
        let root = parse(b"<rss version=\"2.0\"><channel><title>T</title></channel></rss>").unwrap();
        assert_eq!(root.name, "rss");
        assert_eq!(root.attr("version"), Some("2.0"));
        let channel = root.child(&RSS, "channel").unwrap();
        assert_eq!(channel.child(&RSS, "title").unwrap().text(), "T");
    }

    #[test]
    fn test_entities_and_cdata() {
        let root = parse(b"<a><b>Ben &amp; Jerry</b><c><![CDATA[<p>raw</p>]]></c></a>").unwrap();
        assert_eq!(root.child(&RSS, "b").unwrap().text(), "Ben & Jerry");
        assert_eq!(root.child(&RSS, "c").unwrap().text(), "<p>raw</p>");
    }

    #[test]
    fn test_namespaces_resolved() {
        let doc = br#"<feed xmlns="http://www.w3.org/2005/Atom" xmlns:d="http://purl.org/dc/elements/1.1/">
            <title>Atom</title><d:creator>Jane</d:creator></feed>"#;
        let root = parse(doc).unwrap();
        assert!(root.is(&ATOM, "feed"));
        assert_eq!(root.child(&ATOM, "title").unwrap().text(), "Atom");
        // Bound under a non-conventional prefix, still Dublin Core.
        assert_eq!(root.child(&DC, "creator").unwrap().text(), "Jane");
        // A namespaced element is never mistaken for a core one.
        assert!(root.child(&RSS, "creator").is_none());
    }

    #[test]
    fn test_undeclared_prefix_falls_back_to_convention() {
        let root = parse(b"<item><content:encoded>Body</content:encoded></item>").unwrap();
        assert_eq!(root.child(&CONTENT, "encoded").unwrap().text(), "Body");
        assert!(root.child(&RSS, "encoded").is_none());
    }

    #[test]
    fn test_nested_markup_serialized() {
        let root = parse(b"<d>Hello <b class=\"x\">world</b><br/></d>").unwrap();
        assert_eq!(root.text(), "Hello <b class=\"x\">world</b><br/>");
    }

    #[test]
    fn test_latin1_declaration_transcoded() {
        let mut doc = b"<?xml version=\"1.0\" encoding=\"ISO-8859-1\"?><t>caf".to_vec();
        doc.push(0xE9);
        doc.extend_from_slice(b"</t>");
        let root = parse(&doc).unwrap();
        assert_eq!(root.text(), "caf\u{e9}");
    }

    #[test]
    fn test_utf16_bom_transcoded() {
        let mut doc = vec![0xFF, 0xFE];
        for unit in "<t>hi</t>".encode_utf16() {
            doc.extend_from_slice(&unit.to_le_bytes());
        }
        assert_eq!(parse(&doc).unwrap().text(), "hi");
    }

    #[test]
    fn test_utf16_label_without_bom_read_as_utf8() {
        let doc = br#"<?xml version="1.0" encoding="UTF-16"?><rss version="2.0"><channel><title>T</title></channel></rss>"#;
        let root = parse(doc).unwrap();
        assert_eq!(root.name, "rss");
        let channel = root.child(&RSS, "channel").unwrap();
        assert_eq!(channel.child(&RSS, "title").unwrap().text(), "T");
    }

    #[test]
    fn test_unknown_label_with_invalid_bytes_is_encoding_error() {
        let doc = b"<?xml version=\"1.0\" encoding=\"x-bogus\"?><t>\xff\xfe\xfd</t>";
        assert!(matches!(parse(doc), Err(XmlError::Encoding(label)) if label == "x-bogus"));
    }

    #[test]
    fn test_unclosed_document() {
        assert!(parse(b"<rss><channel>").is_err());
    }

    #[test]
    fn test_mismatched_end_tag() {
        assert!(matches!(parse(b"<a><b></a>"), Err(XmlError::Syntax(_))));
    }

    #[test]
    fn test_empty_document() {
        assert!(matches!(parse(b"   "), Err(XmlError::Empty)));
    }

    #[test]
    fn test_declared_label() {
        assert_eq!(
            declared_label(b"<?xml version='1.0' encoding='windows-1252'?><a/>").as_deref(),
            Some("windows-1252")
        );
        assert_eq!(declared_label(b"<?xml version=\"1.0\"?><a/>"), None);
        assert_eq!(declared_label(b"<a encoding=\"x\"/>"), None);
    }
}
