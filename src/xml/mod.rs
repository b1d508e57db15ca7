//! Minimal XML layer for `main.xml`.
//!
//! Reading builds a small element tree from quick-xml events; namespace
//! prefixes are dropped so `p:ISO5436_2` and `ISO5436_2` compare equal.
//! Writing is a thin event writer with two-space indentation.

use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::{Reader, Writer};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum XmlError {
    #[error("XML syntax error at byte {position}: {message}")]
    Syntax { position: String, message: String },
    #[error("Unbalanced element structure: {0}")]
    Structure(String),
    #[error("XML write error: {0}")]
    Write(String),
}

// ── Element tree ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Element {
    /// Local name, prefix stripped.
    pub name:     String,
    text:         Option<String>,
    pub children: Vec<Element>,
}

impl Element {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into(), text: None, children: Vec::new() }
    }

    /// Text content, `None` when the element was empty.
    pub fn text(&self) -> Option<&str> {
        self.text.as_deref().filter(|t| !t.is_empty())
    }

    pub fn child(&self, name: &str) -> Option<&Element> {
        self.children.iter().find(|c| c.name == name)
    }

    pub fn child_text(&self, name: &str) -> Option<&str> {
        self.child(name).and_then(Element::text)
    }

    pub fn children_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a Element> + 'a {
        self.children.iter().filter(move |c| c.name == name)
    }

    /// First descendant with `name`, depth first.
    pub fn find(&self, name: &str) -> Option<&Element> {
        for c in &self.children {
            if c.name == name {
                return Some(c);
            }
            if let Some(found) = c.find(name) {
                return Some(found);
            }
        }
        None
    }

    fn push_text(&mut self, s: &str) {
        self.text.get_or_insert_with(String::new).push_str(s);
    }
}

fn local_name(name: &[u8]) -> Result<String, XmlError> {
    let s = std::str::from_utf8(name).map_err(|e| XmlError::Structure(e.to_string()))?;
    Ok(match s.rfind(':') {
        Some(pos) => s[pos + 1..].to_owned(),
        None      => s.to_owned(),
    })
}

fn attach(stack: &mut [Element], root: &mut Option<Element>, el: Element) -> Result<(), XmlError> {
    match stack.last_mut() {
        Some(parent) => parent.children.push(el),
        None if root.is_none() => *root = Some(el),
        None => return Err(XmlError::Structure(format!("second root element <{}>", el.name))),
    }
    Ok(())
}

/// Parse a document into its root element.
pub fn parse(bytes: &[u8]) -> Result<Element, XmlError> {
    let mut reader = Reader::from_reader(bytes);
    reader.config_mut().trim_text(true);

    let mut buf = Vec::new();
    let mut stack: Vec<Element> = Vec::new();
    let mut root: Option<Element> = None;

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(ref e)) => {
                stack.push(Element::new(local_name(e.name().as_ref())?));
            }
            Ok(Event::Empty(ref e)) => {
                let el = Element::new(local_name(e.name().as_ref())?);
                attach(&mut stack, &mut root, el)?;
            }
            Ok(Event::Text(ref t)) => {
                let s = t.unescape().map_err(|e| XmlError::Syntax {
                    position: reader.buffer_position().to_string(),
                    message:  e.to_string(),
                })?;
                if let Some(top) = stack.last_mut() {
                    top.push_text(&s);
                }
            }
            Ok(Event::CData(ref c)) => {
                if let Some(top) = stack.last_mut() {
                    top.push_text(&String::from_utf8_lossy(&c.clone().into_inner()));
                }
            }
            Ok(Event::End(_)) => {
                let el = stack
                    .pop()
                    .ok_or_else(|| XmlError::Structure("closing tag without opening tag".to_owned()))?;
                attach(&mut stack, &mut root, el)?;
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                return Err(XmlError::Syntax {
                    position: reader.buffer_position().to_string(),
                    message:  e.to_string(),
                })
            }
            _ => {}
        }
        buf.clear();
    }

    if let Some(open) = stack.last() {
        return Err(XmlError::Structure(format!("<{}> is never closed", open.name)));
    }
    root.ok_or_else(|| XmlError::Structure("document has no root element".to_owned()))
}

// ── Writer ───────────────────────────────────────────────────────────────────

pub struct XmlWriter {
    inner: Writer<Vec<u8>>,
}

impl Default for XmlWriter {
    fn default() -> Self {
        Self::new()
    }
}

impl XmlWriter {
    pub fn new() -> Self {
        Self { inner: Writer::new_with_indent(Vec::new(), b' ', 2) }
    }

    fn emit(&mut self, event: Event<'_>) -> Result<(), XmlError> {
        self.inner
            .write_event(event)
            .map_err(|e| XmlError::Write(e.to_string()))
    }

    pub fn declaration(&mut self) -> Result<(), XmlError> {
        self.emit(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))
    }

    pub fn start(&mut self, name: &str) -> Result<(), XmlError> {
        self.emit(Event::Start(BytesStart::new(name)))
    }

    pub fn start_with_attrs(&mut self, name: &str, attrs: &[(&str, &str)]) -> Result<(), XmlError> {
        let start = BytesStart::new(name).with_attributes(attrs.iter().copied());
        self.emit(Event::Start(start))
    }

    pub fn end(&mut self, name: &str) -> Result<(), XmlError> {
        self.emit(Event::End(BytesEnd::new(name)))
    }

    pub fn empty(&mut self, name: &str) -> Result<(), XmlError> {
        self.emit(Event::Empty(BytesStart::new(name)))
    }

    /// `<name>text</name>`, escaped.
    pub fn text_element(&mut self, name: &str, text: &str) -> Result<(), XmlError> {
        if text.is_empty() {
            return self.empty(name);
        }
        self.start(name)?;
        self.emit(Event::Text(BytesText::new(text)))?;
        self.end(name)
    }

    pub fn into_inner(self) -> Vec<u8> {
        self.inner.into_inner()
    }
}
