//! Element tree construction on top of `quick_xml::NsReader`.

use quick_xml::events::{BytesStart, Event};
use quick_xml::name::{Namespace, ResolveResult};
use quick_xml::NsReader;
use tracing::trace;

use crate::error::ParseError;

/// A parsed XML document with exactly one root element.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    root: Element,
}

/// A single element with its resolved namespace.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Element {
    namespace: Option<String>,
    name: String,
    attributes: Vec<(String, String)>,
    text: String,
    children: Vec<Element>,
}

impl Document {
    /// Parse a complete XML document.
    pub fn parse(xml: &str) -> Result<Self, ParseError> {
        let mut reader = NsReader::from_str(xml);
        reader.config_mut().trim_text(false);

        let mut stack: Vec<Element> = Vec::new();
        let mut root: Option<Element> = None;

        loop {
            let position = reader.buffer_position() as u64;
            let (resolved, event) = reader
                .read_resolved_event()
                .map_err(|e| malformed(position, e))?;
            let namespace = namespace_of(resolved);

            match event {
                Event::Start(start) => {
                    let element = open_element(namespace, &start, position)?;
                    if stack.is_empty() {
                        check_single_root(&root, &element)?;
                    }
                    stack.push(element);
                }
                Event::Empty(start) => {
                    let element = open_element(namespace, &start, position)?;
                    match stack.last_mut() {
                        Some(parent) => parent.children.push(element),
                        None => {
                            check_single_root(&root, &element)?;
                            root = Some(element);
                        }
                    }
                }
                Event::End(end) => {
                    let name = String::from_utf8_lossy(end.local_name().as_ref()).into_owned();
                    let element = stack.pop().ok_or_else(|| ParseError::UnexpectedEnd {
                        found: name.clone(),
                        position,
                    })?;
                    if element.name != name {
                        return Err(ParseError::UnexpectedEnd { found: name, position });
                    }
                    match stack.last_mut() {
                        Some(parent) => parent.children.push(element),
                        None => root = Some(element),
                    }
                }
                Event::Text(text) => {
                    if let Some(current) = stack.last_mut() {
                        let unescaped = text.unescape().map_err(|e| malformed(position, e))?;
                        current.text.push_str(&unescaped);
                    }
                }
                Event::CData(data) => {
                    if let Some(current) = stack.last_mut() {
                        current.text.push_str(&String::from_utf8_lossy(&data));
                    }
                }
                Event::Eof => break,
                // Declarations, comments, processing instructions and doctype
                // carry nothing the extractor reads.
                _ => {}
            }
        }

        if let Some(open) = stack.pop() {
            return Err(ParseError::Unclosed(open.name));
        }

        let root = root.ok_or(ParseError::NoRoot)?;
        trace!("Parsed XML document with root <{}>", root.name);
        Ok(Self { root })
    }

    /// The document's root element.
    pub fn root(&self) -> &Element {
        &self.root
    }
}

impl Element {
    /// Local (unprefixed) element name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Resolved namespace URI, if the element is bound to one.
    pub fn namespace(&self) -> Option<&str> {
        self.namespace.as_deref()
    }

    /// Direct text content, entity-unescaped and untrimmed.
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Value of an unprefixed attribute.
    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    /// Whether this element has the given namespace and local name.
    pub fn is(&self, ns: &str, name: &str) -> bool {
        self.name == name && self.namespace.as_deref() == Some(ns)
    }

    /// All direct children, in document order.
    pub fn elements(&self) -> &[Element] {
        &self.children
    }

    /// First direct child with the given qualified name.
    pub fn child(&self, ns: &str, name: &str) -> Option<&Element> {
        self.children.iter().find(|c| c.is(ns, name))
    }

    /// All direct children with the given qualified name, in document order.
    pub fn children<'a>(&'a self, ns: &'a str, name: &'a str) -> impl Iterator<Item = &'a Element> + 'a {
        self.children.iter().filter(move |c| c.is(ns, name))
    }

    /// First descendant (excluding `self`) in depth-first pre-order.
    pub fn descendant(&self, ns: &str, name: &str) -> Option<&Element> {
        for child in &self.children {
            if child.is(ns, name) {
                return Some(child);
            }
            if let Some(found) = child.descendant(ns, name) {
                return Some(found);
            }
        }
        None
    }

    /// Follow a `/`-separated chain of direct-child lookups.
    pub fn find(&self, ns: &str, path: &str) -> Option<&Element> {
        path.split('/')
            .filter(|segment| !segment.is_empty())
            .try_fold(self, |current, segment| current.child(ns, segment))
    }
}

fn namespace_of(resolved: ResolveResult<'_>) -> Option<String> {
    match resolved {
        ResolveResult::Bound(Namespace(uri)) => Some(String::from_utf8_lossy(uri).into_owned()),
        _ => None,
    }
}

fn open_element(
    namespace: Option<String>,
    start: &BytesStart<'_>,
    position: u64,
) -> Result<Element, ParseError> {
    let mut attributes = Vec::new();
    for attr in start.attributes() {
        let attr = attr.map_err(|e| malformed(position, e))?;
        if attr.key.as_namespace_binding().is_some() {
            continue;
        }
        let key = String::from_utf8_lossy(attr.key.local_name().as_ref()).into_owned();
        let value = attr
            .unescape_value()
            .map_err(|e| malformed(position, e))?
            .into_owned();
        attributes.push((key, value));
    }

    Ok(Element {
        namespace,
        name: String::from_utf8_lossy(start.local_name().as_ref()).into_owned(),
        attributes,
        text: String::new(),
        children: Vec::new(),
    })
}

fn check_single_root(existing: &Option<Element>, next: &Element) -> Result<(), ParseError> {
    match existing {
        Some(_) => Err(ParseError::MultipleRoots(next.name.clone())),
        None => Ok(()),
    }
}

fn malformed(position: u64, err: impl std::fmt::Display) -> ParseError {
    ParseError::Malformed {
        position,
        message: err.to_string(),
    }
}
