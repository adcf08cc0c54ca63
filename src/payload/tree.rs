use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use serde_json::{Map, Value};
use tracing::debug;

use crate::{Error, Result};

/// Key under which a node's own text is projected when it also has
/// attributes or children.
pub const CONTENT_KEY: &str = "#content";

/// Prefix for attribute keys in the projected value.
pub const ATTRIBUTE_PREFIX: &str = "-";

/// One element of a decoded payload, independent of any schema.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenericNode {
    pub tag: String,
    pub attributes: Vec<(String, String)>,
    /// Child slots in order of first appearance, one per distinct tag.
    pub children: Vec<(String, Child)>,
    pub text: Option<String>,
}

/// The children sharing one tag under a parent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Child {
    Single(GenericNode),
    /// Two or more siblings with the same tag, in document order.
    Repeated(Vec<GenericNode>),
}

impl Child {
    pub fn nodes(&self) -> &[GenericNode] {
        match self {
            Child::Single(node) => std::slice::from_ref(node),
            Child::Repeated(nodes) => nodes,
        }
    }

    pub fn to_value(&self) -> Value {
        match self {
            Child::Single(node) => node.to_value(),
            Child::Repeated(nodes) => Value::Array(nodes.iter().map(GenericNode::to_value).collect()),
        }
    }
}

impl GenericNode {
    pub fn new(tag: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            attributes: Vec::new(),
            children: Vec::new(),
            text: None,
        }
    }

    pub fn child(&self, tag: &str) -> Option<&Child> {
        self.children
            .iter()
            .find(|(name, _)| name == tag)
            .map(|(_, child)| child)
    }

    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    /// Attach `node`, promoting an existing same-tag slot to a list.
    pub fn add_child(&mut self, node: GenericNode) {
        match self.children.iter_mut().find(|(name, _)| *name == node.tag) {
            Some((_, slot)) => {
                let previous = std::mem::replace(slot, Child::Repeated(Vec::new()));
                *slot = match previous {
                    Child::Single(first) => Child::Repeated(vec![first, node]),
                    Child::Repeated(mut nodes) => {
                        nodes.push(node);
                        Child::Repeated(nodes)
                    }
                };
            }
            None => self.children.push((node.tag.clone(), Child::Single(node))),
        }
    }

    /// Trimmed text is appended; split runs are joined with one space.
    pub fn append_text(&mut self, text: &str) {
        let text = text.trim();
        if text.is_empty() {
            return;
        }
        match &mut self.text {
            Some(existing) => {
                existing.push(' ');
                existing.push_str(text);
            }
            None => self.text = Some(text.to_string()),
        }
    }

    /// Project the node onto a JSON-like value.
    ///
    /// A bare element becomes its text (empty string if none). Anything with
    /// attributes or children becomes an object: attributes under `-name`,
    /// children under their tag (repeated tags as arrays), text under
    /// `#content`.
    pub fn to_value(&self) -> Value {
        if self.attributes.is_empty() && self.children.is_empty() {
            return Value::String(self.text.clone().unwrap_or_default());
        }

        let mut map = Map::new();
        for (name, value) in &self.attributes {
            map.insert(
                format!("{}{}", ATTRIBUTE_PREFIX, name),
                Value::String(value.clone()),
            );
        }
        for (tag, child) in &self.children {
            map.insert(tag.clone(), child.to_value());
        }
        if let Some(text) = &self.text {
            map.insert(CONTENT_KEY.to_string(), Value::String(text.clone()));
        }
        Value::Object(map)
    }

    /// The whole document: `{ <root tag>: <root value> }`.
    pub fn to_document_value(&self) -> Value {
        let mut map = Map::new();
        map.insert(self.tag.clone(), self.to_value());
        Value::Object(map)
    }
}

/// Parse a markup payload into a [`GenericNode`] tree.
///
/// Single forward scan with a stack of open elements. Input that ends with
/// elements still open is accepted: they are closed in place and the root is
/// returned. Mismatched end tags and bad escapes are errors.
pub fn decode(input: &str) -> Result<GenericNode> {
    let mut reader = Reader::from_str(input);
    let mut stack: Vec<GenericNode> = Vec::new();
    let mut root: Option<GenericNode> = None;

    loop {
        match reader.read_event()? {
            Event::Start(start) => stack.push(open(&start)?),
            Event::Empty(start) => {
                let node = open(&start)?;
                attach(&mut stack, &mut root, node);
            }
            Event::End(_) => {
                if let Some(node) = stack.pop() {
                    attach(&mut stack, &mut root, node);
                }
            }
            Event::Text(text) => {
                let text = text.unescape()?;
                if let Some(current) = stack.last_mut() {
                    current.append_text(&text);
                }
            }
            Event::CData(data) => {
                let data = data.into_inner();
                if let Some(current) = stack.last_mut() {
                    current.append_text(&String::from_utf8_lossy(&data));
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    if !stack.is_empty() {
        debug!("Payload ended with {} open element(s)", stack.len());
    }
    while let Some(node) = stack.pop() {
        attach(&mut stack, &mut root, node);
    }

    root.ok_or_else(|| Error::InvalidMessage {
        message: "payload has no root element".to_string(),
    })
}

fn open(start: &BytesStart<'_>) -> Result<GenericNode> {
    let mut node = GenericNode::new(unescape_name(&String::from_utf8_lossy(
        start.local_name().as_ref(),
    )));

    for attribute in start.attributes() {
        let attribute = attribute.map_err(quick_xml::Error::from)?;
        let name = unescape_name(&String::from_utf8_lossy(attribute.key.local_name().as_ref()));
        let value = attribute.unescape_value()?.into_owned();
        node.attributes.push((name, value));
    }
    Ok(node)
}

/// Undo the `_xHHHH_` escapes SQL Server writes for characters that are not
/// legal in element names, so `unit_x0020_price` becomes `unit price`.
///
/// Eight-digit escapes (`_xHHHHHHHH_`) cover characters outside the BMP.
/// Sequences that are not a valid escape are kept as written.
pub fn unescape_name(raw: &str) -> String {
    if !raw.contains("_x") {
        return raw.to_string();
    }

    let mut name = String::with_capacity(raw.len());
    let mut rest = raw;
    while let Some(at) = rest.find("_x") {
        name.push_str(&rest[..at]);
        let tail = &rest[at + 2..];
        match escaped_char(tail) {
            Some((c, consumed)) => {
                name.push(c);
                rest = &tail[consumed..];
            }
            None => {
                name.push_str("_x");
                rest = tail;
            }
        }
    }
    name.push_str(rest);
    name
}

fn escaped_char(tail: &str) -> Option<(char, usize)> {
    [8, 4].into_iter().find_map(|digits| {
        let hex = tail.get(..digits)?;
        if tail.as_bytes().get(digits) != Some(&b'_') || !hex.bytes().all(|b| b.is_ascii_hexdigit()) {
            return None;
        }
        let c = char::from_u32(u32::from_str_radix(hex, 16).ok()?)?;
        Some((c, digits + 1))
    })
}

fn attach(stack: &mut [GenericNode], root: &mut Option<GenericNode>, node: GenericNode) {
    match stack.last_mut() {
        Some(parent) => parent.add_child(node),
        None if root.is_none() => *root = Some(node),
        None => debug!("Ignoring extra top-level element <{}>", node.tag),
    }
}
