//! Generic XML → tree parsing.
//!
//! Produces a `serde_json::Value` in the shape the mappers expect:
//! - element children are keyed by their qualified tag name (`dc:title`)
//! - repeated sibling tags collapse into an array, a single one stays bare
//! - attributes are keyed with a prefix (`@_id`)
//! - an element with attributes or children keeps its text under a reserved
//!   key (`#text`); an element with neither becomes its text as a string
//!
//! Values are never coerced: numbers and dates stay strings.

use quick_xml::events::{BytesDecl, BytesStart, Event};
use quick_xml::Reader as XmlReader;
use serde_json::{Map, Value};

use crate::error::XmlError;

pub const ATTRIBUTE_PREFIX: &str = "@_";
pub const TEXT_KEY: &str = "#text";

/// Key naming for the produced tree. The access helpers below and the
/// mappers expect `ParseOptions::default()`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseOptions {
    pub attribute_prefix: String,
    pub text_key: String,
}

impl Default for ParseOptions {
    fn default() -> Self {
        Self {
            attribute_prefix: ATTRIBUTE_PREFIX.to_string(),
            text_key: TEXT_KEY.to_string(),
        }
    }
}

struct Frame {
    name: String,
    fields: Map<String, Value>,
    text: String,
}

impl Frame {
    fn new(name: String) -> Self {
        Self {
            name,
            fields: Map::new(),
            text: String::new(),
        }
    }

    fn into_value(self, opts: &ParseOptions) -> Value {
        if self.fields.is_empty() {
            return Value::String(self.text);
        }
        let mut fields = self.fields;
        if !self.text.is_empty() {
            fields.insert(opts.text_key.clone(), Value::String(self.text));
        }
        Value::Object(fields)
    }
}

/// Parse XML text into a generic tree. The returned value is always an object
/// holding the root element (and `?xml` when a declaration is present).
pub fn parse(text: &str, opts: &ParseOptions) -> Result<Value, XmlError> {
    let mut reader = XmlReader::from_str(text);
    reader.config_mut().trim_text(true);

    let mut stack: Vec<Frame> = vec![Frame::new(String::new())];

    loop {
        match reader.read_event() {
            Ok(Event::Start(ref e)) => {
                let frame = start_frame(e, opts).map_err(|d| malformed(&reader, d))?;
                stack.push(frame);
            }
            Ok(Event::Empty(ref e)) => {
                let frame = start_frame(e, opts).map_err(|d| malformed(&reader, d))?;
                close_frame(&mut stack, frame, opts);
            }
            Ok(Event::End(_)) => {
                if stack.len() < 2 {
                    return Err(malformed(&reader, "unexpected closing tag".into()));
                }
                if let Some(frame) = stack.pop() {
                    close_frame(&mut stack, frame, opts);
                }
            }
            Ok(Event::Text(ref e)) => {
                let content = e
                    .unescape()
                    .map_err(|err| malformed(&reader, err.to_string()))?;
                if stack.len() > 1 {
                    if let Some(frame) = stack.last_mut() {
                        frame.text.push_str(&content);
                    }
                }
            }
            Ok(Event::CData(e)) => {
                if stack.len() > 1 {
                    if let Some(frame) = stack.last_mut() {
                        frame.text.push_str(&String::from_utf8_lossy(&e.into_inner()));
                    }
                }
            }
            Ok(Event::Decl(ref e)) => {
                let decl = declaration(e, opts);
                if let Some(root) = stack.first_mut() {
                    root.fields.insert("?xml".to_string(), decl);
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(malformed(&reader, e.to_string())),
            _ => {}
        }
    }

    if stack.len() > 1 {
        let open = stack.last().map(|f| f.name.clone()).unwrap_or_default();
        return Err(malformed(&reader, format!("unclosed element <{open}>")));
    }

    let root = stack.pop().map(|f| f.fields).unwrap_or_default();
    Ok(Value::Object(root))
}

fn malformed(reader: &XmlReader<&[u8]>, detail: String) -> XmlError {
    XmlError::Malformed {
        position: reader.buffer_position() as u64,
        detail,
    }
}

fn start_frame(e: &BytesStart<'_>, opts: &ParseOptions) -> Result<Frame, String> {
    let name = String::from_utf8_lossy(e.name().as_ref()).to_string();
    let mut frame = Frame::new(name);
    for attr in e.attributes() {
        let attr = attr.map_err(|err| err.to_string())?;
        let key = String::from_utf8_lossy(attr.key.as_ref());
        let value = attr.unescape_value().map_err(|err| err.to_string())?;
        frame.fields.insert(
            format!("{}{}", opts.attribute_prefix, key),
            Value::String(value.into_owned()),
        );
    }
    Ok(frame)
}

fn close_frame(stack: &mut [Frame], frame: Frame, opts: &ParseOptions) {
    let Some(parent) = stack.last_mut() else {
        return;
    };
    let name = frame.name.clone();
    let value = frame.into_value(opts);
    match parent.fields.get_mut(&name) {
        Some(Value::Array(items)) => items.push(value),
        Some(existing) => {
            let first = existing.take();
            *existing = Value::Array(vec![first, value]);
        }
        None => {
            parent.fields.insert(name, value);
        }
    }
}

fn declaration(e: &BytesDecl<'_>, opts: &ParseOptions) -> Value {
    let mut fields = Map::new();
    let mut put = |key: &str, raw: Option<Vec<u8>>| {
        if let Some(raw) = raw {
            fields.insert(
                format!("{}{}", opts.attribute_prefix, key),
                Value::String(String::from_utf8_lossy(&raw).into_owned()),
            );
        }
    };
    put("version", e.version().ok().map(|v| v.into_owned()));
    put("encoding", e.encoding().and_then(|r| r.ok()).map(|v| v.into_owned()));
    put("standalone", e.standalone().and_then(|r| r.ok()).map(|v| v.into_owned()));
    Value::Object(fields)
}

// --- Tree access helpers shared by the mappers ---
//
// These read the default key naming (`@_`, `#text`). Trees parsed with a
// custom `ParseOptions` must be walked by hand.

/// Treat a single value and a sequence uniformly. Absent → empty.
pub fn as_sequence(value: Option<&Value>) -> Vec<&Value> {
    match value {
        None | Some(Value::Null) => Vec::new(),
        Some(Value::Array(items)) => items.iter().collect(),
        Some(other) => vec![other],
    }
}

/// Follow child keys from `value`. A sequence along the way resolves to its
/// first element.
pub fn path<'a>(value: &'a Value, keys: &[&str]) -> Option<&'a Value> {
    keys.iter().try_fold(value, |node, key| {
        let node = match node {
            Value::Array(items) => items.first()?,
            other => other,
        };
        node.get(*key)
    })
}

/// Text of a node: a string is its own text, an object its text key, a
/// sequence its first element's text. Empty text counts as absent.
pub fn text_of(value: &Value) -> Option<String> {
    let text = match value {
        Value::String(s) => Some(s.clone()),
        Value::Object(_) => text_key_of(value),
        Value::Array(items) => items.first().and_then(text_of),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Null => None,
    };
    text.filter(|s| !s.is_empty())
}

/// Only the text-key form of an object; a bare string yields `None`.
pub fn text_key_of(value: &Value) -> Option<String> {
    value
        .get(TEXT_KEY)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// Attribute value of an element node.
pub fn attribute<'a>(value: &'a Value, name: &str) -> Option<&'a str> {
    value
        .get(format!("{ATTRIBUTE_PREFIX}{name}"))
        .and_then(Value::as_str)
}
