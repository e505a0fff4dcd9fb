//! LLSD structured values with their XML and JSON encodings.
//!
//! Only the subset exchanged with viewers is supported: the scalar types,
//! maps and arrays. Dates and UUIDs are carried as their text form.
//!
//! JSON has no tags for the typed scalars, so the JSON encoding is lossy:
//! `Uuid`, `Date` and `Uri` are written as plain strings and `Binary` as a
//! base64 string. Reading JSON back yields `String` for all four.

use std::collections::BTreeMap;
use std::fmt::Write;

use base64::Engine;
use serde_json::Value as Json;

use crate::xml::{self, Element};
use crate::{CodecError, Result};

pub const LLSD_XML: &str = "application/llsd+xml";
pub const LLSD_XML_ALT: &str = "application/xml+llsd";
pub const LLSD_JSON: &str = "application/llsd+json";

#[derive(Debug, Clone, PartialEq, Default)]
pub enum Llsd {
    #[default]
    Undef,
    Boolean(bool),
    Integer(i32),
    Real(f64),
    String(String),
    Uuid(String),
    Date(String),
    Uri(String),
    Binary(Vec<u8>),
    Map(BTreeMap<String, Llsd>),
    Array(Vec<Llsd>),
}

impl Llsd {
    pub fn map<K, I>(entries: I) -> Self
    where
        K: Into<String>,
        I: IntoIterator<Item = (K, Llsd)>,
    {
        Llsd::Map(entries.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }

    pub fn get(&self, key: &str) -> Option<&Llsd> {
        match self {
            Llsd::Map(map) => map.get(key),
            _ => None,
        }
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Llsd::String(s) | Llsd::Uuid(s) | Llsd::Date(s) | Llsd::Uri(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_integer(&self) -> Option<i32> {
        match self {
            Llsd::Integer(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Llsd::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&BTreeMap<String, Llsd>> {
        match self {
            Llsd::Map(map) => Some(map),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[Llsd]> {
        match self {
            Llsd::Array(items) => Some(items),
            _ => None,
        }
    }
}

impl From<&str> for Llsd {
    fn from(value: &str) -> Self {
        Llsd::String(value.to_string())
    }
}

impl From<String> for Llsd {
    fn from(value: String) -> Self {
        Llsd::String(value)
    }
}

impl From<i32> for Llsd {
    fn from(value: i32) -> Self {
        Llsd::Integer(value)
    }
}

impl From<f64> for Llsd {
    fn from(value: f64) -> Self {
        Llsd::Real(value)
    }
}

impl From<bool> for Llsd {
    fn from(value: bool) -> Self {
        Llsd::Boolean(value)
    }
}

impl From<Vec<Llsd>> for Llsd {
    fn from(value: Vec<Llsd>) -> Self {
        Llsd::Array(value)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LlsdFormat {
    Xml,
    Json,
}

impl LlsdFormat {
    /// Maps a media type a client may ask a response in to its encoding.
    pub fn from_media_type(media_type: &str) -> Option<Self> {
        match media_type {
            LLSD_XML | "application/xml" | "text/xml" => Some(LlsdFormat::Xml),
            LLSD_JSON | "application/json" => Some(LlsdFormat::Json),
            _ => None,
        }
    }

    pub fn content_type(self) -> &'static str {
        match self {
            LlsdFormat::Xml => LLSD_XML,
            LlsdFormat::Json => LLSD_JSON,
        }
    }
}

/// Whether `media_type` is one of the dedicated LLSD content types.
pub fn is_llsd_media_type(media_type: &str) -> bool {
    matches!(media_type, LLSD_XML | LLSD_XML_ALT | LLSD_JSON)
}

pub fn serialize(value: &Llsd, format: LlsdFormat) -> Vec<u8> {
    match format {
        LlsdFormat::Xml => to_xml(value).into_bytes(),
        LlsdFormat::Json => to_json(value).into_bytes(),
    }
}

/// Decodes either encoding, picked from the first non-blank byte.
pub fn deserialize(body: &[u8]) -> Result<Llsd> {
    let text = String::from_utf8_lossy(body);
    let trimmed = text.trim_start();
    match trimmed.as_bytes().first() {
        None => Err(CodecError::Empty),
        Some(b'<') => from_xml(trimmed),
        Some(_) => from_json(trimmed),
    }
}

pub fn to_xml(value: &Llsd) -> String {
    let mut out = String::from(r#"<?xml version="1.0" encoding="UTF-8"?><llsd>"#);
    write_xml(&mut out, value);
    out.push_str("</llsd>");
    out
}

fn write_xml(out: &mut String, value: &Llsd) {
    match value {
        Llsd::Undef => out.push_str("<undef />"),
        Llsd::Boolean(b) => {
            let _ = write!(out, "<boolean>{}</boolean>", if *b { 1 } else { 0 });
        }
        Llsd::Integer(i) => {
            let _ = write!(out, "<integer>{i}</integer>");
        }
        Llsd::Real(r) => {
            let _ = write!(out, "<real>{r}</real>");
        }
        Llsd::String(s) => {
            let _ = write!(out, "<string>{}</string>", xml::escape(s));
        }
        Llsd::Uuid(s) => {
            let _ = write!(out, "<uuid>{}</uuid>", xml::escape(s));
        }
        Llsd::Date(s) => {
            let _ = write!(out, "<date>{}</date>", xml::escape(s));
        }
        Llsd::Uri(s) => {
            let _ = write!(out, "<uri>{}</uri>", xml::escape(s));
        }
        Llsd::Binary(bytes) => {
            let _ = write!(
                out,
                r#"<binary encoding="base64">{}</binary>"#,
                base64::engine::general_purpose::STANDARD.encode(bytes)
            );
        }
        Llsd::Map(map) => {
            out.push_str("<map>");
            for (key, value) in map {
                let _ = write!(out, "<key>{}</key>", xml::escape(key));
                write_xml(out, value);
            }
            out.push_str("</map>");
        }
        Llsd::Array(items) => {
            out.push_str("<array>");
            for item in items {
                write_xml(out, item);
            }
            out.push_str("</array>");
        }
    }
}

pub fn from_xml(input: &str) -> Result<Llsd> {
    let root = xml::parse(input)?;
    if root.name != "llsd" {
        return Err(CodecError::UnexpectedElement {
            found: root.name,
            expected: "<llsd>",
        });
    }
    match root.children.first() {
        Some(element) => read_xml(element),
        None => Ok(Llsd::Undef),
    }
}

fn read_xml(element: &Element) -> Result<Llsd> {
    let text = element.text.trim();
    let value = match element.name.as_str() {
        "undef" => Llsd::Undef,
        "boolean" => match text {
            "1" | "true" => Llsd::Boolean(true),
            "" | "0" | "false" => Llsd::Boolean(false),
            other => return Err(invalid("boolean", other)),
        },
        "integer" => {
            if text.is_empty() {
                Llsd::Integer(0)
            } else {
                Llsd::Integer(text.parse().map_err(|_| invalid("integer", text))?)
            }
        }
        "real" => {
            if text.is_empty() {
                Llsd::Real(0.0)
            } else {
                Llsd::Real(text.parse().map_err(|_| invalid("real", text))?)
            }
        }
        // Strings keep their surrounding whitespace.
        "string" => Llsd::String(element.text.clone()),
        "uuid" => Llsd::Uuid(text.to_string()),
        "date" => Llsd::Date(text.to_string()),
        "uri" => Llsd::Uri(text.to_string()),
        "binary" => {
            let cleaned: String = text.chars().filter(|c| !c.is_whitespace()).collect();
            Llsd::Binary(base64::engine::general_purpose::STANDARD.decode(cleaned)?)
        }
        "map" => {
            let mut map = BTreeMap::new();
            let mut children = element.children.iter();
            while let Some(key) = children.next() {
                if key.name != "key" {
                    return Err(CodecError::UnexpectedElement {
                        found: key.name.clone(),
                        expected: "<key>",
                    });
                }
                let value = match children.next() {
                    Some(v) => read_xml(v)?,
                    None => Llsd::Undef,
                };
                map.insert(key.text.clone(), value);
            }
            Llsd::Map(map)
        }
        "array" => Llsd::Array(
            element
                .children
                .iter()
                .map(read_xml)
                .collect::<Result<Vec<_>>>()?,
        ),
        other => {
            return Err(CodecError::UnexpectedElement {
                found: other.to_string(),
                expected: "an LLSD type",
            })
        }
    };
    Ok(value)
}

fn invalid(kind: &'static str, value: &str) -> CodecError {
    CodecError::InvalidValue {
        kind,
        value: value.to_string(),
    }
}

pub fn to_json(value: &Llsd) -> String {
    to_json_value(value).to_string()
}

fn to_json_value(value: &Llsd) -> Json {
    match value {
        Llsd::Undef => Json::Null,
        Llsd::Boolean(b) => Json::Bool(*b),
        Llsd::Integer(i) => Json::from(*i),
        Llsd::Real(r) => serde_json::Number::from_f64(*r)
            .map(Json::Number)
            .unwrap_or(Json::Null),
        Llsd::String(s) | Llsd::Uuid(s) | Llsd::Date(s) | Llsd::Uri(s) => Json::String(s.clone()),
        Llsd::Binary(bytes) => Json::String(base64::engine::general_purpose::STANDARD.encode(bytes)),
        Llsd::Map(map) => Json::Object(
            map.iter()
                .map(|(k, v)| (k.clone(), to_json_value(v)))
                .collect(),
        ),
        Llsd::Array(items) => Json::Array(items.iter().map(to_json_value).collect()),
    }
}

pub fn from_json(input: &str) -> Result<Llsd> {
    let value: Json = serde_json::from_str(input)?;
    Ok(from_json_value(value))
}

fn from_json_value(value: Json) -> Llsd {
    match value {
        Json::Null => Llsd::Undef,
        Json::Bool(b) => Llsd::Boolean(b),
        Json::Number(n) => match n.as_i64().and_then(|i| i32::try_from(i).ok()) {
            Some(i) => Llsd::Integer(i),
            None => Llsd::Real(n.as_f64().unwrap_or(0.0)),
        },
        Json::String(s) => Llsd::String(s),
        Json::Array(items) => Llsd::Array(items.into_iter().map(from_json_value).collect()),
        Json::Object(map) => Llsd::Map(
            map.into_iter()
                .map(|(k, v)| (k, from_json_value(v)))
                .collect(),
        ),
    }
}
