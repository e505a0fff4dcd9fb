use std::collections::BTreeMap;
use std::fmt::Write;

use base64::Engine;

use crate::xml::{self, Element};
use crate::{CodecError, Result};

/// Fault code for a method name nobody registered.
pub const METHOD_NOT_FOUND: i32 = -32601;
/// Fault code for a handler that failed while serving the call.
pub const INTERNAL_ERROR: i32 = -32603;

#[derive(Debug, Clone, PartialEq)]
pub enum XmlRpcValue {
    Int(i32),
    Boolean(bool),
    String(String),
    Double(f64),
    DateTime(String),
    Base64(Vec<u8>),
    Struct(BTreeMap<String, XmlRpcValue>),
    Array(Vec<XmlRpcValue>),
    Nil,
}

impl XmlRpcValue {
    pub fn structure<K, I>(members: I) -> Self
    where
        K: Into<String>,
        I: IntoIterator<Item = (K, XmlRpcValue)>,
    {
        XmlRpcValue::Struct(members.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            XmlRpcValue::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i32> {
        match self {
            XmlRpcValue::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn get(&self, member: &str) -> Option<&XmlRpcValue> {
        match self {
            XmlRpcValue::Struct(map) => map.get(member),
            _ => None,
        }
    }
}

impl From<&str> for XmlRpcValue {
    fn from(value: &str) -> Self {
        XmlRpcValue::String(value.to_string())
    }
}

impl From<String> for XmlRpcValue {
    fn from(value: String) -> Self {
        XmlRpcValue::String(value)
    }
}

impl From<i32> for XmlRpcValue {
    fn from(value: i32) -> Self {
        XmlRpcValue::Int(value)
    }
}

impl From<bool> for XmlRpcValue {
    fn from(value: bool) -> Self {
        XmlRpcValue::Boolean(value)
    }
}

/// A decoded `methodCall`. `method_name` is `None` when the call carried no
/// usable name.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct XmlRpcRequest {
    pub method_name: Option<String>,
    pub params: Vec<XmlRpcValue>,
}

impl XmlRpcRequest {
    pub fn new(method_name: impl Into<String>) -> Self {
        Self {
            method_name: Some(method_name.into()),
            params: Vec::new(),
        }
    }

    pub fn with_param(mut self, value: impl Into<XmlRpcValue>) -> Self {
        self.params.push(value.into());
        self
    }

    pub fn parse(input: &str) -> Result<Self> {
        let root = xml::parse(input)?;
        if root.name != "methodCall" {
            return Err(CodecError::UnexpectedElement {
                found: root.name,
                expected: "<methodCall>",
            });
        }
        let method_name = root
            .child("methodName")
            .map(|e| e.text.trim().to_string())
            .filter(|name| !name.is_empty());
        let params = match root.child("params") {
            Some(params) => read_params(params)?,
            None => Vec::new(),
        };
        Ok(Self {
            method_name,
            params,
        })
    }

    pub fn to_xml(&self) -> String {
        let mut out = String::from(r#"<?xml version="1.0"?><methodCall>"#);
        if let Some(name) = &self.method_name {
            let _ = write!(out, "<methodName>{}</methodName>", xml::escape(name));
        }
        write_params(&mut out, &self.params);
        out.push_str("</methodCall>");
        out
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum XmlRpcResponse {
    Success(XmlRpcValue),
    Fault { code: i32, message: String },
}

impl XmlRpcResponse {
    pub fn fault(code: i32, message: impl Into<String>) -> Self {
        XmlRpcResponse::Fault {
            code,
            message: message.into(),
        }
    }

    pub fn method_not_found(method: &str) -> Self {
        Self::fault(METHOD_NOT_FOUND, format!("Requested method [{method}] not found"))
    }

    pub fn is_fault(&self) -> bool {
        matches!(self, XmlRpcResponse::Fault { .. })
    }

    pub fn fault_code(&self) -> Option<i32> {
        match self {
            XmlRpcResponse::Fault { code, .. } => Some(*code),
            XmlRpcResponse::Success(_) => None,
        }
    }

    pub fn to_xml(&self) -> String {
        let mut out = String::from(r#"<?xml version="1.0"?><methodResponse>"#);
        match self {
            XmlRpcResponse::Success(value) => write_params(&mut out, std::slice::from_ref(value)),
            XmlRpcResponse::Fault { code, message } => {
                out.push_str("<fault><value>");
                write_value(
                    &mut out,
                    &XmlRpcValue::structure([
                        ("faultCode", XmlRpcValue::Int(*code)),
                        ("faultString", XmlRpcValue::String(message.clone())),
                    ]),
                );
                out.push_str("</value></fault>");
            }
        }
        out.push_str("</methodResponse>");
        out
    }

    pub fn parse(input: &str) -> Result<Self> {
        let root = xml::parse(input)?;
        if root.name != "methodResponse" {
            return Err(CodecError::UnexpectedElement {
                found: root.name,
                expected: "<methodResponse>",
            });
        }
        if let Some(fault) = root.child("fault") {
            let value = match fault.child("value") {
                Some(v) => read_value(v)?,
                None => XmlRpcValue::Nil,
            };
            let code = value.get("faultCode").and_then(XmlRpcValue::as_int).unwrap_or(0);
            let message = value
                .get("faultString")
                .and_then(XmlRpcValue::as_str)
                .unwrap_or("")
                .to_string();
            return Ok(XmlRpcResponse::Fault { code, message });
        }
        let mut params = match root.child("params") {
            Some(params) => read_params(params)?,
            None => Vec::new(),
        };
        let value = if params.is_empty() {
            XmlRpcValue::Nil
        } else {
            params.swap_remove(0)
        };
        Ok(XmlRpcResponse::Success(value))
    }
}

fn read_params(params: &Element) -> Result<Vec<XmlRpcValue>> {
    params
        .children_named("param")
        .map(|param| match param.child("value") {
            Some(value) => read_value(value),
            None => Ok(XmlRpcValue::Nil),
        })
        .collect()
}

fn read_value(value: &Element) -> Result<XmlRpcValue> {
    let Some(typed) = value.children.first() else {
        // An untyped value is a string.
        return Ok(XmlRpcValue::String(value.text.clone()));
    };
    let text = typed.text.trim();
    let parsed = match typed.name.as_str() {
        "i4" | "int" => XmlRpcValue::Int(text.parse().map_err(|_| invalid("int", text))?),
        "boolean" => match text {
            "1" | "true" => XmlRpcValue::Boolean(true),
            "0" | "false" => XmlRpcValue::Boolean(false),
            other => return Err(invalid("boolean", other)),
        },
        "string" => XmlRpcValue::String(typed.text.clone()),
        "double" => XmlRpcValue::Double(text.parse().map_err(|_| invalid("double", text))?),
        "dateTime.iso8601" => XmlRpcValue::DateTime(text.to_string()),
        "base64" => {
            let cleaned: String = text.chars().filter(|c| !c.is_whitespace()).collect();
            XmlRpcValue::Base64(base64::engine::general_purpose::STANDARD.decode(cleaned)?)
        }
        "struct" => {
            let mut members = BTreeMap::new();
            for member in typed.children_named("member") {
                let name = member.child("name").map(|n| n.text.clone()).unwrap_or_default();
                let value = match member.child("value") {
                    Some(v) => read_value(v)?,
                    None => XmlRpcValue::Nil,
                };
                members.insert(name, value);
            }
            XmlRpcValue::Struct(members)
        }
        "array" => {
            let items = match typed.child("data") {
                Some(data) => data
                    .children_named("value")
                    .map(read_value)
                    .collect::<Result<Vec<_>>>()?,
                None => Vec::new(),
            };
            XmlRpcValue::Array(items)
        }
        "nil" => XmlRpcValue::Nil,
        other => {
            return Err(CodecError::UnexpectedElement {
                found: other.to_string(),
                expected: "an XML-RPC type",
            })
        }
    };
    Ok(parsed)
}

fn invalid(kind: &'static str, value: &str) -> CodecError {
    CodecError::InvalidValue {
        kind,
        value: value.to_string(),
    }
}

fn write_params(out: &mut String, params: &[XmlRpcValue]) {
    out.push_str("<params>");
    for param in params {
        out.push_str("<param><value>");
        write_value(out, param);
        out.push_str("</value></param>");
    }
    out.push_str("</params>");
}

fn write_value(out: &mut String, value: &XmlRpcValue) {
    match value {
        XmlRpcValue::Int(i) => {
            let _ = write!(out, "<i4>{i}</i4>");
        }
        XmlRpcValue::Boolean(b) => {
            let _ = write!(out, "<boolean>{}</boolean>", if *b { 1 } else { 0 });
        }
        XmlRpcValue::String(s) => {
            let _ = write!(out, "<string>{}</string>", xml::escape(s));
        }
        XmlRpcValue::Double(d) => {
            let _ = write!(out, "<double>{d}</double>");
        }
        XmlRpcValue::DateTime(s) => {
            let _ = write!(out, "<dateTime.iso8601>{}</dateTime.iso8601>", xml::escape(s));
        }
        XmlRpcValue::Base64(bytes) => {
            let _ = write!(
                out,
                "<base64>{}</base64>",
                base64::engine::general_purpose::STANDARD.encode(bytes)
            );
        }
        XmlRpcValue::Struct(members) => {
            out.push_str("<struct>");
            for (name, value) in members {
                let _ = write!(out, "<member><name>{}</name><value>", xml::escape(name));
                write_value(out, value);
                out.push_str("</value></member>");
            }
            out.push_str("</struct>");
        }
        XmlRpcValue::Array(items) => {
            out.push_str("<array><data>");
            for item in items {
                out.push_str("<value>");
                write_value(out, item);
                out.push_str("</value>");
            }
            out.push_str("</data></array>");
        }
        XmlRpcValue::Nil => out.push_str("<nil/>"),
    }
}
