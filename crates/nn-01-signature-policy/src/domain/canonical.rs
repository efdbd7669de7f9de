//! # Canonical JSON
//!
//! The byte string that is hashed for signing and verification:
//!
//! - the top-level `signatures` property is removed
//! - `@context` is the first property of the top-level object
//! - every other object key, at every depth, is emitted in byte order
//! - compact output, no insignificant whitespace
//!
//! Array order is significant and preserved.

use super::errors::SignaturePolicyError;
use serde_json::{Map, Value};

pub const CONTEXT_PROPERTY: &str = "@context";
pub const SIGNATURES_PROPERTY: &str = "signatures";

/// Return `document` with `@context` set to `context` if it has none.
///
/// An existing `@context` is left untouched.
pub fn with_context(document: &Value, context: &str) -> Result<Value, SignaturePolicyError> {
    let object = document
        .as_object()
        .ok_or(SignaturePolicyError::NotAnObject)?;
    if object.contains_key(CONTEXT_PROPERTY) {
        return Ok(document.clone());
    }

    let mut injected = Map::with_capacity(object.len() + 1);
    injected.insert(CONTEXT_PROPERTY.to_string(), Value::String(context.to_string()));
    for (key, value) in object {
        injected.insert(key.clone(), value.clone());
    }
    Ok(Value::Object(injected))
}

/// Canonical bytes of `document` for hashing.
pub fn canonicalize(document: &Value) -> Result<Vec<u8>, SignaturePolicyError> {
    let object = document
        .as_object()
        .ok_or(SignaturePolicyError::NotAnObject)?;

    let mut out = String::with_capacity(256);
    out.push('{');

    let mut first = true;
    if let Some(context) = object.get(CONTEXT_PROPERTY) {
        write_member(&mut out, CONTEXT_PROPERTY, context, &mut first)?;
    }

    let mut keys: Vec<&String> = object
        .keys()
        .filter(|k| k.as_str() != CONTEXT_PROPERTY && k.as_str() != SIGNATURES_PROPERTY)
        .collect();
    keys.sort();
    for key in keys {
        write_member(&mut out, key, &object[key.as_str()], &mut first)?;
    }

    out.push('}');
    Ok(out.into_bytes())
}

fn write_member(
    out: &mut String,
    key: &str,
    value: &Value,
    first: &mut bool,
) -> Result<(), SignaturePolicyError> {
    if !*first {
        out.push(',');
    }
    *first = false;
    write_string(out, key)?;
    out.push(':');
    write_value(out, value)
}

fn write_value(out: &mut String, value: &Value) -> Result<(), SignaturePolicyError> {
    match value {
        Value::Null => out.push_str("null"),
        Value::Bool(b) => out.push_str(if *b { "true" } else { "false" }),
        Value::Number(n) => out.push_str(&n.to_string()),
        Value::String(s) => write_string(out, s)?,
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_value(out, item)?;
            }
            out.push(']');
        }
        Value::Object(map) => {
            out.push('{');
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            let mut first = true;
            for key in keys {
                write_member(out, key, &map[key.as_str()], &mut first)?;
            }
            out.push('}');
        }
    }
    Ok(())
}

fn write_string(out: &mut String, s: &str) -> Result<(), SignaturePolicyError> {
    let escaped = serde_json::to_string(s)
        .map_err(|e| SignaturePolicyError::Canonicalization(e.to_string()))?;
    out.push_str(&escaped);
    Ok(())
}
