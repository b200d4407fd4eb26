//! Canonical JSON serialization for scenario diffs
//!
//! The same logical value always produces the same bytes: object keys are
//! emitted in lexicographic order at every depth, array order is kept, and
//! every float is rounded to four decimal places so that float noise from
//! upstream arithmetic never changes a hash or a signature.
//!
//! Output is indented with two spaces and always ends with a single
//! newline, so an exported file is byte-identical to the payload that was
//! hashed or signed.

use serde::Serialize;
use serde_json::{Map, Number, Value};
use std::fmt::Write;

use crate::errors::{DiffError, DiffResult};

const INDENT: &str = "  ";

/// Types that know how to present themselves as plain JSON data before
/// canonicalization.
pub trait Canonicalize {
    fn canonical_value(&self) -> DiffResult<Value>;
}

impl Canonicalize for Value {
    fn canonical_value(&self) -> DiffResult<Value> {
        Ok(self.clone())
    }
}

/// Convert any serde type into a JSON value for a [`Canonicalize`] impl.
pub fn to_canonical_value<T: Serialize + ?Sized>(value: &T, context: &str) -> DiffResult<Value> {
    serde_json::to_value(value).map_err(|e| DiffError::serialization(context, e))
}

/// Round to four decimal places, half toward positive infinity.
///
/// `-0` is normalized to `0`. Non-finite input is returned unchanged.
pub fn round4(x: f64) -> f64 {
    if !x.is_finite() {
        return x;
    }
    let rounded = (x * 10_000.0 + 0.5).floor() / 10_000.0;
    if !rounded.is_finite() {
        return x;
    }
    if rounded == 0.0 {
        0.0
    } else {
        rounded
    }
}

/// Canonicalize any [`Canonicalize`] value.
pub fn stable_stringify<T: Canonicalize + ?Sized>(value: &T) -> DiffResult<String> {
    Ok(stable_stringify_value(&value.canonical_value()?))
}

/// Canonicalize a plain JSON value.
pub fn stable_stringify_value(value: &Value) -> String {
    let mut output = String::new();
    serialize_value(value, 0, &mut output);
    output.push('\n');
    output
}

fn serialize_value(value: &Value, depth: usize, output: &mut String) {
    match value {
        Value::Object(map) => serialize_object(map, depth, output),
        Value::Array(arr) => serialize_array(arr, depth, output),
        Value::String(s) => serialize_string(s, output),
        Value::Number(n) => serialize_number(n, output),
        Value::Bool(b) => output.push_str(if *b { "true" } else { "false" }),
        Value::Null => output.push_str("null"),
    }
}

fn push_indent(depth: usize, output: &mut String) {
    for _ in 0..depth {
        output.push_str(INDENT);
    }
}

fn serialize_object(map: &Map<String, Value>, depth: usize, output: &mut String) {
    if map.is_empty() {
        output.push_str("{}");
        return;
    }

    let mut keys: Vec<&String> = map.keys().collect();
    keys.sort();

    output.push_str("{\n");
    for (i, key) in keys.iter().enumerate() {
        if i > 0 {
            output.push_str(",\n");
        }
        push_indent(depth + 1, output);
        serialize_string(key, output);
        output.push_str(": ");
        serialize_value(&map[key.as_str()], depth + 1, output);
    }
    output.push('\n');
    push_indent(depth, output);
    output.push('}');
}

fn serialize_array(arr: &[Value], depth: usize, output: &mut String) {
    if arr.is_empty() {
        output.push_str("[]");
        return;
    }

    output.push_str("[\n");
    for (i, item) in arr.iter().enumerate() {
        if i > 0 {
            output.push_str(",\n");
        }
        push_indent(depth + 1, output);
        serialize_value(item, depth + 1, output);
    }
    output.push('\n');
    push_indent(depth, output);
    output.push(']');
}

fn serialize_string(s: &str, output: &mut String) {
    output.push('"');
    for ch in s.chars() {
        match ch {
            '"' => output.push_str("\\\""),
            '\\' => output.push_str("\\\\"),
            '\u{08}' => output.push_str("\\b"),
            '\u{0C}' => output.push_str("\\f"),
            '\n' => output.push_str("\\n"),
            '\r' => output.push_str("\\r"),
            '\t' => output.push_str("\\t"),
            ch if (ch as u32) < 0x20 => {
                // Writing into a String cannot fail.
                let _ = write!(output, "\\u{:04x}", ch as u32);
            }
            ch => output.push(ch),
        }
    }
    output.push('"');
}

fn serialize_number(num: &Number, output: &mut String) {
    if let Some(i) = num.as_i64() {
        let _ = write!(output, "{i}");
    } else if let Some(u) = num.as_u64() {
        let _ = write!(output, "{u}");
    } else if let Some(f) = num.as_f64() {
        serialize_float(f, output);
    } else {
        output.push_str("null");
    }
}

fn serialize_float(f: f64, output: &mut String) {
    // serde_json never stores NaN or infinities in a Value; they arrive as null.
    if !f.is_finite() {
        output.push_str("null");
        return;
    }

    let rounded = round4(f);
    if rounded.fract() == 0.0 && rounded.abs() < 1e15 {
        let _ = write!(output, "{}", rounded as i64);
    } else {
        let _ = write!(output, "{rounded}");
    }
}
