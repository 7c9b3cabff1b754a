//! Field schema coercion.
//!
//! [`normalize`] turns any loosely typed value into a fully populated
//! [`MasterRecord`]. It never fails: wrong types, missing keys, `null` and
//! nested garbage all collapse to the field's empty value.

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value as JsonValue;

use crate::models::{Field, FieldKind, FieldValue, MasterRecord};

/// Blank-line paragraph boundary.
static PARAGRAPH_BREAK: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\n[ \t]*\n").expect("valid paragraph regex"));

/// The all-defaults record.
pub fn create_empty() -> MasterRecord {
    MasterRecord::default()
}

/// Coerce a partial record into a complete, typed one.
///
/// Keys outside the schema (section markers included) are ignored. A
/// non-object input yields [`create_empty`].
pub fn normalize(partial: &JsonValue) -> MasterRecord {
    let mut record = create_empty();
    let Some(obj) = partial.as_object() else {
        return record;
    };

    for field in Field::ALL {
        if let Some(raw) = obj.get(field.as_str()) {
            record.set_from_json(field, raw);
        }
    }
    record
}

/// Coerce one raw value according to the field's kind.
///
/// The returned variant always matches `field.kind()`.
pub fn coerce_field(field: Field, raw: &JsonValue) -> FieldValue {
    match field.kind() {
        FieldKind::Text => FieldValue::Text(coerce_text(raw)),
        FieldKind::Nullable => FieldValue::Nullable(coerce_nullable(raw)),
        FieldKind::List => FieldValue::List(coerce_list(raw)),
        FieldKind::Paragraphs => FieldValue::List(coerce_paragraphs(raw)),
        FieldKind::Flag => FieldValue::Flag(coerce_bool(raw, false)),
        FieldKind::Integer => FieldValue::Integer(coerce_int(raw)),
    }
}

/// Scalar to trimmed string; `""` for null, arrays and objects.
pub fn coerce_text(raw: &JsonValue) -> String {
    scalar_to_string(raw)
        .map(|s| s.trim().to_string())
        .unwrap_or_default()
}

/// Like [`coerce_text`], with blank collapsing to `None`.
pub fn coerce_nullable(raw: &JsonValue) -> Option<String> {
    let s = coerce_text(raw);
    (!s.is_empty()).then_some(s)
}

/// Boolean coercion with a per-call fallback for unrecognised input.
///
/// | Input | Result |
/// |-------|--------|
/// | `true` / `false` | itself |
/// | number | nonzero is `true` |
/// | `"true"`, `"yes"`, `"1"` | `true` |
/// | `"false"`, `"no"`, `"0"` | `false` |
/// | anything else | `fallback` |
pub fn coerce_bool(raw: &JsonValue, fallback: bool) -> bool {
    match raw {
        JsonValue::Bool(b) => *b,
        JsonValue::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(fallback),
        JsonValue::String(s) => match s.trim().to_ascii_lowercase().as_str() {
            "true" | "yes" | "1" => true,
            "false" | "no" | "0" => false,
            _ => fallback,
        },
        _ => fallback,
    }
}

/// Number or numeric string to integer, else `None`.
pub fn coerce_int(raw: &JsonValue) -> Option<i64> {
    match raw {
        JsonValue::Number(n) => n.as_i64().or_else(|| {
            n.as_f64()
                .filter(|f| f.is_finite() && f.fract() == 0.0)
                .map(|f| f as i64)
        }),
        JsonValue::String(s) => s.trim().parse::<i64>().ok(),
        _ => None,
    }
}

/// Array or scalar to a trimmed, non-empty, duplicate-free list.
pub fn coerce_list(raw: &JsonValue) -> Vec<String> {
    let items: Vec<String> = match raw {
        JsonValue::Array(values) => values.iter().map(coerce_text).collect(),
        other => vec![coerce_text(other)],
    };
    dedup_preserving_order(items)
}

/// Like [`coerce_list`], but text is split into paragraphs.
///
/// Array entries are split too, so no entry ever holds a blank line and the
/// block form written back to the frontmatter reads as the same list.
pub fn coerce_paragraphs(raw: &JsonValue) -> Vec<String> {
    let blocks: Vec<String> = match raw {
        JsonValue::String(s) => vec![s.clone()],
        JsonValue::Array(values) => values.iter().map(coerce_text).collect(),
        other => vec![coerce_text(other)],
    };
    let items = blocks.iter().flat_map(|block| split_paragraphs(block));
    dedup_preserving_order(items)
}

fn split_paragraphs(block: &str) -> Vec<String> {
    let text = normalize_eol(block);
    PARAGRAPH_BREAK
        .split(&text)
        .map(|p| p.trim().to_string())
        .collect()
}

/// Drop blanks and later duplicates; first occurrence wins.
pub fn dedup_preserving_order<I>(items: I) -> Vec<String>
where
    I: IntoIterator<Item = String>,
{
    let mut out: Vec<String> = Vec::new();
    for item in items {
        if !item.is_empty() && !out.contains(&item) {
            out.push(item);
        }
    }
    out
}

/// CRLF and lone CR to LF.
pub fn normalize_eol(text: &str) -> String {
    text.replace("\r\n", "\n").replace('\r', "\n")
}

fn scalar_to_string(raw: &JsonValue) -> Option<String> {
    match raw {
        JsonValue::String(s) => Some(s.clone()),
        JsonValue::Number(n) => Some(n.to_string()),
        JsonValue::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}
