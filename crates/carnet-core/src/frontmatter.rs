//! Frontmatter serialization.
//!
//! The emitter is hand-written: key order, section markers and list layout
//! are part of the on-disk format and must be bit-exact. Reading goes through
//! `serde_yaml` into a loose [`JsonValue`] tree which the normalizer then
//! types, so marker keys and key order never matter on the way back in.

use std::borrow::Cow;

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Map, Value as JsonValue};

use crate::defaults::{
    FRONTMATTER_DELIMITER, SECTION_EXTERNAL, SECTION_FILLER, SECTION_IMAGES, SECTION_IMPORT,
    SECTION_LINK, SECTION_POST, SECTION_STATUS,
};
use crate::error::Result;
use crate::models::{Field, FieldValue, MasterRecord};
use crate::normalize::{dedup_preserving_order, normalize, normalize_eol};

/// Characters that cannot start a plain YAML scalar.
const INDICATOR_CHARS: &str = "-?:,[]{}#&*!|>'\"%@`";

/// Plain scalars YAML would resolve to something other than a string.
const RESERVED_WORDS: &[&str] = &[
    "true", "false", "yes", "no", "on", "off", "y", "n", "null", "~", ".inf", "-.inf", "+.inf",
    ".nan",
];

static TAGS_KEY: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[ \t]*tags[ \t]*:").expect("valid tags regex"));
static TAGS_EMPTY: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[ \t]*tags[ \t]*:\s*\[\s*\]\s*$").expect("valid tags regex"));
static TAGS_BLOCK: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[ \t]*tags[ \t]*:\s*$").expect("valid tags regex"));
static LIST_ITEM: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[ \t]*-[ \t]+").expect("valid list item regex"));
static MAJ_WP_KEY: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[ \t]*maj_wp[ \t]*:").expect("valid maj_wp regex"));

// =============================================================================
// EMITTER
// =============================================================================

/// Emission options.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EmitOptions {
    /// Always double-quote `img_id` entries.
    pub quote_image_ids: bool,
}

impl Default for EmitOptions {
    fn default() -> Self {
        Self {
            quote_image_ids: true,
        }
    }
}

/// Render the frontmatter block with default options.
///
/// The output starts with `---\n` and ends with `---\n`.
pub fn serialize(record: &MasterRecord) -> String {
    serialize_with(record, &EmitOptions::default())
}

/// Render the frontmatter block.
pub fn serialize_with(record: &MasterRecord, opts: &EmitOptions) -> String {
    let mut out: Vec<String> = vec![FRONTMATTER_DELIMITER.to_string()];
    let stamped = record.import_stamp().is_some();

    for field in Field::ALL {
        let provenance = matches!(field, Field::WpImportDatasetKey | Field::WpImportDatasetId);
        if provenance && !stamped {
            continue;
        }
        if let Some(marker) = section_before(field) {
            out.push(format!("{}: {}", marker, SECTION_FILLER));
        }
        let force_quotes = field == Field::ImgId && opts.quote_image_ids;
        emit_field(&mut out, field, &record.get(field), force_quotes);
    }

    out.push(FRONTMATTER_DELIMITER.to_string());
    let mut text = out.join("\n");
    text.push('\n');
    text
}

/// A complete note: frontmatter, one blank line, then `body`.
pub fn render_note(record: &MasterRecord, body: &str) -> String {
    format!("{}\n{}", serialize(record), body)
}

/// Replace the frontmatter of a split document, keeping its body verbatim.
pub fn rewrite_note(doc: &Document, record: &MasterRecord) -> String {
    match doc.frontmatter {
        Some(_) => format!("{}{}", serialize(record), doc.body),
        None => render_note(record, &doc.body),
    }
}

fn section_before(field: Field) -> Option<&'static str> {
    match field {
        Field::ImgAlt => Some(SECTION_IMAGES),
        Field::LienArchives => Some(SECTION_LINK),
        Field::MajWp => Some(SECTION_STATUS),
        Field::PostCat => Some(SECTION_POST),
        Field::WpCarnetLink => Some(SECTION_EXTERNAL),
        Field::WpImportDatasetKey => Some(SECTION_IMPORT),
        _ => None,
    }
}

fn emit_field(out: &mut Vec<String>, field: Field, value: &FieldValue, force_quotes: bool) {
    let key = field.as_str();
    match value {
        FieldValue::Flag(b) => out.push(format!("{}: {}", key, b)),
        FieldValue::Integer(Some(n)) => out.push(format!("{}: {}", key, n)),
        FieldValue::Integer(None) | FieldValue::Nullable(None) => out.push(format!("{}:", key)),
        FieldValue::Text(s) | FieldValue::Nullable(Some(s)) => {
            if s.is_empty() {
                out.push(format!("{}:", key));
            } else {
                out.push(format!("{}: {}", key, yaml_scalar(s)));
            }
        }
        FieldValue::List(items) if field == Field::ImgLegende => emit_block(out, key, items),
        FieldValue::List(items) if items.is_empty() => out.push(format!("{}: []", key)),
        FieldValue::List(items) => {
            out.push(format!("{}:", key));
            for item in items {
                if force_quotes {
                    out.push(format!("- {}", double_quoted(item)));
                } else {
                    out.push(format!("- {}", yaml_scalar(item)));
                }
            }
        }
    }
}

/// Literal block scalar; entries are separated by one blank line.
fn emit_block(out: &mut Vec<String>, key: &str, entries: &[String]) {
    out.push(format!("{}: |", key));
    if entries.is_empty() {
        out.push("  ".to_string());
        return;
    }
    let joined = normalize_eol(&entries.join("\n\n"));
    for line in joined.split('\n') {
        if line.is_empty() {
            out.push(String::new());
        } else {
            out.push(format!("  {}", line));
        }
    }
}

/// Plain scalar when YAML reads it back as the same string, else double-quoted.
pub(crate) fn yaml_scalar(s: &str) -> Cow<'_, str> {
    if needs_quoting(s) {
        Cow::Owned(double_quoted(s))
    } else {
        Cow::Borrowed(s)
    }
}

fn needs_quoting(s: &str) -> bool {
    let Some(first) = s.chars().next() else {
        return true;
    };
    if s != s.trim() || s.chars().any(char::is_control) {
        return true;
    }
    if INDICATOR_CHARS.contains(first) {
        return true;
    }
    if s.contains(": ") || s.contains(" #") || s.ends_with(':') {
        return true;
    }
    if RESERVED_WORDS.contains(&s.to_ascii_lowercase().as_str()) {
        return true;
    }
    looks_numeric(s) && !is_canonical_uint(s)
}

fn looks_numeric(s: &str) -> bool {
    if s.parse::<f64>().is_ok() || s.parse::<i64>().is_ok() {
        return true;
    }
    let unsigned = s.trim_start_matches(['+', '-']).to_ascii_lowercase();
    if ["0x", "0o", "0b"].iter().any(|p| unsigned.starts_with(p)) {
        return true;
    }
    unsigned.starts_with(|c: char| c.is_ascii_digit())
        && unsigned.contains('_')
        && unsigned.chars().all(|c| c.is_ascii_digit() || c == '_' || c == '.')
}

/// Digits only, no leading zero, small enough to come back unchanged.
fn is_canonical_uint(s: &str) -> bool {
    !s.is_empty()
        && s.len() <= 18
        && s.bytes().all(|b| b.is_ascii_digit())
        && (s == "0" || !s.starts_with('0'))
}

fn double_quoted(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('"');
    for c in s.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if c.is_control() => out.push_str(&format!("\\u{:04X}", c as u32)),
            c => out.push(c),
        }
    }
    out.push('"');
    out
}

// =============================================================================
// DOCUMENT SPLIT
// =============================================================================

/// A note split into raw frontmatter text and body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    /// Text between the delimiters, without them. `None` when absent.
    pub frontmatter: Option<String>,
    /// Everything after the closing delimiter line, verbatim.
    pub body: String,
}

impl Document {
    /// Parse and normalize the frontmatter, if any.
    pub fn record(&self) -> Result<Option<MasterRecord>> {
        match &self.frontmatter {
            Some(fm) => Ok(Some(normalize(&parse_raw(fm)?))),
            None => Ok(None),
        }
    }
}

/// Split a note into frontmatter and body.
///
/// Line endings are normalised to LF. A frontmatter block exists only when
/// the text starts with `---\n` and a later line is exactly `---`; otherwise
/// the whole text is body.
pub fn split_document(raw: &str) -> Document {
    let text = normalize_eol(raw);
    if !text.starts_with("---\n") {
        return Document {
            frontmatter: None,
            body: text,
        };
    }
    let rest = &text[4..];

    if rest == FRONTMATTER_DELIMITER || rest.starts_with("---\n") {
        return Document {
            frontmatter: Some(String::new()),
            body: rest.get(4..).unwrap_or("").to_string(),
        };
    }

    let mut from = 0;
    while let Some(pos) = rest[from..].find("\n---") {
        let idx = from + pos;
        let after = idx + 4;
        if after == rest.len() || rest.as_bytes()[after] == b'\n' {
            return Document {
                frontmatter: Some(rest[..idx].to_string()),
                body: rest.get(after + 1..).unwrap_or("").to_string(),
            };
        }
        from = idx + 1;
    }

    Document {
        frontmatter: None,
        body: text.clone(),
    }
}

/// Inverse of [`split_document`].
pub fn assemble(doc: &Document) -> String {
    match doc.frontmatter.as_deref() {
        None => doc.body.clone(),
        Some("") => format!("---\n---\n{}", doc.body),
        Some(fm) => format!("---\n{}\n---\n{}", fm, doc.body),
    }
}

// =============================================================================
// RAW PARSE
// =============================================================================

/// Generic YAML parse of frontmatter text into a loose key/value tree.
///
/// Blank text yields an empty object. Non-string mapping keys are
/// stringified when scalar and dropped otherwise.
pub fn parse_raw(frontmatter: &str) -> Result<JsonValue> {
    if frontmatter.trim().is_empty() {
        return Ok(JsonValue::Object(Map::new()));
    }
    let value: serde_yaml::Value = serde_yaml::from_str(frontmatter)?;
    Ok(yaml_to_json(value))
}

fn yaml_to_json(value: serde_yaml::Value) -> JsonValue {
    use serde_yaml::Value as Y;
    match value {
        Y::Null => JsonValue::Null,
        Y::Bool(b) => JsonValue::Bool(b),
        Y::Number(n) => {
            if let Some(i) = n.as_i64() {
                JsonValue::from(i)
            } else if let Some(u) = n.as_u64() {
                JsonValue::from(u)
            } else {
                n.as_f64()
                    .and_then(serde_json::Number::from_f64)
                    .map(JsonValue::Number)
                    .unwrap_or(JsonValue::Null)
            }
        }
        Y::String(s) => JsonValue::String(s),
        Y::Sequence(items) => JsonValue::Array(items.into_iter().map(yaml_to_json).collect()),
        Y::Mapping(map) => {
            let mut obj = Map::new();
            for (k, v) in map {
                let key = match k {
                    Y::String(s) => s,
                    Y::Number(n) => n.to_string(),
                    Y::Bool(b) => b.to_string(),
                    _ => continue,
                };
                obj.insert(key, yaml_to_json(v));
            }
            JsonValue::Object(obj)
        }
        Y::Tagged(tagged) => yaml_to_json(tagged.value),
    }
}

// =============================================================================
// TARGETED TAG PATCH
// =============================================================================

/// Result of a targeted patch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PatchOutcome {
    /// Nothing to write.
    Unchanged,
    /// The full patched document.
    Changed(String),
}

/// Replace the `tags` list in place and force `maj_wp: true`.
///
/// Every other frontmatter line, markers included, is kept as is. Returns
/// [`PatchOutcome::Unchanged`] when the current ordered list already equals
/// the trimmed, de-duplicated `tags`.
pub fn patch_tags(text: &str, tags: &[String]) -> PatchOutcome {
    let desired = dedup_preserving_order(tags.iter().map(|t| t.trim().to_string()));
    let doc = split_document(text);

    let Some(fm) = doc.frontmatter.as_deref() else {
        let mut lines = vec![
            FRONTMATTER_DELIMITER.to_string(),
            format!("{}: {}", SECTION_STATUS, SECTION_FILLER),
            "maj_wp: true".to_string(),
            format!("{}: {}", SECTION_POST, SECTION_FILLER),
        ];
        lines.extend(tags_block(&desired));
        lines.push(FRONTMATTER_DELIMITER.to_string());
        return PatchOutcome::Changed(format!("{}\n\n{}", lines.join("\n"), doc.body));
    };

    let lines: Vec<String> = fm.split('\n').map(str::to_string).collect();
    if current_tags(&lines) == desired {
        return PatchOutcome::Unchanged;
    }

    let lines = force_maj_wp(replace_tags_block(lines, &desired));
    PatchOutcome::Changed(assemble(&Document {
        frontmatter: Some(lines.join("\n")),
        body: doc.body,
    }))
}

fn tags_block(tags: &[String]) -> Vec<String> {
    if tags.is_empty() {
        return vec!["tags: []".to_string()];
    }
    let mut block = vec!["tags:".to_string()];
    block.extend(tags.iter().map(|t| format!("- {}", yaml_scalar(t))));
    block
}

fn current_tags(lines: &[String]) -> Vec<String> {
    let mut found = Vec::new();
    for (i, line) in lines.iter().enumerate() {
        if TAGS_EMPTY.is_match(line) {
            return Vec::new();
        }
        if TAGS_BLOCK.is_match(line) {
            for item in &lines[i + 1..] {
                if !LIST_ITEM.is_match(item) {
                    break;
                }
                found.push(unquote(LIST_ITEM.replace(item, "").trim()));
            }
            break;
        }
    }
    dedup_preserving_order(found)
}

fn replace_tags_block(mut lines: Vec<String>, tags: &[String]) -> Vec<String> {
    let block = tags_block(tags);

    let Some(start) = lines.iter().position(|l| TAGS_KEY.is_match(l)) else {
        let at = lines
            .iter()
            .position(|l| l.starts_with(&format!("{}:", SECTION_POST)))
            .map(|i| i + 1)
            .unwrap_or(lines.len());
        lines.splice(at..at, block);
        return lines;
    };

    let mut end = start + 1;
    if TAGS_BLOCK.is_match(&lines[start]) {
        while end < lines.len() && LIST_ITEM.is_match(&lines[end]) {
            end += 1;
        }
    }
    lines.splice(start..end, block);
    lines
}

fn force_maj_wp(mut lines: Vec<String>) -> Vec<String> {
    if let Some(line) = lines.iter_mut().find(|l| MAJ_WP_KEY.is_match(l)) {
        *line = "maj_wp: true".to_string();
        return lines;
    }
    let at = lines
        .iter()
        .position(|l| l.starts_with(&format!("{}:", SECTION_STATUS)))
        .map(|i| i + 1)
        .unwrap_or(0);
    lines.insert(at, "maj_wp: true".to_string());
    lines
}

/// Set top-level keys in place, keeping every other line.
///
/// `updates` carry values already rendered as YAML. A key already present is
/// rewritten on its own line and any list items beneath it are dropped;
/// missing keys go just before the closing delimiter. A document without
/// frontmatter gets one.
pub fn patch_keys(text: &str, updates: &[(&str, String)]) -> String {
    let doc = split_document(text);
    let mut lines: Vec<String> = match doc.frontmatter.as_deref() {
        Some(fm) if !fm.is_empty() => fm.split('\n').map(str::to_string).collect(),
        _ => Vec::new(),
    };

    for (key, value) in updates {
        let prefix = format!("{key}:");
        let line = format!("{key}: {value}");
        match lines.iter().position(|l| l.starts_with(&prefix)) {
            Some(start) => {
                let mut end = start + 1;
                while end < lines.len() && LIST_ITEM.is_match(&lines[end]) {
                    end += 1;
                }
                lines.splice(start..end, [line]);
            }
            None => lines.push(line),
        }
    }

    let frontmatter = lines.join("\n");
    let body = match doc.frontmatter {
        Some(_) => doc.body,
        None => format!("\n{}", doc.body),
    };
    assemble(&Document {
        frontmatter: Some(frontmatter),
        body,
    })
}

/// Strip one level of YAML quoting from a scalar.
pub(crate) fn unquote(s: &str) -> String {
    let t = s.trim();
    if t.len() >= 2 && t.starts_with('"') && t.ends_with('"') {
        let inner = &t[1..t.len() - 1];
        let mut out = String::with_capacity(inner.len());
        let mut chars = inner.chars();
        while let Some(c) = chars.next() {
            if c != '\\' {
                out.push(c);
                continue;
            }
            match chars.next() {
                Some('n') => out.push('\n'),
                Some('t') => out.push('\t'),
                Some('r') => out.push('\r'),
                Some(other) => out.push(other),
                None => out.push('\\'),
            }
        }
        return out;
    }
    if t.len() >= 2 && t.starts_with('\'') && t.ends_with('\'') {
        return t[1..t.len() - 1].replace("''", "'");
    }
    t.to_string()
}
