//! Import mapping from external dataset rows to master records.
//!
//! The mapping is a fixed table: each master field is either copied from one
//! dataset column or derived by a pure function of the whole row. Every
//! produced value then goes through the normalizer's per-field coercion, so
//! nothing downstream sees untyped data.

use chrono::{NaiveDate, NaiveDateTime};
use once_cell::sync::Lazy;
use regex::Regex;

use crate::dataset::ExternalRow;
use crate::defaults::{CATEGORY_SEPARATOR, MULTI_VALUE_SEPARATOR, TAG_SEPARATOR};
use crate::derive::wrap_wiki;
use crate::models::{Field, FieldValue, MasterRecord};
use crate::normalize::{create_empty, dedup_preserving_order};

// =============================================================================
// DATASET COLUMNS
// =============================================================================

pub const COL_ID: &str = "wp_id";
pub const COL_TITLE: &str = "wp_titre";
pub const COL_DATE: &str = "wp_date";
pub const COL_DATE_MODIFIED: &str = "wp_date_modified";
pub const COL_PERMALINK: &str = "wp_perma";
pub const COL_CATEGORIES: &str = "wp_categories";
pub const COL_TAGS: &str = "wp_tags";
pub const COL_EXCERPT: &str = "wp_extrait";
pub const COL_STATUS: &str = "wp_status";
pub const COL_CARNET_LINK: &str = "wp_carnet_link";
pub const COL_CARNET_ON: &str = "wp_carnet_on";
pub const COL_IMG_URL: &str = "wp_img_url";
pub const COL_IMG_ALT: &str = "wp_img_alt";
pub const COL_IMG_DESCR: &str = "wp_img_descr";
pub const COL_IMG_FILENAME: &str = "wp_img_filename";
pub const COL_IMG_ID: &str = "wp_img_id";
pub const COL_IMG_CAPTION: &str = "wp_img_caption";
pub const COL_IMG_TITLE: &str = "wp_img_titre";
pub const COL_GEN_TITLE: &str = "wp_a_titre_gen";
pub const COL_GEN_SUBTITLE: &str = "wp_a_stitre_gen";
pub const COL_GEN_DESCR: &str = "wp_a_descr_gen";
pub const COL_GEN_VIDEO: &str = "wp_a_videolink_gen";

static TITLE_SPLIT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"—|–|:").expect("valid title split regex"));

static HTTP_URL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^https?://").expect("valid url regex"));

static DATE_ONLY: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\d{4}-\d{2}-\d{2}$").expect("valid date regex"));

static DATE_TIME: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(\d{4}-\d{2}-\d{2})\s+(\d{2}:\d{2}:\d{2})$").expect("valid datetime regex")
});

static SLUG_DASH: Lazy<Regex> = Lazy::new(|| Regex::new(r"[–—]").expect("valid dash regex"));
static SLUG_SPACED_DASH: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\s*-\s*").expect("valid spaced dash regex"));
static SLUG_SPACES: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("valid space regex"));
static SLUG_INVALID: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[^a-z0-9-]").expect("valid slug charset regex"));
static SLUG_DASH_RUN: Lazy<Regex> = Lazy::new(|| Regex::new(r"-+").expect("valid dash run regex"));

// =============================================================================
// RULE TABLE
// =============================================================================

/// How one master field gets its value from a row.
#[derive(Clone, Copy)]
pub enum Rule {
    /// Copy the named column; coercion handles trimming and blanks.
    Copy(&'static str),
    /// Compute from the whole row.
    Derive(fn(&ExternalRow) -> FieldValue),
}

impl std::fmt::Debug for Rule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Rule::Copy(column) => f.debug_tuple("Copy").field(column).finish(),
            Rule::Derive(_) => f.write_str("Derive(..)"),
        }
    }
}

/// One row of the mapping table.
#[derive(Debug, Clone, Copy)]
pub struct MappingRule {
    pub field: Field,
    pub rule: Rule,
}

impl MappingRule {
    const fn copy(field: Field, column: &'static str) -> Self {
        Self {
            field,
            rule: Rule::Copy(column),
        }
    }

    const fn derive(field: Field, f: fn(&ExternalRow) -> FieldValue) -> Self {
        Self {
            field,
            rule: Rule::Derive(f),
        }
    }

    pub fn evaluate(&self, row: &ExternalRow) -> FieldValue {
        match self.rule {
            Rule::Copy(column) => FieldValue::Text(row.get(column).to_string()),
            Rule::Derive(f) => f(row),
        }
    }
}

/// Import rules for every non-provenance field. The provenance stamp is
/// owned by the batch engine.
pub static IMPORT_RULES: [MappingRule; 28] = [
    MappingRule::derive(Field::Cover, cover),
    MappingRule::derive(Field::ImgAlt, |r| multi(r, COL_IMG_ALT)),
    MappingRule::derive(Field::ImgDescr, |r| multi(r, COL_IMG_DESCR)),
    MappingRule::derive(Field::ImgFilename, |r| multi(r, COL_IMG_FILENAME)),
    MappingRule::derive(Field::ImgId, |r| multi(r, COL_IMG_ID)),
    MappingRule::derive(Field::ImgLegende, |r| multi(r, COL_IMG_CAPTION)),
    MappingRule::derive(Field::ImgTitre, |r| multi(r, COL_IMG_TITLE)),
    MappingRule::derive(Field::ImgUrl, |r| multi(r, COL_IMG_URL)),
    MappingRule::derive(Field::LienArchives, |_| FieldValue::Nullable(None)),
    MappingRule::derive(Field::LienJournal, |_| FieldValue::Nullable(None)),
    MappingRule::derive(Field::LienProjet, project_links),
    MappingRule::derive(Field::LienRestes, |_| FieldValue::Nullable(None)),
    MappingRule::derive(Field::MajWp, |_| FieldValue::Flag(true)),
    MappingRule::derive(Field::PostCat, categories),
    MappingRule::derive(Field::PostDate, |r| {
        FieldValue::Text(to_iso_with_t(r.get(COL_DATE)))
    }),
    MappingRule::derive(Field::PostDescr, |r| url_or_text(r.get(COL_GEN_DESCR), false)),
    MappingRule::copy(Field::PostExtrait, COL_EXCERPT),
    MappingRule::copy(Field::PostId, COL_ID),
    MappingRule::derive(Field::PostMod, modified_date),
    MappingRule::derive(Field::PostPerma, |r| url_or_text(r.get(COL_PERMALINK), true)),
    MappingRule::derive(Field::PostTitre1, |r| FieldValue::Nullable(split_title(r).0)),
    MappingRule::derive(Field::PostTitre2, |r| FieldValue::Nullable(split_title(r).1)),
    MappingRule::copy(Field::PostTitreFull, COL_TITLE),
    MappingRule::derive(Field::PostVidUrl, |r| url_or_text(r.get(COL_GEN_VIDEO), true)),
    MappingRule::derive(Field::Tags, tags),
    MappingRule::copy(Field::WpCarnetLink, COL_CARNET_LINK),
    MappingRule::derive(Field::WpCarnetOn, |r| {
        FieldValue::Flag(!r.get(COL_CARNET_ON).is_empty())
    }),
    MappingRule::copy(Field::WpStatus, COL_STATUS),
];

/// Map one row through [`IMPORT_RULES`].
pub fn map_row(row: &ExternalRow) -> MasterRecord {
    let mut record = create_empty();
    for rule in &IMPORT_RULES {
        let value = rule.evaluate(row);
        tracing::trace!(field = %rule.field, "Mapped field");
        record.set(rule.field, value);
    }
    record
}

// =============================================================================
// DERIVATIONS
// =============================================================================

fn split_multi(value: &str) -> Vec<String> {
    dedup_preserving_order(
        value
            .split(MULTI_VALUE_SEPARATOR)
            .map(|s| s.trim().to_string()),
    )
}

fn multi(row: &ExternalRow, column: &str) -> FieldValue {
    FieldValue::List(split_multi(row.get(column)))
}

fn cover(row: &ExternalRow) -> FieldValue {
    FieldValue::Nullable(split_multi(row.get(COL_IMG_URL)).into_iter().next())
}

fn hierarchy(row: &ExternalRow) -> Vec<String> {
    dedup_preserving_order(
        row.get(COL_CATEGORIES)
            .split(CATEGORY_SEPARATOR)
            .map(|s| s.trim().to_string()),
    )
}

fn categories(row: &ExternalRow) -> FieldValue {
    FieldValue::List(hierarchy(row))
}

fn project_links(row: &ExternalRow) -> FieldValue {
    FieldValue::List(hierarchy(row).iter().map(|c| wrap_wiki(c)).collect())
}

fn modified_date(row: &ExternalRow) -> FieldValue {
    let modified = row.get(COL_DATE_MODIFIED);
    let source = if modified.is_empty() {
        row.get(COL_DATE)
    } else {
        modified
    };
    FieldValue::Text(to_iso_with_t(source))
}

fn url_or_text(value: &str, require_url: bool) -> FieldValue {
    let value = value.trim();
    let keep = !value.is_empty() && (!require_url || HTTP_URL.is_match(value));
    FieldValue::Nullable(keep.then(|| value.to_string()))
}

/// `(titre_1, titre_2)`: the generated columns when present, else the parts
/// of the title around its first dash or colon.
fn split_title(row: &ExternalRow) -> (Option<String>, Option<String>) {
    let parts: Vec<&str> = TITLE_SPLIT.split(row.get(COL_TITLE)).collect();
    let has_parts = parts.len() > 1;

    let gen_1 = row.get(COL_GEN_TITLE);
    let titre_1 = if !gen_1.is_empty() {
        Some(gen_1.to_string())
    } else if has_parts {
        Some(parts[0].trim().to_string())
    } else {
        None
    };

    let gen_2 = row.get(COL_GEN_SUBTITLE);
    let titre_2 = if !gen_2.is_empty() {
        Some(gen_2.to_string())
    } else if has_parts {
        Some(parts[1..].join("—").trim().to_string())
    } else {
        None
    };

    (titre_1, titre_2)
}

fn tags(row: &ExternalRow) -> FieldValue {
    FieldValue::List(dedup_preserving_order(
        row.get(COL_TAGS).split(TAG_SEPARATOR).map(slugify),
    ))
}

/// Publishing-system slug: lowercase ASCII letters, digits and single dashes.
///
/// Accented Latin letters lose their accent; other characters are dropped.
pub fn slugify(input: &str) -> String {
    let folded: String = input
        .trim()
        .to_lowercase()
        .chars()
        .map(fold_accent)
        .filter(|&c| c != '\'')
        .collect();

    let s = SLUG_DASH.replace_all(&folded, "-");
    let s = SLUG_SPACED_DASH.replace_all(&s, "-");
    let s = SLUG_SPACES.replace_all(&s, "-");
    let s = SLUG_INVALID.replace_all(&s, "");
    let s = SLUG_DASH_RUN.replace_all(&s, "-");
    s.trim_matches('-').to_string()
}

fn fold_accent(c: char) -> char {
    match c {
        'à' | 'á' | 'â' | 'ã' | 'ä' | 'å' | 'ā' | 'ă' | 'ą' => 'a',
        'ç' | 'ć' | 'ĉ' | 'ċ' | 'č' => 'c',
        'ď' => 'd',
        'è' | 'é' | 'ê' | 'ë' | 'ē' | 'ĕ' | 'ė' | 'ę' | 'ě' => 'e',
        'ĝ' | 'ğ' | 'ġ' | 'ģ' => 'g',
        'ĥ' => 'h',
        'ì' | 'í' | 'î' | 'ï' | 'ĩ' | 'ī' | 'ĭ' | 'į' => 'i',
        'ĵ' => 'j',
        'ķ' => 'k',
        'ĺ' | 'ļ' | 'ľ' => 'l',
        'ñ' | 'ń' | 'ņ' | 'ň' => 'n',
        'ò' | 'ó' | 'ô' | 'õ' | 'ö' | 'ō' | 'ŏ' | 'ő' => 'o',
        'ŕ' | 'ŗ' | 'ř' => 'r',
        'ś' | 'ŝ' | 'ş' | 'š' => 's',
        'ţ' | 'ť' => 't',
        'ù' | 'ú' | 'û' | 'ü' | 'ũ' | 'ū' | 'ŭ' | 'ů' | 'ű' | 'ų' => 'u',
        'ŵ' => 'w',
        'ý' | 'ÿ' | 'ŷ' => 'y',
        'ź' | 'ż' | 'ž' => 'z',
        other => other,
    }
}

/// Normalise an export timestamp to `YYYY-MM-DDTHH:MM:SS`.
///
/// Values already carrying a `T` pass through, a bare date gets midnight, a
/// space-separated date and time gets the `T` separator. Anything else only
/// has its first space replaced.
pub fn to_iso_with_t(input: &str) -> String {
    let s = input.trim();
    if s.is_empty() || s.contains('T') {
        return s.to_string();
    }

    if DATE_ONLY.is_match(s) {
        if let Ok(date) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
            return date.format("%Y-%m-%dT00:00:00").to_string();
        }
        return format!("{s}T00:00:00");
    }

    if let Some(caps) = DATE_TIME.captures(s) {
        let joined = format!("{}T{}", &caps[1], &caps[2]);
        if let Ok(dt) = NaiveDateTime::parse_from_str(&joined, "%Y-%m-%dT%H:%M:%S") {
            return dt.format("%Y-%m-%dT%H:%M:%S").to_string();
        }
        return joined;
    }

    s.replacen(' ', "T", 1)
}
