//! Tag reconciliation: the exported tag list against the local tags table.
//!
//! The local table is a five-column Markdown table inside a note. Its
//! `notes` column carries two markers: `obc` for a tag created locally and
//! not yet published, `obm` for a tag renamed locally whose slug and name
//! must not be overwritten from the export.
//!
//! Only four diff kinds change the table (new tag, id, name, count). The
//! other three are reported for manual review.

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::fmt;

use chrono::NaiveDateTime;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use crate::dataset::split_line;
use crate::defaults::{
    TAGS_BACKUP_DIR, TAGS_CSV_DIR, TAGS_CSV_HEADERS, TAGS_META_LAST_CSV, TAGS_META_LAST_UPDATE,
    TAGS_META_REMOTE_PENDING, TAGS_TABLE_HEADERS, TAG_CREATED_LOCALLY, TAG_MODIFIED_LOCALLY,
};
use crate::error::{Error, Result};
use crate::files::{file_name, file_stem, join_locator, parent_dir};
use crate::frontmatter::{assemble, patch_keys, split_document, yaml_scalar, Document};
use crate::normalize::normalize_eol;
use crate::traits::RecordStore;

static STRICT_INT: Lazy<Regex> = Lazy::new(|| Regex::new(r"^-?\d+$").expect("valid int regex"));
static SLUG_CHARS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-z0-9-]+$").expect("valid slug regex"));
static WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("valid blank regex"));
static EXPORT_NAME: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\d{4}-\d{2}-\d{2}_export_tags\.csv$").expect("valid export name regex")
});
static TABLE_HEADER: Lazy<Regex> = Lazy::new(|| {
    let cells: Vec<String> = TAGS_TABLE_HEADERS.iter().map(|h| regex::escape(h)).collect();
    Regex::new(&format!(r"(?i)^\|\s*{}\s*\|\s*$", cells.join(r"\s*\|\s*")))
        .expect("valid table header regex")
});
static TABLE_SEPARATOR: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\|\s*-+\s*\|\s*-+\s*\|\s*-+\s*\|\s*-+\s*\|\s*-+\s*\|$")
        .expect("valid table separator regex")
});

const NONE_MARK: &str = "∅";

// =============================================================================
// ROWS
// =============================================================================

/// One tag of the exported list.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteTag {
    pub id: Option<i64>,
    pub name: String,
    pub slug: String,
    pub count: u64,
}

/// One row of the local tags table.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalTag {
    pub id: Option<i64>,
    pub name: String,
    pub slug: String,
    pub count: u64,
    /// Empty, `obc` or `obm`.
    pub notes: String,
}

impl LocalTag {
    pub fn is_created_locally(&self) -> bool {
        self.notes.trim().eq_ignore_ascii_case(TAG_CREATED_LOCALLY)
    }

    pub fn is_modified_locally(&self) -> bool {
        self.notes.trim().eq_ignore_ascii_case(TAG_MODIFIED_LOCALLY)
    }
}

impl From<&RemoteTag> for LocalTag {
    fn from(remote: &RemoteTag) -> Self {
        Self {
            id: remote.id,
            name: remote.name.trim().to_string(),
            slug: norm(&remote.slug),
            count: remote.count,
            notes: String::new(),
        }
    }
}

fn norm(slug: &str) -> String {
    slug.trim().to_lowercase()
}

/// Strict integer cell: blank and `null` are absent, anything else that is
/// not `-?\d+` too.
fn parse_int(cell: &str) -> Option<i64> {
    let t = cell.trim();
    if t.is_empty() || t.eq_ignore_ascii_case("null") || !STRICT_INT.is_match(t) {
        return None;
    }
    t.parse().ok()
}

fn parse_count(cell: &str) -> Option<u64> {
    parse_int(cell).and_then(|n| u64::try_from(n).ok())
}

// =============================================================================
// EXPORTED LIST
// =============================================================================

/// Parsed tag export. Row problems are collected, not fatal.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagsCsv {
    pub header_valid: bool,
    pub rows: Vec<RemoteTag>,
    pub errors: Vec<String>,
}

/// Parse a tag export (`wp_tags_id,wp_tags_name,wp_tags_slug,wp_tags_count`).
///
/// An unexpected header is reported through `header_valid`; rows are still
/// read. Line numbers in `errors` count non-empty lines from 1.
pub fn parse_tags_csv(text: &str) -> TagsCsv {
    let text = normalize_eol(text);
    let lines: Vec<&str> = text.split('\n').filter(|l| !l.is_empty()).collect();

    let Some(first) = lines.first() else {
        return TagsCsv {
            header_valid: false,
            rows: Vec::new(),
            errors: vec!["empty tag export".to_string()],
        };
    };

    let mut errors = Vec::new();
    let header = split_line(first.trim_start_matches('\u{feff}'), ',');
    let header_valid = header.iter().map(String::as_str).eq(TAGS_CSV_HEADERS);
    if !header_valid {
        errors.push(format!(
            "invalid header: expected {}, found {}",
            TAGS_CSV_HEADERS.join(","),
            header.join(",")
        ));
    }

    let mut rows = Vec::new();
    for (i, line) in lines.iter().enumerate().skip(1) {
        if line.trim().is_empty() {
            continue;
        }
        let n = i + 1;
        let cells = split_line(line, ',');
        if cells.len() != TAGS_CSV_HEADERS.len() {
            errors.push(format!(
                "line {n}: expected {} columns, found {}",
                TAGS_CSV_HEADERS.len(),
                cells.len()
            ));
            continue;
        }

        let count = parse_count(&cells[3]).unwrap_or_else(|| {
            errors.push(format!("line {n}: invalid wp_tags_count {:?}", cells[3]));
            0
        });

        let mut slug = norm(&cells[2]);
        if slug.chars().any(char::is_whitespace) {
            errors.push(format!("line {n}: wp_tags_slug contains spaces {:?}", cells[2]));
            slug = WHITESPACE.replace_all(&slug, "-").into_owned();
        }
        if !slug.is_empty() && !SLUG_CHARS.is_match(&slug) {
            errors.push(format!("line {n}: wp_tags_slug has unexpected characters {:?}", cells[2]));
        }

        rows.push(RemoteTag {
            id: parse_int(&cells[0]),
            name: cells[1].trim().to_string(),
            slug,
            count,
        });
    }

    TagsCsv {
        header_valid,
        rows,
        errors,
    }
}

/// Newest `YYYY-MM-DD_export_tags.csv` under the export directory.
pub fn latest_tags_csv(locators: &[String]) -> Option<String> {
    let prefix = format!("{TAGS_CSV_DIR}/");
    locators
        .iter()
        .filter(|l| l.starts_with(&prefix) && EXPORT_NAME.is_match(file_name(l)))
        .max_by(|a, b| file_name(a).cmp(file_name(b)))
        .cloned()
}

// =============================================================================
// LOCAL TABLE
// =============================================================================

/// The tags table found in a note body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagsTable {
    /// Body line index of the header row.
    pub start_line: usize,
    /// Body line index of the last row, separator included.
    pub end_line: usize,
    pub rows: Vec<LocalTag>,
}

/// Find the first tags table in a note body.
///
/// The header must name the five columns (case and spacing are free) and be
/// followed by a separator row. Data rows stop at a blank line, a line
/// without `|`, or a row with fewer than five cells.
pub fn parse_tags_table(body: &str) -> Option<TagsTable> {
    let body = normalize_eol(body);
    let lines: Vec<&str> = body.split('\n').collect();

    let header = lines.iter().position(|l| TABLE_HEADER.is_match(l.trim()))?;
    let separator = lines.get(header + 1).map(|l| l.trim()).unwrap_or("");
    if !TABLE_SEPARATOR.is_match(separator) {
        return None;
    }

    let mut end_line = header + 1;
    let mut rows = Vec::new();
    for (i, line) in lines.iter().enumerate().skip(header + 2) {
        if line.trim().is_empty() || !line.contains('|') {
            break;
        }
        let cells = split_table_row(line);
        if cells.len() < TAGS_TABLE_HEADERS.len() {
            break;
        }
        rows.push(LocalTag {
            id: parse_int(cells[0]),
            name: cells[1].trim().to_string(),
            slug: norm(cells[2]),
            count: parse_count(cells[3]).unwrap_or(0),
            notes: cells[4].trim().to_string(),
        });
        end_line = i;
    }

    Some(TagsTable {
        start_line: header,
        end_line,
        rows,
    })
}

fn split_table_row(line: &str) -> Vec<&str> {
    let Some(inner) = line.trim().strip_prefix('|') else {
        return Vec::new();
    };
    let inner = inner.trim_start();
    let inner = inner.strip_suffix('|').unwrap_or(inner);
    inner.split('|').map(str::trim).collect()
}

/// Render rows as a tags table, sorted by slug, ending with a newline.
pub fn render_tags_table(rows: &[LocalTag]) -> String {
    let mut sorted: Vec<&LocalTag> = rows.iter().collect();
    sorted.sort_by_key(|r| norm(&r.slug));

    let mut lines = vec![
        format!("| {} |", TAGS_TABLE_HEADERS.join(" | ")),
        "| --- | --- | --- | --- | --- |".to_string(),
    ];
    for row in sorted {
        lines.push(format!(
            "| {} | {} | {} | {} | {} |",
            row.id.map(|id| id.to_string()).unwrap_or_default(),
            row.name.trim(),
            norm(&row.slug),
            row.count,
            row.notes.trim()
        ));
    }
    lines.join("\n") + "\n"
}

/// Swap the table block of a note for `table_md`.
///
/// `table` locates the block in the body of `text`. Without one the table
/// is appended to the body. Frontmatter and the rest of the body are kept.
pub fn replace_tags_table(text: &str, table: Option<&TagsTable>, table_md: &str) -> String {
    let doc = split_document(text);

    let body = match table {
        None => {
            let sep = if doc.body.is_empty() || doc.body.ends_with('\n') {
                ""
            } else {
                "\n"
            };
            format!("{}{}{}", doc.body, sep, table_md)
        }
        Some(t) => {
            let lines: Vec<&str> = doc.body.split('\n').collect();
            let start = t.start_line.min(lines.len());
            let end = (t.end_line + 1).clamp(start, lines.len());

            let mut before = lines[..start].join("\n");
            if start > 0 {
                before.push('\n');
            }
            format!("{before}{table_md}{}", lines[end..].join("\n"))
        }
    };

    assemble(&Document {
        frontmatter: doc.frontmatter,
        body,
    })
}

/// Slugs the local table allows, normalized.
pub fn table_slugs(rows: &[LocalTag]) -> BTreeSet<String> {
    rows.iter()
        .map(|r| norm(&r.slug))
        .filter(|s| !s.is_empty())
        .collect()
}

// =============================================================================
// DIFF
// =============================================================================

/// Classification of one difference between the export and the table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TagDiffKind {
    /// In the export, absent locally.
    NewTag,
    /// Locally created tag that received an id remotely.
    IdUpdate,
    /// Name (or slug, name and count) differs from the export.
    NameUpdate,
    /// Only the usage count differs.
    CountUpdate,
    /// Locally created tag not yet in the export.
    CreateRemotely,
    /// Locally renamed tag, protected from the export.
    LocallyModified,
    /// Anything the rules do not cover.
    Problem,
}

impl TagDiffKind {
    pub const ALL: [TagDiffKind; 7] = [
        TagDiffKind::NewTag,
        TagDiffKind::IdUpdate,
        TagDiffKind::NameUpdate,
        TagDiffKind::CountUpdate,
        TagDiffKind::CreateRemotely,
        TagDiffKind::LocallyModified,
        TagDiffKind::Problem,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            TagDiffKind::NewTag => "new_tag",
            TagDiffKind::IdUpdate => "id_update",
            TagDiffKind::NameUpdate => "name_update",
            TagDiffKind::CountUpdate => "count_update",
            TagDiffKind::CreateRemotely => "create_remotely",
            TagDiffKind::LocallyModified => "locally_modified",
            TagDiffKind::Problem => "problem",
        }
    }

    /// Heading used when listing a group.
    pub fn label(self) -> &'static str {
        match self {
            TagDiffKind::NewTag => "New tags",
            TagDiffKind::IdUpdate => "Id updates",
            TagDiffKind::NameUpdate => "Name updates",
            TagDiffKind::CountUpdate => "Count updates",
            TagDiffKind::CreateRemotely => "To create remotely (info)",
            TagDiffKind::LocallyModified => "Modified locally (info)",
            TagDiffKind::Problem => "Problems (info)",
        }
    }

    /// Whether applying items of this kind changes the table.
    pub fn is_actionable(self) -> bool {
        matches!(
            self,
            TagDiffKind::NewTag
                | TagDiffKind::IdUpdate
                | TagDiffKind::NameUpdate
                | TagDiffKind::CountUpdate
        )
    }
}

impl fmt::Display for TagDiffKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One difference.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagDiffItem {
    /// Stable identifier, `kind:slug|id=..`.
    pub key: String,
    pub kind: TagDiffKind,
    /// Local row involved, if any.
    pub before: Option<LocalTag>,
    /// Local row once applied. Only actionable kinds carry one.
    pub after: Option<LocalTag>,
    /// Exported row involved, if any.
    pub remote: Option<RemoteTag>,
    /// Selected by default.
    pub selected: bool,
    pub note: String,
}

/// Every difference, with per-kind counts.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagsDiff {
    pub items: Vec<TagDiffItem>,
    pub counts: BTreeMap<TagDiffKind, usize>,
    pub has_actionable: bool,
}

impl TagsDiff {
    /// Keys selected by default.
    pub fn default_keys(&self) -> BTreeSet<String> {
        self.items
            .iter()
            .filter(|it| it.selected)
            .map(|it| it.key.clone())
            .collect()
    }

    pub fn count(&self, kind: TagDiffKind) -> usize {
        self.counts.get(&kind).copied().unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

#[derive(Default)]
struct DiffBuilder {
    items: Vec<TagDiffItem>,
    seen: HashSet<String>,
}

impl DiffBuilder {
    fn push(
        &mut self,
        kind: TagDiffKind,
        before: Option<&LocalTag>,
        after: Option<LocalTag>,
        remote: Option<&RemoteTag>,
        note: &str,
    ) {
        let id = before.and_then(|r| r.id).or(after.as_ref().and_then(|r| r.id));
        let slug = before
            .map(|r| r.slug.as_str())
            .or(after.as_ref().map(|r| r.slug.as_str()))
            .or(remote.map(|r| r.slug.as_str()))
            .map(norm)
            .unwrap_or_default();
        let key = format!(
            "{}:{}|id={}",
            kind,
            if slug.is_empty() { NONE_MARK } else { slug.as_str() },
            id.map(|id| id.to_string()).unwrap_or_else(|| NONE_MARK.to_string())
        );
        if !self.seen.insert(key.clone()) {
            return;
        }
        self.items.push(TagDiffItem {
            key,
            kind,
            before: before.cloned(),
            after,
            remote: remote.cloned(),
            selected: kind.is_actionable(),
            note: note.to_string(),
        });
    }

    fn finish(self) -> TagsDiff {
        let mut counts: BTreeMap<TagDiffKind, usize> =
            TagDiffKind::ALL.iter().map(|k| (*k, 0)).collect();
        for item in &self.items {
            *counts.entry(item.kind).or_default() += 1;
        }
        let has_actionable = self.items.iter().any(|it| it.kind.is_actionable());
        TagsDiff {
            items: self.items,
            counts,
            has_actionable,
        }
    }
}

/// Local tag awaiting creation remotely: no id, `obc`, slug absent from the
/// export.
fn awaits_creation(row: &LocalTag, remote_slugs: &HashSet<String>) -> bool {
    let slug = norm(&row.slug);
    row.id.is_none() && row.is_created_locally() && !slug.is_empty() && !remote_slugs.contains(&slug)
}

fn remote_slugs(remote: &[RemoteTag]) -> HashSet<String> {
    remote
        .iter()
        .map(|r| norm(&r.slug))
        .filter(|s| !s.is_empty())
        .collect()
}

/// Classify every difference between the export and the local table.
///
/// For each exported row, in order: an exact id and slug match may yield a
/// name and a count update; the same id under another slug is a full update
/// unless the local row is `obm`; the same slug under another id fills in
/// the id of an `obc` row, anything else is a problem; otherwise the tag is
/// new. Then local rows awaiting creation are listed, and every remaining
/// local row that is not identical in the export becomes a problem.
pub fn build_tags_diff(remote: &[RemoteTag], local: &[LocalTag]) -> TagsDiff {
    let mut remote_by_id: BTreeMap<i64, &RemoteTag> = BTreeMap::new();
    let mut remote_by_slug: BTreeMap<String, &RemoteTag> = BTreeMap::new();
    for row in remote {
        if let Some(id) = row.id {
            remote_by_id.entry(id).or_insert(row);
        }
        let slug = norm(&row.slug);
        if !slug.is_empty() {
            remote_by_slug.entry(slug).or_insert(row);
        }
    }

    let mut local_by_id: BTreeMap<i64, usize> = BTreeMap::new();
    let mut local_by_slug: BTreeMap<String, usize> = BTreeMap::new();
    for (i, row) in local.iter().enumerate() {
        if let Some(id) = row.id {
            local_by_id.entry(id).or_insert(i);
        }
        let slug = norm(&row.slug);
        if !slug.is_empty() {
            local_by_slug.entry(slug).or_insert(i);
        }
    }

    let mut handled: BTreeSet<usize> = BTreeSet::new();
    let mut diff = DiffBuilder::default();

    for csv in remote {
        let slug = norm(&csv.slug);
        let name = csv.name.trim().to_string();

        if let Some(i) = local
            .iter()
            .position(|l| l.id == csv.id && norm(&l.slug) == slug)
        {
            handled.insert(i);
            let exact = &local[i];
            if exact.name.trim() != name {
                let after = LocalTag {
                    name: name.clone(),
                    ..exact.clone()
                };
                diff.push(
                    TagDiffKind::NameUpdate,
                    Some(exact),
                    Some(after),
                    Some(csv),
                    "name differs, id and slug match",
                );
            }
            if exact.count != csv.count {
                let after = LocalTag {
                    count: csv.count,
                    ..exact.clone()
                };
                diff.push(
                    TagDiffKind::CountUpdate,
                    Some(exact),
                    Some(after),
                    Some(csv),
                    "count differs, id and slug match",
                );
            }
            continue;
        }

        let same_id = csv.id.and_then(|id| local_by_id.get(&id)).copied();
        if let Some(i) = same_id.filter(|&i| norm(&local[i].slug) != slug) {
            handled.insert(i);
            let row = &local[i];
            if row.is_modified_locally() {
                diff.push(
                    TagDiffKind::LocallyModified,
                    Some(row),
                    None,
                    Some(csv),
                    "modified locally, slug and name protected",
                );
            } else {
                let after = LocalTag {
                    slug: slug.clone(),
                    name,
                    count: csv.count,
                    ..row.clone()
                };
                diff.push(
                    TagDiffKind::NameUpdate,
                    Some(row),
                    Some(after),
                    Some(csv),
                    "same id under another slug, aligned on the export",
                );
            }
            continue;
        }

        let same_slug = local_by_slug.get(&slug).copied();
        if let Some(i) = same_slug.filter(|&i| local[i].id != csv.id) {
            handled.insert(i);
            let row = &local[i];
            if csv.id.is_some() && row.id.is_none() && row.is_created_locally() {
                let after = LocalTag {
                    id: csv.id,
                    name,
                    count: csv.count,
                    notes: String::new(),
                    ..row.clone()
                };
                diff.push(
                    TagDiffKind::IdUpdate,
                    Some(row),
                    Some(after),
                    Some(csv),
                    "locally created tag published, id taken from the export",
                );
            } else {
                diff.push(
                    TagDiffKind::Problem,
                    Some(row),
                    None,
                    Some(csv),
                    "same slug under different ids, review manually",
                );
            }
            continue;
        }

        diff.push(
            TagDiffKind::NewTag,
            None,
            Some(LocalTag::from(csv)),
            Some(csv),
            "absent locally",
        );
    }

    let slugs = remote_slugs(remote);
    for (i, row) in local.iter().enumerate() {
        if awaits_creation(row, &slugs) {
            handled.insert(i);
            diff.push(
                TagDiffKind::CreateRemotely,
                Some(row),
                None,
                None,
                "created locally, absent from the export",
            );
        }
    }

    for (i, row) in local.iter().enumerate() {
        if handled.contains(&i) {
            continue;
        }
        let slug = norm(&row.slug);
        let by_id = row.id.and_then(|id| remote_by_id.get(&id)).copied();
        let by_slug = remote_by_slug.get(&slug).copied();

        let identical = match (by_id, by_slug) {
            (Some(r), Some(_)) => {
                r.id == row.id
                    && norm(&r.slug) == slug
                    && r.name.trim() == row.name.trim()
                    && r.count == row.count
            }
            _ => false,
        };
        if !identical {
            diff.push(
                TagDiffKind::Problem,
                Some(row),
                None,
                by_id.or(by_slug),
                "not covered by the rules, review manually",
            );
        }
    }

    diff.finish()
}

fn locate(rows: &[LocalTag], before: &LocalTag) -> Option<usize> {
    match before.id {
        Some(id) => rows.iter().position(|r| r.id == Some(id)),
        None => {
            let slug = norm(&before.slug);
            rows.iter().position(|r| norm(&r.slug) == slug)
        }
    }
}

fn chosen<'a>(
    diff: &'a TagsDiff,
    selected: &'a BTreeSet<String>,
    kind: TagDiffKind,
) -> impl Iterator<Item = &'a TagDiffItem> + 'a {
    diff.items
        .iter()
        .filter(move |it| it.kind == kind && selected.contains(&it.key))
}

/// Apply the selected actionable items to a copy of `local`.
///
/// Order is id updates, name updates, count updates, then new tags; a new
/// tag whose id or slug already exists is skipped. Informational items are
/// ignored.
pub fn apply_tags_diff(
    local: &[LocalTag],
    diff: &TagsDiff,
    selected: &BTreeSet<String>,
) -> Vec<LocalTag> {
    let mut out = local.to_vec();

    for item in chosen(diff, selected, TagDiffKind::IdUpdate) {
        let (Some(before), Some(after)) = (&item.before, &item.after) else {
            continue;
        };
        let slug = norm(&before.slug);
        if let Some(row) = out.iter_mut().find(|r| norm(&r.slug) == slug) {
            *row = after.clone();
        }
    }

    for item in chosen(diff, selected, TagDiffKind::NameUpdate) {
        let (Some(before), Some(after)) = (&item.before, &item.after) else {
            continue;
        };
        if let Some(i) = locate(&out, before) {
            out[i] = after.clone();
        }
    }

    for item in chosen(diff, selected, TagDiffKind::CountUpdate) {
        let (Some(before), Some(after)) = (&item.before, &item.after) else {
            continue;
        };
        if let Some(i) = locate(&out, before) {
            out[i].count = after.count;
        }
    }

    for item in chosen(diff, selected, TagDiffKind::NewTag) {
        let Some(after) = &item.after else {
            continue;
        };
        let slug = norm(&after.slug);
        let exists = out.iter().any(|r| {
            (after.id.is_some() && r.id == after.id) || (!slug.is_empty() && norm(&r.slug) == slug)
        });
        if !exists {
            out.push(after.clone());
        }
    }

    out
}

/// Whether some local tag still has to be created remotely.
pub fn has_local_missing_remotely(local: &[LocalTag], remote: &[RemoteTag]) -> bool {
    let slugs = remote_slugs(remote);
    local.iter().any(|row| awaits_creation(row, &slugs))
}

// =============================================================================
// SYNC
// =============================================================================

/// What [`sync_tags_table`] may write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TagsMode {
    /// Compute the diff only.
    Preview,
    /// Apply every item selected by default.
    Defaults,
    /// Apply the items with these keys.
    Keys(BTreeSet<String>),
}

/// Result of a reconciliation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum TagsOutcome {
    Preview,
    /// Nothing actionable; only the table metadata was refreshed.
    MetadataOnly { backup: String, wp_update: bool },
    /// Actionable items existed but none was selected. Nothing written.
    NothingSelected,
    Applied {
        backup: String,
        applied: Vec<String>,
        rows_after: usize,
        wp_update: bool,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TagsReport {
    /// Tags table locator.
    pub table: String,
    /// Export locator.
    pub csv: String,
    pub csv_warnings: Vec<String>,
    pub rows_before: usize,
    pub diff: TagsDiff,
    pub outcome: TagsOutcome,
}

/// Metadata written to the table's frontmatter after a reconciliation.
fn table_meta(csv: &str, now: NaiveDateTime, pending: bool) -> Vec<(&'static str, String)> {
    vec![
        (
            TAGS_META_LAST_UPDATE,
            yaml_scalar(&now.format("%Y-%m-%d %H:%M").to_string()).into_owned(),
        ),
        (
            TAGS_META_LAST_CSV,
            yaml_scalar(&format!("[[{}]]", file_name(csv))).into_owned(),
        ),
        (TAGS_META_REMOTE_PENDING, pending.to_string()),
    ]
}

/// Copy the table note to `<dir>/backup/<stem>_YYYYMMDD-HHMM.md`.
///
/// An existing backup with the same stamp is kept as is.
async fn backup_table<S>(store: &S, table: &str, text: &str, now: NaiveDateTime) -> Result<String>
where
    S: RecordStore + ?Sized,
{
    let name = format!("{}_{}.md", file_stem(table), now.format("%Y%m%d-%H%M"));
    let locator = join_locator(&join_locator(parent_dir(table), TAGS_BACKUP_DIR), &name);
    if store.exists(&locator).await? {
        debug!(locator = %locator, "Backup already present");
        return Ok(locator);
    }
    store.write(&locator, text).await?;
    Ok(locator)
}

/// Reconcile the tags table at `table` with an export.
///
/// `csv` defaults to the newest export. An invalid export header is
/// `Error::Dataset`; a missing table note is `Error::NotFound`. A note
/// without a table counts as an empty table. Every write is preceded by a
/// backup of the note.
#[instrument(
    skip(store, mode, now),
    fields(subsystem = "tags", component = "sync", op = "sync_tags_table")
)]
pub async fn sync_tags_table<S>(
    store: &S,
    table: &str,
    csv: Option<&str>,
    mode: &TagsMode,
    now: NaiveDateTime,
) -> Result<TagsReport>
where
    S: RecordStore + ?Sized,
{
    let csv = match csv {
        Some(locator) => locator.to_string(),
        None => latest_tags_csv(&store.list().await?).ok_or_else(|| {
            Error::NotFound(format!("no YYYY-MM-DD_export_tags.csv under {TAGS_CSV_DIR}/"))
        })?,
    };

    let parsed = parse_tags_csv(&store.read(&csv).await?);
    if !parsed.header_valid {
        return Err(Error::Dataset(format!(
            "{csv}: {}",
            parsed.errors.first().map(String::as_str).unwrap_or("invalid header")
        )));
    }
    for warning in &parsed.errors {
        warn!(csv = %csv, warning = %warning, "Tag export row skipped or adjusted");
    }

    let text = store.read(table).await?;
    let local = parse_tags_table(&split_document(&text).body)
        .map(|t| t.rows)
        .unwrap_or_default();
    let diff = build_tags_diff(&parsed.rows, &local);
    debug!(
        item_count = diff.items.len(),
        has_actionable = diff.has_actionable,
        "Tags diff built"
    );

    let outcome = match mode {
        TagsMode::Preview => TagsOutcome::Preview,
        _ if !diff.has_actionable => {
            let wp_update = has_local_missing_remotely(&local, &parsed.rows);
            let backup = backup_table(store, table, &text, now).await?;
            store
                .write(table, &patch_keys(&text, &table_meta(&csv, now, wp_update)))
                .await?;
            TagsOutcome::MetadataOnly { backup, wp_update }
        }
        _ => {
            let selected = match mode {
                TagsMode::Keys(keys) => keys.clone(),
                _ => diff.default_keys(),
            };
            let applied: Vec<String> = diff
                .items
                .iter()
                .filter(|it| it.kind.is_actionable() && selected.contains(&it.key))
                .map(|it| it.key.clone())
                .collect();

            if applied.is_empty() {
                TagsOutcome::NothingSelected
            } else {
                let rows = apply_tags_diff(&local, &diff, &selected);
                let wp_update = has_local_missing_remotely(&rows, &parsed.rows);
                let backup = backup_table(store, table, &text, now).await?;

                let patched = patch_keys(&text, &table_meta(&csv, now, wp_update));
                let block = parse_tags_table(&split_document(&patched).body);
                let updated = replace_tags_table(&patched, block.as_ref(), &render_tags_table(&rows));
                store.write(table, &updated).await?;

                TagsOutcome::Applied {
                    backup,
                    applied,
                    rows_after: rows.len(),
                    wp_update,
                }
            }
        }
    };

    info!(
        table = %table,
        csv = %csv,
        outcome = ?outcome,
        "Tags reconciliation finished"
    );
    Ok(TagsReport {
        table: table.to_string(),
        csv,
        csv_warnings: parsed.errors,
        rows_before: local.len(),
        diff,
        outcome,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ltag(id: Option<i64>, name: &str, slug: &str, count: u64, notes: &str) -> LocalTag {
        LocalTag {
            id,
            name: name.into(),
            slug: slug.into(),
            count,
            notes: notes.into(),
        }
    }

    fn rtag(id: Option<i64>, name: &str, slug: &str, count: u64) -> RemoteTag {
        RemoteTag {
            id,
            name: name.into(),
            slug: slug.into(),
            count,
        }
    }

    #[test]
    fn test_parse_tags_csv_rows_and_warnings() {
        let text = "\u{feff}wp_tags_id,wp_tags_name,wp_tags_slug,wp_tags_count\r\n\
                    12,\"Rivers, lakes\",Rivers,4\r\n\
                    null,Sky,Big Sky,x\r\n\
                    1,2\r\n";
        let parsed = parse_tags_csv(text);
        assert!(parsed.header_valid);
        assert_eq!(
            parsed.rows,
            vec![
                rtag(Some(12), "Rivers, lakes", "rivers", 4),
                rtag(None, "Sky", "big-sky", 0),
            ]
        );
        assert_eq!(parsed.errors.len(), 3);
        assert!(parsed.errors[0].starts_with("line 3: invalid wp_tags_count"));
        assert!(parsed.errors[1].starts_with("line 3: wp_tags_slug contains spaces"));
        assert_eq!(parsed.errors[2], "line 4: expected 4 columns, found 2");
    }

    #[test]
    fn test_parse_tags_csv_header_checks() {
        let parsed = parse_tags_csv("id,name,slug,count\n1,a,a,1\n");
        assert!(!parsed.header_valid);
        assert_eq!(parsed.rows.len(), 1);

        let empty = parse_tags_csv("");
        assert!(!empty.header_valid);
        assert_eq!(empty.errors, vec!["empty tag export"]);
    }

    #[test]
    fn test_parse_int_is_strict() {
        assert_eq!(parse_int(" 42 "), Some(42));
        assert_eq!(parse_int("-3"), Some(-3));
        assert_eq!(parse_int("NULL"), None);
        assert_eq!(parse_int("4.2"), None);
        assert_eq!(parse_count("-3"), None);
    }

    const BODY: &str = "Intro\n\n\
        | OB_tags_id | ob_tags_name | ob_tags_slug | ob_tags_count | ob_tags_notes |\n\
        | --- | --- | --- | --- | --- |\n\
        | 12 | Rivers | rivers | 4 |  |\n\
        |  | Sky | Sky | -1 | obc |\n\
        \n\
        Outro";

    #[test]
    fn test_parse_tags_table() {
        let table = parse_tags_table(BODY).unwrap();
        assert_eq!(table.start_line, 2);
        assert_eq!(table.end_line, 5);
        assert_eq!(
            table.rows,
            vec![
                ltag(Some(12), "Rivers", "rivers", 4, ""),
                ltag(None, "Sky", "sky", 0, "obc"),
            ]
        );
        assert!(table.rows[1].is_created_locally());
    }

    #[test]
    fn test_parse_tags_table_requires_separator() {
        let body = "| ob_tags_id | ob_tags_name | ob_tags_slug | ob_tags_count | ob_tags_notes |\n| 1 | a | a | 1 | |";
        assert_eq!(parse_tags_table(body), None);
        assert_eq!(parse_tags_table("no table"), None);
    }

    #[test]
    fn test_render_tags_table_sorted() {
        let rows = vec![
            ltag(None, "Sky", "sky", 0, "obc"),
            ltag(Some(12), " Rivers ", "Rivers", 4, ""),
        ];
        assert_eq!(
            render_tags_table(&rows),
            "| ob_tags_id | ob_tags_name | ob_tags_slug | ob_tags_count | ob_tags_notes |\n\
             | --- | --- | --- | --- | --- |\n\
             | 12 | Rivers | rivers | 4 |  |\n\
             |  | Sky | sky | 0 | obc |\n"
        );
    }

    #[test]
    fn test_replace_tags_table_in_place() {
        let text = format!("---\ntitle: Tags\n---\n{BODY}");
        let table = parse_tags_table(BODY).unwrap();
        let out = replace_tags_table(&text, Some(&table), "| new |\n");
        assert_eq!(out, "---\ntitle: Tags\n---\nIntro\n\n| new |\n\nOutro");
    }

    #[test]
    fn test_replace_tags_table_appends_when_missing() {
        let out = replace_tags_table("---\na: 1\n---\nIntro", None, "| t |\n");
        assert_eq!(out, "---\na: 1\n---\nIntro\n| t |\n");
    }

    fn scenario() -> (Vec<RemoteTag>, Vec<LocalTag>) {
        let remote = vec![
            rtag(Some(12), "Rivers & lakes", "rivers", 5),
            rtag(Some(20), "New", "new-slug", 2),
            rtag(Some(21), "Theirs", "theirs", 1),
            rtag(Some(30), "Sky", "sky", 3),
            rtag(Some(41), "Clash", "clash", 1),
            rtag(Some(50), "Same", "same", 2),
            rtag(Some(70), "Fresh", "fresh", 1),
        ];
        let local = vec![
            ltag(Some(12), "Rivers", "rivers", 4, ""),
            ltag(Some(20), "Old", "old-slug", 1, ""),
            ltag(Some(21), "Mine", "mine", 1, "obm"),
            ltag(None, "Sky", "sky", 0, "obc"),
            ltag(None, "Draft", "draft", 0, "obc"),
            ltag(Some(40), "Clash", "clash", 1, ""),
            ltag(Some(50), "Same", "same", 2, ""),
            ltag(Some(60), "Gone", "gone", 1, ""),
        ];
        (remote, local)
    }

    #[test]
    fn test_build_tags_diff_classifies_every_kind() {
        let (remote, local) = scenario();
        let diff = build_tags_diff(&remote, &local);

        assert_eq!(diff.count(TagDiffKind::NewTag), 1);
        assert_eq!(diff.count(TagDiffKind::IdUpdate), 1);
        assert_eq!(diff.count(TagDiffKind::NameUpdate), 2);
        assert_eq!(diff.count(TagDiffKind::CountUpdate), 1);
        assert_eq!(diff.count(TagDiffKind::CreateRemotely), 1);
        assert_eq!(diff.count(TagDiffKind::LocallyModified), 1);
        assert_eq!(diff.count(TagDiffKind::Problem), 2);
        assert!(diff.has_actionable);

        let keys: Vec<&str> = diff.items.iter().map(|it| it.key.as_str()).collect();
        assert_eq!(
            keys,
            vec![
                "name_update:rivers|id=12",
                "count_update:rivers|id=12",
                "name_update:old-slug|id=20",
                "locally_modified:mine|id=21",
                "id_update:sky|id=30",
                "problem:clash|id=40",
                "new_tag:fresh|id=70",
                "create_remotely:draft|id=∅",
                "problem:gone|id=60",
            ]
        );
        assert_eq!(
            diff.default_keys().len(),
            5,
            "only actionable items are selected"
        );
    }

    #[test]
    fn test_apply_tags_diff_defaults() {
        let (remote, local) = scenario();
        let diff = build_tags_diff(&remote, &local);
        let rows = apply_tags_diff(&local, &diff, &diff.default_keys());

        assert_eq!(rows.len(), 9);
        assert_eq!(rows[0], ltag(Some(12), "Rivers & lakes", "rivers", 5, ""));
        assert_eq!(rows[1], ltag(Some(20), "New", "new-slug", 2, ""));
        assert_eq!(rows[2], ltag(Some(21), "Mine", "mine", 1, "obm"));
        assert_eq!(rows[3], ltag(Some(30), "Sky", "sky", 3, ""));
        assert_eq!(rows[8], ltag(Some(70), "Fresh", "fresh", 1, ""));
        assert!(has_local_missing_remotely(&rows, &remote));
    }

    #[test]
    fn test_apply_tags_diff_respects_selection() {
        let (remote, local) = scenario();
        let diff = build_tags_diff(&remote, &local);
        let selected: BTreeSet<String> = ["count_update:rivers|id=12", "problem:gone|id=60"]
            .into_iter()
            .map(String::from)
            .collect();
        let rows = apply_tags_diff(&local, &diff, &selected);
        assert_eq!(rows.len(), local.len());
        assert_eq!(rows[0], ltag(Some(12), "Rivers", "rivers", 5, ""));
        assert_eq!(rows[1..], local[1..]);
    }

    #[test]
    fn test_identical_tables_have_no_items() {
        let remote = vec![rtag(Some(1), "A", "a", 1)];
        let local = vec![ltag(Some(1), "A", "a", 1, "")];
        let diff = build_tags_diff(&remote, &local);
        assert!(diff.is_empty());
        assert!(!diff.has_actionable);
        assert_eq!(diff.counts.len(), TagDiffKind::ALL.len());
    }

    #[test]
    fn test_latest_tags_csv() {
        let locators = vec![
            "wp_tags/wp_tags_csv/2024-01-02_export_tags.csv".to_string(),
            "wp_tags/wp_tags_csv/2024-03-01_export_tags.csv".to_string(),
            "wp_tags/wp_tags_csv/notes.csv".to_string(),
            "elsewhere/2025-01-01_export_tags.csv".to_string(),
        ];
        assert_eq!(
            latest_tags_csv(&locators).as_deref(),
            Some("wp_tags/wp_tags_csv/2024-03-01_export_tags.csv")
        );
        assert_eq!(latest_tags_csv(&[]), None);
    }

    #[test]
    fn test_table_slugs() {
        let rows = vec![ltag(None, "A", " A ", 0, ""), ltag(None, "B", "", 0, "")];
        assert_eq!(table_slugs(&rows).into_iter().collect::<Vec<_>>(), vec!["a"]);
    }
}
