//! Batch reconciliation engine.
//!
//! Imports external dataset rows into the record store. Each row is
//! validated, mapped to a master record, stamped with the dataset's
//! provenance and then either creates a new note or updates the note already
//! carrying the same `post_id`. Rows are processed sequentially so that every
//! lookup observes the writes of the rows before it.
//!
//! Row failures never stop the batch. They are recorded in the
//! [`BatchResult`] and, outside dry-run, leave an error note under
//! `<out_dir>/ERRORS/` for review. Only a malformed dataset identity aborts
//! the whole run.

use std::collections::BTreeSet;
use std::time::Instant;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use crate::body::render_import_body;
use crate::dataset::{parse_dataset, parse_dataset_name, DatasetStamp, ExternalRow, RowIssue};
use crate::defaults::{
    BODY_FIELD, DATASET_DELIMITER, IMPORT_ERROR_DIR, IMPORT_OUT_DIR, SECTION_EXTERNAL,
    SECTION_POST, SECTION_STATUS,
};
use crate::error::Result;
use crate::files::{ensure_unique_location, join_locator, sanitize_for_filename};
use crate::frontmatter::{render_note, split_document, yaml_scalar};
use crate::mapping::{map_row, COL_ID, COL_TITLE};
use crate::models::{Field, MasterRecord};
use crate::normalize::normalize_eol;
use crate::traits::{read_record, RecordStore};

static DIGITS: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\d+$").expect("valid digits regex"));

/// Top-level `key: value` line with a non-empty value.
static KEY_VALUE_LINE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^([A-Za-z0-9_]+)\s*:\s*(.+)$").expect("valid key/value regex"));

// =============================================================================
// OPTIONS AND REPORT TYPES
// =============================================================================

/// Per-run import settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportOptions {
    /// Directory locator for created notes.
    pub out_dir: String,
    /// Compute and classify everything, write nothing.
    pub dry_run: bool,
}

impl Default for ImportOptions {
    fn default() -> Self {
        Self {
            out_dir: IMPORT_OUT_DIR.to_string(),
            dry_run: false,
        }
    }
}

/// Why a row was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RowErrorKind {
    /// Both id and title are blank.
    EmptyRow,
    /// The id is not a run of digits.
    InvalidId,
    /// The title is blank.
    MissingTitle,
    /// The id is blank.
    MissingId,
    /// The line has more cells than the header declares.
    MalformedRow,
    /// The record store failed while handling the row.
    Storage,
}

impl RowErrorKind {
    pub fn message(self) -> &'static str {
        match self {
            Self::EmptyRow => "empty dataset row (id and title blank)",
            Self::InvalidId => "invalid post_id (id is not numeric)",
            Self::MissingTitle => "missing post_titre_full (title blank)",
            Self::MissingId => "missing post_id (id blank)",
            Self::MalformedRow => "malformed dataset row",
            Self::Storage => "record store failure",
        }
    }
}

/// What happened to one dataset row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum RowOutcome {
    /// A new note was (or, in dry-run, would be) written.
    Created {
        index: usize,
        post_id: String,
        locator: String,
    },
    /// The stored note already matches; nothing written.
    Identical {
        index: usize,
        post_id: String,
        locator: String,
    },
    /// The stored note differs and was (or would be) overwritten.
    Modified {
        index: usize,
        post_id: String,
        locator: String,
        changed_fields: Vec<String>,
    },
    /// The row was rejected.
    Error {
        index: usize,
        kind: RowErrorKind,
        message: String,
        id_raw: String,
        title_raw: String,
        /// Location of the error note, when one was written.
        artifact: Option<String>,
    },
}

impl RowOutcome {
    pub fn index(&self) -> usize {
        match self {
            Self::Created { index, .. }
            | Self::Identical { index, .. }
            | Self::Modified { index, .. }
            | Self::Error { index, .. } => *index,
        }
    }

    pub fn locator(&self) -> Option<&str> {
        match self {
            Self::Created { locator, .. }
            | Self::Identical { locator, .. }
            | Self::Modified { locator, .. } => Some(locator),
            Self::Error { .. } => None,
        }
    }

    fn label(&self) -> &'static str {
        match self {
            Self::Created { .. } => "created",
            Self::Identical { .. } => "identical",
            Self::Modified { .. } => "modified",
            Self::Error { .. } => "error",
        }
    }
}

/// Aggregate result of one import run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchResult {
    pub dataset: DatasetStamp,
    pub dry_run: bool,
    pub created: usize,
    /// `identical + modified`.
    pub updated: usize,
    pub identical: usize,
    pub modified: usize,
    pub errors: usize,
    /// Highest dataset id of the same key found in the store before the run.
    pub latest_known_id: Option<i64>,
    /// True when this dataset is older than `latest_known_id`.
    pub regression: bool,
    /// Per-row outcomes, by row index.
    pub rows: Vec<RowOutcome>,
}

impl BatchResult {
    fn new(dataset: DatasetStamp, dry_run: bool, latest_known_id: Option<i64>) -> Self {
        Self {
            regression: is_regression(dataset.id, latest_known_id),
            dataset,
            dry_run,
            created: 0,
            updated: 0,
            identical: 0,
            modified: 0,
            errors: 0,
            latest_known_id,
            rows: Vec::new(),
        }
    }

    fn push(&mut self, outcome: RowOutcome) {
        match &outcome {
            RowOutcome::Created { .. } => self.created += 1,
            RowOutcome::Identical { .. } => {
                self.updated += 1;
                self.identical += 1;
            }
            RowOutcome::Modified { .. } => {
                self.updated += 1;
                self.modified += 1;
            }
            RowOutcome::Error { .. } => self.errors += 1,
        }
        self.rows.push(outcome);
    }

    /// Number of rows seen.
    pub fn total(&self) -> usize {
        self.rows.len()
    }
}

// =============================================================================
// ANTI-REGRESSION
// =============================================================================

/// True when importing dataset `id` would roll records back to an older
/// version than `latest`. Re-running the latest dataset is allowed.
pub fn is_regression(id: i64, latest: Option<i64>) -> bool {
    latest.is_some_and(|latest| id < latest)
}

/// Highest `wp_import_dataset_id` among stored records stamped with `key`.
#[instrument(skip(store), fields(subsystem = "batch", component = "import_guard", op = "latest_dataset_id"))]
pub async fn latest_dataset_id<S>(store: &S, key: &str) -> Result<Option<i64>>
where
    S: RecordStore + ?Sized,
{
    let mut latest: Option<i64> = None;
    for locator in store.list().await? {
        let Some(record) = read_record(store, &locator).await else {
            continue;
        };
        if let Some((stamp_key, id)) = record.import_stamp() {
            if stamp_key == key {
                latest = Some(latest.map_or(id, |l| l.max(id)));
            }
        }
    }
    debug!(latest_id = ?latest, "Scanned stored dataset stamps");
    Ok(latest)
}

// =============================================================================
// RECONCILIATION
// =============================================================================

/// Parse a named dataset and reconcile every row.
///
/// The dataset name is checked first; a mismatch aborts before anything is
/// read or written. The import always splits on `;`.
#[instrument(
    skip(store, text, opts),
    fields(subsystem = "batch", component = "reconcile", op = "import_dataset")
)]
pub async fn import_dataset<S>(
    store: &S,
    dataset_name: &str,
    text: &str,
    opts: &ImportOptions,
) -> Result<BatchResult>
where
    S: RecordStore + ?Sized,
{
    let stamp = parse_dataset_name(dataset_name)?;
    let dataset = parse_dataset(text, Some(DATASET_DELIMITER))?;

    let mut result = reconcile(store, &stamp, &dataset.rows, opts).await?;
    for issue in &dataset.issues {
        let outcome = malformed_outcome(store, opts, issue).await;
        result.push(outcome);
    }
    result.rows.sort_by_key(RowOutcome::index);
    Ok(result)
}

/// Reconcile already-parsed rows against the store.
///
/// Fails only when the stamp is malformed or the initial provenance scan
/// cannot list the store; every per-row problem lands in the result.
#[instrument(
    skip(store, rows, opts),
    fields(
        subsystem = "batch",
        component = "reconcile",
        op = "reconcile",
        dataset_key = %stamp.key,
        dataset_id = stamp.id,
        row_count = rows.len(),
        dry_run = opts.dry_run,
    )
)]
pub async fn reconcile<S>(
    store: &S,
    stamp: &DatasetStamp,
    rows: &[ExternalRow],
    opts: &ImportOptions,
) -> Result<BatchResult>
where
    S: RecordStore + ?Sized,
{
    stamp.validate()?;
    let start = Instant::now();

    let latest = latest_dataset_id(store, &stamp.key).await?;
    let mut result = BatchResult::new(stamp.clone(), opts.dry_run, latest);
    if result.regression {
        warn!(
            dataset_id = stamp.id,
            latest_id = ?latest,
            "Dataset is older than the latest imported version"
        );
    }

    for row in rows {
        let outcome = reconcile_row(store, stamp, row, opts).await;
        debug!(row_index = row.index, outcome = outcome.label(), "Row reconciled");
        result.push(outcome);
    }

    info!(
        created = result.created,
        identical = result.identical,
        modified = result.modified,
        errors = result.errors,
        duration_ms = start.elapsed().as_millis() as u64,
        "Import finished"
    );
    Ok(result)
}

async fn reconcile_row<S>(
    store: &S,
    stamp: &DatasetStamp,
    row: &ExternalRow,
    opts: &ImportOptions,
) -> RowOutcome
where
    S: RecordStore + ?Sized,
{
    let record = match prepare_record(row, stamp) {
        Ok(record) => record,
        Err(kind) => return error_outcome(store, opts, row, kind, kind.message().to_string()).await,
    };

    match write_record(store, row.index, &record, opts).await {
        Ok(outcome) => outcome,
        Err(e) => error_outcome(store, opts, row, RowErrorKind::Storage, e.to_string()).await,
    }
}

/// Validate a row and build its stamped record.
pub fn prepare_record(
    row: &ExternalRow,
    stamp: &DatasetStamp,
) -> std::result::Result<MasterRecord, RowErrorKind> {
    let id = row.get(COL_ID).trim();
    let title = row.get(COL_TITLE).trim();

    if id.is_empty() && title.is_empty() {
        return Err(RowErrorKind::EmptyRow);
    }
    if !id.is_empty() && !DIGITS.is_match(id) {
        return Err(RowErrorKind::InvalidId);
    }

    let mut record = map_row(row);
    record.post_titre_full = title.to_string();
    record.post_id = id.to_string();
    if record.post_titre_1.is_none() && !title.is_empty() {
        record.post_titre_1 = Some(title.to_string());
    }

    if record.post_titre_full.is_empty() {
        return Err(RowErrorKind::MissingTitle);
    }
    if record.post_id.is_empty() {
        return Err(RowErrorKind::MissingId);
    }

    record.maj_wp = false;
    record.wp_import_dataset_key = Some(stamp.key.clone());
    record.wp_import_dataset_id = Some(stamp.id);
    Ok(record)
}

async fn write_record<S>(
    store: &S,
    index: usize,
    record: &MasterRecord,
    opts: &ImportOptions,
) -> Result<RowOutcome>
where
    S: RecordStore + ?Sized,
{
    let post_id = record.post_id.clone();
    let content = render_note(record, &render_import_body(record));

    if let Some(locator) = store.find_by_external_id(&post_id).await? {
        let current = store.read(&locator).await?;
        let changed_fields = changed_fields(&current, &content);
        if changed_fields.is_empty() {
            return Ok(RowOutcome::Identical {
                index,
                post_id,
                locator,
            });
        }
        if !opts.dry_run {
            store.write(&locator, &content).await?;
        }
        return Ok(RowOutcome::Modified {
            index,
            post_id,
            locator,
            changed_fields,
        });
    }

    let name = sanitize_for_filename(&record.post_titre_full);
    let locator = ensure_unique_location(store, &opts.out_dir, &name).await?;
    if !opts.dry_run {
        store.write(&locator, &content).await?;
    }
    Ok(RowOutcome::Created {
        index,
        post_id,
        locator,
    })
}

// =============================================================================
// CHANGED-FIELD SCAN
// =============================================================================

/// Names of the fields that differ between two note texts, plus
/// [`BODY_FIELD`] when the bodies differ.
///
/// Scalar keys come from a line scan of both frontmatters (list items are
/// not seen by the scan). Schema fields whose normalized values differ are
/// added after them, which catches list-only changes.
pub fn changed_fields(current: &str, next: &str) -> Vec<String> {
    let cur = split_document(current);
    let nxt = split_document(next);

    let cur_map = scan_key_values(cur.frontmatter.as_deref().unwrap_or(""));
    let nxt_map = scan_key_values(nxt.frontmatter.as_deref().unwrap_or(""));

    let mut changed: Vec<String> = Vec::new();
    let mut seen: BTreeSet<String> = BTreeSet::new();
    let mut push = |key: &str, changed: &mut Vec<String>| {
        if seen.insert(key.to_string()) {
            changed.push(key.to_string());
        }
    };

    let keys: BTreeSet<&str> = cur_map
        .iter()
        .chain(nxt_map.iter())
        .map(|(k, _)| k.as_str())
        .collect();
    for key in keys {
        if lookup(&cur_map, key) != lookup(&nxt_map, key) {
            push(key, &mut changed);
        }
    }

    let cur_record = cur.record().ok().flatten().unwrap_or_default();
    let nxt_record = nxt.record().ok().flatten().unwrap_or_default();
    for field in Field::ALL {
        if cur_record.get(field) != nxt_record.get(field) {
            push(field.as_str(), &mut changed);
        }
    }

    if normalize_eol(&cur.body) != normalize_eol(&nxt.body) {
        push(BODY_FIELD, &mut changed);
    }
    changed
}

fn scan_key_values(frontmatter: &str) -> Vec<(String, String)> {
    normalize_eol(frontmatter)
        .lines()
        .filter(|line| !line.trim_start().starts_with('-'))
        .filter_map(|line| KEY_VALUE_LINE.captures(line))
        .map(|caps| (caps[1].to_string(), caps[2].trim().to_string()))
        .filter(|(_, value)| !value.is_empty())
        .collect()
}

fn lookup<'a>(map: &'a [(String, String)], key: &str) -> &'a str {
    map.iter()
        .rev()
        .find(|(k, _)| k == key)
        .map(|(_, v)| v.as_str())
        .unwrap_or("")
}

// =============================================================================
// ERROR ARTIFACTS
// =============================================================================

async fn error_outcome<S>(
    store: &S,
    opts: &ImportOptions,
    row: &ExternalRow,
    kind: RowErrorKind,
    message: String,
) -> RowOutcome
where
    S: RecordStore + ?Sized,
{
    warn!(row_index = row.index, ?kind, error = %message, "Row rejected");

    let id_raw = row.get(COL_ID).to_string();
    let title_raw = row.get(COL_TITLE).to_string();
    let headers: Vec<&str> = row.headers();

    let artifact = if opts.dry_run {
        None
    } else {
        write_error_note(store, opts, row.index, &id_raw, &title_raw, &headers, &message).await
    };

    RowOutcome::Error {
        index: row.index,
        kind,
        message,
        id_raw,
        title_raw,
        artifact,
    }
}

async fn malformed_outcome<S>(store: &S, opts: &ImportOptions, issue: &RowIssue) -> RowOutcome
where
    S: RecordStore + ?Sized,
{
    let message = format!("{}: {}", RowErrorKind::MalformedRow.message(), issue);
    warn!(row_index = issue.index, error = %message, "Row rejected");

    let artifact = if opts.dry_run {
        None
    } else {
        write_error_note(store, opts, issue.index, "", "", &[], &message).await
    };

    RowOutcome::Error {
        index: issue.index,
        kind: RowErrorKind::MalformedRow,
        message,
        id_raw: String::new(),
        title_raw: String::new(),
        artifact,
    }
}

/// Text of an error note.
pub fn render_error_note(
    index: usize,
    id_raw: &str,
    title_raw: &str,
    headers: &[&str],
    message: &str,
) -> String {
    let title = title_raw.trim();
    let title = if title.is_empty() { "(inconnu)" } else { title };

    let mut lines = vec![
        "---".to_string(),
        format!("{SECTION_STATUS}:"),
        "maj_wp: false".to_string(),
        format!("{SECTION_POST}:"),
        format!("post_titre_full: {}", yaml_scalar(title)),
        format!("post_id: {}", quoted_or_empty(id_raw.trim())),
        format!("{SECTION_EXTERNAL}:"),
        format!("wp_error: {}", quoted_or_empty(message)),
        "WP_DEBUG:".to_string(),
        format!("wp_row_index: {index}"),
        format!("wp_titre_raw: {}", quoted_or_empty(title_raw)),
        format!("wp_id_raw: {}", quoted_or_empty(id_raw)),
    ];
    if headers.is_empty() {
        lines.push("wp_headers_debug: []".to_string());
    } else {
        lines.push("wp_headers_debug:".to_string());
        let mut sorted = headers.to_vec();
        sorted.sort_unstable();
        lines.extend(sorted.iter().map(|h| format!("  - {}", yaml_scalar(h))));
    }
    lines.push("---".to_string());

    format!("{}\n## Erreur d'import\n\n{}", lines.join("\n"), message)
}

fn quoted_or_empty(s: &str) -> String {
    if s.is_empty() {
        "\"\"".to_string()
    } else {
        yaml_scalar(s).into_owned()
    }
}

/// Write an error note; failures are logged and swallowed.
async fn write_error_note<S>(
    store: &S,
    opts: &ImportOptions,
    index: usize,
    id_raw: &str,
    title_raw: &str,
    headers: &[&str],
    message: &str,
) -> Option<String>
where
    S: RecordStore + ?Sized,
{
    let id = match id_raw.trim() {
        "" => "?",
        id => id,
    };
    let title = match title_raw.trim() {
        "" => "sans-titre",
        title => title,
    };
    let name = sanitize_for_filename(&format!("ERROR_{id}_{title}"));
    let dir = join_locator(&opts.out_dir, IMPORT_ERROR_DIR);
    let text = render_error_note(index, id_raw, title_raw, headers, message);

    let written = async {
        let locator = ensure_unique_location(store, &dir, &name).await?;
        store.write(&locator, &text).await?;
        Ok::<_, crate::Error>(locator)
    }
    .await;

    match written {
        Ok(locator) => Some(locator),
        Err(e) => {
            warn!(row_index = index, error = %e, "Could not write error note");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frontmatter::serialize;
    use crate::traits::MemoryStore;

    fn stamp() -> DatasetStamp {
        DatasetStamp::new("minutes", 20250601).unwrap()
    }

    fn row(index: usize, pairs: &[(&str, &str)]) -> ExternalRow {
        ExternalRow::from_pairs(index, pairs.iter().copied())
    }

    #[test]
    fn test_is_regression() {
        assert!(is_regression(20250101, Some(20250601)));
        assert!(!is_regression(20250601, Some(20250601)));
        assert!(!is_regression(20250701, Some(20250601)));
        assert!(!is_regression(20250101, None));
    }

    #[test]
    fn test_prepare_record_validation_order() {
        let s = stamp();
        assert_eq!(
            prepare_record(&row(0, &[(COL_ID, " "), (COL_TITLE, "")]), &s),
            Err(RowErrorKind::EmptyRow)
        );
        assert_eq!(
            prepare_record(&row(0, &[(COL_ID, "4a"), (COL_TITLE, "")]), &s),
            Err(RowErrorKind::InvalidId)
        );
        assert_eq!(
            prepare_record(&row(0, &[(COL_ID, "42"), (COL_TITLE, " ")]), &s),
            Err(RowErrorKind::MissingTitle)
        );
        assert_eq!(
            prepare_record(&row(0, &[(COL_TITLE, "T")]), &s),
            Err(RowErrorKind::MissingId)
        );
    }

    #[test]
    fn test_prepare_record_stamps_and_defaults_titre_1() {
        let record =
            prepare_record(&row(0, &[(COL_ID, "42"), (COL_TITLE, "Riverside Walk")]), &stamp())
                .unwrap();
        assert!(!record.maj_wp);
        assert_eq!(record.post_titre_1.as_deref(), Some("Riverside Walk"));
        assert_eq!(record.import_stamp(), Some(("minutes", 20250601)));
    }

    #[test]
    fn test_changed_fields_scan() {
        let a = MasterRecord {
            post_id: "42".into(),
            post_titre_full: "A".into(),
            tags: vec!["x".into()],
            ..Default::default()
        };
        let mut b = a.clone();
        b.tags = vec!["y".into()];
        b.post_titre_full = "B".into();

        let current = render_note(&a, "body");
        assert!(changed_fields(&current, &current).is_empty());

        let next = render_note(&b, "other body");
        assert_eq!(changed_fields(&current, &next), vec!["post_titre_full", "tags", "body"]);
    }

    #[test]
    fn test_render_error_note() {
        let text = render_error_note(3, "4a", "", &["wp_titre", "wp_id"], "invalid post_id");
        assert!(text.starts_with("---\nMAJ:\nmaj_wp: false\nPOST:\npost_titre_full: (inconnu)\n"));
        assert!(text.contains("wp_row_index: 3\n"));
        assert!(text.contains("wp_titre_raw: \"\"\n"));
        assert!(text.contains("wp_headers_debug:\n  - wp_id\n  - wp_titre\n---\n"));
        assert!(text.ends_with("## Erreur d'import\n\ninvalid post_id"));
    }

    #[tokio::test]
    async fn test_latest_dataset_id_scans_matching_key() {
        let stamped = |key: &str, id: i64| {
            serialize(&MasterRecord {
                wp_import_dataset_key: Some(key.into()),
                wp_import_dataset_id: Some(id),
                ..Default::default()
            })
        };
        let store = MemoryStore::with_records([
            ("a.md", stamped("minutes", 20250101)),
            ("b.md", stamped("minutes", 20250601)),
            ("c.md", stamped("journal", 20251231)),
            ("d.md", "no frontmatter".to_string()),
        ]);
        assert_eq!(
            latest_dataset_id(&store, "minutes").await.unwrap(),
            Some(20250601)
        );
        assert_eq!(latest_dataset_id(&store, "archives").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_reconcile_rejects_malformed_stamp() {
        let store = MemoryStore::new();
        let bad = DatasetStamp {
            key: "Bad Key".into(),
            id: 20250601,
        };
        let err = reconcile(&store, &bad, &[], &ImportOptions::default())
            .await
            .unwrap_err();
        assert!(err.is_batch_fatal());
    }

    #[tokio::test]
    async fn test_error_rows_write_artifacts_outside_dry_run() {
        let store = MemoryStore::new();
        let rows = [row(0, &[(COL_ID, "x1"), (COL_TITLE, "Bad: id")])];
        let result = reconcile(&store, &stamp(), &rows, &ImportOptions::default())
            .await
            .unwrap();
        assert_eq!(result.errors, 1);
        let RowOutcome::Error { kind, artifact, .. } = &result.rows[0] else {
            panic!("expected error outcome");
        };
        assert_eq!(*kind, RowErrorKind::InvalidId);
        assert_eq!(artifact.as_deref(), Some("NEW/ERRORS/ERROR_x1_Bad- id.md"));
        assert!(store.exists("NEW/ERRORS/ERROR_x1_Bad- id.md").await.unwrap());
    }

    #[tokio::test]
    async fn test_dry_run_writes_nothing() {
        let store = MemoryStore::new();
        let rows = [
            row(0, &[(COL_ID, "42"), (COL_TITLE, "Riverside Walk")]),
            row(1, &[(COL_ID, ""), (COL_TITLE, "")]),
        ];
        let opts = ImportOptions {
            dry_run: true,
            ..Default::default()
        };
        let result = reconcile(&store, &stamp(), &rows, &opts).await.unwrap();
        assert_eq!(result.created, 1);
        assert_eq!(result.errors, 1);
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn test_import_dataset_reports_malformed_lines_in_order() {
        let store = MemoryStore::new();
        let text = "wp_id;wp_titre\n1;One\n2;Two;extra\n3;Three\n";
        let result = import_dataset(&store, "minutes_20250601_PG.csv", text, &ImportOptions::default())
            .await
            .unwrap();
        assert_eq!(result.created, 2);
        assert_eq!(result.errors, 1);
        let indexes: Vec<usize> = result.rows.iter().map(RowOutcome::index).collect();
        assert_eq!(indexes, vec![0, 1, 2]);
        assert!(matches!(
            &result.rows[1],
            RowOutcome::Error {
                kind: RowErrorKind::MalformedRow,
                ..
            }
        ));
        assert!(store.exists("NEW/ERRORS/ERROR_?_sans-titre.md").await.unwrap());
    }

    #[tokio::test]
    async fn test_import_dataset_rejects_bad_name_before_reading() {
        let store = MemoryStore::new();
        let err = import_dataset(&store, "export.csv", "wp_id;wp_titre\n1;One\n", &ImportOptions::default())
            .await
            .unwrap_err();
        assert!(err.is_batch_fatal());
        assert!(store.is_empty().await);
    }
}
