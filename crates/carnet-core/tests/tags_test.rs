//! Integration tests for tags table reconciliation.

use std::collections::BTreeSet;

use carnet_core::frontmatter::{parse_raw, split_document};
use carnet_core::tags::parse_tags_table;
use carnet_core::{sync_tags_table, Error, MemoryStore, RecordStore, TagsMode, TagsOutcome};
use chrono::{NaiveDate, NaiveDateTime};

const TABLE: &str = "wp_tags/ob_tags_table.md";
const CSV: &str = "wp_tags/wp_tags_csv/2024-05-01_export_tags.csv";
const BACKUP: &str = "wp_tags/backup/ob_tags_table_20240501-1030.md";

const TABLE_NOTE: &str = "---\n\
    title: Tags\n\
    wp_update: false\n\
    ---\n\
    # Tags\n\
    \n\
    | ob_tags_id | ob_tags_name | ob_tags_slug | ob_tags_count | ob_tags_notes |\n\
    | --- | --- | --- | --- | --- |\n\
    | 12 | Rivers | rivers | 4 |  |\n\
    |  | Draft | draft | 0 | obc |\n\
    \n\
    Footer\n";

fn now() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2024, 5, 1)
        .and_then(|d| d.and_hms_opt(10, 30, 0))
        .expect("valid timestamp")
}

fn export(rows: &[&str]) -> String {
    let mut lines = vec!["wp_tags_id,wp_tags_name,wp_tags_slug,wp_tags_count"];
    lines.extend_from_slice(rows);
    lines.join("\n")
}

fn store_with(csv: &str) -> MemoryStore {
    MemoryStore::with_records([(TABLE, TABLE_NOTE.to_string()), (CSV, csv.to_string())])
}

#[tokio::test]
async fn test_preview_writes_nothing() {
    let store = store_with(&export(&["12,Rivers,rivers,5", "70,Fresh,fresh,1"]));
    let before = store.snapshot().await;

    let report = sync_tags_table(&store, TABLE, None, &TagsMode::Preview, now())
        .await
        .expect("Sync failed");

    assert_eq!(report.csv, CSV);
    assert_eq!(report.rows_before, 2);
    assert_eq!(report.outcome, TagsOutcome::Preview);
    assert!(report.diff.has_actionable);
    assert_eq!(
        report.diff.default_keys(),
        BTreeSet::from([
            "count_update:rivers|id=12".to_string(),
            "new_tag:fresh|id=70".to_string(),
        ])
    );
    assert_eq!(store.snapshot().await, before);
}

#[tokio::test]
async fn test_apply_defaults_rewrites_table_and_meta() {
    let store = store_with(&export(&["12,Rivers,rivers,5", "70,Fresh,fresh,1"]));

    let report = sync_tags_table(&store, TABLE, Some(CSV), &TagsMode::Defaults, now())
        .await
        .unwrap();

    let TagsOutcome::Applied {
        backup,
        applied,
        rows_after,
        wp_update,
    } = &report.outcome
    else {
        panic!("expected applied changes, got {:?}", report.outcome);
    };
    assert_eq!(backup, BACKUP);
    assert_eq!(applied.len(), 2);
    assert_eq!(*rows_after, 3);
    assert!(*wp_update, "draft still waits for remote creation");

    assert_eq!(store.read(BACKUP).await.unwrap(), TABLE_NOTE);

    let text = store.read(TABLE).await.unwrap();
    let doc = split_document(&text);
    let meta = parse_raw(doc.frontmatter.as_deref().unwrap()).unwrap();
    assert_eq!(meta["title"], "Tags");
    assert_eq!(meta["wp_update"], true);
    assert_eq!(meta["tags_last_csv"], "[[2024-05-01_export_tags.csv]]");
    assert_eq!(meta["tags_last_udpdate"], "2024-05-01 10:30");

    assert!(doc.body.starts_with("# Tags\n\n| ob_tags_id |"));
    assert!(doc.body.ends_with("|  | Draft | draft | 0 | obc |\n| 70 | Fresh | fresh | 1 |  |\n| 12 | Rivers | rivers | 5 |  |\n\nFooter\n"));

    let table = parse_tags_table(&doc.body).unwrap();
    let slugs: Vec<&str> = table.rows.iter().map(|r| r.slug.as_str()).collect();
    assert_eq!(slugs, vec!["draft", "fresh", "rivers"]);
}

#[tokio::test]
async fn test_explicit_empty_selection_writes_nothing() {
    let store = store_with(&export(&["12,Rivers,rivers,5"]));
    let before = store.snapshot().await;

    let report = sync_tags_table(
        &store,
        TABLE,
        Some(CSV),
        &TagsMode::Keys(BTreeSet::new()),
        now(),
    )
    .await
    .unwrap();

    assert_eq!(report.outcome, TagsOutcome::NothingSelected);
    assert_eq!(store.snapshot().await, before);
}

#[tokio::test]
async fn test_nothing_actionable_refreshes_meta_only() {
    let store = store_with(&export(&["12,Rivers,rivers,4"]));

    let report = sync_tags_table(&store, TABLE, Some(CSV), &TagsMode::Defaults, now())
        .await
        .unwrap();

    // Only the pending local draft is reported.
    assert!(!report.diff.has_actionable);
    assert_eq!(report.diff.items.len(), 1);
    assert_eq!(
        report.outcome,
        TagsOutcome::MetadataOnly {
            backup: BACKUP.to_string(),
            wp_update: true,
        }
    );

    let text = store.read(TABLE).await.unwrap();
    assert!(text.contains("wp_update: true\n"));
    assert!(text.contains("tags_last_csv: \"[[2024-05-01_export_tags.csv]]\"\n"));
    assert_eq!(
        split_document(&text).body,
        split_document(TABLE_NOTE).body,
        "table untouched"
    );
}

#[tokio::test]
async fn test_latest_export_is_picked() {
    let store = store_with(&export(&["12,Rivers,rivers,4"]));
    store
        .write(
            "wp_tags/wp_tags_csv/2024-04-01_export_tags.csv",
            &export(&["12,Old,rivers,1"]),
        )
        .await
        .unwrap();

    let report = sync_tags_table(&store, TABLE, None, &TagsMode::Preview, now())
        .await
        .unwrap();
    assert_eq!(report.csv, CSV);
}

#[tokio::test]
async fn test_invalid_header_is_dataset_error() {
    let store = store_with("id,name,slug,count\n1,a,a,1\n");
    let err = sync_tags_table(&store, TABLE, Some(CSV), &TagsMode::Defaults, now())
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Dataset(_)));
}

#[tokio::test]
async fn test_missing_table_and_export() {
    let store = MemoryStore::with_records([(CSV, export(&[]))]);
    let err = sync_tags_table(&store, TABLE, Some(CSV), &TagsMode::Preview, now())
        .await
        .unwrap_err();
    assert!(matches!(err, Error::NotFound(_)));

    let store = MemoryStore::with_records([(TABLE, TABLE_NOTE)]);
    let err = sync_tags_table(&store, TABLE, None, &TagsMode::Preview, now())
        .await
        .unwrap_err();
    assert!(matches!(err, Error::NotFound(_)));
}
