//! Command handlers. Each prints its report to stdout.

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{bail, Context};
use carnet_core::frontmatter::rewrite_note;
use carnet_core::tags::{parse_tags_table, table_slugs, TagDiffKind, TagsReport};
use carnet_core::{
    create_companion, import_dataset, is_regression, latest_dataset_id, parse_dataset_name,
    patch_tags, split_document, sync_companion, sync_tags_table, BatchResult, ImportOptions,
    NoteKind, PatchOutcome, RecordStore, RowOutcome, SyncOutcome, TagsMode, TagsOutcome,
};
use chrono::Local;
use tracing::{info, warn};

use crate::config::Config;
use crate::fs_store::FsStore;
use crate::presenter::TerminalPresenter;

// =============================================================================
// IMPORT
// =============================================================================

pub struct ImportArgs {
    pub dataset: PathBuf,
    pub out: Option<String>,
    pub dry_run: bool,
    pub allow_regression: bool,
    pub json: bool,
}

pub async fn import(store: &FsStore, config: &Config, args: ImportArgs) -> anyhow::Result<ExitCode> {
    let name = args
        .dataset
        .file_name()
        .and_then(|n| n.to_str())
        .with_context(|| format!("{} is not a file name", args.dataset.display()))?;
    let stamp = parse_dataset_name(name)?;

    let latest = latest_dataset_id(store, &stamp.key).await?;
    if is_regression(stamp.id, latest) {
        let latest = latest.unwrap_or_default();
        if !args.dry_run && !args.allow_regression {
            bail!(
                "{name} ({}) is older than the latest {} dataset already imported ({latest}); \
                 pass --allow-regression to import it anyway",
                stamp.id,
                stamp.key
            );
        }
        warn!(
            dataset = %name,
            dataset_id = stamp.id,
            latest_id = latest,
            "Importing an older dataset"
        );
    }

    let text = tokio::fs::read_to_string(&args.dataset)
        .await
        .with_context(|| format!("Failed to read {}", args.dataset.display()))?;
    let options = ImportOptions {
        out_dir: args.out.unwrap_or_else(|| config.import_dir.clone()),
        dry_run: args.dry_run,
    };
    let result = import_dataset(store, name, &text, &options).await?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        print!("{}", render_batch(&result));
    }
    Ok(ExitCode::SUCCESS)
}

fn render_batch(result: &BatchResult) -> String {
    let mut out = format!(
        "Dataset {} {}{}\n",
        result.dataset.key,
        result.dataset.id,
        if result.dry_run { " (dry run)" } else { "" }
    );
    for row in &result.rows {
        let line = match row {
            RowOutcome::Created { index, locator, .. } => format!("  #{index} created  {locator}"),
            RowOutcome::Identical { index, locator, .. } => {
                format!("  #{index} identical {locator}")
            }
            RowOutcome::Modified {
                index,
                locator,
                changed_fields,
                ..
            } => format!("  #{index} modified {locator} [{}]", changed_fields.join(", ")),
            RowOutcome::Error {
                index,
                kind,
                message,
                ..
            } => format!("  #{index} error    {kind:?}: {message}"),
        };
        out.push_str(&line);
        out.push('\n');
    }
    out.push_str(&format!(
        "{} rows: {} created, {} updated ({} identical, {} modified), {} errors\n",
        result.total(),
        result.created,
        result.updated,
        result.identical,
        result.modified,
        result.errors
    ));
    out
}

// =============================================================================
// COMPANIONS
// =============================================================================

pub async fn companion_create(store: &FsStore, journal: &Path, kind: NoteKind) -> anyhow::Result<ExitCode> {
    let locator = store.locator_for(journal)?;
    let created = create_companion(store, &locator, kind).await?;
    println!("Created {created}");
    Ok(ExitCode::SUCCESS)
}

pub async fn companion_sync(
    store: &FsStore,
    journal: &Path,
    kind: NoteKind,
    yes: bool,
) -> anyhow::Result<ExitCode> {
    let locator = store.locator_for(journal)?;
    let presenter = TerminalPresenter {
        accept_defaults: yes,
    };
    match sync_companion(store, &presenter, &locator, kind).await? {
        SyncOutcome::UpToDate { locator } => println!("{locator} is up to date"),
        SyncOutcome::Cancelled { .. } => {}
        SyncOutcome::NothingSelected { locator } => println!("Nothing selected for {locator}"),
        SyncOutcome::Applied {
            locator,
            applied,
            renamed_to,
        } => {
            let fields: Vec<&str> = applied.iter().map(|f| f.as_str()).collect();
            println!("Updated {locator}: {}", fields.join(", "));
            if let Some(target) = renamed_to {
                println!("Renamed to {target}");
            }
        }
    }
    Ok(ExitCode::SUCCESS)
}

// =============================================================================
// TAGS
// =============================================================================

pub async fn tags(
    store: &FsStore,
    config: &Config,
    csv: Option<&Path>,
    apply: bool,
    json: bool,
) -> anyhow::Result<ExitCode> {
    let csv = csv.map(|p| store.locator_for(p)).transpose()?;
    let mode = if apply {
        TagsMode::Defaults
    } else {
        TagsMode::Preview
    };
    let now = Local::now().naive_local();
    let report = sync_tags_table(store, &config.tags_table, csv.as_deref(), &mode, now).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print!("{}", render_tags_report(&report));
    }
    Ok(ExitCode::SUCCESS)
}

fn render_tags_report(report: &TagsReport) -> String {
    let mut out = format!(
        "{} against {} ({} local rows)\n",
        report.table, report.csv, report.rows_before
    );
    for warning in &report.csv_warnings {
        out.push_str(&format!("  warning: {warning}\n"));
    }
    for kind in TagDiffKind::ALL {
        let count = report.diff.count(kind);
        if count == 0 {
            continue;
        }
        out.push_str(&format!("{} ({count})\n", kind.label()));
        for item in report.diff.items.iter().filter(|it| it.kind == kind) {
            let mark = if item.selected { 'x' } else { ' ' };
            out.push_str(&format!("  [{mark}] {}  {}\n", item.key, item.note));
        }
    }
    let status = match &report.outcome {
        TagsOutcome::Preview => "Preview only; re-run with --apply to update the table.".to_string(),
        TagsOutcome::MetadataOnly { backup, wp_update } => {
            format!("Table already aligned; metadata refreshed (backup {backup}, wp_update: {wp_update})")
        }
        TagsOutcome::NothingSelected => "Nothing selected; table unchanged.".to_string(),
        TagsOutcome::Applied {
            backup,
            applied,
            rows_after,
            wp_update,
        } => format!(
            "Applied {} changes, {rows_after} rows (backup {backup}, wp_update: {wp_update})",
            applied.len()
        ),
    };
    out.push_str(&status);
    out.push('\n');
    out
}

// =============================================================================
// NOTES
// =============================================================================

/// Re-emit a note's frontmatter in canonical form.
///
/// With `check`, print the diff and fail instead of writing.
pub async fn fmt(store: &FsStore, note: &Path, check: bool) -> anyhow::Result<ExitCode> {
    let locator = store.locator_for(note)?;
    let text = store.read(&locator).await?;
    let doc = split_document(&text);
    let Some(record) = doc.record()? else {
        bail!("{locator} has no frontmatter");
    };

    let canonical = rewrite_note(&doc, &record);
    if canonical == text {
        println!("{locator} is canonical");
        return Ok(ExitCode::SUCCESS);
    }

    print!("{}", unified_diff(&locator, &text, &canonical));
    if check {
        return Ok(ExitCode::FAILURE);
    }
    store.write(&locator, &canonical).await?;
    info!(locator = %locator, "Note rewritten");
    Ok(ExitCode::SUCCESS)
}

fn unified_diff(locator: &str, before: &str, after: &str) -> String {
    let diff = similar::TextDiff::from_lines(before, after);
    let mut output = format!("--- {locator}\n+++ {locator} (canonical)\n");
    for change in diff.iter_all_changes() {
        let sign = match change.tag() {
            similar::ChangeTag::Delete => "-",
            similar::ChangeTag::Insert => "+",
            similar::ChangeTag::Equal => " ",
        };
        output.push_str(&format!("{}{}", sign, change));
        if change.missing_newline() {
            output.push('\n');
        }
    }
    output
}

/// Replace a note's tags, keeping every other frontmatter line.
pub async fn retag(
    store: &FsStore,
    config: &Config,
    note: &Path,
    tags: &[String],
) -> anyhow::Result<ExitCode> {
    let locator = store.locator_for(note)?;
    let slugs: Vec<String> = tags.iter().map(|t| t.trim().to_lowercase()).collect();

    match allowed_slugs(store, &config.tags_table).await {
        Some(allowed) => {
            let unknown: Vec<&str> = slugs
                .iter()
                .map(String::as_str)
                .filter(|slug| !allowed.contains(*slug))
                .collect();
            if !unknown.is_empty() {
                bail!(
                    "not in the tags table {}: {}",
                    config.tags_table,
                    unknown.join(", ")
                );
            }
        }
        None => warn!(
            table = %config.tags_table,
            "Tags table unavailable, tags not checked"
        ),
    }

    let text = store.read(&locator).await?;
    match patch_tags(&text, &slugs) {
        PatchOutcome::Unchanged => println!("{locator}: tags unchanged"),
        PatchOutcome::Changed(patched) => {
            store.write(&locator, &patched).await?;
            println!("{locator}: tags set to {}", slugs.join(", "));
        }
    }
    Ok(ExitCode::SUCCESS)
}

async fn allowed_slugs(store: &FsStore, table: &str) -> Option<std::collections::BTreeSet<String>> {
    let text = match store.read(table).await {
        Ok(text) => text,
        Err(e) => {
            warn!(table, error = %e, "Failed to read tags table");
            return None;
        }
    };
    parse_tags_table(&split_document(&text).body).map(|t| table_slugs(&t.rows))
}
