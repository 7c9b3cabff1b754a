//! Companion notes: create or re-synchronise the Archives/Restes note that
//! hangs off a Journal note.

use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument};

use crate::body::render_companion_body;
use crate::derive::{companion_record, link_text, unwrap_wiki, NoteKind};
use crate::diff::{apply_change_set, build_change_set, ChangeOutcome};
use crate::error::{Error, Result};
use crate::files::{file_name, file_stem, join_locator, parent_dir, sanitize_for_filename};
use crate::frontmatter::{render_note, rewrite_note, split_document};
use crate::models::{Field, MasterRecord};
use crate::traits::{read_record, ChangePresenter, RecordStore};

/// Result of [`sync_companion`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SyncOutcome {
    /// Nothing differs; the presenter was not consulted.
    UpToDate { locator: String },
    /// The presenter declined.
    Cancelled { locator: String },
    /// The presenter accepted an empty selection.
    NothingSelected { locator: String },
    /// Fields were written, and the note possibly renamed.
    Applied {
        locator: String,
        applied: Vec<Field>,
        renamed_to: Option<String>,
    },
}

/// Read a Journal note and check the fields every companion flow needs.
///
/// A blank `post_titre_full` falls back to the note's file stem.
async fn load_journal<S>(store: &S, journal_locator: &str) -> Result<MasterRecord>
where
    S: RecordStore + ?Sized,
{
    let text = store.read(journal_locator).await?;
    let mut record = split_document(&text)
        .record()?
        .ok_or_else(|| Error::InvalidInput(format!("{journal_locator} has no frontmatter")))?;

    if !record.has_category(NoteKind::Journal.category()) {
        return Err(Error::InvalidInput(format!(
            "{journal_locator} is not a {} note",
            NoteKind::Journal.category()
        )));
    }
    if record.post_titre_full.is_empty() {
        record.post_titre_full = file_stem(journal_locator).to_string();
    }
    if record.post_date.is_empty() {
        return Err(Error::InvalidInput(format!(
            "{journal_locator} has no post_date"
        )));
    }
    Ok(record)
}

fn require_companion(kind: NoteKind) -> Result<Field> {
    kind.journal_link_field()
        .ok_or_else(|| Error::InvalidInput(format!("{kind} notes have no Journal companion link")))
}

/// Text of the Journal's link to its `kind` companion, unwrapped.
fn linked_title(journal: &MasterRecord, link_field: Field) -> String {
    match link_field {
        Field::LienArchives => journal.lien_archives.as_deref(),
        Field::LienRestes => journal.lien_restes.as_deref(),
        _ => None,
    }
    .map(unwrap_wiki)
    .unwrap_or_default()
}

/// Locate a note by its title the way wiki links resolve: the root first,
/// then any directory.
pub async fn resolve_link<S>(store: &S, title: &str) -> Result<Option<String>>
where
    S: RecordStore + ?Sized,
{
    let title = title.trim();
    if title.is_empty() {
        return Ok(None);
    }
    let name = sanitize_for_filename(title);
    if store.exists(&name).await? {
        return Ok(Some(name));
    }
    Ok(store
        .list()
        .await?
        .into_iter()
        .find(|locator| file_name(locator) == name))
}

/// Create the `kind` companion of the Journal at `journal_locator`.
///
/// The companion is named after the Journal's link to it and must not exist
/// yet. Returns the new locator.
#[instrument(
    skip(store),
    fields(subsystem = "companion", component = "create", op = "create_companion", note_kind = %kind)
)]
pub async fn create_companion<S>(store: &S, journal_locator: &str, kind: NoteKind) -> Result<String>
where
    S: RecordStore + ?Sized,
{
    let link_field = require_companion(kind)?;
    let journal = load_journal(store, journal_locator).await?;

    let title = linked_title(&journal, link_field);
    if title.is_empty() {
        return Err(Error::InvalidInput(format!(
            "{journal_locator} has no {} link",
            link_field
        )));
    }
    if let Some(existing) = resolve_link(store, &title).await? {
        return Err(Error::AlreadyExists(existing));
    }

    let record = companion_record(&journal, kind, &title);
    if record.post_titre_1.is_none() {
        return Err(Error::InvalidInput(format!(
            "cannot derive titles from link text {title:?}"
        )));
    }

    let image = record.img_filename.first().cloned().unwrap_or_default();
    let body = render_companion_body(&image, &record.post_titre_full);
    let locator = sanitize_for_filename(&title);
    store.write(&locator, &render_note(&record, &body)).await?;

    info!(locator = %locator, "Companion note created");
    Ok(locator)
}

/// Find the existing `kind` companion: through the Journal's link, else the
/// first note of the companion category with the same `post_date`.
pub async fn find_companion<S>(
    store: &S,
    journal: &MasterRecord,
    kind: NoteKind,
) -> Result<Option<String>>
where
    S: RecordStore + ?Sized,
{
    let link_field = require_companion(kind)?;
    let title = linked_title(journal, link_field);
    if let Some(locator) = resolve_link(store, &title).await? {
        debug!(locator = %locator, "Companion resolved through link");
        return Ok(Some(locator));
    }

    for locator in store.list().await? {
        let Some(record) = read_record(store, &locator).await else {
            continue;
        };
        if record.has_category(kind.category()) && record.post_date == journal.post_date {
            debug!(locator = %locator, "Companion resolved through post_date");
            return Ok(Some(locator));
        }
    }
    Ok(None)
}

/// Bring the `kind` companion back in line with its Journal.
///
/// The candidate is derived from the Journal's current title. The change
/// set goes through `presenter`; the accepted keys are written back with the
/// stored body kept, and the note is renamed when the selection asks for a
/// different name.
#[instrument(
    skip(store, presenter),
    fields(subsystem = "companion", component = "sync", op = "sync_companion", note_kind = %kind)
)]
pub async fn sync_companion<S, P>(
    store: &S,
    presenter: &P,
    journal_locator: &str,
    kind: NoteKind,
) -> Result<SyncOutcome>
where
    S: RecordStore + ?Sized,
    P: ChangePresenter + ?Sized,
{
    let journal = load_journal(store, journal_locator).await?;
    let locator = find_companion(store, &journal, kind)
        .await?
        .ok_or_else(|| Error::NotFound(format!("{kind} note for {journal_locator}")))?;

    let text = store.read(&locator).await?;
    let doc = split_document(&text);
    let current = doc
        .record()?
        .ok_or_else(|| Error::InvalidInput(format!("{locator} has no frontmatter")))?;

    let candidate = companion_record(&journal, kind, &link_text(&journal.post_titre_full, kind));
    let change_set = match build_change_set(Some(&current), &candidate) {
        ChangeOutcome::UpToDate(_) => {
            info!(locator = %locator, "Companion already up to date");
            return Ok(SyncOutcome::UpToDate { locator });
        }
        ChangeOutcome::Changes(cs) => cs,
    };

    let Some(selection) = presenter.present(&change_set).await else {
        return Ok(SyncOutcome::Cancelled { locator });
    };
    let rename_to = selection
        .rename_to
        .as_deref()
        .map(str::trim)
        .filter(|name| !name.is_empty());
    if selection.keys.is_empty() && rename_to.is_none() {
        return Ok(SyncOutcome::NothingSelected { locator });
    }

    let updated = apply_change_set(&current, &change_set, &selection.keys);
    store.write(&locator, &rewrite_note(&doc, &updated)).await?;

    let mut renamed_to = None;
    if let Some(name) = rename_to {
        let new_name = sanitize_for_filename(name);
        if new_name != file_name(&locator) {
            let target = join_locator(parent_dir(&locator), &new_name);
            store.rename(&locator, &target).await?;
            renamed_to = Some(target);
        }
    }

    let applied: Vec<Field> = selection.keys.into_iter().collect();
    info!(
        locator = %locator,
        field_count = applied.len(),
        renamed = renamed_to.is_some(),
        "Companion synchronised"
    );
    Ok(SyncOutcome::Applied {
        locator,
        applied,
        renamed_to,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traits::MemoryStore;

    #[tokio::test]
    async fn test_resolve_link_prefers_root() {
        let store = MemoryStore::with_records([("sub/A ?.md", ""), ("A ?.md", "")]);
        assert_eq!(
            resolve_link(&store, "A ?").await.unwrap().as_deref(),
            Some("A ?.md")
        );
        let store = MemoryStore::with_records([("sub/A ?.md", "")]);
        assert_eq!(
            resolve_link(&store, "A ?").await.unwrap().as_deref(),
            Some("sub/A ?.md")
        );
        assert_eq!(resolve_link(&store, " ").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_journal_kind_has_no_companion() {
        let store = MemoryStore::new();
        let err = create_companion(&store, "j.md", NoteKind::Journal)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
    }
}
