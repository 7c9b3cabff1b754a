//! # carnet-core
//!
//! Schema, serializer and reconciliation engine for carnet notes.
//!
//! Every note carries a YAML frontmatter master record with a fixed key
//! order. This crate normalizes partial records, emits them bit-exactly,
//! derives titles, links and image names per note kind, diffs a stored
//! record against a candidate, and reconciles tabular datasets from the
//! publishing system with the notes already stored.
//!
//! Storage and interactive review are collaborators ([`RecordStore`],
//! [`ChangePresenter`]); the crate never touches a filesystem itself.

pub mod batch;
pub mod body;
pub mod companion;
pub mod dataset;
pub mod defaults;
pub mod derive;
pub mod diff;
pub mod error;
pub mod files;
pub mod frontmatter;
pub mod logging;
pub mod mapping;
pub mod models;
pub mod normalize;
pub mod tags;
pub mod traits;

// Re-export commonly used types at crate root
pub use batch::{
    import_dataset, is_regression, latest_dataset_id, reconcile, BatchResult, ImportOptions,
    RowErrorKind, RowOutcome,
};
pub use companion::{create_companion, sync_companion, SyncOutcome};
pub use dataset::{parse_dataset, parse_dataset_name, Dataset, DatasetStamp, ExternalRow};
pub use derive::NoteKind;
pub use diff::{apply_change_set, build_change_set, ChangeOutcome};
pub use error::{Error, Result};
pub use frontmatter::{patch_tags, serialize, split_document, Document, PatchOutcome};
pub use models::*;
pub use normalize::{create_empty, normalize};
pub use tags::{sync_tags_table, TagsMode, TagsOutcome, TagsReport};
pub use traits::*;
