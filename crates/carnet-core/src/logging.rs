//! Structured logging schema and field name constants for carnet.
//!
//! Every `tracing` call in the workspace uses these names so that a log
//! collector can filter a whole import run or a single record.
//!
//! ## Log Level Contract
//!
//! | Level | Usage |
//! |-------|-------|
//! | ERROR | Batch-fatal condition, nothing was processed |
//! | WARN  | Recoverable issue: a rejected row, an unreadable record skipped during a scan |
//! | INFO  | Operation completions (import summary, companion written) |
//! | DEBUG | Decision points: per-row outcome, change-set gating, lookups |
//! | TRACE | Per-field iteration |

// ─── Identity fields ───────────────────────────────────────────────────────

/// Subsystem originating the log event.
/// Values: "batch", "companion", "tags", "cli"
pub const SUBSYSTEM: &str = "subsystem";

/// Component within a subsystem.
/// Examples: "reconcile", "import_guard", "change_set", "fs_store"
pub const COMPONENT: &str = "component";

/// Logical operation name.
/// Examples: "reconcile", "create_companion", "sync_companion", "sync_tags"
pub const OPERATION: &str = "op";

// ─── Entity fields ─────────────────────────────────────────────────────────

/// Storage locator of the record being read or written.
pub const LOCATOR: &str = "locator";

/// External stable identifier (`post_id`).
pub const POST_ID: &str = "post_id";

/// Note kind targeted by a companion operation.
pub const NOTE_KIND: &str = "note_kind";

// ─── Batch fields ──────────────────────────────────────────────────────────

/// Dataset family key from the dataset file name.
pub const DATASET_KEY: &str = "dataset_key";

/// Dataset version id (YYYYMMDD) from the dataset file name.
pub const DATASET_ID: &str = "dataset_id";

/// 0-based index of the dataset row.
pub const ROW_INDEX: &str = "row_index";

/// Whether writes are suppressed.
pub const DRY_RUN: &str = "dry_run";

/// Highest dataset id already recorded for the same key.
pub const LATEST_ID: &str = "latest_id";

// ─── Measurement fields ────────────────────────────────────────────────────

/// Number of rows read from a dataset.
pub const ROW_COUNT: &str = "row_count";

/// Number of fields in a change set or changed-field list.
pub const FIELD_COUNT: &str = "field_count";

/// Wall-clock duration in milliseconds.
pub const DURATION_MS: &str = "duration_ms";

// ─── Outcome fields ────────────────────────────────────────────────────────

/// Row or operation outcome ("created", "identical", "modified", "error").
pub const OUTCOME: &str = "outcome";

/// Error message when an operation fails.
pub const ERROR_MSG: &str = "error";
