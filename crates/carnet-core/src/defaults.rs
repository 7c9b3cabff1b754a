//! Centralized default constants for carnet.
//!
//! Textual constants here are part of the on-disk note format or of the
//! dataset naming convention; changing one changes what existing vaults
//! contain.

// =============================================================================
// FRONTMATTER
// =============================================================================

/// Frontmatter delimiter line.
pub const FRONTMATTER_DELIMITER: &str = "---";

/// Filler value carried by every decorative section marker key.
pub const SECTION_FILLER: &str =
    "______________________________________________________________________";

/// Section marker keys, in emission order.
pub const SECTION_IMAGES: &str = "IMAGES";
pub const SECTION_LINK: &str = "LIEN";
pub const SECTION_STATUS: &str = "MAJ";
pub const SECTION_POST: &str = "POST";
pub const SECTION_EXTERNAL: &str = "WP";
pub const SECTION_IMPORT: &str = "WP-IMPORT";

/// All decorative marker keys. These are never semantic on read.
pub const SECTION_MARKERS: &[&str] = &[
    SECTION_IMAGES,
    SECTION_LINK,
    SECTION_STATUS,
    SECTION_POST,
    SECTION_EXTERNAL,
    SECTION_IMPORT,
];

// =============================================================================
// NOTE KINDS
// =============================================================================

/// Suffix carried by image names exported from the publishing system.
pub const IMPORTED_IMAGE_SUFFIX: &str = "_WP";

/// Image suffix for Archives companions.
pub const ARCHIVES_IMAGE_SUFFIX: &str = "_BF";

/// Image suffix for Restes companions.
pub const RESTES_IMAGE_SUFFIX: &str = "_REI";

/// Token inserted by the link-text transform in place of sentence punctuation.
pub const LINK_QUESTION_TOKEN: &str = " ?";

// =============================================================================
// BATCH IMPORT
// =============================================================================

/// Fixed suffix of dataset file names: `<key>_<YYYYMMDD>_PG.csv`.
pub const DATASET_NAME_SUFFIX: &str = "_PG.csv";

/// Default dataset delimiter.
pub const DATASET_DELIMITER: char = ';';

/// Separator for multi-valued dataset cells (images).
pub const MULTI_VALUE_SEPARATOR: &str = "||";

/// Separator for hierarchical category cells.
pub const CATEGORY_SEPARATOR: char = '>';

/// Separator for tag cells.
pub const TAG_SEPARATOR: char = ',';

/// Default output directory for created records.
pub const IMPORT_OUT_DIR: &str = "NEW";

/// Sub-directory (under the output directory) for error-record artifacts.
pub const IMPORT_ERROR_DIR: &str = "ERRORS";

/// Body key reported by the changed-field scan when body text differs.
pub const BODY_FIELD: &str = "body";

// =============================================================================
// LOCATIONS
// =============================================================================

/// Note file extension.
pub const NOTE_EXTENSION: &str = ".md";

/// Maximum filename stem length before the extension.
pub const FILENAME_MAX_LEN: usize = 180;

/// Filename used when a title is blank.
pub const UNTITLED: &str = "Sans titre";

/// Maximum ` (n)` suffix tried when allocating a unique location.
pub const UNIQUE_LOCATION_MAX_ATTEMPTS: u32 = 9999;

// =============================================================================
// TAGS
// =============================================================================

/// Default location of the local tags table note.
pub const TAGS_TABLE_LOCATOR: &str = "wp_tags/ob_tags_table.md";

/// Directory holding exported tag datasets.
pub const TAGS_CSV_DIR: &str = "wp_tags/wp_tags_csv";

/// Sub-directory, next to the tags table, holding its backups.
pub const TAGS_BACKUP_DIR: &str = "backup";

/// Exact header of an exported tag dataset.
pub const TAGS_CSV_HEADERS: [&str; 4] = ["wp_tags_id", "wp_tags_name", "wp_tags_slug", "wp_tags_count"];

/// Column headers of the local tags table, in order.
pub const TAGS_TABLE_HEADERS: [&str; 5] = [
    "ob_tags_id",
    "ob_tags_name",
    "ob_tags_slug",
    "ob_tags_count",
    "ob_tags_notes",
];

/// Notes marker: tag created locally, not yet published.
pub const TAG_CREATED_LOCALLY: &str = "obc";

/// Notes marker: tag renamed locally, slug and name protected.
pub const TAG_MODIFIED_LOCALLY: &str = "obm";

/// Tags table frontmatter keys refreshed on every reconciliation.
/// The misspelling is what existing vaults carry.
pub const TAGS_META_LAST_UPDATE: &str = "tags_last_udpdate";
pub const TAGS_META_LAST_CSV: &str = "tags_last_csv";
pub const TAGS_META_REMOTE_PENDING: &str = "wp_update";
