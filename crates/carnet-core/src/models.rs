//! Core data models for carnet.
//!
//! [`MasterRecord`] is the typed form of one note's frontmatter. Every field
//! is always present; absence in the source means the field's empty value.
//! [`Field`] enumerates the closed key set in serialization order, and
//! [`ChangeSet`] carries the diff engine's classified discrepancies.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

// =============================================================================
// FIELD SCHEMA
// =============================================================================

/// Semantic type of a master field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldKind {
    /// Required string, `""` when unset.
    Text,
    /// Nullable string, `None` when unset or blank.
    Nullable,
    /// Ordered, duplicate-free list of strings.
    List,
    /// List of paragraphs; also accepts one block of text split on blank lines.
    Paragraphs,
    /// Boolean flag, `false` when unset.
    Flag,
    /// Nullable integer.
    Integer,
}

impl FieldKind {
    /// True for kinds rendered as YAML sequences or blocks.
    pub fn is_list(self) -> bool {
        matches!(self, Self::List | Self::Paragraphs)
    }
}

/// The closed set of master field keys, declared in serialization order.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum Field {
    Cover,
    ImgAlt,
    ImgDescr,
    ImgFilename,
    ImgId,
    ImgLegende,
    ImgTitre,
    ImgUrl,
    LienArchives,
    LienJournal,
    LienProjet,
    LienRestes,
    MajWp,
    PostCat,
    PostDate,
    PostDescr,
    PostExtrait,
    PostId,
    PostMod,
    PostPerma,
    #[serde(rename = "post_titre_1")]
    PostTitre1,
    #[serde(rename = "post_titre_2")]
    PostTitre2,
    PostTitreFull,
    PostVidUrl,
    Tags,
    WpCarnetLink,
    WpCarnetOn,
    WpStatus,
    WpImportDatasetKey,
    WpImportDatasetId,
}

impl Field {
    /// Every field, in serialization order.
    pub const ALL: [Field; 30] = [
        Field::Cover,
        Field::ImgAlt,
        Field::ImgDescr,
        Field::ImgFilename,
        Field::ImgId,
        Field::ImgLegende,
        Field::ImgTitre,
        Field::ImgUrl,
        Field::LienArchives,
        Field::LienJournal,
        Field::LienProjet,
        Field::LienRestes,
        Field::MajWp,
        Field::PostCat,
        Field::PostDate,
        Field::PostDescr,
        Field::PostExtrait,
        Field::PostId,
        Field::PostMod,
        Field::PostPerma,
        Field::PostTitre1,
        Field::PostTitre2,
        Field::PostTitreFull,
        Field::PostVidUrl,
        Field::Tags,
        Field::WpCarnetLink,
        Field::WpCarnetOn,
        Field::WpStatus,
        Field::WpImportDatasetKey,
        Field::WpImportDatasetId,
    ];

    /// YAML key of the field.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Cover => "cover",
            Self::ImgAlt => "img_alt",
            Self::ImgDescr => "img_descr",
            Self::ImgFilename => "img_filename",
            Self::ImgId => "img_id",
            Self::ImgLegende => "img_legende",
            Self::ImgTitre => "img_titre",
            Self::ImgUrl => "img_url",
            Self::LienArchives => "lien_archives",
            Self::LienJournal => "lien_journal",
            Self::LienProjet => "lien_projet",
            Self::LienRestes => "lien_restes",
            Self::MajWp => "maj_wp",
            Self::PostCat => "post_cat",
            Self::PostDate => "post_date",
            Self::PostDescr => "post_descr",
            Self::PostExtrait => "post_extrait",
            Self::PostId => "post_id",
            Self::PostMod => "post_mod",
            Self::PostPerma => "post_perma",
            Self::PostTitre1 => "post_titre_1",
            Self::PostTitre2 => "post_titre_2",
            Self::PostTitreFull => "post_titre_full",
            Self::PostVidUrl => "post_vid_url",
            Self::Tags => "tags",
            Self::WpCarnetLink => "wp_carnet_link",
            Self::WpCarnetOn => "wp_carnet_on",
            Self::WpStatus => "wp_status",
            Self::WpImportDatasetKey => "wp_import_dataset_key",
            Self::WpImportDatasetId => "wp_import_dataset_id",
        }
    }

    /// Semantic type of the field.
    pub fn kind(self) -> FieldKind {
        match self {
            Self::Cover
            | Self::LienArchives
            | Self::LienJournal
            | Self::LienRestes
            | Self::PostDescr
            | Self::PostExtrait
            | Self::PostPerma
            | Self::PostTitre1
            | Self::PostTitre2
            | Self::PostVidUrl
            | Self::WpCarnetLink
            | Self::WpStatus
            | Self::WpImportDatasetKey => FieldKind::Nullable,
            Self::PostDate | Self::PostMod | Self::PostId | Self::PostTitreFull => FieldKind::Text,
            Self::ImgAlt
            | Self::ImgDescr
            | Self::ImgFilename
            | Self::ImgId
            | Self::ImgTitre
            | Self::ImgUrl
            | Self::LienProjet
            | Self::PostCat
            | Self::Tags => FieldKind::List,
            Self::ImgLegende => FieldKind::Paragraphs,
            Self::MajWp | Self::WpCarnetOn => FieldKind::Flag,
            Self::WpImportDatasetId => FieldKind::Integer,
        }
    }

    /// Human label shown next to a change item.
    pub fn label(self) -> &'static str {
        match self {
            Self::Cover => "Cover",
            Self::ImgAlt => "Image alt text",
            Self::ImgDescr => "Image description",
            Self::ImgFilename => "Image file",
            Self::ImgId => "Image id",
            Self::ImgLegende => "Image caption",
            Self::ImgTitre => "Image title",
            Self::ImgUrl => "Image URL",
            Self::LienArchives => "Link to Archives",
            Self::LienJournal => "Link to Journal",
            Self::LienProjet => "Project links",
            Self::LienRestes => "Link to Restes",
            Self::MajWp => "Needs push",
            Self::PostCat => "Categories",
            Self::PostDate => "Post date",
            Self::PostDescr => "Description",
            Self::PostExtrait => "Excerpt",
            Self::PostId => "External id",
            Self::PostMod => "Modified date",
            Self::PostPerma => "Permalink",
            Self::PostTitre1 => "Title 1",
            Self::PostTitre2 => "Title 2",
            Self::PostTitreFull => "Full title",
            Self::PostVidUrl => "Video URL",
            Self::Tags => "Tags",
            Self::WpCarnetLink => "Carnet link",
            Self::WpCarnetOn => "Carnet enabled",
            Self::WpStatus => "External status",
            Self::WpImportDatasetKey => "Import dataset",
            Self::WpImportDatasetId => "Import dataset id",
        }
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Field {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let key = s.trim();
        Field::ALL
            .iter()
            .copied()
            .find(|f| f.as_str() == key)
            .ok_or_else(|| format!("Unknown master field: {}", s))
    }
}

// =============================================================================
// FIELD VALUES
// =============================================================================

/// A typed value for one field, shaped by its [`FieldKind`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Flag(bool),
    Integer(Option<i64>),
    Text(String),
    Nullable(Option<String>),
    List(Vec<String>),
}

impl FieldValue {
    /// Loosely typed form, suitable for re-coercion by the normalizer.
    pub fn to_json(&self) -> JsonValue {
        match self {
            Self::Flag(b) => JsonValue::Bool(*b),
            Self::Integer(Some(n)) => JsonValue::from(*n),
            Self::Integer(None) | Self::Nullable(None) => JsonValue::Null,
            Self::Text(s) | Self::Nullable(Some(s)) => JsonValue::String(s.clone()),
            Self::List(items) => {
                JsonValue::Array(items.iter().cloned().map(JsonValue::String).collect())
            }
        }
    }
}

// =============================================================================
// MASTER RECORD
// =============================================================================

/// Canonical typed representation of one note's structured fields.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MasterRecord {
    pub cover: Option<String>,

    pub img_alt: Vec<String>,
    pub img_descr: Vec<String>,
    pub img_filename: Vec<String>,
    pub img_id: Vec<String>,
    pub img_legende: Vec<String>,
    pub img_titre: Vec<String>,
    pub img_url: Vec<String>,

    pub lien_archives: Option<String>,
    pub lien_journal: Option<String>,
    pub lien_projet: Vec<String>,
    pub lien_restes: Option<String>,

    pub maj_wp: bool,

    pub post_cat: Vec<String>,
    pub post_date: String,
    pub post_descr: Option<String>,
    pub post_extrait: Option<String>,
    pub post_id: String,
    pub post_mod: String,
    pub post_perma: Option<String>,
    pub post_titre_1: Option<String>,
    pub post_titre_2: Option<String>,
    pub post_titre_full: String,
    pub post_vid_url: Option<String>,
    pub tags: Vec<String>,

    pub wp_carnet_link: Option<String>,
    pub wp_carnet_on: bool,
    pub wp_status: Option<String>,

    pub wp_import_dataset_key: Option<String>,
    pub wp_import_dataset_id: Option<i64>,
}

impl MasterRecord {
    /// Read one field as a typed value.
    pub fn get(&self, field: Field) -> FieldValue {
        match field {
            Field::Cover => FieldValue::Nullable(self.cover.clone()),
            Field::ImgAlt => FieldValue::List(self.img_alt.clone()),
            Field::ImgDescr => FieldValue::List(self.img_descr.clone()),
            Field::ImgFilename => FieldValue::List(self.img_filename.clone()),
            Field::ImgId => FieldValue::List(self.img_id.clone()),
            Field::ImgLegende => FieldValue::List(self.img_legende.clone()),
            Field::ImgTitre => FieldValue::List(self.img_titre.clone()),
            Field::ImgUrl => FieldValue::List(self.img_url.clone()),
            Field::LienArchives => FieldValue::Nullable(self.lien_archives.clone()),
            Field::LienJournal => FieldValue::Nullable(self.lien_journal.clone()),
            Field::LienProjet => FieldValue::List(self.lien_projet.clone()),
            Field::LienRestes => FieldValue::Nullable(self.lien_restes.clone()),
            Field::MajWp => FieldValue::Flag(self.maj_wp),
            Field::PostCat => FieldValue::List(self.post_cat.clone()),
            Field::PostDate => FieldValue::Text(self.post_date.clone()),
            Field::PostDescr => FieldValue::Nullable(self.post_descr.clone()),
            Field::PostExtrait => FieldValue::Nullable(self.post_extrait.clone()),
            Field::PostId => FieldValue::Text(self.post_id.clone()),
            Field::PostMod => FieldValue::Text(self.post_mod.clone()),
            Field::PostPerma => FieldValue::Nullable(self.post_perma.clone()),
            Field::PostTitre1 => FieldValue::Nullable(self.post_titre_1.clone()),
            Field::PostTitre2 => FieldValue::Nullable(self.post_titre_2.clone()),
            Field::PostTitreFull => FieldValue::Text(self.post_titre_full.clone()),
            Field::PostVidUrl => FieldValue::Nullable(self.post_vid_url.clone()),
            Field::Tags => FieldValue::List(self.tags.clone()),
            Field::WpCarnetLink => FieldValue::Nullable(self.wp_carnet_link.clone()),
            Field::WpCarnetOn => FieldValue::Flag(self.wp_carnet_on),
            Field::WpStatus => FieldValue::Nullable(self.wp_status.clone()),
            Field::WpImportDatasetKey => FieldValue::Nullable(self.wp_import_dataset_key.clone()),
            Field::WpImportDatasetId => FieldValue::Integer(self.wp_import_dataset_id),
        }
    }

    /// Overwrite one field.
    ///
    /// The value is re-coerced to the field's kind first, so a `Text` handed
    /// to a list field becomes a one-element list and a blank `Text` handed to
    /// a nullable field becomes `None`.
    pub fn set(&mut self, field: Field, value: FieldValue) {
        self.set_from_json(field, &value.to_json());
    }

    /// Coerce a loosely typed value to the field's kind and store it.
    pub fn set_from_json(&mut self, field: Field, raw: &JsonValue) {
        match (field, crate::normalize::coerce_field(field, raw)) {
            (Field::Cover, FieldValue::Nullable(v)) => self.cover = v,
            (Field::ImgAlt, FieldValue::List(v)) => self.img_alt = v,
            (Field::ImgDescr, FieldValue::List(v)) => self.img_descr = v,
            (Field::ImgFilename, FieldValue::List(v)) => self.img_filename = v,
            (Field::ImgId, FieldValue::List(v)) => self.img_id = v,
            (Field::ImgLegende, FieldValue::List(v)) => self.img_legende = v,
            (Field::ImgTitre, FieldValue::List(v)) => self.img_titre = v,
            (Field::ImgUrl, FieldValue::List(v)) => self.img_url = v,
            (Field::LienArchives, FieldValue::Nullable(v)) => self.lien_archives = v,
            (Field::LienJournal, FieldValue::Nullable(v)) => self.lien_journal = v,
            (Field::LienProjet, FieldValue::List(v)) => self.lien_projet = v,
            (Field::LienRestes, FieldValue::Nullable(v)) => self.lien_restes = v,
            (Field::MajWp, FieldValue::Flag(v)) => self.maj_wp = v,
            (Field::PostCat, FieldValue::List(v)) => self.post_cat = v,
            (Field::PostDate, FieldValue::Text(v)) => self.post_date = v,
            (Field::PostDescr, FieldValue::Nullable(v)) => self.post_descr = v,
            (Field::PostExtrait, FieldValue::Nullable(v)) => self.post_extrait = v,
            (Field::PostId, FieldValue::Text(v)) => self.post_id = v,
            (Field::PostMod, FieldValue::Text(v)) => self.post_mod = v,
            (Field::PostPerma, FieldValue::Nullable(v)) => self.post_perma = v,
            (Field::PostTitre1, FieldValue::Nullable(v)) => self.post_titre_1 = v,
            (Field::PostTitre2, FieldValue::Nullable(v)) => self.post_titre_2 = v,
            (Field::PostTitreFull, FieldValue::Text(v)) => self.post_titre_full = v,
            (Field::PostVidUrl, FieldValue::Nullable(v)) => self.post_vid_url = v,
            (Field::Tags, FieldValue::List(v)) => self.tags = v,
            (Field::WpCarnetLink, FieldValue::Nullable(v)) => self.wp_carnet_link = v,
            (Field::WpCarnetOn, FieldValue::Flag(v)) => self.wp_carnet_on = v,
            (Field::WpStatus, FieldValue::Nullable(v)) => self.wp_status = v,
            (Field::WpImportDatasetKey, FieldValue::Nullable(v)) => self.wp_import_dataset_key = v,
            (Field::WpImportDatasetId, FieldValue::Integer(v)) => self.wp_import_dataset_id = v,
            // coerce_field always returns the variant matching field.kind()
            (field, value) => {
                tracing::warn!(%field, ?value, "Coerced value does not match field kind");
            }
        }
    }

    /// True when the record carries `category` in `post_cat` (case-insensitive).
    pub fn has_category(&self, category: &str) -> bool {
        self.post_cat
            .iter()
            .any(|c| c.trim().eq_ignore_ascii_case(category))
    }

    /// The provenance stamp, when both halves are present.
    pub fn import_stamp(&self) -> Option<(&str, i64)> {
        match (&self.wp_import_dataset_key, self.wp_import_dataset_id) {
            (Some(key), Some(id)) if !key.is_empty() => Some((key.as_str(), id)),
            _ => None,
        }
    }
}

// =============================================================================
// CHANGE SETS
// =============================================================================

/// A before/after value in a change item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ChangeValue {
    Text(String),
    List(Vec<String>),
}

impl ChangeValue {
    /// Project a typed field value onto the string-or-list shape.
    pub fn from_field_value(value: &FieldValue) -> Self {
        match value {
            FieldValue::Text(s) => Self::Text(s.clone()),
            FieldValue::Nullable(v) => Self::Text(v.clone().unwrap_or_default()),
            FieldValue::List(items) => Self::List(items.clone()),
            FieldValue::Flag(b) => Self::Text(b.to_string()),
            FieldValue::Integer(n) => Self::Text(n.map(|n| n.to_string()).unwrap_or_default()),
        }
    }

    /// Loosely typed form for re-coercion.
    pub fn to_json(&self) -> JsonValue {
        match self {
            Self::Text(s) => JsonValue::String(s.clone()),
            Self::List(items) => {
                JsonValue::Array(items.iter().cloned().map(JsonValue::String).collect())
            }
        }
    }
}

impl fmt::Display for ChangeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text(s) if s.is_empty() => write!(f, "(empty)"),
            Self::Text(s) => write!(f, "\"{}\"", s),
            Self::List(items) if items.is_empty() => write!(f, "[]"),
            Self::List(items) => {
                let quoted: Vec<String> = items.iter().map(|s| format!("\"{}\"", s)).collect();
                write!(f, "{}", quoted.join(", "))
            }
        }
    }
}

/// Change item group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeGroup {
    /// Always compared (date, tags).
    Common,
    /// Compared only when the record's identity (full title) moved.
    Derived,
}

/// One field-level discrepancy between a stored record and a candidate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeItem {
    pub key: Field,
    pub label: String,
    pub before: ChangeValue,
    pub after: ChangeValue,
    pub group: ChangeGroup,
    /// Pre-selected when before and after differ.
    pub selected: bool,
}

/// Ordered change items plus an optional rename target.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeSet {
    pub items: Vec<ChangeItem>,
    pub suggested_rename: Option<String>,
}

impl ChangeSet {
    /// Items of one group, in order.
    pub fn group(&self, group: ChangeGroup) -> impl Iterator<Item = &ChangeItem> {
        self.items.iter().filter(move |i| i.group == group)
    }

    /// Keys selected by default.
    pub fn default_selection(&self) -> BTreeSet<Field> {
        self.items
            .iter()
            .filter(|i| i.selected)
            .map(|i| i.key)
            .collect()
    }

    /// True when at least one item differs.
    pub fn has_differences(&self) -> bool {
        self.items.iter().any(|i| i.selected)
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// The user's answer to a presented change set.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Selection {
    pub keys: BTreeSet<Field>,
    pub rename_to: Option<String>,
}

impl Selection {
    /// Accept every pre-selected item and the suggested rename.
    pub fn defaults(change_set: &ChangeSet) -> Self {
        Self {
            keys: change_set.default_selection(),
            rename_to: change_set.suggested_rename.clone(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty() && self.rename_to.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_field_order_matches_all() {
        let mut sorted = Field::ALL.to_vec();
        sorted.sort();
        assert_eq!(sorted, Field::ALL.to_vec());
    }

    #[test]
    fn test_field_from_str_roundtrip() {
        for field in Field::ALL {
            assert_eq!(field.as_str().parse::<Field>().unwrap(), field);
        }
        assert!("IMAGES".parse::<Field>().is_err());
    }

    #[test]
    fn test_field_serde_names_match_keys() {
        for field in Field::ALL {
            let json = serde_json::to_value(field).unwrap();
            assert_eq!(json, JsonValue::String(field.as_str().to_string()));
        }
    }

    #[test]
    fn test_field_kinds() {
        assert_eq!(Field::PostTitreFull.kind(), FieldKind::Text);
        assert_eq!(Field::LienJournal.kind(), FieldKind::Nullable);
        assert_eq!(Field::Tags.kind(), FieldKind::List);
        assert_eq!(Field::ImgLegende.kind(), FieldKind::Paragraphs);
        assert_eq!(Field::MajWp.kind(), FieldKind::Flag);
        assert_eq!(Field::WpImportDatasetId.kind(), FieldKind::Integer);
    }

    #[test]
    fn test_set_coerces_text_into_list() {
        let mut record = MasterRecord::default();
        record.set(Field::ImgFilename, FieldValue::Text(" a_BF.webp ".into()));
        assert_eq!(record.img_filename, vec!["a_BF.webp".to_string()]);
    }

    #[test]
    fn test_set_blank_text_into_nullable_is_none() {
        let mut record = MasterRecord {
            lien_restes: Some("[[X]]".into()),
            ..Default::default()
        };
        record.set(Field::LienRestes, FieldValue::Text("   ".into()));
        assert_eq!(record.lien_restes, None);
    }

    #[test]
    fn test_get_set_roundtrip_every_field() {
        let mut source = MasterRecord {
            cover: Some("c.webp".into()),
            img_alt: vec!["alt".into()],
            maj_wp: true,
            post_date: "2024-01-26T00:00:00".into(),
            post_titre_full: "Riverside Walk".into(),
            tags: vec!["a".into(), "b".into()],
            wp_import_dataset_key: Some("minutes-articles".into()),
            wp_import_dataset_id: Some(20250601),
            ..Default::default()
        };
        source.post_titre_1 = Some("Riverside".into());

        let mut copy = MasterRecord::default();
        for field in Field::ALL {
            copy.set(field, source.get(field));
        }
        assert_eq!(copy, source);
    }

    #[test]
    fn test_import_stamp_requires_both_halves() {
        let mut record = MasterRecord {
            wp_import_dataset_key: Some("k".into()),
            ..Default::default()
        };
        assert_eq!(record.import_stamp(), None);
        record.wp_import_dataset_id = Some(20250101);
        assert_eq!(record.import_stamp(), Some(("k", 20250101)));
    }

    #[test]
    fn test_change_value_display() {
        assert_eq!(ChangeValue::Text(String::new()).to_string(), "(empty)");
        assert_eq!(
            ChangeValue::List(vec!["a".into(), "b".into()]).to_string(),
            "\"a\", \"b\""
        );
    }

    #[test]
    fn test_selection_defaults() {
        let cs = ChangeSet {
            items: vec![
                ChangeItem {
                    key: Field::PostDate,
                    label: "Post date".into(),
                    before: ChangeValue::Text("a".into()),
                    after: ChangeValue::Text("b".into()),
                    group: ChangeGroup::Common,
                    selected: true,
                },
                ChangeItem {
                    key: Field::Tags,
                    label: "Tags".into(),
                    before: ChangeValue::List(vec![]),
                    after: ChangeValue::List(vec![]),
                    group: ChangeGroup::Common,
                    selected: false,
                },
            ],
            suggested_rename: None,
        };
        let sel = Selection::defaults(&cs);
        assert_eq!(sel.keys.into_iter().collect::<Vec<_>>(), vec![Field::PostDate]);
        assert!(sel.rename_to.is_none());
    }
}
