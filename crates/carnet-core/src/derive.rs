//! Derivation functions between note kinds.
//!
//! Everything here is pure: given one record (or a title string), compute
//! the field values another kind of note should carry.

use std::fmt;
use std::str::FromStr;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::defaults::{
    ARCHIVES_IMAGE_SUFFIX, IMPORTED_IMAGE_SUFFIX, LINK_QUESTION_TOKEN, RESTES_IMAGE_SUFFIX,
};
use crate::models::{Field, FieldValue, MasterRecord};
use crate::normalize::create_empty;

static LINK_PUNCTUATION: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[.,!]").expect("valid punctuation regex"));
static JOURNAL_WORD: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\bJournal\b").expect("valid keyword regex"));
static AFTER_QUESTION: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\?\s*([a-zà-ÿ])").expect("valid capitalisation regex"));
static MULTI_SPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s{2,}").expect("valid space regex"));
static WIKI_LINK: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\[\[(.*)\]\]$").expect("valid wiki link regex"));

// =============================================================================
// NOTE KINDS
// =============================================================================

/// The four linked note kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NoteKind {
    Journal,
    Archives,
    Restes,
    Minutes,
}

impl NoteKind {
    /// Keyword embedded in titles of this kind.
    pub fn keyword(self) -> &'static str {
        match self {
            Self::Journal => "Journal",
            Self::Archives => "Archives",
            Self::Restes => "Restes",
            Self::Minutes => "Minutes",
        }
    }

    /// Category slug identifying notes of this kind in `post_cat`.
    pub fn category(self) -> &'static str {
        match self {
            Self::Journal => "journal-photo",
            Self::Archives => "archives-du-futur",
            Self::Restes => "restes-du-futur",
            Self::Minutes => "minutes",
        }
    }

    /// Full `post_cat` list for a new note.
    pub fn categories(self) -> Vec<String> {
        let medium = if self == Self::Minutes { "video" } else { "photo" };
        vec![medium.to_string(), self.category().to_string()]
    }

    /// `lien_projet` list for a new note.
    pub fn project_links(self) -> Vec<String> {
        let (medium, project) = match self {
            Self::Journal => ("Photo", "Journal Photo"),
            Self::Archives => ("Photo", "Archives du futur"),
            Self::Restes => ("Photo", "Restes du futur"),
            Self::Minutes => ("Vidéo", "Minutes"),
        };
        vec![wrap_wiki(medium), wrap_wiki(project)]
    }

    /// Suffix substituted for the imported-image marker in companion images.
    pub fn image_suffix(self) -> Option<&'static str> {
        match self {
            Self::Archives => Some(ARCHIVES_IMAGE_SUFFIX),
            Self::Restes => Some(RESTES_IMAGE_SUFFIX),
            Self::Journal | Self::Minutes => None,
        }
    }

    /// Field on a Journal that links to a companion of this kind.
    pub fn journal_link_field(self) -> Option<Field> {
        match self {
            Self::Archives => Some(Field::LienArchives),
            Self::Restes => Some(Field::LienRestes),
            Self::Journal | Self::Minutes => None,
        }
    }

    /// Field linking this companion to its sibling companion.
    pub fn sibling_link_field(self) -> Option<Field> {
        match self {
            Self::Archives => Some(Field::LienRestes),
            Self::Restes => Some(Field::LienArchives),
            Self::Journal | Self::Minutes => None,
        }
    }

    /// True for kinds derived from a Journal note.
    pub fn is_companion(self) -> bool {
        self.journal_link_field().is_some()
    }
}

impl fmt::Display for NoteKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.keyword())
    }
}

impl FromStr for NoteKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "journal" => Ok(Self::Journal),
            "archives" => Ok(Self::Archives),
            "restes" => Ok(Self::Restes),
            "minutes" => Ok(Self::Minutes),
            _ => Err(format!("Unknown note kind: {}", s)),
        }
    }
}

// =============================================================================
// TITLES
// =============================================================================

/// The three title fields of a note.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Titles {
    pub titre_1: String,
    pub titre_2: String,
    pub titre_full: String,
}

/// Split a full title at the first occurrence of `keyword`.
///
/// The part before becomes `titre_1` (ending punctuation enforced), the part
/// from the keyword on becomes `titre_2`. Without the keyword, the whole text
/// is `titre_1` and `titre_2` is empty.
pub fn derive_titles(text: &str, keyword: &str) -> Titles {
    let full = text.trim();
    if full.is_empty() {
        return Titles::default();
    }

    match full.find(keyword) {
        Some(idx) => Titles {
            titre_1: ensure_ending_dot(full[..idx].trim()),
            titre_2: full[idx..].trim().to_string(),
            titre_full: full.to_string(),
        },
        None => Titles {
            titre_1: ensure_ending_dot(full),
            titre_2: String::new(),
            titre_full: full.to_string(),
        },
    }
}

/// Append `.` unless the text already ends with `.`, `!` or `?`.
pub fn ensure_ending_dot(s: &str) -> String {
    let trimmed = s.trim();
    if trimmed.is_empty() || trimmed.ends_with(['.', '!', '?']) {
        trimmed.to_string()
    } else {
        format!("{}.", trimmed)
    }
}

/// Join two title halves with one space; either may be blank.
pub fn build_full_title(titre_1: &str, titre_2: &str) -> String {
    match (titre_1.trim(), titre_2.trim()) {
        ("", right) => right.to_string(),
        (left, "") => left.to_string(),
        (left, right) => format!("{} {}", left, right),
    }
}

/// Build the link text for a companion from a Journal title.
///
/// `.`, `,` and `!` become ` ?`, the Journal keyword becomes the target's,
/// the letter after every `?` is capitalised, runs of whitespace collapse,
/// and the result always ends with ` ?`.
pub fn link_text(source_title: &str, target: NoteKind) -> String {
    if source_title.is_empty() {
        return String::new();
    }

    let s = LINK_PUNCTUATION.replace_all(source_title, LINK_QUESTION_TOKEN);
    let s = JOURNAL_WORD.replace_all(&s, target.keyword());
    let s = AFTER_QUESTION.replace_all(&s, |caps: &regex::Captures<'_>| {
        format!(" ? {}", caps[1].to_uppercase())
    });
    let mut s = MULTI_SPACE.replace_all(&s, " ").trim().to_string();

    if !s.trim_end().ends_with('?') {
        s.push_str(LINK_QUESTION_TOKEN);
    }
    s.trim().to_string()
}

/// `[[text]]`, or empty for blank text.
pub fn wrap_wiki(text: &str) -> String {
    if text.is_empty() {
        String::new()
    } else {
        format!("[[{}]]", text)
    }
}

/// Inner text of a `[[...]]` token, or the trimmed input when not wrapped.
pub fn unwrap_wiki(token: &str) -> String {
    let t = token.trim();
    WIKI_LINK
        .captures(t)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().trim().to_string())
        .unwrap_or_else(|| t.to_string())
}

/// Replace every imported-image marker with `suffix`.
pub fn swap_image_suffix(name: &str, suffix: &str) -> String {
    name.replace(IMPORTED_IMAGE_SUFFIX, suffix)
}

// =============================================================================
// RECORD DERIVATIONS
// =============================================================================

/// Derive the companion record of `kind` from a Journal record.
///
/// `title_text` is the companion's full title, usually the unwrapped
/// Journal link or [`link_text`] of the Journal title.
pub fn companion_record(journal: &MasterRecord, kind: NoteKind, title_text: &str) -> MasterRecord {
    let titles = derive_titles(title_text, kind.keyword());
    let source_image = journal.img_filename.first().cloned().unwrap_or_default();
    let image = match kind.image_suffix() {
        Some(suffix) => swap_image_suffix(&source_image, suffix),
        None => source_image,
    };
    let short_title = if titles.titre_1.is_empty() {
        titles.titre_full.clone()
    } else {
        titles.titre_1.clone()
    };

    let mut record = create_empty();
    record.cover = non_blank(&image);
    record.img_alt = non_blank_list(&short_title);
    record.img_filename = non_blank_list(&image);
    record.img_legende = non_blank_list(&titles.titre_full);
    record.lien_journal = non_blank(&wrap_wiki(&journal.post_titre_full));
    record.lien_projet = kind.project_links();
    record.maj_wp = true;
    record.post_cat = kind.categories();
    record.post_date = journal.post_date.clone();
    record.post_mod = journal.post_date.clone();
    record.post_titre_1 = non_blank(&titles.titre_1);
    record.post_titre_2 = non_blank(&titles.titre_2);
    record.post_titre_full = titles.titre_full;
    record.tags = journal.tags.clone();
    record.wp_import_dataset_key = journal.wp_import_dataset_key.clone();
    record.wp_import_dataset_id = journal.wp_import_dataset_id;

    if let Some(sibling) = kind.sibling_link_field() {
        record.set(sibling, journal.get(sibling));
    }
    record
}

/// Recompute a Journal's derived fields from its `post_titre_1` and a new
/// `post_titre_2`.
///
/// Updates `post_titre_2`, `post_titre_full`, `img_alt`, `img_legende` and
/// both companion links. Everything else is kept.
pub fn recalculate_journal(journal: &MasterRecord, titre_2: &str) -> MasterRecord {
    let titre_1 = journal.post_titre_1.clone().unwrap_or_default();
    let full = build_full_title(&titre_1, titre_2);

    let mut record = journal.clone();
    record.post_titre_2 = non_blank(titre_2.trim());
    record.img_alt = non_blank_list(titre_1.trim());
    record.img_legende = non_blank_list(&full);
    record.lien_archives = non_blank(&wrap_wiki(&link_text(&full, NoteKind::Archives)));
    record.lien_restes = non_blank(&wrap_wiki(&link_text(&full, NoteKind::Restes)));
    record.post_titre_full = full;
    record
}

/// Input for a brand new Journal or Minutes note.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewPost {
    pub image: String,
    pub titre_1: String,
    pub titre_2: String,
    /// ISO-like timestamp, copied to `post_date` and `post_mod`.
    pub post_date: String,
    pub video_url: Option<String>,
    pub tags: Vec<String>,
}

/// Build the record of a new note of `kind`.
pub fn new_post(kind: NoteKind, input: NewPost) -> MasterRecord {
    let titre_1 = input.titre_1.trim().to_string();
    let titre_2 = input.titre_2.trim().to_string();
    let full = build_full_title(&titre_1, &titre_2);
    let image = input.image.trim().to_string();
    let date = input.post_date.trim().to_string();

    let mut record = create_empty();
    record.cover = non_blank(&image);
    record.img_alt = non_blank_list(&titre_1);
    record.img_filename = non_blank_list(&image);
    record.img_legende = non_blank_list(&full);
    record.lien_projet = kind.project_links();
    record.maj_wp = true;
    record.post_cat = kind.categories();
    record.post_date = date.clone();
    record.post_mod = date;
    record.post_titre_1 = non_blank(&titre_1);
    record.post_titre_2 = non_blank(&titre_2);
    record.set(Field::Tags, FieldValue::List(input.tags));

    if kind == NoteKind::Journal {
        record.lien_archives = non_blank(&wrap_wiki(&link_text(&full, NoteKind::Archives)));
        record.lien_restes = non_blank(&wrap_wiki(&link_text(&full, NoteKind::Restes)));
    }
    if kind == NoteKind::Minutes {
        record.post_vid_url = input.video_url.as_deref().and_then(non_blank);
    }
    record.post_titre_full = full;
    record
}

fn non_blank(s: &str) -> Option<String> {
    let t = s.trim();
    (!t.is_empty()).then(|| t.to_string())
}

fn non_blank_list(s: &str) -> Vec<String> {
    non_blank(s).into_iter().collect()
}
