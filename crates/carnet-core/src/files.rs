//! Record locations: filenames derived from titles, collision-free paths.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::defaults::{FILENAME_MAX_LEN, NOTE_EXTENSION, UNIQUE_LOCATION_MAX_ATTEMPTS, UNTITLED};
use crate::error::{Error, Result};
use crate::traits::RecordStore;

/// Characters no mainstream filesystem accepts. `?` and `!` are kept.
static ILLEGAL_CHARS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"[/:\\*"<>|]"#).expect("valid illegal chars regex"));
static DASH_RUN: Lazy<Regex> = Lazy::new(|| Regex::new(r"-+").expect("valid dash run regex"));
static SPACED_DASH: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\s+-\s+").expect("valid spaced dash regex"));
static BLANK_RUN: Lazy<Regex> = Lazy::new(|| Regex::new(r"[ \t]+").expect("valid blank regex"));
static TRAILING_DOTS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[.\s]+$").expect("valid trailing dots regex"));

/// Turn a title into a note filename ending in `.md`.
///
/// Accents, spaces, `?` and `!` survive; `/ : \ * " < > |` become `-`.
pub fn sanitize_for_filename(title: &str) -> String {
    let base = ILLEGAL_CHARS.replace_all(title.trim(), "-");
    let base = DASH_RUN.replace_all(&base, "-");
    let base = SPACED_DASH.replace_all(&base, "-");
    let base = BLANK_RUN.replace_all(&base, " ");
    let mut base = base.trim().to_string();

    if base.is_empty() {
        base = UNTITLED.to_string();
    }

    base = TRAILING_DOTS.replace(&base, "").into_owned();

    if base.chars().count() > FILENAME_MAX_LEN {
        base = base
            .chars()
            .take(FILENAME_MAX_LEN)
            .collect::<String>()
            .trim()
            .to_string();
    }

    if !base.to_lowercase().ends_with(NOTE_EXTENSION) {
        base.push_str(NOTE_EXTENSION);
    }
    base
}

/// Join a directory locator and a name with exactly one `/`.
pub fn join_locator(dir: &str, name: &str) -> String {
    let dir = dir.trim_end_matches(['/', '\\']);
    let name = name.trim_start_matches(['/', '\\']);
    if dir.is_empty() {
        name.to_string()
    } else {
        format!("{dir}/{name}")
    }
}

/// Last path component of a locator.
pub fn file_name(locator: &str) -> &str {
    locator.rsplit(['/', '\\']).next().unwrap_or(locator)
}

/// Directory part of a locator, `""` at the root.
pub fn parent_dir(locator: &str) -> &str {
    match locator.rfind(['/', '\\']) {
        Some(pos) => &locator[..pos],
        None => "",
    }
}

/// Filename without its final extension.
pub fn file_stem(locator: &str) -> &str {
    let name = file_name(locator);
    match name.rfind('.') {
        Some(pos) if pos > 0 => &name[..pos],
        _ => name,
    }
}

fn candidate(name: &str, n: u32) -> String {
    if n == 1 {
        return name.to_string();
    }
    match name.rfind('.') {
        Some(pos) if pos > 0 => format!("{} ({}){}", &name[..pos], n, &name[pos..]),
        _ => format!("{name} ({n})"),
    }
}

/// First free locator among `dir/name`, `dir/name (2)`, `dir/name (3)`, ...
///
/// The counter goes before the extension.
pub async fn ensure_unique_location<S>(store: &S, dir: &str, name: &str) -> Result<String>
where
    S: RecordStore + ?Sized,
{
    for n in 1..=UNIQUE_LOCATION_MAX_ATTEMPTS {
        let locator = join_locator(dir, &candidate(name, n));
        if !store.exists(&locator).await? {
            return Ok(locator);
        }
    }
    Err(Error::Internal(format!(
        "no free location for {} after {} attempts",
        join_locator(dir, name),
        UNIQUE_LOCATION_MAX_ATTEMPTS
    )))
}
