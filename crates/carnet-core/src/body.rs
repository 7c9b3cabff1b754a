//! Note body rendering.
//!
//! Bodies are plain Markdown: level-two headings, embeds, one blank line
//! between sections and no trailing newline.

use crate::defaults::UNTITLED;
use crate::models::MasterRecord;

/// Body of an imported note: thumbnail, video, notes embed.
///
/// The thumbnail is `cover`, else the first `img_url`, and is omitted when
/// neither exists. The video section appears only with `post_vid_url`.
pub fn render_import_body(record: &MasterRecord) -> String {
    let mut sections: Vec<String> = Vec::new();

    let thumbnail = record
        .cover
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .or_else(|| record.img_url.first().map(String::as_str));
    if let Some(url) = thumbnail {
        sections.push(format!("## Vignette\n\n![]({url})"));
    }

    if let Some(url) = record.post_vid_url.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
        sections.push(format!("## Vidéo\n\n![]({url})"));
    }

    sections.push(format!("## Notes\n\n{}", notes_embed(&record.post_titre_full)));

    sections.join("\n\n")
}

/// Body of an Archives or Restes companion: image embed, notes embed.
pub fn render_companion_body(image: &str, title: &str) -> String {
    format!("## Photo\n![[{}]]\n\n## Notes\n{}", image.trim(), notes_embed(title))
}

fn notes_embed(title: &str) -> String {
    let title = title.trim();
    let title = if title.is_empty() { UNTITLED } else { title };
    format!("![[{title}_notes]]")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_import_body_notes_only() {
        let record = MasterRecord {
            post_titre_full: "Riverside Walk".into(),
            ..Default::default()
        };
        assert_eq!(render_import_body(&record), "## Notes\n\n![[Riverside Walk_notes]]");
    }

    #[test]
    fn test_import_body_all_sections() {
        let record = MasterRecord {
            img_url: vec!["https://x/a.webp".into(), "https://x/b.webp".into()],
            post_vid_url: Some("https://v/1".into()),
            post_titre_full: "T".into(),
            ..Default::default()
        };
        assert_eq!(
            render_import_body(&record),
            "## Vignette\n\n![](https://x/a.webp)\n\n## Vidéo\n\n![](https://v/1)\n\n## Notes\n\n![[T_notes]]"
        );
    }

    #[test]
    fn test_import_body_prefers_cover_and_defaults_title() {
        let record = MasterRecord {
            cover: Some("c.webp".into()),
            img_url: vec!["u.webp".into()],
            ..Default::default()
        };
        let body = render_import_body(&record);
        assert!(body.starts_with("## Vignette\n\n![](c.webp)"));
        assert!(body.ends_with("![[Sans titre_notes]]"));
    }

    #[test]
    fn test_companion_body() {
        assert_eq!(
            render_companion_body("a_BF.webp", "A. Archives"),
            "## Photo\n![[a_BF.webp]]\n\n## Notes\n![[A. Archives_notes]]"
        );
    }
}
