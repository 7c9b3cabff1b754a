//! Emission is a fixed point: a note read back and re-emitted is unchanged.

use carnet_core::derive::{new_post, NewPost};
use carnet_core::frontmatter::{render_note, rewrite_note};
use carnet_core::{normalize, patch_tags, split_document, MasterRecord, NoteKind, PatchOutcome};
use serde_json::json;

fn reemit(text: &str) -> String {
    let doc = split_document(text);
    let record = doc
        .record()
        .expect("Failed to parse frontmatter")
        .expect("Note has no frontmatter");
    rewrite_note(&doc, &record)
}

#[test]
fn test_new_post_note_is_stable() {
    let record = new_post(
        NoteKind::Journal,
        NewPost {
            image: "Walk_WP.webp".into(),
            titre_1: "Le fleuve: crue.".into(),
            titre_2: "Journal du vendredi 26 janvier 2024.".into(),
            post_date: "2024-01-26T00:00:00".into(),
            tags: vec!["river".into(), "# hash".into()],
            ..Default::default()
        },
    );
    let note = render_note(&record, "## Notes\n");

    assert_eq!(reemit(&note), note);
}

#[test]
fn test_partial_record_normalizes_once() {
    let record = normalize(&json!({
        "post_titre_full": "  Riverside  ",
        "tags": ["river", "river", "walk"],
        "post_id": 42,
        "unknown_key": "dropped",
    }));
    let note = render_note(&record, "body");

    assert!(!note.contains("unknown_key"));
    assert_eq!(reemit(&note), note);
    assert_eq!(record.post_titre_full, "Riverside");
    assert_eq!(record.post_id, "42");
}

#[test]
fn test_multi_paragraph_caption_reads_back_as_normalized() {
    let record = MasterRecord {
        post_titre_full: "Le fleuve.".into(),
        img_legende: vec!["One.\n\nStill one.".into(), "Two.".into()],
        ..Default::default()
    };
    let expected = normalize(&serde_json::to_value(&record).expect("Failed to encode record"));
    assert_eq!(expected.img_legende, vec!["One.", "Still one.", "Two."]);

    let note = render_note(&record, "");
    let parsed = split_document(&note)
        .record()
        .expect("Failed to parse frontmatter")
        .expect("Note has no frontmatter");
    assert_eq!(parsed, expected);
    assert_eq!(reemit(&note), render_note(&expected, ""));
}

#[test]
fn test_tag_patch_keeps_every_other_line() {
    let record = new_post(
        NoteKind::Archives,
        NewPost {
            image: "Walk_BF.webp".into(),
            titre_1: "Le fleuve.".into(),
            titre_2: "Archives du vendredi 26 janvier 2024.".into(),
            post_date: "2024-01-26T00:00:00".into(),
            tags: vec!["river".into()],
            ..Default::default()
        },
    );
    let note = render_note(&record, "## Photo\n");

    let PatchOutcome::Changed(patched) = patch_tags(&note, &["river".into(), "dusk".into()]) else {
        panic!("expected a change");
    };

    let before: Vec<&str> = note.lines().filter(|l| !is_tag_line(l)).collect();
    let after: Vec<&str> = patched.lines().filter(|l| !is_tag_line(l)).collect();
    assert_eq!(before.len(), after.len());
    for (old, new) in before.iter().zip(&after) {
        if old.starts_with("maj_wp:") {
            assert_eq!(*new, "maj_wp: true");
        } else {
            assert_eq!(old, new);
        }
    }

    let parsed = split_document(&patched).record().unwrap().unwrap();
    assert_eq!(parsed.tags, vec!["river", "dusk"]);
    assert_eq!(reemit(&patched), patched);
}

fn is_tag_line(line: &str) -> bool {
    line.starts_with("tags:") || line.starts_with("- ")
}
