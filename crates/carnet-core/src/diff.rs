//! Diff/merge engine.
//!
//! [`build_change_set`] compares a stored record against a freshly derived
//! candidate. The common group (date, tags) is always compared; the derived
//! group only when the candidate's full title moved away from the stored one.
//! [`apply_change_set`] writes a selected subset back onto a copy.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::models::{ChangeGroup, ChangeItem, ChangeSet, ChangeValue, Field, MasterRecord};

/// Fields compared on every run.
pub const COMMON_FIELDS: [Field; 2] = [Field::PostDate, Field::Tags];

/// Fields compared only when the identity (full title) changed, in display order.
pub const DERIVED_FIELDS: [Field; 10] = [
    Field::PostTitre1,
    Field::PostTitre2,
    Field::PostTitreFull,
    Field::ImgFilename,
    Field::Cover,
    Field::ImgAlt,
    Field::ImgLegende,
    Field::LienJournal,
    Field::LienArchives,
    Field::LienRestes,
];

/// Result of comparing a stored record with a candidate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", content = "change_set", rename_all = "snake_case")]
pub enum ChangeOutcome {
    /// No item differs; the change set holds the (unselected) common items.
    UpToDate(ChangeSet),
    /// At least one item differs.
    Changes(ChangeSet),
}

impl ChangeOutcome {
    pub fn change_set(&self) -> &ChangeSet {
        match self {
            Self::UpToDate(cs) | Self::Changes(cs) => cs,
        }
    }

    pub fn is_up_to_date(&self) -> bool {
        matches!(self, Self::UpToDate(_))
    }
}

/// Classify the discrepancies between `current` and `candidate`.
///
/// A missing `current` is compared as the empty record.
pub fn build_change_set(current: Option<&MasterRecord>, candidate: &MasterRecord) -> ChangeOutcome {
    let empty = MasterRecord::default();
    let current = current.unwrap_or(&empty);

    let mut items: Vec<ChangeItem> = COMMON_FIELDS
        .iter()
        .map(|&field| change_item(field, current, candidate, ChangeGroup::Common))
        .collect();

    let title_changed = candidate.post_titre_full != current.post_titre_full;
    let mut suggested_rename = None;

    if title_changed {
        items.extend(
            DERIVED_FIELDS
                .iter()
                .map(|&field| change_item(field, current, candidate, ChangeGroup::Derived)),
        );
        suggested_rename = Some(candidate.post_titre_full.clone());
    }

    let change_set = ChangeSet {
        items,
        suggested_rename,
    };

    tracing::debug!(
        title_changed,
        field_count = change_set.items.len(),
        differing = change_set.items.iter().filter(|i| i.selected).count(),
        "Built change set"
    );

    if change_set.has_differences() {
        ChangeOutcome::Changes(change_set)
    } else {
        ChangeOutcome::UpToDate(change_set)
    }
}

/// Overwrite each selected key on a copy of `record` with its "after" value.
///
/// Values go through the same per-field coercion as the normalizer. Keys not
/// in `selected` are untouched; the input is never mutated.
pub fn apply_change_set(
    record: &MasterRecord,
    change_set: &ChangeSet,
    selected: &BTreeSet<Field>,
) -> MasterRecord {
    let mut updated = record.clone();
    for item in change_set
        .items
        .iter()
        .filter(|item| selected.contains(&item.key))
    {
        updated.set_from_json(item.key, &item.after.to_json());
    }
    updated
}

/// Scalar equality is exact; list equality ignores order after trimming.
pub fn values_equal(a: &ChangeValue, b: &ChangeValue) -> bool {
    match (a, b) {
        (ChangeValue::Text(x), ChangeValue::Text(y)) => x == y,
        (ChangeValue::List(x), ChangeValue::List(y)) => sorted_trimmed(x) == sorted_trimmed(y),
        _ => false,
    }
}

fn change_item(
    field: Field,
    current: &MasterRecord,
    candidate: &MasterRecord,
    group: ChangeGroup,
) -> ChangeItem {
    let before = ChangeValue::from_field_value(&current.get(field));
    let after = ChangeValue::from_field_value(&candidate.get(field));
    let selected = !values_equal(&before, &after);
    ChangeItem {
        key: field,
        label: field.label().to_string(),
        before,
        after,
        group,
        selected,
    }
}

fn sorted_trimmed(items: &[String]) -> Vec<&str> {
    let mut out: Vec<&str> = items.iter().map(|s| s.trim()).collect();
    out.sort_unstable();
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stored() -> MasterRecord {
        MasterRecord {
            cover: Some("a_BF.webp".into()),
            img_filename: vec!["a_BF.webp".into()],
            img_alt: vec!["A.".into()],
            img_legende: vec!["A. Report".into()],
            post_date: "2024-01-26T10:00:00".into(),
            post_titre_1: Some("A.".into()),
            post_titre_2: Some("Report".into()),
            post_titre_full: "A. Report".into(),
            tags: vec!["x".into(), "y".into()],
            ..Default::default()
        }
    }

    #[test]
    fn test_identical_is_up_to_date() {
        let outcome = build_change_set(Some(&stored()), &stored());
        assert!(outcome.is_up_to_date());
        let cs = outcome.change_set();
        assert_eq!(cs.items.len(), 2);
        assert!(cs.items.iter().all(|i| i.group == ChangeGroup::Common && !i.selected));
        assert!(cs.suggested_rename.is_none());
    }

    #[test]
    fn test_same_title_only_common_group() {
        let mut candidate = stored();
        candidate.tags = vec!["y".into(), "z".into()];
        candidate.cover = Some("other.webp".into());

        let ChangeOutcome::Changes(cs) = build_change_set(Some(&stored()), &candidate) else {
            panic!("expected changes");
        };
        assert_eq!(cs.group(ChangeGroup::Derived).count(), 0);
        let keys: Vec<(Field, bool)> = cs.items.iter().map(|i| (i.key, i.selected)).collect();
        assert_eq!(keys, vec![(Field::PostDate, false), (Field::Tags, true)]);
        assert!(cs.suggested_rename.is_none());
    }

    #[test]
    fn test_tag_order_is_ignored() {
        let mut candidate = stored();
        candidate.tags = vec!["y".into(), "x".into()];
        assert!(build_change_set(Some(&stored()), &candidate).is_up_to_date());
    }

    #[test]
    fn test_title_change_populates_derived_group() {
        let mut candidate = stored();
        candidate.post_titre_1 = Some("B.".into());
        candidate.post_titre_full = "B. Report".into();

        let ChangeOutcome::Changes(cs) = build_change_set(Some(&stored()), &candidate) else {
            panic!("expected changes");
        };
        assert_eq!(cs.suggested_rename.as_deref(), Some("B. Report"));
        let derived: Vec<&ChangeItem> = cs.group(ChangeGroup::Derived).collect();
        assert!(derived.iter().any(|i| i.key == Field::PostTitreFull && i.selected));
        assert!(derived.iter().any(|i| i.key == Field::PostTitre1 && i.selected));
        let titre_2 = derived.iter().find(|i| i.key == Field::PostTitre2).unwrap();
        assert!(!titre_2.selected);
    }

    #[test]
    fn test_title_change_lists_every_derived_field() {
        let mut candidate = stored();
        candidate.post_titre_full = "B. Report".into();

        let cs = build_change_set(Some(&stored()), &candidate).change_set().clone();
        let derived: Vec<(Field, bool)> = cs
            .group(ChangeGroup::Derived)
            .map(|i| (i.key, i.selected))
            .collect();
        let keys: Vec<Field> = derived.iter().map(|(key, _)| *key).collect();
        assert_eq!(keys, DERIVED_FIELDS.to_vec());
        assert_eq!(cs.items.len(), COMMON_FIELDS.len() + DERIVED_FIELDS.len());

        // links are empty on both sides and stay listed, unselected
        for key in [Field::LienJournal, Field::LienArchives, Field::LienRestes] {
            assert!(derived.contains(&(key, false)), "{key} should be listed");
        }
        assert!(derived.contains(&(Field::PostTitreFull, true)));
        assert_eq!(
            cs.default_selection().into_iter().collect::<Vec<_>>(),
            vec![Field::PostTitreFull]
        );
    }

    #[test]
    fn test_missing_current_compares_against_empty() {
        let ChangeOutcome::Changes(cs) = build_change_set(None, &stored()) else {
            panic!("expected changes");
        };
        assert_eq!(cs.suggested_rename.as_deref(), Some("A. Report"));
        let full = cs.items.iter().find(|i| i.key == Field::PostTitreFull).unwrap();
        assert_eq!(full.before, ChangeValue::Text(String::new()));
    }

    #[test]
    fn test_apply_selected_only() {
        let mut candidate = stored();
        candidate.post_date = "2024-02-01T00:00:00".into();
        candidate.tags = vec!["z".into()];
        let outcome = build_change_set(Some(&stored()), &candidate);

        let selected: BTreeSet<Field> = [Field::Tags].into_iter().collect();
        let updated = apply_change_set(&stored(), outcome.change_set(), &selected);
        assert_eq!(updated.tags, vec!["z"]);
        assert_eq!(updated.post_date, stored().post_date);
    }

    #[test]
    fn test_apply_is_idempotent_and_pure() {
        let mut candidate = stored();
        candidate.post_titre_full = "C. Report".into();
        candidate.lien_journal = Some("[[J]]".into());
        let outcome = build_change_set(Some(&stored()), &candidate);
        let selected = outcome.change_set().default_selection();

        let original = stored();
        let once = apply_change_set(&original, outcome.change_set(), &selected);
        let twice = apply_change_set(&once, outcome.change_set(), &selected);
        assert_eq!(once, twice);
        assert_eq!(original, stored());
        assert_eq!(once.post_titre_full, "C. Report");
        assert_eq!(once.lien_journal.as_deref(), Some("[[J]]"));
    }

    #[test]
    fn test_apply_coerces_blank_nullable_to_none() {
        let cs = ChangeSet {
            items: vec![ChangeItem {
                key: Field::LienRestes,
                label: "Link to Restes".into(),
                before: ChangeValue::Text("[[R]]".into()),
                after: ChangeValue::Text("".into()),
                group: ChangeGroup::Derived,
                selected: true,
            }],
            suggested_rename: None,
        };
        let mut record = stored();
        record.lien_restes = Some("[[R]]".into());
        let updated = apply_change_set(&record, &cs, &cs.default_selection());
        assert_eq!(updated.lien_restes, None);
    }

    #[test]
    fn test_values_equal_rules() {
        let list = |v: &[&str]| ChangeValue::List(v.iter().map(|s| s.to_string()).collect());
        assert!(values_equal(&list(&["a ", "b"]), &list(&["b", "a"])));
        assert!(!values_equal(&list(&["a"]), &list(&["a", "a"])));
        assert!(!values_equal(
            &ChangeValue::Text("Abc".into()),
            &ChangeValue::Text("abc".into())
        ));
    }
}
