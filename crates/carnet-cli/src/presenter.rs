//! Terminal review of a change set.

use async_trait::async_trait;
use carnet_core::{ChangeGroup, ChangePresenter, ChangeSet, Selection};

/// Prints the change set to stdout.
///
/// With `accept_defaults` the pre-selected items (and the suggested rename)
/// are accepted; otherwise the review ends cancelled and nothing is written.
#[derive(Debug, Clone, Copy)]
pub struct TerminalPresenter {
    pub accept_defaults: bool,
}

#[async_trait]
impl ChangePresenter for TerminalPresenter {
    async fn present(&self, change_set: &ChangeSet) -> Option<Selection> {
        print!("{}", render_change_set(change_set));
        if self.accept_defaults {
            Some(Selection::defaults(change_set))
        } else {
            println!("Preview only; re-run with --yes to apply the selected changes.");
            None
        }
    }
}

/// Human-readable listing, `[x]` marking the default selection.
pub fn render_change_set(change_set: &ChangeSet) -> String {
    let mut out = String::new();
    for (group, heading) in [
        (ChangeGroup::Common, "Common fields"),
        (ChangeGroup::Derived, "Derived fields"),
    ] {
        let items: Vec<_> = change_set.group(group).collect();
        if items.is_empty() {
            continue;
        }
        out.push_str(heading);
        out.push('\n');
        for item in items {
            let mark = if item.selected { 'x' } else { ' ' };
            out.push_str(&format!(
                "  [{mark}] {} ({}): {} -> {}\n",
                item.label, item.key, item.before, item.after
            ));
        }
    }
    if let Some(rename) = &change_set.suggested_rename {
        out.push_str(&format!("Rename to: {rename}\n"));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use carnet_core::{ChangeItem, ChangeValue, Field};

    fn item(key: Field, group: ChangeGroup, before: ChangeValue, after: ChangeValue) -> ChangeItem {
        ChangeItem {
            key,
            label: key.label().to_string(),
            selected: before != after,
            before,
            after,
            group,
        }
    }

    #[test]
    fn test_render_groups_and_rename() {
        let change_set = ChangeSet {
            items: vec![
                item(
                    Field::PostDate,
                    ChangeGroup::Common,
                    ChangeValue::Text("2024-01-26T00:00:00".into()),
                    ChangeValue::Text("2024-01-27T00:00:00".into()),
                ),
                item(
                    Field::Tags,
                    ChangeGroup::Common,
                    ChangeValue::List(vec!["river".into()]),
                    ChangeValue::List(vec!["river".into()]),
                ),
            ],
            suggested_rename: Some("Walk ? Archives.md".into()),
        };

        let text = render_change_set(&change_set);
        assert!(text.starts_with("Common fields\n"));
        assert!(text.contains("  [x] "));
        assert!(text.contains("(post_date): \"2024-01-26T00:00:00\" -> \"2024-01-27T00:00:00\""));
        assert!(text.contains("  [ ] "));
        assert!(!text.contains("Derived fields"));
        assert!(text.ends_with("Rename to: Walk ? Archives.md\n"));
    }

    #[tokio::test]
    async fn test_presenter_cancels_without_yes() {
        let change_set = ChangeSet::default();
        let preview = TerminalPresenter {
            accept_defaults: false,
        };
        assert_eq!(preview.present(&change_set).await, None);

        let accept = TerminalPresenter {
            accept_defaults: true,
        };
        assert_eq!(
            accept.present(&change_set).await,
            Some(Selection::defaults(&change_set))
        );
    }
}
