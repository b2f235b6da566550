//! Posted form values, checkbox filtering and the selection diff.

use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;
use serde_json::Value;
use shared::{
    domain::{ContactField, GroupId},
    protocol::{FieldValues, Instruction, InstructionSet},
    wire::is_truthy,
};

pub const GROUP_FIELD_PREFIX: &str = "mailing_lists_";
pub const UNSUBSCRIBE_ALL_FIELD: &str = "unsubscribe_all";

/// Checked state per group as posted by the visitor.
pub type SelectionMap = BTreeMap<GroupId, bool>;

pub fn group_field_key(id: GroupId) -> String {
    format!("{GROUP_FIELD_PREFIX}{id}")
}

pub fn group_id_from_field_key(key: &str) -> Option<GroupId> {
    key.strip_prefix(GROUP_FIELD_PREFIX)?.parse().ok()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum SubmittedValue {
    Single(String),
    Multi(BTreeMap<String, String>),
}

impl SubmittedValue {
    fn to_json(&self) -> Value {
        match self {
            SubmittedValue::Single(value) => Value::String(value.clone()),
            SubmittedValue::Multi(entries) => Value::Object(
                entries
                    .iter()
                    .map(|(key, value)| (key.clone(), Value::String(value.clone())))
                    .collect(),
            ),
        }
    }

    fn is_blank(&self) -> bool {
        match self {
            SubmittedValue::Single(value) => value.trim().is_empty(),
            SubmittedValue::Multi(entries) => filter_checked(entries).is_empty(),
        }
    }
}

/// A posted form after `name[key]=value` pairs have been folded into multi-valued fields.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FormSubmission {
    values: BTreeMap<String, SubmittedValue>,
}

impl FormSubmission {
    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let mut values = BTreeMap::new();
        for (key, value) in pairs {
            let (key, value) = (key.into(), value.into());
            match split_bracketed(&key) {
                Some((name, sub_key)) => {
                    // `name[]` carries no key; the value doubles as its own key.
                    let sub_key = if sub_key.is_empty() { value.clone() } else { sub_key.to_string() };
                    let slot = values
                        .entry(name.to_string())
                        .or_insert_with(|| SubmittedValue::Multi(BTreeMap::new()));
                    if let SubmittedValue::Single(_) = slot {
                        *slot = SubmittedValue::Multi(BTreeMap::new());
                    }
                    if let SubmittedValue::Multi(entries) = slot {
                        entries.insert(sub_key, value);
                    }
                }
                None => {
                    values.insert(key, SubmittedValue::Single(value));
                }
            }
        }
        Self { values }
    }

    pub fn get(&self, name: &str) -> Option<&SubmittedValue> {
        self.values.get(name)
    }

    pub fn text(&self, name: &str) -> Option<&str> {
        match self.values.get(name)? {
            SubmittedValue::Single(value) => Some(value),
            SubmittedValue::Multi(_) => None,
        }
    }

    pub fn is_blank(&self, name: &str) -> bool {
        self.values.get(name).map_or(true, SubmittedValue::is_blank)
    }

    /// Group checkboxes found in the submission, keyed by group id.
    pub fn selection(&self) -> SelectionMap {
        self.values
            .iter()
            .filter_map(|(key, value)| {
                let id = group_id_from_field_key(key)?;
                let checked = match value {
                    SubmittedValue::Single(value) => is_truthy(value),
                    SubmittedValue::Multi(entries) => !filter_checked(entries).is_empty(),
                };
                Some((id, checked))
            })
            .collect()
    }

    pub fn unsubscribe_all(&self) -> bool {
        self.text(UNSUBSCRIBE_ALL_FIELD).is_some_and(is_truthy)
    }

    /// The submission with unchecked entries removed from every multi-valued field.
    pub fn filtered(&self) -> Self {
        let values = self
            .values
            .iter()
            .map(|(name, value)| {
                let value = match value {
                    SubmittedValue::Multi(entries) => SubmittedValue::Multi(filter_checked(entries)),
                    single => single.clone(),
                };
                (name.clone(), value)
            })
            .collect();
        Self { values }
    }

    /// Values for the given contact fields, checkbox-filtered. Anything else posted is dropped.
    pub fn field_values<'a>(&self, fields: impl IntoIterator<Item = &'a ContactField>) -> FieldValues {
        let filtered = self.filtered();
        fields
            .into_iter()
            .filter_map(|field| {
                let value = filtered.values.get(&field.name)?;
                Some((field.name.clone(), value.to_json()))
            })
            .collect()
    }
}

fn split_bracketed(key: &str) -> Option<(&str, &str)> {
    let open = key.find('[')?;
    let inner = key[open + 1..].strip_suffix(']')?;
    if open == 0 || inner.contains('[') {
        return None;
    }
    Some((&key[..open], inner))
}

/// Keeps only entries whose value equals their key, i.e. ticked checkboxes.
pub fn filter_checked(entries: &BTreeMap<String, String>) -> BTreeMap<String, String> {
    entries
        .iter()
        .filter(|(key, value)| key == value)
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect()
}

/// Instructions for every known group; selections outside `known` are dropped.
pub fn diff(selection: &SelectionMap, known: &BTreeSet<GroupId>) -> InstructionSet {
    known
        .iter()
        .map(|id| {
            let instruction = if selection.get(id).copied().unwrap_or(false) {
                Instruction::Added
            } else {
                Instruction::Removed
            };
            (*id, instruction)
        })
        .collect()
}

pub fn added_ids(instructions: &InstructionSet) -> Vec<GroupId> {
    instructions
        .iter()
        .filter(|(_, instruction)| **instruction == Instruction::Added)
        .map(|(id, _)| *id)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::domain::ContactFieldType;

    fn ids(raw: &[i64]) -> BTreeSet<GroupId> {
        raw.iter().copied().map(GroupId).collect()
    }

    #[test]
    fn field_keys_round_trip() {
        assert_eq!(group_field_key(GroupId(42)), "mailing_lists_42");
        assert_eq!(group_id_from_field_key("mailing_lists_42"), Some(GroupId(42)));
        assert_eq!(group_id_from_field_key(UNSUBSCRIBE_ALL_FIELD), None);
        assert_eq!(group_id_from_field_key("email"), None);
    }

    #[test]
    fn diff_marks_checked_added_and_the_rest_removed() {
        let submission = FormSubmission::from_pairs([
            ("mailing_lists_1", "1"),
            ("mailing_lists_2", "0"),
            ("mailing_lists_3", "1"),
        ]);
        let instructions = diff(&submission.selection(), &ids(&[1, 2, 3]));
        assert_eq!(
            instructions,
            InstructionSet::from([
                (GroupId(1), Instruction::Added),
                (GroupId(2), Instruction::Removed),
                (GroupId(3), Instruction::Added),
            ])
        );
    }

    #[test]
    fn diff_covers_known_ids_only() {
        let selection = SelectionMap::from([(GroupId(9), true)]);
        let all_removed = diff(&selection, &ids(&[1, 2]));
        assert!(all_removed.values().all(|i| *i == Instruction::Removed));
        assert_eq!(all_removed.len(), 2);
        assert!(!all_removed.contains_key(&GroupId(9)));

        let everything = SelectionMap::from([(GroupId(1), true), (GroupId(2), true)]);
        let all_added = diff(&everything, &ids(&[1, 2]));
        assert!(all_added.values().all(|i| *i == Instruction::Added));
        assert_eq!(added_ids(&all_added), [GroupId(1), GroupId(2)]);
    }

    #[test]
    fn checkbox_filter_keeps_ticked_entries_and_is_idempotent() {
        let entries = BTreeMap::from([
            ("a".to_string(), "a".to_string()),
            ("b".to_string(), "0".to_string()),
            ("c".to_string(), "c".to_string()),
        ]);
        let once = filter_checked(&entries);
        assert_eq!(once.keys().collect::<Vec<_>>(), ["a", "c"]);
        assert_eq!(filter_checked(&once), once);
    }

    #[test]
    fn bracketed_pairs_become_multi_valued_fields() {
        let submission = FormSubmission::from_pairs([
            ("email", "a@example.org"),
            ("interests[sports]", "sports"),
            ("interests[music]", "0"),
            ("tags[]", "x"),
            ("unsubscribe_all", "1"),
            ("ignored", "value"),
        ]);

        assert_eq!(submission.text("email"), Some("a@example.org"));
        assert!(submission.unsubscribe_all());
        assert!(submission.selection().is_empty());

        let fields = [
            ContactField {
                name: "email".into(),
                kind: ContactFieldType::Text,
                label: "E-mail".into(),
                description: None,
                required: true,
                active: true,
                options: Vec::new(),
            },
            ContactField {
                name: "interests".into(),
                kind: ContactFieldType::MultiSelect,
                label: "Interests".into(),
                description: None,
                required: false,
                active: true,
                options: Vec::new(),
            },
        ];
        let values = submission.field_values(&fields);
        assert_eq!(values.len(), 2);
        assert_eq!(values["email"], "a@example.org");
        assert_eq!(values["interests"], serde_json::json!({ "sports": "sports" }));
    }

    #[test]
    fn blank_values_are_detected() {
        let submission = FormSubmission::from_pairs([
            ("email", "  "),
            ("interests[a]", "a"),
            ("topics[x]", "0"),
        ]);
        assert!(submission.is_blank("email"));
        assert!(submission.is_blank("missing"));
        assert!(!submission.is_blank("interests"));
        assert!(submission.is_blank("topics"));
    }
}
