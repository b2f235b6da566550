//! Serializable form descriptors handed to whatever renders the pages.

use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;
use serde_json::{json, Value};
use shared::{
    domain::{GroupId, Profile, Subscription},
    protocol::FieldValues,
};

use crate::{
    fields::{field_view, FieldView},
    selection::{group_field_key, UNSUBSCRIBE_ALL_FIELD},
    settings::WorkflowSettings,
    tree::{build_tree, SelectableTree},
};

pub const DEFAULT_SUBMIT_LABEL: &str = "Submit";
pub const REQUEST_LINK_TITLE: &str = "Request a link to CiviCRM newsletters preferences";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FormKind {
    Subscription,
    Preferences,
    RequestLink,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MailingListsView {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub tree: SelectableTree,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UnsubscribeAllView {
    pub field_key: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub checkbox_label: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// Terms shown read-only above the submit button.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConditionsView {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FormView {
    pub kind: FormKind,
    pub profile: String,
    pub title: String,
    pub fields: Vec<FieldView>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mailing_lists: Option<MailingListsView>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub hidden: BTreeMap<String, Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unsubscribe_all: Option<UnsubscribeAllView>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub conditions: Option<ConditionsView>,
    pub submit_label: String,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub protection: BTreeMap<String, Value>,
}

impl FormView {
    fn new(kind: FormKind, profile: &Profile, title: impl Into<String>) -> Self {
        let mut hidden = BTreeMap::new();
        hidden.insert("profile".to_string(), Value::String(profile.name.clone()));
        Self {
            kind,
            profile: profile.name.clone(),
            title: title.into(),
            fields: Vec::new(),
            mailing_lists: None,
            hidden,
            unsubscribe_all: None,
            conditions: None,
            submit_label: profile
                .submit_label
                .clone()
                .unwrap_or_else(|| DEFAULT_SUBMIT_LABEL.to_string()),
            protection: BTreeMap::new(),
        }
    }

    /// The selectable tree, when the form shows one.
    pub fn tree(&self) -> Option<&SelectableTree> {
        self.mailing_lists.as_ref().map(|lists| &lists.tree)
    }
}

/// Values to pre-fill when a public form is shown again after a rejected submission.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Prefill {
    pub fields: FieldValues,
    pub selected: BTreeSet<GroupId>,
}

pub fn subscription_form(profile: &Profile, settings: &WorkflowSettings, prefill: &Prefill) -> FormView {
    let mut form = FormView::new(FormKind::Subscription, profile, profile.form_title.clone());
    form.fields = editable_fields(profile, &prefill.fields);

    match forced_single_list(profile, settings) {
        Some(id) => {
            form.hidden.insert(group_field_key(id), json!(1));
        }
        None => {
            form.mailing_lists = Some(mailing_lists_view(profile, settings, &prefill.selected));
        }
    }

    form.conditions = conditions(
        profile.conditions_public.as_deref(),
        &profile.conditions_public_label,
        &profile.conditions_public_description,
    );
    form
}

pub fn preferences_form(
    profile: &Profile,
    settings: &WorkflowSettings,
    subscription: &Subscription,
) -> FormView {
    let contact = &subscription.contact;
    let mut form = FormView::new(FormKind::Preferences, profile, profile.form_title.clone());
    form.fields = profile
        .active_fields()
        .map(|field| field_view(field, contact.values.get(&field.name).cloned(), true))
        .collect();
    form.mailing_lists = Some(mailing_lists_view(
        profile,
        settings,
        &subscription.subscription_status,
    ));
    form.hidden
        .insert("contact_id".to_string(), json!(contact.id));
    form.hidden
        .insert("contact_checksum".to_string(), json!(contact.checksum));

    if profile.mailing_lists_unsubscribe_all {
        form.unsubscribe_all = Some(UnsubscribeAllView {
            field_key: UNSUBSCRIBE_ALL_FIELD.to_string(),
            label: profile.mailing_lists_unsubscribe_all_label.clone(),
            checkbox_label: profile.mailing_lists_unsubscribe_all_submit_label.clone(),
            description: profile.mailing_lists_unsubscribe_all_description.clone(),
        });
    }

    form.conditions = conditions(
        profile.conditions_preferences.as_deref(),
        &profile.conditions_preferences_label,
        &profile.conditions_preferences_description,
    );
    form
}

pub fn request_link_form(profile: &Profile, prefill: &FieldValues) -> FormView {
    let mut form = FormView::new(FormKind::RequestLink, profile, REQUEST_LINK_TITLE);
    form.fields = editable_fields(profile, prefill);
    form.submit_label = DEFAULT_SUBMIT_LABEL.to_string();
    form
}

/// The list a public subscription is pinned to when the selection is hidden.
pub fn forced_single_list(profile: &Profile, settings: &WorkflowSettings) -> Option<GroupId> {
    if settings.single_group_hide {
        profile.single_mailing_list()
    } else {
        None
    }
}

pub fn selectable_tree(
    profile: &Profile,
    settings: &WorkflowSettings,
    subscribed: &BTreeSet<GroupId>,
) -> SelectableTree {
    build_tree(
        &profile.mailing_lists_tree,
        subscribed,
        settings.parent_groups_selectable,
    )
}

fn mailing_lists_view(
    profile: &Profile,
    settings: &WorkflowSettings,
    subscribed: &BTreeSet<GroupId>,
) -> MailingListsView {
    MailingListsView {
        label: profile.mailing_lists_label.clone(),
        description: profile.mailing_lists_description.clone(),
        tree: selectable_tree(profile, settings, subscribed),
    }
}

fn editable_fields(profile: &Profile, prefill: &FieldValues) -> Vec<FieldView> {
    profile
        .active_fields()
        .map(|field| field_view(field, prefill.get(&field.name).cloned(), false))
        .collect()
}

fn conditions(
    text: Option<&str>,
    label: &Option<String>,
    description: &Option<String>,
) -> Option<ConditionsView> {
    text.map(|text| ConditionsView {
        label: label.clone(),
        description: description.clone(),
        text: text.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::domain::{Contact, ContactId};

    fn profile() -> Profile {
        serde_json::from_value(json!({
            "name": "weekly",
            "form_title": "Weekly news",
            "contact_fields": {
                "email": { "type": "Text", "label": "E-mail", "required": 1 },
                "first_name": { "type": "Text", "label": "First name" }
            },
            "mailing_lists": { "4": "News" },
            "mailing_lists_tree": { "4": { "name": "news", "title": "News" } },
            "mailing_lists_unsubscribe_all": 1,
            "mailing_lists_unsubscribe_all_label": "Leave",
            "conditions_public": "Be nice."
        }))
        .expect("profile")
    }

    #[test]
    fn single_list_is_pinned_when_hidden() {
        let settings = WorkflowSettings {
            single_group_hide: true,
            ..Default::default()
        };
        let form = subscription_form(&profile(), &settings, &Prefill::default());
        assert!(form.mailing_lists.is_none());
        assert_eq!(form.hidden["mailing_lists_4"], json!(1));
        assert_eq!(form.submit_label, DEFAULT_SUBMIT_LABEL);
        assert_eq!(form.conditions.as_ref().map(|c| c.text.as_str()), Some("Be nice."));

        let shown = subscription_form(&profile(), &WorkflowSettings::default(), &Prefill::default());
        assert_eq!(shown.tree().map(|tree| tree.checkbox_ids().len()), Some(1));
    }

    #[test]
    fn preferences_form_is_seeded_from_the_contact() {
        let mut values = BTreeMap::new();
        values.insert("email".to_string(), json!("a@example.org"));
        let subscription = Subscription {
            contact: Contact {
                id: ContactId(9),
                checksum: "cs".into(),
                values,
            },
            subscription_status: BTreeSet::from([GroupId(4)]),
        };

        let form = preferences_form(&profile(), &WorkflowSettings::default(), &subscription);
        assert!(form.fields.iter().all(|field| field.read_only));
        assert_eq!(form.fields[0].default_value, Some(json!("a@example.org")));
        assert_eq!(form.fields[1].default_value, None);
        assert_eq!(form.hidden["contact_id"], json!(9));
        assert_eq!(form.hidden["contact_checksum"], json!("cs"));
        assert!(form.tree().expect("tree").checkboxes()[0].default);
        assert_eq!(
            form.unsubscribe_all.as_ref().map(|u| u.field_key.as_str()),
            Some(UNSUBSCRIBE_ALL_FIELD)
        );
        assert!(form.conditions.is_none());
    }

    #[test]
    fn request_link_form_has_fixed_title_and_no_tree() {
        let mut p = profile();
        p.submit_label = Some("Sign up".into());
        let form = request_link_form(&p, &FieldValues::new());
        assert_eq!(form.title, REQUEST_LINK_TITLE);
        assert_eq!(form.submit_label, DEFAULT_SUBMIT_LABEL);
        assert!(form.mailing_lists.is_none());
        assert_eq!(form.fields.len(), 2);
    }
}
