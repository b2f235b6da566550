use std::{
    collections::{BTreeMap, BTreeSet},
    fmt,
    num::ParseIntError,
    str::FromStr,
};

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::wire::{self, Keyed};

macro_rules! id_newtype {
    ($name:ident) => {
        #[derive(
            Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize,
        )]
        #[serde(transparent)]
        pub struct $name(pub i64);

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                wire::lenient_id(deserializer).map($name)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl FromStr for $name {
            type Err = ParseIntError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                s.trim().parse().map($name)
            }
        }
    };
}

id_newtype!(GroupId);
id_newtype!(ContactId);

/// Contact field kinds as named by the backend's HTML type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ContactFieldType {
    Select,
    #[serde(rename = "Multi-Select")]
    MultiSelect,
    Text,
    #[serde(rename = "TextArea", alias = "Textarea")]
    Textarea,
    CheckBox,
    Radio,
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContactField {
    #[serde(default, deserialize_with = "wire::text")]
    pub name: String,
    #[serde(rename = "type")]
    pub kind: ContactFieldType,
    #[serde(default, deserialize_with = "wire::text")]
    pub label: String,
    #[serde(default, deserialize_with = "wire::optional_text")]
    pub description: Option<String>,
    #[serde(default, deserialize_with = "wire::flag")]
    pub required: bool,
    #[serde(default = "active_by_default", deserialize_with = "wire::flag")]
    pub active: bool,
    #[serde(default, deserialize_with = "wire::option_list")]
    pub options: Vec<(String, String)>,
}

fn active_by_default() -> bool {
    true
}

impl Keyed for ContactField {
    type Key = String;

    fn with_key(mut self, key: String) -> Self {
        self.name = key;
        self
    }
}

/// One node of the mailing list hierarchy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupNode {
    #[serde(default)]
    pub id: GroupId,
    #[serde(default, deserialize_with = "wire::text")]
    pub name: String,
    #[serde(default, deserialize_with = "wire::text")]
    pub title: String,
    #[serde(default, deserialize_with = "wire::optional_text")]
    pub description: Option<String>,
    #[serde(default, deserialize_with = "wire::keyed_list")]
    pub children: Vec<GroupNode>,
}

impl GroupNode {
    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }
}

impl Keyed for GroupNode {
    type Key = GroupId;

    fn with_key(mut self, key: GroupId) -> Self {
        self.id = key;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "GroupMetaRepr")]
pub struct GroupMeta {
    pub name: Option<String>,
    pub title: String,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum GroupMetaRepr {
    Title(String),
    Detailed {
        #[serde(default)]
        name: Option<String>,
        #[serde(default)]
        title: Option<String>,
    },
}

impl From<GroupMetaRepr> for GroupMeta {
    fn from(repr: GroupMetaRepr) -> Self {
        match repr {
            GroupMetaRepr::Title(title) => Self { name: None, title },
            GroupMetaRepr::Detailed { name, title } => Self {
                title: title.or_else(|| name.clone()).unwrap_or_default(),
                name,
            },
        }
    }
}

/// Configuration of one newsletter program as served by the backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    #[serde(default, deserialize_with = "wire::text")]
    pub name: String,
    #[serde(default, deserialize_with = "wire::text")]
    pub form_title: String,
    #[serde(default, deserialize_with = "wire::optional_text")]
    pub submit_label: Option<String>,
    #[serde(default, deserialize_with = "wire::keyed_list")]
    pub contact_fields: Vec<ContactField>,
    #[serde(default, deserialize_with = "wire::map_or_empty")]
    pub mailing_lists: BTreeMap<GroupId, GroupMeta>,
    #[serde(default, deserialize_with = "wire::keyed_list")]
    pub mailing_lists_tree: Vec<GroupNode>,
    #[serde(default, deserialize_with = "wire::optional_text")]
    pub mailing_lists_label: Option<String>,
    #[serde(default, deserialize_with = "wire::optional_text")]
    pub mailing_lists_description: Option<String>,
    #[serde(default, deserialize_with = "wire::flag")]
    pub mailing_lists_unsubscribe_all: bool,
    #[serde(default, deserialize_with = "wire::optional_text")]
    pub mailing_lists_unsubscribe_all_label: Option<String>,
    #[serde(default, deserialize_with = "wire::optional_text")]
    pub mailing_lists_unsubscribe_all_submit_label: Option<String>,
    #[serde(default, deserialize_with = "wire::optional_text")]
    pub mailing_lists_unsubscribe_all_description: Option<String>,
    #[serde(default, deserialize_with = "wire::optional_text")]
    pub conditions_public: Option<String>,
    #[serde(default, deserialize_with = "wire::optional_text")]
    pub conditions_public_label: Option<String>,
    #[serde(default, deserialize_with = "wire::optional_text")]
    pub conditions_public_description: Option<String>,
    #[serde(default, deserialize_with = "wire::optional_text")]
    pub conditions_preferences: Option<String>,
    #[serde(default, deserialize_with = "wire::optional_text")]
    pub conditions_preferences_label: Option<String>,
    #[serde(default, deserialize_with = "wire::optional_text")]
    pub conditions_preferences_description: Option<String>,
}

impl Profile {
    pub fn active_fields(&self) -> impl Iterator<Item = &ContactField> {
        self.contact_fields.iter().filter(|field| field.active)
    }

    /// The sole mailing list, if the profile offers exactly one.
    pub fn single_mailing_list(&self) -> Option<GroupId> {
        match self.mailing_lists.len() {
            1 => self.mailing_lists.keys().next().copied(),
            _ => None,
        }
    }
}

impl Keyed for Profile {
    type Key = String;

    fn with_key(mut self, key: String) -> Self {
        if self.name.is_empty() {
            self.name = key;
        }
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Contact {
    pub id: ContactId,
    #[serde(default, deserialize_with = "wire::text")]
    pub checksum: String,
    #[serde(flatten)]
    pub values: BTreeMap<String, Value>,
}

/// Snapshot of a contact's subscriptions within one profile.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Subscription {
    pub contact: Contact,
    #[serde(default, deserialize_with = "wire::id_set")]
    pub subscription_status: BTreeSet<GroupId>,
}
