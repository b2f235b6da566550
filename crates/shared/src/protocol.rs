use std::collections::BTreeMap;

use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::Value;

use crate::{
    domain::{ContactId, GroupId, Subscription},
    wire,
};

pub const PROFILE_ENTITY: &str = "NewsletterProfile";
pub const SUBSCRIPTION_ENTITY: &str = "NewsletterSubscription";

/// Desired membership change for one group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Instruction {
    Added,
    Removed,
}

pub type InstructionSet = BTreeMap<GroupId, Instruction>;

/// Contact field values forwarded verbatim to the backend.
pub type FieldValues = BTreeMap<String, Value>;

/// Reply envelope shared by every backend call.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ApiReply {
    #[serde(
        default,
        deserialize_with = "wire::flag",
        serialize_with = "wire::serialize_flag"
    )]
    pub is_error: bool,
    #[serde(
        default,
        deserialize_with = "wire::optional_text",
        skip_serializing_if = "Option::is_none"
    )]
    pub error_message: Option<String>,
    #[serde(default)]
    pub values: Value,
}

impl ApiReply {
    pub fn success(values: Value) -> Self {
        Self {
            is_error: false,
            error_message: None,
            values,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            is_error: true,
            error_message: Some(message.into()),
            values: Value::Null,
        }
    }

    /// Whether the call had an effect, using the backend's notion of emptiness.
    pub fn has_values(&self) -> bool {
        match &self.values {
            Value::Null => false,
            Value::Bool(flag) => *flag,
            Value::Number(number) => number.as_f64().is_some_and(|n| n != 0.0),
            Value::String(text) => wire::is_truthy(text),
            Value::Array(items) => !items.is_empty(),
            Value::Object(entries) => !entries.is_empty(),
        }
    }

    /// Decodes the first entry of `values`, whether it is a list or a keyed object.
    pub fn first_value<T: DeserializeOwned>(&self) -> Result<Option<T>, serde_json::Error> {
        let first = match &self.values {
            Value::Array(items) => items.first(),
            Value::Object(entries) => entries.values().next(),
            _ => None,
        };
        first.cloned().map(serde_json::from_value).transpose()
    }
}

/// Parameters of `NewsletterSubscription.get`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusParams {
    pub profile: String,
    pub contact_checksum: String,
}

/// Parameters of `NewsletterSubscription.submit`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SubmitParams {
    pub profile: String,
    pub mailing_lists: Vec<GroupId>,
    #[serde(flatten)]
    pub fields: FieldValues,
}

/// Parameters of `NewsletterSubscription.confirm`, with or without auto-confirmation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConfirmParams {
    pub profile: String,
    pub contact_id: ContactId,
    pub contact_checksum: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mailing_lists: Option<InstructionSet>,
    #[serde(
        skip_serializing_if = "Option::is_none",
        serialize_with = "wire::serialize_optional_flag"
    )]
    pub unsubscribe_all: Option<bool>,
    #[serde(
        skip_serializing_if = "std::ops::Not::not",
        serialize_with = "wire::serialize_flag"
    )]
    pub autoconfirm: bool,
    #[serde(flatten)]
    pub fields: FieldValues,
}

impl ConfirmParams {
    /// Confirms every pending subscription of the contact without changing selections.
    pub fn auto_confirm(profile: impl Into<String>, subscription: &Subscription) -> Self {
        Self {
            profile: profile.into(),
            contact_id: subscription.contact.id,
            contact_checksum: subscription.contact.checksum.clone(),
            mailing_lists: None,
            unsubscribe_all: None,
            autoconfirm: true,
            fields: FieldValues::new(),
        }
    }
}

/// Parameters of `NewsletterSubscription.request`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RequestParams {
    pub profile: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub contact_checksum: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub contact_id: Option<ContactId>,
    #[serde(flatten)]
    pub fields: FieldValues,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Contact;
    use serde_json::json;

    #[test]
    fn reply_emptiness_matches_backend_semantics() {
        let reply: ApiReply =
            serde_json::from_value(json!({ "is_error": 0, "values": [] })).expect("reply");
        assert!(!reply.is_error);
        assert!(!reply.has_values());

        let reply: ApiReply =
            serde_json::from_value(json!({ "is_error": "1", "error_message": "boom" }))
                .expect("reply");
        assert!(reply.is_error);
        assert_eq!(reply.error_message.as_deref(), Some("boom"));

        assert!(ApiReply::success(json!({ "4": { "id": 4 } })).has_values());
        assert!(!ApiReply::success(json!("0")).has_values());
    }

    #[test]
    fn first_value_reads_lists_and_keyed_objects() {
        let keyed = ApiReply::success(json!({ "17": { "contact": { "id": 17 } } }));
        let subscription: Subscription = keyed.first_value().expect("decode").expect("present");
        assert_eq!(subscription.contact.id, ContactId(17));

        let empty = ApiReply::success(json!([]));
        assert!(empty.first_value::<Subscription>().expect("decode").is_none());
    }

    #[test]
    fn confirm_params_serialize_instructions_and_flags() {
        let subscription = Subscription {
            contact: Contact {
                id: ContactId(8),
                checksum: "cs".into(),
                values: BTreeMap::new(),
            },
            subscription_status: Default::default(),
        };
        let auto = serde_json::to_value(ConfirmParams::auto_confirm("default", &subscription))
            .expect("json");
        assert_eq!(
            auto,
            json!({ "profile": "default", "contact_id": 8, "contact_checksum": "cs", "autoconfirm": 1 })
        );

        let mut params = ConfirmParams::auto_confirm("default", &subscription);
        params.autoconfirm = false;
        params.unsubscribe_all = Some(true);
        params.mailing_lists = Some(InstructionSet::from([
            (GroupId(1), Instruction::Added),
            (GroupId(2), Instruction::Removed),
        ]));
        let value = serde_json::to_value(params).expect("json");
        assert_eq!(value["mailing_lists"], json!({ "1": "Added", "2": "Removed" }));
        assert_eq!(value["unsubscribe_all"], json!(1));
        assert!(value.get("autoconfirm").is_none());
    }
}
