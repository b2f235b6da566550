use serde::Serialize;
use serde_json::Value;
use shared::domain::{ContactField, ContactFieldType};

pub const EMPTY_OPTION_LABEL: &str = "- None -";

/// Input control used to present a contact field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Widget {
    Select,
    Checkboxes,
    TextField,
    TextArea,
    Checkbox,
    Radios,
}

pub fn widget_for(kind: ContactFieldType, has_options: bool) -> Widget {
    match kind {
        ContactFieldType::Select => Widget::Select,
        ContactFieldType::MultiSelect => Widget::Checkboxes,
        ContactFieldType::Text | ContactFieldType::Unknown => Widget::TextField,
        ContactFieldType::Textarea => Widget::TextArea,
        ContactFieldType::CheckBox if has_options => Widget::Checkboxes,
        ContactFieldType::Radio if has_options => Widget::Radios,
        ContactFieldType::CheckBox | ContactFieldType::Radio => Widget::Checkbox,
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldOption {
    pub value: String,
    pub label: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FieldView {
    pub name: String,
    pub label: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub widget: Widget,
    pub required: bool,
    pub read_only: bool,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub options: Vec<FieldOption>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub empty_option: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_value: Option<Value>,
}

pub fn field_view(field: &ContactField, default_value: Option<Value>, read_only: bool) -> FieldView {
    let has_options = !field.options.is_empty();
    FieldView {
        name: field.name.clone(),
        label: field.label.clone(),
        description: field.description.clone(),
        widget: widget_for(field.kind, has_options),
        required: field.required,
        read_only,
        options: field
            .options
            .iter()
            .map(|(value, label)| FieldOption {
                value: value.clone(),
                label: label.clone(),
            })
            .collect(),
        empty_option: (has_options && !field.required).then(|| EMPTY_OPTION_LABEL.to_string()),
        default_value,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn option_dependent_kinds_fall_back_to_single_checkbox() {
        assert_eq!(widget_for(ContactFieldType::CheckBox, true), Widget::Checkboxes);
        assert_eq!(widget_for(ContactFieldType::CheckBox, false), Widget::Checkbox);
        assert_eq!(widget_for(ContactFieldType::Radio, true), Widget::Radios);
        assert_eq!(widget_for(ContactFieldType::Radio, false), Widget::Checkbox);
        assert_eq!(widget_for(ContactFieldType::MultiSelect, false), Widget::Checkboxes);
        assert_eq!(widget_for(ContactFieldType::Unknown, true), Widget::TextField);
    }

    #[test]
    fn optional_option_lists_get_an_empty_choice() {
        let mut field = ContactField {
            name: "prefix_id".into(),
            kind: ContactFieldType::Select,
            label: "Prefix".into(),
            description: None,
            required: false,
            active: true,
            options: vec![("1".into(), "Ms.".into()), ("3".into(), "Mr.".into())],
        };
        let view = field_view(&field, None, false);
        assert_eq!(view.empty_option.as_deref(), Some(EMPTY_OPTION_LABEL));
        assert_eq!(view.options[1].label, "Mr.");

        field.required = true;
        assert_eq!(field_view(&field, None, true).empty_option, None);
    }
}
