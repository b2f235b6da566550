use std::sync::Arc;

use gateway::NewsletterApi;
use serde::Serialize;

pub mod fields;
pub mod flows;
pub mod forms;
pub mod permissions;
pub mod protection;
pub mod selection;
pub mod settings;
pub mod tree;

use forms::FormView;
use protection::FormProtection;
use settings::WorkflowSettings;

/// Everything a flow needs besides the profile and the visitor's input.
#[derive(Clone)]
pub struct WorkflowContext {
    pub api: NewsletterApi,
    pub settings: WorkflowSettings,
    pub protection: Option<Arc<dyn FormProtection>>,
}

impl WorkflowContext {
    pub fn new(api: NewsletterApi, settings: WorkflowSettings) -> Self {
        Self {
            api,
            settings,
            protection: None,
        }
    }

    pub fn with_protection(mut self, protection: Arc<dyn FormProtection>) -> Self {
        self.protection = Some(protection);
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AutoConfirmOutcome {
    Confirmed,
    NothingPending,
    Failed,
}

/// Where a flow ended up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FlowState {
    NeedNewLink,
    AutoConfirm(AutoConfirmOutcome),
    Rendered,
    SubmitAccepted,
    SubmitRejected,
    ValidationRejected,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageLevel {
    Status,
    Warning,
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Notice {
    StatusUnavailable,
    PendingConfirmFailed,
    PendingConfirmed,
    NothingPending,
    PreferencesFailed,
    PreferencesConfirmed,
    UnsubscriptionConfirmed,
    SubscriptionFailed,
    Subscribed,
    RequestFailed,
    LinkRequested,
    SelectMailingList,
    RequiredField,
    ProtectionRejected,
}

impl Notice {
    pub fn level(self) -> MessageLevel {
        match self {
            Notice::StatusUnavailable => MessageLevel::Warning,
            Notice::PendingConfirmFailed
            | Notice::PreferencesFailed
            | Notice::SubscriptionFailed
            | Notice::RequestFailed
            | Notice::SelectMailingList
            | Notice::RequiredField
            | Notice::ProtectionRejected => MessageLevel::Error,
            Notice::PendingConfirmed
            | Notice::NothingPending
            | Notice::PreferencesConfirmed
            | Notice::UnsubscriptionConfirmed
            | Notice::Subscribed
            | Notice::LinkRequested => MessageLevel::Status,
        }
    }

    /// Fixed wording; field-scoped notices build their text at the call site.
    pub fn text(self) -> &'static str {
        match self {
            Notice::StatusUnavailable => "Could not retrieve the newsletter subscription status. Please request a new confirmation link.",
            Notice::PendingConfirmFailed => "Your confirmation of pending subscriptions could not be submitted, please try again later.",
            Notice::PendingConfirmed => "Your confirmation of pending subscriptions has been successfully submitted. You will receive an e-mail with a summary of your subscriptions.",
            Notice::NothingPending => "Your confirmation of pending subscriptions has been successfully submitted, but no subscriptions were pending to be confirmed.",
            Notice::PreferencesFailed => "Your confirmation could not be submitted, please try again later.",
            Notice::PreferencesConfirmed => "Your confirmation has been successfully submitted. You will receive an e-mail with a summary of your subscriptions.",
            Notice::UnsubscriptionConfirmed => "Your unsubscription has been successfully submitted. You will receive an e-mail with a confirmation.",
            Notice::SubscriptionFailed => "Your subscription could not be submitted, please try again later.",
            Notice::Subscribed => "Your subscription has been successfully submitted. You will receive an e-mail with a link to a confirmation page. Your subscription will not be active until you confirm it.",
            Notice::RequestFailed => "Your request could not be submitted, please try again later.",
            Notice::LinkRequested => "Your request has been successfully submitted. You will receive an e-mail with a link to a confirmation page.",
            Notice::SelectMailingList => "Please select at least one mailing list to subscribe to.",
            Notice::RequiredField => "This field is required.",
            Notice::ProtectionRejected => "There was a problem with your form submission.",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UserMessage {
    pub level: MessageLevel,
    pub notice: Notice,
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
}

impl UserMessage {
    pub fn new(notice: Notice) -> Self {
        Self {
            level: notice.level(),
            notice,
            text: notice.text().to_string(),
            field: None,
        }
    }

    pub fn for_field(notice: Notice, field: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            level: notice.level(),
            notice,
            text: text.into(),
            field: Some(field.into()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "target", rename_all = "snake_case")]
pub enum Redirect {
    /// Back to the profile's request-link form.
    RequestLinkForm { profile: String },
    /// A configured path or absolute URL.
    Path { path: String },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", content = "data", rename_all = "snake_case")]
pub enum FlowResponse {
    Form(FormView),
    Redirect(Redirect),
    /// Nothing to show besides the messages.
    Page,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FlowOutcome {
    pub state: FlowState,
    pub messages: Vec<UserMessage>,
    pub response: FlowResponse,
    /// Result of the auto-confirm step, when the flow ran one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auto_confirm: Option<AutoConfirmOutcome>,
}

impl FlowOutcome {
    /// Assembles the outcome, dropping status messages on redirects when configured to.
    pub(crate) fn finish(
        settings: &WorkflowSettings,
        state: FlowState,
        mut messages: Vec<UserMessage>,
        response: FlowResponse,
    ) -> Self {
        if settings.redirect_disable_messages && matches!(response, FlowResponse::Redirect(_)) {
            messages.retain(|message| message.level != MessageLevel::Status);
        }
        Self {
            state,
            messages,
            response,
            auto_confirm: None,
        }
    }

    pub(crate) fn with_auto_confirm(mut self, outcome: AutoConfirmOutcome) -> Self {
        self.auto_confirm = Some(outcome);
        self
    }

    pub fn redirect(&self) -> Option<&Redirect> {
        match &self.response {
            FlowResponse::Redirect(redirect) => Some(redirect),
            _ => None,
        }
    }

    pub fn form(&self) -> Option<&FormView> {
        match &self.response {
            FlowResponse::Form(form) => Some(form),
            _ => None,
        }
    }

    pub fn has_notice(&self, notice: Notice) -> bool {
        self.messages.iter().any(|message| message.notice == notice)
    }
}

#[cfg(test)]
#[path = "tests/flow_tests.rs"]
mod tests;
