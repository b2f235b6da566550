//! The four visitor-facing flows and the steps they share.

use anyhow::Result;
use shared::{
    domain::{Profile, Subscription},
    protocol::ApiReply,
};
use tracing::{info, warn};

use crate::{
    forms::FormView,
    selection::FormSubmission,
    settings::{RedirectTarget, WorkflowSettings},
    AutoConfirmOutcome, FlowOutcome, FlowResponse, FlowState, Notice, Redirect, UserMessage,
    WorkflowContext,
};

pub mod optin;
pub mod preferences;
pub mod request_link;
pub mod subscription;

/// Current subscription state, or `None` when the checksum leads nowhere.
///
/// Blank checksums never reach the backend. Transport failures count as "not found".
pub(crate) async fn fetch_status(
    ctx: &WorkflowContext,
    profile: &Profile,
    checksum: &str,
) -> Option<Subscription> {
    let checksum = checksum.trim();
    if checksum.is_empty() {
        return None;
    }
    match ctx.api.subscription_status(&profile.name, checksum).await {
        Ok(status) => status,
        Err(error) => {
            warn!(profile = %profile.name, %error, "subscription status unavailable");
            None
        }
    }
}

pub(crate) fn need_new_link(ctx: &WorkflowContext, profile: &Profile) -> FlowOutcome {
    FlowOutcome::finish(
        &ctx.settings,
        FlowState::NeedNewLink,
        vec![UserMessage::new(Notice::StatusUnavailable)],
        FlowResponse::Redirect(Redirect::RequestLinkForm {
            profile: profile.name.clone(),
        }),
    )
}

/// Confirms whatever is pending for the contact. Safe to repeat.
pub async fn auto_confirm(
    ctx: &WorkflowContext,
    profile: &Profile,
    subscription: &Subscription,
) -> (AutoConfirmOutcome, UserMessage) {
    let reply = ctx.api.auto_confirm(&profile.name, subscription).await;
    let outcome = match accepted(reply, profile, "auto-confirm") {
        None => AutoConfirmOutcome::Failed,
        Some(reply) if reply.has_values() => AutoConfirmOutcome::Confirmed,
        Some(_) => AutoConfirmOutcome::NothingPending,
    };
    let notice = match outcome {
        AutoConfirmOutcome::Confirmed => Notice::PendingConfirmed,
        AutoConfirmOutcome::NothingPending => Notice::NothingPending,
        AutoConfirmOutcome::Failed => Notice::PendingConfirmFailed,
    };
    info!(profile = %profile.name, contact = %subscription.contact.id, ?outcome, "auto-confirm finished");
    (outcome, UserMessage::new(notice))
}

/// The reply, if the backend accepted the call. Failures are logged, never surfaced verbatim.
pub(crate) fn accepted(reply: Result<ApiReply>, profile: &Profile, step: &str) -> Option<ApiReply> {
    match reply {
        Ok(reply) if reply.is_error => None,
        Ok(reply) => Some(reply),
        Err(error) => {
            warn!(profile = %profile.name, step, %error, "backend call failed");
            None
        }
    }
}

pub(crate) fn redirect_to(settings: &WorkflowSettings, target: RedirectTarget) -> Option<FlowResponse> {
    settings.redirect_paths.get(target).map(|path| {
        FlowResponse::Redirect(Redirect::Path {
            path: path.to_string(),
        })
    })
}

pub(crate) fn protect(ctx: &WorkflowContext, mut form: FormView) -> FormView {
    if let Some(protection) = &ctx.protection {
        protection.protect(&mut form);
    }
    form
}

pub(crate) fn verify_protection(
    ctx: &WorkflowContext,
    profile: &Profile,
    submission: &FormSubmission,
) -> Option<UserMessage> {
    let protection = ctx.protection.as_ref()?;
    let rejection = protection.verify(submission).err()?;
    warn!(profile = %profile.name, %rejection, "submission rejected by form protection");
    Some(UserMessage {
        text: rejection.to_string(),
        ..UserMessage::new(Notice::ProtectionRejected)
    })
}

/// One message per required contact field left blank.
pub(crate) fn missing_required(profile: &Profile, submission: &FormSubmission) -> Vec<UserMessage> {
    profile
        .active_fields()
        .filter(|field| field.required && submission.is_blank(&field.name))
        .map(|field| {
            let label = if field.label.is_empty() { &field.name } else { &field.label };
            UserMessage::for_field(
                Notice::RequiredField,
                field.name.clone(),
                format!("{label} field is required."),
            )
        })
        .collect()
}
