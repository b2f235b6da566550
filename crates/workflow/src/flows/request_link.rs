use shared::{
    domain::Profile,
    protocol::{FieldValues, RequestParams},
};
use tracing::info;

use super::{accepted, fetch_status, missing_required, need_new_link, protect, redirect_to, verify_protection};
use crate::{
    forms::request_link_form,
    selection::FormSubmission,
    settings::RedirectTarget,
    FlowOutcome, FlowResponse, FlowState, Notice, UserMessage, WorkflowContext,
};

/// Re-sends the confirmation link for a known contact without showing a form.
pub async fn with_checksum(ctx: &WorkflowContext, profile: &Profile, checksum: &str) -> FlowOutcome {
    let Some(subscription) = fetch_status(ctx, profile, checksum).await else {
        return need_new_link(ctx, profile);
    };

    let params = RequestParams {
        profile: profile.name.clone(),
        contact_checksum: Some(subscription.contact.checksum.clone()),
        contact_id: Some(subscription.contact.id),
        fields: FieldValues::new(),
    };
    let (state, notice) = match accepted(ctx.api.request(&params).await, profile, "request") {
        Some(_) => {
            info!(profile = %profile.name, contact = %subscription.contact.id, "confirmation link requested");
            (FlowState::SubmitAccepted, Notice::LinkRequested)
        }
        None => (FlowState::SubmitRejected, Notice::RequestFailed),
    };
    FlowOutcome::finish(
        &ctx.settings,
        state,
        vec![UserMessage::new(notice)],
        FlowResponse::Page,
    )
}

pub fn load(ctx: &WorkflowContext, profile: &Profile) -> FlowOutcome {
    let form = protect(ctx, request_link_form(profile, &FieldValues::new()));
    FlowOutcome::finish(
        &ctx.settings,
        FlowState::Rendered,
        Vec::new(),
        FlowResponse::Form(form),
    )
}

pub async fn submit(
    ctx: &WorkflowContext,
    profile: &Profile,
    submission: &FormSubmission,
) -> FlowOutcome {
    let fields = submission.field_values(profile.active_fields());
    let rebuild =
        |prefill: &FieldValues| FlowResponse::Form(protect(ctx, request_link_form(profile, prefill)));

    if let Some(rejection) = verify_protection(ctx, profile, submission) {
        return FlowOutcome::finish(
            &ctx.settings,
            FlowState::ValidationRejected,
            vec![rejection],
            rebuild(&fields),
        );
    }
    let problems = missing_required(profile, submission);
    if !problems.is_empty() {
        return FlowOutcome::finish(
            &ctx.settings,
            FlowState::ValidationRejected,
            problems,
            rebuild(&fields),
        );
    }

    let params = RequestParams {
        profile: profile.name.clone(),
        contact_checksum: None,
        contact_id: None,
        fields: fields.clone(),
    };
    if accepted(ctx.api.request(&params).await, profile, "request").is_none() {
        return FlowOutcome::finish(
            &ctx.settings,
            FlowState::SubmitRejected,
            vec![UserMessage::new(Notice::RequestFailed)],
            rebuild(&fields),
        );
    }

    info!(profile = %profile.name, "confirmation link requested");
    let response = redirect_to(&ctx.settings, RedirectTarget::RequestLinkForm)
        .unwrap_or_else(|| rebuild(&FieldValues::new()));
    FlowOutcome::finish(
        &ctx.settings,
        FlowState::SubmitAccepted,
        vec![UserMessage::new(Notice::LinkRequested)],
        response,
    )
}
