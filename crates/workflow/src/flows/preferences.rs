use shared::{
    domain::{Profile, Subscription},
    protocol::{ConfirmParams, FieldValues},
};
use tracing::info;

use super::{accepted, auto_confirm, fetch_status, need_new_link, redirect_to};
use crate::{
    forms::{preferences_form, selectable_tree},
    selection::{added_ids, diff, FormSubmission},
    settings::RedirectTarget,
    FlowOutcome, FlowResponse, FlowState, Notice, UserMessage, WorkflowContext,
};

/// First visit of the preferences page; may confirm pending subscriptions on the way.
pub async fn load(ctx: &WorkflowContext, profile: &Profile, checksum: &str) -> FlowOutcome {
    let Some(subscription) = fetch_status(ctx, profile, checksum).await else {
        return need_new_link(ctx, profile);
    };

    let mut messages = Vec::new();
    let mut confirmed = None;
    if ctx.settings.preferences_autoconfirm {
        let (outcome, message) = auto_confirm(ctx, profile, &subscription).await;
        confirmed = Some(outcome);
        messages.push(message);
    }

    let form = preferences_form(profile, &ctx.settings, &subscription);
    let outcome = FlowOutcome::finish(
        &ctx.settings,
        FlowState::Rendered,
        messages,
        FlowResponse::Form(form),
    );
    match confirmed {
        Some(confirmed) => outcome.with_auto_confirm(confirmed),
        None => outcome,
    }
}

pub async fn submit(
    ctx: &WorkflowContext,
    profile: &Profile,
    checksum: &str,
    submission: &FormSubmission,
) -> FlowOutcome {
    let Some(subscription) = fetch_status(ctx, profile, checksum).await else {
        return need_new_link(ctx, profile);
    };

    let tree = selectable_tree(profile, &ctx.settings, &subscription.subscription_status);
    let instructions = diff(&submission.selection(), &tree.checkbox_ids());
    let unsubscribe_all = profile
        .mailing_lists_unsubscribe_all
        .then(|| submission.unsubscribe_all());

    // Status as the visitor left it; used whenever the form is shown again.
    let resubmitted = Subscription {
        subscription_status: added_ids(&instructions).into_iter().collect(),
        ..subscription.clone()
    };

    let params = ConfirmParams {
        profile: profile.name.clone(),
        contact_id: subscription.contact.id,
        contact_checksum: subscription.contact.checksum.clone(),
        mailing_lists: Some(instructions),
        unsubscribe_all,
        autoconfirm: false,
        fields: contact_values(profile, &subscription),
    };
    if accepted(ctx.api.confirm(&params).await, profile, "confirm").is_none() {
        return FlowOutcome::finish(
            &ctx.settings,
            FlowState::SubmitRejected,
            vec![UserMessage::new(Notice::PreferencesFailed)],
            FlowResponse::Form(preferences_form(profile, &ctx.settings, &resubmitted)),
        );
    }

    info!(profile = %profile.name, contact = %subscription.contact.id, ?unsubscribe_all, "preferences confirmed");
    let (notice, redirect) = if unsubscribe_all == Some(true) {
        (
            Notice::UnsubscriptionConfirmed,
            redirect_to(&ctx.settings, RedirectTarget::Unsubscribe)
                .or_else(|| redirect_to(&ctx.settings, RedirectTarget::PreferencesForm)),
        )
    } else {
        (
            Notice::PreferencesConfirmed,
            redirect_to(&ctx.settings, RedirectTarget::PreferencesForm),
        )
    };
    let response = redirect.unwrap_or_else(|| {
        FlowResponse::Form(preferences_form(profile, &ctx.settings, &resubmitted))
    });
    FlowOutcome::finish(
        &ctx.settings,
        FlowState::SubmitAccepted,
        vec![UserMessage::new(notice)],
        response,
    )
}

/// Read-only contact values of the profile's active fields, as the backend sent them.
fn contact_values(profile: &Profile, subscription: &Subscription) -> FieldValues {
    profile
        .active_fields()
        .filter_map(|field| {
            let value = subscription.contact.values.get(&field.name)?;
            Some((field.name.clone(), value.clone()))
        })
        .collect()
}
