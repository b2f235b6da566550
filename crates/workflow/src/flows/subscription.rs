use std::collections::BTreeSet;

use shared::{domain::Profile, protocol::SubmitParams};
use tracing::info;

use super::{accepted, missing_required, protect, redirect_to, verify_protection};
use crate::{
    forms::{forced_single_list, selectable_tree, subscription_form, Prefill},
    selection::{added_ids, diff, FormSubmission, SelectionMap},
    settings::RedirectTarget,
    FlowOutcome, FlowResponse, FlowState, Notice, UserMessage, WorkflowContext,
};

pub const MAILING_LISTS_FIELD: &str = "mailing_lists";

pub fn load(ctx: &WorkflowContext, profile: &Profile) -> FlowOutcome {
    let form = protect(ctx, subscription_form(profile, &ctx.settings, &Prefill::default()));
    FlowOutcome::finish(
        &ctx.settings,
        FlowState::Rendered,
        Vec::new(),
        FlowResponse::Form(form),
    )
}

/// Subscribes a new contact. Only additions are ever sent.
pub async fn submit(
    ctx: &WorkflowContext,
    profile: &Profile,
    submission: &FormSubmission,
) -> FlowOutcome {
    let fields = submission.field_values(profile.active_fields());
    let (selection, known) = match forced_single_list(profile, &ctx.settings) {
        Some(id) => (SelectionMap::from([(id, true)]), BTreeSet::from([id])),
        None => (
            submission.selection(),
            selectable_tree(profile, &ctx.settings, &BTreeSet::new()).checkbox_ids(),
        ),
    };
    let added = added_ids(&diff(&selection, &known));
    let prefill = Prefill {
        fields: fields.clone(),
        selected: added.iter().copied().collect(),
    };
    let rebuild = |prefill: &Prefill| {
        FlowResponse::Form(protect(ctx, subscription_form(profile, &ctx.settings, prefill)))
    };

    if let Some(rejection) = verify_protection(ctx, profile, submission) {
        return FlowOutcome::finish(
            &ctx.settings,
            FlowState::ValidationRejected,
            vec![rejection],
            rebuild(&prefill),
        );
    }

    let mut problems = missing_required(profile, submission);
    if added.is_empty() {
        problems.push(UserMessage::for_field(
            Notice::SelectMailingList,
            MAILING_LISTS_FIELD,
            Notice::SelectMailingList.text(),
        ));
    }
    if !problems.is_empty() {
        return FlowOutcome::finish(
            &ctx.settings,
            FlowState::ValidationRejected,
            problems,
            rebuild(&prefill),
        );
    }

    let params = SubmitParams {
        profile: profile.name.clone(),
        mailing_lists: added,
        fields,
    };
    if accepted(ctx.api.submit(&params).await, profile, "submit").is_none() {
        return FlowOutcome::finish(
            &ctx.settings,
            FlowState::SubmitRejected,
            vec![UserMessage::new(Notice::SubscriptionFailed)],
            rebuild(&prefill),
        );
    }

    info!(profile = %profile.name, lists = params.mailing_lists.len(), "subscription submitted");
    let response = redirect_to(&ctx.settings, RedirectTarget::SubscriptionForm)
        .unwrap_or_else(|| rebuild(&Prefill::default()));
    FlowOutcome::finish(
        &ctx.settings,
        FlowState::SubmitAccepted,
        vec![UserMessage::new(Notice::Subscribed)],
        response,
    )
}
