use shared::domain::Profile;

use super::{auto_confirm, fetch_status, need_new_link, redirect_to};
use crate::{settings::RedirectTarget, FlowOutcome, FlowResponse, FlowState, WorkflowContext};

/// Confirms pending subscriptions behind a confirmation link. Takes no other input.
pub async fn run(ctx: &WorkflowContext, profile: &Profile, checksum: &str) -> FlowOutcome {
    let Some(subscription) = fetch_status(ctx, profile, checksum).await else {
        return need_new_link(ctx, profile);
    };

    let (outcome, message) = auto_confirm(ctx, profile, &subscription).await;
    let response =
        redirect_to(&ctx.settings, RedirectTarget::OptinPage).unwrap_or(FlowResponse::Page);
    FlowOutcome::finish(
        &ctx.settings,
        FlowState::AutoConfirm(outcome),
        vec![message],
        response,
    )
    .with_auto_confirm(outcome)
}
