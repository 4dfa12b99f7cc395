//! Reactions to conversation, application and document changes.

use intake_core::models::{
    Application, ApplicationCategory, ConversationStatus, NewApplication, NewNotification,
    proposed_application_name,
};
use tracing::{debug, info};
use uuid::Uuid;

use crate::actions;
use crate::context::WorkflowContext;
use crate::error::JobResult;
use crate::generators::Job;
use crate::notifier::notify_admins;

/// Create a proposed application when a conversation without one is approved.
///
/// Fires only when the update changed the status to `Approved` and the
/// conversation still has no application. `new_status` is the status the
/// update wrote, not the row's current one. The conversation is then linked to
/// the new application with a silent write.
pub async fn on_conversation_updated(
    ctx: &WorkflowContext,
    conversation_id: Uuid,
    status_changed: bool,
    new_status: ConversationStatus,
) -> JobResult<Option<Application>> {
    if !status_changed || new_status != ConversationStatus::Approved {
        return Ok(None);
    }

    let conversation = ctx.conversation(conversation_id).await?;
    if conversation.application_id.is_some() {
        debug!(%conversation_id, "on_conversation_updated: already linked");
        return Ok(None);
    }

    let first_message = ctx.db.first_user_message(conversation_id).await?;
    let mut input = NewApplication::new(
        ApplicationCategory::Proposed,
        proposed_application_name(first_message.as_ref()),
    );
    input.source_conversation_id = Some(conversation_id);

    let application = actions::create_application(ctx, input).await?;
    ctx.db
        .set_conversation_application(conversation_id, application.id)
        .await?;
    info!(
        %conversation_id,
        application = %application.name,
        "Proposed application from approved conversation"
    );

    notify_admins(ctx, &NewNotification::proposed_application(&application)).await;
    Ok(Some(application))
}

/// Extract the repository overview when a save created an automated
/// application or switched automation on.
pub async fn on_application_saved(
    ctx: &WorkflowContext,
    application_id: Uuid,
    created: bool,
    automated_changed: bool,
    is_automated: bool,
) -> JobResult<bool> {
    if !is_automated || !(created || automated_changed) {
        debug!(%application_id, "on_application_saved: no extraction needed");
        return Ok(false);
    }

    Job::ExtractOverview { application_id }.run(ctx.clone()).await?;
    Ok(true)
}

/// Tell every admin about a new document.
pub async fn on_document_created(ctx: &WorkflowContext, document_id: Uuid) -> JobResult<usize> {
    let document = ctx.document(document_id).await?;
    Ok(notify_admins(ctx, &NewNotification::document_created(&document)).await)
}

#[cfg(test)]
#[path = "observers_tests.rs"]
mod tests;
