//! User-facing mutations. Every write here publishes its domain event right
//! after it commits; background jobs use the store directly for silent writes.

use chrono::Utc;
use intake_core::Error;
use intake_core::events::DomainEvent;
use intake_core::models::{
    Application, ApplicationPatch, Conversation, ConversationStatus, Document, Message,
    NewApplication, User,
};
use tracing::info;
use uuid::Uuid;

use crate::context::WorkflowContext;
use crate::error::JobResult;
use crate::llm::{ChatMessage, GenerationRequest};
use crate::prompts;

type Result<T> = intake_core::Result<T>;

// ============================================================================
// Users
// ============================================================================

pub async fn create_user(
    ctx: &WorkflowContext,
    username: &str,
    email: &str,
    is_admin: bool,
) -> Result<User> {
    let user = User::new(username, email, is_admin);
    ctx.db.insert_user(&user).await?;
    info!(user = %user.username, is_admin, "Created user");
    Ok(user)
}

// ============================================================================
// Applications
// ============================================================================

pub async fn create_application(
    ctx: &WorkflowContext,
    input: NewApplication,
) -> Result<Application> {
    let application = Application::from_input(input);
    ctx.db.insert_application(&application).await?;
    info!(
        application = %application.name,
        category = %application.category,
        "Created application"
    );
    ctx.bus.emit(DomainEvent::ApplicationSaved {
        application_id: application.id,
        created: true,
        automated_changed: false,
        is_automated: application.is_automated,
    });
    Ok(application)
}

pub async fn update_application(
    ctx: &WorkflowContext,
    application_id: Uuid,
    patch: ApplicationPatch,
) -> Result<Application> {
    let mut application = ctx.application(application_id).await?;
    let automated_changed = application.apply(patch);
    ctx.db.update_application(&application).await?;
    ctx.bus.emit(DomainEvent::ApplicationSaved {
        application_id,
        created: false,
        automated_changed,
        is_automated: application.is_automated,
    });
    Ok(application)
}

/// Turn a proposed application into an internal one.
pub async fn promote_application(
    ctx: &WorkflowContext,
    application_id: Uuid,
) -> Result<Application> {
    let mut application = ctx.application(application_id).await?;
    application.promote()?;
    ctx.db.update_application(&application).await?;
    info!(application = %application.name, "Promoted application");
    ctx.bus.emit(DomainEvent::ApplicationSaved {
        application_id,
        created: false,
        automated_changed: false,
        is_automated: application.is_automated,
    });
    Ok(application)
}

// ============================================================================
// Conversations
// ============================================================================

pub async fn start_conversation(
    ctx: &WorkflowContext,
    user_id: Uuid,
    application_id: Option<Uuid>,
) -> Result<Conversation> {
    ctx.user(user_id).await?;
    if let Some(application_id) = application_id {
        ctx.application(application_id).await?;
    }
    let conversation = Conversation::new(user_id, application_id);
    ctx.db.insert_conversation(&conversation).await?;
    info!(conversation_id = %conversation.id, %user_id, "Started conversation");
    Ok(conversation)
}

/// Append a message from the conversation's owner.
pub async fn post_user_message(
    ctx: &WorkflowContext,
    conversation_id: Uuid,
    content: &str,
) -> Result<Message> {
    let conversation = ctx.conversation(conversation_id).await?;
    let message = Message::from_user(conversation_id, conversation.user_id, content);
    insert_and_announce(ctx, message).await
}

pub async fn post_assistant_message(
    ctx: &WorkflowContext,
    conversation_id: Uuid,
    content: &str,
) -> Result<Message> {
    ctx.conversation(conversation_id).await?;
    insert_and_announce(ctx, Message::from_assistant(conversation_id, content)).await
}

async fn insert_and_announce(ctx: &WorkflowContext, message: Message) -> Result<Message> {
    ctx.db.insert_message(&message).await?;
    ctx.bus.emit(DomainEvent::MessagePosted {
        message_id: message.id,
        conversation_id: message.conversation_id,
        role: message.role(),
    });
    Ok(message)
}

/// Generate and post the assistant's next turn.
pub async fn reply(ctx: &WorkflowContext, conversation_id: Uuid) -> JobResult<Message> {
    let conversation = ctx.conversation(conversation_id).await?;
    let application = match conversation.application_id {
        Some(application_id) => Some(ctx.application(application_id).await?),
        None => None,
    };
    let memory = ctx.db.get_user_memory(conversation.user_id).await?;
    let transcript: Vec<ChatMessage> = ctx
        .db
        .get_messages(conversation_id)
        .await?
        .iter()
        .map(ChatMessage::from)
        .collect();

    let prompt = prompts::with_application(prompts::REPLY, application.as_ref());
    let prompt = prompts::with_memory(&prompt, memory.as_ref());
    let content = ctx
        .llm
        .generate(GenerationRequest::new(prompt, transcript))
        .await?;
    Ok(post_assistant_message(ctx, conversation_id, content.trim()).await?)
}

/// Mark the requirements phase complete and trigger document generation.
///
/// A conversation can be signed off once; `force` or
/// `workflow.allow_repeat_sign_off` permits repeating it.
pub async fn sign_off(
    ctx: &WorkflowContext,
    conversation_id: Uuid,
    force: bool,
) -> Result<Conversation> {
    let mut conversation = ctx.conversation(conversation_id).await?;
    if conversation.is_signed_off() && !(force || ctx.workflow.allow_repeat_sign_off) {
        return Err(Error::InvalidState(format!(
            "conversation {conversation_id} is already signed off"
        )));
    }

    let now = Utc::now();
    ctx.db
        .set_conversation_signed_off_at(conversation_id, Some(now))
        .await?;
    conversation.signed_off_at = Some(now);
    conversation.updated_at = now;
    info!(%conversation_id, force, "Conversation signed off");

    ctx.bus.emit(DomainEvent::ConversationSignedOff { conversation_id });
    Ok(conversation)
}

pub async fn update_conversation_status(
    ctx: &WorkflowContext,
    conversation_id: Uuid,
    status: ConversationStatus,
) -> Result<Conversation> {
    let mut conversation = ctx.conversation(conversation_id).await?;
    let status_changed = conversation.status != status;
    ctx.db.set_conversation_status(conversation_id, status).await?;
    conversation.status = status;
    conversation.updated_at = Utc::now();

    ctx.bus.emit(DomainEvent::ConversationUpdated {
        conversation_id,
        status_changed,
        new_status: status,
    });
    Ok(conversation)
}

// ============================================================================
// Documents
// ============================================================================

pub async fn create_document(ctx: &WorkflowContext, document: Document) -> Result<Document> {
    ctx.db.insert_document(&document).await?;
    info!(
        document_id = %document.id,
        conversation_id = %document.conversation_id,
        name = %document.name,
        "Created document"
    );
    ctx.bus.emit(DomainEvent::DocumentCreated {
        document_id: document.id,
        conversation_id: document.conversation_id,
        document_type: document.document_type,
    });
    Ok(document)
}

