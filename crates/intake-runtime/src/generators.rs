//! Background jobs: document generators, conversation metadata and overview extraction.
//!
//! Document generators always produce their artifact, even for an empty
//! transcript. Metadata generators (title, summary, user memory) do nothing
//! until there is a transcript to work from.

use std::fmt;

use chrono::Utc;
use intake_core::models::{
    Application, Conversation, Document, DocumentType, Message, Metadata, truncate_chars,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::actions;
use crate::assessment::TechnicalAssessment;
use crate::context::WorkflowContext;
use crate::error::{JobError, JobResult};
use crate::llm::{ChatMessage, GenerationRequest};
use crate::overview::extract_overview;
use crate::prompts;

pub const RESEARCH_DOCUMENT_NAME: &str = "Research Alternatives";
pub const NEW_APPLICATION_PRD_NAME: &str = "Product Requirements Document";
pub const FEATURE_PRD_NAME: &str = "Feature Request Document";
pub const TECHNICAL_ASSESSMENT_NAME: &str = "Technical Assessment";

/// Maximum stored title length in characters.
pub const TITLE_MAX_CHARS: usize = 100;

/// A unit of background work.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "job", rename_all = "snake_case")]
pub enum Job {
    Research { conversation_id: Uuid },
    NewApplicationPrd { conversation_id: Uuid },
    TechnicalAssessment { conversation_id: Uuid },
    FeaturePrd { conversation_id: Uuid },
    Title { conversation_id: Uuid },
    Summary { conversation_id: Uuid },
    UserMemory { conversation_id: Uuid },
    ExtractOverview { application_id: Uuid },
}

impl Job {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Research { .. } => "research",
            Self::NewApplicationPrd { .. } => "new_application_prd",
            Self::TechnicalAssessment { .. } => "technical_assessment",
            Self::FeaturePrd { .. } => "feature_prd",
            Self::Title { .. } => "title",
            Self::Summary { .. } => "summary",
            Self::UserMemory { .. } => "user_memory",
            Self::ExtractOverview { .. } => "extract_overview",
        }
    }

    /// The conversation or application the job works on.
    pub fn target(&self) -> Uuid {
        match *self {
            Self::Research { conversation_id }
            | Self::NewApplicationPrd { conversation_id }
            | Self::TechnicalAssessment { conversation_id }
            | Self::FeaturePrd { conversation_id }
            | Self::Title { conversation_id }
            | Self::Summary { conversation_id }
            | Self::UserMemory { conversation_id } => conversation_id,
            Self::ExtractOverview { application_id } => application_id,
        }
    }

    /// Run the job to completion, including its store writes.
    pub async fn run(self, ctx: WorkflowContext) -> JobResult<()> {
        debug!(job = %self, "Job::run: starting");
        match self {
            Self::Research { conversation_id } => {
                generate_research(&ctx, conversation_id).await?;
            }
            Self::NewApplicationPrd { conversation_id } => {
                generate_new_application_prd(&ctx, conversation_id).await?;
            }
            Self::TechnicalAssessment { conversation_id } => {
                generate_technical_assessment(&ctx, conversation_id).await?;
            }
            Self::FeaturePrd { conversation_id } => {
                generate_feature_prd(&ctx, conversation_id).await?;
            }
            Self::Title { conversation_id } => {
                generate_title(&ctx, conversation_id).await?;
            }
            Self::Summary { conversation_id } => {
                generate_summary(&ctx, conversation_id).await?;
            }
            Self::UserMemory { conversation_id } => {
                update_user_memory(&ctx, conversation_id).await?;
            }
            Self::ExtractOverview { application_id } => {
                extract_application_overview(&ctx, application_id).await?;
            }
        }
        Ok(())
    }
}

impl fmt::Display for Job {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.name(), self.target())
    }
}

/// Conversation state a generator works from.
struct Snapshot {
    conversation: Conversation,
    messages: Vec<Message>,
    application: Option<Application>,
}

impl Snapshot {
    async fn load(ctx: &WorkflowContext, conversation_id: Uuid) -> JobResult<Self> {
        let conversation = ctx.conversation(conversation_id).await?;
        let messages = ctx.db.get_messages(conversation_id).await?;
        let application = match conversation.application_id {
            Some(application_id) => Some(ctx.application(application_id).await?),
            None => None,
        };
        Ok(Self {
            conversation,
            messages,
            application,
        })
    }

    fn transcript(&self) -> Vec<ChatMessage> {
        self.messages.iter().map(ChatMessage::from).collect()
    }
}

async fn store_document(
    ctx: &WorkflowContext,
    conversation_id: Uuid,
    document_type: DocumentType,
    name: &str,
    content: String,
    metadata: Option<Metadata>,
) -> JobResult<Document> {
    let mut document = Document::new(conversation_id, document_type, name, content);
    if let Some(metadata) = metadata {
        document = document.with_metadata(metadata);
    }
    Ok(actions::create_document(ctx, document).await?)
}

// ============================================================================
// Document generators
// ============================================================================

/// Existing alternatives to building something new.
pub async fn generate_research(
    ctx: &WorkflowContext,
    conversation_id: Uuid,
) -> JobResult<Document> {
    let snapshot = Snapshot::load(ctx, conversation_id).await?;
    let request = GenerationRequest::new(prompts::RESEARCH, snapshot.transcript());
    let content = ctx.llm.generate(request).await?;
    store_document(
        ctx,
        conversation_id,
        DocumentType::Research,
        RESEARCH_DOCUMENT_NAME,
        content,
        None,
    )
    .await
}

/// PRD for an application that does not exist yet.
pub async fn generate_new_application_prd(
    ctx: &WorkflowContext,
    conversation_id: Uuid,
) -> JobResult<Document> {
    let snapshot = Snapshot::load(ctx, conversation_id).await?;
    let request = GenerationRequest::new(prompts::NEW_APPLICATION_PRD, snapshot.transcript());
    let content = ctx.llm.generate(request).await?;
    store_document(
        ctx,
        conversation_id,
        DocumentType::Prd,
        NEW_APPLICATION_PRD_NAME,
        content,
        None,
    )
    .await
}

/// Feature request PRD against the conversation's application, building on
/// the latest technical assessment when one exists.
pub async fn generate_feature_prd(
    ctx: &WorkflowContext,
    conversation_id: Uuid,
) -> JobResult<Document> {
    let snapshot = Snapshot::load(ctx, conversation_id).await?;
    let assessment = ctx
        .db
        .latest_document_of_type(conversation_id, DocumentType::TechnicalAssessment)
        .await?;

    let prompt = prompts::with_application(prompts::FEATURE_PRD, snapshot.application.as_ref());
    let prompt = prompts::with_assessment(&prompt, assessment.as_ref());
    let request = GenerationRequest::new(prompt, snapshot.transcript());
    let content = ctx.llm.generate(request).await?;
    store_document(
        ctx,
        conversation_id,
        DocumentType::Prd,
        FEATURE_PRD_NAME,
        content,
        None,
    )
    .await
}

/// Structured assessment of the change against the application's codebase.
///
/// Fails with [`JobError::Invariant`] when the conversation has no application.
pub async fn generate_technical_assessment(
    ctx: &WorkflowContext,
    conversation_id: Uuid,
) -> JobResult<Document> {
    let snapshot = Snapshot::load(ctx, conversation_id).await?;
    let Some(application) = snapshot.application.as_ref() else {
        return Err(JobError::Invariant(format!(
            "conversation {conversation_id} has no application to assess"
        )));
    };

    let prompt = prompts::with_application(prompts::TECHNICAL_ASSESSMENT, Some(application));
    let request = GenerationRequest::new(prompt, snapshot.transcript());
    let raw = ctx.llm.generate(request).await?;
    let assessment = TechnicalAssessment::from_model_output(&raw);
    debug!(
        size = ?assessment.size_estimate,
        confidence = assessment.confidence,
        "generate_technical_assessment: parsed"
    );

    let mut metadata = Metadata::new();
    metadata.insert("model".to_string(), ctx.llm.model_name(false).into());
    metadata.insert("prompt_version".to_string(), prompts::PROMPT_VERSION.into());
    metadata.insert("generated_at".to_string(), Utc::now().to_rfc3339().into());
    metadata.insert("application_id".to_string(), application.id.to_string().into());
    metadata.insert(
        "repo_path".to_string(),
        application.usable_repo().map_or(serde_json::Value::Null, Into::into),
    );

    store_document(
        ctx,
        conversation_id,
        DocumentType::TechnicalAssessment,
        TECHNICAL_ASSESSMENT_NAME,
        assessment.to_content().map_err(intake_core::Error::from)?,
        Some(metadata),
    )
    .await
}

// ============================================================================
// Conversation metadata
// ============================================================================

/// Short title from the small model. Generation failures are logged and leave
/// the title unset.
pub async fn generate_title(
    ctx: &WorkflowContext,
    conversation_id: Uuid,
) -> JobResult<Option<String>> {
    let snapshot = Snapshot::load(ctx, conversation_id).await?;
    if snapshot.messages.is_empty() {
        debug!(%conversation_id, "generate_title: no messages, skipping");
        return Ok(None);
    }

    let request = GenerationRequest::new(prompts::TITLE, snapshot.transcript()).small();
    let raw = match ctx.llm.generate(request).await {
        Ok(raw) => raw,
        Err(e) => {
            warn!(%conversation_id, error = %e, "Title generation failed");
            return Ok(None);
        }
    };

    let title = truncate_chars(raw.trim(), TITLE_MAX_CHARS).trim_end().to_string();
    if title.is_empty() {
        return Ok(None);
    }
    ctx.db.set_conversation_title(conversation_id, &title).await?;
    Ok(Some(title))
}

pub async fn generate_summary(
    ctx: &WorkflowContext,
    conversation_id: Uuid,
) -> JobResult<Option<String>> {
    let snapshot = Snapshot::load(ctx, conversation_id).await?;
    if snapshot.messages.is_empty() {
        debug!(%conversation_id, "generate_summary: no messages, skipping");
        return Ok(None);
    }

    let request = GenerationRequest::new(prompts::SUMMARY, snapshot.transcript());
    let summary = ctx.llm.generate(request).await?.trim().to_string();
    ctx.db.set_conversation_summary(conversation_id, &summary).await?;
    Ok(Some(summary))
}

/// Refresh the author's cross-conversation profile. Storage replaces the
/// previous content, so the prior profile is part of the prompt.
pub async fn update_user_memory(
    ctx: &WorkflowContext,
    conversation_id: Uuid,
) -> JobResult<Option<String>> {
    let snapshot = Snapshot::load(ctx, conversation_id).await?;
    if snapshot.messages.is_empty() {
        debug!(%conversation_id, "update_user_memory: no messages, skipping");
        return Ok(None);
    }

    let user_id = snapshot.conversation.user_id;
    let prior = ctx.db.get_user_memory(user_id).await?;
    let prompt = prompts::with_memory(prompts::USER_MEMORY, prior.as_ref());
    let request = GenerationRequest::new(prompt, snapshot.transcript());
    let content = ctx.llm.generate(request).await?.trim().to_string();

    ctx.db.upsert_user_memory(user_id, &content).await?;
    debug!(%user_id, "update_user_memory: stored");
    Ok(Some(content))
}

// ============================================================================
// Applications
// ============================================================================

/// Copy the repository overview into the application. Applications without a
/// usable repository are left untouched.
pub async fn extract_application_overview(
    ctx: &WorkflowContext,
    application_id: Uuid,
) -> JobResult<Option<String>> {
    let application = ctx.application(application_id).await?;
    let Some(repo) = application.usable_repo() else {
        debug!(%application_id, "extract_application_overview: no repository");
        return Ok(None);
    };

    let overview = extract_overview(repo).await.map_err(intake_core::Error::from)?;
    ctx.db.set_application_overview(application_id, &overview).await?;
    info!(application = %application.name, bytes = overview.len(), "Stored application overview");
    Ok(Some(overview))
}

#[cfg(test)]
#[path = "generators_tests.rs"]
mod tests;
