//! Domain models for the requirements-gathering workflow.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Error, Result};

/// Maximum length of an auto-proposed application name, in characters.
pub const PROPOSED_NAME_MAX_CHARS: usize = 50;

/// Name used when a proposed application has no user message to derive from.
pub const PROPOSED_NAME_FALLBACK: &str = "New Application Proposal";

/// Free-form key/value map attached to documents.
pub type Metadata = BTreeMap<String, serde_json::Value>;

/// A person using the system. Admins receive workflow notifications.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct User {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    pub is_admin: bool,
    pub created_at: DateTime<Utc>,
}

impl User {
    pub fn new(username: impl Into<String>, email: impl Into<String>, is_admin: bool) -> Self {
        Self {
            id: Uuid::new_v4(),
            username: username.into(),
            email: email.into(),
            is_admin,
            created_at: Utc::now(),
        }
    }
}

/// LLM-maintained running summary of a user. One row per user.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct UserMemory {
    pub id: Uuid,
    pub user_id: Uuid,
    pub memory_content: String,
    pub updated_at: DateTime<Utc>,
}

/// Where an application lives relative to the organisation.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ApplicationCategory {
    Internal,
    External,
    Proposed,
}

impl ApplicationCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Internal => "internal",
            Self::External => "external",
            Self::Proposed => "proposed",
        }
    }
}

impl fmt::Display for ApplicationCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ApplicationCategory {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "internal" => Ok(Self::Internal),
            "external" => Ok(Self::External),
            "proposed" => Ok(Self::Proposed),
            other => Err(Error::Other(format!("unknown application category '{other}'"))),
        }
    }
}

/// An application known to the organisation, or one proposed by a conversation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Application {
    pub id: Uuid,
    pub category: ApplicationCategory,
    pub name: String,
    pub short_description: Option<String>,
    pub overview: Option<String>,
    pub is_automated: bool,
    pub status: Option<String>,
    pub url: Option<String>,
    pub repo: Option<String>,
    pub source_conversation_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Application {
    /// Build an application from creation input.
    pub fn from_input(input: NewApplication) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            category: input.category,
            name: input.name,
            short_description: input.short_description,
            overview: input.overview,
            is_automated: input.is_automated,
            status: input.status,
            url: input.url,
            repo: input.repo,
            source_conversation_id: input.source_conversation_id,
            created_at: now,
            updated_at: now,
        }
    }

    /// The repository URI, if it is set and non-empty.
    pub fn usable_repo(&self) -> Option<&str> {
        self.repo.as_deref().filter(|repo| !repo.is_empty())
    }

    /// Promote a proposed application to an internal one.
    ///
    /// Only `Proposed` applications can be promoted and the change is one-way.
    pub fn promote(&mut self) -> Result<()> {
        if self.category != ApplicationCategory::Proposed {
            return Err(Error::InvalidState(format!(
                "application {} is {}, only proposed applications can be promoted",
                self.id, self.category
            )));
        }
        self.category = ApplicationCategory::Internal;
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Apply a partial update, returning whether `is_automated` changed.
    pub fn apply(&mut self, patch: ApplicationPatch) -> bool {
        let was_automated = self.is_automated;
        if let Some(name) = patch.name {
            self.name = name;
        }
        if let Some(short_description) = patch.short_description {
            self.short_description = Some(short_description);
        }
        if let Some(overview) = patch.overview {
            self.overview = Some(overview);
        }
        if let Some(is_automated) = patch.is_automated {
            self.is_automated = is_automated;
        }
        if let Some(status) = patch.status {
            self.status = Some(status);
        }
        if let Some(url) = patch.url {
            self.url = Some(url);
        }
        if let Some(repo) = patch.repo {
            self.repo = Some(repo);
        }
        self.updated_at = Utc::now();
        was_automated != self.is_automated
    }
}

/// Input for creating an application.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewApplication {
    pub category: ApplicationCategory,
    pub name: String,
    #[serde(default)]
    pub short_description: Option<String>,
    #[serde(default)]
    pub overview: Option<String>,
    #[serde(default)]
    pub is_automated: bool,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub repo: Option<String>,
    #[serde(default)]
    pub source_conversation_id: Option<Uuid>,
}

impl NewApplication {
    pub fn new(category: ApplicationCategory, name: impl Into<String>) -> Self {
        Self {
            category,
            name: name.into(),
            short_description: None,
            overview: None,
            is_automated: false,
            status: None,
            url: None,
            repo: None,
            source_conversation_id: None,
        }
    }
}

/// Partial update for an application. `None` leaves a field untouched.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ApplicationPatch {
    pub name: Option<String>,
    pub short_description: Option<String>,
    pub overview: Option<String>,
    pub is_automated: Option<bool>,
    pub status: Option<String>,
    pub url: Option<String>,
    pub repo: Option<String>,
}

/// Lifecycle of a requirements conversation.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ConversationStatus {
    Pending,
    InReview,
    Approved,
    Rejected,
    Completed,
}

impl ConversationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::InReview => "in_review",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
            Self::Completed => "completed",
        }
    }
}

impl fmt::Display for ConversationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ConversationStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "pending" => Ok(Self::Pending),
            "in_review" | "inreview" => Ok(Self::InReview),
            "approved" => Ok(Self::Approved),
            "rejected" => Ok(Self::Rejected),
            "completed" => Ok(Self::Completed),
            other => Err(Error::Other(format!("unknown conversation status '{other}'"))),
        }
    }
}

/// A requirements conversation between a user and the assistant.
///
/// `application_id` is `None` for new-application requests and set for
/// feature requests against an existing application.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Conversation {
    pub id: Uuid,
    pub user_id: Uuid,
    pub application_id: Option<Uuid>,
    pub status: ConversationStatus,
    pub signed_off_at: Option<DateTime<Utc>>,
    pub title: Option<String>,
    pub summary: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Conversation {
    pub fn new(user_id: Uuid, application_id: Option<Uuid>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            user_id,
            application_id,
            status: ConversationStatus::Pending,
            signed_off_at: None,
            title: None,
            summary: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_signed_off(&self) -> bool {
        self.signed_off_at.is_some()
    }

    /// Whether this conversation describes a brand new application.
    pub fn is_new_application(&self) -> bool {
        self.application_id.is_none()
    }
}

/// Who authored a message.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    User,
    Assistant,
}

impl fmt::Display for MessageRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MessageRole::User => write!(f, "user"),
            MessageRole::Assistant => write!(f, "assistant"),
        }
    }
}

/// A message within a conversation. A missing `user_id` marks an assistant message.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Message {
    pub id: Uuid,
    pub conversation_id: Uuid,
    pub user_id: Option<Uuid>,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

impl Message {
    pub fn from_user(conversation_id: Uuid, user_id: Uuid, content: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            conversation_id,
            user_id: Some(user_id),
            content: content.into(),
            created_at: Utc::now(),
        }
    }

    pub fn from_assistant(conversation_id: Uuid, content: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            conversation_id,
            user_id: None,
            content: content.into(),
            created_at: Utc::now(),
        }
    }

    pub fn role(&self) -> MessageRole {
        if self.user_id.is_some() {
            MessageRole::User
        } else {
            MessageRole::Assistant
        }
    }
}

/// Kind of generated document.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum DocumentType {
    Prd,
    TechnicalAssessment,
    Research,
}

impl DocumentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Prd => "prd",
            Self::TechnicalAssessment => "technical_assessment",
            Self::Research => "research",
        }
    }
}

impl fmt::Display for DocumentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DocumentType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "prd" => Ok(Self::Prd),
            "technical_assessment" => Ok(Self::TechnicalAssessment),
            "research" => Ok(Self::Research),
            other => Err(Error::Other(format!("unknown document type '{other}'"))),
        }
    }
}

/// A generated artifact. Documents are never updated after creation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Document {
    pub id: Uuid,
    pub conversation_id: Uuid,
    #[serde(rename = "type")]
    pub document_type: DocumentType,
    pub name: String,
    pub content: String,
    pub metadata: Option<Metadata>,
    pub created_at: DateTime<Utc>,
}

impl Document {
    pub fn new(
        conversation_id: Uuid,
        document_type: DocumentType,
        name: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            conversation_id,
            document_type,
            name: name.into(),
            content: content.into(),
            metadata: None,
            created_at: Utc::now(),
        }
    }

    #[must_use]
    pub fn with_metadata(mut self, metadata: Metadata) -> Self {
        self.metadata = Some(metadata);
        self
    }
}

/// What an admin notification is about.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    DocumentCreated,
    ProposedApplication,
}

impl NotificationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::DocumentCreated => "document_created",
            Self::ProposedApplication => "proposed_application",
        }
    }
}

impl fmt::Display for NotificationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for NotificationKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "document_created" => Ok(Self::DocumentCreated),
            "proposed_application" => Ok(Self::ProposedApplication),
            other => Err(Error::Other(format!("unknown notification kind '{other}'"))),
        }
    }
}

/// Notification content before it is delivered to a user.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NewNotification {
    pub kind: NotificationKind,
    pub payload: serde_json::Value,
}

impl NewNotification {
    pub fn document_created(document: &Document) -> Self {
        Self {
            kind: NotificationKind::DocumentCreated,
            payload: serde_json::json!({
                "document_id": document.id,
                "conversation_id": document.conversation_id,
                "document_type": document.document_type,
                "name": document.name,
            }),
        }
    }

    pub fn proposed_application(application: &Application) -> Self {
        Self {
            kind: NotificationKind::ProposedApplication,
            payload: serde_json::json!({
                "application_id": application.id,
                "conversation_id": application.source_conversation_id,
                "name": application.name,
            }),
        }
    }
}

/// A notification delivered to a user.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Notification {
    pub id: Uuid,
    pub user_id: Uuid,
    pub kind: NotificationKind,
    pub payload: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

/// Conversation with its ordered transcript (for full retrieval).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationWithMessages {
    #[serde(flatten)]
    pub conversation: Conversation,
    pub messages: Vec<Message>,
}

/// Truncate to at most `max` characters, never splitting a character. No ellipsis.
pub fn truncate_chars(text: &str, max: usize) -> String {
    text.chars().take(max).collect()
}

/// Name for an application proposed from a conversation's first user message.
pub fn proposed_application_name(first_user_message: Option<&Message>) -> String {
    match first_user_message {
        Some(message) => truncate_chars(&message.content, PROPOSED_NAME_MAX_CHARS),
        None => PROPOSED_NAME_FALLBACK.to_string(),
    }
}

#[cfg(test)]
#[path = "models_tests.rs"]
mod tests;
