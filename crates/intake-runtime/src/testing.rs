//! Shared helpers for unit tests.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use intake_core::Database;
use intake_core::config::WorkflowConfig;
use intake_core::models::{Conversation, Message, User};
use uuid::Uuid;

use crate::context::WorkflowContext;
use crate::llm::{GenerationError, GenerationRequest, TextGenerator};

pub fn temp_db_path() -> std::path::PathBuf {
    std::env::temp_dir().join(format!("intake-runtime-test-{}.db", Uuid::new_v4()))
}

/// Generator with canned replies that records every request.
#[derive(Default)]
pub struct ScriptedGenerator {
    default_reply: String,
    queued: Mutex<VecDeque<String>>,
    fail_marker: Option<String>,
    requests: Mutex<Vec<GenerationRequest>>,
}

impl ScriptedGenerator {
    pub fn replying(reply: &str) -> Self {
        Self {
            default_reply: reply.to_string(),
            ..Self::default()
        }
    }

    /// Fail every request whose system prompt contains `marker`.
    pub fn failing_on(mut self, marker: &str) -> Self {
        self.fail_marker = Some(marker.to_string());
        self
    }

    pub fn queue(&self, reply: &str) {
        self.queued.lock().expect("lock").push_back(reply.to_string());
    }

    pub fn requests(&self) -> Vec<GenerationRequest> {
        self.requests.lock().expect("lock").clone()
    }
}

#[async_trait]
impl TextGenerator for ScriptedGenerator {
    async fn generate(&self, request: GenerationRequest) -> Result<String, GenerationError> {
        let fail = self
            .fail_marker
            .as_deref()
            .is_some_and(|marker| request.system_prompt.contains(marker));
        self.requests.lock().expect("lock").push(request);
        if fail {
            return Err(GenerationError::Api {
                status: 500,
                message: "scripted failure".to_string(),
            });
        }
        let queued = self.queued.lock().expect("lock").pop_front();
        Ok(queued.unwrap_or_else(|| self.default_reply.clone()))
    }

    fn model_name(&self, small: bool) -> String {
        let name = if small { "scripted-small" } else { "scripted" };
        name.to_string()
    }
}

pub async fn context_with(llm: Arc<dyn TextGenerator>) -> WorkflowContext {
    let db = Database::open(&temp_db_path()).await.expect("open db");
    WorkflowContext::new(Arc::new(db), llm, WorkflowConfig::default())
}

pub async fn seed_user(ctx: &WorkflowContext, name: &str, is_admin: bool) -> User {
    let user = User::new(name, format!("{name}@example.com"), is_admin);
    ctx.db.insert_user(&user).await.expect("insert user");
    user
}

pub async fn seed_conversation(
    ctx: &WorkflowContext,
    user: &User,
    application_id: Option<Uuid>,
    messages: &[&str],
) -> Conversation {
    let conversation = Conversation::new(user.id, application_id);
    ctx.db.insert_conversation(&conversation).await.expect("insert conversation");
    for content in messages {
        ctx.db
            .insert_message(&Message::from_user(conversation.id, user.id, *content))
            .await
            .expect("insert message");
    }
    conversation
}
