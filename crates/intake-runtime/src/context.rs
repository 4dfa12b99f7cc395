//! Shared handles passed to every action, job and observer.

use std::sync::Arc;

use intake_core::config::WorkflowConfig;
use intake_core::models::{Application, Conversation, Document, User};
use intake_core::{Config, Database, Error, EventBus};
use uuid::Uuid;

use crate::error::JobResult;
use crate::llm::{TextGenerator, create_generator};
use crate::notifier::{DatabaseNotifier, Notifier};

/// Everything the workflow needs. Cloning shares the same handles.
#[derive(Clone)]
pub struct WorkflowContext {
    pub db: Arc<Database>,
    pub llm: Arc<dyn TextGenerator>,
    pub notifier: Arc<dyn Notifier>,
    pub bus: EventBus,
    pub workflow: WorkflowConfig,
}

impl WorkflowContext {
    /// Build a context with a database-backed notifier and a fresh event bus.
    pub fn new(db: Arc<Database>, llm: Arc<dyn TextGenerator>, workflow: WorkflowConfig) -> Self {
        let notifier = Arc::new(DatabaseNotifier::new(Arc::clone(&db)));
        Self {
            db,
            llm,
            notifier,
            bus: EventBus::default(),
            workflow,
        }
    }

    /// Open the configured database and generator.
    pub async fn from_config(config: &Config) -> JobResult<Self> {
        if let Some(parent) = config.database.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(Error::from)?;
        }
        let db = Database::open(&config.database).await?;
        let llm = create_generator(&config.llm)?;
        Ok(Self::new(Arc::new(db), llm, config.workflow.clone()))
    }

    #[must_use]
    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = notifier;
        self
    }

    pub async fn user(&self, id: Uuid) -> intake_core::Result<User> {
        self.db
            .get_user(id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("user {id}")))
    }

    pub async fn application(&self, id: Uuid) -> intake_core::Result<Application> {
        self.db
            .get_application(id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("application {id}")))
    }

    pub async fn conversation(&self, id: Uuid) -> intake_core::Result<Conversation> {
        self.db
            .get_conversation(id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("conversation {id}")))
    }

    pub async fn document(&self, id: Uuid) -> intake_core::Result<Document> {
        self.db
            .get_document(id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("document {id}")))
    }
}
