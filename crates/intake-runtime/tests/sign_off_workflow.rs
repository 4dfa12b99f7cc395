//! End-to-end workflow tests: actions publish events, the dispatcher drains
//! them and the resulting documents, applications and notifications are checked.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use intake_core::config::WorkflowConfig;
use intake_core::events::DomainEvent;
use intake_core::models::{
    ApplicationCategory, ApplicationPatch, ConversationStatus, DocumentType, NewApplication,
    NotificationKind, User,
};
use intake_core::{Database, Error};
use intake_runtime::generators::{FEATURE_PRD_NAME, TECHNICAL_ASSESSMENT_NAME, TITLE_MAX_CHARS};
use intake_runtime::llm::{GenerationError, GenerationRequest, TextGenerator};
use intake_runtime::overview::OVERVIEW_FILE;
use intake_runtime::{Dispatcher, WorkflowContext, actions, prompts};
use tokio::sync::broadcast::Receiver;
use uuid::Uuid;

fn temp_db_path() -> std::path::PathBuf {
    let mut path = std::env::temp_dir();
    path.push(format!("intake-workflow-test-{}.db", Uuid::new_v4()));
    path
}

/// Echoes a fixed reply, optionally failing prompts containing a marker.
struct Scripted {
    reply: String,
    fail_marker: Option<&'static str>,
    prompts: Mutex<Vec<String>>,
}

impl Scripted {
    fn new(reply: &str) -> Self {
        Self {
            reply: reply.to_string(),
            fail_marker: None,
            prompts: Mutex::new(Vec::new()),
        }
    }

    fn failing_on(mut self, marker: &'static str) -> Self {
        self.fail_marker = Some(marker);
        self
    }
}

#[async_trait]
impl TextGenerator for Scripted {
    async fn generate(&self, request: GenerationRequest) -> Result<String, GenerationError> {
        self.prompts
            .lock()
            .expect("lock")
            .push(request.system_prompt.clone());
        if self
            .fail_marker
            .is_some_and(|marker| request.system_prompt.contains(marker))
        {
            return Err(GenerationError::InvalidResponse("scripted failure".to_string()));
        }
        Ok(self.reply.clone())
    }

    fn model_name(&self, _small: bool) -> String {
        "scripted".to_string()
    }
}

struct Harness {
    ctx: WorkflowContext,
    dispatcher: Dispatcher,
    rx: Receiver<DomainEvent>,
    admin: User,
    user: User,
}

impl Harness {
    async fn new(llm: Arc<dyn TextGenerator>) -> Self {
        Self::with_workflow(llm, WorkflowConfig::default()).await
    }

    async fn with_workflow(llm: Arc<dyn TextGenerator>, workflow: WorkflowConfig) -> Self {
        let db = Database::open(&temp_db_path()).await.expect("open db");
        let ctx = WorkflowContext::new(Arc::new(db), llm, workflow);
        let rx = ctx.bus.subscribe();
        let dispatcher = Dispatcher::new(ctx.clone());
        let admin = actions::create_user(&ctx, "admin", "admin@example.com", true)
            .await
            .expect("admin");
        let user = actions::create_user(&ctx, "requester", "requester@example.com", false)
            .await
            .expect("user");
        Self {
            ctx,
            dispatcher,
            rx,
            admin,
            user,
        }
    }

    async fn settle(&mut self) -> usize {
        self.dispatcher.drain(&mut self.rx).await
    }

    async fn application(&self, repo: Option<&str>) -> Uuid {
        let mut input = NewApplication::new(ApplicationCategory::Internal, "Inventory");
        input.repo = repo.map(str::to_string);
        actions::create_application(&self.ctx, input)
            .await
            .expect("application")
            .id
    }

    async fn conversation(&self, application_id: Option<Uuid>, first_message: &str) -> Uuid {
        let conv = actions::start_conversation(&self.ctx, self.user.id, application_id)
            .await
            .expect("start");
        actions::post_user_message(&self.ctx, conv.id, first_message)
            .await
            .expect("message");
        conv.id
    }

    async fn documents(&self, conversation_id: Uuid) -> Vec<intake_core::models::Document> {
        self.ctx
            .db
            .list_documents(conversation_id)
            .await
            .expect("documents")
    }
}

// ============================================================================
// Sign-off paths
// ============================================================================

#[tokio::test]
async fn new_application_sign_off_creates_research_and_prd() {
    let mut h = Harness::new(Arc::new(Scripted::new("# Draft"))).await;
    let conv = h.conversation(None, "Build a guitar marketplace").await;
    h.settle().await;

    actions::sign_off(&h.ctx, conv, false).await.expect("sign off");
    h.settle().await;

    let docs = h.documents(conv).await;
    assert_eq!(docs.len(), 2);
    assert!(docs.iter().any(|d| d.document_type == DocumentType::Research));
    assert!(docs.iter().any(|d| d.document_type == DocumentType::Prd));
    assert!(
        !docs
            .iter()
            .any(|d| d.document_type == DocumentType::TechnicalAssessment)
    );
}

#[tokio::test]
async fn research_failure_does_not_block_new_application_prd() {
    let llm = Scripted::new("# Draft").failing_on("product researcher");
    let mut h = Harness::new(Arc::new(llm)).await;
    let conv = h.conversation(None, "Build a guitar marketplace").await;

    actions::sign_off(&h.ctx, conv, false).await.expect("sign off");
    h.settle().await;

    let docs = h.documents(conv).await;
    assert_eq!(docs.len(), 1);
    assert_eq!(docs[0].name, "Product Requirements Document");
}

#[tokio::test]
async fn repo_sign_off_assesses_before_feature_prd() {
    let llm = Arc::new(Scripted::new(r#"{"size_estimate":"M","confidence":0.5}"#));
    let mut h = Harness::new(llm.clone()).await;
    let app = h.application(Some("file:///srv/inventory")).await;
    let conv = h.conversation(Some(app), "Add barcode scanning").await;

    actions::sign_off(&h.ctx, conv, false).await.expect("sign off");
    h.settle().await;

    let docs = h.documents(conv).await;
    let names: Vec<_> = docs.iter().map(|d| d.name.as_str()).collect();
    assert_eq!(names, vec![TECHNICAL_ASSESSMENT_NAME, FEATURE_PRD_NAME]);
    assert!(docs[0].created_at <= docs[1].created_at);

    // The PRD prompt carries the stored assessment.
    let prompts = llm.prompts.lock().expect("lock").clone();
    let prd_prompt = prompts
        .iter()
        .find(|p| p.contains("Feature Request Document"))
        .expect("prd prompt");
    assert!(prd_prompt.contains(&docs[0].content));
}

#[tokio::test]
async fn failed_assessment_prevents_feature_prd() {
    let llm = Scripted::new("{}").failing_on("staff engineer");
    let mut h = Harness::new(Arc::new(llm)).await;
    let app = h.application(Some("file:///srv/inventory")).await;
    let conv = h.conversation(Some(app), "Add barcode scanning").await;

    actions::sign_off(&h.ctx, conv, false).await.expect("sign off");
    h.settle().await;

    assert!(h.documents(conv).await.is_empty());
}

#[tokio::test]
async fn empty_repo_sign_off_creates_only_feature_prd() {
    for repo in [None, Some("")] {
        let mut h = Harness::new(Arc::new(Scripted::new("# Feature"))).await;
        let app = h.application(repo).await;
        let conv = h.conversation(Some(app), "Rename the export button").await;

        actions::sign_off(&h.ctx, conv, false).await.expect("sign off");
        h.settle().await;

        let docs = h.documents(conv).await;
        assert_eq!(docs.len(), 1, "repo {repo:?}");
        assert_eq!(docs[0].document_type, DocumentType::Prd);
        assert_eq!(docs[0].name, "Feature Request Document");
    }
}

#[tokio::test]
async fn repeat_sign_off_is_rejected_unless_forced() {
    let mut h = Harness::new(Arc::new(Scripted::new("# Draft"))).await;
    let conv = h.conversation(None, "Build a guitar marketplace").await;

    actions::sign_off(&h.ctx, conv, false).await.expect("first");
    h.settle().await;

    let err = actions::sign_off(&h.ctx, conv, false).await.expect_err("repeat");
    assert!(matches!(err, Error::InvalidState(_)));
    h.settle().await;
    assert_eq!(h.documents(conv).await.len(), 2);

    actions::sign_off(&h.ctx, conv, true).await.expect("forced");
    h.settle().await;
    assert_eq!(h.documents(conv).await.len(), 4);
}

#[tokio::test]
async fn repeat_sign_off_allowed_by_config() {
    let workflow = WorkflowConfig {
        allow_repeat_sign_off: true,
        ..WorkflowConfig::default()
    };
    let mut h = Harness::with_workflow(Arc::new(Scripted::new("# Feature")), workflow).await;
    let app = h.application(None).await;
    let conv = h.conversation(Some(app), "Rename the export button").await;

    actions::sign_off(&h.ctx, conv, false).await.expect("first");
    actions::sign_off(&h.ctx, conv, false).await.expect("second");
    h.settle().await;
    assert_eq!(h.documents(conv).await.len(), 2);
}

#[tokio::test]
async fn sign_off_of_missing_conversation_is_not_found() {
    let h = Harness::new(Arc::new(Scripted::new("x"))).await;
    let err = actions::sign_off(&h.ctx, Uuid::new_v4(), false)
        .await
        .expect_err("missing");
    assert!(matches!(err, Error::NotFound(_)));
}

// ============================================================================
// Notifications
// ============================================================================

#[tokio::test]
async fn every_document_notifies_each_admin_once() {
    let mut h = Harness::new(Arc::new(Scripted::new("# Draft"))).await;
    let second_admin = actions::create_user(&h.ctx, "ops", "ops@example.com", true)
        .await
        .expect("admin");
    let conv = h.conversation(None, "Build a guitar marketplace").await;

    actions::sign_off(&h.ctx, conv, false).await.expect("sign off");
    h.settle().await;

    let docs = h.documents(conv).await;
    for admin in [h.admin.id, second_admin.id] {
        let notifications = h.ctx.db.list_notifications(admin).await.expect("list");
        assert_eq!(notifications.len(), docs.len());
        for doc in &docs {
            let matching = notifications
                .iter()
                .filter(|n| n.kind == NotificationKind::DocumentCreated)
                .filter(|n| n.payload["document_id"] == doc.id.to_string())
                .filter(|n| n.payload["conversation_id"] == conv.to_string())
                .count();
            assert_eq!(matching, 1);
        }
    }
    assert!(h.ctx.db.list_notifications(h.user.id).await.expect("list").is_empty());
}

// ============================================================================
// Approval and proposed applications
// ============================================================================

#[tokio::test]
async fn approval_creates_one_proposed_application() {
    let mut h = Harness::new(Arc::new(Scripted::new("reply"))).await;
    let conv = h
        .conversation(None, "I want to build a marketplace for vintage guitars")
        .await;

    actions::update_conversation_status(&h.ctx, conv, ConversationStatus::Approved)
        .await
        .expect("approve");
    h.settle().await;
    actions::update_conversation_status(&h.ctx, conv, ConversationStatus::Approved)
        .await
        .expect("approve again");
    h.settle().await;

    let proposed = h
        .ctx
        .db
        .list_applications_from_conversation(conv)
        .await
        .expect("list");
    assert_eq!(proposed.len(), 1);
    assert_eq!(proposed[0].category, ApplicationCategory::Proposed);
    assert_eq!(proposed[0].name, "I want to build a marketplace for vintage guitars");

    let conversation = h.ctx.conversation(conv).await.expect("conv");
    assert_eq!(conversation.application_id, Some(proposed[0].id));

    let notifications = h.ctx.db.list_notifications(h.admin.id).await.expect("list");
    assert_eq!(
        notifications
            .iter()
            .filter(|n| n.kind == NotificationKind::ProposedApplication)
            .count(),
        1
    );
}

#[tokio::test]
async fn approval_after_rejection_does_not_propose_twice() {
    let mut h = Harness::new(Arc::new(Scripted::new("reply"))).await;
    let conv = h.conversation(None, "A kiosk app").await;

    for status in [
        ConversationStatus::Approved,
        ConversationStatus::Rejected,
        ConversationStatus::Approved,
    ] {
        actions::update_conversation_status(&h.ctx, conv, status)
            .await
            .expect("status");
        h.settle().await;
    }

    assert_eq!(
        h.ctx
            .db
            .list_applications_from_conversation(conv)
            .await
            .expect("list")
            .len(),
        1
    );
}

#[tokio::test]
async fn queued_status_changes_propose_exactly_once() {
    let mut h = Harness::new(Arc::new(Scripted::new("reply"))).await;
    let conv = h.conversation(None, "A kiosk app").await;

    // All three updates land before the dispatcher sees any of them.
    for status in [
        ConversationStatus::Approved,
        ConversationStatus::Rejected,
        ConversationStatus::Approved,
    ] {
        actions::update_conversation_status(&h.ctx, conv, status)
            .await
            .expect("status");
    }
    h.settle().await;

    let proposed = h
        .ctx
        .db
        .list_applications_from_conversation(conv)
        .await
        .expect("list");
    assert_eq!(proposed.len(), 1);
    assert_eq!(
        h.ctx.conversation(conv).await.expect("conv").application_id,
        Some(proposed[0].id)
    );
}

#[tokio::test]
async fn promoted_proposal_becomes_internal() {
    let mut h = Harness::new(Arc::new(Scripted::new("reply"))).await;
    let conv = h.conversation(None, "A kiosk app").await;
    actions::update_conversation_status(&h.ctx, conv, ConversationStatus::Approved)
        .await
        .expect("approve");
    h.settle().await;

    let app_id = h
        .ctx
        .conversation(conv)
        .await
        .expect("conv")
        .application_id
        .expect("linked");
    let promoted = actions::promote_application(&h.ctx, app_id).await.expect("promote");
    assert_eq!(promoted.category, ApplicationCategory::Internal);

    let err = actions::promote_application(&h.ctx, app_id)
        .await
        .expect_err("already internal");
    assert!(matches!(err, Error::InvalidState(_)));
}

// ============================================================================
// Automated applications
// ============================================================================

#[tokio::test]
async fn enabling_automation_extracts_overview() {
    let dir = tempfile::tempdir().expect("tempdir");
    std::fs::write(dir.path().join(OVERVIEW_FILE), "Inventory service overview").expect("write");

    let mut h = Harness::new(Arc::new(Scripted::new("x"))).await;
    let app = h
        .application(Some(&format!("file://{}/", dir.path().display())))
        .await;
    h.settle().await;
    assert!(h.ctx.application(app).await.expect("app").overview.is_none());

    actions::update_application(
        &h.ctx,
        app,
        ApplicationPatch {
            is_automated: Some(true),
            ..ApplicationPatch::default()
        },
    )
    .await
    .expect("update");
    h.settle().await;

    let overview = h.ctx.application(app).await.expect("app").overview;
    assert_eq!(overview.as_deref(), Some("Inventory service overview"));
}

#[tokio::test]
async fn other_field_changes_do_not_re_extract() {
    let dir = tempfile::tempdir().expect("tempdir");
    std::fs::write(dir.path().join(OVERVIEW_FILE), "first").expect("write");

    let mut h = Harness::new(Arc::new(Scripted::new("x"))).await;
    let mut input = NewApplication::new(ApplicationCategory::Internal, "Inventory");
    input.is_automated = true;
    input.repo = Some(format!("file://{}", dir.path().display()));
    let app = actions::create_application(&h.ctx, input).await.expect("create").id;
    h.settle().await;
    assert_eq!(
        h.ctx.application(app).await.expect("app").overview.as_deref(),
        Some("first")
    );

    std::fs::write(dir.path().join(OVERVIEW_FILE), "second").expect("rewrite");
    actions::update_application(
        &h.ctx,
        app,
        ApplicationPatch {
            url: Some("https://inventory.internal".to_string()),
            ..ApplicationPatch::default()
        },
    )
    .await
    .expect("update");
    h.settle().await;

    assert_eq!(
        h.ctx.application(app).await.expect("app").overview.as_deref(),
        Some("first")
    );
}

// ============================================================================
// Conversation metadata
// ============================================================================

#[tokio::test]
async fn assistant_reply_sets_bounded_title() {
    let long_reply = "Inventory ".repeat(30);
    let mut h = Harness::new(Arc::new(Scripted::new(&long_reply))).await;
    let conv = h.conversation(None, "Track guitar inventory").await;

    actions::reply(&h.ctx, conv).await.expect("reply");
    h.settle().await;

    let title = h.ctx.conversation(conv).await.expect("conv").title.expect("title");
    assert!(title.chars().count() <= TITLE_MAX_CHARS);
    assert!(!title.ends_with(' '));
}

#[tokio::test]
async fn title_failure_leaves_other_metadata_intact() {
    let llm = Scripted::new("Inventory tracking").failing_on(prompts::TITLE);
    let mut h = Harness::new(Arc::new(llm)).await;
    let conv = h.conversation(None, "Track guitar inventory").await;

    actions::post_assistant_message(&h.ctx, conv, "How many stores?")
        .await
        .expect("post");
    h.settle().await;

    let conversation = h.ctx.conversation(conv).await.expect("conv");
    assert!(conversation.title.is_none());
    assert_eq!(conversation.summary.as_deref(), Some("Inventory tracking"));
}

#[tokio::test]
async fn user_memory_is_one_row_per_user() {
    let mut h = Harness::new(Arc::new(Scripted::new("Runs three guitar stores."))).await;
    let first = h.conversation(None, "Track guitar inventory").await;
    let second = h.conversation(None, "Also track amplifiers").await;

    actions::reply(&h.ctx, first).await.expect("reply");
    actions::reply(&h.ctx, second).await.expect("reply");
    h.settle().await;

    assert_eq!(h.ctx.db.count_user_memories(h.user.id).await.expect("count"), 1);
    let memory = h
        .ctx
        .db
        .get_user_memory(h.user.id)
        .await
        .expect("get")
        .expect("exists");
    assert_eq!(memory.memory_content, "Runs three guitar stores.");
}
