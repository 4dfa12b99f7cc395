//! Sign-off orchestration.
//!
//! When a conversation is signed off exactly one plan runs, picked by the
//! first matching rule:
//!
//! 1. no application: research and a new-application PRD, independently;
//! 2. application with a repository: technical assessment, then feature PRD;
//! 3. application without a repository: feature PRD alone.

use intake_core::models::{Application, Conversation};
use tracing::info;
use uuid::Uuid;

use crate::context::WorkflowContext;
use crate::error::JobResult;
use crate::generators::Job;
use crate::plan::{ExecutionPlan, PlanReport, execute};

/// Choose the plan for a signed-off conversation.
pub fn plan_for_sign_off(
    conversation: &Conversation,
    application: Option<&Application>,
) -> ExecutionPlan {
    let conversation_id = conversation.id;

    if conversation.application_id.is_none() {
        return ExecutionPlan::Batch(vec![
            Job::Research { conversation_id },
            Job::NewApplicationPrd { conversation_id },
        ]);
    }

    if application.and_then(Application::usable_repo).is_some() {
        return ExecutionPlan::Chain(vec![
            Job::TechnicalAssessment { conversation_id },
            Job::FeaturePrd { conversation_id },
        ]);
    }

    ExecutionPlan::Chain(vec![Job::FeaturePrd { conversation_id }])
}

/// Reacts to sign-off events.
#[derive(Clone)]
pub struct Orchestrator {
    ctx: WorkflowContext,
}

impl Orchestrator {
    pub fn new(ctx: WorkflowContext) -> Self {
        Self { ctx }
    }

    /// Load the conversation as it is now, pick its plan and run it.
    pub async fn on_signed_off(&self, conversation_id: Uuid) -> JobResult<PlanReport> {
        let conversation = self.ctx.conversation(conversation_id).await?;
        let application = match conversation.application_id {
            Some(application_id) => Some(self.ctx.application(application_id).await?),
            None => None,
        };

        let plan = plan_for_sign_off(&conversation, application.as_ref());
        info!(
            %conversation_id,
            kind = plan.kind(),
            jobs = ?plan.jobs().iter().map(Job::name).collect::<Vec<_>>(),
            "Dispatching sign-off plan"
        );

        let report = execute(&self.ctx, plan).await;
        info!(
            %conversation_id,
            completed = report.completed.len(),
            failed = report.failed.len(),
            skipped = report.skipped.len(),
            "Sign-off plan finished"
        );
        Ok(report)
    }
}

#[cfg(test)]
#[path = "orchestrator_tests.rs"]
mod tests;
