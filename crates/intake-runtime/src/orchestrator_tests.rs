//! Unit tests for sign-off plan selection.

use intake_core::models::{Application, ApplicationCategory, Conversation, NewApplication};
use uuid::Uuid;

use super::*;

fn application_with_repo(repo: Option<&str>) -> Application {
    let mut input = NewApplication::new(ApplicationCategory::Internal, "Payroll");
    input.repo = repo.map(str::to_string);
    Application::from_input(input)
}

#[test]
fn no_application_runs_research_and_prd_as_batch() {
    let conversation = Conversation::new(Uuid::new_v4(), None);
    let conversation_id = conversation.id;

    assert_eq!(
        plan_for_sign_off(&conversation, None),
        ExecutionPlan::Batch(vec![
            Job::Research { conversation_id },
            Job::NewApplicationPrd { conversation_id },
        ])
    );
}

#[test]
fn application_with_repo_chains_assessment_before_prd() {
    let app = application_with_repo(Some("file:///srv/payroll"));
    let conversation = Conversation::new(Uuid::new_v4(), Some(app.id));
    let conversation_id = conversation.id;

    assert_eq!(
        plan_for_sign_off(&conversation, Some(&app)),
        ExecutionPlan::Chain(vec![
            Job::TechnicalAssessment { conversation_id },
            Job::FeaturePrd { conversation_id },
        ])
    );
}

#[test]
fn application_with_empty_or_missing_repo_runs_feature_prd_only() {
    for repo in [None, Some("")] {
        let app = application_with_repo(repo);
        let conversation = Conversation::new(Uuid::new_v4(), Some(app.id));
        let conversation_id = conversation.id;

        assert_eq!(
            plan_for_sign_off(&conversation, Some(&app)),
            ExecutionPlan::Chain(vec![Job::FeaturePrd { conversation_id }]),
            "repo {repo:?}"
        );
    }
}

#[test]
fn application_id_takes_priority_over_loaded_relation() {
    // A linked id without a loaded application never falls back to the new-app path.
    let conversation = Conversation::new(Uuid::new_v4(), Some(Uuid::new_v4()));
    let plan = plan_for_sign_off(&conversation, None);
    assert_eq!(plan.kind(), "chain");
    assert_eq!(plan.jobs().len(), 1);
}
