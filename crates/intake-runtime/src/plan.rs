//! Execution plans: independent batches and ordered chains of jobs.

use futures::future::join_all;
use serde::Serialize;
use tracing::{info, warn};

use crate::context::WorkflowContext;
use crate::error::JobError;
use crate::generators::Job;

/// How a group of jobs is run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "jobs", rename_all = "snake_case")]
pub enum ExecutionPlan {
    /// Independent jobs run concurrently. One failure never affects the others.
    Batch(Vec<Job>),
    /// Jobs run in order; each starts only after the previous one committed.
    /// The first failure skips everything after it.
    Chain(Vec<Job>),
}

impl ExecutionPlan {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Batch(_) => "batch",
            Self::Chain(_) => "chain",
        }
    }

    pub fn jobs(&self) -> &[Job] {
        match self {
            Self::Batch(jobs) | Self::Chain(jobs) => jobs,
        }
    }
}

/// Outcome of executing a plan.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct PlanReport {
    pub completed: Vec<Job>,
    pub failed: Vec<(Job, String)>,
    pub skipped: Vec<Job>,
}

impl PlanReport {
    pub fn is_success(&self) -> bool {
        self.failed.is_empty() && self.skipped.is_empty()
    }

    fn record(&mut self, job: Job, result: Result<(), JobError>) {
        match result {
            Ok(()) => self.completed.push(job),
            Err(e) => {
                warn!(job = %job, error = %e, fatal = e.is_fatal(), "Job failed");
                self.failed.push((job, e.to_string()));
            }
        }
    }
}

/// Run a plan to completion.
pub async fn execute(ctx: &WorkflowContext, plan: ExecutionPlan) -> PlanReport {
    info!(kind = plan.kind(), jobs = plan.jobs().len(), "Executing plan");
    let mut report = PlanReport::default();

    match plan {
        ExecutionPlan::Batch(jobs) => {
            let handles = jobs.iter().map(|job| tokio::spawn(job.run(ctx.clone())));
            let results = join_all(handles).await;
            for (job, result) in jobs.into_iter().zip(results) {
                report.record(job, result.map_err(JobError::from).and_then(|r| r));
            }
        }
        ExecutionPlan::Chain(jobs) => {
            let mut remaining = jobs.into_iter();
            for job in remaining.by_ref() {
                let result = job.run(ctx.clone()).await;
                let failed = result.is_err();
                report.record(job, result);
                if failed {
                    break;
                }
            }
            report.skipped.extend(remaining);
            if !report.skipped.is_empty() {
                info!(skipped = report.skipped.len(), "Chain stopped after failure");
            }
        }
    }

    report
}

#[cfg(test)]
#[path = "plan_tests.rs"]
mod tests;
