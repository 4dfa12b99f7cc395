//! intake-runtime: the sign-off workflow.
//!
//! Actions mutate state and publish domain events; the [`Dispatcher`] routes
//! those events to the sign-off [`Orchestrator`], the observers and the
//! conversation metadata jobs.

pub mod actions;
pub mod assessment;
pub mod context;
pub mod dispatcher;
pub mod error;
pub mod generators;
pub mod llm;
pub mod notifier;
pub mod observers;
pub mod orchestrator;
pub mod overview;
pub mod plan;
pub mod prompts;

#[cfg(test)]
mod testing;

pub use context::WorkflowContext;
pub use dispatcher::Dispatcher;
pub use error::{JobError, JobResult};
pub use generators::Job;
pub use llm::{GenerationError, GenerationRequest, TextGenerator, create_generator};
pub use notifier::{DatabaseNotifier, Notifier};
pub use orchestrator::{Orchestrator, plan_for_sign_off};
pub use plan::{ExecutionPlan, PlanReport};
