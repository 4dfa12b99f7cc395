//! Routes domain events to the orchestrator, observers and metadata jobs.

use std::future::Future;
use std::sync::Arc;

use intake_core::events::DomainEvent;
use intake_core::models::MessageRole;
use tokio::sync::broadcast::Receiver;
use tokio::sync::broadcast::error::{RecvError, TryRecvError};
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::context::WorkflowContext;
use crate::error::JobResult;
use crate::generators::Job;
use crate::observers;
use crate::orchestrator::Orchestrator;
use crate::plan::{ExecutionPlan, execute};

/// Event router.
#[derive(Clone)]
pub struct Dispatcher {
    ctx: WorkflowContext,
    orchestrator: Orchestrator,
}

impl Dispatcher {
    pub fn new(ctx: WorkflowContext) -> Self {
        let orchestrator = Orchestrator::new(ctx.clone());
        Self { ctx, orchestrator }
    }

    /// Handle one event to completion.
    pub async fn handle(&self, event: DomainEvent) -> JobResult<()> {
        debug!(event_type = event.event_type(), "Dispatcher::handle");
        match event {
            DomainEvent::ConversationSignedOff { conversation_id } => {
                self.orchestrator.on_signed_off(conversation_id).await?;
            }
            DomainEvent::ConversationUpdated {
                conversation_id,
                status_changed,
                new_status,
            } => {
                observers::on_conversation_updated(
                    &self.ctx,
                    conversation_id,
                    status_changed,
                    new_status,
                )
                .await?;
            }
            DomainEvent::ApplicationSaved {
                application_id,
                created,
                automated_changed,
                is_automated,
            } => {
                observers::on_application_saved(
                    &self.ctx,
                    application_id,
                    created,
                    automated_changed,
                    is_automated,
                )
                .await?;
            }
            DomainEvent::DocumentCreated { document_id, .. } => {
                observers::on_document_created(&self.ctx, document_id).await?;
            }
            DomainEvent::MessagePosted {
                conversation_id,
                role: MessageRole::Assistant,
                ..
            } => {
                let plan = ExecutionPlan::Batch(vec![
                    Job::Title { conversation_id },
                    Job::Summary { conversation_id },
                    Job::UserMemory { conversation_id },
                ]);
                execute(&self.ctx, plan).await;
            }
            DomainEvent::MessagePosted { .. } => {}
        }
        Ok(())
    }

    /// Handle queued events inline until the receiver is empty, including
    /// events emitted by the handlers themselves. Returns how many were handled.
    pub async fn drain(&self, rx: &mut Receiver<DomainEvent>) -> usize {
        let mut handled = 0;
        loop {
            match rx.try_recv() {
                Ok(event) => {
                    self.handle_logged(event).await;
                    handled += 1;
                }
                Err(TryRecvError::Lagged(missed)) => {
                    warn!(missed, "Dispatcher lagged, events were dropped");
                }
                Err(TryRecvError::Empty | TryRecvError::Closed) => break,
            }
        }
        handled
    }

    /// Handle events in background tasks until the bus closes or `shutdown`
    /// resolves. Events already queued at shutdown are still handled, then
    /// in-flight handlers are awaited.
    pub async fn run(
        self: Arc<Self>,
        mut rx: Receiver<DomainEvent>,
        shutdown: impl Future<Output = ()>,
    ) {
        info!("Dispatcher started");
        let mut tasks = JoinSet::new();
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                () = &mut shutdown => break,
                received = rx.recv() => match received {
                    Ok(event) => {
                        let dispatcher = Arc::clone(&self);
                        tasks.spawn(async move { dispatcher.handle_logged(event).await });
                    }
                    Err(RecvError::Lagged(missed)) => {
                        warn!(missed, "Dispatcher lagged, events were dropped");
                    }
                    Err(RecvError::Closed) => break,
                },
                Some(joined) = tasks.join_next(), if !tasks.is_empty() => {
                    if let Err(e) = joined {
                        warn!(error = %e, "Event handler task failed");
                    }
                }
            }
        }

        loop {
            match rx.try_recv() {
                Ok(event) => {
                    let dispatcher = Arc::clone(&self);
                    tasks.spawn(async move { dispatcher.handle_logged(event).await });
                }
                Err(TryRecvError::Lagged(missed)) => {
                    warn!(missed, "Dispatcher lagged, events were dropped");
                }
                Err(TryRecvError::Empty | TryRecvError::Closed) => break,
            }
        }

        while let Some(joined) = tasks.join_next().await {
            if let Err(e) = joined {
                warn!(error = %e, "Event handler task failed");
            }
        }
        info!("Dispatcher stopped");
    }

    async fn handle_logged(&self, event: DomainEvent) {
        let event_type = event.event_type();
        if let Err(e) = self.handle(event).await {
            warn!(event_type, error = %e, "Event handler failed");
        }
    }
}

#[cfg(test)]
#[path = "dispatcher_tests.rs"]
mod tests;
