//! Admin notifications.

use std::sync::Arc;

use async_trait::async_trait;
use intake_core::Database;
use intake_core::models::{NewNotification, User};
use tracing::{info, warn};

use crate::context::WorkflowContext;

/// Delivers a notification to one user.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, user: &User, notification: &NewNotification) -> intake_core::Result<()>;
}

/// Stores notifications in the `notifications` table.
#[derive(Clone)]
pub struct DatabaseNotifier {
    db: Arc<Database>,
}

impl DatabaseNotifier {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }
}

#[async_trait]
impl Notifier for DatabaseNotifier {
    async fn notify(&self, user: &User, notification: &NewNotification) -> intake_core::Result<()> {
        let stored = self.db.insert_notification(user.id, notification).await?;
        info!(
            user = %user.username,
            kind = %stored.kind,
            notification_id = %stored.id,
            "Notified user"
        );
        Ok(())
    }
}

/// Send `notification` to every admin. Returns how many deliveries succeeded.
///
/// Delivery failures are logged and dropped.
pub async fn notify_admins(ctx: &WorkflowContext, notification: &NewNotification) -> usize {
    if !ctx.workflow.notify_admins {
        return 0;
    }

    let admins = match ctx.db.list_admins().await {
        Ok(admins) => admins,
        Err(e) => {
            warn!(error = %e, kind = %notification.kind, "Failed to list admins for notification");
            return 0;
        }
    };

    let mut delivered = 0;
    for admin in &admins {
        match ctx.notifier.notify(admin, notification).await {
            Ok(()) => delivered += 1,
            Err(e) => warn!(
                error = %e,
                user = %admin.username,
                kind = %notification.kind,
                "Notification delivery failed"
            ),
        }
    }
    delivered
}
