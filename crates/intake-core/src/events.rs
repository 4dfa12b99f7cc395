//! Domain event bus.
//!
//! State changes that other parts of the system react to are published here
//! explicitly, right after the write that caused them. Subscribers (the
//! workflow dispatcher, loggers, tests) receive every event emitted after
//! they subscribed.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::debug;
use uuid::Uuid;

use crate::models::{ConversationStatus, DocumentType, MessageRole};

/// Default channel capacity (events).
pub const DEFAULT_CHANNEL_CAPACITY: usize = 1024;

/// Something that happened to an entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DomainEvent {
    /// A user finalized the requirements conversation.
    ConversationSignedOff { conversation_id: Uuid },

    /// A conversation row was updated. `new_status` is the status this
    /// update wrote, not whatever the row holds when the event is handled.
    ConversationUpdated {
        conversation_id: Uuid,
        status_changed: bool,
        new_status: ConversationStatus,
    },

    /// An application row was created or updated. `is_automated` is the
    /// value this write stored.
    ApplicationSaved {
        application_id: Uuid,
        created: bool,
        automated_changed: bool,
        is_automated: bool,
    },

    /// A generator stored a new document.
    DocumentCreated {
        document_id: Uuid,
        conversation_id: Uuid,
        document_type: DocumentType,
    },

    /// A message was appended to a conversation.
    MessagePosted {
        message_id: Uuid,
        conversation_id: Uuid,
        role: MessageRole,
    },
}

impl DomainEvent {
    /// Short name for logging.
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::ConversationSignedOff { .. } => "conversation_signed_off",
            Self::ConversationUpdated { .. } => "conversation_updated",
            Self::ApplicationSaved { .. } => "application_saved",
            Self::DocumentCreated { .. } => "document_created",
            Self::MessagePosted { .. } => "message_posted",
        }
    }
}

/// Central pub/sub channel for domain events.
///
/// Cloning is cheap; every clone publishes into the same channel.
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<DomainEvent>,
}

impl EventBus {
    /// Create a new event bus with the given capacity.
    pub fn new(capacity: usize) -> Self {
        debug!(capacity, "EventBus::new: creating event bus");
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Publish an event to all current subscribers.
    ///
    /// Fire-and-forget: with no subscribers the event is dropped.
    pub fn emit(&self, event: DomainEvent) {
        debug!(event_type = event.event_type(), ?event, "EventBus::emit");
        let _ = self.tx.send(event);
    }

    /// Subscribe to events emitted from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<DomainEvent> {
        debug!("EventBus::subscribe: new subscriber");
        self.tx.subscribe()
    }

    /// Number of active subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_CHANNEL_CAPACITY)
    }
}
