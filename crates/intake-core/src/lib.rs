//! intake-core: requirements-gathering entity store
//!
//! This crate provides the domain models, the SQLite-backed entity store and
//! the typed event bus used to drive the sign-off workflow (users, applications,
//! conversations, messages, documents, user memory and admin notifications).

pub mod config;
pub mod db;
pub mod error;
pub mod events;
pub mod models;
pub mod schema;

pub use config::Config;
pub use db::Database;
pub use error::Error;
pub use error::Result;
pub use events::{DomainEvent, EventBus};

/// Application name used for config directories and paths.
pub const APP_NAME: &str = "intake";

/// Returns the environment variable prefix for this application.
pub fn env_prefix() -> String {
    "INTAKE".to_string()
}
