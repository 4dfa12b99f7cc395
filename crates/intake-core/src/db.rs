//! Database operations for intake.
//!
//! Every write here is a raw write: nothing in this module emits domain
//! events. Mutations that should be observed go through the runtime's
//! actions layer, which calls into this module and then publishes.

use crate::error::{Error, Result};
use crate::models::*;
use crate::schema::SCHEMA;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow};
use sqlx::{Row, SqlitePool};
use std::path::Path;
use std::str::FromStr;
use uuid::Uuid;

/// Database handle for intake.
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Open or create a database at the given path.
    pub async fn open(path: &Path) -> Result<Self> {
        let parent = path.parent().unwrap_or(Path::new("."));
        if !parent.exists() {
            std::fs::create_dir_all(parent)?;
        }

        let options = SqliteConnectOptions::from_str(&format!("sqlite:{}", path.display()))?
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;

        let db = Self { pool };
        db.init().await?;
        Ok(db)
    }

    /// Initialize schema.
    async fn init(&self) -> Result<()> {
        sqlx::raw_sql(SCHEMA).execute(&self.pool).await?;
        tracing::debug!("database schema ready");
        Ok(())
    }

    /// Get the connection pool.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Close the database.
    pub async fn close(self) {
        self.pool.close().await;
    }

    // =========================================================================
    // Users
    // =========================================================================

    /// Insert a user.
    pub async fn insert_user(&self, user: &User) -> Result<()> {
        sqlx::query(
            "INSERT INTO users (id, username, email, is_admin, created_at) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(user.id.to_string())
        .bind(&user.username)
        .bind(&user.email)
        .bind(user.is_admin)
        .bind(user.created_at.timestamp_millis())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Get a user by ID.
    pub async fn get_user(&self, id: Uuid) -> Result<Option<User>> {
        let row = sqlx::query("SELECT * FROM users WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(user_from_row).transpose()
    }

    /// List all users.
    pub async fn list_users(&self) -> Result<Vec<User>> {
        let rows = sqlx::query("SELECT * FROM users ORDER BY created_at, rowid")
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(user_from_row).collect()
    }

    /// List users with the admin flag set.
    pub async fn list_admins(&self) -> Result<Vec<User>> {
        let rows = sqlx::query("SELECT * FROM users WHERE is_admin = 1 ORDER BY created_at, rowid")
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(user_from_row).collect()
    }

    // =========================================================================
    // User memory
    // =========================================================================

    /// Insert or replace the memory for a user. Content is replaced, never appended.
    pub async fn upsert_user_memory(&self, user_id: Uuid, content: &str) -> Result<UserMemory> {
        let now = Utc::now();
        sqlx::query(
            r#"
            INSERT INTO user_memories (id, user_id, memory_content, updated_at)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(user_id) DO UPDATE SET
                memory_content = excluded.memory_content,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(Uuid::new_v4().to_string())
        .bind(user_id.to_string())
        .bind(content)
        .bind(now.timestamp_millis())
        .execute(&self.pool)
        .await?;

        self.get_user_memory(user_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("memory for user {user_id}")))
    }

    /// Get the memory for a user.
    pub async fn get_user_memory(&self, user_id: Uuid) -> Result<Option<UserMemory>> {
        let row = sqlx::query("SELECT * FROM user_memories WHERE user_id = ?")
            .bind(user_id.to_string())
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(user_memory_from_row).transpose()
    }

    /// Count memory rows for a user (at most one).
    pub async fn count_user_memories(&self, user_id: Uuid) -> Result<i64> {
        let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM user_memories WHERE user_id = ?")
            .bind(user_id.to_string())
            .fetch_one(&self.pool)
            .await?;
        Ok(count.0)
    }

    // =========================================================================
    // Applications
    // =========================================================================

    /// Insert an application.
    pub async fn insert_application(&self, app: &Application) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO applications (
                id, category, name, short_description, overview, is_automated,
                status, url, repo, source_conversation_id, created_at, updated_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(app.id.to_string())
        .bind(app.category.as_str())
        .bind(&app.name)
        .bind(&app.short_description)
        .bind(&app.overview)
        .bind(app.is_automated)
        .bind(&app.status)
        .bind(&app.url)
        .bind(&app.repo)
        .bind(app.source_conversation_id.map(|id| id.to_string()))
        .bind(app.created_at.timestamp_millis())
        .bind(app.updated_at.timestamp_millis())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Write every mutable column of an application.
    pub async fn update_application(&self, app: &Application) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE applications SET
                category = ?, name = ?, short_description = ?, overview = ?, is_automated = ?,
                status = ?, url = ?, repo = ?, source_conversation_id = ?, updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(app.category.as_str())
        .bind(&app.name)
        .bind(&app.short_description)
        .bind(&app.overview)
        .bind(app.is_automated)
        .bind(&app.status)
        .bind(&app.url)
        .bind(&app.repo)
        .bind(app.source_conversation_id.map(|id| id.to_string()))
        .bind(app.updated_at.timestamp_millis())
        .bind(app.id.to_string())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(Error::NotFound(format!("application {}", app.id)));
        }
        Ok(())
    }

    /// Set the overview text of an application.
    pub async fn set_application_overview(&self, id: Uuid, overview: &str) -> Result<()> {
        self.set_field("applications", "overview", id, overview).await
    }

    /// Get an application by ID.
    pub async fn get_application(&self, id: Uuid) -> Result<Option<Application>> {
        let row = sqlx::query("SELECT * FROM applications WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(application_from_row).transpose()
    }

    /// List applications, optionally filtered by category.
    pub async fn list_applications(
        &self,
        category: Option<ApplicationCategory>,
    ) -> Result<Vec<Application>> {
        let rows = match category {
            Some(category) => {
                sqlx::query("SELECT * FROM applications WHERE category = ? ORDER BY name")
                    .bind(category.as_str())
                    .fetch_all(&self.pool)
                    .await?
            }
            None => {
                sqlx::query("SELECT * FROM applications ORDER BY name")
                    .fetch_all(&self.pool)
                    .await?
            }
        };
        rows.iter().map(application_from_row).collect()
    }

    /// Applications proposed from a given conversation.
    pub async fn list_applications_from_conversation(
        &self,
        conversation_id: Uuid,
    ) -> Result<Vec<Application>> {
        let rows = sqlx::query(
            "SELECT * FROM applications WHERE source_conversation_id = ? ORDER BY created_at, rowid",
        )
        .bind(conversation_id.to_string())
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(application_from_row).collect()
    }

    // =========================================================================
    // Conversations
    // =========================================================================

    /// Insert a conversation.
    pub async fn insert_conversation(&self, conv: &Conversation) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO conversations (
                id, user_id, application_id, status, signed_off_at, title, summary,
                created_at, updated_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(conv.id.to_string())
        .bind(conv.user_id.to_string())
        .bind(conv.application_id.map(|id| id.to_string()))
        .bind(conv.status.as_str())
        .bind(conv.signed_off_at.map(|dt| dt.timestamp_millis()))
        .bind(&conv.title)
        .bind(&conv.summary)
        .bind(conv.created_at.timestamp_millis())
        .bind(conv.updated_at.timestamp_millis())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Get a conversation by ID.
    pub async fn get_conversation(&self, id: Uuid) -> Result<Option<Conversation>> {
        let row = sqlx::query("SELECT * FROM conversations WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(conversation_from_row).transpose()
    }

    /// List conversations, newest first, optionally for one user.
    pub async fn list_conversations(&self, user_id: Option<Uuid>) -> Result<Vec<Conversation>> {
        let rows = match user_id {
            Some(user_id) => {
                sqlx::query(
                    "SELECT * FROM conversations WHERE user_id = ? ORDER BY created_at DESC, rowid DESC",
                )
                .bind(user_id.to_string())
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query("SELECT * FROM conversations ORDER BY created_at DESC, rowid DESC")
                    .fetch_all(&self.pool)
                    .await?
            }
        };
        rows.iter().map(conversation_from_row).collect()
    }

    /// Get a conversation with its ordered transcript.
    pub async fn get_conversation_with_messages(
        &self,
        id: Uuid,
    ) -> Result<Option<ConversationWithMessages>> {
        let Some(conversation) = self.get_conversation(id).await? else {
            return Ok(None);
        };
        let messages = self.get_messages(id).await?;
        Ok(Some(ConversationWithMessages {
            conversation,
            messages,
        }))
    }

    /// Set a conversation's status.
    pub async fn set_conversation_status(
        &self,
        id: Uuid,
        status: ConversationStatus,
    ) -> Result<()> {
        self.set_field("conversations", "status", id, status.as_str())
            .await
    }

    /// Set (or clear) a conversation's sign-off timestamp.
    pub async fn set_conversation_signed_off_at(
        &self,
        id: Uuid,
        signed_off_at: Option<DateTime<Utc>>,
    ) -> Result<()> {
        self.set_field(
            "conversations",
            "signed_off_at",
            id,
            signed_off_at.map(|dt| dt.timestamp_millis()),
        )
        .await
    }

    /// Set a conversation's title.
    pub async fn set_conversation_title(&self, id: Uuid, title: &str) -> Result<()> {
        self.set_field("conversations", "title", id, title).await
    }

    /// Set a conversation's summary.
    pub async fn set_conversation_summary(&self, id: Uuid, summary: &str) -> Result<()> {
        self.set_field("conversations", "summary", id, summary)
            .await
    }

    /// Link a conversation to an application.
    pub async fn set_conversation_application(&self, id: Uuid, application_id: Uuid) -> Result<()> {
        self.set_field(
            "conversations",
            "application_id",
            id,
            application_id.to_string(),
        )
        .await
    }

    /// Count conversations.
    pub async fn count_conversations(&self) -> Result<i64> {
        let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM conversations")
            .fetch_one(&self.pool)
            .await?;
        Ok(count.0)
    }

    // =========================================================================
    // Messages
    // =========================================================================

    /// Insert a message.
    pub async fn insert_message(&self, msg: &Message) -> Result<()> {
        sqlx::query(
            "INSERT INTO messages (id, conversation_id, user_id, content, created_at) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(msg.id.to_string())
        .bind(msg.conversation_id.to_string())
        .bind(msg.user_id.map(|id| id.to_string()))
        .bind(&msg.content)
        .bind(msg.created_at.timestamp_millis())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Get the transcript of a conversation.
    ///
    /// Ordered by creation time; ties fall back to insertion order.
    pub async fn get_messages(&self, conversation_id: Uuid) -> Result<Vec<Message>> {
        let rows = sqlx::query(
            "SELECT * FROM messages WHERE conversation_id = ? ORDER BY created_at, rowid",
        )
        .bind(conversation_id.to_string())
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(message_from_row).collect()
    }

    /// The earliest message written by a user (not the assistant).
    pub async fn first_user_message(&self, conversation_id: Uuid) -> Result<Option<Message>> {
        let row = sqlx::query(
            r#"
            SELECT * FROM messages
            WHERE conversation_id = ? AND user_id IS NOT NULL
            ORDER BY created_at, rowid
            LIMIT 1
            "#,
        )
        .bind(conversation_id.to_string())
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(message_from_row).transpose()
    }

    // =========================================================================
    // Documents
    // =========================================================================

    /// Insert a document.
    pub async fn insert_document(&self, doc: &Document) -> Result<()> {
        let metadata = doc.metadata.as_ref().map(serde_json::to_string).transpose()?;
        sqlx::query(
            r#"
            INSERT INTO documents (id, conversation_id, type, name, content, metadata, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(doc.id.to_string())
        .bind(doc.conversation_id.to_string())
        .bind(doc.document_type.as_str())
        .bind(&doc.name)
        .bind(&doc.content)
        .bind(metadata)
        .bind(doc.created_at.timestamp_millis())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Get a document by ID.
    pub async fn get_document(&self, id: Uuid) -> Result<Option<Document>> {
        let row = sqlx::query("SELECT * FROM documents WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(document_from_row).transpose()
    }

    /// Documents for a conversation in creation order.
    pub async fn list_documents(&self, conversation_id: Uuid) -> Result<Vec<Document>> {
        let rows = sqlx::query(
            "SELECT * FROM documents WHERE conversation_id = ? ORDER BY created_at, rowid",
        )
        .bind(conversation_id.to_string())
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(document_from_row).collect()
    }

    /// Most recent document of a type for a conversation.
    pub async fn latest_document_of_type(
        &self,
        conversation_id: Uuid,
        document_type: DocumentType,
    ) -> Result<Option<Document>> {
        let row = sqlx::query(
            r#"
            SELECT * FROM documents
            WHERE conversation_id = ? AND type = ?
            ORDER BY created_at DESC, rowid DESC
            LIMIT 1
            "#,
        )
        .bind(conversation_id.to_string())
        .bind(document_type.as_str())
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(document_from_row).transpose()
    }

    // =========================================================================
    // Notifications
    // =========================================================================

    /// Store a notification for a user.
    pub async fn insert_notification(
        &self,
        user_id: Uuid,
        notification: &NewNotification,
    ) -> Result<Notification> {
        let stored = Notification {
            id: Uuid::new_v4(),
            user_id,
            kind: notification.kind,
            payload: notification.payload.clone(),
            created_at: Utc::now(),
        };
        sqlx::query(
            "INSERT INTO notifications (id, user_id, kind, payload, created_at) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(stored.id.to_string())
        .bind(user_id.to_string())
        .bind(stored.kind.as_str())
        .bind(stored.payload.to_string())
        .bind(stored.created_at.timestamp_millis())
        .execute(&self.pool)
        .await?;
        Ok(stored)
    }

    /// Notifications for a user, oldest first.
    pub async fn list_notifications(&self, user_id: Uuid) -> Result<Vec<Notification>> {
        let rows = sqlx::query(
            "SELECT * FROM notifications WHERE user_id = ? ORDER BY created_at, rowid",
        )
        .bind(user_id.to_string())
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(notification_from_row).collect()
    }

    /// Write a single column, bumping `updated_at` when the table has one.
    async fn set_field(
        &self,
        table: &str,
        column: &str,
        id: Uuid,
        value: impl Into<FieldValue>,
    ) -> Result<()> {
        let touches_updated_at = matches!(table, "applications" | "conversations");
        let sql = if touches_updated_at {
            format!("UPDATE {table} SET {column} = ?, updated_at = ? WHERE id = ?")
        } else {
            format!("UPDATE {table} SET {column} = ? WHERE id = ?")
        };

        let query = sqlx::query(&sql);
        let mut query = match value.into() {
            FieldValue::Text(text) => query.bind(text),
            FieldValue::Integer(integer) => query.bind(integer),
        };
        if touches_updated_at {
            query = query.bind(Utc::now().timestamp_millis());
        }
        let result = query.bind(id.to_string()).execute(&self.pool).await?;

        if result.rows_affected() == 0 {
            return Err(Error::NotFound(format!("{table} row {id}")));
        }
        tracing::debug!(table, column, %id, "field updated");
        Ok(())
    }
}

/// A single column value for raw field writes.
enum FieldValue {
    Text(Option<String>),
    Integer(Option<i64>),
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        FieldValue::Text(Some(value.to_string()))
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        FieldValue::Text(Some(value))
    }
}

impl From<Option<i64>> for FieldValue {
    fn from(value: Option<i64>) -> Self {
        FieldValue::Integer(value)
    }
}

fn millis_to_datetime(ms: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(ms).unwrap_or_default()
}

fn uuid_column(row: &SqliteRow, column: &str) -> Result<Uuid> {
    Uuid::parse_str(row.get::<&str, _>(column))
        .map_err(|e| Error::Other(format!("invalid uuid in column {column}: {e}")))
}

fn optional_uuid_column(row: &SqliteRow, column: &str) -> Result<Option<Uuid>> {
    row.get::<Option<&str>, _>(column)
        .map(|value| {
            Uuid::parse_str(value)
                .map_err(|e| Error::Other(format!("invalid uuid in column {column}: {e}")))
        })
        .transpose()
}

fn user_from_row(row: &SqliteRow) -> Result<User> {
    Ok(User {
        id: uuid_column(row, "id")?,
        username: row.get("username"),
        email: row.get("email"),
        is_admin: row.get("is_admin"),
        created_at: millis_to_datetime(row.get("created_at")),
    })
}

fn user_memory_from_row(row: &SqliteRow) -> Result<UserMemory> {
    Ok(UserMemory {
        id: uuid_column(row, "id")?,
        user_id: uuid_column(row, "user_id")?,
        memory_content: row.get("memory_content"),
        updated_at: millis_to_datetime(row.get("updated_at")),
    })
}

fn notification_from_row(row: &SqliteRow) -> Result<Notification> {
    Ok(Notification {
        id: uuid_column(row, "id")?,
        user_id: uuid_column(row, "user_id")?,
        kind: row.get::<&str, _>("kind").parse()?,
        payload: serde_json::from_str(row.get::<&str, _>("payload"))?,
        created_at: millis_to_datetime(row.get("created_at")),
    })
}

fn application_from_row(row: &SqliteRow) -> Result<Application> {
    Ok(Application {
        id: uuid_column(row, "id")?,
        category: row.get::<&str, _>("category").parse()?,
        name: row.get("name"),
        short_description: row.get("short_description"),
        overview: row.get("overview"),
        is_automated: row.get("is_automated"),
        status: row.get("status"),
        url: row.get("url"),
        repo: row.get("repo"),
        source_conversation_id: optional_uuid_column(row, "source_conversation_id")?,
        created_at: millis_to_datetime(row.get("created_at")),
        updated_at: millis_to_datetime(row.get("updated_at")),
    })
}

fn conversation_from_row(row: &SqliteRow) -> Result<Conversation> {
    Ok(Conversation {
        id: uuid_column(row, "id")?,
        user_id: uuid_column(row, "user_id")?,
        application_id: optional_uuid_column(row, "application_id")?,
        status: row.get::<&str, _>("status").parse()?,
        signed_off_at: row
            .get::<Option<i64>, _>("signed_off_at")
            .map(millis_to_datetime),
        title: row.get("title"),
        summary: row.get("summary"),
        created_at: millis_to_datetime(row.get("created_at")),
        updated_at: millis_to_datetime(row.get("updated_at")),
    })
}

fn message_from_row(row: &SqliteRow) -> Result<Message> {
    Ok(Message {
        id: uuid_column(row, "id")?,
        conversation_id: uuid_column(row, "conversation_id")?,
        user_id: optional_uuid_column(row, "user_id")?,
        content: row.get("content"),
        created_at: millis_to_datetime(row.get("created_at")),
    })
}

fn document_from_row(row: &SqliteRow) -> Result<Document> {
    Ok(Document {
        id: uuid_column(row, "id")?,
        conversation_id: uuid_column(row, "conversation_id")?,
        document_type: row.get::<&str, _>("type").parse()?,
        name: row.get("name"),
        content: row.get("content"),
        metadata: row
            .get::<Option<&str>, _>("metadata")
            .map(serde_json::from_str)
            .transpose()?,
        created_at: millis_to_datetime(row.get("created_at")),
    })
}
