//! Route table and handlers.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::{get, post, put};
use axum::{Json, Router};
use intake_core::models::{
    Application, ApplicationCategory, ApplicationPatch, Conversation, ConversationStatus,
    ConversationWithMessages, Document, Message, NewApplication, Notification, User,
};
use intake_runtime::{WorkflowContext, actions};
use serde::{Deserialize, Serialize};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use uuid::Uuid;

use crate::error::{ApiError, ApiResult};

#[derive(Clone)]
pub struct AppState {
    pub ctx: WorkflowContext,
}

pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/", get(root))
        .route("/health", get(health))
        .route("/users", post(create_user).get(list_users))
        .route("/users/{id}/notifications", get(list_notifications))
        .route("/applications", post(create_application).get(list_applications))
        .route("/applications/{id}", get(get_application).patch(update_application))
        .route("/applications/{id}/promote", post(promote_application))
        .route("/conversations", post(start_conversation))
        .route("/conversations/{id}", get(get_conversation))
        .route("/conversations/{id}/messages", post(post_message))
        .route("/conversations/{id}/sign-off", post(sign_off))
        .route("/conversations/{id}/status", put(update_status))
        .route("/conversations/{id}/documents", get(list_documents))
        .route("/documents/{id}", get(get_document))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[derive(Serialize)]
struct RootResponse {
    name: &'static str,
    version: &'static str,
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
}

async fn root() -> Json<RootResponse> {
    Json(RootResponse {
        name: env!("CARGO_PKG_NAME"),
        version: env!("CARGO_PKG_VERSION"),
    })
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok" })
}

// ============================================================================
// Users
// ============================================================================

#[derive(Debug, Deserialize)]
struct CreateUser {
    username: String,
    email: String,
    #[serde(default)]
    is_admin: bool,
}

async fn create_user(
    State(state): State<AppState>,
    Json(body): Json<CreateUser>,
) -> ApiResult<(StatusCode, Json<User>)> {
    if body.username.trim().is_empty() {
        return Err(ApiError::bad_request("username must not be empty"));
    }
    let user = actions::create_user(&state.ctx, &body.username, &body.email, body.is_admin).await?;
    Ok((StatusCode::CREATED, Json(user)))
}

async fn list_users(State(state): State<AppState>) -> ApiResult<Json<Vec<User>>> {
    Ok(Json(state.ctx.db.list_users().await?))
}

async fn list_notifications(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Vec<Notification>>> {
    state.ctx.user(id).await?;
    Ok(Json(state.ctx.db.list_notifications(id).await?))
}

// ============================================================================
// Applications
// ============================================================================

#[derive(Debug, Deserialize)]
struct ApplicationFilter {
    category: Option<ApplicationCategory>,
}

async fn create_application(
    State(state): State<AppState>,
    Json(body): Json<NewApplication>,
) -> ApiResult<(StatusCode, Json<Application>)> {
    let app = actions::create_application(&state.ctx, body).await?;
    Ok((StatusCode::CREATED, Json(app)))
}

async fn list_applications(
    State(state): State<AppState>,
    Query(filter): Query<ApplicationFilter>,
) -> ApiResult<Json<Vec<Application>>> {
    Ok(Json(state.ctx.db.list_applications(filter.category).await?))
}

async fn get_application(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Application>> {
    Ok(Json(state.ctx.application(id).await?))
}

async fn update_application(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(patch): Json<ApplicationPatch>,
) -> ApiResult<Json<Application>> {
    Ok(Json(actions::update_application(&state.ctx, id, patch).await?))
}

async fn promote_application(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Application>> {
    Ok(Json(actions::promote_application(&state.ctx, id).await?))
}

// ============================================================================
// Conversations
// ============================================================================

#[derive(Debug, Deserialize)]
struct StartConversation {
    user_id: Uuid,
    application_id: Option<Uuid>,
}

async fn start_conversation(
    State(state): State<AppState>,
    Json(body): Json<StartConversation>,
) -> ApiResult<(StatusCode, Json<Conversation>)> {
    let conv = actions::start_conversation(&state.ctx, body.user_id, body.application_id).await?;
    Ok((StatusCode::CREATED, Json(conv)))
}

async fn get_conversation(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<ConversationWithMessages>> {
    let full = state
        .ctx
        .db
        .get_conversation_with_messages(id)
        .await?
        .ok_or_else(|| intake_core::Error::NotFound(format!("conversation {id}")))?;
    Ok(Json(full))
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Deserialize)]
struct PostMessage {
    content: String,
    /// Generate the assistant's reply before responding.
    #[serde(default = "default_true")]
    reply: bool,
}

#[derive(Debug, Serialize)]
struct PostMessageResponse {
    message: Message,
    #[serde(skip_serializing_if = "Option::is_none")]
    reply: Option<Message>,
}

async fn post_message(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(body): Json<PostMessage>,
) -> ApiResult<(StatusCode, Json<PostMessageResponse>)> {
    if body.content.trim().is_empty() {
        return Err(ApiError::bad_request("message content must not be empty"));
    }
    let message = actions::post_user_message(&state.ctx, id, &body.content).await?;
    let reply = if body.reply {
        Some(actions::reply(&state.ctx, id).await?)
    } else {
        None
    };
    Ok((StatusCode::CREATED, Json(PostMessageResponse { message, reply })))
}

#[derive(Debug, Default, Deserialize)]
struct SignOffQuery {
    #[serde(default)]
    force: bool,
}

/// Documents are generated in the background; the response returns immediately.
async fn sign_off(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Query(query): Query<SignOffQuery>,
) -> ApiResult<(StatusCode, Json<Conversation>)> {
    let conv = actions::sign_off(&state.ctx, id, query.force).await?;
    Ok((StatusCode::ACCEPTED, Json(conv)))
}

#[derive(Debug, Deserialize)]
struct UpdateStatus {
    status: ConversationStatus,
}

async fn update_status(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(body): Json<UpdateStatus>,
) -> ApiResult<Json<Conversation>> {
    Ok(Json(
        actions::update_conversation_status(&state.ctx, id, body.status).await?,
    ))
}

async fn list_documents(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Vec<Document>>> {
    state.ctx.conversation(id).await?;
    Ok(Json(state.ctx.db.list_documents(id).await?))
}

async fn get_document(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Document>> {
    Ok(Json(state.ctx.document(id).await?))
}

#[cfg(test)]
#[path = "routes_tests.rs"]
mod tests;
