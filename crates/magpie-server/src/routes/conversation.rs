use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::Serialize;
use serde_json::json;
use uuid::Uuid;

use magpie::models::message::Message;

use crate::state::AppState;

const PREVIEW_CHARS: usize = 100;

#[derive(Debug, Serialize)]
struct ConversationSummary {
    #[serde(rename = "conversationId")]
    conversation_id: Uuid,
    #[serde(rename = "messageCount")]
    message_count: usize,
    #[serde(rename = "lastMessage")]
    last_message: String,
}

#[derive(Debug, Serialize)]
struct ConversationList {
    #[serde(rename = "totalConversations")]
    total_conversations: usize,
    conversations: Vec<ConversationSummary>,
}

#[derive(Debug, Serialize)]
struct ConversationDetail {
    #[serde(rename = "conversationId")]
    conversation_id: Uuid,
    #[serde(rename = "messageCount")]
    message_count: usize,
    messages: Vec<Message>,
}

fn preview(message: &Message) -> String {
    message.text().chars().take(PREVIEW_CHARS).collect()
}

async fn list_conversations(State(state): State<AppState>) -> Json<ConversationList> {
    let mut conversations = Vec::new();
    for id in state.store.ids().await {
        if let Some(messages) = state.store.get(&id).await {
            conversations.push(ConversationSummary {
                conversation_id: id,
                message_count: messages.len(),
                last_message: messages.last().map(preview).unwrap_or_default(),
            });
        }
    }

    Json(ConversationList {
        total_conversations: conversations.len(),
        conversations,
    })
}

async fn get_conversation(State(state): State<AppState>, Path(id): Path<Uuid>) -> Response {
    match state.store.get(&id).await {
        Some(messages) => Json(ConversationDetail {
            conversation_id: id,
            message_count: messages.len(),
            messages,
        })
        .into_response(),
        None => (
            StatusCode::NOT_FOUND,
            Json(json!({ "error": "Conversation not found" })),
        )
            .into_response(),
    }
}

// Configure routes for this module
pub fn routes(state: AppState) -> Router {
    Router::new()
        .route("/conversations", get(list_conversations))
        .route("/conversations/:id", get(get_conversation))
        .with_state(state)
}
