//! POST /chat, the transport surface for agent runs.
//!
//! With `Accept: text/event-stream` the run is streamed as protocol events:
//! `start`, zero or more `token` events, then `done` (or `error`). Providers
//! complete whole messages, so each `token` event carries the full text of
//! one assistant turn; streams with several `token` events come from runs
//! with tool rounds. Any other Accept value gets one buffered JSON response
//! once the run finishes.

use crate::state::AppState;
use axum::{
    extract::State,
    http::{self, header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::post,
    Json, Router,
};
use bytes::Bytes;
use futures::{stream::StreamExt, Stream};
use magpie::{
    agent::{Agent, ReplyOptions, DEFAULT_SYSTEM_PROMPT},
    models::message::{Message, MessageContent},
    models::role::Role,
    store::Conversation,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::{
    convert::Infallible,
    pin::Pin,
    task::{Context, Poll},
    time::Duration,
};
use tokio::sync::{mpsc, OwnedMutexGuard};
use tokio::time::timeout;
use tokio_stream::wrappers::ReceiverStream;
use uuid::Uuid;

// Types matching the incoming JSON structure
#[derive(Debug, Deserialize)]
struct ChatRequest {
    message: String,
    #[serde(default)]
    #[serde(rename = "conversationId")]
    conversation_id: Option<Uuid>,
}

#[derive(Debug, Serialize)]
struct ChatResponse {
    response: String,
    #[serde(rename = "conversationId")]
    conversation_id: Uuid,
}

// Custom SSE response type wrapping the channel the run writes into
pub struct SseResponse {
    rx: ReceiverStream<String>,
}

impl SseResponse {
    fn new(rx: ReceiverStream<String>) -> Self {
        Self { rx }
    }
}

impl Stream for SseResponse {
    type Item = Result<Bytes, Infallible>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.rx)
            .poll_next(cx)
            .map(|opt| opt.map(|s| Ok(Bytes::from(s))))
    }
}

impl IntoResponse for SseResponse {
    fn into_response(self) -> axum::response::Response {
        let stream = self;
        let body = axum::body::Body::from_stream(stream);

        http::Response::builder()
            .header("Content-Type", "text/event-stream")
            .header("Cache-Control", "no-cache")
            .header("Connection", "keep-alive")
            .body(body)
            .unwrap()
    }
}

// Protocol-specific event formatting
struct EventFormatter;

impl EventFormatter {
    fn format(event: &str, data: Value) -> String {
        format!("event: {}\ndata: {}\n\n", event, data)
    }

    fn start(conversation_id: Uuid) -> String {
        Self::format("start", json!({ "conversationId": conversation_id }))
    }

    fn token(chunk: &str) -> String {
        Self::format("token", json!({ "content": chunk, "type": "text" }))
    }

    fn done(conversation_id: Uuid, message_count: usize) -> String {
        Self::format(
            "done",
            json!({ "conversationId": conversation_id, "messageCount": message_count }),
        )
    }

    fn error() -> String {
        Self::format("error", json!({ "error": "AI request failed" }))
    }
}

/// Pull the text a caller should see out of one streamed message.
///
/// Tool requests and their results stay server side; they are logged and
/// otherwise dropped, so the wire only ever carries assistant prose.
fn surface_text(message: &Message) -> Vec<String> {
    let mut chunks = Vec::new();
    match message.role {
        Role::Assistant => {
            for content in &message.content {
                match content {
                    MessageContent::Text(text) => {
                        if !text.text.is_empty() {
                            chunks.push(text.text.clone());
                        }
                    }
                    MessageContent::ToolRequest(request) => match &request.tool_call {
                        Ok(tool_call) => {
                            tracing::info!(id = %request.id, tool = %tool_call.name, "tool requested");
                        }
                        Err(e) => {
                            tracing::warn!(id = %request.id, error = %e, "malformed tool request");
                        }
                    },
                    MessageContent::ToolResponse(_) => {}
                }
            }
        }
        Role::User => {
            for content in &message.content {
                if let MessageContent::ToolResponse(response) = content {
                    match &response.tool_result {
                        Ok(_) => tracing::info!(id = %response.id, "tool completed"),
                        Err(e) => tracing::info!(id = %response.id, error = %e, "tool failed"),
                    }
                }
            }
        }
        Role::System => {}
    }
    chunks
}

fn wants_event_stream(headers: &HeaderMap) -> bool {
    headers
        .get(header::ACCEPT)
        .and_then(|accept| accept.to_str().ok())
        .map(|accept| accept.contains("text/event-stream"))
        .unwrap_or(false)
}

fn stream_chat(
    agent: Agent,
    mut conversation: OwnedMutexGuard<Conversation>,
    conversation_id: Uuid,
    history: Vec<Message>,
    options: ReplyOptions,
) -> SseResponse {
    // Create channel for streaming
    let (tx, rx) = mpsc::channel(100);
    let stream = ReceiverStream::new(rx);

    // Spawn task to handle streaming; the conversation guard rides along so
    // the id stays locked until the run is over
    tokio::spawn(async move {
        let _ = tx.send(EventFormatter::start(conversation_id)).await;

        let mut stream = match agent.reply(&history, &options).await {
            Ok(stream) => stream,
            Err(e) => {
                tracing::error!("Failed to start reply stream: {}", e);
                let _ = tx.send(EventFormatter::error()).await;
                return;
            }
        };

        let mut turn_texts: Vec<String> = Vec::new();

        loop {
            tokio::select! {
                response = timeout(Duration::from_millis(500), stream.next()) => {
                    match response {
                        Ok(Some(Ok(message))) => {
                            for chunk in surface_text(&message) {
                                if let Err(e) = tx.send(EventFormatter::token(&chunk)).await {
                                    tracing::error!("Error sending message through channel: {}", e);
                                    return;
                                }
                                turn_texts.push(chunk);
                            }
                        }
                        Ok(Some(Err(e))) => {
                            tracing::error!("Error processing message: {}", e);
                            // The transcript keeps only completed turns
                            let _ = tx.send(EventFormatter::error()).await;
                            return;
                        }
                        Ok(None) => {
                            break;
                        }
                        Err(_) => { // Heartbeat, used to detect disconnected clients and then end running tools.
                            if tx.is_closed() {
                                tracing::debug!(%conversation_id, "client disconnected, abandoning run");
                                return;
                            }
                            continue;
                        }
                    }
                }
            }
        }

        conversation
            .messages
            .push(Message::assistant().with_text(turn_texts.join("\n")));
        let message_count = conversation.messages.len();

        let _ = tx
            .send(EventFormatter::done(conversation_id, message_count))
            .await;
    });

    SseResponse::new(stream)
}

async fn buffered_chat(
    agent: Agent,
    mut conversation: OwnedMutexGuard<Conversation>,
    conversation_id: Uuid,
    history: Vec<Message>,
    options: ReplyOptions,
) -> Response {
    let mut stream = match agent.reply(&history, &options).await {
        Ok(stream) => stream,
        Err(e) => {
            tracing::error!("Failed to start reply stream: {}", e);
            return error_response();
        }
    };

    let mut turn_texts: Vec<String> = Vec::new();
    while let Some(response) = stream.next().await {
        match response {
            Ok(message) => turn_texts.extend(surface_text(&message)),
            Err(e) => {
                tracing::error!("Error processing message: {}", e);
                return error_response();
            }
        }
    }

    let response_text = turn_texts.join("\n");
    conversation
        .messages
        .push(Message::assistant().with_text(response_text.clone()));

    Json(ChatResponse {
        response: response_text,
        conversation_id,
    })
    .into_response()
}

fn error_response() -> Response {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({ "error": "AI request failed" })),
    )
        .into_response()
}

async fn handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<ChatRequest>,
) -> Result<Response, StatusCode> {
    let conversation_id = request.conversation_id.unwrap_or_else(Uuid::new_v4);
    tracing::info!(%conversation_id, "chat message received");

    state
        .store
        .create_if_absent(conversation_id, DEFAULT_SYSTEM_PROMPT)
        .await;

    // Hold the conversation for the whole run so concurrent requests on the
    // same id are served one at a time
    let mut conversation = state
        .store
        .lock(&conversation_id)
        .await
        .ok_or(StatusCode::INTERNAL_SERVER_ERROR)?;

    conversation
        .messages
        .push(Message::user().with_text(request.message));
    let history = conversation.messages.clone();

    let agent = state.agent().map_err(|e| {
        tracing::error!("Failed to build agent: {}", e);
        StatusCode::INTERNAL_SERVER_ERROR
    })?;
    let options = ReplyOptions::lightweight();

    if wants_event_stream(&headers) {
        Ok(stream_chat(agent, conversation, conversation_id, history, options).into_response())
    } else {
        Ok(buffered_chat(agent, conversation, conversation_id, history, options).await)
    }
}

// Configure routes for this module
pub fn routes(state: AppState) -> Router {
    Router::new()
        .route("/chat", post(handler))
        .with_state(state)
}
