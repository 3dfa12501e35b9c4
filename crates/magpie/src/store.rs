use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{Mutex, OwnedMutexGuard};
use uuid::Uuid;

use crate::models::message::Message;

/// An ordered, append-only message log for one conversation id.
///
/// The first message is always the system message installed at creation;
/// everything after it alternates caller and assistant turns in conversation
/// time order, which is the exact order replayed to the model.
#[derive(Debug, Clone)]
pub struct Conversation {
    pub id: Uuid,
    pub messages: Vec<Message>,
}

impl Conversation {
    fn new(id: Uuid, instructions: &str) -> Self {
        Self {
            id,
            messages: vec![Message::system().with_text(instructions)],
        }
    }
}

/// In-memory conversation store.
///
/// Conversations sit behind per-id mutexes: two requests on the same id are
/// serialized by taking `lock` for the duration of a run, while requests on
/// different ids proceed in parallel. Nothing survives a restart.
#[derive(Default)]
pub struct MemoryStore {
    conversations: Mutex<HashMap<Uuid, Arc<Mutex<Conversation>>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create the conversation if it does not exist, seeding it with exactly
    /// one system message carrying the assistant's operating instructions.
    pub async fn create_if_absent(
        &self,
        id: Uuid,
        instructions: &str,
    ) -> Arc<Mutex<Conversation>> {
        let mut conversations = self.conversations.lock().await;
        conversations
            .entry(id)
            .or_insert_with(|| Arc::new(Mutex::new(Conversation::new(id, instructions))))
            .clone()
    }

    /// Snapshot of a conversation's messages, if the id is known.
    pub async fn get(&self, id: &Uuid) -> Option<Vec<Message>> {
        let handle = self.handle(id).await?;
        let conversation = handle.lock().await;
        Some(conversation.messages.clone())
    }

    /// Append a message to an existing conversation. Returns false when the
    /// id is unknown.
    pub async fn append(&self, id: &Uuid, message: Message) -> bool {
        match self.handle(id).await {
            Some(handle) => {
                handle.lock().await.messages.push(message);
                true
            }
            None => false,
        }
    }

    /// Take exclusive ownership of a conversation for the duration of a run.
    ///
    /// The guard serializes concurrent requests on the same id; the store map
    /// itself is only locked long enough to clone the handle out.
    pub async fn lock(&self, id: &Uuid) -> Option<OwnedMutexGuard<Conversation>> {
        let handle = self.handle(id).await?;
        Some(handle.lock_owned().await)
    }

    /// Ids of every conversation currently held, for debug listings.
    pub async fn ids(&self) -> Vec<Uuid> {
        let conversations = self.conversations.lock().await;
        conversations.keys().copied().collect()
    }

    async fn handle(&self, id: &Uuid) -> Option<Arc<Mutex<Conversation>>> {
        let conversations = self.conversations.lock().await;
        conversations.get(id).cloned()
    }
}
