use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{error, warn};

use crate::storage::{KeyValueStore, StorageError, HISTORY_KEY};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Sender {
    #[serde(rename = "user")]
    User,
    #[serde(rename = "bot")]
    Assistant,
}

impl Sender {
    pub fn label(self) -> &'static str {
        match self {
            Sender::User => "You",
            Sender::Assistant => "Gemini",
        }
    }
}

/// One entry in the conversation. Never modified after creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub content: String,
    pub sender: Sender,
    pub timestamp: DateTime<Utc>,
}

/// Append-only conversation log, mirrored to the store after every append.
#[derive(Debug, Default)]
pub struct ConversationState {
    messages: Vec<Message>,
}

impl ConversationState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load the log saved under the history key.
    ///
    /// Missing history gives an empty log. So does history that cannot be
    /// read or parsed, after a warning.
    pub fn load(store: &dyn KeyValueStore) -> Self {
        let raw = match store.get(HISTORY_KEY) {
            Ok(Some(raw)) => raw,
            Ok(None) => return Self::new(),
            Err(e) => {
                warn!("Failed to read chat history: {}", e);
                return Self::new();
            }
        };

        match serde_json::from_str::<Vec<Message>>(&raw) {
            Ok(messages) => Self { messages },
            Err(e) => {
                warn!("Ignoring unreadable chat history: {}", e);
                Self::new()
            }
        }
    }

    /// Record a new message and write the full log back to `store`.
    ///
    /// A failed write is logged; the message is kept in memory either way.
    pub fn append(
        &mut self,
        store: &mut dyn KeyValueStore,
        content: &str,
        sender: Sender,
    ) -> Message {
        let message = Message {
            content: content.to_string(),
            sender,
            timestamp: Utc::now(),
        };
        self.messages.push(message.clone());

        if let Err(e) = self.save(store) {
            error!("Failed to save chat history: {}", e);
        }

        message
    }

    pub fn load_all(&self) -> &[Message] {
        &self.messages
    }

    fn save(&self, store: &mut dyn KeyValueStore) -> Result<(), StorageError> {
        let serialized =
            serde_json::to_string(&self.messages).map_err(|source| StorageError::Serialize {
                key: HISTORY_KEY.to_string(),
                source,
            })?;
        store.set(HISTORY_KEY, &serialized)
    }
}
