use eyre::{bail, Result};
use tracing::{error, warn};

use super::conversation_state::{ConversationState, Message, Sender};
use crate::storage::{KeyValueStore, CREDENTIAL_KEY, THEME_KEY};

/// Everything one chat session knows: the store it writes through, the
/// credential, the theme flag and the conversation log.
pub struct Session {
    store: Box<dyn KeyValueStore>,
    credential: Option<String>,
    dark_theme: bool,
    conversation: ConversationState,
}

impl Session {
    /// Load the session state saved in `store`.
    pub fn load(store: Box<dyn KeyValueStore>) -> Self {
        let credential = read_key(store.as_ref(), CREDENTIAL_KEY).filter(|key| !key.is_empty());
        let dark_theme = read_key(store.as_ref(), THEME_KEY).as_deref() == Some("true");
        let conversation = ConversationState::load(store.as_ref());

        Self {
            store,
            credential,
            dark_theme,
            conversation,
        }
    }

    pub fn credential(&self) -> Option<&str> {
        self.credential.as_deref()
    }

    /// Replace the credential. Surrounding whitespace is dropped and an
    /// empty key is refused.
    pub fn save_credential(&mut self, key: &str) -> Result<()> {
        let key = key.trim();
        if key.is_empty() {
            bail!("Please enter a valid API key");
        }

        self.credential = Some(key.to_string());
        if let Err(e) = self.store.set(CREDENTIAL_KEY, key) {
            error!("Failed to save API key: {}", e);
        }

        Ok(())
    }

    /// Use `key` only when nothing has been saved yet. Not persisted.
    pub fn seed_credential(&mut self, key: &str) {
        let key = key.trim();
        if self.credential.is_none() && !key.is_empty() {
            self.credential = Some(key.to_string());
        }
    }

    pub fn dark_theme(&self) -> bool {
        self.dark_theme
    }

    /// Flip the theme flag and return the new value.
    pub fn toggle_theme(&mut self) -> bool {
        self.dark_theme = !self.dark_theme;
        let value = if self.dark_theme { "true" } else { "false" };
        if let Err(e) = self.store.set(THEME_KEY, value) {
            error!("Failed to save theme preference: {}", e);
        }
        self.dark_theme
    }

    pub fn append(&mut self, content: &str, sender: Sender) -> Message {
        self.conversation
            .append(self.store.as_mut(), content, sender)
    }

    pub fn history(&self) -> &[Message] {
        self.conversation.load_all()
    }
}

fn read_key(store: &dyn KeyValueStore, key: &str) -> Option<String> {
    store.get(key).unwrap_or_else(|e| {
        warn!("Failed to read `{}` from store: {}", key, e);
        None
    })
}
