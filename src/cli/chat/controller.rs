use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use thiserror::Error;
use tracing::{debug, error, info};

use super::conversation_state::{Message, Sender};
use super::presenter::{Presenter, StatusKind};
use super::session::Session;
use crate::gemini_client::{GeminiError, LlmClient};

pub const FALLBACK_REPLY: &str =
    "Sorry, I encountered an error. Please check your API key and try again.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnState {
    Idle,
    AwaitingReply,
}

/// Reasons a turn is refused before anything is sent.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TurnError {
    #[error("Nothing to send")]
    EmptyInput,

    #[error("No API key set. Use /key to enter one")]
    MissingCredential,

    #[error("Still waiting for the previous reply")]
    Busy,
}

#[derive(Debug)]
pub enum TurnOutcome {
    Replied(Message),
    /// The request failed; `reply` is the placeholder that was appended.
    Failed { reply: Message, error: GeminiError },
}

impl TurnOutcome {
    pub fn reply(&self) -> &Message {
        match self {
            TurnOutcome::Replied(reply) | TurnOutcome::Failed { reply, .. } => reply,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, TurnOutcome::Replied(_))
    }
}

/// Resets the controller to `Idle` when the turn ends, however it ends.
struct TurnGuard<'a> {
    awaiting: &'a AtomicBool,
}

impl Drop for TurnGuard<'_> {
    fn drop(&mut self) {
        self.awaiting.store(false, Ordering::Release);
    }
}

/// Runs one turn at a time: user message, request, reply or placeholder.
pub struct ConversationController {
    session: Mutex<Session>,
    client: Box<dyn LlmClient>,
    presenter: Box<dyn Presenter>,
    awaiting: AtomicBool,
}

impl ConversationController {
    pub fn new(session: Session, client: Box<dyn LlmClient>, presenter: Box<dyn Presenter>) -> Self {
        Self {
            session: Mutex::new(session),
            client,
            presenter,
            awaiting: AtomicBool::new(false),
        }
    }

    pub fn session(&self) -> MutexGuard<'_, Session> {
        self.session.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn state(&self) -> TurnState {
        if self.awaiting.load(Ordering::Acquire) {
            TurnState::AwaitingReply
        } else {
            TurnState::Idle
        }
    }

    fn begin_turn(&self) -> Result<TurnGuard<'_>, TurnError> {
        self.awaiting
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| TurnError::Busy)?;
        Ok(TurnGuard {
            awaiting: &self.awaiting,
        })
    }

    /// Send `input` as the next user turn.
    ///
    /// Errors from the client never come back as `Err`: they are replaced by
    /// [`FALLBACK_REPLY`] in the log and reported through
    /// [`TurnOutcome::Failed`].
    pub async fn send(&self, input: &str) -> Result<TurnOutcome, TurnError> {
        let prompt = input.trim();
        if prompt.is_empty() {
            return Err(TurnError::EmptyInput);
        }

        let credential = self.session().credential().map(str::to_string);
        let Some(credential) = credential else {
            self.presenter
                .on_status_change("API Key Required", StatusKind::Error);
            return Err(TurnError::MissingCredential);
        };

        let _turn = self.begin_turn()?;

        let question = self.session().append(prompt, Sender::User);
        self.presenter.on_message_appended(&question);
        self.presenter.on_typing_start();

        debug!("Waiting for reply to a {} byte prompt", prompt.len());
        let result = self.client.ask(prompt, &credential).await;

        self.presenter.on_typing_end();

        match result {
            Ok(text) => {
                let reply = self.session().append(&text, Sender::Assistant);
                self.presenter.on_message_appended(&reply);
                self.presenter.on_status_change("Connected", StatusKind::Success);
                Ok(TurnOutcome::Replied(reply))
            }
            Err(e) => {
                error!("Error calling Gemini API: {}", e);
                let reply = self.session().append(FALLBACK_REPLY, Sender::Assistant);
                self.presenter.on_message_appended(&reply);
                self.presenter.on_status_change("Error", StatusKind::Error);
                Ok(TurnOutcome::Failed { reply, error: e })
            }
        }
    }

    pub fn save_credential(&self, key: &str) -> eyre::Result<()> {
        self.session().save_credential(key)?;
        info!("API key updated");
        self.presenter.on_status_change("Connected", StatusKind::Success);
        Ok(())
    }

    pub fn toggle_theme(&self) -> bool {
        let dark = self.session().toggle_theme();
        self.presenter.on_theme_change(dark);
        dark
    }

    /// Render every stored message without appending anything.
    pub fn replay_history(&self) -> usize {
        let history = self.session().history().to_vec();
        for message in &history {
            self.presenter.on_message_appended(message);
        }
        history.len()
    }

    /// Report the initial status the way a freshly opened chat does.
    pub fn announce_status(&self) {
        if self.session().credential().is_some() {
            self.presenter.on_status_change("Connected", StatusKind::Success);
        } else {
            self.presenter
                .on_status_change("API Key Required", StatusKind::Error);
        }
    }
}
