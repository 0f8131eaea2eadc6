pub mod controller;
pub mod conversation_state;
pub mod presenter;
pub mod prompt;
pub mod session;

use std::io::Write;
use std::process::ExitCode;

use controller::{ConversationController, TurnError};
use eyre::Result;
use prompt::generate_prompt;
use rustyline::error::ReadlineError;
use tracing::{debug, info};

const WELCOME_TEXT: &str = "
Hi, I'm Gemini Chat. Ask me anything.

/key          Enter your Gemini API key (typing is hidden)
/theme        Toggle light and dark colors
/help         Show the help dialogue
/quit         Quit the application
";

const HELP_TEXT: &str = "
Gemini Chat

/key          Enter or replace your Gemini API key (typing is hidden)
/theme        Toggle light and dark colors
/history      Show the saved conversation again
/help         Show this help dialogue
/quit         Quit the application

Anything else is sent to Gemini.
";

pub struct ChatContext {
    output: Box<dyn Write>,
    input: Option<String>,
    interactive: bool,
    controller: ConversationController,
}

impl ChatContext {
    pub fn new(
        output: Box<dyn Write>,
        input: Option<String>,
        interactive: bool,
        controller: ConversationController,
    ) -> Self {
        Self {
            output,
            input,
            interactive,
            controller,
        }
    }

    pub async fn run(&mut self) -> Result<ExitCode> {
        // Single query
        if let Some(input) = self.input.take() {
            return self.run_once(&input).await;
        }

        if !self.interactive {
            return Ok(ExitCode::SUCCESS);
        }

        writeln!(self.output, "{}", WELCOME_TEXT)?;
        let replayed = self.controller.replay_history();
        debug!("Replayed {} saved messages", replayed);
        self.controller.announce_status();

        self.run_interactive().await?;

        Ok(ExitCode::SUCCESS)
    }

    async fn run_once(&mut self, input: &str) -> Result<ExitCode> {
        match self.controller.send(input).await {
            Ok(outcome) if outcome.is_success() => Ok(ExitCode::SUCCESS),
            Ok(_) => Ok(ExitCode::FAILURE),
            Err(e) => {
                writeln!(self.output, "{}", e)?;
                Ok(ExitCode::FAILURE)
            }
        }
    }

    async fn run_interactive(&mut self) -> Result<()> {
        let mut rl = prompt::rl()?;

        loop {
            let has_credential = self.controller.session().credential().is_some();
            let prompt_text = generate_prompt(has_credential);

            let line = match rl.readline(&prompt_text) {
                Ok(line) => line,
                Err(ReadlineError::Interrupted | ReadlineError::Eof) => break,
                Err(e) => {
                    writeln!(self.output, "Error: {}", e)?;
                    break;
                }
            };

            if line.trim().is_empty() {
                continue;
            }

            rl.add_history_entry(line.as_str());

            match line.trim() {
                "/quit" => break,
                "/key" => {
                    if let Some(key) = read_api_key()? {
                        if let Err(e) = self.controller.save_credential(&key) {
                            writeln!(self.output, "{}", e)?;
                        }
                    }
                }
                _ => self.handle_input(&line).await?,
            }
        }

        info!("Chat session ended");
        Ok(())
    }

    async fn handle_input(&mut self, input: &str) -> Result<()> {
        match input.trim() {
            "/help" => {
                writeln!(self.output, "{}", HELP_TEXT)?;
            }
            "/theme" => {
                self.controller.toggle_theme();
            }
            "/history" => {
                if self.controller.replay_history() == 0 {
                    writeln!(self.output, "No messages yet.")?;
                }
            }
            _ => match self.controller.send(input).await {
                Ok(_) => {}
                Err(TurnError::EmptyInput) => {}
                Err(e) => writeln!(self.output, "{}", e)?,
            },
        }

        Ok(())
    }
}

/// Ask for an API key on the terminal with the input hidden.
/// `None` when the prompt is cancelled.
pub fn read_api_key() -> Result<Option<String>> {
    Ok(prompt::read_masked("Gemini API key: ")?)
}
