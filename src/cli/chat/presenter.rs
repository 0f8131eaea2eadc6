use std::io::Write;
use std::sync::{Mutex, PoisonError};

use crossterm::cursor::MoveToColumn;
use crossterm::queue;
use crossterm::style::{Color, Print, PrintStyledContent, Stylize};
use crossterm::terminal::{Clear, ClearType};
use tracing::debug;

use super::conversation_state::{Message, Sender};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusKind {
    Success,
    Error,
}

/// Receives notifications from the controller. Implementations render;
/// nothing is ever read back.
pub trait Presenter: Send + Sync {
    fn on_message_appended(&self, message: &Message);
    fn on_typing_start(&self);
    fn on_typing_end(&self);
    fn on_status_change(&self, text: &str, kind: StatusKind);
    fn on_theme_change(&self, dark: bool);
}

struct Palette {
    user: Color,
    assistant: Color,
    muted: Color,
    success: Color,
    error: Color,
}

const DARK: Palette = Palette {
    user: Color::Cyan,
    assistant: Color::Green,
    muted: Color::Grey,
    success: Color::Green,
    error: Color::Red,
};

const LIGHT: Palette = Palette {
    user: Color::DarkBlue,
    assistant: Color::DarkGreen,
    muted: Color::DarkGrey,
    success: Color::DarkGreen,
    error: Color::DarkRed,
};

struct TerminalState {
    output: Box<dyn Write + Send>,
    dark: bool,
}

/// Writes the conversation to a terminal with crossterm styling.
pub struct TerminalPresenter {
    state: Mutex<TerminalState>,
}

impl TerminalPresenter {
    pub fn new(output: Box<dyn Write + Send>, dark: bool) -> Self {
        Self {
            state: Mutex::new(TerminalState { output, dark }),
        }
    }

    fn render(&self, draw: impl FnOnce(&mut Box<dyn Write + Send>, &Palette) -> std::io::Result<()>) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        let palette = if state.dark { &DARK } else { &LIGHT };
        let result = draw(&mut state.output, palette).and_then(|_| state.output.flush());
        if let Err(e) = result {
            debug!("Failed to write to terminal: {}", e);
        }
    }
}

impl Presenter for TerminalPresenter {
    fn on_message_appended(&self, message: &Message) {
        self.render(|out, palette| {
            let color = match message.sender {
                Sender::User => palette.user,
                Sender::Assistant => palette.assistant,
            };
            let time = message
                .timestamp
                .with_timezone(&chrono::Local)
                .format("%H:%M:%S")
                .to_string();

            queue!(
                out,
                PrintStyledContent(format!("[{}] ", time).with(palette.muted)),
                PrintStyledContent(format!("{}:", message.sender.label()).with(color).bold()),
                Print("\n"),
                Print(&message.content),
                Print("\n\n"),
            )
        });
    }

    fn on_typing_start(&self) {
        self.render(|out, palette| {
            queue!(
                out,
                PrintStyledContent("Gemini is typing...".with(palette.muted).italic())
            )
        });
    }

    fn on_typing_end(&self) {
        self.render(|out, _| queue!(out, Clear(ClearType::CurrentLine), MoveToColumn(0)));
    }

    fn on_status_change(&self, text: &str, kind: StatusKind) {
        self.render(|out, palette| {
            let color = match kind {
                StatusKind::Success => palette.success,
                StatusKind::Error => palette.error,
            };
            queue!(
                out,
                PrintStyledContent("● ".with(color)),
                PrintStyledContent(text.with(palette.muted)),
                Print("\n"),
            )
        });
    }

    fn on_theme_change(&self, dark: bool) {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .dark = dark;
        let name = if dark { "dark" } else { "light" };
        self.render(|out, palette| {
            queue!(
                out,
                PrintStyledContent(format!("Switched to {} theme.", name).with(palette.muted)),
                Print("\n"),
            )
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use std::sync::Arc;

    #[derive(Clone, Default)]
    struct SharedBuffer(Arc<Mutex<Vec<u8>>>);

    impl Write for SharedBuffer {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().expect("buffer").extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    impl SharedBuffer {
        fn contents(&self) -> String {
            String::from_utf8_lossy(&self.0.lock().expect("buffer")).into_owned()
        }
    }

    #[test]
    fn renders_sender_and_multiline_content() {
        let buffer = SharedBuffer::default();
        let presenter = TerminalPresenter::new(Box::new(buffer.clone()), false);

        presenter.on_message_appended(&Message {
            content: "line one\nline two".to_string(),
            sender: Sender::Assistant,
            timestamp: Utc::now(),
        });

        let out = buffer.contents();
        assert!(out.contains("Gemini:"));
        assert!(out.contains("line one\nline two"));
    }

    #[test]
    fn renders_status_and_theme() {
        let buffer = SharedBuffer::default();
        let presenter = TerminalPresenter::new(Box::new(buffer.clone()), false);

        presenter.on_status_change("Connected", StatusKind::Success);
        presenter.on_theme_change(true);

        let out = buffer.contents();
        assert!(out.contains("Connected"));
        assert!(out.contains("Switched to dark theme."));
    }
}
