use std::io::{self, Write};

use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use crossterm::terminal;
use rustyline::{Config, Editor, Result};

pub fn generate_prompt(has_credential: bool) -> String {
    if has_credential {
        "> ".to_string()
    } else {
        "(no key) > ".to_string()
    }
}

pub fn rl() -> Result<Editor<()>> {
    let config = Config::builder()
        .history_ignore_space(true)
        .build();
    Editor::with_config(config)
}

#[derive(Debug, PartialEq, Eq)]
enum MaskedKey {
    Pushed,
    Erased,
    Ignored,
    Done,
    Cancelled,
}

fn apply_key(buffer: &mut String, key: KeyEvent) -> MaskedKey {
    if key.kind == KeyEventKind::Release {
        return MaskedKey::Ignored;
    }

    match key.code {
        KeyCode::Enter => MaskedKey::Done,
        KeyCode::Esc => MaskedKey::Cancelled,
        KeyCode::Char('c' | 'd') if key.modifiers.contains(KeyModifiers::CONTROL) => {
            MaskedKey::Cancelled
        }
        KeyCode::Backspace => match buffer.pop() {
            Some(_) => MaskedKey::Erased,
            None => MaskedKey::Ignored,
        },
        KeyCode::Char(c) => {
            buffer.push(c);
            MaskedKey::Pushed
        }
        _ => MaskedKey::Ignored,
    }
}

struct RawMode;

impl RawMode {
    fn enable() -> io::Result<Self> {
        terminal::enable_raw_mode()?;
        Ok(Self)
    }
}

impl Drop for RawMode {
    fn drop(&mut self) {
        let _ = terminal::disable_raw_mode();
    }
}

/// Read a line without echoing it; each character shows as `*`.
/// `None` when cancelled with Esc, Ctrl-C or Ctrl-D.
pub fn read_masked(prompt: &str) -> io::Result<Option<String>> {
    let mut out = io::stdout();
    write!(out, "{}", prompt)?;
    out.flush()?;

    let mut buffer = String::new();
    let outcome = {
        let _raw = RawMode::enable()?;
        loop {
            let Event::Key(key) = event::read()? else {
                continue;
            };
            match apply_key(&mut buffer, key) {
                MaskedKey::Pushed => write!(out, "*")?,
                MaskedKey::Erased => write!(out, "\u{8} \u{8}")?,
                MaskedKey::Ignored => {}
                MaskedKey::Done => break Some(buffer),
                MaskedKey::Cancelled => break None,
            }
            out.flush()?;
        }
    };

    writeln!(out)?;
    Ok(outcome)
}
