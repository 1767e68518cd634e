//! Masked password prompt on stderr.

use std::io::Write;

use crossterm::{
    event::{self, Event, KeyCode, KeyEvent, KeyModifiers},
    terminal,
};

use crate::error::{CliError, Result};

struct RawModeGuard;

impl RawModeGuard {
    fn enter() -> Result<Self> {
        terminal::enable_raw_mode()?;
        Ok(Self)
    }
}

impl Drop for RawModeGuard {
    fn drop(&mut self) {
        let _ = terminal::disable_raw_mode();
    }
}

/// Reads a password without echoing it; every typed character shows as `*`.
pub fn password(prompt: &str) -> Result<String> {
    let _raw = RawModeGuard::enter()?;

    let mut out = std::io::stderr();
    write!(out, "{prompt}")?;
    out.flush()?;

    let mut buf = String::new();
    loop {
        let Event::Key(KeyEvent {
            code, modifiers, ..
        }) = event::read()?
        else {
            continue;
        };

        match code {
            KeyCode::Enter => {
                write!(out, "\r\n")?;
                out.flush()?;
                return Ok(buf);
            }
            KeyCode::Char('c') if modifiers.contains(KeyModifiers::CONTROL) => {
                write!(out, "\r\n")?;
                out.flush()?;
                return Err(CliError::Terminal("interrupted".to_string()));
            }
            KeyCode::Backspace => {
                if buf.pop().is_some() {
                    write!(out, "\x08 \x08")?;
                    out.flush()?;
                }
            }
            KeyCode::Char(ch) if !modifiers.contains(KeyModifiers::CONTROL) => {
                buf.push(ch);
                write!(out, "*")?;
                out.flush()?;
            }
            _ => {}
        }
    }
}
