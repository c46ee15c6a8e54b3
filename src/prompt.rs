//! Interactive terminal prompts for `--interactive` runs.
//!
//! Single-key confirmation reads happen in raw mode; the guard below puts
//! the terminal back into cooked mode on every exit path, including an
//! interrupt delivered mid-read.
use std::io::{self, BufRead, Write};

use crossterm::{
    event::{self, Event, KeyCode, KeyEventKind, KeyModifiers},
    terminal,
};

use crate::error::SetupError;

struct RawModeGuard;

impl RawModeGuard {
    fn enter() -> io::Result<Self> {
        terminal::enable_raw_mode()?;
        Ok(Self)
    }
}

impl Drop for RawModeGuard {
    fn drop(&mut self) {
        let _ = terminal::disable_raw_mode();
    }
}

/// Asks a yes/no question, accepting a single Y/N keypress or Enter for the
/// default. Ctrl-C restores the terminal and yields `Interrupted`.
pub fn confirm(question: &str, default: bool) -> Result<bool, SetupError> {
    print!("{question} ");
    io::stdout().flush()?;

    let answer = {
        let _guard = RawModeGuard::enter()?;
        loop {
            let Event::Key(key) = event::read()? else {
                continue;
            };
            if key.kind != KeyEventKind::Press {
                continue;
            }
            if key.modifiers.contains(KeyModifiers::CONTROL)
                && matches!(key.code, KeyCode::Char('c' | 'C'))
            {
                return Err(SetupError::Interrupted);
            }
            match key.code {
                KeyCode::Char('y' | 'Y') => break true,
                KeyCode::Char('n' | 'N') => break false,
                KeyCode::Enter => break default,
                _ => {}
            }
        }
    };

    println!("{}", if answer { "Y" } else { "N" });
    Ok(answer)
}

/// Reads a full line in cooked mode; an empty answer yields the default.
pub fn read_line(question: &str, default: &str) -> Result<String, SetupError> {
    if default.is_empty() {
        print!("{question} ");
    } else {
        print!("{question} [{default}] ");
    }
    io::stdout().flush()?;

    let mut line = String::new();
    io::stdin().lock().read_line(&mut line)?;
    let trimmed = line.trim();
    Ok(if trimmed.is_empty() {
        default.to_string()
    } else {
        trimmed.to_string()
    })
}
