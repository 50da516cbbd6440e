// Raw terminal input for secrets

use std::io::{self, Write};

use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use crossterm::terminal;

/// Result type for terminal operations
pub type Result<T> = std::result::Result<T, io::Error>;

/// Keeps the terminal in raw mode while alive
pub struct RawMode {
    enabled: bool,
}

impl RawMode {
    pub fn enable() -> Result<Self> {
        terminal::enable_raw_mode()?;
        Ok(Self { enabled: true })
    }

    pub fn disable(&mut self) -> Result<()> {
        if self.enabled {
            terminal::disable_raw_mode()?;
            self.enabled = false;
        }
        Ok(())
    }
}

impl Drop for RawMode {
    fn drop(&mut self) {
        // Ensure we leave raw mode when dropped
        let _ = self.disable();
    }
}

/// Check if Ctrl+C or Esc was pressed
pub fn is_exit_key(key: &KeyEvent) -> bool {
    (key.code == KeyCode::Char('c') && key.modifiers.contains(KeyModifiers::CONTROL))
        || key.code == KeyCode::Esc
}

/// Reads a line without echoing it; `None` when the operator aborted
pub fn read_hidden_line() -> Result<Option<String>> {
    let mut raw = RawMode::enable()?;
    let mut line = String::new();
    let mut stdout = io::stdout();

    let result = loop {
        if let Event::Key(key) = event::read()? {
            if key.kind == KeyEventKind::Release {
                continue;
            }
            if is_exit_key(&key) {
                break None;
            }
            match key.code {
                KeyCode::Enter => break Some(line),
                KeyCode::Backspace => {
                    if line.pop().is_some() {
                        write!(stdout, "\x08 \x08")?;
                    }
                }
                KeyCode::Char(c) => {
                    line.push(c);
                    write!(stdout, "*")?;
                }
                _ => {}
            }
            stdout.flush()?;
        }
    };

    raw.disable()?;
    writeln!(stdout)?;
    Ok(result)
}
