//! Line editing for the console: tab completion over the command table,
//! up/down history, and a raw single-keystroke read for UART passthrough.
//!
//! `crossterm` replaces the platform-specific `msvcrt`/`getch` split the
//! original tool used, with one cross-platform raw-mode API.

use async_trait::async_trait;
use crossterm::event::{self, Event, KeyCode, KeyEventKind};
use crossterm::terminal;
use std::io::Write;
use std::time::Duration;

#[async_trait]
pub trait LineEditor: Send + Sync {
    /// Reads and echoes a full line, with tab completion and history,
    /// blocking until Enter is pressed. Used in DEBUG mode.
    async fn read_line(&mut self) -> std::io::Result<String>;

    /// Non-blocking single-keystroke read. Returns `None` if no key is
    /// currently pending. Used in RAW passthrough mode.
    async fn poll_key(&mut self) -> std::io::Result<Option<u8>>;
}

fn is_valid_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '_' | ':' | '\\' | '.' | '/' | ' ')
}

pub struct TerminalLineEditor {
    prompt: String,
    commands: Vec<String>,
    history: Vec<String>,
}

impl TerminalLineEditor {
    pub fn new(prompt: impl Into<String>, commands: Vec<String>) -> Self {
        Self {
            prompt: prompt.into(),
            commands,
            history: Vec::new(),
        }
    }

    fn tab_completion(commands: &[String], line: &str) -> String {
        let matches: Vec<&str> = commands
            .iter()
            .map(String::as_str)
            .filter(|c| c.starts_with(line))
            .collect();
        let trimmed: Vec<&str> = matches.iter().map(|m| &m[line.len()..]).collect();
        if trimmed.is_empty() {
            return String::new();
        }
        let min_len = trimmed.iter().map(|s| s.len()).min().unwrap_or(0);
        let mut common_len = 0;
        'outer: for i in 0..min_len {
            let c0 = trimmed[0].as_bytes()[i];
            for t in &trimmed {
                if t.as_bytes()[i] != c0 {
                    break 'outer;
                }
            }
            common_len += 1;
        }
        trimmed[0][0..common_len].to_string()
    }

    fn clear_line(prompt: &str) {
        for _ in 0..80 {
            print!("\u{8} \u{8}");
        }
        print!("{}", prompt);
        let _ = std::io::stdout().flush();
    }
}

#[async_trait]
impl LineEditor for TerminalLineEditor {
    async fn read_line(&mut self) -> std::io::Result<String> {
        let prompt = self.prompt.clone();
        let commands = self.commands.clone();
        let history = self.history.clone();

        let (line, history) = tokio::task::spawn_blocking(move || -> std::io::Result<(String, Vec<String>)> {
            let mut history = history;
            let mut line = String::new();
            let mut history_index = history.len() as isize;

            print!("{}", prompt);
            std::io::stdout().flush()?;
            terminal::enable_raw_mode()?;

            let result = loop {
                let ev = event::read()?;
                let Event::Key(key) = ev else { continue };
                if key.kind != KeyEventKind::Press {
                    continue;
                }
                match key.code {
                    KeyCode::Enter => {
                        println!();
                        break line.clone();
                    }
                    KeyCode::Tab => {
                        let completion = TerminalLineEditor::tab_completion(&commands, &line);
                        print!("{}", completion);
                        let _ = std::io::stdout().flush();
                        line.push_str(&completion);
                    }
                    KeyCode::Backspace => {
                        if !line.is_empty() {
                            print!("\u{8} \u{8}");
                            let _ = std::io::stdout().flush();
                            line.pop();
                        }
                    }
                    KeyCode::Up => {
                        if history_index > 0 {
                            history_index -= 1;
                        }
                        if let Some(h) = history.get(history_index as usize) {
                            TerminalLineEditor::clear_line(&prompt);
                            line = h.clone();
                            print!("{}", line);
                            let _ = std::io::stdout().flush();
                        }
                    }
                    KeyCode::Down => {
                        if history_index < history.len() as isize - 1 {
                            history_index += 1;
                        }
                        if let Some(h) = history.get(history_index as usize) {
                            TerminalLineEditor::clear_line(&prompt);
                            line = h.clone();
                            print!("{}", line);
                            let _ = std::io::stdout().flush();
                        }
                    }
                    KeyCode::Char(c) if is_valid_char(c) => {
                        print!("{}", c);
                        let _ = std::io::stdout().flush();
                        line.push(c);
                    }
                    _ => {}
                }
            };

            terminal::disable_raw_mode()?;

            if !result.is_empty() {
                if history.last().map(String::as_str) != Some(result.as_str()) {
                    history.push(result.clone());
                }
            }

            Ok((result, history))
        })
        .await??;

        self.history = history;
        Ok(line)
    }

    async fn poll_key(&mut self) -> std::io::Result<Option<u8>> {
        if !event::poll(Duration::from_millis(0))? {
            return Ok(None);
        }
        let ev = event::read()?;
        if let Event::Key(key) = ev {
            if key.kind == KeyEventKind::Press {
                if let KeyCode::Char(c) = key.code {
                    return Ok(Some(c as u8));
                }
                if key.code == KeyCode::Enter {
                    return Ok(Some(b'\r'));
                }
            }
        }
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tab_completion_finds_longest_common_prefix() {
        let commands = vec!["reset".to_string(), "resume".to_string(), "read_data".to_string()];
        assert_eq!(TerminalLineEditor::tab_completion(&commands, "re"), "s");
    }

    #[test]
    fn tab_completion_empty_when_no_match() {
        let commands = vec!["reset".to_string()];
        assert_eq!(TerminalLineEditor::tab_completion(&commands, "zz"), "");
    }

    #[test]
    fn tab_completion_full_command_when_unique() {
        let commands = vec!["reset".to_string(), "resume".to_string()];
        assert_eq!(TerminalLineEditor::tab_completion(&commands, "rese"), "t");
    }

    #[test]
    fn valid_char_filter_matches_reference_alphabet() {
        for c in ['a', 'Z', '5', '_', ':', '\\', '.', '/', ' '] {
            assert!(is_valid_char(c));
        }
        for c in ['!', '@', '\t', '\n'] {
            assert!(!is_valid_char(c));
        }
    }
}
