use std::io::{self, BufRead, Write};

use crate::logger::log;
use crate::models::{NotebookHandle, NotebookKey};

const ERROR_PREFIX: &str = "Error: ";

/// Asks the user for a notebook's key. `None` means the prompt was dismissed.
#[allow(async_fn_in_trait)]
pub trait KeyPrompt {
    async fn prompt_for_key(&self, handle: &NotebookHandle) -> Option<NotebookKey>;
}

/// A yes/no question.
#[allow(async_fn_in_trait)]
pub trait Confirm {
    async fn confirm(&self, title: &str, text: &str) -> bool;
}

/// Free-form line input; `None` at end of input.
#[allow(async_fn_in_trait)]
pub trait LineInput {
    async fn next_line(&self, label: &str) -> Option<String>;
}

/// Fire-and-forget error display.
pub trait ErrorReporter {
    fn report_error(&self, message: &str);
}

/// Prompts on the controlling terminal. Reads run on the blocking pool so the
/// runtime keeps serving other tasks while the user types.
#[derive(Debug, Default, Clone, Copy)]
pub struct TerminalPrompter;

impl TerminalPrompter {
    /// Hidden input; empty input or a closed terminal counts as cancel.
    pub async fn read_secret(&self, label: &str) -> Option<NotebookKey> {
        let label = label.to_string();
        match tokio::task::spawn_blocking(move || rpassword::prompt_password(label)).await {
            Ok(Ok(secret)) if !secret.is_empty() => Some(NotebookKey::new(secret)),
            Ok(Ok(_)) => None,
            Ok(Err(e)) => {
                log(&format!("TerminalPrompter: could not read secret: {}", e));
                None
            }
            Err(e) => {
                log(&format!("TerminalPrompter: secret prompt panicked: {}", e));
                None
            }
        }
    }

    /// One line without its terminator; `None` at end of input.
    pub async fn read_line(&self, label: &str) -> Option<String> {
        let label = label.to_string();
        let res = tokio::task::spawn_blocking(move || -> io::Result<Option<String>> {
            let mut stderr = io::stderr();
            write!(stderr, "{}", label)?;
            stderr.flush()?;

            let mut line = String::new();
            if io::stdin().lock().read_line(&mut line)? == 0 {
                return Ok(None);
            }
            Ok(Some(line.trim_end_matches(['\r', '\n']).to_string()))
        })
        .await;

        match res {
            Ok(Ok(line)) => line,
            Ok(Err(e)) => {
                log(&format!("TerminalPrompter: could not read input: {}", e));
                None
            }
            Err(e) => {
                log(&format!("TerminalPrompter: input prompt panicked: {}", e));
                None
            }
        }
    }
}

impl KeyPrompt for TerminalPrompter {
    async fn prompt_for_key(&self, handle: &NotebookHandle) -> Option<NotebookKey> {
        eprintln!("Notebook '{}' is locked.", handle.name);
        if !handle.description.is_empty() {
            eprintln!("  {}", handle.description);
        }
        self.read_secret("Key (leave empty to cancel): ").await
    }
}

impl LineInput for TerminalPrompter {
    async fn next_line(&self, label: &str) -> Option<String> {
        self.read_line(label).await
    }
}

impl Confirm for TerminalPrompter {
    async fn confirm(&self, title: &str, text: &str) -> bool {
        eprintln!("{}", title);
        let answer = self.read_line(&format!("{} [y/N] ", text)).await;
        matches!(
            answer.as_deref().map(|a| a.trim().to_ascii_lowercase()),
            Some(a) if a == "y" || a == "yes"
        )
    }
}

/// Prints errors to stderr and records them in the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct TerminalReporter;

impl ErrorReporter for TerminalReporter {
    fn report_error(&self, message: &str) {
        log(&format!("Reported error: {}", message));
        eprintln!("{}{}", ERROR_PREFIX, message);
    }
}
