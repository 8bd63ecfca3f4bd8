// file: src/cli/prompt.rs
// version: 1.0.0
// guid: 1d5b8f34-9a72-4c0e-b6e3-4f20a9d7c815

//! Yes/no operator prompts

use crate::Result;
use colored::Colorize;
use std::io::Write;

/// Source of operator answers for the post-install questions
#[async_trait::async_trait]
pub trait Prompter: Send + Sync {
    /// Ask a yes/no question; anything but an affirmative answer is "no"
    async fn confirm(&self, question: &str) -> Result<bool>;
}

/// `y` or `yes`, case-insensitive, surrounding whitespace ignored
pub fn is_affirmative(answer: &str) -> bool {
    matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes")
}

/// Reads answers from standard input
pub struct StdinPrompter;

#[async_trait::async_trait]
impl Prompter for StdinPrompter {
    async fn confirm(&self, question: &str) -> Result<bool> {
        print!("{} {} ", question.bold(), "[y/N]".dimmed());
        std::io::stdout().flush()?;

        let line = tokio::task::spawn_blocking(|| {
            let mut line = String::new();
            std::io::stdin().read_line(&mut line).map(|_| line)
        })
        .await
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))??;

        Ok(is_affirmative(&line))
    }
}

/// Answers "no" to every question
pub struct NonInteractive;

#[async_trait::async_trait]
impl Prompter for NonInteractive {
    async fn confirm(&self, question: &str) -> Result<bool> {
        tracing::info!("Non-interactive mode, answering no: {}", question);
        Ok(false)
    }
}
