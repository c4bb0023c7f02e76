//! Interactive confirmation for destructive commands.

use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

use crate::Result;

#[cfg_attr(test, automock)]
#[async_trait]
pub trait Prompt: Send + Sync {
    /// Show `question` and return the trimmed answer.
    async fn ask(&self, question: &str) -> Result<String>;
}

/// [`Prompt`] reading answers from the terminal.
#[derive(Debug, Default, Clone, Copy)]
pub struct StdinPrompt;

#[async_trait]
impl Prompt for StdinPrompt {
    async fn ask(&self, question: &str) -> Result<String> {
        let mut stdout = tokio::io::stdout();
        stdout.write_all(format!("{} ", question).as_bytes()).await?;
        stdout.flush().await?;

        let mut input = String::new();
        let mut reader = BufReader::new(tokio::io::stdin());
        reader.read_line(&mut input).await?;
        Ok(input.trim().to_string())
    }
}

/// Ask a yes/no question; anything but `y` or `yes` is a no.
pub async fn confirm(prompt: &dyn Prompt, question: &str) -> Result<bool> {
    let answer = prompt.ask(&format!("{} [y/N]", question)).await?;
    Ok(matches!(answer.to_ascii_lowercase().as_str(), "y" | "yes"))
}
