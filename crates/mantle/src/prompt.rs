//! Blocking stdin prompter for confirmations and elicitation forms.

use async_trait::async_trait;
use std::io::Write;

use mantle_core::agent::approval::Prompter;

pub struct TerminalPrompter;

#[async_trait]
impl Prompter for TerminalPrompter {
    async fn prompt(&self, message: &str) -> anyhow::Result<String> {
        let message = message.to_string();
        tokio::task::spawn_blocking(move || {
            let mut stdout = std::io::stdout();
            write!(stdout, "{message}")?;
            stdout.flush()?;

            let mut line = String::new();
            std::io::stdin().read_line(&mut line)?;
            Ok(line.trim_end_matches(['\r', '\n']).to_string())
        })
        .await?
    }
}
