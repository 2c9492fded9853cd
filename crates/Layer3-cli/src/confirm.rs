//! 설치 확인 프롬프트

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

use plugkit_core::ConfirmInstall;

/// stdin y/N 프롬프트
pub struct StdinConfirm;

#[async_trait]
impl ConfirmInstall for StdinConfirm {
    async fn confirm(&self, specifiers: &[String]) -> bool {
        let mut stdout = tokio::io::stdout();
        let prompt = format!(
            "Install {} plugin(s)?\n{}\nProceed? [y/N] ",
            specifiers.len(),
            specifiers
                .iter()
                .map(|s| format!("  - {}", s))
                .collect::<Vec<_>>()
                .join("\n")
        );
        if stdout.write_all(prompt.as_bytes()).await.is_err() || stdout.flush().await.is_err() {
            return false;
        }

        let mut line = String::new();
        match BufReader::new(tokio::io::stdin()).read_line(&mut line).await {
            Ok(_) => is_yes(&line),
            Err(_) => false,
        }
    }
}

fn is_yes(answer: &str) -> bool {
    matches!(answer.trim().to_lowercase().as_str(), "y" | "yes")
}
