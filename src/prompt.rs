//! Interactive yes/no decisions
//!
//! Conflict resolution sometimes needs to ask the user. The crawler only sees
//! the [`DecisionProvider`] trait, so the terminal prompt can be swapped for a
//! fixed answer (non-interactive runs) or a scripted sequence (tests).

use async_trait::async_trait;
use std::io::Write;

/// Answers yes/no questions during a run
#[async_trait]
pub trait DecisionProvider: Send + Sync {
    /// Asks a question and returns the answer. `default` is what an empty
    /// answer means, and what non-interactive providers should lean on.
    async fn ask(&self, question: &str, default: bool) -> bool;
}

/// Asks on the terminal, reading a `y`/`n` answer from stdin
pub struct Terminal;

#[async_trait]
impl DecisionProvider for Terminal {
    async fn ask(&self, question: &str, default: bool) -> bool {
        let question = question.to_string();
        let answer = tokio::task::spawn_blocking(move || ask_blocking(&question, default)).await;
        // If the blocking task panicked or stdin closed, fall back to the default
        answer.unwrap_or(default)
    }
}

fn ask_blocking(question: &str, default: bool) -> bool {
    let hint = if default { "[Y/n]" } else { "[y/N]" };
    loop {
        print!("{question} {hint} ");
        if std::io::stdout().flush().is_err() {
            return default;
        }

        let mut line = String::new();
        match std::io::stdin().read_line(&mut line) {
            Ok(0) | Err(_) => return default,
            Ok(_) => {}
        }

        match line.trim().to_ascii_lowercase().as_str() {
            "" => return default,
            "y" | "yes" => return true,
            "n" | "no" => return false,
            other => println!("Unrecognized answer: {other}"),
        }
    }
}

/// Never asks, always answers with the question's default
pub struct Defaults;

#[async_trait]
impl DecisionProvider for Defaults {
    async fn ask(&self, _question: &str, default: bool) -> bool {
        default
    }
}

/// Replays a fixed sequence of answers, then falls back to defaults.
/// Useful for tests and for scripted non-interactive runs.
pub struct Scripted {
    answers: std::sync::Mutex<std::collections::VecDeque<bool>>,
}

impl Scripted {
    pub fn new(answers: impl IntoIterator<Item = bool>) -> Self {
        Self {
            answers: std::sync::Mutex::new(answers.into_iter().collect()),
        }
    }
}

#[async_trait]
impl DecisionProvider for Scripted {
    async fn ask(&self, _question: &str, default: bool) -> bool {
        self.answers.lock().unwrap().pop_front().unwrap_or(default)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_defaults_echoes_default() {
        assert!(Defaults.ask("overwrite?", true).await);
        assert!(!Defaults.ask("delete?", false).await);
    }

    #[tokio::test]
    async fn test_scripted_replays_then_falls_back() {
        let scripted = Scripted::new([true, false]);
        assert!(scripted.ask("first?", false).await);
        assert!(!scripted.ask("second?", true).await);
        assert!(scripted.ask("third?", true).await);
    }
}
