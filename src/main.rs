//! Switchboard 命令行入口
//!
//! 逐行读取标准输入，交给调度器处理，打印助手的最后一条回复；
//! transcript 打印上一轮完整记录，help 列出命令，exit / quit / bye / q 退出。
//! 单轮出错只记日志并提示，会话继续。

use anyhow::Context;
use switchboard::config::load_config;
use switchboard::memory::{last_reply, render_transcript, Turn};
use switchboard::{observability, Dispatcher, DispatcherBuilder};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

const HELP: &str = "Available commands:\n\
  help, h                  show this message\n\
  transcript               show the full record of the last request\n\
  exit, quit, bye, q       leave\n\
\n\
Anything else is sent to the assistants:\n\
  Mail      - \"Send an email to bob@example.com about the report\"\n\
  Calendar  - \"Schedule a meeting for Sept 1 at 4pm\"\n\
  Drive     - \"Search my files for 'report'\"\n\
  Memory    - \"What meeting did I just schedule?\"\n\
  Several   - \"Book a meeting tomorrow and then email the invite to alice\"\n";

#[derive(Debug, PartialEq)]
enum Command<'a> {
    Empty,
    Exit,
    Help,
    Transcript,
    Request(&'a str),
}

fn parse_command(line: &str) -> Command<'_> {
    let input = line.trim();
    match input.to_ascii_lowercase().as_str() {
        "" => Command::Empty,
        "exit" | "quit" | "bye" | "q" => Command::Exit,
        "help" | "h" => Command::Help,
        "transcript" => Command::Transcript,
        _ => Command::Request(input),
    }
}

/// 处理一条请求，返回要打印的文本；出错时记录日志并给出提示，不中断会话
async fn respond(
    dispatcher: &Dispatcher,
    session: &str,
    input: &str,
    last_turns: &mut Vec<Turn>,
) -> String {
    match dispatcher.handle_turn(session, input).await {
        Ok(turns) => {
            let text = match last_reply(&turns) {
                Some(reply) => format!("Assistant: {reply}"),
                None => "Task completed!".to_string(),
            };
            *last_turns = turns;
            text
        }
        Err(e) => {
            tracing::error!(session = %session, error = %e, "Dispatch failed");
            format!("An error occurred: {e}\nPlease try again or type 'exit' to quit.")
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    observability::init();

    let config_path = std::env::args().nth(1).map(std::path::PathBuf::from);
    let cfg = load_config(config_path).unwrap_or_else(|e| {
        tracing::warn!("Config load failed ({}), using defaults", e);
        Default::default()
    });

    let dispatcher = DispatcherBuilder::new(cfg)
        .build()
        .await
        .context("Failed to build dispatcher")?;

    let session = std::env::var("SWITCHBOARD_SESSION")
        .ok()
        .filter(|s| !s.trim().is_empty())
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
    tracing::info!(session = %session, "Session started");

    let mut stdout = tokio::io::stdout();
    stdout
        .write_all(b"Type 'help' for commands, 'exit' to quit.\n")
        .await?;
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut last_turns: Vec<Turn> = Vec::new();
    loop {
        stdout.write_all(b"> ").await?;
        stdout.flush().await?;

        let Some(line) = lines.next_line().await? else {
            break;
        };
        let output = match parse_command(&line) {
            Command::Empty => continue,
            Command::Exit => break,
            Command::Help => HELP.to_string(),
            Command::Transcript if last_turns.is_empty() => "Nothing to show yet.".to_string(),
            Command::Transcript => render_transcript(&last_turns),
            Command::Request(input) => respond(&dispatcher, &session, input, &mut last_turns).await,
        };
        stdout.write_all(output.as_bytes()).await?;
        stdout.write_all(b"\n").await?;
    }

    stdout.write_all(b"Goodbye!\n").await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Arc;
    use switchboard::assistant::AssistantRegistry;
    use switchboard::core::StoreError;
    use switchboard::router::KeywordRouter;
    use switchboard::session::{MemorySessionStore, SessionStore};

    /// 写入总是失败的存储
    struct BrokenStore;

    #[async_trait]
    impl SessionStore for BrokenStore {
        async fn get_history(&self, _key: &str) -> Result<Vec<Turn>, StoreError> {
            Ok(Vec::new())
        }

        async fn append(&self, _key: &str, _turns: Vec<Turn>) -> Result<(), StoreError> {
            Err(StoreError::Backend("disk full".to_string()))
        }

        async fn len(&self, _key: &str) -> Result<usize, StoreError> {
            Ok(0)
        }

        async fn purge(&self, _key: &str) -> Result<bool, StoreError> {
            Ok(false)
        }

        async fn session_count(&self) -> Result<usize, StoreError> {
            Ok(0)
        }
    }

    fn dispatcher(store: Arc<dyn SessionStore>) -> Dispatcher {
        Dispatcher::new(store, Arc::new(KeywordRouter::new()), AssistantRegistry::new())
    }

    #[test]
    fn test_parse_command() {
        for word in ["exit", "quit", "bye", "q", " Bye "] {
            assert_eq!(parse_command(word), Command::Exit);
        }
        assert_eq!(parse_command("help"), Command::Help);
        assert_eq!(parse_command("H"), Command::Help);
        assert_eq!(parse_command("transcript"), Command::Transcript);
        assert_eq!(parse_command("   "), Command::Empty);
        assert_eq!(
            parse_command(" book a meeting "),
            Command::Request("book a meeting")
        );
    }

    #[tokio::test]
    async fn test_error_is_reported_and_session_continues() {
        let d = dispatcher(Arc::new(BrokenStore));
        let mut last = Vec::new();

        let first = respond(&d, "s1", "book a meeting", &mut last).await;
        assert!(first.starts_with("An error occurred:"));
        assert!(first.contains("disk full"));
        assert!(last.is_empty());

        // 同一会话可以继续提交
        let second = respond(&d, "s1", "hello", &mut last).await;
        assert!(second.starts_with("An error occurred:"));
    }

    #[tokio::test]
    async fn test_reply_mode_prints_last_reply() {
        let d = dispatcher(Arc::new(MemorySessionStore::new()));
        let mut last = Vec::new();
        // 没有注册助手：调度器给出澄清问题
        let out = respond(&d, "s1", "hello there", &mut last).await;
        assert!(out.starts_with("Assistant: "));
        assert_eq!(last.len(), 2);
        assert!(render_transcript(&last).contains("[Human]"));
    }
}
