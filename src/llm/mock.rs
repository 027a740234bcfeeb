//! 离线 LLM 客户端（无需 API）
//!
//! - MockLlmClient：把最后一条 User 消息作为纯文本回复，便于本地跑通调度流程
//! - ScriptedLlmClient：按顺序回放预设回复，并记录每次收到的消息（测试用）

use std::collections::VecDeque;

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::llm::{LlmClient, LlmError};
use crate::memory::{Message, Role};

/// Mock 客户端：回显用户最后一条消息
#[derive(Debug, Default)]
pub struct MockLlmClient;

#[async_trait]
impl LlmClient for MockLlmClient {
    async fn complete(&self, messages: &[Message]) -> Result<String, LlmError> {
        let last_user = messages
            .iter()
            .rev()
            .find(|m| m.role == Role::User)
            .map(|m| m.content.as_str())
            .unwrap_or("(no input)");

        Ok(format!("(mock) Noted: {}", last_user))
    }
}

/// 回放客户端：每次 complete 弹出一条预设回复；用完后返回 EmptyResponse
#[derive(Debug, Default)]
pub struct ScriptedLlmClient {
    replies: Mutex<VecDeque<String>>,
    seen: Mutex<Vec<Vec<Message>>>,
}

impl ScriptedLlmClient {
    pub fn new<I, S>(replies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            replies: Mutex::new(replies.into_iter().map(Into::into).collect()),
            seen: Mutex::new(Vec::new()),
        }
    }

    /// 已收到的请求（每次调用的完整消息列表）
    pub async fn requests(&self) -> Vec<Vec<Message>> {
        self.seen.lock().await.clone()
    }

    pub async fn remaining(&self) -> usize {
        self.replies.lock().await.len()
    }
}

#[async_trait]
impl LlmClient for ScriptedLlmClient {
    async fn complete(&self, messages: &[Message]) -> Result<String, LlmError> {
        self.seen.lock().await.push(messages.to_vec());
        self.replies
            .lock()
            .await
            .pop_front()
            .ok_or(LlmError::EmptyResponse)
    }
}
