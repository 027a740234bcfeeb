//! 路由层：决定本次调度周期由哪个助手接手
//!
//! 路由器本身无状态：进度由历史中「最近一条用户消息之后的交回记录」推导，
//! 因此同一请求跨多个领域时，每个周期只分配一个助手，依请求中的顺序推进。

pub mod keyword;
pub mod llm;

use async_trait::async_trait;

use crate::assistant::AssistantProfile;
use crate::core::DispatchError;
use crate::memory::{since_last_user, AssistantId, Turn};

pub use keyword::KeywordRouter;
pub use llm::LlmRouter;

/// 单个调度周期的路由结果（不单独持久化）
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoutingDecision {
    /// 交给某个助手处理 task（请求中属于该助手的部分）
    Assign { assistant: AssistantId, task: String },
    /// 无法确定，向用户提问
    Ambiguous { question: String },
    /// 本轮请求已处理完
    Finished,
}

/// 路由策略
#[async_trait]
pub trait Router: Send + Sync {
    /// history 包含最新的用户消息及本轮已产生的记录
    async fn route(
        &self,
        history: &[Turn],
        user_text: &str,
        assistants: &[AssistantProfile],
    ) -> Result<RoutingDecision, DispatchError>;
}

/// 本轮已完成（已交回调度器）的助手，按顺序
pub fn completed_this_turn(history: &[Turn]) -> Vec<String> {
    since_last_user(history)
        .iter()
        .filter_map(|t| t.returned_from().map(str::to_string))
        .collect()
}

/// 上一个调度周期是否停在「助手等待用户回复」；是则返回该助手
///
/// 只看最新用户消息之前的那一条记录：助手完成、失败或路由提问之后都不算。
pub fn waiting_assistant(history: &[Turn]) -> Option<AssistantId> {
    let idx = history.iter().rposition(Turn::is_user)?;
    history[..idx]
        .last()
        .and_then(Turn::waiting_on)
        .map(AssistantId::new)
}

/// 当前请求的起点：若最新用户消息是对等待中助手的回复，沿跟进链回溯到发起请求的那条用户消息
pub fn request_origin(history: &[Turn]) -> Option<usize> {
    let mut idx = history.iter().rposition(Turn::is_user)?;
    while idx > 0 && history[idx - 1].waiting_on().is_some() {
        match history[..idx - 1].iter().rposition(Turn::is_user) {
            Some(prev) => idx = prev,
            None => break,
        }
    }
    Some(idx)
}

/// 从 start 起已完成的助手（不含停下等待用户的交回）
pub fn completed_since(history: &[Turn], start: usize) -> usize {
    history
        .get(start..)
        .unwrap_or_default()
        .iter()
        .filter(|t| t.returned_from().is_some() && t.waiting_on().is_none())
        .count()
}

/// 列出可用助手的澄清问题
pub fn clarifying_question(assistants: &[AssistantProfile]) -> String {
    let options: Vec<String> = assistants
        .iter()
        .map(|p| format!("- {}: {}", p.id, p.description))
        .collect();
    format!(
        "I'm not sure which assistant should handle this. I can help with:\n{}\nWhich one do you mean?",
        options.join("\n")
    )
}
