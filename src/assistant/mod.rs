//! 任务助手层：调度器消费的接口、注册表、内置档案（邮件 / 日历 / 网盘）、基于 LLM 的工具循环实现

pub mod profile;
pub mod registry;
pub mod tool_loop;

use async_trait::async_trait;

use crate::core::AssistantError;
use crate::memory::Turn;

pub use profile::{builtin_profiles, AssistantProfile, CALENDAR_AGENT, DRIVE_AGENT, MAIL_AGENT};
pub use registry::AssistantRegistry;
pub use tool_loop::ToolLoopAssistant;

/// 助手本轮结束的原因（显式终止信号）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Completion {
    /// 任务完成
    Done,
    /// 缺少必要信息或等待用户确认，需用户回复后继续
    NeedsInput,
}

/// 一次 run 的产出：按顺序的 Turn（回复 / 工具调用 / 工具结果）+ 终止信号
#[derive(Debug, Clone)]
pub struct AssistantOutcome {
    pub turns: Vec<Turn>,
    pub completion: Completion,
}

impl AssistantOutcome {
    pub fn done(turns: Vec<Turn>) -> Self {
        Self {
            turns,
            completion: Completion::Done,
        }
    }

    pub fn needs_input(turns: Vec<Turn>) -> Self {
        Self {
            turns,
            completion: Completion::NeedsInput,
        }
    }
}

/// 任务助手：声明档案（含路由用的 id），按历史与本步请求执行
#[async_trait]
pub trait TaskAssistant: Send + Sync {
    fn profile(&self) -> &AssistantProfile;

    /// history 为调度器提供的上下文（含本轮用户消息与此前的交接记录）；request 为本步要处理的请求
    async fn run(&self, history: &[Turn], request: &str) -> Result<AssistantOutcome, AssistantError>;
}
