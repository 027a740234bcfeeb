//! 会话记录单元：Turn
//!
//! 一次对话中的每个离散事件（用户输入、助手回复、工具调用、工具结果、交接通知）都是一条 Turn。
//! Turn 追加后不可变，顺序即回放顺序。

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// 调度器自身在交接记录中使用的名字
pub const DISPATCHER_NAME: &str = "supervisor";

/// 助手标识（如 mail_agent / calendar_agent / drive_agent）
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AssistantId(String);

impl AssistantId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AssistantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for AssistantId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// Turn 的种类
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnKind {
    UserMessage,
    AssistantMessage,
    ToolInvocation,
    ToolResult,
    HandoffNotice,
}

/// 交接方向
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HandoffDirection {
    /// 调度器 -> 助手
    ToAssistant,
    /// 助手 -> 调度器
    BackToDispatcher,
}

/// 可选的结构化负载
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TurnPayload {
    /// 回复由哪个助手给出（调度器自己发言时没有该负载）
    Author { assistant: AssistantId },
    ToolCall {
        call_id: String,
        tool: String,
        args: serde_json::Value,
    },
    ToolOutput {
        call_id: String,
        tool: String,
        is_error: bool,
    },
    Handoff {
        from: String,
        to: String,
        /// 交回时助手仍在等用户回复（确认、补充参数）
        #[serde(default, skip_serializing_if = "std::ops::Not::not")]
        needs_input: bool,
        direction: HandoffDirection,
    },
}

/// 单条会话记录
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Turn {
    pub kind: TurnKind,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<TurnPayload>,
    pub at: DateTime<Utc>,
}

impl Turn {
    fn new(kind: TurnKind, content: impl Into<String>, payload: Option<TurnPayload>) -> Self {
        Self {
            kind,
            content: content.into(),
            payload,
            at: Utc::now(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(TurnKind::UserMessage, content, None)
    }

    /// 助手回复（记录作者）
    pub fn assistant(assistant: &AssistantId, content: impl Into<String>) -> Self {
        Self::new(
            TurnKind::AssistantMessage,
            content,
            Some(TurnPayload::Author {
                assistant: assistant.clone(),
            }),
        )
    }

    /// 调度器自己的回复（澄清问题、失败说明）
    pub fn dispatcher(content: impl Into<String>) -> Self {
        Self::new(TurnKind::AssistantMessage, content, None)
    }

    pub fn tool_invocation(
        call_id: impl Into<String>,
        tool: impl Into<String>,
        args: serde_json::Value,
    ) -> Self {
        let tool = tool.into();
        Self::new(
            TurnKind::ToolInvocation,
            format!("call {tool}"),
            Some(TurnPayload::ToolCall {
                call_id: call_id.into(),
                tool,
                args,
            }),
        )
    }

    pub fn tool_result(
        call_id: impl Into<String>,
        tool: impl Into<String>,
        content: impl Into<String>,
        is_error: bool,
    ) -> Self {
        Self::new(
            TurnKind::ToolResult,
            content,
            Some(TurnPayload::ToolOutput {
                call_id: call_id.into(),
                tool: tool.into(),
                is_error,
            }),
        )
    }

    pub fn handoff_to(assistant: &AssistantId) -> Self {
        Self::new(
            TurnKind::HandoffNotice,
            format!("Successfully transferred to {assistant}"),
            Some(TurnPayload::Handoff {
                from: DISPATCHER_NAME.to_string(),
                to: assistant.to_string(),
                needs_input: false,
                direction: HandoffDirection::ToAssistant,
            }),
        )
    }

    pub fn handoff_back(assistant: &AssistantId) -> Self {
        Self::back_to_dispatcher(assistant, false)
    }

    /// 交回调度器，但助手在等用户回复；下一条用户消息视为对它的跟进
    pub fn handoff_back_waiting(assistant: &AssistantId) -> Self {
        Self::back_to_dispatcher(assistant, true)
    }

    fn back_to_dispatcher(assistant: &AssistantId, needs_input: bool) -> Self {
        Self::new(
            TurnKind::HandoffNotice,
            format!("Transferring back to {DISPATCHER_NAME}"),
            Some(TurnPayload::Handoff {
                from: assistant.to_string(),
                to: DISPATCHER_NAME.to_string(),
                needs_input,
                direction: HandoffDirection::BackToDispatcher,
            }),
        )
    }

    pub fn is_user(&self) -> bool {
        self.kind == TurnKind::UserMessage
    }

    /// 若为工具调用，返回 (call_id, tool, args)
    pub fn tool_call(&self) -> Option<(&str, &str, &serde_json::Value)> {
        match &self.payload {
            Some(TurnPayload::ToolCall { call_id, tool, args }) => {
                Some((call_id.as_str(), tool.as_str(), args))
            }
            _ => None,
        }
    }

    /// 若为工具结果，返回 call_id
    pub fn tool_output_id(&self) -> Option<&str> {
        match &self.payload {
            Some(TurnPayload::ToolOutput { call_id, .. }) => Some(call_id.as_str()),
            _ => None,
        }
    }

    /// 若为「助手交回调度器」的交接，返回交回的助手名
    pub fn returned_from(&self) -> Option<&str> {
        match &self.payload {
            Some(TurnPayload::Handoff {
                from,
                direction: HandoffDirection::BackToDispatcher,
                ..
            }) => Some(from.as_str()),
            _ => None,
        }
    }

    /// 若为「助手等待用户回复」的交回，返回该助手名
    pub fn waiting_on(&self) -> Option<&str> {
        match &self.payload {
            Some(TurnPayload::Handoff {
                from,
                needs_input: true,
                direction: HandoffDirection::BackToDispatcher,
                ..
            }) => Some(from.as_str()),
            _ => None,
        }
    }

    /// 回复作者（None 表示调度器或非回复类 Turn）
    pub fn author(&self) -> Option<&AssistantId> {
        match &self.payload {
            Some(TurnPayload::Author { assistant }) => Some(assistant),
            _ => None,
        }
    }
}

/// 最近一条用户消息之后的部分（即「当前用户轮次」已产生的记录）
pub fn since_last_user(history: &[Turn]) -> &[Turn] {
    match history.iter().rposition(Turn::is_user) {
        Some(idx) => &history[idx + 1..],
        None => history,
    }
}
