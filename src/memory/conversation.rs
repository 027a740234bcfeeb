//! LLM 上下文消息
//!
//! Message / Role 与 LLM API 对齐；to_llm_messages 把会话 Turn 序列投影为模型可读的消息列表。

use serde::{Deserialize, Serialize};

use crate::memory::{Turn, TurnKind, TurnPayload};

/// 消息角色（与 LLM API 一致）
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Role {
    User,
    Assistant,
    System,
}

/// 单条消息
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }
}

/// 将 Turn 序列转为 LLM 消息：
/// 工具调用写成 assistant 的 JSON，工具结果写成 user 侧的 Observation，交接记录不进入上下文
pub fn to_llm_messages(turns: &[Turn]) -> Vec<Message> {
    turns
        .iter()
        .filter_map(|t| match t.kind {
            TurnKind::UserMessage => Some(Message::user(t.content.clone())),
            TurnKind::AssistantMessage => Some(match t.author() {
                Some(id) => Message::assistant(format!("[{}] {}", id, t.content)),
                None => Message::assistant(t.content.clone()),
            }),
            TurnKind::ToolInvocation => t.tool_call().map(|(_, tool, args)| {
                Message::assistant(serde_json::json!({ "tool": tool, "args": args }).to_string())
            }),
            TurnKind::ToolResult => {
                let (tool, is_error) = match &t.payload {
                    Some(TurnPayload::ToolOutput { tool, is_error, .. }) => {
                        (tool.as_str(), *is_error)
                    }
                    _ => ("tool", false),
                };
                let prefix = if is_error { "Error: " } else { "" };
                Some(Message::user(format!(
                    "Observation from {}: {}{}",
                    tool, prefix, t.content
                )))
            }
            TurnKind::HandoffNotice => None,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::AssistantId;

    #[test]
    fn test_to_llm_messages_skips_handoffs() {
        let id = AssistantId::new("drive_agent");
        let turns = vec![
            Turn::user("find report"),
            Turn::handoff_to(&id),
            Turn::tool_invocation("c1", "drive_search_file", serde_json::json!({"file_name": "report"})),
            Turn::tool_result("c1", "drive_search_file", "report.pdf (id: 42)", false),
            Turn::assistant(&id, "Found report.pdf"),
            Turn::handoff_back(&id),
        ];
        let msgs = to_llm_messages(&turns);
        assert_eq!(msgs.len(), 4);
        assert_eq!(msgs[0].role, Role::User);
        assert!(msgs[1].content.contains("\"tool\":\"drive_search_file\""));
        assert!(msgs[2].content.starts_with("Observation from drive_search_file"));
        assert_eq!(msgs[3].content, "[drive_agent] Found report.pdf");
    }

    #[test]
    fn test_error_result_is_marked() {
        let turns = vec![Turn::tool_result("c1", "gmail_send_message", "401", true)];
        let msgs = to_llm_messages(&turns);
        assert!(msgs[0].content.contains("Error: 401"));
    }
}
