//! LLM 路由（监督者提示词 + JSON 决策）
//!
//! 把对话记录与助手列表交给模型，要求输出 {"next": "<助手 id>|FINISH|CLARIFY", "task": "...", "question": "..."}。

use std::fmt::Write;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;

use super::{clarifying_question, completed_this_turn, Router, RoutingDecision};
use crate::assistant::AssistantProfile;
use crate::core::DispatchError;
use crate::llm::LlmClient;
use crate::memory::{Message, Turn, TurnKind, TurnPayload};

const FINISH: &str = "FINISH";
const CLARIFY: &str = "CLARIFY";

#[derive(Debug, Deserialize)]
struct RouterReply {
    next: String,
    #[serde(default)]
    task: Option<String>,
    #[serde(default)]
    question: Option<String>,
}

pub struct LlmRouter {
    llm: Arc<dyn LlmClient>,
}

impl LlmRouter {
    pub fn new(llm: Arc<dyn LlmClient>) -> Self {
        Self { llm }
    }

    fn system_prompt(assistants: &[AssistantProfile]) -> String {
        let mut prompt = format!(
            "You are a supervisor managing {} agents:\n",
            assistants.len()
        );
        for p in assistants {
            let _ = writeln!(prompt, "- {}: {}", p.id, p.description);
        }
        prompt.push_str(
            "You have memory of previous conversations and can refer back to them.\n\
             When a user asks about something from earlier in the conversation, route to the agent that handled it.\n\
             Assign work to one agent at a time, do not call agents in parallel.\n\
             If the request needs several agents, assign them one per decision in the order the user asked.\n\
             If an agent handed back while waiting for the user's answer, send the answer to that agent, \
             then continue with the parts of the earlier request it had not reached.\n\
             Do not do any work yourself.\n\n\
             Output ONLY one JSON object:\n\
             {\"next\": \"<agent id>\", \"task\": \"<the part of the request for that agent>\"}\n\
             {\"next\": \"FINISH\"} when every part of the latest request has been handled\n\
             {\"next\": \"CLARIFY\", \"question\": \"<question for the user>\"} when you cannot tell which agent should act",
        );
        prompt
    }

    /// 紧凑的对话记录（含交接，路由需要知道谁已经处理过）
    fn render_history(history: &[Turn]) -> String {
        let mut out = String::new();
        for t in history {
            let _ = match t.kind {
                TurnKind::UserMessage => writeln!(out, "user: {}", t.content),
                TurnKind::AssistantMessage => match t.author() {
                    Some(id) => writeln!(out, "{}: {}", id, t.content),
                    None => writeln!(out, "supervisor: {}", t.content),
                },
                TurnKind::ToolInvocation => match t.tool_call() {
                    Some((_, tool, args)) => writeln!(out, "tool call {}: {}", tool, args),
                    None => Ok(()),
                },
                TurnKind::ToolResult => writeln!(out, "tool result: {}", t.content),
                TurnKind::HandoffNotice => match &t.payload {
                    Some(TurnPayload::Handoff {
                        from,
                        to,
                        needs_input: true,
                        ..
                    }) => writeln!(out, "handoff: {} -> {} (waiting for the user's answer)", from, to),
                    Some(TurnPayload::Handoff { from, to, .. }) => {
                        writeln!(out, "handoff: {} -> {}", from, to)
                    }
                    _ => Ok(()),
                },
            };
        }
        out
    }

    /// 提取 JSON（```json 代码块或首个 { 到最后一个 }）
    fn parse_reply(output: &str) -> Result<RouterReply, DispatchError> {
        let trimmed = output.trim();
        let json_str = if let Some(start) = trimmed.find("```json") {
            let rest = &trimmed[start + 7..];
            rest.find("```").map(|end| rest[..end].trim()).unwrap_or(rest.trim())
        } else if let (Some(start), Some(end)) = (trimmed.find('{'), trimmed.rfind('}')) {
            if start <= end {
                &trimmed[start..=end]
            } else {
                trimmed
            }
        } else {
            trimmed
        };
        serde_json::from_str(json_str)
            .map_err(|e| DispatchError::RouterParse(format!("{}: {}", e, json_str)))
    }
}

#[async_trait]
impl Router for LlmRouter {
    async fn route(
        &self,
        history: &[Turn],
        user_text: &str,
        assistants: &[AssistantProfile],
    ) -> Result<RoutingDecision, DispatchError> {
        let completed = completed_this_turn(history);
        let messages = vec![
            Message::system(Self::system_prompt(assistants)),
            Message::user(format!(
                "Conversation so far:\n{}\nLatest request: {}\nAgents that already handled the latest request: [{}]\nDecide the next step.",
                Self::render_history(history),
                user_text,
                completed.join(", ")
            )),
        ];

        let output = self.llm.complete(&messages).await?;
        let reply = Self::parse_reply(&output)?;
        let next = reply.next.trim();
        tracing::debug!(next = %next, "LLM routing");

        if next.eq_ignore_ascii_case(FINISH) {
            // 本轮尚未交接过就结束：不静默吞掉请求
            if completed.is_empty() {
                return Ok(RoutingDecision::Ambiguous {
                    question: reply
                        .question
                        .unwrap_or_else(|| clarifying_question(assistants)),
                });
            }
            return Ok(RoutingDecision::Finished);
        }

        if next.eq_ignore_ascii_case(CLARIFY) || next.is_empty() {
            return Ok(RoutingDecision::Ambiguous {
                question: reply
                    .question
                    .filter(|q| !q.trim().is_empty())
                    .unwrap_or_else(|| clarifying_question(assistants)),
            });
        }

        match assistants
            .iter()
            .find(|p| p.id.as_str().eq_ignore_ascii_case(next))
        {
            Some(p) => Ok(RoutingDecision::Assign {
                assistant: p.id.clone(),
                task: reply
                    .task
                    .filter(|t| !t.trim().is_empty())
                    .unwrap_or_else(|| user_text.to_string()),
            }),
            None => {
                tracing::warn!(next = %next, "LLM router named an unknown agent");
                Ok(RoutingDecision::Ambiguous {
                    question: clarifying_question(assistants),
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assistant::builtin_profiles;
    use crate::llm::ScriptedLlmClient;
    use crate::memory::AssistantId;

    async fn route_with(reply: &str, history: &[Turn]) -> Result<RoutingDecision, DispatchError> {
        let router = LlmRouter::new(Arc::new(ScriptedLlmClient::new([reply])));
        router.route(history, "req", &builtin_profiles()).await
    }

    #[tokio::test]
    async fn test_assign_with_task() {
        let decision = route_with(
            r#"{"next": "calendar_agent", "task": "schedule a meeting"}"#,
            &[Turn::user("req")],
        )
        .await
        .unwrap();
        assert_eq!(
            decision,
            RoutingDecision::Assign {
                assistant: AssistantId::new("calendar_agent"),
                task: "schedule a meeting".to_string()
            }
        );
    }

    #[tokio::test]
    async fn test_finish_before_any_handoff_is_ambiguous() {
        let decision = route_with(r#"{"next": "FINISH"}"#, &[Turn::user("req")])
            .await
            .unwrap();
        assert!(matches!(decision, RoutingDecision::Ambiguous { .. }));
    }

    #[tokio::test]
    async fn test_finish_after_handoff() {
        let cal = AssistantId::new("calendar_agent");
        let history = vec![Turn::user("req"), Turn::handoff_to(&cal), Turn::handoff_back(&cal)];
        let decision = route_with("```json\n{\"next\": \"FINISH\"}\n```", &history)
            .await
            .unwrap();
        assert_eq!(decision, RoutingDecision::Finished);
    }

    #[tokio::test]
    async fn test_clarify_and_unknown() {
        let decision = route_with(
            r#"{"next": "CLARIFY", "question": "Mail or drive?"}"#,
            &[Turn::user("req")],
        )
        .await
        .unwrap();
        assert_eq!(
            decision,
            RoutingDecision::Ambiguous {
                question: "Mail or drive?".to_string()
            }
        );

        let decision = route_with(r#"{"next": "weather_agent"}"#, &[Turn::user("req")])
            .await
            .unwrap();
        assert!(matches!(decision, RoutingDecision::Ambiguous { .. }));
    }

    #[tokio::test]
    async fn test_invalid_json() {
        let err = route_with("calendar please", &[Turn::user("req")])
            .await
            .unwrap_err();
        assert!(matches!(err, DispatchError::RouterParse(_)));
    }

    #[tokio::test]
    async fn test_prompt_lists_agents_and_progress() {
        let llm = Arc::new(ScriptedLlmClient::new([r#"{"next": "drive_agent"}"#]));
        let router = LlmRouter::new(llm.clone());
        let cal = AssistantId::new("calendar_agent");
        let history = vec![Turn::user("req"), Turn::handoff_to(&cal), Turn::handoff_back(&cal)];
        router.route(&history, "req", &builtin_profiles()).await.unwrap();

        let request = llm.requests().await.remove(0);
        assert!(request[0].content.contains("- mail_agent:"));
        assert!(request[0].content.contains("one agent at a time"));
        assert!(request[1].content.contains("handoff: supervisor -> calendar_agent"));
        assert!(request[1].content.contains("[calendar_agent]"));
    }

    #[tokio::test]
    async fn test_prompt_marks_waiting_assistant() {
        let llm = Arc::new(ScriptedLlmClient::new([r#"{"next": "mail_agent"}"#]));
        let router = LlmRouter::new(llm.clone());
        let mail = AssistantId::new("mail_agent");
        let history = vec![
            Turn::user("send a mail to bob"),
            Turn::handoff_to(&mail),
            Turn::handoff_back_waiting(&mail),
            Turn::user("yes"),
        ];
        router.route(&history, "yes", &builtin_profiles()).await.unwrap();

        let request = llm.requests().await.remove(0);
        assert!(request[1]
            .content
            .contains("handoff: mail_agent -> supervisor (waiting for the user's answer)"));
    }
}
