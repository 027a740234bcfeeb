//! 工具循环助手
//!
//! Decide -> Tool -> Observe -> 再 Decide，直到模型给出最终回复；
//! 回复 JSON 中的 done 字段即显式终止信号（done=false 表示等待用户补充信息）。

use std::sync::Arc;

use serde::Deserialize;

use super::{AssistantOutcome, AssistantProfile, TaskAssistant};
use crate::core::AssistantError;
use crate::llm::LlmClient;
use crate::memory::{to_llm_messages, Message, Turn};
use crate::tools::{reply_schema_json, tool_call_schema_json, ToolExecutor};

/// 模型单步输出
#[derive(Debug, Clone, PartialEq)]
pub enum AssistantStep {
    ToolCall {
        tool: String,
        args: serde_json::Value,
    },
    Reply {
        text: String,
        done: bool,
    },
}

#[derive(Deserialize)]
struct RawStep {
    #[serde(default)]
    tool: Option<String>,
    #[serde(default)]
    args: Option<serde_json::Value>,
    #[serde(default)]
    reply: Option<String>,
    #[serde(default)]
    done: Option<bool>,
}

/// 从文本中取出 JSON 片段：```json 代码块，或以 { 开头的整段
fn extract_json(trimmed: &str) -> Option<&str> {
    if let Some(start) = trimmed.find("```json") {
        let rest = &trimmed[start + 7..];
        return Some(rest.find("```").map(|end| rest[..end].trim()).unwrap_or(rest.trim()));
    }
    if trimmed.starts_with('{') {
        return Some(match trimmed.rfind('}') {
            Some(end) => &trimmed[..=end],
            None => trimmed,
        });
    }
    None
}

/// 解析模型输出：工具调用 / 回复 JSON / 纯文本（视为完成的回复）
pub fn parse_assistant_output(output: &str) -> Result<AssistantStep, String> {
    let trimmed = output.trim();
    let Some(json_str) = extract_json(trimmed) else {
        return Ok(AssistantStep::Reply {
            text: trimmed.to_string(),
            done: true,
        });
    };

    let raw: RawStep =
        serde_json::from_str(json_str).map_err(|e| format!("{}: {}", e, json_str))?;

    match (raw.tool, raw.reply) {
        (Some(tool), _) if !tool.trim().is_empty() => Ok(AssistantStep::ToolCall {
            tool,
            args: raw.args.unwrap_or_else(|| serde_json::json!({})),
        }),
        (_, Some(reply)) => Ok(AssistantStep::Reply {
            text: reply,
            done: raw.done.unwrap_or(true),
        }),
        _ => Err(format!("expected \"tool\" or \"reply\" field: {}", json_str)),
    }
}

/// LLM 驱动的任务助手：持有档案、LLM、可用工具、最大步数
pub struct ToolLoopAssistant {
    profile: AssistantProfile,
    llm: Arc<dyn LlmClient>,
    executor: ToolExecutor,
    max_steps: usize,
}

impl ToolLoopAssistant {
    pub fn new(
        profile: AssistantProfile,
        llm: Arc<dyn LlmClient>,
        executor: ToolExecutor,
        max_steps: usize,
    ) -> Self {
        Self {
            profile,
            llm,
            executor,
            max_steps: max_steps.max(1),
        }
    }

    fn system_prompt(&self) -> String {
        let tools = if self.executor.registry().is_empty() {
            "No tools are currently available. Answer from the conversation, or tell the user the operation is unavailable.".to_string()
        } else {
            format!("AVAILABLE TOOLS:\n{}", self.executor.registry().to_schema_json())
        };
        format!(
            "{}\n\n{}\n\n\
             OUTPUT FORMAT:\n\
             To call a tool, output ONLY one JSON object matching:\n{}\n\
             To answer the user, output ONLY one JSON object matching:\n{}\n\
             Set \"done\" to false when you are waiting for the user (missing information or a confirmation), true when the task is finished.",
            self.profile.system_prompt,
            tools,
            tool_call_schema_json(),
            reply_schema_json(),
        )
    }
}

#[async_trait::async_trait]
impl TaskAssistant for ToolLoopAssistant {
    fn profile(&self) -> &AssistantProfile {
        &self.profile
    }

    async fn run(&self, history: &[Turn], request: &str) -> Result<AssistantOutcome, AssistantError> {
        let system = Message::system(self.system_prompt());
        let mut messages = to_llm_messages(history);
        let already_last = history
            .iter()
            .rev()
            .find(|t| t.is_user())
            .map(|t| t.content == request)
            .unwrap_or(false);
        if !already_last {
            messages.push(Message::user(format!("Task from supervisor: {}", request)));
        }

        let mut turns: Vec<Turn> = Vec::new();

        for step in 0..self.max_steps {
            let mut full = Vec::with_capacity(messages.len() + 1);
            full.push(system.clone());
            full.extend(messages.iter().cloned());

            let output = match self.llm.complete(&full).await {
                Ok(o) => o,
                Err(e) => return Err(AssistantError::from(e).with_partial(turns)),
            };

            match parse_assistant_output(&output) {
                Ok(AssistantStep::ToolCall { tool, args }) => {
                    let call_id = format!("call_{}", uuid::Uuid::new_v4().simple());
                    tracing::debug!(assistant = %self.profile.id, step, tool = %tool, "Tool call");
                    let invocation = Turn::tool_invocation(&call_id, &tool, args.clone());
                    let result = match self.executor.execute(&tool, args).await {
                        Ok(content) => Turn::tool_result(&call_id, &tool, content, false),
                        Err(e) => Turn::tool_result(&call_id, &tool, e.to_string(), true),
                    };
                    messages.extend(to_llm_messages(&[invocation.clone(), result.clone()]));
                    turns.push(invocation);
                    turns.push(result);
                }
                Ok(AssistantStep::Reply { text, done }) => {
                    turns.push(Turn::assistant(&self.profile.id, text));
                    return Ok(if done {
                        AssistantOutcome::done(turns)
                    } else {
                        AssistantOutcome::needs_input(turns)
                    });
                }
                Err(raw) => {
                    tracing::warn!(assistant = %self.profile.id, step, "Unparseable output: {}", raw);
                    messages.push(Message::assistant(output));
                    messages.push(Message::user(format!(
                        "Your last output was not valid: {raw}. \
                         Output ONLY one JSON object: {{\"tool\": \"name\", \"args\": {{...}}}} \
                         or {{\"reply\": \"text\", \"done\": true}}."
                    )));
                }
            }
        }

        Err(AssistantError::StepLimit(self.max_steps).with_partial(turns))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::ScriptedLlmClient;
    use crate::memory::{TurnKind, TurnPayload};
    use crate::tools::{Tool, ToolRegistry};
    use async_trait::async_trait;

    struct SearchFiles;

    #[async_trait]
    impl Tool for SearchFiles {
        fn name(&self) -> &str {
            "drive_search_file"
        }

        fn description(&self) -> &str {
            "Search files by name"
        }

        async fn execute(&self, args: serde_json::Value) -> Result<String, String> {
            let name = args.get("file_name").and_then(|v| v.as_str()).unwrap_or("");
            Ok(format!("Found: {name}.pdf (id: f1)"))
        }
    }

    fn drive_assistant(llm: Arc<ScriptedLlmClient>, max_steps: usize) -> ToolLoopAssistant {
        let mut reg = ToolRegistry::new();
        reg.register(SearchFiles);
        ToolLoopAssistant::new(
            AssistantProfile::new("drive_agent", "files"),
            llm,
            ToolExecutor::new(reg, 5),
            max_steps,
        )
    }

    #[test]
    fn test_parse_tool_call() {
        let step = parse_assistant_output(r#"{"tool": "x", "args": {"a": 1}}"#).unwrap();
        assert_eq!(
            step,
            AssistantStep::ToolCall {
                tool: "x".to_string(),
                args: serde_json::json!({"a": 1})
            }
        );
    }

    #[test]
    fn test_parse_fenced_reply() {
        let step =
            parse_assistant_output("```json\n{\"reply\": \"Which address?\", \"done\": false}\n```")
                .unwrap();
        assert_eq!(
            step,
            AssistantStep::Reply {
                text: "Which address?".to_string(),
                done: false
            }
        );
    }

    #[test]
    fn test_parse_plain_text_is_done() {
        let step = parse_assistant_output("Meeting {sync} created.").unwrap();
        assert!(matches!(step, AssistantStep::Reply { done: true, .. }));
    }

    #[test]
    fn test_parse_invalid_json() {
        assert!(parse_assistant_output("{not json").is_err());
        assert!(parse_assistant_output(r#"{"foo": 1}"#).is_err());
    }

    #[tokio::test]
    async fn test_tool_then_reply() {
        let llm = Arc::new(ScriptedLlmClient::new([
            r#"{"tool": "drive_search_file", "args": {"file_name": "report"}}"#,
            r#"{"reply": "I found report.pdf (id: f1).", "done": true}"#,
        ]));
        let assistant = drive_assistant(llm.clone(), 5);
        let history = vec![Turn::user("search my files for report")];

        let outcome = assistant.run(&history, "search my files for report").await.unwrap();
        assert_eq!(outcome.completion, crate::assistant::Completion::Done);
        let kinds: Vec<TurnKind> = outcome.turns.iter().map(|t| t.kind).collect();
        assert_eq!(
            kinds,
            vec![TurnKind::ToolInvocation, TurnKind::ToolResult, TurnKind::AssistantMessage]
        );
        assert_eq!(
            outcome.turns[0].tool_call().map(|(id, _, _)| id),
            outcome.turns[1].tool_output_id()
        );
        assert!(outcome.turns[1].content.contains("report.pdf"));

        // 第二次请求能看到工具结果
        let requests = llm.requests().await;
        assert!(requests[1]
            .iter()
            .any(|m| m.content.starts_with("Observation from drive_search_file")));
        // 请求与最后一条用户消息相同，不重复追加
        assert!(!requests[0].iter().any(|m| m.content.starts_with("Task from supervisor")));
    }

    #[tokio::test]
    async fn test_unknown_tool_becomes_error_result() {
        let llm = Arc::new(ScriptedLlmClient::new([
            r#"{"tool": "gmail_send_message", "args": {}}"#,
            r#"{"reply": "I cannot send mail.", "done": true}"#,
        ]));
        let assistant = drive_assistant(llm, 5);
        let outcome = assistant.run(&[], "send a mail").await.unwrap();
        match &outcome.turns[1].payload {
            Some(TurnPayload::ToolOutput { is_error, .. }) => assert!(*is_error),
            _ => panic!("Expected tool output"),
        }
    }

    #[tokio::test]
    async fn test_needs_input() {
        let llm = Arc::new(ScriptedLlmClient::new([
            r#"{"reply": "What is your email address?", "done": false}"#,
        ]));
        let assistant = drive_assistant(llm, 5);
        let outcome = assistant.run(&[], "upload notes.txt").await.unwrap();
        assert_eq!(outcome.completion, crate::assistant::Completion::NeedsInput);
    }

    #[tokio::test]
    async fn test_step_limit_keeps_partial_turns() {
        let llm = Arc::new(ScriptedLlmClient::new([
            r#"{"tool": "drive_search_file", "args": {"file_name": "a"}}"#,
            r#"{"tool": "drive_search_file", "args": {"file_name": "b"}}"#,
        ]));
        let assistant = drive_assistant(llm, 2);
        let err = assistant.run(&[], "find a and b").await.unwrap_err();
        let (partial, root) = err.into_parts();
        assert_eq!(partial.len(), 4);
        assert!(matches!(root, AssistantError::StepLimit(2)));
    }

    #[tokio::test]
    async fn test_retry_after_invalid_output() {
        let llm = Arc::new(ScriptedLlmClient::new([
            "{broken",
            r#"{"reply": "ok", "done": true}"#,
        ]));
        let assistant = drive_assistant(llm.clone(), 3);
        let outcome = assistant.run(&[], "hi").await.unwrap();
        assert_eq!(outcome.turns.len(), 1);
        let last_request = llm.requests().await.pop().unwrap();
        assert!(last_request
            .last()
            .unwrap()
            .content
            .contains("was not valid"));
    }

    #[tokio::test]
    async fn test_llm_error() {
        let llm = Arc::new(ScriptedLlmClient::new(Vec::<String>::new()));
        let assistant = drive_assistant(llm, 3);
        let err = assistant.run(&[], "hi").await.unwrap_err();
        assert!(matches!(err, AssistantError::Llm(_)));
    }
}
