//! 会话记录的可读渲染（命令行输出用）

use std::fmt::Write;

use crate::memory::{Turn, TurnKind, TurnPayload};

/// 若文本是 JSON 则美化输出，否则原样返回
fn maybe_pretty_json(text: &str) -> String {
    serde_json::from_str::<serde_json::Value>(text)
        .ok()
        .and_then(|v| serde_json::to_string_pretty(&v).ok())
        .unwrap_or_else(|| text.to_string())
}

/// 渲染整段记录：[Human] / [Assistant] / -> Tool call / [Tool:name] / [Handoff]
pub fn render_transcript(turns: &[Turn]) -> String {
    let mut out = String::from("\n===== Transcript =====\n\n");
    for turn in turns {
        let _ = match turn.kind {
            TurnKind::UserMessage => writeln!(out, "[Human] {}", turn.content),
            TurnKind::AssistantMessage => match turn.author() {
                Some(id) => writeln!(out, "[Assistant:{}] {}", id, turn.content),
                None => writeln!(out, "[Assistant] {}", turn.content),
            },
            TurnKind::ToolInvocation => match turn.tool_call() {
                Some((_, tool, args)) => writeln!(
                    out,
                    "  -> Tool call: {}\n{}",
                    tool,
                    serde_json::to_string_pretty(args).unwrap_or_else(|_| args.to_string())
                ),
                None => writeln!(out, "  -> Tool call: {}", turn.content),
            },
            TurnKind::ToolResult => {
                let tool = match &turn.payload {
                    Some(TurnPayload::ToolOutput { tool, .. }) => tool.as_str(),
                    _ => "tool",
                };
                writeln!(out, "[Tool:{}]\n{}", tool, maybe_pretty_json(&turn.content))
            }
            TurnKind::HandoffNotice => match &turn.payload {
                Some(TurnPayload::Handoff { from, to, .. }) => {
                    writeln!(out, "[Handoff] {} -> {}", from, to)
                }
                _ => writeln!(out, "[Handoff] {}", turn.content),
            },
        };
    }
    out.push_str("\n======================\n");
    out
}

/// 最后一条回复（助手或调度器）
pub fn last_reply(turns: &[Turn]) -> Option<&str> {
    turns
        .iter()
        .rev()
        .find(|t| t.kind == TurnKind::AssistantMessage)
        .map(|t| t.content.as_str())
}
