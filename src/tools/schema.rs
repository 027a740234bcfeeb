//! 助手输出格式的 JSON Schema（schemars 生成）
//!
//! 拼入助手 system prompt，减少 LLM 输出格式错误。

use std::collections::HashMap;

use schemars::{schema_for, JsonSchema};

/// 工具调用：`{"tool": "...", "args": {...}}`（仅用于 Schema 生成）
#[allow(dead_code)]
#[derive(JsonSchema)]
struct ToolCallFormat {
    /// 工具名，如 calendar_create_event、gmail_send_message
    pub tool: String,
    /// 工具参数
    pub args: HashMap<String, serde_json::Value>,
}

/// 最终回复：`{"reply": "...", "done": true}`；done=false 表示在等用户补充信息
#[allow(dead_code)]
#[derive(JsonSchema)]
struct ReplyFormat {
    pub reply: String,
    pub done: bool,
}

pub fn tool_call_schema_json() -> String {
    serde_json::to_string_pretty(&schema_for!(ToolCallFormat)).unwrap_or_default()
}

pub fn reply_schema_json() -> String {
    serde_json::to_string_pretty(&schema_for!(ReplyFormat)).unwrap_or_default()
}
