//! 记忆层：会话记录（Turn）、LLM 消息投影、记录渲染

pub mod conversation;
pub mod transcript;
pub mod turn;

pub use conversation::{to_llm_messages, Message, Role};
pub use transcript::{last_reply, render_transcript};
pub use turn::{
    since_last_user, AssistantId, HandoffDirection, Turn, TurnKind, TurnPayload, DISPATCHER_NAME,
};
