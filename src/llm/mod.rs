//! LLM 层：客户端抽象与实现（OpenAI 兼容 / Mock / Scripted）

pub mod mock;
pub mod openai;
pub mod traits;

use std::sync::Arc;

use crate::config::AppConfig;

pub use mock::{MockLlmClient, ScriptedLlmClient};
pub use openai::{OpenAiClient, TokenUsage};
pub use traits::{LlmClient, LlmError};

/// 根据配置与环境变量选择 LLM 后端：有 API Key 走 OpenAI 兼容端点，否则用 Mock
pub fn create_llm_from_config(cfg: &AppConfig) -> Arc<dyn LlmClient> {
    match std::env::var(&cfg.llm.api_key_env) {
        Ok(key) if !key.trim().is_empty() => {
            tracing::info!(model = %cfg.llm.model, "Using OpenAI-compatible LLM");
            Arc::new(OpenAiClient::new(
                cfg.llm.base_url.as_deref(),
                &cfg.llm.model,
                &key,
            ))
        }
        _ => {
            tracing::warn!(
                "{} not set, using Mock LLM",
                cfg.llm.api_key_env
            );
            Arc::new(MockLlmClient)
        }
    }
}

/// 是否存在可用的 API Key（决定默认路由策略）
pub fn has_api_key(cfg: &AppConfig) -> bool {
    std::env::var(&cfg.llm.api_key_env)
        .map(|k| !k.trim().is_empty())
        .unwrap_or(false)
}
