//! 调度器错误类型
//!
//! 路由不确定（RoutingAmbiguous）与助手失败（AssistantFailure）不是 Err：
//! 调度器把它们写成一条给用户看的回复；这里只列出真正需要上抛给调用方的错误。

use thiserror::Error;

use crate::llm::LlmError;
use crate::memory::Turn;

/// 会话存储错误
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Store backend error: {0}")]
    Backend(String),

    #[error("Turn serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// handle_turn 上抛给调用方的错误
#[derive(Error, Debug)]
pub enum DispatchError {
    #[error("User input is empty")]
    EmptyInput,

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("Router LLM error: {0}")]
    Llm(#[from] LlmError),

    #[error("Router output parse error: {0}")]
    RouterParse(String),

    #[error("Config error: {0}")]
    Config(String),
}

/// 助手执行失败；由调度器转为可读回复，不重试
#[derive(Error, Debug)]
pub enum AssistantError {
    #[error("LLM error: {0}")]
    Llm(#[from] LlmError),

    #[error("Step limit reached after {0} steps")]
    StepLimit(usize),

    #[error("{0}")]
    Failed(String),

    /// 失败前已产生的 Turn；调度器会先追加这些记录再报告失败
    #[error("{source}")]
    Partial {
        turns: Vec<Turn>,
        source: Box<AssistantError>,
    },
}

impl AssistantError {
    /// 附上失败前已产生的记录（无记录时原样返回）
    pub fn with_partial(self, turns: Vec<Turn>) -> Self {
        if turns.is_empty() {
            return self;
        }
        Self::Partial {
            turns,
            source: Box::new(self),
        }
    }

    /// 拆出已产生的记录与根本错误
    pub fn into_parts(self) -> (Vec<Turn>, AssistantError) {
        match self {
            Self::Partial { turns, source } => {
                let (mut inner, root) = source.into_parts();
                let mut all = turns;
                all.append(&mut inner);
                (all, root)
            }
            other => (Vec::new(), other),
        }
    }
}
