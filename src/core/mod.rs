//! 核心编排层：错误类型、会话监管、调度循环、构建器

pub mod builder;
pub mod dispatcher;
pub mod error;
pub mod session_supervisor;

pub use builder::DispatcherBuilder;
pub use dispatcher::{close_dangling_invocations, Dispatcher, DEFAULT_MAX_HANDOFFS};
pub use error::{AssistantError, DispatchError, StoreError};
pub use session_supervisor::SessionSupervisor;
