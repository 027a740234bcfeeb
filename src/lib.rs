//! Switchboard - 带会话记忆的多助手调度器
//!
//! 模块划分：
//! - **assistant**: 任务助手接口、注册表、内置档案（邮件 / 日历 / 网盘）、工具循环实现
//! - **config**: 应用配置加载（TOML + 环境变量）
//! - **core**: 调度循环、会话监管、错误类型、构建器
//! - **llm**: LLM 客户端抽象与实现（OpenAI 兼容 / Mock / Scripted）
//! - **memory**: Turn 数据模型、LLM 消息转换、对话记录渲染
//! - **observability**: 日志初始化
//! - **router**: 路由决策（关键词 / LLM）
//! - **session**: 会话存储（内存 / SQLite）
//! - **tools**: 工具接口、注册表与执行器

pub mod assistant;
pub mod config;
pub mod core;
pub mod llm;
pub mod memory;
pub mod observability;
pub mod router;
pub mod session;
pub mod tools;

pub use crate::core::{Dispatcher, DispatcherBuilder};
