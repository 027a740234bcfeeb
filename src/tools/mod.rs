//! 工具层：助手可调用的操作抽象、注册表、带超时的执行器

pub mod executor;
pub mod registry;
pub mod schema;

pub use executor::{ToolError, ToolExecutor};
pub use registry::{Tool, ToolRegistry};
pub use schema::{reply_schema_json, tool_call_schema_json};
