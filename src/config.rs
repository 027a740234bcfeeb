//! 应用配置：从 config/default.toml 与环境变量加载
//!
//! 加载顺序：先读 TOML 文件，再用环境变量 `SWITCHBOARD__*` 覆盖（双下划线表示嵌套，如 `SWITCHBOARD__ROUTER__STRATEGY=keyword`）。

use std::path::PathBuf;

use serde::Deserialize;

/// 应用配置根（对应 config/default.toml 的顶层）
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub app: AppSection,
    pub llm: LlmSection,
    pub router: RouterSection,
    pub dispatch: DispatchSection,
    pub session: SessionSection,
    pub tools: ToolsSection,
    /// 覆盖内置助手档案（按 id 匹配；未知 id 作为新助手追加）
    pub assistants: Vec<AssistantOverride>,
}

/// [app] 段
#[derive(Debug, Clone, Deserialize, Default)]
pub struct AppSection {
    pub name: Option<String>,
}

/// [llm] 段：模型、端点、API Key 所在的环境变量名
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LlmSection {
    pub model: String,
    pub base_url: Option<String>,
    pub api_key_env: String,
}

impl Default for LlmSection {
    fn default() -> Self {
        Self {
            model: "gpt-4o".to_string(),
            base_url: None,
            api_key_env: "OPENAI_API_KEY".to_string(),
        }
    }
}

/// 路由策略选择
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum RouterStrategy {
    /// 有 API Key 用 LLM 路由，否则用关键词路由
    #[default]
    Auto,
    Keyword,
    Llm,
}

/// [router] 段
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct RouterSection {
    pub strategy: RouterStrategy,
}

/// [dispatch] 段：单个用户轮次内最多交接次数
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DispatchSection {
    pub max_handoffs_per_turn: usize,
}

impl Default for DispatchSection {
    fn default() -> Self {
        Self {
            max_handoffs_per_turn: 8,
        }
    }
}

/// [session] 段
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct SessionSection {
    /// 传给路由器/助手的历史窗口上限（条数）；不设置则传全部历史。存储本身从不截断
    pub context_window_turns: Option<usize>,
    /// SQLite 路径（需 async-sqlite feature）；不设置则用内存存储
    pub db_path: Option<PathBuf>,
}

/// [tools] 段：工具超时与助手内部最大步数
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ToolsSection {
    pub timeout_secs: u64,
    pub max_steps: usize,
}

impl Default for ToolsSection {
    fn default() -> Self {
        Self {
            timeout_secs: 30,
            max_steps: 10,
        }
    }
}

/// [[assistants]] 项
#[derive(Debug, Clone, Deserialize)]
pub struct AssistantOverride {
    pub id: String,
    pub description: Option<String>,
    pub keywords: Option<Vec<String>>,
    pub system_prompt: Option<String>,
}

/// 从 config 目录加载配置，环境变量 SWITCHBOARD__* 可覆盖
///
/// 1. 按顺序查找 config/default.toml、../config/default.toml、default.toml，找到则作为第一源
/// 2. 若传入 config_path 且文件存在，则追加该文件（可覆盖前面的键）
/// 3. 最后叠加环境变量 SWITCHBOARD__*
pub fn load_config(config_path: Option<PathBuf>) -> Result<AppConfig, config::ConfigError> {
    let mut builder = config::Config::builder();

    let default_names = ["config/default", "../config/default", "default"];
    for name in default_names {
        let path = format!("{}.toml", name);
        if std::path::Path::new(&path).exists() {
            builder = builder.add_source(config::File::with_name(name).required(false));
            break;
        }
    }

    if let Some(ref path) = config_path {
        if path.exists() {
            builder = builder.add_source(config::File::from(path.clone()).required(false));
        }
    }

    builder = builder.add_source(
        config::Environment::with_prefix("SWITCHBOARD")
            .separator("__")
            .try_parsing(true),
    );

    builder.build()?.try_deserialize()
}
