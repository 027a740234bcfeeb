//! 调度器构建器：由配置组装存储、路由器、助手
//!
//! 二进制与集成测试共用同一套组装逻辑；远程邮件/日历/网盘工具由嵌入方通过 with_tools 注入。

use std::collections::HashMap;
use std::sync::Arc;

use crate::assistant::{
    builtin_profiles, AssistantProfile, AssistantRegistry, TaskAssistant, ToolLoopAssistant,
};
use crate::config::{AppConfig, RouterStrategy};
use crate::core::{DispatchError, Dispatcher};
use crate::llm::{create_llm_from_config, has_api_key, LlmClient};
use crate::router::{KeywordRouter, LlmRouter, Router};
use crate::session::{create_session_store, SessionStore};
use crate::tools::{ToolExecutor, ToolRegistry};

pub struct DispatcherBuilder {
    config: AppConfig,
    llm: Option<Arc<dyn LlmClient>>,
    store: Option<Arc<dyn SessionStore>>,
    router: Option<Arc<dyn Router>>,
    tools: HashMap<String, ToolRegistry>,
    custom: Vec<Arc<dyn TaskAssistant>>,
}

impl DispatcherBuilder {
    pub fn new(config: AppConfig) -> Self {
        Self {
            config,
            llm: None,
            store: None,
            router: None,
            tools: HashMap::new(),
            custom: Vec::new(),
        }
    }

    /// 指定 LLM 客户端（默认按配置与 API Key 选择）
    pub fn with_llm(mut self, llm: Arc<dyn LlmClient>) -> Self {
        self.llm = Some(llm);
        self
    }

    pub fn with_store(mut self, store: Arc<dyn SessionStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// 指定路由器（覆盖 router.strategy）
    pub fn with_router(mut self, router: Arc<dyn Router>) -> Self {
        self.router = Some(router);
        self
    }

    /// 给某个助手注入可用工具
    pub fn with_tools(mut self, assistant_id: &str, tools: ToolRegistry) -> Self {
        self.tools.insert(assistant_id.to_string(), tools);
        self
    }

    /// 注册自定义助手；与内置助手同 id 时替换之
    pub fn with_assistant(mut self, assistant: Arc<dyn TaskAssistant>) -> Self {
        self.custom.push(assistant);
        self
    }

    /// 内置档案 + [[assistants]] 覆盖；未知 id 作为新助手追加
    pub fn build_profiles(&self) -> Vec<AssistantProfile> {
        let mut profiles = builtin_profiles();
        for o in &self.config.assistants {
            match profiles.iter_mut().find(|p| p.id.as_str() == o.id) {
                Some(p) => p.apply(o),
                None => {
                    let mut p = AssistantProfile::new(o.id.as_str(), o.id.as_str());
                    p.apply(o);
                    tracing::info!(assistant = %o.id, "Adding assistant from config");
                    profiles.push(p);
                }
            }
        }
        profiles
    }

    fn build_llm(&self) -> Arc<dyn LlmClient> {
        match &self.llm {
            Some(llm) => llm.clone(),
            None => create_llm_from_config(&self.config),
        }
    }

    fn build_router(&self, llm: Arc<dyn LlmClient>) -> Arc<dyn Router> {
        if let Some(router) = &self.router {
            return router.clone();
        }
        let use_llm = match self.config.router.strategy {
            RouterStrategy::Llm => true,
            RouterStrategy::Keyword => false,
            RouterStrategy::Auto => has_api_key(&self.config),
        };
        if use_llm {
            tracing::info!("Using LLM router");
            Arc::new(LlmRouter::new(llm))
        } else {
            tracing::info!("Using keyword router");
            Arc::new(KeywordRouter::new())
        }
    }

    pub async fn build(self) -> Result<Dispatcher, DispatchError> {
        if self.config.dispatch.max_handoffs_per_turn == 0 {
            return Err(DispatchError::Config(
                "dispatch.max_handoffs_per_turn must be at least 1".to_string(),
            ));
        }
        if self.config.session.context_window_turns == Some(0) {
            return Err(DispatchError::Config(
                "session.context_window_turns must be at least 1 when set".to_string(),
            ));
        }

        let llm = self.build_llm();
        let router = self.build_router(llm.clone());
        let store = match &self.store {
            Some(store) => store.clone(),
            None => create_session_store(self.config.session.db_path.as_deref()).await,
        };

        let mut registry = AssistantRegistry::new();
        for profile in self.build_profiles() {
            let tools = self
                .tools
                .get(profile.id.as_str())
                .cloned()
                .unwrap_or_default();
            if !tools.is_empty() {
                tracing::info!(assistant = %profile.id, tools = ?tools.tool_names(), "Tools attached");
            }
            let executor = ToolExecutor::new(tools, self.config.tools.timeout_secs);
            registry.register(Arc::new(ToolLoopAssistant::new(
                profile,
                llm.clone(),
                executor,
                self.config.tools.max_steps,
            )));
        }
        for assistant in &self.custom {
            registry.register(assistant.clone());
        }
        tracing::info!(assistants = ?registry.ids(), "Assistants registered");

        Ok(Dispatcher::new(store, router, registry)
            .with_max_handoffs(self.config.dispatch.max_handoffs_per_turn)
            .with_context_window(self.config.session.context_window_turns))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assistant::AssistantOutcome;
    use crate::config::AssistantOverride;
    use crate::core::AssistantError;
    use crate::llm::ScriptedLlmClient;
    use crate::memory::{Turn, TurnKind};
    use crate::session::MemorySessionStore;
    use crate::tools::Tool;
    use async_trait::async_trait;

    struct CreateEvent;

    #[async_trait]
    impl Tool for CreateEvent {
        fn name(&self) -> &str {
            "calendar_create_event"
        }

        fn description(&self) -> &str {
            "Create a calendar event"
        }

        async fn execute(&self, args: serde_json::Value) -> Result<String, String> {
            let title = args.get("title").and_then(|v| v.as_str()).unwrap_or("Event");
            Ok(format!("Created '{title}' (id: e1)"))
        }
    }

    struct FixedCalendar(AssistantProfile);

    #[async_trait]
    impl TaskAssistant for FixedCalendar {
        fn profile(&self) -> &AssistantProfile {
            &self.0
        }

        async fn run(&self, _h: &[Turn], _r: &str) -> Result<AssistantOutcome, AssistantError> {
            Ok(AssistantOutcome::done(vec![Turn::assistant(
                &self.0.id,
                "Handled by the embedded calendar.",
            )]))
        }
    }

    fn keyword_config() -> AppConfig {
        let mut cfg = AppConfig::default();
        cfg.router.strategy = RouterStrategy::Keyword;
        cfg
    }

    #[test]
    fn test_profiles_with_overrides() {
        let mut cfg = AppConfig::default();
        cfg.assistants = vec![
            AssistantOverride {
                id: "mail_agent".to_string(),
                description: Some("Mail only".to_string()),
                keywords: None,
                system_prompt: None,
            },
            AssistantOverride {
                id: "notes_agent".to_string(),
                description: Some("Takes notes".to_string()),
                keywords: Some(vec!["Note".to_string()]),
                system_prompt: None,
            },
        ];
        let profiles = DispatcherBuilder::new(cfg).build_profiles();
        assert_eq!(profiles.len(), 4);
        assert_eq!(profiles[0].description, "Mail only");
        assert_eq!(profiles[3].id.as_str(), "notes_agent");
        assert_eq!(profiles[3].keywords, vec!["note".to_string()]);
    }

    #[tokio::test]
    async fn test_zero_handoffs_rejected() {
        let mut cfg = AppConfig::default();
        cfg.dispatch.max_handoffs_per_turn = 0;
        let result = DispatcherBuilder::new(cfg).build().await;
        assert!(matches!(result, Err(DispatchError::Config(_))));
    }

    #[tokio::test]
    async fn test_build_with_scripted_llm() {
        let mut cfg = AppConfig::default();
        cfg.router.strategy = RouterStrategy::Keyword;
        let llm = Arc::new(ScriptedLlmClient::new([
            r#"{"reply": "Created the meeting for Sept 1 at 4pm.", "done": true}"#,
        ]));
        let dispatcher = DispatcherBuilder::new(cfg)
            .with_llm(llm)
            .build()
            .await
            .unwrap();
        assert_eq!(dispatcher.assistants().len(), 3);

        let turns = dispatcher
            .handle_turn("s1", "schedule a meeting for Sept 1 4pm")
            .await
            .unwrap();
        assert_eq!(turns.len(), 4);
        assert_eq!(turns[2].content, "Created the meeting for Sept 1 at 4pm.");
    }

    #[tokio::test]
    async fn test_injected_tools_reach_assistant() {
        let llm = Arc::new(ScriptedLlmClient::new([
            r#"{"tool": "calendar_create_event", "args": {"title": "Meeting"}}"#,
            r#"{"reply": "Created 'Meeting'.", "done": true}"#,
        ]));
        let mut tools = ToolRegistry::new();
        tools.register(CreateEvent);
        let dispatcher = DispatcherBuilder::new(keyword_config())
            .with_llm(llm.clone())
            .with_tools("calendar_agent", tools)
            .build()
            .await
            .unwrap();

        let turns = dispatcher
            .handle_turn("s1", "schedule a meeting tomorrow")
            .await
            .unwrap();
        let kinds: Vec<TurnKind> = turns.iter().map(|t| t.kind).collect();
        assert_eq!(
            kinds,
            vec![
                TurnKind::UserMessage,
                TurnKind::HandoffNotice,
                TurnKind::ToolInvocation,
                TurnKind::ToolResult,
                TurnKind::AssistantMessage,
                TurnKind::HandoffNotice,
            ]
        );
        let (call_id, tool, _) = turns[2].tool_call().unwrap();
        assert_eq!(tool, "calendar_create_event");
        assert_eq!(turns[3].tool_output_id(), Some(call_id));
        assert!(turns[3].content.contains("Created 'Meeting'"));
        // 工具描述拼进了日历助手的 system prompt
        assert!(llm.requests().await[0][0].content.contains("calendar_create_event"));
    }

    #[tokio::test]
    async fn test_with_router_overrides_strategy() {
        let mut cfg = AppConfig::default();
        cfg.router.strategy = RouterStrategy::Llm;
        // 只有一条回复：若路由也走 LLM，会先被路由器消费并解析失败
        let llm = Arc::new(ScriptedLlmClient::new([
            r#"{"reply": "Meeting booked.", "done": true}"#,
        ]));
        let dispatcher = DispatcherBuilder::new(cfg)
            .with_llm(llm.clone())
            .with_router(Arc::new(KeywordRouter::new()))
            .build()
            .await
            .unwrap();

        let turns = dispatcher.handle_turn("s1", "book a meeting").await.unwrap();
        assert_eq!(turns[2].content, "Meeting booked.");
        assert_eq!(llm.requests().await.len(), 1);
    }

    #[tokio::test]
    async fn test_with_store_and_custom_assistant() {
        let store: Arc<dyn SessionStore> = Arc::new(MemorySessionStore::new());
        let calendar = AssistantProfile::new("calendar_agent", "Embedded calendar")
            .with_keywords(["meeting"]);
        let dispatcher = DispatcherBuilder::new(keyword_config())
            .with_llm(Arc::new(ScriptedLlmClient::default()))
            .with_store(store.clone())
            .with_assistant(Arc::new(FixedCalendar(calendar)))
            .build()
            .await
            .unwrap();
        assert_eq!(dispatcher.assistants().len(), 3);

        let turns = dispatcher.handle_turn("s1", "book a meeting").await.unwrap();
        assert_eq!(turns[2].content, "Handled by the embedded calendar.");
        assert_eq!(store.get_history("s1").await.unwrap(), turns);
    }
}
