//! 调度器：单个用户轮次的主控循环
//!
//! 追加用户消息 -> 路由 -> 交接给助手 -> 追加助手产出 -> 交回 -> 再路由，直到 Finished / 需要用户回复 / 失败。
//! 每条记录产生后立即写入存储，失败前的记录全部保留。

use std::collections::HashSet;
use std::sync::Arc;

use crate::assistant::{AssistantRegistry, Completion};
use crate::core::{DispatchError, SessionSupervisor};
use crate::memory::{AssistantId, Turn, TurnKind};
use crate::router::{clarifying_question, Router, RoutingDecision};
use crate::session::SessionStore;

pub const DEFAULT_MAX_HANDOFFS: usize = 8;

pub struct Dispatcher {
    store: Arc<dyn SessionStore>,
    router: Arc<dyn Router>,
    assistants: AssistantRegistry,
    supervisor: SessionSupervisor,
    max_handoffs: usize,
    context_window: Option<usize>,
}

impl Dispatcher {
    pub fn new(
        store: Arc<dyn SessionStore>,
        router: Arc<dyn Router>,
        assistants: AssistantRegistry,
    ) -> Self {
        Self {
            store,
            router,
            assistants,
            supervisor: SessionSupervisor::new(),
            max_handoffs: DEFAULT_MAX_HANDOFFS,
            context_window: None,
        }
    }

    pub fn with_max_handoffs(mut self, max: usize) -> Self {
        self.max_handoffs = max.max(1);
        self
    }

    /// 传给路由器与助手的历史窗口（条数）；None 表示全部历史
    pub fn with_context_window(mut self, turns: Option<usize>) -> Self {
        self.context_window = turns;
        self
    }

    pub fn assistants(&self) -> &AssistantRegistry {
        &self.assistants
    }

    pub fn store(&self) -> &Arc<dyn SessionStore> {
        &self.store
    }

    /// 会话完整历史（未知会话为空）
    pub async fn history(&self, session_key: &str) -> Result<Vec<Turn>, DispatchError> {
        Ok(self.store.get_history(session_key).await?)
    }

    /// 处理一条用户消息，返回本轮产生的全部记录（以该用户消息开头）
    pub async fn handle_turn(
        &self,
        session_key: &str,
        user_text: &str,
    ) -> Result<Vec<Turn>, DispatchError> {
        if user_text.trim().is_empty() {
            return Err(DispatchError::EmptyInput);
        }

        let lease = self.supervisor.lease(session_key).await;
        let result = self.run_cycle(session_key, user_text).await;
        drop(lease);
        self.supervisor.release(session_key).await;
        result
    }

    /// 持有会话租约时执行的调度周期
    async fn run_cycle(
        &self,
        session_key: &str,
        user_text: &str,
    ) -> Result<Vec<Turn>, DispatchError> {
        let prior = self.store.get_history(session_key).await?;
        let prior = self.window(&prior);
        let profiles = self.assistants.profiles();

        let mut produced: Vec<Turn> = Vec::new();
        self.push(session_key, &mut produced, vec![Turn::user(user_text)])
            .await?;

        for step in 0..self.max_handoffs {
            let view: Vec<Turn> = prior.iter().chain(produced.iter()).cloned().collect();
            tracing::debug!(session = %session_key, step, view_len = view.len(), "Routing");

            let decision = match self.router.route(&view, user_text, &profiles).await {
                Ok(d) => d,
                Err(e) => {
                    tracing::warn!(session = %session_key, step, error = %e, "Routing failed");
                    let msg = format!("Sorry, I couldn't work out how to handle that request ({e}).");
                    self.push(session_key, &mut produced, vec![Turn::dispatcher(msg)])
                        .await?;
                    return Ok(produced);
                }
            };

            let (assistant_id, task) = match decision {
                RoutingDecision::Finished => {
                    tracing::debug!(session = %session_key, step, "Request finished");
                    return Ok(produced);
                }
                RoutingDecision::Ambiguous { question } => {
                    tracing::warn!(session = %session_key, step, "Routing ambiguous");
                    self.push(session_key, &mut produced, vec![Turn::dispatcher(question)])
                        .await?;
                    return Ok(produced);
                }
                RoutingDecision::Assign { assistant, task } => (assistant, task),
            };

            let Some(assistant) = self.assistants.get(&assistant_id) else {
                tracing::warn!(session = %session_key, assistant = %assistant_id, "Router chose an unregistered assistant");
                let question = clarifying_question(&profiles);
                self.push(session_key, &mut produced, vec![Turn::dispatcher(question)])
                    .await?;
                return Ok(produced);
            };

            tracing::info!(session = %session_key, assistant = %assistant_id, step, task = %task, "Handoff");
            self.push(session_key, &mut produced, vec![Turn::handoff_to(&assistant_id)])
                .await?;

            let view: Vec<Turn> = prior.iter().chain(produced.iter()).cloned().collect();
            match assistant.run(&view, &task).await {
                Ok(outcome) => {
                    let mut turns = sanitize_assistant_turns(&assistant_id, outcome.turns);
                    close_dangling_invocations(&mut turns);
                    let waiting = outcome.completion == Completion::NeedsInput;
                    turns.push(if waiting {
                        Turn::handoff_back_waiting(&assistant_id)
                    } else {
                        Turn::handoff_back(&assistant_id)
                    });
                    self.push(session_key, &mut produced, turns).await?;
                    if waiting {
                        tracing::info!(session = %session_key, assistant = %assistant_id, step, "Waiting for user input");
                        return Ok(produced);
                    }
                }
                Err(e) => {
                    let (turns, root) = e.into_parts();
                    tracing::warn!(session = %session_key, assistant = %assistant_id, step, error = %root, "Assistant failed");
                    let mut turns = sanitize_assistant_turns(&assistant_id, turns);
                    close_dangling_invocations(&mut turns);
                    turns.push(Turn::dispatcher(format!(
                        "{} could not complete the task: {}",
                        assistant_id, root
                    )));
                    turns.push(Turn::handoff_back(&assistant_id));
                    self.push(session_key, &mut produced, turns).await?;
                    return Ok(produced);
                }
            }
        }

        tracing::warn!(session = %session_key, max = self.max_handoffs, "Handoff limit reached");
        let msg = format!(
            "I stopped after {} hand-offs for this request. Please send the remaining part as a new message.",
            self.max_handoffs
        );
        self.push(session_key, &mut produced, vec![Turn::dispatcher(msg)])
            .await?;
        Ok(produced)
    }

    /// 写入存储并记入本轮产出
    async fn push(
        &self,
        session_key: &str,
        produced: &mut Vec<Turn>,
        turns: Vec<Turn>,
    ) -> Result<(), DispatchError> {
        self.store.append(session_key, turns.clone()).await?;
        produced.extend(turns);
        Ok(())
    }

    fn window(&self, history: &[Turn]) -> Vec<Turn> {
        match self.context_window {
            Some(n) if history.len() > n => history[history.len() - n..].to_vec(),
            _ => history.to_vec(),
        }
    }
}

/// 助手只能产出自己的消息、工具调用与结果：
/// 用户消息改写为该助手的消息，交接记录丢弃（交接只由调度器写入）
pub fn sanitize_assistant_turns(assistant: &AssistantId, turns: Vec<Turn>) -> Vec<Turn> {
    turns
        .into_iter()
        .filter_map(|turn| match turn.kind {
            TurnKind::UserMessage => {
                tracing::warn!(assistant = %assistant, "Assistant produced a user turn, recording it as its own message");
                Some(Turn::assistant(assistant, turn.content))
            }
            TurnKind::HandoffNotice => {
                tracing::warn!(assistant = %assistant, content = %turn.content, "Dropping hand-off produced by an assistant");
                None
            }
            _ => Some(turn),
        })
        .collect()
}

/// 没有对应结果的工具调用补一条错误结果（紧跟在调用之后）
pub fn close_dangling_invocations(turns: &mut Vec<Turn>) {
    let answered: HashSet<String> = turns
        .iter()
        .filter_map(|t| t.tool_output_id().map(str::to_string))
        .collect();

    let mut repaired = Vec::with_capacity(turns.len());
    for turn in turns.drain(..) {
        let dangling = match (turn.kind, turn.tool_call()) {
            (TurnKind::ToolInvocation, Some((call_id, tool, _))) if !answered.contains(call_id) => {
                Some((call_id.to_string(), tool.to_string()))
            }
            _ => None,
        };
        repaired.push(turn);
        if let Some((call_id, tool)) = dangling {
            tracing::warn!(call_id = %call_id, tool = %tool, "Tool call without result");
            repaired.push(Turn::tool_result(
                call_id,
                tool,
                "Error: the tool produced no result",
                true,
            ));
        }
    }
    *turns = repaired;
}
