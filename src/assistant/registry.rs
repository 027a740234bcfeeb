//! 助手注册表：保持注册顺序，按 id 查找

use std::sync::Arc;

use super::{AssistantProfile, TaskAssistant};
use crate::memory::AssistantId;

#[derive(Default, Clone)]
pub struct AssistantRegistry {
    assistants: Vec<Arc<dyn TaskAssistant>>,
}

impl AssistantRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 注册助手；同 id 再次注册时替换原有实现（保持原位置）
    pub fn register(&mut self, assistant: Arc<dyn TaskAssistant>) {
        let id = assistant.profile().id.clone();
        match self.assistants.iter().position(|a| a.profile().id == id) {
            Some(idx) => self.assistants[idx] = assistant,
            None => self.assistants.push(assistant),
        }
    }

    pub fn get(&self, id: &AssistantId) -> Option<Arc<dyn TaskAssistant>> {
        self.assistants
            .iter()
            .find(|a| &a.profile().id == id)
            .cloned()
    }

    pub fn profiles(&self) -> Vec<AssistantProfile> {
        self.assistants.iter().map(|a| a.profile().clone()).collect()
    }

    pub fn ids(&self) -> Vec<AssistantId> {
        self.assistants.iter().map(|a| a.profile().id.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.assistants.len()
    }

    pub fn is_empty(&self) -> bool {
        self.assistants.is_empty()
    }
}
