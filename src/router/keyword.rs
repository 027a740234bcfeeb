//! 关键词路由（不调用 LLM，结果确定）
//!
//! 按顺序连接词把请求切成子句，逐句按助手关键词计分；
//! 相邻同一助手的子句合并为一步，第 N 个周期分配第 N 步。

use async_trait::async_trait;

use super::{
    clarifying_question, completed_since, completed_this_turn, request_origin, waiting_assistant,
    Router, RoutingDecision,
};
use crate::assistant::AssistantProfile;
use crate::core::DispatchError;
use crate::memory::{AssistantId, Turn};

/// 表示先后顺序的连接词（小写，前后带空格）
const CONNECTIVES: &[&str] = &[
    " and after that ",
    " and then ",
    ", then ",
    " then ",
    "; ",
    " after that ",
    " afterwards ",
    " followed by ",
    " and also ",
];

/// 关键词前缀匹配的最短长度（"files" 命中 "file"，"scheduled" 命中 "schedule"）
const PREFIX_MIN_LEN: usize = 4;

/// 请求中的一步：字节区间 + 负责的助手（None 表示多个助手得分并列）
#[derive(Debug, Clone)]
struct Step {
    start: usize,
    end: usize,
    owner: Option<AssistantId>,
    tied: Vec<AssistantId>,
}

#[derive(Debug, Default)]
pub struct KeywordRouter;

impl KeywordRouter {
    pub fn new() -> Self {
        Self
    }

    /// 切分子句，返回原文中的字节区间
    fn split_clauses(text: &str) -> Vec<(usize, usize)> {
        // ASCII 小写保持字节偏移不变
        let lower = text.to_ascii_lowercase();
        let mut clauses = Vec::new();
        let mut clause_start = 0;
        let mut i = 0;
        while i < lower.len() {
            if let Some(c) = CONNECTIVES.iter().find(|c| lower[i..].starts_with(**c)) {
                clauses.push((clause_start, i));
                i += c.len();
                clause_start = i;
                continue;
            }
            i += lower[i..].chars().next().map(char::len_utf8).unwrap_or(1);
        }
        clauses.push((clause_start, text.len()));

        clauses
            .into_iter()
            .filter(|(s, e)| !text[*s..*e].trim().is_empty())
            .collect()
    }

    /// 去掉引号内的内容（引号中的文件名、标题不参与计分）
    fn strip_quoted(clause: &str) -> String {
        let mut out = String::with_capacity(clause.len());
        let mut quote: Option<char> = None;
        let mut prev_is_space = true;
        for ch in clause.chars() {
            match quote {
                Some(q) if ch == q => quote = None,
                Some(_) => {}
                None if (ch == '"' || ch == '\'') && prev_is_space => quote = Some(ch),
                None => out.push(ch),
            }
            prev_is_space = ch.is_whitespace();
        }
        out
    }

    fn score(clause: &str, profile: &AssistantProfile) -> usize {
        let cleaned = Self::strip_quoted(clause).to_lowercase();
        cleaned
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
            .filter(|w| {
                profile.keywords.iter().any(|k| {
                    w == k || (k.len() >= PREFIX_MIN_LEN && w.starts_with(k.as_str()))
                })
            })
            .count()
    }

    /// 子句归属：最高分唯一者；并列返回 (None, 并列者)；零分返回 (None, [])
    fn classify(clause: &str, assistants: &[AssistantProfile]) -> (Option<AssistantId>, Vec<AssistantId>) {
        let scores: Vec<(usize, &AssistantProfile)> = assistants
            .iter()
            .map(|p| (Self::score(clause, p), p))
            .collect();
        let best = scores.iter().map(|(s, _)| *s).max().unwrap_or(0);
        if best == 0 {
            return (None, Vec::new());
        }
        let top: Vec<AssistantId> = scores
            .iter()
            .filter(|(s, _)| *s == best)
            .map(|(_, p)| p.id.clone())
            .collect();
        if top.len() == 1 {
            (top.into_iter().next(), Vec::new())
        } else {
            (None, top)
        }
    }

    /// 把请求拆成按顺序的步骤
    fn plan(text: &str, assistants: &[AssistantProfile]) -> Vec<Step> {
        let mut steps: Vec<Step> = Vec::new();
        let mut pending_start: Option<usize> = None;

        for (start, end) in Self::split_clauses(text) {
            let (owner, tied) = Self::classify(&text[start..end], assistants);
            if owner.is_none() && tied.is_empty() {
                // 无领域词的子句并入前一步；开头的并入后一步
                match steps.last_mut() {
                    Some(prev) => prev.end = end,
                    None => {
                        pending_start.get_or_insert(start);
                    }
                }
                continue;
            }

            let start = pending_start.take().unwrap_or(start);
            match steps.last_mut() {
                Some(prev) if owner.is_some() && prev.owner == owner => prev.end = end,
                _ => steps.push(Step {
                    start,
                    end,
                    owner,
                    tied,
                }),
            }
        }
        steps
    }

    /// 按步骤表给出第 index 步的决策
    fn decide(text: &str, steps: &[Step], index: usize) -> RoutingDecision {
        let Some(step) = steps.get(index) else {
            return RoutingDecision::Finished;
        };
        let task = text[step.start..step.end].trim().to_string();
        tracing::debug!(step = index, total = steps.len(), task = %task, "Keyword routing");

        match &step.owner {
            Some(id) => RoutingDecision::Assign {
                assistant: id.clone(),
                task,
            },
            None => {
                let names: Vec<String> = step.tied.iter().map(|i| i.to_string()).collect();
                RoutingDecision::Ambiguous {
                    question: format!(
                        "\"{}\" could be handled by {}. Which one should I use?",
                        task,
                        names.join(" or ")
                    ),
                }
            }
        }
    }
}

#[async_trait]
impl Router for KeywordRouter {
    async fn route(
        &self,
        history: &[Turn],
        user_text: &str,
        assistants: &[AssistantProfile],
    ) -> Result<RoutingDecision, DispatchError> {
        let steps = Self::plan(user_text, assistants);

        // 跟进回复（"yes"、或只涉及等待中助手的一句话）：先交给等待中的助手，再接着做原请求剩下的步骤
        if let Some(waiting) = waiting_assistant(history)
            .filter(|id| assistants.iter().any(|p| &p.id == id))
        {
            let follows_up = match steps.as_slice() {
                [] => true,
                [only] => only.owner.as_ref() == Some(&waiting),
                _ => false,
            };
            if follows_up {
                if completed_this_turn(history).is_empty() {
                    return Ok(RoutingDecision::Assign {
                        assistant: waiting,
                        task: user_text.trim().to_string(),
                    });
                }
                let Some(origin) = request_origin(history) else {
                    return Ok(RoutingDecision::Finished);
                };
                let original = history[origin].content.as_str();
                let original_steps = Self::plan(original, assistants);
                let done = completed_since(history, origin);
                return Ok(Self::decide(original, &original_steps, done));
            }
        }

        let completed = completed_this_turn(history).len();
        if steps.is_empty() {
            // 无领域词且不是对等待中助手的回复：提问而不是猜
            return Ok(if completed > 0 {
                RoutingDecision::Finished
            } else {
                RoutingDecision::Ambiguous {
                    question: clarifying_question(assistants),
                }
            });
        }

        Ok(Self::decide(user_text, &steps, completed))
    }
}
