//! 助手档案：id、描述（供路由 prompt）、关键词（供规则路由）、system prompt（供工具循环）

use crate::config::AssistantOverride;
use crate::memory::AssistantId;

pub const MAIL_AGENT: &str = "mail_agent";
pub const CALENDAR_AGENT: &str = "calendar_agent";
pub const DRIVE_AGENT: &str = "drive_agent";

#[derive(Debug, Clone)]
pub struct AssistantProfile {
    pub id: AssistantId,
    pub description: String,
    /// 小写关键词；规则路由按词命中计分
    pub keywords: Vec<String>,
    pub system_prompt: String,
}

impl AssistantProfile {
    pub fn new(id: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            id: AssistantId::new(id.into()),
            description: description.into(),
            keywords: Vec::new(),
            system_prompt: String::new(),
        }
    }

    pub fn with_keywords<I, S>(mut self, keywords: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.keywords = keywords
            .into_iter()
            .map(|k| k.into().to_lowercase())
            .collect();
        self
    }

    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = prompt.into();
        self
    }

    /// 用配置项覆盖字段（None 保留原值）
    pub fn apply(&mut self, o: &AssistantOverride) {
        if let Some(d) = &o.description {
            self.description = d.clone();
        }
        if let Some(k) = &o.keywords {
            self.keywords = k.iter().map(|s| s.to_lowercase()).collect();
        }
        if let Some(p) = &o.system_prompt {
            self.system_prompt = p.clone();
        }
    }
}

const COMMON_RULES: &str = "RULES:\n\
- Ask once for any missing required argument (like user_email), then proceed.\n\
- Keep answers concise and action-oriented.\n\
- If an operation fails, explain the error clearly and suggest next steps.\n\
- You remember previous interactions in this conversation and can reference them.\n";

fn mail_profile() -> AssistantProfile {
    AssistantProfile::new(
        MAIL_AGENT,
        "Gmail agent: sends mail, lists and searches mail, reads a message, creates and deletes drafts",
    )
    .with_keywords([
        "email", "emails", "mail", "mails", "gmail", "inbox", "draft", "drafts", "send",
        "message", "reply", "recipient",
    ])
    .with_system_prompt(format!(
        "You are a focused Gmail assistant. Manage email only using the provided tools.\n\
         Do not access calendar, drive, or any other services.\n\n{COMMON_RULES}\
         - Before sending mail ask 'Are you sure you want to send this email?' and only send after the user replies yes.\n\
         - Never delete drafts unless the user explicitly asks; confirm with 'Are you sure?' first.\n"
    ))
}

fn calendar_profile() -> AssistantProfile {
    AssistantProfile::new(
        CALENDAR_AGENT,
        "Calendar agent: creates, lists, searches and deletes calendar events",
    )
    .with_keywords([
        "calendar", "meeting", "meetings", "schedule", "scheduled", "event", "events",
        "appointment", "reschedule", "remind", "invite",
    ])
    .with_system_prompt(format!(
        "You are a focused Calendar assistant. Manage calendar events only using the provided tools.\n\
         Do not access any services other than the calendar.\n\n{COMMON_RULES}\
         - Use ISO datetimes: YYYY-MM-DDTHH:MM:SS.\n\
         - Before deleting events, ask 'Are you sure you want to delete this event?'.\n\
         - When listing or searching events, show event IDs for later reference.\n"
    ))
}

fn drive_profile() -> AssistantProfile {
    AssistantProfile::new(
        DRIVE_AGENT,
        "Drive agent: uploads, downloads and searches files in cloud storage",
    )
    .with_keywords([
        "drive", "file", "files", "folder", "upload", "download", "document", "documents",
        "pdf", "image", "photo",
    ])
    .with_system_prompt(format!(
        "You are a focused Google Drive assistant. Manage files only using the provided tools.\n\
         Do not access calendar, gmail, or any other services.\n\n{COMMON_RULES}\
         - For downloads, say where the file was saved.\n\
         - Always confirm successful operations and provide file IDs when relevant.\n"
    ))
}

/// 内置三个助手档案（注册顺序即路由 prompt 中的顺序）
pub fn builtin_profiles() -> Vec<AssistantProfile> {
    vec![mail_profile(), calendar_profile(), drive_profile()]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_ids() {
        let ids: Vec<String> = builtin_profiles().iter().map(|p| p.id.to_string()).collect();
        assert_eq!(ids, vec![MAIL_AGENT, CALENDAR_AGENT, DRIVE_AGENT]);
    }

    #[test]
    fn test_apply_override() {
        let mut p = mail_profile();
        p.apply(&AssistantOverride {
            id: MAIL_AGENT.to_string(),
            description: None,
            keywords: Some(vec!["Post".to_string()]),
            system_prompt: None,
        });
        assert_eq!(p.keywords, vec!["post".to_string()]);
        assert!(p.description.contains("Gmail"));
    }
}
