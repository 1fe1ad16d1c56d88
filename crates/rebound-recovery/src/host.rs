//! The host application surface: session listing, summarize, prompt and
//! toast calls.

use crate::notices::Notice;
use anyhow::Result;
use async_trait::async_trait;
use rebound_events::MessageInfo;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionMessage {
    pub info: MessageInfo,
    #[serde(default)]
    pub parts: Vec<Value>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SummarizeRequest {
    #[serde(rename = "providerID")]
    pub provider_id: String,
    #[serde(rename = "modelID")]
    pub model_id: String,
    pub auto: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromptPart {
    #[serde(rename = "type")]
    pub part_type: String,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromptRequest {
    pub parts: Vec<PromptPart>,
    pub auto: bool,
}

impl PromptRequest {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            parts: vec![PromptPart {
                part_type: "text".to_string(),
                text: text.into(),
            }],
            auto: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToastVariant {
    Info,
    Success,
    Warning,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Toast {
    pub title: String,
    pub message: String,
    pub variant: ToastVariant,
    #[serde(rename = "duration")]
    pub duration_ms: u64,
}

#[async_trait]
pub trait HostClient: Send + Sync {
    async fn session_messages(&self, session_id: &str) -> Result<Vec<SessionMessage>>;

    async fn summarize(&self, session_id: &str, request: SummarizeRequest) -> Result<()>;

    async fn prompt_async(&self, session_id: &str, request: PromptRequest) -> Result<()>;

    async fn show_toast(&self, toast: Toast) -> Result<()>;
}

/// Most recent assistant message, or `None` if the listing fails.
pub async fn last_assistant_message(
    host: &dyn HostClient,
    session_id: &str,
) -> Option<MessageInfo> {
    match host.session_messages(session_id).await {
        Ok(messages) => messages
            .into_iter()
            .rev()
            .find(|m| m.info.is_assistant())
            .map(|m| m.info),
        Err(err) => {
            tracing::warn!(session_id, error = %err, "failed to list session messages");
            None
        }
    }
}

/// Best-effort toasts; failures are logged and dropped.
#[derive(Clone)]
pub struct Notifier {
    host: Arc<dyn HostClient>,
    enabled: bool,
}

impl Notifier {
    pub fn new(host: Arc<dyn HostClient>, enabled: bool) -> Self {
        Self { host, enabled }
    }

    pub async fn show(&self, notice: Notice) {
        if !self.enabled {
            return;
        }
        let title = notice.title;
        let toast = Toast {
            title: title.to_string(),
            message: notice.message,
            variant: notice.variant,
            duration_ms: notice.duration_ms,
        };
        if let Err(err) = self.host.show_toast(toast).await {
            tracing::debug!(title, error = %err, "toast not shown");
        }
    }
}
