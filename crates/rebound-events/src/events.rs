use serde::{Deserialize, Serialize};

/// Message metadata as the host reports it on `message.updated` and in
/// session message listings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MessageInfo {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(rename = "sessionID", default)]
    pub session_id: String,
    #[serde(default)]
    pub role: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<serde_json::Value>,
    #[serde(rename = "providerID", default, skip_serializing_if = "Option::is_none")]
    pub provider_id: Option<String>,
    #[serde(rename = "modelID", default, skip_serializing_if = "Option::is_none")]
    pub model_id: Option<String>,
    /// Set on assistant turns produced by a summarize request.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<bool>,
}

impl MessageInfo {
    pub fn is_assistant(&self) -> bool {
        self.role == "assistant"
    }

    pub fn is_summary(&self) -> bool {
        self.summary == Some(true)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeletedSession {
    pub id: String,
}

/// Events the recovery controller consumes from the host plugin bus.
///
/// Wire shape is `{"type": "session.error", "properties": {...}}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "properties")]
pub enum HostEvent {
    #[serde(rename = "session.error")]
    SessionError {
        #[serde(rename = "sessionID", default, skip_serializing_if = "Option::is_none")]
        session_id: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<serde_json::Value>,
    },
    #[serde(rename = "message.updated")]
    MessageUpdated { info: MessageInfo },
    #[serde(rename = "session.idle")]
    SessionIdle {
        #[serde(rename = "sessionID")]
        session_id: String,
    },
    #[serde(rename = "session.deleted")]
    SessionDeleted { info: DeletedSession },
    #[serde(rename = "session.compacted")]
    SessionCompacted {
        #[serde(rename = "sessionID")]
        session_id: String,
    },
}

impl HostEvent {
    /// Parse a raw host event, returning `None` for event types this crate
    /// does not model.
    pub fn from_json(value: &serde_json::Value) -> Option<Self> {
        serde_json::from_value(value.clone()).ok()
    }

    pub fn session_id(&self) -> Option<&str> {
        match self {
            Self::SessionError { session_id, .. } => session_id.as_deref(),
            Self::MessageUpdated { info } => Some(info.session_id.as_str()),
            Self::SessionIdle { session_id } | Self::SessionCompacted { session_id } => {
                Some(session_id)
            }
            Self::SessionDeleted { info } => Some(info.id.as_str()),
        }
    }

    pub fn event_name(&self) -> &'static str {
        match self {
            Self::SessionError { .. } => "session.error",
            Self::MessageUpdated { .. } => "message.updated",
            Self::SessionIdle { .. } => "session.idle",
            Self::SessionDeleted { .. } => "session.deleted",
            Self::SessionCompacted { .. } => "session.compacted",
        }
    }
}
