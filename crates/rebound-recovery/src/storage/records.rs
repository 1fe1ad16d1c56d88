use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::path::PathBuf;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageTime {
    #[serde(default)]
    pub created: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed: Option<u64>,
}

/// Message metadata at `message/[<shard>/]<sessionID>/<messageID>.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredMessage {
    pub id: String,
    #[serde(rename = "sessionID", default)]
    pub session_id: String,
    #[serde(default)]
    pub role: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time: Option<MessageTime>,
    #[serde(rename = "providerID", default, skip_serializing_if = "Option::is_none")]
    pub provider_id: Option<String>,
    #[serde(rename = "modelID", default, skip_serializing_if = "Option::is_none")]
    pub model_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<Value>,
}

impl StoredMessage {
    pub fn created(&self) -> u64 {
        self.time.as_ref().map(|t| t.created).unwrap_or(0)
    }
}

/// One part file, kept as raw JSON so rewrites preserve unknown fields.
#[derive(Debug, Clone)]
pub struct PartRecord {
    pub path: PathBuf,
    pub value: Value,
}

const TOOL_TYPES: &[&str] = &["tool", "tool_use", "tool_result"];

impl PartRecord {
    pub fn part_type(&self) -> Option<&str> {
        self.value.get("type").and_then(Value::as_str)
    }

    pub fn text(&self) -> Option<&str> {
        self.value.get("text").and_then(Value::as_str)
    }

    pub fn is_empty_text(&self) -> bool {
        self.part_type() == Some("text") && self.text().unwrap_or("").trim().is_empty()
    }

    /// Whether the provider would count this part as message content.
    /// Thinking and step markers do not.
    pub fn has_content(&self) -> bool {
        match self.part_type() {
            Some("text") => !self.is_empty_text(),
            Some(t) => TOOL_TYPES.contains(&t),
            None => false,
        }
    }
}

fn is_false(value: &bool) -> bool {
    !*value
}

/// A persisted tool invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredToolPart {
    pub id: String,
    #[serde(rename = "sessionID", default)]
    pub session_id: String,
    #[serde(rename = "messageID", default)]
    pub message_id: String,
    #[serde(rename = "type")]
    pub part_type: String,
    #[serde(rename = "callID", default)]
    pub call_id: String,
    #[serde(default)]
    pub tool: String,
    #[serde(default)]
    pub state: StoredToolState,
    #[serde(default, skip_serializing_if = "is_false")]
    pub truncated: bool,
    #[serde(rename = "originalSize", default, skip_serializing_if = "Option::is_none")]
    pub original_size: Option<usize>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StoredToolState {
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub input: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl StoredToolPart {
    pub fn is_tool(&self) -> bool {
        self.part_type == "tool"
    }

    /// Size of a truncatable output, or `None` when there is nothing left
    /// to truncate.
    pub fn truncatable_size(&self) -> Option<usize> {
        if !self.is_tool() || self.truncated {
            return None;
        }
        self.state
            .output
            .as_deref()
            .filter(|o| !o.is_empty())
            .map(str::len)
    }

    pub fn mark_compacted(&mut self, at_ms: i64) {
        let time = self
            .state
            .extra
            .entry("time")
            .or_insert_with(|| Value::Object(Map::new()));
        if !time.is_object() {
            *time = Value::Object(Map::new());
        }
        if let Some(time) = time.as_object_mut() {
            time.insert("compacted".to_string(), Value::from(at_ms));
        }
    }
}
