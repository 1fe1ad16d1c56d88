//! Repair of messages the provider rejects as empty.

use crate::storage::{write_record, StorageLayout};
use chrono::Utc;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};

static PART_COUNTER: AtomicUsize = AtomicUsize::new(0);

pub fn generate_part_id() -> String {
    let ms = Utc::now().timestamp_millis();
    let c = PART_COUNTER.fetch_add(1, Ordering::Relaxed);
    format!("prt_{:x}{:x}", ms, c)
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RepairReport {
    /// Messages that received placeholder text.
    pub fixed: Vec<String>,
    /// Whether the fix came from probing around the reported index.
    pub targeted: bool,
}

impl RepairReport {
    pub fn is_fixed(&self) -> bool {
        !self.fixed.is_empty()
    }
}

#[derive(Debug, Clone)]
pub struct EmptyContentRepair {
    layout: StorageLayout,
    placeholder: String,
}

impl EmptyContentRepair {
    pub fn new(layout: StorageLayout, placeholder: impl Into<String>) -> Self {
        Self {
            layout,
            placeholder: placeholder.into(),
        }
    }

    pub fn message_has_content(&self, message_id: &str) -> bool {
        self.layout
            .read_parts(message_id)
            .iter()
            .any(|p| p.has_content())
    }

    pub fn find_empty_messages(&self, session_id: &str) -> Vec<String> {
        self.layout
            .read_messages(session_id)
            .into_iter()
            .filter(|m| !self.message_has_content(&m.id))
            .map(|m| m.id)
            .collect()
    }

    /// Provider indices can drift from stored order by a few positions, so
    /// neighbours are probed too, biased towards earlier messages.
    pub fn find_empty_message_by_index(&self, session_id: &str, index: usize) -> Option<String> {
        let messages = self.layout.read_messages(session_id);
        let probes = [
            Some(index),
            index.checked_sub(1),
            index.checked_add(1),
            index.checked_sub(2),
            index.checked_add(2),
            index.checked_sub(3),
            index.checked_sub(4),
            index.checked_sub(5),
        ];

        probes
            .into_iter()
            .flatten()
            .filter_map(|i| messages.get(i))
            .find(|m| !self.message_has_content(&m.id))
            .map(|m| m.id.clone())
    }

    pub fn find_messages_with_empty_text_parts(&self, session_id: &str) -> Vec<String> {
        self.layout
            .read_messages(session_id)
            .into_iter()
            .filter(|m| {
                self.layout
                    .read_parts(&m.id)
                    .iter()
                    .any(|p| p.is_empty_text())
            })
            .map(|m| m.id)
            .collect()
    }

    /// Overwrite blank text parts with the placeholder.
    pub fn replace_empty_text_parts(&self, message_id: &str) -> bool {
        let mut replaced = false;
        for part in self.layout.read_parts(message_id) {
            if !part.is_empty_text() {
                continue;
            }
            let mut value = part.value;
            value["text"] = Value::String(self.placeholder.clone());
            value["synthetic"] = Value::Bool(true);
            match write_record(&part.path, &value) {
                Ok(()) => replaced = true,
                Err(err) => tracing::warn!(message_id, error = %err, "failed to replace empty text"),
            }
        }
        replaced
    }

    /// Add a synthetic placeholder text part to a message.
    pub fn inject_text_part(&self, session_id: &str, message_id: &str) -> bool {
        let part_id = generate_part_id();
        let part = json!({
            "id": part_id,
            "sessionID": session_id,
            "messageID": message_id,
            "type": "text",
            "text": self.placeholder,
            "synthetic": true,
        });
        let path = self
            .layout
            .part_dir(message_id)
            .join(format!("{part_id}.json"));

        match write_record(&path, &part) {
            Ok(()) => true,
            Err(err) => {
                tracing::warn!(message_id, error = %err, "failed to inject placeholder");
                false
            }
        }
    }

    fn fill(&self, session_id: &str, message_id: &str) -> bool {
        self.replace_empty_text_parts(message_id) || self.inject_text_part(session_id, message_id)
    }

    /// Fix the message at (or near) `message_index`, else every empty
    /// message in the session.
    pub fn repair(&self, session_id: &str, message_index: Option<usize>) -> RepairReport {
        if let Some(index) = message_index {
            if let Some(message_id) = self.find_empty_message_by_index(session_id, index) {
                if self.fill(session_id, &message_id) {
                    tracing::info!(session_id, message_id = %message_id, index, "repaired empty message");
                    return RepairReport {
                        fixed: vec![message_id],
                        targeted: true,
                    };
                }
            }
        }

        let fixed: Vec<String> = self
            .find_empty_messages(session_id)
            .into_iter()
            .filter(|id| self.fill(session_id, id))
            .collect();
        if !fixed.is_empty() {
            tracing::info!(session_id, count = fixed.len(), "repaired empty messages");
        }
        RepairReport {
            fixed,
            targeted: false,
        }
    }

    /// Clear out empty messages and blank text parts before asking the
    /// provider to summarize. Returns the number of messages touched.
    pub fn sanitize(&self, session_id: &str) -> usize {
        let mut count = self
            .find_empty_messages(session_id)
            .iter()
            .filter(|id| self.fill(session_id, id))
            .count();
        count += self
            .find_messages_with_empty_text_parts(session_id)
            .iter()
            .filter(|id| self.replace_empty_text_parts(id))
            .count();

        if count > 0 {
            tracing::debug!(session_id, count, "sanitized empty content before summarize");
        }
        count
    }
}
