#![allow(dead_code)]

use anyhow::Result;
use async_trait::async_trait;
use parking_lot::Mutex;
use rebound_config::RecoverySettings;
use rebound_events::MessageInfo;
use rebound_recovery::{
    parse_limit_error, HostClient, ParsedLimitError, PromptRequest, RecoveryOrchestrator,
    RecoveryState, SessionMessage, StorageLayout, SummarizeRequest, Toast,
};
use serde_json::{json, Value};
use std::fs;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use tempfile::TempDir;

pub const SESSION: &str = "ses_test";

/// Records every host call; summarize can be told to fail or panic.
#[derive(Default)]
pub struct MockHost {
    pub messages: Mutex<Vec<SessionMessage>>,
    pub summarize_calls: Mutex<Vec<(String, SummarizeRequest)>>,
    pub prompts: Mutex<Vec<(String, PromptRequest)>>,
    pub toasts: Mutex<Vec<Toast>>,
    summarize_failures: AtomicU32,
    panic_on_summarize: AtomicBool,
}

impl MockHost {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn fail_summarize(&self, times: u32) {
        self.summarize_failures.store(times, Ordering::SeqCst);
    }

    pub fn panic_on_summarize(&self) {
        self.panic_on_summarize.store(true, Ordering::SeqCst);
    }

    pub fn push_assistant(&self, provider: &str, model: &str, summary: bool) {
        let mut messages = self.messages.lock();
        let id = format!("msg_a{}", messages.len());
        messages.push(SessionMessage {
            info: MessageInfo {
                id: Some(id),
                session_id: SESSION.to_string(),
                role: "assistant".to_string(),
                provider_id: Some(provider.to_string()),
                model_id: Some(model.to_string()),
                summary: summary.then_some(true),
                ..MessageInfo::default()
            },
            parts: Vec::new(),
        });
    }

    pub fn toast_titles(&self) -> Vec<String> {
        self.toasts.lock().iter().map(|t| t.title.clone()).collect()
    }

    pub fn summarize_count(&self) -> usize {
        self.summarize_calls.lock().len()
    }

    pub fn prompt_count(&self) -> usize {
        self.prompts.lock().len()
    }
}

#[async_trait]
impl HostClient for MockHost {
    async fn session_messages(&self, _session_id: &str) -> Result<Vec<SessionMessage>> {
        Ok(self.messages.lock().clone())
    }

    async fn summarize(&self, session_id: &str, request: SummarizeRequest) -> Result<()> {
        if self.panic_on_summarize.load(Ordering::SeqCst) {
            panic!("summarize exploded");
        }
        self.summarize_calls
            .lock()
            .push((session_id.to_string(), request));

        let remaining = self.summarize_failures.load(Ordering::SeqCst);
        if remaining > 0 {
            self.summarize_failures.store(remaining - 1, Ordering::SeqCst);
            anyhow::bail!("provider unavailable");
        }
        Ok(())
    }

    async fn prompt_async(&self, session_id: &str, request: PromptRequest) -> Result<()> {
        self.prompts.lock().push((session_id.to_string(), request));
        Ok(())
    }

    async fn show_toast(&self, toast: Toast) -> Result<()> {
        self.toasts.lock().push(toast);
        Ok(())
    }
}

/// A throwaway storage tree with one session.
pub struct Fixture {
    pub dir: TempDir,
    next: u64,
}

impl Fixture {
    pub fn new() -> Self {
        Self {
            dir: TempDir::new().unwrap(),
            next: 0,
        }
    }

    pub fn layout(&self) -> StorageLayout {
        StorageLayout::new(self.dir.path())
    }

    /// Write a message and its parts; returns the message id.
    pub fn message(&mut self, role: &str, parts: Vec<Value>) -> String {
        self.next += 1;
        let message_id = format!("msg_{:04}", self.next);
        let msg_dir = self.dir.path().join("message").join(SESSION);
        fs::create_dir_all(&msg_dir).unwrap();
        fs::write(
            msg_dir.join(format!("{message_id}.json")),
            json!({
                "id": message_id,
                "sessionID": SESSION,
                "role": role,
                "time": {"created": 1_700_000_000_000u64 + self.next}
            })
            .to_string(),
        )
        .unwrap();

        let part_dir = self.dir.path().join("part").join(&message_id);
        fs::create_dir_all(&part_dir).unwrap();
        for (i, mut part) in parts.into_iter().enumerate() {
            let part_id = format!("prt_{:04}_{i:02}", self.next);
            part["id"] = json!(part_id);
            part["sessionID"] = json!(SESSION);
            part["messageID"] = json!(message_id);
            fs::write(part_dir.join(format!("{part_id}.json")), part.to_string()).unwrap();
        }
        message_id
    }
}

pub fn text(body: &str) -> Value {
    json!({"type": "text", "text": body})
}

pub fn step() -> Value {
    json!({"type": "step-start"})
}

pub fn tool_call(call_id: &str, tool: &str, input: Value, output_size: usize) -> Value {
    json!({
        "type": "tool",
        "callID": call_id,
        "tool": tool,
        "state": {
            "status": "completed",
            "input": input,
            "output": "o".repeat(output_size),
            "time": {"start": 1, "end": 2}
        }
    })
}

/// Recovery settings with every delay set to zero.
pub fn fast_settings() -> RecoverySettings {
    let mut settings = RecoverySettings::default();
    settings.retry.initial_delay_ms = 0;
    settings.delays.schedule_ms = 0;
    settings.delays.continuation_ms = 0;
    settings.delays.repair_retry_ms = 0;
    settings
}

pub fn orchestrator(
    fixture: &Fixture,
    host: Arc<MockHost>,
    settings: RecoverySettings,
) -> RecoveryOrchestrator {
    RecoveryOrchestrator::new(
        Arc::new(RecoveryState::new()),
        host,
        fixture.layout(),
        settings,
    )
}

pub fn prompt_too_long(current: u64, max: u64) -> ParsedLimitError {
    parse_limit_error(&json!({
        "message": format!("prompt is too long: {current} tokens > {max} maximum")
    }))
    .unwrap()
    .with_model(Some("anthropic".into()), Some("claude-sonnet-4".into()))
}

pub fn raw_prompt_too_long(current: u64, max: u64) -> Value {
    json!({
        "name": "APIError",
        "data": {"message": format!("prompt is too long: {current} tokens > {max} maximum")}
    })
}
