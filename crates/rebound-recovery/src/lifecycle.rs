//! Binds host events to the orchestrator.

use crate::classify::{classify_error, ErrorClass, ParsedLimitError};
use crate::dedup::DeduplicationPlanner;
use crate::host::last_assistant_message;
use crate::notices;
use crate::orchestrator::{RecoveryOrchestrator, RunOutcome};
use async_trait::async_trait;
use rebound_events::{EventHandler, HandlerResult, HostEvent, MessageInfo, SubscriptionFilter};
use serde_json::Value;
use std::time::Duration;
use tokio::task::JoinHandle;

pub const HANDLER_NAME: &str = "context-window-recovery";

const HANDLED_EVENTS: &[&str] = &[
    "session.error",
    "message.updated",
    "session.idle",
    "session.deleted",
    "session.compacted",
];

pub struct RecoveryHook {
    orchestrator: RecoveryOrchestrator,
    dedup: DeduplicationPlanner,
}

impl RecoveryHook {
    pub fn new(orchestrator: RecoveryOrchestrator) -> Self {
        let dedup = DeduplicationPlanner::new(
            orchestrator.layout().clone(),
            &orchestrator.settings().deduplication.protected_tools,
        );
        Self {
            orchestrator,
            dedup,
        }
    }

    pub fn orchestrator(&self) -> &RecoveryOrchestrator {
        &self.orchestrator
    }

    /// Handle one event. Returns the spawned run, if the event started one.
    pub async fn on_event(&self, event: &HostEvent) -> Option<JoinHandle<RunOutcome>> {
        if !self.orchestrator.settings().enabled {
            return None;
        }

        match event {
            HostEvent::SessionError { session_id, error } => {
                let (Some(session_id), Some(error)) = (session_id, error) else {
                    return None;
                };
                self.on_session_error(session_id, error).await
            }
            HostEvent::MessageUpdated { info } => {
                self.on_message_updated(info);
                None
            }
            HostEvent::SessionIdle { session_id } => self.on_session_idle(session_id).await,
            HostEvent::SessionDeleted { info } => {
                tracing::debug!(session_id = %info.id, "session deleted, dropping recovery state");
                self.orchestrator.state().clear_session(&info.id);
                None
            }
            HostEvent::SessionCompacted { session_id } => {
                tracing::debug!(session_id = %session_id, "session compacted, dropping recovery state");
                self.orchestrator.state().clear_session(session_id);
                None
            }
        }
    }

    fn classify(&self, error: &Value) -> Option<ParsedLimitError> {
        match classify_error(error) {
            ErrorClass::ThinkingBlockStructural => {
                tracing::debug!("ignoring thinking-block error");
                None
            }
            class => class.into_parsed(),
        }
    }

    async fn on_session_error(
        &self,
        session_id: &str,
        error: &Value,
    ) -> Option<JoinHandle<RunOutcome>> {
        let parsed = self.classify(error)?;
        let state = self.orchestrator.state();
        tracing::info!(session_id, error_type = %parsed.error_type, "context limit error");
        state.record_error(session_id, parsed.clone());

        if state.is_running(session_id) {
            if parsed.is_prompt_too_long() && self.orchestrator.settings().deduplication.enabled {
                self.dedup.run(session_id);
            }
            return None;
        }

        self.orchestrator
            .notifier()
            .show(notices::context_limit_hit())
            .await;

        let delay = Duration::from_millis(self.orchestrator.settings().delays.schedule_ms);
        Some(self.spawn_run(session_id, delay))
    }

    fn on_message_updated(&self, info: &MessageInfo) {
        if !info.is_assistant() {
            return;
        }
        let Some(error) = &info.error else {
            return;
        };
        let Some(parsed) = self.classify(error) else {
            return;
        };

        let parsed = parsed.with_model(info.provider_id.clone(), info.model_id.clone());
        tracing::debug!(session_id = %info.session_id, "assistant message carries a limit error");
        self.orchestrator
            .state()
            .record_error(&info.session_id, parsed);
    }

    async fn on_session_idle(&self, session_id: &str) -> Option<JoinHandle<RunOutcome>> {
        let state = self.orchestrator.state();
        if !state.is_pending(session_id) || state.is_running(session_id) {
            return None;
        }

        let last = last_assistant_message(self.orchestrator.host().as_ref(), session_id).await;
        if last.as_ref().is_some_and(|m| m.is_summary() && m.error.is_none()) {
            tracing::info!(session_id, "session already summarized, dropping recovery state");
            state.clear_session(session_id);
            return None;
        }

        Some(self.spawn_run(session_id, Duration::ZERO))
    }

    fn spawn_run(&self, session_id: &str, delay: Duration) -> JoinHandle<RunOutcome> {
        let orchestrator = self.orchestrator.clone();
        let session_id = session_id.to_string();
        tokio::spawn(async move {
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            orchestrator.execute(&session_id).await
        })
    }
}

#[async_trait]
impl EventHandler for RecoveryHook {
    fn name(&self) -> &str {
        HANDLER_NAME
    }

    fn filter(&self) -> SubscriptionFilter {
        SubscriptionFilter::new().event_names(HANDLED_EVENTS.iter().copied())
    }

    async fn handle(&self, event: &HostEvent) -> HandlerResult {
        self.on_event(event).await;
        HandlerResult::pass()
    }
}
