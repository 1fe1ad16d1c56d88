//! The recovery state machine.
//!
//! A run owns the session's lock for its whole duration and ends in
//! exactly one [`RunOutcome`]. Strategies are tried in order: aggressive
//! truncation, then empty-content repair or summarize with retry.

use crate::classify::ParsedLimitError;
use crate::error::RecoveryError;
use crate::host::{last_assistant_message, HostClient, Notifier, PromptRequest, SummarizeRequest};
use crate::notices::{self, Notice};
use crate::repair::EmptyContentRepair;
use crate::state::RecoveryState;
use crate::storage::{StorageLayout, ToolOutputStore};
use crate::truncate::truncate_until_target;
use chrono::Utc;
use rebound_config::{RecoverySettings, RetrySettings};
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    /// Another run held the session lock; nothing was touched.
    AlreadyRunning,
    /// No recorded error to recover from.
    NoError,
    Truncated {
        truncated_count: usize,
        bytes_removed: u64,
    },
    Summarized {
        attempt: u32,
    },
    /// Provider or model unknown; the session could not be summarized.
    SummarizeSkipped,
    SummarizeExhausted,
    Repaired {
        attempts: u32,
    },
    RepairExhausted,
    /// Session state was cleared by another event while the run waited.
    Cleared,
}

impl RunOutcome {
    pub fn is_success(&self) -> bool {
        matches!(
            self,
            Self::Truncated { .. } | Self::Summarized { .. } | Self::Repaired { .. }
        )
    }

    pub fn is_terminal_failure(&self) -> bool {
        matches!(
            self,
            Self::SummarizeSkipped | Self::SummarizeExhausted | Self::RepairExhausted
        )
    }
}

/// `min(initial * factor^(attempt-1), max)` for a 1-based attempt.
pub fn backoff_delay(settings: &RetrySettings, attempt: u32) -> Duration {
    let exponent = attempt.saturating_sub(1);
    let factor = u64::from(settings.backoff_factor).saturating_pow(exponent);
    let delay = settings
        .initial_delay_ms
        .saturating_mul(factor)
        .min(settings.max_delay_ms);
    Duration::from_millis(delay)
}

#[derive(Clone)]
pub struct RecoveryOrchestrator {
    state: Arc<RecoveryState>,
    host: Arc<dyn HostClient>,
    notifier: Notifier,
    store: ToolOutputStore,
    repair: EmptyContentRepair,
    settings: Arc<RecoverySettings>,
}

impl RecoveryOrchestrator {
    pub fn new(
        state: Arc<RecoveryState>,
        host: Arc<dyn HostClient>,
        layout: StorageLayout,
        settings: RecoverySettings,
    ) -> Self {
        Self {
            notifier: Notifier::new(host.clone(), settings.toasts),
            store: ToolOutputStore::new(layout.clone()),
            repair: EmptyContentRepair::new(layout, settings.empty_content.placeholder_text.clone()),
            state,
            host,
            settings: Arc::new(settings),
        }
    }

    pub fn state(&self) -> &Arc<RecoveryState> {
        &self.state
    }

    pub fn host(&self) -> &Arc<dyn HostClient> {
        &self.host
    }

    pub fn notifier(&self) -> &Notifier {
        &self.notifier
    }

    pub fn settings(&self) -> &RecoverySettings {
        &self.settings
    }

    pub fn layout(&self) -> &StorageLayout {
        self.store.layout()
    }

    /// One recovery run for `session_id`.
    pub async fn execute(&self, session_id: &str) -> RunOutcome {
        let Some(_guard) = self.state.try_begin_run(session_id) else {
            tracing::debug!(session_id, "recovery already running");
            self.notifier.show(notices::already_running()).await;
            return RunOutcome::AlreadyRunning;
        };

        self.state.take_pending(session_id);
        let Some(error) = self.state.last_error(session_id) else {
            tracing::debug!(session_id, "no recorded error");
            return RunOutcome::NoError;
        };

        tracing::info!(
            session_id,
            error_type = %error.error_type,
            current_tokens = error.current_tokens,
            max_tokens = error.max_tokens,
            "starting context recovery"
        );

        let truncate_budget_left =
            self.state.truncate_attempts(session_id) < self.settings.truncate.max_attempts;
        if error.is_over_limit() && truncate_budget_left {
            if let Some(outcome) = self.aggressive_truncation(session_id, &error).await {
                return outcome;
            }
        }

        let outcome = if error.is_non_empty_content() {
            self.repair_empty_content(session_id, &error).await
        } else {
            self.summarize_with_retry(session_id, &error).await
        };

        tracing::info!(session_id, ?outcome, "context recovery finished");
        outcome
    }

    /// `Some` when truncation alone recovered the session.
    async fn aggressive_truncation(
        &self,
        session_id: &str,
        error: &ParsedLimitError,
    ) -> Option<RunOutcome> {
        let result = truncate_until_target(
            &self.store,
            session_id,
            error.current_tokens,
            error.max_tokens,
            &self.settings.truncate,
        );

        if result.truncated_count > 0 {
            self.state
                .record_truncations(session_id, result.truncated_count, result.last_part_id());
        }

        if !result.sufficient {
            if result.truncated_count > 0 {
                self.notifier
                    .show(notices::truncation_insufficient(
                        result.truncated_count,
                        result.total_bytes_removed,
                        result.target_bytes_to_remove,
                    ))
                    .await;
            }
            return None;
        }

        self.state.clear_session(session_id);
        self.notifier
            .show(notices::truncation_complete(
                result.truncated_count,
                result.total_bytes_removed,
            ))
            .await;
        self.resume(session_id).await;

        Some(RunOutcome::Truncated {
            truncated_count: result.truncated_count,
            bytes_removed: result.total_bytes_removed,
        })
    }

    async fn summarize_with_retry(&self, session_id: &str, error: &ParsedLimitError) -> RunOutcome {
        let retry = &self.settings.retry;
        let model = self.resolve_model(session_id, error).await;

        while let Some(attempt) = self
            .state
            .begin_summarize_attempt(session_id, Utc::now(), retry)
        {
            let Some((provider_id, model_id)) = model.clone() else {
                let err = RecoveryError::UnknownModel(session_id.to_string());
                tracing::warn!(error = %err, "cannot summarize");
                self.notifier.show(notices::summarize_skipped()).await;
                self.fail(session_id, notices::summarize_failed()).await;
                return RunOutcome::SummarizeSkipped;
            };

            self.repair.sanitize(session_id);
            self.notifier
                .show(notices::summarizing(attempt, retry.max_attempts))
                .await;

            let request = SummarizeRequest {
                provider_id,
                model_id,
                auto: true,
            };
            match self.host.summarize(session_id, request).await {
                Ok(()) => {
                    tracing::info!(session_id, attempt, "session summarized");
                    self.state.clear_session(session_id);
                    return RunOutcome::Summarized { attempt };
                }
                Err(source) => {
                    let err = RecoveryError::host("summarize", source);
                    tracing::warn!(session_id, attempt, error = %err, "summarize attempt failed");
                }
            }

            if attempt >= retry.max_attempts {
                break;
            }
            let delay = backoff_delay(retry, attempt);
            tracing::debug!(session_id, attempt, delay_ms = delay.as_millis() as u64, "backing off");
            tokio::time::sleep(delay).await;

            if !self.state.has_error(session_id) {
                return RunOutcome::Cleared;
            }
        }

        self.fail(session_id, notices::summarize_failed()).await;
        RunOutcome::SummarizeExhausted
    }

    async fn repair_empty_content(&self, session_id: &str, error: &ParsedLimitError) -> RunOutcome {
        let max_attempts = self.settings.empty_content.max_attempts;
        let mut repaired_any = false;

        loop {
            let Some(attempt) = self.state.begin_repair_attempt(session_id, max_attempts) else {
                self.fail(session_id, notices::repair_exhausted()).await;
                return RunOutcome::RepairExhausted;
            };

            self.notifier.show(notices::repairing_empty_content()).await;
            let report = self.repair.repair(session_id, error.message_index);

            if report.is_fixed() {
                repaired_any = true;
                self.notifier.show(notices::repaired(report.fixed.len())).await;
                tokio::time::sleep(Duration::from_millis(
                    self.settings.delays.repair_retry_ms,
                ))
                .await;
                if !self.state.has_error(session_id) {
                    return RunOutcome::Cleared;
                }
                continue;
            }

            if repaired_any {
                self.state.clear_session(session_id);
                self.resume(session_id).await;
                return RunOutcome::Repaired { attempts: attempt };
            }

            self.fail(session_id, notices::nothing_to_repair()).await;
            return RunOutcome::RepairExhausted;
        }
    }

    /// Provider and model from the error, else from the last assistant turn.
    async fn resolve_model(
        &self,
        session_id: &str,
        error: &ParsedLimitError,
    ) -> Option<(String, String)> {
        if let (Some(provider), Some(model)) = (&error.provider_id, &error.model_id) {
            return Some((provider.clone(), model.clone()));
        }

        let last = last_assistant_message(self.host.as_ref(), session_id).await;
        let provider = error
            .provider_id
            .clone()
            .or_else(|| last.as_ref().and_then(|m| m.provider_id.clone()));
        let model = error
            .model_id
            .clone()
            .or_else(|| last.as_ref().and_then(|m| m.model_id.clone()));
        provider.zip(model)
    }

    async fn resume(&self, session_id: &str) {
        tokio::time::sleep(Duration::from_millis(self.settings.delays.continuation_ms)).await;
        if let Err(source) = self
            .host
            .prompt_async(session_id, PromptRequest::text(notices::CONTINUE_PROMPT))
            .await
        {
            let err = RecoveryError::host("prompt_async", source);
            tracing::warn!(session_id, error = %err, "failed to resume session");
        }
    }

    async fn fail(&self, session_id: &str, notice: Notice) {
        tracing::warn!(session_id, reason = notice.title, "context recovery gave up");
        self.state.clear_session(session_id);
        self.notifier.show(notice).await;
    }
}
