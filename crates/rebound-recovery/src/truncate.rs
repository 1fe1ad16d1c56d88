//! Target-ratio truncation of stored tool outputs.

use crate::storage::{ToolOutputStore, TruncatedTool};
use rebound_config::TruncateSettings;
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TruncationTarget {
    pub target_tokens: u64,
    pub tokens_to_remove: u64,
    pub bytes_to_remove: u64,
}

impl TruncationTarget {
    /// Budget for shrinking `current_tokens` to `max_tokens * target_ratio`.
    pub fn compute(current_tokens: u64, max_tokens: u64, settings: &TruncateSettings) -> Self {
        let target_tokens = (max_tokens as f64 * settings.target_ratio).floor() as u64;
        let tokens_to_remove = current_tokens.saturating_sub(target_tokens);
        Self {
            target_tokens,
            tokens_to_remove,
            bytes_to_remove: tokens_to_remove.saturating_mul(settings.chars_per_token),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TruncationResult {
    pub success: bool,
    pub sufficient: bool,
    pub truncated_count: usize,
    pub total_bytes_removed: u64,
    pub target_bytes_to_remove: u64,
    pub truncated_tools: Vec<TruncatedTool>,
}

impl TruncationResult {
    pub fn last_part_id(&self) -> Option<&str> {
        self.truncated_tools.last().map(|t| t.part_id.as_str())
    }
}

/// Truncate the largest tool outputs until the byte budget is met.
///
/// Stops at the first record that brings the total to the budget. Running
/// out of records first reports `sufficient = false`.
pub fn truncate_until_target(
    store: &ToolOutputStore,
    session_id: &str,
    current_tokens: u64,
    max_tokens: u64,
    settings: &TruncateSettings,
) -> TruncationResult {
    let target = TruncationTarget::compute(current_tokens, max_tokens, settings);
    let mut result = TruncationResult {
        target_bytes_to_remove: target.bytes_to_remove,
        ..TruncationResult::default()
    };

    if target.tokens_to_remove == 0 {
        result.success = true;
        result.sufficient = true;
        return result;
    }

    let records = store.find_tool_results_by_size(session_id);
    if records.is_empty() {
        tracing::debug!(session_id, "no tool outputs to truncate");
        return result;
    }

    for record in records {
        if result.total_bytes_removed >= target.bytes_to_remove {
            break;
        }
        match store.truncate_tool_result(&record.path) {
            Ok(truncated) => {
                result.total_bytes_removed += truncated.original_size as u64;
                result.truncated_count += 1;
                result.truncated_tools.push(truncated);
            }
            Err(err) => tracing::debug!(session_id, error = %err, "tool output not truncated"),
        }
    }

    result.success = result.truncated_count > 0;
    result.sufficient = result.total_bytes_removed >= target.bytes_to_remove;

    tracing::info!(
        session_id,
        truncated = result.truncated_count,
        removed = result.total_bytes_removed,
        target = target.bytes_to_remove,
        sufficient = result.sufficient,
        "aggressive truncation finished"
    );
    result
}
