use super::{read_record, write_record, StorageLayout, StoredToolPart};
use crate::error::{StoreError, StoreResult};
use chrono::Utc;
use serde::Serialize;
use std::collections::HashSet;
use std::path::{Path, PathBuf};

pub const TRUNCATION_NOTICE: &str = "[TOOL RESULT TRUNCATED - Context limit exceeded. Original output was too large and has been truncated to recover the session. Please re-run this tool if you need the full output.]";

/// A tool record that still carries its full output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolOutputRecord {
    pub path: PathBuf,
    pub part_id: String,
    pub message_id: String,
    pub call_id: String,
    pub tool_name: String,
    pub output_size: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TruncatedTool {
    pub part_id: String,
    pub tool_name: String,
    pub original_size: usize,
}

/// Finds and truncates persisted tool outputs for a session.
#[derive(Debug, Clone)]
pub struct ToolOutputStore {
    layout: StorageLayout,
}

impl ToolOutputStore {
    pub fn new(layout: StorageLayout) -> Self {
        Self { layout }
    }

    pub fn layout(&self) -> &StorageLayout {
        &self.layout
    }

    fn tool_parts(&self, session_id: &str) -> Vec<(PathBuf, StoredToolPart)> {
        let mut found = Vec::new();
        for message_id in self.layout.message_ids(session_id) {
            for part in self.layout.read_parts(&message_id) {
                if part.part_type() != Some("tool") {
                    continue;
                }
                match serde_json::from_value::<StoredToolPart>(part.value) {
                    Ok(tool) => found.push((part.path, tool)),
                    Err(err) => {
                        tracing::debug!(path = %part.path.display(), error = %err, "skipping malformed tool part")
                    }
                }
            }
        }
        found
    }

    /// Non-truncated tool records with output, largest first.
    pub fn find_tool_results_by_size(&self, session_id: &str) -> Vec<ToolOutputRecord> {
        let mut records: Vec<ToolOutputRecord> = self
            .tool_parts(session_id)
            .into_iter()
            .filter_map(|(path, tool)| {
                let output_size = tool.truncatable_size()?;
                Some(ToolOutputRecord {
                    path,
                    part_id: tool.id,
                    message_id: tool.message_id,
                    call_id: tool.call_id,
                    tool_name: tool.tool,
                    output_size,
                })
            })
            .collect();

        records.sort_by(|a, b| {
            b.output_size
                .cmp(&a.output_size)
                .then_with(|| a.path.cmp(&b.path))
        });
        records
    }

    /// Replace one record's output with [`TRUNCATION_NOTICE`].
    ///
    /// The record is re-read first, so a record truncated by a concurrent
    /// pass is reported as [`StoreError::AlreadyTruncated`] and left alone.
    pub fn truncate_tool_result(&self, path: &Path) -> StoreResult<TruncatedTool> {
        let mut tool: StoredToolPart = read_record(path)?;
        if !tool.is_tool() {
            return Err(StoreError::NotToolRecord(path.to_path_buf()));
        }
        if tool.truncated {
            return Err(StoreError::AlreadyTruncated(path.to_path_buf()));
        }
        let Some(original_size) = tool.truncatable_size() else {
            return Err(StoreError::NoOutput(path.to_path_buf()));
        };

        tool.state.output = Some(TRUNCATION_NOTICE.to_string());
        tool.truncated = true;
        tool.original_size = Some(original_size);
        tool.mark_compacted(Utc::now().timestamp_millis());
        write_record(path, &tool)?;

        tracing::debug!(
            part_id = %tool.id,
            tool = %tool.tool,
            original_size,
            "truncated tool output"
        );

        Ok(TruncatedTool {
            part_id: tool.id,
            tool_name: tool.tool,
            original_size,
        })
    }

    /// Truncate every record whose call id is in `call_ids`. Records that
    /// fail or were already truncated are skipped.
    pub fn truncate_by_call_ids(
        &self,
        session_id: &str,
        call_ids: &HashSet<String>,
    ) -> Vec<TruncatedTool> {
        if call_ids.is_empty() {
            return Vec::new();
        }

        self.find_tool_results_by_size(session_id)
            .into_iter()
            .filter(|record| call_ids.contains(&record.call_id))
            .filter_map(|record| match self.truncate_tool_result(&record.path) {
                Ok(truncated) => Some(truncated),
                Err(err) => {
                    tracing::debug!(error = %err, "skipping tool output");
                    None
                }
            })
            .collect()
    }
}
