//! Context-window recovery for LLM coding sessions.
//!
//! When the provider rejects a request because the conversation no longer
//! fits the model's context window, the recovery controller classifies the
//! error, truncates oversized stored tool outputs, repairs empty messages,
//! or asks the host to summarize the session, then resumes it.

pub mod classify;
pub mod dedup;
pub mod error;
pub mod host;
pub mod lifecycle;
pub mod notices;
pub mod orchestrator;
pub mod plugin;
pub mod repair;
pub mod state;
pub mod storage;
pub mod truncate;

pub use classify::{
    classify_error, contains_token_limit_error, extract_message_index, extract_tokens,
    is_thinking_block_error, parse_limit_error, ErrorClass, LimitErrorKind, ParsedLimitError,
};
pub use dedup::{tool_signature, DeduplicationPlan, DeduplicationPlanner, BUILTIN_PROTECTED_TOOLS};
pub use error::{RecoveryError, StoreError, StoreResult};
pub use host::{
    HostClient, Notifier, PromptPart, PromptRequest, SessionMessage, SummarizeRequest, Toast,
    ToastVariant,
};
pub use lifecycle::RecoveryHook;
pub use orchestrator::{backoff_delay, RecoveryOrchestrator, RunOutcome};
pub use plugin::RecoveryPlugin;
pub use repair::{EmptyContentRepair, RepairReport};
pub use state::{RecoveryState, RetryState, SessionRunGuard, SessionSnapshot, TruncateState};
pub use storage::{StorageLayout, ToolOutputRecord, ToolOutputStore, TruncatedTool};
pub use truncate::{truncate_until_target, TruncationResult, TruncationTarget};
