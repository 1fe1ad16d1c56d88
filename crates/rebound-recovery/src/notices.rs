//! User-facing toast text.

use crate::host::ToastVariant;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub title: &'static str,
    pub message: String,
    pub variant: ToastVariant,
    pub duration_ms: u64,
}

impl Notice {
    fn new(
        title: &'static str,
        message: impl Into<String>,
        variant: ToastVariant,
        duration_ms: u64,
    ) -> Self {
        Self {
            title,
            message: message.into(),
            variant,
            duration_ms,
        }
    }
}

pub const CONTINUE_PROMPT: &str = "Continue";

pub const NEW_SESSION_ADVICE: &str = "Please start a new session.";

pub fn already_running() -> Notice {
    Notice::new(
        "Compact In Progress",
        "Recovery is already running for this session. Please wait...",
        ToastVariant::Warning,
        3000,
    )
}

pub fn context_limit_hit() -> Notice {
    Notice::new(
        "Context Limit Hit",
        "Truncating large tool outputs and recovering...",
        ToastVariant::Warning,
        3000,
    )
}

pub fn truncation_complete(count: usize, bytes: u64) -> Notice {
    Notice::new(
        "Truncation Complete",
        format!(
            "Truncated {count} tool output{} ({}). Resuming...",
            if count == 1 { "" } else { "s" },
            format_bytes(bytes)
        ),
        ToastVariant::Success,
        3000,
    )
}

pub fn truncation_insufficient(count: usize, removed: u64, needed: u64) -> Notice {
    Notice::new(
        "Truncation Insufficient",
        format!(
            "Truncated {count} output(s), freed {} of {}. Summarizing...",
            format_bytes(removed),
            format_bytes(needed)
        ),
        ToastVariant::Warning,
        3000,
    )
}

pub fn summarizing(attempt: u32, max_attempts: u32) -> Notice {
    Notice::new(
        "Auto Compact",
        format!("Summarizing session (attempt {attempt}/{max_attempts})..."),
        ToastVariant::Warning,
        3000,
    )
}

pub fn summarize_skipped() -> Notice {
    Notice::new(
        "Summarize Skipped",
        "Missing providerID or modelID.",
        ToastVariant::Warning,
        3000,
    )
}

pub fn summarize_failed() -> Notice {
    Notice::new(
        "Auto Compact Failed",
        format!("All recovery attempts failed. {NEW_SESSION_ADVICE}"),
        ToastVariant::Error,
        5000,
    )
}

pub fn repairing_empty_content() -> Notice {
    Notice::new(
        "Empty Content Error",
        "Fixing empty message...",
        ToastVariant::Warning,
        3000,
    )
}

pub fn repaired(count: usize) -> Notice {
    Notice::new(
        "Session Recovery",
        format!("Fixed {count} empty message(s). Retrying..."),
        ToastVariant::Success,
        3000,
    )
}

pub fn nothing_to_repair() -> Notice {
    Notice::new(
        "Empty Content Error",
        format!("No empty messages found in storage. Cannot auto-recover. {NEW_SESSION_ADVICE}"),
        ToastVariant::Error,
        5000,
    )
}

pub fn repair_exhausted() -> Notice {
    Notice::new(
        "Recovery Failed",
        format!("Max recovery attempts reached. {NEW_SESSION_ADVICE}"),
        ToastVariant::Error,
        5000,
    )
}

pub fn format_bytes(bytes: u64) -> String {
    const KB: f64 = 1024.0;
    const MB: f64 = KB * 1024.0;
    let b = bytes as f64;
    if b >= MB {
        format!("{:.1}MB", b / MB)
    } else if b >= KB {
        format!("{:.1}KB", b / KB)
    } else {
        format!("{bytes}B")
    }
}
