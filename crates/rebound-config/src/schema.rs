use rebound_telemetry::TelemetryConfig;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Main Rebound configuration
///
/// Configuration is loaded from (in priority order):
/// 1. `rebound.jsonc` - JSON with comments
/// 2. `rebound.json` - Standard JSON
/// 3. `rebound.yml` / `rebound.yaml` - YAML format
///
/// Also checks hidden variants (`.rebound.*`) and `~/.config/rebound/` for global config.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReboundConfig {
    /// Context-window recovery behaviour
    #[serde(default)]
    pub recovery: RecoverySettings,

    /// Where the host persists conversations
    #[serde(default)]
    pub storage: StorageSettings,

    /// Logging
    #[serde(default)]
    pub telemetry: TelemetryConfig,
}

// ============================================================================
// Recovery Configuration
// ============================================================================

/// Recovery pipeline settings
///
/// # Example
///
/// ```yaml
/// recovery:
///   truncate:
///     target_ratio: 0.5
///   retry:
///     max_attempts: 2
///   deduplication:
///     enabled: true
///     protected_tools: ["memory"]
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecoverySettings {
    /// Master switch (default: true)
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Show toast notifications in the host UI (default: true)
    #[serde(default = "default_true")]
    pub toasts: bool,

    #[serde(default)]
    pub truncate: TruncateSettings,

    #[serde(default)]
    pub retry: RetrySettings,

    #[serde(default)]
    pub empty_content: EmptyContentSettings,

    #[serde(default)]
    pub deduplication: DeduplicationSettings,

    #[serde(default)]
    pub delays: DelaySettings,
}

impl Default for RecoverySettings {
    fn default() -> Self {
        Self {
            enabled: true,
            toasts: true,
            truncate: TruncateSettings::default(),
            retry: RetrySettings::default(),
            empty_content: EmptyContentSettings::default(),
            deduplication: DeduplicationSettings::default(),
            delays: DelaySettings::default(),
        }
    }
}

/// Aggressive tool-output truncation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TruncateSettings {
    /// Records truncated per session before truncation is skipped (default: 20)
    #[serde(default = "default_truncate_max_attempts")]
    pub max_attempts: u32,

    /// Fraction of the model maximum to shrink down to (default: 0.5)
    #[serde(default = "default_target_ratio")]
    pub target_ratio: f64,

    /// Characters per estimated token (default: 4)
    #[serde(default = "default_chars_per_token")]
    pub chars_per_token: u64,
}

impl Default for TruncateSettings {
    fn default() -> Self {
        Self {
            max_attempts: default_truncate_max_attempts(),
            target_ratio: default_target_ratio(),
            chars_per_token: default_chars_per_token(),
        }
    }
}

/// Summarize retry with exponential backoff
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrySettings {
    /// Summarize attempts per session (default: 2)
    #[serde(default = "default_retry_max_attempts")]
    pub max_attempts: u32,

    /// First backoff delay in milliseconds (default: 2000)
    #[serde(default = "default_initial_delay_ms")]
    pub initial_delay_ms: u64,

    /// Multiplier applied per attempt (default: 2)
    #[serde(default = "default_backoff_factor")]
    pub backoff_factor: u32,

    /// Backoff ceiling in milliseconds (default: 30000)
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,

    /// Attempt counter resets after this much quiet time (default: 300000)
    #[serde(default = "default_reset_after_ms")]
    pub reset_after_ms: u64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: default_retry_max_attempts(),
            initial_delay_ms: default_initial_delay_ms(),
            backoff_factor: default_backoff_factor(),
            max_delay_ms: default_max_delay_ms(),
            reset_after_ms: default_reset_after_ms(),
        }
    }
}

/// Repair of "non-empty content" rejections
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmptyContentSettings {
    /// Repair attempts per session (default: 3)
    #[serde(default = "default_empty_content_max_attempts")]
    pub max_attempts: u32,

    /// Text injected into empty messages (default: "[user interrupted]")
    #[serde(default = "default_placeholder_text")]
    pub placeholder_text: String,
}

impl Default for EmptyContentSettings {
    fn default() -> Self {
        Self {
            max_attempts: default_empty_content_max_attempts(),
            placeholder_text: default_placeholder_text(),
        }
    }
}

/// Pruning of repeated identical tool calls
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DeduplicationSettings {
    /// Run deduplication for errors arriving mid-recovery (default: false)
    #[serde(default)]
    pub enabled: bool,

    /// Tool names never pruned, in addition to the built-in set
    #[serde(default)]
    pub protected_tools: Vec<String>,
}

/// Scheduling delays, all in milliseconds
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DelaySettings {
    /// Wait between a session error and the recovery run (default: 300)
    #[serde(default = "default_schedule_ms")]
    pub schedule_ms: u64,

    /// Wait before prompting the session to continue (default: 500)
    #[serde(default = "default_continuation_ms")]
    pub continuation_ms: u64,

    /// Wait before re-running the strategy after a repair (default: 500)
    #[serde(default = "default_repair_retry_ms")]
    pub repair_retry_ms: u64,
}

impl Default for DelaySettings {
    fn default() -> Self {
        Self {
            schedule_ms: default_schedule_ms(),
            continuation_ms: default_continuation_ms(),
            repair_retry_ms: default_repair_retry_ms(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_truncate_max_attempts() -> u32 {
    20
}

fn default_target_ratio() -> f64 {
    0.5
}

fn default_chars_per_token() -> u64 {
    4
}

fn default_retry_max_attempts() -> u32 {
    2
}

fn default_initial_delay_ms() -> u64 {
    2000
}

fn default_backoff_factor() -> u32 {
    2
}

fn default_max_delay_ms() -> u64 {
    30_000
}

fn default_reset_after_ms() -> u64 {
    300_000
}

fn default_empty_content_max_attempts() -> u32 {
    3
}

fn default_placeholder_text() -> String {
    "[user interrupted]".to_string()
}

fn default_schedule_ms() -> u64 {
    300
}

fn default_continuation_ms() -> u64 {
    500
}

fn default_repair_retry_ms() -> u64 {
    500
}

// ============================================================================
// Storage Configuration
// ============================================================================

/// Conversation storage location
///
/// ```yaml
/// storage:
///   root: ${XDG_DATA_HOME}/opencode/storage
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StorageSettings {
    /// Storage root containing `message/` and `part/` (default: platform data dir)
    #[serde(default)]
    pub root: Option<String>,
}

impl StorageSettings {
    pub fn resolved_root(&self) -> PathBuf {
        if let Some(root) = &self.root {
            return PathBuf::from(root);
        }

        let data_dir = std::env::var("XDG_DATA_HOME")
            .ok()
            .filter(|v| !v.is_empty())
            .map(PathBuf::from)
            .or_else(|| dirs::home_dir().map(|h| h.join(".local").join("share")))
            .unwrap_or_else(|| PathBuf::from("."));

        data_dir.join("opencode").join("storage")
    }
}
