use serde::{Deserialize, Serialize};
use tracing_subscriber::util::TryInitError;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TelemetryConfig {
    #[serde(default = "default_level")]
    pub level: String,

    #[serde(default)]
    pub json_output: bool,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            level: default_level(),
            json_output: false,
        }
    }
}

fn default_level() -> String {
    "info".to_string()
}

impl TelemetryConfig {
    /// `RUST_LOG` wins over the configured level.
    fn env_filter(&self) -> EnvFilter {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&self.level))
    }
}

/// Install the global subscriber unless the host already installed one.
///
/// The recovery plugin is loaded inside a host process, which usually owns
/// logging. Calling this twice is harmless.
pub fn try_init_subscriber(config: &TelemetryConfig) -> Result<(), TryInitError> {
    let filter = config.env_filter();

    if config.json_output {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .try_init()
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer())
            .try_init()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = TelemetryConfig::default();
        assert_eq!(config.level, "info");
        assert!(!config.json_output);
    }

    #[test]
    fn test_config_deserializes_with_defaults() {
        let config: TelemetryConfig = serde_json::from_str(r#"{"json_output": true}"#).unwrap();
        assert_eq!(config.level, "info");
        assert!(config.json_output);
    }

    #[test]
    fn test_second_init_is_reported_not_panicking() {
        let config = TelemetryConfig::default();
        let _ = try_init_subscriber(&config);
        assert!(try_init_subscriber(&config).is_err());
    }
}
