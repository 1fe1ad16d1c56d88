//! Plugin bootstrap: configuration, logging, and event wiring.

use crate::host::HostClient;
use crate::lifecycle::RecoveryHook;
use crate::orchestrator::RecoveryOrchestrator;
use crate::state::RecoveryState;
use crate::storage::StorageLayout;
use anyhow::Result;
use rebound_config::{load_config, ReboundConfig};
use rebound_events::{EventBus, HandlerRegistry, SubscriberRunner};
use rebound_telemetry::try_init_subscriber;
use std::path::Path;
use std::sync::Arc;
use tokio::task::JoinHandle;

/// One recovery controller instance. Each instance owns its own state.
pub struct RecoveryPlugin {
    hook: Arc<RecoveryHook>,
}

impl RecoveryPlugin {
    pub fn new(config: &ReboundConfig, host: Arc<dyn HostClient>) -> Self {
        let layout = StorageLayout::from_settings(&config.storage);
        let orchestrator = RecoveryOrchestrator::new(
            Arc::new(RecoveryState::new()),
            host,
            layout,
            config.recovery.clone(),
        );
        Self {
            hook: Arc::new(RecoveryHook::new(orchestrator)),
        }
    }

    /// Load configuration (from `config_path` or the usual locations),
    /// install logging if the host has not, and build the plugin.
    pub fn load(config_path: Option<&Path>, host: Arc<dyn HostClient>) -> Result<Self> {
        let config = load_config(config_path)?;
        if let Err(err) = try_init_subscriber(&config.telemetry) {
            tracing::debug!(error = %err, "tracing subscriber already installed");
        }

        let plugin = Self::new(&config, host);
        tracing::info!(
            storage = %plugin.hook.orchestrator().layout().root().display(),
            enabled = config.recovery.enabled,
            "context recovery plugin ready"
        );
        Ok(plugin)
    }

    pub fn hook(&self) -> Arc<RecoveryHook> {
        self.hook.clone()
    }

    pub fn state(&self) -> &Arc<RecoveryState> {
        self.hook.orchestrator().state()
    }

    /// Consume `bus` events on a background task.
    pub fn attach<B: EventBus>(&self, bus: &B) -> JoinHandle<()> {
        let mut registry = HandlerRegistry::new();
        registry.register(self.hook.clone());
        SubscriberRunner::new(Arc::new(registry)).spawn(bus.subscribe())
    }
}
