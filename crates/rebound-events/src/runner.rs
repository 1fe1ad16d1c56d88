use crate::events::HostEvent;
use crate::handler::{EventHandler, HandlerResult};
use std::sync::Arc;
use tokio::sync::broadcast;

pub struct HandlerRegistry {
    handlers: Vec<Arc<dyn EventHandler>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self {
            handlers: Vec::new(),
        }
    }

    pub fn register(&mut self, handler: Arc<dyn EventHandler>) {
        self.handlers.push(handler);
        self.handlers.sort_by_key(|h| std::cmp::Reverse(h.priority()));
    }

    pub async fn dispatch(&self, event: &HostEvent) -> Vec<HandlerResult> {
        let mut results = Vec::new();

        for handler in &self.handlers {
            if handler.filter().matches(event) {
                let result = handler.handle(event).await;
                let should_continue = result.should_continue;
                results.push(result);

                if !should_continue {
                    break;
                }
            }
        }

        results
    }
}

impl Default for HandlerRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Drains a bus receiver and dispatches every event, in emission order.
pub struct SubscriberRunner {
    registry: Arc<HandlerRegistry>,
}

impl SubscriberRunner {
    pub fn new(registry: Arc<HandlerRegistry>) -> Self {
        Self { registry }
    }

    pub async fn run(&self, mut receiver: broadcast::Receiver<HostEvent>) {
        loop {
            match receiver.recv().await {
                Ok(event) => {
                    let results = self.registry.dispatch(&event).await;
                    if let Some(blocked) = results.iter().find(|r| !r.should_continue) {
                        tracing::debug!("Handler blocked event: {:?}", blocked.message);
                    }
                }
                Err(broadcast::error::RecvError::Closed) => {
                    tracing::info!("Event bus closed, stopping subscriber runner");
                    break;
                }
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    tracing::warn!("Subscriber runner lagged, missed {} events", n);
                }
            }
        }
    }

    pub fn spawn(self, receiver: broadcast::Receiver<HostEvent>) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            self.run(receiver).await;
        })
    }
}
