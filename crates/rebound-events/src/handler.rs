use crate::events::HostEvent;
use async_trait::async_trait;
use std::collections::HashSet;

/// Which events a handler receives. An empty filter accepts everything.
#[derive(Debug, Clone, Default)]
pub struct SubscriptionFilter {
    event_names: Option<HashSet<&'static str>>,
}

impl SubscriptionFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn event_names(mut self, names: impl IntoIterator<Item = &'static str>) -> Self {
        self.event_names = Some(names.into_iter().collect());
        self
    }

    pub fn matches(&self, event: &HostEvent) -> bool {
        match &self.event_names {
            Some(names) => names.contains(event.event_name()),
            None => true,
        }
    }
}

#[async_trait]
pub trait EventHandler: Send + Sync {
    fn name(&self) -> &str;
    fn filter(&self) -> SubscriptionFilter {
        SubscriptionFilter::new()
    }
    async fn handle(&self, event: &HostEvent) -> HandlerResult;
    /// Higher runs first.
    fn priority(&self) -> i32 {
        0
    }
}

/// Outcome of one handler; `block` stops lower-priority handlers from
/// seeing the event.
#[derive(Debug, Clone)]
pub struct HandlerResult {
    pub should_continue: bool,
    pub message: Option<String>,
}

impl HandlerResult {
    pub fn pass() -> Self {
        Self {
            should_continue: true,
            message: None,
        }
    }

    pub fn block(reason: impl Into<String>) -> Self {
        Self {
            should_continue: false,
            message: Some(reason.into()),
        }
    }
}
