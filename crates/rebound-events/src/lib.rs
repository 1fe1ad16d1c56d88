mod bus;
mod events;
mod handler;
mod runner;

pub use bus::{BroadcastBus, EventBus};
pub use events::{DeletedSession, HostEvent, MessageInfo};
pub use handler::{EventHandler, HandlerResult, SubscriptionFilter};
pub use runner::{HandlerRegistry, SubscriberRunner};
