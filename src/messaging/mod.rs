use crate::middleware::{Handler, Invocation};
use dashmap::DashMap;
use serde_json::Value;
use std::sync::Arc;
use uuid::Uuid;

pub type ListenerId = Uuid;

/// Handle for one event listener registration.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct EventSubscription {
    pub event: String,
    pub listener: ListenerId,
}

/// Process-wide named event dispatch
pub trait EventBus: Send + Sync + 'static {
    fn add_event_listener(&self, event: &str, handler: Handler) -> EventSubscription;

    /// Returns `false` when the subscription was not (or no longer) registered.
    fn remove_event_listener(&self, subscription: &EventSubscription) -> bool;

    /// Total number of active registrations across all events.
    fn listener_count(&self) -> usize;
}

/// A simple in-memory event bus
#[derive(Clone, Default)]
pub struct LocalEventBus {
    // Map of event name -> listeners in registration order
    channels: Arc<DashMap<String, Vec<(ListenerId, Handler)>>>,
}

impl LocalEventBus {
    pub fn new() -> Self {
        Self::default()
    }

    fn listeners(&self, event: &str) -> Vec<Handler> {
        self.channels
            .get(event)
            .map(|listeners| listeners.iter().map(|(_, h)| Arc::clone(h)).collect())
            .unwrap_or_default()
    }

    /// Deliver an event to every current listener and wait for all of them.
    /// Returns the number of listeners invoked.
    pub async fn dispatch(&self, event: &str, args: Vec<Value>) -> usize {
        let listeners = self.listeners(event);
        for handler in &listeners {
            if let Err(e) = handler(Invocation::new(args.clone())).await {
                tracing::debug!(event, error = %e, "event listener failed");
            }
        }
        listeners.len()
    }

    /// Fire-and-forget delivery; each listener runs in its own task.
    /// Must be called from within a Tokio runtime.
    pub fn emit(&self, event: &str, args: Vec<Value>) -> usize {
        let listeners = self.listeners(event);
        for handler in &listeners {
            let handler = Arc::clone(handler);
            let args = args.clone();
            let event = event.to_string();
            tokio::spawn(async move {
                if let Err(e) = handler(Invocation::new(args)).await {
                    tracing::debug!(event, error = %e, "event listener failed");
                }
            });
        }
        listeners.len()
    }

    pub fn event_listener_count(&self, event: &str) -> usize {
        self.channels.get(event).map_or(0, |listeners| listeners.len())
    }
}

impl EventBus for LocalEventBus {
    fn add_event_listener(&self, event: &str, handler: Handler) -> EventSubscription {
        let listener = Uuid::new_v4();
        self.channels
            .entry(event.to_string())
            .or_default()
            .push((listener, handler));
        EventSubscription {
            event: event.to_string(),
            listener,
        }
    }

    fn remove_event_listener(&self, subscription: &EventSubscription) -> bool {
        let Some(mut listeners) = self.channels.get_mut(&subscription.event) else {
            return false;
        };
        let before = listeners.len();
        listeners.retain(|(id, _)| *id != subscription.listener);
        let removed = listeners.len() != before;
        let now_empty = listeners.is_empty();
        drop(listeners);

        if now_empty {
            self.channels
                .remove_if(&subscription.event, |_, listeners| listeners.is_empty());
        }
        removed
    }

    fn listener_count(&self) -> usize {
        self.channels.iter().map(|entry| entry.value().len()).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::middleware::handler_fn;
    use serde_json::json;
    use std::ops::ControlFlow;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn counting_handler(counter: &Arc<AtomicUsize>) -> Handler {
        let counter = Arc::clone(counter);
        handler_fn(move |invocation: Invocation| {
            let counter = Arc::clone(&counter);
            async move {
                let step = invocation.args.first().and_then(Value::as_u64).unwrap_or(1);
                counter.fetch_add(step as usize, Ordering::SeqCst);
                Ok(ControlFlow::Continue(()))
            }
        })
    }

    #[tokio::test]
    async fn dispatch_reaches_only_matching_listeners() {
        let bus = LocalEventBus::new();
        let pings = Arc::new(AtomicUsize::new(0));
        let pongs = Arc::new(AtomicUsize::new(0));
        bus.add_event_listener("ping", counting_handler(&pings));
        bus.add_event_listener("ping", counting_handler(&pings));
        bus.add_event_listener("pong", counting_handler(&pongs));

        assert_eq!(bus.dispatch("ping", vec![json!(3)]).await, 2);
        assert_eq!(pings.load(Ordering::SeqCst), 6);
        assert_eq!(pongs.load(Ordering::SeqCst), 0);
        assert_eq!(bus.dispatch("unknown", Vec::new()).await, 0);
    }

    #[tokio::test]
    async fn removing_a_listener_stops_delivery() {
        let bus = LocalEventBus::new();
        let hits = Arc::new(AtomicUsize::new(0));
        let subscription = bus.add_event_listener("ping", counting_handler(&hits));
        assert_eq!(bus.listener_count(), 1);

        assert!(bus.remove_event_listener(&subscription));
        assert!(!bus.remove_event_listener(&subscription));
        assert_eq!(bus.listener_count(), 0);
        assert_eq!(bus.event_listener_count("ping"), 0);

        bus.dispatch("ping", Vec::new()).await;
        assert_eq!(hits.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn failing_listener_does_not_block_the_others() {
        let bus = LocalEventBus::new();
        let hits = Arc::new(AtomicUsize::new(0));
        bus.add_event_listener(
            "ping",
            handler_fn(|_| async { Err(anyhow::anyhow!("listener broke")) }),
        );
        bus.add_event_listener("ping", counting_handler(&hits));

        assert_eq!(bus.dispatch("ping", Vec::new()).await, 2);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn emit_runs_listeners_in_the_background() {
        let bus = LocalEventBus::new();
        let hits = Arc::new(AtomicUsize::new(0));
        bus.add_event_listener("ping", counting_handler(&hits));

        assert_eq!(bus.emit("ping", vec![json!(4)]), 1);
        for _ in 0..50 {
            if hits.load(Ordering::SeqCst) == 4 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert_eq!(hits.load(Ordering::SeqCst), 4);
    }
}
