use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Mutex, PoisonError};

/// Application lifecycle transitions that can be observed.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, strum_macros::Display)]
#[strum(serialize_all = "lowercase")]
pub enum LifecycleEvent {
    Start,
    Stop,
}

type ListenerFuture = Pin<Box<dyn Future<Output = ()> + Send>>;
type Listener = Box<dyn FnOnce() -> ListenerFuture + Send>;

/// Once-listeners keyed by [`LifecycleEvent`].
///
/// A listener runs on the next firing of its event and is then dropped.
#[derive(Default)]
pub struct LifecycleEvents {
    listeners: Mutex<HashMap<LifecycleEvent, Vec<Listener>>>,
}

impl LifecycleEvents {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn once<F, Fut>(&self, event: LifecycleEvent, listener: F)
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let listener: Listener = Box::new(move || -> ListenerFuture { Box::pin(listener()) });
        self.listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(event)
            .or_default()
            .push(listener);
    }

    /// Run and consume every listener for `event`, in registration order.
    pub async fn fire(&self, event: LifecycleEvent) -> usize {
        let listeners = self
            .listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&event)
            .unwrap_or_default();
        let fired = listeners.len();
        for listener in listeners {
            listener().await;
        }
        tracing::debug!(%event, listeners = fired, "lifecycle event fired");
        fired
    }

    pub fn pending(&self, event: LifecycleEvent) -> usize {
        self.listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&event)
            .map_or(0, Vec::len)
    }
}
