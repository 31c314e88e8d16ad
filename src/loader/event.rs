use crate::di::{Dependencies, Injectable, ServiceKey};
use crate::error::Result;
use crate::messaging::{EventBus, EventSubscription};
use crate::metadata::{MetadataTable, ProviderRef};
use crate::middleware::EventChainFactory;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Subscribes a provider's event handlers to the event bus.
pub struct EventLoader {
    bus: Arc<dyn EventBus>,
    factory: Arc<EventChainFactory>,
    metadata: Arc<MetadataTable>,
    subscriptions: Mutex<Vec<EventSubscription>>,
}

impl EventLoader {
    pub fn new(
        bus: Arc<dyn EventBus>,
        factory: Arc<EventChainFactory>,
        metadata: Arc<MetadataTable>,
    ) -> Self {
        Self {
            bus,
            factory,
            metadata,
            subscriptions: Mutex::new(Vec::new()),
        }
    }

    /// Wrap and subscribe every event handler declared for `provider`.
    /// Returns the number of new subscriptions.
    pub fn load(&self, provider: &ProviderRef) -> usize {
        let entries = self.metadata.event_handlers(provider);
        let mut subscriptions = self.subscriptions();
        for entry in &entries {
            let handler = self.factory.wrap(&entry.metadata, entry.bind(provider));
            subscriptions.push(self.bus.add_event_listener(&entry.metadata.name, handler));
        }
        entries.len()
    }

    /// Remove every subscription made by this loader. Safe to call repeatedly.
    pub fn unload(&self) -> usize {
        let drained: Vec<_> = self.subscriptions().drain(..).collect();
        for subscription in &drained {
            self.bus.remove_event_listener(subscription);
        }
        drained.len()
    }

    pub fn handle_count(&self) -> usize {
        self.subscriptions().len()
    }

    fn subscriptions(&self) -> MutexGuard<'_, Vec<EventSubscription>> {
        self.subscriptions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

impl Injectable for EventLoader {
    fn dependencies() -> Vec<ServiceKey> {
        vec![
            ServiceKey::of::<dyn EventBus>(),
            ServiceKey::of::<EventChainFactory>(),
            ServiceKey::of::<MetadataTable>(),
        ]
    }

    fn inject(deps: &Dependencies) -> Result<Self> {
        Ok(Self::new(
            deps.resolve::<dyn EventBus>()?,
            deps.resolve::<EventChainFactory>()?,
            deps.resolve::<MetadataTable>()?,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logging::MemoryLogger;
    use crate::messaging::LocalEventBus;
    use crate::metadata::EventHandlerMetadata;
    use crate::middleware::Invocation;
    use std::ops::ControlFlow;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct Chat {
        received: AtomicUsize,
    }

    fn loader(bus: &LocalEventBus) -> EventLoader {
        let metadata = MetadataTable::new();
        metadata.on_event(
            EventHandlerMetadata::new("chat.message", "on_message"),
            |chat: Arc<Chat>, _: Invocation| async move {
                chat.received.fetch_add(1, Ordering::SeqCst);
                Ok(ControlFlow::Continue(()))
            },
        );
        metadata.on_event(
            EventHandlerMetadata::new("chat.typing", "on_typing").without_context(),
            |_: Arc<Chat>, _: Invocation| async { Ok(ControlFlow::Continue(())) },
        );
        EventLoader::new(
            Arc::new(bus.clone()),
            Arc::new(EventChainFactory::new(Arc::new(MemoryLogger::new()))),
            Arc::new(metadata),
        )
    }

    #[tokio::test]
    async fn load_subscribes_each_declared_handler() {
        let bus = LocalEventBus::new();
        let loader = loader(&bus);
        let chat = Arc::new(Chat::default());

        assert_eq!(loader.load(&ProviderRef::new(Arc::clone(&chat))), 2);
        assert_eq!(loader.handle_count(), 2);
        assert_eq!(bus.listener_count(), 2);

        bus.dispatch("chat.message", Vec::new()).await;
        assert_eq!(chat.received.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn unload_removes_subscriptions_and_is_idempotent() {
        let bus = LocalEventBus::new();
        let loader = loader(&bus);
        let chat = Arc::new(Chat::default());
        loader.load(&ProviderRef::new(Arc::clone(&chat)));

        assert_eq!(loader.unload(), 2);
        assert_eq!(loader.unload(), 0);
        assert_eq!(bus.listener_count(), 0);

        bus.dispatch("chat.message", Vec::new()).await;
        assert_eq!(chat.received.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn providers_without_handlers_are_ignored() {
        struct Silent;
        let bus = LocalEventBus::new();
        let loader = loader(&bus);

        assert_eq!(loader.load(&ProviderRef::new(Arc::new(Silent))), 0);
        assert_eq!(loader.unload(), 0);
    }
}
