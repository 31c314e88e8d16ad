//! Handler metadata side-table
//!
//! Providers do not carry annotations; instead, the methods that should be
//! wired as event or tick handlers are registered against the provider's type
//! in a [`MetadataTable`]. Loaders query the table with a [`ProviderRef`] and
//! bind each entry to that instance.
//!
//! ```rust
//! use lifeloom::metadata::{EventHandlerMetadata, MetadataTable, ProviderRef};
//! use std::ops::ControlFlow;
//! use std::sync::Arc;
//!
//! struct Presence;
//!
//! let table = MetadataTable::new();
//! table.on_event(
//!     EventHandlerMetadata::new("player.joined", "on_join").without_context(),
//!     |_presence: Arc<Presence>, _invocation| async { Ok(ControlFlow::Continue(())) },
//! );
//!
//! let provider = ProviderRef::new(Arc::new(Presence));
//! assert_eq!(table.event_handlers(&provider).len(), 1);
//! ```

use crate::middleware::{Handler, HandlerFuture, HandlerResult, Invocation};
use dashmap::DashMap;
use std::any::{Any, TypeId};
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

/// Handler family.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, strum_macros::Display)]
#[strum(serialize_all = "lowercase")]
pub enum HandlerKind {
    Event,
    Tick,
}

/// Type-erased reference to a provider instance.
///
/// Loaders never own providers; they only keep the handles derived from them.
#[derive(Clone)]
pub struct ProviderRef {
    instance: Arc<dyn Any + Send + Sync>,
    type_id: TypeId,
    type_name: &'static str,
}

impl ProviderRef {
    pub fn new<P: Send + Sync + 'static>(provider: Arc<P>) -> Self {
        Self {
            instance: provider,
            type_id: TypeId::of::<P>(),
            type_name: std::any::type_name::<P>(),
        }
    }

    pub fn type_id(&self) -> TypeId {
        self.type_id
    }

    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    pub fn downcast<P: Send + Sync + 'static>(&self) -> Option<Arc<P>> {
        Arc::clone(&self.instance).downcast::<P>().ok()
    }
}

impl fmt::Debug for ProviderRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderRef")
            .field("type_name", &self.type_name)
            .finish_non_exhaustive()
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EventHandlerMetadata {
    /// Event name the handler subscribes to.
    pub name: String,
    pub method_name: String,
    /// Inject the invocation context. Defaults to `true`.
    pub context: bool,
}

impl EventHandlerMetadata {
    pub fn new(name: impl Into<String>, method_name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            method_name: method_name.into(),
            context: true,
        }
    }

    pub fn without_context(mut self) -> Self {
        self.context = false;
        self
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TickHandlerMetadata {
    pub name: String,
    pub method_name: String,
    /// Delay between the end of one run and the start of the next.
    /// Zero re-runs on the next scheduler turn.
    pub interval: Duration,
    pub context: bool,
}

impl TickHandlerMetadata {
    pub fn new(
        name: impl Into<String>,
        method_name: impl Into<String>,
        interval: Duration,
    ) -> Self {
        Self {
            name: name.into(),
            method_name: method_name.into(),
            interval,
            context: true,
        }
    }

    pub fn without_context(mut self) -> Self {
        self.context = false;
        self
    }
}

type Method = Arc<dyn Fn(Arc<dyn Any + Send + Sync>, Invocation) -> HandlerFuture + Send + Sync>;

/// A registered method plus its declared options.
#[derive(Clone)]
pub struct MethodEntry<M> {
    pub metadata: M,
    method: Method,
}

impl<M> MethodEntry<M> {
    /// Bind the method to a provider instance, producing a raw handler.
    pub fn bind(&self, provider: &ProviderRef) -> Handler {
        let method = Arc::clone(&self.method);
        let instance = Arc::clone(&provider.instance);
        Arc::new(move |invocation| method(Arc::clone(&instance), invocation))
    }
}

impl<M: fmt::Debug> fmt::Debug for MethodEntry<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MethodEntry")
            .field("metadata", &self.metadata)
            .finish_non_exhaustive()
    }
}

fn erase<P, F, Fut>(method: F) -> Method
where
    P: Send + Sync + 'static,
    F: Fn(Arc<P>, Invocation) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = HandlerResult> + Send + 'static,
{
    Arc::new(
        move |instance: Arc<dyn Any + Send + Sync>, invocation| -> HandlerFuture {
            match instance.downcast::<P>() {
                Ok(provider) => Box::pin(method(provider, invocation)),
                Err(_) => Box::pin(async {
                    Err(anyhow::anyhow!(
                        "provider is not a {}",
                        std::any::type_name::<P>()
                    ))
                }),
            }
        },
    )
}

/// Per-type registry of event and tick handler methods.
///
/// Read-only from the loaders' point of view; querying a type with no
/// registrations yields an empty list.
#[derive(Default)]
pub struct MetadataTable {
    events: DashMap<TypeId, Vec<MethodEntry<EventHandlerMetadata>>>,
    ticks: DashMap<TypeId, Vec<MethodEntry<TickHandlerMetadata>>>,
}

impl MetadataTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare an event handler method on provider type `P`.
    pub fn on_event<P, F, Fut>(&self, metadata: EventHandlerMetadata, method: F)
    where
        P: Send + Sync + 'static,
        F: Fn(Arc<P>, Invocation) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        let entry = MethodEntry {
            metadata,
            method: erase(method),
        };
        self.events.entry(TypeId::of::<P>()).or_default().push(entry);
    }

    /// Declare a tick handler method on provider type `P`.
    pub fn on_tick<P, F, Fut>(&self, metadata: TickHandlerMetadata, method: F)
    where
        P: Send + Sync + 'static,
        F: Fn(Arc<P>, Invocation) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        let entry = MethodEntry {
            metadata,
            method: erase(method),
        };
        self.ticks.entry(TypeId::of::<P>()).or_default().push(entry);
    }

    pub fn event_handlers(&self, provider: &ProviderRef) -> Vec<MethodEntry<EventHandlerMetadata>> {
        self.events
            .get(&provider.type_id)
            .map(|entries| entries.clone())
            .unwrap_or_default()
    }

    pub fn tick_handlers(&self, provider: &ProviderRef) -> Vec<MethodEntry<TickHandlerMetadata>> {
        self.ticks
            .get(&provider.type_id)
            .map(|entries| entries.clone())
            .unwrap_or_default()
    }

    /// Declared method names of one kind, in registration order.
    pub fn method_names(&self, kind: HandlerKind, provider: &ProviderRef) -> Vec<String> {
        match kind {
            HandlerKind::Event => self
                .event_handlers(provider)
                .into_iter()
                .map(|entry| entry.metadata.method_name)
                .collect(),
            HandlerKind::Tick => self
                .tick_handlers(provider)
                .into_iter()
                .map(|entry| entry.metadata.method_name)
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::ops::ControlFlow;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct Scoreboard {
        points: AtomicUsize,
    }

    struct Unannotated;

    #[tokio::test]
    async fn bound_methods_reach_the_instance() {
        let table = MetadataTable::new();
        table.on_event(
            EventHandlerMetadata::new("score", "add_points"),
            |board: Arc<Scoreboard>, invocation: Invocation| async move {
                let points = invocation.args.first().and_then(|v| v.as_u64()).unwrap_or(0);
                board.points.fetch_add(points as usize, Ordering::SeqCst);
                Ok(ControlFlow::Continue(()))
            },
        );

        let board = Arc::new(Scoreboard::default());
        let provider = ProviderRef::new(Arc::clone(&board));
        let entries = table.event_handlers(&provider);
        assert_eq!(entries.len(), 1);

        let handler = entries[0].bind(&provider);
        handler(Invocation::new(vec![json!(5)])).await.unwrap();
        handler(Invocation::new(vec![json!(2)])).await.unwrap();
        assert_eq!(board.points.load(Ordering::SeqCst), 7);
    }

    #[test]
    fn entries_keep_registration_order_per_kind() {
        let table = MetadataTable::new();
        let noop = |_: Arc<Scoreboard>, _: Invocation| async { Ok(ControlFlow::Continue(())) };
        table.on_tick(TickHandlerMetadata::new("a", "first", Duration::ZERO), noop);
        table.on_tick(TickHandlerMetadata::new("b", "second", Duration::from_secs(1)), noop);
        table.on_event(EventHandlerMetadata::new("c", "third"), noop);

        let provider = ProviderRef::new(Arc::new(Scoreboard::default()));
        assert_eq!(
            table.method_names(HandlerKind::Tick, &provider),
            ["first", "second"]
        );
        assert_eq!(table.method_names(HandlerKind::Event, &provider), ["third"]);
    }

    #[test]
    fn unknown_providers_have_no_handlers() {
        let table = MetadataTable::new();
        let provider = ProviderRef::new(Arc::new(Unannotated));
        assert!(table.event_handlers(&provider).is_empty());
        assert!(table.tick_handlers(&provider).is_empty());
        assert!(provider.type_name().ends_with("Unannotated"));
        assert!(provider.downcast::<Unannotated>().is_some());
        assert!(provider.downcast::<Scoreboard>().is_none());
    }
}
