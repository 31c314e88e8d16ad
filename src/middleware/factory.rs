use crate::di::{Dependencies, Injectable, ServiceKey};
use crate::error::Result;
use crate::logging::Logger;
use crate::metadata::{EventHandlerMetadata, HandlerKind, TickHandlerMetadata};
use crate::middleware::{
    ContextMiddleware, Handler, HandlerDescriptor, LoggingMiddleware, MiddlewareChain,
};
use std::sync::Arc;

fn build_chain(
    descriptor: HandlerDescriptor,
    logger: &Arc<dyn Logger>,
    handler: Handler,
) -> Handler {
    let descriptor = Arc::new(descriptor);
    MiddlewareChain::new()
        .with(LoggingMiddleware::new(Arc::clone(&descriptor), Arc::clone(logger)))
        .with(ContextMiddleware::new(descriptor, Arc::clone(logger)))
        .build(handler)
}

/// Wraps event handlers in the logging → context chain.
pub struct EventChainFactory {
    logger: Arc<dyn Logger>,
}

impl EventChainFactory {
    pub fn new(logger: Arc<dyn Logger>) -> Self {
        Self { logger }
    }

    pub fn wrap(&self, metadata: &EventHandlerMetadata, handler: Handler) -> Handler {
        let descriptor = HandlerDescriptor {
            label: metadata.name.clone(),
            kind: HandlerKind::Event,
            context: metadata.context,
        };
        build_chain(descriptor, &self.logger, handler)
    }
}

impl Injectable for EventChainFactory {
    fn dependencies() -> Vec<ServiceKey> {
        vec![ServiceKey::of::<dyn Logger>()]
    }

    fn inject(deps: &Dependencies) -> Result<Self> {
        Ok(Self::new(deps.resolve::<dyn Logger>()?))
    }
}

/// Wraps tick handlers in the logging → context chain.
pub struct TickChainFactory {
    logger: Arc<dyn Logger>,
}

impl TickChainFactory {
    pub fn new(logger: Arc<dyn Logger>) -> Self {
        Self { logger }
    }

    pub fn wrap(&self, metadata: &TickHandlerMetadata, handler: Handler) -> Handler {
        let descriptor = HandlerDescriptor {
            label: metadata.name.clone(),
            kind: HandlerKind::Tick,
            context: metadata.context,
        };
        build_chain(descriptor, &self.logger, handler)
    }
}

impl Injectable for TickChainFactory {
    fn dependencies() -> Vec<ServiceKey> {
        vec![ServiceKey::of::<dyn Logger>()]
    }

    fn inject(deps: &Dependencies) -> Result<Self> {
        Ok(Self::new(deps.resolve::<dyn Logger>()?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logging::MemoryLogger;
    use crate::middleware::{Invocation, handler_fn};
    use std::ops::ControlFlow;
    use std::time::Duration;
    use tracing::Level;

    #[tokio::test]
    async fn event_chain_logs_then_brackets_context() {
        let logger = Arc::new(MemoryLogger::new());
        let factory = EventChainFactory::new(logger.clone());
        let metadata = EventHandlerMetadata::new("ping", "on_ping");
        let handler = factory.wrap(
            &metadata,
            handler_fn(|invocation: Invocation| async move {
                let context = invocation.context.expect("context injected by default");
                assert_eq!(context.kind(), HandlerKind::Event);
                Ok(ControlFlow::Continue(()))
            }),
        );

        handler(Invocation::default()).await.unwrap();

        let messages: Vec<_> = logger.entries().into_iter().map(|e| e.message).collect();
        assert_eq!(messages.len(), 3);
        assert_eq!(messages[0], "--> event ping");
        assert!(messages[1].starts_with("context finished: event ping"));
        assert!(messages[2].starts_with("<-- event ping"));
    }

    #[tokio::test]
    async fn tick_chain_honours_context_opt_out() {
        let logger = Arc::new(MemoryLogger::new());
        let factory = TickChainFactory::new(logger.clone());
        let metadata =
            TickHandlerMetadata::new("sweep", "sweep_sessions", Duration::from_millis(10))
                .without_context();
        let handler = factory.wrap(
            &metadata,
            handler_fn(|invocation: Invocation| async move {
                assert!(invocation.context.is_none());
                anyhow::bail!("sweep failed")
            }),
        );

        assert_eq!(
            handler(Invocation::default()).await.unwrap(),
            ControlFlow::Continue(())
        );
        assert_eq!(logger.count(Level::ERROR), 1);
        assert!(logger.contains(Level::DEBUG, "context finished: tick sweep"));
    }
}
