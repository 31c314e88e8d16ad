//! Handler middleware
//!
//! A handler is wrapped by an ordered list of [`Middleware`] values. The chain
//! is composed once, by closure nesting, when [`MiddlewareChain::build`] runs;
//! the order cannot change at call time.
//!
//! ```text
//! LoggingMiddleware → ContextMiddleware → handler
//! ```

mod context;
mod factory;
mod logging;

pub use context::{Context, ContextMiddleware};
pub use factory::{EventChainFactory, TickChainFactory};
pub use logging::LoggingMiddleware;

use crate::metadata::HandlerKind;
use async_trait::async_trait;
use serde_json::Value;
use std::future::Future;
use std::ops::ControlFlow;
use std::pin::Pin;
use std::sync::Arc;
use thiserror::Error;

/// Return type of every handler and middleware.
///
/// `ControlFlow::Break(())` asks the tick scheduler to stop re-arming the
/// task; event dispatch ignores it.
pub type HandlerResult = anyhow::Result<ControlFlow<()>>;

pub type HandlerFuture = Pin<Box<dyn Future<Output = HandlerResult> + Send>>;

/// A callable handler, shared between the dispatcher and the chain.
pub type Handler = Arc<dyn Fn(Invocation) -> HandlerFuture + Send + Sync>;

/// Wrap an async closure as a [`Handler`].
pub fn handler_fn<F, Fut>(f: F) -> Handler
where
    F: Fn(Invocation) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = HandlerResult> + Send + 'static,
{
    Arc::new(move |invocation| -> HandlerFuture { Box::pin(f(invocation)) })
}

/// Arguments forwarded down the chain.
///
/// `context` is only populated for handlers that opted into context injection.
#[derive(Clone, Debug, Default)]
pub struct Invocation {
    pub context: Option<Context>,
    pub args: Vec<Value>,
}

impl Invocation {
    pub fn new(args: Vec<Value>) -> Self {
        Self {
            context: None,
            args,
        }
    }
}

/// Static description of the handler a chain wraps.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HandlerDescriptor {
    pub label: String,
    pub kind: HandlerKind,
    /// Whether the handler receives the invocation [`Context`].
    pub context: bool,
}

/// Represents the rest of the chain
pub struct Next {
    handler: Handler,
}

impl Next {
    pub fn new(handler: Handler) -> Self {
        Self { handler }
    }

    pub async fn run(self, invocation: Invocation) -> HandlerResult {
        (self.handler)(invocation).await
    }
}

/// Cross-cutting behaviour around a handler invocation.
#[async_trait]
pub trait Middleware: Send + Sync + 'static {
    async fn handle(&self, invocation: Invocation, next: Next) -> HandlerResult;
}

/// Raised when a handler fails; contained by [`LoggingMiddleware`].
#[derive(Debug, Error)]
#[error("{kind} handler '{label}' failed")]
pub struct HandlerInvocationError {
    pub label: String,
    pub kind: HandlerKind,
    #[source]
    pub source: anyhow::Error,
}

/// Builder for a fixed middleware chain. Middlewares added first run outermost.
#[derive(Default)]
pub struct MiddlewareChain {
    layers: Vec<Arc<dyn Middleware>>,
}

impl MiddlewareChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with<M: Middleware>(mut self, middleware: M) -> Self {
        self.layers.push(Arc::new(middleware));
        self
    }

    pub fn len(&self) -> usize {
        self.layers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }

    /// Compose the chain around `terminal`.
    pub fn build(self, terminal: Handler) -> Handler {
        self.layers.into_iter().rev().fold(terminal, |inner, layer| {
            let wrapped: Handler = Arc::new(move |invocation: Invocation| -> HandlerFuture {
                let layer = Arc::clone(&layer);
                let next = Next::new(Arc::clone(&inner));
                Box::pin(async move { layer.handle(invocation, next).await })
            });
            wrapped
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    struct Recorder {
        name: &'static str,
        trail: Arc<Mutex<Vec<String>>>,
    }

    #[async_trait]
    impl Middleware for Recorder {
        async fn handle(&self, invocation: Invocation, next: Next) -> HandlerResult {
            self.trail.lock().unwrap().push(format!("{}:before", self.name));
            let result = next.run(invocation).await;
            self.trail.lock().unwrap().push(format!("{}:after", self.name));
            result
        }
    }

    #[tokio::test]
    async fn first_middleware_runs_outermost() {
        let trail = Arc::new(Mutex::new(Vec::new()));
        let inner_trail = Arc::clone(&trail);
        let terminal = handler_fn(move |invocation: Invocation| {
            let trail = Arc::clone(&inner_trail);
            async move {
                trail
                    .lock()
                    .unwrap()
                    .push(format!("handler:{}", invocation.args.len()));
                Ok(ControlFlow::Continue(()))
            }
        });

        let handler = MiddlewareChain::new()
            .with(Recorder {
                name: "outer",
                trail: Arc::clone(&trail),
            })
            .with(Recorder {
                name: "inner",
                trail: Arc::clone(&trail),
            })
            .build(terminal);

        handler(Invocation::new(vec![Value::from(1), Value::from(2)]))
            .await
            .unwrap();
        handler(Invocation::default()).await.unwrap();

        let trail = trail.lock().unwrap();
        assert_eq!(
            trail[..5],
            [
                "outer:before",
                "inner:before",
                "handler:2",
                "inner:after",
                "outer:after"
            ]
        );
        assert_eq!(trail[7], "handler:0");
    }

    #[tokio::test]
    async fn empty_chain_is_the_terminal_handler() {
        let handler = MiddlewareChain::new()
            .build(handler_fn(|_| async { Ok(ControlFlow::Break(())) }));
        assert_eq!(handler(Invocation::default()).await.unwrap(), ControlFlow::Break(()));
    }
}
