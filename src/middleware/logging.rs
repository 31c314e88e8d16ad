use crate::logging::Logger;
use crate::middleware::{
    HandlerDescriptor, HandlerInvocationError, HandlerResult, Invocation, Middleware, Next,
};
use async_trait::async_trait;
use std::ops::ControlFlow;
use std::sync::Arc;
use std::time::Instant;

/// Logs invocation timing and contains handler failures.
///
/// An `Err` from further down the chain is logged as a
/// [`HandlerInvocationError`] and turned into `Continue`, so dispatchers never
/// see it.
pub struct LoggingMiddleware {
    descriptor: Arc<HandlerDescriptor>,
    logger: Arc<dyn Logger>,
}

impl LoggingMiddleware {
    pub fn new(descriptor: Arc<HandlerDescriptor>, logger: Arc<dyn Logger>) -> Self {
        Self { descriptor, logger }
    }
}

#[async_trait]
impl Middleware for LoggingMiddleware {
    async fn handle(&self, invocation: Invocation, next: Next) -> HandlerResult {
        let HandlerDescriptor { label, kind, .. } = self.descriptor.as_ref();
        let start = Instant::now();

        self.logger.debug(&format!("--> {kind} {label}"));

        match next.run(invocation).await {
            Ok(flow) => {
                let suffix = if flow.is_break() { " (halt)" } else { "" };
                self.logger
                    .debug(&format!("<-- {kind} {label} {:?}{suffix}", start.elapsed()));
                Ok(flow)
            }
            Err(source) => {
                let error = HandlerInvocationError {
                    label: label.clone(),
                    kind: *kind,
                    source,
                };
                self.logger.error(
                    &format!("<-- {kind} {label} ERROR {:?}", start.elapsed()),
                    Some(&error),
                );
                Ok(ControlFlow::Continue(()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logging::MemoryLogger;
    use crate::metadata::HandlerKind;
    use crate::middleware::{MiddlewareChain, handler_fn};
    use tracing::Level;

    fn descriptor() -> Arc<HandlerDescriptor> {
        Arc::new(HandlerDescriptor {
            label: "order.created".to_string(),
            kind: HandlerKind::Event,
            context: false,
        })
    }

    #[tokio::test]
    async fn failures_are_logged_and_contained() {
        let logger = Arc::new(MemoryLogger::new());
        let handler = MiddlewareChain::new()
            .with(LoggingMiddleware::new(descriptor(), logger.clone()))
            .build(handler_fn(|_| async { Err(anyhow::anyhow!("payment gateway timeout")) }));

        let flow = handler(Invocation::default()).await.unwrap();
        assert_eq!(flow, ControlFlow::Continue(()));

        let errors: Vec<_> = logger
            .entries()
            .into_iter()
            .filter(|entry| entry.level == Level::ERROR)
            .collect();
        assert_eq!(errors.len(), 1);
        assert!(errors[0].message.contains("event order.created ERROR"));
        assert_eq!(
            errors[0].error.as_deref(),
            Some("event handler 'order.created' failed")
        );
    }

    #[tokio::test]
    async fn halt_is_passed_through() {
        let logger = Arc::new(MemoryLogger::new());
        let handler = MiddlewareChain::new()
            .with(LoggingMiddleware::new(descriptor(), logger.clone()))
            .build(handler_fn(|_| async { Ok(ControlFlow::Break(())) }));

        assert_eq!(
            handler(Invocation::default()).await.unwrap(),
            ControlFlow::Break(())
        );
        assert_eq!(logger.count(Level::ERROR), 0);
        assert!(logger.contains(Level::DEBUG, "(halt)"));
    }
}
