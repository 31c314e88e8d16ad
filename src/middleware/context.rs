use crate::logging::Logger;
use crate::metadata::HandlerKind;
use crate::middleware::{HandlerDescriptor, HandlerResult, Invocation, Middleware, Next};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};
use uuid::Uuid;

#[derive(Debug, Default)]
struct Timing {
    started: Option<Instant>,
    elapsed: Option<Duration>,
}

/// Per-invocation context: identity plus start/stop timing.
///
/// Cloning shares the same timing state.
#[derive(Clone)]
pub struct Context {
    inner: Arc<ContextInner>,
}

struct ContextInner {
    id: Uuid,
    label: String,
    kind: HandlerKind,
    created_at: DateTime<Utc>,
    timing: Mutex<Timing>,
}

impl Context {
    pub fn new(label: impl Into<String>, kind: HandlerKind) -> Self {
        Self {
            inner: Arc::new(ContextInner {
                id: Uuid::new_v4(),
                label: label.into(),
                kind,
                created_at: Utc::now(),
                timing: Mutex::new(Timing::default()),
            }),
        }
    }

    pub fn id(&self) -> Uuid {
        self.inner.id
    }

    pub fn label(&self) -> &str {
        &self.inner.label
    }

    pub fn kind(&self) -> HandlerKind {
        self.inner.kind
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.inner.created_at
    }

    /// Start timing. Restarting a running context is a no-op.
    pub fn start(&self) {
        let mut timing = self.timing();
        if timing.started.is_none() {
            timing.started = Some(Instant::now());
        }
    }

    /// Stop timing and return the elapsed time. Only the first stop counts.
    pub fn stop(&self) -> Option<Duration> {
        let mut timing = self.timing();
        if timing.elapsed.is_none() {
            timing.elapsed = timing.started.map(|started| started.elapsed());
        }
        timing.elapsed
    }

    pub fn is_running(&self) -> bool {
        let timing = self.timing();
        timing.started.is_some() && timing.elapsed.is_none()
    }

    pub fn is_finished(&self) -> bool {
        self.timing().elapsed.is_some()
    }

    /// Time since start; frozen once stopped.
    pub fn elapsed(&self) -> Option<Duration> {
        let timing = self.timing();
        timing
            .elapsed
            .or_else(|| timing.started.map(|started| started.elapsed()))
    }

    fn timing(&self) -> std::sync::MutexGuard<'_, Timing> {
        self.inner
            .timing
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("id", &self.inner.id)
            .field("label", &self.inner.label)
            .field("kind", &self.inner.kind)
            .field("created_at", &self.inner.created_at)
            .field("elapsed", &self.elapsed())
            .finish()
    }
}

/// Stops the context when dropped, whether the forwarded call returned,
/// failed, panicked or was cancelled.
struct ContextScope {
    context: Context,
    logger: Arc<dyn Logger>,
}

impl Drop for ContextScope {
    fn drop(&mut self) {
        let elapsed = self.context.stop().unwrap_or_default();
        self.logger.debug(&format!(
            "context finished: {} {} in {elapsed:?}",
            self.context.kind(),
            self.context.label()
        ));
    }
}

/// Brackets every invocation with a fresh [`Context`].
///
/// The context is injected into the forwarded [`Invocation`] only when the
/// handler asked for it; timing happens either way.
pub struct ContextMiddleware {
    descriptor: Arc<HandlerDescriptor>,
    logger: Arc<dyn Logger>,
}

impl ContextMiddleware {
    pub fn new(descriptor: Arc<HandlerDescriptor>, logger: Arc<dyn Logger>) -> Self {
        Self { descriptor, logger }
    }
}

#[async_trait]
impl Middleware for ContextMiddleware {
    async fn handle(&self, mut invocation: Invocation, next: Next) -> HandlerResult {
        let context = Context::new(self.descriptor.label.clone(), self.descriptor.kind);
        context.start();
        let _scope = ContextScope {
            context: context.clone(),
            logger: Arc::clone(&self.logger),
        };

        invocation.context = self.descriptor.context.then_some(context);
        next.run(invocation).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logging::MemoryLogger;
    use crate::middleware::{MiddlewareChain, handler_fn};
    use std::ops::ControlFlow;
    use tracing::Level;

    fn descriptor(context: bool) -> Arc<HandlerDescriptor> {
        Arc::new(HandlerDescriptor {
            label: "heartbeat".to_string(),
            kind: HandlerKind::Tick,
            context,
        })
    }

    #[test]
    fn context_times_a_single_run() {
        let context = Context::new("ping", HandlerKind::Event);
        assert!(!context.is_running());
        assert_eq!(context.stop(), None);

        let context = Context::new("ping", HandlerKind::Event);
        context.start();
        assert!(context.is_running());
        let first = context.stop().unwrap();
        assert!(context.is_finished());
        assert_eq!(context.stop(), Some(first));
        assert_eq!(context.label(), "ping");
        assert_eq!(context.kind(), HandlerKind::Event);
    }

    #[tokio::test]
    async fn context_is_injected_and_stopped_after_the_call() {
        let logger = Arc::new(MemoryLogger::new());
        let seen = Arc::new(Mutex::new(None::<Context>));
        let slot = Arc::clone(&seen);
        let handler = MiddlewareChain::new()
            .with(ContextMiddleware::new(descriptor(true), logger.clone()))
            .build(handler_fn(move |invocation: Invocation| {
                let slot = Arc::clone(&slot);
                async move {
                    let context = invocation.context.expect("context requested");
                    assert!(context.is_running());
                    *slot.lock().unwrap() = Some(context);
                    Ok(ControlFlow::Continue(()))
                }
            }));

        handler(Invocation::default()).await.unwrap();

        let context = seen.lock().unwrap().clone().unwrap();
        assert!(context.is_finished());
        assert_eq!(context.label(), "heartbeat");
        assert!(logger.contains(Level::DEBUG, "context finished: tick heartbeat"));
    }

    #[tokio::test]
    async fn context_is_omitted_but_still_bracketed() {
        let logger = Arc::new(MemoryLogger::new());
        let handler = MiddlewareChain::new()
            .with(ContextMiddleware::new(descriptor(false), logger.clone()))
            .build(handler_fn(|invocation: Invocation| async move {
                assert!(invocation.context.is_none());
                Ok(ControlFlow::Continue(()))
            }));

        handler(Invocation::default()).await.unwrap();
        assert!(logger.contains(Level::DEBUG, "context finished"));
    }

    #[tokio::test]
    async fn context_is_stopped_when_the_handler_fails() {
        let logger = Arc::new(MemoryLogger::new());
        let seen = Arc::new(Mutex::new(None::<Context>));
        let slot = Arc::clone(&seen);
        let handler = MiddlewareChain::new()
            .with(ContextMiddleware::new(descriptor(true), logger.clone()))
            .build(handler_fn(move |invocation: Invocation| {
                let slot = Arc::clone(&slot);
                async move {
                    *slot.lock().unwrap() = invocation.context;
                    anyhow::bail!("database unavailable")
                }
            }));

        assert!(handler(Invocation::default()).await.is_err());
        assert!(seen.lock().unwrap().as_ref().unwrap().is_finished());
        assert_eq!(logger.count(Level::DEBUG), 1);
    }
}
