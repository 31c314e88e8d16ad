use crate::di::{Dependencies, Injectable, ServiceKey};
use crate::error::Result;
use crate::logging::Logger;
use crate::middleware::{Handler, Invocation};
use dashmap::DashMap;
use std::error::Error as StdError;
use std::ops::ControlFlow;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Cancellation handle for one repeating tick task.
#[derive(Clone, Debug)]
pub struct TickHandle {
    id: Uuid,
    label: String,
    token: CancellationToken,
}

impl TickHandle {
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    /// `true` once the task was cancelled or halted itself.
    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }
}

/// Runs independently scheduled repeating tasks on the Tokio runtime.
///
/// Each task invokes its handler, then waits `interval` (or just yields when
/// the interval is zero) before the next run. The delay is measured from the
/// end of one run, so runs of the same task never overlap. A handler that
/// returns `ControlFlow::Break(())` ends its task; errors and panics are
/// logged and the task keeps going.
#[derive(Clone)]
pub struct TickScheduler {
    tasks: Arc<DashMap<Uuid, CancellationToken>>,
    logger: Arc<dyn Logger>,
}

impl TickScheduler {
    pub fn new(logger: Arc<dyn Logger>) -> Self {
        Self {
            tasks: Arc::new(DashMap::new()),
            logger,
        }
    }

    /// Start a repeating task. Must be called from within a Tokio runtime.
    pub fn schedule(
        &self,
        label: impl Into<String>,
        interval: Duration,
        handler: Handler,
    ) -> TickHandle {
        let handle = TickHandle {
            id: Uuid::new_v4(),
            label: label.into(),
            token: CancellationToken::new(),
        };
        self.tasks.insert(handle.id, handle.token.clone());

        let task = TickTask {
            id: handle.id,
            label: handle.label.clone(),
            interval,
            handler,
            token: handle.token.clone(),
            tasks: Arc::clone(&self.tasks),
            logger: Arc::clone(&self.logger),
        };
        tokio::spawn(task.run());

        handle
    }

    /// Stop re-arming a task. An invocation already in flight may finish.
    /// Returns `false` if the task had already ended.
    pub fn cancel(&self, handle: &TickHandle) -> bool {
        handle.token.cancel();
        self.tasks.remove(&handle.id).is_some()
    }

    pub fn cancel_all(&self) {
        self.tasks.retain(|_, token| {
            token.cancel();
            false
        });
    }

    /// Number of tasks that are still armed.
    pub fn active_count(&self) -> usize {
        self.tasks.len()
    }
}

impl Injectable for TickScheduler {
    fn dependencies() -> Vec<ServiceKey> {
        vec![ServiceKey::of::<dyn Logger>()]
    }

    fn inject(deps: &Dependencies) -> Result<Self> {
        Ok(Self::new(deps.resolve::<dyn Logger>()?))
    }
}

struct TickTask {
    id: Uuid,
    label: String,
    interval: Duration,
    handler: Handler,
    token: CancellationToken,
    tasks: Arc<DashMap<Uuid, CancellationToken>>,
    logger: Arc<dyn Logger>,
}

impl TickTask {
    async fn run(self) {
        loop {
            if self.token.is_cancelled() {
                break;
            }

            // Each run gets its own task so a panicking handler cannot take
            // the loop down with it.
            let run = tokio::spawn((self.handler)(Invocation::default()));
            match run.await {
                Ok(Ok(ControlFlow::Break(()))) => {
                    self.logger.debug(&format!("tick {} halted", self.label));
                    break;
                }
                Ok(Ok(ControlFlow::Continue(()))) => {}
                Ok(Err(e)) => {
                    let error: &(dyn StdError + 'static) = e.as_ref();
                    self.logger
                        .error(&format!("tick {} failed", self.label), Some(error));
                }
                Err(e) => {
                    self.logger
                        .error(&format!("tick {} panicked", self.label), Some(&e));
                }
            }

            tokio::select! {
                biased;
                _ = self.token.cancelled() => break,
                _ = pause(self.interval) => {}
            }
        }

        self.token.cancel();
        self.tasks.remove(&self.id);
    }
}

async fn pause(interval: Duration) {
    if interval.is_zero() {
        tokio::task::yield_now().await;
    } else {
        tokio::time::sleep(interval).await;
    }
}
