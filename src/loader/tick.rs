use crate::di::{Dependencies, Injectable, ServiceKey};
use crate::error::Result;
use crate::metadata::{MetadataTable, ProviderRef};
use crate::middleware::TickChainFactory;
use crate::scheduler::{TickHandle, TickScheduler};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Registers a provider's tick handlers with the [`TickScheduler`].
pub struct TickLoader {
    scheduler: Arc<TickScheduler>,
    factory: Arc<TickChainFactory>,
    metadata: Arc<MetadataTable>,
    handles: Mutex<Vec<TickHandle>>,
}

impl TickLoader {
    pub fn new(
        scheduler: Arc<TickScheduler>,
        factory: Arc<TickChainFactory>,
        metadata: Arc<MetadataTable>,
    ) -> Self {
        Self {
            scheduler,
            factory,
            metadata,
            handles: Mutex::new(Vec::new()),
        }
    }

    /// Must be called from within a Tokio runtime.
    pub fn load(&self, provider: &ProviderRef) -> usize {
        let entries = self.metadata.tick_handlers(provider);
        let mut handles = self.handles();
        for entry in &entries {
            let handler = self.factory.wrap(&entry.metadata, entry.bind(provider));
            handles.push(
                self.scheduler
                    .schedule(entry.metadata.name.clone(), entry.metadata.interval, handler),
            );
        }
        entries.len()
    }

    /// Cancel every task started by this loader. Returns how many were still armed.
    pub fn unload(&self) -> usize {
        let drained: Vec<_> = self.handles().drain(..).collect();
        drained
            .iter()
            .filter(|handle| self.scheduler.cancel(handle))
            .count()
    }

    pub fn handle_count(&self) -> usize {
        self.handles().len()
    }

    fn handles(&self) -> MutexGuard<'_, Vec<TickHandle>> {
        self.handles.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Injectable for TickLoader {
    fn dependencies() -> Vec<ServiceKey> {
        vec![
            ServiceKey::of::<TickScheduler>(),
            ServiceKey::of::<TickChainFactory>(),
            ServiceKey::of::<MetadataTable>(),
        ]
    }

    fn inject(deps: &Dependencies) -> Result<Self> {
        Ok(Self::new(
            deps.resolve::<TickScheduler>()?,
            deps.resolve::<TickChainFactory>()?,
            deps.resolve::<MetadataTable>()?,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logging::{Logger, MemoryLogger};
    use crate::metadata::TickHandlerMetadata;
    use crate::middleware::Invocation;
    use std::ops::ControlFlow;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[derive(Default)]
    struct Janitor {
        sweeps: AtomicUsize,
    }

    fn loader() -> (TickLoader, Arc<TickScheduler>) {
        let logger: Arc<dyn Logger> = Arc::new(MemoryLogger::new());
        let scheduler = Arc::new(TickScheduler::new(Arc::clone(&logger)));
        let metadata = MetadataTable::new();
        metadata.on_tick(
            TickHandlerMetadata::new("sweep", "sweep", Duration::from_millis(2)),
            |janitor: Arc<Janitor>, invocation: Invocation| async move {
                assert!(invocation.context.is_some());
                janitor.sweeps.fetch_add(1, Ordering::SeqCst);
                Ok(ControlFlow::Continue(()))
            },
        );
        let loader = TickLoader::new(
            Arc::clone(&scheduler),
            Arc::new(TickChainFactory::new(logger)),
            Arc::new(metadata),
        );
        (loader, scheduler)
    }

    #[tokio::test]
    async fn unload_cancels_every_task() {
        let (loader, scheduler) = loader();
        let janitor = Arc::new(Janitor::default());

        assert_eq!(loader.load(&ProviderRef::new(Arc::clone(&janitor))), 1);
        assert_eq!(scheduler.active_count(), 1);
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(janitor.sweeps.load(Ordering::SeqCst) > 0);

        assert_eq!(loader.unload(), 1);
        assert_eq!(loader.unload(), 0);
        assert_eq!(loader.handle_count(), 0);
        assert_eq!(scheduler.active_count(), 0);

        tokio::time::sleep(Duration::from_millis(5)).await;
        let sweeps = janitor.sweeps.load(Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(janitor.sweeps.load(Ordering::SeqCst), sweeps);
    }
}
