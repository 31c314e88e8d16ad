//! Application Bootstrap
//!
//! Provides the top-level state machine that loads modules, attaches their
//! providers and performs graceful, timeout-bounded shutdown.

use super::{
    HostListener, HostSignal, HostSubscription, LifecycleError, LifecycleEvent, LifecycleEvents,
    Module, ProcessSignal, Result,
};
use crate::config::ApplicationConfig;
use crate::di::{Binder, RegistryScope, ServiceKey, ServiceRegistry};
use crate::loader::{ModuleLoader, ProviderLoader, register_loaders};
use crate::logging::{Logger, TracingLogger};
use crate::messaging::{EventBus, LocalEventBus};
use crate::metadata::MetadataTable;
use std::error::Error as StdError;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use tokio::sync::watch;
use tokio::task::JoinError;

/// Application state. Transitions are strictly sequential.
///
/// ```text
/// STOPPED ──start()──▶ STARTING ──▶ RUNNING ──stop()──▶ STOPPING ──▶ STOPPED
///                          │
///                          └── failure ──▶ STOPPED
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, strum_macros::Display)]
#[strum(serialize_all = "UPPERCASE")]
pub enum ApplicationState {
    Stopped,
    Starting,
    Running,
    Stopping,
}

type Completion = Arc<watch::Sender<Option<bool>>>;

/// Bookkeeping for one start/stop session.
struct Machine {
    state: ApplicationState,
    completion: Option<Completion>,
    outcome: watch::Receiver<Option<bool>>,
    module_loader: Option<Arc<ModuleLoader>>,
    host_subscription: Option<HostSubscription>,
    /// Host stop signal received while STARTING, honoured once RUNNING.
    stop_requested: bool,
}

struct Inner {
    config: ApplicationConfig,
    scope: RegistryScope,
    logger: Arc<dyn Logger>,
    host: Arc<dyn HostSignal>,
    events: LifecycleEvents,
    modules: Mutex<Vec<Arc<dyn Module>>>,
    machine: Mutex<Machine>,
}

/// Lifecycle-managed application.
///
/// Cloning yields another handle to the same application.
///
/// # Example
///
/// ```rust,no_run
/// use lifeloom::lifecycle::Application;
///
/// #[tokio::main]
/// async fn main() -> anyhow::Result<()> {
///     let app = Application::builder().build();
///
///     app.start().await?;
///     // Returns once a host signal (Ctrl+C / SIGTERM) has stopped the app.
///     app.wait_for_shutdown().await;
///     Ok(())
/// }
/// ```
#[derive(Clone)]
pub struct Application {
    inner: Arc<Inner>,
}

impl Application {
    /// Create a new application builder
    pub fn builder() -> ApplicationBuilder {
        ApplicationBuilder::new()
    }

    /// Current lifecycle state
    pub fn get_state(&self) -> ApplicationState {
        self.inner.machine().state
    }

    /// Configuration the application was built with
    pub fn config(&self) -> &ApplicationConfig {
        &self.inner.config
    }

    /// The process registry, created on first access.
    ///
    /// Instances resolved from it are invalid once the application has fully
    /// stopped.
    pub fn registry(&self) -> Arc<ServiceRegistry> {
        self.inner.scope.get()
    }

    /// Add a module. Only allowed while stopped.
    pub fn add_module<M: Module>(&self, module: M) -> Result<()> {
        let state = self.get_state();
        if state != ApplicationState::Stopped {
            return Err(LifecycleError::InvalidState {
                operation: "add a module",
                state,
            });
        }
        self.inner.modules().push(Arc::new(module));
        Ok(())
    }

    /// Run `listener` once, the next time the application finishes starting.
    pub fn on_start<F, Fut>(&self, listener: F)
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.inner.events.once(LifecycleEvent::Start, listener);
    }

    /// Run `listener` once, at the beginning of the next shutdown.
    pub fn on_stop<F, Fut>(&self, listener: F)
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.inner.events.once(LifecycleEvent::Stop, listener);
    }

    /// Load every module in insertion order and transition to RUNNING.
    ///
    /// Calling `start()` while starting or running logs a warning and does
    /// nothing.
    ///
    /// # Errors
    /// Returns the first module load or registry failure; the application is
    /// left STOPPED.
    pub async fn start(&self) -> Result<()> {
        {
            let mut machine = self.inner.machine();
            if machine.state != ApplicationState::Stopped {
                self.inner
                    .logger
                    .warn(&format!("start() ignored while {}", machine.state), None);
                return Ok(());
            }
            let (completion, outcome) = watch::channel(None);
            machine.state = ApplicationState::Starting;
            machine.completion = Some(Arc::new(completion));
            machine.outcome = outcome;
            machine.stop_requested = false;
        }

        self.inner.logger.info("Starting application...");
        if let Err(e) = Inner::boot(&self.inner).await {
            self.inner.logger.error("Application failed to start", Some(&e));
            self.inner.abort_start().await;
            return Err(e);
        }

        Inner::fire(&self.inner, LifecycleEvent::Start).await;
        let stop_requested = {
            let mut machine = self.inner.machine();
            machine.state = ApplicationState::Running;
            std::mem::take(&mut machine.stop_requested)
        };
        self.inner.logger.info("Application started");

        if stop_requested {
            self.inner
                .logger
                .info("Host stop signal received during start; shutting down");
            let app = self.clone();
            tokio::spawn(async move {
                app.stop().await;
            });
        }
        Ok(())
    }

    /// Stop the application, waiting at most the graceful shutdown timeout.
    ///
    /// Returns `true` when shutdown completed in time. Concurrent callers
    /// share one shutdown and observe the same result. Never fails: a
    /// timeout or an unload failure is reported as `false`.
    ///
    /// A direct call while STARTING is refused. A host stop signal in that
    /// window is instead kept and acted on as soon as the start completes.
    pub async fn stop(&self) -> bool {
        let mut outcome = {
            let mut machine = self.inner.machine();
            match machine.state {
                ApplicationState::Stopped => return true,
                ApplicationState::Starting => {
                    self.inner
                        .logger
                        .warn("stop() called while the application is starting", None);
                    return false;
                }
                ApplicationState::Stopping => machine.outcome.clone(),
                ApplicationState::Running => {
                    machine.state = ApplicationState::Stopping;
                    if let Some(completion) = machine.completion.clone() {
                        tokio::spawn(Inner::race_shutdown(Arc::clone(&self.inner), completion));
                    }
                    machine.outcome.clone()
                }
            }
        };
        await_outcome(&mut outcome).await
    }

    /// Resolve once the current session has shut down.
    ///
    /// Returns `true` immediately if the application is already stopped.
    pub async fn wait_for_shutdown(&self) -> bool {
        let mut outcome = {
            let machine = self.inner.machine();
            if machine.state == ApplicationState::Stopped {
                return true;
            }
            machine.outcome.clone()
        };
        await_outcome(&mut outcome).await
    }
}

async fn await_outcome(outcome: &mut watch::Receiver<Option<bool>>) -> bool {
    match outcome.wait_for(Option::is_some).await {
        Ok(value) => *value == Some(true),
        Err(_) => false,
    }
}

impl Inner {
    fn machine(&self) -> MutexGuard<'_, Machine> {
        self.machine.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn modules(&self) -> MutexGuard<'_, Vec<Arc<dyn Module>>> {
        self.modules.lock().unwrap_or_else(PoisonError::into_inner)
    }

    async fn boot(this: &Arc<Self>) -> Result<()> {
        let registry = this.scope.get();
        let provider_loader =
            registry.get::<dyn ProviderLoader>(&this.config.side.provider_loader_key())?;
        let module_loader = Arc::new(ModuleLoader::new(
            provider_loader,
            Arc::clone(&registry),
            Arc::clone(&this.logger),
        ));
        this.machine().module_loader = Some(Arc::clone(&module_loader));

        let modules = this.modules().clone();
        for module in &modules {
            module_loader.load(module.as_ref()).await?;
        }

        let subscription = this.host.subscribe(host_listener(Arc::downgrade(this)));
        this.machine().host_subscription = Some(subscription);
        Ok(())
    }

    /// Undo a partial start and return to STOPPED.
    async fn abort_start(&self) {
        let completion = self.machine().completion.clone();
        self.release().await;
        if let Some(completion) = completion {
            resolve(&completion, false);
        }
    }

    /// Unload the module loader, detach from the host, tear the registry
    /// down and return to STOPPED.
    ///
    /// Returns `false` when the module loader failed to unload.
    async fn release(&self) -> bool {
        let (module_loader, subscription) = {
            let mut machine = self.machine();
            (machine.module_loader.take(), machine.host_subscription.take())
        };
        let unloaded = match module_loader {
            Some(module_loader) => module_loader.unload().await,
            None => Ok(()),
        };
        if let Some(subscription) = subscription {
            self.host.unsubscribe(subscription);
        }
        self.scope.teardown();
        {
            let mut machine = self.machine();
            machine.completion = None;
            machine.stop_requested = false;
            machine.state = ApplicationState::Stopped;
        }
        match unloaded {
            Ok(()) => true,
            Err(e) => {
                self.logger.error("Failed to unload modules", Some(&e));
                false
            }
        }
    }

    /// Record a host stop request that arrives while STARTING.
    /// Returns `true` when the request was deferred.
    fn defer_stop(&self) -> bool {
        let mut machine = self.machine();
        if machine.state != ApplicationState::Starting {
            return false;
        }
        machine.stop_requested = true;
        true
    }

    /// Fire a lifecycle event on its own task so a panicking listener
    /// cannot abort the transition.
    async fn fire(this: &Arc<Self>, event: LifecycleEvent) {
        let inner = Arc::clone(this);
        let fired = tokio::spawn(async move { inner.events.fire(event).await }).await;
        if let Err(e) = fired {
            this.logger
                .error(&format!("A {event} listener panicked"), Some(&e));
        }
    }

    /// Race the shutdown sequence against the graceful shutdown timeout.
    async fn race_shutdown(this: Arc<Self>, completion: Completion) {
        let timeout = this.config.graceful_shutdown_timeout;
        let mut shutdown = tokio::spawn(Self::perform_shutdown(
            Arc::clone(&this),
            Arc::clone(&completion),
        ));

        let outcome = match tokio::time::timeout(timeout, &mut shutdown).await {
            Ok(joined) => Self::settle(&this, joined).await,
            Err(_) => {
                let error = LifecycleError::ShutdownTimeout { timeout };
                this.logger.warn("Graceful shutdown timed out", Some(&error));
                resolve(&completion, false);
                Self::settle(&this, shutdown.await).await;
                false
            }
        };
        resolve(&completion, outcome);
    }

    /// A shutdown task that died still has to leave the application STOPPED.
    async fn settle(this: &Arc<Self>, joined: std::result::Result<bool, JoinError>) -> bool {
        match joined {
            Ok(completed) => completed,
            Err(e) => {
                this.logger.error("Shutdown task panicked", Some(&e));
                this.release().await;
                false
            }
        }
    }

    async fn perform_shutdown(this: Arc<Self>, completion: Completion) -> bool {
        this.logger.info("Starting graceful shutdown...");
        Self::fire(&this, LifecycleEvent::Stop).await;

        let modules = this.modules().clone();
        for module in modules.iter().rev() {
            let cleanup = tokio::spawn({
                let module = Arc::clone(module);
                async move { module.cleanup().await }
            });
            match cleanup.await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    let error: &(dyn StdError + 'static) = e.as_ref();
                    let message = format!("Cleanup failed for module {}", module.name());
                    this.logger.error(&message, Some(error));
                }
                Err(e) => this
                    .logger
                    .error(&format!("Cleanup panicked for module {}", module.name()), Some(&e)),
            }
        }

        let completed = this.release().await;
        resolve(&completion, completed);
        this.logger.info("Graceful shutdown complete");
        completed
    }
}

/// First resolution wins.
fn resolve(completion: &watch::Sender<Option<bool>>, outcome: bool) {
    completion.send_if_modified(|current| {
        if current.is_some() {
            return false;
        }
        *current = Some(outcome);
        true
    });
}

fn host_listener(app: Weak<Inner>) -> HostListener {
    Arc::new(move || {
        let Some(inner) = app.upgrade() else {
            return;
        };
        if inner.defer_stop() {
            inner
                .logger
                .info("Host is stopping; shutdown deferred until start completes");
            return;
        }
        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                inner.logger.info("Host is stopping; shutting down");
                runtime.spawn(async move {
                    Application { inner }.stop().await;
                });
            }
            Err(e) => inner
                .logger
                .error("Host stop signal received outside a Tokio runtime", Some(&e)),
        }
    })
}

/// Builder for Application
pub struct ApplicationBuilder {
    config: ApplicationConfig,
    logger: Arc<dyn Logger>,
    host: Option<Arc<dyn HostSignal>>,
    bus: Arc<dyn EventBus>,
    metadata: Arc<MetadataTable>,
    modules: Vec<Arc<dyn Module>>,
    binders: Vec<Binder>,
}

impl Default for ApplicationBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ApplicationBuilder {
    /// Create a new application builder
    pub fn new() -> Self {
        Self {
            config: ApplicationConfig::default(),
            logger: Arc::new(TracingLogger),
            host: None,
            bus: Arc::new(LocalEventBus::new()),
            metadata: Arc::new(MetadataTable::new()),
            modules: Vec::new(),
            binders: Vec::new(),
        }
    }

    /// Replace the default configuration
    pub fn config(mut self, config: ApplicationConfig) -> Self {
        self.config = config;
        self
    }

    /// Logger shared by the runtime. Defaults to [`TracingLogger`].
    pub fn logger(mut self, logger: Arc<dyn Logger>) -> Self {
        self.logger = logger;
        self
    }

    /// Host stop signal. Defaults to [`ProcessSignal`].
    pub fn host(mut self, host: Arc<dyn HostSignal>) -> Self {
        self.host = Some(host);
        self
    }

    /// Event bus the event loader subscribes to. Defaults to [`LocalEventBus`].
    pub fn bus(mut self, bus: Arc<dyn EventBus>) -> Self {
        self.bus = bus;
        self
    }

    /// Handler metadata consulted by the event and tick loaders.
    pub fn metadata(mut self, metadata: Arc<MetadataTable>) -> Self {
        self.metadata = metadata;
        self
    }

    /// Add a module; modules load in insertion order
    pub fn module<M: Module>(mut self, module: M) -> Self {
        self.modules.push(Arc::new(module));
        self
    }

    /// Extra bindings applied every time the registry is created, after the
    /// runtime's own. Re-binding a runtime key overrides it.
    pub fn bind<F>(mut self, binder: F) -> Self
    where
        F: Fn(&ServiceRegistry) + Send + Sync + 'static,
    {
        self.binders.push(Arc::new(binder));
        self
    }

    /// Build the application in the STOPPED state
    pub fn build(self) -> Application {
        let logger = self.logger;
        let bus = self.bus;
        let metadata = self.metadata;
        let config = self.config;

        let core = {
            let logger = Arc::clone(&logger);
            let config = Arc::new(config.clone());
            let binder: Binder = Arc::new(move |registry: &ServiceRegistry| {
                registry.bind_instance(ServiceKey::of::<dyn Logger>(), Arc::clone(&logger));
                registry.bind_instance(ServiceKey::of::<dyn EventBus>(), Arc::clone(&bus));
                registry.bind_instance(ServiceKey::of::<MetadataTable>(), Arc::clone(&metadata));
                registry.bind_instance(ServiceKey::of::<ApplicationConfig>(), Arc::clone(&config));
                register_loaders(registry);
            });
            binder
        };
        let mut binders = vec![core];
        binders.extend(self.binders);

        let (_, outcome) = watch::channel(Some(true));
        Application {
            inner: Arc::new(Inner {
                config,
                scope: RegistryScope::new(binders),
                logger,
                host: self
                    .host
                    .unwrap_or_else(|| Arc::new(ProcessSignal::new())),
                events: LifecycleEvents::new(),
                modules: Mutex::new(self.modules),
                machine: Mutex::new(Machine {
                    state: ApplicationState::Stopped,
                    completion: None,
                    outcome,
                    module_loader: None,
                    host_subscription: None,
                    stop_requested: false,
                }),
            }),
        }
    }
}
