//! Host stop signal
//!
//! The hosting environment notifies the application that the process is
//! being torn down. [`ProcessSignal`] listens for OS signals (SIGTERM,
//! SIGINT); [`ManualHostSignal`] is triggered by hand.

use dashmap::DashMap;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::signal;
use tokio::task::JoinHandle;
use uuid::Uuid;

pub type HostListener = Arc<dyn Fn() + Send + Sync>;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct HostSubscription(Uuid);

pub trait HostSignal: Send + Sync + 'static {
    fn subscribe(&self, listener: HostListener) -> HostSubscription;

    /// Returns `false` if the subscription was already removed.
    fn unsubscribe(&self, subscription: HostSubscription) -> bool;
}

/// Host signal fired explicitly through [`ManualHostSignal::trigger`].
#[derive(Clone, Default)]
pub struct ManualHostSignal {
    listeners: Arc<DashMap<Uuid, HostListener>>,
}

impl ManualHostSignal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Notify every subscriber. Returns the number notified.
    pub fn trigger(&self) -> usize {
        let listeners: Vec<HostListener> = self
            .listeners
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect();
        for listener in &listeners {
            listener();
        }
        listeners.len()
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }
}

impl HostSignal for ManualHostSignal {
    fn subscribe(&self, listener: HostListener) -> HostSubscription {
        let id = Uuid::new_v4();
        self.listeners.insert(id, listener);
        HostSubscription(id)
    }

    fn unsubscribe(&self, subscription: HostSubscription) -> bool {
        self.listeners.remove(&subscription.0).is_some()
    }
}

/// Host signal driven by Ctrl+C and SIGTERM.
///
/// The OS signal watcher is spawned with the first subscription and aborted
/// once the last one is removed, so subscribing requires a Tokio runtime.
#[derive(Default)]
pub struct ProcessSignal {
    listeners: ManualHostSignal,
    watcher: Mutex<Option<JoinHandle<()>>>,
}

impl ProcessSignal {
    pub fn new() -> Self {
        Self::default()
    }
}

impl HostSignal for ProcessSignal {
    fn subscribe(&self, listener: HostListener) -> HostSubscription {
        let subscription = self.listeners.subscribe(listener);
        let mut watcher = self.watcher.lock().unwrap_or_else(PoisonError::into_inner);
        if watcher.is_none() {
            let listeners = self.listeners.clone();
            *watcher = Some(tokio::spawn(async move {
                shutdown_signal().await;
                listeners.trigger();
            }));
        }
        subscription
    }

    fn unsubscribe(&self, subscription: HostSubscription) -> bool {
        let removed = self.listeners.unsubscribe(subscription);
        if self.listeners.listener_count() == 0 {
            let watcher = self
                .watcher
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .take();
            if let Some(watcher) = watcher {
                watcher.abort();
            }
        }
        removed
    }
}

/// Create a future that completes when a shutdown signal is received.
///
/// If a signal handler cannot be installed that branch never completes.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C signal");
        },
        _ = terminate => {
            tracing::info!("Received SIGTERM signal");
        },
    }
}
