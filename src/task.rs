use std::future::Future;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error};

/// Stop side handed to the body of a [`BackgroundTask`].
pub struct StopSignal {
    rx: watch::Receiver<bool>,
}

impl StopSignal {
    /// Resolves once the owning task asks to stop, or was dropped.
    ///
    /// Cancel-safe: it can sit in a `select!` arm and be polled again on the
    /// next iteration.
    pub async fn stopped(&mut self) {
        while !*self.rx.borrow_and_update() {
            if self.rx.changed().await.is_err() {
                return;
            }
        }
    }

    pub fn is_stopped(&self) -> bool {
        *self.rx.borrow() || self.rx.has_changed().is_err()
    }
}

/// A spawned loop plus the means to stop it and wait for it.
///
/// Dropping a `BackgroundTask` without calling [`stop`](Self::stop) closes the
/// stop channel, which the body observes as a stop request; it just is not
/// joined.
pub struct BackgroundTask {
    name: String,
    stop_tx: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

impl BackgroundTask {
    pub fn spawn<F, Fut>(name: impl Into<String>, body: F) -> Self
    where
        F: FnOnce(StopSignal) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let name = name.into();
        let (stop_tx, rx) = watch::channel(false);
        let handle = tokio::spawn(body(StopSignal { rx }));
        debug!("Started background task {}", name);

        Self {
            name,
            stop_tx,
            handle,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Signal the body to stop and wait until it has returned.
    pub async fn stop(self) {
        // Err only means the body already returned and dropped its receiver.
        let _ = self.stop_tx.send(true);

        match self.handle.await {
            Ok(()) => debug!("Background task {} stopped", self.name),
            Err(e) if e.is_panic() => error!("Background task {} panicked: {}", self.name, e),
            Err(e) => error!("Background task {} was cancelled: {}", self.name, e),
        }
    }
}
