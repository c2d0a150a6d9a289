use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::info;

/// Coordinates graceful shutdown between signal handlers, the accept loop,
/// and the `listenerClose` client event.
///
/// Constructed once at startup; every trigger funnels into [`goodbye`],
/// which is idempotent.
///
/// [`goodbye`]: ShutdownCoordinator::goodbye
pub struct ShutdownCoordinator {
    tx: watch::Sender<()>,
    fired: AtomicBool,
}

impl ShutdownCoordinator {
    /// Create a coordinator and the receiver the accept loop waits on.
    #[must_use]
    pub fn new() -> (Arc<Self>, watch::Receiver<()>) {
        let (tx, rx) = watch::channel(());
        (
            Arc::new(Self {
                tx,
                fired: AtomicBool::new(false),
            }),
            rx,
        )
    }

    /// Subscribe to the shutdown signal.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<()> {
        self.tx.subscribe()
    }

    /// Request graceful shutdown. Only the first call logs and signals;
    /// repeat invocations are no-ops.
    pub fn goodbye(&self) {
        if self.fired.swap(true, Ordering::SeqCst) {
            return;
        }
        info!("relay ending gracefully");
        let _ = self.tx.send(());
    }

    /// Whether shutdown has been requested.
    #[must_use]
    pub fn is_shutting_down(&self) -> bool {
        self.fired.load(Ordering::SeqCst)
    }
}

/// Install the platform's shutdown triggers, selected once at startup.
///
/// On Unix this listens for SIGINT and SIGTERM. Elsewhere it listens for the
/// console interrupt event and additionally reads line-oriented stdin,
/// translating a raw ^C byte into a shutdown request for consoles that do
/// not deliver interrupt events.
pub fn spawn_signal_listeners(coordinator: Arc<ShutdownCoordinator>) {
    #[cfg(unix)]
    {
        tokio::spawn(async move {
            use tokio::signal::unix::{signal, SignalKind};
            let mut interrupt = match signal(SignalKind::interrupt()) {
                Ok(s) => s,
                Err(e) => {
                    tracing::warn!("failed to install SIGINT handler: {}", e);
                    return;
                }
            };
            let mut terminate = match signal(SignalKind::terminate()) {
                Ok(s) => s,
                Err(e) => {
                    tracing::warn!("failed to install SIGTERM handler: {}", e);
                    return;
                }
            };
            tokio::select! {
                _ = interrupt.recv() => info!("received SIGINT; attempting graceful shutdown"),
                _ = terminate.recv() => info!("received SIGTERM; attempting graceful shutdown"),
            }
            coordinator.goodbye();
        });
    }

    #[cfg(not(unix))]
    {
        let stdin_coordinator = Arc::clone(&coordinator);
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("received interrupt; attempting graceful shutdown");
            }
            coordinator.goodbye();
        });
        tokio::spawn(async move {
            use tokio::io::AsyncBufReadExt;
            let mut lines = tokio::io::BufReader::new(tokio::io::stdin()).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                if line.contains('\u{3}') {
                    info!("received ^C on stdin; attempting graceful shutdown");
                    stdin_coordinator.goodbye();
                    return;
                }
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn goodbye_notifies_subscribers() {
        let (coordinator, mut rx) = ShutdownCoordinator::new();
        assert!(!coordinator.is_shutting_down());
        coordinator.goodbye();
        rx.changed().await.unwrap();
        assert!(coordinator.is_shutting_down());
    }

    #[tokio::test]
    async fn goodbye_twice_does_not_panic() {
        let (coordinator, mut rx) = ShutdownCoordinator::new();
        coordinator.goodbye();
        coordinator.goodbye();
        coordinator.goodbye();
        rx.changed().await.unwrap();
        assert!(coordinator.is_shutting_down());
    }
}
