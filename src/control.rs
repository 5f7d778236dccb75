//! Process control: the operator's kill switch and other shutdown triggers.
//!
//! Nothing here drains the queue. The entry point waits on [`ProcessControl::wait`],
//! closes the queue so suspended fetches fail, and exits.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

use crate::config::ControlSettings;

/// Why the process is going down.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownReason {
    /// `POST /kill` from the operator page.
    Kill,
    /// The agent closed its end of the protocol stream.
    AgentDisconnected,
    /// Ctrl-C or SIGTERM.
    Interrupt,
}

impl std::fmt::Display for ShutdownReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ShutdownReason::Kill => write!(f, "kill requested"),
            ShutdownReason::AgentDisconnected => write!(f, "agent disconnected"),
            ShutdownReason::Interrupt => write!(f, "interrupted"),
        }
    }
}

/// Shared shutdown signal. Only the first reason recorded sticks.
#[derive(Clone)]
pub struct ProcessControl {
    signal: Arc<watch::Sender<Option<ShutdownReason>>>,
    kill_delay: Duration,
}

impl ProcessControl {
    pub fn new(kill_delay: Duration) -> Self {
        let (signal, _) = watch::channel(None);
        Self {
            signal: Arc::new(signal),
            kill_delay,
        }
    }

    pub fn from_settings(settings: &ControlSettings) -> Self {
        Self::new(Duration::from_millis(settings.kill_delay_ms))
    }

    /// Schedule shutdown after the kill delay and return immediately, so the
    /// caller can still acknowledge the request.
    pub fn kill(&self) {
        tracing::warn!("Kill requested, shutting down in {:?}", self.kill_delay);
        let control = self.clone();
        tokio::spawn(async move {
            tokio::time::sleep(control.kill_delay).await;
            control.shutdown(ShutdownReason::Kill);
        });
    }

    /// Signal shutdown now. Returns false if shutdown was already signalled.
    pub fn shutdown(&self, reason: ShutdownReason) -> bool {
        let fired = self.signal.send_if_modified(|current| {
            if current.is_none() {
                *current = Some(reason);
                true
            } else {
                false
            }
        });
        if fired {
            tracing::info!("Shutdown signalled: {}", reason);
        }
        fired
    }

    pub fn reason(&self) -> Option<ShutdownReason> {
        *self.signal.borrow()
    }

    /// Wait until shutdown is signalled.
    pub async fn wait(&self) -> ShutdownReason {
        let mut rx = self.signal.subscribe();
        loop {
            if let Some(reason) = *rx.borrow_and_update() {
                return reason;
            }
            if rx.changed().await.is_err() {
                // Unreachable while `self` holds the sender.
                return ShutdownReason::Interrupt;
            }
        }
    }
}

/// Resolve on Ctrl-C (and SIGTERM on unix).
pub async fn interrupt_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
