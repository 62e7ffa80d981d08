//! Shutdown coordination for event loops and their connections.

use std::time::{Duration, Instant};

use tokio::sync::watch;

/// Coordinator for graceful shutdown.
///
/// Holds the drain deadline once triggered. Every subscriber sees the same
/// deadline, including subscribers created after the trigger.
#[derive(Debug)]
pub struct Shutdown {
    tx: watch::Sender<Option<Instant>>,
}

impl Shutdown {
    /// Create a new shutdown coordinator.
    pub fn new() -> Self {
        let (tx, _) = watch::channel(None);
        Self { tx }
    }

    /// Subscribe to the shutdown signal.
    pub fn subscribe(&self) -> ShutdownSignal {
        ShutdownSignal {
            rx: self.tx.subscribe(),
        }
    }

    /// Trigger the shutdown signal. The first deadline wins.
    pub fn trigger(&self, deadline: Instant) {
        self.tx.send_if_modified(|current| {
            if current.is_some() {
                return false;
            }
            *current = Some(deadline);
            true
        });
    }

    pub fn is_triggered(&self) -> bool {
        self.tx.borrow().is_some()
    }
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}

/// Receiving side of a [`Shutdown`].
#[derive(Debug, Clone)]
pub struct ShutdownSignal {
    rx: watch::Receiver<Option<Instant>>,
}

impl ShutdownSignal {
    pub fn is_triggered(&self) -> bool {
        self.rx.borrow().is_some()
    }

    /// Deadline after which in-flight work is abandoned, once triggered.
    pub fn deadline(&self) -> Option<Instant> {
        *self.rx.borrow()
    }

    /// Wait for the signal and return the drain deadline.
    ///
    /// Resolves immediately if the coordinator is gone.
    pub async fn recv(&mut self) -> Instant {
        match self.rx.wait_for(|deadline| deadline.is_some()).await {
            Ok(deadline) => {
                let deadline = *deadline;
                deadline.unwrap_or_else(Instant::now)
            }
            Err(_) => Instant::now(),
        }
    }
}

/// Outcome of draining a pool or the whole server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownStatus {
    /// All in-flight work finished before the deadline.
    Graceful,
    /// The deadline passed; `abandoned` tasks were closed forcibly.
    Forced { abandoned: u64 },
}

impl ShutdownStatus {
    pub fn is_graceful(&self) -> bool {
        matches!(self, ShutdownStatus::Graceful)
    }

    /// Combine two outcomes, summing abandoned work.
    pub fn merge(self, other: ShutdownStatus) -> ShutdownStatus {
        match (self, other) {
            (ShutdownStatus::Graceful, ShutdownStatus::Graceful) => ShutdownStatus::Graceful,
            (ShutdownStatus::Forced { abandoned }, ShutdownStatus::Graceful)
            | (ShutdownStatus::Graceful, ShutdownStatus::Forced { abandoned }) => {
                ShutdownStatus::Forced { abandoned }
            }
            (ShutdownStatus::Forced { abandoned: a }, ShutdownStatus::Forced { abandoned: b }) => {
                ShutdownStatus::Forced {
                    abandoned: a.saturating_add(b),
                }
            }
        }
    }
}

/// `now + timeout`, saturating far in the future on overflow.
pub(crate) fn deadline_after(timeout: Duration) -> Instant {
    let now = Instant::now();
    now.checked_add(timeout)
        .unwrap_or_else(|| now + Duration::from_secs(365 * 24 * 60 * 60))
}
