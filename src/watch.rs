//! Change notifications for catalog stores.

use tokio::sync::watch;

/// Cancellable subscription to store mutations.
///
/// Notifications carry no payload: callers re-read whatever they need. Any
/// number of writes between two receives collapse into one notification.
#[derive(Debug)]
pub struct StoreWatcher {
    rx: watch::Receiver<u64>,
    initial_pending: bool,
    stopped: bool,
}

impl StoreWatcher {
    pub(crate) const fn new(rx: watch::Receiver<u64>) -> Self {
        Self {
            rx,
            initial_pending: true,
            stopped: false,
        }
    }

    /// Waits for the next notification.
    ///
    /// The first call returns immediately so consumers load their initial
    /// state. Returns `None` once the watcher is stopped or the store has
    /// been dropped.
    pub async fn changed(&mut self) -> Option<()> {
        if self.stopped {
            return None;
        }
        if self.initial_pending {
            self.initial_pending = false;
            self.rx.borrow_and_update();
            return Some(());
        }
        match self.rx.changed().await {
            Ok(()) => {
                self.rx.borrow_and_update();
                Some(())
            }
            Err(_) => {
                self.stopped = true;
                None
            }
        }
    }

    /// Consumes a pending notification without blocking.
    pub fn poll(&mut self) -> bool {
        if self.stopped {
            return false;
        }
        if self.initial_pending {
            self.initial_pending = false;
            self.rx.borrow_and_update();
            return true;
        }
        match self.rx.has_changed() {
            Ok(true) => {
                self.rx.borrow_and_update();
                true
            }
            Ok(false) => false,
            Err(_) => {
                self.stopped = true;
                false
            }
        }
    }

    /// Cancels the subscription; later receives return nothing.
    pub const fn stop(&mut self) {
        self.stopped = true;
    }

    /// Returns `true` once the subscription has ended.
    #[must_use]
    pub const fn is_stopped(&self) -> bool {
        self.stopped
    }
}
