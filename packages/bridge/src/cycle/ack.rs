// packages/bridge/src/cycle/ack.rs
//! Acknowledgment gate between the update loop and the remote peer
//!
//! The flag means "the last published step has been acknowledged". The
//! dispatcher sets it when `#ack` arrives; the scheduler waits for it and
//! clears it. Waiting parks on a [`Notify`] instead of spinning on the mutex.

use crate::utils::errors::{BridgeError, Result};
use parking_lot::Mutex;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Default)]
pub struct AckFlowController {
    flag: Mutex<bool>,
    notify: Notify,
}

impl AckFlowController {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_ack(&self, value: bool) {
        *self.flag.lock() = value;
        if value {
            self.notify.notify_waiters();
        }
    }

    pub fn get_ack(&self) -> bool {
        *self.flag.lock()
    }

    /// Wait until the flag is true. Does not clear it.
    ///
    /// Fails with `SessionClosed` if `shutdown` fires first.
    pub async fn wait_for_ack(&self, shutdown: &CancellationToken) -> Result<()> {
        loop {
            let notified = self.notify.notified();
            tokio::pin!(notified);
            // Register before checking the flag so a set_ack in between is not lost
            notified.as_mut().enable();

            if self.get_ack() {
                return Ok(());
            }

            tokio::select! {
                _ = &mut notified => {}
                _ = shutdown.cancelled() => return Err(BridgeError::SessionClosed),
            }
        }
    }
}
