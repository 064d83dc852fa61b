// packages/bridge/src/cycle/scheduler.rs
//! Ack-gated fixed-period update loop
//!
//! Each iteration publishes one step, waits for the peer to acknowledge it,
//! and sleeps whatever is left of the target period. A peer slower than the
//! target period is never outrun: iterations run back-to-back and no step is
//! skipped or doubled up to catch up.

use crate::cycle::ack::AckFlowController;
use crate::cycle::state::{CycleSnapshot, CycleState};
use crate::utils::errors::{BridgeError, Result};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

pub struct CycleScheduler {
    ack: Arc<AckFlowController>,
    state: Arc<CycleState>,
    shutdown: CancellationToken,
}

impl CycleScheduler {
    pub fn new(ack: Arc<AckFlowController>, state: Arc<CycleState>, shutdown: CancellationToken) -> Self {
        Self { ack, state, shutdown }
    }

    pub fn state(&self) -> &Arc<CycleState> {
        &self.state
    }

    /// Run until the shutdown token fires.
    ///
    /// `step` publishes one frame. When it fails nothing is outstanding, so the
    /// ack wait is skipped and the iteration is only paced.
    pub async fn run_loop<F>(&self, mut step: F, target_period: Duration)
    where
        F: FnMut(&CycleSnapshot) -> Result<()>,
    {
        self.state.set_target_period(target_period);
        info!(target_period_ms = self.state.target_period_ms(), "Cycle scheduler started");

        while !self.shutdown.is_cancelled() {
            let start = Instant::now();

            match step(&self.state.snapshot()) {
                Ok(()) => match self.ack.wait_for_ack(&self.shutdown).await {
                    Ok(()) => self.ack.set_ack(false),
                    Err(BridgeError::SessionClosed) => break,
                    Err(e) => debug!("Ack wait failed: {}", e),
                },
                Err(e) => debug!("Step not published: {}", e),
            }

            // Picks up any frequency negotiated through `#ack<freq>`
            let period = self.state.target_period();
            let elapsed = start.elapsed();

            if elapsed < period {
                tokio::select! {
                    _ = tokio::time::sleep(period - elapsed) => {}
                    _ = self.shutdown.cancelled() => break,
                }
            }

            self.state.record_iteration();
        }

        info!("Cycle scheduler stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use tokio::sync::mpsc;

    fn scheduler() -> (Arc<CycleScheduler>, Arc<AckFlowController>, CancellationToken) {
        let ack = Arc::new(AckFlowController::new());
        let state = Arc::new(CycleState::new(Duration::from_millis(50)));
        let shutdown = CancellationToken::new();
        let scheduler = Arc::new(CycleScheduler::new(Arc::clone(&ack), state, shutdown.clone()));
        (scheduler, ack, shutdown)
    }

    fn intervals(stamps: &[Instant]) -> Vec<Duration> {
        stamps.windows(2).map(|w| w[1] - w[0]).collect()
    }

    #[tokio::test(start_paused = true)]
    async fn test_fast_steps_converge_to_target_period() {
        let (scheduler, ack, shutdown) = scheduler();
        let stamps = Arc::new(Mutex::new(Vec::new()));

        let task = {
            let scheduler = Arc::clone(&scheduler);
            let stamps = Arc::clone(&stamps);
            tokio::spawn(async move {
                scheduler
                    .run_loop(
                        move |_| {
                            stamps.lock().push(Instant::now());
                            // Peer acknowledges instantly
                            ack.set_ack(true);
                            Ok(())
                        },
                        Duration::from_millis(50),
                    )
                    .await
            })
        };

        tokio::time::sleep(Duration::from_millis(525)).await;
        shutdown.cancel();
        task.await.unwrap();

        let stamps = stamps.lock();
        assert!(stamps.len() >= 10, "only {} steps", stamps.len());
        for interval in intervals(&stamps) {
            assert_eq!(interval, Duration::from_millis(50));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_peer_runs_back_to_back() {
        let (scheduler, ack, shutdown) = scheduler();
        let stamps = Arc::new(Mutex::new(Vec::new()));
        let (tx, mut rx) = mpsc::unbounded_channel::<()>();

        // Peer takes 80ms to acknowledge each frame
        let peer = {
            let ack = Arc::clone(&ack);
            tokio::spawn(async move {
                while rx.recv().await.is_some() {
                    tokio::time::sleep(Duration::from_millis(80)).await;
                    ack.set_ack(true);
                }
            })
        };

        let task = {
            let scheduler = Arc::clone(&scheduler);
            let stamps = Arc::clone(&stamps);
            tokio::spawn(async move {
                scheduler
                    .run_loop(
                        move |_| {
                            stamps.lock().push(Instant::now());
                            tx.send(()).map_err(|_| BridgeError::SessionClosed)
                        },
                        Duration::from_millis(50),
                    )
                    .await
            })
        };

        tokio::time::sleep(Duration::from_millis(850)).await;
        shutdown.cancel();
        task.await.unwrap();
        peer.abort();

        let stamps = stamps.lock();
        assert!(stamps.len() >= 10, "only {} steps", stamps.len());
        for interval in intervals(&stamps) {
            assert_eq!(interval, Duration::from_millis(80));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_unpublished_step_skips_ack_wait() {
        let (scheduler, ack, shutdown) = scheduler();
        let steps = Arc::new(Mutex::new(0u32));

        let task = {
            let scheduler = Arc::clone(&scheduler);
            let steps = Arc::clone(&steps);
            tokio::spawn(async move {
                scheduler
                    .run_loop(
                        move |_| {
                            *steps.lock() += 1;
                            Err(BridgeError::NotConnected {
                                role: crate::channel::ChannelRole::Gui,
                            })
                        },
                        Duration::from_millis(50),
                    )
                    .await
            })
        };

        tokio::time::sleep(Duration::from_millis(275)).await;
        shutdown.cancel();
        task.await.unwrap();

        // Never acknowledged, yet the loop kept stepping at the target period
        assert!(!ack.get_ack());
        assert_eq!(*steps.lock(), 6);
    }

    #[tokio::test(start_paused = true)]
    async fn test_negotiated_frequency_changes_pacing() {
        let (scheduler, ack, shutdown) = scheduler();
        let stamps = Arc::new(Mutex::new(Vec::new()));
        let state = Arc::clone(scheduler.state());

        let task = {
            let scheduler = Arc::clone(&scheduler);
            let stamps = Arc::clone(&stamps);
            tokio::spawn(async move {
                scheduler
                    .run_loop(
                        move |_| {
                            stamps.lock().push(Instant::now());
                            // `#ack10` from the peer
                            state.set_target_frequency(10.0);
                            ack.set_ack(true);
                            Ok(())
                        },
                        Duration::from_millis(50),
                    )
                    .await
            })
        };

        tokio::time::sleep(Duration::from_millis(450)).await;
        shutdown.cancel();
        task.await.unwrap();

        let stamps = stamps.lock();
        assert!(stamps.len() >= 4);
        for interval in intervals(&stamps) {
            assert_eq!(interval, Duration::from_millis(100));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_during_ack_wait() {
        let (scheduler, _ack, shutdown) = scheduler();

        let task = {
            let scheduler = Arc::clone(&scheduler);
            tokio::spawn(async move { scheduler.run_loop(|_| Ok(()), Duration::from_millis(50)).await })
        };

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert!(!task.is_finished());

        shutdown.cancel();
        tokio::time::timeout(Duration::from_millis(10), task)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(scheduler.state().snapshot().iteration_count, 0);
    }
}
