// packages/bridge/src/cycle/meter.rs
//! Achieved-frequency measurement
//!
//! Runs beside the scheduler. Every window it turns the iteration count into
//! an average period, stores it in [`CycleState`] and resets the counter. The
//! scheduler never paces from this value.

use crate::channel::MessageSink;
use crate::cycle::state::{frequency_from_period, CycleState};
use crate::observability::CYCLE_FREQUENCY;
use crate::protocol::{FrequencyReport, Message};
use metrics::gauge;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

pub struct FrequencyMeter {
    state: Arc<CycleState>,
    window: Duration,

    /// Where to publish a `#freq` report after every window
    reporter: Option<Arc<dyn MessageSink>>,

    /// Host brain loop rate, passed through to the report as is
    brain_frequency: f64,
}

impl FrequencyMeter {
    pub fn new(state: Arc<CycleState>, window: Duration) -> Self {
        Self {
            state,
            window,
            reporter: None,
            brain_frequency: 0.0,
        }
    }

    pub fn with_reporter(mut self, sink: Arc<dyn MessageSink>) -> Self {
        self.reporter = Some(sink);
        self
    }

    pub fn with_brain_frequency(mut self, frequency: f64) -> Self {
        self.brain_frequency = frequency;
        self
    }

    /// Close one window of length `elapsed`; returns the measured period in ms
    pub fn measure(&self, elapsed: Duration) -> f64 {
        let iterations = self.state.take_iterations();
        let window_ms = elapsed.as_nanos() as f64 / 1e6;

        let measured = if iterations > 0 {
            window_ms / iterations as f64
        } else {
            0.0
        };

        self.state.set_measured_period_ms(measured);
        let frequency = frequency_from_period(measured);
        gauge!(CYCLE_FREQUENCY).set(frequency);
        trace!(iterations, measured_period_ms = measured, frequency, "Window closed");

        measured
    }

    /// Report for the window just closed; `gui` is the achieved loop rate
    pub fn report(&self) -> FrequencyReport {
        let snapshot = self.state.snapshot();
        FrequencyReport {
            brain: self.brain_frequency,
            gui: snapshot.measured_frequency(),
            rtf: snapshot.real_time_factor,
        }
    }

    pub async fn run(self, shutdown: CancellationToken) {
        let mut ticker = interval_at(Instant::now() + self.window, self.window);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut previous = Instant::now();

        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                _ = shutdown.cancelled() => break,
            }

            let now = Instant::now();
            self.measure(now - previous);
            previous = now;

            if let Some(sink) = &self.reporter {
                if sink.is_connected() {
                    let frame = Message::Frequency(self.report()).to_string();
                    if let Err(e) = sink.send(frame) {
                        debug!("Frequency report not sent: {}", e);
                    }
                }
            }
        }

        debug!("Frequency meter stopped");
    }
}
