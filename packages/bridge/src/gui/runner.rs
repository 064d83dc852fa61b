// packages/bridge/src/gui/runner.rs
//! Browser-facing update loop
//!
//! Publishes one `#gui` frame per cycle and waits for the browser's `#ack`
//! before the next. The browser can renegotiate the rate with `#ack<freq>`
//! and send console input with `#con`.

use crate::channel::PeerChannel;
use crate::cycle::{AckFlowController, CycleScheduler, CycleSnapshot, CycleState, FrequencyMeter, RealTimeFactorPoller};
use crate::protocol::{ConsoleCallback, Message, ProtocolDispatcher, UpdateSource};
use crate::utils::config::CycleConfig;
use parking_lot::Mutex;
use serde_json::{Map, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Produces the state published every cycle
pub trait PayloadSource: Send + 'static {
    fn payload(&mut self, snapshot: &CycleSnapshot) -> Map<String, Value>;

    /// Return to the initial state
    fn reset(&mut self) {}
}

pub struct GuiRunner {
    config: CycleConfig,
    ack: Arc<AckFlowController>,
    state: Arc<CycleState>,
    source: Option<Arc<Mutex<Box<dyn PayloadSource>>>>,
    channel: Option<Arc<dyn PeerChannel>>,
    brain_frequency: f64,
    shutdown: CancellationToken,
    tasks: Vec<JoinHandle<()>>,
}

impl GuiRunner {
    pub fn new(config: CycleConfig) -> Self {
        let state = Arc::new(CycleState::new(config.target_period()));
        Self {
            config,
            ack: Arc::new(AckFlowController::new()),
            state,
            source: None,
            channel: None,
            brain_frequency: 0.0,
            shutdown: CancellationToken::new(),
            tasks: Vec::new(),
        }
    }

    /// Host brain loop rate echoed in every `#freq` report
    pub fn with_brain_frequency(mut self, frequency: f64) -> Self {
        self.brain_frequency = frequency;
        self
    }

    pub fn state(&self) -> &Arc<CycleState> {
        &self.state
    }

    /// Inbound handler for the browser channel: `#ack<freq>` and `#con`
    pub fn dispatcher(&self, console: Option<ConsoleCallback>) -> ProtocolDispatcher {
        let dispatcher = ProtocolDispatcher::new().with_ack(Arc::clone(&self.ack), Arc::clone(&self.state));
        match console {
            Some(console) => dispatcher.with_console(console),
            None => dispatcher,
        }
    }

    /// Spawn the update loop, the frequency meter and the optional RTF poller.
    ///
    /// The first frame is published once `channel` is connected.
    pub fn start(&mut self, channel: Arc<dyn PeerChannel>, source: Box<dyn PayloadSource>) {
        if !self.tasks.is_empty() {
            warn!("GUI runner already started");
            return;
        }

        let source = Arc::new(Mutex::new(source));
        self.source = Some(Arc::clone(&source));
        self.channel = Some(Arc::clone(&channel));

        let scheduler = CycleScheduler::new(Arc::clone(&self.ack), Arc::clone(&self.state), self.shutdown.clone());
        let target_period = self.config.target_period();
        let shutdown = self.shutdown.clone();
        let publish = Arc::clone(&channel);

        self.tasks.push(tokio::spawn(async move {
            tokio::select! {
                res = publish.ready() => {
                    if let Err(e) = res {
                        debug!("GUI channel closed before first frame: {}", e);
                        return;
                    }
                }
                _ = shutdown.cancelled() => return,
            }

            info!("GUI channel connected, starting update loop");
            scheduler
                .run_loop(
                    |snapshot| {
                        let payload = source.lock().payload(snapshot);
                        publish.send(Message::update(UpdateSource::Gui, payload).to_string())
                    },
                    target_period,
                )
                .await;
        }));

        let meter = FrequencyMeter::new(Arc::clone(&self.state), self.config.measure_window())
            .with_reporter(channel)
            .with_brain_frequency(self.brain_frequency);
        self.tasks.push(tokio::spawn(meter.run(self.shutdown.clone())));

        if let Some(command) = &self.config.rtf_command {
            let poller = RealTimeFactorPoller::new(command.clone(), self.config.rtf_interval(), Arc::clone(&self.state));
            self.tasks.push(tokio::spawn(poller.run(self.shutdown.clone())));
        }
    }

    pub fn reset(&self) {
        if let Some(source) = &self.source {
            source.lock().reset();
        }
    }

    /// Cancel every task and close the channel
    pub async fn shutdown(&mut self) {
        self.shutdown.cancel();

        for task in self.tasks.drain(..) {
            if tokio::time::timeout(Duration::from_secs(2), task).await.is_err() {
                warn!("GUI task did not stop in time");
            }
        }

        if let Some(channel) = self.channel.take() {
            channel.close().await;
        }
        info!("GUI runner stopped");
    }
}
