// packages/bridge/src/session/wrapper.rs
//! Exercise session lifecycle
//!
//! Owns both peers (exercise and GUI), each a supervised process paired with a
//! message channel. The session is running only once both peers are ready
//! and connected; [`ExerciseSession::terminate`] is the only way back.

use crate::channel::{ChannelRole, MessageChannel, MessageSink, PeerChannel};
use crate::cycle::{AckFlowController, CycleState, RealTimeFactorPoller};
use crate::protocol::{ConsoleCallback, FrequencyReport, Message, ProtocolDispatcher, UpdateCallback};
use crate::runtime::{LaunchSpec, ManagedProcess, ProcessSupervisor};
use crate::session::simulation::SimulationControl;
use crate::session::validation::CodeValidator;
use crate::utils::config::{BridgeConfig, PeerConfig};
use crate::utils::errors::{BridgeError, Result};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, info_span, warn, Instrument, Span};
use ulid::Ulid;

/// Everything the session calls out to
pub struct Collaborators {
    pub simulation: Arc<dyn SimulationControl>,
    pub validator: Arc<dyn CodeValidator>,
    pub on_update: Option<UpdateCallback>,
    pub on_console: Option<ConsoleCallback>,
}

/// One supervised peer and its channel
pub struct PeerLink {
    role: ChannelRole,
    process: Option<ManagedProcess>,
    channel: Arc<dyn PeerChannel>,
}

impl PeerLink {
    pub fn new(role: ChannelRole, process: Option<ManagedProcess>, channel: Arc<dyn PeerChannel>) -> Self {
        Self {
            role,
            process,
            channel,
        }
    }

    pub fn channel(&self) -> &Arc<dyn PeerChannel> {
        &self.channel
    }

    async fn close_channel(&self) {
        self.channel.close().await;
    }

    async fn stop_process(&mut self, supervisor: &ProcessSupervisor) {
        if let Some(process) = self.process.as_mut() {
            match supervisor.terminate(process).await {
                Ok(()) | Err(BridgeError::ProcessAlreadyExited { .. }) => {}
                Err(e) => error!(role = %self.role, "Failed to stop peer process: {}", e),
            }
        }
    }
}

pub struct ExerciseSession {
    id: Ulid,
    span: Span,
    config: BridgeConfig,
    supervisor: ProcessSupervisor,

    exercise: PeerLink,
    gui: PeerLink,

    simulation: Arc<dyn SimulationControl>,
    validator: Arc<dyn CodeValidator>,

    ack: Arc<AckFlowController>,
    state: Arc<CycleState>,
    shutdown: CancellationToken,
    tasks: Mutex<Vec<JoinHandle<()>>>,
    started: AtomicBool,
    running: AtomicBool,
}

impl ExerciseSession {
    /// Launch the exercise peer, then the GUI peer.
    ///
    /// A GUI failure tears the exercise peer down before the error is
    /// returned. On success the simulation is left paused.
    pub async fn launch(config: BridgeConfig, collaborators: Collaborators) -> Result<Self> {
        let id = Ulid::new();
        let span = info_span!("session", id = %id);

        let supervisor = ProcessSupervisor::new(config.shutdown.grace_period());
        let shutdown = CancellationToken::new();

        let cycle = SessionCycle::new(&config, &collaborators);
        let dispatcher = Arc::clone(&cycle.dispatcher);

        let (exercise, gui) = async {
            let mut exercise = launch_peer(
                &supervisor,
                &config,
                ChannelRole::Exercise,
                &config.exercise,
                Arc::clone(&dispatcher),
                &shutdown,
            )
            .await?;

            let gui = match launch_peer(
                &supervisor,
                &config,
                ChannelRole::Gui,
                &config.gui,
                dispatcher,
                &shutdown,
            )
            .await
            {
                Ok(gui) => gui,
                Err(e) => {
                    warn!("GUI peer failed, stopping exercise peer");
                    exercise.close_channel().await;
                    exercise.stop_process(&supervisor).await;
                    return Err(e);
                }
            };

            Ok::<_, BridgeError>((exercise, gui))
        }
        .instrument(span.clone())
        .await?;

        let session = Self::from_parts(id, span, config, supervisor, exercise, gui, collaborators, cycle, shutdown);
        session.pause().await;
        session.running.store(true, Ordering::Release);
        info!(parent: &session.span, "Session launched");

        Ok(session)
    }

    #[allow(clippy::too_many_arguments)]
    fn from_parts(
        id: Ulid,
        span: Span,
        config: BridgeConfig,
        supervisor: ProcessSupervisor,
        exercise: PeerLink,
        gui: PeerLink,
        collaborators: Collaborators,
        cycle: SessionCycle,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            id,
            span,
            config,
            supervisor,
            exercise,
            gui,
            simulation: collaborators.simulation,
            validator: collaborators.validator,
            ack: cycle.ack,
            state: cycle.state,
            shutdown,
            tasks: Mutex::new(Vec::new()),
            started: AtomicBool::new(false),
            running: AtomicBool::new(false),
        }
    }

    pub fn id(&self) -> Ulid {
        self.id
    }

    pub fn state(&self) -> &Arc<CycleState> {
        &self.state
    }

    /// Set by `#ack` from either peer
    pub fn ack(&self) -> &Arc<AckFlowController> {
        &self.ack
    }

    pub fn exercise_channel(&self) -> &Arc<dyn PeerChannel> {
        self.exercise.channel()
    }

    pub fn gui_channel(&self) -> &Arc<dyn PeerChannel> {
        self.gui.channel()
    }

    /// Start the frequency broadcaster (and RTF poller, if configured), then
    /// resume the simulation. Background tasks are only spawned once.
    pub async fn start(&self) {
        if !self.started.swap(true, Ordering::AcqRel) {
            let mut tasks = self.tasks.lock();

            tasks.push(tokio::spawn(
                broadcast_frequencies(
                    Arc::clone(self.exercise.channel()),
                    Arc::clone(&self.state),
                    self.config.clone(),
                    self.shutdown.clone(),
                )
                .instrument(self.span.clone()),
            ));

            if let Some(command) = &self.config.telemetry.rtf_command {
                let poller = RealTimeFactorPoller::new(
                    command.clone(),
                    self.config.cycle.rtf_interval(),
                    Arc::clone(&self.state),
                );
                tasks.push(tokio::spawn(
                    poller.run(self.shutdown.clone()).instrument(self.span.clone()),
                ));
            }
        }

        self.resume().await;
        info!(parent: &self.span, "Session started");
    }

    pub async fn pause(&self) {
        self.simulate("pause", |sim| sim.pause_simulation()).await;
    }

    pub async fn resume(&self) {
        self.simulate("resume", |sim| sim.resume_simulation()).await;
    }

    /// Pause and reset the world
    pub async fn stop(&self) {
        self.pause().await;
        self.simulate("reset", |sim| sim.reset_world()).await;
    }

    /// Reserved; does nothing.
    pub async fn restart(&self) {
        debug!(parent: &self.span, "Restart requested; nothing to do");
    }

    pub fn is_alive(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Validate user code and send it to the exercise peer.
    ///
    /// Rejected code fails with the validator's text unchanged and nothing is
    /// sent.
    pub async fn load_code(&self, code: &str) -> Result<()> {
        let validator = Arc::clone(&self.validator);
        let source = code.to_string();
        let errors = tokio::task::spawn_blocking(move || validator.validate(&source))
            .await
            .map_err(|e| BridgeError::ValidationError(format!("code validator crashed: {}", e)))?;

        if !errors.is_empty() {
            info!(parent: &self.span, "User code rejected");
            return Err(BridgeError::ValidationError(errors));
        }

        if let Err(e) = self.exercise.channel().send(Message::code(code).to_string()) {
            warn!(parent: &self.span, "Failed to send code to exercise: {}", e);
        }
        Ok(())
    }

    /// Stop background tasks, then both channels, then both peers. Idempotent.
    pub async fn terminate(&mut self) {
        self.shutdown.cancel();

        let tasks: Vec<_> = self.tasks.lock().drain(..).collect();
        for task in tasks {
            if tokio::time::timeout(Duration::from_secs(2), task).await.is_err() {
                warn!(parent: &self.span, "Background task did not stop in time");
            }
        }

        let Self {
            gui,
            exercise,
            supervisor,
            span,
            ..
        } = self;
        async move {
            gui.close_channel().await;
            exercise.close_channel().await;
            gui.stop_process(supervisor).await;
            exercise.stop_process(supervisor).await;
        }
        .instrument(span.clone())
        .await;

        if self.running.swap(false, Ordering::AcqRel) {
            info!(parent: &self.span, "Session terminated");
        }
    }

    async fn simulate<F>(&self, action: &'static str, call: F)
    where
        F: FnOnce(&dyn SimulationControl) -> Result<()> + Send + 'static,
    {
        let simulation = Arc::clone(&self.simulation);
        match tokio::task::spawn_blocking(move || call(simulation.as_ref())).await {
            Ok(Ok(())) => debug!(parent: &self.span, action, "Simulation updated"),
            Ok(Err(e)) => warn!(parent: &self.span, action, "Simulation control failed: {}", e),
            Err(e) => error!(parent: &self.span, action, "Simulation control panicked: {}", e),
        }
    }
}

/// Cycle state shared by both channels, and the dispatcher that feeds it
struct SessionCycle {
    ack: Arc<AckFlowController>,
    state: Arc<CycleState>,
    dispatcher: Arc<ProtocolDispatcher>,
}

impl SessionCycle {
    fn new(config: &BridgeConfig, collaborators: &Collaborators) -> Self {
        let ack = Arc::new(AckFlowController::new());
        let state = Arc::new(CycleState::new(config.cycle.target_period()));
        state.set_real_time_factor(config.telemetry.default_rtf);

        let mut dispatcher = ProtocolDispatcher::new().with_ack(Arc::clone(&ack), Arc::clone(&state));
        if let Some(on_update) = &collaborators.on_update {
            dispatcher = dispatcher.with_updates(Arc::clone(on_update));
        }
        if let Some(on_console) = &collaborators.on_console {
            dispatcher = dispatcher.with_console(Arc::clone(on_console));
        }

        Self {
            ack,
            state,
            dispatcher: Arc::new(dispatcher),
        }
    }
}

/// Spawn a peer, connect its channel and wait for the connection
async fn launch_peer(
    supervisor: &ProcessSupervisor,
    config: &BridgeConfig,
    role: ChannelRole,
    peer: &PeerConfig,
    dispatcher: Arc<ProtocolDispatcher>,
    shutdown: &CancellationToken,
) -> Result<PeerLink> {
    let spec = LaunchSpec::from_config(role.as_str(), peer, &config.readiness);
    let mut process = supervisor.launch(spec, shutdown).await?;
    info!(%role, pid = process.pid(), "Peer ready");

    let channel = MessageChannel::connect(
        peer.url.clone(),
        role,
        dispatcher,
        config.channel.retry_interval(),
    );

    let connect_timeout = config.channel.connect_timeout();
    let connected = tokio::select! {
        res = tokio::time::timeout(connect_timeout, channel.wait_connected()) => match res {
            Ok(res) => res,
            Err(_) => Err(BridgeError::launch_failed(
                role.as_str(),
                format!("no connection to {} within {:?}", peer.url, connect_timeout),
            )),
        },
        _ = shutdown.cancelled() => Err(BridgeError::launch_failed(role.as_str(), "launch cancelled")),
    };

    if let Err(e) = connected {
        channel.stop().await;
        if let Err(term) = supervisor.terminate(&mut process).await {
            debug!(%role, "Cleanup after failed connect: {}", term);
        }
        return Err(match e {
            BridgeError::LaunchFailed { .. } => e,
            other => BridgeError::launch_failed(role.as_str(), other.to_string()),
        });
    }

    Ok(PeerLink::new(role, Some(process), Arc::new(channel)))
}

/// Send `#freq` to the exercise peer every broadcast interval while it is
/// connected
async fn broadcast_frequencies(
    channel: Arc<dyn PeerChannel>,
    state: Arc<CycleState>,
    config: BridgeConfig,
    shutdown: CancellationToken,
) {
    let mut ticker = tokio::time::interval(config.telemetry.broadcast_interval());
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let live_rtf = config.telemetry.rtf_command.is_some();

    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            _ = shutdown.cancelled() => break,
        }

        if !channel.is_connected() {
            continue;
        }

        let report = FrequencyReport {
            brain: config.telemetry.brain_frequency,
            gui: config.telemetry.gui_frequency,
            rtf: if live_rtf {
                state.real_time_factor()
            } else {
                config.telemetry.default_rtf
            },
        };

        if let Err(e) = channel.send(Message::Frequency(report).to_string()) {
            debug!("Frequency broadcast not sent: {}", e);
        }
    }

    debug!("Frequency broadcaster stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::testing::RecordingSink;
    use crate::session::simulation::testing::RecordingSimulation;
    use crate::session::validation::testing::FixedValidator;
    use crate::protocol::DispatchOutcome;
    use crate::session::validation::AcceptAll;
    #[cfg(target_os = "linux")]
    use crate::runtime::process_manager::testing::{is_gone, wait_gone};
    use futures::{SinkExt, StreamExt};
    use tokio::net::TcpListener;
    use tokio_tungstenite::tungstenite::Message as Frame;

    struct Harness {
        session: ExerciseSession,
        exercise: Arc<RecordingSink>,
        gui: Arc<RecordingSink>,
        simulation: Arc<RecordingSimulation>,
        dispatcher: Arc<ProtocolDispatcher>,
    }

    fn harness(validator: Arc<dyn CodeValidator>, config: BridgeConfig) -> Harness {
        let exercise = Arc::new(RecordingSink::new(ChannelRole::Exercise));
        let gui = Arc::new(RecordingSink::new(ChannelRole::Gui));
        let simulation = Arc::new(RecordingSimulation::default());

        let collaborators = Collaborators {
            simulation: simulation.clone(),
            validator,
            on_update: None,
            on_console: None,
        };

        let cycle = SessionCycle::new(&config, &collaborators);
        let dispatcher = Arc::clone(&cycle.dispatcher);
        let session = ExerciseSession::from_parts(
            Ulid::new(),
            Span::none(),
            config,
            ProcessSupervisor::default(),
            PeerLink::new(ChannelRole::Exercise, None, exercise.clone()),
            PeerLink::new(ChannelRole::Gui, None, gui.clone()),
            collaborators,
            cycle,
            CancellationToken::new(),
        );
        session.running.store(true, Ordering::Release);

        Harness {
            session,
            exercise,
            gui,
            simulation,
            dispatcher,
        }
    }

    #[tokio::test]
    async fn test_load_code_sends_one_frame() {
        let h = harness(Arc::new(AcceptAll), BridgeConfig::default());

        h.session.load_code("print('hello')").await.unwrap();

        assert_eq!(h.exercise.frames(), vec!["#code print('hello')".to_string()]);
    }

    #[tokio::test]
    async fn test_rejected_code_sends_nothing() {
        let verdict = "line 1: E0602 undefined name 'foo'".to_string();
        let h = harness(Arc::new(FixedValidator(verdict.clone())), BridgeConfig::default());

        let err = h.session.load_code("foo()").await.unwrap_err();

        assert!(matches!(&err, BridgeError::ValidationError(text) if *text == verdict));
        assert_eq!(err.to_string(), verdict);
        assert!(h.exercise.frames().is_empty());
    }

    #[tokio::test]
    async fn test_load_code_while_disconnected_is_not_an_error() {
        let h = harness(Arc::new(AcceptAll), BridgeConfig::default());
        h.exercise.set_connected(false);

        assert!(h.session.load_code("x = 1").await.is_ok());
        assert!(h.exercise.frames().is_empty());
    }

    #[tokio::test]
    async fn test_terminate_twice() {
        let mut h = harness(Arc::new(AcceptAll), BridgeConfig::default());
        assert!(h.session.is_alive());

        h.session.terminate().await;
        assert!(!h.session.is_alive());

        h.session.terminate().await;
        assert!(!h.session.is_alive());
        assert!(!h.exercise.is_connected());
    }

    #[tokio::test]
    async fn test_ack_from_either_peer_opens_gate() {
        let h = harness(Arc::new(AcceptAll), BridgeConfig::default());
        assert!(!h.session.ack().get_ack());

        let outcome = h
            .dispatcher
            .dispatch(ChannelRole::Exercise, "#ack12.5", h.exercise.as_ref());
        assert_eq!(outcome, DispatchOutcome::Acknowledged { frequency: Some(12.5) });
        assert!(h.session.ack().get_ack());
        assert_eq!(h.session.state().target_period_ms(), 80.0);

        h.session.ack().set_ack(false);
        let outcome = h.dispatcher.dispatch(ChannelRole::Gui, "#ack", h.gui.as_ref());
        assert_eq!(outcome, DispatchOutcome::Acknowledged { frequency: None });
        assert!(h.session.ack().get_ack());
        assert_eq!(h.session.state().target_period_ms(), 80.0);

        // Acks are never answered
        assert!(h.exercise.frames().is_empty());
        assert!(h.gui.frames().is_empty());
    }

    #[tokio::test]
    async fn test_simulation_controls() {
        let h = harness(Arc::new(AcceptAll), BridgeConfig::default());

        h.session.pause().await;
        h.session.resume().await;
        h.session.stop().await;
        h.session.restart().await;

        assert_eq!(h.simulation.calls(), vec!["pause", "resume", "pause", "reset"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_broadcasts_frequencies_once() {
        let mut h = harness(Arc::new(AcceptAll), BridgeConfig::default());

        h.session.start().await;
        h.session.start().await;
        tokio::time::sleep(Duration::from_millis(2500)).await;
        h.session.terminate().await;

        // One broadcaster: ticks at 0s, 1s, 2s
        let frames = h.exercise.frames();
        assert_eq!(frames.len(), 3);
        assert!(frames
            .iter()
            .all(|f| f == "#freq{\"brain\":20.0,\"gui\":10.0,\"rtf\":100.0}"));
        assert_eq!(h.simulation.calls(), vec!["resume", "resume"]);
    }

    async fn accept_forever(listener: TcpListener) {
        while let Ok((stream, _)) = listener.accept().await {
            tokio::spawn(async move {
                if let Ok(mut ws) = tokio_tungstenite::accept_async(stream).await {
                    while let Some(Ok(frame)) = ws.next().await {
                        if let Frame::Text(text) = frame {
                            if text.starts_with("#code") {
                                let _ = ws.send(Frame::Text("#exc{\"loaded\":true}".to_string())).await;
                            }
                        }
                    }
                }
            });
        }
    }

    async fn peer_config(dir: &std::path::Path, name: &str, marker: &str) -> PeerConfig {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("ws://{}", listener.local_addr().unwrap());
        tokio::spawn(accept_forever(listener));

        let log_path = dir.join(format!("{}.log", name));
        PeerConfig {
            command: format!("printf '%s' {} > {}; sleep 30", marker, log_path.display()),
            log_path: log_path.display().to_string(),
            ready_marker: marker.to_string(),
            url,
            output_path: None,
        }
    }

    fn test_config(exercise: PeerConfig, gui: PeerConfig) -> BridgeConfig {
        let mut config = BridgeConfig::default();
        config.exercise = exercise;
        config.gui = gui;
        config.readiness.poll_interval_ms = 20;
        config.readiness.timeout_secs = Some(5);
        config.channel.connect_timeout_secs = 5;
        config.shutdown.grace_period_ms = 200;
        config
    }

    #[tokio::test]
    async fn test_launch_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let exercise = peer_config(dir.path(), "code", "websocket_code=ready").await;
        let gui = peer_config(dir.path(), "gui", "websocket_gui=ready").await;

        let updates = Arc::new(Mutex::new(Vec::new()));
        let simulation = Arc::new(RecordingSimulation::default());
        let collaborators = Collaborators {
            simulation: simulation.clone(),
            validator: Arc::new(AcceptAll),
            on_update: Some({
                let updates = Arc::clone(&updates);
                Arc::new(move |value: serde_json::Value| updates.lock().push(value))
            }),
            on_console: None,
        };

        let mut session = ExerciseSession::launch(test_config(exercise, gui), collaborators)
            .await
            .unwrap();
        assert!(session.is_alive());
        assert_eq!(simulation.calls(), vec!["pause"]);

        session.load_code("x = 1").await.unwrap();
        tokio::time::timeout(Duration::from_secs(5), async {
            while updates.lock().is_empty() {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .unwrap();
        assert_eq!(updates.lock()[0], serde_json::json!({"loaded": true}));

        session.terminate().await;
        assert!(!session.is_alive());
        session.terminate().await;
        assert!(!session.is_alive());
    }

    #[cfg(target_os = "linux")]
    #[tokio::test]
    async fn test_gui_failure_fails_launch() {
        let dir = tempfile::tempdir().unwrap();
        let pid_file = dir.path().join("code.pid");
        let mut exercise = peer_config(dir.path(), "code", "websocket_code=ready").await;
        exercise.command = format!(
            "echo $$ > {}; printf '%s' websocket_code=ready > {}; sleep 30",
            pid_file.display(),
            exercise.log_path
        );
        let mut gui = peer_config(dir.path(), "gui", "websocket_gui=ready").await;
        gui.command = "exit 3".to_string();

        let collaborators = Collaborators {
            simulation: Arc::new(RecordingSimulation::default()),
            validator: Arc::new(AcceptAll),
            on_update: None,
            on_console: None,
        };

        let err = ExerciseSession::launch(test_config(exercise, gui), collaborators)
            .await
            .err()
            .unwrap();
        assert!(matches!(err, BridgeError::LaunchFailed { ref name, .. } if name == "gui"));

        // The exercise peer was launched and must be gone with the failure
        let exercise_pid: i32 = std::fs::read_to_string(&pid_file)
            .unwrap()
            .trim()
            .parse()
            .unwrap();
        assert!(wait_gone(exercise_pid, Duration::from_secs(2)).await);
    }

    /// Channel that notes, when closed, whether the watched peer processes
    /// were still alive
    #[cfg(target_os = "linux")]
    struct CloseOrder {
        inner: RecordingSink,
        watched: Arc<Mutex<Vec<i32>>>,
        log: Arc<Mutex<Vec<(ChannelRole, bool)>>>,
    }

    #[cfg(target_os = "linux")]
    impl MessageSink for CloseOrder {
        fn role(&self) -> ChannelRole {
            self.inner.role()
        }

        fn send(&self, text: String) -> Result<()> {
            self.inner.send(text)
        }

        fn is_connected(&self) -> bool {
            self.inner.is_connected()
        }
    }

    #[cfg(target_os = "linux")]
    impl PeerChannel for CloseOrder {
        fn ready(&self) -> futures::future::BoxFuture<'_, Result<()>> {
            self.inner.ready()
        }

        fn close(&self) -> futures::future::BoxFuture<'_, ()> {
            let alive = self.watched.lock().iter().all(|pid| !is_gone(*pid));
            self.log.lock().push((self.role(), alive));
            self.inner.close()
        }
    }

    #[cfg(target_os = "linux")]
    #[tokio::test]
    async fn test_terminate_closes_channels_before_stopping_peers() {
        let dir = tempfile::tempdir().unwrap();
        let supervisor = ProcessSupervisor::new(Duration::from_millis(200));
        let watched = Arc::new(Mutex::new(Vec::new()));
        let log = Arc::new(Mutex::new(Vec::new()));

        let mut links = Vec::new();
        for role in [ChannelRole::Exercise, ChannelRole::Gui] {
            let log_path = dir.path().join(format!("{}.log", role));
            let spec = LaunchSpec::new(
                role.as_str(),
                format!("printf '%s' ready > {}; sleep 30", log_path.display()),
                log_path,
                "ready",
            )
            .with_poll_interval(Duration::from_millis(20));
            let process = supervisor.launch(spec, &CancellationToken::new()).await.unwrap();
            watched.lock().push(process.pid());

            let channel = Arc::new(CloseOrder {
                inner: RecordingSink::new(role),
                watched: Arc::clone(&watched),
                log: Arc::clone(&log),
            });
            links.push(PeerLink::new(role, Some(process), channel));
        }
        let gui = links.pop().unwrap();
        let exercise = links.pop().unwrap();

        let config = BridgeConfig::default();
        let collaborators = Collaborators {
            simulation: Arc::new(RecordingSimulation::default()),
            validator: Arc::new(AcceptAll),
            on_update: None,
            on_console: None,
        };
        let cycle = SessionCycle::new(&config, &collaborators);
        let mut session = ExerciseSession::from_parts(
            Ulid::new(),
            Span::none(),
            config,
            supervisor,
            exercise,
            gui,
            collaborators,
            cycle,
            CancellationToken::new(),
        );
        session.running.store(true, Ordering::Release);

        session.terminate().await;

        assert_eq!(
            log.lock().as_slice(),
            [(ChannelRole::Gui, true), (ChannelRole::Exercise, true)]
        );
        let pids = watched.lock().clone();
        for pid in pids {
            assert!(wait_gone(pid, Duration::from_secs(2)).await);
        }
    }
}
