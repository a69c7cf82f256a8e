//! Session Controller
//!
//! Runs one streaming session: connects, relays frames to the sink, keeps the
//! counters behind the stats overlay, and tears everything down exactly once.

use std::sync::Arc;
use std::time::Instant;
use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use log::{debug, error, info, warn};

use super::config::{ControllerOptions, SessionConfiguration};
use super::session::{SessionError, SessionLifecycle, SessionState, TerminationReason};
use crate::connection::{ConnectionEvent, ConnectionEvents, ConnectionFacade, ConnectionStatus, EventReceiver};
use crate::media::{PresentResult, PresentationSink, VideoFrame};
use crate::stats::{RuntimeCounters, StatsAggregator, StatsSnapshot, StreamDescription};

/// Stage reported around `ConnectionFacade::connect`
pub const CONNECT_STAGE: &str = "connection";

/// State shared between the controller handle and the session task
struct Shared {
    state: watch::Sender<SessionState>,
    stop: watch::Sender<bool>,
    counters: Arc<Mutex<RuntimeCounters>>,
    /// Taken out on the transition to Terminated; frames are only presented
    /// while holding this lock.
    sink: Mutex<Option<Arc<dyn PresentationSink>>>,
    lifecycle: Arc<dyn SessionLifecycle>,
    session_id: String,
}

impl Shared {
    fn state(&self) -> SessionState {
        *self.state.borrow()
    }

    /// Apply a transition if it is legal from the current state
    fn transition(&self, next: SessionState) -> bool {
        let session_id = &self.session_id;
        self.state.send_if_modified(|current| {
            if current.can_transition_to(next) {
                debug!("Session {} {} -> {}", session_id, current, next);
                *current = next;
                true
            } else {
                false
            }
        })
    }

    fn signal_stop(&self) {
        self.stop.send_if_modified(|requested| !std::mem::replace(requested, true));
    }

    /// Release the sink, enter Terminated and notify the host.
    ///
    /// Safe to race: only the caller that wins the transition notifies.
    fn finish(&self, reason: TerminationReason) -> bool {
        let sink = self.sink.lock().take();
        self.counters.lock().mark_ended(Instant::now());

        if !self.transition(SessionState::Terminated) {
            return false;
        }
        drop(sink);

        match &reason {
            TerminationReason::Stopped => info!("Session {} stopped", self.session_id),
            other => warn!("Session {} terminated: {}", self.session_id, other),
        }
        self.lifecycle.on_terminated(&reason);
        true
    }
}

/// Everything the session task owns until it runs
struct SessionParts {
    facade: Box<dyn ConnectionFacade>,
}

/// Controller for a single streaming session.
///
/// Construction is cheap and opens nothing. The session begins with
/// [`start`](Self::start) (spawned) or [`run`](Self::run) (awaited by the
/// caller) and cannot be restarted once it has ended.
pub struct SessionController {
    config: Arc<SessionConfiguration>,
    options: ControllerOptions,
    stream: StreamDescription,
    shared: Arc<Shared>,
    pending: Mutex<Option<SessionParts>>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl SessionController {
    pub fn new(
        config: Arc<SessionConfiguration>,
        sink: Arc<dyn PresentationSink>,
        lifecycle: Arc<dyn SessionLifecycle>,
        facade: Box<dyn ConnectionFacade>,
    ) -> Self {
        Self::with_options(config, sink, lifecycle, facade, ControllerOptions::default())
    }

    pub fn with_options(
        config: Arc<SessionConfiguration>,
        sink: Arc<dyn PresentationSink>,
        lifecycle: Arc<dyn SessionLifecycle>,
        facade: Box<dyn ConnectionFacade>,
        options: ControllerOptions,
    ) -> Self {
        let (width, height) = config.resolution_tuple();
        let stream = StreamDescription {
            width,
            height,
            fps: config.fps,
            codec: config.codec,
        };

        let (state, _) = watch::channel(SessionState::Idle);
        let (stop, _) = watch::channel(false);

        let shared = Arc::new(Shared {
            state,
            stop,
            counters: Arc::new(Mutex::new(RuntimeCounters::new())),
            sink: Mutex::new(Some(sink)),
            lifecycle,
            session_id: crate::utils::generate_session_id(),
        });

        Self {
            config,
            options,
            stream,
            shared,
            pending: Mutex::new(Some(SessionParts { facade })),
            task: Mutex::new(None),
        }
    }

    /// Unique id used in log lines
    pub fn session_id(&self) -> &str {
        &self.shared.session_id
    }

    pub fn config(&self) -> &SessionConfiguration {
        &self.config
    }

    pub fn state(&self) -> SessionState {
        self.shared.state()
    }

    /// Receiver that observes every state transition
    pub fn state_changes(&self) -> watch::Receiver<SessionState> {
        self.shared.state.subscribe()
    }

    /// Spawn the session onto the current tokio runtime
    pub fn start(&self) -> Result<(), SessionError> {
        let runtime = tokio::runtime::Handle::try_current().map_err(|_| SessionError::NoRuntime)?;
        let worker = self.take_worker()?;

        *self.task.lock() = Some(runtime.spawn(worker.run()));
        Ok(())
    }

    /// Run the session on the caller's task until it terminates
    pub async fn run(&self) -> Result<(), SessionError> {
        let worker = self.take_worker()?;
        worker.run().await;
        Ok(())
    }

    /// Stop the session and wait until it has terminated.
    ///
    /// Idempotent and safe in any state. If the session does not wind down
    /// within `stop_timeout`, the task is aborted and the sink released
    /// anyway.
    pub async fn stop(&self) {
        if self.stop_unstarted() {
            return;
        }
        if self.state().is_terminal() {
            return;
        }

        self.request_stop();

        let state_rx = self.shared.state.subscribe();
        if tokio::time::timeout(self.options.stop_timeout, wait_terminated(state_rx))
            .await
            .is_err()
        {
            warn!(
                "Session {} did not stop within {:?}, forcing release",
                self.shared.session_id, self.options.stop_timeout
            );
            self.force_terminate();
        }
    }

    /// Ask the session to stop without waiting for it
    pub fn request_stop(&self) {
        if self.stop_unstarted() {
            return;
        }
        if self.shared.transition(SessionState::Stopping) {
            info!("Stop requested for session {}", self.shared.session_id);
        }
        self.shared.signal_stop();
    }

    /// Consistent copy of the current counters
    pub fn stats_snapshot(&self) -> StatsSnapshot {
        self.shared.counters.lock().snapshot(&self.stream, Instant::now())
    }

    /// Stats overlay for the current counters; never waits on the network
    pub fn stats_overlay_text(&self) -> String {
        StatsAggregator::format(&self.stats_snapshot())
    }

    fn take_worker(&self) -> Result<SessionWorker, SessionError> {
        let mut pending = self.pending.lock();
        let parts = pending.take().ok_or(SessionError::AlreadyStarted)?;

        // Still under the lock so stop() cannot see Idle with the parts gone
        self.shared.transition(SessionState::Connecting);
        drop(pending);

        Ok(SessionWorker {
            shared: self.shared.clone(),
            config: self.config.clone(),
            queue_depth: self.options.event_queue_depth,
            facade: parts.facade,
            stop_rx: self.shared.stop.subscribe(),
            active: false,
            content_shown: false,
            last_status: None,
        })
    }

    /// Stop before the session ever started: drop the parts and terminate
    fn stop_unstarted(&self) -> bool {
        let parts = self.pending.lock().take();
        match parts {
            Some(parts) => {
                drop(parts);
                self.shared.finish(TerminationReason::Stopped);
                true
            }
            None => false,
        }
    }

    fn force_terminate(&self) {
        if let Some(task) = self.task.lock().take() {
            task.abort();
        }
        self.shared.transition(SessionState::Stopping);
        self.shared.finish(TerminationReason::Stopped);
    }
}

impl Drop for SessionController {
    fn drop(&mut self) {
        if !self.state().is_terminal() && self.pending.lock().is_none() {
            self.shared.transition(SessionState::Stopping);
            self.shared.signal_stop();
        }
    }
}

async fn wait_terminated(mut state_rx: watch::Receiver<SessionState>) {
    let _ = state_rx.wait_for(|state| state.is_terminal()).await;
}

async fn stop_requested(stop_rx: &mut watch::Receiver<bool>) {
    let closed = stop_rx.wait_for(|requested| *requested).await.is_err();
    if closed {
        // Controller gone without a stop; never resolve
        std::future::pending::<()>().await;
    }
}

enum ConnectOutcome {
    Connected,
    Failed(anyhow::Error),
    Cancelled,
}

/// The background unit of work for one session
struct SessionWorker {
    shared: Arc<Shared>,
    config: Arc<SessionConfiguration>,
    queue_depth: usize,
    facade: Box<dyn ConnectionFacade>,
    stop_rx: watch::Receiver<bool>,
    active: bool,
    content_shown: bool,
    last_status: Option<ConnectionStatus>,
}

impl SessionWorker {
    async fn run(mut self) {
        let session_id = self.shared.session_id.clone();
        let (events, mut rx) = ConnectionEvents::channel(self.queue_depth, self.shared.counters.clone());

        info!("Session {} connecting to {}", session_id, self.config.host);
        self.shared.lifecycle.on_stage_starting(CONNECT_STAGE);

        match self.connect(events, &mut rx).await {
            ConnectOutcome::Connected => {}
            ConnectOutcome::Failed(e) => {
                error!("Session {} failed to connect: {:#}", session_id, e);
                self.shared.lifecycle.on_stage_failed(CONNECT_STAGE, -1);
                self.facade.disconnect().await;
                self.discard_queued(&mut rx);
                self.shared.finish(TerminationReason::ConnectFailed(format!("{:#}", e)));
                return;
            }
            ConnectOutcome::Cancelled => {
                info!("Session {} cancelled while connecting", session_id);
                self.facade.disconnect().await;
                self.discard_queued(&mut rx);
                self.shared.finish(TerminationReason::Stopped);
                return;
            }
        }

        self.shared.lifecycle.on_stage_complete(CONNECT_STAGE);
        if !self.shared.transition(SessionState::Active) {
            // stop() won the race against connect completing
            self.facade.disconnect().await;
            self.discard_queued(&mut rx);
            self.shared.finish(TerminationReason::Stopped);
            return;
        }

        self.active = true;
        self.shared.counters.lock().mark_active(Instant::now());
        info!("Session {} active", session_id);
        self.shared.lifecycle.on_connected();

        let reason = self.pump(&mut rx).await;

        self.active = false;
        self.shared.transition(SessionState::Stopping);
        self.facade.disconnect().await;
        self.discard_queued(&mut rx);
        self.shared.finish(reason);
    }

    /// Race `connect` against stop, handling events pushed meanwhile
    async fn connect(&mut self, events: ConnectionEvents, rx: &mut EventReceiver) -> ConnectOutcome {
        let connect = self.facade.connect(&self.config, events);
        tokio::pin!(connect);

        loop {
            tokio::select! {
                biased;

                _ = stop_requested(&mut self.stop_rx) => return ConnectOutcome::Cancelled,
                Some(event) = rx.events.recv() => {
                    handle_event(
                        &self.shared,
                        event,
                        self.active,
                        &mut self.content_shown,
                        &mut self.last_status,
                    );
                }
                result = &mut connect => {
                    return match result {
                        Ok(()) => ConnectOutcome::Connected,
                        Err(e) => ConnectOutcome::Failed(e),
                    };
                }
            }
        }
    }

    /// Process events until stop or termination; returns why the session ended
    async fn pump(&mut self, rx: &mut EventReceiver) -> TerminationReason {
        loop {
            tokio::select! {
                biased;

                _ = stop_requested(&mut self.stop_rx) => return TerminationReason::Stopped,
                event = rx.events.recv() => match event {
                    Some(event) => handle_event(
                        &self.shared,
                        event,
                        self.active,
                        &mut self.content_shown,
                        &mut self.last_status,
                    ),
                    None => {
                        let reported = rx.terminated.borrow().clone();
                        return reported.unwrap_or_else(|| {
                            TerminationReason::NetworkError("connection closed its event channel".to_string())
                        });
                    }
                },
                Ok(()) = rx.terminated.changed() => {
                    let reported = rx.terminated.borrow_and_update().clone();
                    if let Some(reason) = reported {
                        return reason;
                    }
                }
            }
        }
    }

    /// Events still queued at teardown are never presented
    fn discard_queued(&self, rx: &mut EventReceiver) {
        rx.events.close();
        let mut discarded = 0;
        while let Ok(event) = rx.events.try_recv() {
            if let ConnectionEvent::Frame(frame) = event {
                let mut counters = self.shared.counters.lock();
                counters.record_received(frame.byte_len());
                counters.record_dropped();
                discarded += 1;
            }
        }
        if discarded > 0 {
            debug!("Session {} discarded {} in-flight frames", self.shared.session_id, discarded);
        }
    }
}

fn handle_event(
    shared: &Shared,
    event: ConnectionEvent,
    active: bool,
    content_shown: &mut bool,
    last_status: &mut Option<ConnectionStatus>,
) {
    match event {
        ConnectionEvent::Frame(frame) => {
            let accepted = present_frame(shared, frame, active);
            if accepted && !*content_shown {
                *content_shown = true;
                info!("Session {} first frame presented", shared.session_id);
                shared.lifecycle.on_video_content_shown();
            }
        }
        ConnectionEvent::Stats(sample) => {
            shared.counters.lock().merge(&sample);
        }
        ConnectionEvent::Status(status) => {
            if *last_status != Some(status) {
                *last_status = Some(status);
                if status == ConnectionStatus::Poor {
                    warn!("Session {} connection quality is poor", shared.session_id);
                }
                shared.lifecycle.on_connection_status(status);
            }
        }
        ConnectionEvent::StageStarting(stage) => {
            info!("Starting {}", stage);
            shared.lifecycle.on_stage_starting(&stage);
        }
        ConnectionEvent::StageComplete(stage) => {
            info!("Stage {} complete", stage);
            shared.lifecycle.on_stage_complete(&stage);
        }
        ConnectionEvent::StageFailed { stage, error_code } => {
            warn!("Stage {} failed: {}", stage, error_code);
            shared.lifecycle.on_stage_failed(&stage, error_code);
        }
    }
}

/// Hand a frame to the sink and count it; returns whether the sink accepted it
fn present_frame(shared: &Shared, frame: VideoFrame, active: bool) -> bool {
    let bytes = frame.byte_len();

    let result = if active {
        match shared.sink.lock().as_ref() {
            Some(sink) => sink.present(frame),
            None => PresentResult::Dropped,
        }
    } else {
        PresentResult::Dropped
    };

    // One lock for all three counters so snapshots always add up
    let mut counters = shared.counters.lock();
    counters.record_received(bytes);
    match result {
        PresentResult::Accepted => counters.record_presented(),
        PresentResult::Dropped => counters.record_dropped(),
    }

    result == PresentResult::Accepted
}
