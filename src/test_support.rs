//! Test doubles for the connection, sink and lifecycle boundaries.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use parking_lot::Mutex;

use crate::app::{SessionConfiguration, SessionController, SessionLifecycle, TerminationReason};
use crate::connection::{ConnectionEvents, ConnectionFacade, ConnectionStatus};
use crate::media::{PresentResult, PresentationSink, VideoFrame};

pub fn init_test_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Poll `condition` until it holds, failing the test after five seconds
pub async fn eventually(condition: impl Fn() -> bool) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while !condition() {
        assert!(tokio::time::Instant::now() < deadline, "condition not met within 5s");
        tokio::time::sleep(Duration::from_millis(2)).await;
    }
}

/// Sink that counts calls and drops every n-th frame
pub struct SpySink {
    calls: AtomicU64,
    drop_every: Option<u64>,
    delay: Option<Duration>,
}

impl SpySink {
    pub fn accepting() -> Self {
        Self { calls: AtomicU64::new(0), drop_every: None, delay: None }
    }

    pub fn dropping_every(n: u64) -> Self {
        Self { calls: AtomicU64::new(0), drop_every: Some(n), delay: None }
    }

    /// Block the presenting thread for `delay` on every call
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn calls(&self) -> u64 {
        self.calls.load(Ordering::SeqCst)
    }
}

impl PresentationSink for SpySink {
    fn present(&self, _frame: VideoFrame) -> PresentResult {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if let Some(delay) = self.delay {
            std::thread::sleep(delay);
        }
        match self.drop_every {
            Some(n) if call % n == 0 => PresentResult::Dropped,
            _ => PresentResult::Accepted,
        }
    }
}

#[derive(Default)]
struct Recorded {
    connected: u32,
    content_shown: u32,
    reasons: Vec<TerminationReason>,
    started: Vec<String>,
    completed: Vec<String>,
    failed: Vec<String>,
    statuses: Vec<ConnectionStatus>,
    sink_calls_at_termination: Option<u64>,
}

/// Lifecycle that records every callback
#[derive(Default)]
pub struct RecordingLifecycle {
    recorded: Mutex<Recorded>,
    sink: Option<Arc<SpySink>>,
    stop_target: Mutex<Option<Weak<SessionController>>>,
}

impl RecordingLifecycle {
    /// Also capture the sink's call count when termination is reported
    pub fn watching(sink: Arc<SpySink>) -> Self {
        Self { sink: Some(sink), ..Self::default() }
    }

    /// Call `stop()` on the controller from inside `on_terminated`
    pub fn stop_on_terminated(&self, controller: &Arc<SessionController>) {
        *self.stop_target.lock() = Some(Arc::downgrade(controller));
    }

    pub fn connected_count(&self) -> u32 {
        self.recorded.lock().connected
    }

    pub fn content_shown_count(&self) -> u32 {
        self.recorded.lock().content_shown
    }

    pub fn reasons(&self) -> Vec<TerminationReason> {
        self.recorded.lock().reasons.clone()
    }

    pub fn started_stages(&self) -> Vec<String> {
        self.recorded.lock().started.clone()
    }

    pub fn completed_stages(&self) -> Vec<String> {
        self.recorded.lock().completed.clone()
    }

    pub fn failed_stages(&self) -> Vec<String> {
        self.recorded.lock().failed.clone()
    }

    pub fn statuses(&self) -> Vec<ConnectionStatus> {
        self.recorded.lock().statuses.clone()
    }

    pub fn sink_calls_at_termination(&self) -> Option<u64> {
        self.recorded.lock().sink_calls_at_termination
    }
}

impl SessionLifecycle for RecordingLifecycle {
    fn on_connected(&self) {
        self.recorded.lock().connected += 1;
    }

    fn on_terminated(&self, reason: &TerminationReason) {
        {
            let mut recorded = self.recorded.lock();
            recorded.reasons.push(reason.clone());
            recorded.sink_calls_at_termination = self.sink.as_ref().map(|s| s.calls());
        }

        let target = self.stop_target.lock().as_ref().and_then(Weak::upgrade);
        if let Some(controller) = target {
            tokio::spawn(async move { controller.stop().await });
        }
    }

    fn on_stage_starting(&self, stage: &str) {
        self.recorded.lock().started.push(stage.to_string());
    }

    fn on_stage_complete(&self, stage: &str) {
        self.recorded.lock().completed.push(stage.to_string());
    }

    fn on_stage_failed(&self, stage: &str, _error_code: i32) {
        self.recorded.lock().failed.push(stage.to_string());
    }

    fn on_connection_status(&self, status: ConnectionStatus) {
        self.recorded.lock().statuses.push(status);
    }

    fn on_video_content_shown(&self) {
        self.recorded.lock().content_shown += 1;
    }
}

/// How [`MockConnection::connect`] behaves
#[derive(Debug, Clone)]
pub enum ConnectBehavior {
    Succeed,
    Fail(String),
    /// Never completes
    Hang,
}

/// Test-side view of a [`MockConnection`] after it has moved into a controller
#[derive(Clone, Default)]
pub struct MockHandle {
    events: Arc<Mutex<Option<ConnectionEvents>>>,
    connect_calls: Arc<AtomicU64>,
    disconnects: Arc<AtomicU64>,
    connect_completed: Arc<AtomicBool>,
}

impl MockHandle {
    /// Event sink captured during `connect`
    pub fn events(&self) -> Option<ConnectionEvents> {
        self.events.lock().clone()
    }

    pub fn connect_calls(&self) -> u64 {
        self.connect_calls.load(Ordering::SeqCst)
    }

    pub fn disconnects(&self) -> u64 {
        self.disconnects.load(Ordering::SeqCst)
    }

    pub fn connect_completed(&self) -> bool {
        self.connect_completed.load(Ordering::SeqCst)
    }
}

pub struct MockConnection {
    behavior: ConnectBehavior,
    frames_during_connect: usize,
    hang_on_disconnect: bool,
    handle: MockHandle,
}

impl MockConnection {
    pub fn new(behavior: ConnectBehavior) -> Self {
        Self {
            behavior,
            frames_during_connect: 0,
            hang_on_disconnect: false,
            handle: MockHandle::default(),
        }
    }

    /// Push frames before `connect` returns
    pub fn with_frames_during_connect(mut self, frames: usize) -> Self {
        self.frames_during_connect = frames;
        self
    }

    pub fn with_hanging_disconnect(mut self) -> Self {
        self.hang_on_disconnect = true;
        self
    }

    pub fn handle(&self) -> MockHandle {
        self.handle.clone()
    }
}

#[async_trait]
impl ConnectionFacade for MockConnection {
    async fn connect(&mut self, _config: &SessionConfiguration, events: ConnectionEvents) -> Result<()> {
        self.handle.connect_calls.fetch_add(1, Ordering::SeqCst);
        *self.handle.events.lock() = Some(events.clone());

        match &self.behavior {
            ConnectBehavior::Succeed => {
                if self.frames_during_connect > 0 {
                    for _ in 0..self.frames_during_connect {
                        events.frame(VideoFrame::empty(8, 8));
                    }
                    tokio::task::yield_now().await;
                }
                self.handle.connect_completed.store(true, Ordering::SeqCst);
                Ok(())
            }
            ConnectBehavior::Fail(message) => Err(anyhow!("{}", message)),
            ConnectBehavior::Hang => {
                std::future::pending::<()>().await;
                self.handle.connect_completed.store(true, Ordering::SeqCst);
                Ok(())
            }
        }
    }

    async fn disconnect(&mut self) {
        self.handle.disconnects.fetch_add(1, Ordering::SeqCst);
        if self.hang_on_disconnect {
            std::future::pending::<()>().await;
        }
    }
}
