//! Connection Layer Boundary
//!
//! The transport/protocol engine is external: the session only connects,
//! disconnects, and listens to the events it pushes through [`ConnectionEvents`].

mod synthetic;

pub use synthetic::SyntheticConnection;

use std::sync::Arc;
use anyhow::Result;
use async_trait::async_trait;
use log::{debug, warn};
use parking_lot::Mutex;
use tokio::sync::{mpsc, watch};
use tokio::sync::mpsc::error::TrySendError;

use crate::app::{SessionConfiguration, TerminationReason};
use crate::media::VideoFrame;
use crate::stats::{RuntimeCounters, StatsSample};

/// Handle to the network/protocol engine for one session.
///
/// `connect` may take arbitrarily long; it is raced against `stop` and its
/// future is dropped if the session is cancelled first. `disconnect` is
/// called exactly once when the session ends, whether or not `connect`
/// completed.
#[async_trait]
pub trait ConnectionFacade: Send {
    /// Establish the connection. Events may be pushed through `events` from
    /// any thread, both during and after this call.
    async fn connect(&mut self, config: &SessionConfiguration, events: ConnectionEvents) -> Result<()>;

    /// Tear the connection down and stop delivering events
    async fn disconnect(&mut self);
}

/// Connection quality reported by the transport
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionStatus {
    Okay,
    Poor,
}

/// Events queued from the connection to the session task
#[derive(Debug)]
pub(crate) enum ConnectionEvent {
    Frame(VideoFrame),
    Stats(StatsSample),
    Status(ConnectionStatus),
    StageStarting(String),
    StageComplete(String),
    StageFailed { stage: String, error_code: i32 },
}

/// Callback surface handed to a [`ConnectionFacade`].
///
/// Every method is synchronous and non-blocking so it can be called straight
/// from a network thread. Cheap to clone.
#[derive(Clone)]
pub struct ConnectionEvents {
    tx: mpsc::Sender<ConnectionEvent>,
    terminated: Arc<watch::Sender<Option<TerminationReason>>>,
    counters: Arc<Mutex<RuntimeCounters>>,
}

/// Session-task side of [`ConnectionEvents`]
pub(crate) struct EventReceiver {
    pub(crate) events: mpsc::Receiver<ConnectionEvent>,
    pub(crate) terminated: watch::Receiver<Option<TerminationReason>>,
}

impl ConnectionEvents {
    pub(crate) fn channel(depth: usize, counters: Arc<Mutex<RuntimeCounters>>) -> (Self, EventReceiver) {
        let (tx, events) = mpsc::channel(depth.max(1));
        let (terminated_tx, terminated) = watch::channel(None);

        let sender = Self {
            tx,
            terminated: Arc::new(terminated_tx),
            counters,
        };
        (sender, EventReceiver { events, terminated })
    }

    /// A decoded frame arrived.
    ///
    /// If the session is backed up the frame is dropped here rather than
    /// queued; it still counts as received.
    pub fn frame(&self, frame: VideoFrame) {
        match self.tx.try_send(ConnectionEvent::Frame(frame)) {
            Ok(()) => {}
            Err(TrySendError::Full(ConnectionEvent::Frame(frame))) => {
                let received = {
                    let mut counters = self.counters.lock();
                    counters.record_received(frame.byte_len());
                    counters.record_dropped();
                    counters.frames_received()
                };
                debug!("Event queue full, dropped frame {}", received);
            }
            Err(_) => {}
        }
    }

    /// New network measurements. Dropped when the queue is full; the next
    /// sample supersedes it anyway.
    pub fn stats(&self, sample: StatsSample) {
        if let Err(TrySendError::Full(_)) = self.tx.try_send(ConnectionEvent::Stats(sample)) {
            debug!("Event queue full, skipped stats sample");
        }
    }

    pub fn status(&self, status: ConnectionStatus) {
        self.send_control(ConnectionEvent::Status(status));
    }

    pub fn stage_starting(&self, stage: &str) {
        self.send_control(ConnectionEvent::StageStarting(stage.to_string()));
    }

    pub fn stage_complete(&self, stage: &str) {
        self.send_control(ConnectionEvent::StageComplete(stage.to_string()));
    }

    pub fn stage_failed(&self, stage: &str, error_code: i32) {
        self.send_control(ConnectionEvent::StageFailed {
            stage: stage.to_string(),
            error_code,
        });
    }

    /// The connection ended on its own. Only the first reason is kept.
    pub fn terminated(&self, reason: TerminationReason) {
        self.terminated.send_if_modified(|current| {
            if current.is_none() {
                *current = Some(reason);
                true
            } else {
                false
            }
        });
    }

    /// Whether the session has stopped listening
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    fn send_control(&self, event: ConnectionEvent) {
        if let Err(TrySendError::Full(event)) = self.tx.try_send(event) {
            warn!("Event queue full, dropped {:?}", event);
        }
    }
}
