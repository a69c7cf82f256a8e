//! Synthetic connection for running a session without a host.
//!
//! Generates animated test-pattern frames at the configured frame rate.

use std::time::Duration;
use anyhow::Result;
use async_trait::async_trait;
use log::{debug, info};
use tokio::task::JoinHandle;

use super::{ConnectionEvents, ConnectionFacade};
use crate::app::{SessionConfiguration, TerminationReason};
use crate::media::VideoFrame;
use crate::stats::StatsSample;

const STAGE_NAME: &str = "synthetic stream";

/// [`ConnectionFacade`] that produces test-pattern frames locally
pub struct SyntheticConnection {
    connect_delay: Duration,
    frame_size: Option<(u32, u32)>,
    frame_limit: Option<u64>,
    rtt_ms: u32,
    generator: Option<JoinHandle<()>>,
}

impl SyntheticConnection {
    pub fn new() -> Self {
        Self {
            connect_delay: Duration::ZERO,
            frame_size: None,
            frame_limit: None,
            rtt_ms: 1,
            generator: None,
        }
    }

    /// Simulated handshake time before `connect` returns
    pub fn with_connect_delay(mut self, delay: Duration) -> Self {
        self.connect_delay = delay;
        self
    }

    /// Override the frame size; defaults to the configured resolution
    pub fn with_frame_size(mut self, width: u32, height: u32) -> Self {
        self.frame_size = Some((width, height));
        self
    }

    /// End the stream as a remote disconnect after this many frames
    pub fn with_frame_limit(mut self, frames: u64) -> Self {
        self.frame_limit = Some(frames);
        self
    }

    /// Round-trip time reported in stats samples
    pub fn with_rtt(mut self, rtt_ms: u32) -> Self {
        self.rtt_ms = rtt_ms;
        self
    }
}

impl Default for SyntheticConnection {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ConnectionFacade for SyntheticConnection {
    async fn connect(&mut self, config: &SessionConfiguration, events: ConnectionEvents) -> Result<()> {
        events.stage_starting(STAGE_NAME);
        if !self.connect_delay.is_zero() {
            tokio::time::sleep(self.connect_delay).await;
        }
        events.stage_complete(STAGE_NAME);

        let (width, height) = self.frame_size.unwrap_or_else(|| config.resolution_tuple());
        let fps = config.fps.max(1);
        let frame_limit = self.frame_limit;
        let rtt_ms = self.rtt_ms;

        info!("Synthetic stream {}x{} @ {} fps", width, height, fps);

        self.generator = Some(tokio::spawn(async move {
            let period = Duration::from_secs_f64(1.0 / fps as f64);
            let mut frame_interval = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
            let mut frame_number: u64 = 0;
            let mut bytes_this_period: u64 = 0;

            loop {
                frame_interval.tick().await;
                if events.is_closed() {
                    break;
                }
                if frame_limit.is_some_and(|limit| frame_number >= limit) {
                    events.terminated(TerminationReason::RemoteDisconnected);
                    break;
                }

                let frame = VideoFrame::test_pattern(width, height, frame_number);
                bytes_this_period += frame.byte_len() as u64;
                events.frame(frame);
                frame_number += 1;

                // One stats sample per second of stream
                if frame_number % fps as u64 == 0 {
                    events.stats(StatsSample {
                        bitrate_kbps: Some((bytes_this_period * 8 / 1000) as u32),
                        rtt_ms: Some(rtt_ms),
                        rtt_variance_ms: Some(0),
                        decode_time_ms: Some(0.0),
                        packet_loss: Some(0.0),
                    });
                    bytes_this_period = 0;
                }
            }
            debug!("Synthetic generator ended after {} frames", frame_number);
        }));

        Ok(())
    }

    async fn disconnect(&mut self) {
        if let Some(generator) = self.generator.take() {
            generator.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Instant;
    use parking_lot::Mutex;

    use crate::connection::ConnectionEvent;
    use crate::stats::RuntimeCounters;

    fn channel(depth: usize) -> (ConnectionEvents, crate::connection::EventReceiver) {
        ConnectionEvents::channel(depth, Arc::new(Mutex::new(RuntimeCounters::new())))
    }

    #[tokio::test]
    async fn test_connect_waits_for_handshake_delay() {
        let (events, mut rx) = channel(16);
        let mut connection = SyntheticConnection::new()
            .with_connect_delay(Duration::from_millis(30))
            .with_frame_size(4, 4);

        let started = Instant::now();
        connection.connect(&SessionConfiguration::default(), events).await.unwrap();
        assert!(started.elapsed() >= Duration::from_millis(30));

        assert!(matches!(rx.events.try_recv(), Ok(ConnectionEvent::StageStarting(s)) if s == STAGE_NAME));
        assert!(matches!(rx.events.try_recv(), Ok(ConnectionEvent::StageComplete(s)) if s == STAGE_NAME));

        connection.disconnect().await;
    }

    #[tokio::test]
    async fn test_stats_sample_reports_configured_rtt() {
        let (events, mut rx) = channel(256);
        let mut config = SessionConfiguration::default();
        config.fps = 100;
        let mut connection = SyntheticConnection::new().with_frame_size(2, 2).with_rtt(42);

        connection.connect(&config, events).await.unwrap();

        let sample = tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                match rx.events.recv().await {
                    Some(ConnectionEvent::Stats(sample)) => return Some(sample),
                    Some(_) => continue,
                    None => return None,
                }
            }
        })
        .await
        .expect("no stats sample within 5s")
        .expect("generator closed the channel");

        assert_eq!(sample.rtt_ms, Some(42));
        assert_eq!(sample.packet_loss, Some(0.0));

        connection.disconnect().await;
    }
}
