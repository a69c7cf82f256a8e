//! Session Statistics
//!
//! Runtime counters kept by the session and the overlay text built from them.

mod overlay;

pub use overlay::StatsAggregator;

use std::time::{Duration, Instant};

use crate::app::VideoCodec;

/// Measurement pushed by the connection layer.
///
/// Fields left as `None` keep their previous value; present fields replace it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StatsSample {
    /// Current video bitrate in kbps
    pub bitrate_kbps: Option<u32>,
    /// Network round-trip time in ms
    pub rtt_ms: Option<u32>,
    /// Round-trip time variance in ms
    pub rtt_variance_ms: Option<u32>,
    /// Decode time per frame in ms
    pub decode_time_ms: Option<f32>,
    /// Packet loss percentage
    pub packet_loss: Option<f32>,
}

/// Mutable counters owned by one session
#[derive(Debug, Clone, Default)]
pub struct RuntimeCounters {
    frames_received: u64,
    frames_presented: u64,
    frames_dropped: u64,
    bytes_received: u64,
    bitrate_kbps: Option<u32>,
    rtt_ms: Option<u32>,
    rtt_variance_ms: Option<u32>,
    decode_time_ms: Option<f32>,
    packet_loss: Option<f32>,
    active_since: Option<Instant>,
    ended_at: Option<Instant>,
}

impl RuntimeCounters {
    pub fn new() -> Self {
        Self::default()
    }

    /// A frame came off the connection
    pub fn record_received(&mut self, bytes: usize) {
        if self.is_ended() {
            return;
        }
        self.frames_received += 1;
        self.bytes_received += bytes as u64;
    }

    pub fn record_presented(&mut self) {
        if !self.is_ended() {
            self.frames_presented += 1;
        }
    }

    pub fn record_dropped(&mut self) {
        if !self.is_ended() {
            self.frames_dropped += 1;
        }
    }

    /// Start the clock used for rates; only the first call counts
    pub fn mark_active(&mut self, now: Instant) {
        self.active_since.get_or_insert(now);
    }

    /// Freeze the clock and the counters; later snapshots keep the final values
    pub fn mark_ended(&mut self, now: Instant) {
        self.ended_at.get_or_insert(now);
    }

    pub fn is_ended(&self) -> bool {
        self.ended_at.is_some()
    }

    /// Merge a measurement sample, latest value wins per field
    pub fn merge(&mut self, sample: &StatsSample) {
        if self.is_ended() {
            return;
        }
        if let Some(v) = sample.bitrate_kbps {
            self.bitrate_kbps = Some(v);
        }
        if let Some(v) = sample.rtt_ms {
            self.rtt_ms = Some(v);
        }
        if let Some(v) = sample.rtt_variance_ms {
            self.rtt_variance_ms = Some(v);
        }
        if let Some(v) = sample.decode_time_ms {
            self.decode_time_ms = Some(v);
        }
        if let Some(v) = sample.packet_loss {
            self.packet_loss = Some(v);
        }
    }

    pub fn frames_received(&self) -> u64 {
        self.frames_received
    }

    pub fn frames_presented(&self) -> u64 {
        self.frames_presented
    }

    pub fn frames_dropped(&self) -> u64 {
        self.frames_dropped
    }

    /// Copy the counters into a plain snapshot, with elapsed time measured at `now`
    pub fn snapshot(&self, stream: &StreamDescription, now: Instant) -> StatsSnapshot {
        let now = self.ended_at.map_or(now, |ended| ended.min(now));
        StatsSnapshot {
            stream: stream.clone(),
            frames_received: self.frames_received,
            frames_presented: self.frames_presented,
            frames_dropped: self.frames_dropped,
            bytes_received: self.bytes_received,
            bitrate_kbps: self.bitrate_kbps,
            rtt_ms: self.rtt_ms,
            rtt_variance_ms: self.rtt_variance_ms,
            decode_time_ms: self.decode_time_ms,
            packet_loss: self.packet_loss,
            elapsed: self
                .active_since
                .map(|since| now.saturating_duration_since(since))
                .unwrap_or_default(),
        }
    }
}

/// Static description of the negotiated stream shown in the overlay
#[derive(Debug, Clone, PartialEq)]
pub struct StreamDescription {
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    pub codec: VideoCodec,
}

/// Point-in-time copy of [`RuntimeCounters`]; what the overlay is formatted from
#[derive(Debug, Clone, PartialEq)]
pub struct StatsSnapshot {
    pub stream: StreamDescription,
    pub frames_received: u64,
    pub frames_presented: u64,
    pub frames_dropped: u64,
    pub bytes_received: u64,
    pub bitrate_kbps: Option<u32>,
    pub rtt_ms: Option<u32>,
    pub rtt_variance_ms: Option<u32>,
    pub decode_time_ms: Option<f32>,
    pub packet_loss: Option<f32>,
    /// Time spent Active so far
    pub elapsed: Duration,
}
