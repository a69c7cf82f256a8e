//! Latest-frame mailbox sink.

use std::sync::atomic::{AtomicU64, Ordering};
use parking_lot::Mutex;

use super::{PresentResult, PresentationSink, VideoFrame};

/// Shared frame holder for zero-latency frame delivery
/// Session writes the latest frame, renderer reads it - no buffering
pub struct SharedFrame {
    frame: Mutex<Option<VideoFrame>>,
    frame_count: AtomicU64,
    last_read_count: AtomicU64,
    overwritten: AtomicU64,
}

impl SharedFrame {
    pub fn new() -> Self {
        Self {
            frame: Mutex::new(None),
            frame_count: AtomicU64::new(0),
            last_read_count: AtomicU64::new(0),
            overwritten: AtomicU64::new(0),
        }
    }

    /// Write a new frame, replacing any frame the renderer has not picked up yet
    pub fn write(&self, frame: VideoFrame) {
        if self.frame.lock().replace(frame).is_some() {
            self.overwritten.fetch_add(1, Ordering::Relaxed);
        }
        self.frame_count.fetch_add(1, Ordering::Release);
    }

    /// Check if there's a new frame since last read
    pub fn has_new_frame(&self) -> bool {
        let current = self.frame_count.load(Ordering::Acquire);
        let last = self.last_read_count.load(Ordering::Acquire);
        current > last
    }

    /// Read the latest frame (called by renderer)
    /// Returns None if no new frame since last read
    pub fn read(&self) -> Option<VideoFrame> {
        let current = self.frame_count.load(Ordering::Acquire);
        let last = self.last_read_count.load(Ordering::Acquire);

        if current > last {
            self.last_read_count.store(current, Ordering::Release);
            self.frame.lock().take()
        } else {
            None
        }
    }

    /// Frames written so far
    pub fn frame_count(&self) -> u64 {
        self.frame_count.load(Ordering::Relaxed)
    }

    /// Frames replaced before the renderer read them
    pub fn overwritten_count(&self) -> u64 {
        self.overwritten.load(Ordering::Relaxed)
    }
}

impl Default for SharedFrame {
    fn default() -> Self {
        Self::new()
    }
}

impl PresentationSink for SharedFrame {
    fn present(&self, frame: VideoFrame) -> PresentResult {
        self.write(frame);
        PresentResult::Accepted
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_takes_latest_once() {
        let shared = SharedFrame::new();
        assert!(!shared.has_new_frame());

        let mut first = VideoFrame::empty(4, 4);
        first.timestamp_us = 1;
        let mut second = VideoFrame::empty(4, 4);
        second.timestamp_us = 2;

        assert_eq!(shared.present(first), PresentResult::Accepted);
        assert_eq!(shared.present(second), PresentResult::Accepted);

        assert!(shared.has_new_frame());
        let read = shared.read().map(|f| f.timestamp_us);
        assert_eq!(read, Some(2));
        assert!(shared.read().is_none());
        assert_eq!(shared.frame_count(), 2);
        assert_eq!(shared.overwritten_count(), 1);
    }
}
