//! Media Frames and Presentation
//!
//! Decoded video frames and the sink that puts them on screen.

mod shared_frame;

pub use shared_frame::SharedFrame;

/// Pixel format of decoded video frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PixelFormat {
    /// YUV 4:2:0 planar (Y, U, V separate planes)
    #[default]
    YUV420P,
    /// NV12 semi-planar (Y plane + interleaved UV plane)
    NV12,
}

/// Decoded video frame
///
/// The session layer never looks inside the planes; it only moves frames
/// from the connection to the sink and counts their size.
#[derive(Debug, Clone)]
pub struct VideoFrame {
    pub width: u32,
    pub height: u32,
    /// Y plane (luma) - full resolution
    pub y_plane: Vec<u8>,
    /// U plane, or interleaved UV for NV12
    pub u_plane: Vec<u8>,
    /// V plane, empty for NV12
    pub v_plane: Vec<u8>,
    pub y_stride: u32,
    pub u_stride: u32,
    pub v_stride: u32,
    pub timestamp_us: u64,
    pub format: PixelFormat,
}

impl VideoFrame {
    /// Create empty frame (YUV420P format)
    pub fn empty(width: u32, height: u32) -> Self {
        let y_size = luma_len(width, height);
        let uv_size = y_size / 4;

        Self {
            width,
            height,
            y_plane: vec![0; y_size],
            u_plane: vec![128; uv_size],
            v_plane: vec![128; uv_size],
            y_stride: width,
            u_stride: width / 2,
            v_stride: width / 2,
            timestamp_us: 0,
            format: PixelFormat::YUV420P,
        }
    }

    /// Generate an animated gradient frame, used when no real stream exists
    pub fn test_pattern(width: u32, height: u32, frame_number: u64) -> Self {
        let mut frame = Self::empty(width, height);

        // ~60 FPS, loops every 10 seconds
        let time = (frame_number as f32 * 0.016) % 10.0;
        let hue_shift = (time * 50.0) as u8;

        for y in 0..height {
            for x in 0..width {
                let idx = y as usize * width as usize + x as usize;

                let gradient = ((x as f32 / width as f32 + time * 0.1).fract() * 255.0) as u8;
                let vertical = ((y as f32 / height as f32) * 255.0) as u8;
                if let Some(luma) = frame.y_plane.get_mut(idx) {
                    *luma = gradient / 2 + vertical / 2;
                }

                if x % 2 == 0 && y % 2 == 0 {
                    let uv_idx = (y / 2) as usize * (width / 2) as usize + (x / 2) as usize;
                    if let Some(u) = frame.u_plane.get_mut(uv_idx) {
                        *u = 128u8.wrapping_add(hue_shift);
                    }
                    if let Some(v) = frame.v_plane.get_mut(uv_idx) {
                        *v = 128u8.wrapping_sub(hue_shift / 2);
                    }
                }
            }
        }

        frame.timestamp_us = frame_number * 16_667;
        frame
    }

    /// Total payload size in bytes across all planes
    pub fn byte_len(&self) -> usize {
        self.y_plane.len() + self.u_plane.len() + self.v_plane.len()
    }

    /// Resolution as "WxH"
    pub fn resolution(&self) -> String {
        format!("{}x{}", self.width, self.height)
    }
}

/// Bytes in a full-resolution plane, computed in `usize` so large sizes cannot wrap
fn luma_len(width: u32, height: u32) -> usize {
    width as usize * height as usize
}

/// Outcome of handing a frame to a [`PresentationSink`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PresentResult {
    /// The sink took the frame for display
    Accepted,
    /// The sink was saturated and discarded the frame
    Dropped,
}

/// Display surface fed with decoded frames.
///
/// Called from the session task, never after the session has terminated.
/// Implementations must return promptly: a saturated sink reports
/// [`PresentResult::Dropped`] instead of queueing.
pub trait PresentationSink: Send + Sync {
    fn present(&self, frame: VideoFrame) -> PresentResult;
}
