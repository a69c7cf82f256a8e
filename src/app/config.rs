//! Session Configuration
//!
//! Stream parameters handed to the connection layer, and the controller's own tunables.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Parameters of one streaming session.
///
/// Treated as an opaque, immutable value by the controller: it is passed to
/// the connection as-is and only read back for the stats overlay.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfiguration {
    /// Host address of the streaming server
    pub host: String,

    /// Application to launch on the host
    pub app_id: Option<String>,

    /// Stream resolution (e.g., "1920x1080")
    pub resolution: String,

    /// Target FPS
    pub fps: u32,

    /// Bitrate target in kbps
    pub bitrate_kbps: u32,

    /// Preferred video codec
    pub codec: VideoCodec,

    /// Audio channel layout
    pub audio: AudioConfiguration,

    /// Input devices the client can forward
    pub input: InputCapabilities,
}

impl Default for SessionConfiguration {
    fn default() -> Self {
        Self {
            host: String::new(),
            app_id: None,
            resolution: "1920x1080".to_string(),
            fps: 60,
            bitrate_kbps: 20_000,
            codec: VideoCodec::H264,
            audio: AudioConfiguration::Stereo,
            input: InputCapabilities::default(),
        }
    }
}

impl SessionConfiguration {
    /// Configuration for a host with default stream parameters
    pub fn for_host(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            ..Self::default()
        }
    }

    /// Get resolution as (width, height)
    pub fn resolution_tuple(&self) -> (u32, u32) {
        parse_resolution(&self.resolution)
    }
}

/// Parse resolution string (e.g., "1920x1080") into (width, height)
/// Returns (1920, 1080) if parsing fails
pub fn parse_resolution(res: &str) -> (u32, u32) {
    match res.split_once('x') {
        Some((w, h)) => (w.trim().parse().unwrap_or(1920), h.trim().parse().unwrap_or(1080)),
        None => (1920, 1080),
    }
}

/// Video codec options
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum VideoCodec {
    /// H.264/AVC - widest compatibility
    #[default]
    H264,
    /// H.265/HEVC - better compression
    H265,
    /// AV1
    AV1,
}

impl VideoCodec {
    pub fn as_str(&self) -> &'static str {
        match self {
            VideoCodec::H264 => "H264",
            VideoCodec::H265 => "H265",
            VideoCodec::AV1 => "AV1",
        }
    }
}

/// Audio channel layout requested from the host
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum AudioConfiguration {
    #[default]
    Stereo,
    Surround51,
    Surround71,
}

/// Input devices the client is able to forward to the host
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct InputCapabilities {
    pub keyboard: bool,
    pub mouse: bool,
    pub gamepad: bool,
    pub touch: bool,
}

impl Default for InputCapabilities {
    fn default() -> Self {
        Self {
            keyboard: true,
            mouse: true,
            gamepad: true,
            touch: false,
        }
    }
}

/// Controller tunables, independent of the stream itself
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ControllerOptions {
    /// How long `stop` waits for the session task before forcing release
    #[serde(with = "duration_ms")]
    pub stop_timeout: Duration,

    /// Events buffered between the connection callbacks and the session task.
    /// Frames arriving while it is full are dropped.
    pub event_queue_depth: usize,
}

impl Default for ControllerOptions {
    fn default() -> Self {
        Self {
            stop_timeout: Duration::from_secs(5),
            event_queue_depth: 64,
        }
    }
}

mod duration_ms {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        u64::deserialize(d).map(Duration::from_millis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_resolution() {
        assert_eq!(parse_resolution("2560x1440"), (2560, 1440));
        assert_eq!(parse_resolution("bogus"), (1920, 1080));
        assert_eq!(parse_resolution("1280xabc"), (1280, 1080));
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: SessionConfiguration =
            serde_json::from_str(r#"{"host":"10.0.0.2","codec":"h265","input":{"touch":true}}"#).unwrap();

        assert_eq!(config.host, "10.0.0.2");
        assert_eq!(config.codec, VideoCodec::H265);
        assert_eq!(config.fps, 60);
        assert!(config.input.touch);
        assert!(config.input.keyboard);
    }

    #[test]
    fn test_for_host_keeps_defaults() {
        let config = SessionConfiguration::for_host("192.168.1.20");
        assert_eq!(config.host, "192.168.1.20");
        assert_eq!(config.resolution_tuple(), (1920, 1080));
        assert_eq!(config.codec.as_str(), "H264");

        let json = serde_json::to_string(&config).unwrap();
        let parsed: SessionConfiguration = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, config);
    }

    #[test]
    fn test_options_duration_in_millis() {
        let options: ControllerOptions = serde_json::from_str(r#"{"stop_timeout":250}"#).unwrap();
        assert_eq!(options.stop_timeout, Duration::from_millis(250));
        assert_eq!(options.event_queue_depth, 64);

        let json = serde_json::to_string(&ControllerOptions::default()).unwrap();
        assert!(json.contains("\"stop_timeout\":5000"));
    }
}
