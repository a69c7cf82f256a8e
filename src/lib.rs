//! Stream Session
//!
//! Session controller for a remote video-streaming client: connects through a
//! pluggable connection layer, relays decoded frames to a presentation sink
//! and reports live stream statistics.

pub mod app;
pub mod connection;
pub mod media;
pub mod stats;
pub mod utils;

#[cfg(test)]
mod test_support;

pub use app::{
    ControllerOptions, SessionConfiguration, SessionController, SessionError, SessionLifecycle, SessionState,
    TerminationReason, VideoCodec,
};
pub use connection::{ConnectionEvents, ConnectionFacade, ConnectionStatus, SyntheticConnection};
pub use media::{PresentResult, PresentationSink, SharedFrame, VideoFrame};
pub use stats::{StatsAggregator, StatsSample, StatsSnapshot};
