//! Session Controller Application Layer
//!
//! Configuration, session state and the controller that drives a session.

pub mod config;
pub mod controller;
pub mod session;

pub use config::{
    parse_resolution, AudioConfiguration, ControllerOptions, InputCapabilities, SessionConfiguration, VideoCodec,
};
pub use controller::{SessionController, CONNECT_STAGE};
pub use session::{SessionError, SessionLifecycle, SessionState, TerminationReason};
