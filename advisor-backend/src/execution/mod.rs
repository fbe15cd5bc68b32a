//! Per-session serialization of chat turns.

mod session_lanes;

pub use session_lanes::{SessionLaneGuard, SessionLaneManager, SessionLaneStats};
