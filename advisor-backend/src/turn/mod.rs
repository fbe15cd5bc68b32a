//! Chat turn handling
//!
//! A turn is one user message plus its uploaded files. It is turned into a
//! single instruction for the runner, and the runner's answer is returned
//! together with any artifact it left in the session's artifact slot.
//!
//! ```text
//! ChatTurn → normalize → compose → Runner::run → inspect slot → TurnReply
//! ```

pub mod artifacts;
pub mod compose;
pub mod files;
pub mod orchestrator;


pub use artifacts::{is_session_key, session_key, ArtifactChannel, ARTIFACT_URL_PREFIX};
pub use compose::compose;
pub use files::normalize;
pub use orchestrator::TurnOrchestrator;

use advisor_types::TurnReply;
use std::fmt;

use crate::ai::AiError;

/// Session used when a turn does not name one
pub const DEFAULT_SESSION: &str = "web";

/// What happens to the artifact slot around a turn.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ArtifactPolicy {
    /// Delete any stale artifact before the run and attach a fresh one after it
    #[default]
    ClearAndAttach,
    /// Leave the slot alone and always reply with plain text
    NeverAttach,
}

impl ArtifactPolicy {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "clear_and_attach" => Some(ArtifactPolicy::ClearAndAttach),
            "never_attach" => Some(ArtifactPolicy::NeverAttach),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ArtifactPolicy::ClearAndAttach => "clear_and_attach",
            ArtifactPolicy::NeverAttach => "never_attach",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnState {
    Idle,
    Composing,
    Invoking,
    Inspecting,
    Done,
}

impl TurnState {
    pub fn as_str(&self) -> &'static str {
        match self {
            TurnState::Idle => "idle",
            TurnState::Composing => "composing",
            TurnState::Invoking => "invoking",
            TurnState::Inspecting => "inspecting",
            TurnState::Done => "done",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TurnOutcome {
    pub turn_id: String,
    /// Directory and URL segment of the turn's session, see [`session_key`]
    pub session_key: String,
    pub reply: TurnReply,
    /// Set when the attached artifact is the session slot, which the
    /// artifacts route can serve
    pub artifact_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TurnError {
    /// The runner failed; nothing was retried
    Runner(AiError),
    /// The session lane could not be acquired
    LaneClosed(String),
}

impl fmt::Display for TurnError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TurnError::Runner(e) => write!(f, "Agent run failed: {}", e),
            TurnError::LaneClosed(session) => write!(f, "Session {} is not accepting turns", session),
        }
    }
}

impl std::error::Error for TurnError {}

impl From<AiError> for TurnError {
    fn from(e: AiError) -> Self {
        TurnError::Runner(e)
    }
}
