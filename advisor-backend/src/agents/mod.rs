//! Multi-agent runner for financial questions
//!
//! A manager agent decides, one step at a time, whether to hand a task to
//! one of its managed agents or to answer the user.
//!
//! ## Managed agents
//!
//! - `data_analyst` - extracts and summarizes transactions from uploaded statements
//! - `tax_advisor` - advises on Canadian (CRA) business deductions, and can
//!   search the web to check current rules
//!
//! ## Flow
//!
//! ```text
//! instruction → manager step → delegate → observation → ... → final answer
//! ```

pub mod action;
pub mod attachments;
pub mod managed;
pub mod manager;
pub mod prompts;

pub use managed::ManagedAgent;
pub use manager::ManagerAgent;

use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::Arc;

use crate::ai::AiError;
use crate::telemetry::SpanCollector;

/// One invocation of the runner.
#[derive(Debug, Clone)]
pub struct RunTask {
    /// The composed natural-language instruction
    pub instruction: String,
    /// Where an artifact for this turn should be written, if the runner makes one
    pub artifact_slot: PathBuf,
    /// Collector of the enclosing recording scope
    pub recording: Option<Arc<SpanCollector>>,
}

impl RunTask {
    pub fn new(instruction: impl Into<String>, artifact_slot: impl Into<PathBuf>) -> Self {
        Self {
            instruction: instruction.into(),
            artifact_slot: artifact_slot.into(),
            recording: None,
        }
    }

    pub fn with_recording(mut self, collector: Arc<SpanCollector>) -> Self {
        self.recording = Some(collector);
        self
    }
}

/// What the runner hands back: the answer and, optionally, a produced file.
#[derive(Debug, Clone, PartialEq)]
pub struct RunOutput {
    pub text: String,
    pub artifact: Option<PathBuf>,
}

impl RunOutput {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            artifact: None,
        }
    }
}

/// The delegation layer that turns an instruction into an answer.
#[async_trait]
pub trait Runner: Send + Sync {
    async fn run(&self, task: &RunTask) -> Result<RunOutput, AiError>;
}
