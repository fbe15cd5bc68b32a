use advisor_types::{ChatTurn, TurnReply};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use uuid::Uuid;

use super::{
    compose, normalize, session_key, ArtifactChannel, ArtifactPolicy, TurnError, TurnOutcome, TurnState,
    DEFAULT_SESSION,
};
use crate::agents::{RunTask, Runner};
use crate::execution::SessionLaneManager;
use crate::telemetry::{FeedbackEmitter, Recorder};

/// Turns one chat turn into exactly one runner invocation.
pub struct TurnOrchestrator {
    runner: Arc<dyn Runner>,
    recorder: Arc<Recorder>,
    artifacts: ArtifactChannel,
    lanes: Arc<SessionLaneManager>,
    policy: ArtifactPolicy,
    feedback: Option<Arc<FeedbackEmitter>>,
}

impl TurnOrchestrator {
    pub fn new(
        runner: Arc<dyn Runner>,
        recorder: Arc<Recorder>,
        artifacts: ArtifactChannel,
        lanes: Arc<SessionLaneManager>,
        policy: ArtifactPolicy,
    ) -> Self {
        Self {
            runner,
            recorder,
            artifacts,
            lanes,
            policy,
            feedback: None,
        }
    }

    /// Grade every successful turn with `emitter` before it is recorded.
    pub fn with_feedback(mut self, emitter: Arc<FeedbackEmitter>) -> Self {
        self.feedback = Some(emitter);
        self
    }

    pub fn policy(&self) -> ArtifactPolicy {
        self.policy
    }

    pub fn artifacts(&self) -> &ArtifactChannel {
        &self.artifacts
    }

    /// Handle one turn: compose the instruction, run it, and attach the
    /// session's artifact if the run produced one.
    ///
    /// The lane and the artifact slot are both keyed by the session key, so
    /// two sessions never share a slot. Runner failures are returned as-is;
    /// the recording scope is closed on every path.
    pub async fn handle(&self, turn: ChatTurn) -> Result<TurnOutcome, TurnError> {
        let turn_id = Uuid::new_v4().to_string();
        let session_id = turn
            .session_id
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .unwrap_or(DEFAULT_SESSION)
            .to_string();

        let key = session_key(&session_id);

        let _lane = self
            .lanes
            .acquire(&key)
            .await
            .ok_or_else(|| TurnError::LaneClosed(session_id.clone()))?;

        let mut state = TurnState::Idle;
        let slot = self.artifacts.slot(&key);

        if self.policy == ArtifactPolicy::ClearAndAttach {
            self.artifacts.delete(&slot).await;
            self.artifacts.prepare(&key).await;
        }

        self.transition(&turn_id, &mut state, TurnState::Composing);
        if turn.history.is_some() {
            log::debug!("[TURN] {} ignoring supplied chat history", turn_id);
        }
        let paths = normalize(&turn.files);
        let instruction = compose(&turn.text, &paths);
        log::info!(
            "[TURN] {} session={} files={} instruction_chars={}",
            turn_id,
            session_id,
            paths.len(),
            instruction.chars().count()
        );

        self.transition(&turn_id, &mut state, TurnState::Invoking);
        let scope = self.recorder.open(&turn_id, &session_id, &instruction);
        let task = RunTask::new(instruction, slot.clone()).with_recording(scope.collector());

        let output = match self.runner.run(&task).await {
            Ok(output) => output,
            Err(e) => {
                log::error!("[TURN] {} runner failed: {}", turn_id, e);
                scope.fail(&e.to_string());
                return Err(TurnError::Runner(e));
            }
        };

        self.transition(&turn_id, &mut state, TurnState::Inspecting);
        let artifact = match self.policy {
            ArtifactPolicy::NeverAttach => None,
            ArtifactPolicy::ClearAndAttach => self.inspect(output.artifact, &slot).await,
        };

        if let Some(feedback) = &self.feedback {
            feedback.evaluate(&scope.collector(), &task.instruction, &output.text).await;
        }

        let artifact_url = artifact
            .as_deref()
            .filter(|path| *path == slot.as_path())
            .map(|_| self.artifacts.url(&key));
        let artifact_str = artifact.as_ref().map(|p| p.to_string_lossy().into_owned());
        scope.succeed(&output.text, artifact_str.as_deref());

        let reply = match artifact_str {
            Some(path) => {
                log::info!("[TURN] {} attaching artifact {}", turn_id, path);
                TurnReply::WithFiles {
                    text: output.text,
                    files: vec![path],
                }
            }
            None => TurnReply::Text(output.text),
        };

        self.transition(&turn_id, &mut state, TurnState::Done);
        Ok(TurnOutcome {
            turn_id,
            session_key: key,
            reply,
            artifact_url,
        })
    }

    /// The artifact the runner reported, else whatever sits in the slot.
    async fn inspect(&self, reported: Option<PathBuf>, slot: &Path) -> Option<PathBuf> {
        if let Some(path) = reported {
            if self.artifacts.exists(&path).await {
                return Some(path);
            }
            log::warn!("[TURN] Runner reported artifact {} but it does not exist", path.display());
        }
        if self.artifacts.exists(slot).await {
            Some(slot.to_path_buf())
        } else {
            None
        }
    }

    fn transition(&self, turn_id: &str, state: &mut TurnState, next: TurnState) {
        log::debug!("[TURN] {} {} -> {}", turn_id, state.as_str(), next.as_str());
        *state = next;
    }
}
