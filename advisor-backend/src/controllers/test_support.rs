//! Shared fixtures for controller tests.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

use crate::agents::{RunOutput, RunTask, Runner};
use crate::ai::{AiError, AiProvider, AiSettings, RetryPolicy};
use crate::config::Config;
use crate::context::AppContext;
use crate::db::Database;
use crate::telemetry::{Recorder, TelemetryStore};
use crate::turn::ArtifactPolicy;

/// Replies with queued results and remembers every instruction it got.
pub struct QueuedRunner {
    replies: Mutex<VecDeque<Result<String, AiError>>>,
    pub instructions: Mutex<Vec<String>>,
}

#[async_trait]
impl Runner for QueuedRunner {
    async fn run(&self, task: &RunTask) -> Result<RunOutput, AiError> {
        self.instructions.lock().push(task.instruction.clone());
        let next = self.replies.lock().pop_front();
        next.unwrap_or_else(|| Err(AiError::new("no queued reply")))
            .map(RunOutput::text)
    }
}

pub fn test_config(dir: &TempDir) -> Config {
    Config {
        port: 0,
        database_url: ":memory:".to_string(),
        upload_dir: dir.path().join("uploads"),
        max_upload_bytes: 1024,
        upload_retention: Duration::from_secs(3600),
        artifact_dir: dir.path().join("artifacts"),
        artifact_file_name: "activity_plot.png".to_string(),
        artifact_policy: ArtifactPolicy::ClearAndAttach,
        app_id: "test-app".to_string(),
        manager_max_steps: 3,
        agent_max_tool_steps: 2,
        file_preview_bytes: 1024,
        telemetry_retention_days: 30,
        feedback_enabled: false,
        search_endpoint: "http://127.0.0.1:9/html/".to_string(),
        frontend_dir: None,
        ai: AiSettings {
            provider: AiProvider::OpenAI,
            api_key: String::new(),
            endpoint: None,
            model: None,
            max_tokens: 256,
            retry: RetryPolicy {
                max_retries: 0,
                base_delay: Duration::ZERO,
            },
        },
    }
}

/// Context over an in-memory database around any runner.
pub fn context_around(runner: Arc<dyn Runner>) -> (Arc<AppContext>, TempDir) {
    let dir = TempDir::new().expect("temp dir");
    let config = test_config(&dir);
    std::fs::create_dir_all(&config.upload_dir).expect("upload dir");

    let db = Arc::new(Database::new(":memory:").expect("in-memory db"));
    let telemetry = Arc::new(TelemetryStore::new(db.clone()));
    let recorder = Arc::new(Recorder::new(config.app_id.clone(), telemetry.clone()));

    let ctx = AppContext::assemble(config, db, telemetry, recorder, runner, None);
    (Arc::new(ctx), dir)
}

/// Context over an in-memory database and a queued runner.
pub fn test_context_with_runner(replies: Vec<Result<String, AiError>>) -> (Arc<AppContext>, Arc<QueuedRunner>, TempDir) {
    let runner = Arc::new(QueuedRunner {
        replies: Mutex::new(replies.into()),
        instructions: Mutex::new(Vec::new()),
    });
    let (ctx, dir) = context_around(runner.clone());
    (ctx, runner, dir)
}

pub fn test_context(replies: Vec<Result<String, AiError>>) -> (Arc<AppContext>, TempDir) {
    let (ctx, _runner, dir) = test_context_with_runner(replies);
    (ctx, dir)
}
