//! Application context: everything a request handler needs, built once at startup.

use std::sync::{Arc, Weak};
use std::time::Duration;

use crate::agents::managed::AttachmentAccess;
use crate::agents::{ManagedAgent, ManagerAgent, Runner};
use crate::ai::AiClient;
use crate::config::Config;
use crate::db::Database;
use crate::execution::SessionLaneManager;
use crate::telemetry::{FeedbackEmitter, Recorder, RetentionPolicy, TelemetryStore};
use crate::tools::{ToolRegistry, WebSearchTool};
use crate::turn::{ArtifactChannel, TurnOrchestrator};
use crate::uploads::UploadStore;

/// How often stale uploads, idle lanes and expired telemetry are swept
const MAINTENANCE_INTERVAL: Duration = Duration::from_secs(10 * 60);

pub struct AppContext {
    pub config: Config,
    pub db: Arc<Database>,
    pub telemetry: Arc<TelemetryStore>,
    pub recorder: Arc<Recorder>,
    pub lanes: Arc<SessionLaneManager>,
    pub uploads: UploadStore,
    pub orchestrator: TurnOrchestrator,
}

impl AppContext {
    pub fn init(config: Config) -> Result<Arc<Self>, String> {
        log::info!("Initializing database at {}", config.database_url);
        let db = Arc::new(
            Database::new(&config.database_url)
                .map_err(|e| format!("Failed to initialize database: {}", e))?,
        );

        let telemetry = Arc::new(TelemetryStore::new(db.clone()).with_retention(RetentionPolicy {
            retention_days: config.telemetry_retention_days,
        }));
        let recorder = Arc::new(Recorder::new(config.app_id.clone(), telemetry.clone()));

        std::fs::create_dir_all(&config.upload_dir)
            .map_err(|e| format!("Failed to create upload dir {}: {}", config.upload_dir.display(), e))?;
        std::fs::create_dir_all(&config.artifact_dir)
            .map_err(|e| format!("Failed to create artifact dir {}: {}", config.artifact_dir.display(), e))?;

        let client = AiClient::from_settings(&config.ai).map_err(|e| format!("Failed to create AI client: {}", e))?;
        log::info!(
            "Using {} provider ({})",
            config.ai.provider,
            client.provider_name()
        );
        let client = Arc::new(client);

        let feedback = if config.feedback_enabled {
            log::info!("Feedback judges enabled");
            Some(Arc::new(FeedbackEmitter::new(client.clone())))
        } else {
            None
        };

        let runner = Self::build_runner(&config, client);
        Ok(Arc::new(Self::assemble(config, db, telemetry, recorder, runner, feedback)))
    }

    fn build_runner(config: &Config, client: Arc<AiClient>) -> Arc<dyn Runner> {
        let analyst = ManagedAgent::data_analyst(
            client.clone(),
            AttachmentAccess {
                upload_root: config.upload_dir.clone(),
                max_bytes: config.file_preview_bytes,
            },
        );
        let tools = Arc::new(ToolRegistry::new());
        tools.register(Arc::new(WebSearchTool::new(config.search_endpoint.clone())));
        log::info!("Tax advisor tools: {}", tools.names().join(", "));
        let advisor = ManagedAgent::tax_advisor(client.clone()).with_tools(tools, config.agent_max_tool_steps);
        let manager = ManagerAgent::new(client, vec![analyst, advisor], config.manager_max_steps);
        log::info!("Manager ready with agents: {}", manager.agent_names().join(", "));
        Arc::new(manager)
    }

    /// Wire the remaining pieces around a runner.
    pub fn assemble(
        config: Config,
        db: Arc<Database>,
        telemetry: Arc<TelemetryStore>,
        recorder: Arc<Recorder>,
        runner: Arc<dyn Runner>,
        feedback: Option<Arc<FeedbackEmitter>>,
    ) -> Self {
        let lanes = SessionLaneManager::new();
        let uploads = UploadStore::new(
            config.upload_dir.clone(),
            config.max_upload_bytes,
            config.upload_retention,
        );
        let artifacts = ArtifactChannel::new(config.artifact_dir.clone(), config.artifact_file_name.clone());
        log::info!(
            "Artifact policy {} (slot {}/<session>/{})",
            config.artifact_policy.as_str(),
            config.artifact_dir.display(),
            config.artifact_file_name
        );
        let mut orchestrator = TurnOrchestrator::new(
            runner,
            recorder.clone(),
            artifacts,
            lanes.clone(),
            config.artifact_policy,
        );
        if let Some(feedback) = feedback {
            orchestrator = orchestrator.with_feedback(feedback);
        }

        Self {
            config,
            db,
            telemetry,
            recorder,
            lanes,
            uploads,
            orchestrator,
        }
    }

    /// Sweep expired uploads, idle session lanes and old telemetry.
    pub async fn run_maintenance(&self) {
        let uploads = self.uploads.prune().await;
        let lanes = self.lanes.prune_idle_lanes();
        self.telemetry.prune();
        log::debug!("[MAINTENANCE] Removed {} upload(s), {} idle lane(s)", uploads, lanes);
    }

    /// Run maintenance now and then on every interval until the context is dropped.
    pub fn spawn_maintenance(self: &Arc<Self>) -> tokio::task::JoinHandle<()> {
        let ctx: Weak<Self> = Arc::downgrade(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(MAINTENANCE_INTERVAL);
            loop {
                ticker.tick().await;
                let Some(ctx) = ctx.upgrade() else { break };
                ctx.run_maintenance().await;
            }
        })
    }

    /// Release per-session state and report final counters.
    pub fn shutdown(&self) {
        let pruned = self.lanes.prune_idle_lanes();
        let stats = self.lanes.stats();
        log::info!(
            "Shutting down: {} turn(s) processed across {} session lane(s), {} pruned, {} recording scope(s) open",
            stats.total_turns_processed,
            stats.total_lanes,
            pruned,
            self.recorder.open_scopes()
        );
    }
}

#[cfg(test)]
mod tests {
    use crate::controllers::test_support::test_context;
    use std::time::{Duration, SystemTime};

    #[tokio::test]
    async fn test_maintenance_prunes_expired_uploads() {
        let (ctx, _dir) = test_context(vec![]);
        let old = ctx.config.upload_dir.join("old-jan.csv");
        let fresh = ctx.config.upload_dir.join("fresh-feb.csv");
        std::fs::write(&old, "Date,Amount").unwrap();
        std::fs::write(&fresh, "Date,Amount").unwrap();
        std::fs::File::options()
            .write(true)
            .open(&old)
            .unwrap()
            .set_modified(SystemTime::now() - Duration::from_secs(2 * 3600))
            .unwrap();

        ctx.run_maintenance().await;

        assert!(!old.exists());
        assert!(fresh.exists());
    }
}
