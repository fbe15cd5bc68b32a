use std::env;
use std::path::PathBuf;
use std::time::Duration;

use crate::ai::{AiProvider, AiSettings, RetryPolicy};
use crate::tools::DEFAULT_SEARCH_ENDPOINT;
use crate::turn::ArtifactPolicy;

/// Application id the recorder tags every turn record with
pub const DEFAULT_APP_ID: &str = "Canadian_Financial_Advisor_v1";

#[derive(Clone, Debug)]
pub struct Config {
    pub port: u16,
    pub database_url: String,
    pub upload_dir: PathBuf,
    /// Largest single uploaded file accepted, in bytes
    pub max_upload_bytes: usize,
    /// Uploads older than this are removed by the maintenance sweep
    pub upload_retention: Duration,
    pub artifact_dir: PathBuf,
    pub artifact_file_name: String,
    pub artifact_policy: ArtifactPolicy,
    pub app_id: String,
    pub manager_max_steps: usize,
    /// Tool calls a managed agent may make before it must answer
    pub agent_max_tool_steps: usize,
    /// Max bytes of each uploaded file inlined into the data analyst prompt
    pub file_preview_bytes: usize,
    pub telemetry_retention_days: u64,
    pub feedback_enabled: bool,
    pub search_endpoint: String,
    pub frontend_dir: Option<PathBuf>,
    pub ai: AiSettings,
}

impl Config {
    pub fn from_env() -> Result<Self, String> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Build the configuration from any variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, String> {
        let var = |name: &str, default: &str| lookup(name).unwrap_or_else(|| default.to_string());

        let provider_name = var("AI_PROVIDER", "huggingface");
        let provider = AiProvider::from_str(&provider_name)
            .ok_or_else(|| format!("AI_PROVIDER must be one of huggingface, openai, claude (got {})", provider_name))?;

        let api_key = lookup("AI_API_KEY").or_else(|| lookup("HF_TOKEN")).unwrap_or_default();

        let artifact_policy = match lookup("ARTIFACT_POLICY") {
            Some(s) => ArtifactPolicy::from_str(&s)
                .ok_or_else(|| format!("ARTIFACT_POLICY must be clear_and_attach or never_attach (got {})", s))?,
            None => ArtifactPolicy::default(),
        };

        let feedback_enabled = match lookup("FEEDBACK_ENABLED") {
            Some(s) => parse_bool(&s).ok_or_else(|| format!("FEEDBACK_ENABLED must be true or false (got {})", s))?,
            None => true,
        };

        Ok(Self {
            port: parse_var(&lookup, "PORT", 7860)?,
            database_url: var("DATABASE_URL", "./.db/advisor.db"),
            upload_dir: var("UPLOAD_DIR", "./.uploads").into(),
            max_upload_bytes: parse_var(&lookup, "MAX_UPLOAD_BYTES", 20 * 1024 * 1024)?,
            upload_retention: Duration::from_secs(parse_var::<u64>(&lookup, "UPLOAD_RETENTION_HOURS", 24)? * 3600),
            artifact_dir: var("ARTIFACT_DIR", "./.artifacts").into(),
            artifact_file_name: var("ARTIFACT_FILE_NAME", "activity_plot.png"),
            artifact_policy,
            app_id: var("APP_ID", DEFAULT_APP_ID),
            manager_max_steps: parse_var(&lookup, "MANAGER_MAX_STEPS", 6)?,
            agent_max_tool_steps: parse_var(&lookup, "AGENT_MAX_TOOL_STEPS", 3)?,
            file_preview_bytes: parse_var(&lookup, "FILE_PREVIEW_BYTES", 16 * 1024)?,
            telemetry_retention_days: parse_var(&lookup, "TELEMETRY_RETENTION_DAYS", 30)?,
            feedback_enabled,
            search_endpoint: var("SEARCH_ENDPOINT", DEFAULT_SEARCH_ENDPOINT),
            frontend_dir: lookup("FRONTEND_DIR").map(PathBuf::from),
            ai: AiSettings {
                provider,
                api_key,
                endpoint: lookup("AI_ENDPOINT"),
                model: lookup("AI_MODEL"),
                max_tokens: parse_var(&lookup, "AI_MAX_TOKENS", 4096)?,
                retry: RetryPolicy {
                    max_retries: parse_var(&lookup, "AI_MAX_RETRIES", RetryPolicy::DEFAULT_MAX_RETRIES)?,
                    base_delay: Duration::from_millis(parse_var(
                        &lookup,
                        "AI_RETRY_BASE_MS",
                        RetryPolicy::DEFAULT_BASE_DELAY_MS,
                    )?),
                },
            },
        })
    }
}

fn parse_var<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    name: &str,
    default: T,
) -> Result<T, String> {
    match lookup(name) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| format!("{} must be a valid number (got {})", name, raw)),
        None => Ok(default),
    }
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
