/// `load_config` module: loads the optional YAML config file and injects secrets from the environment.
///
/// This is the only place where user-supplied YAML is parsed and mapped to the
/// typed settings the commands use.
///
/// # Responsibilities
/// - Parse the YAML file into [`CliConfig`]; every section and key is optional
/// - Inject `RAGFLOW_API_KEY` (never read from YAML) and the
///   `RAGFLOW_BASE_URL` / `DSPACE_REST_URL` overrides
/// - Validate values the core cannot represent (e.g. a negative poll interval)
///
/// # Errors
/// All errors use `anyhow::Error` with the file path attached, surfaced at the CLI boundary.
use anyhow::{anyhow, Context, Result};
use ingest_ragflow_core::config::{PipelineOptions, DEFAULT_MAX_TASKS};
use ingest_ragflow_core::dspace::DEFAULT_PAGE_SIZE;
use serde::Deserialize;
use serde_json::{json, Value};
use std::fs;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, error, info};

use crate::ragflow::DatasetSettings;

pub const ENV_API_KEY: &str = "RAGFLOW_API_KEY";
pub const ENV_RAGFLOW_URL: &str = "RAGFLOW_BASE_URL";
pub const ENV_DSPACE_URL: &str = "DSPACE_REST_URL";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct CliConfig {
    pub dspace: DSpaceSection,
    pub ragflow: RagflowSection,
    pub pipeline: PipelineSection,
    pub dataset: DatasetSection,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DSpaceSection {
    pub rest_url: String,
    pub page_size: usize,
}

impl Default for DSpaceSection {
    fn default() -> Self {
        Self {
            rest_url: "https://repositorioinstitucional.uaslp.mx/rest".to_string(),
            page_size: DEFAULT_PAGE_SIZE,
        }
    }
}

#[derive(Clone, Deserialize)]
#[serde(default)]
pub struct RagflowSection {
    pub base_url: String,
    /// Injected from `RAGFLOW_API_KEY`; never read from YAML.
    #[serde(skip)]
    pub api_key: Option<String>,
}

impl Default for RagflowSection {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:9380".to_string(),
            api_key: None,
        }
    }
}

impl std::fmt::Debug for RagflowSection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RagflowSection")
            .field("base_url", &self.base_url)
            .field("api_key_set", &self.api_key.is_some())
            .finish()
    }
}

impl RagflowSection {
    pub fn require_api_key(&self) -> Result<&str> {
        self.api_key
            .as_deref()
            .ok_or_else(|| anyhow!("{ENV_API_KEY} must be set to talk to RAGFlow"))
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PipelineSection {
    pub max_tasks: usize,
    pub poll_interval_secs: f64,
    pub max_wait_secs: Option<f64>,
    pub cleanup: bool,
}

impl Default for PipelineSection {
    fn default() -> Self {
        let defaults = PipelineOptions::default();
        Self {
            max_tasks: DEFAULT_MAX_TASKS,
            poll_interval_secs: defaults.poll_interval.as_secs_f64(),
            max_wait_secs: None,
            cleanup: defaults.cleanup,
        }
    }
}

impl PipelineSection {
    pub fn to_options(&self) -> Result<PipelineOptions> {
        let poll_interval = Duration::try_from_secs_f64(self.poll_interval_secs)
            .map_err(|e| anyhow!("invalid pipeline.poll_interval_secs {}: {e}", self.poll_interval_secs))?;
        if poll_interval.is_zero() {
            return Err(anyhow!("pipeline.poll_interval_secs must be greater than zero"));
        }
        let max_wait = self
            .max_wait_secs
            .map(|secs| {
                Duration::try_from_secs_f64(secs)
                    .map_err(|e| anyhow!("invalid pipeline.max_wait_secs {secs}: {e}"))
            })
            .transpose()?;
        Ok(PipelineOptions {
            max_tasks: self.max_tasks.max(1),
            poll_interval,
            max_wait,
            cleanup: self.cleanup,
        })
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DatasetSection {
    pub name: String,
    pub embedding_model: String,
    pub chunk_method: String,
    pub parser_config: Option<Value>,
}

impl Default for DatasetSection {
    fn default() -> Self {
        Self {
            name: "test_knowledge".to_string(),
            embedding_model: "mxbai-embed-large:latest".to_string(),
            chunk_method: "naive".to_string(),
            parser_config: Some(json!({
                "chunk_token_count": 128,
                "delimiter": "\n!?;。；！？",
                "layout_recognize": true,
                "html4excel": false,
                "raptor": {"use_raptor": false}
            })),
        }
    }
}

impl DatasetSection {
    pub fn settings(&self, name_override: Option<&str>) -> DatasetSettings {
        DatasetSettings {
            name: name_override.unwrap_or(&self.name).to_string(),
            embedding_model: self.embedding_model.clone(),
            chunk_method: self.chunk_method.clone(),
            parser_config: self.parser_config.clone(),
        }
    }
}

/// Load the config at `path` (or defaults when `None`) and inject environment values.
pub fn load_config(path: Option<&Path>) -> Result<CliConfig> {
    let mut config = match path {
        Some(path) => {
            info!(config_path = ?path, "Loading configuration from file");
            let content = fs::read_to_string(path).map_err(|e| {
                error!(error = ?e, config_path = ?path, "Failed to read config file");
                anyhow!("Failed to read config file {:?}: {}", path, e)
            })?;
            let parsed: CliConfig = if content.trim().is_empty() {
                CliConfig::default()
            } else {
                serde_yaml::from_str(&content)
                    .map_err(|e| {
                        error!(error = ?e, config_path = ?path, "Failed to parse config YAML");
                        e
                    })
                    .with_context(|| format!("Failed to parse config YAML {}", path.display()))?
            };
            info!(config_path = ?path, "Parsed config YAML successfully");
            parsed
        }
        None => {
            info!("No config file given, using defaults");
            CliConfig::default()
        }
    };

    inject_env(&mut config);
    // Validate eagerly so a bad interval fails before any network call.
    config.pipeline.to_options()?;
    debug!(?config, "Config loaded (full debug)");
    Ok(config)
}

fn inject_env(config: &mut CliConfig) {
    if let Some(key) = env_non_empty(ENV_API_KEY) {
        config.ragflow.api_key = Some(key);
    }
    if let Some(url) = env_non_empty(ENV_RAGFLOW_URL) {
        config.ragflow.base_url = url;
    }
    if let Some(url) = env_non_empty(ENV_DSPACE_URL) {
        config.dspace.rest_url = url;
    }
}

fn env_non_empty(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}
