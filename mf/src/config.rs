//! ModelFlow configuration types and loading

use eyre::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::graph::WorkflowLimits;
use crate::llm::{Credentials, LlmError};
use crate::stages::Stage;

/// Main ModelFlow configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// LLM provider configuration
    pub llm: LlmConfig,

    /// PlantUML renderer configuration
    pub renderer: RendererConfig,

    /// Pipeline shape and loop bounds
    pub workflow: WorkflowConfig,

    /// Log level (trace, debug, info, warn, error); RUST_LOG wins when set
    #[serde(rename = "log-level")]
    pub log_level: Option<String>,

    /// Directory for per-run JSONL event logs
    #[serde(rename = "runs-dir")]
    pub runs_dir: Option<PathBuf>,
}

impl Config {
    /// Validate configuration before use
    ///
    /// Call this early in startup to fail fast with clear error messages.
    pub fn validate(&self) -> Result<()> {
        self.llm.resolve().map_err(|e| eyre::eyre!("{}", e))?;

        if self.workflow.end_stage < self.workflow.start_stage {
            return Err(eyre::eyre!(
                "workflow end-stage '{}' comes before start-stage '{}'",
                self.workflow.end_stage,
                self.workflow.start_stage
            ));
        }
        if self.workflow.max_steps == 0 {
            return Err(eyre::eyre!("workflow max-steps must be greater than zero"));
        }
        if self.renderer.server_url.trim().is_empty() {
            return Err(eyre::eyre!("renderer server-url must not be empty"));
        }
        Ok(())
    }

    /// Directory where run event logs are written
    pub fn runs_dir(&self) -> PathBuf {
        self.runs_dir.clone().unwrap_or_else(|| {
            dirs::data_local_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("modelflow")
                .join("runs")
        })
    }

    /// Load configuration with fallback chain
    pub fn load(config_path: Option<&PathBuf>) -> Result<Self> {
        // If explicit config path provided, try to load it
        if let Some(path) = config_path {
            return Self::load_from_file(path).context(format!("Failed to load config from {}", path.display()));
        }

        // Try project-local config: .modelflow.yml
        let local_config = PathBuf::from(".modelflow.yml");
        if local_config.exists() {
            match Self::load_from_file(&local_config) {
                Ok(config) => return Ok(config),
                Err(e) => {
                    tracing::warn!("Failed to load config from {}: {}", local_config.display(), e);
                }
            }
        }

        // Try user config: ~/.config/modelflow/modelflow.yml
        if let Some(config_dir) = dirs::config_dir() {
            let user_config = config_dir.join("modelflow").join("modelflow.yml");
            if user_config.exists() {
                match Self::load_from_file(&user_config) {
                    Ok(config) => return Ok(config),
                    Err(e) => {
                        tracing::warn!("Failed to load config from {}: {}", user_config.display(), e);
                    }
                }
            }
        }

        tracing::info!("No config file found, using defaults");
        Ok(Self::default())
    }

    /// Peek at the configured log level before logging is set up
    pub fn load_log_level(config_path: Option<&PathBuf>) -> Option<String> {
        let candidates = match config_path {
            Some(path) => vec![path.clone()],
            None => {
                let mut paths = vec![PathBuf::from(".modelflow.yml")];
                if let Some(config_dir) = dirs::config_dir() {
                    paths.push(config_dir.join("modelflow").join("modelflow.yml"));
                }
                paths
            }
        };

        candidates
            .iter()
            .find(|p| p.exists())
            .and_then(|p| fs::read_to_string(p).ok())
            .and_then(|content| serde_yaml::from_str::<Self>(&content).ok())
            .and_then(|config| config.log_level)
    }

    fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path).context("Failed to read config file")?;

        let config: Self = serde_yaml::from_str(&content).context("Failed to parse config file")?;

        tracing::info!("Loaded config from: {}", path.as_ref().display());
        Ok(config)
    }
}

/// LLM provider configuration
///
/// Unset fields fall back to the provider's defaults at resolve time.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// Provider name: openai, ollama or google
    pub provider: String,

    /// Model identifier
    pub model: Option<String>,

    /// Environment variable containing the API key
    #[serde(rename = "api-key-env")]
    pub api_key_env: Option<String>,

    /// API base URL, including the version path
    #[serde(rename = "base-url")]
    pub base_url: Option<String>,

    /// Maximum tokens per response
    #[serde(rename = "max-tokens")]
    pub max_tokens: u32,

    /// Request timeout in milliseconds
    #[serde(rename = "timeout-ms")]
    pub timeout_ms: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: "google".to_string(),
            model: None,
            api_key_env: None,
            base_url: None,
            max_tokens: 8192,
            timeout_ms: 120_000,
        }
    }
}

/// Per-provider defaults: (model, base url, api key env var)
fn provider_defaults(provider: &str) -> Option<(&'static str, &'static str, Option<&'static str>)> {
    match provider {
        "openai" => Some(("gpt-4o-mini", "https://api.openai.com/v1", Some("OPENAI_API_KEY"))),
        "ollama" => Some(("llama3.1:8b", "http://localhost:11434/v1", None)),
        "google" => Some((
            "gemini-2.5-flash",
            "https://generativelanguage.googleapis.com/v1beta/openai",
            Some("GOOGLE_API_KEY"),
        )),
        _ => None,
    }
}

impl LlmConfig {
    /// Fill unset fields from the provider defaults
    pub fn resolve(&self) -> Result<ResolvedLlmConfig, LlmError> {
        let (model, base_url, api_key_env) =
            provider_defaults(&self.provider).ok_or_else(|| LlmError::UnknownProvider(self.provider.clone()))?;

        Ok(ResolvedLlmConfig {
            provider: self.provider.clone(),
            model: self.model.clone().unwrap_or_else(|| model.to_string()),
            base_url: self.base_url.clone().unwrap_or_else(|| base_url.to_string()),
            api_key_env: self.api_key_env.clone().or_else(|| api_key_env.map(str::to_string)),
            max_tokens: self.max_tokens,
            timeout_ms: self.timeout_ms,
        })
    }
}

/// LLM configuration with every provider default applied
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedLlmConfig {
    pub provider: String,
    pub model: String,
    pub base_url: String,
    pub api_key_env: Option<String>,
    pub max_tokens: u32,
    pub timeout_ms: u64,
}

impl ResolvedLlmConfig {
    /// Pick the API key: explicit credentials first, then the environment
    ///
    /// Returns `Ok(None)` for providers that need no key.
    pub fn get_api_key(&self, credentials: &Credentials) -> Result<Option<String>, LlmError> {
        if let Some(key) = &credentials.api_key {
            return Ok(Some(key.clone()));
        }
        match &self.api_key_env {
            Some(env_var) => std::env::var(env_var)
                .map(Some)
                .map_err(|_| LlmError::MissingApiKey {
                    env_var: env_var.clone(),
                }),
            None => Ok(None),
        }
    }
}

/// PlantUML rendering configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RendererConfig {
    /// PlantUML server base URL
    #[serde(rename = "server-url")]
    pub server_url: String,

    /// Directory the rendered PNG is written to
    #[serde(rename = "output-dir")]
    pub output_dir: PathBuf,

    /// Request timeout in milliseconds
    #[serde(rename = "timeout-ms")]
    pub timeout_ms: u64,
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self {
            server_url: "https://www.plantuml.com/plantuml".to_string(),
            output_dir: PathBuf::from("."),
            timeout_ms: 30_000,
        }
    }
}

/// Pipeline shape and loop bounds
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkflowConfig {
    /// Stage the pipeline starts from
    #[serde(rename = "start-stage")]
    pub start_stage: Stage,

    /// Last stage the pipeline runs
    #[serde(rename = "end-stage")]
    pub end_stage: Stage,

    /// Ask for confirmation before moving to the next stage
    #[serde(rename = "confirm-between-stages")]
    pub confirm_between_stages: bool,

    /// Upper bound on node executions per run
    #[serde(rename = "max-steps")]
    pub max_steps: u64,

    /// Corrector visits allowed before a render failure aborts the run (0 = unbounded)
    #[serde(rename = "max-render-attempts")]
    pub max_render_attempts: u32,

    /// Rejections allowed per acceptance gate (0 = unbounded)
    #[serde(rename = "max-rejections")]
    pub max_rejections: u32,

    /// Clarification rounds per generation node (0 = unbounded)
    #[serde(rename = "max-clarifications")]
    pub max_clarifications: u32,

    /// Critique rounds per critic node (0 = unbounded)
    #[serde(rename = "max-critique-rounds")]
    pub max_critique_rounds: u32,
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        let limits = WorkflowLimits::default();
        Self {
            start_stage: Stage::UseCaseDiagram,
            end_stage: Stage::ActivityModel,
            confirm_between_stages: true,
            max_steps: limits.max_steps,
            max_render_attempts: limits.max_render_attempts,
            max_rejections: limits.max_rejections,
            max_clarifications: limits.max_clarifications,
            max_critique_rounds: limits.max_critique_rounds,
        }
    }
}

impl WorkflowConfig {
    pub fn limits(&self) -> WorkflowLimits {
        WorkflowLimits {
            max_steps: self.max_steps,
            max_render_attempts: self.max_render_attempts,
            max_rejections: self.max_rejections,
            max_clarifications: self.max_clarifications,
            max_critique_rounds: self.max_critique_rounds,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();

        assert_eq!(config.llm.provider, "google");
        assert_eq!(config.workflow.start_stage, Stage::UseCaseDiagram);
        assert_eq!(config.workflow.end_stage, Stage::ActivityModel);
        assert!(config.workflow.confirm_between_stages);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_resolve_applies_provider_defaults() {
        let config = LlmConfig {
            provider: "openai".to_string(),
            ..Default::default()
        };
        let resolved = config.resolve().unwrap();

        assert_eq!(resolved.model, "gpt-4o-mini");
        assert_eq!(resolved.base_url, "https://api.openai.com/v1");
        assert_eq!(resolved.api_key_env.as_deref(), Some("OPENAI_API_KEY"));
    }

    #[test]
    fn test_resolve_keeps_overrides() {
        let config = LlmConfig {
            provider: "ollama".to_string(),
            model: Some("qwen2.5".to_string()),
            base_url: Some("http://gpu-box:11434/v1".to_string()),
            ..Default::default()
        };
        let resolved = config.resolve().unwrap();

        assert_eq!(resolved.model, "qwen2.5");
        assert_eq!(resolved.base_url, "http://gpu-box:11434/v1");
        assert_eq!(resolved.api_key_env, None);
    }

    #[test]
    fn test_explicit_credentials_win() {
        let resolved = LlmConfig {
            api_key_env: Some("MODELFLOW_TEST_UNSET_VARIABLE".to_string()),
            ..Default::default()
        }
        .resolve()
        .unwrap();

        assert_eq!(
            resolved.get_api_key(&Credentials::new("sk-explicit")).unwrap().as_deref(),
            Some("sk-explicit")
        );
        assert!(matches!(
            resolved.get_api_key(&Credentials::from_env()),
            Err(LlmError::MissingApiKey { .. })
        ));
    }

    #[test]
    fn test_deserialize_config() {
        let yaml = r#"
llm:
  provider: openai
  model: gpt-4o
  api-key-env: MY_API_KEY
  max-tokens: 4096

renderer:
  server-url: http://localhost:8080
  output-dir: /tmp/diagrams

workflow:
  start-stage: sad
  end-stage: adm
  confirm-between-stages: false
  max-critique-rounds: 1

log-level: debug
"#;

        let config: Config = serde_yaml::from_str(yaml).unwrap();

        assert_eq!(config.llm.model.as_deref(), Some("gpt-4o"));
        assert_eq!(config.llm.api_key_env.as_deref(), Some("MY_API_KEY"));
        assert_eq!(config.llm.max_tokens, 4096);
        assert_eq!(config.renderer.server_url, "http://localhost:8080");
        assert_eq!(config.workflow.start_stage, Stage::ScenarioActivity);
        assert_eq!(config.workflow.end_stage, Stage::ActivityModel);
        assert!(!config.workflow.confirm_between_stages);
        assert_eq!(config.workflow.limits().max_critique_rounds, 1);
        assert_eq!(config.log_level.as_deref(), Some("debug"));
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let yaml = r#"
workflow:
  max-steps: 42
"#;

        let config: Config = serde_yaml::from_str(yaml).unwrap();

        assert_eq!(config.workflow.max_steps, 42);
        assert_eq!(config.llm.provider, "google");
        assert_eq!(config.renderer.timeout_ms, 30_000);
    }

    #[test]
    fn test_validate_rejects_reversed_stages() {
        let mut config = Config::default();
        config.workflow.start_stage = Stage::ActivityModel;
        config.workflow.end_stage = Stage::UseCaseDiagram;
        assert!(config.validate().is_err());
    }
}
