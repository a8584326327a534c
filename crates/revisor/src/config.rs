//! Project configuration file support for revisor.
//!
//! Loads configuration from `revisor.toml` in the working directory, or from
//! an explicit `--config` path.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::time::Duration;

use revisor_agent::BackendOptions;
use revisor_core::RevisionSettings;
use revisor_roles::{RetryPolicy, RoleKind};

/// Project-level configuration loaded from `revisor.toml`
#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct ProjectConfig {
    /// Backend used by every role
    pub agent: Option<String>,
    /// Default model for every role
    pub model: Option<String>,
    #[serde(default)]
    pub openai: OpenAiConfig,
    #[serde(default)]
    pub revision: RevisionConfig,
    /// Per-role overrides, keyed by role name (`semantic_reviewer`, ...)
    #[serde(default)]
    pub roles: BTreeMap<String, RoleConfig>,
    #[serde(default)]
    pub results: ResultsConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct OpenAiConfig {
    pub base_url: Option<String>,
    /// Environment variable holding the API key
    pub api_key_env: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct RevisionConfig {
    pub accept_threshold: Option<u8>,
    pub revision_cap: Option<u32>,
    pub max_steps: Option<usize>,
    pub role_retries: Option<u32>,
    pub generation_retries: Option<u32>,
    #[serde(default, with = "humantime_serde")]
    pub retry_backoff: Option<Duration>,
    #[serde(default, with = "humantime_serde")]
    pub step_timeout: Option<Duration>,
    #[serde(default, with = "humantime_serde")]
    pub request_timeout: Option<Duration>,
}

/// Configuration for a specific role
#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct RoleConfig {
    /// Model to use for this role
    pub model: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct ResultsConfig {
    pub path: Option<PathBuf>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct ServerConfig {
    pub host: Option<String>,
    pub port: Option<u16>,
}

/// The config file name
pub const CONFIG_FILE_NAME: &str = "revisor.toml";

pub const DEFAULT_HOST: &str = "0.0.0.0";
pub const DEFAULT_PORT: u16 = 8000;

impl ProjectConfig {
    /// Load configuration from the working directory.
    ///
    /// Returns:
    /// - `Ok(Some(config))` if file exists and parses successfully
    /// - `Ok(None)` if file does not exist
    /// - `Err(...)` if file exists but fails to parse (hard error)
    pub fn load(working_dir: &Path) -> Result<Option<Self>> {
        let config_path = working_dir.join(CONFIG_FILE_NAME);

        if !config_path.exists() {
            return Ok(None);
        }

        Self::load_from(&config_path).map(Some)
    }

    /// Load an explicitly named config file; a missing file is an error
    pub fn load_from(config_path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(config_path)
            .with_context(|| format!("Failed to read {}", config_path.display()))?;

        let config: ProjectConfig = toml::from_str(&content)
            .with_context(|| format!("Failed to parse {}", config_path.display()))?;

        Ok(config)
    }

    pub fn backend_options(&self) -> BackendOptions {
        let defaults = BackendOptions::default();
        BackendOptions {
            base_url: self.openai.base_url.clone().unwrap_or(defaults.base_url),
            api_key_env: self
                .openai
                .api_key_env
                .clone()
                .unwrap_or(defaults.api_key_env),
        }
    }

    /// Per-role model overrides. Unknown role names are an error.
    pub fn role_models(&self) -> Result<HashMap<RoleKind, String>> {
        let mut models = HashMap::new();
        for (name, role) in &self.roles {
            let kind: RoleKind = name
                .parse()
                .map_err(|e: String| anyhow::anyhow!("[roles.{}]: {}", name, e))?;
            if let Some(ref model) = role.model {
                models.insert(kind, model.clone());
            }
        }
        Ok(models)
    }

    /// Build validated revision settings. `model` is the CLI override.
    pub fn revision_settings(
        &self,
        model: Option<String>,
        working_dir: PathBuf,
    ) -> Result<RevisionSettings> {
        let defaults = RevisionSettings::default();
        let revision = &self.revision;

        let settings = RevisionSettings {
            accept_threshold: revision
                .accept_threshold
                .unwrap_or(defaults.accept_threshold),
            revision_cap: revision.revision_cap.unwrap_or(defaults.revision_cap),
            max_steps: revision.max_steps.unwrap_or(defaults.max_steps),
            retry: RetryPolicy {
                malformed_retries: revision
                    .role_retries
                    .unwrap_or(defaults.retry.malformed_retries),
                generation_retries: revision
                    .generation_retries
                    .unwrap_or(defaults.retry.generation_retries),
                backoff: revision.retry_backoff.unwrap_or(defaults.retry.backoff),
            },
            step_timeout: revision.step_timeout.unwrap_or(defaults.step_timeout),
            request_timeout: revision
                .request_timeout
                .unwrap_or(defaults.request_timeout),
            model: model.or_else(|| self.model.clone()),
            role_models: self.role_models()?,
            working_dir,
        };

        settings.validate()?;
        Ok(settings)
    }

    /// Results log path: CLI override > config > data directory default
    pub fn results_path(&self, cli: Option<PathBuf>) -> Result<PathBuf> {
        match cli.or_else(|| self.results.path.clone()) {
            Some(path) => Ok(path),
            None => Ok(revisor_logging::ResultsLog::default_path()?),
        }
    }

    pub fn host(&self, cli: Option<String>) -> String {
        cli.or_else(|| self.server.host.clone())
            .unwrap_or_else(|| DEFAULT_HOST.to_string())
    }

    pub fn port(&self, cli: Option<u16>) -> u16 {
        cli.or(self.server.port).unwrap_or(DEFAULT_PORT)
    }
}
