// SPDX-License-Identifier: GPL-3.0-or-later

//! Layered configuration, mirroring `chorrosion-config`'s
//! defaults-then-file-then-env figment stack, plus the tag-writer-backend
//! precedence rules ported from the original `resonance/settings.py`.

use std::path::{Path, PathBuf};

use figment::providers::{Env, Format, Serialized, Toml};
use figment::Figment;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

pub const DEFAULT_TAG_WRITER_BACKEND: &str = "meta-json";
pub const ALLOWED_TAG_WRITER_BACKENDS: [&str; 2] = ["meta-json", "mutagen"];
pub const DEFAULT_SCORING_VERSION: &str = "v1";
pub const DEFAULT_CONFLICT_POLICY: &str = "FAIL";

const ENV_PREFIX: &str = "RESONANCE_";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("unsupported tag writer backend: {0}")]
    UnsupportedTagWriterBackend(String),
    #[error("unsupported plan conflict policy: {0} (only FAIL is implemented)")]
    UnsupportedConflictPolicy(String),
    #[error("unknown settings hash stage: {0}")]
    UnknownHashStage(String),
    #[error("failed to load configuration: {0}")]
    Load(#[from] figment::Error),
}

pub type Result<T> = std::result::Result<T, ConfigError>;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProvidersConfig {
    pub acoustid_api_key: Option<String>,
    pub discogs_token: Option<String>,
    #[serde(default = "default_provider_priority")]
    pub provider_priority: Vec<String>,
}

impl Default for ProvidersConfig {
    fn default() -> Self {
        Self {
            acoustid_api_key: None,
            discogs_token: None,
            provider_priority: default_provider_priority(),
        }
    }
}

fn default_provider_priority() -> Vec<String> {
    vec!["musicbrainz".to_string(), "discogs".to_string()]
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub state_db_path: PathBuf,
    pub cache_db_path: PathBuf,
    pub tag_writer_backend: String,
    pub identify_scoring_version: String,
    pub plan_conflict_policy: String,
    pub providers: ProvidersConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            state_db_path: PathBuf::from("resonance-state.db"),
            cache_db_path: PathBuf::from("resonance-cache.db"),
            tag_writer_backend: DEFAULT_TAG_WRITER_BACKEND.to_string(),
            identify_scoring_version: DEFAULT_SCORING_VERSION.to_string(),
            plan_conflict_policy: DEFAULT_CONFLICT_POLICY.to_string(),
            providers: ProvidersConfig::default(),
        }
    }
}

/// Default path for a user-level settings file, `~/.config/resonance/settings.toml`.
pub fn default_config_path() -> Option<PathBuf> {
    dirs_home().map(|home| home.join(".config").join("resonance").join("settings.toml"))
}

fn dirs_home() -> Option<PathBuf> {
    std::env::var_os("HOME").map(PathBuf::from)
}

/// Load configuration from built-in defaults, an optional TOML file, and
/// environment overrides (prefix `RESONANCE_`, `__` as the nesting separator).
pub fn load(config_path: Option<&Path>) -> Result<AppConfig> {
    let mut figment = Figment::from(Serialized::defaults(AppConfig::default()));

    if let Some(path) = config_path {
        figment = figment.merge(Toml::file(path));
    }

    figment = figment.merge(Env::prefixed(ENV_PREFIX).split("__"));

    let config: AppConfig = figment.extract()?;
    validate_conflict_policy(&config.plan_conflict_policy)?;
    validate_tag_writer_backend(&config.tag_writer_backend)?;
    info!(target: "config", backend = %config.tag_writer_backend, "configuration loaded");
    Ok(config)
}

fn validate_tag_writer_backend(backend: &str) -> Result<()> {
    if ALLOWED_TAG_WRITER_BACKENDS.contains(&backend) {
        Ok(())
    } else {
        Err(ConfigError::UnsupportedTagWriterBackend(backend.to_string()))
    }
}

/// Only `FAIL` is implemented (see §9 Open Questions: `RENAME` exists as a
/// declared value in the original settings schema but no applier branch
/// implements it). Reject anything else at load time rather than silently
/// falling back.
fn validate_conflict_policy(policy: &str) -> Result<()> {
    if policy == DEFAULT_CONFLICT_POLICY {
        Ok(())
    } else {
        Err(ConfigError::UnsupportedConflictPolicy(policy.to_string()))
    }
}

/// Resolve the effective tag-writer backend from CLI flag, environment
/// variable, and config-file value, in that precedence order. Ported from
/// `resonance/settings.py::resolve_tag_writer_backend` — the allowed-set
/// validation has to apply identically no matter which layer supplied the
/// value, so it isn't folded into the generic figment merge.
pub fn resolve_tag_writer_backend(
    cli_backend: Option<&str>,
    env_backend: Option<&str>,
    config_backend: &str,
) -> Result<String> {
    let backend = cli_backend
        .filter(|b| !b.is_empty())
        .or_else(|| env_backend.filter(|b| !b.is_empty()))
        .unwrap_or(config_backend);
    if ALLOWED_TAG_WRITER_BACKENDS.contains(&backend) {
        Ok(backend.to_string())
    } else {
        Err(ConfigError::UnsupportedTagWriterBackend(backend.to_string()))
    }
}

/// A stable hash of the settings fields relevant to a given pipeline stage,
/// used to detect config drift between runs. Ported from
/// `resonance/settings.py::settings_hash`.
pub fn settings_hash(config: &AppConfig, stage: &str) -> Result<String> {
    use sha2::{Digest, Sha256};

    let payload = match stage {
        "identify" => serde_json::json!({ "identify_scoring_version": config.identify_scoring_version }),
        "plan" => serde_json::json!({ "plan_conflict_policy": config.plan_conflict_policy }),
        "apply" => serde_json::json!({ "tag_writer_backend": config.tag_writer_backend }),
        other => return Err(ConfigError::UnknownHashStage(other.to_string())),
    };
    let serialized = canonical_json(&payload);
    let mut hasher = Sha256::new();
    hasher.update(serialized.as_bytes());
    Ok(format!("{:x}", hasher.finalize()))
}

fn canonical_json(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            let parts: Vec<String> = keys
                .into_iter()
                .map(|k| format!("{}:{}", serde_json::to_string(k).unwrap(), canonical_json(&map[k])))
                .collect();
            format!("{{{}}}", parts.join(","))
        }
        other => serde_json::to_string(other).unwrap(),
    }
}
