// SPDX-License-Identifier: MIT

//! Engine configuration from environment variables

use crate::adk::error::EngineError;
use crate::adk::model::openai::DEFAULT_BASE_URL;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_MODEL: &str = "gpt-4o-mini";
pub const DEFAULT_SCAN_INTERVAL_MS: u64 = 1000;
pub const DEFAULT_CODE_TIMEOUT_MS: u64 = 5000;
pub const DEFAULT_MAX_STEPS: usize = 500;

/// Name of the engine's directory inside the vault
pub const ENGINE_DIR: &str = ".vaultflow";

/// The three queue-file pipelines
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QueueKind {
    Generate,
    Edit,
    Chat,
}

impl QueueKind {
    pub const ALL: [QueueKind; 3] = [QueueKind::Generate, QueueKind::Edit, QueueKind::Chat];

    pub fn dir_name(&self) -> &'static str {
        match self {
            QueueKind::Generate => "generate",
            QueueKind::Edit => "edit",
            QueueKind::Chat => "chat",
        }
    }
}

impl std::fmt::Display for QueueKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.dir_name())
    }
}

/// Every directory the engine reads or writes under a vault
#[derive(Debug, Clone)]
pub struct VaultPaths {
    root: PathBuf,
}

impl VaultPaths {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn engine_dir(&self) -> PathBuf {
        self.root.join(ENGINE_DIR)
    }

    pub fn queue_dir(&self, kind: QueueKind) -> PathBuf {
        self.engine_dir().join("queue").join(kind.dir_name())
    }

    pub fn results_dir(&self, kind: QueueKind) -> PathBuf {
        self.engine_dir().join("results").join(kind.dir_name())
    }

    pub fn workflows_dir(&self) -> PathBuf {
        self.engine_dir().join("workflows")
    }

    /// Create every directory that does not exist yet
    pub async fn ensure(&self) -> Result<(), EngineError> {
        for kind in QueueKind::ALL {
            tokio::fs::create_dir_all(self.queue_dir(kind)).await?;
            tokio::fs::create_dir_all(self.results_dir(kind)).await?;
        }
        tokio::fs::create_dir_all(self.workflows_dir()).await?;
        Ok(())
    }
}

/// Runtime settings for the engine
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub vault: PathBuf,
    pub model: String,
    pub api_key: Option<String>,
    pub base_url: String,
    pub scan_interval: Duration,
    pub code_timeout: Duration,
    pub max_steps: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            vault: PathBuf::from("."),
            model: DEFAULT_MODEL.to_string(),
            api_key: None,
            base_url: DEFAULT_BASE_URL.to_string(),
            scan_interval: Duration::from_millis(DEFAULT_SCAN_INTERVAL_MS),
            code_timeout: Duration::from_millis(DEFAULT_CODE_TIMEOUT_MS),
            max_steps: DEFAULT_MAX_STEPS,
        }
    }
}

impl EngineConfig {
    /// Read configuration from the process environment
    pub fn from_env() -> Result<Self, EngineError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read configuration through `lookup`, treating empty values as unset
    pub fn from_lookup<F>(lookup: F) -> Result<Self, EngineError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let defaults = Self::default();

        let number = |key: &str, default: u64| -> Result<u64, EngineError> {
            match get(key) {
                Some(raw) => raw.trim().parse::<u64>().map_err(|_| {
                    EngineError::config(format!("{} must be a whole number, got '{}'", key, raw))
                }),
                None => Ok(default),
            }
        };

        let max_steps = number("VAULTFLOW_MAX_STEPS", DEFAULT_MAX_STEPS as u64)?;
        if max_steps == 0 {
            return Err(EngineError::config("VAULTFLOW_MAX_STEPS must be at least 1"));
        }

        Ok(Self {
            vault: get("VAULTFLOW_VAULT")
                .map(PathBuf::from)
                .unwrap_or(defaults.vault),
            model: get("VAULTFLOW_MODEL").unwrap_or(defaults.model),
            api_key: get("OPENAI_API_KEY"),
            base_url: get("OPENAI_BASE_URL").unwrap_or(defaults.base_url),
            scan_interval: Duration::from_millis(number(
                "VAULTFLOW_SCAN_INTERVAL_MS",
                DEFAULT_SCAN_INTERVAL_MS,
            )?),
            code_timeout: Duration::from_millis(number(
                "VAULTFLOW_CODE_TIMEOUT_MS",
                DEFAULT_CODE_TIMEOUT_MS,
            )?),
            max_steps: max_steps as usize,
        })
    }

    pub fn paths(&self) -> VaultPaths {
        VaultPaths::new(&self.vault)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = EngineConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config.model, DEFAULT_MODEL);
        assert_eq!(config.base_url, DEFAULT_BASE_URL);
        assert_eq!(config.code_timeout, Duration::from_secs(5));
        assert_eq!(config.max_steps, 500);
        assert!(config.api_key.is_none());
    }

    #[test]
    fn test_overrides_and_blank_values() {
        let config = EngineConfig::from_lookup(lookup(&[
            ("VAULTFLOW_VAULT", "/tmp/vault"),
            ("VAULTFLOW_MODEL", "llama3"),
            ("OPENAI_API_KEY", "  "),
            ("OPENAI_BASE_URL", "http://localhost:11434/v1"),
            ("VAULTFLOW_SCAN_INTERVAL_MS", "250"),
        ]))
        .unwrap();

        assert_eq!(config.vault, PathBuf::from("/tmp/vault"));
        assert_eq!(config.model, "llama3");
        assert!(config.api_key.is_none());
        assert_eq!(config.scan_interval, Duration::from_millis(250));
        assert_eq!(
            config.paths().queue_dir(QueueKind::Edit),
            PathBuf::from("/tmp/vault/.vaultflow/queue/edit")
        );
    }

    #[test]
    fn test_invalid_numbers_are_config_errors() {
        let err = EngineConfig::from_lookup(lookup(&[("VAULTFLOW_MAX_STEPS", "lots")])).unwrap_err();
        assert!(matches!(err, EngineError::Config(_)));

        let err = EngineConfig::from_lookup(lookup(&[("VAULTFLOW_MAX_STEPS", "0")])).unwrap_err();
        assert!(matches!(err, EngineError::Config(_)));
    }
}
