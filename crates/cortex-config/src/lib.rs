//! Ambient configuration layer. Grounded on `tandem-core::config`'s
//! layered config store, simplified to the single flat layer this system's
//! config surface actually needs, and on `engine::main::resolve_state_dir`'s
//! flag → env var → default resolution order.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid config: {0}")]
    Invalid(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CortexConfig {
    #[serde(default = "default_state_dir")]
    pub state_dir: PathBuf,
    #[serde(default = "default_supervision_interval_seconds")]
    pub supervision_interval_seconds: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_confidence_threshold")]
    pub confidence_threshold: f64,
    #[serde(default = "default_escalation_target")]
    pub escalation_target: String,
    #[serde(default)]
    pub amqp_uri: Option<String>,
}

fn default_state_dir() -> PathBuf {
    PathBuf::from(".cortex")
}

fn default_supervision_interval_seconds() -> u64 {
    60
}

fn default_max_retries() -> u32 {
    3
}

fn default_confidence_threshold() -> f64 {
    0.7
}

fn default_escalation_target() -> String {
    "agent.founder".to_string()
}

impl Default for CortexConfig {
    fn default() -> Self {
        Self {
            state_dir: default_state_dir(),
            supervision_interval_seconds: default_supervision_interval_seconds(),
            max_retries: default_max_retries(),
            confidence_threshold: default_confidence_threshold(),
            escalation_target: default_escalation_target(),
            amqp_uri: None,
        }
    }
}

impl CortexConfig {
    /// `flag` → `CORTEX_*` environment overrides → file on disk → default,
    /// matching the teacher's `resolve_state_dir` precedence.
    pub async fn load(path: Option<&Path>, state_dir_flag: Option<PathBuf>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => match tokio::fs::read_to_string(path).await {
                Ok(raw) => serde_json::from_str(&raw)?,
                Err(err) if err.kind() == std::io::ErrorKind::NotFound => Self::default(),
                Err(err) => return Err(err.into()),
            },
            None => Self::default(),
        };

        if let Some(dir) = state_dir_flag {
            config.state_dir = dir;
        } else if let Ok(dir) = std::env::var("CORTEX_STATE_DIR") {
            config.state_dir = PathBuf::from(dir);
        }

        if let Ok(uri) = std::env::var("CORTEX_AMQP_URI") {
            config.amqp_uri = Some(uri);
        }

        Ok(config)
    }

    pub fn refcode_path(&self) -> PathBuf {
        self.state_dir.join("sequence.json")
    }

    pub fn context_dir(&self) -> PathBuf {
        self.state_dir.join("context")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn missing_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing.json");
        let config = CortexConfig::load(Some(&path), None).await.unwrap();
        assert_eq!(config.max_retries, 3);
    }

    #[tokio::test]
    async fn state_dir_flag_overrides_file_value() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cortex.json");
        tokio::fs::write(&path, r#"{"stateDir": "/from-file"}"#)
            .await
            .unwrap();
        let config = CortexConfig::load(Some(&path), Some(PathBuf::from("/from-flag")))
            .await
            .unwrap();
        assert_eq!(config.state_dir, PathBuf::from("/from-flag"));
    }
}
