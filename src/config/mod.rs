//! Configuration for the caseflow engine.
//!
//! Defaults live in code; an optional `config/caseflow.toml` file and
//! `CASEFLOW__*` environment variables (double underscore as section
//! separator, e.g. `CASEFLOW__DATABASE__MAX_CONNECTIONS=20`) override them.

use serde::{Deserialize, Serialize};

use crate::error::{CaseflowError, Result};

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CaseflowConfig {
    pub database: DatabaseConfig,
    pub side_effects: SideEffectConfig,
    pub notifications: NotificationConfig,
}

/// Database connection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "postgresql://localhost/caseflow_development".to_string(),
            max_connections: 10,
        }
    }
}

/// Bounded side-effect queue settings (audit log, notifications).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SideEffectConfig {
    /// Channel capacity; enqueue beyond this drops the effect with a warning.
    pub queue_capacity: usize,
    /// Number of background worker tasks consuming the queue.
    pub workers: usize,
}

impl Default for SideEffectConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 256,
            workers: 2,
        }
    }
}

/// Stage-completed notification settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NotificationConfig {
    pub enabled: bool,
    /// Base URL used to build case links embedded in notifications.
    pub case_url_base: Option<String>,
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            case_url_base: None,
        }
    }
}

impl CaseflowConfig {
    /// Load configuration from the optional file and environment overrides.
    pub fn load() -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::with_name("config/caseflow").required(false))
            .add_source(config::Environment::with_prefix("CASEFLOW").separator("__"))
            .build()
            .map_err(|e| CaseflowError::Configuration(e.to_string()))?;

        settings
            .try_deserialize()
            .map_err(|e| CaseflowError::Configuration(e.to_string()))
    }
}
