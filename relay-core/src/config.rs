//! Configuration types

use crate::{ConfigError, PipelineDefinition};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Default lifetime of a pending handoff before the sweep expires it (24 hours).
pub const DEFAULT_PENDING_HANDOFF_TTL_SECS: u64 = 86_400;
/// Default age after which terminal records are purged.
pub const DEFAULT_RETENTION_DAYS: u32 = 30;
/// Upper bound on `retention_days` (100 years).
pub const MAX_RETENTION_DAYS: u32 = 36_500;
/// Default interval between retention sweeps (5 minutes).
pub const DEFAULT_SWEEP_INTERVAL_SECS: u64 = 300;
/// Default buffer size of the event broadcast channel.
pub const DEFAULT_EVENT_CHANNEL_CAPACITY: usize = 1024;

/// Agent pairs declared as safe to work the same item concurrently.
///
/// Entries are matched against a lexicographically sorted `a-b` key, so the
/// spelling here is significant.
pub const DEFAULT_COMPATIBLE_PAIRS: [&str; 4] = [
    "tester-developer",
    "documentation-developer",
    "product-owner-developer",
    "security-developer",
];

/// Coordination settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(default)]
pub struct RelayConfig {
    /// Pending handoffs older than this are expired by the sweep
    pub pending_handoff_ttl_secs: u64,
    /// Terminal records older than this many days are purged
    pub retention_days: u32,
    /// How often the retention sweep runs
    pub sweep_interval_secs: u64,
    /// Capacity of the broadcast event channel
    pub event_channel_capacity: usize,
    /// Default for `auto_create_task` on new handoffs
    pub auto_create_tasks: bool,
    /// Agent pairs allowed to run in parallel on one item
    pub compatible_pairs: Vec<String>,
    /// Replaces the built-in pipeline catalog when set
    pub pipelines: Option<Vec<PipelineDefinition>>,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            pending_handoff_ttl_secs: DEFAULT_PENDING_HANDOFF_TTL_SECS,
            retention_days: DEFAULT_RETENTION_DAYS,
            sweep_interval_secs: DEFAULT_SWEEP_INTERVAL_SECS,
            event_channel_capacity: DEFAULT_EVENT_CHANNEL_CAPACITY,
            auto_create_tasks: true,
            compatible_pairs: DEFAULT_COMPATIBLE_PAIRS
                .iter()
                .map(|p| p.to_string())
                .collect(),
            pipelines: None,
        }
    }
}

impl RelayConfig {
    pub fn pending_handoff_ttl(&self) -> Duration {
        Duration::from_secs(self.pending_handoff_ttl_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }

    /// Create from environment variables with fallback to defaults.
    ///
    /// Environment variables:
    /// - `RELAY_PENDING_HANDOFF_TTL_SECS` (default: 86400)
    /// - `RELAY_RETENTION_DAYS` (default: 30)
    /// - `RELAY_SWEEP_INTERVAL_SECS` (default: 300)
    /// - `RELAY_EVENT_CHANNEL_CAPACITY` (default: 1024)
    /// - `RELAY_AUTO_CREATE_TASKS` (default: true)
    pub fn from_env() -> Self {
        let defaults = Self::default();

        Self {
            pending_handoff_ttl_secs: std::env::var("RELAY_PENDING_HANDOFF_TTL_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.pending_handoff_ttl_secs),
            retention_days: std::env::var("RELAY_RETENTION_DAYS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.retention_days),
            sweep_interval_secs: std::env::var("RELAY_SWEEP_INTERVAL_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.sweep_interval_secs),
            event_channel_capacity: std::env::var("RELAY_EVENT_CHANNEL_CAPACITY")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.event_channel_capacity),
            auto_create_tasks: std::env::var("RELAY_AUTO_CREATE_TASKS")
                .ok()
                .map(|s| s.to_lowercase() != "false")
                .unwrap_or(defaults.auto_create_tasks),
            ..defaults
        }
    }

    /// Parse and validate a TOML document. Missing keys take their defaults.
    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        let config: RelayConfig = toml::from_str(contents).map_err(|e| ConfigError::Parse {
            reason: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a TOML file.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        Self::from_toml_str(&contents)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.pending_handoff_ttl_secs == 0 {
            return Err(ConfigError::InvalidValue {
                field: "pending_handoff_ttl_secs".to_string(),
                value: "0".to_string(),
                reason: "pending_handoff_ttl_secs must be positive".to_string(),
            });
        }

        if self.retention_days == 0 {
            return Err(ConfigError::InvalidValue {
                field: "retention_days".to_string(),
                value: "0".to_string(),
                reason: "retention_days must be positive".to_string(),
            });
        }

        if self.retention_days > MAX_RETENTION_DAYS {
            return Err(ConfigError::InvalidValue {
                field: "retention_days".to_string(),
                value: self.retention_days.to_string(),
                reason: format!("retention_days must not exceed {}", MAX_RETENTION_DAYS),
            });
        }

        if self.sweep_interval_secs == 0 {
            return Err(ConfigError::InvalidValue {
                field: "sweep_interval_secs".to_string(),
                value: "0".to_string(),
                reason: "sweep_interval_secs must be positive".to_string(),
            });
        }

        if self.event_channel_capacity == 0 {
            return Err(ConfigError::InvalidValue {
                field: "event_channel_capacity".to_string(),
                value: "0".to_string(),
                reason: "event_channel_capacity must be positive".to_string(),
            });
        }

        if let Some(pair) = self.compatible_pairs.iter().find(|p| p.trim().is_empty()) {
            return Err(ConfigError::InvalidValue {
                field: "compatible_pairs".to_string(),
                value: pair.clone(),
                reason: "compatible pair entries must be non-empty".to_string(),
            });
        }

        if let Some(pipelines) = &self.pipelines {
            if pipelines.is_empty() {
                return Err(ConfigError::InvalidValue {
                    field: "pipelines".to_string(),
                    value: "[]".to_string(),
                    reason: "omit pipelines to use the built-in catalog".to_string(),
                });
            }
            for pipeline in pipelines {
                pipeline.validate()?;
            }
        }

        Ok(())
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ItemType;
    use std::io::Write;

    #[test]
    fn test_default_config_is_valid() {
        let config = RelayConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.pending_handoff_ttl(), Duration::from_secs(86_400));
        assert_eq!(config.compatible_pairs.len(), 4);
        assert!(config.pipelines.is_none());
    }

    #[test]
    fn test_validate_rejects_zero_capacity() {
        let config = RelayConfig {
            event_channel_capacity: 0,
            ..RelayConfig::default()
        };
        match config.validate() {
            Err(ConfigError::InvalidValue { field, .. }) => {
                assert_eq!(field, "event_channel_capacity")
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn test_validate_rejects_unbounded_retention() {
        let config = RelayConfig {
            retention_days: 1_000_000,
            ..RelayConfig::default()
        };
        match config.validate() {
            Err(ConfigError::InvalidValue { field, value, .. }) => {
                assert_eq!(field, "retention_days");
                assert_eq!(value, "1000000");
            }
            other => panic!("unexpected result: {:?}", other),
        }

        let at_cap = RelayConfig {
            retention_days: MAX_RETENTION_DAYS,
            ..RelayConfig::default()
        };
        assert!(at_cap.validate().is_ok());
    }

    #[test]
    fn test_from_toml_partial_document() {
        let config = RelayConfig::from_toml_str(
            r#"
            retention_days = 7
            auto_create_tasks = false

            [[pipelines]]
            id = "hotfix"
            name = "Hotfix"
            agents = ["developer", "tester"]
            item_types = ["task", "code-review"]
            "#,
        )
        .unwrap();

        assert_eq!(config.retention_days, 7);
        assert!(!config.auto_create_tasks);
        assert_eq!(config.sweep_interval_secs, DEFAULT_SWEEP_INTERVAL_SECS);
        let pipelines = config.pipelines.unwrap();
        assert_eq!(pipelines[0].item_types, vec![ItemType::Task, ItemType::CodeReview]);
    }

    #[test]
    fn test_from_toml_rejects_invalid_pipeline() {
        let err = RelayConfig::from_toml_str(
            r#"
            [[pipelines]]
            id = "empty"
            name = "Empty"
            agents = []
            item_types = ["story"]
            "#,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { .. }));
    }

    #[test]
    fn test_from_toml_reports_parse_error() {
        let err = RelayConfig::from_toml_str("retention_days = \"soon\"").unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }

    #[test]
    fn test_from_path() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "sweep_interval_secs = 60").unwrap();
        let config = RelayConfig::from_path(file.path()).unwrap();
        assert_eq!(config.sweep_interval(), Duration::from_secs(60));

        let missing = RelayConfig::from_path("/definitely/not/here.toml").unwrap_err();
        assert!(matches!(missing, ConfigError::Io { .. }));
    }

    #[test]
    fn test_from_env_overrides_defaults() {
        std::env::set_var("RELAY_RETENTION_DAYS", "14");
        std::env::set_var("RELAY_AUTO_CREATE_TASKS", "FALSE");
        let config = RelayConfig::from_env();
        std::env::remove_var("RELAY_RETENTION_DAYS");
        std::env::remove_var("RELAY_AUTO_CREATE_TASKS");

        assert_eq!(config.retention_days, 14);
        assert!(!config.auto_create_tasks);
        assert_eq!(config.event_channel_capacity, DEFAULT_EVENT_CHANNEL_CAPACITY);
    }
}
