//! Configuration for the DA bridge.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

use dabridge_common::serialization::Format;
use dabridge_common::{LoggingConfig, TagPath, ZenohConfig};
use dabridge_engine::{CatalogSpec, SchedulerConfig};

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse config: {0}")]
    Parse(#[from] json5::Error),
    #[error("Validation error: {0}")]
    Validation(String),
}

/// Complete bridge configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpcdaBridgeConfig {
    /// Zenoh connection settings
    #[serde(default)]
    pub zenoh: ZenohConfig,

    /// DA source settings
    pub source: SourceConfig,

    /// Polling engine settings
    #[serde(default)]
    pub poll: PollConfig,

    /// Tag selection
    pub tags: TagsConfig,

    /// Downstream sink
    #[serde(default)]
    pub sink: SinkConfig,

    /// Process limits
    #[serde(default)]
    pub limits: LimitsConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// DA source connection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    /// Host running the DA server
    #[serde(default = "default_source_host")]
    pub host: String,

    /// ProgID locating the DA server on that host
    pub prog_id: String,

    /// Per-read timeout in milliseconds (must stay below the poll interval)
    #[serde(default = "default_read_timeout_ms")]
    pub read_timeout_ms: u64,
}

fn default_source_host() -> String {
    "localhost".to_string()
}

fn default_read_timeout_ms() -> u64 {
    400
}

/// Polling engine settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollConfig {
    /// Milliseconds between poll ticks
    #[serde(default = "default_interval_ms")]
    pub interval_ms: u64,

    /// Worker pool size (concurrent DA reads)
    #[serde(default = "default_workers")]
    pub workers: usize,

    /// Shutdown drain bound in milliseconds
    #[serde(default = "default_grace_ms")]
    pub grace_ms: u64,
}

fn default_interval_ms() -> u64 {
    500
}

fn default_workers() -> usize {
    50
}

fn default_grace_ms() -> u64 {
    5000
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval_ms: default_interval_ms(),
            workers: default_workers(),
            grace_ms: default_grace_ms(),
        }
    }
}

/// Tag selection: an explicit list, or discovery below a prefix.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TagsConfig {
    /// Namespace prefix for discovery ("" discovers everything)
    pub prefix: Option<String>,

    /// Explicit tag list (takes precedence over discovery)
    #[serde(default)]
    pub explicit: Vec<String>,

    /// Glob patterns removing tags after resolution
    #[serde(default)]
    pub exclude: Vec<String>,

    /// Re-run discovery this often; unset means discover once at startup
    pub refresh_secs: Option<u64>,
}

/// Downstream sink selection.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum SinkConfig {
    /// Publish each reading to the Zenoh fabric
    Publish {
        /// Key expression prefix (the base topic)
        #[serde(default = "default_key_prefix")]
        key_prefix: String,

        /// Payload encoding
        #[serde(default)]
        serialization: Format,
    },
    /// Serve an attribute table over Zenoh queries
    Serve {
        /// Key expression namespace for served attributes
        #[serde(default = "default_key_prefix")]
        key_prefix: String,

        /// When true, no write endpoint is declared at all
        #[serde(default)]
        readonly: bool,
    },
    /// Log readings instead of shipping them (dry runs)
    Console {},
}

fn default_key_prefix() -> String {
    "dabridge/opcda".to_string()
}

impl Default for SinkConfig {
    fn default() -> Self {
        SinkConfig::Publish {
            key_prefix: default_key_prefix(),
            serialization: Format::default(),
        }
    }
}

impl SinkConfig {
    /// Whether this sink needs a Zenoh session at all.
    pub fn needs_session(&self) -> bool {
        !matches!(self, SinkConfig::Console {})
    }
}

/// Process limits.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LimitsConfig {
    /// Resident-set ceiling in MB; 0 disables the watcher. Crossing it
    /// drains the bridge and exits with the reserved restart status.
    #[serde(default)]
    pub max_memory_mb: u64,
}

impl OpcdaBridgeConfig {
    /// Load configuration from a JSON5 file.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: OpcdaBridgeConfig = json5::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.source.prog_id.is_empty() {
            return Err(ConfigError::Validation(
                "source.prog_id cannot be empty".to_string(),
            ));
        }

        if self.poll.interval_ms == 0 {
            return Err(ConfigError::Validation(
                "poll.interval_ms must be positive".to_string(),
            ));
        }

        if self.poll.workers == 0 {
            return Err(ConfigError::Validation(
                "poll.workers must be at least 1".to_string(),
            ));
        }

        // A read that can outlive the tick would pin its tag across whole
        // poll cycles.
        if self.source.read_timeout_ms >= self.poll.interval_ms {
            return Err(ConfigError::Validation(format!(
                "source.read_timeout_ms ({}) must be below poll.interval_ms ({})",
                self.source.read_timeout_ms, self.poll.interval_ms
            )));
        }

        if self.tags.explicit.is_empty() && self.tags.prefix.is_none() {
            return Err(ConfigError::Validation(
                "tags: specify either explicit tags or a discovery prefix".to_string(),
            ));
        }

        if !self.tags.explicit.is_empty() && self.tags.refresh_secs.is_some() {
            return Err(ConfigError::Validation(
                "tags.refresh_secs only applies to prefix discovery".to_string(),
            ));
        }

        for tag in &self.tags.explicit {
            if tag.is_empty() {
                return Err(ConfigError::Validation(
                    "tags.explicit contains an empty tag path".to_string(),
                ));
            }
        }

        Ok(())
    }

    /// The catalog resolution input.
    pub fn catalog_spec(&self) -> CatalogSpec {
        let spec = if self.tags.explicit.is_empty() {
            CatalogSpec::prefix(self.tags.prefix.clone().unwrap_or_default())
        } else {
            // Validated non-empty above.
            CatalogSpec::explicit(
                self.tags
                    .explicit
                    .iter()
                    .filter_map(|t| TagPath::new(t.clone()).ok())
                    .collect(),
            )
        };
        spec.with_exclude(self.tags.exclude.clone())
    }

    /// The scheduler's timing knobs.
    pub fn scheduler_config(&self) -> SchedulerConfig {
        SchedulerConfig {
            interval: Duration::from_millis(self.poll.interval_ms),
            workers: self.poll.workers,
            read_timeout: Duration::from_millis(self.source.read_timeout_ms),
            grace: Duration::from_millis(self.poll.grace_ms),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dabridge_engine::TagSelection;

    #[test]
    fn test_parse_publish_config() {
        let json = r#"{
            zenoh: { mode: "peer" },
            source: { prog_id: "OPCDataStore.Server.2" },
            tags: { explicit: ["line1/temp", "line1/rpm"] },
            sink: { kind: "publish", key_prefix: "factory" }
        }"#;

        let config: OpcdaBridgeConfig = json5::from_str(json).unwrap();
        config.validate().unwrap();

        assert_eq!(config.source.host, "localhost"); // default
        assert_eq!(config.poll.interval_ms, 500); // default
        assert_eq!(config.poll.workers, 50); // default

        if let SinkConfig::Publish { key_prefix, .. } = &config.sink {
            assert_eq!(key_prefix, "factory");
        } else {
            panic!("Expected publish sink");
        }
    }

    #[test]
    fn test_parse_serve_config() {
        let json = r#"{
            source: { host: "192.168.1.10", prog_id: "Vendor.OPC.1" },
            tags: { prefix: "COM1", refresh_secs: 60 },
            sink: { kind: "serve", readonly: true }
        }"#;

        let config: OpcdaBridgeConfig = json5::from_str(json).unwrap();
        config.validate().unwrap();

        assert_eq!(config.source.host, "192.168.1.10");
        if let SinkConfig::Serve { readonly, key_prefix } = &config.sink {
            assert!(readonly);
            assert_eq!(key_prefix, "dabridge/opcda"); // default
        } else {
            panic!("Expected serve sink");
        }
    }

    #[test]
    fn test_validate_missing_tags() {
        let json = r#"{
            source: { prog_id: "Vendor.OPC.1" },
            tags: {}
        }"#;

        let config: OpcdaBridgeConfig = json5::from_str(json).unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_empty_prog_id() {
        let json = r#"{
            source: { prog_id: "" },
            tags: { prefix: "" }
        }"#;

        let config: OpcdaBridgeConfig = json5::from_str(json).unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_read_timeout_vs_interval() {
        let json = r#"{
            source: { prog_id: "Vendor.OPC.1", read_timeout_ms: 600 },
            poll: { interval_ms: 500 },
            tags: { prefix: "" }
        }"#;

        let config: OpcdaBridgeConfig = json5::from_str(json).unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_refresh_requires_prefix_mode() {
        let json = r#"{
            source: { prog_id: "Vendor.OPC.1" },
            tags: { explicit: ["a"], refresh_secs: 30 }
        }"#;

        let config: OpcdaBridgeConfig = json5::from_str(json).unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_catalog_spec_explicit_precedence() {
        let json = r#"{
            source: { prog_id: "Vendor.OPC.1" },
            tags: { explicit: ["line1/temp"], exclude: ["*/debug"] }
        }"#;

        let config: OpcdaBridgeConfig = json5::from_str(json).unwrap();
        let spec = config.catalog_spec();

        assert!(matches!(spec.selection, TagSelection::Explicit(ref tags) if tags.len() == 1));
        assert_eq!(spec.exclude, vec!["*/debug"]);
    }

    #[test]
    fn test_default_sink_is_publish() {
        let json = r#"{
            source: { prog_id: "Vendor.OPC.1" },
            tags: { prefix: "" }
        }"#;

        let config: OpcdaBridgeConfig = json5::from_str(json).unwrap();
        config.validate().unwrap();
        assert!(matches!(config.sink, SinkConfig::Publish { .. }));
        assert!(config.sink.needs_session());
        assert!(!SinkConfig::Console {}.needs_session());
    }

    #[test]
    fn test_scheduler_config_mapping() {
        let json = r#"{
            source: { prog_id: "Vendor.OPC.1", read_timeout_ms: 100 },
            poll: { interval_ms: 250, workers: 8, grace_ms: 1000 },
            tags: { prefix: "COM1" }
        }"#;

        let config: OpcdaBridgeConfig = json5::from_str(json).unwrap();
        config.validate().unwrap();

        let sched = config.scheduler_config();
        assert_eq!(sched.interval, Duration::from_millis(250));
        assert_eq!(sched.workers, 8);
        assert_eq!(sched.read_timeout, Duration::from_millis(100));
        assert_eq!(sched.grace, Duration::from_millis(1000));
    }
}
