//! Configuration for the entrypoint.
//!
//! Configuration is resolved from multiple sources with precedence:
//! 1. Environment variables (per-service overrides, see below)
//! 2. Config file (/etc/entrypoint/config.toml or ENTRYPOINT_CONFIG)
//! 3. Default values
//!
//! Containers are configured almost exclusively through the environment, so
//! environment variables win over the file. The file exists for images that
//! bake a site configuration.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use tracing::warn;

use crate::error::BootResult;
use crate::retry::{DelayStrategy, RetryPolicy};

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Distributed filesystem daemons
    #[serde(default)]
    pub storage: StorageConfig,

    /// Resource scheduler daemons
    #[serde(default)]
    pub resource: ResourceConfig,

    /// Metadata catalog service and its relational store
    #[serde(default)]
    pub metadata: MetadataConfig,

    /// Query server
    #[serde(default)]
    pub query: QueryConfig,

    /// Compute cluster daemons
    #[serde(default)]
    pub compute: ComputeConfig,

    /// Readiness probing
    #[serde(default)]
    pub probe: ProbeConfig,

    /// Shutdown behavior
    #[serde(default)]
    pub shutdown: ShutdownConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Installation root of the storage daemon
    #[serde(default = "default_storage_home")]
    pub home: PathBuf,

    /// Configuration directory passed to the daemon
    #[serde(default = "default_storage_conf_dir")]
    pub conf_dir: PathBuf,

    /// Data directory the master formats on first boot
    #[serde(default = "default_storage_data_dir")]
    pub data_dir: PathBuf,

    /// Advertised host of the storage master
    #[serde(default = "default_storage_master_host")]
    pub master_host: String,

    /// Client port of the storage master
    #[serde(default = "default_storage_master_port")]
    pub master_port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceConfig {
    #[serde(default = "default_resource_home")]
    pub home: PathBuf,

    #[serde(default = "default_resource_conf_dir")]
    pub conf_dir: PathBuf,

    #[serde(default = "default_resource_master_host")]
    pub master_host: String,

    #[serde(default = "default_resource_master_port")]
    pub master_port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetadataConfig {
    #[serde(default = "default_metadata_home")]
    pub home: PathBuf,

    #[serde(default = "default_metadata_conf_dir")]
    pub conf_dir: PathBuf,

    /// Relational store backing the catalog
    #[serde(default = "default_metadata_db_host")]
    pub db_host: String,

    #[serde(default = "default_metadata_db_port")]
    pub db_port: u16,

    /// Thrift endpoint of the catalog service itself
    #[serde(default = "default_metadata_service_host")]
    pub service_host: String,

    #[serde(default = "default_metadata_service_port")]
    pub service_port: u16,

    /// Schema migration retry bound
    #[serde(default = "default_migrate_max_attempts")]
    pub migrate_max_attempts: u32,

    /// Initial backoff between migration attempts, in seconds
    #[serde(default = "default_migrate_delay_secs")]
    pub migrate_delay_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryConfig {
    #[serde(default = "default_query_home")]
    pub home: PathBuf,

    #[serde(default = "default_query_conf_dir")]
    pub conf_dir: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComputeConfig {
    #[serde(default = "default_compute_home")]
    pub home: PathBuf,

    #[serde(default = "default_compute_conf_dir")]
    pub conf_dir: PathBuf,

    #[serde(default = "default_compute_master_host")]
    pub master_host: String,

    #[serde(default = "default_compute_master_port")]
    pub master_port: u16,

    /// Shared warehouse directory, writable by every role
    #[serde(default = "default_warehouse_dir")]
    pub warehouse_dir: PathBuf,

    /// Shared event-log directory for the history server
    #[serde(default = "default_events_dir")]
    pub events_dir: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProbeConfig {
    /// Attempts before a dependency wait is reported as a timeout
    #[serde(default = "default_probe_max_attempts")]
    pub max_attempts: u32,

    /// Delay between attempts, in seconds
    #[serde(default = "default_probe_delay_secs")]
    pub delay_secs: u64,

    /// Per-attempt TCP connect timeout, in seconds
    #[serde(default = "default_probe_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShutdownConfig {
    /// Seconds the daemon gets to exit after a forwarded signal
    #[serde(default = "default_stop_grace_secs")]
    pub grace_secs: u64,
}

// Default value functions
fn default_storage_home() -> PathBuf {
    PathBuf::from("/opt/storage")
}

fn default_storage_conf_dir() -> PathBuf {
    default_storage_home().join("etc")
}

fn default_storage_data_dir() -> PathBuf {
    PathBuf::from("/data/storage")
}

fn default_storage_master_host() -> String {
    "storage-master".to_string()
}

fn default_storage_master_port() -> u16 {
    9000
}

fn default_resource_home() -> PathBuf {
    PathBuf::from("/opt/resource")
}

fn default_resource_conf_dir() -> PathBuf {
    default_resource_home().join("etc")
}

fn default_resource_master_host() -> String {
    "resource-master".to_string()
}

fn default_resource_master_port() -> u16 {
    8832
}

fn default_metadata_home() -> PathBuf {
    PathBuf::from("/opt/metadata")
}

fn default_metadata_conf_dir() -> PathBuf {
    default_metadata_home().join("etc")
}

fn default_metadata_db_host() -> String {
    "metadata-db".to_string()
}

fn default_metadata_db_port() -> u16 {
    5432
}

fn default_metadata_service_host() -> String {
    "metadata-service".to_string()
}

fn default_metadata_service_port() -> u16 {
    9083
}

fn default_migrate_max_attempts() -> u32 {
    5
}

fn default_migrate_delay_secs() -> u64 {
    5
}

fn default_query_home() -> PathBuf {
    PathBuf::from("/opt/query")
}

fn default_query_conf_dir() -> PathBuf {
    default_query_home().join("etc")
}

fn default_compute_home() -> PathBuf {
    PathBuf::from("/opt/compute")
}

fn default_compute_conf_dir() -> PathBuf {
    default_compute_home().join("etc")
}

fn default_compute_master_host() -> String {
    "compute-master".to_string()
}

fn default_compute_master_port() -> u16 {
    7077
}

fn default_warehouse_dir() -> PathBuf {
    PathBuf::from("/shared/warehouse")
}

fn default_events_dir() -> PathBuf {
    PathBuf::from("/shared/events")
}

fn default_probe_max_attempts() -> u32 {
    60
}

fn default_probe_delay_secs() -> u64 {
    2
}

fn default_probe_connect_timeout_secs() -> u64 {
    3
}

fn default_stop_grace_secs() -> u64 {
    30
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            home: default_storage_home(),
            conf_dir: default_storage_conf_dir(),
            data_dir: default_storage_data_dir(),
            master_host: default_storage_master_host(),
            master_port: default_storage_master_port(),
        }
    }
}

impl Default for ResourceConfig {
    fn default() -> Self {
        Self {
            home: default_resource_home(),
            conf_dir: default_resource_conf_dir(),
            master_host: default_resource_master_host(),
            master_port: default_resource_master_port(),
        }
    }
}

impl Default for MetadataConfig {
    fn default() -> Self {
        Self {
            home: default_metadata_home(),
            conf_dir: default_metadata_conf_dir(),
            db_host: default_metadata_db_host(),
            db_port: default_metadata_db_port(),
            service_host: default_metadata_service_host(),
            service_port: default_metadata_service_port(),
            migrate_max_attempts: default_migrate_max_attempts(),
            migrate_delay_secs: default_migrate_delay_secs(),
        }
    }
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            home: default_query_home(),
            conf_dir: default_query_conf_dir(),
        }
    }
}

impl Default for ComputeConfig {
    fn default() -> Self {
        Self {
            home: default_compute_home(),
            conf_dir: default_compute_conf_dir(),
            master_host: default_compute_master_host(),
            master_port: default_compute_master_port(),
            warehouse_dir: default_warehouse_dir(),
            events_dir: default_events_dir(),
        }
    }
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_probe_max_attempts(),
            delay_secs: default_probe_delay_secs(),
            connect_timeout_secs: default_probe_connect_timeout_secs(),
        }
    }
}

impl Default for ShutdownConfig {
    fn default() -> Self {
        Self {
            grace_secs: default_stop_grace_secs(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            storage: StorageConfig::default(),
            resource: ResourceConfig::default(),
            metadata: MetadataConfig::default(),
            query: QueryConfig::default(),
            compute: ComputeConfig::default(),
            probe: ProbeConfig::default(),
            shutdown: ShutdownConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from file and environment.
    pub fn load() -> BootResult<Self> {
        let config_path = Self::config_path();

        let mut config = if config_path.exists() {
            Self::load_from(&config_path)?
        } else {
            Config::default()
        };

        config.apply_env();
        Ok(config)
    }

    /// Load configuration from a specific file, without the env overlay.
    pub fn load_from(path: &Path) -> BootResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }

    /// Get the config file path.
    pub fn config_path() -> PathBuf {
        if let Ok(path) = std::env::var("ENTRYPOINT_CONFIG") {
            PathBuf::from(path)
        } else {
            PathBuf::from("/etc/entrypoint/config.toml")
        }
    }

    /// Overlay per-service environment variables onto the loaded values.
    pub fn apply_env(&mut self) {
        override_path(&mut self.storage.home, "STORAGE_HOME");
        override_path(&mut self.storage.conf_dir, "STORAGE_CONF_DIR");
        override_path(&mut self.storage.data_dir, "STORAGE_DATA_DIR");
        override_string(&mut self.storage.master_host, "STORAGE_MASTER_HOST");
        override_parse(&mut self.storage.master_port, "STORAGE_MASTER_PORT");

        override_path(&mut self.resource.home, "RESOURCE_HOME");
        override_path(&mut self.resource.conf_dir, "RESOURCE_CONF_DIR");
        override_string(&mut self.resource.master_host, "RESOURCE_MASTER_HOST");
        override_parse(&mut self.resource.master_port, "RESOURCE_MASTER_PORT");

        override_path(&mut self.metadata.home, "METADATA_HOME");
        override_path(&mut self.metadata.conf_dir, "METADATA_CONF_DIR");
        override_string(&mut self.metadata.db_host, "METADATA_DB_HOST");
        override_parse(&mut self.metadata.db_port, "METADATA_DB_PORT");
        override_string(&mut self.metadata.service_host, "METADATA_SERVICE_HOST");
        override_parse(&mut self.metadata.service_port, "METADATA_SERVICE_PORT");
        override_parse(
            &mut self.metadata.migrate_max_attempts,
            "METADATA_MIGRATE_ATTEMPTS",
        );
        override_parse(
            &mut self.metadata.migrate_delay_secs,
            "METADATA_MIGRATE_DELAY_SECS",
        );

        override_path(&mut self.query.home, "QUERY_HOME");
        override_path(&mut self.query.conf_dir, "QUERY_CONF_DIR");

        override_path(&mut self.compute.home, "COMPUTE_HOME");
        override_path(&mut self.compute.conf_dir, "COMPUTE_CONF_DIR");
        override_string(&mut self.compute.master_host, "COMPUTE_MASTER_HOST");
        override_parse(&mut self.compute.master_port, "COMPUTE_MASTER_PORT");
        override_path(&mut self.compute.warehouse_dir, "WAREHOUSE_DIR");
        override_path(&mut self.compute.events_dir, "EVENTS_DIR");

        override_parse(&mut self.probe.max_attempts, "PROBE_MAX_ATTEMPTS");
        override_parse(&mut self.probe.delay_secs, "PROBE_DELAY_SECS");
        override_parse(
            &mut self.probe.connect_timeout_secs,
            "PROBE_CONNECT_TIMEOUT_SECS",
        );

        override_parse(&mut self.shutdown.grace_secs, "STOP_GRACE_SECS");
    }

    /// Retry policy for readiness probing.
    pub fn probe_policy(&self) -> RetryPolicy {
        RetryPolicy::fixed(
            self.probe.max_attempts,
            Duration::from_secs(self.probe.delay_secs),
        )
    }

    /// Retry policy for the schema migration tool.
    pub fn migration_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.metadata.migrate_max_attempts,
            delay: Duration::from_secs(self.metadata.migrate_delay_secs),
            strategy: DelayStrategy::Exponential { factor: 2.0 },
            max_delay: Duration::from_secs(60),
            jitter: true,
        }
    }

    /// Per-attempt TCP connect timeout for readiness probes.
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.probe.connect_timeout_secs)
    }

    /// Grace period between a forwarded signal and SIGKILL escalation.
    pub fn stop_grace(&self) -> Duration {
        Duration::from_secs(self.shutdown.grace_secs)
    }

    /// Directories every role must be able to write to.
    pub fn shared_dirs(&self) -> Vec<PathBuf> {
        vec![
            self.compute.warehouse_dir.clone(),
            self.compute.events_dir.clone(),
        ]
    }
}

fn override_string(slot: &mut String, var: &str) {
    if let Ok(value) = std::env::var(var) {
        if !value.is_empty() {
            *slot = value;
        }
    }
}

fn override_path(slot: &mut PathBuf, var: &str) {
    if let Ok(value) = std::env::var(var) {
        if !value.is_empty() {
            *slot = PathBuf::from(value);
        }
    }
}

fn override_parse<T: FromStr>(slot: &mut T, var: &str) {
    if let Ok(value) = std::env::var(var) {
        match value.parse::<T>() {
            Ok(parsed) => *slot = parsed,
            Err(_) => warn!(var, value = %value, "ignoring unparseable override"),
        }
    }
}
