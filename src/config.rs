//! Configuration types for file-publish

use serde::{Deserialize, Serialize};
use std::{net::SocketAddr, path::PathBuf, time::Duration};
use utoipa::ToSchema;

/// Main configuration for [`Publisher`](crate::Publisher)
///
/// Fields are organized into logical sub-configs:
/// - [`storage`](StorageConfig) - repositories, public folder naming, strategy
/// - [`worker`](WorkerConfig) - publish worker pool and job leases
/// - [`retry`](RetryConfig) - retry of transient filesystem failures
/// - [`disk_space`](DiskSpaceConfig) - free-space check before copies
/// - [`persistence`](PersistenceConfig) - database location
/// - [`server`](ServerIntegrationConfig) - REST API
#[derive(Clone, Debug, Default, Serialize, Deserialize, ToSchema)]
pub struct Config {
    /// Repository and public tree layout
    #[serde(default)]
    pub storage: StorageConfig,

    /// Publish worker pool settings
    #[serde(default)]
    pub worker: WorkerConfig,

    /// Retry behavior for transient publish failures
    #[serde(default)]
    pub retry: RetryConfig,

    /// Disk space checking before cross-device copies
    #[serde(default)]
    pub disk_space: DiskSpaceConfig,

    /// Data storage
    #[serde(default)]
    pub persistence: PersistenceConfig,

    /// API and external server integration
    #[serde(default)]
    pub server: ServerIntegrationConfig,
}

impl Config {
    /// Check settings that would otherwise fail deep inside a publish job
    pub fn validate(&self) -> crate::Result<()> {
        let name = &self.storage.public_dir_name;
        if name.is_empty() || name.contains('/') || name == "." || name == ".." {
            return Err(crate::Error::Config {
                message: format!("public folder name '{}' must be a single path component", name),
                key: Some("storage.public_dir_name".to_string()),
            });
        }
        if self.worker.max_concurrent_publishes == 0 {
            return Err(crate::Error::Config {
                message: "at least one publish worker is required".to_string(),
                key: Some("worker.max_concurrent_publishes".to_string()),
            });
        }
        if let Some(relative) = self.storage.repositories.iter().find(|r| r.is_relative()) {
            return Err(crate::Error::Config {
                message: format!("repository path '{}' must be absolute", relative.display()),
                key: Some("storage.repositories".to_string()),
            });
        }
        Ok(())
    }
}

/// How a worker moves a file into the public tree
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum StrategyMode {
    /// Link when source and destination share a device, copy otherwise (default)
    #[default]
    Auto,
    /// Always rename and leave a symlink (fails across devices)
    Link,
    /// Always stream-copy, leaving the source untouched
    Copy,
}

/// Repository and public tree configuration
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct StorageConfig {
    /// Absolute repository roots files may be published from
    ///
    /// When empty, the directory containing the source file is its repository.
    #[serde(default)]
    pub repositories: Vec<PathBuf>,

    /// Name of the public folder inside each repository (default: "public")
    #[serde(default = "default_public_dir_name")]
    pub public_dir_name: String,

    /// Publish strategy selection (default: auto)
    #[serde(default)]
    pub strategy: StrategyMode,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            repositories: vec![],
            public_dir_name: default_public_dir_name(),
            strategy: StrategyMode::default(),
        }
    }
}

/// Publish worker pool configuration
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct WorkerConfig {
    /// Number of concurrent publish workers (default: 2)
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent_publishes: usize,

    /// How often idle workers poll the job table (default: 500 ms)
    #[serde(default = "default_poll_interval", with = "millis_serde")]
    pub poll_interval: Duration,

    /// A claimed job is handed to another worker after this long (default: 600 s)
    #[serde(default = "default_lease_timeout", with = "duration_serde")]
    pub lease_timeout: Duration,

    /// How long shutdown waits for in-flight publishes (default: 30 s)
    #[serde(default = "default_shutdown_timeout", with = "duration_serde")]
    pub shutdown_timeout: Duration,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            max_concurrent_publishes: default_max_concurrent(),
            poll_interval: default_poll_interval(),
            lease_timeout: default_lease_timeout(),
            shutdown_timeout: default_shutdown_timeout(),
        }
    }
}

/// Retry configuration for transient failures
///
/// Retries are off by default: a failed publish is immediately terminal.
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct RetryConfig {
    /// Maximum number of retry attempts (default: 0)
    #[serde(default)]
    pub max_attempts: u32,

    /// Initial delay before first retry (default: 1 second)
    #[serde(default = "default_initial_delay", with = "duration_serde")]
    pub initial_delay: Duration,

    /// Maximum delay between retries (default: 60 seconds)
    #[serde(default = "default_max_delay", with = "duration_serde")]
    pub max_delay: Duration,

    /// Multiplier for exponential backoff (default: 2.0)
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,

    /// Add random jitter to delays (default: true)
    #[serde(default = "default_true")]
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 0,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(60),
            backoff_multiplier: 2.0,
            jitter: true,
        }
    }
}

/// Disk space checking configuration
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct DiskSpaceConfig {
    /// Enable disk space checking (default: true)
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Minimum free space to leave on the destination device (default: 0)
    #[serde(default)]
    pub min_free_space: u64,

    /// Multiplier applied to the source size (default: 1.0)
    #[serde(default = "default_size_multiplier")]
    pub size_multiplier: f64,
}

impl Default for DiskSpaceConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            min_free_space: 0,
            size_multiplier: default_size_multiplier(),
        }
    }
}

/// Data storage configuration
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct PersistenceConfig {
    /// Database path (default: "./file-publish.db")
    #[serde(default = "default_database_path")]
    pub database_path: PathBuf,
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
        }
    }
}

/// API and external server integration configuration
#[derive(Clone, Debug, Default, Serialize, Deserialize, ToSchema)]
pub struct ServerIntegrationConfig {
    /// REST API configuration
    #[serde(default)]
    pub api: ApiConfig,
}

/// REST API configuration
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct ApiConfig {
    /// Address to bind to (default: 127.0.0.1:5000)
    #[serde(default = "default_bind_address")]
    pub bind_address: SocketAddr,

    /// Enable CORS for browser access (default: true)
    #[serde(default = "default_true")]
    pub cors_enabled: bool,

    /// Allowed CORS origins (default: ["*"])
    #[serde(default = "default_cors_origins")]
    pub cors_origins: Vec<String>,

    /// Enable Swagger UI at /swagger-ui (default: true)
    #[serde(default = "default_true")]
    pub swagger_ui: bool,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            cors_enabled: true,
            cors_origins: default_cors_origins(),
            swagger_ui: true,
        }
    }
}

// Default value functions
fn default_public_dir_name() -> String {
    "public".into()
}

fn default_max_concurrent() -> usize {
    2
}

fn default_poll_interval() -> Duration {
    Duration::from_millis(500)
}

fn default_lease_timeout() -> Duration {
    Duration::from_secs(600)
}

fn default_shutdown_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_database_path() -> PathBuf {
    PathBuf::from("file-publish.db")
}

fn default_true() -> bool {
    true
}

fn default_initial_delay() -> Duration {
    Duration::from_secs(1)
}

fn default_max_delay() -> Duration {
    Duration::from_secs(60)
}

fn default_backoff_multiplier() -> f64 {
    2.0
}

fn default_size_multiplier() -> f64 {
    1.0
}

fn default_bind_address() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 5000))
}

fn default_cors_origins() -> Vec<String> {
    vec!["*".into()]
}

// Duration serialization helper (whole seconds)
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_secs())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}

// Duration serialization helper (milliseconds)
mod millis_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_millis() as u64)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}
