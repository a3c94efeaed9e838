//! Configuration types shared across crates.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// HTTP server and transfer limits.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    #[serde(default = "default_bind")]
    pub bind: String,
    /// Largest file accepted by ingest, in bytes.
    #[serde(default = "default_max_file_size")]
    pub max_file_size: u64,
    /// Largest ttl a client may request, in seconds (0 = unlimited).
    #[serde(default)]
    pub max_ttl_secs: i64,
    /// Ttl applied when a create request omits one.
    #[serde(default = "default_ttl_secs")]
    pub default_ttl_secs: i64,
    /// Size of the chunks the ingest producer hashes and forwards.
    #[serde(default = "default_ingest_chunk_size")]
    pub ingest_chunk_size: usize,
    /// Number of chunks buffered between the ingest producer and the backend writer.
    #[serde(default = "default_conduit_depth")]
    pub conduit_depth: usize,
    /// Enable the /metrics endpoint for Prometheus scraping (default: true).
    /// Restrict access to scrapers at the network level.
    #[serde(default = "default_metrics_enabled")]
    pub metrics_enabled: bool,
}

fn default_bind() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_max_file_size() -> u64 {
    10 * 1024 * 1024 * 1024
}

fn default_ttl_secs() -> i64 {
    30 * 24 * 60 * 60
}

fn default_ingest_chunk_size() -> usize {
    64 * 1024
}

fn default_conduit_depth() -> usize {
    8
}

fn default_metrics_enabled() -> bool {
    true
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            max_file_size: default_max_file_size(),
            max_ttl_secs: 0,
            default_ttl_secs: default_ttl_secs(),
            ingest_chunk_size: default_ingest_chunk_size(),
            conduit_depth: default_conduit_depth(),
            metrics_enabled: default_metrics_enabled(),
        }
    }
}

impl ServerConfig {
    /// Validate transfer limits.
    pub fn validate(&self) -> Result<(), String> {
        if self.ingest_chunk_size == 0 {
            return Err("server.ingest_chunk_size must be greater than 0".to_string());
        }
        if self.conduit_depth == 0 {
            return Err("server.conduit_depth must be greater than 0".to_string());
        }
        if self.max_ttl_secs < 0 {
            return Err("server.max_ttl_secs must not be negative".to_string());
        }
        if self.default_ttl_secs < 0 {
            return Err("server.default_ttl_secs must not be negative".to_string());
        }
        if self.max_ttl_secs != 0
            && (self.default_ttl_secs == 0 || self.default_ttl_secs > self.max_ttl_secs)
        {
            return Err(format!(
                "server.default_ttl_secs {} exceeds server.max_ttl_secs {}",
                self.default_ttl_secs, self.max_ttl_secs
            ));
        }
        Ok(())
    }
}

/// Storage backend configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum StorageConfig {
    /// Local filesystem storage.
    Filesystem {
        /// Root directory for file contents.
        path: PathBuf,
    },
    /// S3-compatible object storage.
    S3 {
        bucket: String,
        /// Optional endpoint URL (MinIO and friends).
        endpoint: Option<String>,
        region: Option<String>,
        /// Optional key prefix prepended to every object.
        prefix: Option<String>,
        /// Falls back to the default AWS credential chain if not set.
        access_key_id: Option<String>,
        secret_access_key: Option<String>,
        /// Use `endpoint/bucket/key` addressing. Required for MinIO.
        #[serde(default)]
        force_path_style: bool,
    },
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self::Filesystem {
            path: PathBuf::from("./data/files"),
        }
    }
}

impl StorageConfig {
    /// Validate storage configuration invariants.
    pub fn validate(&self) -> Result<(), String> {
        match self {
            StorageConfig::Filesystem { path } if path.as_os_str().is_empty() => {
                Err("filesystem storage requires a non-empty path".to_string())
            }
            StorageConfig::S3 { bucket, .. } if bucket.is_empty() => {
                Err("s3 storage requires a bucket".to_string())
            }
            StorageConfig::S3 {
                access_key_id,
                secret_access_key,
                ..
            } => match (access_key_id.as_ref(), secret_access_key.as_ref()) {
                (Some(_), Some(_)) | (None, None) => Ok(()),
                _ => Err(
                    "s3 config requires both access_key_id and secret_access_key when either is set"
                        .to_string(),
                ),
            },
            _ => Ok(()),
        }
    }
}

/// PostgreSQL SSL mode.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PgSslMode {
    Disable,
    #[default]
    Prefer,
    Require,
}

/// Metadata store configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum MetadataConfig {
    /// SQLite database file (single instance deployments).
    Sqlite {
        path: PathBuf,
        /// How long a statement waits on a locked database before failing.
        #[serde(default = "default_sqlite_query_timeout_secs")]
        query_timeout_secs: Option<u64>,
    },
    /// PostgreSQL database, shareable between several server instances.
    Postgres {
        /// Connection URL. Takes precedence over the individual fields.
        url: Option<String>,
        host: Option<String>,
        #[serde(default = "default_pg_port")]
        port: Option<u16>,
        username: Option<String>,
        /// Prefer FERRY_METADATA__PASSWORD over storing it in the file.
        password: Option<String>,
        database: Option<String>,
        ssl_mode: Option<PgSslMode>,
        #[serde(default = "default_max_connections")]
        max_connections: u32,
        /// Server-side statement timeout in milliseconds.
        #[serde(default = "default_statement_timeout_ms")]
        statement_timeout_ms: Option<u64>,
    },
}

fn default_max_connections() -> u32 {
    10
}

fn default_pg_port() -> Option<u16> {
    Some(5432)
}

fn default_statement_timeout_ms() -> Option<u64> {
    Some(30_000)
}

fn default_sqlite_query_timeout_secs() -> Option<u64> {
    Some(30)
}

impl Default for MetadataConfig {
    fn default() -> Self {
        Self::Sqlite {
            path: PathBuf::from("./data/metadata.db"),
            query_timeout_secs: default_sqlite_query_timeout_secs(),
        }
    }
}

impl MetadataConfig {
    /// Validate metadata configuration invariants.
    pub fn validate(&self) -> Result<(), String> {
        match self {
            MetadataConfig::Sqlite { .. } => Ok(()),
            MetadataConfig::Postgres {
                url,
                host,
                database,
                max_connections,
                ..
            } => {
                if *max_connections == 0 {
                    return Err("postgres max_connections must be greater than 0".to_string());
                }
                match (url.as_ref(), host.as_ref(), database.as_ref()) {
                    (Some(_), _, _) | (None, Some(_), Some(_)) => Ok(()),
                    (None, None, _) => Err(
                        "postgres config requires either 'url' or 'host' + 'database'".to_string(),
                    ),
                    (None, Some(_), None) => Err(
                        "postgres config requires 'database' when using individual fields"
                            .to_string(),
                    ),
                }
            }
        }
    }
}

/// Expiry sweeper schedule.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SweeperConfig {
    #[serde(default = "default_sweeper_enabled")]
    pub enabled: bool,
    /// Lower bound of the randomized sleep between sweeps.
    #[serde(default = "default_min_interval_secs")]
    pub min_interval_secs: u64,
    /// Upper bound of the randomized sleep between sweeps.
    #[serde(default = "default_max_interval_secs")]
    pub max_interval_secs: u64,
}

fn default_sweeper_enabled() -> bool {
    true
}

fn default_min_interval_secs() -> u64 {
    2 * 60 * 60
}

fn default_max_interval_secs() -> u64 {
    3 * 60 * 60
}

impl Default for SweeperConfig {
    fn default() -> Self {
        Self {
            enabled: default_sweeper_enabled(),
            min_interval_secs: default_min_interval_secs(),
            max_interval_secs: default_max_interval_secs(),
        }
    }
}

impl SweeperConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.min_interval_secs > self.max_interval_secs {
            return Err(format!(
                "sweeper.min_interval_secs {} exceeds sweeper.max_interval_secs {}",
                self.min_interval_secs, self.max_interval_secs
            ));
        }
        Ok(())
    }
}

/// External validation of one-time tokens.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum TokenValidationConfig {
    /// Token protection is not offered.
    #[default]
    Disabled,
    /// Yubico OTP verification service.
    Yubico {
        #[serde(default = "default_yubico_api_url")]
        api_url: String,
        client_id: String,
        #[serde(default = "default_yubico_timeout_secs")]
        timeout_secs: u64,
    },
}

fn default_yubico_api_url() -> String {
    "https://api.yubico.com/wsapi/2.0/verify".to_string()
}

fn default_yubico_timeout_secs() -> u64 {
    5
}

impl TokenValidationConfig {
    pub fn is_enabled(&self) -> bool {
        !matches!(self, Self::Disabled)
    }

    pub fn timeout(&self) -> Duration {
        match self {
            Self::Disabled => Duration::ZERO,
            Self::Yubico { timeout_secs, .. } => Duration::from_secs(*timeout_secs),
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        match self {
            Self::Yubico { client_id, .. } if client_id.is_empty() => {
                Err("token_validation.client_id is required for yubico".to_string())
            }
            _ => Ok(()),
        }
    }
}

/// Complete application configuration.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub metadata: MetadataConfig,
    #[serde(default)]
    pub sweeper: SweeperConfig,
    #[serde(default)]
    pub token_validation: TokenValidationConfig,
}

impl AppConfig {
    /// Create a test configuration with sensible defaults.
    ///
    /// **For testing only.** The sweeper loop is disabled so tests drive
    /// sweeps explicitly.
    pub fn for_testing() -> Self {
        Self {
            sweeper: SweeperConfig {
                enabled: false,
                ..SweeperConfig::default()
            },
            ..Self::default()
        }
    }

    /// Validate every section, returning the first problem found.
    pub fn validate(&self) -> Result<(), String> {
        self.server.validate()?;
        self.storage.validate()?;
        self.metadata.validate()?;
        self.sweeper.validate()?;
        self.token_validation.validate()
    }
}
