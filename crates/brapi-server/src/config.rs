//! Configuration management

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::str::FromStr;

use crate::query::PaginationSettings;

// ============================================================================
// Server Configuration Constants
// ============================================================================

/// Default server host binding.
pub const DEFAULT_SERVER_HOST: &str = "127.0.0.1";

/// Default server port.
pub const DEFAULT_SERVER_PORT: u16 = 8000;

/// Default shutdown timeout in seconds.
pub const DEFAULT_SHUTDOWN_TIMEOUT_SECS: u64 = 30;

/// Default maximum database connections in the pool.
pub const DEFAULT_DATABASE_MAX_CONNECTIONS: u32 = 10;

/// Default minimum database connections in the pool.
pub const DEFAULT_DATABASE_MIN_CONNECTIONS: u32 = 2;

/// Default database connection timeout in seconds.
pub const DEFAULT_DATABASE_CONNECT_TIMEOUT_SECS: u64 = 10;

/// Default database idle timeout in seconds (10 minutes).
pub const DEFAULT_DATABASE_IDLE_TIMEOUT_SECS: u64 = 600;

/// Default CORS allowed origin for local development.
pub const DEFAULT_CORS_ALLOWED_ORIGIN: &str = "http://localhost:3000";

// ============================================================================
// BrAPI Configuration Constants
// ============================================================================

/// Default location of the schema and mapping catalog.
pub const DEFAULT_CATALOG_PATH: &str = "config/brapi-catalog.json";

/// Default active release per major version.
pub const DEFAULT_ACTIVE_RELEASES: &str = "v1:1.3,v2:2.1";

/// Default page size when a client sends none.
pub const DEFAULT_PAGE_SIZE: u64 = 10;

/// Largest page size a client may request.
pub const DEFAULT_MAX_PAGE_SIZE: u64 = 1000;

/// Lifetime of deferred search jobs in seconds (1 hour).
pub const DEFAULT_SEARCH_TTL_SECS: u64 = 3600;

/// Deferred searches allowed in flight at once.
pub const DEFAULT_MAX_PENDING_SEARCHES: usize = 16;

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub store: StoreConfig,
    pub cors: CorsConfig,
    pub brapi: BrapiConfig,
}

/// Server-specific configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub shutdown_timeout_secs: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    Memory,
    Postgres,
}

impl FromStr for StoreBackend {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "memory" => Ok(StoreBackend::Memory),
            "postgres" | "postgresql" => Ok(StoreBackend::Postgres),
            other => anyhow::bail!("Unknown record store '{}' (expected memory or postgres)", other),
        }
    }
}

/// Record store configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    pub backend: StoreBackend,
    /// JSON records loaded into the memory store at start-up
    pub seed_path: Option<PathBuf>,
    pub database: DatabaseConfig,
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: Option<String>,
    pub max_connections: u32,
    pub min_connections: u32,
    pub connect_timeout_secs: u64,
    pub idle_timeout_secs: u64,
}

/// CORS configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorsConfig {
    pub allowed_origins: Vec<String>,
    pub allow_credentials: bool,
}

/// BrAPI engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrapiConfig {
    pub catalog_path: PathBuf,
    /// Major version -> active release
    pub active_releases: BTreeMap<String, String>,
    pub pagination: PaginationSettings,
    pub search_ttl_secs: u64,
    pub max_pending_searches: usize,
    /// Static bearer tokens -> roles
    #[serde(skip_serializing)]
    pub tokens: BTreeMap<String, Vec<String>>,
}

/// Parse `key` from the environment, falling back to `default`
fn env_or<T: FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|s| s.trim().parse().ok())
        .unwrap_or(default)
}

impl Config {
    /// Load configuration from environment and defaults
    pub fn load() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let config = Config {
            server: ServerConfig {
                host: std::env::var("BRAPI_HOST")
                    .unwrap_or_else(|_| DEFAULT_SERVER_HOST.to_string()),
                port: env_or("BRAPI_PORT", DEFAULT_SERVER_PORT),
                shutdown_timeout_secs: env_or(
                    "BRAPI_SHUTDOWN_TIMEOUT",
                    DEFAULT_SHUTDOWN_TIMEOUT_SECS,
                ),
            },
            store: StoreConfig {
                backend: std::env::var("BRAPI_STORE")
                    .map(|s| s.parse())
                    .unwrap_or(Ok(StoreBackend::Memory))?,
                seed_path: std::env::var("BRAPI_SEED_PATH").ok().map(PathBuf::from),
                database: DatabaseConfig {
                    url: std::env::var("DATABASE_URL").ok().filter(|s| !s.is_empty()),
                    max_connections: env_or(
                        "DATABASE_MAX_CONNECTIONS",
                        DEFAULT_DATABASE_MAX_CONNECTIONS,
                    ),
                    min_connections: env_or(
                        "DATABASE_MIN_CONNECTIONS",
                        DEFAULT_DATABASE_MIN_CONNECTIONS,
                    ),
                    connect_timeout_secs: env_or(
                        "DATABASE_CONNECT_TIMEOUT",
                        DEFAULT_DATABASE_CONNECT_TIMEOUT_SECS,
                    ),
                    idle_timeout_secs: env_or(
                        "DATABASE_IDLE_TIMEOUT",
                        DEFAULT_DATABASE_IDLE_TIMEOUT_SECS,
                    ),
                },
            },
            cors: CorsConfig {
                allowed_origins: std::env::var("CORS_ALLOWED_ORIGINS")
                    .unwrap_or_else(|_| DEFAULT_CORS_ALLOWED_ORIGIN.to_string())
                    .split(',')
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect(),
                allow_credentials: env_or("CORS_ALLOW_CREDENTIALS", true),
            },
            brapi: BrapiConfig {
                catalog_path: std::env::var("BRAPI_CATALOG_PATH")
                    .map(PathBuf::from)
                    .unwrap_or_else(|_| PathBuf::from(DEFAULT_CATALOG_PATH)),
                active_releases: parse_active_releases(
                    &std::env::var("BRAPI_ACTIVE_RELEASES")
                        .unwrap_or_else(|_| DEFAULT_ACTIVE_RELEASES.to_string()),
                )?,
                pagination: PaginationSettings {
                    default_page_size: env_or("BRAPI_DEFAULT_PAGE_SIZE", DEFAULT_PAGE_SIZE),
                    max_page_size: env_or("BRAPI_MAX_PAGE_SIZE", DEFAULT_MAX_PAGE_SIZE),
                },
                search_ttl_secs: env_or("BRAPI_SEARCH_TTL", DEFAULT_SEARCH_TTL_SECS),
                max_pending_searches: env_or(
                    "BRAPI_MAX_PENDING_SEARCHES",
                    DEFAULT_MAX_PENDING_SEARCHES,
                ),
                tokens: parse_tokens(&std::env::var("BRAPI_TOKENS").unwrap_or_default())?,
            },
        };

        config.validate()?;

        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.server.port == 0 {
            anyhow::bail!("Server port must be greater than 0");
        }

        if self.store.backend == StoreBackend::Postgres && self.store.database.url.is_none() {
            anyhow::bail!("DATABASE_URL is required when BRAPI_STORE=postgres");
        }

        if self.store.database.max_connections == 0 {
            anyhow::bail!("Database max_connections must be greater than 0");
        }

        if self.store.database.min_connections > self.store.database.max_connections {
            anyhow::bail!(
                "Database min_connections ({}) cannot be greater than max_connections ({})",
                self.store.database.min_connections,
                self.store.database.max_connections
            );
        }

        let pagination = self.brapi.pagination;
        if pagination.default_page_size == 0 {
            anyhow::bail!("Default page size must be greater than 0");
        }
        if pagination.default_page_size > pagination.max_page_size {
            anyhow::bail!(
                "Default page size ({}) cannot be greater than max page size ({})",
                pagination.default_page_size,
                pagination.max_page_size
            );
        }

        if self.brapi.search_ttl_secs == 0 {
            anyhow::bail!("Search TTL must be greater than 0");
        }

        if self.brapi.active_releases.is_empty() {
            anyhow::bail!("At least one BrAPI release must be active");
        }

        if self.cors.allowed_origins.is_empty() {
            tracing::warn!("No CORS origins configured - all origins will be allowed");
        }

        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: DEFAULT_SERVER_HOST.to_string(),
                port: DEFAULT_SERVER_PORT,
                shutdown_timeout_secs: DEFAULT_SHUTDOWN_TIMEOUT_SECS,
            },
            store: StoreConfig {
                backend: StoreBackend::Memory,
                seed_path: None,
                database: DatabaseConfig {
                    url: None,
                    max_connections: DEFAULT_DATABASE_MAX_CONNECTIONS,
                    min_connections: DEFAULT_DATABASE_MIN_CONNECTIONS,
                    connect_timeout_secs: DEFAULT_DATABASE_CONNECT_TIMEOUT_SECS,
                    idle_timeout_secs: DEFAULT_DATABASE_IDLE_TIMEOUT_SECS,
                },
            },
            cors: CorsConfig {
                allowed_origins: vec![DEFAULT_CORS_ALLOWED_ORIGIN.to_string()],
                allow_credentials: true,
            },
            brapi: BrapiConfig {
                catalog_path: PathBuf::from(DEFAULT_CATALOG_PATH),
                active_releases: BTreeMap::from([
                    ("v1".to_string(), "1.3".to_string()),
                    ("v2".to_string(), "2.1".to_string()),
                ]),
                pagination: PaginationSettings {
                    default_page_size: DEFAULT_PAGE_SIZE,
                    max_page_size: DEFAULT_MAX_PAGE_SIZE,
                },
                search_ttl_secs: DEFAULT_SEARCH_TTL_SECS,
                max_pending_searches: DEFAULT_MAX_PENDING_SEARCHES,
                tokens: BTreeMap::new(),
            },
        }
    }
}

/// Parse `v1:1.3,v2:2.1`; each major version may appear once
pub fn parse_active_releases(raw: &str) -> anyhow::Result<BTreeMap<String, String>> {
    let mut releases = BTreeMap::new();
    for entry in raw.split(',').map(str::trim).filter(|s| !s.is_empty()) {
        let Some((version, release)) = entry.split_once(':') else {
            anyhow::bail!("Malformed release '{}' (expected version:release)", entry);
        };
        let (version, release) = (version.trim(), release.trim());

        let numeric = |s: &str| !s.is_empty() && s.chars().all(|c| c.is_ascii_digit());
        let valid_version = version.strip_prefix('v').is_some_and(numeric);
        let valid_release = release
            .split_once('.')
            .is_some_and(|(major, minor)| numeric(major) && numeric(minor));
        if !valid_version || !valid_release {
            anyhow::bail!("Malformed release '{}' (expected e.g. v2:2.1)", entry);
        }

        if releases
            .insert(version.to_string(), release.to_string())
            .is_some()
        {
            anyhow::bail!("Version {} has more than one active release", version);
        }
    }
    Ok(releases)
}

/// Parse `token:role|role,token:role`
pub fn parse_tokens(raw: &str) -> anyhow::Result<BTreeMap<String, Vec<String>>> {
    let mut tokens = BTreeMap::new();
    for entry in raw.split(',').map(str::trim).filter(|s| !s.is_empty()) {
        let Some((token, roles)) = entry.split_once(':') else {
            anyhow::bail!("Malformed token entry (expected token:role|role)");
        };
        let roles: Vec<String> = roles
            .split('|')
            .map(|r| r.trim().to_string())
            .filter(|r| !r.is_empty())
            .collect();
        if token.trim().is_empty() || roles.is_empty() {
            anyhow::bail!("Malformed token entry (expected token:role|role)");
        }
        tokens.insert(token.trim().to_string(), roles);
    }
    Ok(tokens)
}
