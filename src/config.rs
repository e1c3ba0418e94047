use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub port: u16,
    pub host: String,
}

/// Which repository engine backs the service. The in-memory engine keeps
/// canonical semantics and needs no database file; history is lost on restart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageEngine {
    Sqlite,
    Memory,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_engine")]
    pub engine: StorageEngine,
    /// SQLite file path; ignored when engine = "memory".
    pub path: String,
    pub max_pool_size: u32,
    /// Deadline for a single repository call; the in-flight query is
    /// cancelled when it elapses.
    #[serde(default = "default_query_timeout_ms")]
    pub query_timeout_ms: u64,
}

fn default_engine() -> StorageEngine {
    StorageEngine::Sqlite
}

fn default_query_timeout_ms() -> u64 {
    10_000
}

impl AppConfig {
    pub fn load() -> anyhow::Result<Self> {
        let path = std::env::var("CONFIG_FILE").unwrap_or_else(|_| "config.toml".into());
        let s = std::fs::read_to_string(&path)?;
        Self::load_from_str(&s)
    }

    /// Parse and validate config from a string (e.g. for tests).
    pub fn load_from_str(s: &str) -> anyhow::Result<Self> {
        let config: AppConfig = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> anyhow::Result<()> {
        anyhow::ensure!(
            self.server.port > 0,
            "server.port must be between 1 and 65535, got {}",
            self.server.port
        );
        anyhow::ensure!(
            self.database.engine == StorageEngine::Memory || !self.database.path.is_empty(),
            "database.path must be non-empty when engine is sqlite"
        );
        anyhow::ensure!(
            self.database.max_pool_size > 0,
            "database.max_pool_size must be > 0, got {}",
            self.database.max_pool_size
        );
        anyhow::ensure!(
            self.database.query_timeout_ms > 0,
            "database.query_timeout_ms must be > 0, got {}",
            self.database.query_timeout_ms
        );
        Ok(())
    }
}
