// ABOUTME: Server configuration: HTTP binding, session lifetimes, mirror, docs layout and logging
// ABOUTME: Layered as defaults, then an optional TOML file, then UIDOCS_* environment variables

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;
use uidocs_mcp_tools::DocsLayout;
use uidocs_mirror::MirrorConfig;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default)]
    pub http: HttpConfig,
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub mirror: MirrorConfig,
    #[serde(default)]
    pub docs: DocsLayout,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Configuration for the HTTP transport
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    /// Host address to bind to (default: "127.0.0.1")
    #[serde(default = "default_host")]
    pub host: String,
    /// Port to listen on (default: 3000)
    #[serde(default = "default_port")]
    pub port: u16,
    /// SSE keep-alive interval in seconds (default: 15)
    #[serde(default = "default_keep_alive")]
    pub keep_alive_seconds: u64,
    /// Browser origins allowed to talk to the server; empty allows any
    #[serde(default)]
    pub allowed_origins: Vec<String>,
    /// Host header values accepted; empty allows any
    #[serde(default)]
    pub allowed_hosts: Vec<String>,
    /// How long stop() waits for in-flight connections (default: 10s)
    #[serde(default = "default_shutdown_grace")]
    pub shutdown_grace_secs: u64,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            keep_alive_seconds: default_keep_alive(),
            allowed_origins: Vec::new(),
            allowed_hosts: Vec::new(),
            shutdown_grace_secs: default_shutdown_grace(),
        }
    }
}

impl HttpConfig {
    /// Get the bind address as host:port string
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn keep_alive(&self) -> Duration {
        Duration::from_secs(self.keep_alive_seconds)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.shutdown_grace_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Inactivity after which a session is evicted (default: 30 min)
    #[serde(default = "default_session_timeout")]
    pub timeout_secs: u64,
    /// Idle sweep period (default: 5 min)
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_secs: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_session_timeout(),
            sweep_interval_secs: default_sweep_interval(),
        }
    }
}

impl SessionConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default filter when RUST_LOG is unset (default: info)
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Also write daily-rotated log files here
    #[serde(default)]
    pub directory: Option<PathBuf>,
    #[serde(default = "default_log_file_prefix")]
    pub file_prefix: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            directory: None,
            file_prefix: default_log_file_prefix(),
        }
    }
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    3000
}

fn default_keep_alive() -> u64 {
    15
}

fn default_shutdown_grace() -> u64 {
    10
}

fn default_session_timeout() -> u64 {
    30 * 60
}

fn default_sweep_interval() -> u64 {
    5 * 60
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_file_prefix() -> String {
    "uidocs.log".to_string()
}

impl ServerConfig {
    /// Defaults, then `path` (if any), then the environment.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_env();
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Override fields from `UIDOCS_*` variables. Unparsable numbers keep
    /// the current value.
    pub fn apply_env(&mut self) {
        env_string("UIDOCS_HOST", &mut self.http.host);
        env_parse("UIDOCS_PORT", &mut self.http.port);
        env_parse("UIDOCS_KEEP_ALIVE", &mut self.http.keep_alive_seconds);
        if let Some(origins) = env_list("UIDOCS_ALLOWED_ORIGINS") {
            self.http.allowed_origins = origins;
        }
        if let Some(hosts) = env_list("UIDOCS_ALLOWED_HOSTS") {
            self.http.allowed_hosts = hosts;
        }
        env_parse("UIDOCS_SESSION_TIMEOUT_SECS", &mut self.session.timeout_secs);
        env_parse("UIDOCS_SWEEP_INTERVAL_SECS", &mut self.session.sweep_interval_secs);
        env_string("UIDOCS_REPO_URL", &mut self.mirror.repo_url);
        env_string("UIDOCS_REPO_BRANCH", &mut self.mirror.branch);
        if let Ok(dir) = std::env::var("UIDOCS_CACHE_DIR") {
            self.mirror.cache_dir = PathBuf::from(dir);
        }
        if let Ok(dir) = std::env::var("UIDOCS_DOCS_DIR") {
            self.mirror.local_path = Some(PathBuf::from(dir));
        }
        env_string("UIDOCS_LOG_LEVEL", &mut self.logging.level);
        if let Ok(dir) = std::env::var("UIDOCS_LOG_DIR") {
            self.logging.directory = Some(PathBuf::from(dir));
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.session.timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "session.timeout_secs must be positive".into(),
            ));
        }
        if self.session.sweep_interval_secs == 0 {
            return Err(ConfigError::Invalid(
                "session.sweep_interval_secs must be positive".into(),
            ));
        }
        if self.http.keep_alive_seconds == 0 {
            return Err(ConfigError::Invalid(
                "http.keep_alive_seconds must be positive".into(),
            ));
        }
        self.mirror
            .validate()
            .map_err(|e| ConfigError::Invalid(e.to_string()))
    }
}

fn env_string(key: &str, target: &mut String) {
    if let Ok(value) = std::env::var(key) {
        if !value.trim().is_empty() {
            *target = value;
        }
    }
}

fn env_parse<T: FromStr>(key: &str, target: &mut T) {
    if let Some(value) = std::env::var(key).ok().and_then(|v| v.trim().parse().ok()) {
        *target = value;
    }
}

fn env_list(key: &str) -> Option<Vec<String>> {
    std::env::var(key).ok().map(|raw| {
        raw.split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(String::from)
            .collect()
    })
}
