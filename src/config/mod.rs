use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub environment: Environment,
    pub challenge: ChallengeSettings,
    pub storage: StorageConfig,
    pub api: ApiConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Environment {
    Development,
    Staging,
    Production,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChallengeSettings {
    pub default_challenge_id: String,
    /// Delay before the step 3 discovery request is sent
    pub discovery_delay_ms: u64,
    /// Delay before the step 5 console batch is written
    pub console_batch_delay_ms: u64,
    pub completion_redirect_delay_ms: u64,
    pub completion_redirect_path: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    Memory,
    File,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub backend: StorageBackend,
    pub data_dir: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    pub port: u16,
    /// Base URL the discovery beacon targets (normally this server)
    pub discovery_base_url: Option<String>,
    pub discovery_timeout_ms: u64,
    pub enable_request_logging: bool,
    /// Open sessions untouched for this long are closed
    pub session_idle_timeout_secs: u64,
    /// Upper bound on open sessions; the least recently used goes first
    pub max_sessions: usize,
}

impl ChallengeSettings {
    pub fn discovery_delay(&self) -> Duration {
        Duration::from_millis(self.discovery_delay_ms)
    }

    pub fn console_batch_delay(&self) -> Duration {
        Duration::from_millis(self.console_batch_delay_ms)
    }

    pub fn completion_redirect_delay(&self) -> Duration {
        Duration::from_millis(self.completion_redirect_delay_ms)
    }
}

impl ApiConfig {
    pub fn discovery_base_url(&self) -> String {
        self.discovery_base_url
            .clone()
            .unwrap_or_else(|| format!("http://127.0.0.1:{}", self.port))
    }

    pub fn session_idle_timeout(&self) -> Duration {
        Duration::from_secs(self.session_idle_timeout_secs)
    }
}

impl AppConfig {
    pub fn from_env() -> Self {
        let environment = match env::var("APP_ENV").as_deref() {
            Ok("production") | Ok("prod") => Environment::Production,
            Ok("staging") | Ok("stage") => Environment::Staging,
            _ => Environment::Development,
        };

        // Set defaults based on environment, then override with specific env vars
        match environment {
            Environment::Production => Self::production(),
            Environment::Staging => Self::staging(),
            Environment::Development => Self::development(),
        }
        .with_env_overrides()
    }

    fn with_env_overrides(mut self) -> Self {
        // Challenge overrides
        if let Ok(v) = env::var("CHALLENGE_DEFAULT_ID") {
            self.challenge.default_challenge_id = v;
        }
        if let Ok(v) = env::var("CHALLENGE_DISCOVERY_DELAY_MS") {
            self.challenge.discovery_delay_ms = v.parse().unwrap_or(self.challenge.discovery_delay_ms);
        }
        if let Ok(v) = env::var("CHALLENGE_CONSOLE_BATCH_DELAY_MS") {
            self.challenge.console_batch_delay_ms = v.parse().unwrap_or(self.challenge.console_batch_delay_ms);
        }
        if let Ok(v) = env::var("CHALLENGE_REDIRECT_DELAY_MS") {
            self.challenge.completion_redirect_delay_ms =
                v.parse().unwrap_or(self.challenge.completion_redirect_delay_ms);
        }
        if let Ok(v) = env::var("CHALLENGE_REDIRECT_PATH") {
            self.challenge.completion_redirect_path = v;
        }

        // Storage overrides
        if let Ok(v) = env::var("STORAGE_BACKEND") {
            match v.as_str() {
                "memory" => self.storage.backend = StorageBackend::Memory,
                "file" => self.storage.backend = StorageBackend::File,
                other => tracing::warn!("Ignoring unknown STORAGE_BACKEND '{}'", other),
            }
        }
        if let Ok(v) = env::var("STORAGE_DATA_DIR") {
            self.storage.data_dir = PathBuf::from(v);
        }

        // API overrides
        if let Some(port) = env::var("CHALLENGE_API_PORT")
            .ok()
            .or_else(|| env::var("PORT").ok())
            .and_then(|s| s.parse::<u16>().ok())
        {
            self.api.port = port;
        }
        if let Ok(v) = env::var("API_DISCOVERY_BASE_URL") {
            self.api.discovery_base_url = Some(v);
        }
        if let Ok(v) = env::var("API_DISCOVERY_TIMEOUT_MS") {
            self.api.discovery_timeout_ms = v.parse().unwrap_or(self.api.discovery_timeout_ms);
        }
        if let Ok(v) = env::var("API_ENABLE_REQUEST_LOGGING") {
            self.api.enable_request_logging = v.parse().unwrap_or(self.api.enable_request_logging);
        }
        if let Ok(v) = env::var("API_SESSION_IDLE_TIMEOUT_SECS") {
            self.api.session_idle_timeout_secs = v.parse().unwrap_or(self.api.session_idle_timeout_secs);
        }
        if let Ok(v) = env::var("API_MAX_SESSIONS") {
            self.api.max_sessions = v.parse().unwrap_or(self.api.max_sessions);
        }

        self
    }

    fn default_data_dir() -> PathBuf {
        match env::var("HOME") {
            Ok(home) => PathBuf::from(home).join(".local").join("share").join("security-challenge"),
            Err(_) => PathBuf::from(".security-challenge"),
        }
    }

    pub fn development() -> Self {
        Self {
            environment: Environment::Development,
            challenge: ChallengeSettings {
                default_challenge_id: "security-challenge".to_string(),
                discovery_delay_ms: 1000,
                console_batch_delay_ms: 1500,
                completion_redirect_delay_ms: 3000,
                completion_redirect_path: "/dashboard".to_string(),
            },
            storage: StorageConfig {
                backend: StorageBackend::Memory,
                data_dir: Self::default_data_dir(),
            },
            api: ApiConfig {
                port: 3000,
                discovery_base_url: None,
                discovery_timeout_ms: 5000,
                enable_request_logging: true,
                session_idle_timeout_secs: 1800,
                max_sessions: 1_000,
            },
        }
    }

    pub fn staging() -> Self {
        Self {
            environment: Environment::Staging,
            challenge: ChallengeSettings {
                default_challenge_id: "security-challenge".to_string(),
                discovery_delay_ms: 2000,
                console_batch_delay_ms: 2000,
                completion_redirect_delay_ms: 3000,
                completion_redirect_path: "/dashboard".to_string(),
            },
            storage: StorageConfig {
                backend: StorageBackend::File,
                data_dir: Self::default_data_dir(),
            },
            api: ApiConfig {
                port: 3000,
                discovery_base_url: None,
                discovery_timeout_ms: 3000,
                enable_request_logging: true,
                session_idle_timeout_secs: 1800,
                max_sessions: 10_000,
            },
        }
    }

    pub fn production() -> Self {
        Self {
            environment: Environment::Production,
            challenge: ChallengeSettings {
                default_challenge_id: "security-challenge".to_string(),
                discovery_delay_ms: 2000,
                console_batch_delay_ms: 2000,
                completion_redirect_delay_ms: 3000,
                completion_redirect_path: "/dashboard".to_string(),
            },
            storage: StorageConfig {
                backend: StorageBackend::File,
                data_dir: PathBuf::from("/var/lib/security-challenge"),
            },
            api: ApiConfig {
                port: 8080,
                discovery_base_url: None,
                discovery_timeout_ms: 2000,
                enable_request_logging: false,
                session_idle_timeout_secs: 900,
                max_sessions: 10_000,
            },
        }
    }
}

// Global singleton config - initialized once at startup
pub static CONFIG: Lazy<AppConfig> = Lazy::new(AppConfig::from_env);

// Convenience function for accessing config
pub fn config() -> &'static AppConfig {
    &CONFIG
}

#[macro_export]
macro_rules! is_development {
    () => {
        matches!($crate::config::CONFIG.environment, $crate::config::Environment::Development)
    };
}
