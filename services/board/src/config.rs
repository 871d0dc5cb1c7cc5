//! Service settings loaded from `DEVJOBS_*` environment variables

use std::path::PathBuf;

use config::{Config, ConfigError, Environment};
use serde::Deserialize;

/// Where session records are kept
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionBackend {
    Postgres,
    Redis,
    Memory,
}

/// Service configuration
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub host: String,
    pub port: u16,
    /// Base url used in reset links; the request `Host` header is used when unset
    #[serde(default)]
    pub public_url: Option<String>,
    pub session_backend: SessionBackend,
    pub session_ttl_seconds: i64,
    pub cookie_secure: bool,
    pub upload_dir: PathBuf,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            public_url: None,
            session_backend: SessionBackend::Postgres,
            session_ttl_seconds: 60 * 60 * 24,
            cookie_secure: false,
            upload_dir: PathBuf::from("uploads"),
        }
    }
}

impl Settings {
    /// Load settings from the environment on top of the defaults
    pub fn load() -> Result<Self, ConfigError> {
        let defaults = Settings::default();

        Config::builder()
            .set_default("host", defaults.host)?
            .set_default("port", i64::from(defaults.port))?
            .set_default("session_backend", "postgres")?
            .set_default("session_ttl_seconds", defaults.session_ttl_seconds)?
            .set_default("cookie_secure", defaults.cookie_secure)?
            .set_default("upload_dir", defaults.upload_dir.to_string_lossy().to_string())?
            .add_source(Environment::with_prefix("DEVJOBS").try_parsing(true))
            .build()?
            .try_deserialize()
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn session_ttl(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.session_ttl_seconds)
    }

    pub fn resume_dir(&self) -> PathBuf {
        self.upload_dir.join("cv")
    }

    pub fn profile_image_dir(&self) -> PathBuf {
        self.upload_dir.join("profiles")
    }
}
