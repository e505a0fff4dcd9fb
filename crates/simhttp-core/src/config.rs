use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::error::{HttpError, Result};

#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub struct TlsConfig {
    pub cert_path: PathBuf,
    pub key_path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ServerConfig {
    /// Externally advertised host name.
    pub hostname: String,
    pub listen_address: String,
    pub port: u16,
    pub secure: bool,
    pub tls: Option<TlsConfig>,
    pub poll_workers: usize,
    pub poll_timeout_ms: u64,
    pub poll_recheck_ms: u64,
    pub poll_queue_capacity: usize,
    pub slow_request_ms: u64,
    pub keepalive_timeout_secs: u64,
    pub max_body_bytes: usize,
    /// Directory searched for `http_404.html` and `http_500.html` overrides.
    pub error_page_dir: Option<PathBuf>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            hostname: "127.0.0.1".to_string(),
            listen_address: "0.0.0.0".to_string(),
            port: 9000,
            secure: false,
            tls: None,
            poll_workers: 3,
            poll_timeout_ms: 25_000,
            poll_recheck_ms: 50,
            poll_queue_capacity: 4096,
            slow_request_ms: 3_000,
            keepalive_timeout_secs: 5,
            max_body_bytes: 16 * 1024 * 1024,
            error_page_dir: None,
        }
    }
}

impl ServerConfig {
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let config: Self = toml::from_str(raw).map_err(|e| HttpError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path.as_ref())?;
        Self::from_toml_str(&raw)
    }

    pub fn validate(&self) -> Result<()> {
        if self.poll_workers == 0 {
            return Err(HttpError::Config("poll_workers must be at least 1".into()));
        }
        if self.poll_queue_capacity == 0 {
            return Err(HttpError::Config(
                "poll_queue_capacity must be at least 1".into(),
            ));
        }
        if self.secure && self.tls.is_none() {
            return Err(HttpError::Config(
                "secure listener requires a [tls] section".into(),
            ));
        }
        Ok(())
    }

    pub fn scheme(&self) -> &'static str {
        if self.secure {
            "https://"
        } else {
            "http://"
        }
    }

    /// `http://host` or `https://host`.
    pub fn full_host_name(&self) -> String {
        format!("{}{}", self.scheme(), self.hostname)
    }

    /// A well-formed URI for this server, e.g. `http://host:9000`.
    pub fn server_uri(&self) -> String {
        format!("{}{}:{}", self.scheme(), self.hostname, self.port)
    }

    pub fn poll_timeout(&self) -> Duration {
        Duration::from_millis(self.poll_timeout_ms)
    }

    pub fn poll_recheck_interval(&self) -> Duration {
        Duration::from_millis(self.poll_recheck_ms)
    }

    pub fn slow_request_threshold(&self) -> Duration {
        Duration::from_millis(self.slow_request_ms)
    }

    pub fn keepalive_timeout(&self) -> Duration {
        Duration::from_secs(self.keepalive_timeout_secs)
    }
}
