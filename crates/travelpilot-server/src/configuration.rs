use std::net::SocketAddr;
use std::time::Duration;

use config::{Config, Environment};
use http::HeaderValue;
use serde::Deserialize;

use crate::error::{to_env_var, ConfigError};

pub const DEFAULT_ALLOWED_ORIGINS: [&str; 4] = [
    "http://localhost:3000",
    "https://travel-pilot.sujay-hk.in",
    "https://travel-pilot.vercel.app",
    "https://travel-pilot-git-main-sujay-hks-projects.vercel.app/",
];

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_allowed_origins")]
    pub allowed_origins: Vec<String>,
    /// Idle time after which a session is dropped, 0 keeps sessions forever
    #[serde(default = "default_session_ttl_secs")]
    pub session_ttl_secs: u64,
    #[serde(default)]
    pub max_sessions: Option<usize>,
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            allowed_origins: default_allowed_origins(),
            session_ttl_secs: default_session_ttl_secs(),
            max_sessions: None,
            sweep_interval_secs: default_sweep_interval_secs(),
        }
    }
}

impl Settings {
    pub fn new() -> Result<Self, ConfigError> {
        Self::load_and_validate()
    }

    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .map_err(|e: std::net::AddrParseError| ConfigError::InvalidValue {
                env_var: to_env_var("host"),
                message: e.to_string(),
            })
    }

    pub fn session_ttl(&self) -> Option<Duration> {
        (self.session_ttl_secs > 0).then(|| Duration::from_secs(self.session_ttl_secs))
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs.max(1))
    }

    /// Allowed origins as header values, trailing slashes removed since
    /// browsers never send them
    pub fn cors_origins(&self) -> Result<Vec<HeaderValue>, ConfigError> {
        self.allowed_origins
            .iter()
            .map(|origin| origin.trim().trim_end_matches('/'))
            .filter(|origin| !origin.is_empty())
            .map(|origin| {
                HeaderValue::from_str(origin).map_err(|e| ConfigError::InvalidValue {
                    env_var: to_env_var("allowed_origins"),
                    message: format!("{}: {}", origin, e),
                })
            })
            .collect()
    }

    fn load_and_validate() -> Result<Self, ConfigError> {
        let config = Config::builder()
            .add_source(
                Environment::with_prefix("TRAVELPILOT")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true)
                    .list_separator(",")
                    .with_list_parse_key("allowed_origins"),
            )
            .build()?;

        let result: Result<Self, config::ConfigError> = config.try_deserialize();
        match result {
            Ok(settings) => Ok(settings),
            Err(err) => {
                tracing::debug!("Configuration error: {:?}", &err);
                match err {
                    config::ConfigError::NotFound(field) => Err(ConfigError::MissingEnvVar {
                        env_var: to_env_var(&field),
                    }),
                    _ => Err(ConfigError::Other(err)),
                }
            }
        }
    }
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8000
}

fn default_allowed_origins() -> Vec<String> {
    DEFAULT_ALLOWED_ORIGINS.iter().map(|s| s.to_string()).collect()
}

fn default_session_ttl_secs() -> u64 {
    60 * 60
}

fn default_sweep_interval_secs() -> u64 {
    60
}
