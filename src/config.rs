use std::time::Duration;

use reqwest::Url;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const DEFAULT_ENDPOINT: &str = "http://graph.hatena.ne.jp/api/data";
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("username must not be empty")]
    MissingUsername,
    #[error("password must not be empty")]
    MissingPassword,
    #[error("graph name must not be empty")]
    MissingGraphName,
    #[error("invalid endpoint {endpoint}: {reason}")]
    InvalidEndpoint { endpoint: String, reason: String },
}

/// Everything the tracker needs to talk to the graph service. Where it comes from is up to the
/// embedding application.
#[derive(Clone, Serialize, Deserialize)]
pub struct TrackerConfig {
    pub username: String,
    pub password: String,
    pub graph_name: String,
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
}

fn default_endpoint() -> String {
    DEFAULT_ENDPOINT.into()
}

impl TrackerConfig {
    pub fn new(
        username: impl Into<String>,
        password: impl Into<String>,
        graph_name: impl Into<String>,
    ) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
            graph_name: graph_name.into(),
            endpoint: default_endpoint(),
        }
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    /// Checks the configuration once at startup. Nothing downstream works without credentials,
    /// so callers should treat an error here as fatal.
    pub fn validate(&self) -> Result<Url, ConfigError> {
        if self.username.trim().is_empty() {
            return Err(ConfigError::MissingUsername);
        }
        if self.password.is_empty() {
            return Err(ConfigError::MissingPassword);
        }
        if self.graph_name.trim().is_empty() {
            return Err(ConfigError::MissingGraphName);
        }

        let url = Url::parse(&self.endpoint).map_err(|e| ConfigError::InvalidEndpoint {
            endpoint: self.endpoint.clone(),
            reason: e.to_string(),
        })?;
        match url.scheme() {
            "http" | "https" => Ok(url),
            other => Err(ConfigError::InvalidEndpoint {
                endpoint: self.endpoint.clone(),
                reason: format!("unsupported scheme {other}"),
            }),
        }
    }
}

// Keeps the password out of logs.
impl std::fmt::Debug for TrackerConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TrackerConfig")
            .field("username", &self.username)
            .field("password", &"***")
            .field("graph_name", &self.graph_name)
            .field("endpoint", &self.endpoint)
            .finish()
    }
}
